//! Test helpers: in-memory stores and collaborators for the dunning engine.
//!
//! Every fake records what it was asked to do and can be told to fail, so the
//! tests drive the engine end to end without Postgres, Stripe, Plaid or SMTP.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use strongbox_core::models::{
    DocumentSummary, DunningAction, DunningAuditEntry, DunningState, NotificationTemplate,
    PlanCatalog, Subscription, SubscriptionPlan,
};
use strongbox_core::{AppError, BankConnectionService, FixedClock, Notifier, PaymentProcessor};
use strongbox_db::{DocumentStore, DunningAuditLog, SubscriptionStore};
use strongbox_services::{DunningCollaborators, DunningEngine, DunningSettings};

/// Day 0 for every scenario
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

#[derive(Default)]
pub struct InMemorySubscriptions {
    rows: Mutex<HashMap<Uuid, Subscription>>,
    /// Subscribers whose writes fail with a database error
    pub fail_writes: Mutex<HashSet<Uuid>>,
    /// Subscribers whose next write loses to a concurrent runner
    pub race_next_write: Mutex<HashSet<Uuid>>,
    /// Subscribers another writer recovers just before our next write
    pub recover_before_next_write: Mutex<HashSet<Uuid>>,
}

impl InMemorySubscriptions {
    pub fn insert(&self, subscription: Subscription) {
        self.rows
            .lock()
            .unwrap()
            .insert(subscription.subscriber_id, subscription);
    }

    pub fn snapshot(&self, subscriber_id: Uuid) -> Subscription {
        self.rows.lock().unwrap()[&subscriber_id].clone()
    }

    /// Simulate another runner persisting a step behind our back
    pub fn force_step(&self, subscriber_id: Uuid, step: u8) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(&subscriber_id) {
            row.dunning = row.dunning.with_step(step);
        }
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptions {
    async fn get(&self, subscriber_id: Uuid) -> Result<Option<Subscription>, AppError> {
        Ok(self.rows.lock().unwrap().get(&subscriber_id).cloned())
    }

    async fn list_in_dunning(&self) -> Result<Vec<Uuid>, AppError> {
        let rows = self.rows.lock().unwrap();
        let mut ids: Vec<_> = rows
            .values()
            .filter(|s| s.in_dunning())
            .map(|s| (s.dunning.failed_at(), s.subscriber_id))
            .collect();
        ids.sort();
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn save_dunning(
        &self,
        subscription: &Subscription,
        expected_step: u8,
    ) -> Result<(), AppError> {
        if self
            .fail_writes
            .lock()
            .unwrap()
            .contains(&subscription.subscriber_id)
        {
            return Err(AppError::Internal("database unavailable".to_string()));
        }

        let mut rows = self.rows.lock().unwrap();
        let stored = rows.get_mut(&subscription.subscriber_id).ok_or_else(|| {
            AppError::NotFound(format!("subscriber {}", subscription.subscriber_id))
        })?;
        if self
            .race_next_write
            .lock()
            .unwrap()
            .remove(&subscription.subscriber_id)
        {
            stored.dunning = stored.dunning.with_step(expected_step + 1);
        }
        if self
            .recover_before_next_write
            .lock()
            .unwrap()
            .remove(&subscription.subscriber_id)
        {
            stored.dunning = DunningState::Active;
        }
        if stored.dunning_step() != expected_step {
            return Err(AppError::StaleDunningState {
                subscriber_id: subscription.subscriber_id,
                expected_step,
                actual_step: stored.dunning_step(),
            });
        }
        // Usage counters belong to the chat flow
        let chat_messages_used = stored.chat_messages_used;
        *stored = subscription.clone();
        stored.chat_messages_used = chat_messages_used;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<DunningAuditEntry>>,
}

impl InMemoryAuditLog {
    /// Entries for one subscriber, oldest first
    pub fn entries_for(&self, subscriber_id: Uuid) -> Vec<DunningAuditEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.subscriber_id == subscriber_id)
            .cloned()
            .collect()
    }

    pub fn steps_with(&self, subscriber_id: Uuid, action: DunningAction) -> Vec<i16> {
        self.entries_for(subscriber_id)
            .into_iter()
            .filter(|e| e.action == action)
            .map(|e| e.step)
            .collect()
    }
}

#[async_trait]
impl DunningAuditLog for InMemoryAuditLog {
    async fn append(&self, entry: DunningAuditEntry) -> Result<(), AppError> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    async fn list_for_subscriber(
        &self,
        subscriber_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DunningAuditEntry>, AppError> {
        let mut entries = self.entries_for(subscriber_id);
        entries.reverse();
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

#[derive(Default)]
pub struct InMemoryDocuments {
    documents: Mutex<HashMap<Uuid, Vec<DocumentSummary>>>,
    pub deleted: Mutex<Vec<Uuid>>,
    /// Subscribers whose document queries fail
    pub fail_for: Mutex<HashSet<Uuid>>,
}

impl InMemoryDocuments {
    /// Add `count` documents, one day apart, the first created at `from`
    pub fn seed(&self, subscriber_id: Uuid, count: usize, from: DateTime<Utc>) {
        let mut documents = self.documents.lock().unwrap();
        let list = documents.entry(subscriber_id).or_default();
        for i in 0..count {
            let index = list.len();
            list.push(DocumentSummary {
                id: Uuid::new_v4(),
                name: format!("document-{:03}.pdf", index),
                created_at: from + Duration::days(i as i64),
            });
        }
    }

    pub fn names(&self, subscriber_id: Uuid) -> Vec<String> {
        self.documents
            .lock()
            .unwrap()
            .get(&subscriber_id)
            .map(|docs| docs.iter().map(|d| d.name.clone()).collect())
            .unwrap_or_default()
    }

    fn check(&self, subscriber_id: Uuid) -> Result<(), AppError> {
        if self.fail_for.lock().unwrap().contains(&subscriber_id) {
            return Err(AppError::Internal("database unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocuments {
    async fn count(&self, subscriber_id: Uuid) -> Result<i64, AppError> {
        self.check(subscriber_id)?;
        Ok(self
            .documents
            .lock()
            .unwrap()
            .get(&subscriber_id)
            .map_or(0, |d| d.len() as i64))
    }

    async fn list_oldest_first(
        &self,
        subscriber_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DocumentSummary>, AppError> {
        self.check(subscriber_id)?;
        let mut docs = self
            .documents
            .lock()
            .unwrap()
            .get(&subscriber_id)
            .cloned()
            .unwrap_or_default();
        docs.sort_by_key(|d| (d.created_at, d.id));
        docs.truncate(limit.max(0) as usize);
        Ok(docs)
    }

    async fn delete_many(&self, subscriber_id: Uuid, ids: &[Uuid]) -> Result<u64, AppError> {
        self.check(subscriber_id)?;
        let mut documents = self.documents.lock().unwrap();
        let Some(list) = documents.get_mut(&subscriber_id) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|d| !ids.contains(&d.id));
        self.deleted.lock().unwrap().extend_from_slice(ids);
        Ok((before - list.len()) as u64)
    }
}

#[derive(Default)]
pub struct FakePayments {
    /// Next retries succeed
    pub succeed: AtomicBool,
    /// Next retries return a processor error
    pub error: AtomicBool,
    pub retries: AtomicUsize,
    pub cancelled: Mutex<Vec<String>>,
}

impl FakePayments {
    pub fn set_success(&self, succeed: bool) {
        self.succeed.store(succeed, Ordering::SeqCst);
    }

    pub fn retry_count(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProcessor for FakePayments {
    async fn retry_invoice(&self, _customer_id: &str) -> Result<bool, AppError> {
        self.retries.fetch_add(1, Ordering::SeqCst);
        if self.error.load(Ordering::SeqCst) {
            return Err(AppError::PaymentProcessor("processor unavailable".to_string()));
        }
        Ok(self.succeed.load(Ordering::SeqCst))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), AppError> {
        self.cancelled
            .lock()
            .unwrap()
            .push(subscription_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBanks {
    connections: Mutex<HashMap<Uuid, Vec<String>>>,
    pub failing: Mutex<HashSet<String>>,
    pub disconnected: Mutex<Vec<String>>,
}

impl FakeBanks {
    pub fn link(&self, subscriber_id: Uuid, connection_id: &str) {
        self.connections
            .lock()
            .unwrap()
            .entry(subscriber_id)
            .or_default()
            .push(connection_id.to_string());
    }

    pub fn remaining(&self, subscriber_id: Uuid) -> Vec<String> {
        self.connections
            .lock()
            .unwrap()
            .get(&subscriber_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl BankConnectionService for FakeBanks {
    async fn list_connections(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        Ok(self.remaining(user_id))
    }

    async fn disconnect(&self, connection_id: &str) -> Result<(), AppError> {
        if self.failing.lock().unwrap().contains(connection_id) {
            return Err(AppError::BankConnection("provider timeout".to_string()));
        }
        for list in self.connections.lock().unwrap().values_mut() {
            list.retain(|c| c != connection_id);
        }
        self.disconnected
            .lock()
            .unwrap()
            .push(connection_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub sent: Mutex<Vec<(Uuid, NotificationTemplate, serde_json::Value)>>,
    pub fail: AtomicBool,
}

impl FakeNotifier {
    pub fn templates_for(&self, subscriber_id: Uuid) -> Vec<NotificationTemplate> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == subscriber_id)
            .map(|(_, t, _)| *t)
            .collect()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(
        &self,
        user_id: Uuid,
        template: NotificationTemplate,
        data: serde_json::Value,
    ) -> Result<(), AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Notification("smtp unreachable".to_string()));
        }
        self.sent.lock().unwrap().push((user_id, template, data));
        Ok(())
    }
}

/// Engine wired to in-memory collaborators
pub struct TestHarness {
    pub engine: Arc<DunningEngine>,
    pub subscriptions: Arc<InMemorySubscriptions>,
    pub audit: Arc<InMemoryAuditLog>,
    pub documents: Arc<InMemoryDocuments>,
    pub payments: Arc<FakePayments>,
    pub banks: Arc<FakeBanks>,
    pub notifier: Arc<FakeNotifier>,
    pub clock: Arc<FixedClock>,
    pub catalog: PlanCatalog,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(DunningSettings::default())
    }

    pub fn with_settings(settings: DunningSettings) -> Self {
        let subscriptions = Arc::new(InMemorySubscriptions::default());
        let audit = Arc::new(InMemoryAuditLog::default());
        let documents = Arc::new(InMemoryDocuments::default());
        let payments = Arc::new(FakePayments::default());
        let banks = Arc::new(FakeBanks::default());
        let notifier = Arc::new(FakeNotifier::default());
        let clock = Arc::new(FixedClock::new(epoch()));
        let catalog = PlanCatalog::default();

        let engine = Arc::new(DunningEngine::new(
            DunningCollaborators {
                subscriptions: subscriptions.clone(),
                audit_log: audit.clone(),
                documents: documents.clone(),
                payments: payments.clone(),
                bank_connections: banks.clone(),
                notifier: notifier.clone(),
                clock: clock.clone(),
            },
            catalog.clone(),
            settings,
        ));

        Self {
            engine,
            subscriptions,
            audit,
            documents,
            payments,
            banks,
            notifier,
            clock,
            catalog,
        }
    }

    /// Active paying subscriber with processor handles
    pub fn add_subscriber(&self, plan: SubscriptionPlan) -> Uuid {
        let subscriber_id = Uuid::new_v4();
        self.subscriptions.insert(Subscription {
            subscriber_id,
            plan,
            dunning: DunningState::Active,
            entitlements: self.catalog.entitlements(plan),
            chat_messages_used: 0,
            external_customer_id: Some(format!("cus_{}", subscriber_id.simple())),
            external_subscription_id: Some(format!("sub_{}", subscriber_id.simple())),
            created_at: epoch() - Duration::days(90),
            updated_at: epoch() - Duration::days(90),
        });
        subscriber_id
    }

    /// Subscriber already sitting at `step` since a failure `days_ago` days back
    pub fn add_in_dunning(&self, plan: SubscriptionPlan, step: u8, days_ago: i64) -> Uuid {
        let subscriber_id = self.add_subscriber(plan);
        let failed_at = self.clock_now() - Duration::days(days_ago);
        let mut subscription = self.subscriptions.snapshot(subscriber_id);
        subscription.dunning = match step {
            1..=3 => DunningState::PastDue { failed_at, step },
            4..=5 => DunningState::Restricted {
                failed_at,
                step,
                restricted_at: failed_at + Duration::days(7),
            },
            _ => panic!("use the runner to reach step {}", step),
        };
        self.subscriptions.insert(subscription);
        subscriber_id
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        use strongbox_core::Clock;
        self.clock.now()
    }

    pub fn set_day(&self, day: i64) {
        self.clock.set(epoch() + Duration::days(day));
    }

    pub fn subscription(&self, subscriber_id: Uuid) -> Subscription {
        self.subscriptions.snapshot(subscriber_id)
    }
}
