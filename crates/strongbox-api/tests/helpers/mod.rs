//! Test helpers: build AppState and router over in-memory collaborators.
//!
//! Run from workspace root: `cargo test -p strongbox-api`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use strongbox_api::auth::jwt::JwtValidator;
use strongbox_api::auth::models::SubscriberClaims;
use strongbox_api::setup::routes;
use strongbox_api::state::{AppState, SecurityConfig};
use strongbox_core::models::{
    DocumentSummary, DunningAuditEntry, DunningState, NotificationTemplate, PlanCatalog,
    Subscription, SubscriptionPlan,
};
use strongbox_core::{
    AppError, BankConnectionService, BillingConfig, Config, Notifier, PaymentProcessor,
    SystemClock,
};
use strongbox_db::{DocumentStore, DunningAuditLog, SubscriptionStore};
use strongbox_services::{DunningCollaborators, DunningEngine, DunningSettings};

pub const TEST_CRON_SECRET: &str = "test-cron-secret-at-least-32-characters-long";
pub const TEST_JWT_SECRET: &str = "test-jwt-secret-at-least-32-characters-long!";

#[derive(Default)]
pub struct Subscriptions {
    rows: Mutex<HashMap<Uuid, Subscription>>,
}

impl Subscriptions {
    pub fn get_row(&self, id: Uuid) -> Subscription {
        self.rows.lock().unwrap()[&id].clone()
    }
}

#[async_trait]
impl SubscriptionStore for Subscriptions {
    async fn get(&self, subscriber_id: Uuid) -> Result<Option<Subscription>, AppError> {
        Ok(self.rows.lock().unwrap().get(&subscriber_id).cloned())
    }

    async fn list_in_dunning(&self) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.in_dunning())
            .map(|s| s.subscriber_id)
            .collect())
    }

    async fn save_dunning(
        &self,
        subscription: &Subscription,
        expected_step: u8,
    ) -> Result<(), AppError> {
        let mut rows = self.rows.lock().unwrap();
        let stored = rows
            .get_mut(&subscription.subscriber_id)
            .ok_or_else(|| AppError::NotFound("subscription".to_string()))?;
        if stored.dunning_step() != expected_step {
            return Err(AppError::StaleDunningState {
                subscriber_id: subscription.subscriber_id,
                expected_step,
                actual_step: stored.dunning_step(),
            });
        }
        let chat_messages_used = stored.chat_messages_used;
        *stored = subscription.clone();
        stored.chat_messages_used = chat_messages_used;
        Ok(())
    }
}

#[derive(Default)]
pub struct AuditLog {
    entries: Mutex<Vec<DunningAuditEntry>>,
}

#[async_trait]
impl DunningAuditLog for AuditLog {
    async fn append(&self, entry: DunningAuditEntry) -> Result<(), AppError> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    async fn list_for_subscriber(
        &self,
        subscriber_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DunningAuditEntry>, AppError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|e| e.subscriber_id == subscriber_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Vault with no documents
pub struct EmptyVault;

#[async_trait]
impl DocumentStore for EmptyVault {
    async fn count(&self, _subscriber_id: Uuid) -> Result<i64, AppError> {
        Ok(0)
    }

    async fn list_oldest_first(
        &self,
        _subscriber_id: Uuid,
        _limit: i64,
    ) -> Result<Vec<DocumentSummary>, AppError> {
        Ok(Vec::new())
    }

    async fn delete_many(&self, _subscriber_id: Uuid, _ids: &[Uuid]) -> Result<u64, AppError> {
        Ok(0)
    }
}

#[derive(Default)]
pub struct Payments {
    pub succeed: AtomicBool,
}

#[async_trait]
impl PaymentProcessor for Payments {
    async fn retry_invoice(&self, _customer_id: &str) -> Result<bool, AppError> {
        Ok(self.succeed.load(Ordering::SeqCst))
    }

    async fn cancel_subscription(&self, _subscription_id: &str) -> Result<(), AppError> {
        Ok(())
    }
}

pub struct NoBanks;

#[async_trait]
impl BankConnectionService for NoBanks {
    async fn list_connections(&self, _user_id: Uuid) -> Result<Vec<String>, AppError> {
        Ok(Vec::new())
    }

    async fn disconnect(&self, _connection_id: &str) -> Result<(), AppError> {
        Ok(())
    }
}

pub struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn send(
        &self,
        _user_id: Uuid,
        _template: NotificationTemplate,
        _data: serde_json::Value,
    ) -> Result<(), AppError> {
        Ok(())
    }
}

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("JWT_SECRET", TEST_JWT_SECRET),
        ("DUNNING_CRON_SECRET", TEST_CRON_SECRET),
        ("DATABASE_URL", "postgres://localhost/strongbox_test"),
        ("STRIPE_SECRET_KEY", "sk_test_123"),
        ("PLAID_CLIENT_ID", "client"),
        ("PLAID_SECRET", "secret"),
    ]);
    let billing = BillingConfig::from_source(|key| vars.get(key).map(|v| v.to_string()))
        .expect("test config");
    Config(Box::new(billing))
}

/// Test application: server plus handles on the fakes behind it.
pub struct TestApp {
    pub server: TestServer,
    pub subscriptions: Arc<Subscriptions>,
    pub payments: Arc<Payments>,
    pub catalog: PlanCatalog,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Paying subscriber; `failed_days_ago` puts them at step 1 of dunning
    pub fn add_subscriber(&self, plan: SubscriptionPlan, failed_days_ago: Option<i64>) -> Uuid {
        let subscriber_id = Uuid::new_v4();
        let now = Utc::now();
        let dunning = match failed_days_ago {
            Some(days) => DunningState::PastDue {
                failed_at: now - Duration::days(days),
                step: 1,
            },
            None => DunningState::Active,
        };
        self.subscriptions.rows.lock().unwrap().insert(
            subscriber_id,
            Subscription {
                subscriber_id,
                plan,
                dunning,
                entitlements: self.catalog.entitlements(plan),
                chat_messages_used: 0,
                external_customer_id: Some("cus_test".to_string()),
                external_subscription_id: Some("sub_test".to_string()),
                created_at: now - Duration::days(90),
                updated_at: now - Duration::days(90),
            },
        );
        subscriber_id
    }
}

pub fn setup_test_app() -> TestApp {
    let config = test_config();
    let subscriptions = Arc::new(Subscriptions::default());
    let payments = Arc::new(Payments::default());
    let catalog = PlanCatalog::default();

    let engine = Arc::new(DunningEngine::new(
        DunningCollaborators {
            subscriptions: subscriptions.clone(),
            audit_log: Arc::new(AuditLog::default()),
            documents: Arc::new(EmptyVault),
            payments: payments.clone(),
            bank_connections: Arc::new(NoBanks),
            notifier: Arc::new(SilentNotifier),
            clock: Arc::new(SystemClock),
        },
        catalog.clone(),
        DunningSettings::default(),
    ));

    let state = Arc::new(AppState {
        engine,
        security: SecurityConfig {
            cron_secret: TEST_CRON_SECRET.to_string(),
            jwt: JwtValidator::new(TEST_JWT_SECRET),
        },
    });
    let router = routes::setup_routes(&config, state).expect("router");

    TestApp {
        server: TestServer::new(router).expect("test server"),
        subscriptions,
        payments,
        catalog,
    }
}

/// Signed subscriber token valid for an hour
pub fn subscriber_token(subscriber_id: Uuid) -> String {
    let now = Utc::now().timestamp();
    let claims = SubscriberClaims {
        sub: subscriber_id,
        exp: now + 3600,
        iat: now,
        nbf: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("encode token")
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
