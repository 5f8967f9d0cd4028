//! Repository, adapter and engine wiring

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use strongbox_core::{Config, LoggingNotifier, Notifier, SystemClock};
use strongbox_db::{
    BankConnectionRepository, DocumentRepository, DunningAuditRepository, SubscriptionRepository,
    UserRepository,
};
use strongbox_infra::{
    EmailNotifier, PlaidBankConnectionService, PlaidClient, StripePaymentProcessor,
};
use strongbox_services::{DunningCollaborators, DunningEngine, DunningScheduler, DunningSettings};

use crate::auth::jwt::JwtValidator;
use crate::state::{AppState, SecurityConfig};

/// Build the engine over Postgres and the external adapters, then start the
/// in-process scheduler when one is configured
pub fn initialize_services(config: &Config, pool: PgPool) -> Result<Arc<AppState>> {
    let timeout = Duration::from_secs(config.external_timeout_seconds());

    let payments = StripePaymentProcessor::new(
        config.stripe_api_base(),
        config.stripe_secret_key(),
        timeout,
    )?;
    let plaid = PlaidClient::new(
        config.plaid_api_base(),
        config.plaid_client_id(),
        config.plaid_secret(),
        timeout,
    )?;
    let bank_connections =
        PlaidBankConnectionService::new(plaid, BankConnectionRepository::new(pool.clone()));

    let notifier: Arc<dyn Notifier> =
        match EmailNotifier::from_config(config, UserRepository::new(pool.clone()))? {
            Some(email) => Arc::new(email),
            None => {
                tracing::info!("Dunning notifications will be logged only");
                Arc::new(LoggingNotifier)
            }
        };

    let engine = Arc::new(DunningEngine::new(
        DunningCollaborators {
            subscriptions: Arc::new(SubscriptionRepository::new(pool.clone())),
            audit_log: Arc::new(DunningAuditRepository::new(pool.clone())),
            documents: Arc::new(DocumentRepository::new(pool)),
            payments: Arc::new(payments),
            bank_connections: Arc::new(bank_connections),
            notifier,
            clock: Arc::new(SystemClock),
        },
        config.plan_catalog().clone(),
        DunningSettings::from_config(config),
    ));

    let interval_secs = config.dunning_schedule_interval_secs();
    if interval_secs > 0 {
        Arc::new(DunningScheduler::new(engine.clone(), interval_secs)).start();
        tracing::info!(interval_secs, "In-process dunning scheduler started");
    } else {
        tracing::info!("In-process dunning scheduler disabled; waiting for POST /dunning/run");
    }

    Ok(Arc::new(AppState {
        engine,
        security: SecurityConfig {
            cron_secret: config.dunning_cron_secret().to_string(),
            jwt: JwtValidator::new(config.jwt_secret()),
        },
    }))
}
