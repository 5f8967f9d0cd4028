//! Configuration module
//!
//! This module provides configuration structures for the API and the dunning
//! engine, including database, authentication, payment processor, bank
//! connection, email and scheduling settings.

use std::env;

use crate::models::PlanCatalog;

// Common constants
const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const EXTERNAL_TIMEOUT_SECS: u64 = 30;
const DUNNING_MAX_CONCURRENCY: usize = 4;
const DUNNING_DELETION_GRACE_DAYS: i64 = 24;
const MIN_SECRET_LEN: usize = 32;
const STRIPE_API_BASE: &str = "https://api.stripe.com";
const PLAID_API_BASE: &str = "https://production.plaid.com";

/// Base configuration shared by every entry point
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub jwt_secret: String,
    pub environment: String,
    pub log_format: String,
}

/// Billing service configuration
#[derive(Clone, Debug)]
pub struct BillingConfig {
    pub base: BaseConfig,
    pub database_url: String,
    // Shared secret for scheduler-facing endpoints
    pub dunning_cron_secret: String,
    // Payment processor
    pub stripe_secret_key: String,
    pub stripe_api_base: String,
    // Bank connections
    pub plaid_client_id: String,
    pub plaid_secret: String,
    pub plaid_api_base: String,
    pub external_timeout_seconds: u64,
    // Email notifications
    pub email_notifications_enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_tls: bool,
    pub frontend_url: Option<String>,
    // Dunning engine
    /// Interval between in-process runner invocations. 0 = rely on the external scheduler.
    pub dunning_schedule_interval_secs: u64,
    pub dunning_max_concurrency: usize,
    pub dunning_deletion_grace_days: i64,
    pub plan_catalog: PlanCatalog,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<BillingConfig>);

impl Config {
    fn as_billing(&self) -> &BillingConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        is_production_name(&self.as_billing().base.environment)
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = BillingConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_billing().validate()
    }

    // Convenience getters for common fields
    pub fn server_port(&self) -> u16 {
        self.as_billing().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_billing().base.cors_origins
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_billing().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_billing().base.db_timeout_seconds
    }

    pub fn jwt_secret(&self) -> &str {
        &self.as_billing().base.jwt_secret
    }

    pub fn environment(&self) -> &str {
        &self.as_billing().base.environment
    }

    pub fn log_format(&self) -> &str {
        &self.as_billing().base.log_format
    }

    pub fn database_url(&self) -> &str {
        &self.as_billing().database_url
    }

    pub fn dunning_cron_secret(&self) -> &str {
        &self.as_billing().dunning_cron_secret
    }

    pub fn stripe_secret_key(&self) -> &str {
        &self.as_billing().stripe_secret_key
    }

    pub fn stripe_api_base(&self) -> &str {
        &self.as_billing().stripe_api_base
    }

    pub fn plaid_client_id(&self) -> &str {
        &self.as_billing().plaid_client_id
    }

    pub fn plaid_secret(&self) -> &str {
        &self.as_billing().plaid_secret
    }

    pub fn plaid_api_base(&self) -> &str {
        &self.as_billing().plaid_api_base
    }

    pub fn external_timeout_seconds(&self) -> u64 {
        self.as_billing().external_timeout_seconds
    }

    pub fn email_notifications_enabled(&self) -> bool {
        self.as_billing().email_notifications_enabled
    }

    pub fn smtp_host(&self) -> Option<&str> {
        self.as_billing().smtp_host.as_deref()
    }

    pub fn smtp_port(&self) -> Option<u16> {
        self.as_billing().smtp_port
    }

    pub fn smtp_user(&self) -> Option<&str> {
        self.as_billing().smtp_user.as_deref()
    }

    pub fn smtp_password(&self) -> Option<&str> {
        self.as_billing().smtp_password.as_deref()
    }

    pub fn smtp_from(&self) -> Option<&str> {
        self.as_billing().smtp_from.as_deref()
    }

    pub fn smtp_tls(&self) -> bool {
        self.as_billing().smtp_tls
    }

    pub fn frontend_url(&self) -> Option<&str> {
        self.as_billing().frontend_url.as_deref()
    }

    pub fn dunning_schedule_interval_secs(&self) -> u64 {
        self.as_billing().dunning_schedule_interval_secs
    }

    pub fn dunning_max_concurrency(&self) -> usize {
        self.as_billing().dunning_max_concurrency
    }

    pub fn dunning_deletion_grace_days(&self) -> i64 {
        self.as_billing().dunning_deletion_grace_days
    }

    pub fn plan_catalog(&self) -> &PlanCatalog {
        &self.as_billing().plan_catalog
    }
}

fn is_production_name(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    value
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the process environment in production).
    pub fn from_source<F>(get: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str, why: &str| {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{} must be set {}", key, why))
        };

        let environment = get("ENVIRONMENT")
            .or_else(|| get("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let cors_origins_str = get("CORS_ORIGINS").unwrap_or_else(|| "*".to_string());
        if is_production_name(&environment) && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let server_port = match get("PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            None => SERVER_PORT,
        };

        let base = BaseConfig {
            server_port,
            cors_origins,
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), MAX_CONNECTIONS),
            db_timeout_seconds: parse_or(get("DB_TIMEOUT_SECONDS"), CONNECTION_TIMEOUT_SECS),
            jwt_secret: required("JWT_SECRET", "for subscriber authentication")?,
            environment,
            log_format: get("LOG_FORMAT")
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_else(|| "text".to_string()),
        };

        let plan_catalog = match get("PLAN_CATALOG_JSON") {
            Some(json) if !json.trim().is_empty() => PlanCatalog::from_json(&json)?,
            _ => PlanCatalog::default(),
        };

        Ok(Self {
            base,
            database_url: required("DATABASE_URL", "to a PostgreSQL connection string")?,
            dunning_cron_secret: required(
                "DUNNING_CRON_SECRET",
                "to authorize scheduler-triggered dunning runs",
            )?,
            stripe_secret_key: required("STRIPE_SECRET_KEY", "for payment retries")?,
            stripe_api_base: get("STRIPE_API_BASE").unwrap_or_else(|| STRIPE_API_BASE.to_string()),
            plaid_client_id: required("PLAID_CLIENT_ID", "for bank connection management")?,
            plaid_secret: required("PLAID_SECRET", "for bank connection management")?,
            plaid_api_base: get("PLAID_API_BASE").unwrap_or_else(|| PLAID_API_BASE.to_string()),
            external_timeout_seconds: parse_or(
                get("EXTERNAL_TIMEOUT_SECONDS"),
                EXTERNAL_TIMEOUT_SECS,
            ),
            email_notifications_enabled: parse_bool(get("EMAIL_NOTIFICATIONS_ENABLED"), false),
            smtp_host: get("SMTP_HOST"),
            smtp_port: get("SMTP_PORT").and_then(|p| p.trim().parse().ok()),
            smtp_user: get("SMTP_USER"),
            smtp_password: get("SMTP_PASSWORD"),
            smtp_from: get("SMTP_FROM"),
            smtp_tls: parse_bool(get("SMTP_TLS"), true),
            frontend_url: get("FRONTEND_URL"),
            dunning_schedule_interval_secs: parse_or(get("DUNNING_SCHEDULE_INTERVAL_SECS"), 0),
            dunning_max_concurrency: parse_or(
                get("DUNNING_MAX_CONCURRENCY"),
                DUNNING_MAX_CONCURRENCY,
            ),
            dunning_deletion_grace_days: parse_or(
                get("DUNNING_DELETION_GRACE_DAYS"),
                DUNNING_DELETION_GRACE_DAYS,
            ),
            plan_catalog,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.base.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long"
            ));
        }

        if self.dunning_cron_secret.len() < MIN_SECRET_LEN {
            return Err(anyhow::anyhow!(
                "DUNNING_CRON_SECRET must be at least 32 characters long"
            ));
        }

        if !(self.database_url.starts_with("postgresql://")
            || self.database_url.starts_with("postgres://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.email_notifications_enabled
            && (self.smtp_host.is_none() || self.smtp_from.is_none())
        {
            return Err(anyhow::anyhow!(
                "EMAIL_NOTIFICATIONS_ENABLED=true requires SMTP_HOST and SMTP_FROM to be set"
            ));
        }

        if self.dunning_max_concurrency == 0 {
            return Err(anyhow::anyhow!("DUNNING_MAX_CONCURRENCY must be at least 1"));
        }

        if self.dunning_deletion_grace_days < 1 {
            return Err(anyhow::anyhow!(
                "DUNNING_DELETION_GRACE_DAYS must be at least 1"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("DATABASE_URL", "postgresql://localhost/strongbox".to_string()),
            ("JWT_SECRET", "j".repeat(40)),
            ("DUNNING_CRON_SECRET", "c".repeat(40)),
            ("STRIPE_SECRET_KEY", "sk_test_123".to_string()),
            ("PLAID_CLIENT_ID", "client".to_string()),
            ("PLAID_SECRET", "secret".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<BillingConfig, anyhow::Error> {
        BillingConfig::from_source(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_are_applied() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.base.server_port, 4000);
        assert_eq!(config.dunning_schedule_interval_secs, 0);
        assert_eq!(config.dunning_max_concurrency, 4);
        assert_eq!(config.dunning_deletion_grace_days, 24);
        assert_eq!(config.stripe_api_base, "https://api.stripe.com");
        assert!(!config.email_notifications_enabled);
        assert_eq!(config.plan_catalog, PlanCatalog::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_processor_credentials_is_fatal() {
        let mut env = base_env();
        env.remove("STRIPE_SECRET_KEY");
        let err = load(&env).unwrap_err();
        assert!(err.to_string().contains("STRIPE_SECRET_KEY"));
    }

    #[test]
    fn test_short_cron_secret_fails_validation() {
        let mut env = base_env();
        env.insert("DUNNING_CRON_SECRET", "short".to_string());
        let config = load(&env).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wildcard_cors_rejected_in_production() {
        let mut env = base_env();
        env.insert("ENVIRONMENT", "production".to_string());
        assert!(load(&env).is_err());
        env.insert("CORS_ORIGINS", "https://app.example.com".to_string());
        assert!(load(&env).is_ok());
    }

    #[test]
    fn test_email_enabled_requires_smtp() {
        let mut env = base_env();
        env.insert("EMAIL_NOTIFICATIONS_ENABLED", "true".to_string());
        let config = load(&env).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plan_catalog_override() {
        let mut env = base_env();
        env.insert(
            "PLAN_CATALOG_JSON",
            r#"[{"plan":"free","document_limit":3,"bank_connection_limit":0,"monthly_chat_quota":0,
                "features":{"bank_sync":false,"ai_chat":false,"document_health":false,"priority_support":false}}]"#
                .to_string(),
        );
        let config = load(&env).unwrap();
        assert_eq!(config.plan_catalog.free_document_limit(), 3);
    }
}
