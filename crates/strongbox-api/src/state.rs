//! Application state shared by every handler.

use std::fmt;
use std::sync::Arc;

use strongbox_services::DunningEngine;

use crate::auth::jwt::JwtValidator;

/// Secrets used by the authentication middleware
#[derive(Clone)]
pub struct SecurityConfig {
    /// Shared bearer secret for scheduler-triggered endpoints
    pub cron_secret: String,
    pub jwt: JwtValidator,
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("cron_secret", &"[REDACTED]")
            .field("jwt", &self.jwt)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DunningEngine>,
    pub security: SecurityConfig,
}
