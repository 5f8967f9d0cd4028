//! OpenAPI documentation.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error;
use crate::handlers;
use strongbox_core::models;

/// Registers the two bearer schemes referenced by the handlers
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "cron_secret",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
        components.add_security_scheme(
            "bearer_jwt",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Strongbox Billing API",
        version = "0.1.0",
        description = "Payment-failure escalation (dunning) for the Strongbox document vault. Scheduler endpoints take the shared cron secret; subscriber endpoints take a subscriber JWT.",
    ),
    paths(
        // Scheduler
        handlers::dunning::run_dunning,
        handlers::dunning::start_dunning,
        handlers::dunning::recover_subscriber,
        // Subscriber
        handlers::dunning::get_status,
        handlers::dunning::get_history,
        handlers::dunning::retry_payment,
        // Health
        handlers::health::liveness_check,
    ),
    components(
        schemas(
            models::DunningStatus,
            models::DunningAuditEntry,
            models::DunningAction,
            models::PaymentStatus,
            models::SubscriptionPlan,
            strongbox_services::RunSummary,
            handlers::dunning::StartDunningRequest,
            handlers::dunning::StartDunningResponse,
            handlers::dunning::RecoverRequest,
            handlers::dunning::RecoveryResponse,
            error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "dunning", description = "Payment-failure escalation: trigger, status, history and recovery"),
        (name = "health", description = "Service health checks")
    )
)]
pub struct ApiDoc;

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
