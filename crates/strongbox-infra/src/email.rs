//! Email notifier for dunning notifications via SMTP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use uuid::Uuid;

use strongbox_core::models::NotificationTemplate;
use strongbox_core::{AppError, Config, Notifier};
use strongbox_db::UserRepository;

/// Sends dunning notifications to the subscriber's account address
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    users: UserRepository,
    frontend_url: Option<String>,
}

impl EmailNotifier {
    /// Create the notifier from config. Returns `Ok(None)` if email is disabled.
    pub fn from_config(config: &Config, users: UserRepository) -> anyhow::Result<Option<Self>> {
        if !config.email_notifications_enabled() {
            tracing::debug!("Email notifications disabled (EMAIL_NOTIFICATIONS_ENABLED=false)");
            return Ok(None);
        }
        let host = config
            .smtp_host()
            .ok_or_else(|| anyhow::anyhow!("SMTP_HOST must be set"))?;
        let from: Mailbox = config
            .smtp_from()
            .ok_or_else(|| anyhow::anyhow!("SMTP_FROM must be set"))?
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid SMTP_FROM: {}", e))?;
        let port = config.smtp_port().unwrap_or(587);

        let builder = if config.smtp_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
        };
        let builder = if let (Some(u), Some(p)) = (config.smtp_user(), config.smtp_password()) {
            builder.credentials(Credentials::new(u.to_string(), p.to_string()))
        } else {
            builder
        };
        tracing::info!(
            host = %host,
            port = port,
            tls = config.smtp_tls(),
            "Email notifier initialized"
        );

        Ok(Some(Self {
            mailer: Arc::new(builder.build()),
            from,
            users,
            frontend_url: config.frontend_url().map(str::to_string),
        }))
    }
}

/// Plain-text body for a dunning email
pub fn render_body(
    template: NotificationTemplate,
    data: &serde_json::Value,
    frontend_url: Option<&str>,
) -> String {
    let count = |key: &str| data.get(key).and_then(|v| v.as_i64()).unwrap_or(0);
    let text = |key: &str| {
        data.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let mut body = match template {
        NotificationTemplate::FriendlyReminder => {
            "We couldn't process your latest subscription payment. Please check your payment method so your plan continues without interruption.".to_string()
        }
        NotificationTemplate::UrgentReminder => {
            "Your subscription payment is still outstanding. Please update your payment details.".to_string()
        }
        NotificationTemplate::FeatureLossCountdown => {
            "If payment isn't received soon, bank sync, AI chat and document health checks will be switched off.".to_string()
        }
        NotificationTemplate::AccessRestricted => format!(
            "Your vault access is now restricted. You have {} documents; the free plan allows {}.",
            count("document_count"),
            count("free_document_limit")
        ),
        NotificationTemplate::LastChance => {
            "This is the last reminder before your account is moved to the free plan.".to_string()
        }
        NotificationTemplate::ForcedDowngrade => format!(
            "Your account has been moved to the free plan and {} bank connection(s) were disconnected. Documents above the free limit will be deleted on {}.",
            count("bank_connections_disconnected"),
            text("deletion_date")
        ),
        NotificationTemplate::DeletionWarning => {
            let names: Vec<String> = data
                .get("documents")
                .and_then(|v| v.as_array())
                .map(|docs| {
                    docs.iter()
                        .filter_map(|d| d.get("name").and_then(|n| n.as_str()))
                        .map(|n| format!("  - {}", n))
                        .collect()
                })
                .unwrap_or_default();
            format!(
                "{} document(s) over the free plan limit will be deleted soon, oldest first:\n{}",
                count("excess_count"),
                names.join("\n")
            )
        }
        NotificationTemplate::DataDeleted => format!(
            "{} document(s) were deleted and {} bank connection(s) removed. Your account is now on the free plan.",
            count("documents_deleted"),
            count("bank_connections_disconnected")
        ),
        NotificationTemplate::PaymentRecovered => format!(
            "Thank you, your payment went through and your {} plan is fully restored.",
            text("plan")
        ),
    };

    if let Some(url) = frontend_url {
        body.push_str(&format!("\n\nManage billing: {}/settings/billing", url.trim_end_matches('/')));
    }
    body
}

#[async_trait]
impl Notifier for EmailNotifier {
    #[tracing::instrument(skip(self, data), fields(template = %template))]
    async fn send(
        &self,
        user_id: Uuid,
        template: NotificationTemplate,
        data: serde_json::Value,
    ) -> Result<(), AppError> {
        let contact = self
            .users
            .get_contact(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        let to: Mailbox = contact
            .email
            .parse()
            .map_err(|e| AppError::Notification(format!("Invalid recipient address: {}", e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(template.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(render_body(template, &data, self.frontend_url.as_deref()))
            .map_err(|e| AppError::Notification(e.to_string()))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| AppError::Notification(e.to_string()))?;

        tracing::info!(user_id = %user_id, "Dunning email sent");
        Ok(())
    }
}
