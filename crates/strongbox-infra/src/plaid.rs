//! Plaid bank connection adapter
//!
//! `PlaidClient` wraps the HTTP calls; `PlaidBankConnectionService` combines it
//! with the `bank_connections` table so the dunning engine can list and revoke
//! a subscriber's links by id.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;
use uuid::Uuid;

use strongbox_core::{AppError, BankConnectionService};
use strongbox_db::BankConnectionRepository;

#[derive(Debug, Deserialize)]
struct PlaidErrorBody {
    error_code: Option<String>,
    error_message: Option<String>,
}

/// Plaid error codes meaning the item no longer exists upstream
fn is_already_removed(error_code: Option<&str>) -> bool {
    matches!(
        error_code,
        Some("ITEM_NOT_FOUND") | Some("INVALID_ACCESS_TOKEN")
    )
}

pub struct PlaidClient {
    http_client: reqwest::Client,
    api_base: String,
    client_id: String,
    secret: String,
}

impl Debug for PlaidClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PlaidClient")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl PlaidClient {
    pub fn new(
        api_base: impl Into<String>,
        client_id: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for Plaid API")?;

        Ok(Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            secret: secret.into(),
        })
    }

    /// Revoke an item. An item Plaid no longer knows about counts as removed.
    pub async fn remove_item(&self, access_token: &str) -> Result<(), AppError> {
        let url = format!("{}/item/remove", self.api_base);
        let response = self
            .http_client
            .post(&url)
            .json(&json!({
                "client_id": self.client_id,
                "secret": self.secret,
                "access_token": access_token,
            }))
            .send()
            .await
            .map_err(|e| AppError::BankConnection(format!("Failed to remove item: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.json::<PlaidErrorBody>().await.ok();
        let error_code = body.as_ref().and_then(|b| b.error_code.as_deref());
        if is_already_removed(error_code) {
            tracing::debug!(error_code = ?error_code, "Plaid item already removed");
            return Ok(());
        }

        Err(AppError::BankConnection(format!(
            "Removing item failed: {} - {}",
            status,
            body.and_then(|b| b.error_message).unwrap_or_default()
        )))
    }
}

/// Bank connections backed by Plaid and the local `bank_connections` table
pub struct PlaidBankConnectionService {
    client: PlaidClient,
    repository: BankConnectionRepository,
}

impl PlaidBankConnectionService {
    pub fn new(client: PlaidClient, repository: BankConnectionRepository) -> Self {
        Self { client, repository }
    }
}

#[async_trait]
impl BankConnectionService for PlaidBankConnectionService {
    async fn list_connections(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let connections = self.repository.list_active(user_id).await?;
        Ok(connections.into_iter().map(|c| c.id.to_string()).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn disconnect(&self, connection_id: &str) -> Result<(), AppError> {
        let id = Uuid::parse_str(connection_id)?;
        let Some(connection) = self.repository.get(id).await? else {
            tracing::debug!(connection_id = %connection_id, "Bank connection not found");
            return Ok(());
        };
        if !connection.is_active() {
            return Ok(());
        }

        self.client.remove_item(&connection.access_token).await?;
        self.repository.mark_disconnected(id).await?;

        tracing::info!(
            connection_id = %connection_id,
            subscriber_id = %connection.subscriber_id,
            "Bank connection disconnected"
        );
        Ok(())
    }
}
