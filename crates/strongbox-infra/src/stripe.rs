//! Stripe payment processor adapter
//!
//! Talks to the Stripe REST API directly with reqwest. The base URL is
//! configurable so tests can point it at a local mock server.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use strongbox_core::{AppError, PaymentProcessor};

/// Open invoices settled per retry attempt
const MAX_OPEN_INVOICES: u32 = 10;

#[derive(Debug, Deserialize)]
struct InvoiceList {
    data: Vec<Invoice>,
}

#[derive(Debug, Deserialize)]
struct Invoice {
    id: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

/// Outcome of paying one invoice
#[derive(Debug, PartialEq, Eq)]
enum PayOutcome {
    Paid,
    Declined,
}

pub struct StripePaymentProcessor {
    http_client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl Debug for StripePaymentProcessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StripePaymentProcessor")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl StripePaymentProcessor {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for Stripe API")?;

        Ok(Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn list_open_invoices(&self, customer_id: &str) -> Result<Vec<Invoice>, AppError> {
        let url = format!("{}/v1/invoices", self.api_base);
        let limit = MAX_OPEN_INVOICES.to_string();
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .query(&[
                ("customer", customer_id),
                ("status", "open"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::PaymentProcessor(format!("Failed to list invoices: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error = read_error(response).await;
            return Err(AppError::PaymentProcessor(format!(
                "Listing invoices failed: {} - {}",
                status,
                error.message.unwrap_or_default()
            )));
        }

        let list: InvoiceList = response
            .json()
            .await
            .map_err(|e| AppError::PaymentProcessor(format!("Malformed invoice list: {}", e)))?;

        Ok(list.data)
    }

    async fn pay_invoice(&self, invoice_id: &str) -> Result<PayOutcome, AppError> {
        let url = format!("{}/v1/invoices/{}/pay", self.api_base, invoice_id);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::PaymentProcessor(format!("Failed to pay invoice: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let invoice: Invoice = response
                .json()
                .await
                .map_err(|e| AppError::PaymentProcessor(format!("Malformed invoice: {}", e)))?;
            return Ok(match invoice.status.as_deref() {
                Some("paid") => PayOutcome::Paid,
                _ => PayOutcome::Declined,
            });
        }

        let error = read_error(response).await;
        if status == StatusCode::PAYMENT_REQUIRED || error.kind.as_deref() == Some("card_error") {
            tracing::info!(
                invoice_id = %invoice_id,
                code = ?error.code,
                "Invoice payment declined"
            );
            return Ok(PayOutcome::Declined);
        }

        Err(AppError::PaymentProcessor(format!(
            "Paying invoice {} failed: {} - {}",
            invoice_id,
            status,
            error.message.unwrap_or_default()
        )))
    }
}

async fn read_error(response: reqwest::Response) -> StripeError {
    response
        .json::<StripeErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or(StripeError {
            kind: None,
            code: None,
            message: None,
        })
}

#[async_trait]
impl PaymentProcessor for StripePaymentProcessor {
    #[tracing::instrument(skip(self))]
    async fn retry_invoice(&self, customer_id: &str) -> Result<bool, AppError> {
        let invoices = self.list_open_invoices(customer_id).await?;
        if invoices.is_empty() {
            // Nothing open to charge; recovery is driven by an actual payment.
            tracing::info!(customer_id = %customer_id, "No open invoice to retry");
            return Ok(false);
        }

        for invoice in &invoices {
            if self.pay_invoice(&invoice.id).await? == PayOutcome::Declined {
                return Ok(false);
            }
        }

        tracing::info!(
            customer_id = %customer_id,
            invoices = invoices.len(),
            "Outstanding invoices paid"
        );
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), AppError> {
        let url = format!("{}/v1/subscriptions/{}", self.api_base, subscription_id);
        let response = self
            .http_client
            .delete(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                AppError::PaymentProcessor(format!("Failed to cancel subscription: {}", e))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error = read_error(response).await;
        let already_gone = status == StatusCode::NOT_FOUND
            || error.code.as_deref() == Some("resource_missing")
            || error
                .message
                .as_deref()
                .is_some_and(|m| m.contains("canceled"));
        if already_gone {
            tracing::debug!(subscription_id = %subscription_id, "Subscription already cancelled");
            return Ok(());
        }

        Err(AppError::PaymentProcessor(format!(
            "Cancelling subscription {} failed: {} - {}",
            subscription_id,
            status,
            error.message.unwrap_or_default()
        )))
    }
}
