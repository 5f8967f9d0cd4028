use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A linked bank (open-banking item) owned by a subscriber
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BankConnection {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub item_id: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub institution_name: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
}

impl BankConnection {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}
