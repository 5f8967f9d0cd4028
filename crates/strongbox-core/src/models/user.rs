use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery details for subscriber notifications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UserContact {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
}
