use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Minimal view of a vault document. The dunning engine never looks at content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DocumentSummary {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
