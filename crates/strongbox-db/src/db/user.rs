use strongbox_core::models::UserContact;
use strongbox_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Read access to subscriber contact details
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "users", db.operation = "select", db.record_id = %id))]
    pub async fn get_contact(&self, id: Uuid) -> Result<Option<UserContact>, AppError> {
        let contact = sqlx::query_as::<Postgres, UserContact>(
            "SELECT id, email, display_name FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(contact)
    }
}
