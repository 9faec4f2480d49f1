use async_trait::async_trait;
use poolride_core::UserDirectory;
use sqlx::PgPool;
use uuid::Uuid;

/// Resolves token subjects against `users.auth_subject`.
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn resolve(
        &self,
        subject: &str,
    ) -> Result<Option<Uuid>, Box<dyn std::error::Error + Send + Sync>> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE auth_subject = $1")
            .bind(subject)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }
}
