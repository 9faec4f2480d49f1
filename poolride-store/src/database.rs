use poolride_core::RideError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Translate a driver error into the lifecycle error space.
pub(crate) fn store_error(err: sqlx::Error) -> RideError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            if let Some(mapped) = classify_sqlstate(&code, db.constraint(), db.message()) {
                return mapped;
            }
        }
    }
    RideError::Store(err.to_string())
}

/// Lock waits, serialization failures and deadlocks are retryable; unique
/// violations mean the row already exists in an active form.
pub(crate) fn classify_sqlstate(code: &str, constraint: Option<&str>, message: &str) -> Option<RideError> {
    match code {
        "40001" | "40P01" | "55P03" => Some(RideError::Conflict(message.to_string())),
        "23505" => Some(RideError::InvalidState(match constraint {
            Some("booking_requests_one_active_per_passenger") => {
                "passenger already has an active request on this ride".to_string()
            }
            Some(name) => format!("duplicate record violates {}", name),
            None => "duplicate record".to_string(),
        })),
        _ => None,
    }
}
