pub mod app_config;
pub mod database;
pub mod ride_repo;
pub mod user_repo;
pub mod redis_repo;
#[cfg(feature = "kafka")]
pub mod events;

pub use database::DbClient;
pub use redis_repo::RedisClient;
pub use ride_repo::PgRideStore;
pub use user_repo::PgUserDirectory;
#[cfg(feature = "kafka")]
pub use events::{EventProducer, KafkaNotifier};
