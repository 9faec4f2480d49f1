use anyhow::Context;
use poolride_api::{app, metrics::Metrics, state::{AppState, AuthConfig}};
use poolride_core::identity::SubjectUuidDirectory;
use poolride_core::{Notifier, UserDirectory};
use poolride_ride::{OtpGate, OtpPolicy, RetryPolicy, RideOrchestrator};
use poolride_shared::Masked;
use poolride_store::app_config::Config;
use poolride_store::{DbClient, PgRideStore, PgUserDirectory, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poolride_api=debug,poolride_ride=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting poolride API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let redis = match &config.redis.url {
        Some(url) => match RedisClient::new(url).await {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, rate limiting disabled");
                None
            }
        },
        None => None,
    };

    let directory: Arc<dyn UserDirectory> = if config.auth.subject_is_user_id {
        Arc::new(SubjectUuidDirectory)
    } else {
        Arc::new(PgUserDirectory::new(db.pool.clone()))
    };

    let gate = OtpGate::new(OtpPolicy {
        code_length: config.booking.otp.code_length,
        test_code: config.booking.otp.test_code.clone().map(Masked::new),
    });
    let retry = RetryPolicy {
        max_attempts: config.booking.max_conflict_retries + 1,
        backoff: config.booking.conflict_backoff(),
    };
    let store = PgRideStore::new(db.pool.clone(), config.booking.lock_timeout());
    let rides = RideOrchestrator::new(Arc::new(store), build_notifier(&config)?, gate, retry);

    let app_state = AppState {
        rides: Arc::new(rides),
        directory,
        redis,
        requests_per_minute: config.rate_limit.requests_per_minute,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        metrics: Arc::new(Metrics::new().context("Failed to register metrics")?),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app(app_state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    if let Some(brokers) = &config.kafka.brokers {
        let producer = poolride_store::EventProducer::new(brokers).context("Failed to create Kafka producer")?;
        tracing::info!(topic = %config.kafka.topic, "Publishing notifications to Kafka");
        return Ok(Arc::new(poolride_store::KafkaNotifier::new(producer, config.kafka.topic.clone())));
    }
    Ok(Arc::new(poolride_core::notify::LogNotifier))
}

#[cfg(not(feature = "kafka"))]
fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    if config.kafka.brokers.is_some() {
        tracing::warn!("kafka.brokers is set but the kafka feature is disabled; logging notifications");
    }
    Ok(Arc::new(poolride_core::notify::LogNotifier))
}
