use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod metrics;
pub mod middleware;
pub mod requests;
pub mod rides;
pub mod state;

pub use state::AppState;

const RATE_LIMIT_WINDOW_SECONDS: i64 = 60;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let authenticated = Router::new()
        .merge(rides::routes())
        .merge(requests::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(authenticated)
        .route("/metrics", get(metrics::metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

/// Per-IP fixed window. Fails open when Redis errors, and is a no-op without
/// Redis or a peer address.
async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let (Some(redis), Some(ip)) = (state.redis.as_ref(), peer) else {
        return next.run(req).await;
    };

    let window = chrono::Utc::now().timestamp() / RATE_LIMIT_WINDOW_SECONDS;
    let key = poolride_store::redis_repo::rate_limit_key(&ip, window);

    match redis
        .check_rate_limit(&key, state.requests_per_minute, RATE_LIMIT_WINDOW_SECONDS)
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Rate limit exceeded", "kind": "rate_limited" })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Rate limiter unavailable, failing open");
            next.run(req).await
        }
    }
}
