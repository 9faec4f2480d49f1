use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use poolride_core::{BookingRequest, Ride, RideDraft, SeatAsk};
use poolride_ride::DropOutcome;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Caller;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CodeSubmission {
    pub code: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/rides", post(create_ride))
        .route("/v1/rides/{ride_id}", get(get_ride))
        .route("/v1/rides/{ride_id}/requests", post(submit_request).get(list_requests))
        .route("/v1/rides/{ride_id}/pickup", post(verify_pickup))
        .route("/v1/rides/{ride_id}/reached", post(mark_reached))
        .route("/v1/rides/{ride_id}/drop", post(verify_drop))
        .route("/v1/rides/{ride_id}/cancel", post(cancel_ride))
}

async fn create_ride(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(draft): Json<RideDraft>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    let ride = state
        .metrics
        .observe("create_ride", state.rides.create_ride(caller.user_id, draft).await)?;
    Ok((StatusCode::CREATED, Json(ride)))
}

async fn get_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.rides.get_ride(ride_id).await?))
}

async fn submit_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(ride_id): Path<Uuid>,
    Json(ask): Json<SeatAsk>,
) -> Result<(StatusCode, Json<BookingRequest>), AppError> {
    let request = state.metrics.observe(
        "submit_request",
        state.rides.submit_request(caller.user_id, ride_id, ask).await,
    )?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_requests(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Vec<BookingRequest>>, AppError> {
    Ok(Json(state.rides.list_requests(caller.user_id, ride_id).await?))
}

async fn verify_pickup(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(ride_id): Path<Uuid>,
    Json(body): Json<CodeSubmission>,
) -> Result<Json<Ride>, AppError> {
    let ride = state.metrics.observe(
        "verify_pickup",
        state.rides.verify_pickup(caller.user_id, ride_id, &body.code).await,
    )?;
    Ok(Json(ride))
}

async fn mark_reached(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = state
        .metrics
        .observe("mark_reached", state.rides.mark_reached(caller.user_id, ride_id).await)?;
    Ok(Json(ride))
}

async fn verify_drop(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(ride_id): Path<Uuid>,
    Json(body): Json<CodeSubmission>,
) -> Result<Json<DropOutcome>, AppError> {
    let outcome = state.metrics.observe(
        "verify_drop",
        state.rides.verify_drop(caller.user_id, ride_id, &body.code).await,
    )?;
    Ok(Json(outcome))
}

async fn cancel_ride(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = state
        .metrics
        .observe("cancel_ride", state.rides.cancel_ride(caller.user_id, ride_id).await)?;
    Ok(Json(ride))
}
