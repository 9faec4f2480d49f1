use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use poolride_core::{BookingRequest, RequestAction};
use poolride_ride::OtpCodes;
use poolride_shared::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Caller;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub action: RequestAction,
}

/// Codes are included only for accepted requests.
#[derive(Debug, Serialize)]
pub struct RespondResponse {
    pub request: BookingRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_code: Option<Masked<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_code: Option<Masked<String>>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/requests/{request_id}", get(get_request))
        .route("/v1/requests/{request_id}/respond", post(respond_to_request))
        .route("/v1/requests/{request_id}/cancel", post(cancel_request))
        .route("/v1/requests/{request_id}/codes", get(booking_codes))
}

async fn get_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<BookingRequest>, AppError> {
    Ok(Json(state.rides.get_request(caller.user_id, request_id).await?))
}

async fn respond_to_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<RespondBody>,
) -> Result<Json<RespondResponse>, AppError> {
    let outcome = state.metrics.observe(
        "respond_to_request",
        state.rides.respond_to_request(caller.user_id, request_id, body.action).await,
    )?;

    let (pickup_code, drop_code) = match outcome.codes {
        Some(codes) => (Some(codes.pickup_code), Some(codes.drop_code)),
        None => (None, None),
    };
    Ok(Json(RespondResponse { request: outcome.request, pickup_code, drop_code }))
}

async fn cancel_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<BookingRequest>, AppError> {
    let request = state.metrics.observe(
        "cancel_request",
        state.rides.cancel_request(caller.user_id, request_id).await,
    )?;
    Ok(Json(request))
}

async fn booking_codes(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<OtpCodes>, AppError> {
    Ok(Json(state.rides.booking_codes(caller.user_id, request_id).await?))
}
