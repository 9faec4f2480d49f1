use axum::{extract::State, http::header, response::IntoResponse};
use poolride_core::RideResult;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::AppError;
use crate::state::AppState;

/// Counters for lifecycle transitions, labelled by operation and outcome kind.
pub struct Metrics {
    registry: Registry,
    transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let transitions = IntCounterVec::new(
            Opts::new("poolride_transitions_total", "Ride lifecycle operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(transitions.clone()))?;
        Ok(Self { registry, transitions })
    }

    /// Count the result and hand it back unchanged.
    pub fn observe<T>(&self, operation: &str, result: RideResult<T>) -> RideResult<T> {
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind().as_str(),
        };
        self.transitions.with_label_values(&[operation, outcome]).inc();
        result
    }

    pub fn render(&self) -> Result<String, anyhow::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}
