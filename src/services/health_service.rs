use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the liveness payload and the current registry size.
pub fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(state.rooms().len())
}
