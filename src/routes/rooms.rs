use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use tracing::info;

use crate::{
    dto::{
        rooms::{CreateRoomResponse, RoomInfoResponse},
        validation::validate_room_code,
    },
    error::AppError,
    state::SharedState,
};

/// Configure the rooms API subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/api/rooms/create", get(create_room))
        .route("/api/rooms/{code}", get(room_info))
}

#[utoipa::path(
    get,
    path = "/api/rooms/create",
    tag = "rooms",
    responses((status = 200, description = "Room created", body = CreateRoomResponse))
)]
/// Create a fresh room and hand the caller its code and host secret.
pub async fn create_room(State(state): State<SharedState>) -> Json<CreateRoomResponse> {
    let (room_code, host_key) = state.create_room(Instant::now());
    info!(room = %room_code, "room created");
    Json(CreateRoomResponse {
        room_code,
        host_key,
    })
}

#[utoipa::path(
    get,
    path = "/api/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code to probe")),
    responses(
        (status = 200, description = "Room exists", body = RoomInfoResponse),
        (status = 404, description = "Unknown room code")
    )
)]
/// Existence probe used by the join flow before opening the realtime channel.
pub async fn room_info(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<RoomInfoResponse>, AppError> {
    let normalized = code.trim().to_ascii_uppercase();
    validate_room_code(&normalized).map_err(|err| AppError::BadRequest(err.to_string()))?;

    let Some(handle) = state.room(&normalized) else {
        return Err(AppError::NotFound(format!(
            "Room {normalized} does not exist"
        )));
    };

    Ok(Json(RoomInfoResponse {
        room_code: handle.code().to_string(),
        members_count: handle.members_count(),
    }))
}
