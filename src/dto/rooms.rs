use serde::Serialize;
use utoipa::ToSchema;

/// Response handed to a presenter creating a room.
///
/// The host key appears here and nowhere else; the creating client must keep
/// it to prove host role on the realtime channel.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    /// Four-character join code.
    pub room_code: String,
    /// Opaque 24-character host secret.
    pub host_key: String,
}

/// Lightweight existence probe for the join flow.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfoResponse {
    pub room_code: String,
    /// Currently connected sessions (best-effort).
    pub members_count: usize,
}
