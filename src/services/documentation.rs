use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the ADABRA backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::room_info,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::rooms::CreateRoomResponse,
            crate::dto::rooms::RoomInfoResponse,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::public::RoomStateView,
            crate::dto::public::TeamView,
            crate::dto::public::TakenTeamView,
            crate::dto::public::LastBuzzView,
            crate::state::state_machine::Phase,
            crate::state::state_machine::BuzzRejectReason,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room creation and lookup"),
        (name = "realtime", description = "WebSocket channel for hosts, players, and displays"),
    )
)]
pub struct ApiDoc;
