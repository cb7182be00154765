/// Realtime fan-out helpers (snapshot-then-send).
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Registry garbage collection.
pub mod reaper;
/// Command validation and room mutation.
pub mod room_service;
/// The authoritative countdown ticker.
pub mod ticker;
/// WebSocket connection and message handling service.
pub mod websocket_service;
