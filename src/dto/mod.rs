/// Health check data structures.
pub mod health;
/// Public room snapshot broadcast to every subscriber.
pub mod public;
/// Room creation / lookup API data structures.
pub mod rooms;
/// Request validation utilities.
pub mod validation;
/// Realtime protocol message data structures.
pub mod ws;
