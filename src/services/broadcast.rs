//! Fan-out helpers for the realtime channel.
//!
//! Payloads are snapshotted while the caller holds the room lock; delivery
//! goes through each connection's unbounded channel, so the lock is never
//! held across socket I/O — the per-connection writer task does the actual
//! send.

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    dto::{public::RoomStateView, ws::ServerMessage},
    state::RoomHandle,
    state::state_machine::RoundCue,
};

/// Serialize a payload and push it onto a connection's outbound channel.
///
/// Serialization failure is a bug, not a peer problem: it is logged and the
/// frame dropped. A closed channel means the peer is gone; the disconnect
/// path cleans the connection up, so that is ignored here.
pub fn send_message(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound message `{message:?}`");
            return;
        }
    };
    let _ = tx.send(Message::Text(payload.into()));
}

/// Deliver a message to every session attached to the room.
pub fn broadcast(handle: &RoomHandle, message: &ServerMessage) {
    for entry in handle.connections().iter() {
        send_message(&entry.value().tx, message);
    }
}

/// Deliver the full room snapshot to every session.
pub fn broadcast_state(handle: &RoomHandle, view: RoomStateView) {
    broadcast(handle, &ServerMessage::RoomState(view));
}

/// Wire shape of a one-shot round cue.
pub fn cue_message(cue: RoundCue, room_code: &str) -> ServerMessage {
    match cue {
        RoundCue::Beep => ServerMessage::Beep,
        RoundCue::Buzzed { team_id } => ServerMessage::Buzzed {
            team_id,
            room_code: room_code.to_string(),
        },
        RoundCue::TimeUp => ServerMessage::TimeUp,
        RoundCue::CorrectFx { team_id } => ServerMessage::CorrectFx { team_id },
    }
}
