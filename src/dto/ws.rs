use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::public::RoomStateView;
use crate::state::state_machine::BuzzRejectReason;

/// Kick reason reported when the host removes a team.
pub const KICK_REASON_REMOVED_BY_HOST: &str = "REMOVED_BY_HOST";

/// Messages accepted from clients over the realtime channel.
///
/// Every frame is a JSON object tagged with `event`; unknown events fail
/// deserialization and are answered with `errorMsg`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// First message of every session: bind to a room, optionally proving
    /// host role or presenting a stable player identity.
    JoinRoom {
        room_code: String,
        #[serde(default)]
        host_key: Option<String>,
        #[serde(default)]
        player_id: Option<String>,
    },
    /// Reconnect shorthand carrying no host key.
    RejoinRoom {
        room_code: String,
        #[serde(default)]
        player_id: Option<String>,
    },
    SetTeam {
        team_id: String,
    },
    SetTeamName {
        name: String,
    },
    PlayerFocus {
        focused: bool,
    },
    Buzz,
    /// Client-flagged pre-beep press; the server treats it like a lobby buzz.
    FalseStartAttempt,
    HostSetTeamCount {
        count: i64,
    },
    HostSetDuration {
        seconds: f64,
    },
    HostNextRound,
    HostBeepStart,
    HostPauseTimer,
    HostCorrect,
    HostIncorrect,
    HostAdjustScore {
        team_id: String,
        delta: i64,
    },
    HostSetFairPlay {
        enabled: bool,
    },
    HostUnblockFocus {
        team_id: String,
    },
    HostRemoveTeam {
        team_id: String,
    },
    HostEndRound,
}

impl ClientMessage {
    /// Parse a raw text frame into a command.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Whether this command requires host authority.
    pub fn requires_host(&self) -> bool {
        matches!(
            self,
            ClientMessage::HostSetTeamCount { .. }
                | ClientMessage::HostSetDuration { .. }
                | ClientMessage::HostNextRound
                | ClientMessage::HostBeepStart
                | ClientMessage::HostPauseTimer
                | ClientMessage::HostCorrect
                | ClientMessage::HostIncorrect
                | ClientMessage::HostAdjustScore { .. }
                | ClientMessage::HostSetFairPlay { .. }
                | ClientMessage::HostUnblockFocus { .. }
                | ClientMessage::HostRemoveTeam { .. }
                | ClientMessage::HostEndRound
        )
    }
}

/// Messages emitted to clients over the realtime channel.
///
/// `RoomState` is the full snapshot re-sent after every mutating transition;
/// the rest are one-shot cues and acknowledgements.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    JoinedRoom {
        room_code: String,
        is_host: bool,
    },
    /// Confirms or restores team ownership for the receiving session.
    TeamSet {
        team_id: String,
        locked: bool,
    },
    RoomState(RoomStateView),
    Beep,
    Buzzed {
        team_id: String,
        room_code: String,
    },
    BuzzRejected {
        reason: BuzzRejectReason,
    },
    TimeUp,
    CorrectFx {
        team_id: String,
    },
    /// The recipient must detach; it cannot rejoin this room.
    Kicked {
        room_code: String,
        reason: String,
    },
    ErrorMsg {
        message: String,
    },
}
