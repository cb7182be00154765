use serde::Serialize;
use utoipa::ToSchema;

use crate::state::room::{LastBuzz, Room, Team};
use crate::state::state_machine::Phase;

/// Snapshot of a team for the public view.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct TeamView {
    pub id: String,
    pub name: String,
    pub score: i32,
}

impl From<&Team> for TeamView {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id.clone(),
            name: team.name.clone(),
            score: team.score,
        }
    }
}

/// A claimed team slot and the player holding it.
#[derive(Debug, Serialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TakenTeamView {
    pub team_id: String,
    pub player_id: String,
}

/// The most recent accepted buzz of the current round.
#[derive(Debug, Serialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LastBuzzView {
    pub by: String,
    pub team_id: String,
}

impl From<&LastBuzz> for LastBuzzView {
    fn from(last: &LastBuzz) -> Self {
        Self {
            by: last.by.clone(),
            team_id: last.team_id.clone(),
        }
    }
}

/// Full public view of a room, broadcast after every mutating transition.
///
/// The host key is not representable here by construction. The lock holder is
/// exposed through the stable `lockedByPlayerId` rather than any
/// connection-scoped identifier.
#[derive(Debug, Serialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateView {
    pub room_code: String,
    pub members_count: usize,
    pub tables_chosen_count: usize,
    pub phase: Phase,
    pub round_number: u32,
    pub duration_ms: u64,
    pub remaining_ms: u64,
    pub timer_running: bool,
    pub time_up_at: Option<u64>,
    pub locked_by_player_id: Option<String>,
    pub locked_by_team_id: Option<String>,
    pub last_buzz: Option<LastBuzzView>,
    pub locked_out_teams: Vec<String>,
    pub teams: Vec<TeamView>,
    pub taken_teams: Vec<TakenTeamView>,
    pub team_name_locked: Vec<String>,
    pub first_buzz_team_id: Option<String>,
    pub game_over: bool,
    pub winner_team_id: Option<String>,
    pub winner_text: Option<String>,
    pub fair_play_enabled: bool,
    pub focus_locked_teams: Vec<String>,
    pub false_start_teams: Vec<String>,
}

impl RoomStateView {
    /// Build the snapshot under the room lock; `members_count` comes from the
    /// broadcast group, which is tracked outside the lock.
    pub fn from_room(room: &Room, members_count: usize) -> Self {
        Self {
            room_code: room.code.clone(),
            members_count,
            tables_chosen_count: room.team_taken.len(),
            phase: room.phase,
            round_number: room.round_number,
            duration_ms: room.duration_ms,
            remaining_ms: room.remaining_ms,
            timer_running: room.timer_running,
            time_up_at: room.time_up_at,
            locked_by_player_id: room.locked_by_player_id.clone(),
            locked_by_team_id: room.locked_by_team_id.clone(),
            last_buzz: room.last_buzz.as_ref().map(LastBuzzView::from),
            locked_out_teams: sorted(&room.locked_out_teams),
            teams: room.teams.values().map(TeamView::from).collect(),
            taken_teams: room
                .team_taken
                .iter()
                .map(|(team_id, player_id)| TakenTeamView {
                    team_id: team_id.clone(),
                    player_id: player_id.clone(),
                })
                .collect(),
            team_name_locked: sorted(&room.team_name_locked),
            first_buzz_team_id: room.first_buzz_team_id.clone(),
            game_over: room.game_over,
            winner_team_id: room.winner_team_id.clone(),
            winner_text: room.winner_text.clone(),
            fair_play_enabled: room.fair_play_enabled,
            focus_locked_teams: sorted(&room.focus_locked_teams),
            false_start_teams: sorted(&room.false_start_teams),
        }
    }
}

/// Deterministic wire order for set-backed fields.
fn sorted(set: &std::collections::HashSet<String>) -> Vec<String> {
    let mut items: Vec<String> = set.iter().cloned().collect();
    items.sort();
    items
}
