use std::collections::{HashMap, HashSet};
use std::time::Instant;

use indexmap::IndexMap;

use crate::state::state_machine::Phase;

/// Inclusive team-count bounds per room.
pub const MIN_TEAMS: usize = 2;
pub const MAX_TEAMS: usize = 6;

/// Round-length bounds in milliseconds.
pub const MIN_DURATION_MS: u64 = 1_000;
pub const MAX_DURATION_MS: u64 = 600_000;
/// Round length a fresh room starts with.
pub const DEFAULT_DURATION_MS: u64 = 15_000;

/// Largest score correction a host may apply in one command.
pub const MAX_SCORE_DELTA: i64 = 100;

/// A scoring unit owned by at most one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// Stable identifier, `"1"` through `"6"`.
    pub id: String,
    /// Display name; changeable once per room lifetime.
    pub name: String,
    /// Current score.
    pub score: i32,
}

impl Team {
    /// Default-named team for the given slot id.
    pub fn with_default_name(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: default_team_name(id),
            score: 0,
        }
    }
}

/// Name given to a team slot before (or after) any rename.
pub fn default_team_name(id: &str) -> String {
    format!("Team {id}")
}

/// The most recent accepted buzz in the current round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastBuzz {
    /// Player that pressed.
    pub by: String,
    /// Team the press counted for.
    pub team_id: String,
}

/// Everything the server knows about one game.
///
/// A `Room` is only ever touched under its owning [`RoomHandle`]'s mutex, so
/// the fields are plain data; all timing uses monotonic instants supplied by
/// the caller.
///
/// [`RoomHandle`]: crate::state::RoomHandle
#[derive(Debug)]
pub struct Room {
    pub code: String,
    /// Opaque secret proving host role. Never serialized into any view.
    pub host_key: String,
    pub created_at: Instant,
    pub last_activity_at: Instant,
    pub phase: Phase,
    pub round_number: u32,
    pub duration_ms: u64,
    pub remaining_ms: u64,
    pub timer_running: bool,
    pub timer_last_tick_at: Option<Instant>,
    /// Wall time (Unix ms) the current round expired, if it did.
    pub time_up_at: Option<u64>,
    /// Ordered team map keyed by team id.
    pub teams: IndexMap<String, Team>,
    /// Claimed teams: team id -> owning player id.
    pub team_taken: IndexMap<String, String>,
    /// Teams whose one-shot rename has been spent.
    pub team_name_locked: HashSet<String>,
    /// Player id -> team id; immutable once set, except via team removal.
    pub player_teams: HashMap<String, String>,
    /// Teams barred from buzzing for the rest of the current round.
    pub locked_out_teams: HashSet<String>,
    /// Subset of `locked_out_teams` that pressed during lobby.
    pub false_start_teams: HashSet<String>,
    /// Teams whose holder lost window focus while the round was live.
    pub focus_locked_teams: HashSet<String>,
    /// Players the host removed; they cannot rejoin.
    pub kicked_players: HashSet<String>,
    pub locked_by_player_id: Option<String>,
    pub locked_by_team_id: Option<String>,
    pub last_buzz: Option<LastBuzz>,
    /// First team to buzz in the current round, for displays.
    pub first_buzz_team_id: Option<String>,
    pub fair_play_enabled: bool,
    pub game_over: bool,
    pub winner_team_id: Option<String>,
    pub winner_text: Option<String>,
}

/// Result of removing a team slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRemoval {
    /// Player that owned the slot and is now barred from the room.
    pub kicked_player: Option<String>,
    /// True when the removed team held the answer lock and the round resumed.
    pub unlocked: bool,
}

impl Room {
    /// Fresh room in `lobby` with the two default teams.
    pub fn new(code: String, host_key: String, now: Instant) -> Self {
        let mut teams = IndexMap::new();
        for id in ["1", "2"] {
            teams.insert(id.to_string(), Team::with_default_name(id));
        }

        Self {
            code,
            host_key,
            created_at: now,
            last_activity_at: now,
            phase: Phase::Lobby,
            round_number: 1,
            duration_ms: DEFAULT_DURATION_MS,
            remaining_ms: DEFAULT_DURATION_MS,
            timer_running: false,
            timer_last_tick_at: None,
            time_up_at: None,
            teams,
            team_taken: IndexMap::new(),
            team_name_locked: HashSet::new(),
            player_teams: HashMap::new(),
            locked_out_teams: HashSet::new(),
            false_start_teams: HashSet::new(),
            focus_locked_teams: HashSet::new(),
            kicked_players: HashSet::new(),
            locked_by_player_id: None,
            locked_by_team_id: None,
            last_buzz: None,
            first_buzz_team_id: None,
            fair_play_enabled: true,
            game_over: false,
            winner_team_id: None,
            winner_text: None,
        }
    }

    /// Record activity for the idleness reaper.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity_at = now;
    }

    /// Team the player is bound to, if any.
    pub fn team_of(&self, player_id: &str) -> Option<&str> {
        self.player_teams.get(player_id).map(String::as_str)
    }

    /// Append the next default-named team slot and return its id.
    pub fn add_team(&mut self) -> String {
        let id = (self.teams.len() + 1).to_string();
        self.teams.insert(id.clone(), Team::with_default_name(&id));
        id
    }

    /// Start (or resume) the round clock from `now`.
    pub fn start_timer(&mut self, now: Instant) {
        self.timer_running = true;
        self.timer_last_tick_at = Some(now);
    }

    /// Stop the round clock, keeping `remaining_ms` where it is.
    pub fn stop_timer(&mut self) {
        self.timer_running = false;
        self.timer_last_tick_at = None;
    }

    /// Advance the round clock by the wall-clock delta since the last tick.
    ///
    /// Returns the new remaining time. Does nothing when the timer is stopped.
    pub fn advance_timer(&mut self, now: Instant) -> u64 {
        if self.timer_running {
            let last = self.timer_last_tick_at.unwrap_or(now);
            let delta = now.saturating_duration_since(last).as_millis() as u64;
            self.remaining_ms = self.remaining_ms.saturating_sub(delta);
            self.timer_last_tick_at = Some(now);
        }
        self.remaining_ms
    }

    /// Drop the answer lock fields.
    pub fn clear_lock(&mut self) {
        self.locked_by_player_id = None;
        self.locked_by_team_id = None;
    }

    /// Reset every per-round field for a fresh round. Scores, ownership, and
    /// the kick list survive.
    pub fn fresh_round(&mut self) {
        self.stop_timer();
        self.clear_lock();
        self.locked_out_teams.clear();
        self.false_start_teams.clear();
        self.focus_locked_teams.clear();
        self.last_buzz = None;
        self.first_buzz_team_id = None;
        self.time_up_at = None;
        self.remaining_ms = self.duration_ms;
    }

    /// Winner by max score: a single leader, or a tie list of names.
    pub fn compute_winner(&self) -> (Option<String>, Option<String>) {
        let Some(max) = self.teams.values().map(|team| team.score).max() else {
            return (None, None);
        };

        let leaders: Vec<&Team> = self
            .teams
            .values()
            .filter(|team| team.score == max)
            .collect();

        match leaders.as_slice() {
            [single] => (Some(single.id.clone()), None),
            tied => {
                let names: Vec<&str> = tied.iter().map(|team| team.name.as_str()).collect();
                (None, Some(names.join(", ")))
            }
        }
    }

    /// Free a team slot: kick its owner, reset name and score, and if the
    /// team held the answer lock, resume the round.
    ///
    /// Returns `None` when the team id does not exist.
    pub fn remove_team(&mut self, team_id: &str, now: Instant) -> Option<TeamRemoval> {
        if !self.teams.contains_key(team_id) {
            return None;
        }

        let kicked_player = self.team_taken.shift_remove(team_id);
        if let Some(player) = &kicked_player {
            self.player_teams.remove(player);
            self.kicked_players.insert(player.clone());
        }

        if let Some(team) = self.teams.get_mut(team_id) {
            team.name = default_team_name(team_id);
            team.score = 0;
        }
        self.team_name_locked.remove(team_id);
        self.locked_out_teams.remove(team_id);
        self.false_start_teams.remove(team_id);
        self.focus_locked_teams.remove(team_id);

        let unlocked = self.locked_by_team_id.as_deref() == Some(team_id);
        if unlocked {
            self.clear_lock();
            self.phase = Phase::Armed;
            if self.remaining_ms > 0 {
                self.start_timer(now);
            }
        }

        Some(TeamRemoval {
            kicked_player,
            unlocked,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn room() -> Room {
        Room::new("ABCD".into(), "k".repeat(24), Instant::now())
    }

    #[test]
    fn new_room_has_two_default_teams() {
        let room = room();
        assert_eq!(room.teams.len(), 2);
        assert_eq!(room.teams["1"].name, "Team 1");
        assert_eq!(room.teams["2"].name, "Team 2");
        assert_eq!(room.phase, Phase::Lobby);
        assert!(!room.timer_running);
        assert_eq!(room.remaining_ms, DEFAULT_DURATION_MS);
        assert!(room.fair_play_enabled);
    }

    #[test]
    fn add_team_appends_next_slot() {
        let mut room = room();
        assert_eq!(room.add_team(), "3");
        assert_eq!(room.teams["3"].name, "Team 3");
        assert_eq!(room.add_team(), "4");
    }

    #[test]
    fn advance_timer_uses_wall_clock_delta() {
        let mut room = room();
        let start = Instant::now();
        room.start_timer(start);
        let remaining = room.advance_timer(start + Duration::from_millis(700));
        assert_eq!(remaining, DEFAULT_DURATION_MS - 700);

        // delta is measured from the previous tick, not the timer start
        let remaining = room.advance_timer(start + Duration::from_millis(1_000));
        assert_eq!(remaining, DEFAULT_DURATION_MS - 1_000);
    }

    #[test]
    fn advance_timer_saturates_at_zero() {
        let mut room = room();
        let start = Instant::now();
        room.duration_ms = 1_000;
        room.remaining_ms = 1_000;
        room.start_timer(start);
        assert_eq!(room.advance_timer(start + Duration::from_secs(5)), 0);
    }

    #[test]
    fn advance_timer_is_inert_while_stopped() {
        let mut room = room();
        let now = Instant::now();
        assert_eq!(room.advance_timer(now), DEFAULT_DURATION_MS);
        assert_eq!(room.remaining_ms, DEFAULT_DURATION_MS);
    }

    #[test]
    fn fresh_round_clears_per_round_state_only() {
        let mut room = room();
        let now = Instant::now();
        room.team_taken.insert("1".into(), "p1".into());
        room.player_teams.insert("p1".into(), "1".into());
        room.teams.get_mut("1").unwrap().score = 3;
        room.locked_out_teams.insert("1".into());
        room.false_start_teams.insert("1".into());
        room.focus_locked_teams.insert("2".into());
        room.last_buzz = Some(LastBuzz {
            by: "p1".into(),
            team_id: "1".into(),
        });
        room.first_buzz_team_id = Some("1".into());
        room.time_up_at = Some(123);
        room.remaining_ms = 4;
        room.start_timer(now);

        room.fresh_round();

        assert!(room.locked_out_teams.is_empty());
        assert!(room.false_start_teams.is_empty());
        assert!(room.focus_locked_teams.is_empty());
        assert!(room.last_buzz.is_none());
        assert!(room.first_buzz_team_id.is_none());
        assert!(room.time_up_at.is_none());
        assert!(!room.timer_running);
        assert_eq!(room.remaining_ms, room.duration_ms);
        // scores and ownership survive
        assert_eq!(room.teams["1"].score, 3);
        assert_eq!(room.team_of("p1"), Some("1"));
    }

    #[test]
    fn compute_winner_single_leader() {
        let mut room = room();
        room.teams.get_mut("2").unwrap().score = 5;
        assert_eq!(room.compute_winner(), (Some("2".into()), None));
    }

    #[test]
    fn compute_winner_tie_lists_names() {
        let mut room = room();
        room.teams.get_mut("1").unwrap().score = 2;
        room.teams.get_mut("2").unwrap().score = 2;
        let (winner, text) = room.compute_winner();
        assert_eq!(winner, None);
        assert_eq!(text.as_deref(), Some("Team 1, Team 2"));
    }

    #[test]
    fn remove_team_kicks_owner_and_resets_slot() {
        let mut room = room();
        let now = Instant::now();
        room.team_taken.insert("2".into(), "p2".into());
        room.player_teams.insert("p2".into(), "2".into());
        room.teams.get_mut("2").unwrap().name = "Rockets".into();
        room.teams.get_mut("2").unwrap().score = 4;
        room.team_name_locked.insert("2".into());

        let removal = room.remove_team("2", now).unwrap();
        assert_eq!(removal.kicked_player.as_deref(), Some("p2"));
        assert!(!removal.unlocked);
        assert_eq!(room.teams["2"].name, "Team 2");
        assert_eq!(room.teams["2"].score, 0);
        assert!(!room.team_name_locked.contains("2"));
        assert!(room.kicked_players.contains("p2"));
        assert_eq!(room.team_of("p2"), None);
    }

    #[test]
    fn remove_locked_team_resumes_round() {
        let mut room = room();
        let now = Instant::now();
        room.team_taken.insert("2".into(), "p2".into());
        room.player_teams.insert("p2".into(), "2".into());
        room.phase = Phase::Locked;
        room.locked_by_team_id = Some("2".into());
        room.locked_by_player_id = Some("p2".into());
        room.remaining_ms = 3_000;

        let removal = room.remove_team("2", now).unwrap();
        assert!(removal.unlocked);
        assert_eq!(room.phase, Phase::Armed);
        assert!(room.timer_running);
        assert!(room.locked_by_team_id.is_none());
        assert!(room.locked_by_player_id.is_none());
    }

    #[test]
    fn remove_unknown_team_is_none() {
        let mut room = room();
        assert!(room.remove_team("9", Instant::now()).is_none());
    }
}
