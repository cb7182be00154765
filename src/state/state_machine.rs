use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::room::{LastBuzz, Room};

/// The three round states a room moves between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Between rounds; no timer, buzzing only registers false starts.
    Lobby,
    /// Timer running, first valid buzz wins.
    Armed,
    /// A team is answering; timer paused until the host rules.
    Locked,
}

/// Host-issued round events driving the state machine. The two remaining
/// inputs, player buzzes and timer ticks, have dedicated entry points with
/// richer outcomes ([`Room::buzz`], [`Room::tick`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// Arm the room and start the countdown.
    BeepStart,
    /// Abandon the countdown and return to lobby.
    PauseTimer,
    /// The answering team was right.
    Correct,
    /// The answering team was wrong.
    Incorrect,
    /// Advance to the next round without judging.
    NextRound,
    /// End the game and freeze the room.
    EndRound,
}

/// One-shot cues emitted by a transition, delivered to clients alongside the
/// full state broadcast. Cues are effects, not state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundCue {
    /// The round just armed.
    Beep,
    /// A buzz was accepted and the room locked on `team_id`.
    Buzzed { team_id: String },
    /// The countdown expired.
    TimeUp,
    /// Celebration cue for a correct answer.
    CorrectFx { team_id: String },
}

/// Error returned when an event cannot be applied from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the room was in when the invalid event was received.
    pub from: Phase,
    /// The event that cannot be applied from this phase.
    pub event: RoundEvent,
}

/// Why a buzz was turned away, exactly as serialized to the rejected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuzzRejectReason {
    NoTeam,
    NotArmed,
    TimeUp,
    TeamLockedOut,
    FocusLocked,
    Kicked,
}

/// What a buzz did to the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuzzOutcome {
    /// The buzz won the round; the room is now locked on this team.
    Locked { team_id: String },
    /// Pressed during lobby; the team is locked out of the upcoming round.
    FalseStart { team_id: String },
    /// Turned away without changing room state.
    Rejected(BuzzRejectReason),
}

/// What a timer tick did to the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer not running; nothing changed.
    Idle,
    /// Clock advanced; round continues.
    Running { remaining_ms: u64 },
    /// Clock hit zero; the room returned to lobby.
    TimeUp,
}

impl Room {
    /// Apply a host round event, mutating the room and returning the one-shot
    /// cues to broadcast.
    ///
    /// Callers are expected to have already gated on host authority and
    /// `game_over`; this function only enforces phase validity.
    pub fn transition(
        &mut self,
        event: RoundEvent,
        now: Instant,
    ) -> Result<Vec<RoundCue>, InvalidTransition> {
        let cues = match (self.phase, event) {
            (Phase::Lobby, RoundEvent::BeepStart) => {
                self.fresh_round();
                self.phase = Phase::Armed;
                self.start_timer(now);
                vec![RoundCue::Beep]
            }
            (Phase::Armed, RoundEvent::PauseTimer) => {
                self.fresh_round();
                self.phase = Phase::Lobby;
                vec![]
            }
            (Phase::Locked, RoundEvent::Correct) => {
                let Some(team_id) = self.locked_by_team_id.clone() else {
                    return Err(InvalidTransition {
                        from: self.phase,
                        event,
                    });
                };
                if let Some(team) = self.teams.get_mut(&team_id) {
                    team.score += 1;
                }
                self.round_number += 1;
                self.clear_lock();
                self.stop_timer();
                self.phase = Phase::Lobby;
                vec![RoundCue::CorrectFx { team_id }]
            }
            (Phase::Locked, RoundEvent::Incorrect) => {
                let Some(team_id) = self.locked_by_team_id.clone() else {
                    return Err(InvalidTransition {
                        from: self.phase,
                        event,
                    });
                };
                self.locked_out_teams.insert(team_id);
                self.clear_lock();
                self.phase = Phase::Armed;
                if self.remaining_ms > 0 {
                    self.start_timer(now);
                }
                vec![]
            }
            (_, RoundEvent::NextRound) => {
                self.round_number += 1;
                self.fresh_round();
                self.phase = Phase::Lobby;
                vec![]
            }
            (_, RoundEvent::EndRound) => {
                self.stop_timer();
                self.clear_lock();
                self.phase = Phase::Lobby;
                self.game_over = true;
                let (winner_team_id, winner_text) = self.compute_winner();
                self.winner_team_id = winner_team_id;
                self.winner_text = winner_text;
                vec![]
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(cues)
    }

    /// Register a buzz from `player_id`.
    ///
    /// Which press wins is decided by arrival order under the room lock, not
    /// by any client timestamp. The clock is advanced to `now` before the
    /// time-up check so a press racing the expiry is judged against the real
    /// remaining time.
    pub fn buzz(&mut self, player_id: &str, now: Instant) -> BuzzOutcome {
        if self.kicked_players.contains(player_id) {
            return BuzzOutcome::Rejected(BuzzRejectReason::Kicked);
        }
        let Some(team_id) = self.team_of(player_id).map(str::to_string) else {
            return BuzzOutcome::Rejected(BuzzRejectReason::NoTeam);
        };

        match self.phase {
            Phase::Lobby if !self.game_over => {
                self.locked_out_teams.insert(team_id.clone());
                self.false_start_teams.insert(team_id.clone());
                BuzzOutcome::FalseStart { team_id }
            }
            Phase::Lobby | Phase::Locked => BuzzOutcome::Rejected(BuzzRejectReason::NotArmed),
            Phase::Armed => {
                if self.locked_out_teams.contains(&team_id) {
                    return BuzzOutcome::Rejected(BuzzRejectReason::TeamLockedOut);
                }
                if self.fair_play_enabled && self.focus_locked_teams.contains(&team_id) {
                    return BuzzOutcome::Rejected(BuzzRejectReason::FocusLocked);
                }
                if self.advance_timer(now) == 0 {
                    return BuzzOutcome::Rejected(BuzzRejectReason::TimeUp);
                }

                self.stop_timer();
                self.locked_by_player_id = Some(player_id.to_string());
                self.locked_by_team_id = Some(team_id.clone());
                self.last_buzz = Some(LastBuzz {
                    by: player_id.to_string(),
                    team_id: team_id.clone(),
                });
                if self.first_buzz_team_id.is_none() {
                    self.first_buzz_team_id = Some(team_id.clone());
                }
                self.phase = Phase::Locked;
                BuzzOutcome::Locked { team_id }
            }
        }
    }

    /// Advance the round clock. `wall_now_ms` is the Unix-milliseconds wall
    /// time recorded as `time_up_at` if this tick expires the round.
    pub fn tick(&mut self, now: Instant, wall_now_ms: u64) -> TickOutcome {
        if !self.timer_running {
            return TickOutcome::Idle;
        }

        let remaining_ms = self.advance_timer(now);
        if remaining_ms > 0 {
            return TickOutcome::Running { remaining_ms };
        }

        self.stop_timer();
        self.clear_lock();
        self.time_up_at = Some(wall_now_ms);
        self.phase = Phase::Lobby;
        TickOutcome::TimeUp
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn room() -> Room {
        Room::new("ABCD".into(), "k".repeat(24), Instant::now())
    }

    /// Room with players p1 and p2 bound to teams 1 and 2.
    fn room_with_players() -> Room {
        let mut room = room();
        for (player, team) in [("p1", "1"), ("p2", "2")] {
            room.team_taken.insert(team.into(), player.into());
            room.player_teams.insert(player.into(), team.into());
        }
        room
    }

    fn assert_invariants(room: &Room) {
        if room.phase == Phase::Locked {
            assert!(room.locked_by_player_id.is_some());
            assert!(room.locked_by_team_id.is_some());
            assert!(!room.timer_running);
        } else {
            if room.phase == Phase::Lobby {
                assert!(!room.timer_running);
            }
            assert!(room.locked_by_team_id.is_none());
        }
        assert!(room.remaining_ms <= room.duration_ms);
        if let Some(team) = &room.locked_by_team_id {
            assert!(!room.locked_out_teams.contains(team));
        }
    }

    #[test]
    fn beep_start_arms_and_clears_round_state() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.locked_out_teams.insert("1".into());
        room.false_start_teams.insert("1".into());
        room.focus_locked_teams.insert("2".into());
        room.remaining_ms = 1;
        room.time_up_at = Some(42);

        let cues = room.transition(RoundEvent::BeepStart, now).unwrap();
        assert_eq!(cues, vec![RoundCue::Beep]);
        assert_eq!(room.phase, Phase::Armed);
        assert!(room.timer_running);
        assert_eq!(room.remaining_ms, room.duration_ms);
        assert!(room.locked_out_teams.is_empty());
        assert!(room.false_start_teams.is_empty());
        assert!(room.focus_locked_teams.is_empty());
        assert!(room.time_up_at.is_none());
    }

    #[test]
    fn beep_start_requires_lobby() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();
        let err = room.transition(RoundEvent::BeepStart, now).unwrap_err();
        assert_eq!(err.from, Phase::Armed);
        assert_eq!(err.event, RoundEvent::BeepStart);
    }

    #[test]
    fn first_buzz_wins_and_pauses_timer() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();

        let outcome = room.buzz("p1", now + Duration::from_millis(300));
        assert_eq!(
            outcome,
            BuzzOutcome::Locked {
                team_id: "1".into()
            }
        );
        assert_eq!(room.phase, Phase::Locked);
        assert!(!room.timer_running);
        assert_eq!(room.locked_by_player_id.as_deref(), Some("p1"));
        assert_eq!(room.locked_by_team_id.as_deref(), Some("1"));
        assert_eq!(room.first_buzz_team_id.as_deref(), Some("1"));
        assert_invariants(&room);

        // the race loser sees the room already locked
        let outcome = room.buzz("p2", now + Duration::from_millis(301));
        assert_eq!(outcome, BuzzOutcome::Rejected(BuzzRejectReason::NotArmed));
        assert_eq!(room.locked_by_team_id.as_deref(), Some("1"));
    }

    #[test]
    fn buzz_without_team_is_rejected() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();
        assert_eq!(
            room.buzz("stranger", now),
            BuzzOutcome::Rejected(BuzzRejectReason::NoTeam)
        );
        assert_eq!(room.phase, Phase::Armed);
    }

    #[test]
    fn kicked_player_buzz_is_rejected() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();
        room.kicked_players.insert("p1".into());
        assert_eq!(
            room.buzz("p1", now),
            BuzzOutcome::Rejected(BuzzRejectReason::Kicked)
        );
    }

    #[test]
    fn lobby_buzz_is_a_false_start() {
        let mut room = room_with_players();
        let now = Instant::now();
        let outcome = room.buzz("p1", now);
        assert_eq!(
            outcome,
            BuzzOutcome::FalseStart {
                team_id: "1".into()
            }
        );
        assert!(room.locked_out_teams.contains("1"));
        assert!(room.false_start_teams.contains("1"));
        assert_eq!(room.phase, Phase::Lobby);

        // arming considers the round fresh and clears the lockout
        room.transition(RoundEvent::BeepStart, now).unwrap();
        assert!(!room.locked_out_teams.contains("1"));
    }

    #[test]
    fn locked_out_team_cannot_buzz() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();
        room.locked_out_teams.insert("1".into());
        assert_eq!(
            room.buzz("p1", now),
            BuzzOutcome::Rejected(BuzzRejectReason::TeamLockedOut)
        );
        assert_eq!(room.phase, Phase::Armed);
    }

    #[test]
    fn focus_locked_team_cannot_buzz_under_fair_play() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();
        room.focus_locked_teams.insert("1".into());
        assert_eq!(
            room.buzz("p1", now),
            BuzzOutcome::Rejected(BuzzRejectReason::FocusLocked)
        );

        room.fair_play_enabled = false;
        assert!(matches!(room.buzz("p1", now), BuzzOutcome::Locked { .. }));
    }

    #[test]
    fn buzz_after_expiry_is_rejected() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.duration_ms = 1_000;
        room.transition(RoundEvent::BeepStart, now).unwrap();

        let outcome = room.buzz("p1", now + Duration::from_millis(1_500));
        assert_eq!(outcome, BuzzOutcome::Rejected(BuzzRejectReason::TimeUp));
        assert_eq!(room.remaining_ms, 0);
    }

    #[test]
    fn incorrect_locks_team_out_and_resumes() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();
        room.buzz("p1", now);

        let cues = room.transition(RoundEvent::Incorrect, now).unwrap();
        assert!(cues.is_empty());
        assert_eq!(room.phase, Phase::Armed);
        assert!(room.timer_running);
        assert!(room.locked_out_teams.contains("1"));
        assert_invariants(&room);

        assert_eq!(
            room.buzz("p1", now),
            BuzzOutcome::Rejected(BuzzRejectReason::TeamLockedOut)
        );
        assert_eq!(
            room.buzz("p2", now),
            BuzzOutcome::Locked {
                team_id: "2".into()
            }
        );
        assert_eq!(room.locked_by_team_id.as_deref(), Some("2"));
    }

    #[test]
    fn correct_awards_point_and_advances_round() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();
        room.buzz("p1", now);
        let round_before = room.round_number;

        let cues = room.transition(RoundEvent::Correct, now).unwrap();
        assert_eq!(
            cues,
            vec![RoundCue::CorrectFx {
                team_id: "1".into()
            }]
        );
        assert_eq!(room.teams["1"].score, 1);
        assert_eq!(room.round_number, round_before + 1);
        assert_eq!(room.phase, Phase::Lobby);
        assert_invariants(&room);
    }

    #[test]
    fn pause_timer_resets_remaining_and_returns_to_lobby() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();
        room.tick(now + Duration::from_millis(2_000), 0);

        let cues = room.transition(RoundEvent::PauseTimer, now).unwrap();
        assert!(cues.is_empty());
        assert_eq!(room.phase, Phase::Lobby);
        assert!(!room.timer_running);
        assert_eq!(room.remaining_ms, room.duration_ms);
    }

    #[test]
    fn pause_timer_clears_round_state() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();
        // team 1 buzzed and was judged wrong, team 2 lost focus
        room.buzz("p1", now);
        room.transition(RoundEvent::Incorrect, now).unwrap();
        room.focus_locked_teams.insert("2".into());
        assert!(room.locked_out_teams.contains("1"));
        assert!(room.last_buzz.is_some());
        assert!(room.first_buzz_team_id.is_some());

        room.transition(RoundEvent::PauseTimer, now).unwrap();
        assert_eq!(room.phase, Phase::Lobby);
        assert!(room.locked_out_teams.is_empty());
        assert!(room.false_start_teams.is_empty());
        assert!(room.focus_locked_teams.is_empty());
        assert!(room.last_buzz.is_none());
        assert!(room.first_buzz_team_id.is_none());
        assert!(room.time_up_at.is_none());
        assert_eq!(room.remaining_ms, room.duration_ms);
        // scores and ownership survive the abandoned round
        assert_eq!(room.team_of("p1"), Some("1"));
        assert_invariants(&room);
    }

    #[test]
    fn tick_drives_expiry_to_lobby() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.duration_ms = 1_000;
        room.transition(RoundEvent::BeepStart, now).unwrap();

        let outcome = room.tick(now + Duration::from_millis(400), 0);
        assert_eq!(outcome, TickOutcome::Running { remaining_ms: 600 });

        let outcome = room.tick(now + Duration::from_millis(1_100), 777);
        assert_eq!(outcome, TickOutcome::TimeUp);
        assert_eq!(room.phase, Phase::Lobby);
        assert_eq!(room.time_up_at, Some(777));
        assert!(!room.timer_running);
        assert_invariants(&room);

        // once back in lobby further ticks are inert
        assert_eq!(
            room.tick(now + Duration::from_millis(1_300), 800),
            TickOutcome::Idle
        );
    }

    #[test]
    fn one_remaining_millisecond_expires_on_next_tick() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.duration_ms = 1_000;
        room.transition(RoundEvent::BeepStart, now).unwrap();
        room.remaining_ms = 1;

        let outcome = room.tick(now + Duration::from_millis(200), 5);
        assert_eq!(outcome, TickOutcome::TimeUp);
        assert_eq!(room.time_up_at, Some(5));
    }

    #[test]
    fn tick_while_locked_is_idle() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();
        room.buzz("p1", now);
        let remaining = room.remaining_ms;

        assert_eq!(
            room.tick(now + Duration::from_secs(60), 0),
            TickOutcome::Idle
        );
        assert_eq!(room.remaining_ms, remaining);
    }

    #[test]
    fn next_round_resets_from_any_phase() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::BeepStart, now).unwrap();
        room.buzz("p1", now);
        let round_before = room.round_number;

        room.transition(RoundEvent::NextRound, now).unwrap();
        assert_eq!(room.round_number, round_before + 1);
        assert_eq!(room.phase, Phase::Lobby);
        assert!(room.locked_by_team_id.is_none());
        assert_eq!(room.remaining_ms, room.duration_ms);
        assert_invariants(&room);
    }

    #[test]
    fn end_round_declares_single_winner() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.teams.get_mut("2").unwrap().score = 3;

        room.transition(RoundEvent::EndRound, now).unwrap();
        assert!(room.game_over);
        assert_eq!(room.phase, Phase::Lobby);
        assert_eq!(room.winner_team_id.as_deref(), Some("2"));
        assert!(room.winner_text.is_none());
    }

    #[test]
    fn end_round_reports_ties_as_text() {
        let mut room = room_with_players();
        let now = Instant::now();
        room.transition(RoundEvent::EndRound, now).unwrap();
        assert!(room.winner_team_id.is_none());
        assert_eq!(room.winner_text.as_deref(), Some("Team 1, Team 2"));
    }

    #[test]
    fn game_over_lobby_buzz_does_not_mutate() {
        let mut room = room_with_players();
        room.transition(RoundEvent::EndRound, Instant::now())
            .unwrap();

        let outcome = room.buzz("p1", Instant::now());
        assert_eq!(outcome, BuzzOutcome::Rejected(BuzzRejectReason::NotArmed));
        assert!(room.locked_out_teams.is_empty());
    }

    #[test]
    fn round_number_never_decreases() {
        let mut room = room_with_players();
        let now = Instant::now();
        let mut last = room.round_number;
        for _ in 0..3 {
            room.transition(RoundEvent::BeepStart, now).unwrap();
            room.buzz("p1", now);
            room.transition(RoundEvent::Correct, now).unwrap();
            assert!(room.round_number >= last);
            last = room.round_number;
        }
    }

    #[test]
    fn judging_without_lock_is_invalid() {
        let mut room = room_with_players();
        let now = Instant::now();
        assert!(room.transition(RoundEvent::Correct, now).is_err());
        assert!(room.transition(RoundEvent::Incorrect, now).is_err());
        room.transition(RoundEvent::BeepStart, now).unwrap();
        assert!(room.transition(RoundEvent::Correct, now).is_err());
    }
}
