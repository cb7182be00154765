//! Command-level validation and room mutation for host and player commands.
//! Everything here runs under the owning room's lock; broadcasting is the
//! caller's job.

use std::time::Instant;

use crate::{
    dto::validation::clean_team_name,
    error::ServiceError,
    state::{
        room::{
            MAX_DURATION_MS, MAX_SCORE_DELTA, MAX_TEAMS, MIN_DURATION_MS, MIN_TEAMS, Room,
            TeamRemoval,
        },
        state_machine::Phase,
    },
};

/// Bind `player_id` to a team slot.
///
/// Binding is permanent for the room's lifetime: a second claim returns the
/// existing team and ignores the requested one, which makes the command safe
/// to replay across refreshes.
pub fn claim_team(room: &mut Room, player_id: &str, team_id: &str) -> Result<String, ServiceError> {
    if let Some(existing) = room.team_of(player_id) {
        return Ok(existing.to_string());
    }

    if !room.teams.contains_key(team_id) {
        return Err(ServiceError::NotFound(format!(
            "team `{team_id}` not found"
        )));
    }
    if room.team_taken.contains_key(team_id) {
        return Err(ServiceError::InvalidState(format!(
            "team `{team_id}` is already taken"
        )));
    }

    room.team_taken
        .insert(team_id.to_string(), player_id.to_string());
    room.player_teams
        .insert(player_id.to_string(), team_id.to_string());
    Ok(team_id.to_string())
}

/// Rename the sender's team. Allowed exactly once per team per room lifetime.
pub fn set_team_name(room: &mut Room, player_id: &str, raw_name: &str) -> Result<(), ServiceError> {
    let Some(team_id) = room.team_of(player_id).map(str::to_string) else {
        return Err(ServiceError::Unauthorized(
            "claim a team before renaming it".into(),
        ));
    };

    if room.team_name_locked.contains(&team_id) {
        return Err(ServiceError::InvalidState(
            "team name can only be changed once".into(),
        ));
    }

    let cleaned =
        clean_team_name(raw_name).map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    if let Some(team) = room.teams.get_mut(&team_id) {
        team.name = cleaned;
    }
    room.team_name_locked.insert(team_id);
    Ok(())
}

/// Grow the team list to `count` slots. The count never decreases.
pub fn set_team_count(room: &mut Room, count: i64) -> Result<(), ServiceError> {
    if !(MIN_TEAMS as i64..=MAX_TEAMS as i64).contains(&count) {
        return Err(ServiceError::InvalidInput(format!(
            "team count must be between {MIN_TEAMS} and {MAX_TEAMS}"
        )));
    }

    let desired = count as usize;
    if desired < room.teams.len() {
        return Err(ServiceError::InvalidInput(
            "team count cannot decrease".into(),
        ));
    }
    while room.teams.len() < desired {
        room.add_team();
    }
    Ok(())
}

/// Set the configured round length from seconds. The running clock is never
/// touched; an idle room also gets its remaining time refreshed.
pub fn set_duration(room: &mut Room, seconds: f64) -> Result<(), ServiceError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ServiceError::InvalidInput(
            "duration must be a positive number of seconds".into(),
        ));
    }

    let duration_ms = (seconds * 1000.0).round() as u64;
    if !(MIN_DURATION_MS..=MAX_DURATION_MS).contains(&duration_ms) {
        return Err(ServiceError::InvalidInput(format!(
            "duration must be between {} and {} seconds",
            MIN_DURATION_MS / 1000,
            MAX_DURATION_MS / 1000
        )));
    }

    room.duration_ms = duration_ms;
    if !room.timer_running {
        room.remaining_ms = duration_ms;
    }
    Ok(())
}

/// Apply a bounded host score correction.
pub fn adjust_score(room: &mut Room, team_id: &str, delta: i64) -> Result<(), ServiceError> {
    if delta.abs() > MAX_SCORE_DELTA {
        return Err(ServiceError::InvalidInput(format!(
            "score adjustment must be within ±{MAX_SCORE_DELTA}"
        )));
    }

    let Some(team) = room.teams.get_mut(team_id) else {
        return Err(ServiceError::NotFound(format!(
            "team `{team_id}` not found"
        )));
    };
    team.score += delta as i32;
    Ok(())
}

/// Toggle the FairPlay focus-loss policy.
pub fn set_fair_play(room: &mut Room, enabled: bool) {
    room.fair_play_enabled = enabled;
}

/// Clear a team's focus lock.
pub fn unblock_focus(room: &mut Room, team_id: &str) -> Result<(), ServiceError> {
    if !room.teams.contains_key(team_id) {
        return Err(ServiceError::NotFound(format!(
            "team `{team_id}` not found"
        )));
    }
    room.focus_locked_teams.remove(team_id);
    Ok(())
}

/// Host removes a team slot: owner kicked, slot reset, lock released if held.
pub fn remove_team(
    room: &mut Room,
    team_id: &str,
    now: Instant,
) -> Result<TeamRemoval, ServiceError> {
    room.remove_team(team_id, now)
        .ok_or_else(|| ServiceError::NotFound(format!("team `{team_id}` not found")))
}

/// A player's app reported focus loss. Locks the team while a round is live
/// and FairPlay is on. Returns whether room state changed.
pub fn report_focus_lost(room: &mut Room, player_id: &str) -> bool {
    if !room.fair_play_enabled {
        return false;
    }
    if !matches!(room.phase, Phase::Armed | Phase::Locked) {
        return false;
    }
    let Some(team_id) = room.team_of(player_id).map(str::to_string) else {
        return false;
    };
    room.focus_locked_teams.insert(team_id)
}
