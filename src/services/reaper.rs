//! Background garbage collection for abandoned rooms.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::info;

use crate::{config::AppConfig, state::SharedState};

/// Periodically sweep the registry until the process exits.
pub async fn run(state: SharedState) {
    loop {
        sleep(state.config().reaper_interval).await;
        sweep(&state, Instant::now()).await;
    }
}

/// One reaper pass: delete every room that outlived its welcome, closing all
/// sessions still attached. Deletion is idempotent; a room already gone is
/// skipped silently.
pub async fn sweep(state: &SharedState, now: Instant) {
    let handles: Vec<_> = state
        .rooms()
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    for handle in handles {
        let (idle, age) = {
            let room = handle.lock().await;
            (
                now.saturating_duration_since(room.last_activity_at),
                now.saturating_duration_since(room.created_at),
            )
        };
        let members = handle.members_count();

        if should_reap(idle, members, state.config()) && state.remove_room(handle.code()).is_some()
        {
            info!(
                room = %handle.code(),
                idle_secs = idle.as_secs(),
                age_secs = age.as_secs(),
                members,
                "reaped idle room"
            );
        }
    }
}

/// A room dies when idle past the TTL, or empty past the (much shorter)
/// empty-room grace period.
pub fn should_reap(idle: Duration, members: usize, config: &AppConfig) -> bool {
    idle > config.idle_ttl || (members == 0 && idle > config.empty_ttl)
}
