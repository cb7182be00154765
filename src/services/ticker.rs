//! The timer service: one process-wide periodic task advancing every running
//! room's countdown and firing the time-up transition.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::time::MissedTickBehavior;

use crate::{
    dto::{public::RoomStateView, ws::ServerMessage},
    services::broadcast,
    state::SharedState,
    state::state_machine::TickOutcome,
};

/// Drive the countdown for every room until the process exits.
///
/// Timer accuracy does not depend on the tick cadence: each tick decrements
/// by the measured wall-clock delta, so a delayed tick only coarsens updates,
/// it never loses time.
pub async fn run(state: SharedState) {
    let mut ticker = tokio::time::interval(state.config().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        // Collect handles first so no registry shard lock is held across awaits.
        let handles: Vec<_> = state
            .rooms()
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let now = Instant::now();
        let wall_now_ms = unix_millis();

        for handle in handles {
            let (outcome, view) = {
                let mut room = handle.lock().await;
                let outcome = room.tick(now, wall_now_ms);
                let view = match outcome {
                    TickOutcome::Idle => None,
                    _ => Some(RoomStateView::from_room(&room, handle.members_count())),
                };
                (outcome, view)
            };

            match (outcome, view) {
                (TickOutcome::Running { .. }, Some(view)) => {
                    broadcast::broadcast_state(&handle, view);
                }
                (TickOutcome::TimeUp, Some(view)) => {
                    broadcast::broadcast(&handle, &ServerMessage::TimeUp);
                    broadcast::broadcast_state(&handle, view);
                }
                _ => {}
            }
        }
    }
}

/// Wall time as Unix milliseconds, for the client-facing `timeUpAt` field.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
