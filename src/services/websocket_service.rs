use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::{MutexGuard, mpsc},
    task::JoinHandle,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        public::RoomStateView,
        validation::validate_room_code,
        ws::{ClientMessage, KICK_REASON_REMOVED_BY_HOST, ServerMessage},
    },
    error::ServiceError,
    services::{broadcast, room_service},
    state::{
        ClientConnection, RoomHandle, SharedState,
        room::Room,
        state_machine::{BuzzOutcome, BuzzRejectReason, RoundEvent},
    },
};

/// How long a fresh connection gets to send its `joinRoom`.
const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a connection task knows about itself once joined.
struct Session {
    session_id: Uuid,
    handle: Arc<RoomHandle>,
    /// Stable player identity, if one was presented at join.
    player_id: Option<String>,
    is_host: bool,
    tx: mpsc::UnboundedSender<Message>,
}

/// What dispatch decided about the connection's future.
enum Flow {
    Continue,
    /// The session must detach (kicked, or the room vanished).
    Detach,
}

/// Handle the full lifecycle of one realtime client connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let session = match join_from_first_message(&state, &initial_message, &outbound_tx).await {
        Ok(session) => session,
        Err(()) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(&text) {
                Ok(command) => {
                    if matches!(dispatch(&session, command).await, Flow::Detach) {
                        break;
                    }
                }
                Err(err) => {
                    warn!(session = %session.session_id, error = %err, "unparseable client message");
                    broadcast::send_message(
                        &session.tx,
                        &ServerMessage::ErrorMsg {
                            message: format!("invalid message: {err}"),
                        },
                    );
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = session.tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = session.tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(session = %session.session_id, error = %err, "websocket error");
                break;
            }
        }
    }

    leave(&session).await;
    finalize(writer_task, outbound_tx).await;
}

/// Parse and execute the mandatory first frame (`joinRoom` / `rejoinRoom`).
async fn join_from_first_message(
    state: &SharedState,
    raw: &str,
    tx: &mpsc::UnboundedSender<Message>,
) -> Result<Session, ()> {
    let (room_code, host_key, player_id) = match ClientMessage::from_json_str(raw) {
        Ok(ClientMessage::JoinRoom {
            room_code,
            host_key,
            player_id,
        }) => (room_code, host_key, player_id),
        Ok(ClientMessage::RejoinRoom {
            room_code,
            player_id,
        }) => (room_code, None, player_id),
        Ok(_) => {
            broadcast::send_message(
                tx,
                &ServerMessage::ErrorMsg {
                    message: "join a room first".into(),
                },
            );
            return Err(());
        }
        Err(err) => {
            warn!(error = %err, "failed to parse identification message");
            broadcast::send_message(
                tx,
                &ServerMessage::ErrorMsg {
                    message: format!("invalid message: {err}"),
                },
            );
            return Err(());
        }
    };

    join(state, &room_code, host_key, player_id, tx).await
}

/// Bind a connection to a room, restoring team ownership for known players.
async fn join(
    state: &SharedState,
    room_code: &str,
    host_key: Option<String>,
    player_id: Option<String>,
    tx: &mpsc::UnboundedSender<Message>,
) -> Result<Session, ()> {
    let normalized = room_code.trim().to_ascii_uppercase();
    if let Err(err) = validate_room_code(&normalized) {
        broadcast::send_message(
            tx,
            &ServerMessage::ErrorMsg {
                message: err.to_string(),
            },
        );
        return Err(());
    }
    let Some(handle) = state.room(&normalized) else {
        broadcast::send_message(
            tx,
            &ServerMessage::ErrorMsg {
                message: format!("Room {normalized} does not exist"),
            },
        );
        return Err(());
    };

    let session_id = Uuid::new_v4();
    let now = Instant::now();

    let (is_host, existing_team, view) = {
        let mut room = handle.lock().await;

        if let Some(pid) = &player_id {
            if room.kicked_players.contains(pid) {
                drop(room);
                broadcast::send_message(
                    tx,
                    &ServerMessage::Kicked {
                        room_code: normalized.clone(),
                        reason: KICK_REASON_REMOVED_BY_HOST.into(),
                    },
                );
                return Err(());
            }
        }

        room.touch(now);
        let is_host = host_key.as_deref() == Some(room.host_key.as_str());
        let existing_team = player_id
            .as_deref()
            .and_then(|pid| room.team_of(pid))
            .map(str::to_string);

        handle.attach(ClientConnection {
            session_id,
            player_id: player_id.clone(),
            tx: tx.clone(),
        });

        let view = RoomStateView::from_room(&room, handle.members_count());
        (is_host, existing_team, view)
    };

    broadcast::send_message(
        tx,
        &ServerMessage::JoinedRoom {
            room_code: normalized.clone(),
            is_host,
        },
    );
    if let Some(team_id) = existing_team {
        broadcast::send_message(
            tx,
            &ServerMessage::TeamSet {
                team_id,
                locked: true,
            },
        );
    }
    broadcast::broadcast_state(&handle, view);

    info!(room = %normalized, session = %session_id, is_host, "client joined room");

    Ok(Session {
        session_id,
        handle,
        player_id,
        is_host,
        tx: tx.clone(),
    })
}

/// Detach on disconnect. Room state is untouched: a disconnected lock holder
/// leaves the room locked for the host to judge.
async fn leave(session: &Session) {
    session.handle.detach(&session.session_id);
    let view = {
        let room = session.handle.lock().await;
        RoomStateView::from_room(&room, session.handle.members_count())
    };
    broadcast::broadcast_state(&session.handle, view);
    info!(room = %session.handle.code(), session = %session.session_id, "client left room");
}

/// Validate authority, apply one command under the room lock, then fan out
/// the snapshot and any one-shot cues.
async fn dispatch(session: &Session, command: ClientMessage) -> Flow {
    let now = Instant::now();
    let handle = &session.handle;

    if command.requires_host() && !session.is_host {
        send_error(session, ServiceError::Unauthorized("host only".into()));
        return Flow::Continue;
    }

    let mut room = handle.lock().await;

    // A kicked player's sessions are cut off at the next command, whatever it is.
    if let Some(pid) = &session.player_id {
        if room.kicked_players.contains(pid) {
            drop(room);
            broadcast::send_message(
                &session.tx,
                &ServerMessage::Kicked {
                    room_code: handle.code().to_string(),
                    reason: KICK_REASON_REMOVED_BY_HOST.into(),
                },
            );
            handle.detach(&session.session_id);
            return Flow::Detach;
        }
    }

    if command.requires_host() && room.game_over {
        drop(room);
        send_error(session, ServiceError::GameOver);
        return Flow::Continue;
    }

    room.touch(now);

    match command {
        ClientMessage::JoinRoom { .. } | ClientMessage::RejoinRoom { .. } => {
            drop(room);
            send_error(
                session,
                ServiceError::InvalidState("already joined a room".into()),
            );
        }

        ClientMessage::Buzz | ClientMessage::FalseStartAttempt => {
            let Some(player_id) = session.player_id.clone() else {
                drop(room);
                broadcast::send_message(
                    &session.tx,
                    &ServerMessage::BuzzRejected {
                        reason: BuzzRejectReason::NoTeam,
                    },
                );
                return Flow::Continue;
            };

            match room.buzz(&player_id, now) {
                BuzzOutcome::Locked { team_id } => {
                    let view = RoomStateView::from_room(&room, handle.members_count());
                    drop(room);
                    broadcast::broadcast(
                        handle,
                        &ServerMessage::Buzzed {
                            team_id,
                            room_code: handle.code().to_string(),
                        },
                    );
                    broadcast::broadcast_state(handle, view);
                }
                BuzzOutcome::FalseStart { .. } => {
                    let view = RoomStateView::from_room(&room, handle.members_count());
                    drop(room);
                    broadcast::send_message(
                        &session.tx,
                        &ServerMessage::BuzzRejected {
                            reason: BuzzRejectReason::NotArmed,
                        },
                    );
                    broadcast::broadcast_state(handle, view);
                }
                BuzzOutcome::Rejected(reason) => {
                    drop(room);
                    broadcast::send_message(&session.tx, &ServerMessage::BuzzRejected { reason });
                }
            }
        }

        ClientMessage::SetTeam { team_id } => {
            let Some(player_id) = session.player_id.clone() else {
                drop(room);
                send_error(
                    session,
                    ServiceError::InvalidInput("player identity required".into()),
                );
                return Flow::Continue;
            };

            match room_service::claim_team(&mut room, &player_id, &team_id) {
                Ok(bound_team) => {
                    let view = RoomStateView::from_room(&room, handle.members_count());
                    drop(room);
                    broadcast::send_message(
                        &session.tx,
                        &ServerMessage::TeamSet {
                            team_id: bound_team,
                            locked: true,
                        },
                    );
                    broadcast::broadcast_state(handle, view);
                }
                Err(err) => {
                    drop(room);
                    send_error(session, err);
                }
            }
        }

        ClientMessage::SetTeamName { name } => {
            let Some(player_id) = session.player_id.clone() else {
                drop(room);
                send_error(
                    session,
                    ServiceError::InvalidInput("player identity required".into()),
                );
                return Flow::Continue;
            };

            apply_and_broadcast(session, room, |room| {
                room_service::set_team_name(room, &player_id, &name)
            });
        }

        ClientMessage::PlayerFocus { focused } => {
            let changed = match (&session.player_id, focused) {
                (Some(player_id), false) => room_service::report_focus_lost(&mut room, player_id),
                _ => false,
            };
            if changed {
                let view = RoomStateView::from_room(&room, handle.members_count());
                drop(room);
                broadcast::broadcast_state(handle, view);
            }
        }

        ClientMessage::HostSetTeamCount { count } => {
            apply_and_broadcast(session, room, |room| {
                room_service::set_team_count(room, count)
            });
        }

        ClientMessage::HostSetDuration { seconds } => {
            apply_and_broadcast(session, room, |room| {
                room_service::set_duration(room, seconds)
            });
        }

        ClientMessage::HostAdjustScore { team_id, delta } => {
            apply_and_broadcast(session, room, |room| {
                room_service::adjust_score(room, &team_id, delta)
            });
        }

        ClientMessage::HostSetFairPlay { enabled } => {
            apply_and_broadcast(session, room, |room| {
                room_service::set_fair_play(room, enabled);
                Ok(())
            });
        }

        ClientMessage::HostUnblockFocus { team_id } => {
            apply_and_broadcast(session, room, |room| {
                room_service::unblock_focus(room, &team_id)
            });
        }

        ClientMessage::HostRemoveTeam { team_id } => {
            match room_service::remove_team(&mut room, &team_id, now) {
                Ok(removal) => {
                    // Cut the removed player's sessions before snapshotting so
                    // the members count the broadcast carries is already right.
                    let kicked_sessions: Vec<(Uuid, mpsc::UnboundedSender<Message>)> = removal
                        .kicked_player
                        .as_deref()
                        .map(|kicked| {
                            handle
                                .connections()
                                .iter()
                                .filter(|entry| {
                                    entry.value().player_id.as_deref() == Some(kicked)
                                })
                                .map(|entry| (entry.value().session_id, entry.value().tx.clone()))
                                .collect()
                        })
                        .unwrap_or_default();

                    for (kicked_session, kicked_tx) in &kicked_sessions {
                        broadcast::send_message(
                            kicked_tx,
                            &ServerMessage::Kicked {
                                room_code: handle.code().to_string(),
                                reason: KICK_REASON_REMOVED_BY_HOST.into(),
                            },
                        );
                        let _ = kicked_tx.send(Message::Close(None));
                        handle.detach(kicked_session);
                    }

                    let view = RoomStateView::from_room(&room, handle.members_count());
                    drop(room);
                    broadcast::broadcast_state(handle, view);
                }
                Err(err) => {
                    drop(room);
                    send_error(session, err);
                }
            }
        }

        ClientMessage::HostBeepStart => round_event(session, room, RoundEvent::BeepStart, now),
        ClientMessage::HostPauseTimer => round_event(session, room, RoundEvent::PauseTimer, now),
        ClientMessage::HostCorrect => round_event(session, room, RoundEvent::Correct, now),
        ClientMessage::HostIncorrect => round_event(session, room, RoundEvent::Incorrect, now),
        ClientMessage::HostNextRound => round_event(session, room, RoundEvent::NextRound, now),
        ClientMessage::HostEndRound => round_event(session, room, RoundEvent::EndRound, now),
    }

    Flow::Continue
}

/// Run a state-machine event and fan out its cues plus the fresh snapshot.
fn round_event(session: &Session, mut room: MutexGuard<'_, Room>, event: RoundEvent, now: Instant) {
    let handle = &session.handle;
    match room.transition(event, now) {
        Ok(cues) => {
            let view = RoomStateView::from_room(&room, handle.members_count());
            drop(room);
            for cue in cues {
                broadcast::broadcast(handle, &broadcast::cue_message(cue, handle.code()));
            }
            broadcast::broadcast_state(handle, view);
        }
        Err(err) => {
            drop(room);
            send_error(session, err.into());
        }
    }
}

/// Apply a fallible mutation; broadcast the snapshot on success, answer the
/// sender with `errorMsg` on failure.
fn apply_and_broadcast<F>(session: &Session, mut room: MutexGuard<'_, Room>, mutate: F)
where
    F: FnOnce(&mut Room) -> Result<(), ServiceError>,
{
    let handle = &session.handle;
    match mutate(&mut room) {
        Ok(()) => {
            let view = RoomStateView::from_room(&room, handle.members_count());
            drop(room);
            broadcast::broadcast_state(handle, view);
        }
        Err(err) => {
            drop(room);
            send_error(session, err);
        }
    }
}

fn send_error(session: &Session, err: ServiceError) {
    broadcast::send_message(
        &session.tx,
        &ServerMessage::ErrorMsg {
            message: err.to_string(),
        },
    );
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
