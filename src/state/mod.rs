pub mod room;
pub mod state_machine;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::Message;
use dashmap::DashMap;
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::state::room::Room;

pub type SharedState = Arc<AppState>;

/// Room-code alphabet with the ambiguous `0/O/1/I` removed.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Codes are always exactly this long.
pub const ROOM_CODE_LEN: usize = 4;

const HOST_KEY_LEN: usize = 24;

#[derive(Clone)]
/// Handle used to push messages to one connected client.
pub struct ClientConnection {
    pub session_id: Uuid,
    /// Stable player identity, if the session presented one at join.
    pub player_id: Option<String>,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// One live room: the guarded game state plus its broadcast group.
///
/// The mutex serializes every mutation (commands, ticks, disconnects,
/// reaping); the connection map is lock-free so sends never contend with
/// state changes.
pub struct RoomHandle {
    code: String,
    room: Mutex<Room>,
    connections: DashMap<Uuid, ClientConnection>,
}

impl RoomHandle {
    fn new(room: Room) -> Self {
        Self {
            code: room.code.clone(),
            room: Mutex::new(room),
            connections: DashMap::new(),
        }
    }

    /// The room code, readable without taking the room lock.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Take the room's mutual-exclusion lock.
    pub async fn lock(&self) -> MutexGuard<'_, Room> {
        self.room.lock().await
    }

    /// Sessions currently attached to the broadcast group.
    pub fn connections(&self) -> &DashMap<Uuid, ClientConnection> {
        &self.connections
    }

    pub fn members_count(&self) -> usize {
        self.connections.len()
    }

    /// Join a session to the broadcast group.
    pub fn attach(&self, connection: ClientConnection) {
        self.connections.insert(connection.session_id, connection);
    }

    /// Remove a session from the broadcast group.
    pub fn detach(&self, session_id: &Uuid) {
        self.connections.remove(session_id);
    }

    /// Close every attached session's outbound channel. Used on teardown.
    pub fn close_all_connections(&self) {
        for entry in self.connections.iter() {
            let _ = entry.value().tx.send(Message::Close(None));
        }
        self.connections.clear();
    }
}

/// Process-wide registry mapping room codes to live rooms.
pub struct AppState {
    config: AppConfig,
    rooms: DashMap<String, Arc<RoomHandle>>,
}

impl AppState {
    /// Construct the shared state wrapped in an [`Arc`] so tasks can clone it
    /// cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        Arc::new(Self {
            config,
            rooms: DashMap::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry of live rooms, iterated by the ticker and the reaper.
    pub fn rooms(&self) -> &DashMap<String, Arc<RoomHandle>> {
        &self.rooms
    }

    /// Create a room with a fresh code and host key, returning both.
    ///
    /// Codes are rejection-sampled from the unambiguous alphabet until one is
    /// unused; the registry entry is claimed atomically so two concurrent
    /// creations can never share a code.
    pub fn create_room(&self, now: Instant) -> (String, String) {
        let host_key = generate_host_key();
        loop {
            let code = generate_room_code();
            match self.rooms.entry(code.clone()) {
                dashmap::Entry::Occupied(_) => continue,
                dashmap::Entry::Vacant(slot) => {
                    let room = Room::new(code.clone(), host_key.clone(), now);
                    slot.insert(Arc::new(RoomHandle::new(room)));
                    return (code, host_key);
                }
            }
        }
    }

    /// Case-insensitive room lookup.
    pub fn room(&self, code: &str) -> Option<Arc<RoomHandle>> {
        let code = code.trim().to_ascii_uppercase();
        self.rooms.get(&code).map(|entry| entry.value().clone())
    }

    /// Drop a room from the registry, closing its attached sessions.
    pub fn remove_room(&self, code: &str) -> Option<Arc<RoomHandle>> {
        let (_, handle) = self.rooms.remove(code)?;
        handle.close_all_connections();
        Some(handle)
    }
}

fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

fn generate_host_key() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(HOST_KEY_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SharedState {
        AppState::new(AppConfig::default())
    }

    #[test]
    fn created_codes_use_the_unambiguous_alphabet() {
        let state = state();
        for _ in 0..50 {
            let (code, host_key) = state.create_room(Instant::now());
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)));
            assert_eq!(host_key.len(), 24);
        }
        // every code was unique
        assert_eq!(state.rooms().len(), 50);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let state = state();
        let (code, _) = state.create_room(Instant::now());
        assert!(state.room(&code.to_lowercase()).is_some());
        assert!(state.room(&format!("  {code} ")).is_some());
        assert!(state.room("QQQQ2").is_none());
    }

    #[test]
    fn remove_room_clears_registry_entry() {
        let state = state();
        let (code, _) = state.create_room(Instant::now());
        assert!(state.remove_room(&code).is_some());
        assert!(state.room(&code).is_none());
        assert!(state.remove_room(&code).is_none());
    }
}
