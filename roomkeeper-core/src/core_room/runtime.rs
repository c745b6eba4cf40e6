//! Live room occupancy
//!
//! The playback runtime owns the real connection counts. Listing only needs a
//! read of them, which is what [`RoomRuntime`] exposes.

use super::types::RoomId;
use std::collections::HashMap;
use std::sync::RwLock;

/// The slice of the room runtime this crate relies on
pub trait RoomRuntime: Send + Sync {
    /// Number of clients currently connected to the room
    fn client_num(&self, room_id: RoomId) -> i64;

    /// Disconnect everything attached to a room that no longer exists
    fn close_room(&self, room_id: RoomId);
}

/// In-process client counter
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<RoomId, i64>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a client joining; returns the new count
    pub fn join(&self, room_id: RoomId) -> i64 {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        let count = clients.entry(room_id).or_insert(0);
        *count += 1;
        *count
    }
}

impl RoomRuntime for ClientRegistry {
    fn client_num(&self, room_id: RoomId) -> i64 {
        let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
        clients.get(&room_id).copied().unwrap_or(0)
    }

    fn close_room(&self, room_id: RoomId) {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        clients.remove(&room_id);
    }
}
