//! Local Room Registry: a per-node unique-name index over every room
//! (public and private) currently resident on this node. Grounded on
//! `examples/Zygimantass-slsk-rs/src/bin/server/state.rs`'s
//! `rooms: HashMap<String, Room>` / `get_or_create_room`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{ChatError, Result};
use crate::room::RoomHandle;

#[derive(Clone, Default)]
pub struct LocalRoomRegistry {
    inner: Arc<RwLock<HashMap<String, RoomHandle>>>,
}

impl LocalRoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, room_name: &str) -> Option<RoomHandle> {
        self.inner.read().await.get(room_name).cloned()
    }

    pub async fn contains(&self, room_name: &str) -> bool {
        self.inner.read().await.contains_key(room_name)
    }

    pub async fn register_unique(&self, room_name: String, handle: RoomHandle) -> Result<()> {
        let mut guard = self.inner.write().await;
        if guard.contains_key(&room_name) {
            return Err(ChatError::RoomAlreadyExists(room_name));
        }
        guard.insert(room_name, handle);
        Ok(())
    }

    pub async fn unregister(&self, room_name: &str) {
        self.inner.write().await.remove(room_name);
    }

    /// Every room name currently resident on this node (used to enumerate
    /// local private replicas for `LIST JOINED ROOMS`).
    pub async fn names(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }
}
