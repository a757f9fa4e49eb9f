//! User state.
//!
//! A `User` lives on the node whose TCP connection established it. Because
//! only that connection's session task ever mutates its own entry, the
//! per-node directory below is a shared map guarded by an
//! `RwLock` rather than a full actor — the same shape as the teacher's
//! `Arc<RwLock<ServerState>>` / `HashMap<String, UserSession>`
//! (`examples/Zygimantass-slsk-rs/src/bin/server/state.rs`), just scoped to
//! users instead of the whole server.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::error::{ChatError, Result};
use crate::node::NodeId;

/// An immutable copy of a user record embedded in a room's member list
/// (GLOSSARY: "Member snapshot"). Refreshed by `Room::update_member`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSnapshot {
    pub user_number: String,
    pub user_name: String,
    pub node: NodeId,
    pub description: String,
}

/// The live record for a user logged in on this node: their current
/// snapshot, the channel that delivers text to their socket's writer task,
/// and the set of rooms they currently belong to (kept so that
/// `SET MY DESCRIPTION`/`SET MY USER NAME` and `LIST JOINED ROOMS` don't
/// need to scan every room on every node).
#[derive(Debug)]
pub struct UserEntry {
    pub snapshot: UserSnapshot,
    pub tx: mpsc::UnboundedSender<String>,
    pub joined_rooms: HashSet<String>,
}

/// Per-node registry of currently logged-in users, keyed by `user_number`.
#[derive(Clone, Default)]
pub struct UserDirectory {
    inner: Arc<RwLock<HashMap<String, UserEntry>>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(
        &self,
        user_number: String,
        user_name: String,
        node: NodeId,
        tx: mpsc::UnboundedSender<String>,
    ) -> UserSnapshot {
        let snapshot = UserSnapshot {
            user_number: user_number.clone(),
            user_name,
            node,
            description: String::new(),
        };
        let entry = UserEntry {
            snapshot: snapshot.clone(),
            tx,
            joined_rooms: HashSet::new(),
        };
        self.inner.write().await.insert(user_number, entry);
        snapshot
    }

    pub async fn remove(&self, user_number: &str) -> Option<UserEntry> {
        self.inner.write().await.remove(user_number)
    }

    pub async fn snapshot(&self, user_number: &str) -> Result<UserSnapshot> {
        self.inner
            .read()
            .await
            .get(user_number)
            .map(|e| e.snapshot.clone())
            .ok_or_else(|| ChatError::UserNotFound(user_number.to_string()))
    }

    pub async fn deliver(&self, user_number: &str, text: &str) -> bool {
        let guard = self.inner.read().await;
        match guard.get(user_number) {
            Some(entry) => entry.tx.send(text.to_string()).is_ok(),
            None => false,
        }
    }

    pub async fn set_description(&self, user_number: &str, description: String) -> Result<UserSnapshot> {
        let mut guard = self.inner.write().await;
        let entry = guard
            .get_mut(user_number)
            .ok_or_else(|| ChatError::UserNotFound(user_number.to_string()))?;
        entry.snapshot.description = description;
        Ok(entry.snapshot.clone())
    }

    pub async fn set_user_name(&self, user_number: &str, user_name: String) -> Result<UserSnapshot> {
        let mut guard = self.inner.write().await;
        let entry = guard
            .get_mut(user_number)
            .ok_or_else(|| ChatError::UserNotFound(user_number.to_string()))?;
        entry.snapshot.user_name = user_name;
        Ok(entry.snapshot.clone())
    }

    pub async fn note_joined(&self, user_number: &str, room_name: &str) {
        if let Some(entry) = self.inner.write().await.get_mut(user_number) {
            entry.joined_rooms.insert(room_name.to_string());
        }
    }

    pub async fn note_left(&self, user_number: &str, room_name: &str) {
        if let Some(entry) = self.inner.write().await.get_mut(user_number) {
            entry.joined_rooms.remove(room_name);
        }
    }

    pub async fn joined_rooms(&self, user_number: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .get(user_number)
            .map(|e| e.joined_rooms.iter().cloned().collect())
            .unwrap_or_default()
    }
}
