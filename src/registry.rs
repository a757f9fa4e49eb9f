//! Cluster Name Registry.
//!
//! A single coordinator task owns the cluster-wide mapping of
//! `(kind, key) -> node`, reached by every node through a cloned
//! `mpsc::Sender`. A single authoritative coordinator is a valid
//! consistency model here; register/unregister are linearized by virtue of
//! being processed one at a time by this single task, which gives the
//! register-fails-if-exists and lookup-observes-prior-register guarantees
//! without needing consensus. The actor-with-a-mailbox shape follows
//! `other_examples/.../chat-server-src-actor.rs`'s `RoomActor`/`RoomHandle`
//! pattern, generalized here to the registry's key/value shape.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use crate::error::{ChatError, Result};
use crate::node::NodeId;

/// A tagged cluster registration key ("Cluster registration entries").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegistryKey {
    User(String),
    Room(String),
}

impl RegistryKey {
    fn kind(&self) -> EntryKind {
        match self {
            RegistryKey::User(_) => EntryKind::User,
            RegistryKey::Room(_) => EntryKind::Room,
        }
    }

    fn name(&self) -> &str {
        match self {
            RegistryKey::User(n) => n,
            RegistryKey::Room(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Room,
}

enum RegistryCommand {
    Register {
        key: RegistryKey,
        node: NodeId,
        reply: oneshot::Sender<Result<()>>,
    },
    Unregister {
        key: RegistryKey,
        reply: oneshot::Sender<()>,
    },
    Lookup {
        key: RegistryKey,
        reply: oneshot::Sender<Option<NodeId>>,
    },
    Enumerate {
        kind: EntryKind,
        reply: oneshot::Sender<Vec<(String, NodeId)>>,
    },
}

/// Cloneable handle to the registry coordinator task.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// `register` is atomic: it fails with `RoomAlreadyExists` /
    /// `UserAlreadyLoggedIn` if the entry already exists.
    pub async fn register(&self, key: RegistryKey, node: NodeId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Register { key, node, reply })
            .await
            .map_err(|_| ChatError::Transport("registry coordinator gone".into()))?;
        rx.await
            .map_err(|_| ChatError::Transport("registry coordinator dropped reply".into()))?
    }

    /// Idempotent: silently no-ops if the entry is absent.
    pub async fn unregister(&self, key: RegistryKey) {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(RegistryCommand::Unregister { key, reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    pub async fn lookup(&self, key: RegistryKey) -> Option<NodeId> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(RegistryCommand::Lookup { key, reply })
            .await
            .is_err()
        {
            return None;
        }
        rx.await.unwrap_or(None)
    }

    /// Lists every registered entry of a given kind (used for
    /// `LIST ACCESSIBLE ROOMS`, and available for user enumeration).
    pub async fn enumerate(&self, kind: EntryKind) -> Vec<(String, NodeId)> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(RegistryCommand::Enumerate { kind, reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

/// Spawns the coordinator task and returns a handle to it.
pub fn spawn_registry() -> RegistryHandle {
    let (tx, mut rx) = mpsc::channel::<RegistryCommand>(256);

    tokio::spawn(async move {
        let mut entries: HashMap<RegistryKey, NodeId> = HashMap::new();

        while let Some(cmd) = rx.recv().await {
            match cmd {
                RegistryCommand::Register { key, node, reply } => {
                    let result = if entries.contains_key(&key) {
                        Err(match key.kind() {
                            EntryKind::Room => ChatError::RoomAlreadyExists(key.name().to_string()),
                            EntryKind::User => {
                                ChatError::UserAlreadyLoggedIn(key.name().to_string())
                            }
                        })
                    } else {
                        entries.insert(key, node);
                        Ok(())
                    };
                    let _ = reply.send(result);
                }
                RegistryCommand::Unregister { key, reply } => {
                    entries.remove(&key);
                    let _ = reply.send(());
                }
                RegistryCommand::Lookup { key, reply } => {
                    let _ = reply.send(entries.get(&key).cloned());
                }
                RegistryCommand::Enumerate { kind, reply } => {
                    let list = entries
                        .iter()
                        .filter(|(k, _)| k.kind() == kind)
                        .map(|(k, v)| (k.name().to_string(), v.clone()))
                        .collect();
                    let _ = reply.send(list);
                }
            }
        }
    });

    RegistryHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_rejects_duplicate_room() {
        let reg = spawn_registry();
        let a = NodeId::new("a");
        let b = NodeId::new("b");
        reg.register(RegistryKey::Room("general".into()), a.clone())
            .await
            .unwrap();
        let err = reg
            .register(RegistryKey::Room("general".into()), b)
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::RoomAlreadyExists("general".into()));
        assert_eq!(
            reg.lookup(RegistryKey::Room("general".into())).await,
            Some(a)
        );
    }

    #[tokio::test]
    async fn unregister_then_register_succeeds() {
        let reg = spawn_registry();
        let a = NodeId::new("a");
        reg.register(RegistryKey::User("1".into()), a.clone())
            .await
            .unwrap();
        reg.unregister(RegistryKey::User("1".into())).await;
        // Idempotent no-op on an absent key.
        reg.unregister(RegistryKey::User("1".into())).await;
        reg.register(RegistryKey::User("1".into()), a)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn enumerate_filters_by_kind() {
        let reg = spawn_registry();
        let a = NodeId::new("a");
        reg.register(RegistryKey::Room("x".into()), a.clone())
            .await
            .unwrap();
        reg.register(RegistryKey::User("1".into()), a).await.unwrap();
        let rooms = reg.enumerate(EntryKind::Room).await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].0, "x");
    }
}
