//! Room State Object and its actor implementation.
//!
//! Every Room is a task with a mailbox (`RoomOp` messages), matching the
//! actor shape of `other_examples/.../chat-server-src-actor.rs`'s
//! `RoomActor`/`RoomHandle`. Because the task processes one message at a
//! time, every mutation is automatically serialized relative to every other
//! mutation on the same room: operations on a single room are linearizable.

use tokio::sync::{mpsc, oneshot};

use crate::error::{ChatError, Result};
use crate::local_registry::LocalRoomRegistry;
use crate::node::NodeId;
use crate::registry::{RegistryHandle, RegistryKey};
use crate::user::UserSnapshot;

/// Public rooms are resident on one node (the admin's); private rooms are
/// replicated once per member's node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    Public,
    Private,
}

pub const PRIVATE_SUFFIX: &str = "@private";

/// Appends `@private` to `name` if `kind` is `Private` and it's not already
/// present.
pub fn normalize_name(name: &str, kind: RoomKind) -> String {
    match kind {
        RoomKind::Public => name.to_string(),
        RoomKind::Private => {
            if name.ends_with(PRIVATE_SUFFIX) {
                name.to_string()
            } else {
                format!("{name}{PRIVATE_SUFFIX}")
            }
        }
    }
}

pub fn is_private_name(name: &str) -> bool {
    name.ends_with(PRIVATE_SUFFIX)
}

/// A read-only snapshot of a room's full state (`inspect`).
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub name: String,
    pub description: String,
    pub members: Vec<UserSnapshot>,
    pub admin: UserSnapshot,
}

enum RoomOp {
    AddMember {
        user: UserSnapshot,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveMember {
        user_number: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SetDescription {
        description: String,
        reply: oneshot::Sender<()>,
    },
    SetAdmin {
        user: UserSnapshot,
        reply: oneshot::Sender<()>,
    },
    UpdateMember {
        user: UserSnapshot,
        reply: oneshot::Sender<()>,
    },
    Members {
        reply: oneshot::Sender<Vec<UserSnapshot>>,
    },
    Admin {
        reply: oneshot::Sender<UserSnapshot>,
    },
    Description {
        reply: oneshot::Sender<String>,
    },
    Inspect {
        reply: oneshot::Sender<RoomInfo>,
    },
    IsMember {
        user: UserSnapshot,
        reply: oneshot::Sender<bool>,
    },
    IsMemberByNumber {
        user_number: String,
        reply: oneshot::Sender<bool>,
    },
    IsAdmin {
        user: UserSnapshot,
        reply: oneshot::Sender<bool>,
    },
    Delete {
        reply: oneshot::Sender<()>,
    },
}

struct RoomActorState {
    description: String,
    members: Vec<UserSnapshot>,
    admin: UserSnapshot,
}

/// Cloneable handle to a room actor task.
#[derive(Clone)]
pub struct RoomHandle {
    pub name: String,
    pub kind: RoomKind,
    pub home_node: NodeId,
    tx: mpsc::Sender<RoomOp>,
}

impl RoomHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomOp,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ChatError::RoomNotFound(self.name.clone()))?;
        rx.await
            .map_err(|_| ChatError::RoomNotFound(self.name.clone()))
    }

    pub async fn add_member(&self, user: UserSnapshot) -> Result<()> {
        self.call(|reply| RoomOp::AddMember { user, reply }).await?
    }

    pub async fn remove_member(&self, user_number: &str) -> Result<()> {
        self.call(|reply| RoomOp::RemoveMember {
            user_number: user_number.to_string(),
            reply,
        })
        .await?
    }

    pub async fn set_description(&self, description: String) -> Result<()> {
        self.call(|reply| RoomOp::SetDescription { description, reply })
            .await
    }

    pub async fn set_admin(&self, user: UserSnapshot) -> Result<()> {
        self.call(|reply| RoomOp::SetAdmin { user, reply }).await
    }

    pub async fn update_member(&self, user: UserSnapshot) -> Result<()> {
        self.call(|reply| RoomOp::UpdateMember { user, reply }).await
    }

    pub async fn members(&self) -> Result<Vec<UserSnapshot>> {
        self.call(|reply| RoomOp::Members { reply }).await
    }

    pub async fn admin(&self) -> Result<UserSnapshot> {
        self.call(|reply| RoomOp::Admin { reply }).await
    }

    pub async fn description(&self) -> Result<String> {
        self.call(|reply| RoomOp::Description { reply }).await
    }

    pub async fn inspect(&self) -> Result<RoomInfo> {
        self.call(|reply| RoomOp::Inspect { reply }).await
    }

    pub async fn is_member(&self, user: &UserSnapshot) -> Result<bool> {
        self.call(|reply| RoomOp::IsMember {
            user: user.clone(),
            reply,
        })
        .await
    }

    pub async fn is_member_by_number(&self, user_number: &str) -> Result<bool> {
        self.call(|reply| RoomOp::IsMemberByNumber {
            user_number: user_number.to_string(),
            reply,
        })
        .await
    }

    pub async fn is_admin(&self, user: &UserSnapshot) -> Result<bool> {
        self.call(|reply| RoomOp::IsAdmin {
            user: user.clone(),
            reply,
        })
        .await
    }

    /// Tears the room actor down and unregisters it from the local index
    /// (and, if public, the cluster registry) before the actor task exits.
    pub async fn delete(&self) -> Result<()> {
        self.call(|reply| RoomOp::Delete { reply }).await
    }
}

fn spawn_actor(
    name: String,
    kind: RoomKind,
    home_node: NodeId,
    state: RoomActorState,
    local: LocalRoomRegistry,
    cluster: RegistryHandle,
) -> RoomHandle {
    let (tx, mut rx) = mpsc::channel::<RoomOp>(256);

    tokio::spawn(async move {
        let mut state = state;
        while let Some(op) = rx.recv().await {
            match op {
                RoomOp::AddMember { user, reply } => {
                    let result = if state.members.iter().any(|m| m.user_number == user.user_number) {
                        Err(ChatError::MemberAlreadyExists(user.user_number.clone()))
                    } else {
                        state.members.push(user);
                        Ok(())
                    };
                    let _ = reply.send(result);
                }
                RoomOp::RemoveMember { user_number, reply } => {
                    let before = state.members.len();
                    state.members.retain(|m| m.user_number != user_number);
                    let result = if state.members.len() == before {
                        Err(ChatError::MemberNotFound(user_number))
                    } else {
                        Ok(())
                    };
                    let _ = reply.send(result);
                }
                RoomOp::SetDescription { description, reply } => {
                    state.description = description;
                    let _ = reply.send(());
                }
                RoomOp::SetAdmin { user, reply } => {
                    state.admin = user;
                    let _ = reply.send(());
                }
                RoomOp::UpdateMember { user, reply } => {
                    for m in state.members.iter_mut() {
                        if m.user_number == user.user_number {
                            *m = user.clone();
                        }
                    }
                    if state.admin.user_number == user.user_number {
                        state.admin = user;
                    }
                    let _ = reply.send(());
                }
                RoomOp::Members { reply } => {
                    let _ = reply.send(state.members.clone());
                }
                RoomOp::Admin { reply } => {
                    let _ = reply.send(state.admin.clone());
                }
                RoomOp::Description { reply } => {
                    let _ = reply.send(state.description.clone());
                }
                RoomOp::Inspect { reply } => {
                    let _ = reply.send(RoomInfo {
                        name: name.clone(),
                        description: state.description.clone(),
                        members: state.members.clone(),
                        admin: state.admin.clone(),
                    });
                }
                RoomOp::IsMember { user, reply } => {
                    let _ = reply.send(state.members.contains(&user));
                }
                RoomOp::IsMemberByNumber { user_number, reply } => {
                    let _ = reply.send(
                        state
                            .members
                            .iter()
                            .any(|m| m.user_number == user_number),
                    );
                }
                RoomOp::IsAdmin { user, reply } => {
                    let _ = reply.send(state.admin == user);
                }
                RoomOp::Delete { reply } => {
                    let _ = reply.send(());
                    local.unregister(&name).await;
                    if kind == RoomKind::Public {
                        cluster.unregister(RegistryKey::Room(name.clone())).await;
                    }
                    break;
                }
            }
        }
    });

    RoomHandle {
        name,
        kind,
        home_node,
        tx,
    }
}

/// Creates a new room: normalizes the name, spawns the actor with
/// `members = [owner] ++ members`, `admin = owner`, and registers it in the
/// local index (and, for public rooms, the cluster registry too). Returns
/// the normalized name and a handle.
pub async fn create_room(
    name: &str,
    owner: UserSnapshot,
    kind: RoomKind,
    description: String,
    members: Vec<UserSnapshot>,
    home_node: NodeId,
    local: &LocalRoomRegistry,
    cluster: &RegistryHandle,
) -> Result<RoomHandle> {
    let normalized = normalize_name(name, kind);

    match kind {
        RoomKind::Public => {
            cluster
                .register(RegistryKey::Room(normalized.clone()), home_node.clone())
                .await?;
        }
        RoomKind::Private => {
            if local.contains(&normalized).await {
                return Err(ChatError::RoomAlreadyExists(normalized));
            }
        }
    }

    let mut all_members = vec![owner.clone()];
    all_members.extend(members);

    let state = RoomActorState {
        description,
        members: all_members,
        admin: owner,
    };
    let handle = spawn_actor(
        normalized.clone(),
        kind,
        home_node,
        state,
        local.clone(),
        cluster.clone(),
    );

    if let Err(e) = local.register_unique(normalized.clone(), handle.clone()).await {
        if matches!(kind, RoomKind::Public) {
            cluster.unregister(RegistryKey::Room(normalized)).await;
        }
        return Err(e);
    }

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_registry::LocalRoomRegistry;
    use crate::registry::spawn_registry;

    fn snap(n: &str) -> UserSnapshot {
        UserSnapshot {
            user_number: n.to_string(),
            user_name: format!("user{n}"),
            node: NodeId::new("a"),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn create_registers_owner_as_admin_and_member() {
        let local = LocalRoomRegistry::new();
        let cluster = spawn_registry();
        let handle = create_room(
            "general",
            snap("1"),
            RoomKind::Public,
            "chat".into(),
            vec![],
            NodeId::new("a"),
            &local,
            &cluster,
        )
        .await
        .unwrap();

        assert_eq!(handle.name, "general");
        assert_eq!(handle.members().await.unwrap(), vec![snap("1")]);
        assert_eq!(handle.admin().await.unwrap(), snap("1"));
    }

    #[tokio::test]
    async fn private_name_gets_normalized() {
        let local = LocalRoomRegistry::new();
        let cluster = spawn_registry();
        let handle = create_room(
            "secret",
            snap("1"),
            RoomKind::Private,
            String::new(),
            vec![],
            NodeId::new("a"),
            &local,
            &cluster,
        )
        .await
        .unwrap();
        assert_eq!(handle.name, "secret@private");
    }

    #[tokio::test]
    async fn duplicate_public_room_is_rejected() {
        let local = LocalRoomRegistry::new();
        let cluster = spawn_registry();
        create_room(
            "general",
            snap("1"),
            RoomKind::Public,
            String::new(),
            vec![],
            NodeId::new("a"),
            &local,
            &cluster,
        )
        .await
        .unwrap();

        let err = create_room(
            "general",
            snap("2"),
            RoomKind::Public,
            String::new(),
            vec![],
            NodeId::new("b"),
            &local,
            &cluster,
        )
        .await
        .unwrap_err();
        assert_eq!(err, ChatError::RoomAlreadyExists("general".into()));
    }

    #[tokio::test]
    async fn add_member_rejects_duplicate() {
        let local = LocalRoomRegistry::new();
        let cluster = spawn_registry();
        let handle = create_room(
            "general",
            snap("1"),
            RoomKind::Public,
            String::new(),
            vec![],
            NodeId::new("a"),
            &local,
            &cluster,
        )
        .await
        .unwrap();

        handle.add_member(snap("2")).await.unwrap();
        let err = handle.add_member(snap("2")).await.unwrap_err();
        assert_eq!(err, ChatError::MemberAlreadyExists("2".into()));
    }

    #[tokio::test]
    async fn update_member_refreshes_admin_snapshot() {
        let local = LocalRoomRegistry::new();
        let cluster = spawn_registry();
        let handle = create_room(
            "general",
            snap("1"),
            RoomKind::Public,
            String::new(),
            vec![],
            NodeId::new("a"),
            &local,
            &cluster,
        )
        .await
        .unwrap();

        let mut renamed = snap("1");
        renamed.user_name = "Alicia".into();
        handle.update_member(renamed.clone()).await.unwrap();
        assert_eq!(handle.admin().await.unwrap(), renamed);
    }
}
