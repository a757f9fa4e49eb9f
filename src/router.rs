//! Router: resolves a room name to the node that hosts it and dispatches
//! the operation there, transparently to whether "there" is this process
//! or a sibling node reached through `InProcessPeerLink`.
//!
//! Grounded on the teacher's `ServerState::get_or_create_room`
//! (`examples/Zygimantass-slsk-rs/src/bin/server/state.rs`), generalized
//! from "always local" to "local or remote, looked up through the cluster
//! registry".

use std::collections::HashSet;

use tokio::task::JoinSet;

use crate::error::{ChatError, Result};
use crate::local_registry::LocalRoomRegistry;
use crate::node::NodeId;
use crate::registry::RegistryKey;
use crate::room::{self, is_private_name, RoomHandle, RoomInfo, RoomKind};
use crate::transport::{apply_op, Cluster, InProcessPeerLink, RoomRemoteOp, RoomRemoteReply};
use crate::user::UserSnapshot;

/// Where a resolved room lives relative to this node.
pub enum RoomTarget {
    Local(RoomHandle),
    Remote(NodeId),
}

/// Per-node routing facade: the one thing the dispatcher calls to reach a
/// room by name, whether public or private, local or remote.
#[derive(Clone)]
pub struct Router {
    pub node_id: NodeId,
    pub cluster: Cluster,
    pub local_rooms: LocalRoomRegistry,
    pub peer_link: InProcessPeerLink,
}

impl Router {
    pub fn new(
        node_id: NodeId,
        cluster: Cluster,
        local_rooms: LocalRoomRegistry,
        peer_link: InProcessPeerLink,
    ) -> Self {
        Router {
            node_id,
            cluster,
            local_rooms,
            peer_link,
        }
    }

    /// Resolution rules: private rooms never leave this node; public rooms
    /// are looked up in the cluster registry and branch local-vs-remote on
    /// the result.
    pub async fn resolve(&self, room_name: &str) -> Result<RoomTarget> {
        if is_private_name(room_name) {
            return match self.local_rooms.lookup(room_name).await {
                Some(handle) => Ok(RoomTarget::Local(handle)),
                None => Err(ChatError::RoomNotFound(room_name.to_string())),
            };
        }

        let node = self
            .cluster
            .registry
            .lookup(RegistryKey::Room(room_name.to_string()))
            .await
            .ok_or_else(|| ChatError::RoomNotFound(room_name.to_string()))?;

        if node == self.node_id {
            match self.local_rooms.lookup(room_name).await {
                Some(handle) => Ok(RoomTarget::Local(handle)),
                None => Err(ChatError::RoomNotFound(room_name.to_string())),
            }
        } else {
            Ok(RoomTarget::Remote(node))
        }
    }

    /// Resolves `room_name` and applies `op`, either directly (local) or
    /// through the peer link (remote), wrapped in the link's 5s timeout.
    pub async fn dispatch_room_op(&self, room_name: &str, op: RoomRemoteOp) -> Result<RoomRemoteReply> {
        match self.resolve(room_name).await? {
            RoomTarget::Local(handle) => Ok(apply_op(&handle, op).await),
            RoomTarget::Remote(node) => {
                self.peer_link
                    .call_room(&node, room_name, &node, op)
                    .await
            }
        }
    }

    async fn unit(&self, room_name: &str, op: RoomRemoteOp) -> Result<()> {
        match self.dispatch_room_op(room_name, op).await? {
            RoomRemoteReply::Unit(r) => r,
            _ => Err(ChatError::Transport("unexpected reply shape".into())),
        }
    }

    pub async fn add_member(&self, room_name: &str, user: UserSnapshot) -> Result<()> {
        self.unit(room_name, RoomRemoteOp::AddMember(user)).await
    }

    pub async fn remove_member(&self, room_name: &str, user_number: &str) -> Result<()> {
        self.unit(room_name, RoomRemoteOp::RemoveMember(user_number.to_string()))
            .await
    }

    pub async fn set_description(&self, room_name: &str, description: String) -> Result<()> {
        self.unit(room_name, RoomRemoteOp::SetDescription(description))
            .await
    }

    pub async fn set_admin(&self, room_name: &str, user: UserSnapshot) -> Result<()> {
        self.unit(room_name, RoomRemoteOp::SetAdmin(user)).await
    }

    pub async fn update_member(&self, room_name: &str, user: UserSnapshot) -> Result<()> {
        self.unit(room_name, RoomRemoteOp::UpdateMember(user)).await
    }

    pub async fn members(&self, room_name: &str) -> Result<Vec<UserSnapshot>> {
        match self.dispatch_room_op(room_name, RoomRemoteOp::Members).await? {
            RoomRemoteReply::Members(r) => r,
            _ => Err(ChatError::Transport("unexpected reply shape".into())),
        }
    }

    pub async fn admin(&self, room_name: &str) -> Result<UserSnapshot> {
        match self.dispatch_room_op(room_name, RoomRemoteOp::Admin).await? {
            RoomRemoteReply::Snapshot(r) => r,
            _ => Err(ChatError::Transport("unexpected reply shape".into())),
        }
    }

    pub async fn description(&self, room_name: &str) -> Result<String> {
        match self
            .dispatch_room_op(room_name, RoomRemoteOp::Description)
            .await?
        {
            RoomRemoteReply::Description(r) => r,
            _ => Err(ChatError::Transport("unexpected reply shape".into())),
        }
    }

    pub async fn inspect(&self, room_name: &str) -> Result<RoomInfo> {
        match self.dispatch_room_op(room_name, RoomRemoteOp::Inspect).await? {
            RoomRemoteReply::Info(r) => r,
            _ => Err(ChatError::Transport("unexpected reply shape".into())),
        }
    }

    pub async fn is_member(&self, room_name: &str, user: &UserSnapshot) -> Result<bool> {
        match self
            .dispatch_room_op(room_name, RoomRemoteOp::IsMember(user.clone()))
            .await?
        {
            RoomRemoteReply::Flag(r) => r,
            _ => Err(ChatError::Transport("unexpected reply shape".into())),
        }
    }

    pub async fn is_member_by_number(&self, room_name: &str, user_number: &str) -> Result<bool> {
        match self
            .dispatch_room_op(
                room_name,
                RoomRemoteOp::IsMemberByNumber(user_number.to_string()),
            )
            .await?
        {
            RoomRemoteReply::Flag(r) => r,
            _ => Err(ChatError::Transport("unexpected reply shape".into())),
        }
    }

    pub async fn is_admin(&self, room_name: &str, user: &UserSnapshot) -> Result<bool> {
        match self
            .dispatch_room_op(room_name, RoomRemoteOp::IsAdmin(user.clone()))
            .await?
        {
            RoomRemoteReply::Flag(r) => r,
            _ => Err(ChatError::Transport("unexpected reply shape".into())),
        }
    }

    pub async fn delete(&self, room_name: &str) -> Result<()> {
        self.unit(room_name, RoomRemoteOp::Delete).await
    }

    /// Answers "on which node": `None` means the room doesn't exist (from
    /// this node's point of view — a private room name that isn't resident
    /// here is simply absent, never "elsewhere").
    pub async fn get_node(&self, room_name: &str) -> Option<NodeId> {
        if is_private_name(room_name) {
            return if self.local_rooms.contains(room_name).await {
                Some(self.node_id.clone())
            } else {
                None
            };
        }
        self.cluster
            .registry
            .lookup(RegistryKey::Room(room_name.to_string()))
            .await
    }

    /// Creates a room replica on a specific node — used for public-room
    /// migration (admin leaves, a new home node takes over) and for
    /// spreading a private room's replica to a newly invited member's node.
    pub async fn route_to(
        &self,
        node: &NodeId,
        room_name: &str,
        owner: UserSnapshot,
        kind: RoomKind,
        description: String,
        members: Vec<UserSnapshot>,
    ) -> Result<()> {
        if *node == self.node_id {
            room::create_room(
                room_name,
                owner,
                kind,
                description,
                members,
                node.clone(),
                &self.local_rooms,
                &self.cluster.registry,
            )
            .await
            .map(|_| ())
        } else {
            let op = RoomRemoteOp::Create {
                owner,
                kind,
                description,
                members,
            };
            match self.peer_link.call_room(node, room_name, node, op).await? {
                RoomRemoteReply::Unit(r) => r,
                _ => Err(ChatError::Transport("unexpected reply shape".into())),
            }
        }
    }

    /// Applies `op` once per distinct node among `members` — private-room
    /// replication for invite/leave/remove/describe/delete all need to
    /// reach every member's local copy. Best-effort: a failure on one node
    /// is logged and does not stop delivery to the others.
    pub async fn apply_to_all_members(
        &self,
        room_name: &str,
        members: &[UserSnapshot],
        op: RoomRemoteOp,
    ) -> Result<()> {
        let nodes: HashSet<NodeId> = members.iter().map(|m| m.node.clone()).collect();
        let mut set = JoinSet::new();

        for node in nodes {
            let room_name = room_name.to_string();
            let op = op.clone();
            if node == self.node_id {
                let local_rooms = self.local_rooms.clone();
                set.spawn(async move {
                    let handle = local_rooms.lookup(&room_name).await;
                    (node, match handle {
                        Some(h) => Ok(apply_op(&h, op).await),
                        None => Err(ChatError::RoomNotFound(room_name)),
                    })
                });
            } else {
                let peer_link = self.peer_link.clone();
                set.spawn(async move {
                    let result = peer_link.call_room(&node, &room_name, &node, op).await;
                    (node, result)
                });
            }
        }

        while let Some(joined) = set.join_next().await {
            if let Ok((node, result)) = joined {
                if let Err(e) = result {
                    tracing::warn!(%node, error = %e, "replica update failed on member node");
                }
            }
        }

        Ok(())
    }
}
