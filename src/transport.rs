//! Inter-node transport.
//!
//! `InProcessPeerLink` is the boundary the Router calls through to reach a
//! room that lives on a different node, implemented with
//! `tokio::sync::{mpsc, oneshot}` channels into each sibling node's inbox
//! task — the in-process stand-in for a request-reply message with a
//! correlation id and a per-call timeout. A networked implementation (e.g.
//! over TCP) would expose the same `call_room` signature and could be
//! swapped in without touching `Router`/`Dispatcher`.
//!
//! The inbox task is this node's half of per-node task pools executing
//! remote invocations on behalf of other nodes: it owns nothing but a
//! reference to this node's `LocalRoomRegistry` (and the shared cluster
//! registry, for `Create`) and dispatches each incoming call to the named
//! room's actor handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::error::{ChatError, Result};
use crate::local_registry::LocalRoomRegistry;
use crate::node::NodeId;
use crate::registry::{spawn_registry, RegistryHandle};
use crate::room::{self, RoomInfo, RoomKind};
use crate::user::UserSnapshot;

/// One remote-invocable room operation, plus the arguments it needs.
#[derive(Clone)]
pub enum RoomRemoteOp {
    Create {
        owner: UserSnapshot,
        kind: RoomKind,
        description: String,
        members: Vec<UserSnapshot>,
    },
    AddMember(UserSnapshot),
    RemoveMember(String),
    SetDescription(String),
    SetAdmin(UserSnapshot),
    UpdateMember(UserSnapshot),
    Members,
    Admin,
    Description,
    Inspect,
    IsMember(UserSnapshot),
    IsMemberByNumber(String),
    IsAdmin(UserSnapshot),
    Delete,
}

/// The reply shape matching each `RoomRemoteOp` variant.
pub enum RoomRemoteReply {
    Unit(Result<()>),
    Members(Result<Vec<UserSnapshot>>),
    Snapshot(Result<UserSnapshot>),
    Description(Result<String>),
    Info(Result<RoomInfo>),
    Flag(Result<bool>),
}

struct RemoteCall {
    room_name: String,
    home_node: NodeId,
    op: RoomRemoteOp,
    reply: oneshot::Sender<Result<RoomRemoteReply>>,
}

#[derive(Clone)]
struct NodeInbox {
    tx: mpsc::Sender<RemoteCall>,
}

/// Shared cluster fabric: the name registry coordinator plus the directory
/// of every node's inbox. One `Cluster` is shared by every `Node` in a
/// process.
#[derive(Clone)]
pub struct Cluster {
    pub registry: RegistryHandle,
    nodes: Arc<RwLock<HashMap<NodeId, NodeInbox>>>,
    pub remote_call_timeout: Duration,
}

impl Cluster {
    pub fn new(remote_call_timeout: Duration) -> Self {
        Cluster {
            registry: spawn_registry(),
            nodes: Arc::new(RwLock::new(HashMap::new())),
            remote_call_timeout,
        }
    }

    /// Spawns this node's remote-invocation inbox task and registers it so
    /// other nodes can route calls to it. Returns a `PeerLink` the node's
    /// own `Router` uses to reach every node (including, in principle,
    /// itself — though `Router` only ever calls out for rooms it doesn't
    /// host locally).
    pub async fn join_node(
        &self,
        node_id: NodeId,
        local_rooms: LocalRoomRegistry,
    ) -> InProcessPeerLink {
        let (tx, mut rx) = mpsc::channel::<RemoteCall>(256);
        let registry = self.registry.clone();

        tokio::spawn(async move {
            while let Some(call) = rx.recv().await {
                let reply =
                    handle_remote_call(&local_rooms, &registry, call.room_name, call.home_node, call.op)
                        .await;
                let _ = call.reply.send(reply);
            }
        });

        self.nodes.write().await.insert(node_id, NodeInbox { tx });

        InProcessPeerLink {
            nodes: self.nodes.clone(),
            timeout: self.remote_call_timeout,
        }
    }
}

async fn handle_remote_call(
    local_rooms: &LocalRoomRegistry,
    registry: &RegistryHandle,
    room_name: String,
    home_node: NodeId,
    op: RoomRemoteOp,
) -> Result<RoomRemoteReply> {
    if let RoomRemoteOp::Create {
        owner,
        kind,
        description,
        members,
    } = op
    {
        let result = room::create_room(
            &room_name,
            owner,
            kind,
            description,
            members,
            home_node,
            local_rooms,
            registry,
        )
        .await
        .map(|_handle| ());
        return Ok(RoomRemoteReply::Unit(result));
    }

    let handle = local_rooms
        .lookup(&room_name)
        .await
        .ok_or_else(|| ChatError::RoomNotFound(room_name.clone()))?;

    Ok(apply_op(&handle, op).await)
}

/// Applies one `RoomRemoteOp` to a room actor handle that is already known
/// to be reachable (either because it's local, or because the caller just
/// looked it up on behalf of a remote request). Shared by the inbox task
/// above and by `Router`'s local fast path, so the op-to-method mapping is
/// defined exactly once.
pub async fn apply_op(handle: &room::RoomHandle, op: RoomRemoteOp) -> RoomRemoteReply {
    match op {
        RoomRemoteOp::Create { .. } => {
            unreachable!("Create has no existing handle to apply to")
        }
        RoomRemoteOp::AddMember(user) => RoomRemoteReply::Unit(handle.add_member(user).await),
        RoomRemoteOp::RemoveMember(n) => RoomRemoteReply::Unit(handle.remove_member(&n).await),
        RoomRemoteOp::SetDescription(d) => RoomRemoteReply::Unit(handle.set_description(d).await),
        RoomRemoteOp::SetAdmin(u) => RoomRemoteReply::Unit(handle.set_admin(u).await),
        RoomRemoteOp::UpdateMember(u) => RoomRemoteReply::Unit(handle.update_member(u).await),
        RoomRemoteOp::Members => RoomRemoteReply::Members(handle.members().await),
        RoomRemoteOp::Admin => RoomRemoteReply::Snapshot(handle.admin().await),
        RoomRemoteOp::Description => RoomRemoteReply::Description(handle.description().await),
        RoomRemoteOp::Inspect => RoomRemoteReply::Info(handle.inspect().await),
        RoomRemoteOp::IsMember(u) => RoomRemoteReply::Flag(handle.is_member(&u).await),
        RoomRemoteOp::IsMemberByNumber(n) => RoomRemoteReply::Flag(handle.is_member_by_number(&n).await),
        RoomRemoteOp::IsAdmin(u) => RoomRemoteReply::Flag(handle.is_admin(&u).await),
        RoomRemoteOp::Delete => RoomRemoteReply::Unit(handle.delete().await),
    }
}

/// Channel-based `PeerLink`: every call is wrapped in a 5s (configurable)
/// timeout, surfacing `ChatError::RemoteTimeout` on expiry.
#[derive(Clone)]
pub struct InProcessPeerLink {
    nodes: Arc<RwLock<HashMap<NodeId, NodeInbox>>>,
    timeout: Duration,
}

impl InProcessPeerLink {
    pub async fn call_room(
        &self,
        node: &NodeId,
        room_name: &str,
        home_node: &NodeId,
        op: RoomRemoteOp,
    ) -> Result<RoomRemoteReply> {
        let inbox = {
            let guard = self.nodes.read().await;
            guard
                .get(node)
                .cloned()
                .ok_or_else(|| ChatError::UnknownNode(node.to_string()))?
        };

        let (reply, rx) = oneshot::channel();
        let call = RemoteCall {
            room_name: room_name.to_string(),
            home_node: home_node.clone(),
            op,
            reply,
        };

        let send_and_wait = async {
            inbox
                .tx
                .send(call)
                .await
                .map_err(|_| ChatError::Transport("peer node inbox closed".into()))?;
            rx.await
                .map_err(|_| ChatError::Transport("peer node dropped reply".into()))?
        };

        match tokio::time::timeout(self.timeout, send_and_wait).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::RemoteTimeout),
        }
    }
}
