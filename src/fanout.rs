//! Broadcast Fanout: delivers one line of text to every member of a room,
//! wherever their connection lives.
//!
//! A member's `UserSnapshot` only tells us which node owns their socket;
//! actually writing to that socket is always a local operation for the
//! node that holds the `UserDirectory` entry, so fanout never goes through
//! `Router`/`InProcessPeerLink` — it goes through `transport::Cluster`'s
//! per-node inboxes directly. Grounded on the teacher's
//! `ServerState::broadcast` (`examples/Zygimantass-slsk-rs/src/bin/server/
//! state.rs`), generalized from "broadcast to every connected client" to
//! "broadcast to one room's members, spread across nodes".

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::node::NodeId;
use crate::user::UserSnapshot;

enum FanoutCommand {
    Deliver {
        user_number: String,
        text: String,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        user_number: String,
        reply: oneshot::Sender<Option<UserSnapshot>>,
    },
    NoteJoined {
        user_number: String,
        room_name: String,
        reply: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
struct FanoutInbox {
    tx: mpsc::Sender<FanoutCommand>,
}

/// Directory of every node's fanout inbox, used to deliver a broadcast line
/// to members regardless of which node their connection is on. One
/// `FanoutHub` is shared cluster-wide, mirroring `Cluster`'s node directory.
#[derive(Clone, Default)]
pub struct FanoutHub {
    inboxes: Arc<RwLock<HashMap<NodeId, FanoutInbox>>>,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers this node's `UserDirectory` as the destination for text
    /// delivered to users connected here. Call once per node at startup,
    /// alongside `Cluster::join_node`.
    pub async fn join_node(&self, node_id: NodeId, users: crate::user::UserDirectory) {
        let (tx, mut rx) = mpsc::channel::<FanoutCommand>(1024);

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    FanoutCommand::Deliver {
                        user_number,
                        text,
                        reply,
                    } => {
                        let delivered = users.deliver(&user_number, &text).await;
                        let _ = reply.send(delivered);
                    }
                    FanoutCommand::Snapshot { user_number, reply } => {
                        let snapshot = users.snapshot(&user_number).await.ok();
                        let _ = reply.send(snapshot);
                    }
                    FanoutCommand::NoteJoined {
                        user_number,
                        room_name,
                        reply,
                    } => {
                        users.note_joined(&user_number, &room_name).await;
                        let _ = reply.send(());
                    }
                }
            }
        });

        self.inboxes.write().await.insert(node_id, FanoutInbox { tx });
    }

    /// Fetches a user's current snapshot from whichever node they're logged
    /// in on. Used by `ROOM ... INVITE` to learn the invitee's `user_name`/
    /// `description` before embedding them in a room's member list.
    pub async fn snapshot(&self, node: &NodeId, user_number: &str) -> Option<UserSnapshot> {
        let inbox = self.inboxes.read().await.get(node).cloned()?;
        let (reply, rx) = oneshot::channel();
        inbox
            .tx
            .send(FanoutCommand::Snapshot {
                user_number: user_number.to_string(),
                reply,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Records that `user_number` has joined `room_name` on whichever node
    /// they're logged in on, so that node's own `LOG OUT` flow later runs
    /// `LEAVE` for it too. Used by `ROOM ... INVITE` once the invitee's
    /// replica has been created on their node.
    pub async fn note_joined(&self, node: &NodeId, user_number: &str, room_name: &str) {
        let Some(inbox) = self.inboxes.read().await.get(node).cloned() else {
            return;
        };
        let (reply, rx) = oneshot::channel();
        if inbox
            .tx
            .send(FanoutCommand::NoteJoined {
                user_number: user_number.to_string(),
                room_name: room_name.to_string(),
                reply,
            })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Sends `text` to every member snapshot, grouped by node so the work
    /// fans out across the cluster rather than serializing member-by-member.
    /// Best-effort: a member whose socket has gone away (or whose node is
    /// unreachable) is simply skipped.
    pub async fn broadcast(&self, members: &[UserSnapshot], text: &str) {
        let inboxes = self.inboxes.read().await;
        let mut sends = Vec::with_capacity(members.len());

        for member in members {
            let Some(inbox) = inboxes.get(&member.node).cloned() else {
                continue;
            };
            let user_number = member.user_number.clone();
            let text = text.to_string();
            sends.push(tokio::spawn(async move {
                let (reply, rx) = oneshot::channel();
                if inbox
                    .tx
                    .send(FanoutCommand::Deliver {
                        user_number,
                        text,
                        reply,
                    })
                    .await
                    .is_ok()
                {
                    let _ = rx.await;
                }
            }));
        }

        for send in sends {
            let _ = send.await;
        }
    }
}
