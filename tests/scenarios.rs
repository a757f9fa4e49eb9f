//! Integration tests exercising the distributed placement/routing core,
//! driving the dispatcher directly against an in-process multi-node
//! `Cluster` rather than opening real sockets, since the interesting
//! behavior is the distributed placement/routing core, not the line
//! protocol's framing.

use std::time::Duration;

use meshroom::dispatcher::{self, AppState};
use meshroom::fanout::FanoutHub;
use meshroom::local_registry::LocalRoomRegistry;
use meshroom::node::NodeId;
use meshroom::protocol::Command;
use meshroom::router::Router;
use meshroom::transport::Cluster;
use meshroom::user::UserDirectory;
use tokio::sync::mpsc;

async fn make_node(cluster: &Cluster, fanout: &FanoutHub, id: &str) -> AppState {
    let node_id = NodeId::new(id);
    let local_rooms = LocalRoomRegistry::new();
    let users = UserDirectory::new();

    let peer_link = cluster.join_node(node_id.clone(), local_rooms.clone()).await;
    fanout.join_node(node_id.clone(), users.clone()).await;

    let router = Router::new(node_id.clone(), cluster.clone(), local_rooms, peer_link);
    AppState {
        node_id,
        users,
        router,
        fanout: fanout.clone(),
    }
}

fn new_cluster() -> (Cluster, FanoutHub) {
    (Cluster::new(Duration::from_secs(5)), FanoutHub::new())
}

/// Drives commands on behalf of one logged-in client and captures whatever
/// the fanout later delivers to its socket.
struct Client {
    current: Option<String>,
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Client {
    async fn send(&mut self, state: &AppState, cmd: Command) -> Vec<String> {
        dispatcher::handle_command(state, &mut self.current, &self.tx, cmd).await
    }

    fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn user_number(&self) -> String {
        self.current.clone().expect("logged in")
    }
}

async fn login(state: &AppState, number: &str, name: &str) -> (Client, Vec<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut client = Client {
        current: None,
        tx,
        rx,
    };
    let reply = client
        .send(
            state,
            Command::Login {
                user_number: number.to_string(),
                user_name: name.to_string(),
            },
        )
        .await;
    (client, reply)
}

#[tokio::test]
async fn login_gate_greets_and_rejects_second_login() {
    let (cluster, fanout) = new_cluster();
    let node_a = make_node(&cluster, &fanout, "a").await;

    let (mut alice, reply) = login(&node_a, "07812345678", "Alice").await;
    assert_eq!(reply, vec!["## We welcome the glorious Alice ! ##\r\n".to_string()]);

    let second = alice
        .send(
            &node_a,
            Command::Login {
                user_number: "00000000000".to_string(),
                user_name: "Mallory".to_string(),
            },
        )
        .await;
    assert!(second[0].contains("already logged in"));
}

#[tokio::test]
async fn unique_public_room_creation_is_rejected_cluster_wide() {
    let (cluster, fanout) = new_cluster();
    let node_a = make_node(&cluster, &fanout, "a").await;
    let node_b = make_node(&cluster, &fanout, "b").await;

    let (mut alice, _) = login(&node_a, "1", "Alice").await;
    let (mut bob, _) = login(&node_b, "2", "Bob").await;

    let created = alice
        .send(&node_a, Command::CreateRoom { room_name: "general".into() })
        .await;
    assert!(created[0].contains("Room created."));

    let rejected = bob
        .send(&node_b, Command::CreateRoom { room_name: "general".into() })
        .await;
    assert!(rejected[0].contains("is taken by an already existing public room"));
}

#[tokio::test]
async fn public_room_migrates_to_new_admin_on_leave() {
    let (cluster, fanout) = new_cluster();
    let node_a = make_node(&cluster, &fanout, "a").await;
    let node_b = make_node(&cluster, &fanout, "b").await;

    let (mut alice, _) = login(&node_a, "1", "Alice").await;
    let (mut bob, _) = login(&node_b, "2", "Bob").await;

    alice
        .send(&node_a, Command::CreateRoom { room_name: "devs".into() })
        .await;
    bob.send(&node_b, Command::JoinRoom { room_name: "devs".into() })
        .await;

    alice
        .send(&node_a, Command::RoomLeave { room_name: "devs".into() })
        .await;

    let node = node_a.router.get_node("devs").await;
    assert_eq!(node, Some(NodeId::new("b")));

    let is_admin = node_b.router.is_admin("devs", &node_b.users.snapshot("2").await.unwrap()).await;
    assert_eq!(is_admin, Ok(true));

    let reply = bob
        .send(&node_b, Command::RoomOnWhichNode { room_name: "devs".into() })
        .await;
    assert!(reply[0].contains('b'));
}

#[tokio::test]
async fn private_room_invite_replicates_to_invitees_node() {
    let (cluster, fanout) = new_cluster();
    let node_a = make_node(&cluster, &fanout, "a").await;
    let node_b = make_node(&cluster, &fanout, "b").await;

    let (mut alice, _) = login(&node_a, "1", "Alice").await;
    let (_bob, _) = login(&node_b, "2", "Bob").await;

    let created = alice
        .send(&node_a, Command::CreatePrivateRoom { room_name: "secret".into() })
        .await;
    assert!(created[0].contains("secret@private"));

    alice
        .send(
            &node_a,
            Command::RoomInvite {
                room_name: "secret@private".into(),
                user_number: "2".to_string(),
            },
        )
        .await;

    assert!(node_b.router.local_rooms.contains("secret@private").await);
    let info = node_b.router.inspect("secret@private").await.unwrap();
    assert_eq!(info.admin.user_number, "1");
    assert!(info.members.iter().any(|m| m.user_number == "2"));
}

#[tokio::test]
async fn broadcast_delivers_one_line_to_every_member() {
    let (cluster, fanout) = new_cluster();
    let node_a = make_node(&cluster, &fanout, "a").await;
    let node_b = make_node(&cluster, &fanout, "b").await;

    let (mut alice, _) = login(&node_a, "1", "Alice").await;
    let (mut bob, _) = login(&node_b, "2", "Bob").await;
    let (mut carol, _) = login(&node_b, "3", "Carol").await;

    alice
        .send(&node_a, Command::CreateRoom { room_name: "t".into() })
        .await;
    bob.send(&node_b, Command::JoinRoom { room_name: "t".into() }).await;
    carol.send(&node_b, Command::JoinRoom { room_name: "t".into() }).await;

    alice.drain();
    bob.drain();
    carol.drain();

    alice
        .send(
            &node_a,
            Command::RoomSend {
                room_name: "t".into(),
                message: "hello".into(),
            },
        )
        .await;

    let expected = "Alice (t): hello\r\n".to_string();
    assert_eq!(alice.drain(), vec![expected.clone()]);
    assert_eq!(bob.drain(), vec![expected.clone()]);
    assert_eq!(carol.drain(), vec![expected]);
}

#[tokio::test]
async fn private_room_replica_is_torn_down_when_last_local_member_leaves() {
    let (cluster, fanout) = new_cluster();
    let node_a = make_node(&cluster, &fanout, "a").await;
    let node_b = make_node(&cluster, &fanout, "b").await;

    let (mut alice, _) = login(&node_a, "1", "Alice").await;
    let (mut bob, _) = login(&node_b, "2", "Bob").await;

    alice
        .send(&node_a, Command::CreatePrivateRoom { room_name: "secret".into() })
        .await;
    alice
        .send(
            &node_a,
            Command::RoomInvite {
                room_name: "secret@private".into(),
                user_number: "2".to_string(),
            },
        )
        .await;
    assert!(node_b.router.local_rooms.contains("secret@private").await);

    bob.send(&node_b, Command::RoomLeave { room_name: "secret@private".into() })
        .await;

    assert!(!node_b.router.local_rooms.contains("secret@private").await);
    let members = node_a.router.members("secret@private").await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_number, "1");

    // A fresh private room of the same name on node b must not collide
    // with the torn-down replica.
    let (mut carol, _) = login(&node_b, "3", "Carol").await;
    let recreated = carol
        .send(&node_b, Command::CreatePrivateRoom { room_name: "secret".into() })
        .await;
    assert!(recreated[0].contains("secret@private"));
}

#[tokio::test]
async fn invitee_logout_leaves_the_invited_private_room() {
    let (cluster, fanout) = new_cluster();
    let node_a = make_node(&cluster, &fanout, "a").await;
    let node_b = make_node(&cluster, &fanout, "b").await;

    let (mut alice, _) = login(&node_a, "1", "Alice").await;
    let (mut bob, _) = login(&node_b, "2", "Bob").await;

    alice
        .send(&node_a, Command::CreatePrivateRoom { room_name: "secret".into() })
        .await;
    alice
        .send(
            &node_a,
            Command::RoomInvite {
                room_name: "secret@private".into(),
                user_number: "2".to_string(),
            },
        )
        .await;
    assert!(node_b.router.local_rooms.contains("secret@private").await);

    bob.send(&node_b, Command::LogOut).await;

    assert!(!node_b.router.local_rooms.contains("secret@private").await);
    let members = node_a.router.members("secret@private").await.unwrap();
    assert!(!members.iter().any(|m| m.user_number == "2"));
}

#[tokio::test]
async fn profile_rename_propagates_to_every_joined_room() {
    let (cluster, fanout) = new_cluster();
    let node_a = make_node(&cluster, &fanout, "a").await;
    let node_b = make_node(&cluster, &fanout, "b").await;

    let (mut alice, _) = login(&node_a, "1", "Alice").await;
    let (mut bob, _) = login(&node_b, "2", "Bob").await;

    alice
        .send(&node_a, Command::CreateRoom { room_name: "r1".into() })
        .await;
    alice
        .send(&node_a, Command::CreatePrivateRoom { room_name: "r2".into() })
        .await;
    bob.send(&node_b, Command::JoinRoom { room_name: "r1".into() }).await;

    alice
        .send(
            &node_a,
            Command::SetMyUserName {
                user_name: "Alicia".to_string(),
            },
        )
        .await;

    let members = node_a.router.members("r1").await.unwrap();
    let alice_snapshot = members.iter().find(|m| m.user_number == "1").unwrap();
    assert_eq!(alice_snapshot.user_name, "Alicia");

    let private_members = node_a.router.members("r2@private").await.unwrap();
    assert_eq!(private_members[0].user_name, "Alicia");

    let _ = bob.user_number();
}
