//! Command Dispatcher: turns a parsed `Command` into Router/Room/User
//! operations plus response envelopes, per the command dispatch table.
//! Grounded on the shape of the teacher's `handlers::handle_client_message`
//! (one function per message kind, returning what the connection loop
//! should do next) — generalized from a single binary-message match into
//! the line-protocol command table.

use tokio::sync::mpsc;

use crate::error::ChatError;
use crate::fanout::FanoutHub;
use crate::node::NodeId;
use crate::protocol::{self, Command};
use crate::registry::RegistryKey;
use crate::room::{self, is_private_name, RoomKind};
use crate::router::Router;
use crate::transport::RoomRemoteOp;
use crate::user::{UserDirectory, UserSnapshot};

/// Everything a node needs to run the dispatcher: its own identity, the
/// users logged in here, the router to reach any room, and the fanout hub
/// to reach any user's socket.
#[derive(Clone)]
pub struct AppState {
    pub node_id: NodeId,
    pub users: UserDirectory,
    pub router: Router,
    pub fanout: FanoutHub,
}

/// Dispatches one already-parsed command. `current_user` is `None` before
/// `LOGIN` succeeds; the login gate is enforced by the caller, so every arm
/// below except `Login` may assume it is `Some`.
pub async fn handle_command(
    state: &AppState,
    current_user: &mut Option<String>,
    tx: &mpsc::UnboundedSender<String>,
    cmd: Command,
) -> Vec<String> {
    match cmd {
        Command::Login {
            user_number,
            user_name,
        } => handle_login(state, current_user, tx, user_number, user_name).await,
        Command::CreateRoom { room_name } => {
            let me = current_user.clone().expect("login gate");
            handle_create_room(state, &me, room_name, RoomKind::Public).await
        }
        Command::CreatePrivateRoom { room_name } => {
            let me = current_user.clone().expect("login gate");
            handle_create_room(state, &me, room_name, RoomKind::Private).await
        }
        Command::JoinRoom { room_name } => {
            let me = current_user.clone().expect("login gate");
            handle_join_room(state, &me, room_name).await
        }
        Command::RoomLeave { room_name } => {
            let me = current_user.clone().expect("login gate");
            handle_leave(state, &me, &room_name).await
        }
        Command::RoomRemoveMember {
            room_name,
            user_number: target,
        } => {
            let me = current_user.clone().expect("login gate");
            handle_remove_member(state, &me, &room_name, &target).await
        }
        Command::RoomSetDescription {
            room_name,
            description,
        } => {
            let me = current_user.clone().expect("login gate");
            handle_set_description(state, &me, &room_name, description).await
        }
        Command::RoomGetDescription { room_name } => {
            let me = current_user.clone().expect("login gate");
            handle_get_description(state, &me, &room_name).await
        }
        Command::RoomGetMembers { room_name } => {
            let me = current_user.clone().expect("login gate");
            handle_get_members(state, &me, &room_name).await
        }
        Command::RoomInspect { room_name } => {
            let me = current_user.clone().expect("login gate");
            handle_inspect(state, &me, &room_name).await
        }
        Command::RoomOnWhichNode { room_name } => handle_on_which_node(state, &room_name).await,
        Command::RoomDelete { room_name } => {
            let me = current_user.clone().expect("login gate");
            handle_delete(state, &me, &room_name).await
        }
        Command::RoomSend { room_name, message } => {
            let me = current_user.clone().expect("login gate");
            handle_send(state, &me, &room_name, message).await
        }
        Command::RoomInvite {
            room_name,
            user_number: target,
        } => {
            let me = current_user.clone().expect("login gate");
            handle_invite(state, &me, &room_name, &target).await
        }
        Command::ListJoinedRooms => {
            let me = current_user.clone().expect("login gate");
            handle_list_joined(state, &me).await
        }
        Command::ListAccessibleRooms => handle_list_accessible(state).await,
        Command::GetMyself => {
            let me = current_user.clone().expect("login gate");
            handle_get_myself(state, &me).await
        }
        Command::SetMyDescription { description } => {
            let me = current_user.clone().expect("login gate");
            handle_set_my_description(state, &me, description).await
        }
        Command::SetMyUserName { user_name } => {
            let me = current_user.clone().expect("login gate");
            handle_set_my_user_name(state, &me, user_name).await
        }
        Command::LogOut => handle_logout(state, current_user).await,
    }
}

async fn handle_login(
    state: &AppState,
    current_user: &mut Option<String>,
    tx: &mpsc::UnboundedSender<String>,
    user_number: String,
    user_name: String,
) -> Vec<String> {
    if current_user.is_some() {
        return vec![protocol::direct_reply(
            &ChatError::SomeoneElseAlreadyLoggedIn.to_string(),
        )];
    }

    if let Err(e) = state
        .router
        .cluster
        .registry
        .register(RegistryKey::User(user_number.clone()), state.node_id.clone())
        .await
    {
        return vec![protocol::direct_reply(&e.to_string())];
    }

    state
        .users
        .insert(user_number.clone(), user_name.clone(), state.node_id.clone(), tx.clone())
        .await;
    *current_user = Some(user_number);

    vec![protocol::direct_reply(&format!(
        "We welcome the glorious {user_name} !"
    ))]
}

async fn handle_create_room(
    state: &AppState,
    user_number: &str,
    room_name: String,
    kind: RoomKind,
) -> Vec<String> {
    let owner = match state.users.snapshot(user_number).await {
        Ok(u) => u,
        Err(e) => return vec![protocol::direct_reply(&e.to_string())],
    };

    match room::create_room(
        &room_name,
        owner,
        kind,
        String::new(),
        Vec::new(),
        state.node_id.clone(),
        &state.router.local_rooms,
        &state.router.cluster.registry,
    )
    .await
    {
        Ok(handle) => {
            state.users.note_joined(user_number, &handle.name).await;
            vec![protocol::room_reply(&handle.name, "Room created.")]
        }
        Err(e) => vec![protocol::room_reply(&room_name, &e.to_string())],
    }
}

async fn handle_join_room(state: &AppState, user_number: &str, room_name: String) -> Vec<String> {
    if is_private_name(&room_name) {
        return vec![protocol::room_reply(
            &room_name,
            &ChatError::CannotJoinPrivateRoom.to_string(),
        )];
    }

    let me = match state.users.snapshot(user_number).await {
        Ok(u) => u,
        Err(e) => return vec![protocol::room_reply(&room_name, &e.to_string())],
    };

    match state.router.add_member(&room_name, me.clone()).await {
        Ok(()) => {
            state.users.note_joined(user_number, &room_name).await;
            let members = state.router.members(&room_name).await.unwrap_or_default();
            let notice = protocol::room_reply(
                &room_name,
                &format!("{} has joined the room.", me.user_name),
            );
            state.fanout.broadcast(&members, &notice).await;
            vec![]
        }
        Err(e) => vec![protocol::room_reply(&room_name, &e.to_string())],
    }
}

/// Shared by `ROOM ... LEAVE` and `LOG OUT` (which is "LEAVE on every
/// joined room").
async fn handle_leave(state: &AppState, user_number: &str, room_name: &str) -> Vec<String> {
    let is_member = match state.router.is_member_by_number(room_name, user_number).await {
        Ok(b) => b,
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    };
    if !is_member {
        return vec![protocol::room_reply(room_name, &ChatError::NotMember.to_string())];
    }

    let me = match state.users.snapshot(user_number).await {
        Ok(u) => u,
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    };

    let members = state.router.members(room_name).await.unwrap_or_default();

    if members.len() <= 1 {
        let _ = state.router.delete(room_name).await;
        state.users.note_left(user_number, room_name).await;
        return vec![protocol::room_reply(room_name, "Room deleted (last member left).")];
    }

    let was_admin = state.router.is_admin(room_name, &me).await.unwrap_or(false);

    if is_private_name(room_name) {
        let _ = state
            .router
            .apply_to_all_members(room_name, &members, RoomRemoteOp::RemoveMember(user_number.to_string()))
            .await;
        state.users.note_left(user_number, room_name).await;

        let remaining: Vec<UserSnapshot> = members
            .iter()
            .filter(|m| m.user_number != user_number)
            .cloned()
            .collect();

        // The replica on the leaving member's own node is orphaned once no
        // other member is hosted there; destroy it so a later
        // CREATE PRIVATE ROOM of the same name doesn't find it still
        // registered.
        if !remaining.iter().any(|m| m.node == state.node_id) {
            let _ = state.router.delete(room_name).await;
        }

        if was_admin {
            if let Some(new_admin) = remaining.first().cloned() {
                let _ = state
                    .router
                    .apply_to_all_members(room_name, &remaining, RoomRemoteOp::SetAdmin(new_admin))
                    .await;
            }
        }

        let notice = protocol::room_reply(room_name, &format!("{} has left the room.", me.user_name));
        state.fanout.broadcast(&remaining, &notice).await;
    } else {
        if let Err(e) = state.router.remove_member(room_name, user_number).await {
            return vec![protocol::room_reply(room_name, &e.to_string())];
        }
        state.users.note_left(user_number, room_name).await;

        if was_admin {
            let description = state.router.description(room_name).await.unwrap_or_default();
            let remaining = state.router.members(room_name).await.unwrap_or_default();
            let _ = state.router.delete(room_name).await;

            if let Some(new_admin) = remaining.first().cloned() {
                let rest: Vec<UserSnapshot> = remaining.into_iter().skip(1).collect();
                let _ = state
                    .router
                    .route_to(
                        &new_admin.node,
                        room_name,
                        new_admin.clone(),
                        RoomKind::Public,
                        description,
                        rest.clone(),
                    )
                    .await;

                let mut all = vec![new_admin.clone()];
                all.extend(rest);
                let notice = protocol::room_reply(
                    room_name,
                    &format!("{} has left the room; {} is now admin.", me.user_name, new_admin.user_name),
                );
                state.fanout.broadcast(&all, &notice).await;
            }
        } else {
            let remaining = state.router.members(room_name).await.unwrap_or_default();
            let notice = protocol::room_reply(room_name, &format!("{} has left the room.", me.user_name));
            state.fanout.broadcast(&remaining, &notice).await;
        }
    }

    vec![]
}

async fn handle_remove_member(
    state: &AppState,
    user_number: &str,
    room_name: &str,
    target: &str,
) -> Vec<String> {
    if target == user_number {
        return vec![protocol::room_reply(room_name, &ChatError::CannotRemoveSelf.to_string())];
    }

    let me = match state.users.snapshot(user_number).await {
        Ok(u) => u,
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    };

    match state.router.is_admin(room_name, &me).await {
        Ok(true) => {}
        Ok(false) => return vec![protocol::room_reply(room_name, &ChatError::NotAdmin.to_string())],
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    }

    let members = state.router.members(room_name).await.unwrap_or_default();
    let Some(target_snapshot) = members.iter().find(|m| m.user_number == target).cloned() else {
        return vec![protocol::room_reply(room_name, &ChatError::MemberNotFound(target.to_string()).to_string())];
    };

    if is_private_name(room_name) {
        let _ = state
            .router
            .apply_to_all_members(room_name, &members, RoomRemoteOp::RemoveMember(target.to_string()))
            .await;
    } else if let Err(e) = state.router.remove_member(room_name, target).await {
        return vec![protocol::room_reply(room_name, &e.to_string())];
    }

    if target_snapshot.node == state.node_id {
        state.users.note_left(target, room_name).await;
    }

    let remaining: Vec<UserSnapshot> = members.into_iter().filter(|m| m.user_number != target).collect();
    let notice = protocol::room_reply(
        room_name,
        &format!("{} has been removed from the room.", target_snapshot.user_name),
    );
    state.fanout.broadcast(&remaining, &notice).await;
    vec![]
}

async fn handle_set_description(
    state: &AppState,
    user_number: &str,
    room_name: &str,
    description: String,
) -> Vec<String> {
    let me = match state.users.snapshot(user_number).await {
        Ok(u) => u,
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    };

    match state.router.is_admin(room_name, &me).await {
        Ok(true) => {}
        Ok(false) => return vec![protocol::room_reply(room_name, &ChatError::NotAdmin.to_string())],
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    }

    if is_private_name(room_name) {
        let members = state.router.members(room_name).await.unwrap_or_default();
        let _ = state
            .router
            .apply_to_all_members(room_name, &members, RoomRemoteOp::SetDescription(description.clone()))
            .await;
    } else if let Err(e) = state.router.set_description(room_name, description.clone()).await {
        return vec![protocol::room_reply(room_name, &e.to_string())];
    }

    let members = state.router.members(room_name).await.unwrap_or_default();
    let notice = protocol::room_reply(room_name, &format!("Description updated to: {description}"));
    state.fanout.broadcast(&members, &notice).await;
    vec![]
}

async fn handle_get_description(state: &AppState, user_number: &str, room_name: &str) -> Vec<String> {
    match state.router.is_member_by_number(room_name, user_number).await {
        Ok(true) => {}
        Ok(false) => return vec![protocol::room_reply(room_name, &ChatError::NotMember.to_string())],
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    }

    match state.router.description(room_name).await {
        Ok(d) => vec![protocol::room_reply(room_name, &d)],
        Err(e) => vec![protocol::room_reply(room_name, &e.to_string())],
    }
}

async fn handle_get_members(state: &AppState, user_number: &str, room_name: &str) -> Vec<String> {
    match state.router.is_member_by_number(room_name, user_number).await {
        Ok(true) => {}
        Ok(false) => return vec![protocol::room_reply(room_name, &ChatError::NotMember.to_string())],
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    }

    match state.router.members(room_name).await {
        Ok(members) => {
            let names: Vec<&str> = members.iter().map(|m| m.user_name.as_str()).collect();
            vec![protocol::room_reply(room_name, &names.join(", "))]
        }
        Err(e) => vec![protocol::room_reply(room_name, &e.to_string())],
    }
}

async fn handle_inspect(state: &AppState, user_number: &str, room_name: &str) -> Vec<String> {
    match state.router.is_member_by_number(room_name, user_number).await {
        Ok(true) => {}
        Ok(false) => return vec![protocol::room_reply(room_name, &ChatError::NotMember.to_string())],
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    }

    match state.router.inspect(room_name).await {
        Ok(info) => {
            let names: Vec<&str> = info.members.iter().map(|m| m.user_name.as_str()).collect();
            let text = format!(
                "description=\"{}\" admin={} members=[{}]",
                info.description,
                info.admin.user_name,
                names.join(", ")
            );
            vec![protocol::room_reply(room_name, &text)]
        }
        Err(e) => vec![protocol::room_reply(room_name, &e.to_string())],
    }
}

async fn handle_on_which_node(state: &AppState, room_name: &str) -> Vec<String> {
    match state.router.get_node(room_name).await {
        Some(node) => vec![protocol::room_reply(room_name, &node.to_string())],
        None => vec![protocol::room_reply(room_name, "nil")],
    }
}

async fn handle_delete(state: &AppState, user_number: &str, room_name: &str) -> Vec<String> {
    let me = match state.users.snapshot(user_number).await {
        Ok(u) => u,
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    };

    match state.router.is_admin(room_name, &me).await {
        Ok(true) => {}
        Ok(false) => return vec![protocol::room_reply(room_name, &ChatError::NotAdmin.to_string())],
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    }

    let members = state.router.members(room_name).await.unwrap_or_default();

    if is_private_name(room_name) {
        let _ = state
            .router
            .apply_to_all_members(room_name, &members, RoomRemoteOp::Delete)
            .await;
    } else if let Err(e) = state.router.delete(room_name).await {
        return vec![protocol::room_reply(room_name, &e.to_string())];
    }

    for m in members.iter().filter(|m| m.node == state.node_id) {
        state.users.note_left(&m.user_number, room_name).await;
    }

    let notice = protocol::room_reply(room_name, "This room has been deleted.");
    state.fanout.broadcast(&members, &notice).await;
    vec![]
}

async fn handle_send(state: &AppState, user_number: &str, room_name: &str, message: String) -> Vec<String> {
    match state.router.is_member_by_number(room_name, user_number).await {
        Ok(true) => {}
        Ok(false) => return vec![protocol::room_reply(room_name, &ChatError::NotMember.to_string())],
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    }

    let me = match state.users.snapshot(user_number).await {
        Ok(u) => u,
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    };

    let members = state.router.members(room_name).await.unwrap_or_default();
    let line = protocol::chat_line(&me.user_name, room_name, &message);
    state.fanout.broadcast(&members, &line).await;
    vec![]
}

async fn handle_invite(state: &AppState, user_number: &str, room_name: &str, target: &str) -> Vec<String> {
    match state.router.is_member_by_number(room_name, user_number).await {
        Ok(true) => {}
        Ok(false) => return vec![protocol::room_reply(room_name, &ChatError::NotMember.to_string())],
        Err(e) => return vec![protocol::room_reply(room_name, &e.to_string())],
    }

    let members = state.router.members(room_name).await.unwrap_or_default();
    if members.iter().any(|m| m.user_number == target) {
        return vec![protocol::room_reply(
            room_name,
            &ChatError::MemberAlreadyExists(target.to_string()).to_string(),
        )];
    }

    let Some(invitee_node) = state
        .router
        .cluster
        .registry
        .lookup(RegistryKey::User(target.to_string()))
        .await
    else {
        return vec![protocol::room_reply(room_name, &ChatError::UserNotFound(target.to_string()).to_string())];
    };

    let Some(invitee) = state.fanout.snapshot(&invitee_node, target).await else {
        return vec![protocol::room_reply(room_name, &ChatError::UserNotFound(target.to_string()).to_string())];
    };

    if is_private_name(room_name) {
        if let Err(e) = state.router.add_member(room_name, invitee.clone()).await {
            return vec![protocol::room_reply(room_name, &e.to_string())];
        }

        let admin = state.router.admin(room_name).await.unwrap_or_else(|_| invitee.clone());
        let description = state.router.description(room_name).await.unwrap_or_default();
        let members_minus_admin: Vec<UserSnapshot> = members
            .iter()
            .filter(|m| m.user_number != admin.user_number)
            .cloned()
            .collect();

        let _ = state
            .router
            .route_to(
                &invitee.node,
                room_name,
                admin,
                RoomKind::Private,
                description,
                members_minus_admin,
            )
            .await;

        let mut after = members.clone();
        after.push(invitee.clone());
        let _ = state
            .router
            .apply_to_all_members(room_name, &after, RoomRemoteOp::AddMember(invitee.clone()))
            .await;
    } else if let Err(e) = state.router.add_member(room_name, invitee.clone()).await {
        return vec![protocol::room_reply(room_name, &e.to_string())];
    }

    state.fanout.note_joined(&invitee.node, target, room_name).await;

    let mut broadcast_targets = vec![invitee.clone()];
    broadcast_targets.extend(members);
    let notice = protocol::room_reply(room_name, &format!("{} has been invited to the room.", invitee.user_name));
    state.fanout.broadcast(&broadcast_targets, &notice).await;
    vec![]
}

async fn handle_list_joined(state: &AppState, user_number: &str) -> Vec<String> {
    let mut joined = Vec::new();

    let public_rooms = state.router.cluster.registry.enumerate(crate::registry::EntryKind::Room).await;
    for (room_name, _node) in public_rooms {
        if matches!(state.router.is_member_by_number(&room_name, user_number).await, Ok(true)) {
            joined.push(room_name);
        }
    }

    for room_name in state.router.local_rooms.names().await {
        if !is_private_name(&room_name) {
            continue;
        }
        if matches!(state.router.is_member_by_number(&room_name, user_number).await, Ok(true)) {
            joined.push(room_name);
        }
    }

    vec![protocol::direct_reply(&joined.join(", "))]
}

async fn handle_list_accessible(state: &AppState) -> Vec<String> {
    let rooms = state.router.cluster.registry.enumerate(crate::registry::EntryKind::Room).await;
    let names: Vec<String> = rooms.into_iter().map(|(name, _)| name).collect();
    vec![protocol::direct_reply(&names.join(", "))]
}

async fn handle_get_myself(state: &AppState, user_number: &str) -> Vec<String> {
    match state.users.snapshot(user_number).await {
        Ok(me) => vec![protocol::direct_reply(&format!(
            "{} ({}) - {}",
            me.user_name, me.user_number, me.description
        ))],
        Err(e) => vec![protocol::direct_reply(&e.to_string())],
    }
}

async fn handle_set_my_description(state: &AppState, user_number: &str, description: String) -> Vec<String> {
    match state.users.set_description(user_number, description).await {
        Ok(me) => {
            propagate_profile_update(state, user_number, me).await;
            vec![protocol::direct_reply("Description updated.")]
        }
        Err(e) => vec![protocol::direct_reply(&e.to_string())],
    }
}

async fn handle_set_my_user_name(state: &AppState, user_number: &str, user_name: String) -> Vec<String> {
    match state.users.set_user_name(user_number, user_name).await {
        Ok(me) => {
            propagate_profile_update(state, user_number, me).await;
            vec![protocol::direct_reply("User name updated.")]
        }
        Err(e) => vec![protocol::direct_reply(&e.to_string())],
    }
}

/// After `SET MY DESCRIPTION`/`SET MY USER NAME`, walk every room the user
/// belongs to and `update_member`; private rooms fan out to every replica.
async fn propagate_profile_update(state: &AppState, user_number: &str, me: UserSnapshot) {
    for room_name in state.users.joined_rooms(user_number).await {
        if is_private_name(&room_name) {
            if let Ok(members) = state.router.members(&room_name).await {
                let _ = state
                    .router
                    .apply_to_all_members(&room_name, &members, RoomRemoteOp::UpdateMember(me.clone()))
                    .await;
            }
        } else {
            let _ = state.router.update_member(&room_name, me.clone()).await;
        }
    }
}

async fn handle_logout(state: &AppState, current_user: &mut Option<String>) -> Vec<String> {
    let Some(user_number) = current_user.clone() else {
        return vec![];
    };

    for room_name in state.users.joined_rooms(&user_number).await {
        let _ = handle_leave(state, &user_number, &room_name).await;
    }

    state
        .router
        .cluster
        .registry
        .unregister(RegistryKey::User(user_number.clone()))
        .await;
    state.users.remove(&user_number).await;
    *current_user = None;

    vec![protocol::direct_reply("Goodbye !")]
}
