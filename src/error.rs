//! Error types for the meshroom library.

/// Result type alias for meshroom operations.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Error kinds surfaced to clients. None of these are fatal to a session:
/// the dispatcher turns every one of them into a response envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Name '{0}' is taken by an already existing public room.")]
    RoomAlreadyExists(String),

    #[error("There is already a user logged in as {0}.")]
    UserAlreadyLoggedIn(String),

    #[error("Someone else is already logged in on this connection.")]
    SomeoneElseAlreadyLoggedIn,

    #[error("{0} is already a member of this room.")]
    MemberAlreadyExists(String),

    #[error("There is no room named '{0}'.")]
    RoomNotFound(String),

    #[error("There is no user with number {0}.")]
    UserNotFound(String),

    #[error("{0} is not a member of this room.")]
    MemberNotFound(String),

    #[error("You must be the admin of this room to do that.")]
    NotAdmin,

    #[error("You must be a member of this room to do that.")]
    NotMember,

    #[error("You can't remove yourself; use ROOM ... LEAVE instead.")]
    CannotRemoveSelf,

    #[error("You can't join a private room.")]
    CannotJoinPrivateRoom,

    #[error("You are not logged in")]
    NotLoggedIn,

    #[error("Unknown command !")]
    UnknownCommand,

    #[error("The node hosting this room did not respond in time.")]
    RemoteTimeout,

    #[error("Node '{0}' is not a known member of this cluster.")]
    UnknownNode(String),

    #[error("Connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}
