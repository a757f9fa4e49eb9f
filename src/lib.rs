//! # meshroom
//!
//! A line-oriented, multi-node chat server. Clients authenticate with a
//! numeric identity, create and join public or private rooms, and exchange
//! messages; the interesting part is the distributed room-placement core:
//! public rooms live on exactly one node of a cluster and are reachable
//! transparently from every other node, private rooms are replicated onto
//! every member's node, and a cluster-wide name registry stays consistent
//! across joins, leaves, admin transfers, and logouts.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod local_registry;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod router;
pub mod session;
pub mod transport;
pub mod user;

pub use error::{ChatError, Result};
