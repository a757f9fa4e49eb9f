//! meshroom-server: the distributed chat server binary.
//!
//! Boots one or more cluster nodes in this single process, each with its
//! own TCP listener, sharing one `Cluster` name registry and `FanoutHub` —
//! and runs a connection session per accepted socket.

use anyhow::Result;
use meshroom::config::ServerConfig;
use meshroom::dispatcher::AppState;
use meshroom::fanout::FanoutHub;
use meshroom::local_registry::LocalRoomRegistry;
use meshroom::node::NodeId;
use meshroom::router::Router;
use meshroom::session;
use meshroom::transport::Cluster;
use meshroom::user::UserDirectory;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::load_or_default("chatcluster.toml")?;
    let cluster = Cluster::new(config.remote_call_timeout());
    let fanout = FanoutHub::new();

    let mut listeners = Vec::with_capacity(config.nodes.len());
    for node_cfg in &config.nodes {
        let node_id = NodeId::new(&node_cfg.id);
        let local_rooms = LocalRoomRegistry::new();
        let users = UserDirectory::new();

        let peer_link = cluster.join_node(node_id.clone(), local_rooms.clone()).await;
        fanout.join_node(node_id.clone(), users.clone()).await;

        let router = Router::new(node_id.clone(), cluster.clone(), local_rooms, peer_link);
        let state = AppState {
            node_id: node_id.clone(),
            users,
            router,
            fanout: fanout.clone(),
        };

        let listener = TcpListener::bind(("0.0.0.0", node_cfg.port)).await?;
        info!(node = %node_id, port = node_cfg.port, "node listening");
        listeners.push((node_id, listener, state));
    }

    let mut accept_tasks = Vec::with_capacity(listeners.len());
    for (node_id, listener, state) in listeners {
        accept_tasks.push(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let state = state.clone();
                        tokio::spawn(async move {
                            session::run_session(stream, state).await;
                        });
                    }
                    Err(e) => {
                        warn!(node = %node_id, error = %e, "accept failed");
                    }
                }
            }
        }));
    }

    for task in accept_tasks {
        task.await?;
    }

    Ok(())
}
