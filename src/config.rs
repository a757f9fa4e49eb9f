//! Server configuration: `PORT` env var for the common single-node case,
//! `chatcluster.toml` to declare a multi-node cluster in one process.
//! Grounded on the teacher's `Config::load_or_default`
//! (`examples/Zygimantass-slsk-rs/src/bin/server/config.rs`), generalized
//! from one listening port to a list of cluster nodes.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Deserialize;

/// One node's listen port and cluster-wide identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "node", default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default = "default_remote_call_timeout_secs")]
    pub remote_call_timeout_secs: u64,
}

fn default_remote_call_timeout_secs() -> u64 {
    5
}

impl ServerConfig {
    pub fn remote_call_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_call_timeout_secs)
    }

    /// Loads `path` (a `chatcluster.toml`) if it exists; otherwise falls
    /// back to a single node on `PORT` (default `4040`).
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ServerConfig = toml::from_str(&content)?;
            if config.nodes.is_empty() {
                bail!("{} must declare at least one [[node]]", path.display());
            }
            Ok(config)
        } else {
            let port: u16 = std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4040);
            Ok(ServerConfig {
                nodes: vec![NodeConfig {
                    id: "node-1".to_string(),
                    port,
                }],
                remote_call_timeout_secs: default_remote_call_timeout_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_single_node_on_missing_file() {
        // SAFETY: no other test in this process touches PORT concurrently.
        unsafe { std::env::remove_var("PORT") };
        let config = ServerConfig::load_or_default("definitely-does-not-exist.toml").unwrap();
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.nodes[0].port, 4040);
        assert_eq!(config.remote_call_timeout(), Duration::from_secs(5));
    }
}
