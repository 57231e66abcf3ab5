//! Optional TOML topology configuration for a replica group.
//!
//! The CLI's primary surface is flags (`--peer HOST:PORT` repeated), per the
//! core contract. This crate exists so an operator standing up a group of
//! more than a couple of replicas doesn't have to repeat every peer's
//! host:port on every component's command line — `--topology FILE` loads
//! the same information once.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("topology file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to parse topology: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to serialise topology: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("unknown replica id: {0}")]
    UnknownNode(String),
}

/// A single replica's identity and peer list within a topology.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    pub id: String,
    pub host: String,
    pub port: u16,
    /// `host:port` of every other replica in the group, in stable order.
    pub peers: Vec<String>,
}

impl NodeConfig {
    /// This node's own bind address, as `host:port`.
    pub fn hostport(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The full replica group: every node's identity, address, and peer list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Topology {
    pub nodes: Vec<NodeConfig>,
}

impl Topology {
    /// Builds a topology of `ids.len()` replicas on `host`, starting at
    /// `base_port` and incrementing by one per replica, each peered with
    /// every other.
    pub fn new(ids: &[impl AsRef<str>], host: impl Into<String>, base_port: u16) -> Self {
        let host = host.into();
        let hostports: Vec<String> = ids
            .iter()
            .enumerate()
            .map(|(i, _)| format!("{host}:{}", base_port + i as u16))
            .collect();

        let nodes = ids
            .iter()
            .enumerate()
            .map(|(i, id)| NodeConfig {
                id: id.as_ref().to_string(),
                host: host.clone(),
                port: base_port + i as u16,
                peers: hostports
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, hp)| hp.clone())
                    .collect(),
            })
            .collect();

        Self { nodes }
    }

    /// Loads a topology from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Writes this topology to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Looks up one node's configuration by its identifier.
    pub fn get_node(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|node| node.id == id)
    }
}
