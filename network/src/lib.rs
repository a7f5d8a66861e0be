//! P2P networking: wire framing, peer/connection state, the outbound
//! connector driver, and the known-address book.

pub mod addrman;
pub mod connector;
pub mod dispatch;
pub mod error;
pub mod peer;
pub mod wire;

pub use error::{Error, Result};

use std::sync::Arc;

use tkey_core::chain::Blockchain;
use tokio::sync::Mutex;

pub const PROTOCOL_VERSION: i32 = 80000;
pub const MIN_PROTOCOL_VERSION: i32 = 80000;
pub const USER_AGENT: &str = "/tkey:8.0.0/tkey-node:0.1.0/";

/// Shared node state handed to every connection task. `Blockchain` keeps
/// no internal locking of its own, so every access here goes through the
/// mutex per the concurrency model.
pub struct Node {
    pub blockchain: Arc<Mutex<Blockchain>>,
    pub addresses: Arc<Mutex<addrman::AddressManager>>,
    pub peers: Arc<Mutex<peer::PeerManager>>,
    pub magic: u32,
}

impl Node {
    pub fn new(blockchain: Blockchain, addresses: addrman::AddressManager, magic: u32) -> Self {
        Node {
            blockchain: Arc::new(Mutex::new(blockchain)),
            addresses: Arc::new(Mutex::new(addresses)),
            peers: Arc::new(Mutex::new(peer::PeerManager::new())),
            magic,
        }
    }

    pub fn our_version_info(&self, start_height: i32) -> connector::VersionInfo {
        connector::VersionInfo {
            version: PROTOCOL_VERSION,
            services: 0,
            user_agent: USER_AGENT.to_string(),
            start_height,
        }
    }
}
