//! Per-connection peer state: handshake fields, liveness timers, and
//! inventory batching, independent of the actual socket I/O.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tkey_core::blockchain::InventoryVector;
use tokio::sync::mpsc;

use crate::wire;

pub type PeerId = u64;

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

fn next_peer_id() -> PeerId {
    NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Liveness ping cadence, per the handshake/liveness table.
pub const PING_INTERVAL: Duration = Duration::from_secs(300);
/// Grace period before a stalled-but-recently-active peer is dropped.
pub const UNLOAD_DELAY_SHORT: Duration = Duration::from_secs(15);
/// Grace period before an idle peer is dropped.
pub const UNLOAD_DELAY_LONG: Duration = Duration::from_secs(900);
/// Inventory relay batching interval.
pub const INVENTORY_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(5);
/// Maximum entries carried by a single outbound `inv` message.
pub const MAX_INV_PER_MESSAGE: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Handshaking,
    Established,
    Closing,
}

/// One connected peer's protocol-level state. Socket I/O lives in the
/// connection task that owns the other end of `outbound`; this struct is
/// what the rest of the node touches to address and command that peer.
pub struct Peer {
    id: PeerId,
    state: PeerState,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    version: i32,
    send_headers: bool,
    compact_version: u64,
    ping_nonce: u64,
    fee_rate: u64,
    last_active: Instant,
    inventory_for_announce: HashMap<InventoryAnnounceKey, InventoryVector>,
}

/// `InventoryVector` isn't `Hash`, so announce batching keys off the raw
/// kind tag and hash bytes instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InventoryAnnounceKey(u8, [u8; 32]);

fn announce_key(item: &InventoryVector) -> InventoryAnnounceKey {
    let tag = match item.kind {
        tkey_core::blockchain::InventoryType::Error => 0,
        tkey_core::blockchain::InventoryType::Tx => 1,
        tkey_core::blockchain::InventoryType::Block => 2,
        tkey_core::blockchain::InventoryType::FilteredBlock => 3,
        tkey_core::blockchain::InventoryType::CmpctBlock => 4,
    };
    InventoryAnnounceKey(tag, *item.hash.as_le_bytes())
}

impl Peer {
    pub fn new(outbound: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Peer {
            id: next_peer_id(),
            state: PeerState::Connecting,
            outbound,
            version: 0,
            send_headers: false,
            compact_version: 0,
            ping_nonce: 0,
            fee_rate: 0,
            last_active: Instant::now(),
            inventory_for_announce: HashMap::new(),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn set_state(&mut self, state: PeerState) {
        self.state = state;
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    pub fn set_send_headers(&mut self) {
        self.send_headers = true;
    }

    pub fn wants_headers_announce(&self) -> bool {
        self.send_headers
    }

    pub fn set_compact(&mut self, announce: bool, version: u64) {
        self.compact_version = if announce { version } else { 0 };
    }

    pub fn set_fee_filter(&mut self, fee_rate: u64) {
        self.fee_rate = fee_rate;
    }

    pub fn fee_rate(&self) -> u64 {
        self.fee_rate
    }

    /// Updates the liveness clock. Called on receipt of any message.
    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    /// Whether this peer has been quiet long enough to drop, given whether
    /// it has ever completed the handshake.
    pub fn should_unload(&self, handshake_completed: bool) -> bool {
        let delay = if handshake_completed { UNLOAD_DELAY_LONG } else { UNLOAD_DELAY_SHORT };
        self.idle_for() >= delay
    }

    fn send(&self, magic: u32, command: &str, payload: Vec<u8>) -> crate::error::Result<()> {
        let frame = wire::build_frame(magic, command, &payload)?;
        self.outbound.send(frame).map_err(|_| {
            crate::error::Error::LivenessTimeout("peer outbound channel closed")
        })
    }

    pub fn send_notfound(&self, magic: u32, inventory: Vec<InventoryVector>) -> crate::error::Result<()> {
        self.send(magic, wire::NotFoundMessage::COMMAND, wire::NotFoundMessage { inventory }.encode())
    }

    pub fn send_tx(&self, magic: u32, transaction: tkey_core::blockchain::Transaction) -> crate::error::Result<()> {
        self.send(magic, wire::TxMessage::COMMAND, wire::TxMessage { transaction }.encode())
    }

    pub fn ping(&mut self, magic: u32, nonce: u64) -> crate::error::Result<()> {
        self.ping_nonce = nonce;
        self.send(magic, wire::PingMessage::COMMAND, wire::PingMessage { nonce }.encode())
    }

    pub fn pong(&mut self, magic: u32, nonce: u64) -> crate::error::Result<()> {
        self.send(magic, wire::PongMessage::COMMAND, wire::PongMessage { nonce }.encode())
    }

    /// Validates an incoming `pong`'s nonce against the last `ping` sent.
    pub fn verify_pong(&self, nonce: u64) -> bool {
        self.ping_nonce == nonce
    }

    /// Records the nonce of a `ping` sent before this `Peer` existed (the
    /// established-state preamble pings through the raw connector, ahead
    /// of handoff into the peer manager).
    pub fn seed_ping_nonce(&mut self, nonce: u64) {
        self.ping_nonce = nonce;
    }

    pub fn ask_data(&self, magic: u32, inventory: Vec<InventoryVector>) -> crate::error::Result<()> {
        self.send(magic, wire::GetDataMessage::COMMAND, wire::GetDataMessage { inventory }.encode())
    }

    pub fn ask_headers(&self, magic: u32, locator: Vec<tkey_core::codec::Hash256>, stop_hash: tkey_core::codec::Hash256) -> crate::error::Result<()> {
        self.send(magic, wire::GetHeadersMessage::COMMAND, wire::GetHeadersMessage { version: self.version as u32, locator, stop_hash }.encode())
    }

    pub fn ask_blocks(&self, magic: u32, locator: Vec<tkey_core::codec::Hash256>, stop_hash: tkey_core::codec::Hash256) -> crate::error::Result<()> {
        self.send(magic, wire::GetBlocksMessage::COMMAND, wire::GetBlocksMessage { version: self.version as u32, locator, stop_hash }.encode())
    }

    pub fn ask_address(&self, magic: u32) -> crate::error::Result<()> {
        self.send(magic, wire::GetAddrMessage::COMMAND, Vec::new())
    }

    pub fn send_address(&self, magic: u32, addresses: Vec<tkey_core::blockchain::NetworkAddress>) -> crate::error::Result<()> {
        self.send(magic, wire::AddrMessage::COMMAND, wire::AddrMessage { addresses }.encode())
    }

    pub fn send_headers(&self, magic: u32, headers: Vec<tkey_core::blockchain::BlockHeader>) -> crate::error::Result<()> {
        self.send(magic, wire::HeadersMessage::COMMAND, wire::HeadersMessage { headers }.encode())
    }

    pub fn send_inventory_message(&self, magic: u32, inventory: Vec<InventoryVector>) -> crate::error::Result<()> {
        self.send(magic, wire::InvMessage::COMMAND, wire::InvMessage { inventory }.encode())
    }

    /// Queues an item for the next batched `inv` flush, deduplicating
    /// against anything already pending.
    pub fn queue_for_announce(&mut self, item: InventoryVector) {
        self.inventory_for_announce.insert(announce_key(&item), item);
    }

    /// Drains up to one `inv` message's worth of pending announcements.
    pub fn drain_announce(&mut self) -> Vec<InventoryVector> {
        let keys: Vec<InventoryAnnounceKey> =
            self.inventory_for_announce.keys().copied().take(MAX_INV_PER_MESSAGE).collect();
        keys.into_iter().filter_map(|k| self.inventory_for_announce.remove(&k)).collect()
    }
}

/// Tracks every live peer and dispatches the periodic liveness and
/// inventory-announce sweeps.
pub struct PeerManager {
    peers: HashMap<PeerId, Peer>,
}

impl Default for PeerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerManager {
    pub fn new() -> Self {
        PeerManager { peers: HashMap::new() }
    }

    pub fn insert(&mut self, peer: Peer) -> PeerId {
        let id = peer.id();
        self.peers.insert(id, peer);
        id
    }

    pub fn remove(&mut self, id: PeerId) -> Option<Peer> {
        self.peers.remove(&id)
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub fn established_ids(&self) -> Vec<PeerId> {
        self.peers.iter().filter(|(_, p)| p.state() == PeerState::Established).map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Returns the ids of every peer quiet long enough to be dropped.
    pub fn peers_to_unload(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|(_, p)| p.should_unload(p.state() == PeerState::Established))
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_peer_starts_connecting_and_unloads_quickly_if_never_handshaken() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let peer = Peer::new(tx);
        assert_eq!(peer.state(), PeerState::Connecting);
        assert!(!peer.should_unload(false));
    }

    #[test]
    fn pong_nonce_must_match_last_ping() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut peer = Peer::new(tx);
        peer.ping(wire::MAGIC_MAIN, 42).unwrap();
        assert!(peer.verify_pong(42));
        assert!(!peer.verify_pong(43));
    }

    #[test]
    fn manager_tracks_established_peers() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut peer = Peer::new(tx);
        peer.set_state(PeerState::Established);
        let mut mgr = PeerManager::new();
        let id = mgr.insert(peer);
        assert_eq!(mgr.established_ids(), vec![id]);
    }
}
