//! Drives one peer connection end to end: handshake (inbound or outbound),
//! the established-state preamble, then the read/dispatch loop described by
//! the framing model, until the peer disconnects or misbehaves.

use std::net::SocketAddr;
use std::sync::Arc;

use tkey_core::blockchain::{InventoryType, InventoryVector, NetworkAddress};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::connector::{Connector, LocalTip};
use crate::error::{Error, Result};
use crate::peer::{Peer, PeerId, PeerState};
use crate::wire;
use crate::Node;

fn socket_addr_to_network(addr: SocketAddr) -> NetworkAddress {
    let ip = match addr.ip() {
        std::net::IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        std::net::IpAddr::V6(v6) => v6.octets(),
    };
    NetworkAddress { time: 0, services: 0, ip, port: addr.port() }
}

async fn current_height(node: &Node) -> i32 {
    node.blockchain.lock().await.tip_height().map(|h| h as i32).unwrap_or(0)
}

async fn local_tip(node: &Node) -> LocalTip {
    let chain = node.blockchain.lock().await;
    LocalTip {
        height: chain.tip_height().unwrap_or(0),
        top_hash: chain.tip_hash().unwrap_or_else(tkey_core::codec::Hash256::zero),
        genesis_hash: chain.genesis_hash().unwrap_or_else(tkey_core::codec::Hash256::zero),
        locator: chain.get_block_locator(),
    }
}

/// Binds `addr` and spawns a connection driver for every inbound peer.
/// Runs until the listener itself errors.
pub async fn listen(node: Arc<Node>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening for inbound peers");
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let node = node.clone();
        tokio::spawn(async move {
            if let Err(e) = run_inbound(node, stream, peer_addr).await {
                tracing::warn!(%peer_addr, error = %e, "inbound connection closed");
            }
        });
    }
}

/// Dials `addr`, completes the outbound handshake and preamble, then hands
/// the socket to the same established-state loop inbound peers use.
pub async fn dial(node: Arc<Node>, addr: SocketAddr) -> Result<()> {
    let our_version = node.our_version_info(current_height(&node).await);
    let mut connector = Connector::dial(addr, node.magic, our_version).await?;
    connector.handshake(socket_addr_to_network(addr)).await?;
    let tip = local_tip(&node).await;
    let ping_nonce = rand::random();
    connector.run_established_preamble(&tip, ping_nonce).await?;
    run_established(node, connector.into_stream(), addr, ping_nonce).await
}

async fn run_inbound(node: Arc<Node>, stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
    let our_version = node.our_version_info(current_height(&node).await);
    let mut connector = Connector::accept(stream, node.magic, our_version);
    connector.inbound_handshake(socket_addr_to_network(peer_addr)).await?;
    let tip = local_tip(&node).await;
    let ping_nonce = rand::random();
    connector.run_established_preamble(&tip, ping_nonce).await?;
    run_established(node, connector.into_stream(), peer_addr, ping_nonce).await
}

async fn run_established(
    node: Arc<Node>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    ping_nonce: u64,
) -> Result<()> {
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_half.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    let mut peer = Peer::new(tx);
    peer.set_state(PeerState::Established);
    peer.seed_ping_nonce(ping_nonce);
    let peer_id = {
        let mut peers = node.peers.lock().await;
        peers.insert(peer)
    };

    tracing::info!(peer = peer_id, %peer_addr, "peer established");

    let result = read_loop(&node, peer_id, &mut read_half).await;

    {
        let mut peers = node.peers.lock().await;
        peers.remove(peer_id);
    }
    writer.abort();

    if let Err(e) = &result {
        tracing::warn!(peer = peer_id, %peer_addr, error = %e, "peer connection closed");
    }
    result
}

async fn read_loop<R>(node: &Arc<Node>, peer_id: PeerId, reader: &mut R) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let (command, payload) = wire::read_frame(reader, node.magic).await?;

        if !wire::is_registered(&command) {
            return Err(Error::UnknownCommand(command));
        }

        {
            let mut peers = node.peers.lock().await;
            if let Some(peer) = peers.get_mut(peer_id) {
                peer.touch();
            }
        }

        dispatch_message(node, peer_id, &command, &payload).await?;
    }
}

/// Looks up the matching handler for one already-validated frame and
/// applies it against the shared node state.
async fn dispatch_message(node: &Arc<Node>, peer_id: PeerId, command: &str, payload: &[u8]) -> Result<()> {
    match command {
        "ping" => {
            let msg = wire::PingMessage::decode(payload)?;
            let mut peers = node.peers.lock().await;
            if let Some(peer) = peers.get_mut(peer_id) {
                peer.pong(node.magic, msg.nonce)?;
            }
        }
        "pong" => {
            let msg = wire::PongMessage::decode(payload)?;
            let peers = node.peers.lock().await;
            let matches = peers.get(peer_id).map(|p| p.verify_pong(msg.nonce)).unwrap_or(false);
            if !matches {
                return Err(Error::LivenessTimeout("pong nonce mismatch"));
            }
        }
        "sendheaders" => {
            let mut peers = node.peers.lock().await;
            if let Some(peer) = peers.get_mut(peer_id) {
                peer.set_send_headers();
            }
        }
        "sendcmpct" => {
            let msg = wire::SendCmpctMessage::decode(payload)?;
            let mut peers = node.peers.lock().await;
            if let Some(peer) = peers.get_mut(peer_id) {
                peer.set_compact(msg.announce, msg.version);
            }
        }
        "feefilter" => {
            let msg = wire::FeeFilterMessage::decode(payload)?;
            let mut peers = node.peers.lock().await;
            if let Some(peer) = peers.get_mut(peer_id) {
                peer.set_fee_filter(msg.fee_rate);
            }
        }
        "getheaders" => {
            let msg = wire::GetHeadersMessage::decode(payload)?;
            let headers = {
                let chain = node.blockchain.lock().await;
                chain.headers_after(&msg.locator, msg.stop_hash, 2000)
            };
            let peers = node.peers.lock().await;
            if let Some(peer) = peers.get(peer_id) {
                peer.send_headers(node.magic, headers)?;
            }
        }
        "getblocks" => {
            let msg = wire::GetBlocksMessage::decode(payload)?;
            let inventory = {
                let chain = node.blockchain.lock().await;
                chain
                    .headers_after(&msg.locator, msg.stop_hash, 500)
                    .into_iter()
                    .map(|h| InventoryVector { kind: InventoryType::Block, hash: h.hash() })
                    .collect::<Vec<_>>()
            };
            let peers = node.peers.lock().await;
            if let Some(peer) = peers.get(peer_id) {
                peer.send_inventory_message(node.magic, inventory)?;
            }
        }
        "getdata" => {
            let msg = wire::GetDataMessage::decode(payload)?;
            let mut not_found = Vec::new();
            {
                let chain = node.blockchain.lock().await;
                let peers = node.peers.lock().await;
                if let Some(peer) = peers.get(peer_id) {
                    for item in msg.inventory {
                        match item.kind {
                            InventoryType::Tx => match chain.get_tx(&item.hash) {
                                Some(tx) => peer.send_tx(node.magic, tx)?,
                                None => not_found.push(item),
                            },
                            // Full block bodies aren't reassembled here: the
                            // store indexes transactions flatly and doesn't
                            // retain per-block membership after connection.
                            _ => not_found.push(item),
                        }
                    }
                }
            }
            if !not_found.is_empty() {
                let peers = node.peers.lock().await;
                if let Some(peer) = peers.get(peer_id) {
                    peer.send_notfound(node.magic, not_found)?;
                }
            }
        }
        "inv" => {
            let msg = wire::InvMessage::decode(payload)?;
            let mut wanted = msg.inventory;
            {
                let chain = node.blockchain.lock().await;
                chain.filter_known_inventory(&mut wanted);
            }
            if !wanted.is_empty() {
                let peers = node.peers.lock().await;
                if let Some(peer) = peers.get(peer_id) {
                    peer.ask_data(node.magic, wanted)?;
                }
            }
        }
        "headers" => {
            let msg = wire::HeadersMessage::decode(payload)?;
            let count = msg.headers.len();
            {
                let mut chain = node.blockchain.lock().await;
                for header in msg.headers {
                    let hash = header.hash();
                    chain.add_block_header(header);
                    chain.connect_to_ancestor(hash);
                }
            }
            tracing::debug!(peer = peer_id, count, "received headers");
        }
        "block" => {
            let msg = wire::BlockMessage::decode(payload)?;
            let mut chain = node.blockchain.lock().await;
            chain.add_block(msg.block)?;
        }
        "tx" => {
            let msg = wire::TxMessage::decode(payload)?;
            let mut chain = node.blockchain.lock().await;
            chain.add_standalone_tx(msg.transaction);
        }
        "getaddr" => {
            let addrs = {
                let mgr = node.addresses.lock().await;
                mgr.get(1000)
            };
            let peers = node.peers.lock().await;
            if let Some(peer) = peers.get(peer_id) {
                peer.send_address(node.magic, addrs)?;
            }
        }
        "addr" => {
            let msg = wire::AddrMessage::decode(payload)?;
            let mut mgr = node.addresses.lock().await;
            for addr in msg.addresses {
                mgr.reg(addr);
            }
        }
        "notfound" => {
            let msg = wire::NotFoundMessage::decode(payload)?;
            tracing::debug!(peer = peer_id, count = msg.inventory.len(), "peer reports notfound");
        }
        "version" | "verack" => {
            tracing::debug!(peer = peer_id, command, "ignoring post-handshake handshake message");
        }
        // Compact-block relay and block-txn fetches are accepted and
        // parsed but not yet acted on.
        "cmpctblock" | "getblocktxn" | "merkleblock" => {
            tracing::debug!(peer = peer_id, command, "command recognized but not yet handled");
        }
        other => return Err(Error::UnknownCommand(other.to_string())),
    }
    Ok(())
}
