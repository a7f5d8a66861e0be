//! Outbound connection driver: dial, exchange `version`/`verack`, and run
//! the established-state preamble.

use std::time::Duration;

use rand::RngCore;
use tkey_core::blockchain::NetworkAddress;
use tkey_core::codec::Hash256;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::wire::{self, MessageHeader, HEADER_LEN};

/// Timeout budget for a single handshake step, per the liveness model.
const HANDSHAKE_STEP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Init,
    Connect,
    Connected,
    Submit,
    Submited,
    Established,
    Error,
}

/// Everything the established-state preamble needs from the local node to
/// decide what to ask for first.
pub struct LocalTip {
    pub height: u32,
    pub top_hash: Hash256,
    pub genesis_hash: Hash256,
    pub locator: Vec<Hash256>,
}

pub struct Connector {
    state: ConnectorState,
    stream: TcpStream,
    magic: u32,
    our_version: VersionInfo,
}

pub struct VersionInfo {
    pub version: i32,
    pub services: u64,
    pub user_agent: String,
    pub start_height: i32,
}

impl Connector {
    pub async fn dial(addr: std::net::SocketAddr, magic: u32, our_version: VersionInfo) -> Result<Self> {
        let stream = timeout(HANDSHAKE_STEP_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::LivenessTimeout("connect"))??;
        Ok(Connector { state: ConnectorState::Connect, stream, magic, our_version })
    }

    /// Wraps an already-accepted inbound stream so it can run the
    /// server-side handshake below.
    pub fn accept(stream: TcpStream, magic: u32, our_version: VersionInfo) -> Self {
        Connector { state: ConnectorState::Connect, stream, magic, our_version }
    }

    pub fn state(&self) -> ConnectorState {
        self.state
    }

    /// Drives `CONNECT -> CONNECTED -> SUBMIT -> SUBMITED -> ESTABLISHED`,
    /// sending our `version` and waiting for the peer's `version`/`verack`
    /// pair before returning.
    pub async fn handshake(&mut self, peer_addr: NetworkAddress) -> Result<()> {
        self.state = ConnectorState::Connected;

        let nonce = rand::thread_rng().next_u64();
        let version_msg = wire::VersionMessage {
            version: self.our_version.version,
            services: self.our_version.services,
            timestamp: now_secs(),
            recv_addr: peer_addr,
            from_addr: NetworkAddress { time: 0, services: self.our_version.services, ip: [0u8; 16], port: 0 },
            nonce,
            user_agent: self.our_version.user_agent.clone(),
            start_height: self.our_version.start_height,
            relay: true,
        };
        self.send(wire::VersionMessage::COMMAND, version_msg.encode()).await?;
        self.state = ConnectorState::Submit;

        let (command, payload) = self.recv().await?;
        if command != wire::VersionMessage::COMMAND {
            self.state = ConnectorState::Error;
            return Err(Error::PreHandshakeViolation { command });
        }
        let _peer_version = wire::VersionMessage::decode(&payload)?;
        self.state = ConnectorState::Submited;

        self.send(wire::VerackMessage::COMMAND, Vec::new()).await?;

        let (command, _) = self.recv().await?;
        if command != wire::VerackMessage::COMMAND {
            self.state = ConnectorState::Error;
            return Err(Error::PreHandshakeViolation { command });
        }

        self.state = ConnectorState::Established;
        Ok(())
    }

    /// Server-side counterpart to [`handshake`](Self::handshake): the peer
    /// must speak first with `version` per the pre-handshake command
    /// gating rule, then we answer with our own `version` and `verack`.
    pub async fn inbound_handshake(&mut self, peer_addr: NetworkAddress) -> Result<()> {
        self.state = ConnectorState::Connected;

        let (command, payload) = self.recv().await?;
        if command != wire::VersionMessage::COMMAND {
            self.state = ConnectorState::Error;
            return Err(Error::PreHandshakeViolation { command });
        }
        let _peer_version = wire::VersionMessage::decode(&payload)?;
        self.state = ConnectorState::Submit;

        let nonce = rand::thread_rng().next_u64();
        let version_msg = wire::VersionMessage {
            version: self.our_version.version,
            services: self.our_version.services,
            timestamp: now_secs(),
            recv_addr: peer_addr,
            from_addr: NetworkAddress { time: 0, services: self.our_version.services, ip: [0u8; 16], port: 0 },
            nonce,
            user_agent: self.our_version.user_agent.clone(),
            start_height: self.our_version.start_height,
            relay: true,
        };
        self.send(wire::VersionMessage::COMMAND, version_msg.encode()).await?;
        self.send(wire::VerackMessage::COMMAND, Vec::new()).await?;
        self.state = ConnectorState::Submited;

        let (command, _) = self.recv().await?;
        if command != wire::VerackMessage::COMMAND {
            self.state = ConnectorState::Error;
            return Err(Error::PreHandshakeViolation { command });
        }

        self.state = ConnectorState::Established;
        Ok(())
    }

    /// The preamble a freshly-established peer always runs: announce
    /// header-first relay and compact-block support, ping to seed
    /// liveness, ask for whatever headers/blocks we're missing, set our
    /// fee filter, and ask for more peer addresses.
    pub async fn run_established_preamble(&mut self, tip: &LocalTip, ping_nonce: u64) -> Result<()> {
        self.send(wire::SendHeadersMessage::COMMAND, Vec::new()).await?;
        self.send(wire::SendCmpctMessage::COMMAND, wire::SendCmpctMessage { announce: false, version: 1 }.encode()).await?;
        self.send(wire::PingMessage::COMMAND, wire::PingMessage { nonce: ping_nonce }.encode()).await?;

        if tip.height > 0 {
            let msg = wire::GetHeadersMessage { version: self.our_version.version as u32, locator: tip.locator.clone(), stop_hash: tip.top_hash };
            self.send(wire::GetHeadersMessage::COMMAND, msg.encode()).await?;
        } else {
            let inventory = vec![tkey_core::blockchain::InventoryVector {
                kind: tkey_core::blockchain::InventoryType::Block,
                hash: tip.genesis_hash,
            }];
            self.send(wire::GetDataMessage::COMMAND, wire::GetDataMessage { inventory }.encode()).await?;
        }

        self.send(wire::FeeFilterMessage::COMMAND, wire::FeeFilterMessage { fee_rate: 1000 }.encode()).await?;
        self.send(wire::GetAddrMessage::COMMAND, Vec::new()).await?;
        Ok(())
    }

    async fn send(&mut self, command: &str, payload: Vec<u8>) -> Result<()> {
        let frame = wire::build_frame(self.magic, command, &payload)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<(String, Vec<u8>)> {
        let mut header_buf = [0u8; HEADER_LEN];
        timeout(HANDSHAKE_STEP_TIMEOUT, self.stream.read_exact(&mut header_buf))
            .await
            .map_err(|_| Error::LivenessTimeout("handshake read"))??;
        let header = MessageHeader::decode(&header_buf)?;
        if header.magic != self.magic {
            return Err(Error::BadMagic { expected: self.magic, got: header.magic });
        }
        let mut payload = vec![0u8; header.length as usize];
        timeout(HANDSHAKE_STEP_TIMEOUT, self.stream.read_exact(&mut payload))
            .await
            .map_err(|_| Error::LivenessTimeout("handshake read"))??;
        header.verify_checksum(&payload)?;
        Ok((header.command_str()?.to_string(), payload))
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
