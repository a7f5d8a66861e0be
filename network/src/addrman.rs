//! Known-peer address book: registered/failed/banned sets plus the
//! rename-protocol persistence shared with the blockchain store.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};

use tkey_core::blockchain::NetworkAddress;
use tkey_core::codec::{decode_varint, encode_varint};

use crate::error::{Error, Result};

/// Hashes/compares a `NetworkAddress` by `(ip, port)` only, ignoring the
/// gossiped `time`/`services` fields — two records for the same peer are
/// the same entry regardless of when they were last seen.
#[derive(Debug, Clone, Copy)]
struct AddrKey(NetworkAddress);

impl PartialEq for AddrKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ip == other.0.ip && self.0.port == other.0.port
    }
}
impl Eq for AddrKey {}
impl Hash for AddrKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.ip.hash(state);
        self.0.port.hash(state);
    }
}

pub struct AddressManager {
    path: PathBuf,
    storage_time: u64,
    address_capacity: usize,
    banned_capacity: usize,
    addresses: HashSet<AddrKey>,
    banned: HashSet<AddrKey>,
    failed: HashSet<AddrKey>,
}

impl AddressManager {
    pub fn new(path: impl Into<PathBuf>, storage_time: u64, address_capacity: usize, banned_capacity: usize) -> Self {
        AddressManager {
            path: path.into(),
            storage_time,
            address_capacity,
            banned_capacity,
            addresses: HashSet::new(),
            banned: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    /// Registers a gossiped or dialed address. A banned or already-failed
    /// address is never added back to the known set.
    pub fn reg(&mut self, addr: NetworkAddress) {
        let key = AddrKey(addr);
        if self.banned.contains(&key) {
            return;
        }
        self.failed.remove(&key);
        self.addresses.replace(key);
        if self.addresses.len() > self.address_capacity {
            self.truncate();
        }
    }

    pub fn fail(&mut self, addr: NetworkAddress) {
        let key = AddrKey(addr);
        self.addresses.remove(&key);
        self.failed.insert(key);
    }

    pub fn ban(&mut self, addr: NetworkAddress) {
        let key = AddrKey(addr);
        self.addresses.remove(&key);
        self.failed.remove(&key);
        self.banned.insert(key);
        if self.banned.len() > self.banned_capacity {
            // oldest bans are simply the ones iteration happens to visit
            // first; exact eviction order isn't load-bearing here.
            if let Some(victim) = self.banned.iter().next().copied() {
                self.banned.remove(&victim);
            }
        }
    }

    pub fn is_banned(&self, addr: &NetworkAddress) -> bool {
        self.banned.contains(&AddrKey(*addr))
    }

    pub fn registered_count(&self) -> usize {
        self.addresses.len()
    }

    pub fn banned_count(&self) -> usize {
        self.banned.len()
    }

    /// Returns up to `n` known addresses for an `addr` relay or a
    /// connection attempt, newest-seen first.
    pub fn get(&self, n: usize) -> Vec<NetworkAddress> {
        let mut sorted: Vec<NetworkAddress> = self.addresses.iter().map(|k| k.0).collect();
        sorted.sort_by_key(|a| std::cmp::Reverse(a.time));
        sorted.truncate(n);
        sorted
    }

    /// Drops addresses older than `storage_time` seconds relative to `now`.
    fn truncate(&mut self) {
        let now = self.newest_time();
        self.addresses.retain(|k| now.saturating_sub(k.0.time as u64) <= self.storage_time);
    }

    fn newest_time(&self) -> u64 {
        self.addresses.iter().map(|k| k.0.time as u64).max().unwrap_or(0)
    }

    pub fn save(&self) -> Result<()> {
        let mut out = Vec::new();
        out.extend(encode_varint(self.addresses.len() as u64));
        for key in &self.addresses {
            encode_address(&key.0, &mut out);
        }
        out.extend(encode_varint(self.banned.len() as u64));
        for key in &self.banned {
            encode_address(&key.0, &mut out);
        }

        let tmp_path = tmp_path_for(&self.path);
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&out)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn load(
        path: impl Into<PathBuf>,
        storage_time: u64,
        address_capacity: usize,
        banned_capacity: usize,
    ) -> Result<Self> {
        let path = path.into();
        let mut manager = AddressManager::new(&path, storage_time, address_capacity, banned_capacity);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(manager),
            Err(e) => return Err(e.into()),
        };

        let mut pos = 0;
        let (addr_count, used) = decode_varint(&bytes[pos..]).map_err(Error::Core)?;
        pos += used;
        for _ in 0..addr_count {
            let (addr, used) = decode_address(&bytes[pos..])?;
            pos += used;
            manager.addresses.insert(AddrKey(addr));
        }
        let (banned_count, used) = decode_varint(&bytes[pos..]).map_err(Error::Core)?;
        pos += used;
        for _ in 0..banned_count {
            let (addr, used) = decode_address(&bytes[pos..])?;
            pos += used;
            manager.banned.insert(AddrKey(addr));
        }
        Ok(manager)
    }
}

fn encode_address(addr: &NetworkAddress, out: &mut Vec<u8>) {
    out.extend_from_slice(&addr.time.to_le_bytes());
    out.extend_from_slice(&addr.services.to_le_bytes());
    out.extend_from_slice(&addr.ip);
    out.extend_from_slice(&addr.port.to_be_bytes());
}

fn decode_address(buf: &[u8]) -> Result<(NetworkAddress, usize)> {
    if buf.len() < 30 {
        return Err(Error::MalformedPayload { command: "<addrman>", reason: "truncated address record" });
    }
    let time = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let services = u64::from_le_bytes(buf[4..12].try_into().unwrap());
    let mut ip = [0u8; 16];
    ip.copy_from_slice(&buf[12..28]);
    let port = u16::from_be_bytes(buf[28..30].try_into().unwrap());
    Ok((NetworkAddress { time, services, ip, port }, 30))
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push("~");
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16, time: u32) -> NetworkAddress {
        NetworkAddress { time, services: 1, ip: [0u8; 16], port }
    }

    #[test]
    fn banned_address_is_not_reregistered() {
        let mut mgr = AddressManager::new("ignored", 604_800, 10, 10);
        mgr.ban(addr(8333, 1));
        mgr.reg(addr(8333, 2));
        assert_eq!(mgr.registered_count(), 0);
        assert!(mgr.is_banned(&addr(8333, 2)));
    }

    #[test]
    fn get_returns_newest_first() {
        let mut mgr = AddressManager::new("ignored", 604_800, 10, 10);
        mgr.reg(addr(1, 10));
        mgr.reg(addr(2, 20));
        let got = mgr.get(2);
        assert_eq!(got[0].port, 2);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("tkey-addrman-test-{}", std::process::id()));
        let mut mgr = AddressManager::new(&dir, 604_800, 10, 10);
        mgr.reg(addr(8333, 5));
        mgr.ban(addr(9001, 6));
        mgr.save().unwrap();
        let reloaded = AddressManager::load(&dir, 604_800, 10, 10).unwrap();
        assert_eq!(reloaded.registered_count(), 1);
        assert_eq!(reloaded.banned_count(), 1);
        std::fs::remove_file(&dir).ok();
    }
}
