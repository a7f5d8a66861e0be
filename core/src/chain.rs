//! The in-memory block/transaction store: header and transaction indices,
//! the active main chain, orphan-block bookkeeping, block-locator
//! construction, and rename-protocol persistence.
//!
//! Mutation is synchronous; the network layer is expected to wrap a
//! `Blockchain` in `Arc<Mutex<_>>` and serialize access the way §5's
//! concurrency model describes, rather than this type doing its own
//! locking. Orphan reconnection recurses directly instead of bouncing
//! through an external task pool — the node glue above this layer owns
//! scheduling policy, not the store itself.

use crate::blockchain::{Block, BlockHeader, InventoryType, InventoryVector, Transaction};
use crate::codec::{decode_varint, encode_varint, Hash256};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io::Write as _;
use std::path::Path;

pub type BlockId = usize;

#[derive(Default)]
pub struct Blockchain {
    headers: Vec<BlockHeader>,
    hash_to_id: HashMap<Hash256, BlockId>,
    merkle_to_id: HashMap<Hash256, BlockId>,
    heights: HashMap<BlockId, u32>,
    main_chain: Vec<BlockId>,
    orphan_blocks: HashMap<Hash256, Vec<BlockId>>,
    transactions: HashMap<Hash256, Transaction>,
    genesis_hash: Option<Hash256>,
}

impl Blockchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_genesis(genesis: Hash256) -> Self {
        Blockchain { genesis_hash: Some(genesis), ..Default::default() }
    }

    pub fn has_tx(&self, hash: &Hash256) -> bool {
        self.transactions.contains_key(hash)
    }

    pub fn has_block(&self, hash: &Hash256) -> bool {
        self.hash_to_id.contains_key(hash)
    }

    pub fn height_of(&self, hash: &Hash256) -> Option<u32> {
        let id = *self.hash_to_id.get(hash)?;
        self.heights.get(&id).copied()
    }

    pub fn is_in_main_chain(&self, hash: &Hash256) -> bool {
        match self.hash_to_id.get(hash) {
            Some(id) => match self.heights.get(id) {
                Some(&h) => self.main_chain.get(h as usize) == Some(id),
                None => false,
            },
            None => false,
        }
    }

    pub fn tip_hash(&self) -> Option<Hash256> {
        let id = *self.main_chain.last()?;
        Some(self.headers[id].hash())
    }

    pub fn tip_height(&self) -> Option<u32> {
        self.main_chain.len().checked_sub(1).map(|h| h as u32)
    }

    pub fn genesis_hash(&self) -> Option<Hash256> {
        self.genesis_hash
    }

    pub fn get_header(&self, hash: &Hash256) -> Option<BlockHeader> {
        self.hash_to_id.get(hash).map(|&id| self.headers[id])
    }

    pub fn get_tx(&self, hash: &Hash256) -> Option<Transaction> {
        self.transactions.get(hash).cloned()
    }

    /// Main-chain headers starting just after the first locator hash we
    /// recognize, up to `max` entries or `stop_hash`, whichever comes
    /// first. An unrecognized locator serves headers from genesis.
    pub fn headers_after(&self, locator: &[Hash256], stop_hash: Hash256, max: usize) -> Vec<BlockHeader> {
        let start_height = locator.iter().find_map(|h| self.height_of(h)).map_or(0, |h| h + 1);
        let mut out = Vec::new();
        for height in start_height..self.main_chain.len() as u32 {
            let id = self.main_chain[height as usize];
            let header = self.headers[id];
            out.push(header);
            if header.hash() == stop_hash || out.len() >= max {
                break;
            }
        }
        out
    }

    /// Registers a header if unseen. Returns `false` if it was already
    /// known.
    pub fn add_block_header(&mut self, header: BlockHeader) -> bool {
        let hash = header.hash();
        if self.hash_to_id.contains_key(&hash) {
            return false;
        }
        let id = self.headers.len();
        self.merkle_to_id.insert(header.merkle_root, id);
        self.headers.push(header);
        self.hash_to_id.insert(hash, id);
        true
    }

    /// Registers a transaction relayed standalone (outside a block), e.g.
    /// via a `tx` message. Returns `false` if already known.
    pub fn add_standalone_tx(&mut self, tx: Transaction) -> bool {
        self.add_tx(tx)
    }

    fn add_tx(&mut self, tx: Transaction) -> bool {
        let txid = tx.txid();
        if self.transactions.contains_key(&txid) {
            return false;
        }
        self.transactions.insert(txid, tx);
        true
    }

    /// Validates the block's Merkle root, registers its header and
    /// transactions, then attempts to connect it to the chain.
    pub fn add_block(&mut self, block: Block) -> Result<()> {
        block.verify_merkle_root()?;
        let hash = block.header.hash();
        self.add_block_header(block.header);
        for tx in block.transactions {
            self.add_tx(tx);
        }
        self.connect_to_ancestor(hash);
        Ok(())
    }

    /// Attempts to splice the block named by `hash` onto the chain,
    /// recursing into any orphans that were waiting on it.
    pub fn connect_to_ancestor(&mut self, hash: Hash256) {
        let id = match self.hash_to_id.get(&hash) {
            Some(&id) => id,
            None => return,
        };
        let header = self.headers[id];

        if self.main_chain.is_empty() {
            let is_genesis = self.genesis_hash.map(|g| g == hash).unwrap_or(true);
            if !is_genesis || !header.prev_block.is_null() {
                self.orphan_blocks.entry(header.prev_block).or_default().push(id);
                return;
            }
            self.heights.insert(id, 0);
            self.main_chain.push(id);
        } else {
            let parent_id = match self.hash_to_id.get(&header.prev_block) {
                Some(&pid) if self.heights.contains_key(&pid) => pid,
                _ => {
                    self.orphan_blocks.entry(header.prev_block).or_default().push(id);
                    return;
                }
            };
            let parent_height = self.heights[&parent_id];
            let new_height = parent_height + 1;
            self.heights.insert(id, new_height);
            if let Some(children) = self.orphan_blocks.get_mut(&header.prev_block) {
                children.retain(|&c| c != id);
            }

            let current_tip_height = self.main_chain.len() as u32 - 1;
            if new_height >= current_tip_height {
                if new_height == current_tip_height + 1 && self.main_chain.last() == Some(&parent_id) {
                    tracing::debug!(height = new_height, "extending main chain");
                } else {
                    tracing::info!(height = new_height, old_height = current_tip_height, "reorganizing main chain");
                }
                self.reorganize_to(id, new_height);
            }
        }

        let waiting = self.orphan_blocks.remove(&hash).unwrap_or_default();
        for child in waiting {
            let child_hash = self.headers[child].hash();
            self.connect_to_ancestor(child_hash);
        }
    }

    /// Rebuilds `main_chain` so that `new_tip` at `new_height` becomes the
    /// tip, walking both chains back to their common ancestor.
    fn reorganize_to(&mut self, new_tip: BlockId, new_height: u32) {
        let mut path = vec![new_tip];
        let mut walker = new_tip;
        let mut walker_height = new_height;
        while walker_height as usize >= self.main_chain.len()
            || self.main_chain[walker_height as usize] != walker
        {
            if walker_height == 0 {
                break;
            }
            let parent_hash = self.headers[walker].prev_block;
            walker = match self.hash_to_id.get(&parent_hash) {
                Some(&pid) => pid,
                None => break,
            };
            walker_height -= 1;
            path.push(walker);
        }
        self.main_chain.truncate(walker_height as usize);
        path.reverse();
        self.main_chain.extend(path);
    }

    /// A backwards-expanding sequence of block hashes for a `getheaders`
    /// request: every height for the first 10 steps, then doubling step
    /// size, always terminating at genesis.
    pub fn get_block_locator(&self) -> Vec<Hash256> {
        let mut locator = Vec::new();
        if self.main_chain.is_empty() {
            return locator;
        }
        let mut step = 1i64;
        let mut index = self.main_chain.len() as i64 - 1;
        let mut count = 0;
        loop {
            let id = self.main_chain[index as usize];
            locator.push(self.headers[id].hash());
            if index == 0 {
                break;
            }
            count += 1;
            if count >= 10 {
                step *= 2;
            }
            index = (index - step).max(0);
        }
        locator
    }

    /// Drops `Error` entries and any item the store already has, in
    /// place.
    pub fn filter_known_inventory(&self, list: &mut Vec<InventoryVector>) {
        list.retain(|item| match item.kind {
            InventoryType::Error => false,
            InventoryType::Tx => !self.has_tx(&item.hash),
            InventoryType::Block | InventoryType::FilteredBlock | InventoryType::CmpctBlock => {
                !self.has_block(&item.hash)
            }
        });
    }

    /// Writes `size_and_(headers) || size_and_(transactions)` to
    /// `<path>~`, then renames it onto `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        buf.extend(encode_varint(self.headers.len() as u64));
        for header in &self.headers {
            buf.extend_from_slice(&header.encode());
        }
        buf.extend(encode_varint(self.transactions.len() as u64));
        for tx in self.transactions.values() {
            let encoded = tx.encode();
            buf.extend(encode_varint(encoded.len() as u64));
            buf.extend_from_slice(&encoded);
        }

        let tmp_path = tmp_path_for(path);
        let mut file = std::fs::File::create(&tmp_path)
            .map_err(|e| Error::Persistence(format!("create {}: {e}", tmp_path.display())))?;
        file.write_all(&buf).map_err(|e| Error::Persistence(format!("write: {e}")))?;
        file.sync_all().map_err(|e| Error::Persistence(format!("fsync: {e}")))?;
        std::fs::rename(&tmp_path, path).map_err(|e| Error::Persistence(format!("rename: {e}")))?;
        tracing::debug!(path = %path.display(), headers = self.headers.len(), txs = self.transactions.len(), "saved blockchain store");
        Ok(())
    }

    /// Loads from `path`; a missing file is treated as an empty store, not
    /// an error.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(Error::Persistence(format!("read: {e}"))),
        };

        let mut store = Self::new();
        let mut pos = 0usize;
        let (n_headers, used) = decode_varint(&bytes[pos..])?;
        pos += used;
        let mut header_hashes = Vec::with_capacity(n_headers as usize);
        for _ in 0..n_headers {
            let header = BlockHeader::decode(&bytes[pos..])?;
            pos += 84;
            header_hashes.push(header.hash());
            store.add_block_header(header);
        }

        let (n_txs, used) = decode_varint(&bytes[pos..])?;
        pos += used;
        for _ in 0..n_txs {
            let (len, used) = decode_varint(&bytes[pos..])?;
            pos += used;
            let (tx, _) = Transaction::decode(&bytes[pos..pos + len as usize])?;
            pos += len as usize;
            store.add_tx(tx);
        }

        for hash in header_hashes {
            store.connect_to_ancestor(hash);
        }
        Ok(store)
    }
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push("~");
    std::path::PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{OutPoint, TxIn, TxOut, SEQUENCE_FINAL};
    use crate::codec::Amount;
    use crate::hash::merkle_root;
    use crate::script::Script;

    fn coinbase(nonce: u8) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                prevout: OutPoint::NULL,
                script_sig: Script::new(vec![nonce]),
                sequence: SEQUENCE_FINAL,
                witness: Vec::new(),
            }],
            outputs: vec![TxOut { value: Amount(5000_00000000), script_pubkey: Script::new(vec![0x51]) }],
            lock_time: 0,
            src_chain: 0,
            dst_chain: 0,
        }
    }

    fn block_with(prev: Hash256, nonce: u8) -> Block {
        let tx = coinbase(nonce);
        let merkle = merkle_root(&[tx.txid()]).unwrap();
        let header = BlockHeader {
            version: 1,
            prev_block: prev,
            merkle_root: merkle,
            time: 0,
            bits: 0,
            nonce: nonce as u32,
            chain: 0,
        };
        Block { header, transactions: vec![tx] }
    }

    #[test]
    fn genesis_then_extend_advances_tip() {
        let genesis = block_with(Hash256::zero(), 0);
        let genesis_hash = genesis.header.hash();
        let mut chain = Blockchain::with_genesis(genesis_hash);
        chain.add_block(genesis).unwrap();
        assert_eq!(chain.tip_hash(), Some(genesis_hash));
        assert_eq!(chain.tip_height(), Some(0));

        let b1 = block_with(genesis_hash, 1);
        let b1_hash = b1.header.hash();
        chain.add_block(b1).unwrap();
        assert_eq!(chain.tip_hash(), Some(b1_hash));
        assert_eq!(chain.tip_height(), Some(1));
    }

    #[test]
    fn orphan_then_reconnect() {
        let genesis = block_with(Hash256::zero(), 0);
        let genesis_hash = genesis.header.hash();
        let mut chain = Blockchain::with_genesis(genesis_hash);
        chain.add_block(genesis).unwrap();

        let b1 = block_with(genesis_hash, 1);
        let b1_hash = b1.header.hash();
        let b2 = block_with(b1_hash, 2);
        let b2_hash = b2.header.hash();

        chain.add_block(b2).unwrap();
        assert_eq!(chain.tip_hash(), Some(genesis_hash), "orphan must not move the tip");

        chain.add_block(b1).unwrap();
        assert_eq!(chain.tip_hash(), Some(b2_hash));
        assert_eq!(chain.tip_height(), Some(2));
    }

    #[test]
    fn locator_ends_at_genesis() {
        let genesis = block_with(Hash256::zero(), 0);
        let genesis_hash = genesis.header.hash();
        let mut chain = Blockchain::with_genesis(genesis_hash);
        chain.add_block(genesis).unwrap();
        let mut prev = genesis_hash;
        for i in 1..15u8 {
            let b = block_with(prev, i);
            prev = b.header.hash();
            chain.add_block(b).unwrap();
        }
        let locator = chain.get_block_locator();
        assert_eq!(*locator.last().unwrap(), genesis_hash);
    }

    #[test]
    fn filter_known_inventory_drops_known_tx() {
        let genesis = block_with(Hash256::zero(), 0);
        let genesis_hash = genesis.header.hash();
        let txid = genesis.transactions[0].txid();
        let mut chain = Blockchain::with_genesis(genesis_hash);
        chain.add_block(genesis).unwrap();

        let mut list = vec![
            InventoryVector { kind: InventoryType::Tx, hash: txid },
            InventoryVector { kind: InventoryType::Tx, hash: Hash256::zero() },
            InventoryVector { kind: InventoryType::Error, hash: Hash256::zero() },
        ];
        chain.filter_known_inventory(&mut list);
        assert_eq!(list.len(), 1);
        assert_ne!(list[0].hash, txid);
    }
}
