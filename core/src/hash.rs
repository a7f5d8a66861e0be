//! Streaming double-SHA-256 and Merkle root computation.

use crate::codec::Hash256;
use sha2::{Digest, Sha256};

/// Incremental double-SHA-256 writer. `hash()` hashes the accumulated bytes
/// twice and caches the result; subsequent `write` calls invalidate the
/// cache.
#[derive(Default, Clone)]
pub struct HashWriter {
    inner: Vec<u8>,
    cached: Option<Hash256>,
}

impl HashWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        self.inner.extend_from_slice(bytes);
        self.cached = None;
        self
    }

    pub fn hash(&mut self) -> Hash256 {
        if let Some(h) = self.cached {
            return h;
        }
        let h = double_sha256(&self.inner);
        self.cached = Some(h);
        h
    }
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Double-SHA-256 of `data`, as a [`Hash256`] (little-endian storage).
pub fn double_sha256(data: &[u8]) -> Hash256 {
    let first = sha256(data);
    let second = sha256(&first);
    Hash256::from_le_bytes(second)
}

/// RIPEMD-160 of `data`.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    use ripemd::Ripemd160;
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 followed by RIPEMD-160 (HASH160).
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

/// Computes a Merkle root over a non-empty list of leaf hashes. If the
/// working list's length is odd at any level, the last hash is duplicated
/// before pairing. A single leaf's root is
/// `double_sha256(double_sha256(h) || double_sha256(h))`, i.e. one level of
/// self-pairing.
pub fn merkle_root(leaves: &[Hash256]) -> Option<Hash256> {
    if leaves.is_empty() {
        return None;
    }
    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut buf = Vec::with_capacity(64);
            buf.extend_from_slice(pair[0].as_le_bytes());
            buf.extend_from_slice(pair[1].as_le_bytes());
            next.push(double_sha256(&buf));
        }
        level = next;
    }
    Some(level[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_duplicates_itself() {
        let h = double_sha256(b"leaf");
        let root = merkle_root(&[h]).unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(h.as_le_bytes());
        buf.extend_from_slice(h.as_le_bytes());
        let expected = double_sha256(&buf);
        assert_eq!(root, expected);
    }

    #[test]
    fn writer_caches_until_next_write() {
        let mut w = HashWriter::new();
        w.write(b"abc");
        let first = w.hash();
        let second = w.hash();
        assert_eq!(first, second);
        w.write(b"def");
        let third = w.hash();
        assert_ne!(first, third);
    }

    #[test]
    fn even_count_folds_pairwise() {
        let a = double_sha256(b"a");
        let b = double_sha256(b"b");
        let mut buf = Vec::new();
        buf.extend_from_slice(a.as_le_bytes());
        buf.extend_from_slice(b.as_le_bytes());
        let expected = double_sha256(&buf);
        assert_eq!(merkle_root(&[a, b]).unwrap(), expected);
    }
}
