//! Core blockchain data types: transactions, blocks, and the network
//! address/inventory records shared with the wire protocol.
//!
//! Serialization follows Bitcoin's segwit-tagged transaction format, plus
//! the two extra `src_chain`/`dst_chain` fields this system's transactions
//! carry for its cross-chain bridging feature.

use crate::codec::{decode_varint, decode_varstr, encode_varint, encode_varstr, Amount, Hash256};
use crate::error::{Error, Result};
use crate::hash::{double_sha256, merkle_root};
use crate::script::script::Script;
use serde::{Deserialize, Serialize};

/// A reference to a previous transaction's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub const NULL: OutPoint = OutPoint { txid: Hash256::zero(), index: u32::MAX };

    pub fn is_null(&self) -> bool {
        self.txid.is_null() && self.index == u32::MAX
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.txid.as_le_bytes());
        out.extend_from_slice(&self.index.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let txid_bytes: [u8; 32] = buf
            .get(0..32)
            .ok_or(Error::Codec("outpoint: truncated txid"))?
            .try_into()
            .unwrap();
        let index_bytes: [u8; 4] = buf
            .get(32..36)
            .ok_or(Error::Codec("outpoint: truncated index"))?
            .try_into()
            .unwrap();
        Ok((
            OutPoint { txid: Hash256::from_le_bytes(txid_bytes), index: u32::from_le_bytes(index_bytes) },
            36,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
    /// Witness stack; empty for a non-segwit input. Not covered by the
    /// legacy txid hash, only by the witness-id hash.
    #[serde(default)]
    pub witness: Vec<Vec<u8>>,
}

pub const SEQUENCE_FINAL: u32 = 0xffffffff;
/// Top bit set disables the relative-locktime interpretation of `sequence`.
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;
/// When set, the low 16 bits are a count of 512-second intervals rather
/// than blocks.
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000ffff;

impl TxIn {
    pub fn has_witness(&self) -> bool {
        !self.witness.is_empty()
    }

    fn encode_no_witness(&self, out: &mut Vec<u8>) {
        self.prevout.encode(out);
        out.extend(encode_varstr(&self.script_sig.0));
        out.extend_from_slice(&self.sequence.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Script,
}

impl TxOut {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend(encode_varstr(&self.script_pubkey.0));
    }
}

/// A transaction. `src_chain`/`dst_chain` identify the originating and
/// destination chain for a cross-chain transfer; both are zero for an
/// ordinary same-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
    #[serde(default)]
    pub src_chain: u32,
    #[serde(default)]
    pub dst_chain: u32,
}

const SEGWIT_MARKER: u8 = 0x00;
const SEGWIT_FLAG: u8 = 0x01;

impl Transaction {
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|i| i.has_witness())
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Full serialization, witness-tagged when any input carries one.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out, self.has_witness());
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>, with_witness: bool) {
        out.extend_from_slice(&self.version.to_le_bytes());
        if with_witness {
            out.push(SEGWIT_MARKER);
            out.push(SEGWIT_FLAG);
        }
        out.extend(encode_varint(self.inputs.len() as u64));
        for input in &self.inputs {
            input.encode_no_witness(out);
        }
        out.extend(encode_varint(self.outputs.len() as u64));
        for output in &self.outputs {
            output.encode(out);
        }
        if with_witness {
            for input in &self.inputs {
                out.extend(encode_varint(input.witness.len() as u64));
                for item in &input.witness {
                    out.extend(encode_varstr(item));
                }
            }
        }
        out.extend_from_slice(&self.src_chain.to_le_bytes());
        out.extend_from_slice(&self.dst_chain.to_le_bytes());
        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }

    /// Serialization used for the legacy txid: always witness-stripped.
    pub fn encode_no_witness(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out, false);
        out
    }

    /// The legacy transaction id: double-SHA-256 of the witness-stripped
    /// serialization. Stable regardless of any input's witness data.
    pub fn txid(&self) -> Hash256 {
        double_sha256(&self.encode_no_witness())
    }

    /// The witness id: double-SHA-256 of the full (possibly witness-
    /// tagged) serialization. Equal to `txid()` when the transaction
    /// carries no witness data.
    pub fn wtxid(&self) -> Hash256 {
        double_sha256(&self.encode())
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut pos = 0usize;
        let version_bytes: [u8; 4] =
            buf.get(0..4).ok_or(Error::Codec("tx: truncated version"))?.try_into().unwrap();
        let version = i32::from_le_bytes(version_bytes);
        pos += 4;

        let mut witness_flag = false;
        if buf.get(pos) == Some(&SEGWIT_MARKER) && buf.get(pos + 1) == Some(&SEGWIT_FLAG) {
            witness_flag = true;
            pos += 2;
        }

        let (n_in, used) = decode_varint(&buf[pos..])?;
        pos += used;
        let mut inputs = Vec::with_capacity(n_in as usize);
        for _ in 0..n_in {
            let (prevout, used) = OutPoint::decode(&buf[pos..])?;
            pos += used;
            let (script_bytes, used) = decode_varstr(&buf[pos..])?;
            pos += used;
            let sequence_bytes: [u8; 4] = buf
                .get(pos..pos + 4)
                .ok_or(Error::Codec("tx: truncated sequence"))?
                .try_into()
                .unwrap();
            pos += 4;
            inputs.push(TxIn {
                prevout,
                script_sig: Script::new(script_bytes),
                sequence: u32::from_le_bytes(sequence_bytes),
                witness: Vec::new(),
            });
        }

        let (n_out, used) = decode_varint(&buf[pos..])?;
        pos += used;
        let mut outputs = Vec::with_capacity(n_out as usize);
        for _ in 0..n_out {
            let value_bytes: [u8; 8] =
                buf.get(pos..pos + 8).ok_or(Error::Codec("tx: truncated value"))?.try_into().unwrap();
            pos += 8;
            let (script_bytes, used) = decode_varstr(&buf[pos..])?;
            pos += used;
            outputs.push(TxOut { value: Amount::from_le_bytes(value_bytes), script_pubkey: Script::new(script_bytes) });
        }

        if witness_flag {
            for input in &mut inputs {
                let (n_items, used) = decode_varint(&buf[pos..])?;
                pos += used;
                let mut witness = Vec::with_capacity(n_items as usize);
                for _ in 0..n_items {
                    let (item, used) = decode_varstr(&buf[pos..])?;
                    pos += used;
                    witness.push(item);
                }
                input.witness = witness;
            }
        }

        let src_chain_bytes: [u8; 4] =
            buf.get(pos..pos + 4).ok_or(Error::Codec("tx: truncated src_chain"))?.try_into().unwrap();
        pos += 4;
        let dst_chain_bytes: [u8; 4] =
            buf.get(pos..pos + 4).ok_or(Error::Codec("tx: truncated dst_chain"))?.try_into().unwrap();
        pos += 4;
        let lock_time_bytes: [u8; 4] =
            buf.get(pos..pos + 4).ok_or(Error::Codec("tx: truncated locktime"))?.try_into().unwrap();
        pos += 4;

        Ok((
            Transaction {
                version,
                inputs,
                outputs,
                lock_time: u32::from_le_bytes(lock_time_bytes),
                src_chain: u32::from_le_bytes(src_chain_bytes),
                dst_chain: u32::from_le_bytes(dst_chain_bytes),
            },
            pos,
        ))
    }
}

/// A block header. `chain` is an opaque multi-chain tag carried through
/// serialization and hashing with no validation rule attached to it (see
/// the design notes on multi-chain fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
    pub chain: u32,
}

impl BlockHeader {
    pub fn encode(&self) -> [u8; 84] {
        let mut out = [0u8; 84];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_block.as_le_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_le_bytes());
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out[80..84].copy_from_slice(&self.chain.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 84 {
            return Err(Error::Codec("header: truncated"));
        }
        Ok(BlockHeader {
            version: i32::from_le_bytes(buf[0..4].try_into().unwrap()),
            prev_block: Hash256::from_le_bytes(buf[4..36].try_into().unwrap()),
            merkle_root: Hash256::from_le_bytes(buf[36..68].try_into().unwrap()),
            time: u32::from_le_bytes(buf[68..72].try_into().unwrap()),
            bits: u32::from_le_bytes(buf[72..76].try_into().unwrap()),
            nonce: u32::from_le_bytes(buf[76..80].try_into().unwrap()),
            chain: u32::from_le_bytes(buf[80..84].try_into().unwrap()),
        })
    }

    pub fn hash(&self) -> Hash256 {
        double_sha256(&self.encode())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn compute_merkle_root(&self) -> Option<Hash256> {
        let txids: Vec<Hash256> = self.transactions.iter().map(Transaction::txid).collect();
        merkle_root(&txids)
    }

    /// Checks the header's committed merkle root against the transaction
    /// list's recomputed one.
    pub fn verify_merkle_root(&self) -> Result<()> {
        let computed = self.compute_merkle_root().ok_or(Error::Other("block: empty transaction list"))?;
        if computed != self.header.merkle_root {
            return Err(Error::MerkleMismatch);
        }
        Ok(())
    }
}

/// A peer's network address as gossiped by `addr` messages and stored by
/// the address manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddress {
    pub time: u32,
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryType {
    Error,
    Tx,
    Block,
    FilteredBlock,
    CmpctBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryVector {
    pub kind: InventoryType,
    pub hash: Hash256,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                prevout: OutPoint::NULL,
                script_sig: Script::new(vec![0x51]),
                sequence: SEQUENCE_FINAL,
                witness: Vec::new(),
            }],
            outputs: vec![TxOut { value: Amount(5000), script_pubkey: Script::new(vec![0x51]) }],
            lock_time: 0,
            src_chain: 0,
            dst_chain: 0,
        }
    }

    #[test]
    fn txid_ignores_witness() {
        let mut tx = sample_tx();
        let no_witness_id = tx.txid();
        tx.inputs[0].witness.push(vec![1, 2, 3]);
        assert_eq!(tx.txid(), no_witness_id);
        assert_ne!(tx.wtxid(), no_witness_id);
    }

    #[test]
    fn tx_roundtrips_with_witness() {
        let mut tx = sample_tx();
        tx.inputs[0].witness.push(vec![9, 9]);
        let enc = tx.encode();
        let (decoded, used) = Transaction::decode(&enc).unwrap();
        assert_eq!(used, enc.len());
        assert_eq!(decoded, tx);
    }

    #[test]
    fn header_hash_is_stable_under_decode_roundtrip() {
        let header = BlockHeader {
            version: 1,
            prev_block: Hash256::zero(),
            merkle_root: Hash256::zero(),
            time: 1000,
            bits: 0x1d00ffff,
            nonce: 42,
            chain: 0,
        };
        let enc = header.encode();
        let decoded = BlockHeader::decode(&enc).unwrap();
        assert_eq!(decoded.hash(), header.hash());
    }

    #[test]
    fn block_merkle_mismatch_is_detected() {
        let tx = sample_tx();
        let mut header = BlockHeader {
            version: 1,
            prev_block: Hash256::zero(),
            merkle_root: Hash256::zero(),
            time: 0,
            bits: 0,
            nonce: 0,
            chain: 0,
        };
        header.merkle_root = double_sha256(b"not the real root");
        let block = Block { header, transactions: vec![tx] };
        assert!(block.verify_merkle_root().is_err());
    }
}
