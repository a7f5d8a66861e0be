//! Signature hash construction and verification against a spending
//! transaction's inputs.
//!
//! Two sighash algorithms are supported: the legacy BASE algorithm (which
//! serializes a trimmed copy of the whole transaction) and BIP143's
//! WITNESS_V0 algorithm (which hashes fixed-size midstate components so its
//! cost is O(1) per input instead of O(n^2) over a block). Both are driven
//! by the same hashtype byte.

use crate::blockchain::{Transaction, TxIn, TxOut, SEQUENCE_LOCKTIME_DISABLE_FLAG, SEQUENCE_LOCKTIME_MASK, SEQUENCE_LOCKTIME_TYPE_FLAG};
use crate::codec::{encode_varint, Amount, Hash256};
use crate::hash::double_sha256;
use crate::script::error::ScriptError;
use crate::script::num::ScriptNum;
use crate::script::opcode::OpCode;
use crate::script::script::Script;

pub const SIGHASH_ALL: u32 = 1;
pub const SIGHASH_NONE: u32 = 2;
pub const SIGHASH_SINGLE: u32 = 3;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// The sentinel hash returned when SIGHASH_SINGLE is used but the input
/// index has no corresponding output: `0x00...01`, one in the low byte.
fn single_out_of_range_hash() -> Hash256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 1;
    Hash256::from_le_bytes(bytes)
}

/// Strips every `OP_CODESEPARATOR` byte from `script`, matching the
/// upstream serializer's "count occurrences, then copy the gaps between
/// them" approach rather than a single linear rebuild, since a
/// codeseparator can appear inside what looks like push data only if the
/// push was already consumed by the instruction decoder.
pub fn find_and_delete(script: &Script, to_remove: &[u8]) -> Script {
    if to_remove.is_empty() {
        return script.clone();
    }
    let bytes = &script.0;
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i..].starts_with(to_remove) {
            i += to_remove.len();
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Script::new(out)
}

fn strip_codeseparators(script: &Script) -> Script {
    find_and_delete(script, &[OpCode::OP_CODESEPARATOR.value()])
}

/// Caches the three midstate hashes BIP143 reuses across every input of
/// the same transaction. Only worth computing when the transaction
/// actually carries a witness.
#[derive(Debug, Clone)]
pub struct PrecomputedTransactionData {
    pub hash_prevouts: Hash256,
    pub hash_sequence: Hash256,
    pub hash_outputs: Hash256,
}

impl PrecomputedTransactionData {
    pub fn new(tx: &Transaction) -> Self {
        let mut prevouts = Vec::new();
        let mut sequences = Vec::new();
        for input in &tx.inputs {
            input.prevout.encode(&mut prevouts);
            sequences.extend_from_slice(&input.sequence.to_le_bytes());
        }
        let mut outputs = Vec::new();
        for output in &tx.outputs {
            encode_tx_out(output, &mut outputs);
        }
        PrecomputedTransactionData {
            hash_prevouts: double_sha256(&prevouts),
            hash_sequence: double_sha256(&sequences),
            hash_outputs: double_sha256(&outputs),
        }
    }
}

fn encode_tx_out(out: &TxOut, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&out.value.to_le_bytes());
    buf.extend(encode_varint(out.script_pubkey.len() as u64));
    buf.extend_from_slice(&out.script_pubkey.0);
}

/// Computes the legacy BASE sighash for input `index`.
pub fn signature_hash_base(
    tx: &Transaction,
    index: usize,
    script_code: &Script,
    hash_type: u32,
) -> Result<Hash256, ScriptError> {
    if index >= tx.inputs.len() {
        return Ok(single_out_of_range_hash());
    }
    let base_type = hash_type & 0x1f;
    if base_type == SIGHASH_SINGLE && index >= tx.outputs.len() {
        return Ok(single_out_of_range_hash());
    }

    let script_code = strip_codeseparators(script_code);
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;

    let mut buf = Vec::new();
    buf.extend_from_slice(&tx.version.to_le_bytes());

    let input_count = if anyone_can_pay { 1 } else { tx.inputs.len() };
    buf.extend(encode_varint(input_count as u64));
    if anyone_can_pay {
        encode_input_for_sighash(&tx.inputs[index], &script_code, true, &mut buf);
    } else {
        for (i, input) in tx.inputs.iter().enumerate() {
            let blank_sequence = i != index
                && (base_type == SIGHASH_NONE || base_type == SIGHASH_SINGLE);
            encode_input_for_sighash_full(input, &script_code, i == index, blank_sequence, &mut buf);
        }
    }

    match base_type {
        SIGHASH_NONE => {
            buf.extend(encode_varint(0));
        }
        SIGHASH_SINGLE => {
            buf.extend(encode_varint((index + 1) as u64));
            for _ in &tx.outputs[..index] {
                buf.extend_from_slice(&Amount(-1).to_le_bytes());
                buf.extend(encode_varint(0));
            }
            encode_tx_out(&tx.outputs[index], &mut buf);
        }
        _ => {
            buf.extend(encode_varint(tx.outputs.len() as u64));
            for out in &tx.outputs {
                encode_tx_out(out, &mut buf);
            }
        }
    }

    buf.extend_from_slice(&tx.src_chain.to_le_bytes());
    buf.extend_from_slice(&tx.dst_chain.to_le_bytes());
    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf.extend_from_slice(&hash_type.to_le_bytes());
    Ok(double_sha256(&buf))
}

fn encode_input_for_sighash(input: &TxIn, script_code: &Script, include_script: bool, buf: &mut Vec<u8>) {
    input.prevout.encode(buf);
    if include_script {
        buf.extend(encode_varint(script_code.len() as u64));
        buf.extend_from_slice(&script_code.0);
    } else {
        buf.extend(encode_varint(0));
    }
    buf.extend_from_slice(&input.sequence.to_le_bytes());
}

fn encode_input_for_sighash_full(
    input: &TxIn,
    script_code: &Script,
    is_signed_input: bool,
    blank_sequence: bool,
    buf: &mut Vec<u8>,
) {
    input.prevout.encode(buf);
    if is_signed_input {
        buf.extend(encode_varint(script_code.len() as u64));
        buf.extend_from_slice(&script_code.0);
    } else {
        buf.extend(encode_varint(0));
    }
    let sequence = if is_signed_input {
        input.sequence
    } else if blank_sequence {
        0
    } else {
        input.sequence
    };
    buf.extend_from_slice(&sequence.to_le_bytes());
}

/// Computes the BIP143 WITNESS_V0 sighash for input `index` spending
/// `amount`.
pub fn signature_hash_witness_v0(
    tx: &Transaction,
    index: usize,
    script_code: &Script,
    amount: Amount,
    hash_type: u32,
    cache: &PrecomputedTransactionData,
) -> Hash256 {
    let base_type = hash_type & 0x1f;
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;

    let mut buf = Vec::new();
    buf.extend_from_slice(&tx.version.to_le_bytes());

    let zero = Hash256::zero();
    let hash_prevouts = if !anyone_can_pay { cache.hash_prevouts } else { zero };
    buf.extend_from_slice(hash_prevouts.as_le_bytes());

    let hash_sequence = if !anyone_can_pay && base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        cache.hash_sequence
    } else {
        zero
    };
    buf.extend_from_slice(hash_sequence.as_le_bytes());

    let input = &tx.inputs[index];
    input.prevout.encode(&mut buf);
    buf.extend(encode_varint(script_code.len() as u64));
    buf.extend_from_slice(&script_code.0);
    buf.extend_from_slice(&amount.to_le_bytes());
    buf.extend_from_slice(&input.sequence.to_le_bytes());

    let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        cache.hash_outputs
    } else if base_type == SIGHASH_SINGLE && index < tx.outputs.len() {
        let mut out_buf = Vec::new();
        encode_tx_out(&tx.outputs[index], &mut out_buf);
        double_sha256(&out_buf)
    } else {
        zero
    };
    buf.extend_from_slice(hash_outputs.as_le_bytes());

    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf.extend_from_slice(&hash_type.to_le_bytes());
    double_sha256(&buf)
}

/// Abstracts signature/locktime checks away from the interpreter so tests
/// can substitute a stub checker without a real transaction context.
pub trait SignatureChecker {
    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &Script) -> bool;
    fn check_lock_time(&self, lock_time: ScriptNum) -> bool;
    fn check_sequence(&self, sequence: ScriptNum) -> bool;
}

pub struct TransactionSignatureChecker<'a> {
    pub tx: &'a Transaction,
    pub index: usize,
    pub amount: Amount,
    pub cache: Option<PrecomputedTransactionData>,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(tx: &'a Transaction, index: usize, amount: Amount) -> Self {
        let cache = if tx.has_witness() { Some(PrecomputedTransactionData::new(tx)) } else { None };
        TransactionSignatureChecker { tx, index, amount, cache }
    }

    fn sighash(&self, script_code: &Script, hash_type: u32, is_witness: bool) -> Result<Hash256, ScriptError> {
        if is_witness {
            let cache = self
                .cache
                .clone()
                .unwrap_or_else(|| PrecomputedTransactionData::new(self.tx));
            Ok(signature_hash_witness_v0(self.tx, self.index, script_code, self.amount, hash_type, &cache))
        } else {
            signature_hash_base(self.tx, self.index, script_code, hash_type)
        }
    }

    pub fn check_ecdsa_sig(&self, sig_with_type: &[u8], pubkey: &[u8], script_code: &Script, is_witness: bool) -> bool {
        if sig_with_type.is_empty() {
            return false;
        }
        let (sig_der, hash_type_byte) = sig_with_type.split_at(sig_with_type.len() - 1);
        let hash_type = hash_type_byte[0] as u32;
        let hash = match self.sighash(script_code, hash_type, is_witness) {
            Ok(h) => h,
            Err(_) => return false,
        };
        verify_ecdsa(sig_der, pubkey, &hash)
    }
}

fn verify_ecdsa(sig_der: &[u8], pubkey: &[u8], hash: &Hash256) -> bool {
    use secp256k1::ecdsa::Signature;
    use secp256k1::{Message, PublicKey, Secp256k1};

    let secp = Secp256k1::verification_only();
    let Ok(pk) = PublicKey::from_slice(pubkey) else { return false };
    let Ok(sig) = Signature::from_der(sig_der) else { return false };
    let Ok(msg) = Message::from_digest_slice(hash.as_le_bytes()) else { return false };
    secp.verify_ecdsa(&msg, &sig, &pk).is_ok()
}

impl<'a> SignatureChecker for TransactionSignatureChecker<'a> {
    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &Script) -> bool {
        self.check_ecdsa_sig(sig, pubkey, script_code, false)
    }

    /// BIP65: the input's locktime argument must share units (block height
    /// vs. UNIX time) with the transaction's own `lock_time`, must not
    /// exceed it, and the input must not be final (else locktime is moot).
    fn check_lock_time(&self, lock_time: ScriptNum) -> bool {
        const LOCKTIME_THRESHOLD: i64 = 500_000_000;
        let tx_lock_time = self.tx.lock_time as i64;
        let arg = lock_time.value();
        if !((tx_lock_time < LOCKTIME_THRESHOLD && arg < LOCKTIME_THRESHOLD)
            || (tx_lock_time >= LOCKTIME_THRESHOLD && arg >= LOCKTIME_THRESHOLD))
        {
            return false;
        }
        if arg > tx_lock_time {
            return false;
        }
        self.tx.inputs[self.index].sequence != crate::blockchain::SEQUENCE_FINAL
    }

    /// BIP112: relative locktime via the input's own `sequence` field.
    fn check_sequence(&self, sequence: ScriptNum) -> bool {
        let tx_sequence = self.tx.inputs[self.index].sequence;
        if self.tx.version < 2 {
            return false;
        }
        if tx_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return false;
        }
        let arg = sequence.value() as u32;
        if arg & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return true;
        }
        if !((tx_sequence & SEQUENCE_LOCKTIME_TYPE_FLAG) == (arg & SEQUENCE_LOCKTIME_TYPE_FLAG)) {
            return false;
        }
        (arg & SEQUENCE_LOCKTIME_MASK) <= (tx_sequence & SEQUENCE_LOCKTIME_MASK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{OutPoint, TxOut, SEQUENCE_FINAL};

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                prevout: OutPoint { txid: Hash256::zero(), index: 0 },
                script_sig: Script::new(Vec::new()),
                sequence: SEQUENCE_FINAL,
                witness: Vec::new(),
            }],
            outputs: vec![TxOut { value: Amount(1000), script_pubkey: Script::new(vec![0x51]) }],
            lock_time: 0,
            src_chain: 0,
            dst_chain: 0,
        }
    }

    #[test]
    fn find_and_delete_strips_codeseparator() {
        let script = Script::new(vec![0x51, OpCode::OP_CODESEPARATOR.value(), 0x52]);
        let stripped = strip_codeseparators(&script);
        assert_eq!(stripped.0, vec![0x51, 0x52]);
    }

    #[test]
    fn single_out_of_range_returns_sentinel() {
        let tx = sample_tx();
        let script_code = Script::new(vec![0x51]);
        let hash = signature_hash_base(&tx, 5, &script_code, SIGHASH_ALL).unwrap();
        assert_eq!(hash, single_out_of_range_hash());
    }

    #[test]
    fn base_sighash_changes_with_hash_type() {
        let tx = sample_tx();
        let script_code = Script::new(vec![0x51]);
        let all = signature_hash_base(&tx, 0, &script_code, SIGHASH_ALL).unwrap();
        let none = signature_hash_base(&tx, 0, &script_code, SIGHASH_NONE).unwrap();
        assert_ne!(all, none);
    }

    #[test]
    fn check_lock_time_rejects_final_sequence() {
        let tx = sample_tx();
        let checker = TransactionSignatureChecker::new(&tx, 0, Amount(1000));
        assert!(!checker.check_lock_time(ScriptNum::new(0)));
    }
}
