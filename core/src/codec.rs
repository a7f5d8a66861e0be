//! Wire codec primitives: VarInt, VarStr, fixed-size hash blobs, Amount.
//!
//! These are the little-endian, little-tagged encodings every other wire
//! type is built from. Decoding a VarInt in a longer-than-necessary form is
//! a hard error — consensus code must reject malleated encodings.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// Encodes `n` as a canonical VarInt.
pub fn encode_varint(n: u64) -> Vec<u8> {
    if n < 253 {
        vec![n as u8]
    } else if n <= u16::MAX as u64 {
        let mut v = vec![0xfd];
        v.extend_from_slice(&(n as u16).to_le_bytes());
        v
    } else if n <= u32::MAX as u64 {
        let mut v = vec![0xfe];
        v.extend_from_slice(&(n as u32).to_le_bytes());
        v
    } else {
        let mut v = vec![0xff];
        v.extend_from_slice(&n.to_le_bytes());
        v
    }
}

/// Decodes a canonical VarInt from the front of `buf`, returning the value
/// and the number of bytes consumed. Rejects non-canonical (longer than
/// necessary) encodings.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize)> {
    let tag = *buf.first().ok_or(Error::Codec("varint: empty buffer"))?;
    match tag {
        0..=252 => Ok((tag as u64, 1)),
        0xfd => {
            let bytes = buf.get(1..3).ok_or(Error::Codec("varint: truncated u16"))?;
            let v = u16::from_le_bytes(bytes.try_into().unwrap());
            if v < 253 {
                return Err(Error::Codec("varint: non-canonical u16 form"));
            }
            Ok((v as u64, 3))
        }
        0xfe => {
            let bytes = buf.get(1..5).ok_or(Error::Codec("varint: truncated u32"))?;
            let v = u32::from_le_bytes(bytes.try_into().unwrap());
            if v as u64 <= u16::MAX as u64 {
                return Err(Error::Codec("varint: non-canonical u32 form"));
            }
            Ok((v as u64, 5))
        }
        0xff => {
            let bytes = buf.get(1..9).ok_or(Error::Codec("varint: truncated u64"))?;
            let v = u64::from_le_bytes(bytes.try_into().unwrap());
            if v <= u32::MAX as u64 {
                return Err(Error::Codec("varint: non-canonical u64 form"));
            }
            Ok((v, 9))
        }
    }
}

/// Encodes a VarStr: a VarInt length prefix followed by the raw bytes.
pub fn encode_varstr(bytes: &[u8]) -> Vec<u8> {
    let mut v = encode_varint(bytes.len() as u64);
    v.extend_from_slice(bytes);
    v
}

/// Decodes a VarStr from the front of `buf`, returning the bytes and the
/// total number of bytes consumed (length prefix + payload).
pub fn decode_varstr(buf: &[u8]) -> Result<(Vec<u8>, usize)> {
    let (len, prefix_len) = decode_varint(buf)?;
    let len = len as usize;
    let payload = buf
        .get(prefix_len..prefix_len + len)
        .ok_or(Error::Codec("varstr: truncated payload"))?;
    Ok((payload.to_vec(), prefix_len + len))
}

/// A fixed-size byte blob stored little-endian, displayed as big-endian hex,
/// and compared lexicographically from the most significant byte. Used for
/// `uint160`/`uint256`-equivalent hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Blob<const N: usize>(pub [u8; N]);

impl<const N: usize> Blob<N> {
    pub fn zero() -> Self {
        Blob([0u8; N])
    }

    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Raw little-endian wire bytes.
    pub fn as_le_bytes(&self) -> &[u8; N] {
        &self.0
    }

    pub fn from_le_bytes(bytes: [u8; N]) -> Self {
        Blob(bytes)
    }

    /// Big-endian byte order, used for display and MSB-first comparison.
    pub fn as_be_bytes(&self) -> [u8; N] {
        let mut out = self.0;
        out.reverse();
        out
    }

    /// Parses a big-endian hex string (optionally `0x`-prefixed) into
    /// little-endian storage.
    pub fn from_be_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut be = hex::decode(s).map_err(|_| Error::Codec("blob: invalid hex"))?;
        if be.len() > N {
            return Err(Error::Codec("blob: hex too long"));
        }
        // left-pad with zeros (big-endian) so short hex strings parse like leading zeros
        while be.len() < N {
            be.insert(0, 0);
        }
        be.reverse();
        let arr: [u8; N] = be.try_into().map_err(|_| Error::Codec("blob: bad length"))?;
        Ok(Blob(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_be_bytes())
    }
}

impl<const N: usize> PartialOrd for Blob<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const N: usize> Ord for Blob<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        for i in (0..N).rev() {
            match self.0[i].cmp(&other.0[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl<const N: usize> fmt::Debug for Blob<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl<const N: usize> fmt::Display for Blob<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl<const N: usize> Default for Blob<N> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<const N: usize> serde::Serialize for Blob<N> {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de, const N: usize> serde::Deserialize<'de> for Blob<N> {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Blob::from_be_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A 20-byte hash (RIPEMD160/HASH160 output).
pub type Hash160 = Blob<20>;
/// A 32-byte hash (SHA-256/HASH256 output).
pub type Hash256 = Blob<32>;

/// Signed 64-bit amount, satoshi-equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Amount(pub i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Amount(i64::from_le_bytes(bytes))
    }
}

impl std::ops::Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_canonical_encodings() {
        assert_eq!(encode_varint(252), vec![0xfc]);
        assert_eq!(encode_varint(253), vec![0xfd, 0xfd, 0x00]);
    }

    #[test]
    fn varint_rejects_noncanonical() {
        // FD 01 00 decodes to 1, which should have used the 1-byte form
        let buf = [0xfd, 0x01, 0x00];
        assert!(decode_varint(&buf).is_err());
    }

    #[test]
    fn varint_roundtrip() {
        for n in [0u64, 1, 252, 253, 65535, 65536, u32::MAX as u64, u32::MAX as u64 + 1, u64::MAX] {
            let enc = encode_varint(n);
            let (dec, used) = decode_varint(&enc).unwrap();
            assert_eq!(dec, n);
            assert_eq!(used, enc.len());
        }
    }

    #[test]
    fn varstr_roundtrip() {
        let data = b"hello tkey";
        let enc = encode_varstr(data);
        let (dec, used) = decode_varstr(&enc).unwrap();
        assert_eq!(dec, data);
        assert_eq!(used, enc.len());
    }

    #[test]
    fn blob_hex_is_big_endian_display_over_le_storage() {
        let blob = Hash256::from_be_hex(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        // last stored byte (MSB) is 0x01
        assert_eq!(blob.0[31], 0x01);
        assert_eq!(
            blob.to_hex(),
            "0000000000000000000000000000000000000000000000000000000000000001"
        );
    }

    #[test]
    fn blob_compares_from_msb() {
        let mut hi = Hash256::zero();
        hi.0[31] = 0x01;
        let mut lo = Hash256::zero();
        lo.0[0] = 0xff;
        assert!(lo < hi);
    }
}
