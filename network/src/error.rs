//! Wire-framing and handshake errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("frame magic mismatch: expected {expected:#010x}, got {got:#010x}")]
    BadMagic { expected: u32, got: u32 },

    #[error("checksum mismatch for command {command:?}")]
    BadChecksum { command: String },

    #[error("payload length {0} exceeds the configured maximum")]
    PayloadTooLarge(usize),

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("command string is not valid NUL-padded ASCII")]
    BadCommandString,

    #[error("received {command:?} before the handshake completed")]
    PreHandshakeViolation { command: String },

    #[error("peer liveness timeout: {0}")]
    LivenessTimeout(&'static str),

    #[error("malformed payload for {command:?}: {reason}")]
    MalformedPayload { command: &'static str, reason: &'static str },

    #[error(transparent)]
    Core(#[from] tkey_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
