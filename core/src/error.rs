//! Error types for the core crate.
//!
//! All high-level operations return [`crate::Result`], a convenient alias
//! for `core::result::Result<T, Error>`. Script-level failures use the much
//! larger [`crate::script::ScriptError`] instead, since that enum is
//! compared/matched on the hot path of every script evaluation rather than
//! surfaced as a user-facing error.

use thiserror::Error;

/// Core crate error type.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    /// A VarInt/VarStr/Blob was decoded in non-canonical or truncated form.
    #[error("malformed encoding: {0}")]
    Codec(&'static str),

    /// Script evaluation returned a non-OK `ScriptError`.
    #[error("script error: {0:?}")]
    Script(crate::script::ScriptError),

    /// Block's computed Merkle root does not match its header.
    #[error("merkle root mismatch")]
    MerkleMismatch,

    /// Block references a `prev` hash that is not a known header.
    #[error("unknown parent block")]
    UnknownParent,

    /// Transaction hash already present in the index (duplicate).
    #[error("duplicate transaction")]
    DuplicateTx,

    /// Referenced UTXO/previous output is absent.
    #[error("referenced output not found")]
    MissingUtxo,

    /// Sum of transaction outputs exceeds sum of inputs.
    #[error("value outputs exceed inputs")]
    ValueOverflow,

    /// Failed to write persisted state (addresses or mempool file).
    #[error("persistence write failed: {0}")]
    Persistence(String),

    /// Configuration could not be loaded or was invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Placeholder for errors originating from external crates.
    #[error("{0}")]
    Other(&'static str),
}

impl From<crate::script::ScriptError> for Error {
    fn from(e: crate::script::ScriptError) -> Self {
        Error::Script(e)
    }
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
