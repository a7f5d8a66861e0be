//! Top-level error type for the daemon entrypoint.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] tkey_core::Error),

    #[error(transparent)]
    Network(#[from] tkey_network::Error),

    #[error(transparent)]
    Rpc(#[from] tkey_rpc::error::Error),

    #[error("invalid listen address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("could not install the global tracing subscriber: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, CliError>;
