//! RPC-facing error type, convertible to a `jsonrpsee` error object.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("method not implemented: {0}")]
    NotImplemented(&'static str),

    #[error(transparent)]
    Core(#[from] tkey_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for jsonrpsee::types::ErrorObjectOwned {
    fn from(err: Error) -> Self {
        jsonrpsee::types::ErrorObjectOwned::owned(-32000, err.to_string(), None::<()>)
    }
}
