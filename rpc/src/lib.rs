//! Thin JSON-RPC shell over the blockchain store. Most methods here are
//! placeholders; only the read-only chain queries are actually wired up.

pub mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::server::{RpcModule, Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde_json::json;
use tkey_core::chain::Blockchain;
use tokio::sync::Mutex;

use crate::error::Error;

pub struct RpcState {
    pub blockchain: Arc<Mutex<Blockchain>>,
}

/// Builds the method table. Kept as a free function so it can be unit
/// tested without binding a socket.
pub fn build_module(state: Arc<RpcState>) -> RpcModule<RpcState> {
    let mut module = RpcModule::new(state);

    module
        .register_async_method("getblockcount", |_params, ctx, _| async move {
            let chain = ctx.blockchain.lock().await;
            Ok::<_, ErrorObjectOwned>(json!(chain.tip_height().unwrap_or(0)))
        })
        .expect("getblockcount is a unique method name");

    module
        .register_async_method("getbestblockhash", |_params, ctx, _| async move {
            let chain = ctx.blockchain.lock().await;
            match chain.tip_hash() {
                Some(hash) => Ok(json!(hash.to_hex())),
                None => Err(ErrorObjectOwned::from(Error::NotImplemented("no chain tip yet"))),
            }
        })
        .expect("getbestblockhash is a unique method name");

    for stub in [
        "getrawtransaction",
        "sendrawtransaction",
        "getblockheader",
        "getblock",
        "getpeerinfo",
        "getconnectioncount",
        "getaddednodeinfo",
    ] {
        module
            .register_method(stub, move |_params, _ctx, _| {
                Err::<serde_json::Value, ErrorObjectOwned>(ErrorObjectOwned::from(Error::NotImplemented(stub)))
            })
            .expect("stub method names are unique");
    }

    module
}

pub async fn serve(addr: SocketAddr, state: Arc<RpcState>) -> crate::error::Result<ServerHandle> {
    let server = Server::builder().build(addr).await?;
    let module = build_module(state);
    Ok(server.start(module))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn getblockcount_reflects_chain_tip() {
        let blockchain = Arc::new(Mutex::new(Blockchain::new()));
        let state = Arc::new(RpcState { blockchain });
        let module = build_module(state);
        let response: u32 = module.call("getblockcount", jsonrpsee::core::params::ArrayParams::new()).await.unwrap();
        assert_eq!(response, 0);
    }

    #[tokio::test]
    async fn unimplemented_stub_returns_error() {
        let blockchain = Arc::new(Mutex::new(Blockchain::new()));
        let state = Arc::new(RpcState { blockchain });
        let module = build_module(state);
        let result: Result<serde_json::Value, _> =
            module.call("getpeerinfo", jsonrpsee::core::params::ArrayParams::new()).await;
        assert!(result.is_err());
    }
}
