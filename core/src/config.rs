//! Runtime configuration for the node.
//!
//! [`Config`] centralises every key recognized from the TOML configuration
//! file (see the config file format in the project spec). It is built via
//! the fluent [`ConfigBuilder`], mirroring the original builder pattern but
//! extended to cover worker counts, transports, blockchain paths, and
//! address-manager tuning.
//!
//! ```
//! use tkey_core::config::Config;
//!
//! let cfg = Config::default();
//! assert_eq!(cfg.core.process_name, "tkeyd");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of worker threads, or "auto" to size from available parallelism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Workers {
    Auto(String),
    Count(usize),
}

impl Default for Workers {
    fn default() -> Self {
        Workers::Auto("auto".into())
    }
}

impl Workers {
    /// Resolves to a concrete worker count, at least 2 per the concurrency model.
    pub fn resolve(&self) -> usize {
        match self {
            Workers::Auto(_) => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2)
                .max(2),
            Workers::Count(n) => (*n).max(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub workers: Workers,
    #[serde(rename = "timeZone")]
    pub time_zone: String,
    #[serde(rename = "processName")]
    pub process_name: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            workers: Workers::default(),
            time_zone: "UTC".into(),
            process_name: "tkeyd".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: "tcp".into(),
            host: "0.0.0.0".into(),
            port: 8333,
            secure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainConfig {
    pub mempool: String,
    pub genesis: String,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            mempool: "./data/mempool.dat".into(),
            genesis: "./data/genesis.json".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressesConfig {
    pub path: String,
    #[serde(rename = "storageTime")]
    pub storage_time: u64,
    #[serde(rename = "addressCapacity")]
    pub address_capacity: usize,
    #[serde(rename = "bannedCapacity")]
    pub banned_capacity: usize,
}

impl Default for AddressesConfig {
    fn default() -> Self {
        Self {
            path: "./data/peers.dat".into(),
            storage_time: 604_800,
            address_capacity: 50_000,
            banned_capacity: 10_000,
        }
    }
}

/// Top-level runtime configuration, one struct per recognized key group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_logs")]
    pub logs: String,
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub transports: HashMap<String, TransportConfig>,
    #[serde(default)]
    pub blockchain: BlockchainConfig,
    #[serde(default)]
    pub addresses: AddressesConfig,
}

fn default_logs() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        let mut transports = HashMap::new();
        transports.insert("main".to_string(), TransportConfig::default());
        Self {
            logs: default_logs(),
            core: CoreConfig::default(),
            transports,
            blockchain: BlockchainConfig::default(),
            addresses: AddressesConfig::default(),
        }
    }
}

impl Config {
    /// Parses a TOML configuration file, falling back to defaults for any
    /// absent keys (the TOML deserializer already applies `#[serde(default)]`
    /// per section; missing sections become `Default::default()`).
    pub fn from_toml_str(contents: &str) -> crate::Result<Self> {
        toml::from_str(contents).map_err(|e| crate::Error::Config(e.to_string()))
    }
}

/// Fluent builder for [`Config`], primarily useful in tests.
pub struct ConfigBuilder {
    inner: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self { inner: Config::default() }
    }

    pub fn logs<S: Into<String>>(mut self, level: S) -> Self {
        self.inner.logs = level.into();
        self
    }

    pub fn workers(mut self, workers: Workers) -> Self {
        self.inner.core.workers = workers;
        self
    }

    pub fn process_name<S: Into<String>>(mut self, name: S) -> Self {
        self.inner.core.process_name = name.into();
        self
    }

    pub fn mempool_path<S: Into<String>>(mut self, path: S) -> Self {
        self.inner.blockchain.mempool = path.into();
        self
    }

    pub fn addresses_path<S: Into<String>>(mut self, path: S) -> Self {
        self.inner.addresses.path = path.into();
        self
    }

    pub fn finish(self) -> Config {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .logs("debug")
            .process_name("tkeyd-test")
            .mempool_path("/tmp/mempool.dat")
            .finish();
        assert_eq!(cfg.logs, "debug");
        assert_eq!(cfg.core.process_name, "tkeyd-test");
        assert_eq!(cfg.blockchain.mempool, "/tmp/mempool.dat");
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.addresses.address_capacity, 50_000);
        assert_eq!(cfg.addresses.banned_capacity, 10_000);
        assert_eq!(cfg.transports["main"].port, 8333);
    }

    #[test]
    fn parses_toml_with_partial_keys() {
        let toml_src = r#"
            logs = "warn"

            [core]
            workers = "auto"
            timeZone = "UTC"
            processName = "tkeyd"
        "#;
        let cfg = Config::from_toml_str(toml_src).unwrap();
        assert_eq!(cfg.logs, "warn");
        // sections absent from the file fall back to defaults
        assert_eq!(cfg.addresses.storage_time, 604_800);
    }
}
