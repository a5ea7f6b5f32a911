//! Node configuration.

use std::path::PathBuf;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{net::lookup_host, time::timeout};
use tracing::{debug, warn};

use crate::{
    constants::{DNS_LOOKUP_TIMEOUT, USER_AGENT},
    meta_addr::MetaAddr,
    network::Network,
    protocol::types::PeerServices,
    serialization::canonical_socket_addr,
};

/// Configuration for the network engine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The network to connect to.
    pub network: Network,

    /// The path of the peer cache file.
    pub peers_file: PathBuf,

    /// The user agent advertised to peers.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            network: Network::default(),
            peers_file: PathBuf::from("peers.dat"),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Resolve this network's DNS seeders into bootstrap addresses.
    ///
    /// Seeders that fail or time out are skipped with a warning, so the
    /// result may be empty. Seeded addresses carry no verified service
    /// information.
    pub async fn seed_peers(&self) -> Vec<MetaAddr> {
        let port = self.network.default_port();
        let mut lookups: FuturesUnordered<_> = self
            .network
            .seed_hosts()
            .iter()
            .map(|host| resolve_host(host, port))
            .collect();

        let mut seeds = Vec::new();
        while let Some(resolved) = lookups.next().await {
            seeds.extend(resolved);
        }
        seeds
    }
}

async fn resolve_host(host: &str, port: u16) -> Vec<MetaAddr> {
    match timeout(DNS_LOOKUP_TIMEOUT, lookup_host((host, port))).await {
        Ok(Ok(addrs)) => {
            let addrs: Vec<_> = addrs
                .map(|addr| MetaAddr::new(canonical_socket_addr(addr), PeerServices::empty()))
                .collect();
            debug!(host, count = addrs.len(), "resolved seeder");
            addrs
        }
        Ok(Err(e)) => {
            warn!(host, %e, "seeder DNS lookup failed");
            Vec::new()
        }
        Err(_) => {
            warn!(host, "seeder DNS lookup timed out");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_toml_round_trip() {
        let config = Config {
            network: Network::Testnet,
            peers_file: PathBuf::from("/var/lib/minicoin/peers.dat"),
            user_agent: "/custom:1.0/".to_string(),
        };

        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn default_config_parses_from_empty_toml() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed, Config::default());
    }
}
