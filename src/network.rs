//! Network parameters: magic numbers, default ports, and DNS seeders.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{constants::magics, protocol::types::Magic};

/// The network to operate on.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// The production network.
    #[default]
    Mainnet,
    /// The test network.
    Testnet,
}

impl Network {
    /// Get the magic value associated to this `Network`.
    pub fn magic(&self) -> Magic {
        match self {
            Network::Mainnet => magics::MAINNET,
            Network::Testnet => magics::TESTNET,
        }
    }

    /// The default peer port for this network.
    pub fn default_port(&self) -> u16 {
        match self {
            Network::Mainnet => 8333,
            Network::Testnet => 18333,
        }
    }

    /// The DNS seeder hostnames queried when no peer cache exists yet.
    pub fn seed_hosts(&self) -> &'static [&'static str] {
        match self {
            Network::Mainnet => &[
                "seed.bitcoin.sipa.be",
                "dnsseed.bluematt.me",
                "dnsseed.bitcoin.dashjr.org",
                "seed.bitcoinstats.com",
            ],
            Network::Testnet => &[
                "testnet-seed.bitcoin.jonasschnelli.ch",
                "seed.tbtc.petertodd.org",
            ],
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Network::Mainnet => "Mainnet",
            Network::Testnet => "Testnet",
        })
    }
}
