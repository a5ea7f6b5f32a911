//! Primitive types used across the network protocol.

use std::fmt;

use bitflags::bitflags;

/// A magic number identifying the network.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Magic(pub [u8; 4]);

impl fmt::Debug for Magic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Magic").field(&hex::encode(self.0)).finish()
    }
}

/// A protocol version number.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Version(pub u32);

bitflags! {
    /// A bitflag describing services advertised by a node in the network.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct PeerServices: u64 {
        /// NODE_NETWORK means that the node is a full node capable of serving
        /// blocks, as opposed to a light client that makes network requests
        /// but does not provide network services.
        const NODE_NETWORK = 1;
    }
}

/// A nonce used in the networking layer to identify messages.
///
/// Each process instance draws one random nonce at startup and places it in
/// outbound `version` messages, so a connection back to ourselves can be
/// detected and refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Nonce(pub u64);

impl Default for Nonce {
    fn default() -> Self {
        use rand::{thread_rng, Rng};
        Self(thread_rng().gen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::constants::magics;

    #[test]
    fn magic_debug() {
        assert_eq!(format!("{:?}", magics::MAINNET), "Magic(\"f9beb4d9\")");
        assert_eq!(format!("{:?}", magics::TESTNET), "Magic(\"0b110907\")");
    }

    #[test]
    fn services_default_is_empty() {
        assert!(PeerServices::default().is_empty());
        assert!(!PeerServices::default().contains(PeerServices::NODE_NETWORK));
    }
}
