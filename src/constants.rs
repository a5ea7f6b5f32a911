//! Definitions of constants.

use std::time::Duration;

use crate::protocol::types::Version;

/// The network protocol version implemented by this crate.
pub const CURRENT_VERSION: Version = Version(60_002);

/// The oldest protocol version we are willing to talk to at all.
pub const MIN_VERSION: Version = Version(209);

/// The first protocol version whose `addr` messages carry per-address
/// timestamps. Peers older than this cannot usefully gossip addresses.
pub const ADDR_TIME_VERSION: Version = Version(31_402);

/// The maximum allowable length of an incoming message body, in bytes.
///
/// A header declaring a larger body is treated as a protocol violation and
/// the connection is closed, bounding per-connection memory use.
pub const MAX_PROTOCOL_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// The maximum number of concurrent outbound peer connections.
pub const MAX_OUTBOUND_CONNECTIONS: usize = 8;

/// The timeout for a single outbound TCP connect attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long the supervisor waits for the worker to acknowledge a control
/// command before reporting a timeout failure.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(60);

/// The timeout for a single DNS seed lookup.
pub const DNS_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// The User-Agent string placed in outbound `version` messages.
pub const USER_AGENT: &str = "/minicoin:0.1.0/";

/// Magic numbers used to identify different networks.
pub mod magics {
    use crate::protocol::types::Magic;

    /// The production mainnet.
    pub const MAINNET: Magic = Magic([0xf9, 0xbe, 0xb4, 0xd9]);
    /// The testnet.
    pub const TESTNET: Magic = Magic([0x0b, 0x11, 0x09, 0x07]);
}
