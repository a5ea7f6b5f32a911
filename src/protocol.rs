//! The minicoin network protocol: message types and wire codec.

pub mod codec;
pub mod message;
pub mod types;

pub use codec::{Header, HEADER_LEN};
pub use message::{AddrInVersion, Message, VersionMessage};
pub use types::{Magic, Nonce, PeerServices, Version};
