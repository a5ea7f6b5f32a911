//! A minimal peer-to-peer network engine for the Bitcoin wire protocol.
//!
//! ## Design
//!
//! The engine maintains a small set of outbound connections to full nodes,
//! discovers more of the network through `addr` gossip, and keeps what it
//! learns in a peer cache on disk between runs.
//!
//! [`NetEngine`] is the entry point. It supervises a dedicated worker thread
//! over a small byte protocol: the worker runs a single-threaded tokio
//! runtime hosting the dispatcher and its connection tasks, acknowledges
//! `START`/`STOP` commands, and persists the address book on shutdown.
//!
//! ### Peer Discovery
//!
//! [`AddressBook`]:
//!  * an ordered set of peer addresses, deduplicated by IP
//!  * peers that completed a handshake are re-added at the front, so the
//!    next run dials proven peers first
//!  * loaded from and persisted to a cache file of checksummed records;
//!    a missing cache is bootstrapped from DNS seeders, a corrupt one is
//!    an error
//!
//! ### Individual Peer Connections
//!
//! Each address taken from the book gets one [`Connection`] task:
//!  * performs the `version`/`verack` handshake, requiring the
//!    `NODE_NETWORK` service and rejecting self-connections by nonce
//!  * requests address gossip with `getaddr` from peers new enough to
//!    timestamp it, and feeds incoming `addr` messages into the book
//!  * frames messages manually in two phases, header then body, with a
//!    write queue that preserves partially-written messages across
//!    wakeups
//!
//! The dispatcher keeps up to eight connections open, replacing each
//! connection as it terminates with the next address from the book.

/// Type alias to make working with boxed errors easier.
///
/// Note: the 'static lifetime bound means that the *type* cannot have any
/// non-'static lifetimes, (e.g., when a type contains a borrow and is
/// parameterized by 'a), *not* that the object itself has 'static lifetime.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub mod config;
pub mod constants;

mod address_book;
mod engine;
mod meta_addr;
mod network;
mod peer;
mod peer_set;
mod protocol;
mod serialization;

pub use crate::{
    address_book::{AddressBook, AddressBookError},
    config::Config,
    engine::{ControlMessage, EngineError, NetEngine},
    meta_addr::MetaAddr,
    network::Network,
    peer::{Connection, Connector, PeerError},
    protocol::{AddrInVersion, Magic, Message, Nonce, PeerServices, Version, VersionMessage},
    serialization::SerializationError,
};
