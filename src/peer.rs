//! Peer connection handling.

pub mod connection;
pub mod connector;
pub mod error;

pub use connection::Connection;
pub use connector::Connector;
pub use error::PeerError;
