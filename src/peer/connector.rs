//! Dialing peers and wrapping the resulting streams in [`Connection`]s.

use std::sync::{Arc, Mutex};

use tokio::{io::{AsyncRead, AsyncWrite}, net::TcpStream, time::timeout};
use tracing::debug;

use crate::{
    address_book::AddressBook,
    constants::CONNECT_TIMEOUT,
    meta_addr::MetaAddr,
    peer::{connection::Connection, error::PeerError},
    protocol::types::{Magic, Nonce},
};

/// Dials outbound peers on behalf of the dispatcher.
///
/// Carries everything a new connection needs that is not peer-specific.
#[derive(Clone, Debug)]
pub struct Connector {
    magic: Magic,
    nonce: Nonce,
    user_agent: String,
    start_height: u32,
    address_book: Arc<Mutex<AddressBook>>,
}

impl Connector {
    /// Build a connector. A fresh [`Nonce`] is drawn for this instance.
    pub fn new(
        magic: Magic,
        user_agent: String,
        start_height: u32,
        address_book: Arc<Mutex<AddressBook>>,
    ) -> Connector {
        Connector {
            magic,
            nonce: Nonce::default(),
            user_agent,
            start_height,
            address_book,
        }
    }

    /// Open a TCP connection to `peer`, bounded by the connect timeout.
    pub async fn connect(&self, peer: MetaAddr) -> Result<Connection<TcpStream>, PeerError> {
        debug!(addr = %peer.addr, "opening connection");
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(peer.addr)).await??;
        stream.set_nodelay(true)?;

        Ok(self.with_stream(stream, peer))
    }

    /// Wrap an already-established transport, used by tests to drive the
    /// connection over in-memory streams.
    pub fn with_stream<S>(&self, stream: S, peer: MetaAddr) -> Connection<S>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        Connection::new(
            stream,
            self.magic,
            self.nonce,
            self.user_agent.clone(),
            self.start_height,
            peer,
            self.address_book.clone(),
        )
    }
}
