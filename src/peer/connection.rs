//! A peer connection: message framing, a write queue, and the version
//! handshake.

use std::{
    collections::VecDeque,
    io::IoSlice,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    pin::Pin,
    sync::{Arc, Mutex},
    task::Poll,
};

use chrono::Utc;
use futures::future::poll_fn;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info, trace};

use crate::{
    address_book::AddressBook,
    constants::{ADDR_TIME_VERSION, CURRENT_VERSION, MAX_PROTOCOL_MESSAGE_LEN, MIN_VERSION},
    meta_addr::MetaAddr,
    peer::error::PeerError,
    protocol::{
        codec::{self, Header, HEADER_LEN},
        message::{AddrInVersion, Message, VersionMessage},
        types::{Magic, Nonce, PeerServices, Version},
    },
};


/// The framing state of the inbound half of a connection.
///
/// Messages arrive in two phases: a fixed-size header, then a body whose
/// length the header declares. Partial reads leave the accumulated bytes
/// here until the current phase completes.
enum ReadState {
    Header {
        buf: [u8; HEADER_LEN],
        filled: usize,
    },
    Body {
        header: Header,
        buf: Vec<u8>,
        filled: usize,
    },
}

impl ReadState {
    fn new() -> ReadState {
        ReadState::Header {
            buf: [0u8; HEADER_LEN],
            filled: 0,
        }
    }
}

/// A connection to one peer.
///
/// Generic over the transport so tests can drive the state machine over
/// in-memory streams.
pub struct Connection<S> {
    stream: S,

    /// The network magic stamped on every outbound message and required on
    /// every inbound one.
    magic: Magic,

    /// Our instance nonce, for self-connect detection.
    nonce: Nonce,

    /// Our user agent, sent in the outbound `version`.
    user_agent: String,

    /// Our best block height, sent in the outbound `version`.
    start_height: u32,

    /// The address-book entry this connection was dialed from.
    peer: MetaAddr,

    /// Shared address book, updated by handshakes and `addr` gossip.
    address_book: Arc<Mutex<AddressBook>>,

    read_state: ReadState,

    /// Encoded messages awaiting transmission. The front message may have
    /// been partially written; `write_partial` counts its sent bytes.
    write_queue: VecDeque<Vec<u8>>,
    write_partial: usize,

    /// Protocol version in effect: ours until the peer's `version` arrives,
    /// then the minimum of the two.
    negotiated_version: Version,

    seen_version: bool,
    seen_verack: bool,

    /// The services the peer claimed in its `version` message.
    peer_services: PeerServices,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an established transport to `peer`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream: S,
        magic: Magic,
        nonce: Nonce,
        user_agent: String,
        start_height: u32,
        peer: MetaAddr,
        address_book: Arc<Mutex<AddressBook>>,
    ) -> Connection<S> {
        Connection {
            stream,
            magic,
            nonce,
            user_agent,
            start_height,
            peer,
            address_book,
            read_state: ReadState::new(),
            write_queue: VecDeque::new(),
            write_partial: 0,
            negotiated_version: CURRENT_VERSION,
            seen_version: false,
            seen_verack: false,
            peer_services: PeerServices::empty(),
        }
    }

    /// Drive the connection: open with our `version`, then alternate between
    /// draining queued writes and reading peer messages.
    ///
    /// Runs until the connection fails or the peer disconnects; a clean
    /// disconnect surfaces as [`PeerError::ConnectionClosed`].
    pub async fn run(mut self) -> Result<(), PeerError> {
        self.send_message(&Message::Version(self.version_message())).await?;

        loop {
            // Writes take priority: nothing is read while data is queued, so
            // a slow peer cannot grow the queue without bound.
            if !self.write_queue.is_empty() {
                self.flush_queue().await?;
            } else {
                let msg = self.read_message().await?;
                self.handle_message(msg).await?;
            }
        }
    }

    fn version_message(&self) -> VersionMessage {
        let unspecified = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        VersionMessage {
            version: CURRENT_VERSION,
            services: PeerServices::empty(),
            timestamp: Utc::now().timestamp(),
            address_recv: AddrInVersion::new(self.peer.addr, self.peer.services),
            address_from: AddrInVersion::new(unspecified, PeerServices::empty()),
            nonce: self.nonce,
            user_agent: self.user_agent.clone(),
            start_height: self.start_height,
        }
    }

    /// Queue `msg` for transmission, first attempting one immediate write.
    ///
    /// If the transport accepts the whole message straight away no queue
    /// entry is made; a partial or refused write leaves the remainder queued
    /// for [`flush_queue`](Connection::flush_queue).
    async fn send_message(&mut self, msg: &Message) -> Result<(), PeerError> {
        trace!(%msg, "sending message");
        let bytes = codec::encode_message(self.magic, msg)?;

        if !self.write_queue.is_empty() {
            self.write_queue.push_back(bytes);
            return Ok(());
        }

        match try_write_once(&mut self.stream, &bytes).await? {
            Some(0) => Err(PeerError::ConnectionClosed),
            Some(n) if n == bytes.len() => Ok(()),
            Some(n) => {
                self.write_partial = n;
                self.write_queue.push_back(bytes);
                Ok(())
            }
            None => {
                self.write_queue.push_back(bytes);
                Ok(())
            }
        }
    }

    /// Write queued messages until the queue is empty, gathering all pending
    /// buffers into each write.
    async fn flush_queue(&mut self) -> Result<(), PeerError> {
        while !self.write_queue.is_empty() {
            let Connection {
                stream,
                write_queue,
                write_partial,
                ..
            } = self;

            let n = poll_fn(|cx| {
                let mut slices = Vec::with_capacity(write_queue.len());
                let mut queued = write_queue.iter();
                if let Some(front) = queued.next() {
                    slices.push(IoSlice::new(&front[*write_partial..]));
                }
                slices.extend(queued.map(|bytes| IoSlice::new(bytes)));

                Pin::new(&mut *stream).poll_write_vectored(cx, &slices)
            })
            .await?;

            if n == 0 {
                return Err(PeerError::ConnectionClosed);
            }
            self.advance_write_queue(n);
        }

        Ok(())
    }

    /// Account for `n` transmitted bytes, dropping fully-sent messages from
    /// the queue front.
    fn advance_write_queue(&mut self, mut n: usize) {
        while n > 0 {
            let remaining = match self.write_queue.front() {
                Some(front) => front.len() - self.write_partial,
                None => return,
            };

            if n >= remaining {
                self.write_queue.pop_front();
                self.write_partial = 0;
                n -= remaining;
            } else {
                self.write_partial += n;
                return;
            }
        }
    }

    /// Read one complete message, resuming any partially-accumulated header
    /// or body.
    async fn read_message(&mut self) -> Result<Message, PeerError> {
        loop {
            match &mut self.read_state {
                ReadState::Header { buf, filled } => {
                    let n = self.stream.read(&mut buf[*filled..]).await?;
                    if n == 0 {
                        return Err(PeerError::ConnectionClosed);
                    }
                    *filled += n;
                    if *filled < HEADER_LEN {
                        continue;
                    }

                    let header = Header::parse(buf);
                    if header.magic != self.magic {
                        return Err(PeerError::WrongMagic);
                    }
                    if header.body_len as usize > MAX_PROTOCOL_MESSAGE_LEN {
                        return Err(PeerError::OversizedMessage(header.body_len));
                    }

                    self.read_state = ReadState::Body {
                        header,
                        buf: vec![0u8; header.body_len as usize],
                        filled: 0,
                    };
                }
                ReadState::Body {
                    header,
                    buf,
                    filled,
                } => {
                    if *filled < buf.len() {
                        let n = self.stream.read(&mut buf[*filled..]).await?;
                        if n == 0 {
                            return Err(PeerError::ConnectionClosed);
                        }
                        *filled += n;
                        if *filled < buf.len() {
                            continue;
                        }
                    }

                    let header = *header;
                    let body = std::mem::take(buf);
                    self.read_state = ReadState::new();

                    header.validate_body(&body)?;
                    let msg = codec::decode_body(header.command, &body, self.negotiated_version)?;
                    trace!(%msg, body_len = body.len(), "received message");
                    return Ok(msg);
                }
            }
        }
    }

    async fn handle_message(&mut self, msg: Message) -> Result<(), PeerError> {
        match msg {
            Message::Version(version) => self.handle_version(version).await,
            Message::Verack if !self.seen_version => {
                Err(PeerError::UnexpectedMessage("verack".to_string()))
            }
            Message::Verack => self.handle_verack().await,
            // Anything else is a protocol violation until the handshake has
            // completed in both directions.
            msg if !self.seen_version || !self.seen_verack => {
                Err(PeerError::UnexpectedMessage(msg.to_string()))
            }
            Message::Addr(addrs) => self.handle_addr(addrs),
            // We do not relay addresses, and other messages are outside our
            // protocol subset.
            msg @ (Message::GetAddr | Message::Unknown(_)) => {
                trace!(%msg, "ignoring message");
                Ok(())
            }
        }
    }

    async fn handle_version(&mut self, version: VersionMessage) -> Result<(), PeerError> {
        if self.seen_version {
            return Err(PeerError::DuplicateVersion);
        }
        if version.nonce == self.nonce {
            return Err(PeerError::NonceReuse);
        }
        if version.version < MIN_VERSION {
            return Err(PeerError::ObsoleteVersion(version.version));
        }
        if !version.services.contains(PeerServices::NODE_NETWORK) {
            return Err(PeerError::MissingServices);
        }

        self.negotiated_version = std::cmp::min(version.version, CURRENT_VERSION);
        self.peer_services = version.services;
        self.seen_version = true;

        debug!(
            peer_version = version.version.0,
            negotiated = self.negotiated_version.0,
            user_agent = %version.user_agent,
            start_height = version.start_height,
            "received version",
        );

        self.send_message(&Message::Verack).await
    }

    async fn handle_verack(&mut self) -> Result<(), PeerError> {
        if self.seen_verack {
            return Err(PeerError::DuplicateVerack);
        }
        self.seen_verack = true;

        info!(negotiated = self.negotiated_version.0, "handshake complete");

        // The peer answered, so it earns a preferred slot in the book for
        // the next run.
        let proven = MetaAddr::new(self.peer.addr, self.peer_services);
        self.address_book
            .lock()
            .expect("unexpected panic in address book updater")
            .add(proven, true);

        if self.negotiated_version >= ADDR_TIME_VERSION {
            self.send_message(&Message::GetAddr).await?;
        }

        Ok(())
    }

    fn handle_addr(&mut self, addrs: Vec<MetaAddr>) -> Result<(), PeerError> {
        // Peers too old to timestamp their gossip are not a useful source.
        if self.negotiated_version < ADDR_TIME_VERSION {
            trace!("ignoring addr message from old peer");
            return Ok(());
        }

        let mut book = self
            .address_book
            .lock()
            .expect("unexpected panic in address book updater");
        let mut added = 0;
        for addr in addrs {
            if book.add(addr, false) {
                added += 1;
            }
        }
        debug!(added, total = book.len(), "processed addr gossip");

        Ok(())
    }
}

/// Attempt a single write without waiting for writability.
///
/// Returns `Ok(None)` if the transport is not ready to accept any bytes.
async fn try_write_once<S>(stream: &mut S, bytes: &[u8]) -> Result<Option<usize>, std::io::Error>
where
    S: AsyncWrite + Unpin,
{
    poll_fn(|cx| match Pin::new(&mut *stream).poll_write(cx, bytes) {
        Poll::Ready(Ok(n)) => Poll::Ready(Ok(Some(n))),
        Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
        Poll::Pending => Poll::Ready(Ok(None)),
    })
    .await
}
