//! The dispatcher: maintains a bounded set of outbound peer connections.

use std::{
    collections::HashSet,
    net::Ipv6Addr,
    sync::{mpsc, Arc, Mutex},
};

use tokio::{sync::mpsc::UnboundedReceiver, task::JoinSet};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    address_book::AddressBook,
    constants::MAX_OUTBOUND_CONNECTIONS,
    engine::{ControlMessage, EngineError},
    peer::{connector::Connector, error::PeerError},
};

/// A set of connection tasks, topped up from the address book.
///
/// Runs single-threaded: connections are cooperative tasks on the worker's
/// runtime, joined and replaced as they terminate.
pub struct PeerSet {
    connector: Connector,
    address_book: Arc<Mutex<AddressBook>>,

    /// The IP identities of currently-running connections.
    active: HashSet<Ipv6Addr>,

    conns: JoinSet<(Ipv6Addr, Result<(), PeerError>)>,
}

impl PeerSet {
    pub fn new(connector: Connector, address_book: Arc<Mutex<AddressBook>>) -> PeerSet {
        PeerSet {
            connector,
            address_book,
            active: HashSet::new(),
            conns: JoinSet::new(),
        }
    }

    /// Spawn connection tasks until the set is full or the book runs dry.
    ///
    /// Entries are taken in book preference order. An address already being
    /// dialed is dropped rather than dialed twice.
    fn open_connections(&mut self) {
        while self.conns.len() < MAX_OUTBOUND_CONNECTIONS {
            let next = self
                .address_book
                .lock()
                .expect("unexpected panic in address book updater")
                .pop_front();
            let Some(peer) = next else {
                break;
            };

            let key = peer.ip_key();
            if !self.active.insert(key) {
                continue;
            }

            let span = info_span!("peer", addr = %peer.addr);
            let connector = self.connector.clone();
            self.conns.spawn(
                async move {
                    let result = async {
                        let conn = connector.connect(peer).await?;
                        conn.run().await
                    }
                    .await;
                    (key, result)
                }
                .instrument(span),
            );
        }

        debug!(open = self.conns.len(), "connection set topped up");
    }

    /// Run the dispatcher until a STOP command arrives or the control
    /// channel fails.
    ///
    /// Control bytes are acknowledged on `replies`; whenever a connection
    /// terminates, the set is refilled from the book.
    pub async fn run(
        mut self,
        commands: &mut UnboundedReceiver<u8>,
        replies: &mpsc::Sender<u8>,
    ) -> Result<(), EngineError> {
        self.open_connections();

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(byte) = cmd else {
                        return Err(EngineError::ChannelClosed);
                    };
                    match ControlMessage::try_from(byte) {
                        Ok(ControlMessage::Start) => {
                            info!("dispatcher running");
                            let _ = replies.send(ControlMessage::Ok as u8);
                        }
                        Ok(ControlMessage::Stop) => {
                            info!("dispatcher stopping");
                            let _ = replies.send(ControlMessage::Ok as u8);
                            return Ok(());
                        }
                        _ => {
                            let _ = replies.send(ControlMessage::Error as u8);
                            return Err(EngineError::UnknownCommand(byte));
                        }
                    }
                }
                Some(joined) = self.conns.join_next(), if !self.conns.is_empty() => {
                    match joined {
                        Ok((key, result)) => {
                            self.active.remove(&key);
                            match result {
                                Ok(()) => debug!("connection finished"),
                                Err(e) => debug!(%e, "connection failed"),
                            }
                        }
                        Err(e) => warn!(%e, "connection task panicked"),
                    }
                    self.open_connections();
                }
            }
        }
    }
}
