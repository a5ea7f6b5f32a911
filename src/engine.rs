//! The engine supervisor: a worker thread driving the dispatcher, controlled
//! over a byte protocol.

use std::{
    io,
    sync::{mpsc, Arc, Mutex},
    thread,
};

use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::{
    address_book::{AddressBook, AddressBookError},
    config::Config,
    constants::CONTROL_TIMEOUT,
    peer::connector::Connector,
    peer_set::PeerSet,
};

/// A control protocol byte.
///
/// The supervisor sends `Start` and `Stop`; the worker acknowledges each
/// command with `Ok` or `Error`. `Timeout` is reserved for recording a
/// missing acknowledgement.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ControlMessage {
    Ok = 0,
    Error = 1,
    Timeout = 2,
    Start = 3,
    Stop = 4,
}

impl TryFrom<u8> for ControlMessage {
    type Error = EngineError;

    fn try_from(byte: u8) -> Result<ControlMessage, EngineError> {
        match byte {
            0 => Ok(ControlMessage::Ok),
            1 => Ok(ControlMessage::Error),
            2 => Ok(ControlMessage::Timeout),
            3 => Ok(ControlMessage::Start),
            4 => Ok(ControlMessage::Stop),
            other => Err(EngineError::UnknownCommand(other)),
        }
    }
}

/// An error in the engine supervisor or its worker.
#[derive(Error, Debug)]
pub enum EngineError {
    /// `start` was called while a worker is already running.
    #[error("engine is already running")]
    AlreadyRunning,

    /// A command was issued with no worker running.
    #[error("engine is not running")]
    NotRunning,

    /// The worker acknowledged a command with something other than OK.
    #[error("worker replied {0:#04x} to a command")]
    CommandFailed(u8),

    /// The worker did not acknowledge a command in time.
    #[error("worker did not acknowledge a command within the timeout")]
    ControlTimeout,

    /// A control channel endpoint was dropped.
    #[error("control channel closed")]
    ChannelClosed,

    /// The worker received a byte that is not a command.
    #[error("unknown control byte {0:#04x}")]
    UnknownCommand(u8),

    /// The worker thread panicked.
    #[error("worker thread panicked")]
    WorkerPanicked,

    /// The address book could not be loaded.
    #[error("address book error: {0}")]
    AddressBook(#[from] AddressBookError),

    /// An io error in engine setup.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

struct WorkerHandle {
    commands: UnboundedSender<u8>,
    replies: mpsc::Receiver<u8>,
    thread: thread::JoinHandle<Result<(), EngineError>>,
}

/// The network engine: owns the worker thread running the dispatcher.
///
/// `start` brings the worker up and waits for its readiness acknowledgement;
/// `stop` shuts it down and joins it. Dropping a running engine stops it on
/// a best-effort basis.
pub struct NetEngine {
    config: Config,
    worker: Option<WorkerHandle>,
}

impl NetEngine {
    pub fn new(config: Config) -> NetEngine {
        NetEngine {
            config,
            worker: None,
        }
    }

    /// Whether a worker is currently running.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Start the worker and wait for it to come up.
    ///
    /// `start_height` is the caller's best block height, advertised in
    /// outbound `version` messages.
    pub fn start(&mut self, start_height: u32) -> Result<(), EngineError> {
        if self.worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let (command_tx, command_rx) = unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::channel();

        let config = self.config.clone();
        let thread = thread::Builder::new()
            .name("minicoin-net".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(worker(config, start_height, command_rx, reply_tx))
            })?;

        self.worker = Some(WorkerHandle {
            commands: command_tx,
            replies: reply_rx,
            thread,
        });

        match self.command(ControlMessage::Start) {
            Ok(()) => {
                info!("network engine started");
                Ok(())
            }
            Err(e) => {
                // The worker is dead or wedged; reap it and surface the
                // startup error.
                if let Some(handle) = self.worker.take() {
                    drop(handle.commands);
                    let _ = handle.thread.join();
                }
                Err(e)
            }
        }
    }

    /// Stop the worker and join it.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if self.worker.is_none() {
            return Err(EngineError::NotRunning);
        }

        let ack = self.command(ControlMessage::Stop);
        let handle = self
            .worker
            .take()
            .expect("worker checked above");
        let joined = handle.thread.join();

        ack?;
        match joined {
            Ok(result) => result,
            Err(_) => Err(EngineError::WorkerPanicked),
        }?;

        info!("network engine stopped");
        Ok(())
    }

    /// Send one command byte and wait for the worker's acknowledgement.
    fn command(&mut self, msg: ControlMessage) -> Result<(), EngineError> {
        let worker = self.worker.as_ref().ok_or(EngineError::NotRunning)?;

        debug!(?msg, "sending control command");
        worker
            .commands
            .send(msg as u8)
            .map_err(|_| EngineError::ChannelClosed)?;

        match worker.replies.recv_timeout(CONTROL_TIMEOUT) {
            Ok(byte) if byte == ControlMessage::Ok as u8 => Ok(()),
            Ok(byte) => Err(EngineError::CommandFailed(byte)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(EngineError::ControlTimeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EngineError::ChannelClosed),
        }
    }
}

impl Drop for NetEngine {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop();
        }
    }
}

/// The worker body: load or bootstrap the address book, run the dispatcher,
/// persist the book on a clean stop.
async fn worker(
    config: Config,
    start_height: u32,
    mut commands: UnboundedReceiver<u8>,
    replies: mpsc::Sender<u8>,
) -> Result<(), EngineError> {
    let book = match setup(&config).await {
        Ok(book) => book,
        Err(e) => {
            // The supervisor is waiting on its START acknowledgement; tell
            // it the worker could not come up.
            if commands.recv().await.is_some() {
                let _ = replies.send(ControlMessage::Error as u8);
            }
            return Err(e);
        }
    };

    let magic = config.network.magic();
    let book = Arc::new(Mutex::new(book));
    let connector = Connector::new(
        magic,
        config.user_agent.clone(),
        start_height,
        book.clone(),
    );
    let peer_set = PeerSet::new(connector, book.clone());

    peer_set.run(&mut commands, &replies).await?;

    book.lock()
        .expect("unexpected panic in address book updater")
        .persist_to_file(&config.peers_file, magic)?;

    Ok(())
}

/// Load the peer cache, falling back to DNS bootstrap only when no cache
/// exists yet. A corrupt cache is fatal.
async fn setup(config: &Config) -> Result<AddressBook, EngineError> {
    let magic = config.network.magic();

    match AddressBook::load_from_file(&config.peers_file, magic) {
        Ok(book) => Ok(book),
        Err(AddressBookError::NotFound) => {
            info!("no peer cache, bootstrapping from DNS seeders");
            let book = AddressBook::seeded(config.seed_peers().await);
            // Persist straight away, so a crash still leaves a cache.
            book.persist_to_file(&config.peers_file, magic)?;
            Ok(book)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests;
