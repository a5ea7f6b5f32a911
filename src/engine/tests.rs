//! Engine supervisor tests against a fake peer on loopback TCP.

use std::{
    fs,
    io::{Read, Write},
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream},
    sync::mpsc,
    thread,
    time::Duration,
};

use tempfile::TempDir;

use crate::{
    address_book::AddressBook,
    config::Config,
    constants::{magics, CURRENT_VERSION},
    engine::{ControlMessage, EngineError, NetEngine},
    meta_addr::MetaAddr,
    network::Network,
    protocol::{
        codec::{decode_body, encode_message, Header, HEADER_LEN},
        message::{AddrInVersion, Message, VersionMessage},
        types::{Nonce, PeerServices},
    },
};

/// Initialize test tracing, respecting `RUST_LOG`.
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn read_envelope(stream: &mut TcpStream) -> (Header, Vec<u8>) {
    let mut header_bytes = [0u8; HEADER_LEN];
    stream.read_exact(&mut header_bytes).unwrap();
    let header = Header::parse(&header_bytes);

    let mut body = vec![0u8; header.body_len as usize];
    stream.read_exact(&mut body).unwrap();
    header.validate_body(&body).unwrap();

    (header, body)
}

fn read_decoded(stream: &mut TcpStream) -> Message {
    let (header, body) = read_envelope(stream);
    decode_body(header.command, &body, CURRENT_VERSION).unwrap()
}

fn write_message(stream: &mut TcpStream, msg: &Message) {
    stream
        .write_all(&encode_message(magics::MAINNET, msg).unwrap())
        .unwrap();
}

/// A peer that completes the handshake, signals on `done`, then holds the
/// connection open until the engine hangs up.
fn fake_peer(listener: TcpListener, done: mpsc::Sender<()>) {
    let (mut stream, _) = listener.accept().unwrap();

    let msg = read_decoded(&mut stream);
    assert!(matches!(msg, Message::Version(_)), "expected version, got {msg}");

    let unspecified = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    write_message(
        &mut stream,
        &Message::Version(VersionMessage {
            version: CURRENT_VERSION,
            services: PeerServices::NODE_NETWORK,
            timestamp: 1_231_006_505,
            address_recv: AddrInVersion::new(unspecified, PeerServices::empty()),
            address_from: AddrInVersion::new(unspecified, PeerServices::NODE_NETWORK),
            nonce: Nonce(0x5555_5555_5555_5555),
            user_agent: "/fakepeer:1.0/".to_string(),
            start_height: 1_000,
        }),
    );
    write_message(&mut stream, &Message::Verack);

    assert_eq!(read_decoded(&mut stream), Message::Verack);
    assert_eq!(read_decoded(&mut stream), Message::GetAddr);
    done.send(()).unwrap();

    // Drain until the engine closes the connection.
    let mut buf = [0u8; 1024];
    while stream.read(&mut buf).map(|n| n > 0).unwrap_or(false) {}
}

#[test]
fn engine_handshakes_and_persists_on_stop() {
    init();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let peer_addr = listener.local_addr().unwrap();

    let dir = TempDir::new().unwrap();
    let peers_file = dir.path().join("peers.dat");

    // Seed the cache with the fake peer's address.
    let mut book = AddressBook::new();
    book.add(MetaAddr::new(peer_addr, PeerServices::empty()), false);
    book.persist_to_file(&peers_file, magics::MAINNET).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let peer = thread::spawn(move || fake_peer(listener, done_tx));

    let mut engine = NetEngine::new(Config {
        network: Network::Mainnet,
        peers_file: peers_file.clone(),
        user_agent: "/test:0.0.0/".to_string(),
    });
    engine.start(42).unwrap();
    assert!(engine.is_running());
    assert!(matches!(engine.start(42), Err(EngineError::AlreadyRunning)));

    done_rx
        .recv_timeout(Duration::from_secs(30))
        .expect("handshake should complete");

    engine.stop().unwrap();
    assert!(!engine.is_running());
    peer.join().unwrap();

    // The proven peer was re-added at the front and persisted with its
    // advertised services.
    let book = AddressBook::load_from_file(&peers_file, magics::MAINNET).unwrap();
    assert_eq!(book.len(), 1);
    let front = book.iter().next().unwrap();
    assert_eq!(front.addr, peer_addr);
    assert_eq!(front.services, PeerServices::NODE_NETWORK);
}

#[test]
fn corrupt_peer_cache_fails_startup() {
    init();

    let dir = TempDir::new().unwrap();
    let peers_file = dir.path().join("peers.dat");
    fs::write(&peers_file, b"definitely not a peer cache").unwrap();

    let mut engine = NetEngine::new(Config {
        peers_file: peers_file.clone(),
        ..Config::default()
    });

    let err = engine.start(0).unwrap_err();
    assert!(
        matches!(err, EngineError::CommandFailed(byte) if byte == ControlMessage::Error as u8),
        "unexpected startup error: {err}",
    );
    assert!(!engine.is_running());
    assert!(matches!(engine.stop(), Err(EngineError::NotRunning)));

    // The corrupt cache was not clobbered by a bootstrap.
    assert_eq!(fs::read(&peers_file).unwrap(), b"definitely not a peer cache");
}

#[test]
fn control_byte_round_trip() {
    for msg in [
        ControlMessage::Ok,
        ControlMessage::Error,
        ControlMessage::Timeout,
        ControlMessage::Start,
        ControlMessage::Stop,
    ] {
        assert_eq!(ControlMessage::try_from(msg as u8).unwrap(), msg);
    }

    assert!(matches!(
        ControlMessage::try_from(9),
        Err(EngineError::UnknownCommand(9))
    ));
}
