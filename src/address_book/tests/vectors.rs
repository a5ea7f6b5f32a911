//! Fixed test vectors for the address book.

use std::net::SocketAddr;

use tempfile::TempDir;

use crate::{
    address_book::{AddressBook, AddressBookError},
    constants::magics,
    meta_addr::MetaAddr,
    protocol::types::PeerServices,
};

fn addr(ip: &str, port: u16) -> MetaAddr {
    MetaAddr {
        addr: SocketAddr::new(ip.parse().unwrap(), port),
        services: PeerServices::NODE_NETWORK,
        last_seen: 1_231_006_505,
    }
}

#[test]
fn duplicate_ips_are_rejected() {
    let mut book = AddressBook::new();

    assert!(book.add(addr("203.0.113.6", 8333), false));
    assert!(!book.add(addr("203.0.113.6", 18333), false));
    assert!(!book.add(addr("203.0.113.6", 8333), true));
    assert_eq!(book.len(), 1);

    // The same IP in IPv6-mapped form is still the same peer.
    let mut mapped = addr("203.0.113.6", 8333);
    mapped.addr = "[::ffff:203.0.113.6]:8333".parse().unwrap();
    assert!(!book.add(mapped, false));
    assert_eq!(book.len(), 1);
}

#[test]
fn known_working_peers_go_first() {
    let mut book = AddressBook::new();

    book.add(addr("203.0.113.1", 8333), false);
    book.add(addr("203.0.113.2", 8333), true);
    book.add(addr("203.0.113.3", 8333), false);
    book.add(addr("203.0.113.4", 8333), true);

    let order: Vec<_> = book.iter().map(|a| a.addr.ip().to_string()).collect();
    assert_eq!(order, ["203.0.113.4", "203.0.113.2", "203.0.113.1", "203.0.113.3"]);
}

#[test]
fn pop_front_removes_identity() {
    let mut book = AddressBook::new();
    book.add(addr("203.0.113.6", 8333), false);

    let popped = book.pop_front().unwrap();
    assert_eq!(popped, addr("203.0.113.6", 8333));
    assert!(book.is_empty());
    assert!(book.pop_front().is_none());

    // Once removed, the IP can be added again.
    assert!(book.add(addr("203.0.113.6", 8333), true));
}

#[test]
fn persist_load_round_trip() {
    let mut book = AddressBook::new();
    book.add(addr("203.0.113.1", 8333), false);
    book.add(addr("203.0.113.2", 18333), true);
    book.add(addr("2001:db8::7", 8333), false);

    let mut bytes = Vec::new();
    book.persist(&mut bytes, magics::MAINNET).unwrap();

    let reloaded = AddressBook::load(&bytes[..], magics::MAINNET).unwrap();
    let original: Vec<_> = book.iter().copied().collect();
    let loaded: Vec<_> = reloaded.iter().copied().collect();
    assert_eq!(original, loaded);
}

#[test]
fn empty_book_persists_to_empty_stream() {
    let book = AddressBook::new();
    let mut bytes = Vec::new();
    book.persist(&mut bytes, magics::MAINNET).unwrap();
    assert!(bytes.is_empty());

    let reloaded = AddressBook::load(&bytes[..], magics::MAINNET).unwrap();
    assert!(reloaded.is_empty());
}

#[test]
fn corrupt_caches_are_rejected_entirely() {
    let mut book = AddressBook::new();
    book.add(addr("203.0.113.1", 8333), false);
    book.add(addr("203.0.113.2", 8333), false);

    let mut bytes = Vec::new();
    book.persist(&mut bytes, magics::MAINNET).unwrap();

    // Truncation inside the second record.
    let truncated = &bytes[..bytes.len() - 7];
    assert!(matches!(
        AddressBook::load(truncated, magics::MAINNET),
        Err(AddressBookError::Corrupt(_))
    ));

    // A flipped payload byte fails the checksum.
    let mut flipped = bytes.clone();
    let last = flipped.len() - 1;
    flipped[last] ^= 0xff;
    assert!(matches!(
        AddressBook::load(&flipped[..], magics::MAINNET),
        Err(AddressBookError::Corrupt(_))
    ));

    // A record tag other than CAddress is not a peer cache.
    let mut retagged = bytes.clone();
    retagged[4..12].copy_from_slice(b"version\0");
    assert!(matches!(
        AddressBook::load(&retagged[..], magics::MAINNET),
        Err(AddressBookError::Corrupt(_))
    ));

    // The wrong network's cache is rejected outright.
    assert!(matches!(
        AddressBook::load(&bytes[..], magics::TESTNET),
        Err(AddressBookError::Corrupt(_))
    ));
}

#[test]
fn duplicates_in_cache_are_tolerated() {
    let mut book = AddressBook::new();
    book.add(addr("203.0.113.1", 8333), false);

    let mut bytes = Vec::new();
    book.persist(&mut bytes, magics::MAINNET).unwrap();
    let doubled: Vec<u8> = bytes.iter().chain(bytes.iter()).copied().collect();

    let reloaded = AddressBook::load(&doubled[..], magics::MAINNET).unwrap();
    assert_eq!(reloaded.len(), 1);
}

#[test]
fn missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("peers.dat");

    assert!(matches!(
        AddressBook::load_from_file(&path, magics::MAINNET),
        Err(AddressBookError::NotFound)
    ));
}

#[test]
fn file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("peers.dat");

    let mut book = AddressBook::new();
    book.add(addr("203.0.113.1", 8333), true);
    book.add(addr("203.0.113.2", 8333), false);
    book.persist_to_file(&path, magics::TESTNET).unwrap();

    let reloaded = AddressBook::load_from_file(&path, magics::TESTNET).unwrap();
    assert_eq!(
        reloaded.iter().copied().collect::<Vec<_>>(),
        book.iter().copied().collect::<Vec<_>>(),
    );
}

#[test]
fn seeded_books_are_persisted_in_full() {
    let seeds = vec![addr("203.0.113.1", 8333), addr("203.0.113.2", 8333)];
    let book = AddressBook::seeded(seeds);
    assert_eq!(book.len(), 2);

    let mut bytes = Vec::new();
    book.persist(&mut bytes, magics::MAINNET).unwrap();
    let reloaded = AddressBook::load(&bytes[..], magics::MAINNET).unwrap();
    assert_eq!(reloaded.len(), 2);
}
