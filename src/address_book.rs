//! The `AddressBook` manages information about what peers exist, when they
//! were last seen, and what services they provide.

use std::{
    collections::{HashSet, VecDeque},
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    net::Ipv6Addr,
    path::Path,
};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    meta_addr::{MetaAddr, META_ADDR_SIZE},
    protocol::{
        codec::{self, commands, Header, HEADER_LEN},
        types::Magic,
    },
    serialization::SerializationError,
};

#[cfg(test)]
mod tests;

/// An error that prevented the address book from being loaded.
#[derive(Error, Debug)]
pub enum AddressBookError {
    /// The peer cache file does not exist yet.
    #[error("peer cache file not found")]
    NotFound,

    /// The peer cache file exists but could not be parsed.
    #[error("peer cache is corrupt: {0}")]
    Corrupt(#[from] SerializationError),

    /// An io error while reading or writing the peer cache.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// An ordered, deduplicated set of peer addresses.
///
/// Entries are deduplicated by IP only, so a peer advertised on several ports
/// occupies one slot. Known-working peers are kept at the front of the order
/// and are the first handed out to the dialer.
#[derive(Debug, Default)]
pub struct AddressBook {
    /// The peers, in dial preference order.
    by_preference: VecDeque<MetaAddr>,

    /// The IP identity of every entry in `by_preference`.
    by_ip: HashSet<Ipv6Addr>,
}

impl AddressBook {
    /// Construct an empty `AddressBook`.
    pub fn new() -> AddressBook {
        AddressBook::default()
    }

    /// Construct an `AddressBook` from bootstrap addresses.
    ///
    /// Seeded entries have no verified service information, so their services
    /// are left empty until a handshake fills them in.
    pub fn seeded(addrs: impl IntoIterator<Item = MetaAddr>) -> AddressBook {
        let mut book = AddressBook::new();
        for addr in addrs {
            book.add(addr, true);
        }
        book
    }

    /// The number of entries in the book.
    pub fn len(&self) -> usize {
        self.by_preference.len()
    }

    /// Returns `true` if the book has no entries.
    pub fn is_empty(&self) -> bool {
        self.by_preference.is_empty()
    }

    /// Insert `addr`, unless a peer with the same IP is already present.
    ///
    /// `known_working` entries go to the front of the dial order, gossiped
    /// ones to the back. Returns `true` if the entry was inserted.
    pub fn add(&mut self, addr: MetaAddr, known_working: bool) -> bool {
        if !self.by_ip.insert(addr.ip_key()) {
            return false;
        }

        if known_working {
            self.by_preference.push_front(addr);
        } else {
            self.by_preference.push_back(addr);
        }

        debug!(addr = %addr.addr, known_working, total = self.len(), "added peer address");
        true
    }

    /// Remove and return the most-preferred address, if any.
    pub fn pop_front(&mut self) -> Option<MetaAddr> {
        let addr = self.by_preference.pop_front()?;
        self.by_ip.remove(&addr.ip_key());
        Some(addr)
    }

    /// Load an address book from a peer cache stream.
    ///
    /// The cache is a concatenation of `CAddress` message envelopes. A
    /// malformed record fails the whole load; duplicate IPs within the file
    /// are tolerated, first occurrence winning.
    pub fn load<R: Read>(mut reader: R, magic: Magic) -> Result<AddressBook, AddressBookError> {
        let mut book = AddressBook::new();

        loop {
            let mut header_bytes = [0u8; HEADER_LEN];
            match read_exact_or_eof(&mut reader, &mut header_bytes)? {
                ReadOutcome::Eof => break,
                ReadOutcome::Filled => {}
            }

            let header = Header::parse(&header_bytes);
            if header.magic != magic {
                return Err(SerializationError::Parse("wrong magic in peer cache").into());
            }
            if header.command != commands::CADDRESS {
                return Err(SerializationError::Parse("unexpected record in peer cache").into());
            }
            if header.body_len as usize != META_ADDR_SIZE {
                return Err(SerializationError::Parse("bad record length in peer cache").into());
            }

            let mut body = [0u8; META_ADDR_SIZE];
            reader
                .read_exact(&mut body)
                .map_err(|_| truncated_record())?;
            header.validate_body(&body).map_err(AddressBookError::Corrupt)?;

            let addr = MetaAddr::read(&body[..]).map_err(AddressBookError::Corrupt)?;
            book.add(addr, false);
        }

        Ok(book)
    }

    /// Load an address book from the peer cache file at `path`.
    pub fn load_from_file(
        path: impl AsRef<Path>,
        magic: Magic,
    ) -> Result<AddressBook, AddressBookError> {
        let file = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(AddressBookError::NotFound)
            }
            Err(e) => return Err(e.into()),
        };

        let book = AddressBook::load(BufReader::new(file), magic)?;
        info!(peers = book.len(), path = ?path.as_ref(), "loaded peer cache");
        Ok(book)
    }

    /// Write the book to `writer` in the peer cache format, in preference
    /// order.
    ///
    /// An empty book produces an empty stream.
    pub fn persist<W: Write>(&self, mut writer: W, magic: Magic) -> Result<(), io::Error> {
        for addr in &self.by_preference {
            let mut body = Vec::with_capacity(META_ADDR_SIZE);
            addr.write(&mut body)?;
            let envelope = codec::encode_raw(magic, commands::CADDRESS, &body);
            writer.write_all(&envelope)?;
        }
        writer.flush()
    }

    /// Write the book to the peer cache file at `path`.
    pub fn persist_to_file(&self, path: impl AsRef<Path>, magic: Magic) -> Result<(), io::Error> {
        let file = File::create(path.as_ref())?;
        self.persist(BufWriter::new(file), magic)?;
        info!(peers = self.len(), path = ?path.as_ref(), "wrote peer cache");
        Ok(())
    }

    /// Iterate over the entries in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &MetaAddr> {
        self.by_preference.iter()
    }
}

enum ReadOutcome {
    Filled,
    Eof,
}

/// Read exactly `buf.len()` bytes, distinguishing a clean end-of-stream
/// before the first byte from a mid-record truncation.
fn read_exact_or_eof<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<ReadOutcome, AddressBookError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(ReadOutcome::Eof);
            }
            return Err(truncated_record());
        }
        filled += n;
    }
    Ok(ReadOutcome::Filled)
}

fn truncated_record() -> AddressBookError {
    AddressBookError::Corrupt(SerializationError::Parse("truncated record in peer cache"))
}
