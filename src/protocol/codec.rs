//! The message envelope format and per-message body codecs.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    constants::{ADDR_TIME_VERSION, MAX_PROTOCOL_MESSAGE_LEN},
    meta_addr::{MetaAddr, META_ADDR_SIZE},
    protocol::{
        message::{AddrInVersion, Message, VersionMessage},
        types::{Magic, Nonce, PeerServices, Version},
    },
    serialization::{
        sha256d, ReadBitcoinExt, SerializationError, WriteBitcoinExt,
    },
};

/// The length of a message header: magic, command, body length, checksum.
pub const HEADER_LEN: usize = 24;

/// Command strings, as carried in the header's 12-byte field.
pub mod commands {
    pub const VERSION: [u8; 12] = *b"version\0\0\0\0\0";
    pub const VERACK: [u8; 12] = *b"verack\0\0\0\0\0\0";
    pub const ADDR: [u8; 12] = *b"addr\0\0\0\0\0\0\0\0";
    pub const GETADDR: [u8; 12] = *b"getaddr\0\0\0\0\0";

    /// The record tag used by the peer cache file on disk.
    pub const CADDRESS: [u8; 12] = *b"CAddress\0\0\0\0";
}

/// A parsed message header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// The network magic of the sender.
    pub magic: Magic,
    /// The NUL-padded command string.
    pub command: [u8; 12],
    /// The length of the body that follows, in bytes.
    pub body_len: u32,
    /// The sha256d checksum of the body.
    pub checksum: sha256d::Checksum,
}

impl Header {
    /// Parse a header from its fixed-size wire form.
    ///
    /// All 24-byte strings parse as a header; validity is checked separately
    /// against the expected magic, the body length bound, and the checksum.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Header {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut command = [0u8; 12];
        command.copy_from_slice(&bytes[4..16]);
        let body_len = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&bytes[20..24]);

        Header {
            magic: Magic(magic),
            command,
            body_len,
            checksum: sha256d::Checksum(checksum),
        }
    }

    /// Serialize this header into its wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic.0);
        bytes[4..16].copy_from_slice(&self.command);
        bytes[16..20].copy_from_slice(&self.body_len.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.checksum.0);
        bytes
    }

    /// Check a received body against this header's checksum.
    pub fn validate_body(&self, body: &[u8]) -> Result<(), SerializationError> {
        if self.checksum != sha256d::Checksum::from(body) {
            return Err(SerializationError::Parse("checksum does not match body"));
        }
        Ok(())
    }
}

/// Wrap a message body in a checksummed envelope.
pub fn encode_raw(magic: Magic, command: [u8; 12], body: &[u8]) -> Vec<u8> {
    let header = Header {
        magic,
        command,
        body_len: body.len() as u32,
        checksum: sha256d::Checksum::from(body),
    };

    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(&header.encode());
    bytes.extend_from_slice(body);
    bytes
}

/// Serialize a message, envelope included.
pub fn encode_message(magic: Magic, msg: &Message) -> Result<Vec<u8>, SerializationError> {
    let mut body = Vec::new();
    match msg {
        Message::Version(version) => write_version_body(&mut body, version)?,
        Message::Addr(addrs) => write_addr_body(&mut body, addrs)?,
        // No body.
        Message::Verack | Message::GetAddr | Message::Unknown(_) => {}
    }

    if body.len() > MAX_PROTOCOL_MESSAGE_LEN {
        return Err(SerializationError::Parse("message body too large"));
    }

    Ok(encode_raw(magic, msg.command(), &body))
}

/// Deserialize a message body, dispatching on the header's command.
///
/// `version` is the peer's negotiated protocol version, which selects the
/// `addr` record format.
pub fn decode_body(
    command: [u8; 12],
    body: &[u8],
    version: Version,
) -> Result<Message, SerializationError> {
    match command {
        commands::VERSION => read_version_body(body).map(Message::Version),
        commands::VERACK => Ok(Message::Verack),
        commands::ADDR => read_addr_body(body, version).map(Message::Addr),
        commands::GETADDR => Ok(Message::GetAddr),
        _ => Ok(Message::Unknown(command)),
    }
}

fn write_version_body<W: Write>(mut writer: W, msg: &VersionMessage) -> Result<(), SerializationError> {
    writer.write_u32::<LittleEndian>(msg.version.0)?;
    writer.write_u64::<LittleEndian>(msg.services.bits())?;
    writer.write_i64::<LittleEndian>(msg.timestamp)?;
    write_addr_in_version(&mut writer, &msg.address_recv)?;
    write_addr_in_version(&mut writer, &msg.address_from)?;
    writer.write_u64::<LittleEndian>(msg.nonce.0)?;
    writer.write_string(&msg.user_agent)?;
    writer.write_u32::<LittleEndian>(msg.start_height)?;
    Ok(())
}

fn read_version_body(body: &[u8]) -> Result<VersionMessage, SerializationError> {
    let mut reader = Cursor::new(body);

    let version = Version(reader.read_u32::<LittleEndian>()?);
    let services = PeerServices::from_bits_truncate(reader.read_u64::<LittleEndian>()?);
    let timestamp = reader.read_i64::<LittleEndian>()?;
    let address_recv = read_addr_in_version(&mut reader)?;
    let address_from = read_addr_in_version(&mut reader)?;
    let nonce = Nonce(reader.read_u64::<LittleEndian>()?);
    let user_agent = reader.read_string()?;
    let start_height = reader.read_u32::<LittleEndian>()?;

    // Newer peers append a relay flag; any trailing bytes are ignored.
    Ok(VersionMessage {
        version,
        services,
        timestamp,
        address_recv,
        address_from,
        nonce,
        user_agent,
        start_height,
    })
}

fn write_addr_in_version<W: Write>(mut writer: W, addr: &AddrInVersion) -> Result<(), SerializationError> {
    writer.write_u64::<LittleEndian>(addr.services.bits())?;
    writer.write_socket_addr(addr.addr)?;
    Ok(())
}

fn read_addr_in_version<R: Read>(mut reader: R) -> Result<AddrInVersion, SerializationError> {
    let services = PeerServices::from_bits_truncate(reader.read_u64::<LittleEndian>()?);
    let addr = reader.read_socket_addr()?;
    Ok(AddrInVersion { services, addr })
}

fn write_addr_body<W: Write>(mut writer: W, addrs: &[MetaAddr]) -> Result<(), SerializationError> {
    writer.write_compactsize(addrs.len() as u64)?;
    for addr in addrs {
        addr.write(&mut writer)?;
    }
    Ok(())
}

fn read_addr_body(body: &[u8], version: Version) -> Result<Vec<MetaAddr>, SerializationError> {
    let mut reader = Cursor::new(body);
    let count = reader.read_compactsize()? as usize;

    let timed = version >= ADDR_TIME_VERSION;
    let record_size = if timed {
        META_ADDR_SIZE
    } else {
        META_ADDR_SIZE - 4
    };

    let remaining = body.len() - reader.position() as usize;
    if count * record_size != remaining {
        return Err(SerializationError::Parse("addr count does not match body"));
    }

    let mut addrs = Vec::with_capacity(count);
    for _ in 0..count {
        let addr = if timed {
            MetaAddr::read(&mut reader)?
        } else {
            MetaAddr::read_without_time(&mut reader)?
        };
        addrs.push(addr);
    }

    Ok(addrs)
}
