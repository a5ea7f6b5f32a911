//! Byte-level helpers for the Bitcoin-style wire format.

use std::{
    io,
    net::{IpAddr, Ipv6Addr, SocketAddr},
};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::constants::MAX_PROTOCOL_MESSAGE_LEN;

/// A serialization error.
#[derive(Error, Debug)]
pub enum SerializationError {
    /// An io error that prevented deserialization
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The data to be deserialized was malformed.
    #[error("parse error: {0}")]
    Parse(&'static str),
}

/// Double-SHA256 checksums, used by the message envelope format.
pub mod sha256d {
    use std::fmt;

    use sha2::{Digest, Sha256};

    /// Compute SHA256d (two rounds of SHA256) over `data`.
    pub fn digest(data: &[u8]) -> [u8; 32] {
        Sha256::digest(Sha256::digest(data)).into()
    }

    /// The first four bytes of a SHA256d digest, as carried in message headers.
    #[derive(Copy, Clone, Default, Eq, PartialEq)]
    pub struct Checksum(pub [u8; 4]);

    impl<'a> From<&'a [u8]> for Checksum {
        fn from(bytes: &'a [u8]) -> Self {
            let hash = digest(bytes);
            let mut checksum = [0u8; 4];
            checksum.copy_from_slice(&hash[0..4]);
            Checksum(checksum)
        }
    }

    impl fmt::Debug for Checksum {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.debug_tuple("Checksum")
                .field(&hex::encode(self.0))
                .finish()
        }
    }
}

/// Extends [`io::Read`] with methods for reading Bitcoin wire types.
pub trait ReadBitcoinExt: io::Read {
    /// Reads a `u64` using the Bitcoin `CompactSize` encoding.
    ///
    /// Sizes above the protocol message length limit are rejected, as a
    /// defence against memory-preallocation attacks.
    #[inline]
    fn read_compactsize(&mut self) -> Result<u64, SerializationError> {
        let flag_byte = self.read_u8()?;
        let size = match flag_byte {
            n @ 0x00..=0xfc => n as u64,
            0xfd => self.read_u16::<LittleEndian>()? as u64,
            0xfe => self.read_u32::<LittleEndian>()? as u64,
            0xff => self.read_u64::<LittleEndian>()?,
        };

        if size > MAX_PROTOCOL_MESSAGE_LEN as u64 {
            return Err(SerializationError::Parse(
                "compactsize larger than protocol message limit",
            ));
        }

        Ok(size)
    }

    /// Read an IP address in Bitcoin format: 16 bytes, IPv4 addresses mapped
    /// into IPv6.
    #[inline]
    fn read_ip_addr(&mut self) -> io::Result<IpAddr> {
        let mut octets = [0u8; 16];
        self.read_exact(&mut octets)?;
        let v6_addr = Ipv6Addr::from(octets);

        Ok(canonical_ip_addr(&v6_addr))
    }

    /// Read a Bitcoin-encoded `SocketAddr`: a 16-byte IP followed by a
    /// big-endian port.
    #[inline]
    fn read_socket_addr(&mut self) -> io::Result<SocketAddr> {
        let ip_addr = self.read_ip_addr()?;
        let port = self.read_u16::<BigEndian>()?;
        Ok(SocketAddr::new(ip_addr, port))
    }

    /// Read a `CompactSize`-prefixed UTF-8 string.
    #[inline]
    fn read_string(&mut self) -> Result<String, SerializationError> {
        let len = self.read_compactsize()?;
        let mut bytes = vec![0u8; len as usize];
        self.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| SerializationError::Parse("invalid utf-8 in string"))
    }

    /// Convenience method to read a `[u8; 4]`.
    #[inline]
    fn read_4_bytes(&mut self) -> io::Result<[u8; 4]> {
        let mut bytes = [0; 4];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Convenience method to read a `[u8; 12]`.
    #[inline]
    fn read_12_bytes(&mut self) -> io::Result<[u8; 12]> {
        let mut bytes = [0; 12];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}

/// Mark all types implementing `Read` as implementing the extension.
impl<R: io::Read + ?Sized> ReadBitcoinExt for R {}

/// Extends [`io::Write`] with methods for writing Bitcoin wire types.
pub trait WriteBitcoinExt: io::Write {
    /// Writes a `u64` using the Bitcoin `CompactSize` encoding.
    #[inline]
    fn write_compactsize(&mut self, n: u64) -> io::Result<()> {
        match n {
            0x0000_0000..=0x0000_00fc => self.write_u8(n as u8),
            0x0000_00fd..=0x0000_ffff => {
                self.write_u8(0xfd)?;
                self.write_u16::<LittleEndian>(n as u16)
            }
            0x0001_0000..=0xffff_ffff => {
                self.write_u8(0xfe)?;
                self.write_u32::<LittleEndian>(n as u32)
            }
            _ => {
                self.write_u8(0xff)?;
                self.write_u64::<LittleEndian>(n)
            }
        }
    }

    /// Write an IP address in Bitcoin format, mapping IPv4 addresses into
    /// IPv6.
    #[inline]
    fn write_ip_addr(&mut self, addr: IpAddr) -> io::Result<()> {
        let v6_addr = match addr {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        self.write_all(&v6_addr.octets())
    }

    /// Write a Bitcoin-encoded `SocketAddr`.
    #[inline]
    fn write_socket_addr(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.write_ip_addr(addr.ip())?;
        self.write_u16::<BigEndian>(addr.port())
    }

    /// Write a `CompactSize`-prefixed UTF-8 string.
    #[inline]
    fn write_string(&mut self, string: &str) -> io::Result<()> {
        self.write_compactsize(string.len() as u64)?;
        self.write_all(string.as_bytes())
    }
}

/// Mark all types implementing `Write` as implementing the extension.
impl<W: io::Write + ?Sized> WriteBitcoinExt for W {}

/// Transform a deserialized IPv6 address into a canonical IP address.
///
/// The wire protocol uses IPv6-mapped IPv4 addresses, which are converted
/// back to `Ipv4Addr`s for maximum compatibility with systems that don't
/// understand IPv6.
pub fn canonical_ip_addr(v6_addr: &Ipv6Addr) -> IpAddr {
    use IpAddr::*;

    match v6_addr.to_ipv4_mapped() {
        Some(v4_addr) => V4(v4_addr),
        None => V6(*v6_addr),
    }
}

/// Transform a `SocketAddr` into a canonical `SocketAddr`, converting
/// IPv6-mapped IPv4 addresses, and removing IPv6 scope IDs and flow
/// information.
pub fn canonical_socket_addr(socket_addr: impl Into<SocketAddr>) -> SocketAddr {
    use SocketAddr::*;

    let mut socket_addr = socket_addr.into();
    if let V6(v6_socket_addr) = socket_addr {
        let canonical_ip = canonical_ip_addr(v6_socket_addr.ip());
        // creating a new SocketAddr removes scope IDs and flow information
        socket_addr = SocketAddr::new(canonical_ip, socket_addr.port());
    }

    socket_addr
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn compactsize_round_trip() {
        for n in [0u64, 0x12, 0xfc, 0xfd, 0xaafd, 0xf_ffff] {
            let mut buf = Vec::new();
            buf.write_compactsize(n).unwrap();
            assert_eq!(Cursor::new(&buf).read_compactsize().unwrap(), n);
        }
    }

    #[test]
    fn compactsize_rejects_oversized() {
        let mut buf = Vec::new();
        buf.write_compactsize(u64::MAX).unwrap();
        Cursor::new(&buf).read_compactsize().unwrap_err();
    }

    #[test]
    fn socket_addr_round_trip_v4() {
        let addr: SocketAddr = "203.0.113.6:8333".parse().unwrap();
        let mut buf = Vec::new();
        buf.write_socket_addr(addr).unwrap();
        assert_eq!(buf.len(), 18);
        assert_eq!(Cursor::new(&buf).read_socket_addr().unwrap(), addr);
    }

    #[test]
    fn socket_addr_round_trip_v6() {
        let addr: SocketAddr = "[2001:db8::1]:8333".parse().unwrap();
        let mut buf = Vec::new();
        buf.write_socket_addr(addr).unwrap();
        assert_eq!(Cursor::new(&buf).read_socket_addr().unwrap(), addr);
    }
}
