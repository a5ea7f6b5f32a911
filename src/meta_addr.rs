//! An address-book entry for a single peer.

use std::{
    io,
    net::{Ipv6Addr, SocketAddr},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::Utc;

use crate::{
    protocol::types::PeerServices,
    serialization::{ReadBitcoinExt, SerializationError, WriteBitcoinExt},
};

/// The wire size of a timestamped address record: a 4-byte last-seen time,
/// 8-byte service flags, 16-byte IP, and 2-byte port.
pub const META_ADDR_SIZE: usize = 4 + 8 + 16 + 2;

/// An address with metadata on its advertised services and last-seen time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MetaAddr {
    /// The peer's address.
    pub addr: SocketAddr,

    /// The services advertised by the peer.
    pub services: PeerServices,

    /// When this peer was last seen, in seconds since the Unix epoch.
    ///
    /// The wire format only carries 32 bits, so that is all we store.
    pub last_seen: u32,
}

impl MetaAddr {
    /// Create a `MetaAddr` seen just now.
    pub fn new(addr: SocketAddr, services: PeerServices) -> MetaAddr {
        MetaAddr {
            addr,
            services,
            last_seen: Utc::now().timestamp() as u32,
        }
    }

    /// The identity of this entry: the 16-byte IPv6(-mapped) form of its IP.
    ///
    /// Two entries with the same IP but different ports or services are the
    /// same peer as far as the address book is concerned.
    pub fn ip_key(&self) -> Ipv6Addr {
        match self.addr.ip() {
            std::net::IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            std::net::IpAddr::V6(v6) => v6,
        }
    }

    /// Write this address in the timestamped 30-byte wire format.
    pub fn write<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.last_seen)?;
        writer.write_u64::<LittleEndian>(self.services.bits())?;
        writer.write_socket_addr(self.addr)
    }

    /// Read an address in the timestamped 30-byte wire format.
    pub fn read<R: io::Read>(mut reader: R) -> Result<MetaAddr, SerializationError> {
        let last_seen = reader.read_u32::<LittleEndian>()?;
        let services = PeerServices::from_bits_truncate(reader.read_u64::<LittleEndian>()?);
        let addr = reader.read_socket_addr()?;

        Ok(MetaAddr {
            addr,
            services,
            last_seen,
        })
    }

    /// Read an address in the pre-31402 untimed format, leaving `last_seen`
    /// zero.
    pub fn read_without_time<R: io::Read>(mut reader: R) -> Result<MetaAddr, SerializationError> {
        let services = PeerServices::from_bits_truncate(reader.read_u64::<LittleEndian>()?);
        let addr = reader.read_socket_addr()?;

        Ok(MetaAddr {
            addr,
            services,
            last_seen: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn wire_round_trip() {
        let entry = MetaAddr {
            addr: "203.0.113.6:8333".parse().unwrap(),
            services: PeerServices::NODE_NETWORK,
            last_seen: 1_231_006_505,
        };

        let mut bytes = Vec::new();
        entry.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), META_ADDR_SIZE);

        let parsed = MetaAddr::read(Cursor::new(&bytes)).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn ip_key_ignores_port_and_services() {
        let a = MetaAddr {
            addr: "203.0.113.6:8333".parse().unwrap(),
            services: PeerServices::NODE_NETWORK,
            last_seen: 0,
        };
        let b = MetaAddr {
            addr: "203.0.113.6:18333".parse().unwrap(),
            services: PeerServices::empty(),
            last_seen: 77,
        };

        assert_eq!(a.ip_key(), b.ip_key());
    }

    #[test]
    fn ip_key_maps_v4_into_v6() {
        let v4 = MetaAddr::new("127.0.0.1:8333".parse().unwrap(), PeerServices::empty());
        let v6 = MetaAddr::new("[::ffff:127.0.0.1]:8333".parse().unwrap(), PeerServices::empty());

        assert_eq!(v4.ip_key(), v6.ip_key());
    }
}
