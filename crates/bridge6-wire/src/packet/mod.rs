//! Protocol packet structures and their codecs.
//!
//! Packets nest: an [`Ipv6Packet`] owns its upper-layer payload, which owns
//! its own payload, down to an opaque byte run. Each discriminant space on
//! the wire (next-header codes, ICMPv6 type codes) maps to a closed sum
//! type with an explicit opaque variant for unrecognized codes, so unknown
//! traffic decodes instead of erroring.
//!
//! Serialization is depth-first, parent-first: header bytes are emitted
//! before payload bytes, and the IPv6 layer hands its address pair down as
//! a [`PseudoHeader`](crate::checksum::PseudoHeader) so nested checksums
//! can be computed without a parent back-reference.

mod icmpv6;
mod ipv6;
mod tcp;
mod udp;

pub use icmpv6::{EchoMessage, Icmpv6Body, Icmpv6Packet, ICMPV6_ECHO_REPLY, ICMPV6_ECHO_REQUEST};
pub use ipv6::{Ipv6Packet, IPV6_HEADER_LEN};
pub use tcp::TcpSegment;
pub use udp::UdpDatagram;

use bytes::Bytes;

use crate::checksum::PseudoHeader;
use crate::cursor::BitCursor;
use crate::error::Result;

/// IPv6 next-header protocol discriminant.
///
/// Closed over the codes this bridge decodes; everything else lands in
/// `Other` and its payload is treated as opaque data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpProtocol {
    Tcp,
    Udp,
    Icmpv6,
    NoNextHeader,
    Other(u8),
}

impl IpProtocol {
    /// The wire protocol number.
    pub const fn number(self) -> u8 {
        match self {
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
            IpProtocol::Icmpv6 => 58,
            IpProtocol::NoNextHeader => 59,
            IpProtocol::Other(n) => n,
        }
    }

    pub const fn from_number(n: u8) -> Self {
        match n {
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            58 => IpProtocol::Icmpv6,
            59 => IpProtocol::NoNextHeader,
            other => IpProtocol::Other(other),
        }
    }
}

/// A node in the packet nesting chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Ipv6(Ipv6Packet),
    Icmpv6(Icmpv6Packet),
    Tcp(TcpSegment),
    Udp(UdpDatagram),
    /// Raw bytes: unrecognized payloads and leaf data.
    Opaque(Bytes),
}

impl Packet {
    /// Serialize this packet, computing zeroed checksum fields from
    /// `parent` where one is available.
    pub fn serialize(&mut self, parent: Option<&PseudoHeader>) -> Result<Bytes> {
        match self {
            Packet::Ipv6(p) => p.serialize(),
            Packet::Icmpv6(p) => Ok(p.serialize(parent)),
            Packet::Tcp(p) => Ok(p.serialize(parent)),
            Packet::Udp(p) => p.serialize(parent),
            Packet::Opaque(data) => Ok(data.clone()),
        }
    }

    /// Deserialize an upper-layer payload selected by next-header code.
    ///
    /// Unknown codes are not an error: the remainder decodes as opaque.
    pub fn deserialize_payload(cur: &mut BitCursor<'_>, proto: IpProtocol) -> Result<Packet> {
        match proto {
            IpProtocol::Icmpv6 => Ok(Packet::Icmpv6(Icmpv6Packet::deserialize(cur)?)),
            IpProtocol::Tcp => Ok(Packet::Tcp(TcpSegment::deserialize(cur)?)),
            IpProtocol::Udp => Ok(Packet::Udp(UdpDatagram::deserialize(cur)?)),
            _ => Ok(Packet::Opaque(cur.take_bytes(cur.remaining_bytes())?)),
        }
    }

    /// The next-header value implied by this packet's concrete type, if any.
    ///
    /// Opaque data implies "no next header"; a nested IPv6 packet has no
    /// mapping here (tunneling in IPv6 is out of scope).
    pub fn implied_protocol(&self) -> Option<IpProtocol> {
        match self {
            Packet::Icmpv6(_) => Some(IpProtocol::Icmpv6),
            Packet::Tcp(_) => Some(IpProtocol::Tcp),
            Packet::Udp(_) => Some(IpProtocol::Udp),
            Packet::Opaque(_) => Some(IpProtocol::NoNextHeader),
            Packet::Ipv6(_) => None,
        }
    }

    /// Zero checksum fields recursively so the next serialize recomputes them.
    pub fn reset_checksums(&mut self) {
        match self {
            Packet::Ipv6(p) => p.payload.reset_checksums(),
            Packet::Icmpv6(p) => p.checksum = 0,
            Packet::Tcp(p) => p.checksum = 0,
            Packet::Udp(p) => {
                p.checksum = 0;
                p.payload.reset_checksums();
            }
            Packet::Opaque(_) => {}
        }
    }
}
