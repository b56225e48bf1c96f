//! Wire formats for the bridge6 tunnel bridge.
//!
//! This crate is the byte-exact core: a checked bit cursor, the RFC 1071
//! Internet checksum (with the RFC 8200 §8.1 pseudo-header variant), one
//! codec per protocol (IPv6, ICMPv6 with echo sub-messages, TCP, UDP,
//! opaque payload), and the type-tagged tunnel frame envelope spoken over
//! the client pipe.
//!
//! Codecs serialize struct → bytes and deserialize bytes → struct; checksum
//! fields are computed lazily at serialize time when left at zero.

pub mod checksum;
pub mod cursor;
pub mod envelope;
pub mod error;
pub mod packet;

pub use checksum::{checksum, pseudo_header_checksum, PseudoHeader};
pub use cursor::BitCursor;
pub use envelope::TunnelFrame;
pub use error::{Result, WireError};
pub use packet::{
    EchoMessage, Icmpv6Body, Icmpv6Packet, IpProtocol, Ipv6Packet, Packet, TcpSegment,
    UdpDatagram, ICMPV6_ECHO_REPLY, ICMPV6_ECHO_REQUEST,
};
