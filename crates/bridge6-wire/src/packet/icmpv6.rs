use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::checksum::{pseudo_header_checksum, PseudoHeader};
use crate::cursor::BitCursor;
use crate::error::Result;
use crate::packet::IpProtocol;

pub const ICMPV6_ECHO_REQUEST: u8 = 128;
pub const ICMPV6_ECHO_REPLY: u8 = 129;

/// An ICMPv6 message: type, code, checksum, type-specific body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icmpv6Packet {
    pub icmp_type: u8,
    pub code: u8,
    /// Zero means "compute at serialize time from the IPv6 parent".
    pub checksum: u16,
    pub body: Icmpv6Body,
}

/// The body variants this bridge decodes, selected by the type byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Icmpv6Body {
    EchoRequest(EchoMessage),
    EchoReply(EchoMessage),
    Opaque(Bytes),
}

/// Echo request/reply body: identifier, sequence number, arbitrary data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EchoMessage {
    pub identifier: u16,
    pub sequence: u16,
    pub data: Bytes,
}

impl EchoMessage {
    fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.data.len());
        buf.put_u16(self.identifier);
        buf.put_u16(self.sequence);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    fn deserialize(cur: &mut BitCursor<'_>) -> Result<Self> {
        let identifier = cur.take_u16()?;
        let sequence = cur.take_u16()?;
        let data = cur.take_bytes(cur.remaining_bytes())?;
        Ok(Self {
            identifier,
            sequence,
            data,
        })
    }
}

impl Icmpv6Body {
    fn serialize(&self) -> Bytes {
        match self {
            Icmpv6Body::EchoRequest(echo) | Icmpv6Body::EchoReply(echo) => echo.serialize(),
            Icmpv6Body::Opaque(data) => data.clone(),
        }
    }
}

impl Icmpv6Packet {
    /// Serialize the message. A zero checksum field is computed from the
    /// IPv6 pseudo-header; without a parent the checksum stays zero (logged,
    /// non-fatal).
    pub fn serialize(&mut self, parent: Option<&PseudoHeader>) -> Bytes {
        let body = self.body.serialize();
        let pre = [self.icmp_type, self.code];

        if self.checksum == 0 {
            match parent {
                Some(pseudo) => {
                    self.checksum = pseudo_header_checksum(
                        &pre,
                        &body,
                        pseudo,
                        IpProtocol::Icmpv6.number(),
                    );
                }
                None => warn!("skipping ICMPv6 checksum calculation, no IPv6 parent"),
            }
        }

        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.put_slice(&pre);
        buf.put_u16(self.checksum);
        buf.put_slice(&body);
        buf.freeze()
    }

    /// Deserialize a message, dispatching the body by the type byte.
    /// Types other than echo request/reply carry an opaque body.
    pub fn deserialize(cur: &mut BitCursor<'_>) -> Result<Self> {
        let icmp_type = cur.take_u8()?;
        let code = cur.take_u8()?;
        let checksum = cur.take_u16()?;
        let body = match icmp_type {
            ICMPV6_ECHO_REQUEST => Icmpv6Body::EchoRequest(EchoMessage::deserialize(cur)?),
            ICMPV6_ECHO_REPLY => Icmpv6Body::EchoReply(EchoMessage::deserialize(cur)?),
            _ => Icmpv6Body::Opaque(cur.take_bytes(cur.remaining_bytes())?),
        };
        Ok(Self {
            icmp_type,
            code,
            checksum,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum;

    fn pseudo() -> PseudoHeader {
        PseudoHeader {
            source: "fc00::1".parse().unwrap(),
            destination: "fc00::2".parse().unwrap(),
        }
    }

    #[test]
    fn echo_request_roundtrip() {
        let mut packet = Icmpv6Packet {
            icmp_type: ICMPV6_ECHO_REQUEST,
            code: 0,
            checksum: 0,
            body: Icmpv6Body::EchoRequest(EchoMessage {
                identifier: 0x1234,
                sequence: 7,
                data: Bytes::from_static(b"abcdefgh"),
            }),
        };

        let parent = pseudo();
        let bytes = packet.serialize(Some(&parent));
        let mut cur = BitCursor::new(&bytes);
        let parsed = Icmpv6Packet::deserialize(&mut cur).unwrap();

        assert_eq!(parsed.icmp_type, ICMPV6_ECHO_REQUEST);
        assert_eq!(parsed.checksum, packet.checksum);
        assert_eq!(
            parsed.body,
            Icmpv6Body::EchoRequest(EchoMessage {
                identifier: 0x1234,
                sequence: 7,
                data: Bytes::from_static(b"abcdefgh"),
            })
        );
    }

    #[test]
    fn computed_checksum_self_verifies() {
        let mut packet = Icmpv6Packet {
            icmp_type: ICMPV6_ECHO_REPLY,
            code: 0,
            checksum: 0,
            body: Icmpv6Body::EchoReply(EchoMessage {
                identifier: 1,
                sequence: 1,
                data: Bytes::from_static(b"ping"),
            }),
        };
        let parent = pseudo();
        let segment = packet.serialize(Some(&parent));

        // Re-sum the pseudo-header plus the segment with its checksum in
        // place; a valid checksum makes the total fold to zero.
        let mut buf = Vec::new();
        buf.extend_from_slice(&parent.source.octets());
        buf.extend_from_slice(&parent.destination.octets());
        buf.extend_from_slice(&(segment.len() as u32).to_be_bytes());
        buf.extend_from_slice(&[0, 0, 0, 58]);
        buf.extend_from_slice(&segment);
        assert_eq!(checksum(&buf), 0);
    }

    #[test]
    fn missing_parent_leaves_checksum_zero() {
        let mut packet = Icmpv6Packet {
            icmp_type: ICMPV6_ECHO_REQUEST,
            code: 0,
            checksum: 0,
            body: Icmpv6Body::Opaque(Bytes::new()),
        };
        let bytes = packet.serialize(None);
        assert_eq!(&bytes[2..4], &[0, 0]);
        assert_eq!(packet.checksum, 0);
    }

    #[test]
    fn nonzero_checksum_is_not_recomputed() {
        let mut packet = Icmpv6Packet {
            icmp_type: ICMPV6_ECHO_REQUEST,
            code: 0,
            checksum: 0xBEEF,
            body: Icmpv6Body::Opaque(Bytes::new()),
        };
        let bytes = packet.serialize(Some(&pseudo()));
        assert_eq!(&bytes[2..4], &[0xBE, 0xEF]);
    }

    #[test]
    fn unknown_type_decodes_opaque_body() {
        let raw = [135u8, 0, 0x12, 0x34, 0xAA, 0xBB]; // neighbor solicitation
        let mut cur = BitCursor::new(&raw);
        let parsed = Icmpv6Packet::deserialize(&mut cur).unwrap();
        assert_eq!(parsed.icmp_type, 135);
        assert_eq!(parsed.checksum, 0x1234);
        assert_eq!(
            parsed.body,
            Icmpv6Body::Opaque(Bytes::from_static(&[0xAA, 0xBB]))
        );
    }
}
