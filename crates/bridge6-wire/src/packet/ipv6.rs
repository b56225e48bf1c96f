use std::net::Ipv6Addr;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::checksum::PseudoHeader;
use crate::cursor::BitCursor;
use crate::error::{Result, WireError};
use crate::packet::{IpProtocol, Packet};

/// Fixed IPv6 header length (RFC 8200).
pub const IPV6_HEADER_LEN: usize = 40;

const VERSION: u8 = 6;

/// An IPv6 packet.
///
/// The version field is an invariant (always 6) and the payload length is
/// derived from the serialized payload, so neither is stored. `next_header`
/// left as `None` is inferred from the payload's concrete type at serialize
/// time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Packet {
    pub traffic_class: u8,
    /// 20-bit flow label; upper bits must be zero.
    pub flow_label: u32,
    pub next_header: Option<IpProtocol>,
    pub hop_limit: u8,
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
    pub payload: Box<Packet>,
}

impl Default for Ipv6Packet {
    fn default() -> Self {
        Self {
            traffic_class: 0,
            flow_label: 0,
            next_header: None,
            hop_limit: 0,
            source: Ipv6Addr::UNSPECIFIED,
            destination: Ipv6Addr::UNSPECIFIED,
            payload: Box::new(Packet::Opaque(Bytes::new())),
        }
    }
}

impl Ipv6Packet {
    /// Serialize header and payload, RFC 8200 layout.
    ///
    /// The payload serializes first (with this packet's address pair as the
    /// pseudo-header), so the payload length field always reflects the real
    /// serialized size rather than anything stored at construction.
    pub fn serialize(&mut self) -> Result<Bytes> {
        let pseudo = PseudoHeader {
            source: self.source,
            destination: self.destination,
        };
        let payload_data = self.payload.serialize(Some(&pseudo))?;
        if payload_data.len() > usize::from(u16::MAX) {
            return Err(WireError::OversizedPayload {
                len: payload_data.len(),
                max: usize::from(u16::MAX),
            });
        }

        let next_header = match self.next_header {
            Some(proto) => proto,
            None => {
                let inferred = self
                    .payload
                    .implied_protocol()
                    .ok_or(WireError::UnresolvedNextHeader)?;
                if inferred != IpProtocol::NoNextHeader {
                    warn!(?inferred, "setting previously unset next-header from payload type");
                }
                self.next_header = Some(inferred);
                inferred
            }
        };

        let mut buf = BytesMut::with_capacity(IPV6_HEADER_LEN + payload_data.len());
        buf.put_u8((VERSION << 4) | (self.traffic_class >> 4));
        buf.put_u8(((self.traffic_class & 0x0F) << 4) | ((self.flow_label >> 16) as u8 & 0x0F));
        buf.put_u16(self.flow_label as u16);
        buf.put_u16(payload_data.len() as u16);
        buf.put_u8(next_header.number());
        buf.put_u8(self.hop_limit);
        buf.put_slice(&self.source.octets());
        buf.put_slice(&self.destination.octets());
        buf.put_slice(&payload_data);
        Ok(buf.freeze())
    }

    /// Deserialize a packet, dispatching the payload by next-header code.
    ///
    /// The declared payload length is clamped to the bytes actually present
    /// so a truncated capture still parses as far as it goes.
    pub fn deserialize(cur: &mut BitCursor<'_>) -> Result<Self> {
        let version = cur.take_bits(4)? as u8;
        if version != VERSION {
            return Err(WireError::InvalidVersion { version });
        }
        let traffic_class = cur.take_bits(8)? as u8;
        let flow_label = cur.take_bits(20)? as u32;
        let payload_length = cur.take_u16()? as usize;
        let next_header = IpProtocol::from_number(cur.take_u8()?);
        let hop_limit = cur.take_u8()?;

        let source = take_address(cur)?;
        let destination = take_address(cur)?;

        let take = payload_length.min(cur.remaining_bytes());
        let payload_data = cur.take_bytes(take)?;
        let mut payload_cur = BitCursor::new(&payload_data);
        let payload = Packet::deserialize_payload(&mut payload_cur, next_header)?;

        Ok(Self {
            traffic_class,
            flow_label,
            next_header: Some(next_header),
            hop_limit,
            source,
            destination,
            payload: Box::new(payload),
        })
    }
}

fn take_address(cur: &mut BitCursor<'_>) -> Result<Ipv6Addr> {
    let raw = cur.take_bytes(16)?;
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&raw);
    Ok(Ipv6Addr::from(octets))
}
