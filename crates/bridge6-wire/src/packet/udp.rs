use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::checksum::{pseudo_header_checksum, PseudoHeader};
use crate::cursor::BitCursor;
use crate::error::{Result, WireError};
use crate::packet::{IpProtocol, Packet};

const UDP_HEADER_LEN: usize = 8;

/// A UDP datagram.
///
/// The length field is always recomputed as 8 + payload size at serialize
/// time, so it is not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub source_port: u16,
    pub destination_port: u16,
    /// Zero means "compute at serialize time from the IPv6 parent".
    pub checksum: u16,
    pub payload: Box<Packet>,
}

impl Default for UdpDatagram {
    fn default() -> Self {
        Self {
            source_port: 0,
            destination_port: 0,
            checksum: 0,
            payload: Box::new(Packet::Opaque(Bytes::new())),
        }
    }
}

impl UdpDatagram {
    /// Serialize the datagram. A zero checksum is computed from the IPv6
    /// pseudo-header; without a parent it stays zero (logged, non-fatal).
    pub fn serialize(&mut self, parent: Option<&PseudoHeader>) -> Result<Bytes> {
        // UDP carries no addresses, so nothing below it can use a
        // pseudo-header; serialize the payload without one.
        let payload_data = self.payload.serialize(None)?;
        let length = UDP_HEADER_LEN + payload_data.len();
        if length > usize::from(u16::MAX) {
            return Err(WireError::OversizedPayload {
                len: payload_data.len(),
                max: usize::from(u16::MAX) - UDP_HEADER_LEN,
            });
        }

        let mut pre = BytesMut::with_capacity(6);
        pre.put_u16(self.source_port);
        pre.put_u16(self.destination_port);
        pre.put_u16(length as u16);

        if self.checksum == 0 {
            match parent {
                Some(pseudo) => {
                    self.checksum = pseudo_header_checksum(
                        &pre,
                        &payload_data,
                        pseudo,
                        IpProtocol::Udp.number(),
                    );
                }
                None => warn!("skipping UDP checksum calculation, no IPv6 parent"),
            }
        }

        let mut buf = BytesMut::with_capacity(length);
        buf.put_slice(&pre);
        buf.put_u16(self.checksum);
        buf.put_slice(&payload_data);
        Ok(buf.freeze())
    }

    /// Deserialize a datagram. The declared length is not trusted; the
    /// payload is whatever bytes remain after the header.
    pub fn deserialize(cur: &mut BitCursor<'_>) -> Result<Self> {
        let source_port = cur.take_u16()?;
        let destination_port = cur.take_u16()?;
        let _length = cur.take_u16()?;
        let checksum = cur.take_u16()?;
        let payload = cur.take_bytes(cur.remaining_bytes())?;
        Ok(Self {
            source_port,
            destination_port,
            checksum,
            payload: Box::new(Packet::Opaque(payload)),
        })
    }
}
