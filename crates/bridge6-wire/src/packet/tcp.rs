use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::checksum::{pseudo_header_checksum, PseudoHeader};
use crate::cursor::BitCursor;
use crate::error::{Result, WireError};
use crate::packet::IpProtocol;

const MIN_DATA_OFFSET: u8 = 5;
const FLAGS_MASK: u16 = 0x01FF;

/// A TCP segment header plus opaque payload.
///
/// This codec only parses and builds headers; there is no connection state
/// machine behind it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcpSegment {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgment: u32,
    /// Header length in 32-bit words; anything below the 5-word minimum
    /// (including the zero default) serializes as the minimum.
    pub data_offset: u8,
    /// 9 flag bits (NS..FIN).
    pub flags: u16,
    pub window: u16,
    /// Zero means "compute at serialize time from the IPv6 parent".
    pub checksum: u16,
    pub urgent_pointer: u16,
    /// Options, padded with zeros to the data-offset boundary on serialize.
    pub options: Bytes,
    pub payload: Bytes,
}

impl TcpSegment {
    /// Serialize the segment. A zero checksum is computed over the IPv6
    /// pseudo-header and the full segment (RFC 8200 §8.1); without a parent
    /// it stays zero (logged, non-fatal).
    pub fn serialize(&mut self, parent: Option<&PseudoHeader>) -> Bytes {
        if self.data_offset < MIN_DATA_OFFSET {
            self.data_offset = MIN_DATA_OFFSET;
        }
        let header_len = usize::from(self.data_offset) * 4;

        // Everything before the checksum field.
        let mut pre = BytesMut::with_capacity(16);
        pre.put_u16(self.source_port);
        pre.put_u16(self.destination_port);
        pre.put_u32(self.sequence);
        pre.put_u32(self.acknowledgment);
        pre.put_u16((u16::from(self.data_offset) << 12) | (self.flags & FLAGS_MASK));
        pre.put_u16(self.window);

        // Everything after it: urgent pointer, padded options, payload.
        let mut post = BytesMut::with_capacity(header_len - 16 + self.payload.len());
        post.put_u16(self.urgent_pointer);
        if self.data_offset > MIN_DATA_OFFSET {
            let option_space = header_len - 20;
            post.put_slice(&self.options[..self.options.len().min(option_space)]);
            for _ in self.options.len()..option_space {
                post.put_u8(0);
            }
        }
        post.put_slice(&self.payload);

        if self.checksum == 0 {
            match parent {
                Some(pseudo) => {
                    self.checksum =
                        pseudo_header_checksum(&pre, &post, pseudo, IpProtocol::Tcp.number());
                }
                None => warn!("skipping TCP checksum calculation, no IPv6 parent"),
            }
        }

        let mut buf = BytesMut::with_capacity(header_len + self.payload.len());
        buf.put_slice(&pre);
        buf.put_u16(self.checksum);
        buf.put_slice(&post);
        buf.freeze()
    }

    /// Deserialize a segment header and its opaque payload.
    pub fn deserialize(cur: &mut BitCursor<'_>) -> Result<Self> {
        let source_port = cur.take_u16()?;
        let destination_port = cur.take_u16()?;
        let sequence = cur.take_u32()?;
        let acknowledgment = cur.take_u32()?;
        let data_offset = cur.take_bits(4)? as u8;
        if data_offset < MIN_DATA_OFFSET {
            return Err(WireError::InvalidHeaderLength { words: data_offset });
        }
        let flags = cur.take_bits(12)? as u16 & FLAGS_MASK;
        let window = cur.take_u16()?;
        let checksum = cur.take_u16()?;
        let urgent_pointer = cur.take_u16()?;

        let declared = (usize::from(data_offset) * 4).saturating_sub(20);
        let options = cur.take_bytes(declared.min(cur.remaining_bytes()))?;
        let payload = cur.take_bytes(cur.remaining_bytes())?;

        Ok(Self {
            source_port,
            destination_port,
            sequence,
            acknowledgment,
            data_offset,
            flags,
            window,
            checksum,
            urgent_pointer,
            options,
            payload,
        })
    }
}
