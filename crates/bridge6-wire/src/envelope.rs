use std::net::Ipv6Addr;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, error, warn};

use crate::cursor::BitCursor;

/// Tunnel envelope message types (byte 0 of every sub-message).
pub const TYPE_DATA: u8 = 0;
pub const TYPE_ADD_IPV6_ADDRESS: u8 = 1;
pub const TYPE_SET_MTU: u8 = 2;

const IPV6_ADDR_LEN: usize = 16;

/// One sub-message of the tunnel framing protocol.
///
/// Wire format:
/// ```text
/// byte 0: message type (0=DATA, 1=ADD_IPV6_ADDRESS, 2=SET_MTU)
/// type 0: [flags:2][ethertype:2][raw network-layer frame: remaining bytes]
/// type 1: [ipv6 address: 16 bytes]
/// type 2: [mtu: 4 bytes, big-endian unsigned]
/// other:  discard rest of current read buffer
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelFrame {
    Data {
        flags: u16,
        ethertype: u16,
        frame: Bytes,
    },
    AddAddress(Ipv6Addr),
    SetMtu(u32),
}

/// Decode a single sub-message from the cursor.
///
/// Malformed sub-messages (truncated address or MTU) and unknown type bytes
/// are tolerated: they are logged, the remainder of the buffer is
/// discarded, and `None` is returned. Only that sub-message is lost;
/// [`decode_all`] resumes with whatever the cursor still holds.
pub fn decode(cur: &mut BitCursor<'_>) -> Option<TunnelFrame> {
    let msg_type = match cur.take_u8() {
        Ok(t) => t,
        Err(_) => return None,
    };

    match msg_type {
        TYPE_DATA => {
            let flags = match cur.take_u16() {
                Ok(v) => v,
                Err(err) => {
                    error!(%err, "truncated data frame header");
                    cur.discard();
                    return None;
                }
            };
            let ethertype = match cur.take_u16() {
                Ok(v) => v,
                Err(err) => {
                    error!(%err, "truncated data frame header");
                    cur.discard();
                    return None;
                }
            };
            // The data form has no length field; it consumes the rest of
            // the buffer, so config messages must precede it in a packed read.
            let frame = cur
                .take_bytes(cur.remaining_bytes())
                .unwrap_or_else(|_| Bytes::new());
            debug!(flags, ethertype, len = frame.len(), "tunnel data frame");
            Some(TunnelFrame::Data {
                flags,
                ethertype,
                frame,
            })
        }
        TYPE_ADD_IPV6_ADDRESS => match cur.take_bytes(IPV6_ADDR_LEN) {
            Ok(raw) => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&raw);
                let address = Ipv6Addr::from(octets);
                debug!(%address, "tunnel add-address");
                Some(TunnelFrame::AddAddress(address))
            }
            Err(_) => {
                error!("invalid size for an IPv6 address, dropping sub-message");
                cur.discard();
                None
            }
        },
        TYPE_SET_MTU => match cur.take_u32() {
            Ok(mtu) => {
                debug!(mtu, "tunnel set-mtu");
                Some(TunnelFrame::SetMtu(mtu))
            }
            Err(_) => {
                error!("too short for a valid MTU, dropping sub-message");
                cur.discard();
                None
            }
        },
        other => {
            warn!(msg_type = other, "unknown tunnel message type, discarding buffer");
            cur.discard();
            None
        }
    }
}

/// Decode every sub-message packed into one read buffer.
pub fn decode_all(cur: &mut BitCursor<'_>) -> Vec<TunnelFrame> {
    let mut frames = Vec::new();
    while !cur.is_empty() {
        if let Some(frame) = decode(cur) {
            frames.push(frame);
        }
    }
    frames
}

/// Encode a sub-message into the wire format.
pub fn encode(frame: &TunnelFrame, dst: &mut BytesMut) {
    match frame {
        TunnelFrame::Data {
            flags,
            ethertype,
            frame,
        } => {
            dst.reserve(5 + frame.len());
            dst.put_u8(TYPE_DATA);
            dst.put_u16(*flags);
            dst.put_u16(*ethertype);
            dst.put_slice(frame);
        }
        TunnelFrame::AddAddress(address) => {
            dst.reserve(1 + IPV6_ADDR_LEN);
            dst.put_u8(TYPE_ADD_IPV6_ADDRESS);
            dst.put_slice(&address.octets());
        }
        TunnelFrame::SetMtu(mtu) => {
            dst.reserve(5);
            dst.put_u8(TYPE_SET_MTU);
            dst.put_u32(*mtu);
        }
    }
}
