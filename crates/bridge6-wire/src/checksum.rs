use std::net::Ipv6Addr;

use bytes::{BufMut, BytesMut};

/// The IPv6 header fields an upper-layer checksum needs from its parent.
///
/// Passed down explicitly at serialize time instead of keeping a parent
/// back-reference on the payload packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoHeader {
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
}

/// RFC 1071 Internet checksum.
///
/// 16-bit one's-complement sum over big-endian word pairs with the carry
/// folded back in after each addition; an odd trailing byte is treated as
/// the high byte of a zero-padded word. The result is the one's complement
/// of the accumulated sum, masked to 16 bits.
pub fn checksum(buf: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = buf.chunks_exact(2);
    for pair in &mut chunks {
        sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
        if sum > 0xFFFF {
            sum = (sum & 0xFFFF) + 1;
        }
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
        if sum > 0xFFFF {
            sum = (sum & 0xFFFF) + 1;
        }
    }
    !(sum as u16)
}

/// IPv6 pseudo-header checksum per RFC 8200 §8.1.
///
/// Builds the virtual buffer
/// `src(16) | dst(16) | upper-layer length(4 BE) | zero(3) | protocol(1) |
/// pre | checksum placeholder(2, zero) | post`
/// and applies [`checksum`]. `pre` is the upper-layer header up to its
/// checksum field, `post` is everything after it.
pub fn pseudo_header_checksum(
    pre: &[u8],
    post: &[u8],
    parent: &PseudoHeader,
    protocol: u8,
) -> u16 {
    let upper_len = pre.len() + 2 + post.len();
    let mut buf = BytesMut::with_capacity(upper_len + 40);
    buf.put_slice(&parent.source.octets());
    buf.put_slice(&parent.destination.octets());
    buf.put_u32(upper_len as u32);
    buf.put_slice(&[0, 0, 0]);
    buf.put_u8(protocol);
    buf.put_slice(pre);
    buf.put_u16(0);
    buf.put_slice(post);
    checksum(&buf)
}
