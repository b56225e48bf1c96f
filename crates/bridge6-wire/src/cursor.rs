use bytes::Bytes;

use crate::error::{Result, WireError};

/// Sequential, bounds-checked reader over a fixed byte region.
///
/// The read position and the declared length are both bit-granular, so
/// packed header fields (the IPv6 version/traffic-class/flow-label triple,
/// the TCP data-offset/flags word) read the same way byte fields do. Bits
/// are consumed MSB-first, matching network header layout.
///
/// Any take past the declared length fails with
/// [`WireError::InsufficientBits`] and leaves the cursor unadvanced, so a
/// failed parse of one message never corrupts the position for the next.
pub struct BitCursor<'a> {
    bytes: &'a [u8],
    /// Read position, in bits from the start of `bytes`.
    offset: usize,
    /// Declared end, in bits from the start of `bytes`.
    length: usize,
}

impl<'a> BitCursor<'a> {
    /// Cursor over an entire slice.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            length: bytes.len() * 8,
        }
    }

    /// Cursor over `byte_len` bytes starting `byte_offset` bytes into the slice.
    pub fn with_range(bytes: &'a [u8], byte_offset: usize, byte_len: usize) -> Self {
        let end = (byte_offset + byte_len).min(bytes.len());
        Self {
            bytes,
            offset: byte_offset * 8,
            length: end * 8,
        }
    }

    fn check(&self, requested: usize) -> Result<()> {
        if self.length < self.offset + requested {
            return Err(WireError::InsufficientBits {
                offset: self.offset,
                length: self.length,
                requested,
            });
        }
        Ok(())
    }

    /// Take a single bit.
    pub fn take_bit(&mut self) -> Result<bool> {
        self.check(1)?;
        let byte = self.bytes[self.offset / 8];
        let bit = (byte >> (7 - self.offset % 8)) & 1;
        self.offset += 1;
        Ok(bit != 0)
    }

    /// Take `n` bits (n ≤ 64) as an unsigned value, MSB-first.
    pub fn take_bits(&mut self, n: usize) -> Result<u64> {
        debug_assert!(n <= 64);
        self.check(n)?;
        let mut value: u64 = 0;
        for i in 0..n {
            let pos = self.offset + i;
            let bit = (self.bytes[pos / 8] >> (7 - pos % 8)) & 1;
            value = (value << 1) | u64::from(bit);
        }
        self.offset += n;
        Ok(value)
    }

    pub fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take_bits(8)? as u8)
    }

    pub fn take_u16(&mut self) -> Result<u16> {
        Ok(self.take_bits(16)? as u16)
    }

    pub fn take_u32(&mut self) -> Result<u32> {
        Ok(self.take_bits(32)? as u32)
    }

    pub fn take_u64(&mut self) -> Result<u64> {
        self.take_bits(64)
    }

    pub fn take_i8(&mut self) -> Result<i8> {
        Ok(self.take_u8()? as i8)
    }

    pub fn take_i16(&mut self) -> Result<i16> {
        Ok(self.take_u16()? as i16)
    }

    pub fn take_i32(&mut self) -> Result<i32> {
        Ok(self.take_u32()? as i32)
    }

    pub fn take_i64(&mut self) -> Result<i64> {
        Ok(self.take_u64()? as i64)
    }

    /// Take `n` bytes as an owned buffer.
    pub fn take_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.check(n * 8)?;
        if self.offset % 8 == 0 {
            let start = self.offset / 8;
            let out = Bytes::copy_from_slice(&self.bytes[start..start + n]);
            self.offset += n * 8;
            return Ok(out);
        }
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.take_bits(8)? as u8);
        }
        Ok(Bytes::from(out))
    }

    /// Bits left before the declared end.
    pub fn remaining_bits(&self) -> usize {
        self.length.saturating_sub(self.offset)
    }

    /// Whole bytes left before the declared end.
    pub fn remaining_bytes(&self) -> usize {
        self.remaining_bits() / 8
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.length
    }

    /// Skip to the end. Used to tolerate unknown message types.
    pub fn discard(&mut self) {
        self.offset = self.length;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_integers_in_network_order() {
        let mut cur = BitCursor::new(&[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0]);
        assert_eq!(cur.take_u16().unwrap(), 0x1234);
        assert_eq!(cur.take_u32().unwrap(), 0x56789ABC);
        assert_eq!(cur.take_u8().unwrap(), 0xDE);
        assert_eq!(cur.take_u8().unwrap(), 0xF0);
        assert!(cur.is_empty());
    }

    #[test]
    fn takes_bits_msb_first() {
        // 0b1010_0000 0b1111_0000
        let mut cur = BitCursor::new(&[0xA0, 0xF0]);
        assert!(cur.take_bit().unwrap());
        assert!(!cur.take_bit().unwrap());
        assert_eq!(cur.take_bits(6).unwrap(), 0b10_0000);
        assert_eq!(cur.take_bits(4).unwrap(), 0b1111);
        assert_eq!(cur.remaining_bits(), 4);
    }

    #[test]
    fn unaligned_byte_reads() {
        let mut cur = BitCursor::new(&[0x0F, 0xF0]);
        assert_eq!(cur.take_bits(4).unwrap(), 0);
        assert_eq!(cur.take_u8().unwrap(), 0xFF);
        assert_eq!(cur.take_bits(4).unwrap(), 0);
        assert!(cur.is_empty());
    }

    #[test]
    fn insufficient_bits_carries_exact_triple() {
        let mut cur = BitCursor::new(&[0xAB]);
        cur.take_bits(3).unwrap();
        let err = cur.take_u8().unwrap_err();
        match err {
            WireError::InsufficientBits {
                offset,
                length,
                requested,
            } => {
                assert_eq!((offset, length, requested), (3, 8, 8));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Failed take must not advance the cursor.
        assert_eq!(cur.remaining_bits(), 5);
        assert_eq!(cur.take_bits(5).unwrap(), 0b0_1011);
    }

    #[test]
    fn is_empty_after_exact_consumption() {
        let mut cur = BitCursor::new(&[0x00, 0x00]);
        assert!(!cur.is_empty());
        cur.take_u16().unwrap();
        assert!(cur.is_empty());
        assert!(matches!(
            cur.take_bit(),
            Err(WireError::InsufficientBits { .. })
        ));
    }

    #[test]
    fn with_range_bounds_the_view() {
        let bytes = [0xAA, 0x11, 0x22, 0xBB];
        let mut cur = BitCursor::with_range(&bytes, 1, 2);
        assert_eq!(cur.take_u16().unwrap(), 0x1122);
        assert!(cur.is_empty());
    }

    #[test]
    fn take_bytes_aligned_and_unaligned() {
        let mut cur = BitCursor::new(&[0x01, 0x02, 0x03]);
        assert_eq!(cur.take_bytes(2).unwrap().as_ref(), &[0x01, 0x02]);

        let mut cur = BitCursor::new(&[0x0F, 0xF0]);
        cur.take_bits(4).unwrap();
        assert_eq!(cur.take_bytes(1).unwrap().as_ref(), &[0xFF]);
    }

    #[test]
    fn discard_skips_to_end() {
        let mut cur = BitCursor::new(&[1, 2, 3, 4]);
        cur.take_u8().unwrap();
        cur.discard();
        assert!(cur.is_empty());
        assert_eq!(cur.remaining_bits(), 0);
    }
}
