//! Bounds-checked big-endian packing over fixed buffers.
//!
//! The two halves have deliberately different failure contracts:
//!
//! - [`Packer`] writes into a buffer that the library sized itself. Running out of
//!   room means the buffer was sized wrong, so every `pack_*` call panics instead
//!   of returning an error.
//! - [`Unpacker`] reads network input. Running out of bytes is expected for
//!   truncated or malformed datagrams, so every `unpack_*` call returns a
//!   [`ReadError`] and leaves the cursor where it was.
use bytes::{Buf, BufMut};

use crate::error::ReadError;

/// Writes big-endian fields into a fixed buffer.
#[derive(Debug)]
pub struct Packer<'a> {
    buf: &'a mut [u8],
    cursor: usize,
}

impl<'a> Packer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Packer<'a> {
        Packer { buf, cursor: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    pub fn is_full(&self) -> bool {
        self.cursor == self.buf.len()
    }

    fn reserve(&mut self, len: usize) -> &mut [u8] {
        assert!(
            len <= self.remaining(),
            "Packer overflow: {} bytes requested at offset {}, capacity is {}",
            len,
            self.cursor,
            self.buf.len()
        );
        let start = self.cursor;
        self.cursor += len;
        &mut self.buf[start..self.cursor]
    }

    pub fn pack_u8(&mut self, value: u8) {
        let mut dst = self.reserve(1);
        dst.put_u8(value);
    }

    pub fn pack_u16(&mut self, value: u16) {
        let mut dst = self.reserve(2);
        dst.put_u16(value);
    }

    pub fn pack_u32(&mut self, value: u32) {
        let mut dst = self.reserve(4);
        dst.put_u32(value);
    }

    pub fn pack_u64(&mut self, value: u64) {
        let mut dst = self.reserve(8);
        dst.put_u64(value);
    }

    pub fn pack_i32(&mut self, value: i32) {
        let mut dst = self.reserve(4);
        dst.put_i32(value);
    }

    pub fn pack_f64(&mut self, value: f64) {
        let mut dst = self.reserve(8);
        dst.put_f64(value);
    }

    /// Writes `value` followed by a NUL byte.
    /// Anything after an embedded NUL would be unreadable and is not written.
    pub fn pack_str(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        let mut dst = self.reserve(end + 1);
        dst.put_slice(&bytes[..end]);
        dst.put_u8(0);
    }
}

/// Reads big-endian fields from a received payload.
#[derive(Debug, Clone)]
pub struct Unpacker<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(buf: &'a [u8]) -> Unpacker<'a> {
        Unpacker {
            buf,
            len: buf.len(),
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.len - self.buf.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Whether the cursor has reached the end of the payload.
    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn require(&self, needed: usize) -> Result<(), ReadError> {
        if self.buf.remaining() < needed {
            Err(ReadError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            })
        } else {
            Ok(())
        }
    }

    pub fn unpack_u8(&mut self) -> Result<u8, ReadError> {
        self.require(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn unpack_u16(&mut self) -> Result<u16, ReadError> {
        self.require(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn unpack_u32(&mut self) -> Result<u32, ReadError> {
        self.require(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn unpack_u64(&mut self) -> Result<u64, ReadError> {
        self.require(8)?;
        Ok(self.buf.get_u64())
    }

    pub fn unpack_i32(&mut self) -> Result<i32, ReadError> {
        self.require(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn unpack_f64(&mut self) -> Result<f64, ReadError> {
        self.require(8)?;
        Ok(self.buf.get_f64())
    }

    /// Reads a NUL-terminated string into an owned `String`.
    pub fn unpack_string(&mut self) -> Result<String, ReadError> {
        let end = self
            .buf
            .iter()
            .position(|b| *b == 0)
            .ok_or(ReadError::UnterminatedString)?;
        let value = str::from_utf8(&self.buf[..end])?.to_owned();
        self.buf.advance(end + 1);
        Ok(value)
    }
}

#[cfg(test)]
mod test {
    use super::{Packer, Unpacker};
    use crate::error::ReadError;

    #[test]
    fn integers_are_big_endian() {
        let mut buf = [0u8; 15];
        let mut packer = Packer::new(&mut buf);
        packer.pack_u8(0x01);
        packer.pack_u16(0x0203);
        packer.pack_u32(0x0405_0607);
        packer.pack_u64(0x0809_0a0b_0c0d_0e0f);
        assert!(packer.is_full());
        assert_eq!(
            buf,
            [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]
        );
    }

    #[test]
    fn round_trip_extremes() {
        let mut buf = [0u8; 64];
        let mut packer = Packer::new(&mut buf);
        packer.pack_u8(u8::MAX);
        packer.pack_u16(u16::MAX);
        packer.pack_u32(0);
        packer.pack_u64(u64::MAX);
        packer.pack_i32(i32::MIN);
        packer.pack_f64(-1.5e-9);
        packer.pack_str("gate_width");
        packer.pack_str("");
        let written = packer.position();

        let mut unpacker = Unpacker::new(&buf[..written]);
        assert_eq!(unpacker.unpack_u8(), Ok(u8::MAX));
        assert_eq!(unpacker.unpack_u16(), Ok(u16::MAX));
        assert_eq!(unpacker.unpack_u32(), Ok(0));
        assert_eq!(unpacker.unpack_u64(), Ok(u64::MAX));
        assert_eq!(unpacker.unpack_i32(), Ok(i32::MIN));
        assert_eq!(unpacker.unpack_f64(), Ok(-1.5e-9));
        assert_eq!(unpacker.unpack_string().as_deref(), Ok("gate_width"));
        assert_eq!(unpacker.unpack_string().as_deref(), Ok(""));
        assert!(unpacker.is_empty());
    }

    #[test]
    fn embedded_nul_ends_string() {
        let mut buf = [0u8; 8];
        let mut packer = Packer::new(&mut buf);
        packer.pack_str("ab\0cd");
        assert_eq!(packer.position(), 3);
        let mut unpacker = Unpacker::new(&buf[..3]);
        assert_eq!(unpacker.unpack_string().as_deref(), Ok("ab"));
    }

    #[test]
    #[should_panic(expected = "Packer overflow")]
    fn packing_past_capacity_panics() {
        let mut buf = [0u8; 3];
        let mut packer = Packer::new(&mut buf);
        packer.pack_u16(1);
        packer.pack_u16(2);
    }

    #[test]
    fn failed_unpack_leaves_cursor() {
        let data = [0x12, 0x34, 0x56];
        let mut unpacker = Unpacker::new(&data);
        assert_eq!(
            unpacker.unpack_u32(),
            Err(ReadError::Truncated {
                needed: 4,
                remaining: 3
            })
        );
        assert_eq!(unpacker.position(), 0);
        assert_eq!(unpacker.unpack_u16(), Ok(0x1234));
        assert_eq!(unpacker.unpack_u8(), Ok(0x56));
        assert!(unpacker.unpack_u8().is_err());
        assert!(unpacker.is_empty());
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let data = b"crate";
        let mut unpacker = Unpacker::new(data);
        assert_eq!(
            unpacker.unpack_string(),
            Err(ReadError::UnterminatedString)
        );
        assert_eq!(unpacker.remaining(), 5);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let data = [0xff, 0xfe, 0x00];
        let mut unpacker = Unpacker::new(&data);
        assert!(matches!(
            unpacker.unpack_string(),
            Err(ReadError::InvalidUtf8(_))
        ));
        assert_eq!(unpacker.position(), 0);
    }
}
