//! Position-tracked little-endian reader and writer
//!
//! Foundation for every codec in this crate. The reader wraps a
//! `Cursor<&[u8]>` and reads through `byteorder`; it checks the remaining
//! length before each read and reports [`FormatError::Truncated`] with the
//! failing offset, so a failed read never moves the cursor.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use glam::{Quat, Vec2, Vec3, Vec4};
use std::io::{self, Cursor, Read};

use crate::error::FormatError;

// ============================================================================
// Reader
// ============================================================================

/// Bounds-checked cursor over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    /// Current read offset from the start of the buffer
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Total buffer length
    #[inline]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// Bytes left after the current position
    #[inline]
    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    #[inline]
    fn data(&self) -> &'a [u8] {
        *self.cursor.get_ref()
    }

    fn truncated(&self, needed: usize) -> FormatError {
        FormatError::Truncated {
            offset: self.position(),
            needed,
            available: self.remaining(),
        }
    }

    /// Fail unless `needed` bytes are available at the current position
    pub fn ensure(&self, needed: usize) -> Result<(), FormatError> {
        if needed > self.remaining() {
            return Err(self.truncated(needed));
        }
        Ok(())
    }

    /// Validate a declared element count before allocating for it
    pub fn ensure_array(&self, count: usize, elem_size: usize) -> Result<(), FormatError> {
        let needed = count
            .checked_mul(elem_size)
            .ok_or_else(|| self.truncated(usize::MAX))?;
        self.ensure(needed)
    }

    /// Run a `byteorder` read of `size` bytes after checking they exist
    fn read_with<T>(
        &mut self,
        size: usize,
        read: impl FnOnce(&mut Cursor<&'a [u8]>) -> io::Result<T>,
    ) -> Result<T, FormatError> {
        self.ensure(size)?;
        let offset = self.position();
        read(&mut self.cursor).map_err(|e| io_error(e, offset, size))
    }

    /// Move to an absolute offset (may equal the buffer length)
    pub fn seek(&mut self, offset: usize) -> Result<(), FormatError> {
        if offset > self.len() {
            return Err(FormatError::Truncated {
                offset,
                needed: 0,
                available: 0,
            });
        }
        self.cursor.set_position(offset as u64);
        Ok(())
    }

    /// Advance by `count` bytes
    pub fn skip(&mut self, count: usize) -> Result<(), FormatError> {
        self.ensure(count)?;
        self.cursor.set_position((self.position() + count) as u64);
        Ok(())
    }

    /// Borrow the next `count` bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], FormatError> {
        let bytes = self.peek_bytes(count)?;
        self.cursor.set_position((self.position() + count) as u64);
        Ok(bytes)
    }

    /// Read a fixed-size byte array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        self.read_with(N, |c| {
            let mut out = [0u8; N];
            c.read_exact(&mut out)?;
            Ok(out)
        })
    }

    /// Consume `expected.len()` bytes and require them to equal `expected`
    pub fn read_magic(&mut self, expected: &[u8], format: &'static str) -> Result<(), FormatError> {
        if self.read_bytes(expected.len())? != expected {
            return Err(FormatError::BadMagic { format });
        }
        Ok(())
    }

    /// Peek at the next `count` bytes without consuming them
    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8], FormatError> {
        self.ensure(count)?;
        let start = self.position();
        Ok(&self.data()[start..start + count])
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        self.read_with(1, |c| c.read_u8())
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, FormatError> {
        self.read_with(2, |c| c.read_u16::<LittleEndian>())
    }

    #[inline]
    pub fn read_i16(&mut self) -> Result<i16, FormatError> {
        self.read_with(2, |c| c.read_i16::<LittleEndian>())
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        self.read_with(4, |c| c.read_u32::<LittleEndian>())
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, FormatError> {
        self.read_with(4, |c| c.read_i32::<LittleEndian>())
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32, FormatError> {
        self.read_with(4, |c| c.read_f32::<LittleEndian>())
    }

    pub fn read_vec2(&mut self) -> Result<Vec2, FormatError> {
        Ok(Vec2::new(self.read_f32()?, self.read_f32()?))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, FormatError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_vec4(&mut self) -> Result<Vec4, FormatError> {
        let mut v = [0.0f32; 4];
        self.read_with(16, |c| c.read_f32_into::<LittleEndian>(&mut v))?;
        Ok(Vec4::from_array(v))
    }

    /// Read a quaternion stored as `[x, y, z, w]`
    pub fn read_quat(&mut self) -> Result<Quat, FormatError> {
        let [x, y, z, w] = self.read_vec4()?.to_array();
        Ok(Quat::from_xyzw(x, y, z, w))
    }

    /// Read `count` consecutive `u16` values
    pub fn read_u16_array(&mut self, count: usize) -> Result<Vec<u16>, FormatError> {
        self.ensure_array(count, 2)?;
        let mut out = vec![0u16; count];
        self.read_with(count * 2, |c| c.read_u16_into::<LittleEndian>(&mut out))?;
        Ok(out)
    }

    /// Read `count` consecutive `u32` values
    pub fn read_u32_array(&mut self, count: usize) -> Result<Vec<u32>, FormatError> {
        self.ensure_array(count, 4)?;
        let mut out = vec![0u32; count];
        self.read_with(count * 4, |c| c.read_u32_into::<LittleEndian>(&mut out))?;
        Ok(out)
    }

    /// Read a zero-padded fixed-width ASCII field
    pub fn read_padded_string(&mut self, len: usize) -> Result<String, FormatError> {
        Ok(read_string(self.read_bytes(len)?))
    }

    /// Read a null-terminated string at an absolute offset, keeping the position
    pub fn read_cstring_at(&self, offset: usize) -> Result<String, FormatError> {
        let data = self.data();
        if offset >= data.len() {
            return Err(FormatError::Truncated {
                offset,
                needed: 1,
                available: 0,
            });
        }
        let tail = &data[offset..];
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(FormatError::Truncated {
                offset,
                needed: tail.len() + 1,
                available: tail.len(),
            })?;
        Ok(read_string(&tail[..end]))
    }
}

/// Slice reads only fail by running out of input
fn io_error(e: io::Error, offset: usize, needed: usize) -> FormatError {
    if e.kind() != io::ErrorKind::UnexpectedEof {
        tracing::trace!("Read at {} failed: {}", offset, e);
    }
    FormatError::Truncated {
        offset,
        needed,
        available: 0,
    }
}

/// Convert a zero-padded byte field to a string (lossy for non-UTF-8 bytes)
fn read_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// ============================================================================
// Writer
// ============================================================================

/// Growable little-endian writer with back-patching for offsets and sizes
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Current write offset (always the end of the buffer)
    #[inline]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Grow by `N` bytes and fill them through `write`
    fn put<const N: usize>(&mut self, write: impl FnOnce(&mut [u8])) {
        let start = self.buf.len();
        self.buf.resize(start + N, 0);
        write(&mut self.buf[start..]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.put::<2>(|b| LittleEndian::write_u16(b, value));
    }

    pub fn write_i16(&mut self, value: i16) {
        self.put::<2>(|b| LittleEndian::write_i16(b, value));
    }

    pub fn write_u32(&mut self, value: u32) {
        self.put::<4>(|b| LittleEndian::write_u32(b, value));
    }

    pub fn write_i32(&mut self, value: i32) {
        self.put::<4>(|b| LittleEndian::write_i32(b, value));
    }

    pub fn write_f32(&mut self, value: f32) {
        self.put::<4>(|b| LittleEndian::write_f32(b, value));
    }

    pub fn write_vec2(&mut self, v: Vec2) {
        self.write_f32(v.x);
        self.write_f32(v.y);
    }

    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    pub fn write_vec4(&mut self, v: Vec4) {
        self.put::<16>(|b| LittleEndian::write_f32_into(&v.to_array(), b));
    }

    /// Write a quaternion as `[x, y, z, w]`
    pub fn write_quat(&mut self, q: Quat) {
        self.write_vec4(Vec4::from(q));
    }

    /// Write `text` into a zero-padded field of `len` bytes.
    ///
    /// The field always keeps room for a terminating zero.
    pub fn write_padded_string(&mut self, text: &str, len: usize) -> Result<(), FormatError> {
        let bytes = text.as_bytes();
        if bytes.len() >= len {
            return Err(FormatError::NameTooLong {
                name: text.to_string(),
                max: len - 1,
            });
        }
        self.write_bytes(bytes);
        self.buf.resize(self.buf.len() + (len - bytes.len()), 0);
        Ok(())
    }

    /// Write `text` followed by a terminating zero
    pub fn write_cstring(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
        self.write_u8(0);
    }

    /// Append zero bytes until the buffer reaches `offset`
    pub fn pad_to(&mut self, offset: usize) {
        if offset > self.buf.len() {
            self.buf.resize(offset, 0);
        }
    }

    /// Overwrite a previously written `u32`
    pub fn patch_u32(&mut self, at: usize, value: u32) {
        LittleEndian::write_u32(&mut self.buf[at..at + 4], value);
    }

    /// Overwrite a previously written `i32`
    pub fn patch_i32(&mut self, at: usize, value: i32) {
        LittleEndian::write_i32(&mut self.buf[at..at + 4], value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_roundtrip() {
        let mut w = BinaryWriter::new();
        w.write_u8(7);
        w.write_u16(0xBEEF);
        w.write_i16(-3);
        w.write_u32(0xDEADBEEF);
        w.write_i32(-100_000);
        w.write_f32(1.5);
        w.write_quat(Quat::from_xyzw(0.0, 0.0, 0.5, 0.5));
        let bytes = w.into_inner();

        let mut r = BinaryReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u16().unwrap(), 0xBEEF);
        assert_eq!(r.read_i16().unwrap(), -3);
        assert_eq!(r.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(r.read_i32().unwrap(), -100_000);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(
            r.read_quat().unwrap(),
            Quat::from_xyzw(0.0, 0.0, 0.5, 0.5)
        );
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_read_past_end_is_truncated() {
        let bytes = [1u8, 2, 3];
        let mut r = BinaryReader::new(&bytes);
        let err = r.read_u32().unwrap_err();
        assert_eq!(
            err,
            FormatError::Truncated {
                offset: 0,
                needed: 4,
                available: 3
            }
        );
        // Position is unchanged after a failed read
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_ensure_array_rejects_huge_counts() {
        let bytes = [0u8; 16];
        let r = BinaryReader::new(&bytes);
        assert!(r.ensure_array(usize::MAX, 4).is_err());
        assert!(r.ensure_array(5, 4).is_err());
        assert!(r.ensure_array(4, 4).is_ok());
    }

    #[test]
    fn test_bulk_reads_are_little_endian() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut r = BinaryReader::new(&bytes);
        assert_eq!(r.read_u16_array(2).unwrap(), vec![0x0201, 0x0403]);
        assert_eq!(r.read_u32_array(1).unwrap(), vec![0x0807_0605]);
        assert!(matches!(
            r.read_u16_array(1),
            Err(FormatError::Truncated {
                offset: 8,
                needed: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_eof_maps_to_truncated() {
        let err = io_error(io::Error::from(io::ErrorKind::UnexpectedEof), 12, 4);
        assert_eq!(
            err,
            FormatError::Truncated {
                offset: 12,
                needed: 4,
                available: 0
            }
        );
    }

    #[test]
    fn test_padded_string() {
        let mut w = BinaryWriter::new();
        w.write_padded_string("Root", 32).unwrap();
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), 32);

        let mut r = BinaryReader::new(&bytes);
        assert_eq!(r.read_padded_string(32).unwrap(), "Root");

        let mut w = BinaryWriter::new();
        let long = "x".repeat(32);
        assert!(matches!(
            w.write_padded_string(&long, 32),
            Err(FormatError::NameTooLong { max: 31, .. })
        ));
    }

    #[test]
    fn test_read_magic() {
        let mut r = BinaryReader::new(b"r3d2sklt");
        assert_eq!(r.read_magic(b"r3d2sklt", "SKL"), Ok(()));
        assert_eq!(r.position(), 8);

        let mut r = BinaryReader::new(b"r3d2anmd");
        assert_eq!(
            r.read_magic(b"r3d2sklt", "SKL"),
            Err(FormatError::BadMagic { format: "SKL" })
        );
        assert!(matches!(
            BinaryReader::new(b"r3d").read_magic(b"r3d2sklt", "SKL"),
            Err(FormatError::Truncated { .. })
        ));
    }

    #[test]
    fn test_cstring_at() {
        let mut w = BinaryWriter::new();
        w.write_u32(0);
        w.write_cstring("Pelvis");
        let bytes = w.into_inner();
        let r = BinaryReader::new(&bytes);
        assert_eq!(r.read_cstring_at(4).unwrap(), "Pelvis");
        assert!(r.read_cstring_at(100).is_err());
    }

    #[test]
    fn test_patch() {
        let mut w = BinaryWriter::new();
        w.write_u32(0);
        w.write_u32(5);
        w.patch_u32(0, 42);
        let bytes = w.into_inner();
        let mut r = BinaryReader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), 42);
        assert_eq!(r.read_u32().unwrap(), 5);
    }
}
