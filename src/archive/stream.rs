//! Little-endian byte streams for the archive container and descriptor codec.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::util::{Error, Result};

/// Output stream tracking its write position.
pub struct OStream<W: Write> {
    writer: W,
    pos: u64,
}

impl OStream<Vec<u8>> {
    /// Stream into a fresh in-memory buffer.
    pub fn memory() -> Self {
        Self::new(Vec::new())
    }
}

impl<W: Write> OStream<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, pos: 0 }
    }

    /// Get the current write position.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Write bytes and advance position.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.pos += 4;
        Ok(())
    }

    /// Write a u16 value (little-endian).
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.pos += 2;
        Ok(())
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.pos += 1;
        Ok(())
    }

    /// Write a string with a u16 length prefix.
    pub fn write_str16(&mut self, s: &str) -> Result<()> {
        let len = u16::try_from(s.len())
            .map_err(|_| Error::invalid_desc(format!("string too long ({} bytes)", s.len())))?;
        self.write_u16(len)?;
        self.write_bytes(s.as_bytes())
    }

    /// Write a byte blob with a u32 length prefix.
    pub fn write_blob32(&mut self, data: &[u8]) -> Result<()> {
        let len = u32::try_from(data.len())
            .map_err(|_| Error::invalid_desc(format!("blob too large ({} bytes)", data.len())))?;
        self.write_u32(len)?;
        self.write_bytes(data)
    }

    /// Flush and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Bounds-checked reader over an in-memory slice. Running past the end is
/// reported as a corrupt archive.
pub struct IStream<'a> {
    cursor: Cursor<&'a [u8]>,
    what: &'static str,
}

impl<'a> IStream<'a> {
    /// `what` names the structure being read, for error messages.
    pub fn new(data: &'a [u8], what: &'static str) -> Self {
        Self {
            cursor: Cursor::new(data),
            what,
        }
    }

    /// Start reading at `pos`.
    pub fn at(data: &'a [u8], pos: u64, what: &'static str) -> Self {
        let mut stream = Self::new(data, what);
        stream.cursor.set_position(pos);
        stream
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.cursor.position()
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> u64 {
        (self.cursor.get_ref().len() as u64).saturating_sub(self.cursor.position())
    }

    fn eof(&self) -> Error {
        Error::corrupt(format!("{} truncated at byte {}", self.what, self.cursor.position()))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.eof())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.cursor.read_u16::<LittleEndian>().map_err(|_| self.eof())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.cursor.read_u32::<LittleEndian>().map_err(|_| self.eof())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.cursor.read_u64::<LittleEndian>().map_err(|_| self.eof())
    }

    /// Read exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if (len as u64) > self.remaining() {
            return Err(self.eof());
        }
        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf).map_err(|_| self.eof())?;
        Ok(buf)
    }

    /// Read a u16-prefixed UTF-8 string.
    pub fn read_str16(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| Error::corrupt(format!("{}: invalid UTF-8: {}", self.what, e)))
    }

    /// Read a u32-prefixed byte blob.
    pub fn read_blob32(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// Fail if unread bytes remain.
    pub fn expect_end(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(Error::corrupt(format!("{} has {} trailing bytes", self.what, n))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() -> Result<()> {
        let mut out = OStream::memory();
        out.write_u8(7)?;
        out.write_u16(0x1234)?;
        out.write_str16("Cube")?;
        out.write_blob32(&[1, 2, 3])?;
        out.write_u64(u64::MAX)?;
        assert_eq!(out.pos(), 1 + 2 + 6 + 7 + 8);
        let buf = out.finish()?;

        let mut input = IStream::new(&buf, "test");
        assert_eq!(input.read_u8()?, 7);
        assert_eq!(input.read_u16()?, 0x1234);
        assert_eq!(input.read_str16()?, "Cube");
        assert_eq!(input.read_blob32()?, vec![1, 2, 3]);
        assert_eq!(input.read_u64()?, u64::MAX);
        input.expect_end()
    }

    #[test]
    fn test_truncated_read() {
        let buf = [5u8, 0, b'a'];
        let mut input = IStream::new(&buf, "name");
        let err = input.read_str16().unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(msg) if msg.contains("name")));
    }

    #[test]
    fn test_invalid_utf8_is_corrupt() {
        let buf = [2u8, 0, 0xC3, 0x28];
        let err = IStream::new(&buf, "entry name").read_str16().unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(msg) if msg.contains("UTF-8")));
    }
}
