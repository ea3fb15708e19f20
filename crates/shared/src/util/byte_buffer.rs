// ByteBuffer - Binary serialization/deserialization
// Little-endian reader/writer used for navigation files.

use byteorder::{ByteOrder, LittleEndian};

/// A byte buffer for reading/writing little-endian binary data.
/// Writes append at the end, reads advance an independent read cursor.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    data: Vec<u8>,
    read_pos: usize,
}

impl Default for ByteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn past_end() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "ByteBuffer read past end",
    )
}

impl ByteBuffer {
    /// Create a new empty ByteBuffer
    pub fn new() -> Self {
        ByteBuffer {
            data: Vec::new(),
            read_pos: 0,
        }
    }

    /// Create with a pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        ByteBuffer {
            data: Vec::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Wrap existing bytes for reading
    pub fn from_vec(data: Vec<u8>) -> Self {
        ByteBuffer { data, read_pos: 0 }
    }

    /// Get the current size of the buffer
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the current read position
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Number of bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    /// Get the raw contents
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer and return its bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }

    // ---- Write operations (append) ----

    /// Append raw bytes
    pub fn append(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// Write a u8
    pub fn write_u8(&mut self, val: u8) {
        self.data.push(val);
    }

    /// Write a u16 (little-endian)
    pub fn write_u16(&mut self, val: u16) {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, val);
        self.data.extend_from_slice(&buf);
    }

    /// Write a u32 (little-endian)
    pub fn write_u32(&mut self, val: u32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, val);
        self.data.extend_from_slice(&buf);
    }

    /// Write an i32 (little-endian)
    pub fn write_i32(&mut self, val: i32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_i32(&mut buf, val);
        self.data.extend_from_slice(&buf);
    }

    /// Write an f32 (little-endian)
    pub fn write_f32(&mut self, val: f32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_f32(&mut buf, val);
        self.data.extend_from_slice(&buf);
    }

    /// Write a string prefixed by its u16 length, the length counting a
    /// trailing null terminator
    pub fn write_len_string(&mut self, val: &str) {
        let bytes = val.as_bytes();
        let len = bytes.len().min(u16::MAX as usize - 1);
        self.write_u16(len as u16 + 1);
        self.data.extend_from_slice(&bytes[..len]);
        self.data.push(0);
    }

    // ---- Read operations ----

    fn take(&mut self, count: usize) -> Result<&[u8], std::io::Error> {
        if self.read_pos + count > self.data.len() {
            return Err(past_end());
        }
        let start = self.read_pos;
        self.read_pos += count;
        Ok(&self.data[start..start + count])
    }

    /// Read a u8
    pub fn read_u8(&mut self) -> Result<u8, std::io::Error> {
        Ok(self.take(1)?[0])
    }

    /// Read a u16 (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, std::io::Error> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    /// Read a u32 (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, std::io::Error> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Read an i32 (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, std::io::Error> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    /// Read an f32 (little-endian)
    pub fn read_f32(&mut self) -> Result<f32, std::io::Error> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    /// Read a u16 length-prefixed string, dropping the null terminator
    pub fn read_len_string(&mut self) -> Result<String, std::io::Error> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).to_string())
    }

    /// Read N bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, std::io::Error> {
        Ok(self.take(count)?.to_vec())
    }

    /// Skip N bytes in the read position
    pub fn read_skip(&mut self, count: usize) {
        self.read_pos = (self.read_pos + count).min(self.data.len());
    }
}

impl std::fmt::Display for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteBuffer(size={}, rpos={})", self.size(), self.read_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_u8() {
        let mut buf = ByteBuffer::new();
        buf.write_u8(42);
        assert_eq!(buf.read_u8().unwrap(), 42);
    }

    #[test]
    fn test_write_read_u32() {
        let mut buf = ByteBuffer::new();
        buf.write_u32(0xFEEDFACE);
        assert_eq!(buf.contents(), &[0xCE, 0xFA, 0xED, 0xFE]);
        assert_eq!(buf.read_u32().unwrap(), 0xFEEDFACE);
    }

    #[test]
    fn test_len_string_counts_terminator() {
        let mut buf = ByteBuffer::new();
        buf.write_len_string("BombsiteA");
        assert_eq!(buf.size(), 2 + 9 + 1);
        assert_eq!(buf.read_len_string().unwrap(), "BombsiteA");
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut buf = ByteBuffer::from_vec(vec![1, 2, 3]);
        assert!(buf.read_u32().is_err());
        assert_eq!(buf.read_pos(), 0);
        assert_eq!(buf.read_u16().unwrap(), 0x0201);
        assert!(buf.read_f32().is_err());
    }
}
