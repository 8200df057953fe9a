//! Little-endian field readers/writers for SRPC payloads.
//!
//! Every payload struct in [`messages`](super::messages) serialises through
//! these two types, so the byte order and string/blob conventions live in
//! exactly one place. Strings and blobs travel as a `u16` length followed
//! by raw bytes; oversized inputs are truncated to the field's protocol
//! maximum at encode time.

use crate::error::{Error, Result};

/// Payload writer. Append-only, grows as needed.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Length-prefixed string, truncated to `max` bytes on a char boundary.
    pub fn put_str(&mut self, v: &str, max: usize) {
        let mut end = v.len().min(max);
        while end > 0 && !v.is_char_boundary(end) {
            end -= 1;
        }
        let bytes = &v.as_bytes()[..end];
        self.put_u16(bytes.len() as u16);
        self.put_bytes(bytes);
    }

    /// Length-prefixed blob, truncated to `max` bytes.
    pub fn put_blob(&mut self, v: &[u8], max: usize) {
        let bytes = &v[..v.len().min(max)];
        self.put_u16(bytes.len() as u16);
        self.put_bytes(bytes);
    }
}

/// Payload reader over a borrowed byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Codec("truncated payload"));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(b);
        Ok(u64::from_le_bytes(out))
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let b = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(b);
        Ok(out)
    }

    /// Length-prefixed string; rejects lengths above `max`.
    pub fn str(&mut self, max: usize) -> Result<String> {
        let len = self.u16()? as usize;
        if len > max {
            return Err(Error::Codec("string field over protocol limit"));
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::Codec("string field not UTF-8"))
    }

    /// Length-prefixed blob; rejects lengths above `max`.
    pub fn blob(&mut self, max: usize) -> Result<Vec<u8>> {
        let len = self.u16()? as usize;
        if len > max {
            return Err(Error::Codec("blob field over protocol limit"));
        }
        Ok(self.take(len)?.to_vec())
    }
}
