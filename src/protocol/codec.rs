//! Primitive readers and writers for the two wire encodings
//!
//! `binary` writes integers and lengths as fixed-width big-endian values.
//! `compact` writes them as zig-zag (signed) or plain (lengths) LEB128 varints.
//! Columnar payloads are Arrow IPC bytes and pass through untouched.

use super::Protocol;
use bytes::{BufMut, BytesMut};
use std::io;

/// Longest LEB128 encoding of a u64
const MAX_VARINT_LEN: usize = 10;

fn eof(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, what.to_string())
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Append a LEB128 varint
pub(crate) fn put_varint(buf: &mut BytesMut, mut v: u64) {
    while v >= 0x80 {
        buf.put_u8((v as u8 & 0x7F) | 0x80);
        v >>= 7;
    }
    buf.put_u8(v as u8);
}

/// Read a LEB128 varint from the front of `data`.
///
/// Returns the value and the number of bytes it occupied.
pub(crate) fn get_varint(data: &[u8]) -> io::Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().enumerate().take(MAX_VARINT_LEN) {
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if data.len() >= MAX_VARINT_LEN {
        Err(invalid("varint longer than 10 bytes".into()))
    } else {
        Err(eof("varint"))
    }
}

/// Body writer for one encoding
pub(crate) struct Writer<'a> {
    buf: &'a mut BytesMut,
    protocol: Protocol,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(buf: &'a mut BytesMut, protocol: Protocol) -> Self {
        Self { buf, protocol }
    }

    /// Write a length. Frames are capped at `MAX_FRAME_LENGTH` before they
    /// leave the encoder, so anything that reaches the wire fits in a u32.
    pub(crate) fn put_len(&mut self, len: usize) {
        match self.protocol {
            Protocol::Binary => self.buf.put_u32(len as u32),
            Protocol::Compact => put_varint(self.buf, len as u64),
        }
    }

    pub(crate) fn put_i32(&mut self, v: i32) {
        match self.protocol {
            Protocol::Binary => self.buf.put_i32(v),
            Protocol::Compact => put_varint(self.buf, zigzag(i64::from(v))),
        }
    }

    pub(crate) fn put_i64(&mut self, v: i64) {
        match self.protocol {
            Protocol::Binary => self.buf.put_i64(v),
            Protocol::Compact => put_varint(self.buf, zigzag(v)),
        }
    }

    pub(crate) fn put_str(&mut self, s: &str) {
        self.put_len(s.len());
        self.buf.put_slice(s.as_bytes());
    }

    /// Raw bytes running to the end of the body
    pub(crate) fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }
}

/// Body reader for one encoding
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    protocol: Protocol,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8], protocol: Protocol) -> Self {
        Self {
            data,
            pos: 0,
            protocol,
        }
    }

    /// Bytes not yet consumed
    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> io::Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(eof(what));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn varint(&mut self) -> io::Result<u64> {
        let (v, n) = get_varint(&self.data[self.pos..])?;
        self.pos += n;
        Ok(v)
    }

    /// Consume the rest of the body
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    pub(crate) fn get_len(&mut self) -> io::Result<usize> {
        let len = match self.protocol {
            Protocol::Binary => {
                let b = self.take(4, "length")?;
                u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64
            }
            Protocol::Compact => self.varint()?,
        };
        // Every counted element occupies at least one byte, so a length
        // beyond the remaining body is corrupt rather than incomplete.
        if len > self.remaining() as u64 {
            return Err(invalid(format!(
                "length {} exceeds remaining {} bytes",
                len,
                self.remaining()
            )));
        }
        Ok(len as usize)
    }

    pub(crate) fn get_i32(&mut self) -> io::Result<i32> {
        match self.protocol {
            Protocol::Binary => {
                let b = self.take(4, "i32")?;
                Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            Protocol::Compact => {
                let v = unzigzag(self.varint()?);
                i32::try_from(v).map_err(|_| invalid(format!("i32 out of range: {}", v)))
            }
        }
    }

    pub(crate) fn get_i64(&mut self) -> io::Result<i64> {
        match self.protocol {
            Protocol::Binary => {
                let b = self.take(8, "i64")?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                Ok(i64::from_be_bytes(raw))
            }
            Protocol::Compact => Ok(unzigzag(self.varint()?)),
        }
    }

    pub(crate) fn get_str(&mut self) -> io::Result<String> {
        let len = self.get_len()?;
        let bytes = self.take(len, "string")?;
        String::from_utf8(bytes.to_vec()).map_err(|e| invalid(format!("invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(unzigzag(zigzag(i64::MIN)), i64::MIN);
        assert_eq!(unzigzag(zigzag(i64::MAX)), i64::MAX);
    }

    #[test]
    fn test_varint_layout() {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, 300);
        assert_eq!(&buf[..], &[0xAC, 0x02]);
        assert_eq!(get_varint(&buf).unwrap(), (300, 2));
    }

    #[test]
    fn test_truncated_varint_is_eof() {
        let err = get_varint(&[0x80, 0x80]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_overlong_varint_is_invalid() {
        let err = get_varint(&[0xFF; 11]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_compact_is_smaller_for_small_ints() {
        let mut binary = BytesMut::new();
        Writer::new(&mut binary, Protocol::Binary).put_i64(7);
        let mut compact = BytesMut::new();
        Writer::new(&mut compact, Protocol::Compact).put_i64(7);
        assert_eq!(binary.len(), 8);
        assert_eq!(compact.len(), 1);
    }

    #[test]
    fn test_reader_rejects_oversized_length() {
        let mut buf = BytesMut::new();
        Writer::new(&mut buf, Protocol::Binary).put_len(100);
        let mut reader = Reader::new(&buf, Protocol::Binary);
        let err = reader.get_len().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
