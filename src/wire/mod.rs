//! Little-endian TL (Telegram's self-describing binary schema) reader and
//! writer (spec.md §6). This module hand-implements the handful of
//! primitives the eleven `e2e.chain.*` structures need; it is not a
//! general TL code generator, per spec.md §1's framing of the generator
//! itself as out of scope.

mod magic;
pub use magic::Magic;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Appends TL-serialized values to a growing byte buffer.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_magic(&mut self, magic: Magic) {
        self.write_i32(magic.0);
    }

    pub fn write_i32(&mut self, value: i32) {
        let mut tmp = [0u8; 4];
        LittleEndian::write_i32(&mut tmp, value);
        self.buf.extend_from_slice(&tmp);
    }

    pub fn write_i64(&mut self, value: i64) {
        let mut tmp = [0u8; 8];
        LittleEndian::write_i64(&mut tmp, value);
        self.buf.extend_from_slice(&tmp);
    }

    /// Raw fixed-size field with no length prefix (used for 32-byte
    /// hashes/keys and 64-byte signatures).
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// TL `bytes`: a length prefix (1 byte if < 254, else `0xfe` + 3-byte
    /// little-endian length) followed by the data, zero-padded so the
    /// total is a multiple of 4 bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        if data.len() < 254 {
            self.buf.push(data.len() as u8);
            self.buf.extend_from_slice(data);
            let written = 1 + data.len();
            self.pad_to_multiple_of_4(written);
        } else {
            self.buf.push(0xfe);
            let mut len_bytes = [0u8; 4];
            LittleEndian::write_u32(&mut len_bytes, data.len() as u32);
            self.buf.extend_from_slice(&len_bytes[0..3]);
            self.buf.extend_from_slice(data);
            let written = 4 + data.len();
            self.pad_to_multiple_of_4(written);
        }
    }

    fn pad_to_multiple_of_4(&mut self, written: usize) {
        let padding = (4 - written % 4) % 4;
        self.buf.extend(std::iter::repeat(0u8).take(padding));
    }

    /// TL `vector<T>`: a 4-byte little-endian count followed by each
    /// element written by `write_elem`.
    pub fn write_vector<T>(&mut self, items: &[T], mut write_elem: impl FnMut(&mut Writer, &T)) {
        self.write_i32(items.len() as i32);
        for item in items {
            write_elem(self, item);
        }
    }
}

/// Consumes TL-serialized values from a byte slice, tracking position.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn fetch_end(&self) -> Result<()> {
        if self.pos != self.data.len() {
            Err(Error::ParseError("trailing bytes after expected end of message"))
        } else {
            Ok(())
        }
    }

    pub fn read_magic(&mut self) -> Result<Magic> {
        Ok(Magic(self.read_i32()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        if self.remaining() < 4 {
            return Err(Error::ParseError("unexpected end of input reading i32"));
        }
        let value = LittleEndian::read_i32(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(value)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        if self.remaining() < 8 {
            return Err(Error::ParseError("unexpected end of input reading i64"));
        }
        let value = LittleEndian::read_i64(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(value)
    }

    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::ParseError("unexpected end of input reading raw bytes"));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_raw_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.read_raw(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        if self.remaining() < 1 {
            return Err(Error::ParseError("unexpected end of input reading bytes length"));
        }
        let first = self.data[self.pos];
        let (len, header_len): (usize, usize) = if first < 254 {
            self.pos += 1;
            (first as usize, 1)
        } else {
            self.pos += 1;
            let raw = self.read_raw(3)?;
            let len = (raw[0] as usize) | ((raw[1] as usize) << 8) | ((raw[2] as usize) << 16);
            (len, 4)
        };
        let data = self.read_raw(len)?.to_vec();
        let written = header_len + len;
        let padding = (4 - written % 4) % 4;
        self.read_raw(padding)?;
        Ok(data)
    }

    pub fn read_vector<T>(&mut self, mut read_elem: impl FnMut(&mut Reader<'a>) -> Result<T>) -> Result<Vec<T>> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(Error::ParseError("negative vector length"));
        }
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(read_elem(self)?);
        }
        Ok(out)
    }
}
