//! Checksummed binary readers and writers.
//!
//! Every structured file ends with a little-endian CRC32 of all preceding
//! bytes. [`StructReader`] verifies the trailer before handing out any data,
//! so a torn or bit-flipped file is reported as `DatabaseCorrupt` up front.

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{Result, TesseraError};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint;

impl StorageOutput for Box<dyn StorageOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        (**self).flush_and_sync()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Writer for structured files.
#[derive(Debug)]
pub struct StructWriter<W: StorageOutput> {
    output: W,
    hasher: Hasher,
    written: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Wrap an output.
    pub fn new(output: W) -> Self {
        StructWriter {
            output,
            hasher: Hasher::new(),
            written: 0,
        }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.write_all(bytes)?;
        self.hasher.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.put(&[value])
    }

    /// Write a little-endian u32.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.put(&buf)
    }

    /// Write a little-endian u64.
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.put(&buf)
    }

    /// Write an f64 as its IEEE bits.
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_u64(value.to_bits())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let encoded = varint::encode_u64(value);
        self.put(&encoded)
    }

    /// Write a length-prefixed byte string.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_varint(bytes.len() as u64)?;
        self.put(bytes)
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Number of payload bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Append the checksum trailer and close the output.
    pub fn close(mut self) -> Result<()> {
        let crc = self.hasher.clone().finalize();
        self.output.write_u32::<LittleEndian>(crc)?;
        self.output.close()
    }
}

/// Reader for structured files.
#[derive(Debug)]
pub struct StructReader {
    data: Vec<u8>,
    position: usize,
    name: String,
}

impl StructReader {
    /// Read the whole input and verify its checksum trailer.
    pub fn new(mut input: Box<dyn StorageInput>, name: &str) -> Result<Self> {
        let mut data = Vec::with_capacity(input.size()? as usize);
        input.read_to_end(&mut data)?;
        Self::from_bytes(data, name)
    }

    /// Verify and wrap an in-memory buffer.
    pub fn from_bytes(mut data: Vec<u8>, name: &str) -> Result<Self> {
        if data.len() < 4 {
            return Err(TesseraError::corrupt(format!(
                "'{name}' is truncated ({} bytes)",
                data.len()
            )));
        }
        let payload_len = data.len() - 4;
        let stored = LittleEndian::read_u32(&data[payload_len..]);
        let computed = crc32fast::hash(&data[..payload_len]);
        if stored != computed {
            return Err(TesseraError::corrupt(format!(
                "checksum mismatch in '{name}' (stored {stored:08x}, computed {computed:08x})"
            )));
        }
        data.truncate(payload_len);
        Ok(StructReader {
            data,
            position: 0,
            name: name.to_string(),
        })
    }

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        let end = self.position.checked_add(len).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.position..end];
                self.position = end;
                Ok(slice)
            }
            None => Err(TesseraError::corrupt(format!(
                "unexpected end of '{}' at offset {}",
                self.name, self.position
            ))),
        }
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Read an f64 written by [`StructWriter::write_f64`].
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, used) = varint::decode_u64(&self.data[self.position..]).map_err(|e| {
            TesseraError::corrupt(format!("bad varint in '{}': {e}", self.name))
        })?;
        self.position += used;
        Ok(value)
    }

    /// Read a length-prefixed byte string.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_varint()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes)
            .map_err(|_| TesseraError::corrupt(format!("invalid UTF-8 in '{}'", self.name)))
    }

    /// Check a magic number and version header.
    pub fn expect_header(&mut self, magic: u32, version: u32) -> Result<()> {
        let found_magic = self.read_u32()?;
        if found_magic != magic {
            return Err(TesseraError::corrupt(format!(
                "'{}' has bad magic {found_magic:08x}",
                self.name
            )));
        }
        let found_version = self.read_u32()?;
        if found_version != version {
            return Err(TesseraError::corrupt(format!(
                "'{}' has unsupported format version {found_version}",
                self.name
            )));
        }
        Ok(())
    }

    /// Whether all payload bytes were consumed.
    pub fn is_at_end(&self) -> bool {
        self.position == self.data.len()
    }
}
