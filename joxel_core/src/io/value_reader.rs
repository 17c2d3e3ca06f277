//! This module defines the [`ValueReader`] trait for reading typed values from
//! byte sources.
//!
//! Implementations handle big-endian sources (marker segments, WebSocket
//! frames) and little-endian sources (persistent cache records) through the
//! same interface, parameterized by [`byteorder::ByteOrder`].

use crate::types::Blob;
use anyhow::{Result, bail};
use byteorder::{ByteOrder, ReadBytesExt};
use std::io::{Read, Seek};

/// A simple alias for types implementing both `Seek` and `Read`.
pub trait SeekRead: Seek + Read {}

impl<T: Seek + Read> SeekRead for T {}

/// A trait for reading values from a byte source with a fixed byte order.
pub trait ValueReader<'a, E: ByteOrder + 'a> {
	/// Returns the underlying reader to access raw bytes.
	fn get_reader(&mut self) -> &mut dyn SeekRead;

	/// Total length of the readable data.
	fn len(&self) -> u64;

	/// Current position within the readable data.
	fn position(&mut self) -> u64;

	/// Moves the read position.
	fn set_position(&mut self, position: u64) -> Result<()>;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of bytes left to read.
	fn remaining(&mut self) -> u64 {
		self.len() - self.position()
	}

	fn has_remaining(&mut self) -> bool {
		self.remaining() > 0
	}

	fn read_u8(&mut self) -> Result<u8> {
		Ok(self.get_reader().read_u8()?)
	}

	fn read_u16(&mut self) -> Result<u16> {
		Ok(self.get_reader().read_u16::<E>()?)
	}

	fn read_u32(&mut self) -> Result<u32> {
		Ok(self.get_reader().read_u32::<E>()?)
	}

	fn read_u64(&mut self) -> Result<u64> {
		Ok(self.get_reader().read_u64::<E>()?)
	}

	fn read_i32(&mut self) -> Result<i32> {
		Ok(self.get_reader().read_i32::<E>()?)
	}

	fn read_f32(&mut self) -> Result<f32> {
		Ok(self.get_reader().read_f32::<E>()?)
	}

	fn read_f64(&mut self) -> Result<f64> {
		Ok(self.get_reader().read_f64::<E>()?)
	}

	/// Reads `length` bytes into a [`Blob`].
	fn read_blob(&mut self, length: u64) -> Result<Blob> {
		if length > self.remaining() {
			bail!("cannot read {length} bytes, only {} remaining", self.remaining());
		}
		let mut blob = Blob::new_sized(length as usize);
		self.get_reader().read_exact(blob.as_mut_slice())?;
		Ok(blob)
	}

	/// Reads a UTF-8 string of `length` bytes.
	fn read_string(&mut self, length: u64) -> Result<String> {
		let mut vec = vec![0u8; length as usize];
		self.get_reader().read_exact(&mut vec)?;
		Ok(String::from_utf8(vec)?)
	}

	/// Skips `length` bytes.
	fn skip(&mut self, length: u64) -> Result<()> {
		let position = self.position();
		self.set_position(position + length)
	}
}

#[cfg(test)]
mod tests {
	use super::super::ValueReaderSlice;
	use super::*;

	#[test]
	fn read_integers_be() {
		let mut reader = ValueReaderSlice::new_be(&[0xFF, 0x4F, 0x00, 0x00, 0x01, 0x00]);
		assert_eq!(reader.read_u16().unwrap(), 0xFF4F);
		assert_eq!(reader.read_u32().unwrap(), 256);
		assert!(!reader.has_remaining());
	}

	#[test]
	fn read_integers_le() {
		let mut reader = ValueReaderSlice::new_le(&[0x01, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]);
		assert_eq!(reader.read_u16().unwrap(), 1);
		assert_eq!(reader.read_i32().unwrap(), -1);
	}

	#[test]
	fn read_blob_rejects_overrun() {
		let mut reader = ValueReaderSlice::new_be(&[1, 2, 3]);
		assert!(reader.read_blob(4).is_err());
		assert_eq!(reader.read_blob(3).unwrap().as_slice(), &[1, 2, 3]);
	}

	#[test]
	fn skip_moves_position() {
		let mut reader = ValueReaderSlice::new_be(&[1, 2, 3, 4]);
		reader.skip(2).unwrap();
		assert_eq!(reader.read_u8().unwrap(), 3);
		assert_eq!(reader.remaining(), 1);
	}

	#[test]
	fn read_string_utf8() {
		let mut reader = ValueReaderSlice::new_be(b"jp2 rest");
		assert_eq!(reader.read_string(4).unwrap(), "jp2 ");
	}
}
