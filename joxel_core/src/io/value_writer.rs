//! This module defines the [`ValueWriter`] trait for writing typed values to
//! byte destinations.

use crate::types::Blob;
use anyhow::Result;
use byteorder::{ByteOrder, WriteBytesExt};
use std::io::Write;

/// A trait for writing values to a destination with a fixed byte order.
pub trait ValueWriter<E: ByteOrder> {
	/// Returns a mutable reference to the underlying writer.
	fn get_writer(&mut self) -> &mut dyn Write;

	/// Current write position, as an offset from the start.
	fn position(&mut self) -> Result<u64>;

	fn is_empty(&mut self) -> Result<bool> {
		Ok(self.position()? == 0)
	}

	fn write_u8(&mut self, value: u8) -> Result<()> {
		Ok(self.get_writer().write_u8(value)?)
	}

	fn write_u16(&mut self, value: u16) -> Result<()> {
		Ok(self.get_writer().write_u16::<E>(value)?)
	}

	fn write_u32(&mut self, value: u32) -> Result<()> {
		Ok(self.get_writer().write_u32::<E>(value)?)
	}

	fn write_u64(&mut self, value: u64) -> Result<()> {
		Ok(self.get_writer().write_u64::<E>(value)?)
	}

	fn write_i32(&mut self, value: i32) -> Result<()> {
		Ok(self.get_writer().write_i32::<E>(value)?)
	}

	fn write_f32(&mut self, value: f32) -> Result<()> {
		Ok(self.get_writer().write_f32::<E>(value)?)
	}

	fn write_f64(&mut self, value: f64) -> Result<()> {
		Ok(self.get_writer().write_f64::<E>(value)?)
	}

	fn write_slice(&mut self, buf: &[u8]) -> Result<()> {
		Ok(self.get_writer().write_all(buf)?)
	}

	fn write_blob(&mut self, blob: &Blob) -> Result<()> {
		self.write_slice(blob.as_slice())
	}

	/// Writes a string as a u32 length prefix followed by UTF-8 bytes.
	fn write_prefixed_string(&mut self, value: &str) -> Result<()> {
		self.write_u32(value.len() as u32)?;
		self.write_slice(value.as_bytes())
	}
}

#[cfg(test)]
mod tests {
	use super::super::ValueWriterBlob;
	use super::*;

	#[test]
	fn write_integers_be() {
		let mut writer = ValueWriterBlob::new_be();
		writer.write_u16(0xFF4F).unwrap();
		writer.write_u32(256).unwrap();
		assert_eq!(writer.into_blob().into_vec(), vec![0xFF, 0x4F, 0x00, 0x00, 0x01, 0x00]);
	}

	#[test]
	fn write_integers_le() {
		let mut writer = ValueWriterBlob::new_le();
		writer.write_u64(1).unwrap();
		assert_eq!(writer.into_blob().into_vec(), vec![1, 0, 0, 0, 0, 0, 0, 0]);
	}

	#[test]
	fn write_prefixed_string_roundtrip() {
		let mut writer = ValueWriterBlob::new_le();
		writer.write_prefixed_string("tile").unwrap();
		assert_eq!(writer.into_blob().into_vec(), vec![4, 0, 0, 0, b't', b'i', b'l', b'e']);
	}
}
