//! Compression helpers used by the client cache and the persistent stores.
//!
//! Gzip is the default for idle cache entries; Brotli is available for
//! write-once persistent records where ratio matters more than speed.

use crate::types::Blob;
use anyhow::{Result, bail};
use brotli::{BrotliCompress, BrotliDecompress, enc::BrotliEncoderParams};
use flate2::bufread::{GzDecoder, GzEncoder};
use joxel_derive::context;
use std::io::Read;

/// The compression applied to a stored payload.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Compression {
	#[default]
	Uncompressed,
	Gzip,
	Brotli,
}

impl Compression {
	/// Compresses `blob` with this method. `Uncompressed` is the identity.
	pub fn compress(self, blob: &Blob) -> Result<Blob> {
		match self {
			Compression::Uncompressed => Ok(blob.clone()),
			Compression::Gzip => compress_gzip(blob),
			Compression::Brotli => compress_brotli(blob),
		}
	}

	/// Reverses [`Compression::compress`].
	pub fn decompress(self, blob: &Blob) -> Result<Blob> {
		match self {
			Compression::Uncompressed => Ok(blob.clone()),
			Compression::Gzip => decompress_gzip(blob),
			Compression::Brotli => decompress_brotli(blob),
		}
	}

	#[must_use]
	pub fn as_u8(self) -> u8 {
		match self {
			Compression::Uncompressed => 0,
			Compression::Gzip => 1,
			Compression::Brotli => 2,
		}
	}

	pub fn from_u8(value: u8) -> Result<Compression> {
		Ok(match value {
			0 => Compression::Uncompressed,
			1 => Compression::Gzip,
			2 => Compression::Brotli,
			_ => bail!("unknown compression id {value}"),
		})
	}
}

/// Pulls a transforming reader dry into a fresh blob.
///
/// Both gzip directions are readers over the input slice, so one drain
/// covers compression and decompression alike.
fn drain_reader(mut reader: impl Read, capacity_hint: usize) -> Result<Blob> {
	let mut buffer = Vec::with_capacity(capacity_hint);
	reader.read_to_end(&mut buffer)?;
	Ok(Blob::from(buffer))
}

/// Compresses data using gzip.
#[context("gzip-compressing {} bytes", blob.len())]
pub fn compress_gzip(blob: &Blob) -> Result<Blob> {
	let encoder = GzEncoder::new(blob.as_slice(), flate2::Compression::best());
	drain_reader(encoder, blob.len() / 2)
}

/// Decompresses gzip data.
#[context("gzip-decompressing {} bytes", blob.len())]
pub fn decompress_gzip(blob: &Blob) -> Result<Blob> {
	drain_reader(GzDecoder::new(blob.as_slice()), blob.len().saturating_mul(2))
}

/// Compresses data using Brotli.
#[context("brotli-compressing {} bytes", blob.len())]
pub fn compress_brotli(blob: &Blob) -> Result<Blob> {
	let params = BrotliEncoderParams {
		quality: 9,
		lgwin: 20,
		size_hint: blob.len(),
		..Default::default()
	};
	let mut input = blob.as_slice();
	let mut output = Vec::with_capacity(blob.len() / 2);
	BrotliCompress(&mut input, &mut output, &params)?;
	Ok(Blob::from(output))
}

/// Decompresses Brotli data.
#[context("brotli-decompressing {} bytes", blob.len())]
pub fn decompress_brotli(blob: &Blob) -> Result<Blob> {
	let mut input = blob.as_slice();
	let mut output = Vec::with_capacity(blob.len().saturating_mul(2));
	BrotliDecompress(&mut input, &mut output)?;
	Ok(Blob::from(output))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn generate_test_data(size: usize) -> Blob {
		Blob::from((0..size).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
	}

	#[test]
	fn gzip_roundtrip() -> Result<()> {
		let data = generate_test_data(100_000);
		let compressed = compress_gzip(&data)?;
		assert!(compressed.len() < data.len());
		assert_eq!(decompress_gzip(&compressed)?, data);
		Ok(())
	}

	#[test]
	fn brotli_roundtrip() -> Result<()> {
		let data = generate_test_data(100_000);
		let compressed = compress_brotli(&data)?;
		assert!(compressed.len() < data.len());
		assert_eq!(decompress_brotli(&compressed)?, data);
		Ok(())
	}

	#[test]
	fn corrupt_gzip_rejected() {
		assert!(decompress_gzip(&Blob::from(vec![0x1F, 0x8B, 0xFF, 0xFF])).is_err());
	}

	#[test]
	fn method_dispatch_roundtrip() -> Result<()> {
		let data = generate_test_data(4096);
		for method in [Compression::Uncompressed, Compression::Gzip, Compression::Brotli] {
			let compressed = method.compress(&data)?;
			assert_eq!(method.decompress(&compressed)?, data);
			assert_eq!(Compression::from_u8(method.as_u8())?, method);
		}
		Ok(())
	}

	#[test]
	fn unknown_compression_id_fails() {
		assert!(Compression::from_u8(9).is_err());
	}
}
