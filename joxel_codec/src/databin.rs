//! Segmentation of a codestream into addressable data bins.
//!
//! Data bins are the delivery granularity of the interactive protocol: a
//! client addresses `(class, id)` pairs and accumulates their bytes. This
//! generator cuts a parsed codestream into one main-header bin, one header bin
//! and one body bin per tile. Precinct bins require resolvable packet
//! boundaries inside the tile body; when those are absent, tile bins carry the
//! payload and precinct segmentation is deferred.

use crate::codestream::Codestream;
use crate::error::{CodecError, Result};
use joxel_core::Blob;

/// Data-bin classes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DataBinClass {
	MainHeader,
	TileHeader,
	Precinct,
	Tile,
	ExtPrecinct,
	Metadata,
}

impl DataBinClass {
	#[must_use]
	pub fn as_u8(self) -> u8 {
		match self {
			DataBinClass::MainHeader => 0,
			DataBinClass::TileHeader => 1,
			DataBinClass::Precinct => 2,
			DataBinClass::Tile => 3,
			DataBinClass::ExtPrecinct => 4,
			DataBinClass::Metadata => 5,
		}
	}

	pub fn from_u8(value: u8) -> Result<Self> {
		Ok(match value {
			0 => DataBinClass::MainHeader,
			1 => DataBinClass::TileHeader,
			2 => DataBinClass::Precinct,
			3 => DataBinClass::Tile,
			4 => DataBinClass::ExtPrecinct,
			5 => DataBinClass::Metadata,
			_ => return Err(CodecError::InvalidConfiguration(format!("unknown data-bin class {value}"))),
		})
	}
}

/// An addressable fragment of a codestream.
///
/// Bins are value types; payloads are appended until `is_complete` is set,
/// after which the bin is immutable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataBin {
	pub class: DataBinClass,
	pub id: u32,
	pub bytes: Blob,
	pub is_complete: bool,
}

impl DataBin {
	#[must_use]
	pub fn new(class: DataBinClass, id: u32, bytes: Blob, is_complete: bool) -> Self {
		Self {
			class,
			id,
			bytes,
			is_complete,
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.bytes.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.bytes.is_empty()
	}
}

/// Cuts `bytes` (the buffer `codestream` was parsed from) into complete bins.
///
/// Emission order: the main-header bin, then per tile its header bin followed
/// by its body bin. Multiple tile-parts of one tile merge into a single tile
/// bin in tile-part order.
pub fn generate_bins(codestream: &Codestream, bytes: &[u8]) -> Result<Vec<DataBin>> {
	let main_end = codestream.main_header_end as usize;
	if main_end > bytes.len() {
		return Err(CodecError::truncated(codestream.main_header_end, "main header out of bounds"));
	}

	let mut bins = vec![DataBin::new(
		DataBinClass::MainHeader,
		0,
		Blob::from(&bytes[..main_end]),
		true,
	)];

	let mut seen: Vec<u16> = Vec::new();
	for tile_part in &codestream.tiles {
		let header = bytes
			.get(tile_part.header_range.as_range_usize())
			.ok_or_else(|| CodecError::truncated(tile_part.header_range.offset, "tile header out of bounds"))?;
		let body = bytes
			.get(tile_part.body_range.as_range_usize())
			.ok_or_else(|| CodecError::truncated(tile_part.body_range.offset, "tile body out of bounds"))?;

		if seen.contains(&tile_part.index) {
			// Later tile-part of a tile already emitted: extend its body bin.
			let bin = bins
				.iter_mut()
				.find(|bin| bin.class == DataBinClass::Tile && bin.id == u32::from(tile_part.index))
				.expect("tile bin emitted for seen index");
			bin.bytes.append(body);
		} else {
			seen.push(tile_part.index);
			bins.push(DataBin::new(
				DataBinClass::TileHeader,
				u32::from(tile_part.index),
				Blob::from(header),
				true,
			));
			bins.push(DataBin::new(
				DataBinClass::Tile,
				u32::from(tile_part.index),
				Blob::from(body),
				true,
			));
		}
	}

	Ok(bins)
}
