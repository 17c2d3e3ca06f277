//! Assembles a valid codestream from marker parameters and tile-part bodies.

use super::types::{CapParameters, CodParameters, QcdParameters, RSIZ_VOLUMETRIC, SizParameters};
use crate::error::{CodecError, Result};
use crate::lattice::TileLattice;
use crate::marker::{MARKER_CAP, MARKER_COD, MARKER_COM, MARKER_EOC, MARKER_QCD, MARKER_SIZ, MARKER_SOC, MARKER_SOD, MARKER_SOT};
use joxel_core::Blob;
use joxel_core::io::{ValueWriter, ValueWriterBlob};

/// Fixed length of the SOT marker plus its segment.
pub const SOT_TOTAL_LEN: u32 = 12;

/// One tile-part to be written.
#[derive(Clone, Debug)]
pub struct TilePartSource {
	pub tile_index: u16,
	pub tpsot: u8,
	pub tnsot: u8,
	pub body: Blob,
}

impl TilePartSource {
	#[must_use]
	pub fn new(tile_index: u16, body: Blob) -> Self {
		Self {
			tile_index,
			tpsot: 0,
			tnsot: 1,
			body,
		}
	}
}

/// Knobs that alter the emitted byte layout without changing semantics.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuilderOptions {
	/// Write the final tile-part with Psot = 0 ("extends to EOC").
	pub zero_psot_last: bool,
}

/// Emits SOC, the main header, tile-parts and EOC with exact lengths.
pub struct CodestreamBuilder {
	siz: SizParameters,
	cod: CodParameters,
	qcd: QcdParameters,
	cap: Option<CapParameters>,
	comment: Option<String>,
	options: BuilderOptions,
}

impl CodestreamBuilder {
	pub fn new(siz: SizParameters, cod: CodParameters, qcd: QcdParameters) -> Result<Self> {
		siz.validate()?;
		if cod.quality_layers == 0 {
			return Err(CodecError::InvalidConfiguration(
				"at least one quality layer required".to_string(),
			));
		}
		Ok(Self {
			siz,
			cod,
			qcd,
			cap: None,
			comment: None,
			options: BuilderOptions::default(),
		})
	}

	#[must_use]
	pub fn with_cap(mut self, cap: CapParameters) -> Self {
		self.cap = Some(cap);
		self
	}

	#[must_use]
	pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
		self.comment = Some(comment.into());
		self
	}

	#[must_use]
	pub fn with_options(mut self, options: BuilderOptions) -> Self {
		self.options = options;
		self
	}

	/// Builds the codestream from the given tile-parts.
	///
	/// Tile indices are validated against the tile grid derived from the
	/// geometry. Psot is computed as SOT + segment + SOD + body.
	pub fn build(&self, tile_parts: &[TilePartSource]) -> Result<Blob> {
		let lattice = TileLattice::from_siz(&self.siz)?;

		let mut writer = ValueWriterBlob::new_be();
		self.write_main_header(&mut writer)?;

		for (position, tile_part) in tile_parts.iter().enumerate() {
			if u32::from(tile_part.tile_index) >= lattice.len() {
				return Err(CodecError::InvalidTile {
					index: tile_part.tile_index,
					reason: format!("grid has only {} tiles", lattice.len()),
				});
			}
			let is_last = position + 1 == tile_parts.len();
			let psot = if is_last && self.options.zero_psot_last {
				0
			} else {
				SOT_TOTAL_LEN + 2 + tile_part.body.len() as u32
			};

			writer.write_u16(MARKER_SOT)?;
			writer.write_u16(10)?;
			writer.write_u16(tile_part.tile_index)?;
			writer.write_u32(psot)?;
			writer.write_u8(tile_part.tpsot)?;
			writer.write_u8(tile_part.tnsot)?;
			writer.write_u16(MARKER_SOD)?;
			writer.write_blob(&tile_part.body)?;
		}

		writer.write_u16(MARKER_EOC)?;
		Ok(writer.into_blob())
	}

	fn write_main_header(&self, writer: &mut ValueWriterBlob<byteorder::BigEndian>) -> Result<()> {
		writer.write_u16(MARKER_SOC)?;
		self.write_siz(writer)?;
		self.write_cod(writer)?;
		self.write_qcd(writer)?;
		if let Some(cap) = &self.cap {
			writer.write_u16(MARKER_CAP)?;
			writer.write_u16(6 + 2 * cap.ccap.len() as u16)?;
			writer.write_u32(cap.pcap)?;
			for ccap in &cap.ccap {
				writer.write_u16(*ccap)?;
			}
		}
		if let Some(comment) = &self.comment {
			writer.write_u16(MARKER_COM)?;
			writer.write_u16(4 + comment.len() as u16)?;
			// Rcom 1: Latin text
			writer.write_u16(1)?;
			writer.write_slice(comment.as_bytes())?;
		}
		Ok(())
	}

	fn write_siz(&self, writer: &mut ValueWriterBlob<byteorder::BigEndian>) -> Result<()> {
		let siz = &self.siz;
		let volumetric = siz.is_volumetric();
		let component_count = siz.component_count();
		let length = if volumetric { 50 } else { 38 } + 3 * component_count;

		writer.write_u16(MARKER_SIZ)?;
		writer.write_u16(length)?;
		writer.write_u16(if volumetric { RSIZ_VOLUMETRIC } else { 0 })?;
		writer.write_u32(siz.width)?;
		writer.write_u32(siz.height)?;
		writer.write_u32(0)?; // XOsiz
		writer.write_u32(0)?; // YOsiz
		writer.write_u32(siz.tile_width)?;
		writer.write_u32(siz.tile_height)?;
		writer.write_u32(0)?; // XTOsiz
		writer.write_u32(0)?; // YTOsiz
		if volumetric {
			writer.write_u32(siz.depth)?;
			writer.write_u32(siz.tile_depth)?;
			writer.write_u32(0)?; // ZTOsiz
		}
		writer.write_u16(component_count)?;
		for component in &siz.components {
			let ssiz = (component.bit_depth - 1) | if component.signed { 0x80 } else { 0 };
			writer.write_u8(ssiz)?;
			writer.write_u8(component.dx)?;
			writer.write_u8(component.dy)?;
		}
		Ok(())
	}

	fn write_cod(&self, writer: &mut ValueWriterBlob<byteorder::BigEndian>) -> Result<()> {
		let cod = &self.cod;
		let scod: u8 = if cod.precinct_sizes.is_empty() { 0 } else { 1 };

		writer.write_u16(MARKER_COD)?;
		writer.write_u16(12 + cod.precinct_sizes.len() as u16)?;
		writer.write_u8(scod)?;
		writer.write_u8(cod.progression_order.as_u8())?;
		writer.write_u16(cod.quality_layers)?;
		writer.write_u8(0)?; // no multi-component transform
		writer.write_u8(cod.decomposition_levels)?;
		// Code-block exponents are stored offset by 2.
		writer.write_u8(cod.codeblock_width_exp - 2)?;
		writer.write_u8(cod.codeblock_height_exp - 2)?;
		writer.write_u8(0)?; // code-block style
		writer.write_u8(u8::from(cod.reversible))?;
		for size in &cod.precinct_sizes {
			writer.write_u8(*size)?;
		}
		Ok(())
	}

	fn write_qcd(&self, writer: &mut ValueWriterBlob<byteorder::BigEndian>) -> Result<()> {
		let qcd = &self.qcd;
		let sqcd = (qcd.style & 0x1F) | (qcd.guard_bits << 5);
		let wide_steps = !qcd.is_reversible();
		let entry_len: u16 = if wide_steps { 2 } else { 1 };

		writer.write_u16(MARKER_QCD)?;
		writer.write_u16(3 + entry_len * qcd.step_sizes.len() as u16)?;
		writer.write_u8(sqcd)?;
		for step in &qcd.step_sizes {
			if wide_steps {
				writer.write_u16(*step)?;
			} else {
				writer.write_u8((step >> 8) as u8)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codestream::types::ComponentInfo;

	fn minimal_builder() -> CodestreamBuilder {
		CodestreamBuilder::new(
			SizParameters::new_2d(16, 16, 16, 16, ComponentInfo::new(8, false), 1),
			CodParameters::default(),
			QcdParameters::reversible(4),
		)
		.unwrap()
	}

	#[test]
	fn framing_markers() {
		let bytes = minimal_builder()
			.build(&[TilePartSource::new(0, Blob::from(vec![1, 2, 3, 4]))])
			.unwrap();
		let slice = bytes.as_slice();
		assert_eq!(&slice[0..2], &[0xFF, 0x4F]);
		assert_eq!(&slice[2..4], &[0xFF, 0x51]);
		assert_eq!(&slice[slice.len() - 2..], &[0xFF, 0xD9]);
	}

	#[test]
	fn psot_counts_sot_through_body() {
		let body = Blob::from(vec![0u8; 10]);
		let bytes = minimal_builder().build(&[TilePartSource::new(0, body)]).unwrap();
		let slice = bytes.as_slice();
		let sot = slice.windows(2).position(|w| w == [0xFF, 0x90]).unwrap();
		let psot = u32::from_be_bytes([slice[sot + 6], slice[sot + 7], slice[sot + 8], slice[sot + 9]]);
		// 12 bytes SOT, 2 bytes SOD, 10 bytes body
		assert_eq!(psot, 24);
	}

	#[test]
	fn zero_psot_on_request() {
		let bytes = minimal_builder()
			.with_options(BuilderOptions { zero_psot_last: true })
			.build(&[TilePartSource::new(0, Blob::from(vec![9u8; 3]))])
			.unwrap();
		let slice = bytes.as_slice();
		let sot = slice.windows(2).position(|w| w == [0xFF, 0x90]).unwrap();
		let psot = u32::from_be_bytes([slice[sot + 6], slice[sot + 7], slice[sot + 8], slice[sot + 9]]);
		assert_eq!(psot, 0);
	}

	#[test]
	fn rejects_out_of_grid_tile() {
		let result = minimal_builder().build(&[TilePartSource::new(5, Blob::new_empty())]);
		assert!(matches!(result, Err(CodecError::InvalidTile { index: 5, .. })));
	}

	#[test]
	fn comment_between_header_and_tiles() {
		let bytes = minimal_builder()
			.with_comment("created by joxel")
			.build(&[TilePartSource::new(0, Blob::new_empty())])
			.unwrap();
		let slice = bytes.as_slice();
		let com = slice.windows(2).position(|w| w == [0xFF, 0x64]).unwrap();
		let sot = slice.windows(2).position(|w| w == [0xFF, 0x90]).unwrap();
		assert!(com < sot);
	}
}
