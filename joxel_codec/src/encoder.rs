//! Tile-based encoder.
//!
//! Each tile is transformed, quantized and serialized independently, then
//! framed by the codestream builder. The tile body layout is private to this
//! codec: per component a small header (index, effective level count, subband
//! count) followed by each subband as `(level, orientation, extent)` header
//! plus big-endian `i32` coefficients in raster order. Lossy bodies carry
//! quantizer indices instead of raw coefficients; the step size is announced
//! in the QCD segment as 8.8 fixed point.

use crate::codestream::{
	BuilderOptions, CapParameters, CodParameters, CodestreamBuilder, ProgressionOrder, QcdParameters, SizParameters,
	TilePartSource,
};
use crate::codestream::types::ComponentInfo;
use crate::dwt::{Decomposition, DwtEngine, DwtSample, Subband};
use crate::error::{CodecError, Result};
use crate::lattice::TileLattice;
use crate::quantizer::Quantizer;
use crate::volume::SampleVolume;
use joxel_core::io::{ValueWriter, ValueWriterBlob};
use joxel_core::{Blob, CancelToken, VolumeRegion};

/// Coefficient coding mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EncodeMode {
	/// Reversible 5/3 path; decode restores samples bit-for-bit.
	Lossless,
	/// Irreversible 9/7 path with dead-zone quantization.
	Lossy { step_size: f32 },
}

/// Encoder configuration.
#[derive(Clone, Debug)]
pub struct EncodeParams {
	pub tile_size: (u32, u32, u32),
	pub levels: u8,
	pub progression: ProgressionOrder,
	pub quality_layers: u16,
	pub mode: EncodeMode,
	pub comment: Option<String>,
	/// Announce HTJ2K capability through a CAP segment.
	pub htj2k: bool,
	/// Write the last tile-part with Psot = 0.
	pub zero_psot_last: bool,
}

impl EncodeParams {
	#[must_use]
	pub fn lossless(tile_size: (u32, u32, u32), levels: u8) -> Self {
		Self {
			tile_size,
			levels,
			progression: ProgressionOrder::Lrcp,
			quality_layers: 1,
			mode: EncodeMode::Lossless,
			comment: None,
			htj2k: false,
			zero_psot_last: false,
		}
	}

	#[must_use]
	pub fn lossy(tile_size: (u32, u32, u32), levels: u8, step_size: f32) -> Self {
		Self {
			mode: EncodeMode::Lossy { step_size },
			..Self::lossless(tile_size, levels)
		}
	}
}

/// Encodes [`SampleVolume`]s into codestreams.
#[derive(Debug, Default)]
pub struct Encoder {
	engine: DwtEngine,
}

impl Encoder {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn engine(&self) -> &DwtEngine {
		&self.engine
	}

	/// Encodes without external cancellation.
	pub fn encode(&self, volume: &SampleVolume, params: &EncodeParams) -> Result<Blob> {
		self.encode_with_cancel(volume, params, &CancelToken::new())
	}

	/// Encodes, checking `cancel` at every tile boundary.
	///
	/// A cancelled encode returns [`CodecError::Cancelled`] and no bytes.
	pub fn encode_with_cancel(
		&self,
		volume: &SampleVolume,
		params: &EncodeParams,
		cancel: &CancelToken,
	) -> Result<Blob> {
		if volume.bit_depth > 28 {
			return Err(CodecError::UnsupportedProfile(format!(
				"bit depth {} exceeds the coefficient range of this codec",
				volume.bit_depth
			)));
		}
		let reversible = matches!(params.mode, EncodeMode::Lossless);
		let siz = SizParameters {
			width: volume.width,
			height: volume.height,
			depth: volume.depth,
			tile_width: params.tile_size.0,
			tile_height: params.tile_size.1,
			tile_depth: params.tile_size.2,
			components: vec![
				ComponentInfo::new(volume.bit_depth, volume.signed);
				volume.component_count() as usize
			],
		};
		siz.validate()?;
		let lattice = TileLattice::from_siz(&siz)?;

		let subband_count = subband_count_for(&siz, params.levels);
		let cod = CodParameters {
			progression_order: params.progression,
			quality_layers: params.quality_layers,
			decomposition_levels: params.levels,
			reversible,
			..CodParameters::default()
		};
		let qcd = match params.mode {
			EncodeMode::Lossless => QcdParameters::reversible(subband_count),
			EncodeMode::Lossy { step_size } => {
				let quantizer = Quantizer::new(step_size, 0.0)?;
				QcdParameters {
					style: 2,
					guard_bits: 2,
					step_sizes: vec![encode_step_size(quantizer.step_size()); subband_count],
				}
			}
		};

		let mut tile_parts = Vec::with_capacity(lattice.len() as usize);
		for (tile_index, region) in lattice.iter().enumerate() {
			if cancel.is_cancelled() {
				return Err(CodecError::Cancelled);
			}
			let body = self.encode_tile(volume, &region, params)?;
			tile_parts.push(TilePartSource::new(tile_index as u16, body));
		}
		if cancel.is_cancelled() {
			return Err(CodecError::Cancelled);
		}

		let mut builder = CodestreamBuilder::new(siz, cod, qcd)?.with_options(BuilderOptions {
			zero_psot_last: params.zero_psot_last,
		});
		if params.htj2k {
			builder = builder.with_cap(CapParameters::htj2k());
		}
		if let Some(comment) = &params.comment {
			builder = builder.with_comment(comment.clone());
		}
		builder.build(&tile_parts)
	}

	fn encode_tile(&self, volume: &SampleVolume, region: &VolumeRegion, params: &EncodeParams) -> Result<Blob> {
		let levels = effective_levels(region, params.levels);
		let shape = (region.width, region.height, region.depth);
		let dc_offset = dc_offset(volume.bit_depth, volume.signed);

		let mut writer = ValueWriterBlob::new_be();
		for (component, plane) in volume.planes.iter().enumerate() {
			let mut tile_samples = Vec::with_capacity(region.volume() as usize);
			for z in region.z..region.z + region.depth {
				for y in region.y..region.y + region.height {
					for x in region.x..region.x + region.width {
						tile_samples.push(plane[volume.sample_index(x, y, z)] - dc_offset);
					}
				}
			}

			match params.mode {
				EncodeMode::Lossless => {
					let decomposition = self.engine.forward(&tile_samples, shape, levels)?;
					write_component(&mut writer, component as u16, levels, &decomposition, |subband, out| {
						out.extend_from_slice(&subband.samples);
					})?;
				}
				EncodeMode::Lossy { step_size } => {
					let quantizer = Quantizer::new(step_size, 0.0)?;
					let float_samples: Vec<f32> = tile_samples.iter().map(|&v| v as f32).collect();
					let decomposition = self.engine.forward(&float_samples, shape, levels)?;
					write_component(&mut writer, component as u16, levels, &decomposition, |subband, out| {
						out.extend(subband.samples.iter().map(|&c| quantizer.quantize(c)));
					})?;
				}
			}
		}
		Ok(writer.into_blob())
	}
}

/// Largest level count the tile extent supports, capped at the configured one.
fn effective_levels(region: &VolumeRegion, levels: u8) -> u8 {
	let mut effective = levels;
	while effective > 0 {
		let min_extent = 1u32 << effective;
		let depth_ok = region.depth == 1 || region.depth >= min_extent;
		if region.width >= min_extent && region.height >= min_extent && depth_ok {
			break;
		}
		effective -= 1;
	}
	effective
}

fn subband_count_for(siz: &SizParameters, levels: u8) -> usize {
	let per_level: usize = if siz.is_volumetric() { 7 } else { 3 };
	per_level * levels as usize + 1
}

pub(crate) fn dc_offset(bit_depth: u8, signed: bool) -> i32 {
	if signed { 0 } else { 1 << (bit_depth - 1) }
}

pub(crate) fn encode_step_size(step_size: f32) -> u16 {
	(step_size * 256.0).round().clamp(1.0, f32::from(u16::MAX)) as u16
}

pub(crate) fn decode_step_size(raw: u16) -> f32 {
	f32::from(raw) / 256.0
}

fn write_component<S: DwtSample>(
	writer: &mut ValueWriterBlob<byteorder::BigEndian>,
	component: u16,
	levels: u8,
	decomposition: &Decomposition<S>,
	mut serialize: impl FnMut(&Subband<S>, &mut Vec<i32>),
) -> Result<()> {
	writer.write_u16(component)?;
	writer.write_u8(levels)?;
	writer.write_u8(decomposition.subband_count() as u8)?;
	let mut coefficients = Vec::new();
	for subband in decomposition.iter() {
		writer.write_u8(subband.id.level)?;
		let orientation = &subband.id.orientation;
		let bits =
			u8::from(orientation.high_x) | (u8::from(orientation.high_y) << 1) | (u8::from(orientation.high_z) << 2);
		writer.write_u8(bits)?;
		writer.write_u32(subband.width)?;
		writer.write_u32(subband.height)?;
		writer.write_u32(subband.depth)?;
		coefficients.clear();
		serialize(subband, &mut coefficients);
		for value in &coefficients {
			writer.write_i32(*value)?;
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cancelled_encode_returns_no_bytes() {
		let encoder = Encoder::new();
		let volume = SampleVolume::gradient(8, 8, 1, 8);
		let cancel = CancelToken::new();
		cancel.cancel();
		let result = encoder.encode_with_cancel(&volume, &EncodeParams::lossless((4, 4, 1), 1), &cancel);
		assert_eq!(result, Err(CodecError::Cancelled));
	}

	#[test]
	fn deep_samples_rejected() {
		let volume = SampleVolume::new(4, 4, 1, 30, false, vec![vec![0; 16]]).unwrap();
		let result = Encoder::new().encode(&volume, &EncodeParams::lossless((4, 4, 1), 1));
		assert!(matches!(result, Err(CodecError::UnsupportedProfile(_))));
	}

	#[test]
	fn effective_levels_shrink_at_boundaries() {
		let full = VolumeRegion::new_2d(0, 0, 64, 64);
		assert_eq!(effective_levels(&full, 3), 3);
		let sliver = VolumeRegion::new_2d(96, 0, 4, 64);
		assert_eq!(effective_levels(&sliver, 3), 2);
		let tiny = VolumeRegion::new_2d(0, 0, 1, 1);
		assert_eq!(effective_levels(&tiny, 3), 0);
	}

	#[test]
	fn step_size_fixed_point_roundtrip() {
		for step in [0.5f32, 1.0, 2.25, 100.0] {
			let raw = encode_step_size(step);
			assert!((decode_step_size(raw) - step).abs() < 1.0 / 256.0);
		}
	}

	#[test]
	fn transform_statistics_accumulate() {
		let encoder = Encoder::new();
		let volume = SampleVolume::gradient(8, 8, 1, 8);
		encoder.encode(&volume, &EncodeParams::lossless((4, 4, 1), 1)).unwrap();
		// one forward transform per tile
		assert_eq!(encoder.engine().forward_transform_count(), 4);
	}
}
