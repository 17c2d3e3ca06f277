//! Tile-based decoder, the inverse of [`crate::encoder`].

use crate::codestream::{Codestream, CodestreamParser, ParserOptions};
use crate::dwt::{Decomposition, DwtEngine, Orientation, Subband, SubbandId};
use crate::encoder::{dc_offset, decode_step_size};
use crate::error::{CodecError, Result};
use crate::lattice::TileLattice;
use crate::quantizer::Quantizer;
use crate::volume::SampleVolume;
use joxel_core::VolumeRegion;
use joxel_core::io::{ValueReader, ValueReaderSlice};

/// Decodes codestreams produced by [`crate::encoder::Encoder`].
#[derive(Debug, Default)]
pub struct Decoder {
	engine: DwtEngine,
}

impl Decoder {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Parses and fully decodes `bytes`.
	pub fn decode(&self, bytes: &[u8]) -> Result<SampleVolume> {
		let codestream = CodestreamParser::new(ParserOptions::default()).parse(bytes)?;
		self.decode_parsed(&codestream, bytes)
	}

	/// Decodes an already-parsed codestream. `bytes` must be the buffer the
	/// codestream was parsed from.
	pub fn decode_parsed(&self, codestream: &Codestream, bytes: &[u8]) -> Result<SampleVolume> {
		let siz = &codestream.siz;
		let lattice = TileLattice::from_siz(siz)?;
		let component_count = siz.component_count() as usize;
		let reversible = codestream.cod.reversible;

		let first = siz
			.components
			.first()
			.ok_or_else(|| CodecError::DecodingFailed("no components declared".to_string()))?;
		let plane_len = siz.width as usize * siz.height as usize * siz.depth as usize;
		let mut planes = vec![vec![0i32; plane_len]; component_count];
		let offset = dc_offset(first.bit_depth, first.signed);

		let quantizer = if reversible {
			Quantizer::reversible()
		} else {
			let raw = codestream
				.qcd
				.step_sizes
				.first()
				.copied()
				.ok_or_else(|| CodecError::DecodingFailed("QCD carries no step sizes".to_string()))?;
			Quantizer::new(decode_step_size(raw), 0.0)?
		};

		for tile_part in &codestream.tiles {
			let region = lattice.tile_by_index(u32::from(tile_part.index))?;
			let body = bytes
				.get(tile_part.body_range.as_range_usize())
				.ok_or_else(|| CodecError::truncated(tile_part.body_range.offset, "tile body out of bounds"))?;
			self.decode_tile(body, &region, reversible, &quantizer, offset, &mut planes, siz.width, siz.height)?;
		}

		SampleVolume::new(siz.width, siz.height, siz.depth, first.bit_depth, first.signed, planes)
	}

	#[allow(clippy::too_many_arguments)]
	fn decode_tile(
		&self,
		body: &[u8],
		region: &VolumeRegion,
		reversible: bool,
		quantizer: &Quantizer,
		dc_offset: i32,
		planes: &mut [Vec<i32>],
		image_width: u32,
		image_height: u32,
	) -> Result<()> {
		let mut reader = ValueReaderSlice::new_be(body);
		let shape = (region.width, region.height, region.depth);

		while reader.has_remaining() {
			let component = reader.read_u16()? as usize;
			let levels = reader.read_u8()?;
			let subband_count = reader.read_u8()?;
			if component >= planes.len() {
				return Err(CodecError::DecodingFailed(format!(
					"tile body names component {component}, only {} declared",
					planes.len()
				)));
			}

			let tile_samples = if reversible {
				let subbands = read_subbands::<i32>(&mut reader, subband_count, |v| v)?;
				let decomposition = Decomposition::from_subbands(shape, levels, subbands)?;
				self.engine.inverse(&decomposition)
			} else {
				let subbands = read_subbands::<f32>(&mut reader, subband_count, |v| quantizer.dequantize(v))?;
				let decomposition = Decomposition::from_subbands(shape, levels, subbands)?;
				self.engine.inverse(&decomposition).iter().map(|&v| v.round() as i32).collect()
			};

			if tile_samples.len() != region.volume() as usize {
				return Err(CodecError::DecodingFailed(format!(
					"tile reconstruction produced {} samples, expected {}",
					tile_samples.len(),
					region.volume()
				)));
			}

			let plane = &mut planes[component];
			let mut cursor = 0;
			for z in region.z..region.z + region.depth {
				for y in region.y..region.y + region.height {
					for x in region.x..region.x + region.width {
						let index = (z * image_width * image_height + y * image_width + x) as usize;
						plane[index] = tile_samples[cursor] + dc_offset;
						cursor += 1;
					}
				}
			}
		}
		Ok(())
	}
}

fn read_subbands<S: crate::dwt::DwtSample>(
	reader: &mut ValueReaderSlice<'_, byteorder::BigEndian>,
	count: u8,
	mut convert: impl FnMut(i32) -> S,
) -> Result<Vec<Subband<S>>> {
	let mut subbands = Vec::with_capacity(count as usize);
	for _ in 0..count {
		let level = reader.read_u8()?;
		let bits = reader.read_u8()?;
		let orientation = Orientation::new(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
		let width = reader.read_u32()?;
		let height = reader.read_u32()?;
		let depth = reader.read_u32()?;
		let len = width as usize * height as usize * depth as usize;
		let mut samples = Vec::with_capacity(len);
		for _ in 0..len {
			samples.push(convert(reader.read_i32()?));
		}
		subbands.push(Subband {
			id: SubbandId { level, orientation },
			width,
			height,
			depth,
			samples,
		});
	}
	Ok(subbands)
}
