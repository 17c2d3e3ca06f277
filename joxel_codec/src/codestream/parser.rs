//! Linear, fail-fast codestream parser.
//!
//! The parser scans markers once, front to back. In tolerant mode structural
//! damage past the main header degrades to a partial result with warnings;
//! otherwise the first violation aborts the parse.

use super::types::{
	CapParameters, Codestream, CodParameters, ComponentInfo, ProgressionOrder, QcdParameters, RSIZ_VOLUMETRIC,
	SizParameters, TilePart,
};
use crate::error::{CodecError, Result};
use crate::lattice::TileLattice;
use crate::marker::{
	MARKER_CAP, MARKER_COD, MARKER_COM, MARKER_EOC, MARKER_QCD, MARKER_SIZ, MARKER_SOC, MARKER_SOD, MARKER_SOT,
	Marker, is_segmentless_code,
};
use byteorder::BigEndian;
use joxel_core::ByteRange;
use joxel_core::io::{ValueReader, ValueReaderSlice};

/// Parser behavior switches.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParserOptions {
	/// Keep successfully parsed tiles when the stream is damaged or truncated,
	/// reporting problems as warnings on the result.
	pub tolerate_errors: bool,
}

/// Parses codestream bytes into a [`Codestream`] model.
pub struct CodestreamParser {
	options: ParserOptions,
}

impl CodestreamParser {
	#[must_use]
	pub fn new(options: ParserOptions) -> Self {
		Self { options }
	}

	/// Parses `bytes` front to back.
	pub fn parse(&self, bytes: &[u8]) -> Result<Codestream> {
		let mut reader = ValueReaderSlice::new_be(bytes);

		if reader.remaining() < 2 || reader.read_u16()? != MARKER_SOC {
			return Err(CodecError::MissingSoc);
		}

		let mut header = MainHeader::default();
		self.parse_main_header(&mut reader, &mut header)?;

		let siz = header
			.siz
			.ok_or_else(|| CodecError::malformed(2, "SIZ segment missing"))?;
		let cod = header
			.cod
			.ok_or_else(|| CodecError::malformed(header.end_offset, "COD segment missing"))?;
		let qcd = header
			.qcd
			.ok_or_else(|| CodecError::malformed(header.end_offset, "QCD segment missing"))?;
		let lattice = TileLattice::from_siz(&siz)?;

		let mut codestream = Codestream {
			is_htj2k: header.cap.as_ref().is_some_and(CapParameters::is_htj2k),
			siz,
			cod,
			qcd,
			cap: header.cap,
			comments: header.comments,
			tiles: Vec::new(),
			main_header_end: header.end_offset,
			is_partial: false,
			warnings: Vec::new(),
		};

		if header.saw_eoc {
			// Empty codestream: main header directly followed by EOC.
			return Ok(codestream);
		}

		self.parse_tile_parts(&mut reader, &lattice, &mut codestream)?;
		Ok(codestream)
	}

	fn parse_main_header<'a>(
		&self,
		reader: &mut ValueReaderSlice<'a, BigEndian>,
		header: &mut MainHeader,
	) -> Result<()> {
		// SIZ must immediately follow SOC.
		let siz_offset = reader.position();
		if reader.remaining() < 2 || reader.read_u16()? != MARKER_SIZ {
			return Err(CodecError::malformed(siz_offset, "SIZ must immediately follow SOC"));
		}
		header.siz = Some(parse_siz(reader)?);

		loop {
			let offset = reader.position();
			if reader.remaining() < 2 {
				return Err(CodecError::truncated(offset, "main header ended without SOT or EOC"));
			}
			let code = reader.read_u16()?;
			match code {
				MARKER_SIZ => {
					return Err(CodecError::DuplicateMarker {
						marker: Marker::Siz,
						offset,
					});
				}
				MARKER_COD => {
					if header.cod.is_some() {
						return Err(CodecError::DuplicateMarker {
							marker: Marker::Cod,
							offset,
						});
					}
					header.cod = Some(parse_cod(reader, offset)?);
				}
				MARKER_QCD => {
					if header.qcd.is_some() {
						return Err(CodecError::DuplicateMarker {
							marker: Marker::Qcd,
							offset,
						});
					}
					if header.cod.is_none() {
						return Err(CodecError::malformed(offset, "COD must precede QCD"));
					}
					header.qcd = Some(parse_qcd(reader, offset)?);
				}
				MARKER_CAP => {
					header.cap = Some(parse_cap(reader, offset)?);
				}
				MARKER_COM => {
					header.comments.push(parse_com(reader, offset)?);
				}
				MARKER_SOT => {
					header.end_offset = offset;
					return Ok(());
				}
				MARKER_EOC => {
					header.end_offset = offset;
					header.saw_eoc = true;
					return Ok(());
				}
				code => {
					skip_unknown_segment(reader, code, offset)?;
				}
			}
		}
	}

	fn parse_tile_parts<'a>(
		&self,
		reader: &mut ValueReaderSlice<'a, BigEndian>,
		lattice: &TileLattice,
		codestream: &mut Codestream,
	) -> Result<()> {
		let stream_len = reader.len();
		loop {
			// Position is at the first byte after a SOT marker code.
			let sot_offset = reader.position() - 2;
			let tile_part = match self.parse_one_tile_part(reader, lattice, sot_offset, stream_len) {
				Ok(tile_part) => tile_part,
				Err(error) if self.options.tolerate_errors => {
					log::warn!("tolerating codestream damage: {error}");
					codestream.warnings.push(error.to_string());
					codestream.is_partial = true;
					return Ok(());
				}
				Err(error) => return Err(error),
			};
			codestream.tiles.push(tile_part);

			let offset = reader.position();
			if reader.remaining() < 2 {
				if self.options.tolerate_errors {
					log::warn!("codestream ends without EOC");
					codestream.warnings.push(CodecError::MissingEoc.to_string());
					return Ok(());
				}
				return Err(CodecError::MissingEoc);
			}
			match reader.read_u16()? {
				MARKER_SOT => {}
				MARKER_EOC => return Ok(()),
				code => {
					let error = CodecError::malformed(offset, format!("expected SOT or EOC, found 0x{code:04X}"));
					if self.options.tolerate_errors {
						codestream.warnings.push(error.to_string());
						codestream.is_partial = true;
						return Ok(());
					}
					return Err(error);
				}
			}
		}
	}

	fn parse_one_tile_part<'a>(
		&self,
		reader: &mut ValueReaderSlice<'a, BigEndian>,
		lattice: &TileLattice,
		sot_offset: u64,
		stream_len: u64,
	) -> Result<TilePart> {
		if reader.remaining() < 10 {
			return Err(CodecError::truncated(sot_offset, "SOT segment cut short"));
		}
		let lsot = reader.read_u16()?;
		if lsot != 10 {
			return Err(CodecError::malformed(sot_offset, format!("Lsot must be 10, got {lsot}")));
		}
		let index = reader.read_u16()?;
		let psot = reader.read_u32()?;
		let tpsot = reader.read_u8()?;
		let tnsot = reader.read_u8()?;

		if u32::from(index) >= lattice.len() {
			return Err(CodecError::InvalidTile {
				index,
				reason: format!("grid has only {} tiles", lattice.len()),
			});
		}

		// Skip in-tile marker segments until SOD.
		loop {
			let offset = reader.position();
			if reader.remaining() < 2 {
				return Err(CodecError::truncated(offset, "tile-part header ended without SOD"));
			}
			let code = reader.read_u16()?;
			if code == MARKER_SOD {
				break;
			}
			match code {
				MARKER_COD | MARKER_QCD | MARKER_COM => {
					skip_segment(reader, offset)?;
				}
				code => skip_unknown_segment(reader, code, offset)?,
			}
		}

		let body_start = reader.position();
		let body_length = if psot == 0 {
			// Extends to EOC; claim the rest minus a trailing EOC when present.
			let rest = stream_len - body_start;
			if rest >= 2 && ends_with_eoc(reader, stream_len)? {
				rest - 2
			} else {
				rest
			}
		} else {
			let header_len = body_start - sot_offset;
			u64::from(psot)
				.checked_sub(header_len)
				.ok_or_else(|| CodecError::malformed(sot_offset, format!("Psot {psot} smaller than tile-part header")))?
		};

		if body_start + body_length > stream_len {
			return Err(CodecError::truncated(
				sot_offset,
				format!("Psot {psot} reaches past end of stream"),
			));
		}
		reader.set_position(body_start + body_length).map_err(|_| {
			CodecError::truncated(sot_offset, format!("Psot {psot} reaches past end of stream"))
		})?;

		Ok(TilePart {
			index,
			tpsot,
			tnsot,
			header_range: ByteRange::new(sot_offset, body_start - sot_offset),
			body_range: ByteRange::new(body_start, body_length),
		})
	}
}

#[derive(Default)]
struct MainHeader {
	siz: Option<SizParameters>,
	cod: Option<CodParameters>,
	qcd: Option<QcdParameters>,
	cap: Option<CapParameters>,
	comments: Vec<String>,
	end_offset: u64,
	saw_eoc: bool,
}

fn ends_with_eoc(reader: &mut ValueReaderSlice<'_, BigEndian>, stream_len: u64) -> Result<bool> {
	let position = reader.position();
	reader
		.set_position(stream_len - 2)
		.map_err(|_| CodecError::truncated(position, "stream too short"))?;
	let tail = reader.read_u16()?;
	reader
		.set_position(position)
		.map_err(|_| CodecError::truncated(position, "stream too short"))?;
	Ok(tail == MARKER_EOC)
}

fn segment_length(reader: &mut ValueReaderSlice<'_, BigEndian>, offset: u64) -> Result<u64> {
	if reader.remaining() < 2 {
		return Err(CodecError::truncated(offset, "marker segment length cut short"));
	}
	let length = reader.read_u16()?;
	if length < 2 {
		return Err(CodecError::malformed(offset, format!("segment length {length} below 2")));
	}
	let payload = u64::from(length) - 2;
	if payload > reader.remaining() {
		return Err(CodecError::truncated(
			offset,
			format!("segment length {length} reaches past end of stream"),
		));
	}
	Ok(payload)
}

fn skip_segment(reader: &mut ValueReaderSlice<'_, BigEndian>, offset: u64) -> Result<()> {
	let payload = segment_length(reader, offset)?;
	reader.skip(payload).map_err(|_| CodecError::truncated(offset, "segment cut short"))
}

fn skip_unknown_segment(reader: &mut ValueReaderSlice<'_, BigEndian>, code: u16, offset: u64) -> Result<()> {
	if code < 0xFF00 {
		return Err(CodecError::malformed(offset, format!("expected marker, found 0x{code:04X}")));
	}
	if is_segmentless_code(code) {
		return Ok(());
	}
	skip_segment(reader, offset).map_err(|_| CodecError::UnknownMarker { code, offset })
}

fn parse_siz(reader: &mut ValueReaderSlice<'_, BigEndian>) -> Result<SizParameters> {
	let offset = reader.position() - 2;
	let payload = segment_length(reader, offset)?;
	if payload < 36 {
		return Err(CodecError::InvalidSiz(format!("SIZ payload {payload} too short")));
	}
	let rsiz = reader.read_u16()?;
	let volumetric = rsiz == RSIZ_VOLUMETRIC;

	let width = reader.read_u32()?;
	let height = reader.read_u32()?;
	let _x_origin = reader.read_u32()?;
	let _y_origin = reader.read_u32()?;
	let tile_width = reader.read_u32()?;
	let tile_height = reader.read_u32()?;
	let _tile_x_origin = reader.read_u32()?;
	let _tile_y_origin = reader.read_u32()?;

	let (depth, tile_depth) = if volumetric {
		let depth = reader.read_u32()?;
		let tile_depth = reader.read_u32()?;
		let _tile_z_origin = reader.read_u32()?;
		(depth, tile_depth)
	} else {
		(1, 1)
	};

	let component_count = reader.read_u16()?;
	let mut components = Vec::with_capacity(component_count as usize);
	for _ in 0..component_count {
		let ssiz = reader.read_u8()?;
		components.push(ComponentInfo {
			bit_depth: (ssiz & 0x7F) + 1,
			signed: ssiz & 0x80 != 0,
			dx: reader.read_u8()?,
			dy: reader.read_u8()?,
		});
	}

	let siz = SizParameters {
		width,
		height,
		depth,
		tile_width,
		tile_height,
		tile_depth,
		components,
	};
	siz.validate()?;
	Ok(siz)
}

fn parse_cod(reader: &mut ValueReaderSlice<'_, BigEndian>, offset: u64) -> Result<CodParameters> {
	let payload = segment_length(reader, offset)?;
	if payload < 10 {
		return Err(CodecError::malformed(offset, format!("COD payload {payload} too short")));
	}
	let scod = reader.read_u8()?;
	let progression_order = ProgressionOrder::from_u8(reader.read_u8()?)?;
	let quality_layers = reader.read_u16()?;
	let _mct = reader.read_u8()?;
	let decomposition_levels = reader.read_u8()?;
	let codeblock_width_exp = reader.read_u8()? + 2;
	let codeblock_height_exp = reader.read_u8()? + 2;
	let _codeblock_style = reader.read_u8()?;
	let reversible = reader.read_u8()? == 1;

	let mut precinct_sizes = Vec::new();
	let mut consumed = 10u64;
	if scod & 0x01 != 0 {
		for _ in 0..=decomposition_levels {
			if consumed >= payload {
				break;
			}
			precinct_sizes.push(reader.read_u8()?);
			consumed += 1;
		}
	}
	if consumed < payload {
		reader
			.skip(payload - consumed)
			.map_err(|_| CodecError::truncated(offset, "COD segment cut short"))?;
	}

	if quality_layers == 0 {
		return Err(CodecError::malformed(offset, "COD declares zero quality layers"));
	}

	Ok(CodParameters {
		progression_order,
		quality_layers,
		decomposition_levels,
		reversible,
		codeblock_width_exp,
		codeblock_height_exp,
		precinct_sizes,
	})
}

fn parse_qcd(reader: &mut ValueReaderSlice<'_, BigEndian>, offset: u64) -> Result<QcdParameters> {
	let payload = segment_length(reader, offset)?;
	if payload < 1 {
		return Err(CodecError::malformed(offset, "QCD payload empty"));
	}
	let sqcd = reader.read_u8()?;
	let style = sqcd & 0x1F;
	let guard_bits = sqcd >> 5;
	let wide_steps = style != 0;
	let entry_len: u64 = if wide_steps { 2 } else { 1 };

	let mut step_sizes = Vec::new();
	let mut remaining = payload - 1;
	while remaining >= entry_len {
		let step = if wide_steps {
			reader.read_u16()?
		} else {
			u16::from(reader.read_u8()?) << 8
		};
		step_sizes.push(step);
		remaining -= entry_len;
	}
	if remaining > 0 {
		reader
			.skip(remaining)
			.map_err(|_| CodecError::truncated(offset, "QCD segment cut short"))?;
	}

	Ok(QcdParameters {
		style,
		guard_bits,
		step_sizes,
	})
}

fn parse_cap(reader: &mut ValueReaderSlice<'_, BigEndian>, offset: u64) -> Result<CapParameters> {
	let payload = segment_length(reader, offset)?;
	if payload < 4 {
		return Err(CodecError::malformed(offset, format!("CAP payload {payload} too short")));
	}
	let pcap = reader.read_u32()?;
	let mut ccap = Vec::new();
	let mut remaining = payload - 4;
	while remaining >= 2 {
		ccap.push(reader.read_u16()?);
		remaining -= 2;
	}
	if remaining > 0 {
		reader
			.skip(remaining)
			.map_err(|_| CodecError::truncated(offset, "CAP segment cut short"))?;
	}
	Ok(CapParameters { pcap, ccap })
}

fn parse_com(reader: &mut ValueReaderSlice<'_, BigEndian>, offset: u64) -> Result<String> {
	let payload = segment_length(reader, offset)?;
	if payload < 2 {
		return Err(CodecError::malformed(offset, "COM payload too short"));
	}
	let _registration = reader.read_u16()?;
	let text = reader
		.read_blob(payload - 2)
		.map_err(|_| CodecError::truncated(offset, "COM segment cut short"))?;
	Ok(text.as_str().into_owned())
}
