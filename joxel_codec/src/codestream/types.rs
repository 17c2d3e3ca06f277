//! Structured models of the main-header marker segments.

use crate::error::{CodecError, Result};
use joxel_core::ByteRange;

/// Pcap bit announcing an HTJ2K (Part 15) codestream.
pub const PCAP_HTJ2K: u32 = 1 << 17;

/// Rsiz profile tag this implementation writes for volumetric codestreams.
///
/// Volumetric SIZ segments append three u32 fields (depth, tile depth, tile
/// depth origin) after the planar tile origin fields; the parser branches on
/// this tag.
pub const RSIZ_VOLUMETRIC: u16 = 0x000A;

/// Per-component precision and subsampling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ComponentInfo {
	pub bit_depth: u8,
	pub signed: bool,
	pub dx: u8,
	pub dy: u8,
}

impl ComponentInfo {
	#[must_use]
	pub fn new(bit_depth: u8, signed: bool) -> Self {
		Self {
			bit_depth,
			signed,
			dx: 1,
			dy: 1,
		}
	}
}

/// Image and tile geometry from the SIZ segment.
///
/// A planar image has `depth == 1` and `tile_depth == 1`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SizParameters {
	pub width: u32,
	pub height: u32,
	pub depth: u32,
	pub tile_width: u32,
	pub tile_height: u32,
	pub tile_depth: u32,
	pub components: Vec<ComponentInfo>,
}

impl SizParameters {
	/// Creates planar geometry with identical components.
	#[must_use]
	pub fn new_2d(width: u32, height: u32, tile_width: u32, tile_height: u32, component: ComponentInfo, count: u16) -> Self {
		Self {
			width,
			height,
			depth: 1,
			tile_width,
			tile_height,
			tile_depth: 1,
			components: vec![component; count as usize],
		}
	}

	/// Creates volumetric geometry with identical components.
	#[must_use]
	pub fn new_3d(
		size: (u32, u32, u32),
		tile_size: (u32, u32, u32),
		component: ComponentInfo,
		count: u16,
	) -> Self {
		Self {
			width: size.0,
			height: size.1,
			depth: size.2,
			tile_width: tile_size.0,
			tile_height: tile_size.1,
			tile_depth: tile_size.2,
			components: vec![component; count as usize],
		}
	}

	#[must_use]
	pub fn is_volumetric(&self) -> bool {
		self.depth > 1
	}

	#[must_use]
	pub fn component_count(&self) -> u16 {
		self.components.len() as u16
	}

	/// Validates the geometry against the constraints of the codestream
	/// syntax.
	pub fn validate(&self) -> Result<()> {
		if self.width == 0 || self.height == 0 || self.depth == 0 {
			return Err(CodecError::InvalidSiz(format!(
				"image extent must be nonzero, got {}x{}x{}",
				self.width, self.height, self.depth
			)));
		}
		if self.tile_width == 0 || self.tile_height == 0 || self.tile_depth == 0 {
			return Err(CodecError::InvalidSiz("tile extent must be nonzero".to_string()));
		}
		if self.components.is_empty() {
			return Err(CodecError::InvalidSiz("at least one component required".to_string()));
		}
		for (index, component) in self.components.iter().enumerate() {
			if component.bit_depth == 0 || component.bit_depth > 38 {
				return Err(CodecError::InvalidSiz(format!(
					"component {index} bit depth {} outside 1..=38",
					component.bit_depth
				)));
			}
			if component.dx == 0 || component.dy == 0 {
				return Err(CodecError::InvalidSiz(format!("component {index} subsampling must be nonzero")));
			}
		}
		Ok(())
	}
}

/// Progression orders for packet emission.
///
/// The trailing `S` variants are volumetric; the slice axis iterates innermost
/// of the spatial dimensions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProgressionOrder {
	#[default]
	Lrcp,
	Rlcp,
	Rpcl,
	Pcrl,
	Cprl,
	Lrcps,
	Rlcps,
	Rpcls,
}

impl ProgressionOrder {
	#[must_use]
	pub fn as_u8(self) -> u8 {
		match self {
			ProgressionOrder::Lrcp => 0,
			ProgressionOrder::Rlcp => 1,
			ProgressionOrder::Rpcl => 2,
			ProgressionOrder::Pcrl => 3,
			ProgressionOrder::Cprl => 4,
			ProgressionOrder::Lrcps => 5,
			ProgressionOrder::Rlcps => 6,
			ProgressionOrder::Rpcls => 7,
		}
	}

	pub fn from_u8(value: u8) -> Result<Self> {
		Ok(match value {
			0 => ProgressionOrder::Lrcp,
			1 => ProgressionOrder::Rlcp,
			2 => ProgressionOrder::Rpcl,
			3 => ProgressionOrder::Pcrl,
			4 => ProgressionOrder::Cprl,
			5 => ProgressionOrder::Lrcps,
			6 => ProgressionOrder::Rlcps,
			7 => ProgressionOrder::Rpcls,
			_ => {
				return Err(CodecError::InvalidConfiguration(format!(
					"unknown progression order {value}"
				)));
			}
		})
	}
}

/// Coding style from the COD segment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CodParameters {
	pub progression_order: ProgressionOrder,
	pub quality_layers: u16,
	pub decomposition_levels: u8,
	/// `true` selects the reversible 5/3 transform, `false` the 9/7.
	pub reversible: bool,
	pub codeblock_width_exp: u8,
	pub codeblock_height_exp: u8,
	pub precinct_sizes: Vec<u8>,
}

impl Default for CodParameters {
	fn default() -> Self {
		Self {
			progression_order: ProgressionOrder::Lrcp,
			quality_layers: 1,
			decomposition_levels: 1,
			reversible: true,
			codeblock_width_exp: 6,
			codeblock_height_exp: 6,
			precinct_sizes: Vec::new(),
		}
	}
}

/// Quantization style from the QCD segment.
#[derive(Clone, Debug, PartialEq)]
pub struct QcdParameters {
	/// Sqcd style byte: 0 = no quantization (reversible), 2 = scalar expounded.
	pub style: u8,
	pub guard_bits: u8,
	pub step_sizes: Vec<u16>,
}

impl QcdParameters {
	/// Reversible quantization (no step sizes, two guard bits).
	#[must_use]
	pub fn reversible(subbands: usize) -> Self {
		Self {
			style: 0,
			guard_bits: 2,
			step_sizes: vec![0x0800; subbands],
		}
	}

	#[must_use]
	pub fn is_reversible(&self) -> bool {
		self.style & 0x1F == 0
	}
}

/// Capability announcement from the CAP segment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CapParameters {
	pub pcap: u32,
	pub ccap: Vec<u16>,
}

impl CapParameters {
	/// CAP segment announcing HTJ2K code-blocks.
	#[must_use]
	pub fn htj2k() -> Self {
		Self {
			pcap: PCAP_HTJ2K,
			ccap: vec![0],
		}
	}

	#[must_use]
	pub fn is_htj2k(&self) -> bool {
		self.pcap & PCAP_HTJ2K != 0
	}
}

/// One parsed tile-part.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TilePart {
	pub index: u16,
	pub tpsot: u8,
	pub tnsot: u8,
	/// SOT marker through SOD marker, inclusive.
	pub header_range: ByteRange,
	/// The tile body following SOD.
	pub body_range: ByteRange,
}

/// A parsed codestream: structured main header plus tile-part layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Codestream {
	pub siz: SizParameters,
	pub cod: CodParameters,
	pub qcd: QcdParameters,
	pub cap: Option<CapParameters>,
	pub comments: Vec<String>,
	pub tiles: Vec<TilePart>,
	/// Offset of the first SOT marker; the main header ends here.
	pub main_header_end: u64,
	pub is_htj2k: bool,
	/// Set in tolerant mode when the stream ended before all tiles were read.
	pub is_partial: bool,
	pub warnings: Vec<String>,
}
