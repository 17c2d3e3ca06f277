//! Structural conformance checks for the file-format and codestream parts.
//!
//! All checks are pure: they collect findings into a [`ValidationReport`]
//! instead of failing on the first problem.

use crate::codestream::{Codestream, SizParameters};

/// JP2-family signature box, bit exact.
pub const JP2_SIGNATURE: [u8; 12] = [
	0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

const FTYP_BRANDS: [&[u8; 4]; 3] = [b"jp2 ", b"mjp2", b"jpx "];

/// The outcome of a validation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
	pub is_valid: bool,
	pub errors: Vec<String>,
	pub warnings: Vec<String>,
}

impl ValidationReport {
	fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
		Self {
			is_valid: errors.is_empty(),
			errors,
			warnings,
		}
	}
}

/// Validates the 12-byte signature box and the ftyp brand of a JP2/JPX/MJ2
/// file head.
#[must_use]
pub fn validate_signature(bytes: &[u8]) -> ValidationReport {
	let mut errors = Vec::new();
	let mut warnings = Vec::new();

	if bytes.len() < JP2_SIGNATURE.len() {
		errors.push(format!("file head too short: {} bytes", bytes.len()));
		return ValidationReport::from_findings(errors, warnings);
	}
	if bytes[..12] != JP2_SIGNATURE {
		errors.push("signature box mismatch".to_string());
	}

	// ftyp box: u32 length, 'ftyp', then the major brand.
	if bytes.len() < 24 {
		errors.push("missing ftyp box".to_string());
	} else {
		if &bytes[16..20] != b"ftyp" {
			errors.push("second box is not ftyp".to_string());
		}
		let brand = &bytes[20..24];
		if !FTYP_BRANDS.iter().any(|known| brand == known.as_slice()) {
			errors.push(format!("unknown ftyp brand {:?}", String::from_utf8_lossy(brand)));
		}
		let length = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
		if length < 16 {
			warnings.push(format!("ftyp box length {length} suspiciously short"));
		}
	}

	ValidationReport::from_findings(errors, warnings)
}

/// Extended coding parameters subject to the Part 2 bounds.
#[derive(Clone, Debug, Default)]
pub struct Part2Extensions {
	/// Component count when a multiple-component transform is declared.
	pub mct_components: Option<u16>,
	/// Non-linearity type.
	pub nlt_type: Option<u8>,
	/// Step count of trellis-coded quantization.
	pub tcq_step_count: Option<u16>,
	/// Region-of-interest upshift.
	pub roi_shift: Option<u8>,
	/// Tap count and symmetry of an arbitrary wavelet kernel.
	pub wavelet: Option<(u16, bool)>,
	/// Declared DC offset together with the component depth and signedness.
	pub dc_offset: Option<(i64, u8, bool)>,
}

/// Validates Part 2 extension parameters.
#[must_use]
pub fn validate_part2_extensions(extensions: &Part2Extensions) -> ValidationReport {
	let mut errors = Vec::new();

	if let Some(components) = extensions.mct_components {
		if components < 2 {
			errors.push(format!("multiple-component transform needs at least 2 components, got {components}"));
		}
	}
	if let Some(nlt_type) = extensions.nlt_type {
		if nlt_type > 2 {
			errors.push(format!("non-linearity type {nlt_type} outside 0..=2"));
		}
	}
	if let Some(steps) = extensions.tcq_step_count {
		if steps < 1 {
			errors.push("trellis quantization needs at least one step".to_string());
		}
	}
	if let Some(shift) = extensions.roi_shift {
		if shift > 37 {
			errors.push(format!("ROI shift {shift} outside 0..=37"));
		}
	}
	if let Some((taps, symmetric)) = extensions.wavelet {
		if taps < 2 {
			errors.push(format!("wavelet kernel needs at least 2 taps, got {taps}"));
		} else if symmetric && taps % 2 == 0 {
			errors.push(format!("symmetric wavelet kernel needs an odd tap count, got {taps}"));
		}
	}
	if let Some((offset, bit_depth, signed)) = extensions.dc_offset {
		let (low, high) = if signed {
			(-(1i64 << (bit_depth - 1)), (1i64 << (bit_depth - 1)) - 1)
		} else {
			(0, (1i64 << bit_depth) - 1)
		};
		if offset < low || offset > high {
			errors.push(format!("DC offset {offset} outside [{low}, {high}] for {bit_depth}-bit samples"));
		}
	}

	ValidationReport::from_findings(errors, Vec::new())
}

/// Validates volumetric geometry bounds.
#[must_use]
pub fn validate_part10(siz: &SizParameters, z_levels: u8) -> ValidationReport {
	let mut errors = Vec::new();

	if siz.width < 1 || siz.height < 1 || siz.depth < 1 {
		errors.push(format!("volume extent {}x{}x{} must be at least 1 per axis", siz.width, siz.height, siz.depth));
	}
	if siz.depth >= 1 {
		let max_z_levels = 64 - u64::from(siz.depth).leading_zeros() as u8; // floor(log2(depth)) + 1
		if z_levels > max_z_levels {
			errors.push(format!(
				"{z_levels} axial decomposition levels exceed limit {max_z_levels} for depth {}",
				siz.depth
			));
		}
	}
	if siz.tile_width > siz.width || siz.tile_height > siz.height || siz.tile_depth > siz.depth {
		errors.push("tile extent exceeds volume extent".to_string());
	}

	ValidationReport::from_findings(errors, Vec::new())
}

/// Validates the high-throughput profile of a parsed codestream.
#[must_use]
pub fn validate_part15(codestream: &Codestream, stream_len: u64) -> ValidationReport {
	let mut errors = Vec::new();
	let mut warnings = Vec::new();

	if !codestream.is_htj2k {
		errors.push("no CAP marker with the high-throughput bit set".to_string());
	}
	for tile_part in &codestream.tiles {
		if tile_part.body_range.end() > stream_len {
			errors.push(format!("tile {} body reaches past end of stream", tile_part.index));
		}
	}
	if codestream.is_partial {
		warnings.push("codestream parsed as partial".to_string());
	}

	ValidationReport::from_findings(errors, warnings)
}

/// Conformance classes of decoded test vectors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConformanceClass {
	/// Lossless: reconstruction must be bit exact.
	Class0,
	/// Lossy: a peak signal-to-noise ratio must be reported.
	Class1,
}

/// One decoded test vector to be judged.
#[derive(Clone, Debug)]
pub struct ConformanceVector {
	pub name: String,
	pub class: ConformanceClass,
	pub mse: Option<f64>,
	pub psnr: Option<f64>,
}

/// Aggregates Class-0 and Class-1 results over a vector list.
#[must_use]
pub fn validate_part4(vectors: &[ConformanceVector]) -> ValidationReport {
	let mut errors = Vec::new();
	let mut warnings = Vec::new();

	if vectors.is_empty() {
		warnings.push("no test vectors supplied".to_string());
	}
	for vector in vectors {
		match vector.class {
			ConformanceClass::Class0 => match vector.mse {
				Some(mse) if mse == 0.0 => {}
				Some(mse) => errors.push(format!("{}: lossless reconstruction has MSE {mse}", vector.name)),
				None => errors.push(format!("{}: lossless vector reports no MSE", vector.name)),
			},
			ConformanceClass::Class1 => {
				if vector.psnr.is_none() {
					errors.push(format!("{}: lossy vector reports no PSNR", vector.name));
				}
			}
		}
	}

	ValidationReport::from_findings(errors, warnings)
}
