//! Two-byte marker codes framing a codestream.
//!
//! Markers are written big-endian. SOC, SOD and EOC stand alone; all other
//! markers are followed by a u16 segment length that counts itself plus the
//! payload.

use std::fmt;

pub const MARKER_SOC: u16 = 0xFF4F;
pub const MARKER_CAP: u16 = 0xFF50;
pub const MARKER_SIZ: u16 = 0xFF51;
pub const MARKER_COD: u16 = 0xFF52;
pub const MARKER_QCD: u16 = 0xFF5C;
pub const MARKER_COM: u16 = 0xFF64;
pub const MARKER_SOT: u16 = 0xFF90;
pub const MARKER_SOD: u16 = 0xFF93;
pub const MARKER_EOC: u16 = 0xFFD9;

/// The markers this codec reads and writes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Marker {
	/// Start of codestream.
	Soc,
	/// Capability (HTJ2K and other extended parts).
	Cap,
	/// Image and tile size.
	Siz,
	/// Coding style default.
	Cod,
	/// Quantization default.
	Qcd,
	/// Comment.
	Com,
	/// Start of tile-part.
	Sot,
	/// Start of data.
	Sod,
	/// End of codestream.
	Eoc,
}

impl Marker {
	#[must_use]
	pub fn code(self) -> u16 {
		match self {
			Marker::Soc => MARKER_SOC,
			Marker::Cap => MARKER_CAP,
			Marker::Siz => MARKER_SIZ,
			Marker::Cod => MARKER_COD,
			Marker::Qcd => MARKER_QCD,
			Marker::Com => MARKER_COM,
			Marker::Sot => MARKER_SOT,
			Marker::Sod => MARKER_SOD,
			Marker::Eoc => MARKER_EOC,
		}
	}

	#[must_use]
	pub fn from_code(code: u16) -> Option<Marker> {
		Some(match code {
			MARKER_SOC => Marker::Soc,
			MARKER_CAP => Marker::Cap,
			MARKER_SIZ => Marker::Siz,
			MARKER_COD => Marker::Cod,
			MARKER_QCD => Marker::Qcd,
			MARKER_COM => Marker::Com,
			MARKER_SOT => Marker::Sot,
			MARKER_SOD => Marker::Sod,
			MARKER_EOC => Marker::Eoc,
			_ => return None,
		})
	}

	/// Markers that carry no length-prefixed segment.
	#[must_use]
	pub fn is_segmentless(self) -> bool {
		matches!(self, Marker::Soc | Marker::Sod | Marker::Eoc)
	}
}

/// Returns `true` for unknown marker codes that carry no segment.
///
/// The range FF30..=FF3F is reserved for segmentless markers; everything else
/// outside the known set is assumed to be length-prefixed.
#[must_use]
pub fn is_segmentless_code(code: u16) -> bool {
	(0xFF30..=0xFF3F).contains(&code)
		|| Marker::from_code(code).is_some_and(Marker::is_segmentless)
}

impl fmt::Display for Marker {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Marker::Soc => "SOC",
			Marker::Cap => "CAP",
			Marker::Siz => "SIZ",
			Marker::Cod => "COD",
			Marker::Qcd => "QCD",
			Marker::Com => "COM",
			Marker::Sot => "SOT",
			Marker::Sod => "SOD",
			Marker::Eoc => "EOC",
		};
		f.write_str(name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn codes_roundtrip() {
		for marker in [
			Marker::Soc,
			Marker::Cap,
			Marker::Siz,
			Marker::Cod,
			Marker::Qcd,
			Marker::Com,
			Marker::Sot,
			Marker::Sod,
			Marker::Eoc,
		] {
			assert_eq!(Marker::from_code(marker.code()), Some(marker));
		}
		assert_eq!(Marker::from_code(0xFF99), None);
	}

	#[test]
	fn segmentless_set() {
		assert!(Marker::Soc.is_segmentless());
		assert!(Marker::Sod.is_segmentless());
		assert!(Marker::Eoc.is_segmentless());
		assert!(!Marker::Siz.is_segmentless());
		assert!(is_segmentless_code(0xFF35));
		assert!(!is_segmentless_code(0xFF64));
	}

	#[test]
	fn display_names() {
		assert_eq!(Marker::Soc.to_string(), "SOC");
		assert_eq!(Marker::Eoc.to_string(), "EOC");
	}
}
