//! Separable discrete wavelet transform for planar and volumetric data.
//!
//! The reversible 5/3 filter operates on `i32` samples, the irreversible 9/7
//! on `f32`. A forward transform applies the three axis passes in fixed order
//! (rows, columns, slices) per level and peels subbands off the in-place
//! Mallat layout; decomposition of an `(w, h, d)` volume over `n` levels
//! yields `3n + 1` subbands (planar) or `7n + 1` (volumetric).

mod lifting;

use crate::error::{CodecError, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Sample types the transform operates on.
///
/// The filter is tied to the sample type: integers use the reversible 5/3
/// lifting, floats the irreversible 9/7.
pub trait DwtSample: Copy + Default {
	fn forward_line(line: &mut [Self]);
	fn inverse_line(line: &mut [Self]);
}

impl DwtSample for i32 {
	fn forward_line(line: &mut [Self]) {
		lifting::forward_53(line);
	}

	fn inverse_line(line: &mut [Self]) {
		lifting::inverse_53(line);
	}
}

impl DwtSample for f32 {
	fn forward_line(line: &mut [Self]) {
		lifting::forward_97(line);
	}

	fn inverse_line(line: &mut [Self]) {
		lifting::inverse_97(line);
	}
}

/// Subband orientation as one low/high bit per axis (x, y, z).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Orientation {
	pub high_x: bool,
	pub high_y: bool,
	pub high_z: bool,
}

impl Orientation {
	pub const LL: Orientation = Orientation::new(false, false, false);
	pub const HL: Orientation = Orientation::new(true, false, false);
	pub const LH: Orientation = Orientation::new(false, true, false);
	pub const HH: Orientation = Orientation::new(true, true, false);

	#[must_use]
	pub const fn new(high_x: bool, high_y: bool, high_z: bool) -> Self {
		Self { high_x, high_y, high_z }
	}

	/// `true` for the all-low orientation (LL / LLL).
	#[must_use]
	pub fn is_approximation(self) -> bool {
		!self.high_x && !self.high_y && !self.high_z
	}

	/// All detail orientations for a level, x axis varying fastest.
	fn details(volumetric: bool) -> Vec<Orientation> {
		let mut orientations = Vec::new();
		let z_bits = if volumetric { 2 } else { 1 };
		for bz in 0..z_bits {
			for by in 0..2 {
				for bx in 0..2 {
					if bx == 0 && by == 0 && bz == 0 {
						continue;
					}
					orientations.push(Orientation::new(bx == 1, by == 1, bz == 1));
				}
			}
		}
		orientations
	}

	#[must_use]
	pub fn label(self) -> &'static str {
		match (self.high_x, self.high_y, self.high_z) {
			(false, false, false) => "LL",
			(true, false, false) => "HL",
			(false, true, false) => "LH",
			(true, true, false) => "HH",
			(false, false, true) => "LLH",
			(true, false, true) => "HLH",
			(false, true, true) => "LHH",
			(true, true, true) => "HHH",
		}
	}
}

/// Identifies a subband by decomposition level and orientation.
///
/// Level `n` (the configured level count) is the coarsest; the approximation
/// lives there with the all-low orientation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubbandId {
	pub level: u8,
	pub orientation: Orientation,
}

/// One subband of a decomposition.
#[derive(Clone, Debug, PartialEq)]
pub struct Subband<S> {
	pub id: SubbandId,
	pub width: u32,
	pub height: u32,
	pub depth: u32,
	pub samples: Vec<S>,
}

/// The result of a forward transform.
///
/// Subbands are stored approximation first, then detail levels from coarsest
/// to finest.
#[derive(Clone, Debug, PartialEq)]
pub struct Decomposition<S> {
	shape: (u32, u32, u32),
	levels: u8,
	volumetric: bool,
	subbands: Vec<Subband<S>>,
}

impl<S: DwtSample> Decomposition<S> {
	/// Reassembles a decomposition from externally stored subbands.
	///
	/// The all-low subband at the coarsest level must be present; missing
	/// detail subbands reconstruct as zero.
	pub fn from_subbands(shape: (u32, u32, u32), levels: u8, subbands: Vec<Subband<S>>) -> Result<Self> {
		let volumetric = shape.2 > 1;
		let has_approximation = subbands
			.iter()
			.any(|subband| subband.id.level == levels && subband.id.orientation.is_approximation());
		if !has_approximation {
			return Err(CodecError::InvalidConfiguration(
				"decomposition lacks its approximation subband".to_string(),
			));
		}
		let mut ordered = subbands;
		ordered.sort_by_key(|subband| !subband.id.orientation.is_approximation());
		Ok(Self {
			shape,
			levels,
			volumetric,
			subbands: ordered,
		})
	}

	#[must_use]
	pub fn shape(&self) -> (u32, u32, u32) {
		self.shape
	}

	#[must_use]
	pub fn levels(&self) -> u8 {
		self.levels
	}

	#[must_use]
	pub fn subband_count(&self) -> usize {
		self.subbands.len()
	}

	/// The coarsest all-low subband.
	#[must_use]
	pub fn approximation(&self) -> &Subband<S> {
		&self.subbands[0]
	}

	#[must_use]
	pub fn subband(&self, id: SubbandId) -> Option<&Subband<S>> {
		self.subbands.iter().find(|subband| subband.id == id)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Subband<S>> {
		self.subbands.iter()
	}
}

/// Per-level dimensions: `dims[0]` is the input shape, `dims[l]` the low-pass
/// extent after `l` splits.
fn level_dims(shape: (u32, u32, u32), levels: u8, volumetric: bool) -> Vec<(u32, u32, u32)> {
	let mut dims = vec![shape];
	for _ in 0..levels {
		let (w, h, d) = *dims.last().expect("dims never empty");
		dims.push((w.div_ceil(2), h.div_ceil(2), if volumetric { d.div_ceil(2) } else { d }));
	}
	dims
}

#[derive(Clone, Copy)]
enum Axis {
	X,
	Y,
	Z,
}

/// Applies the forward or inverse 1-D transform to every line of `region`
/// along `axis`, splitting (forward) or merging (inverse) the low and high
/// halves in place.
fn transform_axis<S: DwtSample>(
	buf: &mut [S],
	full: (u32, u32, u32),
	region: (u32, u32, u32),
	axis: Axis,
	forward: bool,
) {
	let (fw, fh) = (full.0 as usize, full.1 as usize);
	let (rw, rh, rd) = (region.0 as usize, region.1 as usize, region.2 as usize);
	let (line_len, stride, outer_a, outer_b, plane): (usize, usize, usize, usize, usize) = match axis {
		Axis::X => (rw, 1, rh, rd, fw),
		Axis::Y => (rh, fw, rw, rd, 1),
		Axis::Z => (rd, fw * fh, rw, rh, 1),
	};
	if line_len < 2 {
		return;
	}
	let low_len = line_len.div_ceil(2);
	let mut scratch = vec![S::default(); line_len];

	for b in 0..outer_b {
		for a in 0..outer_a {
			let base = match axis {
				Axis::X => b * fw * fh + a * plane,
				Axis::Y => b * fw * fh + a,
				Axis::Z => b * fw + a,
			};
			if forward {
				for (i, slot) in scratch.iter_mut().enumerate() {
					*slot = buf[base + i * stride];
				}
				S::forward_line(&mut scratch);
				for i in 0..line_len {
					let target = if i % 2 == 0 { i / 2 } else { low_len + i / 2 };
					buf[base + target * stride] = scratch[i];
				}
			} else {
				for i in 0..line_len {
					let source = if i % 2 == 0 { i / 2 } else { low_len + i / 2 };
					scratch[i] = buf[base + source * stride];
				}
				S::inverse_line(&mut scratch);
				for (i, value) in scratch.iter().enumerate() {
					buf[base + i * stride] = *value;
				}
			}
		}
	}
}

/// Copies the octant selected by `orientation` between the Mallat buffer and a
/// dense subband buffer.
fn copy_octant<S: DwtSample>(
	buf: &mut [S],
	full: (u32, u32, u32),
	region: (u32, u32, u32),
	low: (u32, u32, u32),
	orientation: Orientation,
	subband: &mut [S],
	extract: bool,
) {
	let (fw, fh) = (full.0 as usize, full.1 as usize);
	let (ox, sx) = if orientation.high_x {
		(low.0 as usize, (region.0 - low.0) as usize)
	} else {
		(0, low.0 as usize)
	};
	let (oy, sy) = if orientation.high_y {
		(low.1 as usize, (region.1 - low.1) as usize)
	} else {
		(0, low.1 as usize)
	};
	let (oz, sz) = if orientation.high_z {
		(low.2 as usize, (region.2 - low.2) as usize)
	} else {
		(0, low.2 as usize)
	};

	for z in 0..sz {
		for y in 0..sy {
			for x in 0..sx {
				let buf_index = (oz + z) * fw * fh + (oy + y) * fw + (ox + x);
				let sub_index = z * sx * sy + y * sx + x;
				if extract {
					subband[sub_index] = buf[buf_index];
				} else {
					buf[buf_index] = subband[sub_index];
				}
			}
		}
	}
}

fn octant_extent(region: (u32, u32, u32), low: (u32, u32, u32), orientation: Orientation) -> (u32, u32, u32) {
	(
		if orientation.high_x { region.0 - low.0 } else { low.0 },
		if orientation.high_y { region.1 - low.1 } else { low.1 },
		if orientation.high_z { region.2 - low.2 } else { low.2 },
	)
}

/// Forward and inverse transform entry points, with transform statistics.
#[derive(Debug, Default)]
pub struct DwtEngine {
	forward_count: AtomicU64,
}

impl DwtEngine {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of forward transforms performed since construction or the last
	/// [`DwtEngine::reset_statistics`].
	#[must_use]
	pub fn forward_transform_count(&self) -> u64 {
		self.forward_count.load(Ordering::Relaxed)
	}

	pub fn reset_statistics(&self) {
		self.forward_count.store(0, Ordering::Relaxed);
	}

	/// Decomposes `samples` of the given `shape` over `levels` levels.
	pub fn forward<S: DwtSample>(&self, samples: &[S], shape: (u32, u32, u32), levels: u8) -> Result<Decomposition<S>> {
		let (w, h, d) = shape;
		let expected = w as usize * h as usize * d as usize;
		if samples.len() != expected {
			return Err(CodecError::InvalidConfiguration(format!(
				"sample count {} does not match shape {w}x{h}x{d}",
				samples.len()
			)));
		}
		if expected == 0 {
			return Err(CodecError::InvalidConfiguration("empty shape".to_string()));
		}
		let volumetric = d > 1;
		let min_extent = 1u32 << levels;
		if w < min_extent || h < min_extent || (volumetric && d < min_extent) {
			return Err(CodecError::InvalidConfiguration(format!(
				"shape {w}x{h}x{d} too small for {levels} levels"
			)));
		}

		self.forward_count.fetch_add(1, Ordering::Relaxed);

		let dims = level_dims(shape, levels, volumetric);
		let mut buf = samples.to_vec();
		let mut details_per_level: Vec<Vec<Subband<S>>> = Vec::new();

		for level in 1..=u32::from(levels) {
			let region = dims[level as usize - 1];
			let low = dims[level as usize];

			transform_axis(&mut buf, shape, region, Axis::X, true);
			transform_axis(&mut buf, shape, region, Axis::Y, true);
			if volumetric {
				transform_axis(&mut buf, shape, region, Axis::Z, true);
			}

			let mut details = Vec::new();
			for orientation in Orientation::details(volumetric) {
				let extent = octant_extent(region, low, orientation);
				let mut samples = vec![S::default(); extent.0 as usize * extent.1 as usize * extent.2 as usize];
				copy_octant(&mut buf, shape, region, low, orientation, &mut samples, true);
				details.push(Subband {
					id: SubbandId {
						level: level as u8,
						orientation,
					},
					width: extent.0,
					height: extent.1,
					depth: extent.2,
					samples,
				});
			}
			details_per_level.push(details);
		}

		let approx_extent = dims[levels as usize];
		let mut approx_samples =
			vec![S::default(); approx_extent.0 as usize * approx_extent.1 as usize * approx_extent.2 as usize];
		copy_octant(
			&mut buf,
			shape,
			approx_extent,
			approx_extent,
			Orientation::LL,
			&mut approx_samples,
			true,
		);

		let mut subbands = vec![Subband {
			id: SubbandId {
				level: levels,
				orientation: Orientation::LL,
			},
			width: approx_extent.0,
			height: approx_extent.1,
			depth: approx_extent.2,
			samples: approx_samples,
		}];
		for details in details_per_level.into_iter().rev() {
			subbands.extend(details);
		}

		Ok(Decomposition {
			shape,
			levels,
			volumetric,
			subbands,
		})
	}

	/// Reconstructs the original samples from a decomposition.
	pub fn inverse<S: DwtSample>(&self, decomposition: &Decomposition<S>) -> Vec<S> {
		let shape = decomposition.shape;
		let (w, h, d) = shape;
		let levels = decomposition.levels;
		let volumetric = decomposition.volumetric;
		let dims = level_dims(shape, levels, volumetric);

		let mut buf = vec![S::default(); w as usize * h as usize * d as usize];

		let approx = decomposition.approximation();
		let approx_extent = dims[levels as usize];
		let mut approx_samples = approx.samples.clone();
		copy_octant(
			&mut buf,
			shape,
			approx_extent,
			approx_extent,
			Orientation::LL,
			&mut approx_samples,
			false,
		);

		for level in (1..=u32::from(levels)).rev() {
			let region = dims[level as usize - 1];
			let low = dims[level as usize];

			for orientation in Orientation::details(volumetric) {
				let id = SubbandId {
					level: level as u8,
					orientation,
				};
				if let Some(subband) = decomposition.subband(id) {
					let mut samples = subband.samples.clone();
					copy_octant(&mut buf, shape, region, low, orientation, &mut samples, false);
				}
			}

			if volumetric {
				transform_axis(&mut buf, shape, region, Axis::Z, false);
			}
			transform_axis(&mut buf, shape, region, Axis::Y, false);
			transform_axis(&mut buf, shape, region, Axis::X, false);
		}

		buf
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn gradient(shape: (u32, u32, u32)) -> Vec<i32> {
		let (w, h, d) = shape;
		(0..w * h * d).map(|i| (i as i32 * 7) % 255 - 128).collect()
	}

	#[test]
	fn subband_counts() {
		let engine = DwtEngine::new();
		let planar = engine.forward(&gradient((16, 16, 1)), (16, 16, 1), 3).unwrap();
		assert_eq!(planar.subband_count(), 3 * 3 + 1);

		let volume = engine.forward(&gradient((8, 8, 8)), (8, 8, 8), 2).unwrap();
		assert_eq!(volume.subband_count(), 7 * 2 + 1);
	}

	#[test]
	fn approximation_is_coarsest() {
		let engine = DwtEngine::new();
		let decomposition = engine.forward(&gradient((16, 16, 1)), (16, 16, 1), 2).unwrap();
		let approx = decomposition.approximation();
		assert_eq!(approx.id.level, 2);
		assert!(approx.id.orientation.is_approximation());
		assert_eq!((approx.width, approx.height), (4, 4));
	}

	#[test]
	fn roundtrip_2d() {
		let engine = DwtEngine::new();
		let samples = gradient((16, 12, 1));
		let decomposition = engine.forward(&samples, (16, 12, 1), 2).unwrap();
		assert_eq!(engine.inverse(&decomposition), samples);
	}

	#[test]
	fn roundtrip_2d_odd_extent() {
		let engine = DwtEngine::new();
		let samples = gradient((13, 9, 1));
		let decomposition = engine.forward(&samples, (13, 9, 1), 2).unwrap();
		assert_eq!(engine.inverse(&decomposition), samples);
	}

	#[test]
	fn roundtrip_3d() {
		let engine = DwtEngine::new();
		let samples = gradient((8, 8, 4));
		let decomposition = engine.forward(&samples, (8, 8, 4), 2).unwrap();
		assert_eq!(engine.inverse(&decomposition), samples);
	}

	#[test]
	fn roundtrip_irreversible() {
		let engine = DwtEngine::new();
		let samples: Vec<f32> = gradient((16, 16, 1)).iter().map(|&v| v as f32).collect();
		let decomposition = engine.forward(&samples, (16, 16, 1), 3).unwrap();
		let restored = engine.inverse(&decomposition);
		for (a, b) in restored.iter().zip(samples.iter()) {
			assert!((a - b).abs() < 1e-3, "{a} vs {b}");
		}
	}

	#[test]
	fn shape_too_small_for_levels() {
		let engine = DwtEngine::new();
		let samples = gradient((4, 4, 1));
		assert!(matches!(
			engine.forward(&samples, (4, 4, 1), 3),
			Err(CodecError::InvalidConfiguration(_))
		));
	}

	#[test]
	fn sample_count_mismatch() {
		let engine = DwtEngine::new();
		assert!(matches!(
			engine.forward(&[0i32; 10], (4, 4, 1), 1),
			Err(CodecError::InvalidConfiguration(_))
		));
	}

	#[test]
	fn statistics_count_and_reset() {
		let engine = DwtEngine::new();
		let samples = gradient((8, 8, 1));
		engine.forward(&samples, (8, 8, 1), 1).unwrap();
		engine.forward(&samples, (8, 8, 1), 2).unwrap();
		assert_eq!(engine.forward_transform_count(), 2);
		engine.reset_statistics();
		assert_eq!(engine.forward_transform_count(), 0);
	}

	#[test]
	fn zero_levels_is_identity() {
		let engine = DwtEngine::new();
		let samples = gradient((5, 3, 1));
		let decomposition = engine.forward(&samples, (5, 3, 1), 0).unwrap();
		assert_eq!(decomposition.subband_count(), 1);
		assert_eq!(engine.inverse(&decomposition), samples);
	}
}
