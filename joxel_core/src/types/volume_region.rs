//! This module provides [`VolumeRegion`], a cuboidal region of the image canvas.
//!
//! A 2-D image is treated as a volume of depth 1, so tiles, precincts and
//! viewport-covered areas share one region type across Part 1 and Part 10
//! codestreams.

use std::fmt;

/// A cuboidal region given by its origin and extent.
///
/// All coordinates are in canvas space at a fixed resolution level. Boundary
/// regions produced by tiling are clamped, so `x + width` never exceeds the
/// canvas extent they were derived from.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct VolumeRegion {
	pub x: u32,
	pub y: u32,
	pub z: u32,
	pub width: u32,
	pub height: u32,
	pub depth: u32,
}

impl VolumeRegion {
	/// Creates a new region from origin and extent.
	#[must_use]
	pub fn new(x: u32, y: u32, z: u32, width: u32, height: u32, depth: u32) -> Self {
		Self {
			x,
			y,
			z,
			width,
			height,
			depth,
		}
	}

	/// Creates a planar (depth 1) region.
	#[must_use]
	pub fn new_2d(x: u32, y: u32, width: u32, height: u32) -> Self {
		Self::new(x, y, 0, width, height, 1)
	}

	/// Exclusive upper bounds `(x + width, y + height, z + depth)`.
	#[must_use]
	pub fn upper(&self) -> (u32, u32, u32) {
		(self.x + self.width, self.y + self.height, self.z + self.depth)
	}

	/// Number of samples covered by this region.
	#[must_use]
	pub fn volume(&self) -> u64 {
		u64::from(self.width) * u64::from(self.height) * u64::from(self.depth)
	}

	/// Returns `true` when any extent is zero.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.width == 0 || self.height == 0 || self.depth == 0
	}

	/// The arithmetic center of the region.
	#[must_use]
	pub fn center(&self) -> (f64, f64, f64) {
		(
			f64::from(self.x) + f64::from(self.width) / 2.0,
			f64::from(self.y) + f64::from(self.height) / 2.0,
			f64::from(self.z) + f64::from(self.depth) / 2.0,
		)
	}

	/// Clamps the region's upper bounds to `(max_x, max_y, max_z)`.
	#[must_use]
	pub fn clamped_to(&self, max_x: u32, max_y: u32, max_z: u32) -> Self {
		let end_x = (self.x + self.width).min(max_x);
		let end_y = (self.y + self.height).min(max_y);
		let end_z = (self.z + self.depth).min(max_z);
		Self {
			x: self.x.min(max_x),
			y: self.y.min(max_y),
			z: self.z.min(max_z),
			width: end_x.saturating_sub(self.x),
			height: end_y.saturating_sub(self.y),
			depth: end_z.saturating_sub(self.z),
		}
	}

	/// Returns `true` when the two regions share at least one sample.
	#[must_use]
	pub fn intersects(&self, other: &VolumeRegion) -> bool {
		!self.intersection(other).is_empty()
	}

	/// The common sub-region of two regions; empty when they do not overlap.
	#[must_use]
	pub fn intersection(&self, other: &VolumeRegion) -> VolumeRegion {
		let x = self.x.max(other.x);
		let y = self.y.max(other.y);
		let z = self.z.max(other.z);
		let (sx, sy, sz) = self.upper();
		let (ox, oy, oz) = other.upper();
		VolumeRegion {
			x,
			y,
			z,
			width: sx.min(ox).saturating_sub(x),
			height: sy.min(oy).saturating_sub(y),
			depth: sz.min(oz).saturating_sub(z),
		}
	}

	/// Returns `true` when `(x, y, z)` lies inside the region.
	#[must_use]
	pub fn contains(&self, x: u32, y: u32, z: u32) -> bool {
		let (ux, uy, uz) = self.upper();
		x >= self.x && x < ux && y >= self.y && y < uy && z >= self.z && z < uz
	}
}

impl fmt::Debug for VolumeRegion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"VolumeRegion[{},{},{} {}x{}x{}]",
			self.x, self.y, self.z, self.width, self.height, self.depth
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn upper_and_volume() {
		let region = VolumeRegion::new(4, 8, 0, 16, 8, 2);
		assert_eq!(region.upper(), (20, 16, 2));
		assert_eq!(region.volume(), 256);
		assert!(!region.is_empty());
	}

	#[test]
	fn clamping_shrinks_boundary_regions() {
		let region = VolumeRegion::new(96, 96, 0, 64, 64, 1).clamped_to(100, 128, 1);
		assert_eq!(region.upper(), (100, 128, 1));
		assert_eq!(region.width, 4);
		assert_eq!(region.height, 32);
	}

	#[test]
	fn intersection_of_disjoint_regions_is_empty() {
		let a = VolumeRegion::new_2d(0, 0, 10, 10);
		let b = VolumeRegion::new_2d(20, 20, 10, 10);
		assert!(!a.intersects(&b));
		assert!(a.intersection(&b).is_empty());
	}

	#[test]
	fn intersection_overlapping() {
		let a = VolumeRegion::new_2d(0, 0, 10, 10);
		let b = VolumeRegion::new_2d(5, 5, 10, 10);
		let c = a.intersection(&b);
		assert_eq!(c, VolumeRegion::new_2d(5, 5, 5, 5));
	}

	#[test]
	fn contains_respects_exclusive_upper_bound() {
		let region = VolumeRegion::new_2d(2, 2, 4, 4);
		assert!(region.contains(2, 2, 0));
		assert!(region.contains(5, 5, 0));
		assert!(!region.contains(6, 2, 0));
		assert!(!region.contains(2, 2, 1));
	}

	#[test]
	fn center_is_arithmetic_mean() {
		let region = VolumeRegion::new_2d(0, 0, 10, 20);
		assert_eq!(region.center(), (5.0, 10.0, 0.5));
	}
}
