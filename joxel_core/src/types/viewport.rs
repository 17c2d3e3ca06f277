//! This module provides [`Viewport`], the client-visible window used by the
//! delivery stack to prioritize tiles and predict future requests.

use super::VolumeRegion;

/// A rectangular view window at a resolution level.
///
/// Coordinates are in canvas space of the *requested* resolution level, where
/// level 0 is the coarsest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
	pub x: f64,
	pub y: f64,
	pub width: f64,
	pub height: f64,
	pub resolution_level: u8,
}

impl Viewport {
	#[must_use]
	pub fn new(x: f64, y: f64, width: f64, height: f64, resolution_level: u8) -> Self {
		Self {
			x,
			y,
			width,
			height,
			resolution_level,
		}
	}

	/// The arithmetic mean of the viewport bounds.
	#[must_use]
	pub fn center(&self) -> (f64, f64) {
		(self.x + self.width / 2.0, self.y + self.height / 2.0)
	}

	/// Area of overlap between this viewport and `region`, in samples.
	#[must_use]
	pub fn overlap_area(&self, region: &VolumeRegion) -> f64 {
		let x0 = self.x.max(f64::from(region.x));
		let y0 = self.y.max(f64::from(region.y));
		let x1 = (self.x + self.width).min(f64::from(region.x + region.width));
		let y1 = (self.y + self.height).min(f64::from(region.y + region.height));
		(x1 - x0).max(0.0) * (y1 - y0).max(0.0)
	}

	/// Fraction of `region` covered by this viewport, in `[0, 1]`.
	#[must_use]
	pub fn coverage(&self, region: &VolumeRegion) -> f64 {
		let area = f64::from(region.width) * f64::from(region.height);
		if area == 0.0 {
			return 0.0;
		}
		(self.overlap_area(region) / area).clamp(0.0, 1.0)
	}
}
