//! Tile and precinct grids over the image canvas.
//!
//! Grid counts are `ceil(extent / tile_extent)` per axis; boundary cells are
//! clamped to the canvas, so the rightmost column and bottom row of tiles may
//! be smaller than the nominal tile size.

use crate::codestream::SizParameters;
use crate::error::{CodecError, Result};
use joxel_core::VolumeRegion;

/// A regular grid of tiles (or precincts) over a canvas.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TileLattice {
	width: u32,
	height: u32,
	depth: u32,
	tile_width: u32,
	tile_height: u32,
	tile_depth: u32,
}

impl TileLattice {
	pub fn new(size: (u32, u32, u32), tile_size: (u32, u32, u32)) -> Result<Self> {
		if size.0 == 0 || size.1 == 0 || size.2 == 0 {
			return Err(CodecError::InvalidConfiguration(format!(
				"canvas extent must be nonzero, got {size:?}"
			)));
		}
		if tile_size.0 == 0 || tile_size.1 == 0 || tile_size.2 == 0 {
			return Err(CodecError::InvalidConfiguration(format!(
				"tile extent must be nonzero, got {tile_size:?}"
			)));
		}
		Ok(Self {
			width: size.0,
			height: size.1,
			depth: size.2,
			tile_width: tile_size.0,
			tile_height: tile_size.1,
			tile_depth: tile_size.2,
		})
	}

	pub fn from_siz(siz: &SizParameters) -> Result<Self> {
		Self::new(
			(siz.width, siz.height, siz.depth),
			(siz.tile_width, siz.tile_height, siz.tile_depth),
		)
	}

	#[must_use]
	pub fn tiles_x(&self) -> u32 {
		self.width.div_ceil(self.tile_width)
	}

	#[must_use]
	pub fn tiles_y(&self) -> u32 {
		self.height.div_ceil(self.tile_height)
	}

	#[must_use]
	pub fn tiles_z(&self) -> u32 {
		self.depth.div_ceil(self.tile_depth)
	}

	/// Total number of tiles in the grid.
	#[must_use]
	pub fn len(&self) -> u32 {
		self.tiles_x() * self.tiles_y() * self.tiles_z()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// The region of tile `(i, j, k)`, clamped to the canvas.
	pub fn tile(&self, i: u32, j: u32, k: u32) -> Result<VolumeRegion> {
		if i >= self.tiles_x() || j >= self.tiles_y() || k >= self.tiles_z() {
			return Err(CodecError::InvalidConfiguration(format!(
				"tile ({i},{j},{k}) outside grid {}x{}x{}",
				self.tiles_x(),
				self.tiles_y(),
				self.tiles_z()
			)));
		}
		Ok(
			VolumeRegion::new(
				i * self.tile_width,
				j * self.tile_height,
				k * self.tile_depth,
				self.tile_width,
				self.tile_height,
				self.tile_depth,
			)
			.clamped_to(self.width, self.height, self.depth),
		)
	}

	/// The region of the tile with linear index `index`.
	///
	/// Linear indices run x fastest, then y, then z.
	pub fn tile_by_index(&self, index: u32) -> Result<VolumeRegion> {
		let (tx, ty) = (self.tiles_x(), self.tiles_y());
		if index >= self.len() {
			return Err(CodecError::InvalidTile {
				index: index as u16,
				reason: format!("grid has only {} tiles", self.len()),
			});
		}
		let i = index % tx;
		let j = (index / tx) % ty;
		let k = index / (tx * ty);
		self.tile(i, j, k)
	}

	/// The linear index of the tile containing sample `(x, y, z)`.
	pub fn index_of(&self, x: u32, y: u32, z: u32) -> Result<u32> {
		if x >= self.width || y >= self.height || z >= self.depth {
			return Err(CodecError::InvalidConfiguration(format!(
				"sample ({x},{y},{z}) outside canvas {}x{}x{}",
				self.width, self.height, self.depth
			)));
		}
		let i = x / self.tile_width;
		let j = y / self.tile_height;
		let k = z / self.tile_depth;
		Ok(k * self.tiles_x() * self.tiles_y() + j * self.tiles_x() + i)
	}

	/// Iterates all tile regions in linear index order.
	pub fn iter(&self) -> impl Iterator<Item = VolumeRegion> + '_ {
		(0..self.len()).map(|index| self.tile_by_index(index).expect("index within grid"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[test]
	fn counts_round_up() {
		let lattice = TileLattice::new((100, 128, 5), (64, 64, 2)).unwrap();
		assert_eq!(lattice.tiles_x(), 2);
		assert_eq!(lattice.tiles_y(), 2);
		assert_eq!(lattice.tiles_z(), 3);
		assert_eq!(lattice.len(), 12);
	}

	#[test]
	fn boundary_tiles_are_clamped() {
		let lattice = TileLattice::new((100, 128, 5), (64, 64, 2)).unwrap();
		let tile = lattice.tile(1, 1, 2).unwrap();
		assert_eq!(tile.upper(), (100, 128, 5));
		assert_eq!((tile.width, tile.height, tile.depth), (36, 64, 1));
	}

	#[rstest]
	#[case(0, 0, 0, 0)]
	#[case(63, 63, 1, 0)]
	#[case(64, 0, 0, 1)]
	#[case(0, 64, 0, 2)]
	#[case(99, 127, 4, 11)]
	fn index_of_maps_samples(#[case] x: u32, #[case] y: u32, #[case] z: u32, #[case] expected: u32) {
		let lattice = TileLattice::new((100, 128, 5), (64, 64, 2)).unwrap();
		assert_eq!(lattice.index_of(x, y, z).unwrap(), expected);
	}

	#[test]
	fn index_roundtrip() {
		let lattice = TileLattice::new((100, 128, 5), (64, 64, 2)).unwrap();
		for index in 0..lattice.len() {
			let region = lattice.tile_by_index(index).unwrap();
			assert_eq!(lattice.index_of(region.x, region.y, region.z).unwrap(), index);
		}
	}

	#[test]
	fn out_of_grid_rejected() {
		let lattice = TileLattice::new((64, 64, 1), (32, 32, 1)).unwrap();
		assert!(lattice.tile(2, 0, 0).is_err());
		assert!(lattice.tile_by_index(4).is_err());
		assert!(lattice.index_of(64, 0, 0).is_err());
	}

	#[test]
	fn zero_extents_rejected() {
		assert!(TileLattice::new((0, 1, 1), (1, 1, 1)).is_err());
		assert!(TileLattice::new((1, 1, 1), (0, 1, 1)).is_err());
	}
}
