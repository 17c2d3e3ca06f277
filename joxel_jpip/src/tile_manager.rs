//! Viewport-driven tile prioritization across resolution levels.
//!
//! Level 0 is the coarsest; canvas dimensions double per level up to the full
//! image size at the finest level. Priorities quantize a combination of the
//! viewport-covered fraction of a tile and its distance to the viewport
//! center.

use crate::scheduler::DeliveryPriority;
use joxel_core::{Viewport, VolumeRegion};
use serde::Deserialize;

/// Manager geometry and tuning.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TileManagerConfig {
	pub image_width: u32,
	pub image_height: u32,
	pub tile_width: u32,
	pub tile_height: u32,
	pub component_count: u16,
	pub max_resolution_levels: u8,
	pub max_quality_layers: u8,
	/// Scales the visibility score before priority quantization.
	pub granularity_factor: f64,
}

impl Default for TileManagerConfig {
	fn default() -> Self {
		Self {
			image_width: 1024,
			image_height: 1024,
			tile_width: 256,
			tile_height: 256,
			component_count: 1,
			max_resolution_levels: 4,
			max_quality_layers: 8,
			granularity_factor: 1.0,
		}
	}
}

/// One prioritized tile of the lattice at a resolution level.
#[derive(Clone, Debug, PartialEq)]
pub struct PrioritizedTile {
	pub level: u8,
	pub tile_x: u32,
	pub tile_y: u32,
	/// Tile region in canvas coordinates of `level`.
	pub region: VolumeRegion,
	/// Fraction of the tile covered by the viewport, in `[0, 1]`.
	pub visibility: f64,
	pub priority: DeliveryPriority,
	pub quality_layers: u8,
}

/// Computes per-level tile lattices and prioritizes them against viewports.
#[derive(Clone, Debug)]
pub struct TileManager {
	config: TileManagerConfig,
}

impl TileManager {
	#[must_use]
	pub fn new(config: TileManagerConfig) -> Self {
		Self { config }
	}

	#[must_use]
	pub fn config(&self) -> &TileManagerConfig {
		&self.config
	}

	/// Canvas dimensions at `level` (0 = coarsest). Dimensions halve per level
	/// away from the finest, rounded up.
	#[must_use]
	pub fn canvas_size(&self, level: u8) -> (u32, u32) {
		let shift = self.config.max_resolution_levels.saturating_sub(1).saturating_sub(level);
		let halve = |extent: u32| -> u32 {
			let mut extent = extent;
			for _ in 0..shift {
				extent = extent.div_ceil(2);
			}
			extent.max(1)
		};
		(halve(self.config.image_width), halve(self.config.image_height))
	}

	/// Tile grid dimensions at `level`.
	#[must_use]
	pub fn grid_size(&self, level: u8) -> (u32, u32) {
		let (width, height) = self.canvas_size(level);
		(
			width.div_ceil(self.config.tile_width),
			height.div_ceil(self.config.tile_height),
		)
	}

	/// The region of tile `(x, y)` at `level`, clamped to the level canvas.
	#[must_use]
	pub fn tile_region(&self, level: u8, tile_x: u32, tile_y: u32) -> VolumeRegion {
		let (width, height) = self.canvas_size(level);
		VolumeRegion::new_2d(
			tile_x * self.config.tile_width,
			tile_y * self.config.tile_height,
			self.config.tile_width,
			self.config.tile_height,
		)
		.clamped_to(width, height, 1)
	}

	/// Tile coordinates covering `viewport` at its resolution level.
	#[must_use]
	pub fn tiles_in_viewport(&self, viewport: &Viewport) -> Vec<(u32, u32)> {
		let level = viewport.resolution_level.min(self.config.max_resolution_levels.saturating_sub(1));
		let (grid_x, grid_y) = self.grid_size(level);
		let first_x = (viewport.x.max(0.0) as u32) / self.config.tile_width;
		let first_y = (viewport.y.max(0.0) as u32) / self.config.tile_height;
		let last_x = ((viewport.x + viewport.width).max(0.0).ceil() as u32)
			.saturating_sub(1)
			.min(self.config.tile_width * grid_x - 1)
			/ self.config.tile_width;
		let last_y = ((viewport.y + viewport.height).max(0.0).ceil() as u32)
			.saturating_sub(1)
			.min(self.config.tile_height * grid_y - 1)
			/ self.config.tile_height;

		let mut tiles = Vec::new();
		for tile_y in first_y..=last_y.min(grid_y - 1) {
			for tile_x in first_x..=last_x.min(grid_x - 1) {
				tiles.push((tile_x, tile_y));
			}
		}
		tiles
	}

	/// Prioritizes the tiles visible in `viewport`, most urgent first.
	#[must_use]
	pub fn prioritize(&self, viewport: &Viewport) -> Vec<PrioritizedTile> {
		let level = viewport.resolution_level.min(self.config.max_resolution_levels.saturating_sub(1));
		let (view_cx, view_cy) = viewport.center();
		let diagonal = (viewport.width.powi(2) + viewport.height.powi(2)).sqrt().max(1.0);

		let mut tiles: Vec<PrioritizedTile> = self
			.tiles_in_viewport(viewport)
			.into_iter()
			.filter_map(|(tile_x, tile_y)| {
				let region = self.tile_region(level, tile_x, tile_y);
				let visibility = viewport.coverage(&region);
				if visibility <= 0.0 {
					return None;
				}
				let (tile_cx, tile_cy, _) = region.center();
				let distance = ((tile_cx - view_cx).powi(2) + (tile_cy - view_cy).powi(2)).sqrt();
				let proximity = 1.0 - (distance / diagonal).min(1.0);
				let score = (visibility * self.config.granularity_factor).min(1.0) * (0.5 + 0.5 * proximity);

				let priority = if score >= 0.6 {
					DeliveryPriority::Critical
				} else if score >= 0.3 {
					DeliveryPriority::High
				} else if score >= 0.05 {
					DeliveryPriority::Normal
				} else {
					DeliveryPriority::Low
				};
				Some(PrioritizedTile {
					level,
					tile_x,
					tile_y,
					region,
					visibility,
					priority,
					quality_layers: self.layers_for_priority(priority),
				})
			})
			.collect();

		tiles.sort_by(|a, b| {
			b.priority
				.cmp(&a.priority)
				.then_with(|| b.visibility.total_cmp(&a.visibility))
		});
		tiles
	}

	fn layers_for_priority(&self, priority: DeliveryPriority) -> u8 {
		let max = self.config.max_quality_layers.max(1);
		match priority {
			DeliveryPriority::Critical => max,
			DeliveryPriority::High => (max * 3 / 4).max(1),
			DeliveryPriority::Normal => (max / 2).max(1),
			DeliveryPriority::Low => 1,
		}
	}
}
