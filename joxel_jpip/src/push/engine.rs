//! Prediction of future tile requests from viewport history.
//!
//! Three strategies run per prediction cycle:
//! - resolution prefetch: a client drilling into finer levels gets the next
//!   level preloaded,
//! - spatial prefetch: the neighborhood of the current viewport, confidence
//!   decaying with Chebyshev distance,
//! - viewport motion: linear extrapolation of the viewport center one step
//!   ahead.

use crate::tile_manager::TileManager;
use joxel_core::Viewport;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};

/// Which strategy produced a prediction. Higher = more urgent to push.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum PushStrategy {
	Quality,
	Spatial,
	Resolution,
}

/// One predicted tile.
#[derive(Clone, Debug, PartialEq)]
pub struct TilePrediction {
	pub level: u8,
	pub tile_x: u32,
	pub tile_y: u32,
	pub strategy: PushStrategy,
	/// Clamped to `[0, 1]`.
	pub confidence: f64,
}

/// Engine tuning.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PushEngineConfig {
	/// Viewports remembered per session.
	pub max_history: usize,
	/// Predictions below this confidence are dropped.
	pub confidence_threshold: f64,
	/// Upper bound on emitted predictions per cycle.
	pub max_prefetch_depth: usize,
	/// Chebyshev radius of the spatial neighborhood.
	pub spatial_radius: u32,
}

impl Default for PushEngineConfig {
	fn default() -> Self {
		Self {
			max_history: 16,
			confidence_threshold: 0.2,
			max_prefetch_depth: 32,
			spatial_radius: 1,
		}
	}
}

/// Per-session viewport history and prediction.
pub struct PredictivePushEngine {
	config: PushEngineConfig,
	tile_manager: TileManager,
	history: HashMap<String, VecDeque<Viewport>>,
}

impl PredictivePushEngine {
	#[must_use]
	pub fn new(config: PushEngineConfig, tile_manager: TileManager) -> Self {
		Self {
			config,
			tile_manager,
			history: HashMap::new(),
		}
	}

	/// Appends a viewport to the session's ring buffer.
	pub fn record_viewport(&mut self, session_id: &str, viewport: Viewport) {
		let history = self.history.entry(session_id.to_string()).or_default();
		if history.len() == self.config.max_history {
			history.pop_front();
		}
		history.push_back(viewport);
	}

	pub fn forget_session(&mut self, session_id: &str) {
		self.history.remove(session_id);
	}

	#[must_use]
	pub fn history_len(&self, session_id: &str) -> usize {
		self.history.get(session_id).map_or(0, VecDeque::len)
	}

	/// Produces predictions for the session's next move.
	#[must_use]
	pub fn predict(&self, session_id: &str) -> Vec<TilePrediction> {
		let Some(history) = self.history.get(session_id) else {
			return Vec::new();
		};
		let Some(current) = history.back() else {
			return Vec::new();
		};

		let mut predictions = Vec::new();
		self.predict_resolution(history, current, &mut predictions);
		self.predict_spatial(current, &mut predictions);
		self.predict_motion(history, current, &mut predictions);

		for prediction in &mut predictions {
			prediction.confidence = prediction.confidence.clamp(0.0, 1.0);
		}
		predictions.retain(|prediction| prediction.confidence >= self.config.confidence_threshold);

		// Highest strategy and confidence win on duplicate tiles.
		predictions.sort_by(|a, b| {
			b.strategy
				.cmp(&a.strategy)
				.then_with(|| b.confidence.total_cmp(&a.confidence))
		});
		let mut seen = std::collections::HashSet::new();
		predictions.retain(|prediction| seen.insert((prediction.level, prediction.tile_x, prediction.tile_y)));

		predictions.truncate(self.config.max_prefetch_depth);
		predictions
	}

	/// A monotone increase in resolution level over the last three viewports
	/// predicts the next level.
	fn predict_resolution(&self, history: &VecDeque<Viewport>, current: &Viewport, out: &mut Vec<TilePrediction>) {
		if history.len() < 3 {
			return;
		}
		let recent: Vec<u8> = history.iter().rev().take(3).map(|v| v.resolution_level).collect();
		let ascending = recent[0] > recent[1] && recent[1] > recent[2];
		let next_level = current.resolution_level + 1;
		if !ascending || next_level >= self.tile_manager.config().max_resolution_levels {
			return;
		}

		// The same window at the next level covers twice the coordinates.
		let scaled = Viewport::new(
			current.x * 2.0,
			current.y * 2.0,
			current.width * 2.0,
			current.height * 2.0,
			next_level,
		);
		for (tile_x, tile_y) in self.tile_manager.tiles_in_viewport(&scaled) {
			out.push(TilePrediction {
				level: next_level,
				tile_x,
				tile_y,
				strategy: PushStrategy::Resolution,
				confidence: 0.7,
			});
		}
	}

	/// The neighborhood of the covered tiles at the current level.
	fn predict_spatial(&self, current: &Viewport, out: &mut Vec<TilePrediction>) {
		let level = current.resolution_level;
		let covered = self.tile_manager.tiles_in_viewport(current);
		let (grid_x, grid_y) = self.tile_manager.grid_size(level);
		let radius = self.config.spatial_radius as i64;

		for &(tile_x, tile_y) in &covered {
			for dy in -radius..=radius {
				for dx in -radius..=radius {
					if dx == 0 && dy == 0 {
						continue;
					}
					let nx = i64::from(tile_x) + dx;
					let ny = i64::from(tile_y) + dy;
					if nx < 0 || ny < 0 || nx >= i64::from(grid_x) || ny >= i64::from(grid_y) {
						continue;
					}
					let neighbor = (nx as u32, ny as u32);
					if covered.contains(&neighbor) {
						continue;
					}
					let chebyshev = dx.abs().max(dy.abs()) as u32;
					out.push(TilePrediction {
						level,
						tile_x: neighbor.0,
						tile_y: neighbor.1,
						strategy: PushStrategy::Spatial,
						confidence: 0.6 * 0.5f64.powi(chebyshev as i32 - 1),
					});
				}
			}
		}
	}

	/// Linear extrapolation of the center one step ahead.
	fn predict_motion(&self, history: &VecDeque<Viewport>, current: &Viewport, out: &mut Vec<TilePrediction>) {
		if history.len() < 2 {
			return;
		}
		let previous = &history[history.len() - 2];
		if previous.resolution_level != current.resolution_level {
			return;
		}
		let (cx, cy) = current.center();
		let (px, py) = previous.center();
		let (dx, dy) = (cx - px, cy - py);
		if dx.abs() < f64::EPSILON && dy.abs() < f64::EPSILON {
			return;
		}

		let predicted = Viewport::new(
			current.x + dx,
			current.y + dy,
			current.width,
			current.height,
			current.resolution_level,
		);
		let covered = self.tile_manager.tiles_in_viewport(current);
		for (tile_x, tile_y) in self.tile_manager.tiles_in_viewport(&predicted) {
			if covered.contains(&(tile_x, tile_y)) {
				continue;
			}
			out.push(TilePrediction {
				level: current.resolution_level,
				tile_x,
				tile_y,
				strategy: PushStrategy::Quality,
				confidence: 0.65,
			});
		}
	}

	/// Counts predictions that landed in the tile set of the viewport that
	/// actually followed.
	#[must_use]
	pub fn validate(&self, predictions: &[TilePrediction], actual: &Viewport) -> usize {
		let actual_tiles = self.tile_manager.tiles_in_viewport(actual);
		predictions
			.iter()
			.filter(|prediction| {
				prediction.level == actual.resolution_level
					&& actual_tiles.contains(&(prediction.tile_x, prediction.tile_y))
			})
			.count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tile_manager::TileManagerConfig;

	fn engine() -> PredictivePushEngine {
		let manager = TileManager::new(TileManagerConfig {
			image_width: 1600,
			image_height: 1600,
			tile_width: 100,
			tile_height: 100,
			max_resolution_levels: 5,
			..TileManagerConfig::default()
		});
		PredictivePushEngine::new(PushEngineConfig::default(), manager)
	}

	#[test]
	fn no_history_no_predictions() {
		let engine = engine();
		assert!(engine.predict("s1").is_empty());
	}

	#[test]
	fn history_is_bounded() {
		let mut engine = engine();
		for i in 0..40 {
			engine.record_viewport("s1", Viewport::new(i as f64, 0.0, 100.0, 100.0, 2));
		}
		assert_eq!(engine.history_len("s1"), 16);
	}

	#[test]
	fn spatial_neighbors_predicted() {
		let mut engine = engine();
		engine.record_viewport("s1", Viewport::new(100.0, 100.0, 100.0, 100.0, 4));
		let predictions = engine.predict("s1");

		assert!(!predictions.is_empty());
		assert!(predictions.iter().all(|p| p.strategy == PushStrategy::Spatial));
		// tile (1,1) is covered; its 8 neighbors are predicted
		assert_eq!(predictions.len(), 8);
		assert!(predictions.iter().any(|p| (p.tile_x, p.tile_y) == (0, 0)));
		assert!(predictions.iter().all(|p| (p.tile_x, p.tile_y) != (1, 1)));
	}

	#[test]
	fn drilling_in_predicts_next_level() {
		let mut engine = engine();
		engine.record_viewport("s1", Viewport::new(100.0, 100.0, 100.0, 100.0, 1));
		engine.record_viewport("s1", Viewport::new(100.0, 100.0, 100.0, 100.0, 2));
		engine.record_viewport("s1", Viewport::new(100.0, 100.0, 100.0, 100.0, 3));

		let predictions = engine.predict("s1");
		let resolution: Vec<&TilePrediction> = predictions
			.iter()
			.filter(|p| p.strategy == PushStrategy::Resolution)
			.collect();
		assert!(!resolution.is_empty());
		assert!(resolution.iter().all(|p| p.level == 4));
		// resolution predictions outrank spatial ones
		assert_eq!(predictions[0].strategy, PushStrategy::Resolution);
	}

	#[test]
	fn panning_predicts_ahead() {
		let mut engine = engine();
		engine.record_viewport("s1", Viewport::new(0.0, 0.0, 200.0, 200.0, 4));
		engine.record_viewport("s1", Viewport::new(200.0, 0.0, 200.0, 200.0, 4));

		let predictions = engine.predict("s1");
		let motion: Vec<&TilePrediction> = predictions
			.iter()
			.filter(|p| p.strategy == PushStrategy::Quality)
			.collect();
		assert!(!motion.is_empty());
		// moving right by 200: predicted window x 400..600 covers columns 4..=5
		assert!(motion.iter().all(|p| p.tile_x >= 4));
	}

	#[test]
	fn low_confidence_predictions_dropped() {
		let manager = TileManager::new(TileManagerConfig {
			image_width: 1600,
			image_height: 1600,
			tile_width: 100,
			tile_height: 100,
			max_resolution_levels: 5,
			..TileManagerConfig::default()
		});
		let mut engine = PredictivePushEngine::new(
			PushEngineConfig {
				confidence_threshold: 0.9,
				..PushEngineConfig::default()
			},
			manager,
		);
		engine.record_viewport("s1", Viewport::new(100.0, 100.0, 100.0, 100.0, 4));
		assert!(engine.predict("s1").is_empty());
	}

	#[test]
	fn output_is_truncated_to_depth() {
		let manager = TileManager::new(TileManagerConfig {
			image_width: 1600,
			image_height: 1600,
			tile_width: 100,
			tile_height: 100,
			max_resolution_levels: 5,
			..TileManagerConfig::default()
		});
		let mut engine = PredictivePushEngine::new(
			PushEngineConfig {
				max_prefetch_depth: 3,
				..PushEngineConfig::default()
			},
			manager,
		);
		engine.record_viewport("s1", Viewport::new(200.0, 200.0, 400.0, 400.0, 4));
		assert!(engine.predict("s1").len() <= 3);
	}

	#[test]
	fn validation_counts_overlap() {
		let mut engine = engine();
		engine.record_viewport("s1", Viewport::new(0.0, 0.0, 200.0, 200.0, 4));
		engine.record_viewport("s1", Viewport::new(100.0, 0.0, 200.0, 200.0, 4));
		let predictions = engine.predict("s1");

		let actual = Viewport::new(200.0, 0.0, 200.0, 200.0, 4);
		let correct = engine.validate(&predictions, &actual);
		assert!(correct > 0);
		assert!(correct <= predictions.len());

		let elsewhere = Viewport::new(1400.0, 1400.0, 100.0, 100.0, 4);
		assert_eq!(engine.validate(&predictions, &elsewhere), 0);
	}
}
