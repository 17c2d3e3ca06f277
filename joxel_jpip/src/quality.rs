//! Bandwidth-driven quality adaptation.
//!
//! The engine maps a bandwidth estimate onto a target quality-layer count and
//! resolution level. Decisions are smoothed against the previous decision so
//! the stream does not oscillate; with a smoothing factor of 0.5 or more the
//! resolution level never moves by more than one step between adjacent
//! decisions.

use crate::bandwidth::BandwidthEstimate;
use serde::Deserialize;
use std::time::Duration;

/// Engine tuning.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
	pub max_layers: u8,
	pub max_resolution_levels: u8,
	/// EMA factor in `[0, 1]` applied against the previous decision.
	pub smoothing_factor: f64,
	/// Predicted bandwidth below this (bits per second) enables progressive
	/// mode.
	pub progressive_threshold_bps: f64,
	/// Monotone (bandwidth bps, layers) mapping, interpolated linearly.
	pub bandwidth_layer_table: Vec<(f64, u8)>,
	/// Rough payload size of one quality layer, for latency estimation.
	pub nominal_layer_bytes: u64,
}

impl Default for QualityConfig {
	fn default() -> Self {
		Self {
			max_layers: 8,
			max_resolution_levels: 6,
			smoothing_factor: 0.6,
			progressive_threshold_bps: 1_000_000.0,
			bandwidth_layer_table: vec![
				(500_000.0, 1),
				(2_000_000.0, 3),
				(8_000_000.0, 5),
				(20_000_000.0, u8::MAX), // clamped to max_layers
			],
			nominal_layer_bytes: 64 * 1024,
		}
	}
}

/// One adaptation decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityDecision {
	pub target_quality_layers: u8,
	pub target_resolution_level: u8,
	pub use_progressive: bool,
	pub estimated_latency: Duration,
}

/// Quality-of-experience counters reported by the client.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QoeMetrics {
	pub time_to_first_byte: Option<Duration>,
	pub time_to_interactive: Option<Duration>,
	pub average_latency: Duration,
	pub average_quality: f64,
	pub rebuffering_count: u64,
}

/// Accumulates QoE observations.
#[derive(Debug, Default)]
pub struct QoeTracker {
	time_to_first_byte: Option<Duration>,
	time_to_interactive: Option<Duration>,
	latency_sum: Duration,
	latency_count: u64,
	quality_sum: u64,
	quality_count: u64,
	rebuffering_count: u64,
}

impl QoeTracker {
	/// Records the first-byte time; only the first call sticks.
	pub fn record_first_byte(&mut self, elapsed: Duration) {
		self.time_to_first_byte.get_or_insert(elapsed);
	}

	pub fn record_interactive(&mut self, elapsed: Duration) {
		self.time_to_interactive.get_or_insert(elapsed);
	}

	pub fn record_latency(&mut self, latency: Duration) {
		self.latency_sum += latency;
		self.latency_count += 1;
	}

	pub fn record_quality(&mut self, layers: u8) {
		self.quality_sum += u64::from(layers);
		self.quality_count += 1;
	}

	pub fn record_rebuffering(&mut self) {
		self.rebuffering_count += 1;
	}

	#[must_use]
	pub fn metrics(&self) -> QoeMetrics {
		QoeMetrics {
			time_to_first_byte: self.time_to_first_byte,
			time_to_interactive: self.time_to_interactive,
			average_latency: self
				.latency_sum
				.checked_div(self.latency_count.max(1) as u32)
				.unwrap_or_default(),
			average_quality: if self.quality_count == 0 {
				0.0
			} else {
				self.quality_sum as f64 / self.quality_count as f64
			},
			rebuffering_count: self.rebuffering_count,
		}
	}
}

/// Maps bandwidth estimates to quality decisions, with smoothing.
#[derive(Debug)]
pub struct AdaptiveQualityEngine {
	config: QualityConfig,
	previous: Option<QualityDecision>,
	qoe: QoeTracker,
}

impl AdaptiveQualityEngine {
	#[must_use]
	pub fn new(config: QualityConfig) -> Self {
		Self {
			config,
			previous: None,
			qoe: QoeTracker::default(),
		}
	}

	/// Piecewise-linear interpolation of the bandwidth → layers table.
	fn layers_for_bandwidth(&self, bps: f64) -> f64 {
		let table = &self.config.bandwidth_layer_table;
		if table.is_empty() {
			return f64::from(self.config.max_layers);
		}
		let clamp = |layers: u8| f64::from(layers.min(self.config.max_layers)).max(1.0);
		if bps <= table[0].0 {
			return clamp(table[0].1);
		}
		for window in table.windows(2) {
			let (low_bps, low_layers) = window[0];
			let (high_bps, high_layers) = window[1];
			if bps <= high_bps {
				let fraction = (bps - low_bps) / (high_bps - low_bps);
				return clamp(low_layers) + fraction * (clamp(high_layers) - clamp(low_layers));
			}
		}
		clamp(table[table.len() - 1].1)
	}

	/// Produces the next decision for the given link state.
	pub fn decide(&mut self, estimate: &BandwidthEstimate, latency_budget: Duration) -> QualityDecision {
		let raw_layers = self.layers_for_bandwidth(estimate.smoothed_bps.max(estimate.bandwidth_bps));

		let mut resolution = self.config.max_resolution_levels.saturating_sub(1);
		if estimate.congestion_detected {
			resolution = resolution.saturating_sub(1);
		}

		let alpha = self.config.smoothing_factor.clamp(0.0, 1.0);
		let (layers, resolution) = match self.previous {
			Some(previous) => {
				let blended =
					alpha * f64::from(previous.target_quality_layers) + (1.0 - alpha) * raw_layers;
				let layers = blended.round().clamp(1.0, f64::from(self.config.max_layers)) as u8;
				let resolution = if alpha >= 0.5 {
					// strong smoothing: move at most one level per decision
					let previous_level = previous.target_resolution_level;
					previous_level + u8::from(resolution > previous_level)
						- u8::from(resolution < previous_level)
				} else {
					resolution
				};
				(layers, resolution)
			}
			None => (raw_layers.round().clamp(1.0, f64::from(self.config.max_layers)) as u8, resolution),
		};

		let use_progressive = estimate.predicted_bps < self.config.progressive_threshold_bps;

		let payload_bits = (u64::from(layers) * self.config.nominal_layer_bytes * 8) as f64;
		let estimated_latency = if estimate.smoothed_bps > 0.0 {
			Duration::from_secs_f64((payload_bits / estimate.smoothed_bps).min(latency_budget.as_secs_f64() * 10.0))
		} else {
			latency_budget
		};

		let decision = QualityDecision {
			target_quality_layers: layers,
			target_resolution_level: resolution,
			use_progressive,
			estimated_latency,
		};
		self.previous = Some(decision);
		self.qoe.record_quality(layers);
		decision
	}

	#[must_use]
	pub fn qoe(&mut self) -> &mut QoeTracker {
		&mut self.qoe
	}

	#[must_use]
	pub fn qoe_metrics(&self) -> QoeMetrics {
		self.qoe.metrics()
	}
}
