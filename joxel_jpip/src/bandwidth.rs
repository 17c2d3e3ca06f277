//! Bandwidth and round-trip-time estimation over a sliding sample window.

use serde::Deserialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One transfer measurement.
#[derive(Clone, Copy, Debug)]
pub struct BandwidthSample {
	pub bytes: u64,
	pub duration: Duration,
	pub rtt: Duration,
}

/// Direction the measured bandwidth is moving in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Trend {
	Rising,
	Falling,
	#[default]
	Stable,
}

/// Estimator tuning.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BandwidthConfig {
	/// Number of samples in the sliding window.
	pub window_size: usize,
	/// Minimum spacing between admitted samples, in milliseconds.
	pub measurement_interval_ms: u64,
	/// EMA factor in `[0, 1]`; higher weighs the newest sample more.
	pub smoothing_factor: f64,
	/// RTT must exceed baseline by this factor to flag congestion.
	pub congestion_rtt_factor: f64,
	/// Gain applied to the window trend in the prediction.
	pub trend_gain: f64,
	/// Sample count at which confidence saturates.
	pub min_samples_for_confidence: usize,
}

impl Default for BandwidthConfig {
	fn default() -> Self {
		Self {
			window_size: 10,
			measurement_interval_ms: 1000,
			smoothing_factor: 0.3,
			congestion_rtt_factor: 2.0,
			trend_gain: 0.5,
			min_samples_for_confidence: 5,
		}
	}
}

/// A point-in-time view of the link.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BandwidthEstimate {
	/// Window bandwidth in bits per second.
	pub bandwidth_bps: f64,
	/// Smoothed bandwidth in bits per second.
	pub smoothed_bps: f64,
	pub average_rtt: Duration,
	pub congestion_detected: bool,
	pub trend: Trend,
	/// Smoothed bandwidth plus the weighted trend, in bits per second.
	pub predicted_bps: f64,
	/// Confidence in `[0, 1]`, growing with sample count and RTT stability.
	pub confidence: f64,
}

/// Sliding-window bandwidth estimator with EMA smoothing.
#[derive(Debug)]
pub struct BandwidthEstimator {
	config: BandwidthConfig,
	samples: VecDeque<BandwidthSample>,
	smoothed_bps: Option<f64>,
	baseline_rtt_secs: Option<f64>,
	last_admitted: Option<Instant>,
	last_rtt: Duration,
}

impl BandwidthEstimator {
	#[must_use]
	pub fn new(config: BandwidthConfig) -> Self {
		Self {
			config,
			samples: VecDeque::new(),
			smoothed_bps: None,
			baseline_rtt_secs: None,
			last_admitted: None,
			last_rtt: Duration::ZERO,
		}
	}

	/// Records a sample, rate limited to one per measurement interval.
	/// Returns `false` when the sample was dropped by the rate limit.
	pub fn record_sample(&mut self, sample: BandwidthSample) -> bool {
		self.record_sample_at(sample, Instant::now())
	}

	/// Like [`BandwidthEstimator::record_sample`] with an explicit clock, for
	/// deterministic replay.
	pub fn record_sample_at(&mut self, sample: BandwidthSample, now: Instant) -> bool {
		let interval = Duration::from_millis(self.config.measurement_interval_ms);
		if let Some(last) = self.last_admitted {
			if now.saturating_duration_since(last) < interval {
				return false;
			}
		}
		self.last_admitted = Some(now);
		self.last_rtt = sample.rtt;

		if self.samples.len() == self.config.window_size {
			self.samples.pop_front();
		}
		self.samples.push_back(sample);

		let instant = self.window_bandwidth_bps();
		let alpha = self.config.smoothing_factor.clamp(0.0, 1.0);
		self.smoothed_bps = Some(match self.smoothed_bps {
			Some(previous) => alpha * instant + (1.0 - alpha) * previous,
			None => instant,
		});

		let rtt_secs = sample.rtt.as_secs_f64();
		self.baseline_rtt_secs = Some(match self.baseline_rtt_secs {
			Some(previous) => 0.9 * previous + 0.1 * rtt_secs,
			None => rtt_secs,
		});
		true
	}

	/// Folds a bare round-trip measurement (for example from a keepalive
	/// pong) into the RTT baseline without touching the bandwidth window.
	pub fn record_rtt(&mut self, rtt: Duration) {
		self.last_rtt = rtt;
		let rtt_secs = rtt.as_secs_f64();
		self.baseline_rtt_secs = Some(match self.baseline_rtt_secs {
			Some(previous) => 0.9 * previous + 0.1 * rtt_secs,
			None => rtt_secs,
		});
	}

	/// Window sum of bytes over window duration, in bits per second.
	fn window_bandwidth_bps(&self) -> f64 {
		let bytes: u64 = self.samples.iter().map(|sample| sample.bytes).sum();
		let duration: f64 = self.samples.iter().map(|sample| sample.duration.as_secs_f64()).sum();
		if duration <= 0.0 {
			return 0.0;
		}
		bytes as f64 * 8.0 / duration
	}

	fn per_sample_rates(&self) -> Vec<f64> {
		self.samples
			.iter()
			.filter(|sample| sample.duration > Duration::ZERO)
			.map(|sample| sample.bytes as f64 * 8.0 / sample.duration.as_secs_f64())
			.collect()
	}

	/// Sign of the difference between the recent and earlier window halves.
	fn trend(&self) -> (Trend, f64) {
		let rates = self.per_sample_rates();
		if rates.len() < 2 {
			return (Trend::Stable, 0.0);
		}
		let mid = rates.len() / 2;
		let early: f64 = rates[..mid].iter().sum::<f64>() / mid as f64;
		let recent: f64 = rates[mid..].iter().sum::<f64>() / (rates.len() - mid) as f64;
		let delta = recent - early;
		let threshold = early.abs() * 0.05;
		if delta > threshold {
			(Trend::Rising, delta)
		} else if delta < -threshold {
			(Trend::Falling, delta)
		} else {
			(Trend::Stable, delta)
		}
	}

	fn rtt_stability(&self) -> f64 {
		let rtts: Vec<f64> = self.samples.iter().map(|sample| sample.rtt.as_secs_f64()).collect();
		if rtts.len() < 2 {
			return 0.5;
		}
		let mean = rtts.iter().sum::<f64>() / rtts.len() as f64;
		if mean <= 0.0 {
			return 1.0;
		}
		let variance = rtts.iter().map(|rtt| (rtt - mean).powi(2)).sum::<f64>() / rtts.len() as f64;
		(1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
	}

	/// The current estimate.
	#[must_use]
	pub fn estimate(&self) -> BandwidthEstimate {
		let bandwidth_bps = self.window_bandwidth_bps();
		let smoothed_bps = self.smoothed_bps.unwrap_or(0.0);
		let (trend, delta) = self.trend();

		let average_rtt_secs = if self.samples.is_empty() {
			0.0
		} else {
			self.samples.iter().map(|sample| sample.rtt.as_secs_f64()).sum::<f64>() / self.samples.len() as f64
		};

		let congestion_detected = match self.baseline_rtt_secs {
			Some(baseline) if baseline > 0.0 => {
				self.last_rtt.as_secs_f64() >= baseline * self.config.congestion_rtt_factor
			}
			_ => false,
		};

		let count_factor = if self.config.min_samples_for_confidence == 0 {
			1.0
		} else {
			(self.samples.len() as f64 / self.config.min_samples_for_confidence as f64).min(1.0)
		};
		let confidence = (count_factor * self.rtt_stability()).clamp(0.0, 1.0);

		BandwidthEstimate {
			bandwidth_bps,
			smoothed_bps,
			average_rtt: Duration::from_secs_f64(average_rtt_secs),
			congestion_detected,
			trend,
			predicted_bps: (smoothed_bps + self.config.trend_gain * delta).max(0.0),
			confidence,
		}
	}

	#[must_use]
	pub fn sample_count(&self) -> usize {
		self.samples.len()
	}
}
