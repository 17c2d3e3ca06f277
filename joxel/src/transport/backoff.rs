//! Connection lifecycle and reconnect backoff.

use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// The connection state machine.
///
/// `Disconnected → Connecting → Connected → Closing → Disconnected`; failed
/// connects fall back to `Disconnected` and schedule a retry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConnectionState {
	#[default]
	Disconnected,
	Connecting,
	Connected,
	Closing,
}

/// Backoff tuning.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
	pub initial_delay_ms: u64,
	pub multiplier: f64,
	pub max_delay_ms: u64,
	/// Jitter fraction in `[0, 1]`; each delay is scaled by
	/// `1 ± jitter_factor * U` with `U` uniform on `(-1, 1)`.
	pub jitter_factor: f64,
	pub max_attempts: u32,
}

impl Default for ReconnectConfig {
	fn default() -> Self {
		Self {
			initial_delay_ms: 1000,
			multiplier: 2.0,
			max_delay_ms: 60_000,
			jitter_factor: 0.1,
			max_attempts: 10,
		}
	}
}

/// Computes retry delays and tracks the attempt counter.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
	config: ReconnectConfig,
	attempt: u32,
}

impl ReconnectPolicy {
	#[must_use]
	pub fn new(config: ReconnectConfig) -> Self {
		Self { config, attempt: 0 }
	}

	/// The deterministic (jitter-free) delay of attempt `attempt`.
	#[must_use]
	pub fn base_delay(&self, attempt: u32) -> Duration {
		let exponential = self.config.initial_delay_ms as f64 * self.config.multiplier.powi(attempt as i32);
		Duration::from_millis(exponential.min(self.config.max_delay_ms as f64) as u64)
	}

	/// The next delay to wait, jittered, or `None` when attempts are
	/// exhausted.
	pub fn next_delay(&mut self) -> Option<Duration> {
		if self.attempt >= self.config.max_attempts {
			return None;
		}
		let base = self.base_delay(self.attempt);
		self.attempt += 1;

		let jitter = self.config.jitter_factor.clamp(0.0, 1.0);
		if jitter == 0.0 {
			return Some(base);
		}
		let unit: f64 = rand::rng().random_range(-1.0..1.0);
		let scaled = base.as_secs_f64() * (1.0 + jitter * unit);
		Some(Duration::from_secs_f64(scaled.max(0.0)))
	}

	/// A successful connect resets the attempt counter.
	pub fn reset(&mut self) {
		self.attempt = 0;
	}

	#[must_use]
	pub fn attempts_made(&self) -> u32 {
		self.attempt
	}
}
