//! Priority- and rate-controlled batch delivery of data bins.
//!
//! The scheduler owns the pending bins of one delivery window. Draining is
//! capped by a token bucket refilled at `max_delivery_rate` bytes per second;
//! when a bin does not fit and quality truncation is enabled, the bin is cut
//! at the highest whole quality layer that fits, never below the minimum
//! viable layer count.

use joxel_codec::{DataBin, DataBinClass};
use joxel_core::{Blob, VolumeRegion};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Delivery urgency, highest first.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum DeliveryPriority {
	Low,
	Normal,
	High,
	Critical,
}

/// The region and refinement targets a client is currently asking for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeliveryWindow {
	pub region: VolumeRegion,
	pub target_layers: u8,
	pub target_resolution: u8,
}

/// Scheduler tuning.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
	/// Token bucket rate and burst, in bytes per second.
	pub max_delivery_rate: u64,
	pub enable_quality_truncation: bool,
	pub minimum_viable_quality_layers: u8,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			max_delivery_rate: 1024 * 1024,
			enable_quality_truncation: true,
			minimum_viable_quality_layers: 2,
		}
	}
}

/// Counters over the scheduler's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SchedulerStats {
	pub delivered: u64,
	pub truncated: u64,
	pub interrupted: u64,
	pub mvq_delivered: u64,
	/// Time from window start to the first batch that completed the minimum
	/// viable quality.
	pub time_to_mvq: Option<Duration>,
}

#[derive(Clone, Debug)]
struct PendingBin {
	bin: DataBin,
	priority: DeliveryPriority,
	quality_layer: u8,
	/// Distance of the bin's region center to the window center, for
	/// tie-breaking.
	distance: f64,
	sequence: u64,
}

impl PartialEq for PendingBin {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for PendingBin {}

impl PartialOrd for PendingBin {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for PendingBin {
	fn cmp(&self, other: &Self) -> Ordering {
		// max-heap: higher priority first, then nearer, then lower layer,
		// then FIFO
		self
			.priority
			.cmp(&other.priority)
			.then_with(|| other.distance.total_cmp(&self.distance))
			.then_with(|| other.quality_layer.cmp(&self.quality_layer))
			.then_with(|| other.sequence.cmp(&self.sequence))
	}
}

/// One delivered (possibly truncated) bin.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
	pub bin: DataBin,
	pub truncated: bool,
}

/// Rate-controlled priority queue of pending bins.
pub struct DeliveryScheduler {
	config: SchedulerConfig,
	window: Option<DeliveryWindow>,
	window_started: Option<Instant>,
	queue: BinaryHeap<PendingBin>,
	tokens: f64,
	last_refill: Instant,
	sequence: u64,
	stats: SchedulerStats,
}

impl DeliveryScheduler {
	#[must_use]
	pub fn new(config: SchedulerConfig) -> Self {
		Self {
			config,
			window: None,
			window_started: None,
			queue: BinaryHeap::new(),
			tokens: 0.0,
			last_refill: Instant::now(),
			sequence: 0,
			stats: SchedulerStats::default(),
		}
	}

	#[must_use]
	pub fn window(&self) -> Option<&DeliveryWindow> {
		self.window.as_ref()
	}

	#[must_use]
	pub fn pending_count(&self) -> usize {
		self.queue.len()
	}

	#[must_use]
	pub fn stats(&self) -> SchedulerStats {
		self.stats
	}

	/// Replaces the delivery window.
	///
	/// When the new region is disjoint from the old one, undelivered bins of
	/// the old window are dropped and one interruption is counted.
	pub fn set_window(&mut self, window: DeliveryWindow) {
		if let Some(previous) = &self.window {
			if !previous.region.intersects(&window.region) && !self.queue.is_empty() {
				log::debug!("window replaced, dropping {} undelivered bins", self.queue.len());
				self.queue.clear();
				self.stats.interrupted += 1;
			}
		}
		self.window = Some(window);
		self.window_started = Some(Instant::now());
	}

	/// Queues a bin for the current window.
	///
	/// `region` locates the bin on the canvas of the window's resolution; pass
	/// `None` for headers and metadata.
	pub fn enqueue(&mut self, bin: DataBin, quality_layer: u8, region: Option<VolumeRegion>) {
		let priority = self.priority_for(&bin, quality_layer, region.as_ref());
		let distance = match (&self.window, region) {
			(Some(window), Some(region)) => {
				let (wx, wy, _) = window.region.center();
				let (bx, by, _) = region.center();
				((wx - bx).powi(2) + (wy - by).powi(2)).sqrt()
			}
			_ => 0.0,
		};
		self.sequence += 1;
		self.queue.push(PendingBin {
			bin,
			priority,
			quality_layer,
			distance,
			sequence: self.sequence,
		});
	}

	fn priority_for(&self, bin: &DataBin, quality_layer: u8, region: Option<&VolumeRegion>) -> DeliveryPriority {
		match bin.class {
			DataBinClass::MainHeader | DataBinClass::TileHeader => DeliveryPriority::Critical,
			DataBinClass::Metadata => DeliveryPriority::Normal,
			_ => {
				let visible = match (&self.window, region) {
					(Some(window), Some(region)) => window.region.intersects(region),
					_ => true,
				};
				let mvq = quality_layer < self.config.minimum_viable_quality_layers;
				match (visible, mvq) {
					(true, true) => DeliveryPriority::High,
					(true, false) => DeliveryPriority::Normal,
					(false, _) => DeliveryPriority::Low,
				}
			}
		}
	}

	/// Drains the next batch under the rate cap.
	pub fn next_batch(&mut self) -> Vec<Delivery> {
		self.next_batch_at(Instant::now())
	}

	pub(crate) fn next_batch_at(&mut self, now: Instant) -> Vec<Delivery> {
		let rate = self.config.max_delivery_rate as f64;
		let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
		self.tokens = (self.tokens + elapsed * rate).min(rate);
		self.last_refill = now;

		let mut batch = Vec::new();
		while let Some(pending) = self.queue.peek() {
			let full_len = pending.bin.len() as f64;
			if full_len <= self.tokens {
				let pending = self.queue.pop().expect("peeked entry exists");
				self.tokens -= full_len;
				self.record_delivery(&pending, now, false);
				batch.push(Delivery {
					bin: pending.bin,
					truncated: false,
				});
				continue;
			}

			// The head does not fit; try cutting it down to whole layers.
			if !self.config.enable_quality_truncation {
				break;
			}
			let target_layers = self.window.map_or(1, |window| window.target_layers).max(1);
			let bytes_per_layer = full_len / f64::from(target_layers);
			let affordable = (self.tokens / bytes_per_layer).floor() as u8;
			let layers = affordable.min(target_layers);
			if layers < self.config.minimum_viable_quality_layers.min(target_layers) {
				break;
			}
			let pending = self.queue.pop().expect("peeked entry exists");
			let keep = (bytes_per_layer * f64::from(layers)) as usize;
			self.tokens -= keep as f64;
			let truncated_bin = DataBin::new(
				pending.bin.class,
				pending.bin.id,
				Blob::from(&pending.bin.bytes.as_slice()[..keep.min(pending.bin.len())]),
				false,
			);
			self.stats.truncated += 1;
			self.record_delivery(&pending, now, true);
			batch.push(Delivery {
				bin: truncated_bin,
				truncated: true,
			});
		}
		batch
	}

	fn record_delivery(&mut self, pending: &PendingBin, now: Instant, truncated: bool) {
		self.stats.delivered += 1;
		let mvq_floor = self.config.minimum_viable_quality_layers;
		if !truncated && pending.quality_layer + 1 == mvq_floor {
			self.stats.mvq_delivered += 1;
			if self.stats.time_to_mvq.is_none() {
				self.stats.time_to_mvq = self.window_started.map(|started| now.saturating_duration_since(started));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn bin(class: DataBinClass, id: u32, len: usize) -> DataBin {
		DataBin::new(class, id, Blob::from(vec![0u8; len]), true)
	}

	fn window(x: u32, y: u32, size: u32) -> DeliveryWindow {
		DeliveryWindow {
			region: VolumeRegion::new_2d(x, y, size, size),
			target_layers: 4,
			target_resolution: 2,
		}
	}

	fn scheduler(rate: u64) -> DeliveryScheduler {
		DeliveryScheduler::new(SchedulerConfig {
			max_delivery_rate: rate,
			..SchedulerConfig::default()
		})
	}

	#[test]
	fn headers_drain_first() {
		let mut scheduler = scheduler(1_000_000);
		scheduler.set_window(window(0, 0, 100));
		scheduler.enqueue(bin(DataBinClass::Tile, 1, 10), 0, Some(VolumeRegion::new_2d(0, 0, 10, 10)));
		scheduler.enqueue(bin(DataBinClass::MainHeader, 0, 10), 0, None);
		scheduler.enqueue(bin(DataBinClass::TileHeader, 1, 10), 0, None);

		let batch = scheduler.next_batch_at(Instant::now() + Duration::from_secs(2));
		assert_eq!(batch.len(), 3);
		assert!(matches!(batch[0].bin.class, DataBinClass::MainHeader | DataBinClass::TileHeader));
		assert!(matches!(batch[1].bin.class, DataBinClass::MainHeader | DataBinClass::TileHeader));
		assert_eq!(batch[2].bin.class, DataBinClass::Tile);
	}

	#[test]
	fn nearer_tiles_first() {
		let mut scheduler = scheduler(1_000_000);
		scheduler.set_window(window(0, 0, 100));
		scheduler.enqueue(bin(DataBinClass::Tile, 1, 10), 0, Some(VolumeRegion::new_2d(80, 80, 20, 20)));
		scheduler.enqueue(bin(DataBinClass::Tile, 2, 10), 0, Some(VolumeRegion::new_2d(40, 40, 20, 20)));

		let batch = scheduler.next_batch_at(Instant::now() + Duration::from_secs(2));
		assert_eq!(batch[0].bin.id, 2);
		assert_eq!(batch[1].bin.id, 1);
	}

	#[test]
	fn rate_cap_defers_excess() {
		let mut scheduler = DeliveryScheduler::new(SchedulerConfig {
			max_delivery_rate: 100,
			enable_quality_truncation: false,
			minimum_viable_quality_layers: 1,
		});
		let start = Instant::now();
		scheduler.set_window(window(0, 0, 100));
		scheduler.enqueue(bin(DataBinClass::Tile, 1, 80), 0, None);
		scheduler.enqueue(bin(DataBinClass::Tile, 2, 80), 0, None);

		let batch = scheduler.next_batch_at(start + Duration::from_secs(1));
		assert_eq!(batch.len(), 1);
		assert_eq!(scheduler.pending_count(), 1);

		// tokens refill over time
		let batch = scheduler.next_batch_at(start + Duration::from_secs(2));
		assert_eq!(batch.len(), 1);
	}

	#[test]
	fn truncation_cuts_at_whole_layers() {
		let mut scheduler = DeliveryScheduler::new(SchedulerConfig {
			max_delivery_rate: 100,
			enable_quality_truncation: true,
			minimum_viable_quality_layers: 2,
		});
		let start = Instant::now();
		scheduler.set_window(window(0, 0, 100)); // target_layers = 4
		scheduler.enqueue(bin(DataBinClass::Tile, 1, 200), 0, None); // 50 bytes per layer

		let batch = scheduler.next_batch_at(start + Duration::from_secs(1));
		assert_eq!(batch.len(), 1);
		assert!(batch[0].truncated);
		// 100 tokens / 50 bytes per layer = 2 layers = 100 bytes
		assert_eq!(batch[0].bin.len(), 100);
		assert!(!batch[0].bin.is_complete);
		assert_eq!(scheduler.stats().truncated, 1);
	}

	#[test]
	fn truncation_never_goes_below_mvq() {
		let mut scheduler = DeliveryScheduler::new(SchedulerConfig {
			max_delivery_rate: 40,
			enable_quality_truncation: true,
			minimum_viable_quality_layers: 2,
		});
		let start = Instant::now();
		scheduler.set_window(window(0, 0, 100));
		scheduler.enqueue(bin(DataBinClass::Tile, 1, 200), 0, None); // 50 bytes per layer

		// 40 tokens afford zero whole layers above the floor: nothing delivered
		let batch = scheduler.next_batch_at(start + Duration::from_secs(1));
		assert!(batch.is_empty());
		assert_eq!(scheduler.pending_count(), 1);
	}

	#[test]
	fn disjoint_window_drops_pending_and_counts_interruption() {
		let mut scheduler = scheduler(1_000_000);
		scheduler.set_window(window(0, 0, 50));
		scheduler.enqueue(bin(DataBinClass::Tile, 1, 10), 0, Some(VolumeRegion::new_2d(0, 0, 10, 10)));

		scheduler.set_window(window(200, 200, 50));
		assert_eq!(scheduler.pending_count(), 0);
		assert_eq!(scheduler.stats().interrupted, 1);

		// overlapping replacement does not interrupt
		scheduler.enqueue(bin(DataBinClass::Tile, 2, 10), 0, Some(VolumeRegion::new_2d(200, 200, 10, 10)));
		scheduler.set_window(window(220, 220, 50));
		assert_eq!(scheduler.pending_count(), 1);
		assert_eq!(scheduler.stats().interrupted, 1);
	}

	#[test]
	fn mvq_accounting() {
		let mut scheduler = scheduler(1_000_000);
		scheduler.set_window(window(0, 0, 100));
		scheduler.enqueue(bin(DataBinClass::Tile, 1, 10), 1, None); // layer 1 completes MVQ of 2
		scheduler.enqueue(bin(DataBinClass::Tile, 1, 10), 2, None);

		let batch = scheduler.next_batch_at(Instant::now() + Duration::from_secs(1));
		assert_eq!(batch.len(), 2);
		let stats = scheduler.stats();
		assert_eq!(stats.delivered, 2);
		assert_eq!(stats.mvq_delivered, 1);
		assert!(stats.time_to_mvq.is_some());
	}
}
