//! Orchestration of predictive pushing.
//!
//! The manager glues the prediction engine, the client-knowledge tracker and
//! the bounded push queue together. It never holds sessions — callers pass
//! session ids, and a prediction only turns into a queued push when the peer
//! is not known to hold the bin already (delta delivery) and the session's
//! acceptance state allows it.

use super::engine::{PredictivePushEngine, TilePrediction};
use super::scheduler::{PushItem, PushScheduler};
use crate::throttle::BandwidthThrottle;
use joxel_codec::DataBin;
use joxel_core::Viewport;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Client-announced willingness to receive pushes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PushAcceptance {
	#[default]
	Accept,
	Reject,
	Throttle,
	Stop,
}

/// Tracks which bins each session is known to hold.
#[derive(Debug, Default)]
pub struct ClientCacheTracker {
	known: HashMap<String, HashSet<(u8, u32)>>,
}

impl ClientCacheTracker {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Records that the session holds `(class, id)`.
	pub fn record_received(&mut self, session_id: &str, bin_class: u8, bin_id: u32) {
		self.known.entry(session_id.to_string()).or_default().insert((bin_class, bin_id));
	}

	#[must_use]
	pub fn knows(&self, session_id: &str, bin_class: u8, bin_id: u32) -> bool {
		self
			.known
			.get(session_id)
			.is_some_and(|bins| bins.contains(&(bin_class, bin_id)))
	}

	/// Returns exactly the bins the session has not received yet.
	#[must_use]
	pub fn filter_missing(&self, session_id: &str, bins: Vec<DataBin>) -> Vec<DataBin> {
		bins
			.into_iter()
			.filter(|bin| !self.knows(session_id, bin.class.as_u8(), bin.id))
			.collect()
	}

	pub fn forget_session(&mut self, session_id: &str) {
		self.known.remove(session_id);
	}
}

/// Statistics over the push pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PushStats {
	pub predicted: u64,
	pub suppressed_known: u64,
	pub enqueued: u64,
	pub pushed: u64,
	pub throttled: u64,
}

/// Drives predictions into the push queue and drains it under the throttle.
pub struct PushManager {
	engine: PredictivePushEngine,
	scheduler: PushScheduler,
	tracker: ClientCacheTracker,
	throttle: Arc<BandwidthThrottle>,
	acceptance: HashMap<String, PushAcceptance>,
	stats: PushStats,
}

impl PushManager {
	#[must_use]
	pub fn new(engine: PredictivePushEngine, queue_capacity: usize, throttle: Arc<BandwidthThrottle>) -> Self {
		Self {
			engine,
			scheduler: PushScheduler::new(queue_capacity),
			tracker: ClientCacheTracker::new(),
			throttle,
			acceptance: HashMap::new(),
			stats: PushStats::default(),
		}
	}

	pub fn set_acceptance(&mut self, session_id: &str, acceptance: PushAcceptance) {
		self.acceptance.insert(session_id.to_string(), acceptance);
	}

	#[must_use]
	pub fn acceptance(&self, session_id: &str) -> PushAcceptance {
		self.acceptance.get(session_id).copied().unwrap_or_default()
	}

	#[must_use]
	pub fn tracker_mut(&mut self) -> &mut ClientCacheTracker {
		&mut self.tracker
	}

	#[must_use]
	pub fn stats(&self) -> PushStats {
		self.stats
	}

	#[must_use]
	pub fn queued_count(&self) -> usize {
		self.scheduler.len()
	}

	/// Handles a viewport update: predicts, filters known bins, queues the
	/// rest.
	///
	/// `resolve_bin` maps a prediction to the data bin that would satisfy it;
	/// returning `None` skips the prediction (for example, the tile does not
	/// exist on disk yet).
	pub fn on_viewport_update(
		&mut self,
		session_id: &str,
		viewport: Viewport,
		mut resolve_bin: impl FnMut(&TilePrediction) -> Option<DataBin>,
	) {
		self.engine.record_viewport(session_id, viewport);
		match self.acceptance(session_id) {
			PushAcceptance::Reject | PushAcceptance::Stop => return,
			PushAcceptance::Accept | PushAcceptance::Throttle => {}
		}

		let predictions = self.engine.predict(session_id);
		self.stats.predicted += predictions.len() as u64;

		for prediction in predictions {
			let Some(bin) = resolve_bin(&prediction) else { continue };
			if self.tracker.knows(session_id, bin.class.as_u8(), bin.id) {
				self.stats.suppressed_known += 1;
				continue;
			}
			let item = PushItem {
				bin,
				priority: prediction.strategy,
				session_id: session_id.to_string(),
				confidence: prediction.confidence,
			};
			if self.scheduler.enqueue(item).is_ok() {
				self.stats.enqueued += 1;
			}
		}
	}

	/// Drains up to `max_items` pushes that fit the bandwidth budget.
	///
	/// Items whose session no longer accepts pushes are discarded; items the
	/// throttle refuses go back to the queue.
	pub fn drain(&mut self, max_items: usize) -> Vec<PushItem> {
		let mut sent = Vec::new();
		let mut requeue = Vec::new();
		for item in self.scheduler.dequeue_batch(max_items) {
			match self.acceptance(&item.session_id) {
				PushAcceptance::Reject | PushAcceptance::Stop => continue,
				PushAcceptance::Accept | PushAcceptance::Throttle => {}
			}
			let bytes = item.bin.len() as u64;
			if self.throttle.can_send(&item.session_id, bytes) {
				self.throttle.record_sent(&item.session_id, bytes);
				self.tracker.record_received(&item.session_id, item.bin.class.as_u8(), item.bin.id);
				self.stats.pushed += 1;
				sent.push(item);
			} else {
				self.stats.throttled += 1;
				requeue.push(item);
			}
		}
		for item in requeue {
			let _ = self.scheduler.enqueue(item);
		}
		sent
	}

	/// Removes all per-session state after a session closes.
	pub fn forget_session(&mut self, session_id: &str) {
		self.engine.forget_session(session_id);
		self.tracker.forget_session(session_id);
		self.acceptance.remove(session_id);
		self.scheduler.drop_session(session_id);
	}
}
