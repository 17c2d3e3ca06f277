//! Bounded priority queue of server-initiated pushes.

use super::engine::PushStrategy;
use crate::error::{JpipError, Result};
use joxel_codec::DataBin;

/// One queued push.
#[derive(Clone, Debug)]
pub struct PushItem {
	pub bin: DataBin,
	pub priority: PushStrategy,
	pub session_id: String,
	/// Prediction confidence in `[0, 1]`.
	pub confidence: f64,
}

/// A bounded queue that drops its lowest-priority item for a strictly higher
/// arrival, and rejects equal-or-lower arrivals when full.
pub struct PushScheduler {
	capacity: usize,
	items: Vec<PushItem>,
}

impl PushScheduler {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			items: Vec::new(),
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.items.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Queues an item.
	///
	/// On overflow the lowest-priority queued item is displaced iff the new
	/// item outranks it; otherwise the enqueue fails with `QueueFull`.
	pub fn enqueue(&mut self, item: PushItem) -> Result<()> {
		if self.items.len() < self.capacity {
			self.items.push(item);
			return Ok(());
		}

		let lowest = self
			.items
			.iter()
			.enumerate()
			.min_by(|(_, a), (_, b)| {
				a.priority
					.cmp(&b.priority)
					.then_with(|| a.confidence.total_cmp(&b.confidence))
			})
			.map(|(index, _)| index)
			.expect("queue is full, so non-empty");

		if item.priority > self.items[lowest].priority {
			log::trace!("push queue full, displacing a {:?} item", self.items[lowest].priority);
			self.items.swap_remove(lowest);
			self.items.push(item);
			Ok(())
		} else {
			Err(JpipError::QueueFull)
		}
	}

	/// Removes up to `count` items in priority order, ties broken by
	/// confidence.
	pub fn dequeue_batch(&mut self, count: usize) -> Vec<PushItem> {
		self.items.sort_by(|a, b| {
			b.priority
				.cmp(&a.priority)
				.then_with(|| b.confidence.total_cmp(&a.confidence))
		});
		self.items.drain(..count.min(self.items.len())).collect()
	}

	/// Drops all items queued for one session. Returns the number dropped.
	pub fn drop_session(&mut self, session_id: &str) -> usize {
		let before = self.items.len();
		self.items.retain(|item| item.session_id != session_id);
		before - self.items.len()
	}
}
