//! Bounded, priority-ordered request queue.
//!
//! Session creation outranks metadata requests, which outrank image-data
//! requests; within a class requests keep arrival order.

use joxel_jpip::{JpipError, JpipRequest};
use std::collections::VecDeque;

/// Request classes, highest priority first.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum RequestClass {
	ImageData,
	Metadata,
	SessionCreation,
}

impl RequestClass {
	/// Classifies a parsed request.
	#[must_use]
	pub fn of(request: &JpipRequest) -> Self {
		if request.new_channel.is_some() {
			RequestClass::SessionCreation
		} else if request.want_metadata {
			RequestClass::Metadata
		} else {
			RequestClass::ImageData
		}
	}
}

/// One queued request with its originating client.
#[derive(Clone, Debug)]
pub struct QueuedRequest {
	pub client: String,
	pub request: JpipRequest,
	pub class: RequestClass,
}

/// Three FIFO lanes drained in priority order, bounded overall.
pub struct RequestQueue {
	capacity: usize,
	lanes: [VecDeque<QueuedRequest>; 3],
}

impl RequestQueue {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			lanes: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.lanes.iter().map(VecDeque::len).sum()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lane_index(class: RequestClass) -> usize {
		match class {
			RequestClass::SessionCreation => 0,
			RequestClass::Metadata => 1,
			RequestClass::ImageData => 2,
		}
	}

	/// Queues a request; `QueueFull` when the bound is reached.
	pub fn enqueue(&mut self, client: &str, request: JpipRequest) -> Result<(), JpipError> {
		if self.len() >= self.capacity {
			return Err(JpipError::QueueFull);
		}
		let class = RequestClass::of(&request);
		self.lanes[Self::lane_index(class)].push_back(QueuedRequest {
			client: client.to_string(),
			request,
			class,
		});
		Ok(())
	}

	/// The next request: highest class first, FIFO within a class.
	pub fn dequeue(&mut self) -> Option<QueuedRequest> {
		self.lanes.iter_mut().find_map(VecDeque::pop_front)
	}
}
