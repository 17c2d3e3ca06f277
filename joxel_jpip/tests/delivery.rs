//! Integration tests for the delivery-side decision chain: cache eviction,
//! quality adaptation and push queueing.

use joxel_codec::{DataBin, DataBinClass};
use joxel_core::Blob;
use joxel_jpip::*;
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

#[test]
fn resolution_weighted_cache_keeps_the_thumbnail() {
	// Three 20-byte entries against a two-entry budget: the coarse entry
	// must outlive the fine one even though it arrived first.
	let mut cache = ClientCache::new(CacheConfig {
		max_entries: 2,
		max_memory: 100,
		enable_dedup: false,
		..CacheConfig::default()
	});
	let key = |id: u32| CacheKey::new("image", DataBinClass::Tile, id);
	let attrs = |level: u8| BinAttributes {
		resolution_level: level,
		is_complete: true,
		..BinAttributes::default()
	};

	cache.add(key(0), Blob::from(vec![0u8; 20]), attrs(0));
	cache.add(key(1), Blob::from(vec![1u8; 20]), attrs(5));
	cache.add(key(2), Blob::from(vec![2u8; 20]), attrs(1));

	assert!(cache.contains(&key(0)), "coarse level must survive");
	assert!(!cache.contains(&key(1)), "fine level must be evicted");
	assert!(cache.contains(&key(2)));
}

#[test]
fn quality_engine_tracks_the_link() {
	let estimate = |bps: f64| BandwidthEstimate {
		bandwidth_bps: bps,
		smoothed_bps: bps,
		predicted_bps: bps,
		average_rtt: Duration::from_millis(30),
		congestion_detected: false,
		trend: Trend::Stable,
		confidence: 1.0,
	};

	let mut fast = AdaptiveQualityEngine::new(QualityConfig::default());
	let decision = fast.decide(&estimate(10_000_000.0), Duration::from_millis(500));
	assert!(decision.target_quality_layers >= 4);

	let mut slow = AdaptiveQualityEngine::new(QualityConfig::default());
	let decision = slow.decide(&estimate(500_000.0), Duration::from_millis(500));
	assert!(decision.target_quality_layers <= 3);
	assert!(decision.use_progressive);
}

#[test]
fn push_queue_displacement_rules() {
	let item = |priority: PushStrategy| PushItem {
		bin: DataBin::new(DataBinClass::Tile, 0, Blob::from(vec![0u8; 4]), true),
		priority,
		session_id: "s1".to_string(),
		confidence: 0.5,
	};

	let mut scheduler = PushScheduler::new(3);
	for _ in 0..3 {
		scheduler.enqueue(item(PushStrategy::Quality)).unwrap();
	}

	// a fourth quality push is refused outright
	assert_eq!(scheduler.enqueue(item(PushStrategy::Quality)), Err(JpipError::QueueFull));
	assert_eq!(scheduler.len(), 3);

	// a resolution push displaces one of the quality pushes
	scheduler.enqueue(item(PushStrategy::Resolution)).unwrap();
	assert_eq!(scheduler.len(), 3);

	let batch = scheduler.dequeue_batch(3);
	assert_eq!(batch[0].priority, PushStrategy::Resolution);
	assert_eq!(batch.iter().filter(|i| i.priority == PushStrategy::Quality).count(), 2);
}

#[test]
fn bandwidth_estimation_feeds_quality_decisions() {
	let mut estimator = BandwidthEstimator::new(BandwidthConfig::default());
	let start = Instant::now();
	for second in 1..=6u64 {
		// 1.25 MB per second: a 10 Mbps link
		estimator.record_sample_at(
			BandwidthSample {
				bytes: 1_250_000,
				duration: Duration::from_secs(1),
				rtt: Duration::from_millis(25),
			},
			start + Duration::from_secs(second),
		);
	}
	let estimate = estimator.estimate();
	assert!((estimate.bandwidth_bps - 10_000_000.0).abs() < 1000.0);
	assert!(estimate.confidence > 0.9);

	let mut engine = AdaptiveQualityEngine::new(QualityConfig::default());
	let decision = engine.decide(&estimate, Duration::from_millis(500));
	assert!(decision.target_quality_layers >= 4);
	assert!(!decision.use_progressive);
}

#[test]
fn session_scoped_delta_delivery() {
	let mut tracker = ClientCacheTracker::new();
	let bins: Vec<DataBin> = (0..4)
		.map(|id| DataBin::new(DataBinClass::Tile, id, Blob::from(vec![id as u8]), true))
		.collect();

	tracker.record_received("s1", DataBinClass::Tile.as_u8(), 1);
	tracker.record_received("s1", DataBinClass::Tile.as_u8(), 3);

	let missing = tracker.filter_missing("s1", bins.clone());
	let ids: Vec<u32> = missing.iter().map(|bin| bin.id).collect();
	assert_eq!(ids, vec![0, 2]);

	// another session has received nothing yet
	assert_eq!(tracker.filter_missing("s2", bins).len(), 4);
}
