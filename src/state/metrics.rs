use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Sliding window for the relay rate (milliseconds)
const RATE_WINDOW_MS: i64 = 5000;

/// Traffic counters for the relay
#[derive(Clone)]
pub struct RelayMetrics {
    /// Inbound messages seen on the backend bus
    received: Arc<AtomicU64>,

    /// Device payloads (and overall summaries) queued for the device bus
    relayed: Arc<AtomicU64>,

    /// Unrecognized topics and unmapped tools
    ignored: Arc<AtomicU64>,

    /// Malformed payloads
    dropped: Arc<AtomicU64>,

    /// Device bus publishes that could not be queued
    publish_failures: Arc<AtomicU64>,

    /// Relay timestamps for rate calculation
    relay_timestamps: Arc<Mutex<VecDeque<i64>>>,

    /// Inbound topic -> message count
    topic_counts: Arc<DashMap<String, u64>>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            received: Arc::new(AtomicU64::new(0)),
            relayed: Arc::new(AtomicU64::new(0)),
            ignored: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            publish_failures: Arc::new(AtomicU64::new(0)),
            relay_timestamps: Arc::new(Mutex::new(VecDeque::new())),
            topic_counts: Arc::new(DashMap::new()),
        }
    }

    /// Record an inbound message
    pub fn record_received(&self, topic: &str) {
        self.received.fetch_add(1, Ordering::Relaxed);
        *self.topic_counts.entry(topic.to_string()).or_insert(0) += 1;
    }

    /// Record a payload handed to the device bus
    pub fn record_relayed(&self) {
        self.relayed.fetch_add(1, Ordering::Relaxed);

        let now = Utc::now().timestamp_millis();
        let mut timestamps = self
            .relay_timestamps
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        timestamps.push_back(now);

        while let Some(&oldest) = timestamps.front() {
            if now - oldest > RATE_WINDOW_MS {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Relayed messages per second over the last 5 seconds
    pub fn relay_rate(&self) -> f64 {
        let timestamps = self
            .relay_timestamps
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        timestamps.len() as f64 / (RATE_WINDOW_MS as f64 / 1000.0)
    }

    /// Messages seen on a given inbound topic
    pub fn topic_count(&self, topic: &str) -> u64 {
        self.topic_counts.get(topic).map(|c| *c).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            relay_rate: self.relay_rate(),
            distinct_topics: self.topic_counts.len(),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of relay metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub relayed: u64,
    pub ignored: u64,
    pub dropped: u64,
    pub publish_failures: u64,
    pub relay_rate: f64,
    pub distinct_topics: usize,
}
