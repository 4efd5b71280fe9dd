//! Thread-safe consumer statistics
//!
//! One [`ConsumerMetrics`] is shared by every poll loop of a consumer.
//! Counters are atomics; handler timings live behind a mutex and are
//! bounded to the most recent measurements.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MAX_HANDLER_TIMINGS: usize = 1000;

/// Counters updated by the poll loops
#[derive(Debug)]
pub struct ConsumerMetrics {
    polls: AtomicU64,
    empty_polls: AtomicU64,
    deliveries: AtomicU64,
    acks: AtomicU64,
    handler_failures: AtomicU64,
    decode_failures: AtomicU64,
    malformed_responses: AtomicU64,
    connects: AtomicU64,
    connect_failures: AtomicU64,
    reconnects: AtomicU64,

    handler_times: Mutex<Vec<u64>>, // in milliseconds
    started_at: u64,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self {
            polls: AtomicU64::new(0),
            empty_polls: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            acks: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            malformed_responses: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            handler_times: Mutex::new(Vec::new()),
            started_at: current_timestamp(),
        }
    }

    // Poll cycle
    pub fn poll_sent(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_response(&self) {
        self.malformed_responses.fetch_add(1, Ordering::Relaxed);
    }

    // Dispatch
    pub fn message_delivered(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_completed(&self, duration: Duration) {
        self.record_handler_time(duration);
    }

    pub fn handler_failed(&self, duration: Duration) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
        self.record_handler_time(duration);
    }

    pub fn ack_sent(&self) {
        self.acks.fetch_add(1, Ordering::Relaxed);
    }

    // Connection
    pub fn connected(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_lost(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_handler_time(&self, duration: Duration) {
        if let Ok(mut times) = self.handler_times.lock() {
            times.push(duration.as_millis() as u64);

            if times.len() > MAX_HANDLER_TIMINGS {
                times.remove(0);
            }
        }
    }

    fn handler_time_statistics(&self) -> (f64, f64, f64) {
        let Ok(times) = self.handler_times.lock() else {
            return (0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0);
        }

        let mut sorted = times.clone();
        sorted.sort_unstable();
        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;

        (avg, percentile(&sorted, 50.0), percentile(&sorted, 95.0))
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg, p50, p95) = self.handler_time_statistics();

        MetricsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            acks: self.acks.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            malformed_responses: self.malformed_responses.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            avg_handler_time_ms: avg,
            handler_time_p50_ms: p50,
            handler_time_p95_ms: p95,
            uptime_seconds: now.saturating_sub(self.started_at),
            timestamp: now,
        }
    }
}

impl Default for ConsumerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable view of [`ConsumerMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub polls: u64,
    pub empty_polls: u64,
    pub deliveries: u64,
    pub acks: u64,
    pub handler_failures: u64,
    pub decode_failures: u64,
    pub malformed_responses: u64,
    pub connects: u64,
    pub connect_failures: u64,
    pub reconnects: u64,
    pub avg_handler_time_ms: f64,
    pub handler_time_p50_ms: f64,
    pub handler_time_p95_ms: f64,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower = sorted_data[index.floor() as usize] as f64;
        let upper = sorted_data[index.ceil() as usize] as f64;
        lower + (upper - lower) * index.fract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_poll_counters() {
        let metrics = ConsumerMetrics::new();

        metrics.poll_sent();
        metrics.poll_sent();
        metrics.empty_poll();
        metrics.malformed_response();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.polls, 2);
        assert_eq!(snapshot.empty_polls, 1);
        assert_eq!(snapshot.malformed_responses, 1);
        assert_eq!(snapshot.acks, 0);
    }

    #[test]
    fn test_handler_outcomes() {
        let metrics = ConsumerMetrics::new();

        metrics.message_delivered();
        metrics.handler_completed(Duration::from_millis(100));
        metrics.ack_sent();
        metrics.message_delivered();
        metrics.handler_failed(Duration::from_millis(300));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.deliveries, 2);
        assert_eq!(snapshot.acks, 1);
        assert_eq!(snapshot.handler_failures, 1);
        assert!((snapshot.avg_handler_time_ms - 200.0).abs() < 0.1);
        assert!((snapshot.handler_time_p50_ms - 200.0).abs() < 0.1);
    }

    #[test]
    fn test_connection_counters() {
        let metrics = ConsumerMetrics::new();

        metrics.connect_failed();
        metrics.connected();
        metrics.connection_lost();
        metrics.connected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connect_failures, 1);
        assert_eq!(snapshot.connects, 2);
        assert_eq!(snapshot.reconnects, 1);
    }

    #[test]
    fn test_thread_safety() {
        let metrics = Arc::new(ConsumerMetrics::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.poll_sent();
                        metrics.ack_sent();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.polls, 1000);
        assert_eq!(snapshot.acks, 1000);
    }

    #[test]
    fn test_percentile_calculation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        assert!((percentile(&data, 50.0) - 5.5).abs() < 0.1);
        assert!((percentile(&data, 95.0) - 9.55).abs() < 0.1);
        assert!((percentile(&data, 0.0) - 1.0).abs() < 0.1);
        assert!((percentile(&data, 100.0) - 10.0).abs() < 0.1);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_handler_timings_are_bounded() {
        let metrics = ConsumerMetrics::new();

        for i in 0..1500 {
            metrics.handler_completed(Duration::from_millis(i));
        }

        assert_eq!(metrics.handler_times.lock().unwrap().len(), MAX_HANDLER_TIMINGS);
        // Oldest 500 samples were dropped
        assert!(metrics.snapshot().avg_handler_time_ms > 900.0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = ConsumerMetrics::new();
        metrics.poll_sent();

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["polls"], 1);
        assert!(json.get("uptime_seconds").is_some());
    }
}
