//! Sliding-window throughput estimation
//!
//! The monitor keeps `(timestamp, bytes)` samples for the last few seconds and
//! reports the rate over the span between the oldest and newest retained
//! sample. Samples age out as time passes, so an idle link decays to zero.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default measurement window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Estimates outbound bandwidth from bytes handed to the transport
#[derive(Debug, Clone)]
pub struct BandwidthMonitor {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    window_bytes: u64,
}

impl Default for BandwidthMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl BandwidthMonitor {
    /// Create a monitor with the given window
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
            window_bytes: 0,
        }
    }

    /// Record `bytes` sent now
    pub fn record_sent(&mut self, bytes: usize) {
        self.record_sent_at(Instant::now(), bytes);
    }

    /// Record `bytes` sent at `at`
    pub fn record_sent_at(&mut self, at: Instant, bytes: usize) {
        self.samples.push_back((at, bytes as u64));
        self.window_bytes += bytes as u64;
        self.evict(at);
    }

    /// Current estimate in megabits per second
    pub fn current_bandwidth_mbps(&mut self) -> f64 {
        self.current_bandwidth_mbps_at(Instant::now())
    }

    /// Estimate as seen at `now`
    ///
    /// Zero when fewer than two samples remain in the window or when all
    /// retained samples share one timestamp.
    pub fn current_bandwidth_mbps_at(&mut self, now: Instant) -> f64 {
        self.evict(now);
        if self.samples.len() < 2 {
            return 0.0;
        }

        let (Some((oldest, _)), Some((newest, _))) = (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let span = newest.saturating_duration_since(*oldest).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }

        (self.window_bytes as f64 * 8.0) / span / 1_000_000.0
    }

    /// Samples currently inside the window
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Bytes currently inside the window
    pub fn window_bytes(&self) -> u64 {
        self.window_bytes
    }

    /// Drop every sample
    pub fn reset(&mut self) {
        self.samples.clear();
        self.window_bytes = 0;
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(at, bytes)) = self.samples.front() {
            if now.saturating_duration_since(at) > self.window {
                self.samples.pop_front();
                self.window_bytes -= bytes;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_monitor_reports_zero() {
        let mut monitor = BandwidthMonitor::default();
        assert_eq!(monitor.current_bandwidth_mbps(), 0.0);
    }

    #[test]
    fn single_sample_reports_zero() {
        let mut monitor = BandwidthMonitor::default();
        let t0 = Instant::now();
        monitor.record_sent_at(t0, 1_000_000);
        assert_eq!(monitor.current_bandwidth_mbps_at(t0), 0.0);
    }

    #[test]
    fn identical_timestamps_report_zero() {
        let mut monitor = BandwidthMonitor::default();
        let t0 = Instant::now();
        monitor.record_sent_at(t0, 500);
        monitor.record_sent_at(t0, 500);
        assert_eq!(monitor.current_bandwidth_mbps_at(t0), 0.0);
    }

    #[test]
    fn rate_uses_sum_over_span() {
        let mut monitor = BandwidthMonitor::default();
        let t0 = Instant::now();
        // 3 * 125_000 bytes = 3 Mbit over a 2 second span
        for i in 0..3 {
            monitor.record_sent_at(t0 + Duration::from_secs(i), 125_000);
        }
        let mbps = monitor.current_bandwidth_mbps_at(t0 + Duration::from_secs(2));
        assert!((mbps - 1.5).abs() < 1e-9, "got {}", mbps);
    }

    #[test]
    fn old_samples_are_evicted() {
        let mut monitor = BandwidthMonitor::new(Duration::from_secs(5));
        let t0 = Instant::now();
        monitor.record_sent_at(t0, 10_000);
        monitor.record_sent_at(t0 + Duration::from_secs(1), 10_000);
        monitor.record_sent_at(t0 + Duration::from_secs(7), 10_000);

        assert_eq!(monitor.sample_count(), 1);
        assert_eq!(monitor.window_bytes(), 10_000);
    }

    #[test]
    fn idle_link_decays_to_zero() {
        let mut monitor = BandwidthMonitor::default();
        let t0 = Instant::now();
        monitor.record_sent_at(t0, 100_000);
        monitor.record_sent_at(t0 + Duration::from_secs(1), 100_000);
        assert!(monitor.current_bandwidth_mbps_at(t0 + Duration::from_secs(1)) > 0.0);

        assert_eq!(
            monitor.current_bandwidth_mbps_at(t0 + Duration::from_secs(30)),
            0.0
        );
        assert_eq!(monitor.sample_count(), 0);
    }
}
