//! Connection state analysis and diagnostics

use chrono::{DateTime, Utc};
use framelink_core::{
    ConnectionStatus, FailureKind, FrameLinkError, ObserverId, StreamTransport, TransportState,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// One observed status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// When the transition was observed
    pub observed_at: DateTime<Utc>,
    /// State after the transition
    pub state: TransportState,
    /// Failure category, when the transition was caused by a failure
    pub failure: Option<FailureKind>,
    /// Consecutive failures at this point
    pub retry_count: u32,
}

/// Summary of a transport's connection history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionReport {
    /// Server the transport connects to
    pub server_address: String,
    /// State at report time
    pub current_state: TransportState,
    /// Connection attempts made
    pub connection_attempts: u32,
    /// Failures observed
    pub failures: u64,
    /// Failures observed per category
    pub failures_by_kind: HashMap<FailureKind, u64>,
    /// Last failure message
    pub last_error: Option<String>,
    /// Share of observed time spent connected (0.0 to 1.0)
    pub connected_ratio: f64,
    /// Transitions kept in the history
    pub history: Vec<StatusEvent>,
    /// When the report was generated
    pub generated_at: DateTime<Utc>,
}

impl ConnectionReport {
    /// Pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String, FrameLinkError> {
        serde_json::to_string_pretty(self).map_err(|e| FrameLinkError::EncodingFailed {
            reason: e.to_string(),
        })
    }
}

/// Accumulates status snapshots into a diagnostic report
#[derive(Debug)]
pub struct ConnectionAnalyzer {
    history: VecDeque<StatusEvent>,
    capacity: usize,
    failures_by_kind: HashMap<FailureKind, u64>,
    last_error_at: Option<DateTime<Utc>>,
    latest: Option<ConnectionStatus>,
    started: Option<Instant>,
    connected_since: Option<Instant>,
    connected_total: Duration,
}

/// Analyzer shared with a transport observer
pub type SharedAnalyzer = Arc<Mutex<ConnectionAnalyzer>>;

impl ConnectionAnalyzer {
    /// Analyzer keeping up to `capacity` transitions
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            failures_by_kind: HashMap::new(),
            last_error_at: None,
            latest: None,
            started: None,
            connected_since: None,
            connected_total: Duration::ZERO,
        }
    }

    /// Register an analyzer as an observer of `transport`
    pub fn attach(transport: &StreamTransport, capacity: usize) -> (SharedAnalyzer, ObserverId) {
        let analyzer = Arc::new(Mutex::new(Self::new(capacity)));
        analyzer.lock().record(&transport.status());

        let observer = Arc::clone(&analyzer);
        let id = transport.add_observer(move |status| observer.lock().record(status));
        (analyzer, id)
    }

    /// Record a status snapshot observed now
    pub fn record(&mut self, status: &ConnectionStatus) {
        self.record_at(status, Instant::now());
    }

    /// Record a status snapshot observed at `now`
    pub fn record_at(&mut self, status: &ConnectionStatus, now: Instant) {
        self.started.get_or_insert(now);

        let new_failure = status.last_error_at.is_some() && status.last_error_at != self.last_error_at;
        if new_failure {
            self.last_error_at = status.last_error_at;
            if let Some(kind) = status.last_error_kind {
                *self.failures_by_kind.entry(kind).or_insert(0) += 1;
            }
        }

        match (self.connected_since, status.connected) {
            (None, true) => self.connected_since = Some(now),
            (Some(since), false) => {
                self.connected_total += now.saturating_duration_since(since);
                self.connected_since = None;
            }
            _ => {}
        }

        let changed = self
            .latest
            .as_ref()
            .map_or(true, |previous| previous.state != status.state || new_failure);
        if changed {
            if self.history.len() == self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(StatusEvent {
                observed_at: Utc::now(),
                state: status.state,
                failure: if new_failure { status.last_error_kind } else { None },
                retry_count: status.retry_count,
            });
            debug!(state = %status.state, failure = new_failure, "Recorded status transition");
        }

        self.latest = Some(status.clone());
    }

    /// Failures observed so far
    pub fn failure_count(&self) -> u64 {
        self.failures_by_kind.values().sum()
    }

    /// Transitions currently kept
    pub fn history(&self) -> impl Iterator<Item = &StatusEvent> {
        self.history.iter()
    }

    /// Report as of now
    pub fn report(&self) -> ConnectionReport {
        self.report_at(Instant::now())
    }

    /// Report as of `now`
    pub fn report_at(&self, now: Instant) -> ConnectionReport {
        let mut connected = self.connected_total;
        if let Some(since) = self.connected_since {
            connected += now.saturating_duration_since(since);
        }
        let observed = self
            .started
            .map_or(Duration::ZERO, |started| now.saturating_duration_since(started));
        let connected_ratio = if observed.is_zero() {
            0.0
        } else {
            (connected.as_secs_f64() / observed.as_secs_f64()).min(1.0)
        };

        let latest = self.latest.as_ref();
        ConnectionReport {
            server_address: latest.map(|s| s.server_address.clone()).unwrap_or_default(),
            current_state: latest.map_or(TransportState::Disconnected, |s| s.state),
            connection_attempts: latest.map_or(0, |s| s.connection_attempts),
            failures: self.failure_count(),
            failures_by_kind: self.failures_by_kind.clone(),
            last_error: latest.and_then(|s| s.last_error.clone()),
            connected_ratio,
            history: self.history.iter().cloned().collect(),
            generated_at: Utc::now(),
        }
    }
}

impl Default for ConnectionAnalyzer {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn status(state: TransportState) -> ConnectionStatus {
        let mut status = ConnectionStatus::initial("ws://127.0.0.1:8765/stream");
        status.state = state;
        status.connected = state == TransportState::Connected;
        status
    }

    fn failed(kind: FailureKind, second: u32) -> ConnectionStatus {
        let mut status = status(TransportState::Retrying);
        status.last_error = Some(format!("{}: test", kind));
        status.last_error_kind = Some(kind);
        status.last_error_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, second).single();
        status.retry_count = 1;
        status
    }

    #[test]
    fn counts_each_failure_once() {
        let mut analyzer = ConnectionAnalyzer::default();
        let refused = failed(FailureKind::ConnectionRefused, 1);

        analyzer.record(&status(TransportState::Connecting));
        analyzer.record(&refused);
        analyzer.record(&refused);
        analyzer.record(&failed(FailureKind::Timeout, 2));

        let report = analyzer.report();
        assert_eq!(report.failures, 2);
        assert_eq!(report.failures_by_kind[&FailureKind::ConnectionRefused], 1);
        assert_eq!(report.failures_by_kind[&FailureKind::Timeout], 1);
        assert_eq!(report.current_state, TransportState::Retrying);
        assert_eq!(report.history.len(), 3);
    }

    #[test]
    fn history_is_bounded() {
        let mut analyzer = ConnectionAnalyzer::new(2);
        analyzer.record(&status(TransportState::Connecting));
        analyzer.record(&status(TransportState::Connected));
        analyzer.record(&status(TransportState::Disconnected));

        let states: Vec<_> = analyzer.history().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![TransportState::Connected, TransportState::Disconnected]
        );
    }

    #[test]
    fn connected_ratio_tracks_time() {
        let mut analyzer = ConnectionAnalyzer::default();
        let t0 = Instant::now();

        analyzer.record_at(&status(TransportState::Connecting), t0);
        analyzer.record_at(&status(TransportState::Connected), t0 + Duration::from_secs(1));
        analyzer.record_at(
            &status(TransportState::Retrying),
            t0 + Duration::from_secs(3),
        );

        let report = analyzer.report_at(t0 + Duration::from_secs(4));
        assert!((report.connected_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn report_serializes() {
        let mut analyzer = ConnectionAnalyzer::default();
        analyzer.record(&failed(FailureKind::Tls, 5));

        let json = analyzer.report().to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["failures"], 1);
        assert_eq!(value["failures_by_kind"]["Tls"], 1);
    }
}
