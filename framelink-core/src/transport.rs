//! Reconnecting WebSocket stream transport
//!
//! [`StreamTransport`] owns one persistent WebSocket connection to the
//! consumer. Frames are handed to a bounded outbound queue and written by a
//! background task, so [`StreamTransport::send`] never blocks the capture
//! loop. When the connection drops, the transport schedules a reconnect with
//! capped exponential backoff and publishes a fresh [`ConnectionStatus`]
//! snapshot on every transition.
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//!      ^                          |                  |
//!      |                        error          close / error
//!      |                          v                  v
//!      +------disconnect()---- Retrying <------------+
//!                                 |
//!                       timer --> Connecting
//! ```

use crate::codec::FrameCodec;
use crate::error::FrameLinkError;
use crate::frame::Frame;
use crate::status::{ConnectionStatus, FailureKind, TransportState};
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handle returned by [`StreamTransport::add_observer`]
pub type ObserverId = Uuid;

type StatusCallback = Arc<dyn Fn(&ConnectionStatus) + Send + Sync>;

/// Capped exponential reconnect backoff
///
/// `delay(n) = min(base * multiplier^n, max)` where `n` is the number of
/// consecutive failures before the one being scheduled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectBackoff {
    /// Delay before the first retry
    pub base: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: f64,
    /// Upper bound on any delay
    pub max: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            multiplier: 1.5,
            max: Duration::from_millis(5000),
        }
    }
}

impl ReconnectBackoff {
    /// Delay for the given retry attempt, rounded to whole milliseconds
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max_ms = self.max.as_secs_f64() * 1000.0;
        let raw_ms =
            self.base.as_secs_f64() * 1000.0 * self.multiplier.powi(attempt.min(64) as i32);
        Duration::from_millis(raw_ms.min(max_ms).round() as u64)
    }
}

/// Stream transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL of the consumer (`ws://` or `wss://`)
    pub server_url: String,
    /// Upper bound on a single connection attempt
    pub connect_timeout: Duration,
    /// Interval between keepalive pings
    pub keepalive_interval: Duration,
    /// Reconnect automatically after failures
    pub auto_reconnect: bool,
    /// Outbound frames buffered before new frames are dropped
    pub send_queue_capacity: usize,
    /// Reconnect delay schedule
    pub backoff: ReconnectBackoff,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8765/stream".to_string(),
            connect_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(10),
            auto_reconnect: true,
            send_queue_capacity: 4,
            backoff: ReconnectBackoff::default(),
        }
    }
}

impl TransportConfig {
    /// Configuration for `server_url` with default settings otherwise
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Check the configuration for values the transport cannot run with
    pub fn validate(&self) -> Result<(), FrameLinkError> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(FrameLinkError::InvalidConfiguration {
                field: "server_url".to_string(),
                reason: format!("expected a ws:// or wss:// URL, got {:?}", self.server_url),
            });
        }
        if self.keepalive_interval.is_zero() {
            return Err(FrameLinkError::InvalidConfiguration {
                field: "keepalive_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(FrameLinkError::InvalidConfiguration {
                field: "connect_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.send_queue_capacity == 0 {
            return Err(FrameLinkError::InvalidConfiguration {
                field: "send_queue_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Counters describing frames handled by the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Frames written to the socket
    pub frames_sent: u64,
    /// Bytes written to the socket
    pub bytes_sent: u64,
    /// Frames dropped: not connected, queue full, or socket write failed
    pub frames_dropped: u64,
}

/// Destination for encoded frames
///
/// Implementations must never block: a frame that cannot be accepted right
/// away is dropped and reported as such.
pub trait FrameSink: Send + Sync {
    /// Offer an encoded frame; returns whether it was accepted
    fn send_encoded(&self, frame: Bytes) -> bool;

    /// Whether the sink can currently accept frames
    fn is_connected(&self) -> bool;
}

/// Persistent, self-healing WebSocket connection for frame streaming
#[derive(Clone)]
pub struct StreamTransport {
    inner: Arc<TransportInner>,
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("server_url", &self.inner.config.server_url)
            .field("status", &*self.inner.status_tx.borrow())
            .field("observers_count", &self.inner.observers.len())
            .finish()
    }
}

struct TransportInner {
    config: TransportConfig,
    status_tx: watch::Sender<ConnectionStatus>,
    observers: DashMap<ObserverId, StatusCallback>,
    core: Mutex<TransportCore>,
    generation: AtomicU64,
    reconnect_enabled: AtomicBool,
    connecting: AtomicBool,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_dropped: AtomicU64,
}

/// State only touched while holding the core lock
#[derive(Default)]
struct TransportCore {
    active: Option<ActiveConnection>,
    timer: Option<ReconnectTimer>,
    next_timer_id: u64,
}

struct ActiveConnection {
    generation: u64,
    outbound: mpsc::Sender<Bytes>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ActiveConnection {
    /// Stop both tasks; dropping `outbound` lets the writer send a close frame
    fn shutdown(self) -> JoinHandle<()> {
        self.reader.abort();
        drop(self.outbound);
        self.writer
    }
}

/// Clears the in-flight flag when the attempt finishes or its future is dropped
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A scheduled reconnect; aborting `handle` invalidates it
struct ReconnectTimer {
    id: u64,
    delay: Duration,
    handle: JoinHandle<()>,
}

impl StreamTransport {
    /// Create a transport; no connection is made until [`connect`](Self::connect)
    pub fn new(config: TransportConfig) -> Result<Self, FrameLinkError> {
        config.validate()?;
        let (status_tx, _) = watch::channel(ConnectionStatus::initial(&config.server_url));

        Ok(Self {
            inner: Arc::new(TransportInner {
                reconnect_enabled: AtomicBool::new(config.auto_reconnect),
                config,
                status_tx,
                observers: DashMap::new(),
                core: Mutex::new(TransportCore::default()),
                generation: AtomicU64::new(0),
                connecting: AtomicBool::new(false),
                frames_sent: AtomicU64::new(0),
                bytes_sent: AtomicU64::new(0),
                frames_dropped: AtomicU64::new(0),
            }),
        })
    }

    /// Connect to the configured server
    ///
    /// Cancels any pending reconnect and makes one attempt immediately. On
    /// failure a reconnect is scheduled (when auto-reconnect is enabled) and
    /// the classified error is returned.
    pub async fn connect(&self) -> Result<(), FrameLinkError> {
        self.inner
            .reconnect_enabled
            .store(self.inner.config.auto_reconnect, Ordering::SeqCst);

        {
            let mut core = self.inner.core.lock();
            if core.active.is_some() {
                debug!("connect() called while already connected");
                return Ok(());
            }
            TransportInner::cancel_reconnect(&mut core);
        }

        Arc::clone(&self.inner).attempt(None).await
    }

    /// Close the connection and stop reconnecting until the next `connect()`
    pub async fn disconnect(&self) {
        self.inner.reconnect_enabled.store(false, Ordering::SeqCst);

        let (active, snapshot) = {
            let mut core = self.inner.core.lock();
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            TransportInner::cancel_reconnect(&mut core);
            let active = core.active.take();
            let snapshot = self.inner.replace_status(|status| {
                status.state = TransportState::Disconnected;
                status.connected = false;
                status.retry_count = 0;
                status.next_retry_delay = None;
            });
            (active, snapshot)
        };
        self.inner.notify(&snapshot);
        info!(server = %self.inner.config.server_url, "Transport disconnected");

        if let Some(active) = active {
            let writer = active.shutdown();
            if tokio::time::timeout(Duration::from_secs(1), writer)
                .await
                .is_err()
            {
                debug!("Writer did not finish closing in time");
            }
        }
    }

    /// Queue a frame for transmission
    ///
    /// Never blocks. Returns `false` and counts a dropped frame when the
    /// transport is not connected or the outbound queue is full.
    pub fn send(&self, frame: &Frame) -> bool {
        if !self.is_connected() {
            self.inner.record_dropped();
            trace!(sequence = frame.id.sequence, "Dropping frame: not connected");
            return false;
        }

        match FrameCodec::encode(frame) {
            Ok(bytes) => self.send_encoded(bytes),
            Err(e) => {
                warn!(sequence = frame.id.sequence, error = %e, "Failed to encode frame");
                self.inner.record_dropped();
                false
            }
        }
    }

    /// Queue an already encoded frame for transmission
    pub fn send_encoded(&self, frame: Bytes) -> bool {
        let outbound = {
            let core = self.inner.core.lock();
            core.active.as_ref().map(|active| active.outbound.clone())
        };

        let Some(outbound) = outbound else {
            self.inner.record_dropped();
            return false;
        };

        match outbound.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!("Dropping frame: send queue full");
                self.inner.record_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Dropping frame: connection closing");
                self.inner.record_dropped();
                false
            }
        }
    }

    /// Latest status snapshot
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Receiver that always holds the latest status snapshot
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Register a callback invoked with every new status snapshot
    pub fn add_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.inner.observers.insert(id, Arc::new(observer));
        id
    }

    /// Remove a previously registered callback
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(&id).is_some()
    }

    /// Whether frames can currently be sent
    pub fn is_connected(&self) -> bool {
        self.inner.status_tx.borrow().connected
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransportState {
        self.inner.status_tx.borrow().state
    }

    /// Delay of the reconnect currently pending, if any
    pub fn pending_reconnect(&self) -> Option<Duration> {
        self.inner.core.lock().timer.as_ref().map(|timer| timer.delay)
    }

    /// Frame counters
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            frames_sent: self.inner.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.inner.bytes_sent.load(Ordering::Relaxed),
            frames_dropped: self.inner.frames_dropped.load(Ordering::Relaxed),
        }
    }

    /// Frames dropped since the transport was created
    pub fn dropped_frames(&self) -> u64 {
        self.inner.frames_dropped.load(Ordering::Relaxed)
    }

    /// Transport configuration
    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }
}

impl FrameSink for StreamTransport {
    fn send_encoded(&self, frame: Bytes) -> bool {
        StreamTransport::send_encoded(self, frame)
    }

    fn is_connected(&self) -> bool {
        StreamTransport::is_connected(self)
    }
}

impl TransportInner {
    /// Build the next snapshot from the current one and publish it
    ///
    /// Callers hold the core lock, which makes this the single writer.
    fn replace_status<F>(&self, update: F) -> ConnectionStatus
    where
        F: FnOnce(&mut ConnectionStatus),
    {
        let mut next = self.status_tx.borrow().clone();
        update(&mut next);
        self.status_tx.send_replace(next.clone());
        next
    }

    /// Invoke observer callbacks; must be called without the core lock held
    fn notify(&self, status: &ConnectionStatus) {
        let observers: Vec<StatusCallback> = self
            .observers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for observer in observers {
            observer(status);
        }
    }

    fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn cancel_reconnect(core: &mut TransportCore) {
        if let Some(timer) = core.timer.take() {
            debug!(delay = ?timer.delay, "Cancelling pending reconnect");
            timer.handle.abort();
        }
    }

    /// One connection attempt
    ///
    /// `expected_generation` ties a timer-driven attempt to the state it was
    /// scheduled in; a `disconnect()` in between turns it into a no-op.
    fn attempt(
        self: Arc<Self>,
        expected_generation: Option<u64>,
    ) -> BoxFuture<'static, Result<(), FrameLinkError>> {
        async move {
            let (in_flight, generation, snapshot) = {
                let _core = self.core.lock();
                if let Some(expected) = expected_generation {
                    if self.generation.load(Ordering::SeqCst) != expected {
                        return Err(FrameLinkError::InvalidState {
                            expected: TransportState::Retrying.to_string(),
                            actual: self.status_tx.borrow().state.to_string(),
                        });
                    }
                }
                if self.connecting.swap(true, Ordering::SeqCst) {
                    return Err(FrameLinkError::InvalidState {
                        expected: "no attempt in flight".to_string(),
                        actual: TransportState::Connecting.to_string(),
                    });
                }
                let in_flight = InFlight(&self.connecting);
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let snapshot = self.replace_status(|status| {
                    status.state = TransportState::Connecting;
                    status.connected = false;
                    status.connection_attempts += 1;
                    status.next_retry_delay = None;
                });
                (in_flight, generation, snapshot)
            };
            self.notify(&snapshot);
            info!(
                server = %self.config.server_url,
                attempt = snapshot.connection_attempts,
                "Connecting"
            );

            let result = tokio::time::timeout(
                self.config.connect_timeout,
                connect_async(self.config.server_url.as_str()),
            )
            .await;
            drop(in_flight);

            match result {
                Ok(Ok((stream, response))) => {
                    self.on_connected(generation, stream, response.status().as_u16())
                }
                Ok(Err(e)) => {
                    let response_code = match &e {
                        tokio_tungstenite::tungstenite::Error::Http(response) => {
                            Some(response.status().as_u16())
                        }
                        _ => None,
                    };
                    Err(self.on_connect_failed(
                        generation,
                        FailureKind::from_ws(&e),
                        e.to_string(),
                        response_code,
                    ))
                }
                Err(_) => Err(self.on_connect_failed(
                    generation,
                    FailureKind::Timeout,
                    format!("no answer within {:?}", self.config.connect_timeout),
                    None,
                )),
            }
        }
        .boxed()
    }

    fn on_connected(
        self: &Arc<Self>,
        generation: u64,
        stream: WsStream,
        response_code: u16,
    ) -> Result<(), FrameLinkError> {
        let (sink, source) = stream.split();

        let snapshot = {
            let mut core = self.core.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!("Discarding connection established after disconnect()");
                return Err(FrameLinkError::InvalidState {
                    expected: TransportState::Connecting.to_string(),
                    actual: self.status_tx.borrow().state.to_string(),
                });
            }
            Self::cancel_reconnect(&mut core);

            let (outbound_tx, outbound_rx) = mpsc::channel(self.config.send_queue_capacity);
            let last_seen = Arc::new(Mutex::new(Instant::now()));
            let writer = tokio::spawn(run_writer(
                Arc::downgrade(self),
                generation,
                sink,
                outbound_rx,
                Arc::clone(&last_seen),
                self.config.keepalive_interval,
            ));
            let reader = tokio::spawn(run_reader(
                Arc::downgrade(self),
                generation,
                source,
                last_seen,
            ));
            core.active = Some(ActiveConnection {
                generation,
                outbound: outbound_tx,
                reader,
                writer,
            });

            self.replace_status(|status| {
                status.state = TransportState::Connected;
                status.connected = true;
                status.retry_count = 0;
                status.next_retry_delay = None;
                status.last_response_code = Some(response_code);
            })
        };
        self.notify(&snapshot);
        info!(server = %self.config.server_url, "Connected");
        Ok(())
    }

    fn on_connect_failed(
        self: &Arc<Self>,
        generation: u64,
        kind: FailureKind,
        reason: String,
        response_code: Option<u16>,
    ) -> FrameLinkError {
        let error = |retry_in| FrameLinkError::Connection {
            address: self.config.server_url.clone(),
            kind,
            reason: reason.clone(),
            retry_in,
        };

        let snapshot = {
            let mut core = self.core.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                return error(None);
            }
            let delay = self.schedule_reconnect(&mut core);
            self.replace_status(|status| {
                status.state = if delay.is_some() {
                    TransportState::Retrying
                } else {
                    TransportState::Disconnected
                };
                status.connected = false;
                status.last_error = Some(format!("{}: {}", kind, reason));
                status.last_error_kind = Some(kind);
                status.last_error_at = Some(Utc::now());
                status.next_retry_delay = delay;
                if delay.is_some() {
                    status.retry_count += 1;
                }
                if response_code.is_some() {
                    status.last_response_code = response_code;
                }
            })
        };
        self.notify(&snapshot);
        warn!(
            server = %self.config.server_url,
            kind = %kind,
            retry_in = ?snapshot.next_retry_delay,
            "Connection attempt failed: {}",
            reason
        );

        error(snapshot.next_retry_delay)
    }

    /// Close or error on an established connection
    fn on_connection_lost(self: &Arc<Self>, generation: u64, kind: FailureKind, reason: String) {
        let (active, snapshot) = {
            let mut core = self.core.lock();
            match &core.active {
                Some(active) if active.generation == generation => {}
                _ => return,
            }
            let active = core.active.take();
            self.generation.fetch_add(1, Ordering::SeqCst);

            let delay = self.schedule_reconnect(&mut core);
            let snapshot = self.replace_status(|status| {
                status.state = if delay.is_some() {
                    TransportState::Retrying
                } else {
                    TransportState::Disconnected
                };
                status.connected = false;
                status.last_error = Some(format!("{}: {}", kind, reason));
                status.last_error_kind = Some(kind);
                status.last_error_at = Some(Utc::now());
                status.next_retry_delay = delay;
                if delay.is_some() {
                    status.retry_count += 1;
                }
            });
            (active, snapshot)
        };
        self.notify(&snapshot);
        warn!(
            server = %self.config.server_url,
            kind = %kind,
            retry_in = ?snapshot.next_retry_delay,
            "Connection lost: {}",
            reason
        );

        if let Some(active) = active {
            drop(active.shutdown());
        }
    }

    /// Arm the reconnect timer; a no-op while one is already pending
    fn schedule_reconnect(self: &Arc<Self>, core: &mut TransportCore) -> Option<Duration> {
        if !self.reconnect_enabled.load(Ordering::SeqCst) {
            return None;
        }
        if let Some(timer) = &core.timer {
            debug!(delay = ?timer.delay, "Reconnect already pending");
            return Some(timer.delay);
        }

        let retry_count = self.status_tx.borrow().retry_count;
        let delay = self.config.backoff.delay_for(retry_count);
        let generation = self.generation.load(Ordering::SeqCst);
        core.next_timer_id += 1;
        let id = core.next_timer_id;

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_reconnect(id, generation).await;
            }
        });
        core.timer = Some(ReconnectTimer { id, delay, handle });
        debug!(delay = ?delay, retry = retry_count + 1, "Reconnect scheduled");
        Some(delay)
    }

    async fn fire_reconnect(self: Arc<Self>, id: u64, generation: u64) {
        {
            let mut core = self.core.lock();
            if core.timer.as_ref().map(|timer| timer.id) != Some(id) {
                return;
            }
            core.timer = None;
        }
        if let Err(e) = Arc::clone(&self).attempt(Some(generation)).await {
            debug!(error = %e, "Reconnect attempt failed");
        }
    }
}

impl Drop for TransportInner {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        if let Some(timer) = core.timer.take() {
            timer.handle.abort();
        }
        if let Some(active) = core.active.take() {
            active.reader.abort();
            active.writer.abort();
        }
    }
}

async fn run_writer(
    inner: Weak<TransportInner>,
    generation: u64,
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::Receiver<Bytes>,
    last_seen: Arc<Mutex<Instant>>,
    keepalive: Duration,
) {
    let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + keepalive, keepalive);

    let lost = loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(frame) => {
                    let len = frame.len();
                    match sink.send(Message::Binary(frame.to_vec())).await {
                        Ok(()) => {
                            if let Some(inner) = inner.upgrade() {
                                inner.record_sent(len);
                            }
                        }
                        // Counted only; the reader or keepalive reports the dead connection.
                        Err(e) => {
                            trace!(error = %e, "Frame write failed");
                            if let Some(inner) = inner.upgrade() {
                                inner.record_dropped();
                            }
                        }
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    break None;
                }
            },
            _ = ping.tick() => {
                let silent_for = last_seen.lock().elapsed();
                if silent_for > keepalive * 2 {
                    break Some((
                        FailureKind::Timeout,
                        format!("no traffic from server for {:?}", silent_for),
                    ));
                }
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    break Some((FailureKind::from_ws(&e), e.to_string()));
                }
            }
        }
    };

    if let Some((kind, reason)) = lost {
        if let Some(inner) = inner.upgrade() {
            inner.on_connection_lost(generation, kind, reason);
        }
    }
}

async fn run_reader(
    inner: Weak<TransportInner>,
    generation: u64,
    mut source: SplitStream<WsStream>,
    last_seen: Arc<Mutex<Instant>>,
) {
    let (kind, reason) = loop {
        match source.next().await {
            Some(Ok(message)) => {
                *last_seen.lock() = Instant::now();
                match message {
                    Message::Text(text) => info!(message = %text, "Server message"),
                    Message::Binary(data) => debug!(bytes = data.len(), "Server binary message"),
                    Message::Ping(_) | Message::Pong(_) => trace!("Keepalive"),
                    Message::Close(frame) => {
                        let reason = match frame {
                            Some(frame) => format!("server closed connection ({})", frame.code),
                            None => "server closed connection".to_string(),
                        };
                        break (FailureKind::ConnectionLost, reason);
                    }
                    Message::Frame(_) => {}
                }
            }
            Some(Err(e)) => break (FailureKind::from_ws(&e), e.to_string()),
            None => break (FailureKind::ConnectionLost, "connection closed".to_string()),
        }
    };

    if let Some(inner) = inner.upgrade() {
        inner.on_connection_lost(generation, kind, reason);
    }
}
