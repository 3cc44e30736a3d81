//! Connection status snapshots published by the stream transport

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::time::Duration;
use tokio_tungstenite::tungstenite;

/// Lifecycle state of the stream transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportState {
    /// Idle, no reconnect pending
    Disconnected,
    /// A connection attempt is in progress
    Connecting,
    /// Frames can be sent
    Connected,
    /// Waiting for a scheduled reconnect
    Retrying,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Disconnected => write!(f, "disconnected"),
            TransportState::Connecting => write!(f, "connecting"),
            TransportState::Connected => write!(f, "connected"),
            TransportState::Retrying => write!(f, "retrying"),
        }
    }
}

/// Diagnostic category of a connection failure
///
/// Used for display and reporting only; every category is retried the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The server actively refused the connection
    ConnectionRefused,
    /// The host name could not be resolved
    UnresolvableHost,
    /// The attempt or the connection timed out
    Timeout,
    /// TLS negotiation failed
    Tls,
    /// The peer closed or reset an established connection
    ConnectionLost,
    /// Anything else
    Other,
}

impl FailureKind {
    /// Human readable category
    pub fn describe(&self) -> &'static str {
        match self {
            FailureKind::ConnectionRefused => "connection refused",
            FailureKind::UnresolvableHost => "unresolvable host",
            FailureKind::Timeout => "timed out",
            FailureKind::Tls => "TLS error",
            FailureKind::ConnectionLost => "connection lost",
            FailureKind::Other => "network error",
        }
    }

    /// Classify an I/O error raised while connecting or streaming
    pub fn from_io(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionRefused => FailureKind::ConnectionRefused,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FailureKind::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => FailureKind::ConnectionLost,
            _ if looks_like_dns_failure(&error.to_string()) => FailureKind::UnresolvableHost,
            _ => FailureKind::Other,
        }
    }

    /// Classify a WebSocket error
    pub fn from_ws(error: &tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::Io(e) => Self::from_io(e),
            tungstenite::Error::Tls(_) => FailureKind::Tls,
            tungstenite::Error::Url(tungstenite::error::UrlError::TlsFeatureNotEnabled) => {
                FailureKind::Tls
            }
            tungstenite::Error::Url(tungstenite::error::UrlError::NoHostName) => {
                FailureKind::UnresolvableHost
            }
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(_) => FailureKind::ConnectionLost,
            _ => FailureKind::Other,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

fn looks_like_dns_failure(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    [
        "failed to lookup address",
        "name or service not known",
        "nodename nor servname",
        "no such host",
        "temporary failure in name resolution",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}

/// Immutable snapshot of the transport's connection state
///
/// A new snapshot replaces the previous one on every transition; observers
/// never see a partially updated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Current lifecycle state
    pub state: TransportState,
    /// Whether frames can currently be sent
    pub connected: bool,
    /// Category and human readable description of the last failure
    pub last_error: Option<String>,
    /// Category of the last failure
    pub last_error_kind: Option<FailureKind>,
    /// When the last failure happened
    pub last_error_at: Option<DateTime<Utc>>,
    /// Connection attempts made since the transport was created
    pub connection_attempts: u32,
    /// Consecutive failed attempts since the last successful connection
    pub retry_count: u32,
    /// Delay before the pending reconnect fires
    pub next_retry_delay: Option<Duration>,
    /// Server the transport connects to
    pub server_address: String,
    /// Last HTTP status seen during the WebSocket handshake
    pub last_response_code: Option<u16>,
}

impl ConnectionStatus {
    /// Initial snapshot for a transport targeting `server_address`
    pub fn initial(server_address: impl Into<String>) -> Self {
        Self {
            state: TransportState::Disconnected,
            connected: false,
            last_error: None,
            last_error_kind: None,
            last_error_at: None,
            connection_attempts: 0,
            retry_count: 0,
            next_retry_delay: None,
            server_address: server_address.into(),
            last_response_code: None,
        }
    }

    /// Short one-line summary suitable for a status bar
    pub fn summary(&self) -> String {
        match (self.state, &self.last_error) {
            (TransportState::Connected, _) => format!("connected to {}", self.server_address),
            (TransportState::Retrying, Some(error)) => format!(
                "retrying {} (attempt {}, {})",
                self.server_address, self.retry_count, error
            ),
            (state, _) => format!("{} ({})", state, self.server_address),
        }
    }
}
