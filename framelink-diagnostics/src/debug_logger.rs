//! Structured logging setup

use framelink_core::FrameLinkError;
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor an explicit directive is given
pub const DEFAULT_FILTER: &str = "info";

/// Install a global fmt subscriber
///
/// `directive` takes precedence over `RUST_LOG`; without either,
/// [`DEFAULT_FILTER`] applies. Calling this a second time returns an error
/// and leaves the first subscriber in place.
pub fn init_logging(directive: Option<&str>) -> Result<(), FrameLinkError> {
    let filter = build_filter(directive)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| FrameLinkError::InvalidState {
            expected: "no global subscriber".to_string(),
            actual: e.to_string(),
        })
}

fn build_filter(directive: Option<&str>) -> Result<EnvFilter, FrameLinkError> {
    match directive {
        Some(directive) => {
            EnvFilter::try_new(directive).map_err(|e| FrameLinkError::InvalidConfiguration {
                field: "log_filter".to_string(),
                reason: e.to_string(),
            })
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}
