//! Error types for the Native Energy Measurement Backend.

use std::io;
use thiserror::Error;

/// Result type alias for NEMB operations.
pub type Result<T> = std::result::Result<T, NembError>;

/// Errors surfaced by the measurement backend and correlation engine.
///
/// Per the error-handling policy, components prefer local recovery: most
/// failures are recorded on result types (`is_valid` / `error_message`)
/// rather than propagated. This enum covers the cases that must cross an
/// API boundary (construction failures, configuration, persistence, CLI).
#[derive(Error, Debug)]
pub enum NembError {
    /// I/O error (sysfs, MSR, hwmon, or file reads).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// NVML error (NVIDIA GPU provider).
    #[cfg(feature = "nvidia")]
    #[error("NVML error: {0}")]
    Nvml(#[from] nvml_wrapper::error::NvmlError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persistence layer error.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// No energy provider could be initialized.
    #[error("no hardware energy provider is available on this host")]
    NoProviderAvailable,

    /// A provider-specific hardware interface is missing or unreadable.
    #[error("hardware not available: {0}")]
    HardwareUnavailable(String),

    /// A sysfs/MSR read timed out or returned a malformed value.
    #[error("transient read failure on {0}")]
    TransientReadFailure(String),

    /// A provider was marked failed after too many consecutive failures.
    #[error("provider failed: {0}")]
    ProviderFailed(String),

    /// Counter wraparound arithmetic produced an implausible delta.
    #[error("implausible counter delta for domain {domain}: {delta} (bound {bound})")]
    ImplausibleCounterDelta {
        domain: String,
        delta: u64,
        bound: u64,
    },

    /// Coordinator rejected a provider add/remove while running.
    #[error("cannot modify providers while measurements are active")]
    CoordinatorRunning,

    /// `end_session` referenced a session id that does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Configuration file was malformed or referenced an unknown option.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid argument passed by a caller (CLI or library API).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A workload invoked through `measure()` panicked or returned an error.
    #[error("workload failed: {0}")]
    WorkloadFailed(String),

    /// Catch-all for conditions not covered by a more specific variant.
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_session_not_found() {
        let err = NembError::SessionNotFound("abc123".into());
        assert_eq!(err.to_string(), "session not found: abc123");
    }

    #[test]
    fn display_implausible_counter_delta() {
        let err = NembError::ImplausibleCounterDelta {
            domain: "package".into(),
            delta: 999,
            bound: 100,
        };
        assert!(err.to_string().contains("package"));
    }

    #[test]
    fn from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: NembError = io_err.into();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ bad }").unwrap_err();
        let err: NembError = json_err.into();
        assert!(err.to_string().contains("JSON error"));
    }
}
