//! Typed error handling for dispatch operations.
//!
//! Failures are split between:
//! - Notification failures, which leave the record for the next cycle
//! - System errors around the spool and the HTTP client

use thiserror::Error;

/// Top-level dispatch error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The webhook call did not succeed.
    #[error("Notification failed: {0}")]
    Notify(#[from] NotifyError),

    /// System-level error (spool access, initialisation).
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// Errors raised by a [`Notifier`](crate::Notifier).
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The request never produced a response: connect, DNS or timeout.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("Endpoint rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Internal errors that are not tied to a particular notification.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Pending records could not be enumerated.
    #[error("Failed to list spool: {0}")]
    SpoolList(String),

    /// A stored record could not be read back.
    #[error("Failed to read record: {0}")]
    SpoolRead(String),

    /// A delivered record could not be removed.
    #[error("Failed to delete record: {0}")]
    SpoolDelete(String),

    /// `serve` or `run_once` called before `init`.
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}
