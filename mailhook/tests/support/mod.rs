//! Test support utilities for E2E testing
//!
//! Starts a complete gateway in-process and drives it over real TCP connections, with
//! the webhook transport replaced by a recording stub.

pub mod client;
pub mod harness;

pub use client::SmtpClient;
pub use harness::TestGateway;
