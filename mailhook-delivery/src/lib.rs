//! Dispatch of spooled messages to chat webhooks
//!
//! This crate provides:
//! - The recipient directory and address resolution
//! - The [`Notifier`] seam and its webhook implementation
//! - The periodic [`DispatchProcessor`] that drains the spool

mod directory;
mod error;
mod notifier;
mod processor;

pub use directory::{Recipient, RecipientDirectory};
pub use error::{DeliveryError, NotifyError, SystemError};
pub use notifier::{Notifier, WebhookConfig, WebhookNotifier};
pub use processor::{CycleReport, DispatchProcessor};
