//! Dispatch loop orchestration

mod process;

use std::{sync::Arc, time::Duration};

use mailhook_common::{Signal, internal};
use mailhook_spool::BackingStore;
use serde::Deserialize;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::MissedTickBehavior,
};

pub use process::CycleReport;

use crate::{
    directory::RecipientDirectory,
    error::{DeliveryError, SystemError},
    notifier::{Notifier, WebhookConfig, WebhookNotifier},
};

const fn default_interval() -> u64 {
    5
}

const fn default_record_delay() -> u64 {
    2
}

const fn default_min_subject_len() -> usize {
    4
}

/// Periodically drains the spool into the configured webhooks
///
/// Records are handled one at a time, with a pause between consecutive records to
/// throttle outbound calls. A record is only removed once its notification succeeded.
#[derive(Debug, Deserialize)]
pub struct DispatchProcessor {
    /// Run the loop even when `--notify` was not given
    #[serde(default)]
    pub enabled: bool,

    /// How often to scan the spool (in seconds)
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Pause between consecutive records within one scan (in seconds)
    #[serde(default = "default_record_delay")]
    pub record_delay_secs: u64,

    /// Subjects with fewer characters than this are never sent
    #[serde(default = "default_min_subject_len")]
    pub min_subject_len: usize,

    #[serde(default)]
    pub webhook: WebhookConfig,

    /// The spool to drain (initialized in `init()`)
    #[serde(skip)]
    pub(crate) spool: Option<Arc<dyn BackingStore>>,

    /// Recipient to endpoint mapping (initialized in `init()`)
    #[serde(skip)]
    pub(crate) directory: Option<Arc<RecipientDirectory>>,

    /// Transport for notifications; a [`WebhookNotifier`] unless one was supplied
    #[serde(skip)]
    pub(crate) notifier: Option<Arc<dyn Notifier>>,
}

impl Default for DispatchProcessor {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval(),
            record_delay_secs: default_record_delay(),
            min_subject_len: default_min_subject_len(),
            webhook: WebhookConfig::default(),
            spool: None,
            directory: None,
            notifier: None,
        }
    }
}

impl DispatchProcessor {
    /// Use `notifier` instead of building a [`WebhookNotifier`] during `init()`
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Initialize the dispatch processor
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client for the webhook notifier cannot be built
    pub fn init(
        &mut self,
        spool: Arc<dyn BackingStore>,
        directory: Arc<RecipientDirectory>,
    ) -> Result<(), DeliveryError> {
        internal!("Initialising Dispatch Processor ...");

        self.spool = Some(spool);
        self.directory = Some(directory);

        if self.notifier.is_none() {
            self.notifier = Some(Arc::new(WebhookNotifier::new(self.webhook.clone())?));
        }

        internal!(
            "Dispatch processor initialised: interval={}s, record_delay={}s, min_subject_len={}",
            self.interval_secs,
            self.record_delay_secs,
            self.min_subject_len
        );

        Ok(())
    }

    fn interval(&self) -> Duration {
        // A zero period would make `tokio::time::interval` panic
        Duration::from_secs(self.interval_secs.max(1))
    }

    fn record_delay(&self) -> Duration {
        Duration::from_secs(self.record_delay_secs)
    }

    /// Run the dispatch loop
    ///
    /// Runs until a shutdown signal is received. Shutdown is only observed while idle
    /// or between records; a notification in flight is always allowed to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor has not been initialized
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(
        &self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        internal!("Dispatch processor starting");

        if self.spool.is_none() || self.directory.is_none() || self.notifier.is_none() {
            return Err(SystemError::NotInitialized(
                "Dispatch processor not initialized. Call init() first.".to_string(),
            )
            .into());
        }

        let mut timer = tokio::time::interval(self.interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match self.cycle(Some(&mut shutdown)).await {
                        Ok(report) => {
                            if report.attempted() > 0 {
                                tracing::info!(
                                    "Dispatch cycle: {} delivered, {} skipped, {} failed",
                                    report.delivered,
                                    report.skipped,
                                    report.failed
                                );
                            } else {
                                tracing::debug!("Dispatch cycle: nothing pending");
                            }

                            if report.interrupted {
                                internal!("Dispatch processor interrupted between records");
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!("Error during dispatch cycle: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) | Err(RecvError::Closed) => {
                            internal!("Dispatch processor received shutdown signal");
                            break;
                        }
                        Err(RecvError::Lagged(_)) => {}
                    }
                }
            }
        }

        internal!("Dispatch processor shutdown complete");

        Ok(())
    }
}
