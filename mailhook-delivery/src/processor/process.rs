//! One pass over the spool

use mailhook_common::{Signal, internal};
use mailhook_spool::{BackingStore, SpoolError, SpooledMessageId};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

use crate::{
    directory::RecipientDirectory,
    error::{DeliveryError, SystemError},
    notifier::Notifier,
    processor::DispatchProcessor,
};

/// Tally of a single dispatch cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Notified and removed from the spool
    pub delivered: usize,
    /// Left in place: no endpoint, or the subject is too short
    pub skipped: usize,
    /// Left in place after a read, notification or removal failure
    pub failed: usize,
    /// Shutdown arrived before every record was visited
    pub interrupted: bool,
}

impl CycleReport {
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}

enum Outcome {
    Delivered,
    Skipped,
}

impl DispatchProcessor {
    /// Visit every pending record once, without waiting for the next tick
    ///
    /// # Errors
    ///
    /// Returns an error if the processor has not been initialized or the spool cannot
    /// be listed. Failures of individual records are counted in the report instead.
    pub async fn run_once(&self) -> Result<CycleReport, DeliveryError> {
        self.cycle(None).await
    }

    pub(super) async fn cycle(
        &self,
        mut shutdown: Option<&mut broadcast::Receiver<Signal>>,
    ) -> Result<CycleReport, DeliveryError> {
        let (Some(spool), Some(directory), Some(notifier)) =
            (&self.spool, &self.directory, &self.notifier)
        else {
            return Err(SystemError::NotInitialized(
                "Dispatch processor not initialized. Call init() first.".to_string(),
            )
            .into());
        };

        let ids = spool
            .list()
            .await
            .map_err(|e| SystemError::SpoolList(e.to_string()))?;

        let mut report = CycleReport::default();

        for (index, id) in ids.iter().enumerate() {
            if index > 0 && !self.pause(shutdown.as_deref_mut()).await {
                report.interrupted = true;
                break;
            }

            match self
                .dispatch_record(spool.as_ref(), directory, notifier.as_ref(), id)
                .await
            {
                Ok(Outcome::Delivered) => report.delivered += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(message_id = %id, error = %e, "Record left in spool");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Handle one record. Only a successful notification removes it.
    async fn dispatch_record(
        &self,
        spool: &dyn BackingStore,
        directory: &RecipientDirectory,
        notifier: &dyn Notifier,
        id: &SpooledMessageId,
    ) -> Result<Outcome, DeliveryError> {
        let message = spool
            .read(id)
            .await
            .map_err(|e| SystemError::SpoolRead(format!("{id}: {e}")))?;

        let Some(endpoint) = directory.resolve(&message.recipient) else {
            internal!(
                level = DEBUG,
                "No webhook configured for {:?}, leaving {id} in place",
                message.recipient
            );
            return Ok(Outcome::Skipped);
        };

        if message.subject.chars().count() < self.min_subject_len {
            internal!(
                level = DEBUG,
                "Subject {:?} of {id} is shorter than {} characters, leaving it in place",
                message.subject,
                self.min_subject_len
            );
            return Ok(Outcome::Skipped);
        }

        internal!(
            level = INFO,
            "Mail: {} Subject: {} URL Hook: {endpoint}",
            message.recipient,
            message.subject
        );

        notifier.notify(endpoint, &message.subject).await?;

        match spool.delete(id).await {
            Ok(()) => {}
            Err(SpoolError::NotFound(_)) => {
                tracing::warn!(message_id = %id, "Delivered record was already removed");
            }
            Err(e) => return Err(SystemError::SpoolDelete(format!("{id}: {e}")).into()),
        }

        Ok(Outcome::Delivered)
    }

    /// Wait out the per-record delay. `false` means shutdown was requested.
    async fn pause(&self, shutdown: Option<&mut broadcast::Receiver<Signal>>) -> bool {
        let delay = self.record_delay();

        let Some(shutdown) = shutdown else {
            tokio::time::sleep(delay).await;
            return true;
        };

        if shutdown_pending(shutdown) {
            return false;
        }

        tokio::select! {
            biased;

            () = shutdown_requested(shutdown) => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

fn shutdown_pending(shutdown: &mut broadcast::Receiver<Signal>) -> bool {
    loop {
        match shutdown.try_recv() {
            Ok(Signal::Shutdown) | Err(TryRecvError::Closed) => return true,
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty) => return false,
        }
    }
}

async fn shutdown_requested(shutdown: &mut broadcast::Receiver<Signal>) {
    loop {
        match shutdown.recv().await {
            Ok(Signal::Shutdown) | Err(RecvError::Closed) => return,
            Err(RecvError::Lagged(_)) => {}
        }
    }
}
