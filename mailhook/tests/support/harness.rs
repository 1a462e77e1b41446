//! End-to-end test harness for mailhook
//!
//! Builds a gateway from a RON configuration, the same way the binary does, with:
//! - The SMTP listener on an ephemeral port
//! - A file spool in a temporary directory
//! - The dispatch processor wired to a [`RecordingNotifier`]
//!
//! The dispatch loop's own timer is set far in the future; tests run cycles on demand
//! with [`TestGateway::run_dispatch`].

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use mailhook::{Gateway, Mailhook, RunOptions};
use mailhook_common::Signal;
use mailhook_delivery::{CycleReport, Notifier, NotifyError};
use mailhook_spool::Message;
use tempfile::TempDir;
use tokio::{sync::broadcast, task::JoinHandle, time::timeout};

/// Records every notification; endpoints in `failing` answer with an error
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(String, String)>>,
    failing: Vec<String>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, endpoint: &str, text: &str) -> Result<(), NotifyError> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((endpoint.to_string(), text.to_string()));

        if self.failing.iter().any(|failing| failing == endpoint) {
            return Err(NotifyError::Rejected {
                status: 503,
                body: String::from("unavailable"),
            });
        }

        Ok(())
    }
}

pub struct TestGateway {
    address: SocketAddr,
    gateway: Arc<Gateway>,
    notifier: Arc<RecordingNotifier>,
    shutdown_tx: broadcast::Sender<Signal>,
    handle: JoinHandle<anyhow::Result<()>>,
    spool_path: PathBuf,
    _spool_dir: TempDir,
}

impl TestGateway {
    #[must_use]
    pub fn builder() -> TestGatewayBuilder {
        TestGatewayBuilder::default()
    }

    /// Address the SMTP listener accepts on
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    /// Directory holding the `.bin` records and `.txt` copies
    #[allow(dead_code)]
    pub fn spool_path(&self) -> &Path {
        &self.spool_path
    }

    /// Run one complete transaction, returning every reply
    ///
    /// # Errors
    ///
    /// If the connection breaks.
    pub async fn send_mail(&self, from: &str, to: &str, body: &str) -> anyhow::Result<Vec<String>> {
        super::SmtpClient::send_mail(self.address, from, to, body).await
    }

    /// Run a dispatch cycle now
    ///
    /// # Errors
    ///
    /// If the gateway was built without dispatch, or the spool cannot be listed.
    pub async fn run_dispatch(&self) -> anyhow::Result<CycleReport> {
        let dispatch = self
            .gateway
            .dispatch()
            .ok_or_else(|| anyhow::anyhow!("dispatch is disabled"))?;

        Ok(dispatch.run_once().await?)
    }

    /// Every record still waiting in the spool
    ///
    /// # Errors
    ///
    /// If the spool cannot be listed or a record read.
    pub async fn pending(&self) -> anyhow::Result<Vec<Message>> {
        let spool = self.gateway.spool();
        let mut messages = Vec::new();

        for id in spool.list().await? {
            messages.push(spool.read(&id).await?);
        }

        Ok(messages)
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifier.calls()
    }

    /// Ask the gateway to stop, and wait for it
    ///
    /// # Errors
    ///
    /// If the gateway does not stop within five seconds, or stops with an error.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown_tx.send(Signal::Shutdown);

        timeout(Duration::from_secs(5), self.handle).await???;

        Ok(())
    }

    #[allow(dead_code)]
    pub fn shutdown_sender(&self) -> broadcast::Sender<Signal> {
        self.shutdown_tx.clone()
    }
}

/// Builder for configuring a [`TestGateway`]
#[derive(Default)]
pub struct TestGatewayBuilder {
    recipients: Vec<(String, String)>,
    failing: Vec<String>,
    max_message_size: usize,
}

impl TestGatewayBuilder {
    /// Map `mail` to `url_hook` in the recipient directory
    #[must_use]
    pub fn with_recipient(mut self, mail: &str, url_hook: &str) -> Self {
        self.recipients.push((mail.to_string(), url_hook.to_string()));
        self
    }

    /// Make notifications to `url_hook` fail
    #[must_use]
    #[allow(dead_code)]
    pub fn with_failing_endpoint(mut self, url_hook: &str) -> Self {
        self.failing.push(url_hook.to_string());
        self
    }

    #[must_use]
    #[allow(dead_code)]
    pub const fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    fn config(&self, spool_path: &Path) -> String {
        let recipients = self
            .recipients
            .iter()
            .map(|(mail, url_hook)| format!("(mail: {mail:?}, url_hook: {url_hook:?}),"))
            .collect::<String>();

        format!(
            r#"Mailhook (
                smtp: (
                    socket: "127.0.0.1:0",
                    banner: "mx.test",
                    max_message_size: {max_message_size},
                ),
                spool: File(path: {spool_path:?}),
                logging: (directory: None),
                dispatch: (
                    enabled: true,
                    interval_secs: 3600,
                    record_delay_secs: 0,
                ),
                recipients: [{recipients}],
            )"#,
            max_message_size = self.max_message_size,
            spool_path = spool_path.display().to_string(),
        )
    }

    /// Build and start the gateway
    ///
    /// # Errors
    ///
    /// If the configuration is rejected or any component fails to start.
    pub async fn build(self) -> anyhow::Result<TestGateway> {
        let spool_dir = tempfile::tempdir()?;
        let spool_path = spool_dir.path().join("mails");

        let notifier = Arc::new(RecordingNotifier {
            calls: Mutex::default(),
            failing: self.failing.clone(),
        });

        let mailhook: Mailhook = ron::from_str(&self.config(&spool_path))?;
        let gateway = Arc::new(
            mailhook
                .with_notifier(notifier.clone())
                .init(RunOptions::default())?,
        );

        let socket = gateway.bind().await?;
        let address = socket.local_addr()?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(16);
        let serving = gateway.clone();
        let handle = tokio::spawn(async move { serving.serve(socket, shutdown_rx).await });

        Ok(TestGateway {
            address,
            gateway,
            notifier,
            shutdown_tx,
            handle,
            spool_path,
            _spool_dir: spool_dir,
        })
    }
}
