use std::sync::{Arc, LazyLock};

use anyhow::Context as _;
use mailhook_common::{
    Signal, internal,
    listener::Listener,
    logging::{self, LogConfig},
};
use mailhook_delivery::{DispatchProcessor, Notifier, Recipient, RecipientDirectory};
use mailhook_smtp::Smtp;
use mailhook_spool::{BackingStore, SpoolConfig};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::broadcast};

/// Flags taken from the command line rather than the configuration file
#[derive(Debug, Default, Clone, Copy)]
pub struct RunOptions {
    /// Log at `DEBUG`, regardless of `LOG_LEVEL`
    pub debug: bool,
    /// Start the dispatch loop even if the configuration leaves it disabled
    pub notify: bool,
}

/// The whole gateway, as described by its configuration file
#[derive(Default, Deserialize)]
pub struct Mailhook {
    #[serde(default)]
    smtp: Listener<Smtp>,
    #[serde(default)]
    spool: SpoolConfig,
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    dispatch: DispatchProcessor,
    recipients: Vec<Recipient>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .context("Nothing left to shut down")?;

    // Everything winding down normally ends `run` before this resolves
    tokio::signal::ctrl_c().await?;
    internal!(level = WARN, "Forcing shutdown");

    Ok(())
}

impl Mailhook {
    /// The configured recipients, in configuration order
    pub fn directory(&self) -> RecipientDirectory {
        RecipientDirectory::new(self.recipients.clone())
    }

    /// Replace the webhook transport, e.g. with a recording stub
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.dispatch = std::mem::take(&mut self.dispatch).with_notifier(notifier);
        self
    }

    /// Bring every component up, in dependency order, without accepting connections yet
    ///
    /// # Errors
    ///
    /// If logging, the spool, the SMTP arguments or the dispatch processor cannot be
    /// initialised.
    pub fn init(self, options: RunOptions) -> anyhow::Result<Gateway> {
        let Self {
            mut smtp,
            spool,
            logging,
            mut dispatch,
            recipients,
        } = self;

        logging::init(&logging.with_debug(options.debug))?;

        internal!("Controller initialising");

        let spool = spool
            .into_backing_store()
            .context("Unable to initialise the spool")?;

        let directory = Arc::new(RecipientDirectory::new(recipients));
        internal!(level = INFO, "Loaded {} recipients", directory.len());
        for recipient in directory.iter() {
            internal!(level = DEBUG, "{} -> {}", recipient.mail, recipient.url_hook);
        }

        smtp.args_mut().set_spool(spool.clone());
        smtp.init()?;

        let dispatch = if options.notify || dispatch.enabled {
            dispatch.init(spool.clone(), directory.clone())?;
            Some(dispatch)
        } else {
            internal!(
                level = INFO,
                "Notification disabled, accepted mail stays in the spool"
            );
            None
        };

        Ok(Gateway {
            smtp,
            dispatch,
            spool,
            directory,
        })
    }

    /// Run the gateway until SIGINT or SIGTERM
    ///
    /// # Errors
    ///
    /// This function will return an error if any component fails to initialise, or the
    /// SMTP socket cannot be bound.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self, options: RunOptions) -> anyhow::Result<()> {
        let gateway = self.init(options)?;
        let socket = gateway.bind().await?;

        internal!("Controller running");

        let ret = tokio::select! {
            r = gateway.serve(socket, SHUTDOWN_BROADCAST.subscribe()) => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        internal!(level = INFO, "Shutting down...");

        ret
    }
}

/// An initialised gateway: spool ready, SMTP arguments validated, dispatch prepared
pub struct Gateway {
    smtp: Listener<Smtp>,
    dispatch: Option<DispatchProcessor>,
    spool: Arc<dyn BackingStore>,
    directory: Arc<RecipientDirectory>,
}

impl Gateway {
    pub const fn spool(&self) -> &Arc<dyn BackingStore> {
        &self.spool
    }

    pub fn directory(&self) -> &RecipientDirectory {
        &self.directory
    }

    /// The dispatch processor, if notification is enabled
    pub const fn dispatch(&self) -> Option<&DispatchProcessor> {
        self.dispatch.as_ref()
    }

    /// Bind the configured SMTP socket
    ///
    /// # Errors
    ///
    /// If the address is in use, or not ours to bind
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        Ok(self.smtp.bind().await?)
    }

    /// Accept mail on `socket`, and dispatch it if enabled, until `shutdown` fires
    ///
    /// Returns once open sessions have closed and the dispatch loop has finished its
    /// record in flight.
    ///
    /// # Errors
    ///
    /// If the listener or the dispatch loop fail
    pub async fn serve(
        &self,
        socket: TcpListener,
        shutdown: broadcast::Receiver<Signal>,
    ) -> anyhow::Result<()> {
        let listening = self.smtp.serve_on(socket, shutdown.resubscribe());

        match &self.dispatch {
            Some(dispatch) => {
                let (listened, dispatched) = tokio::join!(listening, dispatch.serve(shutdown));
                listened?;
                dispatched?;
            }
            None => listening.await?,
        }

        internal!("Gateway stopped");

        Ok(())
    }
}
