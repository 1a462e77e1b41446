pub mod command;
pub mod connection;
pub mod error;
pub mod fsm;
pub mod session;
pub mod session_state;
pub mod state;

use std::{net::SocketAddr, sync::Arc};

use mailhook_common::{
    Signal,
    error::{ProtocolError, SessionError},
    traits::protocol::{Protocol, SessionHandler},
};
use mailhook_spool::BackingStore;
use serde::Deserialize;
use tokio::net::TcpStream;

use crate::session::{Session, SessionConfig};

fn default_banner() -> String {
    String::from("localhost")
}

#[derive(Default, Deserialize)]
pub struct Smtp;

/// Per-listener SMTP settings, flattened into the listener's configuration
#[derive(Clone, Debug, Deserialize)]
pub struct SmtpArgs {
    /// Host name announced in `220`, `250` and `221` replies
    #[serde(default = "default_banner")]
    banner: String,
    /// Largest accepted body in bytes, `0` for unlimited
    #[serde(default)]
    max_message_size: usize,
    #[serde(skip)]
    spool: Option<Arc<dyn BackingStore>>,
}

impl Default for SmtpArgs {
    fn default() -> Self {
        Self {
            banner: default_banner(),
            max_message_size: 0,
            spool: None,
        }
    }
}

impl SmtpArgs {
    /// Create a new `SmtpArgs` builder
    #[must_use]
    pub fn builder() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    #[must_use]
    pub const fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Set the store sessions persist completed messages to
    #[must_use]
    pub fn with_spool(mut self, spool: Arc<dyn BackingStore>) -> Self {
        self.spool = Some(spool);
        self
    }

    pub fn set_spool(&mut self, spool: Arc<dyn BackingStore>) {
        self.spool = Some(spool);
    }

    #[must_use]
    pub fn banner(&self) -> &str {
        &self.banner
    }

    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Protocol for Smtp {
    type Session = Session<TcpStream>;
    type Args = SmtpArgs;

    fn ty() -> &'static str {
        "SMTP"
    }

    #[tracing::instrument(level = "trace", skip(self, stream, args))]
    fn handle(&self, stream: TcpStream, peer: SocketAddr, args: Self::Args) -> Self::Session {
        Session::create(
            stream,
            peer,
            SessionConfig::builder()
                .with_banner(args.banner)
                .with_max_message_size(args.max_message_size)
                .with_spool(args.spool)
                .build(),
        )
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn validate(&self, args: &Self::Args) -> Result<(), ProtocolError> {
        if args.spool.is_none() {
            return Err(ProtocolError::MissingField("spool"));
        }

        if args.banner.trim().is_empty() || args.banner.contains(['\r', '\n']) {
            return Err(ProtocolError::InvalidConfiguration {
                field: String::from("banner"),
                reason: format!("{:?} is not a usable host name", args.banner),
            });
        }

        Ok(())
    }
}

impl SessionHandler for Session<TcpStream> {
    async fn run(self, signal: tokio::sync::broadcast::Receiver<Signal>) -> Result<(), SessionError> {
        Self::run(self, signal).await
    }
}

pub use state::State;
