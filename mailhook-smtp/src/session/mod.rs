use std::{net::SocketAddr, sync::Arc};

use mailhook_common::{Signal, error::SessionError, internal, outgoing, status::Status};
use mailhook_spool::BackingStore;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::broadcast::{self, error::RecvError},
};

use crate::{State, connection::Connection, session_state::SessionState, state};

mod io;
mod response;

#[derive(PartialEq, Eq, Debug)]
pub enum Event {
    ConnectionClose,
    ConnectionKeepAlive,
}

/// Where the session is, and the body collected so far
#[derive(Debug, Default, Clone)]
pub struct Context {
    pub state: State,
    pub message: Vec<u8>,
    pub sent: bool,
    /// The last piece read was cut at the read limit, so the next one continues it
    pub partial_line: bool,
}

pub type Response = (Option<String>, Event);

#[derive(Debug, Default)]
pub struct SessionConfig {
    pub spool: Option<Arc<dyn BackingStore>>,
    pub banner: String,
    /// `0` for no limit
    pub max_message_size: usize,
}

impl SessionConfig {
    /// Create a new `SessionConfig` builder
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for `SessionConfig`
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    spool: Option<Arc<dyn BackingStore>>,
    banner: String,
    max_message_size: usize,
}

impl SessionConfigBuilder {
    /// Set the store completed messages are written to
    #[must_use]
    pub fn with_spool(mut self, spool: Option<Arc<dyn BackingStore>>) -> Self {
        self.spool = spool;
        self
    }

    /// Set the host name used in greetings
    #[must_use]
    pub fn with_banner(mut self, banner: String) -> Self {
        self.banner = banner;
        self
    }

    #[must_use]
    pub const fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            spool: self.spool,
            banner: self.banner,
            max_message_size: self.max_message_size,
        }
    }
}

pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    peer: SocketAddr,
    pub(super) context: Context,
    pub(super) session_state: SessionState,
    pub(super) banner: Arc<str>,
    pub(super) spool: Option<Arc<dyn BackingStore>>,
    pub(super) connection: Connection<Stream>,
    /// Largest body accepted, in bytes. When exceeded the client gets a `552` and the
    /// connection is closed. `0` disables the check.
    pub(super) max_message_size: usize,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    pub(crate) fn create(stream: Stream, peer: SocketAddr, config: SessionConfig) -> Self {
        tracing::debug!(
            "Session for {peer}: banner={}, max_message_size={}",
            config.banner,
            config.max_message_size
        );

        Self {
            peer,
            connection: Connection::new(stream),
            context: Context::default(),
            session_state: SessionState::default(),
            spool: config.spool,
            banner: if config.banner.is_empty() {
                Arc::from("localhost")
            } else {
                config.banner.into()
            },
            max_message_size: config.max_message_size,
        }
    }

    #[tracing::instrument(level = "trace", skip_all, fields(peer = %self.peer))]
    pub(crate) async fn run(
        mut self,
        mut signal: broadcast::Receiver<Signal>,
    ) -> Result<(), SessionError> {
        internal!("Connected");

        let result = self.converse(&mut signal).await;

        internal!("Connection closed");

        result
    }

    /// Alternate replies and client lines until either side ends the session
    async fn converse(
        &mut self,
        signal: &mut broadcast::Receiver<Signal>,
    ) -> Result<(), SessionError> {
        loop {
            let (response, event) = self.response().await?;

            if let Some(response) = response {
                outgoing!("{response}");

                self.connection.send(&response).await.map_err(|err| {
                    internal!(level = ERROR, "{err}");
                    SessionError::from(err)
                })?;
            }

            if event == Event::ConnectionClose {
                return Ok(());
            }

            tokio::select! {
                () = Self::shutdown_requested(signal) => {
                    internal!(level = DEBUG, "Shutting down session with {}", self.peer);
                    self.context.state = State::Close(state::Close {
                        status: Status::Unavailable,
                    });
                    self.context.sent = false;
                }
                closed = self.receive() => {
                    if closed? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Resolves once the server asks every session to wind down
    async fn shutdown_requested(signal: &mut broadcast::Receiver<Signal>) {
        loop {
            match signal.recv().await {
                Ok(Signal::Shutdown) | Err(RecvError::Closed) => return,
                Err(RecvError::Lagged(_)) => {}
            }
        }
    }
}
