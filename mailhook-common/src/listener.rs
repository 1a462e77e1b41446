use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use futures_util::future::join_all;
use serde::Deserialize;
use tokio::{
    net::TcpListener,
    sync::broadcast::{self, error::RecvError},
};

use crate::{
    Signal,
    error::ListenerError,
    internal,
    traits::protocol::{Protocol, SessionHandler},
};

const fn default_socket() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 2525))
}

/// A TCP accept loop handing each connection to a `Proto` session.
#[derive(Deserialize)]
pub struct Listener<Proto: Protocol> {
    #[serde(skip)]
    handler: Proto,
    #[serde(default = "default_socket")]
    socket: SocketAddr,
    #[serde(default, flatten)]
    args: Proto::Args,
}

impl<Proto: Protocol> Default for Listener<Proto> {
    fn default() -> Self {
        Self::new(default_socket(), Proto::Args::default())
    }
}

impl<Proto: Protocol> Listener<Proto> {
    #[must_use]
    pub fn new(socket: SocketAddr, args: Proto::Args) -> Self {
        Self {
            handler: Proto::default(),
            socket,
            args,
        }
    }

    #[must_use]
    pub const fn socket(&self) -> SocketAddr {
        self.socket
    }

    pub const fn args_mut(&mut self) -> &mut Proto::Args {
        &mut self.args
    }

    ///
    /// Validate the protocol arguments before any connection is accepted
    ///
    /// # Errors
    /// Whatever the protocol considers invalid about its arguments
    ///
    #[tracing::instrument(level = "trace", skip_all, fields(protocol = Proto::ty()))]
    pub fn init(&self) -> Result<(), ListenerError> {
        Ok(self.handler.validate(&self.args)?)
    }

    ///
    /// Bind the configured socket
    ///
    /// # Errors
    /// If the address is in use, or not ours to bind
    ///
    pub async fn bind(&self) -> Result<TcpListener, ListenerError> {
        TcpListener::bind(self.socket)
            .await
            .map_err(|source| ListenerError::BindFailed {
                address: self.socket.to_string(),
                source,
            })
    }

    ///
    /// Bind the configured socket and accept connections until shutdown
    ///
    /// # Errors
    /// If the socket cannot be bound
    ///
    pub async fn serve(&self, shutdown: broadcast::Receiver<Signal>) -> Result<(), ListenerError> {
        let listener = self.bind().await?;
        self.serve_on(listener, shutdown).await
    }

    ///
    /// Accept connections on an already bound socket until shutdown. Every open
    /// session is waited on before returning.
    ///
    /// # Errors
    /// Accept failures are logged and do not end the loop, so this currently only
    /// returns `Ok`.
    ///
    #[tracing::instrument(level = "trace", skip_all, fields(protocol = Proto::ty()))]
    pub async fn serve_on(
        &self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), ListenerError> {
        let local = listener.local_addr().unwrap_or(self.socket);
        internal!(level = INFO, "{} listening on {local}", Proto::ty());

        let mut sessions = Vec::default();

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(RecvError::Closed)) {
                        internal!(
                            level = INFO,
                            "{} Listener {local} received Shutdown signal, finishing {} sessions ...",
                            Proto::ty(),
                            sessions.len()
                        );
                        join_all(sessions).await;
                        return Ok(());
                    }
                }

                connection = listener.accept() => {
                    match connection {
                        Ok((stream, peer)) => {
                            tracing::debug!("Connection received on {local} from {peer}");

                            sessions.retain(|session: &tokio::task::JoinHandle<()>| !session.is_finished());

                            let session = self.handler.handle(stream, peer, self.args.clone());
                            let signal = shutdown.resubscribe();

                            sessions.push(tokio::spawn(async move {
                                if let Err(err) = session.run(signal).await {
                                    internal!(level = ERROR, "Session with {peer} ended: {err}");
                                }
                            }));
                        }
                        Err(err) => {
                            internal!(level = ERROR, "{}", ListenerError::AcceptFailed(err));
                        }
                    }
                }
            }
        }
    }
}
