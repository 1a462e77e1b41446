use mailhook_common::{
    error::SessionError, incoming, internal, status::Status, traits::fsm::FiniteStateMachine,
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    State,
    command::Command,
    connection::MAX_LINE,
    error::ConnectionError,
    state,
};

use super::Session;

/// Lines that end the body: a lone dot, with either terminator
const END_OF_DATA: [&[u8]; 2] = [b".\r\n", b".\n"];

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    /// Receive and process one line from the client
    ///
    /// Returns `Ok(true)` if the connection should be closed, `Ok(false)` to continue.
    ///
    /// # Errors
    /// Returns `SessionError` on I/O failure, or if the client goes away mid-body.
    pub(super) async fn receive(&mut self) -> Result<bool, SessionError> {
        let mut line = Vec::new();

        match self.connection.receive_line(&mut line, MAX_LINE).await {
            Err(err) => {
                internal!(level = DEBUG, "Error: {err}");
                Err(err.into())
            }
            Ok(0) if self.context.state.is_reading() => {
                internal!(
                    level = WARN,
                    "Client went away after {} bytes of message data",
                    self.context.message.len()
                );
                Err(ConnectionError::Closed.into())
            }
            // Reading nothing means the peer is done writing, so we are done too
            Ok(0) => Ok(true),
            Ok(_) => {
                if self.context.state.is_reading() {
                    self.handle_data_reception(&line);
                } else {
                    self.handle_command_reception(&line);
                }

                Ok(false)
            }
        }
    }

    /// Handle one body line, or piece of one, while in the Reading state
    fn handle_data_reception(&mut self, line: &[u8]) {
        let line_start = !self.context.partial_line;
        self.context.partial_line = !line.ends_with(b"\n");

        if line_start && END_OF_DATA.contains(&line) {
            self.context.state = State::PostDot(state::PostDot);
            self.context.sent = false;
            return;
        }

        // Check before extending, so the buffer never grows past the limit
        if self.max_message_size > 0 {
            let total_size = self.context.message.len().saturating_add(line.len());

            if total_size > self.max_message_size {
                internal!(
                    level = WARN,
                    "Message size {total_size} bytes exceeds maximum allowed size {} bytes",
                    self.max_message_size
                );
                self.context.message.clear();
                self.context.state = State::Close(state::Close {
                    status: Status::ExceededStorage,
                });
                self.context.sent = false;
                return;
            }
        }

        self.context.message.extend_from_slice(line);
    }

    /// Handle one command line
    ///
    /// A line cut at the read limit is dropped piece by piece; once its end arrives it is
    /// answered as a single unrecognised command.
    fn handle_command_reception(&mut self, line: &[u8]) {
        if line.len() >= MAX_LINE && !line.ends_with(b"\n") {
            if !self.context.partial_line {
                internal!(level = WARN, "Command line longer than {MAX_LINE} bytes, discarding");
            }
            self.context.partial_line = true;
            return;
        }

        let command = if std::mem::take(&mut self.context.partial_line) {
            Command::Invalid(String::from("Line too long"))
        } else {
            Command::try_from(line).unwrap_or_else(|e| e)
        };

        incoming!("{command}");

        self.context.state = self
            .context
            .state
            .clone()
            .transition(command, &mut self.session_state);
        self.context.sent = false;

        tracing::debug!("Transitioned to {:?}", self.context.state);
    }
}
