use mailhook_common::{error::SessionError, internal, status::Status};
use mailhook_spool::Message;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    State,
    session::{Event, Response, Session},
    state,
};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    /// The reply owed for the current state, if it has not been sent yet
    ///
    /// Reaching `PostDot` persists the message first; the `250` is only produced once
    /// the spool has it.
    ///
    /// # Errors
    /// If the message cannot be persisted. No reply is owed in that case and the
    /// session should be dropped.
    pub(super) async fn response(&mut self) -> Result<Response, SessionError> {
        if self.context.sent {
            return Ok((None, Event::ConnectionKeepAlive));
        }

        self.context.sent = true;

        Ok(match &self.context.state {
            State::Connect(_) => (
                Some(format!("{} {} Service ready", Status::ServiceReady, self.banner)),
                Event::ConnectionKeepAlive,
            ),
            State::Helo(_) | State::Ehlo(_) => (
                Some(format!("{} {}", Status::Ok, self.banner)),
                Event::ConnectionKeepAlive,
            ),
            State::MailFrom(_) | State::RcptTo(_) | State::Rset(_) | State::Noop(_) => {
                Self::ok()
            }
            State::Data(_) => self.data_response(),
            State::PostDot(_) => {
                self.spool_message().await?;
                Self::ok()
            }
            State::Quit(_) => (
                Some(format!(
                    "{} {} Service closing transmission channel",
                    Status::GoodBye,
                    self.banner
                )),
                Event::ConnectionClose,
            ),
            State::Unrecognized(_) => (
                Some(format!("{} Command not implemented", Status::CommandNotImplemented)),
                Event::ConnectionKeepAlive,
            ),
            State::Close(state::Close { status }) => (
                Some(self.closing_reply(*status)),
                Event::ConnectionClose,
            ),
            State::Reading(_) => (None, Event::ConnectionKeepAlive),
        })
    }

    fn ok() -> Response {
        (Some(format!("{} OK", Status::Ok)), Event::ConnectionKeepAlive)
    }

    fn closing_reply(&self, status: Status) -> String {
        match status {
            Status::ExceededStorage => format!(
                "{status} Requested mail action aborted: exceeded storage allocation"
            ),
            _ => format!(
                "{status} {} Service not available, closing transmission channel",
                self.banner
            ),
        }
    }

    /// Generate response for DATA command and transition to Reading state
    fn data_response(&mut self) -> Response {
        self.context.state = State::Reading(state::Reading);
        self.context.message.clear();
        self.context.partial_line = false;

        (
            Some(format!(
                "{} Start mail input; end with <CRLF>.<CRLF>",
                Status::StartMailInput
            )),
            Event::ConnectionKeepAlive,
        )
    }

    /// Hand the completed message to the spool
    async fn spool_message(&mut self) -> Result<(), SessionError> {
        let body = std::mem::take(&mut self.context.message);
        let envelope = self.session_state.envelope();

        let message = Message::new(
            envelope.sender().unwrap_or_default(),
            envelope.recipient().unwrap_or_default(),
            body,
        )
        .with_helo_id(self.session_state.id());

        let Some(spool) = self.spool.as_ref() else {
            internal!(level = ERROR, "No spool configured, dropping message");
            return Err(SessionError::Aborted(String::from("No spool configured")));
        };

        let id = spool.write(&message).await.map_err(|err| {
            internal!(level = ERROR, "Unable to spool message: {err}");
            SessionError::Aborted(err.to_string())
        })?;

        internal!(
            level = INFO,
            "Spooled message {id} for {} (subject: {:?})",
            message.recipient,
            message.subject
        );

        Ok(())
    }
}
