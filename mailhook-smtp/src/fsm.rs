//! Command-driven transitions of the session state.
//!
//! The machine is lenient: any recognised command is accepted from any
//! non-terminal state, so `MAIL FROM` may be repeated and `DATA` may arrive without
//! an envelope. Transitions only touch the [`SessionState`]; I/O and persistence
//! happen in the session.

use mailhook_common::traits::fsm::FiniteStateMachine;

use crate::{
    command::{Command, HeloVariant},
    session_state::SessionState,
    state::{self, State},
};

impl FiniteStateMachine for State {
    type Input = Command;
    type Context = SessionState;

    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self {
        if self.is_terminal() {
            return self;
        }

        match input {
            Command::Helo(HeloVariant::Ehlo(id)) => {
                context.id.clone_from(&id);
                Self::Ehlo(state::Ehlo { id })
            }
            Command::Helo(HeloVariant::Helo(id)) => {
                context.id.clone_from(&id);
                Self::Helo(state::Helo { id })
            }
            Command::MailFrom(sender) => {
                *context.envelope_mut().sender_mut() = Some(sender);
                Self::MailFrom(state::MailFrom)
            }
            Command::RcptTo(recipient) => {
                *context.envelope_mut().recipient_mut() = Some(recipient);
                Self::RcptTo(state::RcptTo)
            }
            Command::Data => Self::Data(state::Data),
            Command::Rset => {
                context.reset_transaction();
                Self::Rset(state::Rset)
            }
            Command::Noop => Self::Noop(state::Noop),
            Command::Quit => Self::Quit(state::Quit),
            Command::Invalid(command) => Self::Unrecognized(state::Unrecognized { command }),
        }
    }

    fn is_terminal(&self) -> bool {
        self.should_close()
    }
}
