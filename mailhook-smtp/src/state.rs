use core::fmt::{self, Display, Formatter};

use mailhook_common::status::Status;

/// Client just connected, greeting not yet answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connect;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ehlo {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Helo {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailFrom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcptTo;

/// DATA accepted, `354` not yet sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Data;

/// Accumulating body lines until the lone dot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading;

/// End-of-data seen; the message is persisted before the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostDot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Noop;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unrecognized {
    pub command: String,
}

/// The server is ending the session, with `status` as the parting reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Close {
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Connect(Connect),
    Ehlo(Ehlo),
    Helo(Helo),
    MailFrom(MailFrom),
    RcptTo(RcptTo),
    Data(Data),
    Reading(Reading),
    PostDot(PostDot),
    Rset(Rset),
    Noop(Noop),
    Quit(Quit),
    Unrecognized(Unrecognized),
    Close(Close),
}

impl Default for State {
    fn default() -> Self {
        Self::Connect(Connect)
    }
}

impl Display for State {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(match self {
            Self::Reading(_) | Self::PostDot(_) => "",
            Self::Connect(_) => "Connect",
            Self::Close(_) => "Close",
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
            Self::MailFrom(_) => "MAIL",
            Self::RcptTo(_) => "RCPT",
            Self::Data(_) => "DATA",
            Self::Rset(_) => "RSET",
            Self::Noop(_) => "NOOP",
            Self::Quit(_) => "QUIT",
            Self::Unrecognized(_) => "UNRECOGNIZED",
        })
    }
}

impl State {
    /// Check if this state should close the connection
    #[must_use]
    pub const fn should_close(&self) -> bool {
        matches!(self, Self::Quit(_) | Self::Close(_))
    }

    /// Lines are body content rather than commands
    #[must_use]
    pub const fn is_reading(&self) -> bool {
        matches!(self, Self::Reading(_))
    }
}
