//! Protocol-level state carried across transitions of one session.

/// Sender and recipient of the message being assembled.
///
/// Only one recipient is kept; a later `RCPT TO` replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    sender: Option<String>,
    recipient: Option<String>,
}

impl Envelope {
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    pub const fn sender_mut(&mut self) -> &mut Option<String> {
        &mut self.sender
    }

    pub const fn recipient_mut(&mut self) -> &mut Option<String> {
        &mut self.recipient
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Client identifier from EHLO/HELO
    pub id: String,
    pub envelope: Envelope,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the envelope while keeping the client identifier, as RSET does
    pub fn reset_transaction(&mut self) {
        self.envelope = Envelope::default();
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    #[inline]
    pub const fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }
}
