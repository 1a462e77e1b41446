use serde::{Deserialize, Serialize};

const SUBJECT_TAG: &str = "Subject:";

/// A message accepted by a session, as it is persisted in the spool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Raw `MAIL FROM` token
    pub sender: String,
    /// Raw `RCPT TO` token, possibly wrapped in angle brackets or display text
    pub recipient: String,
    /// Derived from the body when the message is completed
    pub subject: String,
    /// The body exactly as received, which need not be UTF-8
    pub body: Vec<u8>,
    /// The HELO/EHLO identifier from the session
    pub helo_id: String,
    /// Seconds since the Unix epoch
    pub received_at: u64,
}

impl Message {
    /// Create a message from a completed envelope and body. The subject is derived here,
    /// from a lossy UTF-8 view of the body; the body itself is kept byte for byte.
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();

        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            subject: extract_subject(&String::from_utf8_lossy(&body)),
            body,
            helo_id: String::new(),
            received_at: u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn with_helo_id(mut self, helo_id: impl Into<String>) -> Self {
        self.helo_id = helo_id.into();
        self
    }
}

/// The text following `Subject:` on the first line that starts with it, trimmed.
///
/// Returns an empty string when no line carries the tag. Matching is case-sensitive and
/// anchored at the start of the line; header folding is not considered.
pub fn extract_subject(body: &str) -> String {
    body.lines()
        .find_map(|line| line.strip_prefix(SUBJECT_TAG))
        .map(|subject| subject.trim().to_string())
        .unwrap_or_default()
}
