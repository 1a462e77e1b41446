use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::Deserialize;

/// Permissive address pattern, used to dig an address out of `<...>` or display-name forms
static ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}").ok());

/// One `{mail, url_hook}` entry of the configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Recipient {
    pub mail: String,
    pub url_hook: String,
}

impl Recipient {
    pub fn new(mail: impl Into<String>, url_hook: impl Into<String>) -> Self {
        Self {
            mail: mail.into(),
            url_hook: url_hook.into(),
        }
    }
}

/// Ordered mapping from recipient address to webhook endpoint
///
/// Built once at startup and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecipientDirectory {
    recipients: Vec<Recipient>,
}

impl RecipientDirectory {
    #[must_use]
    pub const fn new(recipients: Vec<Recipient>) -> Self {
        Self { recipients }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients.iter()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.recipients.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// The first address-shaped substring of `raw`, or `raw` itself when there is none
    #[must_use]
    pub fn extract_address(raw: &str) -> &str {
        ADDRESS
            .as_ref()
            .and_then(|re| re.find(raw))
            .map_or(raw, |found| found.as_str())
    }

    /// Endpoint configured for a raw recipient token such as `<ops@example.com>`
    ///
    /// Matching is exact and case-sensitive, and the first entry with the address wins.
    /// An entry with an empty endpoint counts as unconfigured.
    #[must_use]
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        let address = Self::extract_address(raw);

        self.recipients
            .iter()
            .find(|recipient| recipient.mail == address)
            .map(|recipient| recipient.url_hook.as_str())
            .filter(|endpoint| !endpoint.is_empty())
    }
}

impl From<Vec<Recipient>> for RecipientDirectory {
    fn from(recipients: Vec<Recipient>) -> Self {
        Self::new(recipients)
    }
}

impl fmt::Display for RecipientDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for recipient in &self.recipients {
            writeln!(f, "{} {}", recipient.mail, recipient.url_hook)?;
        }

        Ok(())
    }
}
