use std::{fmt, str::FromStr};

use chrono::{DateTime, TimeZone, Utc};

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const STAMP_LEN: usize = 14;

/// Identifier for a spooled message
///
/// Derived from the UTC second the message completed in
/// (`YYYYMMDDHHMMSS`). Messages completing within the same second are told apart by
/// a `_N` sequence suffix, so the identifiers of one second read `20240101120000`,
/// `20240101120000_1`, `20240101120000_2`, ... and sort in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpooledMessageId {
    stamp: String,
    sequence: u32,
}

impl SpooledMessageId {
    /// The first identifier for the given instant
    #[must_use]
    pub fn at<Tz: TimeZone>(time: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self {
            stamp: time.format(STAMP_FORMAT).to_string(),
            sequence: 0,
        }
    }

    /// The first identifier for the current UTC second
    #[must_use]
    pub fn now() -> Self {
        Self::at(&Utc::now())
    }

    /// The identifier following this one within the same second
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            stamp: self.stamp.clone(),
            sequence: self.sequence.saturating_add(1),
        }
    }

    #[must_use]
    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    #[must_use]
    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Name of the serialized record, the operative queue entry
    #[must_use]
    pub fn record_filename(&self) -> String {
        format!("{self}.bin")
    }

    /// Name of the human-readable copy of the body
    #[must_use]
    pub fn body_filename(&self) -> String {
        format!("{self}.txt")
    }

    /// Parse a message ID from a filename like `20240101120000.bin` or `20240101120000_3.txt`
    ///
    /// # Security
    /// Rejects path separators, `..`, and anything that is not a well-formed identifier.
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        let stem = filename
            .strip_suffix(".bin")
            .or_else(|| filename.strip_suffix(".txt"))?;

        stem.parse().ok()
    }
}

impl FromStr for SpooledMessageId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (stamp, sequence) = match value.split_once('_') {
            Some((stamp, sequence)) => (stamp, Some(sequence)),
            None => (value, None),
        };

        if stamp.len() != STAMP_LEN || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("Invalid timestamp in message id {value}"));
        }

        let sequence = match sequence {
            None => 0,
            Some(sequence) if !sequence.is_empty() && sequence.bytes().all(|b| b.is_ascii_digit()) => {
                match sequence.parse::<u32>() {
                    Ok(0) | Err(_) => return Err(format!("Invalid sequence in message id {value}")),
                    Ok(n) => n,
                }
            }
            Some(_) => return Err(format!("Invalid sequence in message id {value}")),
        };

        Ok(Self {
            stamp: stamp.to_string(),
            sequence,
        })
    }
}

impl fmt::Display for SpooledMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sequence == 0 {
            f.write_str(&self.stamp)
        } else {
            write!(f, "{}_{}", self.stamp, self.sequence)
        }
    }
}
