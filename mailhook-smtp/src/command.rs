use core::fmt::{self, Display, Formatter};

#[derive(PartialEq, PartialOrd, Eq, Hash, Debug, Clone)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl HeloVariant {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Ehlo(id) | Self::Helo(id) => id,
        }
    }
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

/// A single command line from the client.
///
/// Envelope paths are kept exactly as sent (after trimming), angle brackets and all.
/// No address syntax is checked here; resolving the recipient is left to delivery.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Command {
    Helo(HeloVariant),
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
    /// Anything unrecognised, holding the line as received
    Invalid(String),
}

impl Command {
    #[must_use]
    pub fn inner(&self) -> &str {
        match self {
            Self::Helo(variant) => variant.id(),
            Self::MailFrom(path) | Self::RcptTo(path) | Self::Invalid(path) => path,
            _ => "",
        }
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(v) => write!(fmt, "{v} {}", v.id()),
            Self::MailFrom(path) => write!(fmt, "MAIL FROM:{path}"),
            Self::RcptTo(path) => write!(fmt, "RCPT TO:{path}"),
            Self::Data => fmt.write_str("DATA"),
            Self::Rset => fmt.write_str("RSET"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::Invalid(s) => fmt.write_str(s),
        }
    }
}

/// Strip a case-insensitive keyword (`FROM`, `TO`) and the optional colon after it.
///
/// The keyword has to stand on its own, so `MAIL FROMAGE` is not a `MAIL FROM`.
fn path_after<'a>(rest: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = rest.trim_start();
    let head = rest.get(..keyword.len())?;

    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }

    let tail = &rest[keyword.len()..];
    if let Some(path) = tail.trim_start().strip_prefix(':') {
        Some(path.trim())
    } else if tail.is_empty() || tail.starts_with(char::is_whitespace) {
        Some(tail.trim())
    } else {
        None
    }
}

impl TryFrom<&str> for Command {
    type Error = Self;

    fn try_from(command: &str) -> Result<Self, Self::Error> {
        let line = command.trim_end_matches(['\r', '\n']).trim();

        let (verb, rest) = line
            .split_once([' ', ':', '\t'])
            .unwrap_or((line, ""));

        let invalid = || Self::Invalid(line.to_owned());

        if verb.eq_ignore_ascii_case("HELO") {
            Ok(Self::Helo(HeloVariant::Helo(rest.trim().to_string())))
        } else if verb.eq_ignore_ascii_case("EHLO") {
            Ok(Self::Helo(HeloVariant::Ehlo(rest.trim().to_string())))
        } else if verb.eq_ignore_ascii_case("MAIL") {
            path_after(rest, "FROM")
                .map(|path| Self::MailFrom(path.to_string()))
                .ok_or_else(invalid)
        } else if verb.eq_ignore_ascii_case("RCPT") {
            path_after(rest, "TO")
                .map(|path| Self::RcptTo(path.to_string()))
                .ok_or_else(invalid)
        } else if verb.eq_ignore_ascii_case("DATA") {
            Ok(Self::Data)
        } else if verb.eq_ignore_ascii_case("RSET") {
            Ok(Self::Rset)
        } else if verb.eq_ignore_ascii_case("NOOP") {
            Ok(Self::Noop)
        } else if verb.eq_ignore_ascii_case("QUIT") {
            Ok(Self::Quit)
        } else {
            Err(invalid())
        }
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = Self;

    fn try_from(command: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(command).map_or_else(
            |_| Err(Self::Invalid("Unable to interpret command".to_string())),
            Self::try_from,
        )
    }
}

impl TryFrom<String> for Command {
    type Error = Self;

    fn try_from(command: String) -> Result<Self, Self::Error> {
        Self::try_from(command.as_str())
    }
}

#[cfg(test)]
mod test {
    use crate::command::{Command, HeloVariant};

    // Idea copied from https://gitlab.com/erichdongubler-experiments/rust_case_permutations/blob/master/src/lib.rs#L97
    fn string_casing(string: &str) -> impl Iterator<Item = String> {
        let len = string.len();
        let num_cases = usize::pow(2, u32::try_from(len).unwrap_or(0));

        let (upper, lower) = string.chars().fold(
            (Vec::with_capacity(len), Vec::with_capacity(len)),
            |(mut upper, mut lower), c| {
                upper.push(c.to_ascii_uppercase());
                lower.push(c.to_ascii_lowercase());
                (upper, lower)
            },
        );

        (0..num_cases).map(move |i| {
            (0..len).fold(String::with_capacity(len), |mut s, idx| {
                if (i & (1 << idx)) == 0 {
                    s.push(lower[idx]);
                } else {
                    s.push(upper[idx]);
                }
                s
            })
        })
    }

    #[test]
    fn mail_from_command() {
        assert_eq!(
            Command::try_from("MAIL FROM:<alerts@monitor.local>\r\n"),
            Ok(Command::MailFrom(String::from("<alerts@monitor.local>")))
        );

        assert_eq!(
            Command::try_from("Mail From: test@gmail.com"),
            Ok(Command::MailFrom(String::from("test@gmail.com")))
        );

        assert_eq!(
            Command::try_from("MAIL FROM <a@b.com>"),
            Ok(Command::MailFrom(String::from("<a@b.com>")))
        );

        assert_eq!(
            Command::try_from("MAIL FROM:<>"),
            Ok(Command::MailFrom(String::from("<>")))
        );

        // No address validation at all
        assert_eq!(
            Command::try_from("MAIL FROM:dasdas"),
            Ok(Command::MailFrom(String::from("dasdas")))
        );

        assert!(Command::try_from("MAIL").is_err());
        assert!(Command::try_from("MAIL FROMAGE:<a@b.com>").is_err());
        assert!(Command::try_from("MAIL TO:<a@b.com>").is_err());

        for comm in string_casing("mail from") {
            assert!(matches!(
                Command::try_from(format!("{comm}: test@gmail.com")),
                Ok(Command::MailFrom(path)) if path == "test@gmail.com"
            ));
        }
    }

    #[test]
    fn rcpt_to_command() {
        assert_eq!(
            Command::try_from("RCPT TO:<ops@x.com>\r\n"),
            Ok(Command::RcptTo(String::from("<ops@x.com>")))
        );

        assert_eq!(
            Command::try_from("RCPT TO:\"Ops Team\" <ops@x.com>"),
            Ok(Command::RcptTo(String::from("\"Ops Team\" <ops@x.com>")))
        );

        assert!(Command::try_from("RCPT").is_err());
        assert!(Command::try_from("RCPT FROM:<ops@x.com>").is_err());

        for comm in string_casing("rcpt to") {
            assert!(matches!(
                Command::try_from(format!("{comm}: test@gmail.com")),
                Ok(Command::RcptTo(_))
            ));
        }
    }

    #[test]
    fn helo_ehlo_command() {
        assert_eq!(
            Command::try_from("EHLO client.example.com\r\n"),
            Ok(Command::Helo(HeloVariant::Ehlo(String::from(
                "client.example.com"
            ))))
        );

        assert_eq!(
            Command::try_from("HELO Testing things"),
            Ok(Command::Helo(HeloVariant::Helo(String::from(
                "Testing things"
            ))))
        );

        // Acknowledged unconditionally, even without an identity
        assert_eq!(
            Command::try_from("HELO"),
            Ok(Command::Helo(HeloVariant::Helo(String::new())))
        );

        for comm in string_casing("ehlo") {
            assert!(
                matches!(
                    Command::try_from(format!("{comm} test")),
                    Ok(Command::Helo(HeloVariant::Ehlo(_)))
                ),
                "'{comm}' should map to Ehlo"
            );
        }

        for comm in string_casing("helo") {
            assert!(
                matches!(
                    Command::try_from(format!("{comm} test")),
                    Ok(Command::Helo(HeloVariant::Helo(_))),
                ),
                "'{comm}' should map to Helo"
            );
        }
    }

    #[test]
    fn other_commands() {
        assert_eq!(Command::try_from("DATA\r\n"), Ok(Command::Data));
        for comm in string_casing("data") {
            assert_eq!(Command::try_from(comm), Ok(Command::Data));
        }

        assert_eq!(Command::try_from("QUIT\r\n"), Ok(Command::Quit));
        for comm in string_casing("quit") {
            assert_eq!(Command::try_from(comm), Ok(Command::Quit));
        }

        assert_eq!(Command::try_from("RSET"), Ok(Command::Rset));
        for comm in string_casing("rset") {
            assert_eq!(Command::try_from(comm), Ok(Command::Rset));
        }

        assert_eq!(Command::try_from("NOOP"), Ok(Command::Noop));
        for comm in string_casing("noop") {
            assert_eq!(Command::try_from(comm), Ok(Command::Noop));
        }
    }

    #[test]
    fn unrecognised_commands() {
        assert_eq!(
            Command::try_from("STARTTLS\r\n"),
            Err(Command::Invalid(String::from("STARTTLS")))
        );
        assert_eq!(
            Command::try_from("VRFY postmaster"),
            Err(Command::Invalid(String::from("VRFY postmaster")))
        );
        assert_eq!(
            Command::try_from("DATAX"),
            Err(Command::Invalid(String::from("DATAX")))
        );
        assert_eq!(Command::try_from(""), Err(Command::Invalid(String::new())));
        assert!(Command::try_from(&[0xff, 0xfe, b'\r', b'\n'][..]).is_err());
    }

    #[test]
    fn display_reflects_parsed_command() {
        let command = Command::try_from("rcpt to: <ops@x.com>").unwrap();
        assert_eq!(command.to_string(), "RCPT TO:<ops@x.com>");
        assert_eq!(command.inner(), "<ops@x.com>");

        let command = Command::try_from("ehlo client").unwrap();
        assert_eq!(command.to_string(), "EHLO client");
        assert_eq!(command.inner(), "client");
    }
}
