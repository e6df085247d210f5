//! Domain-name validation.
//!
//! Names are accepted in presentation format: labels separated by `.`,
//! with an optional trailing dot. The escapes `\c` and `\DDD` are
//! understood. Labels may be at most 63 octets and the whole name at most
//! 255 octets on the wire.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;

const MAX_LABEL_LEN: usize = 63;
const MAX_WIRE_LEN: usize = 255;

/// Why a string is not a valid domain name.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum NameError {
    #[error("name is empty")]
    Empty,
    #[error("name is not ASCII")]
    NotAscii,
    #[error("name contains a control character")]
    ControlChar,
    #[error("name contains an empty label")]
    EmptyLabel,
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("label is longer than 63 octets")]
    LabelTooLong,
    #[error("name is longer than 255 octets on the wire")]
    NameTooLong,
}

/// A syntactically valid domain name.
///
/// The trailing dot is dropped on parse (except for the root, which is
/// kept as `.`). Equality, ordering and hashing ignore ASCII case.
#[derive(Clone, Debug)]
pub struct DomainName {
    text: String,
}

impl DomainName {
    /// Returns the DNS root, `.`.
    #[must_use]
    pub fn root() -> Self {
        Self { text: ".".into() }
    }

    /// Returns whether this is the DNS root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.text == "."
    }

    /// Returns the name in presentation format, without a trailing dot.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    fn folded(&self) -> impl Iterator<Item = u8> + '_ {
        self.text.bytes().map(|b| b.to_ascii_lowercase())
    }
}

impl FromStr for DomainName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(NameError::Empty);
        } else if s == "." {
            return Ok(Self::root());
        }

        let octets = s.as_bytes();
        let mut label_len = 0;
        // The terminating null label.
        let mut wire_len = 1;
        let mut i = 0;
        while i < octets.len() {
            match octets[i] {
                b'\\' => {
                    i += 1 + escape_len(&octets[i + 1..])?;
                    label_len += 1;
                }
                b'.' => {
                    if label_len == 0 {
                        return Err(NameError::EmptyLabel);
                    }
                    wire_len += 1 + label_len;
                    label_len = 0;
                    i += 1;
                }
                octet if !octet.is_ascii() => return Err(NameError::NotAscii),
                octet if octet.is_ascii_control() => return Err(NameError::ControlChar),
                _ => {
                    label_len += 1;
                    i += 1;
                }
            }
            if label_len > MAX_LABEL_LEN {
                return Err(NameError::LabelTooLong);
            }
        }

        let text = if label_len == 0 {
            // Ended on an unescaped dot.
            &s[..s.len() - 1]
        } else {
            wire_len += 1 + label_len;
            s
        };
        if wire_len > MAX_WIRE_LEN {
            return Err(NameError::NameTooLong);
        }
        Ok(Self { text: text.into() })
    }
}

/// Returns the number of octets taken by the escape sequence that starts
/// right after a backslash.
fn escape_len(rest: &[u8]) -> Result<usize, NameError> {
    match rest {
        [] => Err(NameError::InvalidEscape),
        [a, b, c, ..] if a.is_ascii_digit() => {
            if !b.is_ascii_digit() || !c.is_ascii_digit() {
                return Err(NameError::InvalidEscape);
            }
            let value =
                u32::from(a - b'0') * 100 + u32::from(b - b'0') * 10 + u32::from(c - b'0');
            if value > 255 {
                Err(NameError::InvalidEscape)
            } else {
                Ok(3)
            }
        }
        [a, ..] if a.is_ascii_digit() => Err(NameError::InvalidEscape),
        [a, ..] if !a.is_ascii() => Err(NameError::NotAscii),
        [a, ..] if a.is_ascii_control() => Err(NameError::ControlChar),
        _ => Ok(1),
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.text.eq_ignore_ascii_case(&other.text)
    }
}

impl Eq for DomainName {}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.folded() {
            state.write_u8(b);
        }
    }
}

impl PartialOrd for DomainName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DomainName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded().cmp(other.folded())
    }
}

/// Returns whether `s` is a valid domain name in presentation format.
#[must_use]
pub fn is_valid_domain_name(s: &str) -> bool {
    s.parse::<DomainName>().is_ok()
}

/// Returns whether `s` names the DNS root.
#[must_use]
pub fn is_root_domain(s: &str) -> bool {
    s.parse::<DomainName>().is_ok_and(|n| n.is_root())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_names() {
        assert!(is_valid_domain_name("example.com"));
        assert!(is_valid_domain_name("example.com."));
        assert!(is_valid_domain_name("a"));
        assert!(is_valid_domain_name("_tcp.local"));
        assert!(is_valid_domain_name(r"weird\.label.example"));
        assert!(is_valid_domain_name(r"\065bc.example"));
    }

    #[test]
    fn rejects_malformed_names() {
        assert_eq!("".parse::<DomainName>(), Err(NameError::Empty));
        assert_eq!("a..b".parse::<DomainName>(), Err(NameError::EmptyLabel));
        assert_eq!(".a".parse::<DomainName>(), Err(NameError::EmptyLabel));
        assert_eq!("..".parse::<DomainName>(), Err(NameError::EmptyLabel));
        assert_eq!("bücher.de".parse::<DomainName>(), Err(NameError::NotAscii));
        assert_eq!(r"a\25".parse::<DomainName>(), Err(NameError::InvalidEscape));
        assert_eq!(r"a\256".parse::<DomainName>(), Err(NameError::InvalidEscape));
        assert_eq!(r"a\".parse::<DomainName>(), Err(NameError::InvalidEscape));
    }

    #[test]
    fn rejects_control_characters() {
        for name in ["a\nb", "a\0b", "a\x7fb", "corp.example\nDNSSEC=yes", "a\\\tb"] {
            assert_eq!(name.parse::<DomainName>(), Err(NameError::ControlChar), "{name:?}");
        }
        // Escaped control octets are fine.
        assert!(is_valid_domain_name(r"a\010b"));
        assert!(is_valid_domain_name("with space.example"));
    }

    #[test]
    fn enforces_length_limits() {
        let label = "a".repeat(63);
        assert!(is_valid_domain_name(&label));
        assert_eq!(
            "a".repeat(64).parse::<DomainName>(),
            Err(NameError::LabelTooLong)
        );

        // 4 * (1 + 63) + 1 = 257 octets on the wire.
        let long = [label.as_str(); 4].join(".");
        assert_eq!(long.parse::<DomainName>(), Err(NameError::NameTooLong));
        // 3 * 64 + (1 + 61) + 1 = 255.
        let fits = format!("{label}.{label}.{label}.{}", "b".repeat(61));
        assert!(is_valid_domain_name(&fits));
    }

    #[test]
    fn root_detection() {
        assert!(is_root_domain("."));
        assert!(!is_root_domain("com."));
        assert!(!is_root_domain(""));
        assert!(DomainName::root().is_root());
    }

    #[test]
    fn comparison_ignores_case_and_trailing_dot() {
        let a: DomainName = "Example.COM.".parse().unwrap();
        let b: DomainName = "example.com".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a.as_str(), "Example.COM");
    }
}
