//! Per-link protocol modes.
//!
//! Every mode has a fixed set of string spellings, used both by the
//! management interface and by the state files. "Unset" is never one of
//! the enum values: a link that has no opinion stores `None`.

use std::fmt;
use std::str::FromStr;

use crate::error::LinkError;

/// Support level for LLMNR and multicast DNS.
///
/// Ordered from least to most: the effective level on a link is the
/// minimum of the link setting and the global one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ResolveSupport {
    /// Protocol disabled.
    No,
    /// Resolve names, but do not respond to queries.
    Resolve,
    /// Resolve and respond.
    Yes,
}

/// DNS-over-TLS mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DnsOverTlsMode {
    No,
    Opportunistic,
    Yes,
}

/// DNSSEC validation mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DnssecMode {
    No,
    AllowDowngrade,
    Yes,
}

/// Parses the boolean spellings accepted wherever a yes/no mode is.
fn parse_boolean(s: &str) -> Option<bool> {
    match s {
        "1" | "yes" | "y" | "true" | "t" | "on" => Some(true),
        "0" | "no" | "n" | "false" | "f" | "off" => Some(false),
        _ => None,
    }
}

macro_rules! mode_strings {
    ($ty:ident, $what:literal, { $($variant:ident => $s:literal),+ $(,)? }, $yes:ident, $no:ident) => {
        impl $ty {
            /// Returns the canonical spelling.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = LinkError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    _ => match parse_boolean(s) {
                        Some(true) => Ok(Self::$yes),
                        Some(false) => Ok(Self::$no),
                        None => Err(LinkError::invalid(format!(
                            concat!("invalid ", $what, " setting: {}"),
                            s
                        ))),
                    },
                }
            }
        }
    };
}

mode_strings!(ResolveSupport, "resolve support", {
    No => "no",
    Resolve => "resolve",
    Yes => "yes",
}, Yes, No);

mode_strings!(DnsOverTlsMode, "DNSOverTLS", {
    No => "no",
    Opportunistic => "opportunistic",
    Yes => "yes",
}, Yes, No);

mode_strings!(DnssecMode, "DNSSEC", {
    No => "no",
    AllowDowngrade => "allow-downgrade",
    Yes => "yes",
}, Yes, No);

/// Parses an LLMNR setting. The empty string selects `yes`.
///
/// # Errors
///
/// Returns [`LinkError::InvalidArgs`] for an unknown spelling.
pub fn parse_llmnr(s: &str) -> Result<ResolveSupport, LinkError> {
    if s.is_empty() {
        Ok(ResolveSupport::Yes)
    } else {
        s.parse()
            .map_err(|_| LinkError::invalid(format!("invalid LLMNR setting: {s}")))
    }
}

/// Parses a multicast DNS setting. The empty string selects `no`.
///
/// # Errors
///
/// Returns [`LinkError::InvalidArgs`] for an unknown spelling.
pub fn parse_mdns(s: &str) -> Result<ResolveSupport, LinkError> {
    if s.is_empty() {
        Ok(ResolveSupport::No)
    } else {
        s.parse()
            .map_err(|_| LinkError::invalid(format!("invalid MulticastDNS setting: {s}")))
    }
}

/// Parses a mode where the empty string means "unset".
///
/// # Errors
///
/// Returns [`LinkError::InvalidArgs`] for an unknown spelling.
pub fn parse_optional<T: FromStr<Err = LinkError>>(s: &str) -> Result<Option<T>, LinkError> {
    if s.is_empty() { Ok(None) } else { s.parse().map(Some) }
}
