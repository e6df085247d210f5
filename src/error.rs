//! Error types.

use thiserror::Error;

/// Result alias for link operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors returned by link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Malformed request payload (address, domain name, mode string).
    /// Nothing has been touched when this is returned.
    #[error("invalid argument: {0}")]
    InvalidArgs(String),

    /// The link is a loopback device or is managed by someone else.
    #[error("link {ifname} is {reason}")]
    LinkBusy {
        /// Interface name of the rejected link.
        ifname: String,
        /// Why the link cannot be changed interactively.
        reason: &'static str,
    },

    /// The authorization service denied the request.
    #[error("access denied for {action_id}")]
    AccessDenied {
        /// The action that was denied.
        action_id: &'static str,
    },

    /// A registry hit its size limit while being replaced. The registry
    /// has been emptied.
    #[error("too many {what} (limit {limit})")]
    TooMany {
        /// What overflowed (`"DNS servers"`, `"search domains"`).
        what: &'static str,
        /// The configured limit.
        limit: usize,
    },

    /// No link with this interface index exists.
    #[error("no such link: {ifindex}")]
    NoSuchLink {
        /// The interface index that was looked up.
        ifindex: i32,
    },

    /// Attempted to remove a state file not written by this crate.
    #[error("state file not managed by link-dns: {path}")]
    NotManaged {
        /// The offending path.
        path: String,
    },

    /// A state file could not be parsed.
    #[error("corrupt state file {path}: {detail}")]
    CorruptState {
        /// The offending path.
        path: String,
        /// What was wrong.
        detail: String,
    },

    /// Reading or writing link state failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Returns the stable, machine-readable reason string for this error.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidArgs(_) => "org.freedesktop.DBus.Error.InvalidArgs",
            Self::LinkBusy { .. } => "org.freedesktop.resolve1.LinkBusy",
            Self::AccessDenied { .. } => "org.freedesktop.DBus.Error.AccessDenied",
            Self::TooMany { .. } => "org.freedesktop.resolve1.TooMany",
            Self::NoSuchLink { .. } => "org.freedesktop.resolve1.NoSuchLink",
            Self::NotManaged { .. } | Self::CorruptState { .. } | Self::Io(_) => {
                "org.freedesktop.DBus.Error.IOError"
            }
        }
    }

    /// Returns `true` for malformed-input errors.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidArgs(_))
    }

    /// Returns `true` if the request was refused by the manageability or
    /// authorization check.
    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::LinkBusy { .. } | Self::AccessDenied { .. })
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgs(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_stable() {
        assert_eq!(
            LinkError::invalid("x").reason(),
            "org.freedesktop.DBus.Error.InvalidArgs"
        );
        let busy = LinkError::LinkBusy {
            ifname: "lo".into(),
            reason: "loopback device",
        };
        assert_eq!(busy.reason(), "org.freedesktop.resolve1.LinkBusy");
        assert_eq!(busy.to_string(), "link lo is loopback device");
        assert!(busy.is_permission());
        assert!(!busy.is_validation());
    }
}
