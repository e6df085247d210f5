//! Interfaces to the services this crate drives but does not implement.
//!
//! Everything here is supplied by the daemon embedding the crate: the
//! query layer that owns scope objects, the authorization service, and
//! the persistence/notification side.

use crate::error::Result;
use crate::link::Link;
use crate::scope::ScopeKind;

/// Opaque handle to a scope object owned by the [`NetworkBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u64);

/// The network/query layer.
pub trait NetworkBackend {
    /// Creates a scope of `kind` on link `ifindex`.
    fn create_scope(&mut self, ifindex: i32, kind: ScopeKind) -> ScopeId;

    /// Destroys a scope previously returned by
    /// [`create_scope`](Self::create_scope).
    fn destroy_scope(&mut self, scope: ScopeId);

    /// Returns whether a unicast scope is currently acting as a default
    /// route for DNS (a policy decision of the query layer).
    fn is_default_route(&self, ifindex: i32, scope: ScopeId) -> bool;

    /// Re-announces the link's LLMNR/mDNS records, optionally flushing the
    /// previously announced ones first.
    fn republish_records(&mut self, ifindex: i32, flush_existing: bool);

    /// Drops cached answers obtained through the link.
    fn flush_cache(&mut self, _ifindex: i32) {}
}

/// Capability that bypasses interactive authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// `CAP_NET_ADMIN`.
    NetAdmin,
}

impl Capability {
    /// Returns the Linux capability number.
    #[must_use]
    pub const fn number(self) -> u32 {
        match self {
            Self::NetAdmin => 12,
        }
    }
}

/// Identity of whoever issued a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    /// Unique bus name of the sender.
    pub sender: String,
    pub uid: u32,
}

impl Caller {
    /// Creates a caller identity.
    #[must_use]
    pub fn new(sender: impl Into<String>, uid: u32) -> Self {
        Self {
            sender: sender.into(),
            uid,
        }
    }
}

/// One authorization question.
#[derive(Clone, Copy, Debug)]
pub struct AuthRequest<'a> {
    pub capability: Capability,
    pub action_id: &'static str,
    pub caller: &'a Caller,
}

/// Answer of the authorization service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authorization {
    Approved,
    Denied,
    /// The decision will arrive later; the transport replays the request
    /// then, and the service answers from its cached decision.
    Pending,
}

/// The authorization service.
pub trait Authorizer {
    fn request_authorization(&mut self, request: &AuthRequest<'_>) -> Authorization;
}

/// What a property change notification refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyTarget {
    Link(i32),
    Global,
}

/// Persistence and change notification. All calls are best effort: the
/// caller logs failures and carries on.
pub trait StateSink {
    /// Persists a link's user-supplied configuration.
    ///
    /// # Errors
    ///
    /// Any error is logged and otherwise ignored.
    fn save_link_config(&mut self, link: &Link) -> Result<()>;

    /// Rewrites the global resolv.conf from the current links.
    ///
    /// # Errors
    ///
    /// Any error is logged and otherwise ignored.
    fn regenerate_resolv_conf(&mut self, _links: &[&Link]) -> Result<()> {
        Ok(())
    }

    /// Emits a property-changed signal.
    ///
    /// # Errors
    ///
    /// Any error is logged and otherwise ignored.
    fn notify_property_changed(&mut self, _target: PropertyTarget, _property: &str) -> Result<()> {
        Ok(())
    }
}
