//! Scope allocation.
//!
//! A link has up to five scopes, one per protocol family. Which of them
//! exist is a pure function of link state ([`wanted_scopes`]); the
//! [`LinkScopes`] table creates and destroys scope objects through the
//! [`NetworkBackend`] so that reality matches.

use bitflags::bitflags;

use crate::backend::{NetworkBackend, ScopeId};
use crate::mode::ResolveSupport;

bitflags! {
    /// One bit per scope kind that currently exists on a link.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ScopeMask: u64 {
        const DNS = 1 << 0;
        const LLMNR_IPV4 = 1 << 1;
        const LLMNR_IPV6 = 1 << 2;
        const MDNS_IPV4 = 1 << 3;
        const MDNS_IPV6 = 1 << 4;
    }
}

/// The protocol family of a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Dns,
    LlmnrIpv4,
    LlmnrIpv6,
    MdnsIpv4,
    MdnsIpv6,
}

impl ScopeKind {
    /// Every scope kind, in mask-bit order.
    pub const ALL: [Self; 5] = [
        Self::Dns,
        Self::LlmnrIpv4,
        Self::LlmnrIpv6,
        Self::MdnsIpv4,
        Self::MdnsIpv6,
    ];

    /// Returns the mask bit for this kind.
    #[must_use]
    pub const fn bit(self) -> ScopeMask {
        match self {
            Self::Dns => ScopeMask::DNS,
            Self::LlmnrIpv4 => ScopeMask::LLMNR_IPV4,
            Self::LlmnrIpv6 => ScopeMask::LLMNR_IPV6,
            Self::MdnsIpv4 => ScopeMask::MDNS_IPV4,
            Self::MdnsIpv6 => ScopeMask::MDNS_IPV6,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// The link facts scope existence depends on.
#[derive(Clone, Copy, Debug)]
pub struct ScopeInputs {
    pub up: bool,
    pub multicast: bool,
    pub ipv4: bool,
    pub ipv6: bool,
    pub has_servers: bool,
    /// Effective LLMNR support (link setting capped by the global one).
    pub llmnr: ResolveSupport,
    /// Effective multicast DNS support.
    pub mdns: ResolveSupport,
}

/// Computes which scopes should exist.
///
/// The unicast scope needs an up link with at least one server. Multicast
/// scopes need an up, multicast-capable link with the address family
/// enabled and the protocol fully enabled (`yes`, not `resolve`).
#[must_use]
pub fn wanted_scopes(input: &ScopeInputs) -> ScopeMask {
    let mut mask = ScopeMask::empty();
    if !input.up {
        return mask;
    }
    if input.has_servers {
        mask |= ScopeMask::DNS;
    }
    if !input.multicast {
        return mask;
    }
    let llmnr = input.llmnr == ResolveSupport::Yes;
    let mdns = input.mdns == ResolveSupport::Yes;
    mask.set(ScopeMask::LLMNR_IPV4, llmnr && input.ipv4);
    mask.set(ScopeMask::LLMNR_IPV6, llmnr && input.ipv6);
    mask.set(ScopeMask::MDNS_IPV4, mdns && input.ipv4);
    mask.set(ScopeMask::MDNS_IPV6, mdns && input.ipv6);
    mask
}

/// A live scope on a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scope {
    pub kind: ScopeKind,
    pub ifindex: i32,
    pub id: ScopeId,
}

/// The scopes that currently exist on one link.
#[derive(Debug, Default)]
pub struct LinkScopes {
    slots: [Option<Scope>; 5],
}

impl LinkScopes {
    /// Returns the scope of `kind`, if it exists.
    #[must_use]
    pub const fn get(&self, kind: ScopeKind) -> Option<&Scope> {
        self.slots[kind.index()].as_ref()
    }

    /// Returns the mask of existing scopes.
    #[must_use]
    pub fn mask(&self) -> ScopeMask {
        ScopeKind::ALL
            .iter()
            .filter(|k| self.get(**k).is_some())
            .fold(ScopeMask::empty(), |m, k| m | k.bit())
    }

    /// Creates and destroys scopes until exactly `wanted` exist. Scopes
    /// that should keep existing are left alone.
    pub fn sync(&mut self, ifindex: i32, wanted: ScopeMask, backend: &mut dyn NetworkBackend) {
        for kind in ScopeKind::ALL {
            let slot = &mut self.slots[kind.index()];
            match (slot.is_some(), wanted.contains(kind.bit())) {
                (false, true) => {
                    let id = backend.create_scope(ifindex, kind);
                    tracing::debug!(ifindex, ?kind, "Created scope");
                    *slot = Some(Scope { kind, ifindex, id });
                }
                (true, false) => {
                    if let Some(scope) = slot.take() {
                        backend.destroy_scope(scope.id);
                        tracing::debug!(ifindex, ?kind, "Destroyed scope");
                    }
                }
                _ => {}
            }
        }
    }

    /// Destroys every scope.
    pub fn clear(&mut self, backend: &mut dyn NetworkBackend) {
        for slot in &mut self.slots {
            if let Some(scope) = slot.take() {
                backend.destroy_scope(scope.id);
            }
        }
    }
}

/// Resolves whether a link acts as a default route for DNS.
///
/// An explicit override wins. Otherwise the unicast scope decides, and a
/// link without one is never a default route.
#[must_use]
pub fn effective_default_route(
    explicit: Option<bool>,
    scopes: &LinkScopes,
    backend: &dyn NetworkBackend,
) -> bool {
    if let Some(value) = explicit {
        return value;
    }
    scopes
        .get(ScopeKind::Dns)
        .is_some_and(|scope| backend.is_default_route(scope.ifindex, scope.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ScopeInputs {
        ScopeInputs {
            up: true,
            multicast: true,
            ipv4: true,
            ipv6: true,
            has_servers: false,
            llmnr: ResolveSupport::No,
            mdns: ResolveSupport::No,
        }
    }

    #[test]
    fn unicast_needs_servers() {
        assert_eq!(wanted_scopes(&inputs()), ScopeMask::empty());
        let with_servers = ScopeInputs {
            has_servers: true,
            ..inputs()
        };
        assert_eq!(wanted_scopes(&with_servers), ScopeMask::DNS);
    }

    #[test]
    fn llmnr_yes_sets_both_families() {
        let base = ScopeInputs {
            has_servers: true,
            mdns: ResolveSupport::Yes,
            ..inputs()
        };
        let before = wanted_scopes(&base);
        let after = wanted_scopes(&ScopeInputs {
            llmnr: ResolveSupport::Yes,
            ..base
        });
        assert_eq!(after - before, ScopeMask::LLMNR_IPV4 | ScopeMask::LLMNR_IPV6);
        assert!(after.contains(before));
    }

    #[test]
    fn resolve_only_creates_no_multicast_scope() {
        let mask = wanted_scopes(&ScopeInputs {
            llmnr: ResolveSupport::Resolve,
            mdns: ResolveSupport::Resolve,
            ..inputs()
        });
        assert!(mask.is_empty());
    }

    #[test]
    fn families_and_flags_gate_multicast() {
        let v4_only = wanted_scopes(&ScopeInputs {
            ipv6: false,
            llmnr: ResolveSupport::Yes,
            mdns: ResolveSupport::Yes,
            ..inputs()
        });
        assert_eq!(v4_only, ScopeMask::LLMNR_IPV4 | ScopeMask::MDNS_IPV4);

        let no_multicast = wanted_scopes(&ScopeInputs {
            multicast: false,
            has_servers: true,
            llmnr: ResolveSupport::Yes,
            ..inputs()
        });
        assert_eq!(no_multicast, ScopeMask::DNS);

        let down = wanted_scopes(&ScopeInputs {
            up: false,
            has_servers: true,
            llmnr: ResolveSupport::Yes,
            ..inputs()
        });
        assert!(down.is_empty());
    }

    #[test]
    fn mask_bits_match_wire_values() {
        assert_eq!(ScopeMask::DNS.bits(), 1);
        assert_eq!(ScopeMask::MDNS_IPV6.bits(), 16);
        assert_eq!(ScopeKind::LlmnrIpv6.bit(), ScopeMask::LLMNR_IPV6);
    }
}
