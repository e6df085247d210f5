//! The link table and the mutation gateway.
//!
//! [`Manager`] owns every [`Link`], keyed by interface index, together
//! with the collaborators the links drive. Mutations come in through
//! [`Manager::submit`], which checks, in order:
//!
//! 1. that the link still exists (if not, the request is discarded);
//! 2. that the link may be changed interactively;
//! 3. that the payload is well-formed;
//! 4. that the caller is authorized.
//!
//! When the authorization service cannot answer right away the request
//! comes back as [`Outcome::Deferred`], and the transport hands it to
//! [`Manager::replay`] once the decision is in. Replay runs all four
//! checks again.

use std::collections::HashMap;

use bitflags::bitflags;

use crate::backend::{
    AuthRequest, Authorization, Authorizer, Caller, Capability, NetworkBackend, PropertyTarget,
    StateSink,
};
use crate::config::ManagerConfig;
use crate::error::{LinkError, Result};
use crate::gateway::{self, Change, LinkRequest, Outcome, PendingMutation, RawServer};
use crate::link::{Link, LinkSettings};
use crate::scope::ScopeMask;
use crate::state_file::LinkStateStore;
use crate::util;

bitflags! {
    /// Follow-up work after a committed change.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Effects: u8 {
        const SAVE = 1 << 0;
        const RESOLV_CONF = 1 << 1;
        const NOTIFY_DNS = 1 << 2;
        const NOTIFY_LINK = 1 << 3;
    }
}

/// Read-only view of a link, as exposed to unprivileged callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub ifindex: i32,
    pub ifname: String,
    pub object_path: String,
    pub scopes_mask: ScopeMask,
    pub dns: Vec<RawServer>,
    pub dns_ex: Vec<RawServer>,
    pub current_dns_server: Option<RawServer>,
    pub current_dns_server_ex: Option<RawServer>,
    /// `(name, route_only)` in priority order.
    pub domains: Vec<(String, bool)>,
    pub default_route: bool,
    pub llmnr: &'static str,
    pub multicast_dns: &'static str,
    pub dns_over_tls: &'static str,
    pub dnssec: &'static str,
    /// Sorted.
    pub dnssec_negative_trust_anchors: Vec<String>,
    pub dnssec_supported: bool,
}

/// Owns all links and their collaborators.
pub struct Manager<N, A, S> {
    config: ManagerConfig,
    links: HashMap<i32, Link>,
    backend: N,
    authorizer: A,
    sink: S,
}

impl<N, A, S> Manager<N, A, S>
where
    N: NetworkBackend,
    A: Authorizer,
    S: StateSink,
{
    /// Creates a manager with an empty link table.
    #[must_use]
    pub fn new(config: ManagerConfig, backend: N, authorizer: A, sink: S) -> Self {
        Self {
            config,
            links: HashMap::new(),
            backend,
            authorizer,
            sink,
        }
    }

    /// Returns the global configuration.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Returns the network backend.
    #[must_use]
    pub const fn backend(&self) -> &N {
        &self.backend
    }

    /// Mutable variant of [`backend`](Self::backend).
    pub const fn backend_mut(&mut self) -> &mut N {
        &mut self.backend
    }

    /// Returns the authorization service.
    #[must_use]
    pub const fn authorizer(&self) -> &A {
        &self.authorizer
    }

    /// Mutable variant of [`authorizer`](Self::authorizer).
    pub const fn authorizer_mut(&mut self) -> &mut A {
        &mut self.authorizer
    }

    /// Returns the persistence and notification sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    // -----------------------------------------------------------------------
    // Link table (fed by link discovery)
    // -----------------------------------------------------------------------

    /// Adds a link, or updates name and flags of an existing one.
    pub fn add_link(&mut self, ifindex: i32, ifname: &str, flags: i32) -> &mut Link {
        let link = self.links.entry(ifindex).or_insert_with(|| {
            tracing::info!(ifindex, ifname = %ifname, "New link");
            Link::new(ifindex, ifname, &self.config)
        });
        link.update_interface(ifname, flags, &mut self.backend);
        link
    }

    /// Records which address families link `ifindex` can use.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NoSuchLink`] for an unknown link.
    pub fn set_address_families(&mut self, ifindex: i32, ipv4: bool, ipv6: bool) -> Result<()> {
        let link = self
            .links
            .get_mut(&ifindex)
            .ok_or(LinkError::NoSuchLink { ifindex })?;
        link.set_address_families(ipv4, ipv6, &mut self.backend);
        Ok(())
    }

    /// Marks link `ifindex` as managed (or not) by an external network
    /// manager.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NoSuchLink`] for an unknown link.
    pub fn set_link_managed(&mut self, ifindex: i32, managed: bool) -> Result<()> {
        self.links
            .get_mut(&ifindex)
            .ok_or(LinkError::NoSuchLink { ifindex })?
            .set_managed(managed);
        Ok(())
    }

    /// Removes a link and destroys its scopes. Requests still pending for
    /// it will be discarded on replay.
    pub fn remove_link(&mut self, ifindex: i32) -> Option<Link> {
        let mut link = self.links.remove(&ifindex)?;
        link.release(&mut self.backend);
        tracing::info!(ifindex, ifname = %link.ifname(), "Link removed");
        Some(link)
    }

    /// Looks up a link by interface index.
    #[must_use]
    pub fn link(&self, ifindex: i32) -> Option<&Link> {
        self.links.get(&ifindex)
    }

    /// Mutable variant of [`link`](Self::link), for the query layer hooks.
    pub fn link_mut(&mut self, ifindex: i32) -> Option<&mut Link> {
        self.links.get_mut(&ifindex)
    }

    /// Iterates over all links in no particular order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    // -----------------------------------------------------------------------
    // Mutation gateway
    // -----------------------------------------------------------------------

    /// Runs one mutating request against link `ifindex`.
    ///
    /// # Errors
    ///
    /// * [`LinkError::LinkBusy`] for loopback or externally managed links;
    /// * [`LinkError::InvalidArgs`] for a malformed payload;
    /// * [`LinkError::AccessDenied`] if authorization is refused;
    /// * [`LinkError::TooMany`] if a list is over its limit (that list is
    ///   then empty).
    ///
    /// The authorization service is not consulted in the first two cases.
    pub fn submit(&mut self, caller: &Caller, ifindex: i32, request: LinkRequest) -> Result<Outcome> {
        let Some(link) = self.links.get(&ifindex) else {
            tracing::debug!(ifindex, action = request.action_id(), "Link gone, discarding request");
            return Ok(Outcome::Discarded);
        };
        gateway::verify_unmanaged(link)?;
        let change = request.validate()?;

        let action_id = request.action_id();
        let auth = AuthRequest {
            capability: Capability::NetAdmin,
            action_id,
            caller,
        };
        match self.authorizer.request_authorization(&auth) {
            Authorization::Denied => {
                tracing::debug!(
                    ifindex,
                    action = action_id,
                    sender = %caller.sender,
                    capability = auth.capability.number(),
                    "Authorization denied"
                );
                Err(LinkError::AccessDenied { action_id })
            }
            Authorization::Pending => {
                tracing::debug!(ifindex, action = action_id, "Authorization pending, deferring");
                Ok(Outcome::Deferred(PendingMutation {
                    ifindex,
                    caller: caller.clone(),
                    request,
                }))
            }
            Authorization::Approved => {
                self.commit(ifindex, action_id, change)?;
                Ok(Outcome::Committed)
            }
        }
    }

    /// Re-runs a deferred request once its authorization decision exists.
    ///
    /// # Errors
    ///
    /// As for [`submit`](Self::submit).
    pub fn replay(&mut self, pending: PendingMutation) -> Result<Outcome> {
        let PendingMutation {
            ifindex,
            caller,
            request,
        } = pending;
        self.submit(&caller, ifindex, request)
    }

    fn commit(&mut self, ifindex: i32, action_id: &'static str, change: Change) -> Result<()> {
        let Some(link) = self.links.get_mut(&ifindex) else {
            return Ok(());
        };
        let backend = &mut self.backend;
        let property = change.property();

        let effects = match change {
            Change::Servers(list) => {
                link.set_servers(&list, backend)?;
                Effects::SAVE | Effects::RESOLV_CONF | Effects::NOTIFY_LINK | Effects::NOTIFY_DNS
            }
            Change::Domains(list) => {
                link.set_search_domains(&list)?;
                Effects::SAVE | Effects::RESOLV_CONF | Effects::NOTIFY_LINK
            }
            Change::DefaultRoute(value) => {
                if link.set_default_route(value) {
                    Effects::SAVE | Effects::RESOLV_CONF | Effects::NOTIFY_LINK
                } else {
                    Effects::empty()
                }
            }
            Change::Llmnr(mode) => {
                link.set_llmnr_support(mode, backend);
                Effects::SAVE | Effects::NOTIFY_LINK
            }
            Change::Mdns(mode) => {
                link.set_mdns_support(mode, backend);
                Effects::SAVE | Effects::NOTIFY_LINK
            }
            Change::DnsOverTls(mode) => {
                link.set_dns_over_tls_mode(mode, backend);
                Effects::SAVE | Effects::NOTIFY_LINK
            }
            Change::Dnssec(mode) => {
                link.set_dnssec_mode(mode, backend);
                Effects::SAVE | Effects::NOTIFY_LINK
            }
            Change::NegativeTrustAnchors(anchors) => {
                link.set_negative_trust_anchors(anchors);
                Effects::SAVE | Effects::NOTIFY_LINK
            }
            Change::Revert => {
                link.revert(backend);
                Effects::SAVE | Effects::RESOLV_CONF | Effects::NOTIFY_DNS
            }
        };

        tracing::info!(
            ifindex,
            ifname = %link.ifname(),
            action = action_id,
            scopes = link.scope_mask().bits(),
            "Applied link DNS change"
        );
        self.run_effects(ifindex, effects, property);
        Ok(())
    }

    /// Persistence and notification are advisory: failures are logged and
    /// never undo or fail the committed change.
    fn run_effects(&mut self, ifindex: i32, effects: Effects, property: Option<&str>) {
        if effects.contains(Effects::SAVE) {
            if let Some(link) = self.links.get(&ifindex) {
                if let Err(e) = self.sink.save_link_config(link) {
                    tracing::warn!(ifindex, error = %e, "Failed to save link state, ignoring");
                }
            }
        }
        if effects.contains(Effects::RESOLV_CONF) {
            let links: Vec<&Link> = self.links.values().collect();
            if let Err(e) = self.sink.regenerate_resolv_conf(&links) {
                tracing::warn!(error = %e, "Failed to write resolv.conf, ignoring");
            }
        }
        if let Some(property) = property.filter(|_| effects.contains(Effects::NOTIFY_LINK)) {
            if let Err(e) = self.sink.notify_property_changed(PropertyTarget::Link(ifindex), property) {
                tracing::warn!(ifindex, property, error = %e, "Failed to send link property change, ignoring");
            }
        }
        if effects.contains(Effects::NOTIFY_DNS) {
            if let Err(e) = self.sink.notify_property_changed(PropertyTarget::Global, "DNS") {
                tracing::warn!(error = %e, "Failed to send DNS property change, ignoring");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------------

    /// Applies previously persisted settings to link `ifindex`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NoSuchLink`] for an unknown link, or
    /// [`LinkError::TooMany`] if a persisted list is over its limit.
    pub fn restore_link(&mut self, ifindex: i32, settings: &LinkSettings) -> Result<()> {
        let link = self
            .links
            .get_mut(&ifindex)
            .ok_or(LinkError::NoSuchLink { ifindex })?;
        link.apply_settings(settings, &mut self.backend)
    }

    /// Restores every known link that has a state file in `store`.
    /// Returns how many links were restored; unreadable files are logged
    /// and skipped.
    pub fn restore_all(&mut self, store: &LinkStateStore) -> usize {
        let mut ifindexes: Vec<i32> = self.links.keys().copied().collect();
        ifindexes.sort_unstable();

        let mut restored = 0;
        for ifindex in ifindexes {
            match store.load(ifindex) {
                Ok(Some(settings)) => match self.restore_link(ifindex, &settings) {
                    Ok(()) => restored += 1,
                    Err(e) => tracing::warn!(ifindex, error = %e, "Failed to restore link state"),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!(ifindex, error = %e, "Failed to read link state"),
            }
        }
        restored
    }

    // -----------------------------------------------------------------------
    // Read-only surface
    // -----------------------------------------------------------------------

    /// Returns a snapshot of link `ifindex`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NoSuchLink`] for an unknown link.
    pub fn status(&self, ifindex: i32) -> Result<LinkStatus> {
        let link = self
            .links
            .get(&ifindex)
            .ok_or(LinkError::NoSuchLink { ifindex })?;
        let servers = link.servers();
        let current = link.current_dns_server().map(|s| s.address());

        Ok(LinkStatus {
            ifindex,
            ifname: link.ifname().to_owned(),
            object_path: util::link_object_path(ifindex),
            scopes_mask: link.scope_mask(),
            dns: servers
                .iter()
                .map(|s| RawServer::from_address(s.address(), false))
                .collect(),
            dns_ex: servers
                .iter()
                .map(|s| RawServer::from_address(s.address(), true))
                .collect(),
            current_dns_server: current.map(|a| RawServer::from_address(a, false)),
            current_dns_server_ex: current.map(|a| RawServer::from_address(a, true)),
            domains: link
                .search_domains()
                .map(|d| (d.name().to_string(), d.route_only()))
                .collect(),
            default_route: link.default_route(&self.backend),
            llmnr: link.llmnr_support().as_str(),
            multicast_dns: link.mdns_support().as_str(),
            dns_over_tls: link.dns_over_tls_mode().as_str(),
            dnssec: link.dnssec_mode().as_str(),
            dnssec_negative_trust_anchors: link
                .negative_trust_anchors()
                .iter()
                .map(ToString::to_string)
                .collect(),
            dnssec_supported: link.dnssec_supported(),
        })
    }
}
