//! Per-link DNS state.
//!
//! A [`Link`] owns its server and search-domain registries, its mode
//! settings and its scope table. Every method that changes something the
//! scope table depends on resynchronizes the scopes before returning, so
//! [`Link::scope_mask`] always describes what exists.

use std::collections::BTreeSet;

use crate::backend::NetworkBackend;
use crate::config::ManagerConfig;
use crate::error::Result;
use crate::mode::{DnsOverTlsMode, DnssecMode, ResolveSupport};
use crate::name::DomainName;
use crate::scope::{self, LinkScopes, ScopeInputs, ScopeMask};
use crate::search_domain::{DnsSearchDomain, SearchDomainRegistry, SearchDomainSpec};
use crate::server::{DnsServer, ServerAddress, ServerRegistry};

/// LLMNR support of a link nobody has configured.
pub const DEFAULT_LLMNR: ResolveSupport = ResolveSupport::Yes;

/// Multicast DNS support of a link nobody has configured.
pub const DEFAULT_MDNS: ResolveSupport = ResolveSupport::No;

/// Global values copied from [`ManagerConfig`] when a link is created.
#[derive(Debug, Clone, Copy)]
struct GlobalModes {
    llmnr: ResolveSupport,
    mdns: ResolveSupport,
    dns_over_tls: DnsOverTlsMode,
    dnssec: DnssecMode,
}

/// The user-supplied part of a link's configuration, as persisted.
///
/// Modes are `None` when at their defaults, so a link that was never
/// configured has [`LinkSettings::is_empty`] settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSettings {
    pub llmnr: Option<ResolveSupport>,
    pub mdns: Option<ResolveSupport>,
    pub dns_over_tls: Option<DnsOverTlsMode>,
    pub dnssec: Option<DnssecMode>,
    pub default_route: Option<bool>,
    pub servers: Vec<ServerAddress>,
    pub domains: Vec<SearchDomainSpec>,
    pub negative_trust_anchors: BTreeSet<DomainName>,
}

impl LinkSettings {
    /// Returns `true` if nothing is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One managed network interface.
#[derive(Debug)]
pub struct Link {
    ifindex: i32,
    ifname: String,
    flags: i32,
    ipv4: bool,
    ipv6: bool,
    is_managed: bool,

    default_route: Option<bool>,
    llmnr_support: ResolveSupport,
    mdns_support: ResolveSupport,
    dns_over_tls_mode: Option<DnsOverTlsMode>,
    dnssec_mode: Option<DnssecMode>,
    negative_trust_anchors: BTreeSet<DomainName>,

    servers: ServerRegistry,
    search_domains: SearchDomainRegistry,
    scopes: LinkScopes,
    global: GlobalModes,
}

impl Link {
    /// Creates an unconfigured link. No scopes exist until the first
    /// resynchronization (see [`update_interface`](Self::update_interface)).
    #[must_use]
    pub fn new(ifindex: i32, ifname: impl Into<String>, config: &ManagerConfig) -> Self {
        Self {
            ifindex,
            ifname: ifname.into(),
            flags: 0,
            ipv4: false,
            ipv6: false,
            is_managed: false,
            default_route: None,
            llmnr_support: DEFAULT_LLMNR,
            mdns_support: DEFAULT_MDNS,
            dns_over_tls_mode: None,
            dnssec_mode: None,
            negative_trust_anchors: BTreeSet::new(),
            servers: ServerRegistry::new(ifindex, config.max_servers),
            search_domains: SearchDomainRegistry::new(config.max_search_domains),
            scopes: LinkScopes::default(),
            global: GlobalModes {
                llmnr: config.llmnr,
                mdns: config.mdns,
                dns_over_tls: config.dns_over_tls,
                dnssec: config.dnssec,
            },
        }
    }

    // -----------------------------------------------------------------------
    // Interface state (fed by link discovery)
    // -----------------------------------------------------------------------

    /// Updates the interface name and `IFF_*` flags.
    pub fn update_interface(
        &mut self,
        ifname: impl Into<String>,
        flags: i32,
        backend: &mut dyn NetworkBackend,
    ) {
        self.ifname = ifname.into();
        self.flags = flags;
        self.allocate_scopes(backend);
    }

    /// Records which address families have usable addresses.
    pub fn set_address_families(&mut self, ipv4: bool, ipv6: bool, backend: &mut dyn NetworkBackend) {
        self.ipv4 = ipv4;
        self.ipv6 = ipv6;
        self.allocate_scopes(backend);
    }

    /// Marks the link as configured by an external network manager.
    pub const fn set_managed(&mut self, managed: bool) {
        self.is_managed = managed;
    }

    /// Destroys all scopes. Called when the interface goes away.
    pub fn release(&mut self, backend: &mut dyn NetworkBackend) {
        self.scopes.clear(backend);
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Replaces the server list.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::TooMany`](crate::LinkError::TooMany) if
    /// `desired` is over the limit. The server list is then empty, and
    /// scopes are resynchronized to match.
    pub fn set_servers(&mut self, desired: &[ServerAddress], backend: &mut dyn NetworkBackend) -> Result<()> {
        let result = self.servers.replace_all(desired);
        self.allocate_scopes(backend);
        result
    }

    /// Replaces the search-domain list.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::TooMany`](crate::LinkError::TooMany) if
    /// `desired` is over the limit. The list is then empty.
    pub fn set_search_domains(&mut self, desired: &[SearchDomainSpec]) -> Result<()> {
        self.search_domains.replace_all(desired)
    }

    /// Sets the default-route override. Returns whether it changed.
    pub fn set_default_route(&mut self, value: bool) -> bool {
        let changed = self.default_route != Some(value);
        self.default_route = Some(value);
        changed
    }

    /// Sets LLMNR support, resynchronizes scopes and republishes records.
    pub fn set_llmnr_support(&mut self, mode: ResolveSupport, backend: &mut dyn NetworkBackend) {
        self.llmnr_support = mode;
        self.allocate_scopes(backend);
        backend.republish_records(self.ifindex, false);
    }

    /// Sets multicast DNS support, resynchronizes scopes and republishes
    /// records.
    pub fn set_mdns_support(&mut self, mode: ResolveSupport, backend: &mut dyn NetworkBackend) {
        self.mdns_support = mode;
        self.allocate_scopes(backend);
        backend.republish_records(self.ifindex, false);
    }

    /// Sets (or unsets) the DNS-over-TLS mode. A change resets what is
    /// known about the servers and flushes the link's cache.
    pub fn set_dns_over_tls_mode(&mut self, mode: Option<DnsOverTlsMode>, backend: &mut dyn NetworkBackend) {
        if self.dns_over_tls_mode == mode {
            return;
        }
        self.dns_over_tls_mode = mode;
        self.servers.reset_features();
        backend.flush_cache(self.ifindex);
    }

    /// Sets (or unsets) the DNSSEC mode. A change resets what is known
    /// about the servers and flushes the link's cache.
    pub fn set_dnssec_mode(&mut self, mode: Option<DnssecMode>, backend: &mut dyn NetworkBackend) {
        if self.dnssec_mode == mode {
            return;
        }
        self.dnssec_mode = mode;
        self.servers.reset_features();
        backend.flush_cache(self.ifindex);
    }

    /// Replaces the negative trust anchors.
    pub fn set_negative_trust_anchors(&mut self, anchors: BTreeSet<DomainName>) {
        self.negative_trust_anchors = anchors;
    }

    /// Drops all link-specific configuration, then resynchronizes scopes
    /// and republishes records.
    pub fn revert(&mut self, backend: &mut dyn NetworkBackend) {
        self.flush_settings();
        self.allocate_scopes(backend);
        backend.republish_records(self.ifindex, false);
    }

    fn flush_settings(&mut self) {
        self.default_route = None;
        self.llmnr_support = DEFAULT_LLMNR;
        self.mdns_support = DEFAULT_MDNS;
        self.dns_over_tls_mode = None;
        self.dnssec_mode = None;
        self.negative_trust_anchors.clear();
        self.servers.clear();
        self.search_domains.clear();
    }

    /// Applies persisted settings on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::TooMany`](crate::LinkError::TooMany) if a
    /// list is over its limit; the other settings are still applied.
    pub fn apply_settings(&mut self, settings: &LinkSettings, backend: &mut dyn NetworkBackend) -> Result<()> {
        self.flush_settings();
        self.default_route = settings.default_route;
        self.llmnr_support = settings.llmnr.unwrap_or(DEFAULT_LLMNR);
        self.mdns_support = settings.mdns.unwrap_or(DEFAULT_MDNS);
        self.dns_over_tls_mode = settings.dns_over_tls;
        self.dnssec_mode = settings.dnssec;
        self.negative_trust_anchors.clone_from(&settings.negative_trust_anchors);

        let servers = self.servers.replace_all(&settings.servers);
        let domains = self.search_domains.replace_all(&settings.domains);
        self.allocate_scopes(backend);
        backend.republish_records(self.ifindex, false);
        servers.and(domains)
    }

    /// Brings the scope table in line with the current state.
    pub fn allocate_scopes(&mut self, backend: &mut dyn NetworkBackend) {
        let wanted = scope::wanted_scopes(&self.scope_inputs());
        self.scopes.sync(self.ifindex, wanted, backend);
    }

    fn scope_inputs(&self) -> ScopeInputs {
        ScopeInputs {
            up: self.flags & libc::IFF_UP != 0,
            multicast: self.flags & libc::IFF_MULTICAST != 0,
            ipv4: self.ipv4,
            ipv6: self.ipv6,
            has_servers: !self.servers.is_empty(),
            llmnr: self.effective_llmnr(),
            mdns: self.effective_mdns(),
        }
    }

    // -----------------------------------------------------------------------
    // Query layer hooks
    // -----------------------------------------------------------------------

    /// Returns the current server, selecting the first one if none is.
    pub fn select_dns_server(&mut self) -> Option<&DnsServer> {
        self.servers.select_current()
    }

    /// Switches to the next server after a failure.
    pub fn next_dns_server(&mut self) -> Option<&DnsServer> {
        self.servers.next_server()
    }

    /// Selects a specific server. Returns `false` if it is not configured.
    pub fn set_dns_server(&mut self, key: &ServerAddress) -> bool {
        self.servers.set_current(key)
    }

    /// Records that a server turned out not to support DNSSEC.
    pub fn mark_dnssec_unsupported(&mut self, key: &ServerAddress) {
        self.servers.mark_dnssec_unsupported(key);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Returns the interface index.
    #[must_use]
    pub const fn ifindex(&self) -> i32 {
        self.ifindex
    }

    /// Returns the interface name.
    #[must_use]
    pub fn ifname(&self) -> &str {
        &self.ifname
    }

    /// Returns the `IFF_*` interface flags.
    #[must_use]
    pub const fn flags(&self) -> i32 {
        self.flags
    }

    /// Returns whether the interface is a loopback device.
    #[must_use]
    pub const fn is_loopback(&self) -> bool {
        self.flags & libc::IFF_LOOPBACK != 0
    }

    /// Returns whether an external network manager owns this link.
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        self.is_managed
    }

    /// Returns the server registry.
    #[must_use]
    pub const fn servers(&self) -> &ServerRegistry {
        &self.servers
    }

    /// Returns the selected server, if any.
    #[must_use]
    pub fn current_dns_server(&self) -> Option<&DnsServer> {
        self.servers.current()
    }

    /// Iterates over search domains in priority order.
    pub fn search_domains(&self) -> impl DoubleEndedIterator<Item = &DnsSearchDomain> + ExactSizeIterator {
        self.search_domains.iter()
    }

    /// Returns the DNSSEC negative trust anchors.
    #[must_use]
    pub const fn negative_trust_anchors(&self) -> &BTreeSet<DomainName> {
        &self.negative_trust_anchors
    }

    /// Returns the mask of scopes that currently exist.
    #[must_use]
    pub fn scope_mask(&self) -> ScopeMask {
        self.scopes.mask()
    }

    /// Returns the scope table.
    #[must_use]
    pub const fn scopes(&self) -> &LinkScopes {
        &self.scopes
    }

    /// Returns the explicit default-route override, if any.
    #[must_use]
    pub const fn default_route_override(&self) -> Option<bool> {
        self.default_route
    }

    /// Returns whether this link is a default route for DNS.
    #[must_use]
    pub fn default_route(&self, backend: &dyn NetworkBackend) -> bool {
        scope::effective_default_route(self.default_route, &self.scopes, backend)
    }

    /// Returns the link's own LLMNR setting.
    #[must_use]
    pub const fn llmnr_support(&self) -> ResolveSupport {
        self.llmnr_support
    }

    /// Returns the LLMNR support in effect (capped by the global setting).
    #[must_use]
    pub fn effective_llmnr(&self) -> ResolveSupport {
        self.llmnr_support.min(self.global.llmnr)
    }

    /// Returns the link's own multicast DNS setting.
    #[must_use]
    pub const fn mdns_support(&self) -> ResolveSupport {
        self.mdns_support
    }

    /// Returns the multicast DNS support in effect (capped by the global
    /// setting).
    #[must_use]
    pub fn effective_mdns(&self) -> ResolveSupport {
        self.mdns_support.min(self.global.mdns)
    }

    /// Returns the DNS-over-TLS mode in effect (link setting, else global).
    #[must_use]
    pub fn dns_over_tls_mode(&self) -> DnsOverTlsMode {
        self.dns_over_tls_mode.unwrap_or(self.global.dns_over_tls)
    }

    /// Returns the DNSSEC mode in effect (link setting, else global).
    #[must_use]
    pub fn dnssec_mode(&self) -> DnssecMode {
        self.dnssec_mode.unwrap_or(self.global.dnssec)
    }

    /// Returns whether DNSSEC validation can work on this link: it must
    /// be enabled and the current server, if any, must not have been found
    /// lacking.
    #[must_use]
    pub fn dnssec_supported(&self) -> bool {
        if self.dnssec_mode() == DnssecMode::No {
            return false;
        }
        self.servers.current().is_none_or(DnsServer::dnssec_supported)
    }

    /// Returns the persisted form of the link's configuration.
    #[must_use]
    pub fn settings(&self) -> LinkSettings {
        LinkSettings {
            llmnr: (self.llmnr_support != DEFAULT_LLMNR).then_some(self.llmnr_support),
            mdns: (self.mdns_support != DEFAULT_MDNS).then_some(self.mdns_support),
            dns_over_tls: self.dns_over_tls_mode,
            dnssec: self.dnssec_mode,
            default_route: self.default_route,
            servers: self.servers.iter().map(|s| s.address().clone()).collect(),
            domains: self
                .search_domains
                .iter()
                .map(|d| SearchDomainSpec {
                    name: d.name().clone(),
                    route_only: d.route_only(),
                })
                .collect(),
            negative_trust_anchors: self.negative_trust_anchors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScopeId;
    use crate::scope::ScopeKind;

    #[derive(Default)]
    struct Backend {
        next: u64,
        live: Vec<ScopeId>,
        republished: usize,
        flushed: usize,
    }

    impl NetworkBackend for Backend {
        fn create_scope(&mut self, _ifindex: i32, _kind: ScopeKind) -> ScopeId {
            self.next += 1;
            self.live.push(ScopeId(self.next));
            ScopeId(self.next)
        }

        fn destroy_scope(&mut self, scope: ScopeId) {
            self.live.retain(|s| *s != scope);
        }

        fn is_default_route(&self, _ifindex: i32, _scope: ScopeId) -> bool {
            true
        }

        fn republish_records(&mut self, _ifindex: i32, _flush_existing: bool) {
            self.republished += 1;
        }

        fn flush_cache(&mut self, _ifindex: i32) {
            self.flushed += 1;
        }
    }

    fn up_link(backend: &mut Backend) -> Link {
        let mut link = Link::new(3, "eth0", &ManagerConfig::new());
        link.update_interface("eth0", libc::IFF_UP | libc::IFF_MULTICAST, backend);
        link.set_address_families(true, true, backend);
        link
    }

    fn servers(list: &[&str]) -> Vec<ServerAddress> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn fresh_link_has_llmnr_scopes_only() {
        let mut b = Backend::default();
        let link = up_link(&mut b);
        assert_eq!(link.scope_mask(), ScopeMask::LLMNR_IPV4 | ScopeMask::LLMNR_IPV6);
        assert_eq!(b.live.len(), 2);
    }

    #[test]
    fn servers_drive_unicast_scope() {
        let mut b = Backend::default();
        let mut link = up_link(&mut b);
        link.set_servers(&servers(&["192.0.2.1"]), &mut b).unwrap();
        assert!(link.scope_mask().contains(ScopeMask::DNS));
        let dns_scope = link.scopes().get(ScopeKind::Dns).copied();

        // Same set again: the scope object is kept.
        link.set_servers(&servers(&["192.0.2.1"]), &mut b).unwrap();
        assert_eq!(link.scopes().get(ScopeKind::Dns).copied(), dns_scope);

        link.set_servers(&[], &mut b).unwrap();
        assert!(!link.scope_mask().contains(ScopeMask::DNS));
        assert_eq!(b.live.len(), 2);
    }

    #[test]
    fn mdns_toggle_republishes() {
        let mut b = Backend::default();
        let mut link = up_link(&mut b);
        link.set_mdns_support(ResolveSupport::Yes, &mut b);
        assert!(link.scope_mask().contains(ScopeMask::MDNS_IPV4 | ScopeMask::MDNS_IPV6));
        assert_eq!(b.republished, 1);
    }

    #[test]
    fn global_setting_caps_link_setting() {
        let mut b = Backend::default();
        let config = ManagerConfig::new().with_llmnr(ResolveSupport::Resolve);
        let mut link = Link::new(4, "wlan0", &config);
        link.update_interface("wlan0", libc::IFF_UP | libc::IFF_MULTICAST, &mut b);
        link.set_address_families(true, true, &mut b);
        assert_eq!(link.llmnr_support(), ResolveSupport::Yes);
        assert_eq!(link.effective_llmnr(), ResolveSupport::Resolve);
        assert!(link.scope_mask().is_empty());
    }

    #[test]
    fn failed_server_update_leaves_list_and_scope_empty() {
        let mut b = Backend::default();
        let mut link = Link::new(5, "eth1", &ManagerConfig::new().with_max_servers(1));
        link.update_interface("eth1", libc::IFF_UP, &mut b);
        link.set_servers(&servers(&["192.0.2.1"]), &mut b).unwrap();

        let err = link
            .set_servers(&servers(&["192.0.2.1", "192.0.2.2"]), &mut b)
            .unwrap_err();
        assert!(matches!(err, crate::LinkError::TooMany { .. }));
        assert!(link.servers().is_empty());
        assert!(link.scope_mask().is_empty());
    }

    #[test]
    fn mode_change_resets_server_features() {
        let mut b = Backend::default();
        let mut link = up_link(&mut b);
        let list = servers(&["192.0.2.1"]);
        link.set_servers(&list, &mut b).unwrap();
        link.set_dnssec_mode(Some(DnssecMode::AllowDowngrade), &mut b);
        link.select_dns_server();
        assert!(link.dnssec_supported());

        link.mark_dnssec_unsupported(&list[0]);
        assert!(!link.dnssec_supported());

        link.set_dnssec_mode(Some(DnssecMode::Yes), &mut b);
        assert!(link.dnssec_supported());
        assert_eq!(b.flushed, 2);

        // No change, no flush.
        link.set_dnssec_mode(Some(DnssecMode::Yes), &mut b);
        assert_eq!(b.flushed, 2);
    }

    #[test]
    fn default_route_falls_back_to_scope() {
        let mut b = Backend::default();
        let mut link = up_link(&mut b);
        assert!(!link.default_route(&b));
        link.set_servers(&servers(&["192.0.2.1"]), &mut b).unwrap();
        assert!(link.default_route(&b));
        assert!(link.set_default_route(false));
        assert!(!link.set_default_route(false));
        assert!(!link.default_route(&b));
    }

    #[test]
    fn settings_round_trip_through_apply() {
        let mut b = Backend::default();
        let mut link = up_link(&mut b);
        link.set_servers(&servers(&["192.0.2.1", "[2001:db8::1]:853#dns.example"]), &mut b)
            .unwrap();
        link.set_search_domains(&[SearchDomainSpec::new("corp.example", true).unwrap()])
            .unwrap();
        link.set_mdns_support(ResolveSupport::Resolve, &mut b);
        link.set_dns_over_tls_mode(Some(DnsOverTlsMode::Opportunistic), &mut b);
        let saved = link.settings();
        assert!(!saved.is_empty());
        assert_eq!(saved.llmnr, None);

        let mut restored = up_link(&mut b);
        restored.apply_settings(&saved, &mut b).unwrap();
        assert_eq!(restored.settings(), saved);
        assert_eq!(restored.scope_mask(), link.scope_mask());
    }

    #[test]
    fn revert_restores_defaults() {
        let mut b = Backend::default();
        let mut link = up_link(&mut b);
        link.set_servers(&servers(&["192.0.2.1"]), &mut b).unwrap();
        link.set_llmnr_support(ResolveSupport::No, &mut b);
        link.set_default_route(true);
        link.set_negative_trust_anchors(BTreeSet::from(["lan".parse::<DomainName>().unwrap()]));

        link.revert(&mut b);
        assert!(link.settings().is_empty());
        assert_eq!(link.default_route_override(), None);
        assert_eq!(link.scope_mask(), ScopeMask::LLMNR_IPV4 | ScopeMask::LLMNR_IPV6);
    }
}
