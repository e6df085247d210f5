//! Global resolver defaults.

use std::path::PathBuf;

use crate::mode::{DnsOverTlsMode, DnssecMode, ResolveSupport};

/// Default directory for per-link state files.
pub const DEFAULT_STATE_DIR: &str = "/run/link-dns/netif";

/// Default cap on servers and on search domains per link.
pub const DEFAULT_PER_LINK_MAX: usize = 256;

/// Global settings that per-link modes fall back on or are capped by.
///
/// # Example
///
/// ```
/// use link_dns::{ManagerConfig, ResolveSupport};
///
/// let config = ManagerConfig::new()
///     .with_mdns(ResolveSupport::No)
///     .with_max_servers(8);
///
/// assert_eq!(config.mdns, ResolveSupport::No);
/// assert_eq!(config.max_servers, 8);
/// assert_eq!(config.llmnr, ResolveSupport::Yes);
/// ```
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upper bound for every link's LLMNR support.
    pub llmnr: ResolveSupport,

    /// Upper bound for every link's multicast DNS support.
    pub mdns: ResolveSupport,

    /// DNS-over-TLS mode for links that have none set.
    pub dns_over_tls: DnsOverTlsMode,

    /// DNSSEC mode for links that have none set.
    pub dnssec: DnssecMode,

    /// Servers allowed per link.
    pub max_servers: usize,

    /// Search domains allowed per link.
    pub max_search_domains: usize,

    /// Where [`LinkStateStore`](crate::LinkStateStore) keeps its files.
    pub state_dir: PathBuf,
}

impl ManagerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            llmnr: ResolveSupport::Yes,
            mdns: ResolveSupport::Yes,
            dns_over_tls: DnsOverTlsMode::No,
            dnssec: DnssecMode::No,
            max_servers: DEFAULT_PER_LINK_MAX,
            max_search_domains: DEFAULT_PER_LINK_MAX,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }

    /// Sets the global LLMNR cap.
    #[must_use]
    pub const fn with_llmnr(mut self, llmnr: ResolveSupport) -> Self {
        self.llmnr = llmnr;
        self
    }

    /// Sets the global multicast DNS cap.
    #[must_use]
    pub const fn with_mdns(mut self, mdns: ResolveSupport) -> Self {
        self.mdns = mdns;
        self
    }

    /// Sets the fallback DNS-over-TLS mode.
    #[must_use]
    pub const fn with_dns_over_tls(mut self, mode: DnsOverTlsMode) -> Self {
        self.dns_over_tls = mode;
        self
    }

    /// Sets the fallback DNSSEC mode.
    #[must_use]
    pub const fn with_dnssec(mut self, mode: DnssecMode) -> Self {
        self.dnssec = mode;
        self
    }

    /// Overrides the per-link server limit.
    #[must_use]
    pub const fn with_max_servers(mut self, max: usize) -> Self {
        self.max_servers = max;
        self
    }

    /// Overrides the per-link search-domain limit.
    #[must_use]
    pub const fn with_max_search_domains(mut self, max: usize) -> Self {
        self.max_search_domains = max;
        self
    }

    /// Overrides the state directory.
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sets_defaults() {
        let c = ManagerConfig::new();
        assert_eq!(c.llmnr, ResolveSupport::Yes);
        assert_eq!(c.mdns, ResolveSupport::Yes);
        assert_eq!(c.dns_over_tls, DnsOverTlsMode::No);
        assert_eq!(c.dnssec, DnssecMode::No);
        assert_eq!(c.max_servers, 256);
        assert_eq!(c.state_dir, PathBuf::from("/run/link-dns/netif"));
    }

    #[test]
    fn with_state_dir() {
        let c = ManagerConfig::new().with_state_dir("/tmp/x");
        assert_eq!(c.state_dir, PathBuf::from("/tmp/x"));
    }
}
