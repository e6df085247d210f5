//! Per-link DNS server registry.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{LinkError, Result};
use crate::name::DomainName;
use crate::reconcile::{Reconcile, Registry};

/// Port used when a server is configured without one.
pub const DEFAULT_DNS_PORT: u16 = 53;

/// A DNS server as requested by configuration: address, port and the
/// optional name used to authenticate an encrypted transport.
///
/// This is also the identity of a [`DnsServer`]: two servers are the same
/// iff all three fields are equal. Port `0` means "default port".
///
/// # Text form
///
/// `ADDR[:PORT][#NAME]`, with IPv6 addresses bracketed when a port is
/// given:
///
/// ```
/// use link_dns::ServerAddress;
///
/// let s: ServerAddress = "[2001:db8::1]:853#dns.example".parse().unwrap();
/// assert_eq!(s.port, 853);
/// assert_eq!(s.server_name.as_deref(), Some("dns.example"));
/// assert_eq!(s.to_string(), "[2001:db8::1]:853#dns.example");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub address: IpAddr,
    pub port: u16,
    pub server_name: Option<String>,
}

impl ServerAddress {
    /// Creates an address on the default port without a server name.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidArgs`] for the unspecified address or a
    /// multicast address.
    pub fn new(address: IpAddr) -> Result<Self> {
        Self::with_port_and_name(address, 0, None)
    }

    /// Creates a fully specified server address.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidArgs`] for the unspecified address, a
    /// multicast address, or a server name that is not a valid domain name.
    pub fn with_port_and_name(address: IpAddr, port: u16, server_name: Option<&str>) -> Result<Self> {
        if address.is_unspecified() || address.is_multicast() {
            return Err(LinkError::invalid(format!("invalid DNS server address {address}")));
        }
        let server_name = match server_name {
            None | Some("") => None,
            Some(name) => {
                name.parse::<DomainName>()
                    .map_err(|e| LinkError::invalid(format!("invalid server name {name}: {e}")))?;
                Some(name.to_owned())
            }
        };
        Ok(Self {
            address,
            port,
            server_name,
        })
    }

    /// Builds an address from the raw management-interface form: an
    /// address family (`AF_INET`/`AF_INET6`), the address octets, a port
    /// and a possibly empty server name.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidArgs`] for an unknown family, an octet
    /// count that does not match the family, or any error from
    /// [`with_port_and_name`](Self::with_port_and_name).
    pub fn from_raw(family: i32, octets: &[u8], port: u16, server_name: &str) -> Result<Self> {
        let address = match family {
            libc::AF_INET => {
                let o: [u8; 4] = octets.try_into().map_err(|_| {
                    LinkError::invalid(format!("invalid IPv4 address size {}", octets.len()))
                })?;
                IpAddr::V4(Ipv4Addr::from(o))
            }
            libc::AF_INET6 => {
                let o: [u8; 16] = octets.try_into().map_err(|_| {
                    LinkError::invalid(format!("invalid IPv6 address size {}", octets.len()))
                })?;
                IpAddr::V6(Ipv6Addr::from(o))
            }
            other => return Err(LinkError::invalid(format!("unknown address family {other}"))),
        };
        Self::with_port_and_name(address, port, Some(server_name))
    }

    /// Returns the address family as an `AF_*` constant.
    #[must_use]
    pub const fn family(&self) -> i32 {
        match self.address {
            IpAddr::V4(_) => libc::AF_INET,
            IpAddr::V6(_) => libc::AF_INET6,
        }
    }

    /// Returns the port queries are sent to.
    #[must_use]
    pub const fn effective_port(&self) -> u16 {
        if self.port == 0 { DEFAULT_DNS_PORT } else { self.port }
    }
}

impl FromStr for ServerAddress {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || LinkError::invalid(format!("invalid DNS server: {s}"));

        let (rest, name) = match s.split_once('#') {
            Some((rest, name)) => (rest, Some(name)),
            None => (s, None),
        };

        let (address, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (ip, after) = bracketed.split_once(']').ok_or_else(bad)?;
            let ip: Ipv6Addr = ip.parse().map_err(|_| bad())?;
            let port = match after.strip_prefix(':') {
                Some(p) => p.parse().map_err(|_| bad())?,
                None if after.is_empty() => 0,
                None => return Err(bad()),
            };
            (IpAddr::V6(ip), port)
        } else if let Ok(ip) = rest.parse::<IpAddr>() {
            (ip, 0)
        } else {
            let (ip, port) = rest.rsplit_once(':').ok_or_else(bad)?;
            let ip: Ipv4Addr = ip.parse().map_err(|_| bad())?;
            (IpAddr::V4(ip), port.parse().map_err(|_| bad())?)
        };

        Self::with_port_and_name(address, port, name)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.address, self.port) {
            (ip, 0) => write!(f, "{ip}")?,
            (IpAddr::V4(ip), port) => write!(f, "{ip}:{port}")?,
            (IpAddr::V6(ip), port) => write!(f, "[{ip}]:{port}")?,
        }
        if let Some(name) = &self.server_name {
            write!(f, "#{name}")?;
        }
        Ok(())
    }
}

/// A configured DNS server owned by one link.
#[derive(Debug, Clone)]
pub struct DnsServer {
    addr: ServerAddress,
    ifindex: i32,
    dnssec_supported: bool,
}

impl DnsServer {
    /// Returns the identity of this server.
    #[must_use]
    pub const fn address(&self) -> &ServerAddress {
        &self.addr
    }

    /// Returns the interface index of the owning link.
    #[must_use]
    pub const fn ifindex(&self) -> i32 {
        self.ifindex
    }

    /// Returns `false` once the query layer has found this server unable
    /// to serve DNSSEC data.
    #[must_use]
    pub const fn dnssec_supported(&self) -> bool {
        self.dnssec_supported
    }
}

impl Reconcile for DnsServer {
    type Desired = ServerAddress;
    const WHAT: &'static str = "DNS servers";

    fn matches(&self, desired: &ServerAddress) -> bool {
        self.addr == *desired
    }

    fn build(desired: &ServerAddress) -> Result<Self> {
        Ok(Self {
            addr: desired.clone(),
            ifindex: 0,
            dnssec_supported: true,
        })
    }
}

/// The ordered server list of a link plus its current-server selection.
///
/// The selection is held by identity, never by position, and is dropped
/// whenever the selected server leaves the list.
#[derive(Debug)]
pub struct ServerRegistry {
    ifindex: i32,
    servers: Registry<DnsServer>,
    current: Option<ServerAddress>,
}

impl ServerRegistry {
    /// Creates an empty registry for link `ifindex`.
    #[must_use]
    pub const fn new(ifindex: i32, limit: usize) -> Self {
        Self {
            ifindex,
            servers: Registry::new(limit),
            current: None,
        }
    }

    /// Replaces the server list with `desired`, keeping servers that are
    /// already configured.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::TooMany`] when `desired` exceeds the limit; the
    /// list is then empty.
    pub fn replace_all(&mut self, desired: &[ServerAddress]) -> Result<()> {
        let result = self.servers.replace_all(desired);
        let ifindex = self.ifindex;
        for server in self.servers.iter_mut() {
            server.ifindex = ifindex;
        }
        self.revalidate_current();
        result
    }

    /// Drops every server and the selection.
    pub fn clear(&mut self) {
        self.servers.clear();
        self.current = None;
    }

    fn revalidate_current(&mut self) {
        if let Some(key) = &self.current {
            if self.servers.find(key).is_none() {
                tracing::debug!(
                    ifindex = self.ifindex,
                    server = %key,
                    "Current DNS server removed, selection cleared"
                );
                self.current = None;
            }
        }
    }

    /// Looks up a server by identity.
    #[must_use]
    pub fn find(&self, key: &ServerAddress) -> Option<&DnsServer> {
        self.servers.find(key)
    }

    /// Iterates over servers in priority order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &DnsServer> + ExactSizeIterator {
        self.servers.iter()
    }

    /// Returns the number of configured servers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Returns whether no server is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Returns the selected server, if any.
    #[must_use]
    pub fn current(&self) -> Option<&DnsServer> {
        self.current.as_ref().and_then(|key| self.servers.find(key))
    }

    /// Returns the selected server, selecting the first one if nothing is
    /// selected yet.
    pub fn select_current(&mut self) -> Option<&DnsServer> {
        if self.current.is_none() {
            self.current = self.servers.get(0).map(|s| s.addr.clone());
        }
        self.current()
    }

    /// Selects `key`. Returns `false` (and changes nothing) if no such
    /// server is configured.
    pub fn set_current(&mut self, key: &ServerAddress) -> bool {
        if self.servers.find(key).is_none() {
            return false;
        }
        self.current = Some(key.clone());
        true
    }

    /// Moves the selection to the next server, wrapping around at the end.
    pub fn next_server(&mut self) -> Option<&DnsServer> {
        let next = match &self.current {
            Some(key) => {
                let pos = self.servers.iter().position(|s| s.matches(key));
                pos.and_then(|p| self.servers.get(p + 1))
                    .or_else(|| self.servers.get(0))
            }
            None => self.servers.get(0),
        };
        self.current = next.map(|s| s.addr.clone());
        self.current()
    }

    /// Records that `key` cannot serve DNSSEC data.
    pub fn mark_dnssec_unsupported(&mut self, key: &ServerAddress) {
        if let Some(server) = self.servers.find_mut(key) {
            server.dnssec_supported = false;
        }
    }

    /// Forgets everything learned about server features.
    pub fn reset_features(&mut self) {
        for server in self.servers.iter_mut() {
            server.dnssec_supported = true;
        }
    }
}
