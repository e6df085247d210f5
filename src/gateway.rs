//! Mutation requests as they arrive from the management transport.
//!
//! A [`LinkRequest`] carries the raw payload of one mutating call. It is
//! validated into a typed [`Change`] before anyone is asked for
//! authorization, and it is kept verbatim inside a [`PendingMutation`]
//! when the authorization decision is deferred, so the transport can
//! replay the call later.

use std::collections::BTreeSet;

use crate::backend::Caller;
use crate::error::{LinkError, Result};
use crate::link::Link;
use crate::mode::{self, DnsOverTlsMode, DnssecMode, ResolveSupport};
use crate::name::DomainName;
use crate::search_domain::SearchDomainSpec;
use crate::server::ServerAddress;

/// A DNS server in the management-interface encoding: `AF_*` family and
/// address octets, plus port and server name in the extended form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawServer {
    pub family: i32,
    pub address: Vec<u8>,
    pub port: u16,
    pub server_name: String,
}

impl RawServer {
    /// The plain form: family and address only.
    #[must_use]
    pub fn plain(family: i32, address: impl Into<Vec<u8>>) -> Self {
        Self::extended(family, address, 0, "")
    }

    /// The extended form with port and server name.
    #[must_use]
    pub fn extended(family: i32, address: impl Into<Vec<u8>>, port: u16, server_name: impl Into<String>) -> Self {
        Self {
            family,
            address: address.into(),
            port,
            server_name: server_name.into(),
        }
    }

    /// Encodes `addr`, dropping port and name unless `extended`.
    #[must_use]
    pub fn from_address(addr: &ServerAddress, extended: bool) -> Self {
        let octets = match addr.address {
            std::net::IpAddr::V4(ip) => ip.octets().to_vec(),
            std::net::IpAddr::V6(ip) => ip.octets().to_vec(),
        };
        if extended {
            Self::extended(
                addr.family(),
                octets,
                addr.port,
                addr.server_name.clone().unwrap_or_default(),
            )
        } else {
            Self::plain(addr.family(), octets)
        }
    }

    fn decode(&self) -> Result<ServerAddress> {
        ServerAddress::from_raw(self.family, &self.address, self.port, &self.server_name)
    }
}

/// One mutating call against a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRequest {
    /// Replace the server list (plain form; port and name are ignored).
    SetDns(Vec<RawServer>),
    /// Replace the server list (extended form).
    SetDnsEx(Vec<RawServer>),
    /// Replace the search domains: `(name, route_only)` pairs.
    SetDomains(Vec<(String, bool)>),
    SetDefaultRoute(bool),
    /// Empty means `yes`.
    SetLlmnr(String),
    /// Empty means `no`.
    SetMulticastDns(String),
    /// Empty means unset.
    SetDnsOverTls(String),
    /// Empty means unset.
    SetDnssec(String),
    SetDnssecNegativeTrustAnchors(Vec<String>),
    Revert,
}

impl LinkRequest {
    /// Returns the authorization action identifier of this request.
    #[must_use]
    pub const fn action_id(&self) -> &'static str {
        match self {
            Self::SetDns(_) | Self::SetDnsEx(_) => "org.freedesktop.resolve1.set-dns-servers",
            Self::SetDomains(_) => "org.freedesktop.resolve1.set-domains",
            Self::SetDefaultRoute(_) => "org.freedesktop.resolve1.set-default-route",
            Self::SetLlmnr(_) => "org.freedesktop.resolve1.set-llmnr",
            Self::SetMulticastDns(_) => "org.freedesktop.resolve1.set-mdns",
            Self::SetDnsOverTls(_) => "org.freedesktop.resolve1.set-dns-over-tls",
            Self::SetDnssec(_) => "org.freedesktop.resolve1.set-dnssec",
            Self::SetDnssecNegativeTrustAnchors(_) => {
                "org.freedesktop.resolve1.set-dnssec-negative-trust-anchors"
            }
            Self::Revert => "org.freedesktop.resolve1.revert",
        }
    }

    /// Parses and checks the payload.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidArgs`] describing the first bad item.
    pub fn validate(&self) -> Result<Change> {
        Ok(match self {
            Self::SetDns(list) => Change::Servers(
                list.iter()
                    .map(|s| RawServer::plain(s.family, s.address.clone()).decode())
                    .collect::<Result<_>>()?,
            ),
            Self::SetDnsEx(list) => {
                Change::Servers(list.iter().map(RawServer::decode).collect::<Result<_>>()?)
            }
            Self::SetDomains(list) => Change::Domains(
                list.iter()
                    .map(|(name, route_only)| SearchDomainSpec::new(name, *route_only))
                    .collect::<Result<_>>()?,
            ),
            Self::SetDefaultRoute(b) => Change::DefaultRoute(*b),
            Self::SetLlmnr(s) => Change::Llmnr(mode::parse_llmnr(s)?),
            Self::SetMulticastDns(s) => Change::Mdns(mode::parse_mdns(s)?),
            Self::SetDnsOverTls(s) => Change::DnsOverTls(
                mode::parse_optional(s)
                    .map_err(|_| LinkError::invalid(format!("invalid DNSOverTLS setting: {s}")))?,
            ),
            Self::SetDnssec(s) => Change::Dnssec(
                mode::parse_optional(s)
                    .map_err(|_| LinkError::invalid(format!("invalid DNSSEC setting: {s}")))?,
            ),
            Self::SetDnssecNegativeTrustAnchors(names) => Change::NegativeTrustAnchors(
                names
                    .iter()
                    .map(|n| {
                        n.parse::<DomainName>().map_err(|_| {
                            LinkError::invalid(format!("invalid negative trust anchor domain: {n}"))
                        })
                    })
                    .collect::<Result<_>>()?,
            ),
            Self::Revert => Change::Revert,
        })
    }
}

/// A validated mutation, ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Servers(Vec<ServerAddress>),
    Domains(Vec<SearchDomainSpec>),
    DefaultRoute(bool),
    Llmnr(ResolveSupport),
    Mdns(ResolveSupport),
    DnsOverTls(Option<DnsOverTlsMode>),
    Dnssec(Option<DnssecMode>),
    NegativeTrustAnchors(BTreeSet<DomainName>),
    Revert,
}

impl Change {
    /// Returns the link property this change updates. A revert touches
    /// all of them and reports none.
    #[must_use]
    pub const fn property(&self) -> Option<&'static str> {
        Some(match self {
            Self::Servers(_) => "DNS",
            Self::Domains(_) => "Domains",
            Self::DefaultRoute(_) => "DefaultRoute",
            Self::Llmnr(_) => "LLMNR",
            Self::Mdns(_) => "MulticastDNS",
            Self::DnsOverTls(_) => "DNSOverTLS",
            Self::Dnssec(_) => "DNSSEC",
            Self::NegativeTrustAnchors(_) => "DNSSECNegativeTrustAnchors",
            Self::Revert => return None,
        })
    }
}

/// A request waiting for an authorization decision. It names the link by
/// interface index only, so replaying it after the link is gone is safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub ifindex: i32,
    pub caller: Caller,
    pub request: LinkRequest,
}

/// How a submitted request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The change was applied.
    Committed,
    /// Authorization is pending; replay the request once it is decided.
    Deferred(PendingMutation),
    /// The link no longer exists, so there was nothing to do.
    Discarded,
}

/// Refuses links whose configuration is not ours to change.
///
/// # Errors
///
/// Returns [`LinkError::LinkBusy`] for loopback and externally managed
/// links.
pub fn verify_unmanaged(link: &Link) -> Result<()> {
    if link.is_loopback() {
        return Err(LinkError::LinkBusy {
            ifname: link.ifname().to_owned(),
            reason: "loopback device",
        });
    }
    if link.is_managed() {
        return Err(LinkError::LinkBusy {
            ifname: link.ifname().to_owned(),
            reason: "managed",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_form_ignores_port_and_name() {
        let req = LinkRequest::SetDns(vec![RawServer::extended(libc::AF_INET, [192, 0, 2, 1], 853, "x.example")]);
        let Change::Servers(list) = req.validate().unwrap() else {
            panic!("expected servers");
        };
        assert_eq!(list[0].port, 0);
        assert_eq!(list[0].server_name, None);
    }

    #[test]
    fn extended_form_keeps_port_and_name() {
        let req = LinkRequest::SetDnsEx(vec![RawServer::extended(libc::AF_INET, [192, 0, 2, 1], 853, "x.example")]);
        let Change::Servers(list) = req.validate().unwrap() else {
            panic!("expected servers");
        };
        assert_eq!(list[0].to_string(), "192.0.2.1:853#x.example");
        assert_eq!(RawServer::from_address(&list[0], true).port, 853);
        assert_eq!(RawServer::from_address(&list[0], false).server_name, "");
    }

    #[test]
    fn root_search_domain_needs_route_only() {
        let bad = LinkRequest::SetDomains(vec![("example.com".into(), false), (".".into(), false)]);
        assert!(bad.validate().unwrap_err().is_validation());

        let good = LinkRequest::SetDomains(vec![(".".into(), true)]);
        assert!(good.validate().is_ok());
    }

    #[test]
    fn mode_strings_are_checked() {
        assert_eq!(
            LinkRequest::SetLlmnr(String::new()).validate().unwrap(),
            Change::Llmnr(ResolveSupport::Yes)
        );
        assert_eq!(
            LinkRequest::SetDnssec(String::new()).validate().unwrap(),
            Change::Dnssec(None)
        );
        let err = LinkRequest::SetDnsOverTls("sometimes".into()).validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid argument: invalid DNSOverTLS setting: sometimes");
    }

    #[test]
    fn negative_trust_anchors_are_validated() {
        let req = LinkRequest::SetDnssecNegativeTrustAnchors(vec!["lan".into(), "home.arpa".into(), "LAN.".into()]);
        let Change::NegativeTrustAnchors(set) = req.validate().unwrap() else {
            panic!("expected anchors");
        };
        assert_eq!(set.len(), 2);

        let bad = LinkRequest::SetDnssecNegativeTrustAnchors(vec!["a..b".into()]);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn server_name_with_control_character_is_rejected() {
        let req = LinkRequest::SetDnsEx(vec![RawServer::extended(libc::AF_INET, [192, 0, 2, 1], 853, "x.example\nLLMNR=no")]);
        assert!(req.validate().unwrap_err().is_validation());
    }

    #[test]
    fn changed_property_names() {
        assert_eq!(Change::DefaultRoute(true).property(), Some("DefaultRoute"));
        assert_eq!(Change::Mdns(ResolveSupport::No).property(), Some("MulticastDNS"));
        assert_eq!(Change::Revert.property(), None);
    }

    #[test]
    fn action_ids() {
        assert_eq!(LinkRequest::Revert.action_id(), "org.freedesktop.resolve1.revert");
        assert_eq!(
            LinkRequest::SetDnsEx(vec![]).action_id(),
            LinkRequest::SetDns(vec![]).action_id()
        );
    }
}
