//! Per-link search-domain registry.

use crate::error::{LinkError, Result};
use crate::name::DomainName;
use crate::reconcile::{Reconcile, Registry};

/// A search domain as requested by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDomainSpec {
    pub name: DomainName,
    /// Route queries under this domain to the link without using it as a
    /// suffix for single-label names.
    pub route_only: bool,
}

impl SearchDomainSpec {
    /// Validates a `(name, route_only)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidArgs`] if `name` is not a valid domain
    /// name, or if it is the root domain and `route_only` is `false`.
    pub fn new(name: &str, route_only: bool) -> Result<Self> {
        let parsed: DomainName = name
            .parse()
            .map_err(|e| LinkError::invalid(format!("invalid search domain {name}: {e}")))?;
        if parsed.is_root() && !route_only {
            return Err(LinkError::invalid(
                "root domain is not suitable as search domain",
            ));
        }
        Ok(Self {
            name: parsed,
            route_only,
        })
    }
}

/// A configured search domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSearchDomain {
    name: DomainName,
    route_only: bool,
}

impl DnsSearchDomain {
    /// Returns the domain name.
    #[must_use]
    pub const fn name(&self) -> &DomainName {
        &self.name
    }

    /// Returns whether the domain only routes queries and is not used
    /// for single-label completion.
    #[must_use]
    pub const fn route_only(&self) -> bool {
        self.route_only
    }
}

impl Reconcile for DnsSearchDomain {
    type Desired = SearchDomainSpec;
    const WHAT: &'static str = "search domains";

    fn matches(&self, desired: &SearchDomainSpec) -> bool {
        self.name == desired.name
    }

    fn build(desired: &SearchDomainSpec) -> Result<Self> {
        Ok(Self {
            name: desired.name.clone(),
            route_only: desired.route_only,
        })
    }

    fn refresh(&mut self, desired: &SearchDomainSpec) {
        self.route_only = desired.route_only;
    }
}

/// The ordered search-domain list of a link.
#[derive(Debug)]
pub struct SearchDomainRegistry {
    domains: Registry<DnsSearchDomain>,
}

impl SearchDomainRegistry {
    /// Creates an empty registry holding at most `limit` domains.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            domains: Registry::new(limit),
        }
    }

    /// Replaces the domain list with `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::TooMany`] when `desired` exceeds the limit; the
    /// list is then empty.
    pub fn replace_all(&mut self, desired: &[SearchDomainSpec]) -> Result<()> {
        self.domains.replace_all(desired)
    }

    /// Looks up a domain by name.
    #[must_use]
    pub fn find(&self, name: &DomainName) -> Option<&DnsSearchDomain> {
        self.domains.iter().find(|d| d.name == *name)
    }

    /// Iterates over domains in priority order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &DnsSearchDomain> + ExactSizeIterator {
        self.domains.iter()
    }

    /// Drops every domain.
    pub fn clear(&mut self) {
        self.domains.clear();
    }

    /// Returns the number of configured domains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Returns whether no domain is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
