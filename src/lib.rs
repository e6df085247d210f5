//! # link-dns
//!
//! Per-link DNS configuration for a resolver daemon.
//!
//! Each network interface ("link") carries its own DNS servers, search
//! domains, and protocol modes (LLMNR, mDNS, DNS-over-TLS, DNSSEC). This
//! crate keeps those settings, reconciles them against replacement lists
//! while preserving the identity of entries that survive, and decides
//! which resolution scopes (unicast DNS, LLMNR and mDNS per address
//! family) each link should have.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use link_dns::{Caller, LinkRequest, Manager, ManagerConfig, Outcome, RawServer};
//!
//! let mut manager = Manager::new(ManagerConfig::new(), backend, authorizer, sink);
//! manager.add_link(2, "eth0", libc::IFF_UP | libc::IFF_MULTICAST);
//!
//! let caller = Caller::new(":1.42", 1000);
//! let request = LinkRequest::SetDns(vec![RawServer::plain(libc::AF_INET, [192, 0, 2, 1])]);
//! match manager.submit(&caller, 2, request)? {
//!     Outcome::Committed | Outcome::Discarded => {}
//!     // Hand back to the transport; replay once authorization is decided.
//!     Outcome::Deferred(pending) => queue.push(pending),
//! }
//! ```
//!
//! ## Collaborators
//!
//! The crate does not talk to the network, the authorization service, or
//! the bus itself. The embedding daemon supplies a [`NetworkBackend`]
//! (scope objects and record publication), an [`Authorizer`], and a
//! [`StateSink`] (persistence and change notification).
//! [`LinkStateStore`] is a ready-made sink that persists link settings
//! under a state directory.
//!
//! ## Threading
//!
//! Everything runs on the daemon's event loop. No type here is shared
//! between threads.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod link;
pub mod manager;
pub mod mode;
pub mod name;
pub mod reconcile;
pub mod scope;
pub mod search_domain;
pub mod server;
pub mod state_file;
pub mod util;

pub use backend::{
    AuthRequest, Authorization, Authorizer, Caller, Capability, NetworkBackend, PropertyTarget,
    ScopeId, StateSink,
};
pub use config::ManagerConfig;
pub use error::{LinkError, Result};
pub use gateway::{LinkRequest, Outcome, PendingMutation, RawServer};
pub use link::{Link, LinkSettings};
pub use manager::{LinkStatus, Manager};
pub use mode::{DnsOverTlsMode, DnssecMode, ResolveSupport};
pub use name::DomainName;
pub use scope::{ScopeKind, ScopeMask};
pub use search_domain::SearchDomainSpec;
pub use server::{DnsServer, ServerAddress};
pub use state_file::LinkStateStore;
