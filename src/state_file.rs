//! File-based persistence of per-link settings.
//!
//! Each link's user-supplied configuration lives in
//! `<state_dir>/<ifindex>`, a small `KEY=value` file starting with a
//! marker comment. Files without the marker are never removed.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::backend::StateSink;
use crate::config::ManagerConfig;
use crate::error::{LinkError, Result};
use crate::link::{Link, LinkSettings};
use crate::mode::{DnsOverTlsMode, DnssecMode, ResolveSupport};
use crate::name::DomainName;
use crate::search_domain::SearchDomainSpec;
use crate::server::ServerAddress;

/// Marker comment embedded in every managed state file.
const MANAGED_BY_MARKER: &str = "# managed by link-dns";

/// Stores [`LinkSettings`] under a state directory, one file per link.
///
/// # Example
///
/// ```rust,ignore
/// use link_dns::LinkStateStore;
///
/// let store = LinkStateStore::with_dir("/run/link-dns/netif");
/// store.save(3, &link.settings())?;
/// let restored = store.load(3)?;
/// ```
pub struct LinkStateStore {
    state_dir: PathBuf,
}

impl LinkStateStore {
    /// Creates a store in the directory named by `config`.
    #[must_use]
    pub fn new(config: &ManagerConfig) -> Self {
        Self::with_dir(config.state_dir.clone())
    }

    /// Creates a store in a custom directory (useful for testing).
    #[must_use]
    pub fn with_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// Returns the state directory path.
    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Writes the settings of link `ifindex`. Empty settings remove the
    /// file instead.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Io`] if the directory cannot be created or the
    /// file cannot be written.
    pub fn save(&self, ifindex: i32, settings: &LinkSettings) -> Result<()> {
        if settings.is_empty() {
            return self.remove(ifindex);
        }
        if !self.state_dir.exists() {
            std::fs::create_dir_all(&self.state_dir)?;
        }

        let path = self.state_path(ifindex);
        std::fs::write(&path, generate_file_content(settings))?;
        tracing::debug!(ifindex, path = %path.display(), "Saved link state");
        Ok(())
    }

    /// Reads the settings of link `ifindex`, or `None` if there is no
    /// state file.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Io`] if the file cannot be read and
    /// [`LinkError::CorruptState`] if it cannot be parsed.
    pub fn load(&self, ifindex: i32) -> Result<Option<LinkSettings>> {
        let path = self.state_path(ifindex);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        parse_file_content(&content)
            .map(Some)
            .map_err(|detail| LinkError::CorruptState {
                path: path.display().to_string(),
                detail,
            })
    }

    /// Removes the state file of link `ifindex`. A missing file is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Io`] on I/O failure, or
    /// [`LinkError::NotManaged`] if the file was not written by this crate.
    pub fn remove(&self, ifindex: i32) -> Result<()> {
        let path = self.state_path(ifindex);
        if !path.exists() {
            return Ok(());
        }
        if !is_managed(&path) {
            tracing::warn!(
                ifindex,
                path = %path.display(),
                "State file not managed by this crate, refusing to remove"
            );
            return Err(LinkError::NotManaged {
                path: path.display().to_string(),
            });
        }
        std::fs::remove_file(&path)?;
        tracing::debug!(ifindex, "Removed link state");
        Ok(())
    }

    /// Lists the interface indexes that have a managed state file.
    ///
    /// Returns an empty vec if the directory does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Io`] if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<i32>> {
        if !self.state_dir.exists() {
            return Ok(Vec::new());
        }

        let mut links = Vec::new();
        for entry in std::fs::read_dir(&self.state_dir)? {
            let path = entry?.path();
            if !path.is_file() || !is_managed(&path) {
                continue;
            }
            if let Some(ifindex) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse().ok())
            {
                links.push(ifindex);
            }
        }
        links.sort_unstable();
        Ok(links)
    }

    fn state_path(&self, ifindex: i32) -> PathBuf {
        self.state_dir.join(ifindex.to_string())
    }
}

impl StateSink for LinkStateStore {
    fn save_link_config(&mut self, link: &Link) -> Result<()> {
        self.save(link.ifindex(), &link.settings())
    }
}

// ---------------------------------------------------------------------------
// File content helpers
// ---------------------------------------------------------------------------

/// Generates state file content. Only settings that are set appear.
///
/// ```text
/// # managed by link-dns
/// LLMNR=resolve
/// DNSSEC=allow-downgrade
/// SERVERS=192.0.2.1 [2001:db8::1]:853#dns.example
/// DOMAINS=corp.example ~lab.example
/// NTAS=home.arpa
/// ```
fn generate_file_content(settings: &LinkSettings) -> String {
    let mut out = format!("{MANAGED_BY_MARKER}\n");
    // Writing to a String cannot fail.
    let mut line = |key: &str, value: &dyn std::fmt::Display| {
        let _ = writeln!(out, "{key}={value}");
    };

    if let Some(m) = settings.llmnr {
        line("LLMNR", &m);
    }
    if let Some(m) = settings.mdns {
        line("MDNS", &m);
    }
    if let Some(m) = settings.dns_over_tls {
        line("DNS_OVER_TLS", &m);
    }
    if let Some(m) = settings.dnssec {
        line("DNSSEC", &m);
    }
    if let Some(b) = settings.default_route {
        line("DEFAULT_ROUTE", &if b { "yes" } else { "no" });
    }
    if !settings.servers.is_empty() {
        let servers = settings.servers.iter().map(|s| encode_item(&s.to_string()));
        line("SERVERS", &join(servers));
    }
    if !settings.domains.is_empty() {
        let domains = settings.domains.iter().map(|d| {
            let name = encode_item(d.name.as_str());
            if d.route_only { format!("~{name}") } else { name }
        });
        line("DOMAINS", &join(domains));
    }
    if !settings.negative_trust_anchors.is_empty() {
        let anchors = settings.negative_trust_anchors.iter().map(|n| encode_item(n.as_str()));
        line("NTAS", &join(anchors));
    }
    out
}

fn join<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|i| i.to_string()).collect::<Vec<_>>().join(" ")
}

/// Escapes one list item so it survives whitespace splitting: backslashes,
/// whitespace and a leading `~` become `\DDD`.
fn encode_item(item: &str) -> String {
    let mut out = String::with_capacity(item.len());
    for (i, c) in item.char_indices() {
        if c == '\\' || c.is_ascii_whitespace() || (i == 0 && c == '~') {
            // Writing to a String cannot fail.
            let _ = write!(out, "\\{:03}", u32::from(c));
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverses [`encode_item`].
fn decode_item(token: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let digits: String = chars.by_ref().take(3).collect();
        let code = (digits.len() == 3 && digits.bytes().all(|b| b.is_ascii_digit()))
            .then(|| digits.parse::<u8>().ok())
            .flatten()
            .ok_or_else(|| format!("bad escape in {token}"))?;
        out.push(char::from(code));
    }
    Ok(out)
}

fn parse_file_content(content: &str) -> std::result::Result<LinkSettings, String> {
    let mut settings = LinkSettings::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(format!("malformed line: {line}"));
        };
        let bad = |e: &dyn std::fmt::Display| format!("bad {key} value: {e}");

        match key {
            "LLMNR" => settings.llmnr = Some(value.parse::<ResolveSupport>().map_err(|e| bad(&e))?),
            "MDNS" => settings.mdns = Some(value.parse::<ResolveSupport>().map_err(|e| bad(&e))?),
            "DNS_OVER_TLS" => {
                settings.dns_over_tls = Some(value.parse::<DnsOverTlsMode>().map_err(|e| bad(&e))?);
            }
            "DNSSEC" => settings.dnssec = Some(value.parse::<DnssecMode>().map_err(|e| bad(&e))?),
            "DEFAULT_ROUTE" => {
                settings.default_route = Some(match value {
                    "yes" => true,
                    "no" => false,
                    other => return Err(bad(&other)),
                });
            }
            "SERVERS" => {
                settings.servers = value
                    .split_whitespace()
                    .map(|t| decode_item(t)?.parse::<ServerAddress>().map_err(|e| bad(&e)))
                    .collect::<std::result::Result<_, _>>()?;
            }
            "DOMAINS" => {
                settings.domains = value
                    .split_whitespace()
                    .map(|t| {
                        let (name, route_only) = match t.strip_prefix('~') {
                            Some(name) => (name, true),
                            None => (t, false),
                        };
                        SearchDomainSpec::new(&decode_item(name)?, route_only).map_err(|e| bad(&e))
                    })
                    .collect::<std::result::Result<_, _>>()?;
            }
            "NTAS" => {
                settings.negative_trust_anchors = value
                    .split_whitespace()
                    .map(|t| decode_item(t)?.parse::<DomainName>().map_err(|e| bad(&e)))
                    .collect::<std::result::Result<BTreeSet<_>, _>>()?;
            }
            _ => tracing::debug!(key, "Ignoring unknown state file key"),
        }
    }
    Ok(settings)
}

/// Checks whether a file contains the ownership marker.
fn is_managed(path: &Path) -> bool {
    std::fs::read_to_string(path).is_ok_and(|c| c.starts_with(MANAGED_BY_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LinkSettings {
        LinkSettings {
            llmnr: Some(ResolveSupport::Resolve),
            dnssec: Some(DnssecMode::AllowDowngrade),
            dns_over_tls: Some(DnsOverTlsMode::Opportunistic),
            default_route: Some(false),
            servers: vec![
                "192.0.2.1".parse().unwrap(),
                "[2001:db8::1]:853#dns.example".parse().unwrap(),
            ],
            domains: vec![
                SearchDomainSpec::new("corp.example", false).unwrap(),
                SearchDomainSpec::new(".", true).unwrap(),
            ],
            negative_trust_anchors: BTreeSet::from(["home.arpa".parse::<DomainName>().unwrap()]),
            ..LinkSettings::default()
        }
    }

    #[test]
    fn generate_content_includes_marker_and_set_keys_only() {
        let content = generate_file_content(&sample());
        assert!(content.starts_with(MANAGED_BY_MARKER));
        assert!(content.contains("LLMNR=resolve\n"));
        assert!(content.contains("DNSSEC=allow-downgrade\n"));
        assert!(content.contains("DEFAULT_ROUTE=no\n"));
        assert!(content.contains("SERVERS=192.0.2.1 [2001:db8::1]:853#dns.example\n"));
        assert!(content.contains("DOMAINS=corp.example ~.\n"));
        assert!(!content.contains("MDNS="));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = LinkStateStore::with_dir(dir.path());
        store.save(7, &sample()).unwrap();
        assert!(dir.path().join("7").exists());
        assert_eq!(store.load(7).unwrap(), Some(sample()));
        assert_eq!(store.list().unwrap(), vec![7]);
    }

    #[test]
    fn awkward_names_round_trip() {
        let settings = LinkSettings {
            servers: vec![
                ServerAddress::with_port_and_name("192.0.2.9".parse().unwrap(), 853, Some("tls resolver.example"))
                    .unwrap(),
            ],
            domains: vec![
                SearchDomainSpec::new("with space.example", false).unwrap(),
                SearchDomainSpec::new("~tilde.example", false).unwrap(),
                SearchDomainSpec::new(r"back\\slash.example", true).unwrap(),
                SearchDomainSpec::new(r"dotted\.label.example", false).unwrap(),
            ],
            negative_trust_anchors: BTreeSet::from(["~nta example".parse::<DomainName>().unwrap()]),
            ..LinkSettings::default()
        };

        let content = generate_file_content(&settings);
        // Marker plus one line per key.
        assert_eq!(content.lines().count(), 4);
        assert!(content.contains(r"DOMAINS=with\032space.example \126tilde.example ~back\092\092slash.example"));

        let dir = tempfile::tempdir().unwrap();
        let store = LinkStateStore::with_dir(dir.path());
        store.save(5, &settings).unwrap();
        let loaded = store.load(5).unwrap().unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.domains[1].name.as_str(), "~tilde.example");
        assert!(!loaded.domains[1].route_only);
        assert_eq!(loaded.domains[2].name.as_str(), r"back\\slash.example");
    }

    #[test]
    fn bad_item_escape_is_corrupt() {
        assert!(parse_file_content("# managed by link-dns\nNTAS=a\\12x\n").is_err());
        assert!(parse_file_content("# managed by link-dns\nNTAS=a\\\n").is_err());
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(LinkStateStore::with_dir(dir.path()).load(1).unwrap(), None);
    }

    #[test]
    fn saving_empty_settings_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LinkStateStore::with_dir(dir.path());
        store.save(2, &sample()).unwrap();
        store.save(2, &LinkSettings::default()).unwrap();
        assert!(!dir.path().join("2").exists());
    }

    #[test]
    fn remove_refuses_unmanaged_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("3");
        std::fs::write(&path, "DNS=1.1.1.1\n").unwrap();

        let store = LinkStateStore::with_dir(dir.path());
        assert!(matches!(store.remove(3), Err(LinkError::NotManaged { .. })));
        assert!(path.exists());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("4"),
            format!("{MANAGED_BY_MARKER}\nDNSSEC=sometimes\n"),
        )
        .unwrap();
        let err = LinkStateStore::with_dir(dir.path()).load(4).unwrap_err();
        assert!(matches!(err, LinkError::CorruptState { .. }));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let settings = parse_file_content("# managed by link-dns\nFUTURE=1\nMDNS=yes\n").unwrap();
        assert_eq!(settings.mdns, Some(ResolveSupport::Yes));
    }

    #[test]
    fn list_nonexistent_dir() {
        assert!(LinkStateStore::with_dir("/nonexistent").list().unwrap().is_empty());
    }
}
