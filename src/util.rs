//! Internal utilities.

use std::fmt::Write as _;

/// Object path prefix under which links are exported.
pub const LINK_PATH_PREFIX: &str = "/org/freedesktop/resolve1/link";

/// Returns the management object path of link `ifindex`.
///
/// ```
/// assert_eq!(link_dns::util::link_object_path(2), "/org/freedesktop/resolve1/link/_32");
/// ```
#[must_use]
pub fn link_object_path(ifindex: i32) -> String {
    format!("{LINK_PATH_PREFIX}/{}", escape_label(&ifindex.to_string()))
}

/// Extracts the interface index from a link object path. Returns `None`
/// for paths outside the link subtree and for non-positive indexes.
#[must_use]
pub fn parse_link_object_path(path: &str) -> Option<i32> {
    let label = path.strip_prefix(LINK_PATH_PREFIX)?.strip_prefix('/')?;
    if label.contains('/') {
        return None;
    }
    let ifindex: i32 = unescape_label(label)?.parse().ok()?;
    (ifindex > 0).then_some(ifindex)
}

/// Escapes `s` into a single object path element: letters stay, digits
/// stay unless leading, everything else becomes `_xx`. The empty string
/// becomes `_`.
fn escape_label(s: &str) -> String {
    if s.is_empty() {
        return "_".into();
    }
    let mut out = String::with_capacity(s.len() * 3);
    for (i, b) in s.bytes().enumerate() {
        if b.is_ascii_alphabetic() || (i > 0 && b.is_ascii_digit()) {
            out.push(char::from(b));
        } else {
            // Writing to a String cannot fail.
            let _ = write!(out, "_{b:02x}");
        }
    }
    out
}

fn unescape_label(s: &str) -> Option<String> {
    if s == "_" {
        return Some(String::new());
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
