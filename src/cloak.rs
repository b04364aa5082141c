//! IP cloaking and uncloaking.
//!
//! The server masks user IPs octet by octet: each cloaked octet is the
//! first three base64 characters of an md5 over the accumulated plain
//! octets, the octet itself, and its index. Uncloaking is an exhaustive
//! per-octet search over 0–255 validated against the same keyed hash,
//! restartable at a given octet for partially cloaked addresses.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::{Digest, Md5};

/// Length of a cloaked octet.
const HASH_LEN: usize = 3;

/// md5 → base64, truncated.
fn ip_hash(input: &str, len: usize) -> String {
    let digest = Md5::digest(input.as_bytes());
    let mut encoded = STANDARD.encode(digest);
    encoded.truncate(len);
    encoded
}

/// Cloak an IP, starting at octet index `start` (0–3).
///
/// Octets before `start` pass through; missing octets pad with `*`.
#[must_use]
pub fn cloak_ip(ip: &str, start: usize) -> String {
    let mut parts: Vec<String> = ip.split('.').map(str::to_string).collect();
    let mut acc = String::new();
    for (i, part) in parts.iter_mut().enumerate() {
        if i < start {
            continue;
        }
        let plain = part.clone();
        *part = ip_hash(&format!("{acc}{plain}{i}"), HASH_LEN);
        acc.push_str(&plain);
    }
    while parts.len() < 4 {
        parts.push("*".to_string());
    }
    parts.join(".")
}

/// Uncloak an IP, searching from octet index `start` (`None` — detect the
/// first non-numeric octet). Returns every candidate that reproduces the
/// cloaked octets; an empty list means no match.
#[must_use]
pub fn uncloak_ip(ip: &str, start: Option<usize>) -> Vec<String> {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return Vec::new();
    }
    let start = start.unwrap_or_else(|| {
        parts
            .iter()
            .position(|p| !p.parse::<u64>().map(|v| v <= 255).unwrap_or(false))
            .unwrap_or(parts.len())
    });
    let mut found = Vec::new();
    let mut candidate: Vec<String> = parts.iter().map(|p| (*p).to_string()).collect();
    search(&parts, &mut candidate, String::new(), start, &mut found);
    found
}

/// Depth-first search over octet values, keyed on the accumulated plain
/// prefix exactly as `cloak_ip` builds it.
fn search(
    cloaked: &[&str],
    candidate: &mut Vec<String>,
    acc: String,
    index: usize,
    found: &mut Vec<String>,
) {
    if index > 3 {
        found.push(candidate.join("."));
        return;
    }
    for octet in 0u16..256 {
        if ip_hash(&format!("{acc}{octet}{index}"), HASH_LEN) == cloaked[index] {
            candidate[index] = octet.to_string();
            search(cloaked, candidate, format!("{acc}{octet}"), index + 1, found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloak_full() {
        assert_eq!(cloak_ip("127.0.0.1", 0), "yFA.j8g.iXh.gvS");
    }

    #[test]
    fn test_cloak_partial() {
        assert_eq!(cloak_ip("127.0.0.1", 2), "127.0.ou9.RBl");
    }

    #[test]
    fn test_cloak_pads_short_addresses() {
        let cloaked = cloak_ip("127.0", 0);
        assert_eq!(cloaked.split('.').count(), 4);
        assert!(cloaked.ends_with(".*.*"));
    }

    #[test]
    fn test_uncloak_full() {
        assert_eq!(uncloak_ip("yFA.j8g.iXh.gvS", Some(0)), vec!["127.0.0.1"]);
    }

    #[test]
    fn test_uncloak_partial_needs_matching_start() {
        assert!(uncloak_ip("127.0.ou9.RBl", Some(0)).is_empty());
        assert_eq!(uncloak_ip("127.0.ou9.RBl", Some(2)), vec!["127.0.0.1"]);
    }

    #[test]
    fn test_uncloak_detects_start() {
        assert_eq!(uncloak_ip("127.0.ou9.RBl", None), vec!["127.0.0.1"]);
    }

    #[test]
    fn test_uncloak_rejects_malformed() {
        assert!(uncloak_ip("abc.def", Some(0)).is_empty());
    }
}
