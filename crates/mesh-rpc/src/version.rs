//! Protocol version negotiation (spec C8/§4.8).
//!
//! No teacher analogue; grounded on the same three-integer numeric
//! comparison idiom the workspace already uses for `rust-version` checks
//! (`major.minor.patch`, strictly numeric, no pre-release suffix).

use std::cmp::Ordering;

use mesh_common::constants::DEFAULT_PROTOCOL_VERSION;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("version must be exactly three dot-separated non-negative integers, got {0:?}")]
    Malformed(String),
    #[error("no overlapping version between mine={mine:?} and theirs={theirs:?}")]
    NoIntersection { mine: Vec<String>, theirs: Vec<String> },
}

fn normalize(v: &str) -> &str {
    if v.is_empty() {
        DEFAULT_PROTOCOL_VERSION
    } else {
        v
    }
}

/// Parse `"major.minor.patch"` into a numeric triple, requiring exactly
/// three dot-separated non-negative integers. No empty-string exemption —
/// that defaulting is scoped to `is_supported`/negotiation, not parsing.
fn parse_raw(v: &str) -> Result<(u64, u64, u64), VersionError> {
    let parts: Vec<&str> = v.split('.').collect();
    let [a, b, c] = parts.as_slice() else {
        return Err(VersionError::Malformed(v.to_string()));
    };
    let parse_part = |s: &str| s.parse::<u64>().map_err(|_| VersionError::Malformed(v.to_string()));
    Ok((parse_part(a)?, parse_part(b)?, parse_part(c)?))
}

/// Parse `"major.minor.patch"` into a numeric triple, treating the empty
/// string as `current` (spec §4.8 handshake default).
pub fn parse(v: &str) -> Result<(u64, u64, u64), VersionError> {
    parse_raw(normalize(v))
}

/// Numeric `major.minor.patch` comparison (spec: `compare`).
pub fn compare(v1: &str, v2: &str) -> Result<Ordering, VersionError> {
    Ok(parse(v1)?.cmp(&parse(v2)?))
}

/// Negotiates the wire protocol version a peer pair should use
/// (spec C8/§4.8).
pub struct VersionNegotiator {
    current: String,
    min_supported: String,
    max_supported: String,
    supported: Vec<String>,
}

impl VersionNegotiator {
    #[must_use]
    pub fn new(current: &str, min_supported: &str, max_supported: &str, supported: Vec<String>) -> Self {
        Self {
            current: current.to_string(),
            min_supported: min_supported.to_string(),
            max_supported: max_supported.to_string(),
            supported,
        }
    }

    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    #[must_use]
    pub fn supported_versions(&self) -> &[String] {
        &self.supported
    }

    /// `is_supported(v)`: empty string maps to the default version.
    #[must_use]
    pub fn is_supported(&self, v: &str) -> bool {
        let v = normalize(v);
        self.supported.iter().any(|s| s == v)
    }

    /// `negotiate(mine, theirs)`: the highest version present in both
    /// lists, by descending numeric priority. Errors if there is no
    /// intersection.
    pub fn negotiate(&self, theirs: &[String]) -> Result<String, VersionError> {
        let mut candidates: Vec<&String> = self
            .supported
            .iter()
            .filter(|v| theirs.iter().any(|t| normalize(t) == normalize(v)))
            .collect();
        candidates.sort_by(|a, b| compare(b, a).unwrap_or(Ordering::Equal));
        candidates.into_iter().next().cloned().ok_or_else(|| VersionError::NoIntersection {
            mine: self.supported.clone(),
            theirs: theirs.to_vec(),
        })
    }

    #[must_use]
    pub fn min_supported(&self) -> &str {
        &self.min_supported
    }

    #[must_use]
    pub fn max_supported(&self) -> &str {
        &self.max_supported
    }
}

/// `validate(v)`: requires exactly three dot-separated non-negative
/// integers (spec §4.8). Unlike `parse`, the empty string is not exempted —
/// that default is a handshake/`is_supported` convenience, not a valid
/// version string.
pub fn validate(v: &str) -> Result<(), VersionError> {
    parse_raw(v).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiator() -> VersionNegotiator {
        VersionNegotiator::new(
            "1.0.0",
            "1.0.0",
            "1.0.0",
            vec!["1.0.0".to_string()],
        )
    }

    #[test]
    fn empty_version_treated_as_default() {
        assert!(negotiator().is_supported(""));
    }

    #[test]
    fn negotiate_finds_common_version() {
        let n = negotiator();
        assert_eq!(n.negotiate(&["1.0.0".to_string()]).unwrap(), "1.0.0");
    }

    #[test]
    fn negotiate_fails_without_intersection() {
        let n = negotiator();
        assert!(n.negotiate(&["2.0.0".to_string()]).is_err());
    }

    #[test]
    fn compare_is_numeric_not_lexicographic() {
        assert_eq!(compare("1.2.0", "1.10.0").unwrap(), Ordering::Less);
    }

    #[test]
    fn validate_rejects_non_triple() {
        assert!(validate("1.0").is_err());
        assert!(validate("1.0.0.0").is_err());
        assert!(validate("1.0.0").is_ok());
    }

    #[test]
    fn validate_rejects_empty_string_unlike_is_supported() {
        assert!(validate("").is_err());
        assert!(negotiator().is_supported(""));
    }
}
