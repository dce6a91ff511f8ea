//! Version parsing and ordering.
//!
//! Supports:
//! - Latest: `git` or `git:latest`
//! - Experimental: `git:experimental`
//! - Exact: `git:4.11.4`
//! - Incrementals: `git:incrementals;org.jenkins-ci.plugins;4.12-rc1234.abcdef`
//!
//! Ordering is numeric per dot segment (`4.1.4 < 4.11.4`), missing trailing
//! segments count as zero, and any trailing qualifier (`-beta-1`,
//! `-rc2.f00d`, `.v7b_c717`) sorts below the bare numeric release it
//! decorates.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Literal requesting the newest release from the primary index.
pub const LATEST: &str = "latest";

/// Literal requesting the newest release from the experimental index.
pub const EXPERIMENTAL: &str = "experimental";

const INCREMENTALS_PREFIX: &str = "incrementals";

/// Errors raised while parsing a version specifier.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VersionSpecError {
    /// The version string was empty.
    #[error("Version must not be empty")]
    Empty,

    /// An `incrementals;…` specifier did not carry both a group id and a version.
    #[error("Invalid incrementals version '{0}': expected 'incrementals;<groupId>;<version>'")]
    InvalidIncrementals(String),
}

/// The version half of a plugin request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionSpec {
    /// Whatever the primary index currently reports as newest.
    Latest,
    /// Whatever the experimental index currently reports as newest.
    Experimental,
    /// An explicit dotted version.
    Exact(String),
    /// A build published to the incrementals repository.
    Incrementals {
        /// Maven group coordinate, e.g. `org.jenkins-ci.plugins.workflow`.
        group_id: String,
        /// Commit-qualified version, e.g. `2.20-rc530.b4f7f7869384`.
        version: String,
    },
}

impl VersionSpec {
    /// Parse a version specifier.
    ///
    /// # Errors
    ///
    /// Returns [`VersionSpecError::Empty`] for an empty string and
    /// [`VersionSpecError::InvalidIncrementals`] for a malformed
    /// `incrementals;…` triple.
    pub fn parse(s: &str) -> Result<Self, VersionSpecError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionSpecError::Empty);
        }
        if s.eq_ignore_ascii_case(LATEST) {
            return Ok(Self::Latest);
        }
        if s.eq_ignore_ascii_case(EXPERIMENTAL) {
            return Ok(Self::Experimental);
        }
        if let Some(rest) = s.strip_prefix(INCREMENTALS_PREFIX) {
            let parts: Vec<&str> = rest.split(';').collect();
            return match parts.as_slice() {
                ["", group_id, version] if !group_id.is_empty() && !version.is_empty() => {
                    Ok(Self::Incrementals {
                        group_id: (*group_id).to_string(),
                        version: (*version).to_string(),
                    })
                }
                _ => Err(VersionSpecError::InvalidIncrementals(s.to_string())),
            };
        }
        Ok(Self::Exact(s.to_string()))
    }

    /// The concrete version string, if this spec names one.
    pub fn exact(&self) -> Option<&str> {
        match self {
            Self::Exact(v) | Self::Incrementals { version: v, .. } => Some(v),
            Self::Latest | Self::Experimental => None,
        }
    }

    /// Returns `true` for `latest`.
    pub fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }

    /// Returns `true` for `experimental`.
    pub fn is_experimental(&self) -> bool {
        matches!(self, Self::Experimental)
    }

    /// Returns `true` for incrementals builds, which never float.
    pub fn is_incrementals(&self) -> bool {
        matches!(self, Self::Incrementals { .. })
    }

    /// The incrementals group coordinate, if any.
    pub fn group_id(&self) -> Option<&str> {
        match self {
            Self::Incrementals { group_id, .. } => Some(group_id),
            _ => None,
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str(LATEST),
            Self::Experimental => f.write_str(EXPERIMENTAL),
            Self::Exact(v) | Self::Incrementals { version: v, .. } => f.write_str(v),
        }
    }
}

impl From<&str> for VersionSpec {
    /// Lenient conversion: an unparsable string is kept as an exact version.
    fn from(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|_| Self::Exact(s.to_string()))
    }
}

/// Split a version into its numeric segments and an optional qualifier tail.
fn split_version(v: &str) -> (Vec<u64>, Option<&str>) {
    let mut numbers = Vec::new();
    let mut offset = 0;

    for segment in v.split('.') {
        let digits = segment.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return (numbers, Some(&v[offset..]).filter(|q| !q.is_empty()));
        }
        numbers.push(segment[..digits].parse().unwrap_or(u64::MAX));
        if digits < segment.len() {
            return (numbers, Some(&v[offset + digits..]));
        }
        offset += segment.len() + 1;
    }

    (numbers, None)
}

fn compare_numbers(a: &[u64], b: &[u64]) -> Ordering {
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// Natural ordering for qualifiers so that `beta-10` sorts after `beta-2`.
fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let mut run_a = String::new();
                while let Some(c) = a.next_if(char::is_ascii_digit) {
                    run_a.push(c);
                }
                let mut run_b = String::new();
                while let Some(c) = b.next_if(char::is_ascii_digit) {
                    run_b.push(c);
                }
                let na: u64 = run_a.parse().unwrap_or(u64::MAX);
                let nb: u64 = run_b.parse().unwrap_or(u64::MAX);
                match na.cmp(&nb) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            (Some(x), Some(y)) => {
                match x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase()) {
                    Ordering::Equal => {
                        a.next();
                        b.next();
                    }
                    other => return other,
                }
            }
        }
    }
}

/// Compare two version strings.
///
/// ```
/// use std::cmp::Ordering;
/// use pim_schema::version::compare;
///
/// assert_eq!(compare("4.1.4", "4.11.4"), Ordering::Less);
/// assert_eq!(compare("1.0", "1.0.0"), Ordering::Equal);
/// assert_eq!(compare("1.0-beta-1", "1.0"), Ordering::Less);
/// ```
pub fn compare(a: &str, b: &str) -> Ordering {
    let (a_num, a_qual) = split_version(a);
    let (b_num, b_qual) = split_version(b);

    match compare_numbers(&a_num, &b_num) {
        Ordering::Equal => {}
        other => return other,
    }

    match (a_qual, b_qual) {
        (None, None) => Ordering::Equal,
        // A bare release outranks any qualified build with the same numbers.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(x), Some(y)) => compare_qualifiers(x, y),
    }
}

/// Compare only the numeric rank of two versions, ignoring qualifiers.
pub fn compare_numeric(a: &str, b: &str) -> Ordering {
    compare_numbers(&split_version(a).0, &split_version(b).0)
}

/// Returns true if `candidate` is strictly newer than `current`.
pub fn is_newer(current: &str, candidate: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}

/// Returns true if the version carries a pre-release/experimental qualifier.
pub fn is_experimental(v: &str) -> bool {
    const MARKERS: [&str; 6] = ["alpha", "beta", "rc", "preview", "snapshot", "experimental"];
    split_version(v).1.is_some_and(|q| {
        let q = q.to_ascii_lowercase();
        MARKERS.iter().any(|m| q.contains(m))
    })
}

/// Decide whether `candidate` may replace `current` when floating to latest.
///
/// A pre-release is only ever replaced by something numerically newer when
/// the candidate is a GA build; it is never "downgraded" by format alone.
pub fn should_replace(current: &str, candidate: &str) -> bool {
    if is_experimental(current) && !is_experimental(candidate) {
        return compare_numeric(candidate, current) == Ordering::Greater;
    }
    is_newer(current, candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_numeric_segments() {
        assert_eq!(compare("1.1", "2.0.2"), Ordering::Less);
        assert_eq!(compare("4.1.4", "4.11.4"), Ordering::Less);
        assert_eq!(compare("3.2.1.1", "3.2.1.1"), Ordering::Equal);
        assert_eq!(compare("2.0.2", "1.1"), Ordering::Greater);
    }

    #[test]
    fn test_compare_missing_segments_are_zero() {
        assert_eq!(compare("1.0", "1.0.0.0"), Ordering::Equal);
        assert_eq!(compare("1.0.1", "1.0"), Ordering::Greater);
    }

    #[test]
    fn test_compare_qualifiers() {
        assert_eq!(compare("1.0-beta-1", "1.0"), Ordering::Less);
        assert_eq!(compare("1.0-beta-2", "1.0-beta-10"), Ordering::Less);
        assert_eq!(compare("1.1-beta-1", "1.0"), Ordering::Greater);
        assert_eq!(compare("1.0-alpha", "1.0-beta"), Ordering::Less);
    }

    #[test]
    fn test_compare_cd_style_versions() {
        assert_eq!(
            compare("2725.v7b_c717eb_12ce", "2746.v0da_83a_332669"),
            Ordering::Less
        );
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer("1.2.3", "1.2.4"));
        assert!(is_newer("1.2.3", "1.3.0"));
        assert!(!is_newer("1.2.3", "1.2.2"));
        assert!(!is_newer("1.2.3", "1.2.3"));
    }

    #[test]
    fn test_is_experimental() {
        assert!(is_experimental("1.0-beta-1"));
        assert!(is_experimental("2.20-rc530.b4f7f7869384"));
        assert!(is_experimental("1.0-SNAPSHOT"));
        assert!(!is_experimental("1.0"));
        assert!(!is_experimental("2725.v7b_c717eb_12ce"));
    }

    #[test]
    fn test_should_replace_experimental() {
        // GA of equal or lower rank never replaces a pre-release
        assert!(!should_replace("1.1-beta-1", "1.1"));
        assert!(!should_replace("1.1-beta-1", "1.0"));
        // strictly newer of either format does
        assert!(should_replace("1.1-beta-1", "1.2"));
        assert!(should_replace("1.1-beta-1", "1.1-beta-2"));
        // plain upgrade rules otherwise
        assert!(should_replace("1.0", "1.1"));
        assert!(!should_replace("1.1", "1.0"));
    }

    #[test]
    fn test_parse_spec() {
        assert_eq!(VersionSpec::parse("latest"), Ok(VersionSpec::Latest));
        assert_eq!(
            VersionSpec::parse("experimental"),
            Ok(VersionSpec::Experimental)
        );
        assert_eq!(
            VersionSpec::parse("1.2.3"),
            Ok(VersionSpec::Exact("1.2.3".into()))
        );
        assert_eq!(
            VersionSpec::parse("incrementals;org.jenkins-ci.plugins;2.20-rc530.b4f7"),
            Ok(VersionSpec::Incrementals {
                group_id: "org.jenkins-ci.plugins".into(),
                version: "2.20-rc530.b4f7".into(),
            })
        );
    }

    #[test]
    fn test_parse_spec_invalid() {
        assert_eq!(VersionSpec::parse(""), Err(VersionSpecError::Empty));
        assert!(matches!(
            VersionSpec::parse("incrementals;org.example"),
            Err(VersionSpecError::InvalidIncrementals(_))
        ));
    }

    #[test]
    fn test_spec_display() {
        assert_eq!(VersionSpec::Latest.to_string(), "latest");
        let inc = VersionSpec::parse("incrementals;g;1.0-rc1.abc").unwrap();
        assert_eq!(inc.to_string(), "1.0-rc1.abc");
        assert_eq!(inc.group_id(), Some("g"));
    }
}
