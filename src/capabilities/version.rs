//! Semantic version parsing and constraint matching.
//!
//! Supports the constraint forms capability manifests use in practice:
//! `*`, exact (`1.2.3` / `=1.2.3`), caret (`^1.2`), tilde (`~1.2.3`) and
//! comparison operators (`>=`, `<=`, `>`, `<`). Comma-separated clauses are
//! combined with AND, e.g. `">=1.0.0, <2.0.0"`. Pre-release and build
//! suffixes are accepted but ignored when comparing.

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::RegistryError;

static CLAUSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(\^|~|>=|<=|>|<|=)?\s*v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:[-+][0-9A-Za-z.+-]+)?\s*$",
    )
    .unwrap()
});

/// A `major.minor.patch` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version string. Missing minor/patch components default to 0.
    pub fn parse(input: &str) -> Option<Self> {
        let caps = CLAUSE_RE.captures(input)?;
        if caps.get(1).is_some() {
            return None;
        }
        Self::from_captures(&caps).map(|(v, _)| v)
    }

    /// Whether `input` is a full three-component semantic version.
    pub fn is_strict_semver(input: &str) -> bool {
        match CLAUSE_RE.captures(input) {
            Some(caps) => {
                caps.get(1).is_none()
                    && caps.get(3).is_some()
                    && caps.get(4).is_some()
                    && Self::from_captures(&caps).is_some()
            }
            None => false,
        }
    }

    /// Components that overflow `u64` make the whole version unparsable.
    fn from_captures(caps: &regex::Captures<'_>) -> Option<(Self, usize)> {
        let num = |i: usize| -> Option<Option<u64>> {
            match caps.get(i) {
                Some(m) => m.as_str().parse::<u64>().ok().map(Some),
                None => Some(None),
            }
        };
        let major = num(2)?.unwrap_or(0);
        let minor = num(3)?;
        let patch = num(4)?;
        let precision = 1 + minor.is_some() as usize + patch.is_some() as usize;
        Some((
            Self::new(major, minor.unwrap_or(0), patch.unwrap_or(0)),
            precision,
        ))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Exact,
    Caret,
    Tilde,
    Gte,
    Lte,
    Gt,
    Lt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    op: Op,
    version: Version,
    /// Number of components written in the constraint (1..=3).
    precision: usize,
}

impl Clause {
    fn matches(&self, v: &Version) -> bool {
        let base = self.version;
        match self.op {
            Op::Exact => match self.precision {
                1 => v.major == base.major,
                2 => v.major == base.major && v.minor == base.minor,
                _ => *v == base,
            },
            Op::Gte => v >= &base,
            Op::Lte => v <= &base,
            Op::Gt => v > &base,
            Op::Lt => v < &base,
            Op::Caret => {
                let upper = if base.major > 0 || self.precision == 1 {
                    next_at(base, 0)
                } else if base.minor > 0 || self.precision == 2 {
                    next_at(base, 1)
                } else {
                    next_at(base, 2)
                };
                v >= &base && below(v, upper)
            }
            Op::Tilde => {
                let upper = if self.precision == 1 {
                    next_at(base, 0)
                } else {
                    next_at(base, 1)
                };
                v >= &base && below(v, upper)
            }
        }
    }
}

/// Smallest version above every version sharing `base`'s first `level + 1`
/// components (0 = major). A component at `u64::MAX` carries into the one
/// above it; `None` when even the major overflows.
fn next_at(base: Version, level: usize) -> Option<Version> {
    match level {
        0 => base.major.checked_add(1).map(|m| Version::new(m, 0, 0)),
        1 => match base.minor.checked_add(1) {
            Some(m) => Some(Version::new(base.major, m, 0)),
            None => next_at(base, 0),
        },
        _ => match base.patch.checked_add(1) {
            Some(p) => Some(Version::new(base.major, base.minor, p)),
            None => next_at(base, 1),
        },
    }
}

/// A missing upper bound means the range is open above.
fn below(v: &Version, upper: Option<Version>) -> bool {
    upper.map_or(true, |u| v < &u)
}

/// A parsed version constraint (a conjunction of clauses).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    clauses: Vec<Clause>,
}

impl VersionConstraint {
    /// Parse a constraint string. `*` and the empty string match everything.
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        let trimmed = input.trim();
        let mut clauses = Vec::new();
        if !(trimmed.is_empty() || trimmed == "*" || trimmed == "latest") {
            for part in trimmed.split(',') {
                let caps = CLAUSE_RE
                    .captures(part)
                    .ok_or_else(|| RegistryError::InvalidVersionConstraint(input.to_string()))?;
                let op = match caps.get(1).map(|m| m.as_str()) {
                    None | Some("=") => Op::Exact,
                    Some("^") => Op::Caret,
                    Some("~") => Op::Tilde,
                    Some(">=") => Op::Gte,
                    Some("<=") => Op::Lte,
                    Some(">") => Op::Gt,
                    Some("<") => Op::Lt,
                    Some(_) => {
                        return Err(RegistryError::InvalidVersionConstraint(input.to_string()))
                    }
                };
                let (version, precision) = Version::from_captures(&caps)
                    .ok_or_else(|| RegistryError::InvalidVersionConstraint(input.to_string()))?;
                clauses.push(Clause {
                    op,
                    version,
                    precision,
                });
            }
        }
        Ok(Self {
            raw: input.to_string(),
            clauses,
        })
    }

    /// Whether `version` satisfies every clause. Unparsable versions only
    /// satisfy the wildcard constraint.
    pub fn matches(&self, version: &str) -> bool {
        match Version::parse(version) {
            Some(v) => self.matches_version(&v),
            None => self.clauses.is_empty(),
        }
    }

    pub fn matches_version(&self, version: &Version) -> bool {
        self.clauses.iter().all(|c| c.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Compare two version strings; unparsable versions sort first.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    Version::parse(a).cmp(&Version::parse(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(Version::parse("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(Version::parse("v2.0"), Some(Version::new(2, 0, 0)));
        assert_eq!(Version::parse("1.0.0-beta.1"), Some(Version::new(1, 0, 0)));
        assert_eq!(Version::parse(">=1.0.0"), None);
        assert_eq!(Version::parse("one"), None);
        assert!(Version::is_strict_semver("1.0.0"));
        assert!(!Version::is_strict_semver("1.0"));
    }

    #[test]
    fn test_caret_and_tilde() {
        let caret = VersionConstraint::parse("^1.2.0").unwrap();
        assert!(caret.matches("1.2.0"));
        assert!(caret.matches("1.9.9"));
        assert!(!caret.matches("2.0.0"));
        assert!(!caret.matches("1.1.9"));

        let zero_caret = VersionConstraint::parse("^0.3.1").unwrap();
        assert!(zero_caret.matches("0.3.7"));
        assert!(!zero_caret.matches("0.4.0"));

        let tilde = VersionConstraint::parse("~1.2.3").unwrap();
        assert!(tilde.matches("1.2.9"));
        assert!(!tilde.matches("1.3.0"));
    }

    #[test]
    fn test_ranges_and_wildcards() {
        let range = VersionConstraint::parse(">=1.0.0, <2.0.0").unwrap();
        assert!(range.matches("1.5.0"));
        assert!(!range.matches("2.0.0"));
        assert!(!range.matches("0.9.0"));

        let any = VersionConstraint::parse("*").unwrap();
        assert!(any.matches("0.0.1"));
        assert!(any.matches("not-a-version"));

        let partial = VersionConstraint::parse("1.2").unwrap();
        assert!(partial.matches("1.2.7"));
        assert!(!partial.matches("1.3.0"));
    }

    #[test]
    fn test_invalid_constraint() {
        assert!(matches!(
            VersionConstraint::parse(">>1.0"),
            Err(RegistryError::InvalidVersionConstraint(_))
        ));
        assert!(VersionConstraint::parse("1.0, banana").is_err());
    }

    #[test]
    fn test_max_component_has_open_upper_bound() {
        let caret = VersionConstraint::parse("^18446744073709551615.0.0").unwrap();
        assert!(caret.matches("18446744073709551615.0.0"));
        assert!(caret.matches("18446744073709551615.7.3"));
        assert!(!caret.matches("1.0.0"));

        let tilde = VersionConstraint::parse("~1.18446744073709551615").unwrap();
        assert!(tilde.matches("1.18446744073709551615.4"));
        assert!(!tilde.matches("2.0.0"));

        let zero_patch = VersionConstraint::parse("^0.0.18446744073709551615").unwrap();
        assert!(zero_patch.matches("0.0.18446744073709551615"));
    }

    #[test]
    fn test_oversized_components_do_not_parse() {
        assert_eq!(Version::parse("99999999999999999999.0.0"), None);
        assert_eq!(Version::parse("1.99999999999999999999"), None);
        assert!(!Version::is_strict_semver("99999999999999999999.0.0"));

        let below_one = VersionConstraint::parse("<1.0.0").unwrap();
        assert!(!below_one.matches("99999999999999999999.0.0"));
        assert!(matches!(
            VersionConstraint::parse(">=99999999999999999999.0.0"),
            Err(RegistryError::InvalidVersionConstraint(_))
        ));
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
    }
}
