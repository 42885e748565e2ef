//! Semantic version value type for model artifacts.
//!
//! Implements SemVer *precedence*: versions order on
//! `(major, minor, patch, prerelease)`, with build metadata excluded from
//! ordering, equality, and hashing. A version with a prerelease tag ranks
//! below the same version without one. The raw build string survives in
//! [`std::fmt::Display`] output and serialization, so two versions differing
//! only in build metadata compare equal but remain distinct printable values.

use crate::error::{ModelOpsError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Which component of a version to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Major,
    Minor,
    Patch,
}

/// An immutable semantic version.
///
/// Create with [`Version::new`] or [`Version::parse`]; bump helpers return
/// fresh values and never mutate in place.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl Version {
    /// Create a stable version with no prerelease or build metadata.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Parse a version string of the form
    /// `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]`.
    ///
    /// A leading `v` or `V` is accepted and stripped.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        let stripped = raw
            .strip_prefix('v')
            .or_else(|| raw.strip_prefix('V'))
            .unwrap_or(raw);

        if stripped.is_empty() {
            return Err(invalid(input, "empty version string"));
        }

        let (rest, build) = match stripped.split_once('+') {
            Some((rest, build)) => {
                validate_identifiers(build).map_err(|reason| invalid(input, &reason))?;
                (rest, Some(build.to_string()))
            }
            None => (stripped, None),
        };

        let (core, prerelease) = match rest.split_once('-') {
            Some((core, pre)) => {
                validate_identifiers(pre).map_err(|reason| invalid(input, &reason))?;
                (core, Some(pre.to_string()))
            }
            None => (rest, None),
        };

        let mut parts = core.split('.');
        let major = parse_component(parts.next(), input, "major")?;
        let minor = parse_component(parts.next(), input, "minor")?;
        let patch = parse_component(parts.next(), input, "patch")?;
        if parts.next().is_some() {
            return Err(invalid(input, "expected exactly three numeric components"));
        }

        Ok(Self {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }

    /// Bump the major component, zeroing minor/patch and dropping
    /// prerelease/build metadata.
    pub fn bump_major(&self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }

    /// Bump the minor component, zeroing patch and dropping
    /// prerelease/build metadata.
    pub fn bump_minor(&self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    /// Bump the patch component, dropping prerelease/build metadata.
    pub fn bump_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }

    /// Bump the named component.
    pub fn bump(&self, change: ChangeType) -> Self {
        match change {
            ChangeType::Major => self.bump_major(),
            ChangeType::Minor => self.bump_minor(),
            ChangeType::Patch => self.bump_patch(),
        }
    }

    /// Whether this version carries a prerelease tag.
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Whether this version is a stable release.
    pub fn is_stable(&self) -> bool {
        self.prerelease.is_none()
    }
}

fn invalid(input: &str, reason: &str) -> ModelOpsError {
    ModelOpsError::InvalidVersion {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_component(part: Option<&str>, input: &str, name: &str) -> Result<u64> {
    let part = part.ok_or_else(|| invalid(input, &format!("missing {} component", name)))?;
    part.parse::<u64>()
        .map_err(|_| invalid(input, &format!("{} component '{}' is not a number", name, part)))
}

/// Prerelease and build strings are dot-separated identifiers of
/// `[0-9A-Za-z-]`, none of them empty.
fn validate_identifiers(section: &str) -> std::result::Result<(), String> {
    if section.is_empty() {
        return Err("empty identifier section".to_string());
    }
    for ident in section.split('.') {
        if ident.is_empty() {
            return Err("empty identifier".to_string());
        }
        if !ident
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(format!("invalid identifier '{}'", ident));
        }
    }
    Ok(())
}

/// SemVer prerelease comparison: identifiers compare pairwise, numeric ones
/// numerically and below alphanumeric ones; a shorter list that is a prefix
/// of a longer one ranks lower.
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                // A release ranks above the same version with a prerelease tag.
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.prerelease.hash(state);
        // build excluded: equal-by-precedence values must hash identically
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ModelOpsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Wire form used by the versions store: component fields plus the
/// canonical string.
#[derive(Serialize, Deserialize)]
struct VersionRepr {
    #[serde(default)]
    version: String,
    major: u64,
    minor: u64,
    patch: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prerelease: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    build: Option<String>,
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        VersionRepr {
            version: self.to_string(),
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            prerelease: self.prerelease.clone(),
            build: self.build.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = VersionRepr::deserialize(deserializer)?;
        Ok(Self {
            major: repr.major,
            minor: repr.minor,
            patch: repr.patch,
            prerelease: repr.prerelease,
            build: repr.build,
        })
    }
}
