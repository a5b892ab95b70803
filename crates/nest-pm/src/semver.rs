//! Semantic versioning parser and range matching
//!
//! Provides semver parsing, range expressions (comparator sets joined by
//! whitespace, alternatives joined by `||`) and best-version selection.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during semver parsing and selection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemverError {
    /// Invalid version format
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// Invalid range format
    #[error("Invalid version range: {0}")]
    InvalidRange(String),

    /// No candidate satisfies the range
    #[error("No version matches range {range}")]
    NoMatchingVersion { range: String },
}

/// Semantic version (MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD])
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

/// A single comparator inside a range set
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Exact version (=1.2.3 or 1.2.3)
    Exact(Version),

    /// Caret range (^1.2.3 → >=1.2.3 <2.0.0)
    Caret(Version),

    /// Tilde range (~1.2.3 → >=1.2.3 <1.3.0)
    Tilde(Version),

    /// Greater than (>1.2.3)
    GreaterThan(Version),

    /// Greater than or equal (>=1.2.3)
    GreaterThanOrEqual(Version),

    /// Less than (<1.2.3)
    LessThan(Version),

    /// Less than or equal (<=1.2.3)
    LessThanOrEqual(Version),

    /// Wildcard (1.2.*, 1.x, 1)
    Wildcard(u64, Option<u64>),

    /// Any version (*)
    Any,
}

/// Version range: a union of comparator sets
///
/// Each inner set is an intersection; a version satisfies the range if it
/// satisfies every comparator of at least one set.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    sets: Vec<Vec<Constraint>>,
}

impl Version {
    /// Parse a version string
    ///
    /// Missing minor or patch components default to zero (`1.2` is `1.2.0`).
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let s = s.trim();

        // Remove 'v' prefix if present
        let s = s.strip_prefix('v').unwrap_or(s);

        // Split by + to separate build metadata
        let (version_part, build) = match s.split_once('+') {
            Some((v, b)) => (v, Some(b.to_string())),
            None => (s, None),
        };

        // Split by - to separate prerelease
        let (core_version, prerelease) = match version_part.split_once('-') {
            Some((v, p)) => (v, Some(p.to_string())),
            None => (version_part, None),
        };

        if let Some(pre) = &prerelease {
            if !is_valid_identifier_list(pre) {
                return Err(SemverError::InvalidVersion(format!(
                    "Invalid pre-release '{}' in '{}'",
                    pre, s
                )));
            }
        }
        if let Some(build) = &build {
            if !is_valid_identifier_list(build) {
                return Err(SemverError::InvalidVersion(format!(
                    "Invalid build metadata '{}' in '{}'",
                    build, s
                )));
            }
        }

        let parts: Vec<&str> = core_version.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(SemverError::InvalidVersion(format!(
                "Expected MAJOR.MINOR.PATCH, got '{}'",
                s
            )));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = parse_number(part)
                .ok_or_else(|| SemverError::InvalidVersion(format!("Invalid component '{}' in '{}'", part, s)))?;
        }

        Ok(Version {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            prerelease,
            build,
        })
    }

    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Bump major version (resets minor and patch to 0)
    ///
    /// `None` when the major component is already `u64::MAX`.
    pub fn bump_major(&self) -> Option<Self> {
        Some(Version::new(self.major.checked_add(1)?, 0, 0))
    }

    /// Bump minor version (resets patch to 0), carrying into major
    pub fn bump_minor(&self) -> Option<Self> {
        match self.minor.checked_add(1) {
            Some(minor) => Some(Version::new(self.major, minor, 0)),
            None => self.bump_major(),
        }
    }

    /// Bump patch version, carrying into minor
    pub fn bump_patch(&self) -> Option<Self> {
        match self.patch.checked_add(1) {
            Some(patch) => Some(Version::new(self.major, self.minor, patch)),
            None => self.bump_minor(),
        }
    }

    /// Check whether this version satisfies a range
    pub fn satisfies(&self, range: &Range) -> bool {
        range.satisfies(self)
    }

    /// Compare by semver precedence (build metadata ignored)
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                // Versions with prerelease are less than without
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            })
    }

    fn same_triple(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor && self.patch == other.patch
    }
}

fn parse_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn is_valid_identifier_list(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|id| {
            !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (parse_number(x), parse_number(y)) {
                    (Some(n), Some(m)) => n.cmp(&m),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl FromStr for Version {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Build metadata has no precedence; it only breaks ties so that
        // Ord agrees with Eq.
        self.cmp_precedence(other)
            .then_with(|| self.build.cmp(&other.build))
    }
}

/// A partially specified version (`1`, `1.2`, `1.2.x`, `1.2.3-rc.1`)
#[derive(Debug, Clone, Copy)]
struct Partial<'a> {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    rest: &'a str,
}

impl<'a> Partial<'a> {
    fn parse(s: &'a str, range: &str) -> Result<Self, SemverError> {
        let invalid = || SemverError::InvalidRange(format!("'{}' in '{}'", s, range));
        let s = s.strip_prefix('v').unwrap_or(s);
        if s.is_empty() {
            return Err(invalid());
        }

        // Keep any pre-release/build suffix for the full-version parse
        let core_end = s.find(['-', '+']).unwrap_or(s.len());
        let (core, rest) = s.split_at(core_end);

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid());
        }

        let mut numbers = [None; 3];
        let mut wildcard_seen = false;
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if matches!(*part, "x" | "X" | "*") {
                wildcard_seen = true;
                continue;
            }
            if wildcard_seen {
                // 1.x.3 has no sensible meaning
                return Err(invalid());
            }
            *slot = Some(parse_number(part).ok_or_else(invalid)?);
        }

        if !rest.is_empty() && numbers.iter().any(Option::is_none) {
            return Err(invalid());
        }

        Ok(Partial {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            rest,
        })
    }

    fn is_complete(&self) -> bool {
        self.patch.is_some()
    }

    fn floor(&self, range: &str) -> Result<Version, SemverError> {
        if self.is_complete() {
            let text = format!(
                "{}.{}.{}{}",
                self.major.unwrap_or(0),
                self.minor.unwrap_or(0),
                self.patch.unwrap_or(0),
                self.rest
            );
            return Version::parse(&text)
                .map_err(|_| SemverError::InvalidRange(format!("'{}' in '{}'", text, range)));
        }
        Ok(Version::new(
            self.major.unwrap_or(0),
            self.minor.unwrap_or(0),
            0,
        ))
    }

    fn wildcard(&self) -> Constraint {
        match (self.major, self.minor) {
            (None, _) => Constraint::Any,
            (Some(major), minor) => Constraint::Wildcard(major, minor),
        }
    }
}

impl Constraint {
    /// Parse a single comparator string
    ///
    /// Partial versions are widened the way npm does: `>1.2` becomes
    /// `>=1.3.0`, `<=1.2` becomes `<1.3.0`, `~1` becomes `1.x`.
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        Self::parse_in(s.trim(), s)
    }

    fn parse_in(s: &str, range: &str) -> Result<Self, SemverError> {
        if s.is_empty() {
            return Err(SemverError::InvalidRange(format!("empty comparator in '{}'", range)));
        }
        if matches!(s, "*" | "x" | "X") {
            return Ok(Constraint::Any);
        }

        // Check for operators (two-character ones first)
        let (op, rest) = [">=", "<=", ">", "<", "^", "~", "="]
            .iter()
            .find_map(|op| s.strip_prefix(op).map(|rest| (*op, rest.trim())))
            .unwrap_or(("", s));

        let partial = Partial::parse(rest, range)?;
        if partial.major.is_none() {
            // `>=*`, `^x` and friends all mean "anything"; `<*` matches nothing
            // but is rejected rather than silently producing an empty range.
            return match op {
                "<" | ">" => Err(SemverError::InvalidRange(format!("'{}' in '{}'", s, range))),
                _ => Ok(Constraint::Any),
            };
        }

        let floor = partial.floor(range)?;
        let complete = partial.is_complete();
        // Smallest version above everything the partial covers
        let ceiling = if partial.minor.is_none() {
            floor.bump_major()
        } else {
            floor.bump_minor()
        };

        Ok(match op {
            ">=" => Constraint::GreaterThanOrEqual(floor),
            "<" => Constraint::LessThan(floor),
            ">" if complete => Constraint::GreaterThan(floor),
            ">" => match ceiling {
                Some(next) => Constraint::GreaterThanOrEqual(next),
                None => {
                    return Err(SemverError::InvalidRange(format!(
                        "'{}' in '{}' matches no version",
                        s, range
                    )))
                }
            },
            "<=" if complete => Constraint::LessThanOrEqual(floor),
            "<=" => ceiling.map_or(Constraint::Any, Constraint::LessThan),
            "^" if complete || floor.major > 0 => Constraint::Caret(floor),
            "^" => partial.wildcard(),
            "~" if partial.minor.is_some() => Constraint::Tilde(floor),
            "~" => partial.wildcard(),
            _ if complete => Constraint::Exact(floor),
            _ => partial.wildcard(),
        })
    }

    /// Check if a version satisfies this comparator (ignoring pre-release gating)
    pub fn matches(&self, version: &Version) -> bool {
        let ge = |v: &Version| version.cmp_precedence(v) != Ordering::Less;
        let lt = |v: &Version| version.cmp_precedence(v) == Ordering::Less;

        match self {
            Constraint::Any => true,

            Constraint::Exact(v) => version.cmp_precedence(v) == Ordering::Equal,

            Constraint::Caret(v) => {
                // ^1.2.3 := >=1.2.3 <2.0.0
                // ^0.2.3 := >=0.2.3 <0.3.0
                // ^0.0.3 := >=0.0.3 <0.0.4
                let upper = if v.major > 0 {
                    v.bump_major()
                } else if v.minor > 0 {
                    v.bump_minor()
                } else {
                    v.bump_patch()
                };
                // No upper bound past u64::MAX
                ge(v) && upper.as_ref().map_or(true, lt)
            }

            Constraint::Tilde(v) => {
                // ~1.2.3 := >=1.2.3 <1.3.0
                ge(v) && v.bump_minor().as_ref().map_or(true, lt)
            }

            Constraint::GreaterThan(v) => version.cmp_precedence(v) == Ordering::Greater,
            Constraint::GreaterThanOrEqual(v) => ge(v),
            Constraint::LessThan(v) => lt(v),
            Constraint::LessThanOrEqual(v) => !version.cmp_precedence(v).is_gt(),

            Constraint::Wildcard(major, minor) => {
                version.major == *major && minor.map_or(true, |m| version.minor == m)
            }
        }
    }

    /// The version this comparator was written against, if any
    fn version(&self) -> Option<&Version> {
        match self {
            Constraint::Exact(v)
            | Constraint::Caret(v)
            | Constraint::Tilde(v)
            | Constraint::GreaterThan(v)
            | Constraint::GreaterThanOrEqual(v)
            | Constraint::LessThan(v)
            | Constraint::LessThanOrEqual(v) => Some(v),
            Constraint::Wildcard(..) | Constraint::Any => None,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Any => write!(f, "*"),
            Constraint::Exact(v) => write!(f, "{}", v),
            Constraint::Caret(v) => write!(f, "^{}", v),
            Constraint::Tilde(v) => write!(f, "~{}", v),
            Constraint::GreaterThan(v) => write!(f, ">{}", v),
            Constraint::GreaterThanOrEqual(v) => write!(f, ">={}", v),
            Constraint::LessThan(v) => write!(f, "<{}", v),
            Constraint::LessThanOrEqual(v) => write!(f, "<={}", v),
            Constraint::Wildcard(major, Some(minor)) => write!(f, "{}.{}.x", major, minor),
            Constraint::Wildcard(major, None) => write!(f, "{}.x", major),
        }
    }
}

impl Range {
    /// A range matching every release version
    pub fn any() -> Self {
        Range {
            sets: vec![vec![Constraint::Any]],
        }
    }

    /// A range matching exactly one version
    pub fn exact(version: &Version) -> Self {
        Range {
            sets: vec![vec![Constraint::Exact(version.clone())]],
        }
    }

    /// Parse a range expression
    ///
    /// Supports `||` alternatives, whitespace- or comma-separated comparator
    /// intersections, and inclusive hyphen ranges (`1.0.0 - 2.0.0`).
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(SemverError::InvalidRange("empty range".to_string()));
        }

        let sets = trimmed
            .split("||")
            .map(|alternative| Self::parse_set(alternative.trim(), s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Range { sets })
    }

    fn parse_set(set: &str, range: &str) -> Result<Vec<Constraint>, SemverError> {
        if set.is_empty() {
            return Err(SemverError::InvalidRange(format!("empty alternative in '{}'", range)));
        }

        let raw: Vec<&str> = set
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect();

        // Hyphen range: `A - B`
        if raw.len() == 3 && raw[1] == "-" {
            let low = Partial::parse(raw[0], range)?;
            let high = Partial::parse(raw[2], range)?;
            let mut constraints = Vec::with_capacity(2);
            if low.major.is_some() {
                constraints.push(Constraint::GreaterThanOrEqual(low.floor(range)?));
            }
            match (high.major, high.minor, high.is_complete()) {
                (None, _, _) => {}
                (Some(_), _, true) => constraints.push(Constraint::LessThanOrEqual(high.floor(range)?)),
                (Some(_), minor, false) => {
                    let floor = high.floor(range)?;
                    let ceiling = match minor {
                        None => floor.bump_major(),
                        Some(_) => floor.bump_minor(),
                    };
                    // Past u64::MAX there is nothing to exclude
                    if let Some(ceiling) = ceiling {
                        constraints.push(Constraint::LessThan(ceiling));
                    }
                }
            }
            if constraints.is_empty() {
                constraints.push(Constraint::Any);
            }
            return Ok(constraints);
        }

        // Glue bare operators to the following token (`>= 1.2.3`)
        let mut tokens: Vec<String> = Vec::with_capacity(raw.len());
        let mut pending: Option<&str> = None;
        for token in raw {
            if let Some(op) = pending.take() {
                tokens.push(format!("{}{}", op, token));
            } else if matches!(token, ">=" | "<=" | ">" | "<" | "=" | "^" | "~") {
                pending = Some(token);
            } else {
                tokens.push(token.to_string());
            }
        }
        if let Some(op) = pending {
            return Err(SemverError::InvalidRange(format!(
                "operator '{}' without version in '{}'",
                op, range
            )));
        }

        tokens
            .iter()
            .map(|token| Constraint::parse_in(token, range))
            .collect()
    }

    /// Check whether a version satisfies this range
    ///
    /// Pre-release versions only match a set that names a pre-release on the
    /// same MAJOR.MINOR.PATCH.
    pub fn satisfies(&self, version: &Version) -> bool {
        self.sets.iter().any(|set| {
            set.iter().all(|c| c.matches(version))
                && (!version.is_prerelease()
                    || set.iter().filter_map(Constraint::version).any(|v| {
                        v.is_prerelease() && v.same_triple(version)
                    }))
        })
    }

    /// Return the highest candidate satisfying this range
    pub fn best_of<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates
            .into_iter()
            .filter(|v| self.satisfies(v))
            .max()
    }

    /// If this range pins one exact version, return it
    pub fn fixed_version(&self) -> Option<&Version> {
        match self.sets.as_slice() {
            [set] => match set.as_slice() {
                [Constraint::Exact(v)] => Some(v),
                _ => None,
            },
            _ => None,
        }
    }
}

impl FromStr for Range {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Range::parse(s)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, set) in self.sets.iter().enumerate() {
            if i > 0 {
                write!(f, " || ")?;
            }
            for (j, constraint) in set.iter().enumerate() {
                if j > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", constraint)?;
            }
        }
        Ok(())
    }
}

/// Select the highest candidate satisfying `range`
///
/// This is the only tie-break rule used anywhere a version must be chosen.
pub fn select_best<'a, I>(candidates: I, range: &Range) -> Result<Version, SemverError>
where
    I: IntoIterator<Item = &'a Version>,
{
    range
        .best_of(candidates)
        .cloned()
        .ok_or_else(|| SemverError::NoMatchingVersion {
            range: range.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn r(s: &str) -> Range {
        Range::parse(s).unwrap()
    }

    #[test]
    fn test_parse_version() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 2);
        assert_eq!(v.patch, 3);
        assert!(v.prerelease.is_none());
        assert!(v.build.is_none());
    }

    #[test]
    fn test_parse_version_with_v_prefix() {
        assert_eq!(v("v1.2.3"), Version::new(1, 2, 3));
    }

    #[test]
    fn test_parse_partial_version() {
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("4"), Version::new(4, 0, 0));
    }

    #[test]
    fn test_parse_version_with_prerelease_and_build() {
        let v = v("1.2.3-alpha.1+build.123");
        assert_eq!(v.prerelease.as_deref(), Some("alpha.1"));
        assert_eq!(v.build.as_deref(), Some("build.123"));
        assert_eq!(v.to_string(), "1.2.3-alpha.1+build.123");
    }

    #[test]
    fn test_parse_invalid_versions() {
        for bad in ["", "a.b.c", "1.2.3.4", "1..3", "1.2.3-", "1.2.3+", "1.2.-3"] {
            assert!(
                matches!(Version::parse(bad), Err(SemverError::InvalidVersion(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(1, 0, 0) < Version::new(2, 0, 0));
        assert!(Version::new(1, 2, 0) < Version::new(1, 3, 0));
        assert!(Version::new(1, 2, 3) < Version::new(1, 2, 4));
        assert!(v("1.0.0-alpha") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("1.0.0-alpha.2") < v("1.0.0-alpha.10"));
        assert!(v("1.0.0-1") < v("1.0.0-alpha"));
        assert!(v("1.0.0-beta") < v("1.0.0-rc.1"));
    }

    #[test]
    fn test_build_metadata_has_no_precedence() {
        assert_eq!(v("1.0.0+a").cmp_precedence(&v("1.0.0+b")), Ordering::Equal);
        assert!(r("<=1.0.0").satisfies(&v("1.0.0+build")));
        // Ord still distinguishes them so that it agrees with Eq
        assert_ne!(v("1.0.0+a").cmp(&v("1.0.0+b")), Ordering::Equal);
    }

    #[test]
    fn test_parse_exact_constraint() {
        let c = Constraint::parse("1.2.3").unwrap();
        assert!(matches!(c, Constraint::Exact(_)));
        let c = Constraint::parse("=1.2.3").unwrap();
        assert!(matches!(c, Constraint::Exact(_)));
    }

    #[test]
    fn test_parse_caret_and_tilde() {
        assert!(matches!(Constraint::parse("^1.2.3").unwrap(), Constraint::Caret(_)));
        assert!(matches!(Constraint::parse("~1.2.3").unwrap(), Constraint::Tilde(_)));
        assert!(matches!(Constraint::parse("~1").unwrap(), Constraint::Wildcard(1, None)));
    }

    #[test]
    fn test_caret_match() {
        let c = r("^1.2.3");
        assert!(c.satisfies(&v("1.2.3")));
        assert!(c.satisfies(&v("1.9.9")));
        assert!(!c.satisfies(&v("1.2.2")));
        assert!(!c.satisfies(&v("2.0.0")));
    }

    #[test]
    fn test_caret_match_zero_major() {
        let c = r("^0.2.3");
        assert!(c.satisfies(&v("0.2.3")));
        assert!(c.satisfies(&v("0.2.4")));
        assert!(!c.satisfies(&v("0.3.0")));

        let c = r("^0.0.3");
        assert!(c.satisfies(&v("0.0.3")));
        assert!(!c.satisfies(&v("0.0.4")));
    }

    #[test]
    fn test_tilde_match() {
        let c = r("~1.2.3");
        assert!(c.satisfies(&v("1.2.3")));
        assert!(c.satisfies(&v("1.2.9")));
        assert!(!c.satisfies(&v("1.3.0")));
    }

    #[test]
    fn test_comparator_intersection() {
        let c = r(">=1.0.0 <2.0.0");
        assert!(c.satisfies(&v("1.0.0")));
        assert!(c.satisfies(&v("1.99.0")));
        assert!(!c.satisfies(&v("2.0.0")));
        assert!(!c.satisfies(&v("0.9.0")));

        // Spaces after operators and comma separators are accepted
        assert_eq!(r(">= 1.0.0, < 2.0.0"), c);
    }

    #[test]
    fn test_union() {
        let c = r("^1.0.0 || >=3.0.0");
        assert!(c.satisfies(&v("1.5.0")));
        assert!(!c.satisfies(&v("2.5.0")));
        assert!(c.satisfies(&v("3.1.0")));
    }

    #[test]
    fn test_hyphen_range() {
        let c = r("1.2.0 - 1.4.0");
        assert!(c.satisfies(&v("1.2.0")));
        assert!(c.satisfies(&v("1.4.0")));
        assert!(!c.satisfies(&v("1.4.1")));

        let c = r("1.2 - 1.4");
        assert!(c.satisfies(&v("1.4.9")));
        assert!(!c.satisfies(&v("1.5.0")));
    }

    #[test]
    fn test_wildcards_and_partials() {
        for expr in ["1.2.*", "1.2.x", "1.2"] {
            let c = r(expr);
            assert!(c.satisfies(&v("1.2.0")), "{expr}");
            assert!(c.satisfies(&v("1.2.999")), "{expr}");
            assert!(!c.satisfies(&v("1.3.0")), "{expr}");
        }
        assert!(r("1.x").satisfies(&v("1.9.0")));
        assert!(!r("1.x").satisfies(&v("2.0.0")));
    }

    #[test]
    fn test_partial_comparators() {
        assert!(!r(">1.2").satisfies(&v("1.2.9")));
        assert!(r(">1.2").satisfies(&v("1.3.0")));
        assert!(r("<=1.2").satisfies(&v("1.2.9")));
        assert!(!r("<=1.2").satisfies(&v("1.3.0")));
    }

    #[test]
    fn test_max_components_do_not_overflow() {
        let max = u64::MAX;
        let top = v(&format!("{max}.2.3"));
        assert!(r(&format!("^{max}.2.3")).satisfies(&top));
        assert!(r(&format!("~{max}.2.3")).satisfies(&v(&format!("{max}.2.9"))));
        assert!(r(&format!("^0.0.{max}")).satisfies(&v(&format!("0.0.{max}"))));
        assert!(r(&format!("<={max}")).satisfies(&top));
        assert!(r(&format!("<=1.{max}")).satisfies(&v(&format!("1.{max}.7"))));
        assert!(!r(&format!("<=1.{max}")).satisfies(&v("2.0.0")));
        assert!(r(&format!("1.0.0 - {max}")).satisfies(&top));
        assert!(!r(&format!(">{max}.{max}.{max}")).satisfies(&top));
        assert!(matches!(
            Range::parse(&format!(">{max}")),
            Err(SemverError::InvalidRange(_))
        ));
        assert_eq!(v(&format!("{max}.{max}.{max}")).bump_patch(), None);
        assert_eq!(v(&format!("1.{max}.{max}")).bump_patch(), Some(v("2.0.0")));
    }

    #[test]
    fn test_any_constraint() {
        let c = r("*");
        assert!(c.satisfies(&v("0.0.1")));
        assert!(c.satisfies(&v("999.999.999")));
    }

    #[test]
    fn test_prerelease_gating() {
        assert!(!r("*").satisfies(&v("1.0.0-beta")));
        assert!(!r("^1.0.0").satisfies(&v("1.1.0-beta")));
        assert!(r(">=1.1.0-beta").satisfies(&v("1.1.0-beta.2")));
        assert!(!r(">=1.1.0-beta").satisfies(&v("1.2.0-beta")));
        assert!(r(">=1.1.0-beta").satisfies(&v("1.2.0")));
    }

    #[test]
    fn test_invalid_ranges() {
        for bad in ["", "   ", ">=", "^a.b", "1.x.3", "1 ||", "<*", "1.2.3.4"] {
            assert!(
                matches!(Range::parse(bad), Err(SemverError::InvalidRange(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_select_best_returns_highest_match() {
        let candidates = [v("1.2.0"), v("1.3.0"), v("2.0.0"), v("1.2.5")];
        assert_eq!(select_best(&candidates, &r("^1.2.0")).unwrap(), v("1.3.0"));
        assert_eq!(select_best(&candidates, &r("*")).unwrap(), v("2.0.0"));
        assert!(matches!(
            select_best(&candidates, &r("^3.0.0")),
            Err(SemverError::NoMatchingVersion { .. })
        ));
    }

    #[test]
    fn test_fixed_version() {
        assert_eq!(r("=1.2.3").fixed_version(), Some(&v("1.2.3")));
        assert_eq!(r("^1.2.3").fixed_version(), None);
    }

    #[test]
    fn test_display_roundtrip() {
        let range = r("^1.2.0 <1.5.0 || 2.x");
        assert_eq!(range.to_string(), "^1.2.0 <1.5.0 || 2.x");
        assert_eq!(r(&range.to_string()), range);
    }
}
