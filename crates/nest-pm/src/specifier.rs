//! Package specifiers (`[@scope/]name[@range]`)
//!
//! A specifier names a request, not a resolved package.

use crate::semver::{Range, SemverError};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while parsing a specifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecifierError {
    /// Malformed package name
    #[error("Invalid package name: {0}")]
    InvalidName(String),

    /// Malformed range after `@`
    #[error("Invalid range in specifier '{spec}': {error}")]
    InvalidRange { spec: String, error: SemverError },
}

/// A requested package: optional scope, name and version range text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageSpecifier {
    pub scope: Option<String>,
    pub name: String,
    pub range: String,
}

impl PackageSpecifier {
    /// Parse `[@scope/]name[@range]`; the range defaults to `*`
    pub fn parse(s: &str) -> Result<Self, SpecifierError> {
        let s = s.trim();

        // The first '@' of a scoped name is part of the name
        let search_from = usize::from(s.starts_with('@'));
        let (package, range) = match s[search_from..].find('@') {
            Some(pos) => {
                let (p, r) = s.split_at(search_from + pos);
                (p, r[1..].trim())
            }
            None => (s, ""),
        };

        let (scope, name) = split_package_name(package)?;
        let range = if range.is_empty() { "*" } else { range };

        // Validate early so bad ranges surface at the request boundary
        Range::parse(range).map_err(|error| SpecifierError::InvalidRange {
            spec: s.to_string(),
            error,
        })?;

        Ok(Self {
            scope,
            name,
            range: range.to_string(),
        })
    }

    /// Full package name including the scope (`@org/pkg`)
    pub fn full_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{}/{}", scope, self.name),
            None => self.name.clone(),
        }
    }

    /// Parsed version range
    pub fn range(&self) -> Result<Range, SemverError> {
        Range::parse(&self.range)
    }
}

impl FromStr for PackageSpecifier {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.full_name(), self.range)
    }
}

/// Split `[@scope/]name` into its parts, validating both
pub fn split_package_name(package: &str) -> Result<(Option<String>, String), SpecifierError> {
    let invalid = || SpecifierError::InvalidName(package.to_string());

    if let Some(scoped) = package.strip_prefix('@') {
        let (scope, name) = scoped.split_once('/').ok_or_else(invalid)?;
        if !is_valid_name_part(scope) || !is_valid_name_part(name) {
            return Err(invalid());
        }
        return Ok((Some(scope.to_string()), name.to_string()));
    }

    if !is_valid_name_part(package) {
        return Err(invalid());
    }
    Ok((None, package.to_string()))
}

/// Validate a full package name (`name` or `@scope/name`)
pub fn is_valid_package_name(name: &str) -> bool {
    split_package_name(name).is_ok()
}

/// Validate a name part (alphanumeric, hyphens, underscores, dots)
fn is_valid_name_part(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}
