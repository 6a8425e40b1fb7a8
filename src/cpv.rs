//! Category/package/version identity.

use std::fmt;

use crate::error::{Error, Result};
use crate::version::Version;

/// An unversioned `category/package` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cpn {
    pub category: String,
    pub package: String,
}

impl Cpn {
    pub fn new(category: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            package: package.into(),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (category, package) = s
            .split_once('/')
            .ok_or_else(|| Error::MalformedAtom(format!("missing category in {s:?}")))?;
        if category.is_empty() || package.is_empty() {
            return Err(Error::MalformedAtom(format!("malformed key {s:?}")));
        }
        Ok(Self::new(category, package))
    }
}

impl fmt::Display for Cpn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.package)
    }
}

/// A fully qualified `category/package-version` identity.
#[derive(Debug, Clone, Eq)]
pub struct Cpv {
    pub cpn: Cpn,
    pub version: Version,
}

impl Cpv {
    pub fn parse(s: &str) -> Result<Self> {
        let (key, ver) = crate::version::rsplit_version(s)
            .ok_or_else(|| Error::MalformedAtom(format!("missing version in {s:?}")))?;
        let cpn = Cpn::parse(key)?;
        let version = Version::parse(ver)?;
        Ok(Self { cpn, version })
    }

    pub fn key(&self) -> String {
        self.cpn.to_string()
    }
}

impl PartialEq for Cpv {
    fn eq(&self, other: &Self) -> bool {
        self.cpn == other.cpn && self.version == other.version
    }
}

impl std::hash::Hash for Cpv {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.cpn.hash(state);
        self.version.to_string().hash(state);
    }
}

impl Ord for Cpv {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cpn
            .cmp(&other.cpn)
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for Cpv {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Cpv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.cpn, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cpv() {
        let cpv = Cpv::parse("dev-lang/rust-1.75.0").unwrap();
        assert_eq!(cpv.cpn.category, "dev-lang");
        assert_eq!(cpv.cpn.package, "rust");
        assert_eq!(cpv.key(), "dev-lang/rust");
    }

    #[test]
    fn ordering_by_version() {
        let a = Cpv::parse("cat/pkg-1").unwrap();
        let b = Cpv::parse("cat/pkg-2").unwrap();
        assert!(a < b);
    }

    #[test]
    fn rejects_missing_version() {
        assert!(Cpv::parse("cat/pkg").is_err());
    }
}
