//! EAPI feature gating.
//!
//! Only the atom-grammar-relevant differences named in the spec are
//! modeled: sub-slots and the slot operator appear in EAPI 5+, USE-dep
//! defaults (`flag(+)` / `flag(-)`) appear in EAPI 4+, blockers are always
//! available.

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Eapi(pub u32);

/// The highest EAPI this crate understands.
pub const MAX_SUPPORTED: u32 = 8;

impl Eapi {
    pub fn parse(s: &str) -> Result<Self> {
        let n: u32 = s
            .trim()
            .parse()
            .map_err(|_| Error::MalformedAtom(format!("invalid eapi {s:?}")))?;
        Self::new(n)
    }

    pub fn new(n: u32) -> Result<Self> {
        if n > MAX_SUPPORTED {
            return Err(Error::MalformedAtom(format!("unsupported eapi {n}")));
        }
        Ok(Self(n))
    }

    pub fn supports_subslots(self) -> bool {
        self.0 >= 5
    }

    pub fn supports_slot_operators(self) -> bool {
        self.0 >= 5
    }

    pub fn supports_use_dep_defaults(self) -> bool {
        self.0 >= 4
    }

    pub const LATEST: Eapi = Eapi(MAX_SUPPORTED);
}

impl fmt::Display for Eapi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Eapi {
    fn default() -> Self {
        Self::LATEST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_by_version() {
        assert!(!Eapi::new(4).unwrap().supports_subslots());
        assert!(Eapi::new(5).unwrap().supports_subslots());
        assert!(!Eapi::new(3).unwrap().supports_use_dep_defaults());
        assert!(Eapi::new(4).unwrap().supports_use_dep_defaults());
    }

    #[test]
    fn rejects_unsupported() {
        assert!(Eapi::new(99).is_err());
    }
}
