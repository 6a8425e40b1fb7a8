//! Arena-based interning shared by the repository layer and the resolver.
//!
//! Mirrors the weak-instance pattern used throughout the profile/repository
//! code: rather than cloning [`Cpv`]/[`Atom`] values around, callers intern
//! them once and pass around cheap `Copy` ids. Reverse-lookup maps keep
//! interning idempotent.

use std::collections::HashMap;

use crate::atom::Atom;
use crate::cpv::{Cpn, Cpv};
use crate::eapi::Eapi;
use crate::error::{Error, Result};
use crate::restrict::Restrict;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            fn from_usize(i: usize) -> Self {
                Self(i as u32)
            }

            fn to_usize(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(NameId);
arena_id!(SolvableId);
arena_id!(StringId);

/// Package name used as the resolver's name axis. Slots are part of the
/// name so that `dev-lang/python:3.11` and `dev-lang/python:3.12` are
/// tracked as independent candidate pools, per §4.3.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageName {
    pub cpn: Cpn,
    pub slot: Option<String>,
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cpn)?;
        if let Some(slot) = &self.slot {
            write!(f, ":{slot}")?;
        }
        Ok(())
    }
}

/// PMS dependency class, one per ebuild dependency variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepClass {
    Depend,
    Rdepend,
    Bdepend,
    Pdepend,
    Idepend,
}

impl std::fmt::Display for DepClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DepClass::Depend => "DEPEND",
            DepClass::Rdepend => "RDEPEND",
            DepClass::Bdepend => "BDEPEND",
            DepClass::Pdepend => "PDEPEND",
            DepClass::Idepend => "IDEPEND",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct PackageDeps {
    pub depend: Vec<crate::restrict::Restrict>,
    pub rdepend: Vec<crate::restrict::Restrict>,
    pub bdepend: Vec<crate::restrict::Restrict>,
    pub pdepend: Vec<crate::restrict::Restrict>,
    pub idepend: Vec<crate::restrict::Restrict>,
}

impl PackageDeps {
    pub fn iter_classes(&self) -> impl Iterator<Item = (DepClass, &[crate::restrict::Restrict])> {
        [
            (DepClass::Depend, self.depend.as_slice()),
            (DepClass::Rdepend, self.rdepend.as_slice()),
            (DepClass::Bdepend, self.bdepend.as_slice()),
            (DepClass::Pdepend, self.pdepend.as_slice()),
            (DepClass::Idepend, self.idepend.as_slice()),
        ]
        .into_iter()
        .filter(|(_, entries)| !entries.is_empty())
    }
}

/// Parses a PMS depstring (`DEPEND`/`RDEPEND`/…) into the flat sequence of
/// top-level restrictions it ANDs together. Handles bare atoms, `|| ( ... )`
/// any-of groups, bare `( ... )` grouping, and `flag? ( ... )` /
/// `!flag? ( ... )` USE-conditional groups; tokens are whitespace-separated
/// per PMS (parens always stand alone).
pub fn parse_depset(s: &str, eapi: Eapi) -> Result<Vec<Restrict>> {
    let tokens: Vec<&str> = s.split_whitespace().collect();
    let mut pos = 0;
    let parsed = parse_group(&tokens, &mut pos, eapi)?;
    if pos != tokens.len() {
        return Err(Error::MalformedAtom(format!("depset {s:?}: unexpected token {:?}", tokens[pos])));
    }
    Ok(parsed)
}

fn parse_group(tokens: &[&str], pos: &mut usize, eapi: Eapi) -> Result<Vec<Restrict>> {
    let mut out = Vec::new();
    while *pos < tokens.len() && tokens[*pos] != ")" {
        let tok = tokens[*pos];
        if tok == "||" {
            *pos += 1;
            expect(tokens, pos, "(")?;
            let inner = parse_group(tokens, pos, eapi)?;
            expect(tokens, pos, ")")?;
            out.push(Restrict::or(inner));
        } else if tok == "(" {
            *pos += 1;
            let inner = parse_group(tokens, pos, eapi)?;
            expect(tokens, pos, ")")?;
            out.push(Restrict::and(inner));
        } else if let Some(flag) = tok.strip_suffix('?') {
            let (negate, flag) = match flag.strip_prefix('!') {
                Some(f) => (true, f),
                None => (false, flag),
            };
            let flag = flag.to_string();
            *pos += 1;
            expect(tokens, pos, "(")?;
            let inner = parse_group(tokens, pos, eapi)?;
            expect(tokens, pos, ")")?;
            out.push(Restrict::UseConditional {
                flag,
                negate,
                inner: Box::new(Restrict::and(inner)),
            });
        } else {
            let atom = Atom::parse(tok, eapi)?;
            out.push(Restrict::Atom(atom));
            *pos += 1;
        }
    }
    Ok(out)
}

fn expect(tokens: &[&str], pos: &mut usize, expected: &str) -> Result<()> {
    if tokens.get(*pos) != Some(&expected) {
        return Err(Error::MalformedAtom(format!(
            "depset: expected {expected:?}, found {:?}",
            tokens.get(*pos)
        )));
    }
    *pos += 1;
    Ok(())
}

/// Metadata for one concrete, resolved package version.
#[derive(Debug, Clone)]
pub struct PackageMetadata {
    pub cpv: Cpv,
    pub slot: Option<String>,
    pub subslot: Option<String>,
    pub iuse: Vec<String>,
    pub use_flags: std::collections::HashSet<String>,
    pub repo: Option<String>,
    pub dependencies: PackageDeps,
    pub masked: bool,
}

pub struct Pool {
    names: Vec<PackageName>,
    names_rev: HashMap<PackageName, NameId>,

    solvables: Vec<PackageMetadata>,
    solvable_names: Vec<NameId>,
    cpv_rev: HashMap<Cpv, SolvableId>,

    strings: Vec<String>,
    strings_rev: HashMap<String, StringId>,
}

impl Pool {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            names_rev: HashMap::new(),
            solvables: Vec::new(),
            solvable_names: Vec::new(),
            cpv_rev: HashMap::new(),
            strings: Vec::new(),
            strings_rev: HashMap::new(),
        }
    }

    pub fn intern_name(&mut self, name: PackageName) -> NameId {
        if let Some(&id) = self.names_rev.get(&name) {
            return id;
        }
        let id = NameId::from_usize(self.names.len());
        self.names_rev.insert(name.clone(), id);
        self.names.push(name);
        id
    }

    pub fn resolve_name(&self, id: NameId) -> &PackageName {
        &self.names[id.to_usize()]
    }

    /// Intern a solvable, deduplicating on its `Cpv` (a repository should
    /// never emit the same cpv twice, but a multiplex of repositories can
    /// legitimately shadow one — first interned wins).
    pub fn intern_solvable(&mut self, name_id: NameId, meta: PackageMetadata) -> SolvableId {
        if let Some(&id) = self.cpv_rev.get(&meta.cpv) {
            return id;
        }
        let id = SolvableId::from_usize(self.solvables.len());
        self.cpv_rev.insert(meta.cpv.clone(), id);
        self.solvables.push(meta);
        self.solvable_names.push(name_id);
        id
    }

    pub fn resolve_solvable(&self, id: SolvableId) -> &PackageMetadata {
        &self.solvables[id.to_usize()]
    }

    pub fn solvable_name(&self, id: SolvableId) -> NameId {
        self.solvable_names[id.to_usize()]
    }

    pub fn solvable_by_cpv(&self, cpv: &Cpv) -> Option<SolvableId> {
        self.cpv_rev.get(cpv).copied()
    }

    pub fn intern_string(&mut self, s: impl Into<String>) -> StringId {
        let s = s.into();
        if let Some(&id) = self.strings_rev.get(&s) {
            return id;
        }
        let id = StringId::from_usize(self.strings.len());
        self.strings_rev.insert(s.clone(), id);
        self.strings.push(s);
        id
    }

    pub fn resolve_string(&self, id: StringId) -> &str {
        &self.strings[id.to_usize()]
    }

    pub fn solvables_for_name(&self, name_id: NameId) -> impl Iterator<Item = SolvableId> + '_ {
        self.solvable_names
            .iter()
            .enumerate()
            .filter(move |&(_, &n)| n == name_id)
            .map(|(i, _)| SolvableId::from_usize(i))
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_depset_bare_atoms() {
        let parsed = parse_depset("dev-lang/python dev-lang/rust", Eapi::LATEST).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn parse_depset_any_of_group() {
        let parsed = parse_depset("|| ( dev-lang/python dev-lang/rust )", Eapi::LATEST).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(matches!(parsed[0], Restrict::Or(_)));
    }

    #[test]
    fn parse_depset_use_conditional() {
        let parsed = parse_depset("foo? ( dev-lang/rust )", Eapi::LATEST).unwrap();
        assert_eq!(parsed.len(), 1);
        match &parsed[0] {
            Restrict::UseConditional { flag, negate, .. } => {
                assert_eq!(flag, "foo");
                assert!(!negate);
            }
            other => panic!("expected UseConditional, got {other:?}"),
        }
    }

    #[test]
    fn parse_depset_negated_use_conditional_and_nested_group() {
        let parsed = parse_depset("!bar? ( dev-lang/python dev-lang/rust )", Eapi::LATEST).unwrap();
        match &parsed[0] {
            Restrict::UseConditional { flag, negate, inner } => {
                assert_eq!(flag, "bar");
                assert!(negate);
                assert!(matches!(inner.as_ref(), Restrict::And(parts) if parts.len() == 2));
            }
            other => panic!("expected UseConditional, got {other:?}"),
        }
    }

    #[test]
    fn parse_depset_rejects_unbalanced_group() {
        assert!(parse_depset("( dev-lang/rust", Eapi::LATEST).is_err());
    }

    #[test]
    fn parse_depset_empty_is_empty() {
        assert!(parse_depset("", Eapi::LATEST).unwrap().is_empty());
    }

    fn name(cat: &str, pkg: &str) -> PackageName {
        PackageName {
            cpn: Cpn::new(cat, pkg),
            slot: None,
        }
    }

    #[test]
    fn intern_name_dedup() {
        let mut pool = Pool::new();
        let a = pool.intern_name(name("dev-lang", "rust"));
        let b = pool.intern_name(name("dev-lang", "rust"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_slots_are_different_names() {
        let mut pool = Pool::new();
        let a = pool.intern_name(PackageName {
            cpn: Cpn::new("dev-lang", "python"),
            slot: Some("3.11".into()),
        });
        let b = pool.intern_name(PackageName {
            cpn: Cpn::new("dev-lang", "python"),
            slot: Some("3.12".into()),
        });
        assert_ne!(a, b);
    }

    #[test]
    fn solvable_dedups_on_cpv() {
        let mut pool = Pool::new();
        let name_id = pool.intern_name(name("dev-lang", "rust"));
        let meta = PackageMetadata {
            cpv: Cpv::parse("dev-lang/rust-1.75.0").unwrap(),
            slot: Some("0".into()),
            subslot: None,
            iuse: vec![],
            use_flags: Default::default(),
            repo: None,
            dependencies: PackageDeps::default(),
            masked: false,
        };
        let a = pool.intern_solvable(name_id, meta.clone());
        let b = pool.intern_solvable(name_id, meta);
        assert_eq!(a, b);
    }

    #[test]
    fn solvables_for_name_filters() {
        let mut pool = Pool::new();
        let rust = pool.intern_name(name("dev-lang", "rust"));
        let python = pool.intern_name(name("dev-lang", "python"));
        pool.intern_solvable(
            rust,
            PackageMetadata {
                cpv: Cpv::parse("dev-lang/rust-1.75.0").unwrap(),
                slot: None,
                subslot: None,
                iuse: vec![],
                use_flags: Default::default(),
                repo: None,
                dependencies: PackageDeps::default(),
                masked: false,
            },
        );
        pool.intern_solvable(
            python,
            PackageMetadata {
                cpv: Cpv::parse("dev-lang/python-3.12.0").unwrap(),
                slot: None,
                subslot: None,
                iuse: vec![],
                use_flags: Default::default(),
                repo: None,
                dependencies: PackageDeps::default(),
                masked: false,
            },
        );
        assert_eq!(pool.solvables_for_name(rust).count(), 1);
    }
}
