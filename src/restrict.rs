//! Restriction-tree algebra.
//!
//! A `Restrict` is a boolean predicate tree over packages. Profiles,
//! repositories, and the resolver all build these trees (atoms are one leaf
//! kind among several) and evaluate them with [`Restrict::matches`].

use std::fmt;

use crate::atom::Atom;
use crate::repo::tree::MatchablePackage;
use crate::version::{version_matches, Operator, Version};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrMatch {
    Exact(String),
    Prefix(String),
    Glob(String),
}

impl StrMatch {
    fn matches(&self, s: &str) -> bool {
        match self {
            StrMatch::Exact(v) => s == v,
            StrMatch::Prefix(v) => s.starts_with(v.as_str()),
            StrMatch::Glob(pattern) => glob_match(pattern, s),
        }
    }
}

fn glob_match(pattern: &str, s: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == s,
        Some((prefix, suffix)) => {
            s.len() >= prefix.len() + suffix.len()
                && s.starts_with(prefix)
                && s.ends_with(suffix)
        }
    }
}

/// Which textual field of a package a [`StrMatch`] is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageField {
    Category,
    Package,
    Slot,
    Repo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restrict {
    Atom(Atom),
    PackageField(PackageField, StrMatch),
    /// `flag? ( inner )` / `!flag? ( inner )` from a depset: `inner` applies
    /// only when the *evaluating* package's own USE state has `flag` at
    /// `negate`'s opposite. Interpreted by [`Restrict::matches`] against the
    /// package being matched and, separately, by the resolver's depset
    /// walk against the dependency's origin package.
    UseConditional {
        flag: String,
        negate: bool,
        inner: Box<Restrict>,
    },
    /// Containment over a package's IUSE set; `match_all` requires every
    /// value present, otherwise any one suffices.
    ContainmentMatch { values: Vec<String>, match_all: bool },
    /// A version restriction independent of any particular atom.
    VersionMatch(Operator, Version),
    And(Vec<Restrict>),
    Or(Vec<Restrict>),
    Not(Box<Restrict>),
    /// Matches everything; the empty conjunction.
    Always,
    /// Matches nothing; the empty disjunction.
    Never,
}

impl Restrict {
    pub fn and(parts: impl IntoIterator<Item = Restrict>) -> Restrict {
        let parts: Vec<_> = parts.into_iter().filter(|r| *r != Restrict::Always).collect();
        if parts.iter().any(|r| *r == Restrict::Never) {
            Restrict::Never
        } else if parts.is_empty() {
            Restrict::Always
        } else if parts.len() == 1 {
            parts.into_iter().next().unwrap()
        } else {
            Restrict::And(parts)
        }
    }

    pub fn or(parts: impl IntoIterator<Item = Restrict>) -> Restrict {
        let parts: Vec<_> = parts.into_iter().filter(|r| *r != Restrict::Never).collect();
        if parts.iter().any(|r| *r == Restrict::Always) {
            Restrict::Always
        } else if parts.is_empty() {
            Restrict::Never
        } else if parts.len() == 1 {
            parts.into_iter().next().unwrap()
        } else {
            Restrict::Or(parts)
        }
    }

    pub fn not(r: Restrict) -> Restrict {
        match r {
            Restrict::Always => Restrict::Never,
            Restrict::Never => Restrict::Always,
            Restrict::Not(inner) => *inner,
            other => Restrict::Not(Box::new(other)),
        }
    }

    pub fn matches(&self, pkg: &dyn MatchablePackage) -> bool {
        match self {
            Restrict::Atom(atom) => atom.matches(pkg),
            Restrict::PackageField(field, matcher) => {
                let value = match field {
                    PackageField::Category => &pkg.cpn().category,
                    PackageField::Package => &pkg.cpn().package,
                    PackageField::Slot => pkg.slot().unwrap_or(""),
                    PackageField::Repo => pkg.repo_id().unwrap_or(""),
                };
                matcher.matches(value)
            }
            Restrict::UseConditional { flag, negate, inner } => {
                let has = pkg.enabled_use().is_some_and(|u| u.contains(flag));
                if has != *negate {
                    inner.matches(pkg)
                } else {
                    true
                }
            }
            Restrict::ContainmentMatch { values, match_all } => {
                let have: std::collections::HashSet<&str> = pkg.iuse().iter().map(String::as_str).collect();
                if *match_all {
                    values.iter().all(|v| have.contains(v.as_str()))
                } else {
                    values.iter().any(|v| have.contains(v.as_str()))
                }
            }
            Restrict::VersionMatch(op, version) => version_matches(pkg.version(), *op, version),
            Restrict::And(parts) => parts.iter().all(|r| r.matches(pkg)),
            Restrict::Or(parts) => parts.iter().any(|r| r.matches(pkg)),
            Restrict::Not(inner) => !inner.matches(pkg),
            Restrict::Always => true,
            Restrict::Never => false,
        }
    }

    /// Expands into disjunctive normal form: a finite sequence of `And`-terms
    /// whose disjunction is equivalent to `self`. `Not` is pushed down via De
    /// Morgan only for `And`/`Or`; a `Not` wrapping anything else is left as
    /// a leaf (conservative — the literal itself still matches correctly,
    /// it's just not distributed further).
    pub fn iter_dnf(&self) -> Vec<Restrict> {
        match self {
            Restrict::Or(parts) => parts.iter().flat_map(|p| p.iter_dnf()).collect(),
            Restrict::And(parts) => {
                let mut terms = vec![Vec::new()];
                for part in parts {
                    let part_terms = part.iter_dnf();
                    let mut next = Vec::with_capacity(terms.len() * part_terms.len().max(1));
                    for existing in &terms {
                        for term in &part_terms {
                            let mut combined = existing.clone();
                            combined.push(term.clone());
                            next.push(combined);
                        }
                    }
                    terms = next;
                }
                terms.into_iter().map(Restrict::and).collect()
            }
            Restrict::Not(inner) => match inner.as_ref() {
                Restrict::Or(parts) => Restrict::and(parts.iter().map(|p| Restrict::not(p.clone()))).iter_dnf(),
                Restrict::And(parts) => Restrict::or(parts.iter().map(|p| Restrict::not(p.clone()))).iter_dnf(),
                Restrict::Not(grandchild) => grandchild.iter_dnf(),
                _ => vec![self.clone()],
            },
            other => vec![other.clone()],
        }
    }

    /// Marks the tree as structurally immutable. Building is purely
    /// functional here (no shared mutable nodes), so finalization is a
    /// no-op that exists to document the boundary past which a caller must
    /// not further mutate the restriction in place.
    pub fn finalize(self) -> Restrict {
        self
    }

    /// Conservative overlap test: `false` is a sound proof that no package
    /// can satisfy both restrictions; `true` may be a false positive for
    /// complex trees (we don't attempt full DNF expansion).
    pub fn intersects(&self, other: &Restrict) -> bool {
        match (self, other) {
            (Restrict::Never, _) | (_, Restrict::Never) => false,
            (Restrict::Always, _) | (_, Restrict::Always) => true,
            (Restrict::Atom(a), Restrict::Atom(b)) => a.key() == b.key(),
            (Restrict::And(parts), other) | (other, Restrict::And(parts)) => {
                parts.iter().all(|p| p.intersects(other))
            }
            (Restrict::Or(parts), other) | (other, Restrict::Or(parts)) => {
                parts.iter().any(|p| p.intersects(other))
            }
            _ => true,
        }
    }
}

impl fmt::Display for Restrict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Restrict::Atom(atom) => write!(f, "{atom}"),
            Restrict::PackageField(field, matcher) => write!(f, "{field:?}~{matcher:?}"),
            Restrict::And(parts) => {
                write!(f, "(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
            Restrict::Or(parts) => {
                write!(f, "(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
            Restrict::Not(inner) => write!(f, "!{inner}"),
            Restrict::UseConditional { flag, negate, inner } => {
                if *negate {
                    write!(f, "!{flag}? ( {inner} )")
                } else {
                    write!(f, "{flag}? ( {inner} )")
                }
            }
            Restrict::ContainmentMatch { values, match_all } => {
                write!(f, "{}{values:?}", if *match_all { "all-of" } else { "any-of" })
            }
            Restrict::VersionMatch(op, version) => write!(f, "ver{op}{version}"),
            Restrict::Always => write!(f, "*"),
            Restrict::Never => write!(f, "!*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_of_always_collapses() {
        assert_eq!(Restrict::and([Restrict::Always, Restrict::Always]), Restrict::Always);
    }

    #[test]
    fn and_with_never_is_never() {
        assert_eq!(Restrict::and([Restrict::Always, Restrict::Never]), Restrict::Never);
    }

    #[test]
    fn or_with_always_is_always() {
        assert_eq!(Restrict::or([Restrict::Never, Restrict::Always]), Restrict::Always);
    }

    #[test]
    fn double_not_cancels() {
        assert_eq!(Restrict::not(Restrict::not(Restrict::Always)), Restrict::Always);
    }

    #[test]
    fn glob_matches_prefix_and_suffix() {
        assert!(glob_match("foo*bar", "fooXXbar"));
        assert!(!glob_match("foo*bar", "fooXXba"));
        assert!(glob_match("exact", "exact"));
    }
}
