//! `ChunkedDataDict`: ordered, scoped toggle rendering.
//!
//! Profiles accumulate USE/keyword/license toggles as an ordered sequence of
//! `(scope, negations, additions)` chunks — one per profile file/line, later
//! files overriding earlier ones for any key they touch. Rendering collapses
//! the chunk sequence into a single effective set per scope key, applying
//! negations (`-flag` removes, `-*` clears everything seen so far).

use indexmap::{IndexMap, IndexSet};

use crate::atom::Atom;
use crate::eapi::Eapi;
use crate::repo::tree::MatchablePackage;

/// One scope's worth of toggles contributed by a single profile file/line.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub neg: IndexSet<String>,
    pub pos: IndexSet<String>,
    /// `-*`: clear every toggle accumulated so far for this scope before
    /// applying `neg`/`pos`.
    pub clear_all: bool,
}

impl Chunk {
    pub fn parse(tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut chunk = Chunk::default();
        for tok in tokens {
            let tok = tok.into();
            if tok == "-*" {
                chunk.clear_all = true;
                chunk.neg.clear();
                chunk.pos.clear();
            } else if let Some(flag) = tok.strip_prefix('-') {
                chunk.pos.shift_remove(flag);
                chunk.neg.insert(flag.to_string());
            } else {
                chunk.neg.shift_remove(&tok);
                chunk.pos.insert(tok);
            }
        }
        chunk
    }
}

/// An ordered mapping from scope key (e.g. a package atom, or the global
/// scope `""`) to the chunks contributed under that key, in profile
/// application order.
#[derive(Debug, Clone, Default)]
pub struct ChunkedDataDict {
    scopes: IndexMap<String, Vec<Chunk>>,
}

impl ChunkedDataDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: impl Into<String>, chunk: Chunk) {
        self.scopes.entry(scope.into()).or_default().push(chunk);
    }

    /// Concatenates `other`'s chunks after `self`'s, per-scope, preserving
    /// order. Used to stack a child profile's toggles on top of a parent's.
    pub fn concatenate(&mut self, other: &ChunkedDataDict) {
        for (scope, chunks) in &other.scopes {
            self.scopes
                .entry(scope.clone())
                .or_default()
                .extend(chunks.iter().cloned());
        }
    }

    /// Collapses one scope's chunk sequence into its effective enabled set.
    pub fn render_scope(&self, scope: &str) -> IndexSet<String> {
        let mut effective: IndexSet<String> = IndexSet::new();
        let Some(chunks) = self.scopes.get(scope) else {
            return effective;
        };
        for chunk in chunks {
            if chunk.clear_all {
                effective.clear();
            }
            for flag in &chunk.neg {
                effective.shift_remove(flag);
            }
            for flag in &chunk.pos {
                effective.insert(flag.clone());
            }
        }
        effective
    }

    /// Collapses every scope whose key is empty (the unscoped/global
    /// bucket) or parses as an atom matching `pkg`, in scope-insertion
    /// order. This is what a `package.use`-shaped file actually needs: the
    /// leading token on each line is a full atom (`=cat/pkg-1.0`, `cat/pkg:0`,
    /// …), not just a `cat/pkg` key, so it has to be matched structurally
    /// rather than by string equality.
    pub fn render_for(&self, pkg: &dyn MatchablePackage, eapi: Eapi) -> IndexSet<String> {
        let mut effective: IndexSet<String> = IndexSet::new();
        for (scope, chunks) in &self.scopes {
            let applies = scope.is_empty() || Atom::parse(scope, eapi).is_ok_and(|atom| atom.matches(pkg));
            if !applies {
                continue;
            }
            for chunk in chunks {
                if chunk.clear_all {
                    effective.clear();
                }
                for flag in &chunk.neg {
                    effective.shift_remove(flag);
                }
                for flag in &chunk.pos {
                    effective.insert(flag.clone());
                }
            }
        }
        effective
    }

    /// Renders every scope this dict has chunks for.
    pub fn render_all(&self) -> IndexMap<String, IndexSet<String>> {
        self.scopes
            .keys()
            .map(|scope| (scope.clone(), self.render_scope(scope)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpv::Cpv;
    use crate::pool::PackageMetadata;
    use crate::repo::tree::Package;

    fn pkg(cpv: &str, slot: &str) -> Package {
        Package::unconfigured(PackageMetadata {
            cpv: Cpv::parse(cpv).unwrap(),
            slot: Some(slot.to_string()),
            subslot: None,
            iuse: vec![],
            use_flags: Default::default(),
            repo: None,
            dependencies: Default::default(),
            masked: false,
        })
    }

    #[test]
    fn render_for_matches_versioned_scope_atom() {
        let mut dict = ChunkedDataDict::new();
        dict.push("=dev-lang/rust-1.75.0", Chunk::parse(["foo"]));
        dict.push("=dev-lang/rust-1.74.0", Chunk::parse(["bar"]));
        let rendered = dict.render_for(&pkg("dev-lang/rust-1.75.0", "0"), Eapi::LATEST);
        assert!(rendered.contains("foo"));
        assert!(!rendered.contains("bar"));
    }

    #[test]
    fn render_for_matches_slotted_scope_atom() {
        let mut dict = ChunkedDataDict::new();
        dict.push("dev-lang/python:3.11", Chunk::parse(["foo"]));
        dict.push("dev-lang/python:3.12", Chunk::parse(["bar"]));
        let rendered = dict.render_for(&pkg("dev-lang/python-3.11.0", "3.11"), Eapi::LATEST);
        assert!(rendered.contains("foo"));
        assert!(!rendered.contains("bar"));
    }

    #[test]
    fn render_for_also_folds_in_unscoped_entries() {
        let mut dict = ChunkedDataDict::new();
        dict.push("", Chunk::parse(["global"]));
        dict.push("=dev-lang/rust-1.75.0", Chunk::parse(["versioned"]));
        let rendered = dict.render_for(&pkg("dev-lang/rust-1.75.0", "0"), Eapi::LATEST);
        assert!(rendered.contains("global"));
        assert!(rendered.contains("versioned"));
    }

    #[test]
    fn later_chunk_overrides_earlier() {
        let mut dict = ChunkedDataDict::new();
        dict.push("", Chunk::parse(["foo", "bar"]));
        dict.push("", Chunk::parse(["-bar", "baz"]));
        let rendered = dict.render_scope("");
        assert!(rendered.contains("foo"));
        assert!(rendered.contains("baz"));
        assert!(!rendered.contains("bar"));
    }

    #[test]
    fn clear_all_wipes_prior_chunks() {
        let mut dict = ChunkedDataDict::new();
        dict.push("", Chunk::parse(["foo", "bar"]));
        dict.push("", Chunk::parse(["-*", "baz"]));
        let rendered = dict.render_scope("");
        assert_eq!(rendered.len(), 1);
        assert!(rendered.contains("baz"));
    }

    #[test]
    fn concatenate_stacks_parent_then_child() {
        let mut parent = ChunkedDataDict::new();
        parent.push("cat/pkg", Chunk::parse(["foo"]));
        let mut child = ChunkedDataDict::new();
        child.push("cat/pkg", Chunk::parse(["-foo", "bar"]));
        parent.concatenate(&child);
        let rendered = parent.render_scope("cat/pkg");
        assert!(!rendered.contains("foo"));
        assert!(rendered.contains("bar"));
    }

    #[test]
    fn flag_reappearing_after_negation_is_reenabled() {
        let chunk = Chunk::parse(["-foo", "foo"]);
        assert!(chunk.pos.contains("foo"));
        assert!(!chunk.neg.contains("foo"));
    }
}
