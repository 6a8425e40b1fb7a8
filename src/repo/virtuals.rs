//! Synthetic repositories derived from profile data (§2.6, §4.6).

use std::collections::HashMap;

use crate::atom::Atom;
use crate::cpv::Cpv;
use crate::pool::PackageMetadata;
use crate::repo::tree::{Package, RepoTree};
use crate::restrict::Restrict;

/// Maps virtual package names (e.g. `virtual/editor`) to a provider atom,
/// and exposes synthetic candidates that mirror whatever the provider atom
/// actually matches in the aliased concrete repository.
pub struct AliasedVirtuals<'a> {
    mapping: HashMap<String, Atom>,
    provider_tree: &'a dyn RepoTree,
}

impl<'a> AliasedVirtuals<'a> {
    pub fn new(mapping: HashMap<String, Atom>, provider_tree: &'a dyn RepoTree) -> Self {
        Self { mapping, provider_tree }
    }

    pub fn provider_for(&self, virtual_name: &str) -> Option<&Atom> {
        self.mapping.get(virtual_name)
    }
}

impl RepoTree for AliasedVirtuals<'_> {
    fn itermatch(&self, restrict: &Restrict) -> Vec<Package> {
        self.mapping
            .values()
            .flat_map(|provider_atom| self.provider_tree.itermatch(&Restrict::Atom(provider_atom.clone())))
            .filter(|pkg| restrict.matches(pkg))
            .collect()
    }
}

/// Exposes a profile's `package.provided` entries as fake installed
/// packages, so the resolver treats them as already satisfied without a
/// corresponding VDB entry.
pub struct ProvidesRepo {
    provided: Vec<Cpv>,
}

impl ProvidesRepo {
    pub fn new(provided: impl IntoIterator<Item = Cpv>) -> Self {
        Self {
            provided: provided.into_iter().collect(),
        }
    }
}

impl RepoTree for ProvidesRepo {
    fn itermatch(&self, restrict: &Restrict) -> Vec<Package> {
        self.provided
            .iter()
            .map(|cpv| {
                Package::unconfigured(PackageMetadata {
                    cpv: cpv.clone(),
                    slot: None,
                    subslot: None,
                    iuse: Vec::new(),
                    use_flags: Default::default(),
                    repo: Some("<provided>".to_string()),
                    dependencies: Default::default(),
                    masked: false,
                })
            })
            .filter(|pkg| restrict.matches(pkg))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eapi::Eapi;

    #[test]
    fn provides_repo_exposes_provided_cpvs() {
        let cpv = Cpv::parse("dev-lang/rust-1.75.0").unwrap();
        let repo = ProvidesRepo::new(vec![cpv.clone()]);
        let matches = repo.itermatch(&Restrict::Always);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].metadata.cpv, cpv);
    }

    #[test]
    fn aliased_virtuals_looks_up_provider() {
        let atom = Atom::parse(">=dev-lang/rust-1.70", Eapi::LATEST).unwrap();
        let mut mapping = HashMap::new();
        mapping.insert("virtual/rust".to_string(), atom.clone());
        let provider_tree = ProvidesRepo::new(Vec::new());
        let virtuals = AliasedVirtuals::new(mapping, &provider_tree);
        assert_eq!(virtuals.provider_for("virtual/rust"), Some(&atom));
        assert_eq!(virtuals.provider_for("virtual/editor"), None);
    }
}
