//! Named package sets (`@system`, `@world`, `@installed`, …).
//!
//! Supplements the distilled spec with the set abstraction the original
//! implementation builds `@system`/`@installed` resolution targets from
//! (grounded on `pkgsets/installed.py`): a `PackageSet` is anything that
//! can be asked to enumerate atoms, independent of where those atoms come
//! from — a profile's `@system` set, a VDB snapshot, or a user-authored
//! world file.

use crate::atom::Atom;
use crate::repo::tree::RepoTree;
use crate::restrict::Restrict;

/// Anything that can be asked for the restriction matching every member it
/// contains, independent of where its atoms come from.
pub trait PackageSet {
    fn restriction(&self) -> Restrict;
}

/// The `@system` set contributed by a collapsed profile.
pub struct SystemSet {
    atoms: Vec<Atom>,
}

impl SystemSet {
    pub fn new(atoms: impl IntoIterator<Item = Atom>) -> Self {
        Self {
            atoms: atoms.into_iter().collect(),
        }
    }
}

impl PackageSet for SystemSet {
    fn restriction(&self) -> Restrict {
        Restrict::or(self.atoms.iter().cloned().map(Restrict::Atom))
    }
}

/// Every slot of every package currently in a VDB-like [`RepoTree`],
/// expressed as a restriction over `cat/pkg:slot` — the `@installed` set.
pub struct InstalledPkgset<'a> {
    vdb: &'a dyn RepoTree,
}

impl<'a> InstalledPkgset<'a> {
    pub fn new(vdb: &'a dyn RepoTree) -> Self {
        Self { vdb }
    }

    fn atoms(&self) -> Vec<Atom> {
        self.vdb
            .itermatch(&Restrict::Always)
            .into_iter()
            .map(|pkg| Atom {
                cpn: pkg.metadata.cpv.cpn.clone(),
                version: None,
                slot_dep: pkg.metadata.slot.as_ref().map(|slot| crate::atom::SlotDep {
                    slot: Some(slot.clone()),
                    subslot: None,
                    op: None,
                }),
                use_deps: Vec::new(),
                repo: None,
                blocker: Default::default(),
            })
            .collect()
    }
}

impl PackageSet for InstalledPkgset<'_> {
    fn restriction(&self) -> Restrict {
        Restrict::or(self.atoms().into_iter().map(Restrict::Atom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eapi::Eapi;
    use crate::vdb::Vdb;
    use crate::pool::PackageDeps;

    #[test]
    fn installed_pkgset_reflects_vdb_slots() {
        let mut vdb = Vdb::new();
        vdb.install(crate::pool::PackageMetadata {
            cpv: crate::cpv::Cpv::parse("dev-lang/rust-1.75.0").unwrap(),
            slot: Some("0".into()),
            subslot: None,
            iuse: vec![],
            use_flags: Default::default(),
            repo: Some("vdb".into()),
            dependencies: PackageDeps::default(),
            masked: false,
        });
        let set = InstalledPkgset::new(&vdb);
        let atoms = set.atoms();
        assert_eq!(atoms.len(), 1);
        assert_eq!(atoms[0].key(), "dev-lang/rust");
    }

    #[test]
    fn system_set_returns_configured_atoms() {
        let atom = Atom::parse("sys-apps/portage", Eapi::LATEST).unwrap();
        let set = SystemSet::new(vec![atom.clone()]);
        assert_eq!(set.restriction(), Restrict::Atom(atom));
    }
}
