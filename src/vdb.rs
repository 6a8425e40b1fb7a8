//! Installed-package database read view.
//!
//! A VDB is, from the resolver's perspective, just another [`RepoTree`]:
//! a collection of packages with metadata, matched the same way a live
//! repository is. What makes it the VDB is that the resolver treats its
//! contents as "already built" when computing install/replace operations.

use crate::pool::PackageMetadata;
use crate::repo::tree::{Package, RepoTree};
use crate::restrict::Restrict;

#[derive(Default)]
pub struct Vdb {
    installed: Vec<PackageMetadata>,
}

impl Vdb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, meta: PackageMetadata) {
        self.installed.retain(|p| p.cpv.cpn != meta.cpv.cpn || p.slot != meta.slot);
        self.installed.push(meta);
    }

    pub fn remove(&mut self, key: &str, slot: Option<&str>) {
        self.installed
            .retain(|p| !(p.cpv.key() == key && p.slot.as_deref() == slot));
    }

    pub fn all(&self) -> impl Iterator<Item = &PackageMetadata> {
        self.installed.iter()
    }

    pub fn find(&self, key: &str, slot: Option<&str>) -> Option<&PackageMetadata> {
        self.installed
            .iter()
            .find(|p| p.cpv.key() == key && p.slot.as_deref() == slot)
    }
}

impl RepoTree for Vdb {
    fn itermatch(&self, restrict: &Restrict) -> Vec<Package> {
        let mut out: Vec<Package> = self
            .installed
            .iter()
            .cloned()
            .map(Package::unconfigured)
            .filter(|pkg| restrict.matches(pkg))
            .collect();
        out.sort_by(|a, b| a.metadata.cpv.cmp(&b.metadata.cpv));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PackageDeps;

    fn meta(cpv: &str, slot: &str) -> PackageMetadata {
        PackageMetadata {
            cpv: crate::cpv::Cpv::parse(cpv).unwrap(),
            slot: Some(slot.to_string()),
            subslot: None,
            iuse: vec![],
            use_flags: Default::default(),
            repo: Some("vdb".into()),
            dependencies: PackageDeps::default(),
            masked: false,
        }
    }

    #[test]
    fn install_replaces_same_slot() {
        let mut vdb = Vdb::new();
        vdb.install(meta("dev-lang/rust-1.74.0", "0"));
        vdb.install(meta("dev-lang/rust-1.75.0", "0"));
        assert_eq!(vdb.all().count(), 1);
        assert_eq!(vdb.find("dev-lang/rust", Some("0")).unwrap().cpv.to_string(), "dev-lang/rust-1.75.0");
    }

    #[test]
    fn different_slots_coexist() {
        let mut vdb = Vdb::new();
        vdb.install(meta("dev-lang/python-3.11.0", "3.11"));
        vdb.install(meta("dev-lang/python-3.12.0", "3.12"));
        assert_eq!(vdb.all().count(), 2);
    }

    #[test]
    fn remove_drops_matching_key_and_slot() {
        let mut vdb = Vdb::new();
        vdb.install(meta("dev-lang/rust-1.75.0", "0"));
        vdb.remove("dev-lang/rust", Some("0"));
        assert_eq!(vdb.all().count(), 0);
    }
}
