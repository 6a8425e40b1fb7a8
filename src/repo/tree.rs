//! Repository layer: `UnconfiguredTree`, `ConfiguredTree`, `MultiplexTree` (§4.6).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cpv::{Cpn, Cpv};
use crate::eapi::Eapi;
use crate::error::{Error, Result};
use crate::oracle::RawMetadata;
use crate::pool::{parse_depset, PackageDeps, PackageMetadata};
use crate::profile::stack::OnDiskProfile;
use crate::repo::metadata::MetadataLoader;
use crate::restrict::Restrict;
use crate::version::Version;

/// Parses a loaded ebuild's raw `*DEPEND` strings into [`PackageDeps`],
/// per the EAPI it declares.
fn parse_raw_deps(raw: &RawMetadata) -> Result<PackageDeps> {
    let eapi = Eapi::parse(&raw.eapi)?;
    Ok(PackageDeps {
        depend: parse_depset(&raw.depend, eapi)?,
        rdepend: parse_depset(&raw.rdepend, eapi)?,
        bdepend: parse_depset(&raw.bdepend, eapi)?,
        pdepend: parse_depset(&raw.pdepend, eapi)?,
        idepend: parse_depset(&raw.idepend, eapi)?,
    })
}

const RESERVED_DIRS: &[&str] = &[
    "eclass", "profiles", "metadata", "licenses", "scripts", "CVS", ".svn", ".git",
];

/// Anything that can be matched against a [`Restrict`]/[`crate::atom::Atom`]
/// tree. Both bare repository packages and profile-configured packages
/// implement it so restriction code doesn't need to know which it has.
pub trait MatchablePackage {
    fn cpn(&self) -> &Cpn;
    fn version(&self) -> &Version;
    fn slot(&self) -> Option<&str>;
    fn subslot(&self) -> Option<&str>;
    fn repo_id(&self) -> Option<&str>;
    fn enabled_use(&self) -> Option<&HashSet<String>>;
    fn iuse(&self) -> &[String];
}

/// Profile+domain-derived USE state bound to a [`Package`] by a
/// [`ConfiguredTree`]. Absent (`Package::use_state` is `None`) for a
/// package sourced straight from an [`UnconfiguredTree`], where USE
/// configuration has not happened yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UseState {
    pub immutable_use: HashSet<String>,
    pub enabled_use: HashSet<String>,
    pub disabled_use: HashSet<String>,
}

/// One `cat/pkg-ver` handle from a repository. `use_state` is `None` until
/// a [`ConfiguredTree`] binds USE state to it; every tree in the crate —
/// configured or not — hands these to the resolver so USE state sourced
/// from a profile survives all the way into dependency expansion.
#[derive(Debug, Clone)]
pub struct Package {
    pub metadata: PackageMetadata,
    pub use_state: Option<UseState>,
}

impl Package {
    pub fn unconfigured(metadata: PackageMetadata) -> Self {
        Self { metadata, use_state: None }
    }
}

impl MatchablePackage for Package {
    fn cpn(&self) -> &Cpn {
        &self.metadata.cpv.cpn
    }
    fn version(&self) -> &Version {
        &self.metadata.cpv.version
    }
    fn slot(&self) -> Option<&str> {
        self.metadata.slot.as_deref()
    }
    fn subslot(&self) -> Option<&str> {
        self.metadata.subslot.as_deref()
    }
    fn repo_id(&self) -> Option<&str> {
        self.metadata.repo.as_deref()
    }
    fn enabled_use(&self) -> Option<&HashSet<String>> {
        self.use_state.as_ref().map(|u| &u.enabled_use)
    }
    fn iuse(&self) -> &[String] {
        &self.metadata.iuse
    }
}

/// A read-only, restriction-queryable package source.
pub trait RepoTree {
    fn itermatch(&self, restrict: &Restrict) -> Vec<Package>;

    fn match_one(&self, restrict: &Restrict) -> Option<Package> {
        self.itermatch(restrict).into_iter().next()
    }
}

/// Marker for a repository that can be kept in sync with an upstream
/// (rsync, git, …) without the sync mechanism itself being modeled here
/// (grounded on the teacher's two-line `repo/syncable.py` mixin).
pub trait Syncable {
    fn is_syncable(&self) -> bool;
}

impl Syncable for UnconfiguredTree {
    fn is_syncable(&self) -> bool {
        true
    }
}

/// An on-disk ebuild tree: categories/packages/versions by directory
/// listing, metadata by the injected loader.
pub struct UnconfiguredTree {
    pub repo_id: String,
    root: PathBuf,
    loader: MetadataLoader,
    /// Populated by a metadata-regeneration pass (see [`crate::worker_pool`]);
    /// `itermatch` consults this rather than re-invoking the loader inline so
    /// that a package which failed validation is permanently excluded for
    /// the life of the process (§4.5).
    packages: Vec<PackageMetadata>,
    masked: HashSet<Cpv>,
}

impl UnconfiguredTree {
    pub fn new(repo_id: impl Into<String>, root: impl Into<PathBuf>, loader: MetadataLoader) -> Self {
        Self {
            repo_id: repo_id.into(),
            root: root.into(),
            loader,
            packages: Vec::new(),
            masked: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory listing of `category/package`, filtering reserved names.
    pub fn categories(&self) -> Result<Vec<String>> {
        list_dir_names(&self.root, true)
    }

    pub fn packages(&self, category: &str) -> Result<Vec<String>> {
        list_dir_names(&self.root.join(category), false)
    }

    /// Loads metadata for every ebuild under `category/package`, via the
    /// cache-then-oracle path, recording any failure as a mask rather than
    /// propagating it (§4.5's "moved into `_masked`" rule).
    pub fn scan_package(&mut self, cpn: &Cpn) -> Result<()> {
        let dir = self.root.join(&cpn.category).join(&cpn.package);
        let found = list_ebuilds(&dir, cpn)?;
        for (cpv, path, token) in found {
            self.load_one(cpv, &path, &token);
        }
        Ok(())
    }

    /// Same as repeated [`Self::scan_package`] calls, but the independent
    /// filesystem listing for each `cpn` runs across `threads` worker
    /// threads (see [`crate::worker_pool::map_async`]); the cache/oracle
    /// load itself stays serialized through the shared loader, since
    /// [`crate::oracle::Transport::request`] takes `&mut self`.
    pub fn scan_metadata_parallel(&mut self, cpns: Vec<Cpn>, threads: usize) -> Result<()> {
        let root = self.root.clone();
        let listings = crate::worker_pool::map_async(cpns, threads, move |cpn| {
            let dir = root.join(&cpn.category).join(&cpn.package);
            list_ebuilds(&dir, &cpn).ok()
        });

        for found in listings {
            for (cpv, path, token) in found {
                self.load_one(cpv, &path, &token);
            }
        }
        Ok(())
    }

    fn load_one(&mut self, cpv: Cpv, path: &Path, token: &str) {
        match self.loader.load(&cpv, &path.to_string_lossy(), &token.to_string()) {
            Ok(raw) => match parse_raw_deps(&raw) {
                Ok(dependencies) => {
                    tracing::debug!(cpv = %cpv, "loaded package metadata");
                    self.packages.push(PackageMetadata {
                        cpv,
                        slot: Some(raw.slot.clone()),
                        subslot: raw.subslot.clone(),
                        iuse: raw.iuse.clone(),
                        use_flags: HashSet::new(),
                        repo: Some(self.repo_id.clone()),
                        dependencies,
                        masked: false,
                    });
                }
                Err(e) => {
                    tracing::warn!(cpv = %cpv, error = %e, "dependency parse failed, masking package");
                    self.masked.insert(cpv);
                }
            },
            Err(e) => {
                tracing::warn!(cpv = %cpv, error = %e, "metadata load failed, masking package");
                self.masked.insert(cpv);
            }
        }
    }

    /// Converts a filesystem path into the most-specific restriction
    /// possible (repo-id → category → package → `=version`), per §4.6.
    pub fn path_restrict(&self, path: &Path) -> Result<Restrict> {
        let rel = path
            .strip_prefix(&self.root)
            .map_err(|_| Error::PathOutsideRepo(path.to_path_buf()))?;
        let parts: Vec<_> = rel.components().collect();
        match parts.len() {
            0 => Ok(Restrict::Always),
            1 => {
                let category = parts[0].as_os_str().to_string_lossy().to_string();
                Ok(Restrict::PackageField(
                    crate::restrict::PackageField::Category,
                    crate::restrict::StrMatch::Exact(category),
                ))
            }
            2 => {
                let category = parts[0].as_os_str().to_string_lossy().to_string();
                let package = parts[1].as_os_str().to_string_lossy().to_string();
                Ok(Restrict::and([
                    Restrict::PackageField(
                        crate::restrict::PackageField::Category,
                        crate::restrict::StrMatch::Exact(category),
                    ),
                    Restrict::PackageField(
                        crate::restrict::PackageField::Package,
                        crate::restrict::StrMatch::Exact(package),
                    ),
                ]))
            }
            3 => {
                let category = parts[0].as_os_str().to_string_lossy().to_string();
                let filename = parts[2].as_os_str().to_string_lossy();
                let Some(stem) = filename.strip_suffix(".ebuild") else {
                    return Err(Error::PathOutsideRepo(path.to_path_buf()));
                };
                let package = parts[1].as_os_str().to_string_lossy();
                let cpv_str = format!("{category}/{stem}");
                let cpv = Cpv::parse(&cpv_str)?;
                if cpv.cpn.package != package {
                    return Err(Error::PathOutsideRepo(path.to_path_buf()));
                }
                let mut version = cpv.version.clone();
                version.op = Some(crate::version::Operator::Equal);
                let atom = crate::atom::Atom {
                    cpn: cpv.cpn,
                    version: Some(version),
                    slot_dep: None,
                    use_deps: Vec::new(),
                    repo: None,
                    blocker: Default::default(),
                };
                Ok(Restrict::Atom(atom))
            }
            _ => Err(Error::PathOutsideRepo(path.to_path_buf())),
        }
    }
}

impl RepoTree for UnconfiguredTree {
    fn itermatch(&self, restrict: &Restrict) -> Vec<Package> {
        let mut out: Vec<Package> = self
            .packages
            .iter()
            .filter(|m| !self.masked.contains(&m.cpv))
            .map(|m| Package::unconfigured(m.clone()))
            .filter(|pkg| restrict.matches(pkg))
            .collect();
        out.sort_by(|a, b| a.metadata.cpv.cmp(&b.metadata.cpv));
        out
    }
}

/// Lists every `.ebuild` file under `dir` (one `category/package` directory)
/// as `(cpv, path, validation token)`, independent of any loader state —
/// the part of a scan safe to run off the main thread.
fn list_ebuilds(dir: &Path, cpn: &Cpn) -> Result<Vec<(Cpv, PathBuf, String)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) => return Err(Error::Io { path: dir.to_path_buf(), source }),
    };
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if path.extension().and_then(|e| e.to_str()) != Some("ebuild") {
            continue;
        }
        let cpv = match Cpv::parse(&format!("{}/{name}", cpn.category)) {
            Ok(cpv) => cpv,
            Err(_) => continue,
        };
        let token = format!("{:?}", path.metadata().ok().and_then(|m| m.modified().ok()));
        found.push((cpv, path, token));
    }
    Ok(found)
}

fn list_dir_names(dir: &Path, filter_reserved: bool) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(source) => return Err(Error::Io { path: dir.to_path_buf(), source }),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if filter_reserved && RESERVED_DIRS.contains(&name.as_str()) {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Wraps an [`UnconfiguredTree`] with a profile, binding per-package
/// `(immutable_use, enabled_use, disabled_use)` (§4.6).
pub struct ConfiguredTree<'a> {
    inner: &'a UnconfiguredTree,
    profile: &'a OnDiskProfile,
    user_enabled: HashSet<String>,
    user_disabled: HashSet<String>,
}

impl<'a> ConfiguredTree<'a> {
    pub fn new(inner: &'a UnconfiguredTree, profile: &'a OnDiskProfile) -> Self {
        Self {
            inner,
            profile,
            user_enabled: HashSet::new(),
            user_disabled: HashSet::new(),
        }
    }

    pub fn with_user_use(mut self, enabled: HashSet<String>, disabled: HashSet<String>) -> Self {
        self.user_enabled = enabled;
        self.user_disabled = disabled;
        self
    }

    pub fn configure(&self, pkg: Package) -> Package {
        let forced = self.profile.forced_use_for(&pkg);
        let masked = self.profile.masked_use_for(&pkg);
        let iuse_effective: HashSet<String> = pkg
            .metadata
            .iuse
            .iter()
            .map(|flag| flag.trim_start_matches(['+', '-']).to_string())
            .collect();
        let iuse_defaults: HashSet<String> = pkg
            .metadata
            .iuse
            .iter()
            .filter(|f| f.starts_with('+'))
            .map(|f| f[1..].to_string())
            .collect();

        let mut enabled: HashSet<String> = iuse_defaults
            .union(&forced)
            .cloned()
            .collect::<HashSet<_>>()
            .union(&self.user_enabled)
            .cloned()
            .collect();
        enabled = enabled
            .difference(&masked)
            .cloned()
            .collect::<HashSet<_>>()
            .difference(&self.user_disabled)
            .cloned()
            .collect();
        enabled = enabled.intersection(&iuse_effective).cloned().collect();

        Package {
            metadata: pkg.metadata,
            use_state: Some(UseState {
                immutable_use: forced.union(&masked).cloned().collect(),
                enabled_use: enabled,
                disabled_use: iuse_effective
                    .difference(&self.user_enabled)
                    .cloned()
                    .collect(),
            }),
        }
    }
}

impl RepoTree for ConfiguredTree<'_> {
    fn itermatch(&self, restrict: &Restrict) -> Vec<Package> {
        self.inner
            .itermatch(&Restrict::Always)
            .into_iter()
            .map(|pkg| self.configure(pkg))
            .filter(|pkg| restrict.matches(pkg))
            .collect()
    }
}

/// Concatenates `itermatch` results from N backing trees, preserving
/// per-tree order; `match_one` short-circuits on the first hit.
pub struct MultiplexTree {
    trees: Vec<Box<dyn RepoTree + Send + Sync>>,
}

impl MultiplexTree {
    pub fn new(trees: Vec<Box<dyn RepoTree + Send + Sync>>) -> Self {
        Self { trees }
    }
}

impl RepoTree for MultiplexTree {
    fn itermatch(&self, restrict: &Restrict) -> Vec<Package> {
        self.trees.iter().flat_map(|t| t.itermatch(restrict)).collect()
    }

    fn match_one(&self, restrict: &Restrict) -> Option<Package> {
        self.trees.iter().find_map(|t| t.match_one(restrict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::metadata::MemoryCache;
    use crate::oracle::{RawMetadata, StubTransport};
    use std::fs::File;

    fn empty_tree(repo_id: &str) -> UnconfiguredTree {
        UnconfiguredTree::new(repo_id, "/nonexistent", MetadataLoader::new(MemoryCache::new(), StubTransport::new()))
    }

    #[test]
    fn multiplex_preserves_repo_order() {
        let a = empty_tree("a");
        let b = empty_tree("b");
        let multi = MultiplexTree::new(vec![Box::new(a), Box::new(b)]);
        assert!(multi.itermatch(&Restrict::Always).is_empty());
    }

    #[test]
    fn reserved_dirs_filtered() {
        assert!(RESERVED_DIRS.contains(&"eclass"));
        assert!(RESERVED_DIRS.contains(&"metadata"));
    }

    fn tempdir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("portage-resolver-scan-{name}-{}", std::process::id()))
    }

    fn write_ebuild(root: &Path, cat: &str, pkg: &str, ver: &str) {
        let dir = root.join(cat).join(pkg);
        fs::create_dir_all(&dir).unwrap();
        File::create(dir.join(format!("{pkg}-{ver}.ebuild"))).unwrap();
    }

    #[test]
    fn scan_package_parses_dependencies() {
        let root = tempdir("deps");
        write_ebuild(&root, "app-foo", "bar", "1.0");

        let mut transport = StubTransport::new();
        transport.insert(
            "app-foo/bar-1.0",
            RawMetadata {
                eapi: "8".into(),
                slot: "0".into(),
                rdepend: "dev-lang/python".into(),
                ..Default::default()
            },
        );
        let mut tree = UnconfiguredTree::new("test", &root, MetadataLoader::new(MemoryCache::new(), transport));
        tree.scan_package(&Cpn::new("app-foo", "bar")).unwrap();

        let pkgs = tree.itermatch(&Restrict::Always);
        assert_eq!(pkgs.len(), 1);
        assert_eq!(pkgs[0].metadata.dependencies.rdepend.len(), 1);
    }

    #[test]
    fn scan_package_masks_on_malformed_dependency() {
        let root = tempdir("bad-deps");
        write_ebuild(&root, "app-foo", "broken", "1.0");

        let mut transport = StubTransport::new();
        transport.insert(
            "app-foo/broken-1.0",
            RawMetadata {
                eapi: "8".into(),
                slot: "0".into(),
                depend: "( unbalanced".into(),
                ..Default::default()
            },
        );
        let mut tree = UnconfiguredTree::new("test", &root, MetadataLoader::new(MemoryCache::new(), transport));
        tree.scan_package(&Cpn::new("app-foo", "broken")).unwrap();

        assert!(tree.itermatch(&Restrict::Always).is_empty());
    }

    #[test]
    fn scan_metadata_parallel_loads_every_package() {
        let root = tempdir("parallel");
        write_ebuild(&root, "app-foo", "bar", "1.0");
        write_ebuild(&root, "app-foo", "baz", "2.0");

        let mut transport = StubTransport::new();
        transport.insert("app-foo/bar-1.0", RawMetadata { eapi: "8".into(), slot: "0".into(), ..Default::default() });
        transport.insert("app-foo/baz-2.0", RawMetadata { eapi: "8".into(), slot: "0".into(), ..Default::default() });

        let mut tree = UnconfiguredTree::new("test", &root, MetadataLoader::new(MemoryCache::new(), transport));
        tree.scan_metadata_parallel(vec![Cpn::new("app-foo", "bar"), Cpn::new("app-foo", "baz")], 4)
            .unwrap();

        assert_eq!(tree.itermatch(&Restrict::Always).len(), 2);
    }
}
