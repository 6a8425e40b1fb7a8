//! `ProfileNode`: one on-disk profile directory, lazily parsed (§4.3).
//!
//! Grounded on `pkgcore.ebuild.profiles.ProfileNode`'s `load_decorator`
//! pattern: each attribute is read from its own file on first access and
//! cached; a parse failure is cached too, so repeated access keeps failing
//! instead of silently retrying against a half-fixed file.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::atom::Atom;
use crate::chunked::{Chunk, ChunkedDataDict};
use crate::cpv::Cpv;
use crate::eapi::Eapi;
use crate::error::{Error, Result};

enum LazyState<T> {
    Unloaded,
    Loaded(T),
    Errored(Rc<Error>),
}

struct Lazy<T>(RefCell<LazyState<T>>);

impl<T: Clone> Lazy<T> {
    fn new() -> Self {
        Self(RefCell::new(LazyState::Unloaded))
    }

    fn get_or_try_init(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        {
            match &*self.0.borrow() {
                LazyState::Loaded(v) => return Ok(v.clone()),
                LazyState::Errored(e) => return Err(rehydrate(e)),
                LazyState::Unloaded => {}
            }
        }
        match f() {
            Ok(v) => {
                *self.0.borrow_mut() = LazyState::Loaded(v.clone());
                Ok(v)
            }
            Err(e) => {
                let e = Rc::new(e);
                *self.0.borrow_mut() = LazyState::Errored(e.clone());
                Err(rehydrate(&e))
            }
        }
    }
}

fn rehydrate(e: &Error) -> Error {
    match e {
        Error::ProfileParse { path, filename, reason } => Error::ProfileParse {
            path: path.clone(),
            filename,
            reason: reason.clone(),
        },
        other => Error::ProfileParse {
            path: PathBuf::new(),
            filename: "<cached>",
            reason: other.to_string(),
        },
    }
}

/// Negative/positive pair, the accumulation shape for `system`, `package.mask`
/// and profile visibility entries.
#[derive(Debug, Clone)]
pub struct NegPos<T> {
    pub neg: Vec<T>,
    pub pos: Vec<T>,
}

impl<T> Default for NegPos<T> {
    fn default() -> Self {
        Self { neg: Vec::new(), pos: Vec::new() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PackagesFile {
    pub system: NegPos<Atom>,
    pub visibility: NegPos<Atom>,
}

pub struct ProfileNode {
    path: PathBuf,
    eapi_hint: Eapi,

    packages: Lazy<Rc<PackagesFile>>,
    masks: Lazy<Rc<NegPos<Atom>>>,
    pkg_use: Lazy<Rc<ChunkedDataDict>>,
    pkg_use_force: Lazy<Rc<ChunkedDataDict>>,
    pkg_use_mask: Lazy<Rc<ChunkedDataDict>>,
    use_force: Lazy<Rc<ChunkedDataDict>>,
    use_mask: Lazy<Rc<ChunkedDataDict>>,
    default_env: Lazy<Rc<Vec<(String, String)>>>,
    virtuals: Lazy<Rc<Vec<(String, Atom)>>>,
    pkg_provided: Lazy<Rc<NegPos<Cpv>>>,
    eapi: Lazy<Eapi>,
    deprecated: Lazy<Rc<Option<(String, String)>>>,
    parents: Lazy<Rc<Vec<PathBuf>>>,
}

impl ProfileNode {
    /// `eapi_hint` is the EAPI assumed while parsing this node's own atoms,
    /// before its `eapi` file (if any) has been consulted — profiles
    /// conventionally default to EAPI 0 semantics for their own atoms.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(Error::ProfileMissing(path));
        }
        Ok(Self {
            path,
            eapi_hint: Eapi::LATEST,
            packages: Lazy::new(),
            masks: Lazy::new(),
            pkg_use: Lazy::new(),
            pkg_use_force: Lazy::new(),
            pkg_use_mask: Lazy::new(),
            use_force: Lazy::new(),
            use_mask: Lazy::new(),
            default_env: Lazy::new(),
            virtuals: Lazy::new(),
            pkg_provided: Lazy::new(),
            eapi: Lazy::new(),
            deprecated: Lazy::new(),
            parents: Lazy::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self, filename: &'static str) -> Result<Vec<String>> {
        let file_path = self.path.join(filename);
        match fs::read_to_string(&file_path) {
            Ok(contents) => Ok(contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::ProfileParse {
                path: self.path.clone(),
                filename,
                reason: e.to_string(),
            }),
        }
    }

    /// Splits negation-prefixed lines per §4.3: a bare `-` is a warning
    /// (logged, not fatal), `-token` negates `token`, anything else is
    /// positive.
    fn split_negations(&self, filename: &'static str, lines: &[String]) -> NegPos<String> {
        let mut out = NegPos::default();
        for line in lines {
            if let Some(rest) = line.strip_prefix('-') {
                if rest.is_empty() {
                    tracing::warn!(path = %self.path.display(), filename, "bare '-' negation, ignoring");
                    continue;
                }
                out.neg.push(rest.to_string());
            } else {
                out.pos.push(line.clone());
            }
        }
        out
    }

    pub fn eapi(&self) -> Result<Eapi> {
        self.eapi.get_or_try_init(|| {
            let lines = self.read_lines("eapi")?;
            match lines.first() {
                Some(s) => Eapi::parse(s).map_err(|_| Error::ProfileParse {
                    path: self.path.clone(),
                    filename: "eapi",
                    reason: format!("unsupported eapi {s:?}"),
                }),
                None => Ok(self.eapi_hint),
            }
        })
    }

    pub fn parents(&self) -> Result<Rc<Vec<PathBuf>>> {
        self.parents.get_or_try_init(|| {
            let lines = self.read_lines("parent")?;
            let mut out = Vec::new();
            for line in lines {
                let resolved = self.path.join(&line);
                let normalized = normalize_path(&resolved);
                out.push(normalized);
            }
            Ok(Rc::new(out))
        })
    }

    pub fn packages(&self) -> Result<Rc<PackagesFile>> {
        self.packages.get_or_try_init(|| {
            let lines = self.read_lines("packages")?;
            let eapi = self.eapi()?;
            let mut file = PackagesFile::default();
            for line in lines {
                let (is_system, rest) = match line.strip_prefix('*') {
                    Some(r) => (true, r),
                    None => (false, line.as_str()),
                };
                let (negated, rest) = match rest.strip_prefix('-') {
                    Some(r) => (true, r),
                    None => (false, rest),
                };
                let atom = Atom::parse(rest, eapi).map_err(|e| Error::ProfileParse {
                    path: self.path.clone(),
                    filename: "packages",
                    reason: e.to_string(),
                })?;
                let pair = if is_system { &mut file.system } else { &mut file.visibility };
                if negated {
                    pair.neg.push(atom);
                } else {
                    pair.pos.push(atom);
                }
            }
            Ok(Rc::new(file))
        })
    }

    pub fn masks(&self) -> Result<Rc<NegPos<Atom>>> {
        self.masks.get_or_try_init(|| {
            let lines = self.read_lines("package.mask")?;
            let eapi = self.eapi()?;
            let split = self.split_negations("package.mask", &lines);
            let parse_all = |items: &[String]| -> Result<Vec<Atom>> {
                items
                    .iter()
                    .map(|s| {
                        Atom::parse(s, eapi).map_err(|e| Error::ProfileParse {
                            path: self.path.clone(),
                            filename: "package.mask",
                            reason: e.to_string(),
                        })
                    })
                    .collect()
            };
            Ok(Rc::new(NegPos {
                neg: parse_all(&split.neg)?,
                pos: parse_all(&split.pos)?,
            }))
        })
    }

    fn load_chunked(&self, filename: &'static str, scoped: bool) -> Result<Rc<ChunkedDataDict>> {
        let lines = self.read_lines(filename)?;
        let mut dict = ChunkedDataDict::new();
        for line in lines {
            let mut tokens = line.split_whitespace();
            let (scope, rest_tokens): (String, Vec<&str>) = if scoped {
                let scope = tokens.next().unwrap_or("").to_string();
                (scope, tokens.collect())
            } else {
                (String::new(), tokens.collect())
            };
            dict.push(scope, Chunk::parse(rest_tokens));
        }
        Ok(Rc::new(dict))
    }

    pub fn pkg_use(&self) -> Result<Rc<ChunkedDataDict>> {
        self.pkg_use.get_or_try_init(|| self.load_chunked("package.use", true))
    }

    pub fn pkg_use_force(&self) -> Result<Rc<ChunkedDataDict>> {
        self.pkg_use_force
            .get_or_try_init(|| self.load_chunked("package.use.force", true))
    }

    pub fn pkg_use_mask(&self) -> Result<Rc<ChunkedDataDict>> {
        self.pkg_use_mask
            .get_or_try_init(|| self.load_chunked("package.use.mask", true))
    }

    pub fn forced_use(&self) -> Result<Rc<ChunkedDataDict>> {
        self.use_force.get_or_try_init(|| self.load_chunked("use.force", false))
    }

    pub fn masked_use(&self) -> Result<Rc<ChunkedDataDict>> {
        self.use_mask.get_or_try_init(|| self.load_chunked("use.mask", false))
    }

    pub fn default_env(&self) -> Result<Rc<Vec<(String, String)>>> {
        self.default_env.get_or_try_init(|| {
            let lines = self.read_lines("make.defaults")?;
            let mut out = Vec::new();
            let mut assigned: std::collections::HashMap<String, String> = std::collections::HashMap::new();
            for line in lines {
                let (key, value) = line.split_once('=').ok_or_else(|| Error::ProfileParse {
                    path: self.path.clone(),
                    filename: "make.defaults",
                    reason: format!("not a KEY=value assignment: {line:?}"),
                })?;
                let key = key.trim().to_string();
                let mut value = value.trim().trim_matches('"').trim_matches('\'').to_string();
                for (k, v) in &assigned {
                    value = value.replace(&format!("${k}"), v).replace(&format!("${{{k}}}"), v);
                }
                assigned.insert(key.clone(), value.clone());
                out.push((key, value));
            }
            Ok(Rc::new(out))
        })
    }

    pub fn virtuals(&self) -> Result<Rc<Vec<(String, Atom)>>> {
        self.virtuals.get_or_try_init(|| {
            let lines = self.read_lines("virtuals")?;
            let eapi = self.eapi()?;
            let mut out = Vec::new();
            for line in lines {
                let (virt, provider) = line.split_once(char::is_whitespace).ok_or_else(|| Error::ProfileParse {
                    path: self.path.clone(),
                    filename: "virtuals",
                    reason: format!("malformed virtuals line: {line:?}"),
                })?;
                let atom = Atom::parse(provider.trim(), eapi).map_err(|e| Error::ProfileParse {
                    path: self.path.clone(),
                    filename: "virtuals",
                    reason: e.to_string(),
                })?;
                out.push((virt.to_string(), atom));
            }
            Ok(Rc::new(out))
        })
    }

    pub fn pkg_provided(&self) -> Result<Rc<NegPos<Cpv>>> {
        self.pkg_provided.get_or_try_init(|| {
            let lines = self.read_lines("package.provided")?;
            let split = self.split_negations("package.provided", &lines);
            let parse_all = |items: &[String]| -> Result<Vec<Cpv>> {
                items
                    .iter()
                    .map(|s| {
                        Cpv::parse(s).map_err(|e| Error::ProfileParse {
                            path: self.path.clone(),
                            filename: "package.provided",
                            reason: e.to_string(),
                        })
                    })
                    .collect()
            };
            Ok(Rc::new(NegPos {
                neg: parse_all(&split.neg)?,
                pos: parse_all(&split.pos)?,
            }))
        })
    }

    pub fn deprecated(&self) -> Result<Rc<Option<(String, String)>>> {
        self.deprecated.get_or_try_init(|| {
            let lines = self.read_lines("deprecated")?;
            match lines.first() {
                Some(replacement) => {
                    let message = lines.get(1).cloned().unwrap_or_default();
                    Ok(Rc::new(Some((replacement.clone(), message))))
                }
                None => Ok(Rc::new(None)),
            }
        })
    }

    pub fn bashrc(&self) -> Option<PathBuf> {
        let candidate = self.path.join("profile.bashrc");
        candidate.is_file().then_some(candidate)
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(ProfileNode::new("/nonexistent/profile/path").is_err());
    }

    #[test]
    fn loads_and_caches_packages_file() {
        let dir = tempdir();
        write_file(&dir, "packages", "*cat/system-pkg\n-cat/removed\ncat/visible\n");
        let node = ProfileNode::new(&dir).unwrap();
        let packages = node.packages().unwrap();
        assert_eq!(packages.system.pos.len(), 1);
        assert_eq!(packages.visibility.pos.len(), 1);
        assert_eq!(packages.visibility.neg.len(), 1);
        // second call hits the cache
        assert_eq!(node.packages().unwrap().system.pos.len(), 1);
    }

    #[test]
    fn make_defaults_expands_prior_assignment() {
        let dir = tempdir();
        write_file(&dir, "make.defaults", "ARCH=amd64\nCHOST=$ARCH-pc-linux-gnu\n");
        let node = ProfileNode::new(&dir).unwrap();
        let env = node.default_env().unwrap();
        let chost = env.iter().find(|(k, _)| k == "CHOST").unwrap();
        assert_eq!(chost.1, "amd64-pc-linux-gnu");
    }

    #[test]
    fn malformed_make_defaults_errors_and_stays_errored() {
        let dir = tempdir();
        write_file(&dir, "make.defaults", "NOT_AN_ASSIGNMENT\n");
        let node = ProfileNode::new(&dir).unwrap();
        assert!(node.default_env().is_err());
        assert!(node.default_env().is_err());
    }

    #[test]
    fn bare_negation_is_logged_not_fatal() {
        let dir = tempdir();
        write_file(&dir, "package.mask", "-\ncat/pkg\n");
        let node = ProfileNode::new(&dir).unwrap();
        let masks = node.masks().unwrap();
        assert_eq!(masks.pos.len(), 1);
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("portage-resolver-test-{}", unique()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn unique() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        std::process::id() as u64 * 1_000_000 + COUNTER.fetch_add(1, Ordering::SeqCst)
    }
}
