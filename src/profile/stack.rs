//! `OnDiskProfile`: flattens a `ProfileNode` parent DAG and collapses every
//! per-file attribute across the stack (§4.4).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::atom::Atom;
use crate::chunked::ChunkedDataDict;
use crate::cpv::Cpv;
use crate::eapi::Eapi;
use crate::error::{Error, Result};
use crate::profile::node::ProfileNode;
use crate::repo::tree::MatchablePackage;

/// Environment variables that accumulate across the profile stack by
/// whitespace-splitting and incremental expansion, rather than last-wins
/// overwrite.
const INCREMENTALS: &[&str] = &["USE", "USE_EXPAND", "USE_EXPAND_HIDDEN", "ACCEPT_KEYWORDS", "IUSE_IMPLICIT"];

pub struct OnDiskProfile {
    stack: Vec<ProfileNode>,

    system: HashSet<Atom>,
    visibility_neg: Vec<Atom>,
    visibility_pos: Vec<Atom>,
    masks: HashSet<Atom>,
    pkg_use: ChunkedDataDict,
    pkg_use_force: ChunkedDataDict,
    pkg_use_mask: ChunkedDataDict,
    forced_use: ChunkedDataDict,
    masked_use: ChunkedDataDict,
    default_env: HashMap<String, String>,
    virtuals: HashMap<String, Atom>,
    pkg_provided: HashSet<Cpv>,
    eapi: Eapi,
}

impl OnDiskProfile {
    /// Loads the root node at `path`, follows `parent` edges in a pre-order
    /// DFS (leaves first — a child's own entries are applied after its
    /// parents'), and collapses every attribute. Cycles in the parent graph
    /// are a hard error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let root_path = path.into();
        let mut stack = Vec::new();
        let mut visiting = Vec::new();
        flatten(&root_path, &mut stack, &mut visiting)?;

        let mut profile = Self {
            stack,
            system: HashSet::new(),
            visibility_neg: Vec::new(),
            visibility_pos: Vec::new(),
            masks: HashSet::new(),
            pkg_use: ChunkedDataDict::new(),
            pkg_use_force: ChunkedDataDict::new(),
            pkg_use_mask: ChunkedDataDict::new(),
            forced_use: ChunkedDataDict::new(),
            masked_use: ChunkedDataDict::new(),
            default_env: HashMap::new(),
            virtuals: HashMap::new(),
            pkg_provided: HashSet::new(),
            eapi: Eapi::LATEST,
        };
        profile.collapse()?;
        Ok(profile)
    }

    fn collapse(&mut self) -> Result<()> {
        let mut system: HashSet<Atom> = HashSet::new();
        let mut visibility: HashSet<Atom> = HashSet::new();
        let mut masks: HashSet<Atom> = HashSet::new();
        let mut pkg_provided_pos: HashSet<Cpv> = HashSet::new();
        let mut pkg_provided_neg: HashSet<Cpv> = HashSet::new();
        let mut incremental_raw: HashMap<String, Vec<String>> = HashMap::new();
        let mut last_wins: HashMap<String, String> = HashMap::new();

        for node in &self.stack {
            let packages = node.packages()?;
            for a in &packages.system.neg {
                system.remove(a);
            }
            system.extend(packages.system.pos.iter().cloned());
            for a in &packages.visibility.neg {
                visibility.remove(a);
            }
            visibility.extend(packages.visibility.pos.iter().cloned());
            self.visibility_neg.extend(packages.visibility.neg.iter().cloned());
            self.visibility_pos.extend(packages.visibility.pos.iter().cloned());

            let node_masks = node.masks()?;
            for a in &node_masks.neg {
                masks.remove(a);
            }
            masks.extend(node_masks.pos.iter().cloned());

            self.pkg_use.concatenate(node.pkg_use()?.as_ref());
            self.pkg_use_force.concatenate(node.pkg_use_force()?.as_ref());
            self.pkg_use_mask.concatenate(node.pkg_use_mask()?.as_ref());
            self.forced_use.concatenate(node.forced_use()?.as_ref());
            self.masked_use.concatenate(node.masked_use()?.as_ref());

            for (key, value) in node.default_env()?.iter() {
                if INCREMENTALS.contains(&key.as_str()) {
                    incremental_raw
                        .entry(key.clone())
                        .or_default()
                        .extend(value.split_whitespace().map(str::to_string));
                } else {
                    last_wins.insert(key.clone(), value.clone());
                }
            }

            for (virt, atom) in node.virtuals()?.iter() {
                self.virtuals.insert(virt.clone(), atom.clone());
            }

            let provided = node.pkg_provided()?;
            for cpv in &provided.neg {
                pkg_provided_neg.insert(cpv.clone());
            }
            for cpv in &provided.pos {
                pkg_provided_pos.insert(cpv.clone());
            }

            self.eapi = node.eapi()?;
        }

        self.system = system;
        self.masks = masks;
        self.pkg_provided = pkg_provided_pos.difference(&pkg_provided_neg).cloned().collect();

        for (key, tokens) in incremental_raw {
            let expanded = incremental_expand(&tokens);
            if expanded.is_empty() {
                continue;
            }
            self.default_env.insert(key, expanded.into_iter().collect::<Vec<_>>().join(" "));
        }
        for (key, value) in last_wins {
            self.default_env.insert(key, value);
        }

        Ok(())
    }

    pub fn eapi(&self) -> Eapi {
        self.eapi
    }

    pub fn system(&self) -> &HashSet<Atom> {
        &self.system
    }

    pub fn masks(&self) -> &HashSet<Atom> {
        &self.masks
    }

    pub fn virtuals(&self) -> &HashMap<String, Atom> {
        &self.virtuals
    }

    pub fn pkg_provided(&self) -> &HashSet<Cpv> {
        &self.pkg_provided
    }

    pub fn arch(&self) -> Option<&str> {
        self.default_env.get("ARCH").map(String::as_str)
    }

    pub fn use_expand(&self) -> Vec<&str> {
        self.default_env
            .get("USE_EXPAND")
            .map(|v| v.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Effective forced-USE set for `pkg`, folding the global `use.force`
    /// view with any `package.use.force` entries whose atom matches it.
    pub fn forced_use_for(&self, pkg: &dyn MatchablePackage) -> HashSet<String> {
        let mut out = self.forced_use.render_scope("");
        out.extend(self.pkg_use_force.render_for(pkg, self.eapi));
        out.into_iter().collect()
    }

    pub fn masked_use_for(&self, pkg: &dyn MatchablePackage) -> HashSet<String> {
        let mut out = self.masked_use.render_scope("");
        out.extend(self.pkg_use_mask.render_for(pkg, self.eapi));
        out.into_iter().collect()
    }

    pub fn pkg_use_for(&self, pkg: &dyn MatchablePackage) -> HashSet<String> {
        self.pkg_use.render_for(pkg, self.eapi).into_iter().collect()
    }
}

/// Applies `-token` removal and `-*` clear-all to a flat incremental token
/// stream, in order.
fn incremental_expand(tokens: &[String]) -> HashSet<String> {
    let mut set = HashSet::new();
    for tok in tokens {
        if tok == "-*" {
            set.clear();
        } else if let Some(rest) = tok.strip_prefix('-') {
            set.remove(rest);
        } else {
            set.insert(tok.clone());
        }
    }
    set
}

fn flatten(path: &Path, stack: &mut Vec<ProfileNode>, visiting: &mut Vec<PathBuf>) -> Result<()> {
    let canonical = path.to_path_buf();
    if visiting.contains(&canonical) {
        return Err(Error::ProfileCycle(canonical));
    }
    visiting.push(canonical.clone());

    let node = ProfileNode::new(&canonical)?;
    for parent in node.parents()?.iter() {
        flatten(parent, stack, visiting)?;
    }
    visiting.pop();
    stack.push(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    fn tempdir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("portage-resolver-stack-test-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn detects_parent_cycle() {
        let a = tempdir("cycle-a");
        let b = tempdir("cycle-b");
        write_file(&a, "parent", &format!("{}\n", b.display()));
        write_file(&b, "parent", &format!("{}\n", a.display()));
        assert!(OnDiskProfile::load(&a).is_err());
    }

    #[test]
    fn child_overrides_parent_mask() {
        let parent = tempdir("override-parent");
        write_file(&parent, "package.mask", "cat/pkg\n");
        let child = tempdir("override-child");
        write_file(&child, "parent", &format!("{}\n", parent.display()));
        write_file(&child, "package.mask", "-cat/pkg\n");

        let profile = OnDiskProfile::load(&child).unwrap();
        assert!(profile.masks().is_empty());
    }

    #[test]
    fn incremental_use_accumulates_across_stack() {
        let parent = tempdir("incr-parent");
        write_file(&parent, "make.defaults", "USE=foo bar\n");
        let child = tempdir("incr-child");
        write_file(&child, "parent", &format!("{}\n", parent.display()));
        write_file(&child, "make.defaults", "USE=-bar baz\n");

        let profile = OnDiskProfile::load(&child).unwrap();
        let use_flags: HashSet<&str> = profile.default_env.get("USE").unwrap().split_whitespace().collect();
        assert!(use_flags.contains("foo"));
        assert!(use_flags.contains("baz"));
        assert!(!use_flags.contains("bar"));
    }
}
