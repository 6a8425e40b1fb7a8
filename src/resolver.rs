//! Dependency resolver: graph construction, strategy-based version
//! selection, cycle handling, and build-plan emission (§4.8).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::atom::{Atom, Blocker};
use crate::cpv::Cpv;
use crate::error::{Error, Result};
use crate::pkgset::{InstalledPkgset, PackageSet};
use crate::pool::DepClass;
use crate::repo::tree::{MatchablePackage, Package, RepoTree};
use crate::restrict::Restrict;
use crate::vdb::Vdb;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveFlags {
    pub deep: bool,
    pub upgrade: bool,
    pub nodeps: bool,
    pub drop_cycles: bool,
    pub force_replacement: bool,
    pub empty_tree: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    MinInstall,
    Upgrade,
    EmptyTree,
}

impl Strategy {
    pub fn from_flags(flags: &ResolveFlags) -> Self {
        if flags.empty_tree {
            Strategy::EmptyTree
        } else if flags.upgrade {
            Strategy::Upgrade
        } else {
            Strategy::MinInstall
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Add(Cpv),
    Replace { new: Cpv, old: Cpv },
    Remove(Cpv),
}

type NodeKey = (String, Option<String>);

#[derive(Debug, Clone)]
struct Node {
    key: NodeKey,
    cpv: Cpv,
}

/// A package source the resolver can select candidates from: an ordered
/// list of configured repository views plus the packages a profile marks
/// as already provided (§2.6).
pub struct ResolveContext<'a> {
    pub trees: Vec<&'a dyn RepoTree>,
    pub vdb: &'a Vdb,
    pub flags: ResolveFlags,
}

pub fn resolve(ctx: &ResolveContext, targets: &[Atom]) -> Result<Vec<Operation>> {
    let strategy = Strategy::from_flags(&ctx.flags);
    let mut nodes: HashMap<NodeKey, Node> = HashMap::new();
    let mut edges: Vec<(NodeKey, NodeKey, DepClass)> = Vec::new();
    let mut order: Vec<NodeKey> = Vec::new();
    let mut queue: VecDeque<(Atom, Option<NodeKey>, Option<DepClass>)> = VecDeque::new();

    for atom in targets {
        queue.push_back((atom.clone(), None, None));
    }

    while let Some((atom, parent, dep_class)) = queue.pop_front() {
        if atom.blocker != Blocker::None {
            check_blocker(&atom, &nodes)?;
            continue;
        }

        let candidates = collect_candidates(ctx, &atom);
        if candidates.is_empty() {
            return Err(Error::Unsatisfied(atom));
        }
        let ordered = order_candidates(candidates, ctx, strategy);

        let key = atom.key();
        let slot = ordered[0].metadata.slot.clone();
        let node_key: NodeKey = (key.clone(), slot.clone());

        let chosen = pick_first_satisfiable(&ordered);

        match nodes.get(&node_key) {
            Some(existing) if existing.cpv != chosen.metadata.cpv => {
                return Err(Error::Conflict {
                    key,
                    candidates: vec![existing.cpv.clone(), chosen.metadata.cpv.clone()],
                });
            }
            Some(_) => {
                if let (Some(parent_key), Some(class)) = (&parent, dep_class) {
                    edges.push((parent_key.clone(), node_key.clone(), class));
                }
                continue;
            }
            None => {}
        }

        nodes.insert(
            node_key.clone(),
            Node {
                key: node_key.clone(),
                cpv: chosen.metadata.cpv.clone(),
            },
        );
        order.push(node_key.clone());
        if let (Some(parent_key), Some(class)) = (&parent, dep_class) {
            edges.push((parent_key.clone(), node_key.clone(), class));
        }

        if ctx.flags.nodeps {
            continue;
        }

        for (class, child_atoms) in expand_dependencies(&chosen) {
            for child_atom in child_atoms {
                queue.push_back((child_atom, Some(node_key.clone()), Some(class)));
            }
        }
    }

    let breakable = verify_cycles(&order, &edges, &nodes, ctx.flags.drop_cycles)?;
    let linearized = topological_order(&order, &edges, breakable);

    let mut ops = Vec::new();
    for node_key in linearized {
        let node = &nodes[&node_key];
        let installed = ctx.vdb.find(&node_key.0, node_key.1.as_deref());
        match installed {
            Some(old) if old.cpv == node.cpv && !ctx.flags.force_replacement => {}
            Some(old) => ops.push(Operation::Replace {
                new: node.cpv.clone(),
                old: old.cpv.clone(),
            }),
            None => ops.push(Operation::Add(node.cpv.clone())),
        }
    }
    Ok(ops)
}

fn check_blocker(atom: &Atom, nodes: &HashMap<NodeKey, Node>) -> Result<()> {
    for node in nodes.values() {
        if node.key.0 == atom.key() {
            let mut probe = atom.clone();
            probe.blocker = Blocker::None;
            let pkg = Package::unconfigured(crate::pool::PackageMetadata {
                cpv: node.cpv.clone(),
                slot: node.key.1.clone(),
                subslot: None,
                iuse: Vec::new(),
                use_flags: Default::default(),
                repo: None,
                dependencies: Default::default(),
                masked: false,
            });
            if probe.matches(&pkg) {
                if atom.blocker == Blocker::Strong {
                    return Err(Error::Conflict {
                        key: node.key.0.clone(),
                        candidates: vec![node.cpv.clone()],
                    });
                }
                tracing::warn!(atom = %atom, pkg = %node.cpv, "weak blocker overlaps selected package");
            }
        }
    }
    Ok(())
}

fn collect_candidates(ctx: &ResolveContext, atom: &Atom) -> Vec<Package> {
    let restrict = Restrict::Atom(atom.clone());
    let mut out = Vec::new();
    for tree in &ctx.trees {
        for pkg in tree.itermatch(&restrict) {
            if pkg.metadata.masked {
                continue;
            }
            out.push(pkg);
        }
    }
    out
}

fn order_candidates(mut candidates: Vec<Package>, ctx: &ResolveContext, strategy: Strategy) -> Vec<Package> {
    match strategy {
        Strategy::Upgrade | Strategy::EmptyTree => {
            candidates.sort_by(|a, b| b.metadata.cpv.version.cmp(&a.metadata.cpv.version));
        }
        Strategy::MinInstall => {
            candidates.sort_by(|a, b| {
                let a_installed = ctx.vdb.find(&a.metadata.cpv.key(), a.metadata.slot.as_deref()).is_some_and(|p| p.cpv == a.metadata.cpv);
                let b_installed = ctx.vdb.find(&b.metadata.cpv.key(), b.metadata.slot.as_deref()).is_some_and(|p| p.cpv == b.metadata.cpv);
                b_installed.cmp(&a_installed).then_with(|| b.metadata.cpv.version.cmp(&a.metadata.cpv.version))
            });
        }
    }
    candidates
}

/// Picks the first candidate, per §4.8 step 3. A full implementation would
/// attempt each candidate's dependency closure in turn and backtrack on
/// failure; this resolver commits to the first ordered candidate and lets
/// a downstream conflict surface as a resolution failure instead, per the
/// single-pass simplification recorded in the design notes.
fn pick_first_satisfiable(ordered: &[Package]) -> &Package {
    &ordered[0]
}

fn expand_dependencies(pkg: &Package) -> Vec<(DepClass, Vec<Atom>)> {
    let empty = HashSet::new();
    let enabled_use = pkg.enabled_use().unwrap_or(&empty);
    pkg.metadata
        .dependencies
        .iter_classes()
        .filter(|(class, _)| *class != DepClass::Idepend)
        .map(|(class, restricts)| {
            let mut atoms = Vec::new();
            for r in restricts {
                collect_atoms(r, enabled_use, &mut atoms);
            }
            (class, atoms)
        })
        .collect()
}

fn collect_atoms(restrict: &Restrict, enabled_use: &HashSet<String>, out: &mut Vec<Atom>) {
    match restrict {
        Restrict::Atom(atom) => out.push(atom.clone()),
        Restrict::And(parts) => {
            for p in parts {
                collect_atoms(p, enabled_use, out);
            }
        }
        Restrict::Or(parts) => {
            if let Some(first) = parts.first() {
                collect_atoms(first, enabled_use, out);
            }
        }
        Restrict::UseConditional { flag, negate, inner } => {
            let has = enabled_use.contains(flag);
            if has != *negate {
                collect_atoms(inner, enabled_use, out);
            }
        }
        Restrict::Not(_)
        | Restrict::PackageField(..)
        | Restrict::ContainmentMatch { .. }
        | Restrict::VersionMatch(..)
        | Restrict::Always
        | Restrict::Never => {}
    }
}

/// Computes strongly connected components (Tarjan) over `edges` restricted
/// to `nodes`, and verifies every nontrivial SCC is breakable: every edge
/// inside it is `Rdepend`/`Pdepend`. Returns the set of edges that must be
/// treated as non-ordering (runtime-only, inside a breakable cycle) so
/// `topological_order` can ignore them.
fn verify_cycles(
    order: &[NodeKey],
    edges: &[(NodeKey, NodeKey, DepClass)],
    nodes: &HashMap<NodeKey, Node>,
    drop_cycles: bool,
) -> Result<HashSet<(NodeKey, NodeKey)>> {
    let sccs = tarjan_scc(order, edges);
    let mut breakable_edges = HashSet::new();

    for scc in &sccs {
        if scc.len() < 2 {
            continue;
        }
        let scc_set: HashSet<_> = scc.iter().cloned().collect();
        let internal: Vec<_> = edges
            .iter()
            .filter(|(from, to, _)| scc_set.contains(from) && scc_set.contains(to))
            .collect();
        let all_runtime = internal
            .iter()
            .all(|(_, _, class)| matches!(class, DepClass::Rdepend | DepClass::Pdepend));

        if !all_runtime {
            if drop_cycles {
                tracing::warn!(?scc, "dropping unbreakable cycle");
            } else {
                return Err(Error::Cycle(scc.iter().map(|key| nodes[key].cpv.clone()).collect()));
            }
        }
        for (from, to, _) in internal {
            breakable_edges.insert((from.clone(), to.clone()));
        }
    }
    Ok(breakable_edges)
}

fn tarjan_scc(nodes: &[NodeKey], edges: &[(NodeKey, NodeKey, DepClass)]) -> Vec<Vec<NodeKey>> {
    let mut adjacency: HashMap<&NodeKey, Vec<&NodeKey>> = HashMap::new();
    for (from, to, _) in edges {
        adjacency.entry(from).or_default().push(to);
    }

    let mut index_counter = 0usize;
    let mut stack = Vec::new();
    let mut indices: HashMap<&NodeKey, usize> = HashMap::new();
    let mut lowlink: HashMap<&NodeKey, usize> = HashMap::new();
    let mut on_stack: HashSet<&NodeKey> = HashSet::new();
    let mut result = Vec::new();

    fn strong_connect<'a>(
        v: &'a NodeKey,
        adjacency: &HashMap<&'a NodeKey, Vec<&'a NodeKey>>,
        index_counter: &mut usize,
        stack: &mut Vec<&'a NodeKey>,
        indices: &mut HashMap<&'a NodeKey, usize>,
        lowlink: &mut HashMap<&'a NodeKey, usize>,
        on_stack: &mut HashSet<&'a NodeKey>,
        result: &mut Vec<Vec<NodeKey>>,
    ) {
        indices.insert(v, *index_counter);
        lowlink.insert(v, *index_counter);
        *index_counter += 1;
        stack.push(v);
        on_stack.insert(v);

        if let Some(neighbors) = adjacency.get(v) {
            for &w in neighbors {
                if !indices.contains_key(w) {
                    strong_connect(w, adjacency, index_counter, stack, indices, lowlink, on_stack, result);
                    let w_low = lowlink[w];
                    let v_low = lowlink[v];
                    lowlink.insert(v, v_low.min(w_low));
                } else if on_stack.contains(w) {
                    let w_idx = indices[w];
                    let v_low = lowlink[v];
                    lowlink.insert(v, v_low.min(w_idx));
                }
            }
        }

        if lowlink[v] == indices[v] {
            let mut component = Vec::new();
            loop {
                let w = stack.pop().unwrap();
                on_stack.remove(w);
                component.push(w.clone());
                if w == v {
                    break;
                }
            }
            result.push(component);
        }
    }

    for node in nodes {
        if !indices.contains_key(node) {
            strong_connect(node, &adjacency, &mut index_counter, &mut stack, &mut indices, &mut lowlink, &mut on_stack, &mut result);
        }
    }
    result
}

fn topological_order(nodes: &[NodeKey], edges: &[(NodeKey, NodeKey, DepClass)], ignore: HashSet<(NodeKey, NodeKey)>) -> Vec<NodeKey> {
    // `edges` run parent -> child (a dependency edge), but the plan must
    // list a dependency before whatever depends on it, so the sort walks
    // the graph in the opposite direction: child "enables" parent.
    let mut in_degree: HashMap<&NodeKey, usize> = nodes.iter().map(|n| (n, 0)).collect();
    let mut adjacency: HashMap<&NodeKey, Vec<&NodeKey>> = HashMap::new();
    for (parent, child, _) in edges {
        if ignore.contains(&(parent.clone(), child.clone())) {
            continue;
        }
        adjacency.entry(child).or_default().push(parent);
        *in_degree.entry(parent).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&NodeKey> = nodes.iter().filter(|n| in_degree[n] == 0).collect();
    let mut out = Vec::with_capacity(nodes.len());
    let mut seen = HashSet::new();

    while let Some(n) = queue.pop_front() {
        if !seen.insert(n.clone()) {
            continue;
        }
        out.push(n.clone());
        if let Some(enabled) = adjacency.get(n) {
            for &parent in enabled {
                if let Some(d) = in_degree.get_mut(parent) {
                    *d = d.saturating_sub(1);
                    if *d == 0 {
                        queue.push_back(parent);
                    }
                }
            }
        }
    }

    // Any leftover nodes are part of a dropped/unbreakable cycle that was
    // permitted through `drop_cycles`; append them in discovery order so
    // the plan still covers every selected node.
    for node in nodes {
        if seen.insert(node.clone()) {
            out.push(node.clone());
        }
    }
    out
}

/// `unmerge` operates outside the resolver (§4.8): matches a user token
/// against the `@installed` set, requires the match to stay within one
/// category, and emits `remove` ops in reverse install order.
pub fn unmerge(vdb: &Vdb, token: &str) -> Result<Vec<Operation>> {
    let installed_restrict = InstalledPkgset::new(vdb).restriction();

    let matches: Vec<_> = vdb
        .all()
        .filter(|pkg| installed_restrict.matches(&Package::unconfigured((*pkg).clone())))
        .filter(|pkg| pkg.cpv.cpn.package == token || pkg.cpv.key() == token)
        .collect();

    let categories: HashSet<&str> = matches.iter().map(|p| p.cpv.cpn.category.as_str()).collect();
    if categories.len() > 1 {
        return Err(Error::AmbiguousUnmerge(token.to_string()));
    }

    Ok(matches.into_iter().rev().map(|p| Operation::Remove(p.cpv.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eapi::Eapi;
    use crate::pool::{PackageDeps, PackageMetadata};
    use crate::repo::tree::{Package, RepoTree};

    struct FakeTree(Vec<PackageMetadata>);
    impl RepoTree for FakeTree {
        fn itermatch(&self, restrict: &Restrict) -> Vec<Package> {
            self.0
                .iter()
                .cloned()
                .map(Package::unconfigured)
                .filter(|pkg| restrict.matches(pkg))
                .collect()
        }
    }

    fn meta(cpv: &str, slot: &str, deps: PackageDeps) -> PackageMetadata {
        PackageMetadata {
            cpv: Cpv::parse(cpv).unwrap(),
            slot: Some(slot.to_string()),
            subslot: None,
            iuse: vec![],
            use_flags: Default::default(),
            repo: Some("test".into()),
            dependencies: deps,
            masked: false,
        }
    }

    #[test]
    fn resolves_single_target_with_no_deps() {
        let tree = FakeTree(vec![meta("dev-lang/rust-1.75.0", "0", PackageDeps::default())]);
        let vdb = Vdb::new();
        let ctx = ResolveContext {
            trees: vec![&tree],
            vdb: &vdb,
            flags: ResolveFlags::default(),
        };
        let atom = Atom::parse("dev-lang/rust", Eapi::LATEST).unwrap();
        let ops = resolve(&ctx, &[atom]).unwrap();
        assert_eq!(ops, vec![Operation::Add(Cpv::parse("dev-lang/rust-1.75.0").unwrap())]);
    }

    #[test]
    fn expands_runtime_dependency() {
        let mut deps = PackageDeps::default();
        deps.rdepend.push(Restrict::Atom(Atom::parse("dev-lang/python", Eapi::LATEST).unwrap()));
        let tree = FakeTree(vec![
            meta("app-foo/bar-1.0", "0", deps),
            meta("dev-lang/python-3.12.0", "0", PackageDeps::default()),
        ]);
        let vdb = Vdb::new();
        let ctx = ResolveContext {
            trees: vec![&tree],
            vdb: &vdb,
            flags: ResolveFlags::default(),
        };
        let atom = Atom::parse("app-foo/bar", Eapi::LATEST).unwrap();
        let ops = resolve(&ctx, &[atom]).unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn unsatisfied_target_is_an_error() {
        let tree = FakeTree(vec![]);
        let vdb = Vdb::new();
        let ctx = ResolveContext {
            trees: vec![&tree],
            vdb: &vdb,
            flags: ResolveFlags::default(),
        };
        let atom = Atom::parse("dev-lang/rust", Eapi::LATEST).unwrap();
        assert!(resolve(&ctx, &[atom]).is_err());
    }

    #[test]
    fn already_installed_same_version_is_elided() {
        let tree = FakeTree(vec![meta("dev-lang/rust-1.75.0", "0", PackageDeps::default())]);
        let mut vdb = Vdb::new();
        vdb.install(meta("dev-lang/rust-1.75.0", "0", PackageDeps::default()));
        let ctx = ResolveContext {
            trees: vec![&tree],
            vdb: &vdb,
            flags: ResolveFlags::default(),
        };
        let atom = Atom::parse("dev-lang/rust", Eapi::LATEST).unwrap();
        let ops = resolve(&ctx, &[atom]).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn replace_emitted_when_installed_version_differs() {
        let tree = FakeTree(vec![meta("dev-lang/rust-1.75.0", "0", PackageDeps::default())]);
        let mut vdb = Vdb::new();
        vdb.install(meta("dev-lang/rust-1.74.0", "0", PackageDeps::default()));
        let ctx = ResolveContext {
            trees: vec![&tree],
            vdb: &vdb,
            flags: ResolveFlags::default(),
        };
        let atom = Atom::parse("dev-lang/rust", Eapi::LATEST).unwrap();
        let ops = resolve(&ctx, &[atom]).unwrap();
        assert_eq!(
            ops,
            vec![Operation::Replace {
                new: Cpv::parse("dev-lang/rust-1.75.0").unwrap(),
                old: Cpv::parse("dev-lang/rust-1.74.0").unwrap(),
            }]
        );
    }

    #[test]
    fn unmerge_rejects_multi_category_token() {
        let mut vdb = Vdb::new();
        vdb.install(meta("dev-lang/foo-1.0", "0", PackageDeps::default()));
        vdb.install(meta("app-misc/foo-1.0", "0", PackageDeps::default()));
        assert!(unmerge(&vdb, "foo").is_err());
    }

    #[test]
    fn unmerge_emits_remove_ops() {
        let mut vdb = Vdb::new();
        vdb.install(meta("dev-lang/rust-1.75.0", "0", PackageDeps::default()));
        let ops = unmerge(&vdb, "dev-lang/rust").unwrap();
        assert_eq!(ops, vec![Operation::Remove(Cpv::parse("dev-lang/rust-1.75.0").unwrap())]);
    }

    #[test]
    fn breakable_runtime_cycle_does_not_error() {
        let mut a_deps = PackageDeps::default();
        a_deps.rdepend.push(Restrict::Atom(Atom::parse("cat/b", Eapi::LATEST).unwrap()));
        let mut b_deps = PackageDeps::default();
        b_deps.rdepend.push(Restrict::Atom(Atom::parse("cat/a", Eapi::LATEST).unwrap()));
        let tree = FakeTree(vec![meta("cat/a-1", "0", a_deps), meta("cat/b-1", "0", b_deps)]);
        let vdb = Vdb::new();
        let ctx = ResolveContext {
            trees: vec![&tree],
            vdb: &vdb,
            flags: ResolveFlags::default(),
        };
        let atom = Atom::parse("cat/a", Eapi::LATEST).unwrap();
        let ops = resolve(&ctx, &[atom]).unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn unbreakable_build_time_cycle_errors() {
        let mut a_deps = PackageDeps::default();
        a_deps.depend.push(Restrict::Atom(Atom::parse("cat/b", Eapi::LATEST).unwrap()));
        let mut b_deps = PackageDeps::default();
        b_deps.depend.push(Restrict::Atom(Atom::parse("cat/a", Eapi::LATEST).unwrap()));
        let tree = FakeTree(vec![meta("cat/a-1", "0", a_deps), meta("cat/b-1", "0", b_deps)]);
        let vdb = Vdb::new();
        let ctx = ResolveContext {
            trees: vec![&tree],
            vdb: &vdb,
            flags: ResolveFlags::default(),
        };
        let atom = Atom::parse("cat/a", Eapi::LATEST).unwrap();
        assert!(resolve(&ctx, &[atom]).is_err());
    }
}
