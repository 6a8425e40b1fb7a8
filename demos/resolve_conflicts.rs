//! Demonstrates the resolver's failure modes: an unbreakable slot conflict
//! between two fixed-version constraints, and an unbreakable build-time
//! dependency cycle.

use portage_resolver::{
    resolve, Atom, Cpv, Eapi, Package, PackageDeps, PackageMetadata, Restrict, RepoTree,
    ResolveContext, ResolveFlags, Vdb,
};

struct InMemoryRepo(Vec<PackageMetadata>);

impl RepoTree for InMemoryRepo {
    fn itermatch(&self, restrict: &Restrict) -> Vec<Package> {
        self.0
            .iter()
            .cloned()
            .map(Package::unconfigured)
            .filter(|pkg| restrict.matches(pkg))
            .collect()
    }
}

fn pkg(cpv: &str, slot: &str, deps: PackageDeps) -> PackageMetadata {
    PackageMetadata {
        cpv: Cpv::parse(cpv).unwrap(),
        slot: Some(slot.into()),
        subslot: None,
        iuse: vec![],
        use_flags: Default::default(),
        repo: Some("demo".into()),
        dependencies: deps,
        masked: false,
    }
}

fn atom(s: &str) -> Atom {
    Atom::parse(s, Eapi::LATEST).unwrap()
}

fn main() {
    tracing_subscriber::fmt::try_init().ok();

    println!("-- conflicting version constraints --");
    let mut top_deps = PackageDeps::default();
    top_deps.rdepend.push(Restrict::Atom(atom("=dev-lang/rust-1.74.0")));
    top_deps.rdepend.push(Restrict::Atom(atom("=dev-lang/rust-1.75.0")));
    let repo = InMemoryRepo(vec![
        pkg("app-misc/top-1.0", "0", top_deps),
        pkg("dev-lang/rust-1.74.0", "0", PackageDeps::default()),
        pkg("dev-lang/rust-1.75.0", "0", PackageDeps::default()),
    ]);
    let vdb = Vdb::new();
    let ctx = ResolveContext {
        trees: vec![&repo],
        vdb: &vdb,
        flags: ResolveFlags::default(),
    };
    match resolve(&ctx, &[atom("app-misc/top")]) {
        Ok(ops) => println!("unexpectedly resolved: {ops:?}"),
        Err(e) => println!("{e}"),
    }

    println!("-- unbreakable build-time cycle --");
    let mut a_deps = PackageDeps::default();
    a_deps.depend.push(Restrict::Atom(atom("cat/b")));
    let mut b_deps = PackageDeps::default();
    b_deps.depend.push(Restrict::Atom(atom("cat/a")));
    let repo = InMemoryRepo(vec![pkg("cat/a-1.0", "0", a_deps), pkg("cat/b-1.0", "0", b_deps)]);
    let ctx = ResolveContext {
        trees: vec![&repo],
        vdb: &vdb,
        flags: ResolveFlags::default(),
    };
    match resolve(&ctx, &[atom("cat/a")]) {
        Ok(ops) => println!("unexpectedly resolved: {ops:?}"),
        Err(e) => println!("{e}"),
    }
}
