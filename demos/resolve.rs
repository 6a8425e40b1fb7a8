//! Resolves a small slice of a dependency graph against an in-memory
//! repository: transitive runtime deps, an `|| ( ... )` any-of choice
//! between two SSL providers, and a USE-conditional dependency that only
//! appears when a flag is enabled.

use std::collections::HashSet;

use portage_resolver::{
    resolve, Atom, Cpn, Cpv, Eapi, Package, PackageDeps, PackageMetadata, Restrict, RepoTree,
    ResolveContext, ResolveFlags, UseState, Vdb,
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
        iuse: vec!["ssl".to_string()],
        use_flags: HashSet::new(),
        repo: Some("demo".into()),
        dependencies: deps,
        masked: false,
    }
}

fn atom(s: &str) -> Restrict {
    Restrict::Atom(Atom::parse(s, Eapi::LATEST).unwrap())
}

fn main() {
    tracing_subscriber::fmt::try_init().ok();

    // app-misc/frontend depends on a web server (any of two), always needs
    // dev-lang/python, and pulls in net-libs/libressl only when `ssl` is on.
    let mut frontend_deps = PackageDeps::default();
    frontend_deps.rdepend.push(Restrict::or([atom("www-servers/nginx"), atom("www-servers/apache")]));
    frontend_deps.rdepend.push(atom("dev-lang/python"));
    frontend_deps.rdepend.push(Restrict::UseConditional {
        flag: "ssl".to_string(),
        negate: false,
        inner: Box::new(atom("net-libs/libressl")),
    });

    let repo = InMemoryRepo(vec![
        pkg("app-misc/frontend-2.0", "0", frontend_deps),
        pkg("www-servers/nginx-1.24.0", "0", PackageDeps::default()),
        pkg("dev-lang/python-3.12.0", "0", PackageDeps::default()),
        pkg("net-libs/libressl-3.9.0", "0", PackageDeps::default()),
    ]);
    let vdb = Vdb::new();

    let ctx = ResolveContext {
        trees: vec![&repo],
        vdb: &vdb,
        flags: ResolveFlags::default(),
    };
    let target = Atom::parse("app-misc/frontend", Eapi::LATEST).unwrap();

    println!("-- ssl disabled (default enabled_use is empty) --");
    for op in resolve(&ctx, &[target.clone()]).unwrap() {
        println!("{op:?}");
    }

    // Re-run with `ssl` forced on for the frontend package to show the
    // USE-conditional dependency pulling in libressl. Real USE state flows
    // through a repository's Package::use_state once a ConfiguredTree binds
    // it; this demo injects it directly to keep the example self-contained.
    let mut with_ssl = InMemoryRepo(repo.0.clone());
    for m in &mut with_ssl.0 {
        if m.cpv.cpn == Cpn::new("app-misc", "frontend") {
            m.use_flags.insert("ssl".to_string());
        }
    }
    struct UseAwareRepo(InMemoryRepo);
    impl RepoTree for UseAwareRepo {
        fn itermatch(&self, restrict: &Restrict) -> Vec<Package> {
            self.0
                 .0
                .iter()
                .cloned()
                .map(|metadata| {
                    let enabled = metadata.use_flags.clone();
                    Package {
                        metadata,
                        use_state: Some(UseState {
                            immutable_use: HashSet::new(),
                            enabled_use: enabled,
                            disabled_use: HashSet::new(),
                        }),
                    }
                })
                .filter(|pkg| restrict.matches(pkg))
                .collect()
        }
    }
    let use_aware = UseAwareRepo(with_ssl);
    let ctx = ResolveContext {
        trees: vec![&use_aware],
        vdb: &vdb,
        flags: ResolveFlags::default(),
    };
    println!("-- ssl enabled --");
    for op in resolve(&ctx, &[target]).unwrap() {
        println!("{op:?}");
    }
}
