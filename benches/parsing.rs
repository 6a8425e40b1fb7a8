use criterion::{black_box, criterion_group, criterion_main, Criterion};

use portage_resolver::{Atom, Eapi, Version};

fn bench_version_parse(c: &mut Criterion) {
    c.bench_function("version::parse", |b| {
        b.iter(|| Version::parse(black_box("1.2.3_alpha4-r5")).unwrap())
    });
}

fn bench_version_cmp(c: &mut Criterion) {
    let a = Version::parse("1.2.3_alpha4-r5").unwrap();
    let b = Version::parse("1.2.3_beta1-r1").unwrap();
    c.bench_function("version::cmp", |bencher| bencher.iter(|| black_box(&a).cmp(black_box(&b))));
}

fn bench_atom_parse(c: &mut Criterion) {
    c.bench_function("atom::parse_bare", |b| {
        b.iter(|| Atom::parse(black_box("dev-lang/rust"), Eapi::LATEST).unwrap())
    });
    c.bench_function("atom::parse_complex", |b| {
        b.iter(|| Atom::parse(black_box(">=dev-lang/rust-1.75.0:0/2=[use1,-use2]::gentoo"), Eapi::LATEST).unwrap())
    });
}

criterion_group!(benches, bench_version_parse, bench_version_cmp, bench_atom_parse);
criterion_main!(benches);
