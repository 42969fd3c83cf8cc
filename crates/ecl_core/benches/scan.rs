//! Changelog scan benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ecl_core::optimize_search;
use ecl_protocol::{Cookie, Filter, SearchScope};
use ecl_testkit::prelude::*;

const SIZES: [usize; 3] = [100, 1_000, 10_000];

/// Benchmark full change-number scans.
fn bench_change_number_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_number_scan");

    for size in SIZES {
        let changelog = TestChangelog::populated(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let entries = changelog.search(changelog_request()).unwrap();
                black_box(entries);
            });
        });
    }

    group.finish();
}

/// Benchmark full cookie-mode scans.
fn bench_cookie_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("cookie_scan");

    for size in SIZES {
        let changelog = TestChangelog::populated(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let entries = changelog
                    .search(changelog_request().with_cookie(Cookie::new()))
                    .unwrap();
                black_box(entries);
            });
        });
    }

    group.finish();
}

/// Benchmark a narrow change-number range against a large changelog.
fn bench_bounded_scan(c: &mut Criterion) {
    let changelog = TestChangelog::populated(10_000);
    let filter = Filter::parse("(&(changeNumber>=9000)(changeNumber<=9010))").unwrap();

    c.bench_function("bounded_scan_11_of_10000", |b| {
        b.iter(|| {
            let request = ecl_core::SearchRequest::new(
                dn("cn=changelog"),
                SearchScope::WholeSubtree,
                filter.clone(),
            );
            let entries = changelog.search(black_box(request)).unwrap();
            black_box(entries);
        });
    });
}

/// Benchmark scan bound derivation.
fn bench_optimize(c: &mut Criterion) {
    let root = dn("cn=changelog");
    let filter = Filter::parse(
        "(&(&(changenumber>=3)(changenumber<=4))(&(|(dc=y)(dc=x))(&(changenumber>=2)(changenumber<=5))))",
    )
    .unwrap();

    c.bench_function("optimize_nested_filter", |b| {
        b.iter(|| {
            let params = optimize_search(black_box(&root), black_box(&root), black_box(&filter)).unwrap();
            black_box(params);
        });
    });
}

criterion_group!(
    benches,
    bench_change_number_scan,
    bench_cookie_scan,
    bench_bounded_scan,
    bench_optimize
);
criterion_main!(benches);
