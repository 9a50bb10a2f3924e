// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Benchmarks for page-range parsing and canonicalisation.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use labprint_core::page_range;

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_mixed_range", |b| {
        b.iter(|| page_range::parse(black_box("1-3, 7, 10-40, 41, 99-120"), 500))
    });

    c.bench_function("parse_blank_large_document", |b| {
        b.iter(|| page_range::parse(black_box(""), 2000))
    });
}

fn bench_canonical(c: &mut Criterion) {
    let set = page_range::parse("1-50,52,54-80,100,102,104-300", 400).expect("parse");
    c.bench_function("canonical_string", |b| {
        b.iter(|| black_box(&set).to_canonical_string())
    });
}

criterion_group!(benches, bench_parse, bench_canonical);
criterion_main!(benches);
