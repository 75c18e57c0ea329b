//! Benchmarks for the scheduling engine.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use polysched::prelude::*;

fn matmul() -> PolyProgram {
    RegionDescriptor::new("matmul")
        .parameter(Parameter::new("N").at_least(1))
        .statement(
            StatementDecl::new("S0", "[N] -> { S0[i, j] : 0 <= i < N and 0 <= j < N }")
                .write("C", "[N] -> { S0[i, j] -> C[i, j] }"),
        )
        .statement(
            StatementDecl::new("S1", "[N] -> { S1[i, j, k] : 0 <= i < N and 0 <= j < N and 0 <= k < N }")
                .read("C", "[N] -> { S1[i, j, k] -> C[i, j] }")
                .read("A", "[N] -> { S1[i, j, k] -> A[i, k] }")
                .read("B", "[N] -> { S1[i, j, k] -> B[k, j] }")
                .write("C", "[N] -> { S1[i, j, k] -> C[i, j] }"),
        )
        .build()
        .unwrap()
}

/// Benchmark parsing of set notation.
fn bench_parsing(c: &mut Criterion) {
    let source = "[N, M, K] -> { S1[i, j, k] : 0 <= i < N and 0 <= j < M and 0 <= k < K and i <= j + k }";

    c.bench_function("parse_domain", |b| {
        b.iter(|| polysched::frontend::parse_set(black_box(source), &[]).unwrap())
    });

    c.bench_function("lex_domain", |b| {
        b.iter(|| polysched::frontend::lexer::tokenize(black_box(source)).unwrap())
    });
}

/// Benchmark dependence analysis.
fn bench_dependences(c: &mut Criterion) {
    let program = matmul();
    c.bench_function("dependences_matmul", |b| {
        b.iter(|| compute_dependences(black_box(&program)).unwrap())
    });
}

/// Benchmark schedule synthesis and tree construction.
fn bench_scheduling(c: &mut Criterion) {
    let program = matmul();
    let deps = compute_dependences(&program).unwrap();

    c.bench_function("synthesize_matmul", |b| {
        b.iter(|| synthesize(black_box(&program), black_box(&deps), None))
    });

    let schedule = synthesize(&program, &deps, None);
    c.bench_function("legality_matmul", |b| {
        b.iter(|| is_legal(black_box(&schedule), black_box(&deps)))
    });
    c.bench_function("tree_matmul", |b| {
        b.iter(|| build_tree(black_box(&schedule), black_box(&program)).unwrap())
    });
}

criterion_group!(benches, bench_parsing, bench_dependences, bench_scheduling);
criterion_main!(benches);
