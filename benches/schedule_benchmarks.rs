//! Benchmarks for scheduling and lowering.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loopsched::ir::expr::{int, load, var};
use loopsched::prelude::*;

fn matmul(n: i64) -> Ast {
    AstBuilder::build(|b| {
        b.var_def("A", vec![int(n), int(n)], DataType::Float32, AccessType::Input).body(|b| {
            b.var_def("B", vec![int(n), int(n)], DataType::Float32, AccessType::Input).body(|b| {
                b.var_def("C", vec![int(n), int(n)], DataType::Float32, AccessType::Output).body(|b| {
                    b.for_loop("i", 0, n).id("L1").body(|b| {
                        b.for_loop("j", 0, n).id("L2").body(|b| {
                            b.store("C", vec![var("i"), var("j")], 0.0);
                            b.for_loop("k", 0, n).id("L3").body(|b| {
                                let c = load("C", vec![var("i"), var("j")]);
                                let prod = load("A", vec![var("i"), var("k")]) * load("B", vec![var("k"), var("j")]);
                                b.store("C", vec![var("i"), var("j")], c + prod);
                            });
                        });
                    });
                });
            });
        });
    })
    .unwrap()
}

/// Benchmark the parallel-safety check.
fn bench_dependence(c: &mut Criterion) {
    let ast = matmul(64);
    let analysis = DependenceAnalysis::new();
    let loops: Vec<_> = ["L1", "L2", "L3"].iter().map(|l| ast.find(l).unwrap()).collect();

    c.bench_function("check_parallelize_matmul", |b| {
        b.iter(|| {
            for &lp in &loops {
                black_box(analysis.check_parallelize(black_box(&ast), lp));
            }
        })
    });
}

/// Benchmark committed transformations.
fn bench_schedule(c: &mut Criterion) {
    let ast = matmul(64);

    c.bench_function("reorder_split_parallelize", |b| {
        b.iter(|| {
            let mut s = Schedule::new(black_box(ast.clone()));
            s.reorder(&["L2", "L1"]).unwrap();
            s.split_factor("L1", 8).unwrap();
            s.parallelize("L2", "openmp").unwrap();
            s
        })
    });

    c.bench_function("fork_and_parallelize_reduction", |b| {
        let base = Schedule::new(ast.clone());
        b.iter(|| {
            let mut s = base.fork();
            black_box(s.parallelize("L3", "openmp").is_ok())
        })
    });
}

/// Benchmark lowering, including a parallel reduction.
fn bench_lowering(c: &mut Criterion) {
    let mut s = Schedule::new(matmul(64));
    s.split_factor("L3", 4).unwrap();
    s.parallelize("L3.0", "threadIdx.x").unwrap();
    let registry = FunctionRegistry::empty();
    let target = Target::gpu();

    c.bench_function("lower_matmul_reduction", |b| {
        b.iter(|| lower(black_box(s.ast()), &target, &registry).unwrap())
    });
}

criterion_group!(benches, bench_dependence, bench_schedule, bench_lowering);
criterion_main!(benches);
