//! Performance benchmarks for the value-algebra calculator: eager concrete
//! arithmetic versus symbolic expression construction.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use symex_core::{Calculator, Operator, Simplex, Value};

fn concrete_arithmetic(c: &mut Criterion) {
    let calculator = Calculator::default();
    c.bench_function("calculator/concrete_iadd", |b| {
        b.iter(|| {
            let left = Value::Simplex(Simplex::Int(black_box(7)));
            let right = Value::Simplex(Simplex::Int(black_box(35)));
            black_box(calculator.binary(Operator::Add, left, right).unwrap())
        });
    });
}

fn symbolic_expression_construction(c: &mut Criterion) {
    let calculator = Calculator::default();
    let ids = symex_core::TermIdGenerator::new();
    c.bench_function("calculator/symbolic_iadd_chain", |b| {
        b.iter(|| {
            let mut acc = ids.fresh_term(symex_core::TypeTag::Int);
            for _ in 0..black_box(16) {
                let rhs = Value::Simplex(Simplex::Int(1));
                acc = calculator.binary(Operator::Add, acc, rhs).unwrap();
            }
            black_box(acc)
        });
    });
}

criterion_group!(benches, concrete_arithmetic, symbolic_expression_construction);
criterion_main!(benches);
