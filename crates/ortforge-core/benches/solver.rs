use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ortforge_core::expr::Expr;
use ortforge_core::model::{DomainKind, LogicEngine, Relation, VariableDomain};
use ortforge_core::solver::{Solver, SolverConfig};

fn engine(
    variables: &[(&str, VariableDomain)],
    constraints: &[&str],
    a: &str,
    b: &str,
    relation: Relation,
) -> LogicEngine {
    LogicEngine {
        variables: variables
            .iter()
            .map(|(name, domain)| (name.to_string(), domain.clone()))
            .collect(),
        constraints: constraints.iter().map(|c| c.to_string()).collect(),
        expressions: BTreeMap::from([
            ("column_a".to_string(), a.to_string()),
            ("column_b".to_string(), b.to_string()),
        ]),
        relation,
        solver_result: None,
    }
}

fn bench_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver");
    let solver = Solver::new(SolverConfig::default());

    let sqrt = engine(
        &[("x", VariableDomain::open(0.0, 1.0))],
        &["x > 0 && x < 1"],
        "x",
        "sqrt(x)",
        Relation::BGreater,
    );
    group.bench_function("sqrt_single_var", |b| {
        b.iter(|| solver.solve(black_box(&sqrt)))
    });

    let integers = VariableDomain {
        kind: DomainKind::Integer,
        ..VariableDomain::closed(1.0, 10.0)
    };
    let two_vars = engine(
        &[("m", integers.clone()), ("n", integers)],
        &["m >= 1", "n >= 1"],
        "m*n",
        "m + n",
        Relation::Undetermined,
    );
    group.bench_function("two_integer_vars", |b| {
        b.iter(|| solver.solve(black_box(&two_vars)))
    });

    let three_vars = engine(
        &[
            ("x", VariableDomain::closed(-2.0, 2.0)),
            ("y", VariableDomain::closed(-2.0, 2.0)),
            ("z", VariableDomain::closed(0.0, 4.0)),
        ],
        &["z >= 0"],
        "x^2 + y^2 + z",
        "-1",
        Relation::AGreater,
    );
    group.bench_function("three_real_vars", |b| {
        b.iter(|| solver.solve(black_box(&three_vars)))
    });

    group.finish();
}

fn bench_expression_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("expression_parsing");

    group.bench_function("short", |b| b.iter(|| Expr::parse(black_box("2*x + 1"))));
    group.bench_function("nested", |b| {
        b.iter(|| Expr::parse(black_box("sqrt((x + 1)^2 - 4*x*y) / abs(y - 3) + min(x, y)")))
    });

    group.finish();
}

criterion_group!(benches, bench_solver, bench_expression_parsing);
criterion_main!(benches);
