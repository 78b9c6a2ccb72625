use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pgfluent::qb::{self, Filter, Fluent, StatementModel};
use pgfluent::Value;

/// SELECT * FROM t WHERE col0 = $1 AND (col1 = $2 OR col1 IS NULL) ... ORDER BY id DESC LIMIT 10
fn build_select(n: usize) -> StatementModel {
    let mut model = qb::table("t");
    for i in 0..n {
        let column = format!("col{i}");
        model = if i % 2 == 0 {
            model.where_eq(&column, i as i64)
        } else {
            model.where_group(|g| g.where_eq(&column, i as i64).or_where_null(&column))
        };
    }
    model.order_by("id", "desc").limit(0, 10)
}

fn batch_rows(n: usize) -> Vec<Vec<(String, Value)>> {
    (0..n)
        .map(|i| {
            vec![
                ("id".to_string(), Value::Int(i as i64)),
                ("name".to_string(), Value::from(format!("user{i}"))),
                ("score".to_string(), Value::Int((i * 7) as i64)),
            ]
        })
        .collect()
}

fn bench_compile_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile/select");

    for n in [1, 5, 10, 50, 100] {
        let model = build_select(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &model, |b, model| {
            b.iter(|| black_box(model.compile_select()));
        });
    }

    group.finish();
}

fn bench_build_and_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile/build_and_compile");

    for n in [1, 5, 10, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(build_select(n).compile_select()));
        });
    }

    group.finish();
}

fn bench_batch_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile/batch_update");

    for n in [10, 100, 1000] {
        let rows = batch_rows(n);
        let ids: Vec<i64> = (0..n as i64).collect();
        let model = qb::table("users").where_in("id", ids);
        group.bench_with_input(BenchmarkId::from_parameter(n), &rows, |b, rows| {
            b.iter(|| black_box(model.compile_batch_update(rows, "id")));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compile_select,
    bench_build_and_compile,
    bench_batch_update
);
criterion_main!(benches);
