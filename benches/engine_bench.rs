//! Benchmarks for the cube engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use cubedag::cell::{MultitypeCell, MultitypeColumn};
use cubedag::config::Config;
use cubedag::dag::{CubeQuery, DagBuilder, QueryOption};
use cubedag::engine::CubeEngine;
use cubedag::filter::Filter;
use cubedag::measure::{Aggregation, Combination, Measure, MeasureForest};
use cubedag::slice::{GroupBy, Slice};
use cubedag::table::InMemoryTable;
use cubedag::value::Value;
use std::sync::Arc;

const COLORS: [&str; 4] = ["red", "blue", "green", "yellow"];
const COUNTRIES: [&str; 3] = ["FR", "US", "DE"];

fn create_table(count: usize) -> InMemoryTable {
    let rows = (0..count).map(|i| {
        vec![
            ("color", Value::text(COLORS[i % COLORS.len()])),
            ("country", Value::text(COUNTRIES[i % COUNTRIES.len()])),
            ("amount", Value::Long(i as i64)),
            ("price", Value::Double(i as f64 * 0.5)),
        ]
    });
    InMemoryTable::from_rows("bench", rows)
}

fn create_forest() -> MeasureForest {
    MeasureForest::builder("bench")
        .measure(Measure::aggregator("amount", "amount", Aggregation::Sum))
        .measure(Measure::aggregator("price", "price", Aggregation::Sum))
        .measure(Measure::aggregator("rows", "*", Aggregation::Count))
        .measure(Measure::combinator("total", ["amount", "price"], Combination::Sum))
        .measure(Measure::combinator("avg_price", ["price", "rows"], Combination::Divide))
        .measure(Measure::filtrator("amount_fr", "amount", Filter::equals("country", "FR")))
        .measure(Measure::unfiltrator("amount_all", "amount", ["country"]))
        .measure(Measure::combinator("share", ["amount", "amount_all"], Combination::Divide))
        .measure(Measure::bucketor(
            "max_per_country",
            "amount",
            GroupBy::of(["country"]),
            Aggregation::Max,
        ))
        .build()
        .unwrap()
}

fn bench_cells(c: &mut Criterion) {
    let mut group = c.benchmark_group("cells");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("cell_long_sum_1000", |b| {
        b.iter(|| {
            let mut cell = MultitypeCell::new(Aggregation::Sum);
            for i in 0..1000 {
                cell.ingest_long(black_box(i));
            }
            cell.to_value()
        })
    });

    group.bench_function("cell_mixed_sum_1000", |b| {
        b.iter(|| {
            let mut cell = MultitypeCell::new(Aggregation::Sum);
            for i in 0..1000 {
                if i % 2 == 0 {
                    cell.ingest_long(black_box(i));
                } else {
                    cell.ingest_double(black_box(i as f64));
                }
            }
            cell.to_value()
        })
    });

    group.bench_function("column_avg_1000", |b| {
        let slices: Vec<Slice> = COLORS.iter().map(|c| Slice::of([("color", *c)])).collect();
        b.iter(|| {
            let mut column = MultitypeColumn::new(Aggregation::Avg);
            for i in 0..1000 {
                column.merge_raw(slices[i % slices.len()].clone(), Value::Long(i as i64));
            }
            column.finish()
        })
    });

    group.finish();
}

fn bench_dag(c: &mut Criterion) {
    let forest = create_forest();
    let query = CubeQuery::builder()
        .measures(["total", "avg_price", "amount_fr", "share", "max_per_country"])
        .group_by(GroupBy::of(["color"]))
        .build();

    c.bench_function("dag_build", |b| {
        b.iter(|| DagBuilder::build(black_box(&forest), black_box(&query)).unwrap())
    });
}

fn bench_engine(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let forest = Arc::new(create_forest());

    let mut group = c.benchmark_group("engine");

    for size in [1_000, 10_000] {
        let engine = CubeEngine::new(forest.clone(), Arc::new(create_table(size)), &Config::default());
        let query = CubeQuery::builder()
            .measures(["total", "avg_price", "amount_fr", "share", "max_per_country"])
            .group_by(GroupBy::of(["color"]))
            .option(QueryOption::NoCache)
            .build();
        let sequential = CubeQuery::builder()
            .measures(["total", "avg_price", "amount_fr", "share", "max_per_country"])
            .group_by(GroupBy::of(["color"]))
            .option(QueryOption::NoCache)
            .option(QueryOption::Sequential)
            .build();

        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("execute_{}", size), |b| {
            b.to_async(&rt).iter(|| async { engine.execute(&query).await.unwrap() })
        });

        group.bench_function(format!("execute_sequential_{}", size), |b| {
            b.to_async(&rt).iter(|| async { engine.execute(&sequential).await.unwrap() })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cells, bench_dag, bench_engine);
criterion_main!(benches);
