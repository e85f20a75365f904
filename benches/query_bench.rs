//! Benchmarks for the objselect query engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use objselect::config::InputConfig;
use objselect::query::{parse_query, QueryExecutor};
use objselect::source::{CsvRowSource, MemoryRowSource};

fn create_test_rows(count: usize) -> Vec<Vec<String>> {
    (0..count)
        .map(|i| {
            vec![
                i.to_string(),
                format!("name{}", i % 17),
                format!("{}.{}", i % 100, i % 7),
                format!("2024-01-{:02}T10:{:02}:00Z", i % 28 + 1, i % 60),
            ]
        })
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    let queries = [
        ("simple", "select _1, _2 from stdin"),
        (
            "filtered",
            "select _1, upper(_2) from s3object where int(_1) between 10 and 500 and _2 like 'name1%'",
        ),
        (
            "aggregate",
            "select count(*), sum(int(_1)), avg(float(_3)), max(to_timestamp(_4)) from stdin",
        ),
    ];

    for (name, query) in queries {
        group.bench_function(name, |b| b.iter(|| parse_query(black_box(query)).unwrap()));
    }

    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");

    for size in [1000, 10000] {
        let rows = create_test_rows(size);
        group.throughput(Throughput::Elements(size as u64));

        let streaming = QueryExecutor::prepare(
            "select _1, _2 || '-' || _3 from stdin where int(_1) % 3 = 0 and _2 like 'name1%'",
        )
        .unwrap();
        group.bench_function(format!("streaming_{}", size), |b| {
            b.iter(|| {
                let mut source = MemoryRowSource::from_rows(rows.clone());
                streaming.execute(black_box(&mut source)).unwrap()
            })
        });

        let aggregate = QueryExecutor::prepare(
            "select count(*), sum(int(_1)), avg(float(_3)), \
             max(extract(day from to_timestamp(_4))) from stdin",
        )
        .unwrap();
        group.bench_function(format!("aggregate_{}", size), |b| {
            b.iter(|| {
                let mut source = MemoryRowSource::from_rows(rows.clone());
                aggregate.execute(black_box(&mut source)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_csv(c: &mut Criterion) {
    let mut group = c.benchmark_group("csv");

    let text: String = create_test_rows(10000)
        .into_iter()
        .map(|row| row.join(",") + "\n")
        .collect();
    group.throughput(Throughput::Bytes(text.len() as u64));

    let executor = QueryExecutor::prepare("select count(*) from stdin where _2 = 'name3'").unwrap();
    group.bench_function("count_10000", |b| {
        b.iter(|| {
            let mut source =
                CsvRowSource::from_reader(text.as_bytes(), &InputConfig::default()).unwrap();
            executor.execute(black_box(&mut source)).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_execute, bench_csv);
criterion_main!(benches);
