//! Benchmarks for Alopex Columnar components.
//!
//! Run with: cargo bench --package alopex-columnar
//!
//! ## Benchmark Categories
//!
//! - **CSV Reading**: Type detection and parallel chunked reads
//! - **Column Views**: Row index materialization
//! - **Row Binding**: Concatenating columns of mixed types

use alopex_columnar::fread::ReadOptions;
use alopex_columnar::{fread, Column, FixedWidthColumn, RowIndex};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fmt::Write as _;

/// Generate a table with integer, float, string and boolean columns.
fn generate_csv(rows: usize) -> String {
    let mut out = String::from("id,value,label,flag\n");
    for i in 0..rows {
        let value = (i as f64 * 0.1).sin() * 100.0;
        writeln!(out, "{i},{value:.4},item_{},{}", i % 97, i % 2 == 0).unwrap();
    }
    out
}

fn bench_fread_threads(c: &mut Criterion) {
    let input = generate_csv(200_000);
    let mut group = c.benchmark_group("fread_200k");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.sample_size(20);

    for nthreads in [1usize, 2, 4, 8] {
        let opts = ReadOptions {
            nthreads: Some(nthreads),
            ..ReadOptions::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(nthreads), &opts, |b, opts| {
            b.iter(|| fread(black_box(input.as_bytes()), opts).unwrap())
        });
    }
    group.finish();
}

fn bench_fread_type_bump(c: &mut Criterion) {
    // Row 150 lies between the first two sampling points, so the float in the
    // id column is only found by the parallel pass.
    let input = generate_csv(100_000).replacen("\n150,", "\n1.5,", 1);

    c.bench_function("fread_100k_with_reread", |b| {
        b.iter(|| fread(black_box(input.as_bytes()), &ReadOptions::default()).unwrap())
    });
}

fn bench_reify(c: &mut Criterion) {
    let values: Vec<i64> = (0..1_000_000).collect();
    let mut group = c.benchmark_group("reify_1m");

    group.bench_function("strided_slice", |b| {
        b.iter_batched(
            || {
                let mut col = FixedWidthColumn::<i64>::from_values(&values);
                col.apply_row_index(RowIndex::slice(1, 3, 300_000)).unwrap();
                col
            },
            |mut col| col.reify().unwrap(),
            criterion::BatchSize::LargeInput,
        )
    });

    group.bench_function("index_array", |b| {
        let indices: Vec<i64> = (0..500_000).map(|i| (i * 7919) % 1_000_000).collect();
        b.iter_batched(
            || {
                let mut col = FixedWidthColumn::<i64>::from_values(&values);
                col.apply_row_index(RowIndex::from_indices(indices.clone()))
                    .unwrap();
                col
            },
            |mut col| col.reify().unwrap(),
            criterion::BatchSize::LargeInput,
        )
    });
    group.finish();
}

fn bench_rbind(c: &mut Criterion) {
    let ints: Vec<i32> = (0..100_000).collect();
    let floats: Vec<f64> = (0..100_000).map(|i| i as f64 * 0.5).collect();

    c.bench_function("rbind_int_void_float_300k", |b| {
        b.iter_batched(
            || {
                let head: Column = FixedWidthColumn::<i32>::from_values(&ints).into();
                let tail: Column = FixedWidthColumn::<f64>::from_values(&floats).into();
                (head, vec![Column::Void(100_000), tail])
            },
            |(head, rest)| Column::rbind(head, rest).unwrap(),
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_fread_threads,
    bench_fread_type_bump,
    bench_reify,
    bench_rbind
);
criterion_main!(benches);
