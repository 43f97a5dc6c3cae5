//! Codec micro-benchmarks
//!
//! Measures encoding and decoding of result batch frames in both wire
//! encodings. No server required.
//!
//! Run with: cargo bench --bench codec_benchmarks

use arrow_array::{ArrayRef, Float64Array, Int64Array, StringArray};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mapd_connector::protocol::{decode_response, encode_response, Protocol, Response};
use mapd_connector::stream::{DataType, Field, RecordBatch, Schema};
use std::sync::Arc;

fn batch_response(rows: usize) -> Response {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, true),
        Field::new("origin_lat", DataType::Float64, true),
        Field::new("origin_city", DataType::Utf8, true),
    ]));
    let ids = (0..rows as i64)
        .map(|i| if i % 17 == 0 { None } else { Some(i * 31) })
        .collect::<Int64Array>();
    let lats = (0..rows)
        .map(|i| Some(32.0 + i as f64 / 1000.0))
        .collect::<Float64Array>();
    let cities = (0..rows)
        .map(|i| Some(format!("city_{}", i % 50)))
        .collect::<StringArray>();
    let columns: Vec<ArrayRef> = vec![Arc::new(ids), Arc::new(lats), Arc::new(cities)];
    Response::Batch(RecordBatch::try_new(schema, columns).expect("valid batch"))
}

fn encode_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_batch");

    for rows in [100usize, 10_000] {
        let response = batch_response(rows);
        group.throughput(Throughput::Elements(rows as u64));
        for protocol in [Protocol::Binary, Protocol::Compact] {
            group.bench_with_input(
                BenchmarkId::new(protocol.to_string(), rows),
                &response,
                |b, response| b.iter(|| encode_response(black_box(response), protocol)),
            );
        }
    }

    group.finish();
}

fn decode_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_batch");

    for rows in [100usize, 10_000] {
        let response = batch_response(rows);
        for protocol in [Protocol::Binary, Protocol::Compact] {
            let frame = encode_response(&response, protocol).expect("encodable batch");
            group.throughput(Throughput::Bytes(frame.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(protocol.to_string(), rows),
                &frame,
                |b, frame| b.iter(|| decode_response(black_box(frame), protocol)),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, encode_benchmarks, decode_benchmarks);
criterion_main!(benches);
