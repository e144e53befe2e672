//! Throughput Benchmark for respd
//!
//! This benchmark measures the codec and the dispatch path without any
//! network I/O.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use respd::commands::{dispatch, BuiltinHandler};
use respd::protocol::{encode, encode_into, RespParser, RespValue};

fn command(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = BytesMut::new();
    let value = RespValue::array(
        parts
            .iter()
            .map(|p| RespValue::bulk_string(Bytes::copy_from_slice(p)))
            .collect(),
    );
    encode_into(&value, &mut out).unwrap();
    out.to_vec()
}

/// Benchmark parsing complete messages
fn bench_parse(c: &mut Criterion) {
    let parser = RespParser::new();

    let ping = command(&[b"PING"]);
    let set = command(&[b"SET", b"key:1234", b"small_value"]);
    let large = command(&[b"SET", b"key", &vec![b'x'; 64 * 1024]]);

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("ping", |b| {
        b.iter(|| black_box(parser.parse(black_box(&ping)).unwrap()));
    });

    group.bench_function("set_small", |b| {
        b.iter(|| black_box(parser.parse(black_box(&set)).unwrap()));
    });

    group.throughput(Throughput::Bytes(large.len() as u64));
    group.bench_function("set_64kb", |b| {
        b.iter(|| black_box(parser.parse(black_box(&large)).unwrap()));
    });

    group.finish();
}

/// Benchmark a pipeline of 100 requests in one buffer
fn bench_pipeline(c: &mut Criterion) {
    let parser = RespParser::new();
    let one = command(&[b"GET", b"key:1234"]);
    let batch: Vec<u8> = one.iter().copied().cycle().take(one.len() * 100).collect();

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(100));

    group.bench_function("parse_100", |b| {
        b.iter(|| {
            let mut pos = 0;
            while let Some((value, consumed)) = parser.parse(&batch[pos..]).unwrap() {
                black_box(value);
                pos += consumed;
            }
        });
    });

    group.finish();
}

/// Benchmark encoding replies
fn bench_encode(c: &mut Criterion) {
    let pong = RespValue::pong();
    let bulk = RespValue::bulk_string(Bytes::from("x".repeat(1024)));
    let nested = RespValue::array(
        (0..100)
            .map(|i| RespValue::array(vec![RespValue::integer(i), RespValue::bulk_string(Bytes::from("v"))]))
            .collect(),
    );

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("pong", |b| {
        b.iter(|| black_box(encode(black_box(&pong)).unwrap()));
    });

    group.bench_function("bulk_1kb", |b| {
        b.iter(|| black_box(encode(black_box(&bulk)).unwrap()));
    });

    group.bench_function("nested_array_reuse_buffer", |b| {
        let mut buf = BytesMut::with_capacity(4096);
        b.iter(|| {
            buf.clear();
            encode_into(black_box(&nested), &mut buf).unwrap();
            black_box(buf.len());
        });
    });

    group.finish();
}

/// Benchmark the full request path: parse, dispatch, encode
fn bench_round_trip(c: &mut Criterion) {
    let parser = RespParser::new();
    let handler = BuiltinHandler::new();
    let echo = command(&[b"ECHO", b"hello world"]);

    let mut group = c.benchmark_group("round_trip");
    group.throughput(Throughput::Elements(1));

    group.bench_function("echo", |b| {
        let mut out = BytesMut::with_capacity(64);
        b.iter(|| {
            let (request, _) = parser.parse(&echo).unwrap().unwrap();
            let reply = dispatch(&handler, request);
            out.clear();
            encode_into(&reply, &mut out).unwrap();
            black_box(out.len());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_pipeline,
    bench_encode,
    bench_round_trip,
);

criterion_main!(benches);
