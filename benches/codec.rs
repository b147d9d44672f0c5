//! Wire codec benchmark suite.
//!
//! Measures request encoding and response decoding for typical record sizes:
//! - Encode: single-object read, 32-object subscription
//! - Decode: notification push, 200-object hardware answer
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;

use intellicenter::protocol::WireCodec;
use intellicenter::{Attribute, MessageId, Request, RequestObject};

// ============================================================================
// Fixtures
// ============================================================================

fn read_request(objects: usize) -> Request {
    let mut request = Request::request_param_list(
        (0..objects)
            .map(|i| {
                RequestObject::read(
                    format!("C{i:04}"),
                    [Attribute::Status, Attribute::Sname, Attribute::Objtyp],
                )
            })
            .collect(),
    );
    request.message_id = Some(MessageId::generate());
    request
}

fn answer_line(objects: usize) -> Vec<u8> {
    let list: Vec<_> = (0..objects)
        .map(|i| {
            json!({
                "objnam": format!("C{i:04}"),
                "params": {
                    "STATUS": if i % 2 == 0 { "ON" } else { "OFF" },
                    "SNAME": format!("Circuit {i}"),
                    "OBJTYP": "CIRCUIT",
                    "SUBTYP": "GENERIC",
                    "LISTORD": i.to_string()
                }
            })
        })
        .collect();

    let mut line = serde_json::to_vec(&json!({
        "messageID": "0d3c9f5e-7b55-4a4e-9a53-7f1b8f0f4c11",
        "command": "SendQuery",
        "response": "200",
        "answer": list
    }))
    .expect("fixture");
    line.push(b'\n');
    line
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let codec = WireCodec::default();
    let mut group = c.benchmark_group("encode");

    for &objects in &[1usize, 32] {
        let request = read_request(objects);
        group.bench_with_input(BenchmarkId::new("objects", objects), &request, |b, r| {
            b.iter(|| codec.encode(black_box(r)).expect("encode"));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let codec = WireCodec::default();
    let mut group = c.benchmark_group("decode");

    let push = br#"{"command":"NotifyList","objectList":[{"objnam":"C0001","params":{"STATUS":"ON"}}]}
"#
    .to_vec();
    group.throughput(Throughput::Bytes(push.len() as u64));
    group.bench_function("notify", |b| {
        b.iter(|| codec.decode_line(black_box(&push)).expect("decode"));
    });

    let answer = answer_line(200);
    group.throughput(Throughput::Bytes(answer.len() as u64));
    group.bench_function("answer_200", |b| {
        b.iter(|| codec.decode_line(black_box(&answer)).expect("decode"));
    });

    group.finish();
}

// ============================================================================
// Main
// ============================================================================

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
