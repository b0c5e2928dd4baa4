//! Dispatch throughput benchmarks.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use modmap_ipc::prelude::*;
use modmap_wire::MessageBuffer;

fn request_batch(size: usize) -> Vec<u8> {
    let mut batch = MessageBuffer::new();
    batch.begin_line();
    Request::Hello {
        version: PROTOCOL_VERSION,
        agent: "BENCH".to_string(),
        ident: "bench".to_string(),
    }
    .encode(&mut batch);
    for n in 0..size {
        batch.begin_line();
        Request::ModuleImport {
            module: format!("mod{n}:part"),
        }
        .encode(&mut batch);
    }
    batch.prepare_to_write();
    batch.take_bytes()
}

fn bench_parse_and_dispatch(c: &mut Criterion) {
    let batch = request_batch(64);

    c.bench_function("dispatch_64_imports", |b| {
        b.iter(|| {
            let mut server = MapperServer::new();
            let mut resolver = FileResolver::default();
            server
                .accept_batch(batch.clone())
                .expect("batch loads");
            let _ = server.parse_requests(&mut resolver);
            server.prepare_to_write();
            black_box(server.take_response_batch());
        })
    });
}

fn bench_lex_batch(c: &mut Criterion) {
    let batch = request_batch(64);

    c.bench_function("lex_64_lines", |b| {
        b.iter(|| {
            let mut buf = MessageBuffer::new();
            buf.load_batch(batch.clone()).expect("complete batch");
            while let Some(line) = buf.lex() {
                black_box(line.expect("well-formed"));
            }
        })
    });
}

fn bench_quote_hostile_word(c: &mut Criterion) {
    let word = "a b\tc\nd'e\\f\u{1}g".repeat(8);

    c.bench_function("quote_hostile_word", |b| {
        b.iter(|| {
            let mut buf = MessageBuffer::new();
            buf.begin_line();
            buf.append_word(black_box(&word));
            buf.prepare_to_write();
            black_box(buf.take_bytes());
        })
    });
}

criterion_group!(
    benches,
    bench_parse_and_dispatch,
    bench_lex_batch,
    bench_quote_hostile_word
);
criterion_main!(benches);
