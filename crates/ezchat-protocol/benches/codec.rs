//! Codec benchmarks for ezchat-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ezchat_protocol::{codec, ChatMessage, Chatter, LiveEvent, Outbound, Page};

fn bench_decode_event(c: &mut Criterion) {
    let event = LiveEvent::Message(ChatMessage::new(
        42,
        Chatter::new(7, "ada"),
        "x".repeat(64),
        1_700_000_000_000,
    ));
    let frame = serde_json::to_string(&event).unwrap();

    let mut group = c.benchmark_group("decode_event");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("message_64B", |b| {
        b.iter(|| codec::decode_event(black_box(&frame)))
    });
    group.finish();
}

fn bench_encode_outbound(c: &mut Criterion) {
    let frame = Outbound::message("x".repeat(64));

    c.bench_function("encode_outbound_64B", |b| {
        b.iter(|| codec::encode(black_box(&frame)))
    });
}

fn bench_decode_page(c: &mut Criterion) {
    let messages = (0..25)
        .map(|id| ChatMessage::new(id, Chatter::new(1, "ada"), "hello there", id))
        .collect();
    let body = serde_json::to_string(&Page::new(messages, Some("cursor".into()))).unwrap();

    c.bench_function("decode_page_25", |b| {
        b.iter(|| codec::decode_page(black_box(&body)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_decode_event,
    bench_encode_outbound,
    bench_decode_page
);
criterion_main!(benches);
