use criterion::{Criterion, Throughput};
use ethmqtt::network::application::mqtt::packet::{
    QoS, assemble_publish, decode_remaining_length, encode_remaining_length, parse_publish,
};
use std::hint::black_box;

const TOPIC: &str = "ethmqtt/bench/temperature";

pub fn bench_assemble_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    let message = [b'x'; 128];
    group.throughput(Throughput::Bytes(message.len() as u64));
    group.bench_function("publish_qos0", |b| {
        b.iter(|| assemble_publish(black_box(TOPIC), 0, QoS::AtMostOnce, black_box(&message)))
    });
    group.bench_function("publish_qos1", |b| {
        b.iter(|| assemble_publish(black_box(TOPIC), 18, QoS::AtLeastOnce, black_box(&message)))
    });
    group.finish();
}

pub fn bench_parse_publish(c: &mut Criterion) {
    let message = [b'y'; 200];
    let packet = assemble_publish(TOPIC, 7, QoS::AtLeastOnce, &message).expect("publish fits");
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(packet.len() as u64));
    group.bench_function("publish", |b| b.iter(|| parse_publish(black_box(&packet))));
    group.finish();
}

pub fn bench_remaining_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("remaining_length");
    let mut out = [0u8; 4];
    group.bench_function("encode", |b| {
        b.iter(|| encode_remaining_length(black_box(268_435_455), &mut out))
    });
    let encoded = [0xFF, 0xFF, 0xFF, 0x7F];
    group.bench_function("decode", |b| b.iter(|| decode_remaining_length(black_box(&encoded))));
    group.finish();
}
