use criterion::{criterion_group, criterion_main};

mod network;

criterion_group!(
    benches,
    network::checksum::bench_checksum,
    network::checksum::bench_write_segment,
    network::application::mqtt::packet::bench_assemble_publish,
    network::application::mqtt::packet::bench_parse_publish,
    network::application::mqtt::packet::bench_remaining_length
);
criterion_main!(benches);
