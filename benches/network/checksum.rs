use criterion::{BenchmarkId, Criterion, Throughput};
use ethmqtt::network::MAX_FRAME_SIZE;
use ethmqtt::network::checksum::checksum;
use ethmqtt::network::ethernet::MacAddress;
use ethmqtt::network::ipv4::Ipv4Address;
use ethmqtt::network::tcp::flags::{ACK, PSH};
use ethmqtt::network::tcp::{self, SegmentSpec, Socket, write_segment};
use std::hint::black_box;

pub fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    for size in [20usize, 64, 512, 1460] {
        let data: Vec<u8> = (0..size).map(|i| (i * 31) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| checksum(black_box(data)))
        });
    }
    group.finish();
}

pub fn bench_write_segment(c: &mut Criterion) {
    let node = Socket {
        ip: Ipv4Address::new(192, 168, 2, 101),
        mac: MacAddress::new(0x02, 0x03, 0x04, 0x05, 0x06, 0x65),
        port: 50_152,
    };
    let broker = Socket {
        ip: Ipv4Address::new(192, 168, 2, 1),
        mac: MacAddress::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55),
        port: 1883,
    };
    let payload = [0x5Au8; 256];
    let spec = SegmentSpec {
        local: &node,
        remote: &broker,
        flags: PSH | ACK,
        seq: 1000,
        ack: 5000,
        options: &[],
    };
    let mut frame = [0u8; MAX_FRAME_SIZE];

    let mut group = c.benchmark_group("tcp");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("write_segment", |b| {
        b.iter(|| write_segment(black_box(&mut frame), &spec, black_box(&payload)))
    });
    let len = write_segment(&mut frame, &spec, &payload).expect("segment fits");
    group.bench_function("is_tcp", |b| b.iter(|| tcp::is_tcp(black_box(&frame[..len]))));
    group.finish();
}
