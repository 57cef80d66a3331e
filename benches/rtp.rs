use criterion::{criterion_group, criterion_main, Criterion};
use meridian_core::rtp::jitter::{JitterBuffer, JitterBufferConfig};
use meridian_core::rtp::packet::{PayloadType, RtpHeader, RtpPacket};

fn bench_packet_round_trip(c: &mut Criterion) {
    let payload = vec![0u8; 1400];
    let header = RtpHeader {
        payload_type: PayloadType::VideoH264,
        sequence_number: 1,
        timestamp: 90_000,
        ssrc: 0xCAFEBABE,
        ..Default::default()
    };
    let packet = RtpPacket::new(header, payload);

    c.bench_function("rtp_packet_serialize", |b| {
        b.iter(|| packet.serialize().expect("serialize"))
    });

    let wire = packet.serialize().unwrap();
    c.bench_function("rtp_packet_parse", |b| {
        b.iter(|| RtpPacket::parse(&wire).expect("parse"))
    });
}

fn bench_jitter_buffer(c: &mut Criterion) {
    c.bench_function("jitter_buffer_insert_extract", |b| {
        b.iter(|| {
            let mut jb = JitterBuffer::new(JitterBufferConfig {
                buffer_ms: 0,
                max_packets: 100,
            });
            for ts in 0..32u32 {
                let packet = RtpPacket::new(
                    RtpHeader {
                        payload_type: PayloadType::VideoH264,
                        sequence_number: ts as u16,
                        timestamp: ts,
                        ssrc: 1,
                        ..Default::default()
                    },
                    vec![0u8; 1400],
                );
                jb.insert_packet(packet);
            }
            while jb.try_extract_frame().is_some() {}
        })
    });
}

criterion_group!(benches, bench_packet_round_trip, bench_jitter_buffer);
criterion_main!(benches);
