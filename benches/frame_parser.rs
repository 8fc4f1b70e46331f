use air4::core::frame_parser::{Frame, StreamFrameParser};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

fn make_stream(frames: usize, token: &str) -> Vec<u8> {
    let mut wire = Vec::new();
    for i in 0..frames {
        wire.extend_from_slice(format!("data: {token}{i} \n\n").as_bytes());
        if i % 50 == 0 {
            // keep-alive comment, skipped by the parser
            wire.extend_from_slice(b": ping\n\n");
        }
    }
    wire.extend_from_slice(b"data: [DONE]\n\n");
    wire
}

fn parse_in_chunks(wire: &[u8], chunk_size: usize) -> usize {
    let mut parser = StreamFrameParser::new();
    let mut content = 0;
    for chunk in wire.chunks(chunk_size) {
        for frame in parser.push(chunk) {
            if let Frame::Content(text) = frame {
                content += text.len();
            }
        }
    }
    parser.finish();
    content
}

fn bench_frame_parser(c: &mut Criterion) {
    let token = "Привет, wörld ";

    for &frames in &[1_000usize, 10_000usize] {
        let wire = make_stream(frames, token);

        let mut group = c.benchmark_group(format!("frame_parser_frames{frames}"));
        group.throughput(Throughput::Bytes(wire.len() as u64));

        // 1 byte is the worst case: every delimiter straddles a boundary.
        for &chunk_size in &[1usize, 7, 64, 4096] {
            group.bench_with_input(
                BenchmarkId::new("chunk", chunk_size),
                &chunk_size,
                |b, &chunk_size| b.iter(|| parse_in_chunks(black_box(&wire), chunk_size)),
            );
        }

        group.bench_function("whole", |b| {
            b.iter(|| parse_in_chunks(black_box(&wire), wire.len()))
        });

        group.finish();
    }
}

criterion_group!(benches, bench_frame_parser);
criterion_main!(benches);
