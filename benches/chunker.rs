use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use fake_stream_rs::config::ChunkUnit;
use fake_stream_rs::protocol::{ChunkDelta, SseChunk};
use fake_stream_rs::stream::chunk_text;
use fake_stream_rs::stream::sse::chunk_frame;

fn sample_completion(paragraphs: usize) -> String {
    let paragraph = "Streaming emulation splits a finished answer into small pieces. \
         Each piece is framed as a chat.completion.chunk and paced so clients \
         render it progressively: 日本語のテキストも含まれます 🎉.\n\n";
    paragraph.repeat(paragraphs)
}

fn bench_chunk_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_text");
    for paragraphs in [1_usize, 16, 256] {
        let text = sample_completion(paragraphs);
        group.bench_with_input(BenchmarkId::new("words_8", paragraphs), &text, |b, text| {
            b.iter(|| chunk_text(black_box(text), ChunkUnit::Words, 8).len());
        });
        group.bench_with_input(BenchmarkId::new("chars_32", paragraphs), &text, |b, text| {
            b.iter(|| chunk_text(black_box(text), ChunkUnit::Chars, 32).len());
        });
    }
    group.finish();
}

fn bench_chunk_frames(c: &mut Criterion) {
    let text = sample_completion(16);
    let fragments = chunk_text(&text, ChunkUnit::Words, 8);
    c.bench_function("encode_chunk_frames", |b| {
        b.iter(|| {
            let mut bytes = 0;
            for (position, fragment) in fragments.iter().enumerate() {
                let delta = ChunkDelta {
                    role: (position == 0).then(|| "assistant".to_owned()),
                    content: Some((*fragment).to_owned()),
                    tool_calls: None,
                };
                let chunk = SseChunk::content("chatcmpl-bench", 1, "gpt-4o-mini", delta);
                bytes += chunk_frame(black_box(&chunk)).map_or(0, |frame| frame.len());
            }
            bytes
        });
    });
}

criterion_group!(benches, bench_chunk_text, bench_chunk_frames);
criterion_main!(benches);
