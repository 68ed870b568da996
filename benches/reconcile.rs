use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use tether::transcript::{empty_transcript, reconcile, signature_of, TranscriptEntry};
use tether::ui::render_transcript;

// ── Helpers ─────────────────────────────────────────────────────────

fn make_entry(i: usize) -> TranscriptEntry {
    match i % 3 {
        0 => TranscriptEntry::new("user", json!({ "text": format!("User message {i}") }))
            .with_id(format!("e{i}")),
        1 => TranscriptEntry::new(
            "assistant",
            json!({ "content": [{ "type": "text", "text": format!("Response number {i} with some content") }] }),
        )
        .with_id(format!("e{i}"))
        .with_model("opus"),
        // Tool events carry no id, so identity falls back to the signature.
        _ => TranscriptEntry::new(
            "tool",
            json!({ "name": "Write", "input": { "file_path": format!("src/file_{i}.rs") } }),
        )
        .with_created_at(format!("2024-05-01T10:{:02}:00Z", i % 60)),
    }
}

fn make_log(n: usize) -> Vec<TranscriptEntry> {
    (0..n).map(make_entry).collect()
}

// ── Benchmarks ──────────────────────────────────────────────────────

fn bench_signature(c: &mut Criterion) {
    let entry = make_entry(2);
    c.bench_function("signature_of_tool_entry", |b| {
        b.iter(|| signature_of(black_box(&entry)));
    });
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");

    for n in [10, 100, 1000] {
        let log = make_log(n);

        group.bench_function(format!("initial_{n}"), |b| {
            let empty = empty_transcript();
            b.iter(|| reconcile(black_box(&empty), black_box(&log)));
        });

        // The common poll: nothing changed.
        group.bench_function(format!("unchanged_{n}"), |b| {
            let previous = reconcile(&empty_transcript(), &log);
            b.iter(|| reconcile(black_box(&previous), black_box(&log)));
        });

        group.bench_function(format!("one_appended_{n}"), |b| {
            let previous = reconcile(&empty_transcript(), &log);
            let mut grown = log.clone();
            grown.push(make_entry(n));
            b.iter(|| reconcile(black_box(&previous), black_box(&grown)));
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let transcript = reconcile(&empty_transcript(), &make_log(500));
    c.bench_function("render_transcript_500", |b| {
        b.iter(|| render_transcript(black_box(&transcript)));
    });
}

criterion_group!(benches, bench_signature, bench_reconcile, bench_render);
criterion_main!(benches);
