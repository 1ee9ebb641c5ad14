//! # Session Hot Path Benchmark
//!
//! - Metadata writes fanned out to many listeners
//! - Grab frame encode/decode
//!
//! Run with: `cargo bench --package tether_session`

// Benchmarks don't need docs
#![allow(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tether_session::{GrabMessage, MetadataInterest, MetadataStore, RelativeOffset};
use tether_shared::{Handedness, ParticipantId, Quaternion, Vec3, PATH_SENTINEL};

fn bench_metadata_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("metadata_fanout");

    for listeners in [1usize, 16, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, &listeners| {
            let mut store = MetadataStore::new();
            let hits = Arc::new(AtomicU64::new(0));
            for i in 0..listeners {
                let hits = Arc::clone(&hits);
                let interest = if i % 2 == 0 {
                    MetadataInterest::All
                } else {
                    MetadataInterest::Key("Score".to_string())
                };
                store.subscribe(
                    interest,
                    Box::new(move |_| {
                        hits.fetch_add(1, Ordering::Relaxed);
                    }),
                );
            }

            let mut n = 0u32;
            b.iter(|| {
                n = n.wrapping_add(1);
                let owner = ParticipantId((n % 16) as u8);
                black_box(store.write(owner, "Score", &n.to_string()))
            });
        });
    }

    group.finish();
}

fn bench_grab_codec(c: &mut Criterion) {
    let message = GrabMessage {
        participant: ParticipantId(3),
        hand: Handedness::Left,
        path_hint: "Level/Props/Shelf/Crate (12)".to_string(),
        grip_index: 1,
        syncable_id: 42,
        is_grab: true,
        offset: RelativeOffset::new(
            Vec3::new(0.1, -0.05, 0.3),
            Quaternion::from_axis_angle(Vec3::Y, 0.7),
        ),
    };
    let frame = message.encode().unwrap_or_default();

    c.bench_function("grab_encode", |b| {
        b.iter(|| black_box(&message).encode());
    });

    c.bench_function("grab_decode", |b| {
        b.iter(|| GrabMessage::decode(black_box(&frame)));
    });

    let sentinel = GrabMessage {
        path_hint: PATH_SENTINEL.to_string(),
        ..message
    };
    c.bench_function("grab_encode_sentinel", |b| {
        b.iter(|| black_box(&sentinel).encode());
    });
}

criterion_group!(benches, bench_metadata_fanout, bench_grab_codec);
criterion_main!(benches);
