use botsort_rs::{BotSort, BotSortConfig, Detection, Frame, Rect};
use criterion::{criterion_group, criterion_main, Criterion};

const COLS: usize = 640;
const ROWS: usize = 480;
const N_FRAMES: usize = 100;
const N_OBJECTS: usize = 20;

/// Deterministic synthetic stream: objects on circular paths with slowly
/// oscillating confidence, so every association stage gets exercised.
fn synth_frames(with_embeddings: bool) -> Vec<Vec<Detection>> {
    (0..N_FRAMES)
        .map(|frame| {
            (0..N_OBJECTS)
                .map(|obj| {
                    let phase = obj as f32 * 0.7;
                    let t = frame as f32 * 0.05 + phase;
                    let x = 280.0 + 200.0 * t.cos() + 6.0 * obj as f32;
                    let y = 200.0 + 140.0 * t.sin();
                    let conf =
                        0.72 + 0.2 * (frame as f32 * 0.3 + phase).sin();
                    let mut det = Detection::new(
                        Rect::new(x, y, 40.0, 80.0),
                        conf,
                        0,
                    );
                    if with_embeddings {
                        let mut emb = vec![0.0f32; 16];
                        emb[obj % 16] = 1.0;
                        det = det.with_embedding(emb);
                    }
                    det
                })
                .collect()
        })
        .collect()
}

fn run_sequence(frames: &[Vec<Detection>], buf: &[u8]) -> usize {
    let mut tracker = BotSort::new(BotSortConfig::default());
    let mut total = 0;
    for detections in frames {
        let frame = Frame::new(buf, COLS, ROWS).unwrap();
        total += tracker.track(&frame, detections.clone()).len();
    }
    total
}

fn bench_botsort(c: &mut Criterion) {
    let buf = vec![0u8; COLS * ROWS];
    let frames = synth_frames(false);
    let frames_reid = synth_frames(true);

    c.bench_function("botsort_100_frames_20_objects", |b| {
        b.iter(|| run_sequence(&frames, &buf))
    });

    c.bench_function("botsort_100_frames_20_objects_reid", |b| {
        b.iter(|| run_sequence(&frames_reid, &buf))
    });
}

criterion_group!(benches, bench_botsort);
criterion_main!(benches);
