use botsort_rs::{
    BotSort, BotSortConfig, Detection, FeatureExtractor, Frame, Rect, Track,
    TrackError,
};
use std::collections::HashSet;

const COLS: usize = 640;
const ROWS: usize = 480;

fn det(x: f32, y: f32, w: f32, h: f32, conf: f32) -> Detection {
    Detection::new(Rect::new(x, y, w, h), conf, 0)
}

fn run_frame(
    tracker: &mut BotSort,
    buf: &[u8],
    detections: Vec<Detection>,
) -> Vec<Track> {
    let frame = Frame::new(buf, COLS, ROWS).unwrap();
    let out = tracker.track(&frame, detections);
    assert_pools_disjoint(tracker);
    out
}

/// The tracked, lost and removed pools must never share a track id.
fn assert_pools_disjoint(tracker: &BotSort) {
    let tracked: HashSet<usize> =
        tracker.tracked_track_ids().into_iter().collect();
    let lost: HashSet<usize> = tracker.lost_track_ids().into_iter().collect();
    let removed: HashSet<usize> =
        tracker.removed_track_ids().into_iter().collect();

    assert!(tracked.is_disjoint(&lost), "tracked and lost overlap");
    assert!(tracked.is_disjoint(&removed), "tracked and removed overlap");
    assert!(lost.is_disjoint(&removed), "lost and removed overlap");
}

/*----------------------------------------------------------------------------
S1: a single steadily moving object keeps one identity
----------------------------------------------------------------------------*/

#[test]
fn test_single_object_keeps_identity() {
    let buf = vec![0u8; COLS * ROWS];
    let mut tracker = BotSort::new(BotSortConfig::default());

    for k in 0..10 {
        let out = run_frame(
            &mut tracker,
            &buf,
            vec![det(100.0 + 10.0 * k as f32, 200.0, 50.0, 100.0, 0.9)],
        );
        assert_eq!(out.len(), 1, "frame {}", k + 1);
        assert_eq!(out[0].get_track_id(), 1);
    }
    assert_eq!(tracker.lost_count(), 0);
}

/*----------------------------------------------------------------------------
S2: occlusion and reappearance re-finds the same identity
----------------------------------------------------------------------------*/

#[test]
fn test_occlusion_reappearance_keeps_id() {
    let buf = vec![0u8; COLS * ROWS];
    let mut tracker = BotSort::new(BotSortConfig::default());

    let det_a = || det(100.0, 100.0, 50.0, 100.0, 0.9);
    let det_b = || det(400.0, 100.0, 50.0, 100.0, 0.9);

    let mut id_b = 0;
    for frame_id in 1..=5 {
        let out = run_frame(&mut tracker, &buf, vec![det_a(), det_b()]);
        assert_eq!(out.len(), 2, "frame {}", frame_id);
        id_b = out
            .iter()
            .find(|t| t.get_rect().x() > 300.0)
            .expect("object B tracked")
            .get_track_id();
    }

    // B disappears; its track must go lost, not removed.
    for frame_id in 6..=20 {
        let out = run_frame(&mut tracker, &buf, vec![det_a()]);
        assert_eq!(out.len(), 1, "frame {}", frame_id);
        assert!(
            tracker.lost_track_ids().contains(&id_b),
            "frame {}: B not in lost pool",
            frame_id
        );
    }

    // B returns at its last known position (it held still while lost).
    let out = run_frame(&mut tracker, &buf, vec![det_a(), det_b()]);
    assert_eq!(out.len(), 2);
    let refound = out
        .iter()
        .find(|t| t.get_rect().x() > 300.0)
        .expect("object B re-found");
    assert_eq!(refound.get_track_id(), id_b);
    assert!(tracker.lost_track_ids().is_empty());
}

/*----------------------------------------------------------------------------
S3: a track lost beyond the retention window is reaped; a late
reappearance spawns a fresh, larger id
----------------------------------------------------------------------------*/

#[test]
fn test_lost_track_reaped_and_new_id_spawned() {
    let buf = vec![0u8; COLS * ROWS];
    let mut tracker = BotSort::new(BotSortConfig::default());
    assert_eq!(tracker.max_time_lost(), 30);

    let det_a = || det(100.0, 100.0, 50.0, 100.0, 0.9);
    let det_b = || det(400.0, 100.0, 50.0, 100.0, 0.9);

    let mut id_b = 0;
    for _ in 1..=5 {
        let out = run_frame(&mut tracker, &buf, vec![det_a(), det_b()]);
        id_b = out
            .iter()
            .find(|t| t.get_rect().x() > 300.0)
            .unwrap()
            .get_track_id();
    }

    for frame_id in 6..=39 {
        run_frame(&mut tracker, &buf, vec![det_a()]);
        if frame_id >= 36 {
            // Last seen on frame 5, buffer 30: reaped once 36 arrives.
            assert!(
                !tracker.lost_track_ids().contains(&id_b),
                "frame {}: B still lost",
                frame_id
            );
            assert!(tracker.removed_track_ids().contains(&id_b));
        }
    }

    let out = run_frame(&mut tracker, &buf, vec![det_a(), det_b()]);
    let new_b = out
        .iter()
        .find(|t| t.get_rect().x() > 300.0)
        .expect("late detection spawns a track");
    assert_ne!(new_b.get_track_id(), id_b);
    // Ids are handed out in activation order.
    assert!(new_b.get_track_id() > id_b);
}

/*----------------------------------------------------------------------------
S4: oscillating confidence is rescued by the second association stage
----------------------------------------------------------------------------*/

#[test]
fn test_low_confidence_rescue() {
    let buf = vec![0u8; COLS * ROWS];
    let mut tracker = BotSort::new(BotSortConfig::default());

    let mut seen_ids = HashSet::new();
    for k in 0..10 {
        let conf = if k % 2 == 0 { 0.9 } else { 0.3 };
        let out = run_frame(
            &mut tracker,
            &buf,
            vec![det(100.0 + 2.0 * k as f32, 200.0, 50.0, 100.0, conf)],
        );
        assert_eq!(out.len(), 1, "frame {}", k + 1);
        assert_eq!(out[0].get_time_since_update(), 0);
        seen_ids.insert(out[0].get_track_id());
    }

    // One identity across the whole sequence, never lost.
    assert_eq!(seen_ids.len(), 1);
    assert_eq!(tracker.lost_count(), 0);
    assert_eq!(tracker.tracked_count(), 1);
}

/*----------------------------------------------------------------------------
S5: a one-shot detection stays unconfirmed and is removed, never reported
----------------------------------------------------------------------------*/

#[test]
fn test_unconfirmed_track_rejected() {
    let buf = vec![0u8; COLS * ROWS];
    let mut tracker = BotSort::new(BotSortConfig::default());

    // Nothing on frame 1 (the very first frame confirms immediately by
    // design, so the one-shot object appears on frame 2).
    let out = run_frame(&mut tracker, &buf, vec![]);
    assert!(out.is_empty());

    let out = run_frame(
        &mut tracker,
        &buf,
        vec![det(100.0, 100.0, 50.0, 100.0, 0.9)],
    );
    assert!(out.is_empty(), "unconfirmed track must not be reported");
    assert_eq!(tracker.tracked_count(), 1);

    // Never matched again: dropped on the next frame.
    let out = run_frame(&mut tracker, &buf, vec![]);
    assert!(out.is_empty());
    assert_eq!(tracker.tracked_count(), 0);
    assert_eq!(tracker.lost_count(), 0);
    assert_eq!(tracker.removed_count(), 1);
}

/*----------------------------------------------------------------------------
S6: crossing objects with stable embeddings keep their identities
----------------------------------------------------------------------------*/

#[test]
fn test_appearance_disambiguates_crossing_objects() {
    let buf = vec![0u8; COLS * ROWS];
    let mut tracker = BotSort::new(BotSortConfig::default());

    let emb_a = vec![1.0, 0.0];
    let emb_b = vec![0.0, 1.0];

    let mut id_a = 0;
    let mut id_b = 0;
    for k in 0..=20 {
        let x_a = 100.0 + 10.0 * k as f32;
        let x_b = 300.0 - 10.0 * k as f32;
        let detections = vec![
            det(x_a, 200.0, 50.0, 100.0, 0.9).with_embedding(emb_a.clone()),
            det(x_b, 210.0, 50.0, 100.0, 0.9).with_embedding(emb_b.clone()),
        ];
        let out = run_frame(&mut tracker, &buf, detections);
        assert_eq!(out.len(), 2, "frame {}", k + 1);

        // Identify the returned tracks by appearance, then check that
        // identity follows appearance through the crossing.
        let track_a = out
            .iter()
            .find(|t| t.get_smooth_feature().unwrap()[0] > 0.7)
            .expect("track with A's appearance");
        let track_b = out
            .iter()
            .find(|t| t.get_smooth_feature().unwrap()[1] > 0.7)
            .expect("track with B's appearance");

        // Smoothed features stay unit-norm.
        for track in &out {
            let norm: f32 = track
                .get_smooth_feature()
                .unwrap()
                .iter()
                .map(|v| v * v)
                .sum::<f32>()
                .sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }

        if k == 0 {
            id_a = track_a.get_track_id();
            id_b = track_b.get_track_id();
            assert_ne!(id_a, id_b);
        } else {
            assert_eq!(track_a.get_track_id(), id_a, "frame {}", k + 1);
            assert_eq!(track_b.get_track_id(), id_b, "frame {}", k + 1);
        }
    }

    // After the cross the tracks sit on the expected sides.
    let out = run_frame(
        &mut tracker,
        &buf,
        vec![
            det(310.0, 200.0, 50.0, 100.0, 0.9).with_embedding(emb_a.clone()),
            det(90.0, 210.0, 50.0, 100.0, 0.9).with_embedding(emb_b.clone()),
        ],
    );
    let track_a = out
        .iter()
        .find(|t| t.get_track_id() == id_a)
        .expect("A alive");
    assert!(track_a.get_rect().x() > 250.0);
}

#[test]
fn test_crossing_without_reid_keeps_two_tracks() {
    let buf = vec![0u8; COLS * ROWS];
    let mut tracker = BotSort::new(BotSortConfig::default());

    let mut initial_ids = HashSet::new();
    for k in 0..=20 {
        let x_a = 100.0 + 10.0 * k as f32;
        let x_b = 300.0 - 10.0 * k as f32;
        let out = run_frame(
            &mut tracker,
            &buf,
            vec![
                det(x_a, 200.0, 50.0, 100.0, 0.9),
                det(x_b, 210.0, 50.0, 100.0, 0.9),
            ],
        );
        assert_eq!(out.len(), 2, "frame {}", k + 1);
        if k == 0 {
            initial_ids =
                out.iter().map(|t| t.get_track_id()).collect();
        } else {
            // Ids may swap through the crossing without appearance cues,
            // but no identities may be dropped or invented.
            let ids: HashSet<usize> =
                out.iter().map(|t| t.get_track_id()).collect();
            assert_eq!(ids, initial_ids, "frame {}", k + 1);
        }
    }
}

/*----------------------------------------------------------------------------
Identity monotonicity across many spawns
----------------------------------------------------------------------------*/

#[test]
fn test_track_ids_increase_in_activation_order() {
    let buf = vec![0u8; COLS * ROWS];
    let mut tracker = BotSort::new(BotSortConfig::default());

    let mut last_new_id = 0;
    for wave in 0..4 {
        // A fresh object appears in an empty corner every five frames and
        // the previous ones keep moving.
        for _ in 0..5 {
            let detections: Vec<Detection> = (0..=wave)
                .map(|i| {
                    det(50.0 + 140.0 * i as f32, 50.0, 40.0, 80.0, 0.9)
                })
                .collect();
            let out = run_frame(&mut tracker, &buf, detections);
            for track in &out {
                if track.get_start_frame_id() == tracker.get_frame_id() {
                    assert!(track.get_track_id() > last_new_id);
                }
                last_new_id = last_new_id.max(track.get_track_id());
            }
        }
    }
    assert_eq!(tracker.tracked_count(), 4);
    let ids = tracker.tracked_track_ids();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2, 3, 4]);
}

/*----------------------------------------------------------------------------
Feature extractor plumbing and failure degradation
----------------------------------------------------------------------------*/

struct ConstantExtractor;

impl FeatureExtractor for ConstantExtractor {
    fn extract(
        &mut self,
        _frame: &Frame<'_>,
        bbox_tlwh: &Rect<f32>,
    ) -> Result<Vec<f32>, TrackError> {
        // Two well-separated appearance clusters keyed off position.
        if bbox_tlwh.x() < 320.0 {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }
}

struct FailingExtractor;

impl FeatureExtractor for FailingExtractor {
    fn extract(
        &mut self,
        _frame: &Frame<'_>,
        _bbox_tlwh: &Rect<f32>,
    ) -> Result<Vec<f32>, TrackError> {
        Err(TrackError::BackendFailure("model unavailable".into()))
    }
}

#[test]
fn test_extractor_populates_track_features() {
    let buf = vec![0u8; COLS * ROWS];
    let mut tracker = BotSort::new(BotSortConfig::default())
        .with_extractor(Box::new(ConstantExtractor));

    for k in 0..3 {
        let out = run_frame(
            &mut tracker,
            &buf,
            vec![det(100.0 + 5.0 * k as f32, 200.0, 50.0, 100.0, 0.9)],
        );
        assert_eq!(out.len(), 1);
    }
    let out = run_frame(
        &mut tracker,
        &buf,
        vec![det(115.0, 200.0, 50.0, 100.0, 0.9)],
    );
    let feat = out[0].get_smooth_feature().expect("feature attached");
    assert!(feat[0] > 0.99);
}

#[test]
fn test_extractor_failure_degrades_to_iou_only() {
    let buf = vec![0u8; COLS * ROWS];
    let mut tracker = BotSort::new(BotSortConfig::default())
        .with_extractor(Box::new(FailingExtractor));

    for k in 0..5 {
        let out = run_frame(
            &mut tracker,
            &buf,
            vec![det(100.0 + 5.0 * k as f32, 200.0, 50.0, 100.0, 0.9)],
        );
        assert_eq!(out.len(), 1, "frame {}", k + 1);
        assert_eq!(out[0].get_track_id(), 1);
        assert!(out[0].get_smooth_feature().is_none());
    }
    assert_eq!(tracker.diagnostics().backend_failure, 5);
}

/*----------------------------------------------------------------------------
Mixed embedding dimensions are rejected at the boundary
----------------------------------------------------------------------------*/

#[test]
fn test_embedding_dimension_mismatch_is_counted() {
    let buf = vec![0u8; COLS * ROWS];
    let mut tracker = BotSort::new(BotSortConfig::default());

    let out = run_frame(
        &mut tracker,
        &buf,
        vec![det(100.0, 200.0, 50.0, 100.0, 0.9)
            .with_embedding(vec![1.0, 0.0, 0.0, 0.0])],
    );
    assert_eq!(out.len(), 1);

    // Wrong dimension on the next frame: detection is dropped, the track
    // goes unmatched instead of crashing.
    let out = run_frame(
        &mut tracker,
        &buf,
        vec![det(100.0, 200.0, 50.0, 100.0, 0.9).with_embedding(vec![1.0])],
    );
    assert!(out.is_empty());
    assert_eq!(tracker.diagnostics().invalid_input, 1);
}
