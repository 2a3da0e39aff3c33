//! Cost matrix builders for the association stages.
//!
//! Every matrix is dense, `tracks x detections`, with 0 meaning a perfect
//! match. Empty inputs yield `(n, 0)` / `(0, m)` shapes without allocation
//! of any entries.

use crate::bot_sort::kalman_filter::{
    DetectBox, KalmanFilter, CHI2INV95_2DOF, CHI2INV95_4DOF,
};
use crate::bot_sort::track::Track;
use crate::detection::Detection;
use crate::rect::Rect;
use nalgebra::DMatrix;

/// Pairwise IoU between two rect lists, shape `(a, b)`.
pub fn calc_ious(a_rects: &[Rect<f32>], b_rects: &[Rect<f32>]) -> DMatrix<f32> {
    let mut ious = DMatrix::zeros(a_rects.len(), b_rects.len());
    for (ai, a) in a_rects.iter().enumerate() {
        for (bi, b) in b_rects.iter().enumerate() {
            ious[(ai, bi)] = a.calc_iou(b);
        }
    }
    ious
}

/// `1 - IoU` between track boxes and detection boxes.
pub fn iou_distance(tracks: &[Track], detections: &[Detection]) -> DMatrix<f32> {
    let a_rects: Vec<Rect<f32>> = tracks.iter().map(|t| t.get_rect()).collect();
    let b_rects: Vec<Rect<f32>> =
        detections.iter().map(|d| d.rect.clone()).collect();

    let mut cost_matrix = calc_ious(&a_rects, &b_rects);
    cost_matrix.apply(|v| *v = 1.0 - *v);
    cost_matrix
}

/// `1 - cos(smooth_feat, embedding)` clipped to `[0, 1+]`. Rows without a
/// smoothed feature and columns without an embedding get the maximum cost,
/// which downstream fusion treats as "appearance unavailable".
pub fn embedding_distance(
    tracks: &[Track],
    detections: &[Detection],
) -> DMatrix<f32> {
    let mut cost_matrix = DMatrix::zeros(tracks.len(), detections.len());
    for (ti, track) in tracks.iter().enumerate() {
        for (di, det) in detections.iter().enumerate() {
            let cost = match (track.get_smooth_feature(), &det.embedding) {
                (Some(feat), Some(emb)) if feat.len() == emb.len() => {
                    let dot: f32 =
                        feat.iter().zip(emb.iter()).map(|(a, b)| a * b).sum();
                    (1.0 - dot).max(0.0)
                }
                _ => 1.0,
            };
            cost_matrix[(ti, di)] = cost;
        }
    }
    cost_matrix
}

/// Bias the cost toward confident detections: `1 - (1 - cost) * score`.
pub fn fuse_score(cost_matrix: &mut DMatrix<f32>, detections: &[Detection]) {
    if cost_matrix.nrows() == 0 || cost_matrix.ncols() == 0 {
        return;
    }
    for ti in 0..cost_matrix.nrows() {
        for (di, det) in detections.iter().enumerate() {
            let similarity = (1.0 - cost_matrix[(ti, di)]) * det.confidence;
            cost_matrix[(ti, di)] = 1.0 - similarity;
        }
    }
}

/// Gate each entry on the squared Mahalanobis distance between the track's
/// predicted state and the detection, then blend the survivors:
/// `lambda * cost + (1 - lambda) * gating_distance`.
pub fn fuse_motion(
    kalman_filter: &KalmanFilter,
    cost_matrix: &mut DMatrix<f32>,
    tracks: &[Track],
    detections: &[Detection],
    only_position: bool,
    lambda: f32,
) {
    if cost_matrix.nrows() == 0 || cost_matrix.ncols() == 0 {
        return;
    }
    let gating_threshold = if only_position {
        CHI2INV95_2DOF
    } else {
        CHI2INV95_4DOF
    };
    let measurements: Vec<DetectBox> =
        detections.iter().map(|d| d.rect.get_xyah()).collect();

    for (ti, track) in tracks.iter().enumerate() {
        let distances = kalman_filter.gating_distance(
            &track.mean,
            &track.covariance,
            &measurements,
            only_position,
        );
        for (di, &distance) in distances.iter().enumerate() {
            if distance > gating_threshold {
                cost_matrix[(ti, di)] = f32::INFINITY;
            } else {
                cost_matrix[(ti, di)] = lambda * cost_matrix[(ti, di)]
                    + (1.0 - lambda) * distance;
            }
        }
    }
}

/// Combine geometry and appearance: appearance is rejected (cost 1) for
/// pairs that are geometrically implausible (`iou cost > proximity_thresh`)
/// or visually dissimilar (`emb cost > appearance_thresh`); the final cost
/// is the entrywise minimum of the two. An empty embedding matrix means
/// re-identification is off and the IoU cost passes through.
pub fn fuse_iou_with_emb(
    iou_cost: &DMatrix<f32>,
    emb_cost: &DMatrix<f32>,
    proximity_thresh: f32,
    appearance_thresh: f32,
) -> DMatrix<f32> {
    if emb_cost.nrows() == 0 || emb_cost.ncols() == 0 {
        return iou_cost.clone();
    }
    debug_assert_eq!(iou_cost.shape(), emb_cost.shape());

    let mut fused = iou_cost.clone();
    for i in 0..iou_cost.nrows() {
        for j in 0..iou_cost.ncols() {
            let mut emb = emb_cost[(i, j)];
            if iou_cost[(i, j)] > proximity_thresh || emb > appearance_thresh {
                emb = 1.0;
            }
            fused[(i, j)] = iou_cost[(i, j)].min(emb);
        }
    }
    fused
}
