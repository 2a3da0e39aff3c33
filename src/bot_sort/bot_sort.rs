//! Main BoT-SORT tracker implementation.
//!
//! Per frame: detections are validated and split by confidence, live tracks
//! are predicted and rectified for camera motion, then associated in three
//! stages (high-confidence fused IoU + appearance, low-confidence IoU
//! rescue, unconfirmed-track confirmation) before lifecycle bookkeeping.

use crate::bot_sort::gmc::{GlobalMotionCompensation, GmcBackend, GmcMethod};
use crate::bot_sort::kalman_filter::KalmanFilter;
use crate::bot_sort::matching::{
    calc_ious, embedding_distance, fuse_iou_with_emb, fuse_motion, fuse_score,
    iou_distance,
};
use crate::bot_sort::track::{multi_gmc, multi_predict, Track, TrackState};
use crate::detection::Detection;
use crate::error::{Diagnostics, TrackError};
use crate::frame::{FeatureExtractor, Frame};
use crate::lapjv::linear_assignment;
use log::warn;
use nalgebra::{DMatrix, Matrix3};
use std::collections::HashSet;

/// Detections at or below this confidence are dropped outright.
const LOW_CONF_FLOOR: f32 = 0.1;
/// Cost gate of the low-confidence rescue stage.
const SECOND_MATCH_THRESH: f32 = 0.5;
/// Cost gate when confirming day-old unconfirmed tracks.
const UNCONFIRMED_MATCH_THRESH: f32 = 0.7;
/// Tracked/lost pairs overlapping beyond this IoU are near-duplicates.
const DUPLICATE_IOU_THRESH: f32 = 0.15;
/// Upper bound on the removed-track history kept for inspection.
const MAX_REMOVED_HISTORY: usize = 1000;

#[derive(Debug, Clone)]
pub struct BotSortConfig {
    /// Minimum confidence for the first association stage.
    pub track_high_thresh: f32,
    /// Minimum confidence to spawn a new identity.
    pub new_track_thresh: f32,
    /// Lost-track retention, in 30-fps frames.
    pub track_buffer: usize,
    /// Cost gate of the first association stage.
    pub match_thresh: f32,
    /// IoU-cost gate above which appearance matches are rejected.
    pub proximity_thresh: f32,
    /// Embedding-cost gate above which appearance matches are rejected.
    pub appearance_thresh: f32,
    pub gmc_method: GmcMethod,
    pub frame_rate: f32,
    /// Motion/appearance blend weight in the embedding cost.
    pub lambda: f32,
}

impl Default for BotSortConfig {
    fn default() -> Self {
        Self {
            track_high_thresh: 0.6,
            new_track_thresh: 0.7,
            track_buffer: 30,
            match_thresh: 0.8,
            proximity_thresh: 0.5,
            appearance_thresh: 0.25,
            gmc_method: GmcMethod::None,
            frame_rate: 30.0,
            lambda: 0.98,
        }
    }
}

impl BotSortConfig {
    pub fn with_thresholds(
        self,
        track_high_thresh: f32,
        new_track_thresh: f32,
        match_thresh: f32,
    ) -> Self {
        Self {
            track_high_thresh,
            new_track_thresh,
            match_thresh,
            ..self
        }
    }

    pub fn with_fusion_gates(
        self,
        proximity_thresh: f32,
        appearance_thresh: f32,
    ) -> Self {
        Self {
            proximity_thresh,
            appearance_thresh,
            ..self
        }
    }

    pub fn with_gmc(self, gmc_method: GmcMethod) -> Self {
        Self { gmc_method, ..self }
    }

    pub fn with_frame_rate(self, frame_rate: f32) -> Self {
        Self { frame_rate, ..self }
    }

    pub fn with_track_buffer(self, track_buffer: usize) -> Self {
        Self {
            track_buffer,
            ..self
        }
    }

    pub fn with_lambda(self, lambda: f32) -> Self {
        Self { lambda, ..self }
    }
}

pub struct BotSort {
    config: BotSortConfig,
    max_time_lost: usize,

    kalman_filter: KalmanFilter,
    gmc: GlobalMotionCompensation,
    extractor: Option<Box<dyn FeatureExtractor>>,
    feature_dim: Option<usize>,

    frame_id: usize,
    track_id_count: usize,

    tracked_tracks: Vec<Track>,
    lost_tracks: Vec<Track>,
    removed_tracks: Vec<Track>,

    diagnostics: Diagnostics,
}

impl std::fmt::Debug for BotSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BotSort {{ frame_id: {}, tracked: {}, lost: {}, removed: {}, diagnostics: {:?} }}",
            self.frame_id,
            self.tracked_tracks.len(),
            self.lost_tracks.len(),
            self.removed_tracks.len(),
            self.diagnostics
        )
    }
}

impl BotSort {
    pub fn new(config: BotSortConfig) -> Self {
        let max_time_lost = (config.frame_rate / 30.0
            * config.track_buffer as f32)
            .round() as usize;
        let kalman_filter =
            KalmanFilter::new(1.0 / 20., 1.0 / 160., 1.0 / config.frame_rate);
        let gmc = GlobalMotionCompensation::new(config.gmc_method);

        Self {
            config,
            max_time_lost,
            kalman_filter,
            gmc,
            extractor: None,
            feature_dim: None,
            frame_id: 0,
            track_id_count: 0,
            tracked_tracks: Vec::new(),
            lost_tracks: Vec::new(),
            removed_tracks: Vec::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Enable re-identification by attaching an appearance backend.
    pub fn with_extractor(
        mut self,
        extractor: Box<dyn FeatureExtractor>,
    ) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Replace the built-in camera motion estimator.
    pub fn with_gmc_backend(mut self, backend: Box<dyn GmcBackend>) -> Self {
        self.gmc = GlobalMotionCompensation::with_backend(backend);
        self
    }

    pub fn get_frame_id(&self) -> usize {
        self.frame_id
    }

    pub fn max_time_lost(&self) -> usize {
        self.max_time_lost
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked_tracks.len()
    }

    pub fn lost_count(&self) -> usize {
        self.lost_tracks.len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed_tracks.len()
    }

    pub fn lost_track_ids(&self) -> Vec<usize> {
        self.lost_tracks.iter().map(|t| t.get_track_id()).collect()
    }

    pub fn tracked_track_ids(&self) -> Vec<usize> {
        self.tracked_tracks
            .iter()
            .map(|t| t.get_track_id())
            .collect()
    }

    pub fn removed_track_ids(&self) -> Vec<usize> {
        self.removed_tracks
            .iter()
            .map(|t| t.get_track_id())
            .collect()
    }

    /// Process one frame. Always returns the currently confirmed tracks;
    /// per-detection and per-track failures degrade locally and are counted
    /// in `diagnostics()`.
    pub fn track(
        &mut self,
        frame: &Frame<'_>,
        detections: Vec<Detection>,
    ) -> Vec<Track> {
        self.frame_id += 1;
        let frame_id = self.frame_id;

        // Validate and clamp at the frame boundary.
        let validated = self.prepare_detections(frame, detections);

        // Partition the tracked pool into confirmed and unconfirmed.
        let mut confirmed: Vec<Track> = Vec::new();
        let mut unconfirmed: Vec<Track> = Vec::new();
        for track in self.tracked_tracks.drain(..) {
            if track.is_activated() {
                confirmed.push(track);
            } else {
                unconfirmed.push(track);
            }
        }

        // Merge with the lost pool (confirmed wins ties) and predict.
        let mut pool = Self::joint_tracks(&confirmed, &self.lost_tracks);
        self.lost_tracks.clear();
        multi_predict(&mut pool, &self.kalman_filter);

        // Rectify states into the current frame's coordinate system.
        let homography = match self.gmc.apply(frame, &validated) {
            Ok(homography) => homography,
            Err(error) => {
                let error = TrackError::BackendFailure(error.to_string());
                warn!("camera motion estimation failed: {}", error);
                self.diagnostics.record(&error);
                Matrix3::identity()
            }
        };
        multi_gmc(&mut pool, &homography);
        multi_gmc(&mut unconfirmed, &homography);

        // Split by confidence; <= LOW_CONF_FLOOR was already dropped.
        let mut dets_high: Vec<Detection> = Vec::new();
        let mut dets_low: Vec<Detection> = Vec::new();
        for det in validated {
            if det.confidence >= self.config.track_high_thresh {
                dets_high.push(det);
            } else {
                dets_low.push(det);
            }
        }

        let mut activated: Vec<Track> = Vec::new();
        let mut refind: Vec<Track> = Vec::new();
        let mut lost_new: Vec<Track> = Vec::new();
        let mut lost_carry: Vec<Track> = Vec::new();
        let mut removed_new: Vec<Track> = Vec::new();

        // First association: fused IoU + appearance over the whole pool.
        let mut iou_cost = iou_distance(&pool, &dets_high);
        fuse_score(&mut iou_cost, &dets_high);

        let reid = self.extractor.is_some()
            || dets_high.iter().any(|d| d.embedding.is_some());
        let emb_cost = if reid {
            let mut emb = embedding_distance(&pool, &dets_high);
            fuse_motion(
                &self.kalman_filter,
                &mut emb,
                &pool,
                &dets_high,
                false,
                self.config.lambda,
            );
            emb
        } else {
            DMatrix::zeros(0, 0)
        };

        let cost = fuse_iou_with_emb(
            &iou_cost,
            &emb_cost,
            self.config.proximity_thresh,
            self.config.appearance_thresh,
        );
        let first = linear_assignment(&cost, self.config.match_thresh);

        for &(t_idx, d_idx) in &first.matches {
            let track = &mut pool[t_idx];
            let det = &dets_high[d_idx];
            if track.get_state() == TrackState::Tracked {
                self.checked(track.update(&self.kalman_filter, det, frame_id));
                activated.push(track.clone());
            } else {
                self.checked(track.re_activate(
                    &self.kalman_filter,
                    det,
                    frame_id,
                    None,
                ));
                refind.push(track.clone());
            }
        }

        // Second association: rescue still-tracked leftovers with the
        // low-confidence detections, geometry only.
        let mut unmatched_tracked: Vec<Track> = Vec::new();
        for &t_idx in &first.unmatched_track_indices {
            if pool[t_idx].get_state() == TrackState::Tracked {
                unmatched_tracked.push(pool[t_idx].clone());
            } else {
                // Still lost; keeps its predicted state for later frames.
                lost_carry.push(pool[t_idx].clone());
            }
        }

        let iou_cost_second = iou_distance(&unmatched_tracked, &dets_low);
        let second = linear_assignment(&iou_cost_second, SECOND_MATCH_THRESH);

        for &(t_idx, d_idx) in &second.matches {
            let track = &mut unmatched_tracked[t_idx];
            let det = &dets_low[d_idx];
            if track.get_state() == TrackState::Tracked {
                self.checked(track.update(&self.kalman_filter, det, frame_id));
                activated.push(track.clone());
            } else {
                self.checked(track.re_activate(
                    &self.kalman_filter,
                    det,
                    frame_id,
                    None,
                ));
                refind.push(track.clone());
            }
        }
        for &t_idx in &second.unmatched_track_indices {
            let track = &mut unmatched_tracked[t_idx];
            if track.get_state() != TrackState::Lost {
                track.mark_lost();
                lost_new.push(track.clone());
            }
        }

        // Unconfirmed tracks get one shot at the leftover high detections.
        let leftover_high: Vec<Detection> = first
            .unmatched_det_indices
            .iter()
            .map(|&d_idx| dets_high[d_idx].clone())
            .collect();

        let mut unconfirmed_cost = iou_distance(&unconfirmed, &leftover_high);
        fuse_score(&mut unconfirmed_cost, &leftover_high);
        let third =
            linear_assignment(&unconfirmed_cost, UNCONFIRMED_MATCH_THRESH);

        for &(t_idx, d_idx) in &third.matches {
            let track = &mut unconfirmed[t_idx];
            self.checked(track.update(
                &self.kalman_filter,
                &leftover_high[d_idx],
                frame_id,
            ));
            activated.push(track.clone());
        }
        for &t_idx in &third.unmatched_track_indices {
            let track = &mut unconfirmed[t_idx];
            track.mark_removed();
            removed_new.push(track.clone());
        }

        // Spawn new identities from the remaining high detections.
        for &d_idx in &third.unmatched_det_indices {
            let det = &leftover_high[d_idx];
            if det.confidence >= self.config.new_track_thresh {
                let mut track = Track::from_detection(det);
                self.track_id_count += 1;
                track.activate(&self.kalman_filter, frame_id, self.track_id_count);
                activated.push(track);
            }
        }

        // Reap lost tracks that outlived the retention window.
        for mut track in lost_carry.into_iter().chain(lost_new.into_iter()) {
            if frame_id - track.get_frame_id() > self.max_time_lost {
                track.mark_removed();
                removed_new.push(track);
            } else {
                self.lost_tracks.push(track);
            }
        }

        // Pool maintenance: rebuild tracked, subtract it from lost, then
        // resolve near-duplicate tracked/lost pairs.
        let tracked_next = Self::joint_tracks(&activated, &refind);
        let lost_next = Self::sub_tracks(&self.lost_tracks, &tracked_next);
        let lost_next = Self::sub_tracks(&lost_next, &removed_new);
        let (tracked_next, lost_next) =
            Self::remove_duplicate_tracks(&tracked_next, &lost_next);

        self.tracked_tracks = tracked_next;
        self.lost_tracks = lost_next;
        self.removed_tracks.extend(removed_new);
        if self.removed_tracks.len() > MAX_REMOVED_HISTORY {
            let excess = self.removed_tracks.len() - MAX_REMOVED_HISTORY;
            self.removed_tracks.drain(..excess);
        }

        self.tracked_tracks
            .iter()
            .filter(|t| t.is_activated())
            .cloned()
            .collect()
    }

    fn checked(&mut self, result: Result<(), TrackError>) {
        if let Err(error) = result {
            warn!("kalman update skipped: {}", error);
            self.diagnostics.record(&error);
        }
    }

    /// Validate, clamp and (when re-identification is on) embed detections.
    /// Invalid records are dropped with a diagnostic.
    fn prepare_detections(
        &mut self,
        frame: &Frame<'_>,
        detections: Vec<Detection>,
    ) -> Vec<Detection> {
        let mut valid = Vec::with_capacity(detections.len());
        for mut det in detections {
            if let Err(error) = det.validate(self.feature_dim) {
                warn!("detection dropped: {}", error);
                self.diagnostics.record(&error);
                continue;
            }
            if det.confidence <= LOW_CONF_FLOOR {
                continue;
            }
            det.rect.clip(frame.cols() as f32, frame.rows() as f32);

            if det.embedding.is_none() {
                if let Some(extractor) = &mut self.extractor {
                    match extractor.extract(frame, &det.rect) {
                        Ok(feat) => det.embedding = Some(feat),
                        Err(error) => {
                            // The detection still participates, geometry-only.
                            let error =
                                TrackError::BackendFailure(error.to_string());
                            warn!("feature extraction failed: {}", error);
                            self.diagnostics.record(&error);
                        }
                    }
                }
            }
            if let Some(embedding) = &det.embedding {
                match self.feature_dim {
                    None => self.feature_dim = Some(embedding.len()),
                    Some(dim) if dim != embedding.len() => {
                        let error = TrackError::InvalidInput(format!(
                            "embedding dimension {} does not match {}",
                            embedding.len(),
                            dim
                        ));
                        warn!("embedding dropped: {}", error);
                        self.diagnostics.record(&error);
                        det.embedding = None;
                    }
                    Some(_) => {}
                }
            }
            valid.push(det);
        }
        valid
    }

    /// Union of two track lists, deduplicated by track id; entries of
    /// `a_tracks` win ties.
    pub fn joint_tracks(a_tracks: &[Track], b_tracks: &[Track]) -> Vec<Track> {
        let mut exists = HashSet::new();
        let mut res = Vec::new();

        for a in a_tracks.iter() {
            exists.insert(a.get_track_id());
            res.push(a.clone());
        }
        for b in b_tracks.iter() {
            if exists.insert(b.get_track_id()) {
                res.push(b.clone());
            }
        }
        res
    }

    /// `a_tracks` minus every id present in `b_tracks`, order preserved.
    pub fn sub_tracks(a_tracks: &[Track], b_tracks: &[Track]) -> Vec<Track> {
        let b_ids: HashSet<usize> =
            b_tracks.iter().map(|t| t.get_track_id()).collect();
        a_tracks
            .iter()
            .filter(|t| !b_ids.contains(&t.get_track_id()))
            .cloned()
            .collect()
    }

    /// Resolve near-duplicate hypotheses between the tracked and lost
    /// pools: of any pair overlapping beyond `DUPLICATE_IOU_THRESH`, the
    /// shorter-lived one is dropped.
    pub fn remove_duplicate_tracks(
        tracked: &[Track],
        lost: &[Track],
    ) -> (Vec<Track>, Vec<Track>) {
        let tracked_rects: Vec<_> =
            tracked.iter().map(|t| t.get_rect()).collect();
        let lost_rects: Vec<_> = lost.iter().map(|t| t.get_rect()).collect();
        let ious = calc_ious(&tracked_rects, &lost_rects);

        let mut dup_tracked: HashSet<usize> = HashSet::new();
        let mut dup_lost: HashSet<usize> = HashSet::new();
        for i in 0..tracked.len() {
            for j in 0..lost.len() {
                if ious[(i, j)] > DUPLICATE_IOU_THRESH {
                    let age_tracked = tracked[i].get_frame_id()
                        - tracked[i].get_start_frame_id();
                    let age_lost =
                        lost[j].get_frame_id() - lost[j].get_start_frame_id();
                    if age_tracked >= age_lost {
                        dup_lost.insert(j);
                    } else {
                        dup_tracked.insert(i);
                    }
                }
            }
        }

        let tracked_out = tracked
            .iter()
            .enumerate()
            .filter(|(i, _)| !dup_tracked.contains(i))
            .map(|(_, t)| t.clone())
            .collect();
        let lost_out = lost
            .iter()
            .enumerate()
            .filter(|(j, _)| !dup_lost.contains(j))
            .map(|(_, t)| t.clone())
            .collect();
        (tracked_out, lost_out)
    }
}
