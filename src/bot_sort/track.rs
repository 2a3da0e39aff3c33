use crate::bot_sort::kalman_filter::{KalmanFilter, StateCov, StateMean};
use crate::detection::Detection;
use crate::error::TrackError;
use crate::rect::Rect;
use nalgebra::Matrix3;
use std::fmt::Debug;

/// Exponential moving average weight kept on the previous smoothed feature.
const FEATURE_EMA_ALPHA: f32 = 0.9;

/*----------------------------------------------------------------------------
Track state enum
----------------------------------------------------------------------------*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    New,
    Tracked,
    Lost,
    Removed,
}

/*----------------------------------------------------------------------------
Track struct
----------------------------------------------------------------------------*/

impl Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Track {{ track_id: {}, frame_id: {}, start_frame_id: {}, tracklet_len: {}, state: {:?}, is_activated: {}, score: {}, rect: {:?} }}",
            self.track_id, self.frame_id, self.start_frame_id, self.tracklet_len, self.state, self.is_activated, self.score, self.rect
        )
    }
}

/// One identity hypothesis. The Kalman state lives here; the filter itself
/// is shared and passed in by the controller.
#[derive(Clone)]
pub struct Track {
    pub(crate) mean: StateMean,
    pub(crate) covariance: StateCov,
    rect: Rect<f32>,
    state: TrackState,
    is_activated: bool,
    score: f32,
    class_id: i32,
    track_id: usize,
    frame_id: usize,
    start_frame_id: usize,
    tracklet_len: usize,
    time_since_update: usize,
    curr_feat: Option<Vec<f32>>,
    smooth_feat: Option<Vec<f32>>,
}

impl Track {
    pub fn new(rect: Rect<f32>, score: f32, class_id: i32) -> Self {
        Self {
            mean: StateMean::zeros(),
            covariance: StateCov::zeros(),
            rect,
            state: TrackState::New,
            is_activated: false,
            score,
            class_id,
            track_id: 0,
            frame_id: 0,
            start_frame_id: 0,
            tracklet_len: 0,
            time_since_update: 0,
            curr_feat: None,
            smooth_feat: None,
        }
    }

    pub(crate) fn from_detection(det: &Detection) -> Self {
        let mut track = Self::new(det.rect.clone(), det.confidence, det.class_id);
        if let Some(feat) = &det.embedding {
            track.update_features(feat);
        }
        track
    }

    #[cfg(test)]
    pub(crate) fn dummy_track(track_id: usize) -> Self {
        let mut track = Self::new(Rect::new(0.0, 0.0, 0.0, 0.0), 0.0, 0);
        track.track_id = track_id;
        track
    }

    pub fn get_rect(&self) -> Rect<f32> {
        self.rect.clone()
    }

    pub fn get_state(&self) -> TrackState {
        self.state
    }

    pub fn is_activated(&self) -> bool {
        self.is_activated
    }

    pub fn get_score(&self) -> f32 {
        self.score
    }

    pub fn get_class_id(&self) -> i32 {
        self.class_id
    }

    pub fn get_track_id(&self) -> usize {
        self.track_id
    }

    pub fn get_frame_id(&self) -> usize {
        self.frame_id
    }

    pub fn get_start_frame_id(&self) -> usize {
        self.start_frame_id
    }

    pub fn get_tracklet_length(&self) -> usize {
        self.tracklet_len
    }

    pub fn get_time_since_update(&self) -> usize {
        self.time_since_update
    }

    pub fn get_smooth_feature(&self) -> Option<&[f32]> {
        self.smooth_feat.as_deref()
    }

    pub fn get_current_feature(&self) -> Option<&[f32]> {
        self.curr_feat.as_deref()
    }

    /// Start tracking under a fresh identity. The first video frame
    /// confirms immediately; any later frame leaves the track unconfirmed
    /// until it is matched again.
    pub(crate) fn activate(
        &mut self,
        kalman_filter: &KalmanFilter,
        frame_id: usize,
        track_id: usize,
    ) {
        kalman_filter.initiate(
            &mut self.mean,
            &mut self.covariance,
            &self.rect.get_xyah(),
        );
        self.update_rect();

        self.state = TrackState::Tracked;
        self.is_activated = frame_id == 1;
        self.track_id = track_id;
        self.frame_id = frame_id;
        self.start_frame_id = frame_id;
        self.tracklet_len = 0;
        self.time_since_update = 0;
    }

    /// Bring a lost track back under its old identity (or a fresh one when
    /// `new_track_id` is set).
    pub(crate) fn re_activate(
        &mut self,
        kalman_filter: &KalmanFilter,
        det: &Detection,
        frame_id: usize,
        new_track_id: Option<usize>,
    ) -> Result<(), TrackError> {
        let result = kalman_filter.update(
            &mut self.mean,
            &mut self.covariance,
            &det.rect.get_xyah(),
        );
        if result.is_ok() {
            self.update_rect();
        }

        self.state = TrackState::Tracked;
        self.is_activated = true;
        self.score = det.confidence;
        self.class_id = det.class_id;
        if let Some(track_id) = new_track_id {
            self.track_id = track_id;
        }
        self.frame_id = frame_id;
        self.tracklet_len = 0;
        self.time_since_update = 0;
        if let Some(feat) = &det.embedding {
            self.update_features(feat);
        }
        result
    }

    /// Associate a detection on the current frame. A degenerate Kalman
    /// update leaves the motion state untouched but the lifecycle still
    /// advances (the detection was matched).
    pub(crate) fn update(
        &mut self,
        kalman_filter: &KalmanFilter,
        det: &Detection,
        frame_id: usize,
    ) -> Result<(), TrackError> {
        let result = kalman_filter.update(
            &mut self.mean,
            &mut self.covariance,
            &det.rect.get_xyah(),
        );
        if result.is_ok() {
            self.update_rect();
        }

        self.state = TrackState::Tracked;
        self.is_activated = true;
        self.score = det.confidence;
        self.class_id = det.class_id;
        self.frame_id = frame_id;
        self.tracklet_len += 1;
        self.time_since_update = 0;
        if let Some(feat) = &det.embedding {
            self.update_features(feat);
        }
        result
    }

    pub(crate) fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }

    /// Fold a new appearance vector into the smoothed one. Both are kept
    /// unit-norm.
    pub(crate) fn update_features(&mut self, feat: &[f32]) {
        let mut feat = feat.to_vec();
        normalize(&mut feat);

        match &mut self.smooth_feat {
            Some(smooth) if smooth.len() == feat.len() => {
                for (s, f) in smooth.iter_mut().zip(feat.iter()) {
                    *s = FEATURE_EMA_ALPHA * *s + (1.0 - FEATURE_EMA_ALPHA) * f;
                }
                normalize(smooth);
            }
            _ => self.smooth_feat = Some(feat.clone()),
        }
        self.curr_feat = Some(feat);
    }

    /// Sync the cached tlwh box from the Kalman mean.
    pub(crate) fn update_rect(&mut self) {
        self.rect.set_width(self.mean[(0, 2)] * self.mean[(0, 3)]);
        self.rect.set_height(self.mean[(0, 3)]);
        self.rect
            .set_x(self.mean[(0, 0)] - self.rect.width() / 2.);
        self.rect
            .set_y(self.mean[(0, 1)] - self.rect.height() / 2.);
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.track_id == other.track_id
    }
}

fn normalize(feat: &mut [f32]) {
    let norm = feat.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in feat.iter_mut() {
            *v /= norm;
        }
    }
}

/*----------------------------------------------------------------------------
Batched operations (controller-side; not intrinsic to a single track)
----------------------------------------------------------------------------*/

/// Advance every track one frame. Non-tracked hypotheses get their velocity
/// zeroed first so lost and unconfirmed tracks hold position instead of
/// drifting on stale motion.
pub(crate) fn multi_predict(tracks: &mut [Track], kalman_filter: &KalmanFilter) {
    for track in tracks.iter_mut() {
        if track.state != TrackState::Tracked {
            track.mean[(0, 4)] = 0.;
            track.mean[(0, 5)] = 0.;
            track.mean[(0, 6)] = 0.;
            track.mean[(0, 7)] = 0.;
        }
        kalman_filter.predict(&mut track.mean, &mut track.covariance);
        track.time_since_update += 1;
        track.update_rect();
    }
}

/// Rectify track states into the current frame's coordinate system using
/// the camera motion homography (previous frame -> current frame).
///
/// The 2x2 linear part rotates/scales center position and velocity, the
/// translation shifts position only; the covariance rows and columns of
/// those four channels are transformed with the same block-diagonal lift.
pub(crate) fn multi_gmc(tracks: &mut [Track], homography: &Matrix3<f32>) {
    if *homography == Matrix3::identity() {
        return;
    }

    let r = homography.fixed_view::<2, 2>(0, 0).into_owned();
    let tx = homography[(0, 2)];
    let ty = homography[(1, 2)];

    let mut lift = StateCov::identity();
    lift.fixed_view_mut::<2, 2>(0, 0).copy_from(&r);
    lift.fixed_view_mut::<2, 2>(4, 4).copy_from(&r);

    for track in tracks.iter_mut() {
        let (cx, cy) = (track.mean[(0, 0)], track.mean[(0, 1)]);
        track.mean[(0, 0)] = r[(0, 0)] * cx + r[(0, 1)] * cy + tx;
        track.mean[(0, 1)] = r[(1, 0)] * cx + r[(1, 1)] * cy + ty;

        let (vx, vy) = (track.mean[(0, 4)], track.mean[(0, 5)]);
        track.mean[(0, 4)] = r[(0, 0)] * vx + r[(0, 1)] * vy;
        track.mean[(0, 5)] = r[(1, 0)] * vx + r[(1, 1)] * vy;

        track.covariance = lift * track.covariance * lift.transpose();
        track.update_rect();
    }
}
