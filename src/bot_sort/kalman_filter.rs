use crate::error::TrackError;
use nalgebra::{SMatrix, Vector2, Vector4};

/* -----------------------------------------------------------------------------
 * Type aliases
 * ----------------------------------------------------------------------------- */
// 1x4
pub(crate) type DetectBox = SMatrix<f32, 1, 4>;
// 1x8
pub(crate) type StateMean = SMatrix<f32, 1, 8>;
// 8x8
pub(crate) type StateCov = SMatrix<f32, 8, 8>;
// 1x4
pub(crate) type StateHMean = SMatrix<f32, 1, 4>;
// 4x4
pub(crate) type StateHCov = SMatrix<f32, 4, 4>;

/// Chi-square 0.95 quantile, 2 degrees of freedom (position-only gating).
pub(crate) const CHI2INV95_2DOF: f32 = 5.9915;
/// Chi-square 0.95 quantile, 4 degrees of freedom (full measurement gating).
pub(crate) const CHI2INV95_4DOF: f32 = 9.4877;

/* -----------------------------------------------------------------------------
 * Kalman Filter
 * ----------------------------------------------------------------------------- */

/// Constant-velocity filter over the state [cx, cy, a, h, vx, vy, va, vh],
/// observing [cx, cy, a, h]. One instance is shared by all tracks; the state
/// lives on the track.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    std_weight_position: f32,
    std_weight_velocity: f32,
    motion_mat: SMatrix<f32, 8, 8>, // 8x8
    update_mat: SMatrix<f32, 4, 8>, // 4x8
}

impl KalmanFilter {
    pub fn new(
        std_weight_position: f32,
        std_weight_velocity: f32,
        dt: f32,
    ) -> Self {
        let ndim = 4;

        let mut motion_mat = SMatrix::<f32, 8, 8>::identity();
        for i in 0..ndim {
            motion_mat[(i, i + ndim)] = dt;
        }

        let mut update_mat = SMatrix::<f32, 4, 8>::zeros();
        update_mat[(0, 0)] = 1.0;
        update_mat[(1, 1)] = 1.0;
        update_mat[(2, 2)] = 1.0;
        update_mat[(3, 3)] = 1.0;

        Self {
            std_weight_position,
            std_weight_velocity,
            motion_mat,
            update_mat,
        }
    }

    pub(crate) fn initiate(
        &self,
        mean: &mut StateMean,
        covariance: &mut StateCov,
        measurement: &DetectBox,
    ) {
        mean.as_mut_slice()[0..4].copy_from_slice(measurement.as_slice());
        mean.as_mut_slice()[4..8].fill(0.0);

        let h = measurement[(0, 3)];
        let mut std = SMatrix::<f32, 1, 8>::zeros();
        std[0] = 2.0 * self.std_weight_position * h;
        std[1] = 2.0 * self.std_weight_position * h;
        std[2] = 1e-2;
        std[3] = 2.0 * self.std_weight_position * h;
        std[4] = 10.0 * self.std_weight_velocity * h;
        std[5] = 10.0 * self.std_weight_velocity * h;
        std[6] = 1e-5;
        std[7] = 10.0 * self.std_weight_velocity * h;

        let tmp = std.component_mul(&std);
        *covariance = SMatrix::<f32, 8, 8>::from_diagonal(&tmp.transpose());
    }

    pub(crate) fn predict(
        &self,
        mean: &mut StateMean,
        covariance: &mut StateCov,
    ) {
        let h = mean[(0, 3)];
        let mut std = SMatrix::<f32, 1, 8>::zeros();
        std[0] = self.std_weight_position * h;
        std[1] = self.std_weight_position * h;
        std[2] = 1e-2;
        std[3] = self.std_weight_position * h;
        std[4] = self.std_weight_velocity * h;
        std[5] = self.std_weight_velocity * h;
        std[6] = 1e-5;
        std[7] = self.std_weight_velocity * h;

        let tmp = std.component_mul(&std);
        let motion_cov = SMatrix::<f32, 8, 8>::from_diagonal(&tmp.transpose());

        *mean = (self.motion_mat * mean.transpose()).transpose();
        *covariance = self.motion_mat * *covariance * self.motion_mat.transpose()
            + motion_cov;
    }

    fn innovation_cov(&self, mean: &StateMean) -> StateHCov {
        let h = mean[(0, 3)];
        let std = SMatrix::<f32, 1, 4>::from_iterator([
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-1,
            self.std_weight_position * h,
        ]);
        let diag = SMatrix::<f32, 4, 4>::from_diagonal(&std.transpose());
        diag.component_mul(&diag)
    }

    pub(crate) fn project(
        &self,
        mean: &StateMean,
        covariance: &StateCov,
    ) -> (StateHMean, StateHCov) {
        let projected_mean = mean * self.update_mat.transpose();
        let cov = self.update_mat * covariance * self.update_mat.transpose();
        (projected_mean, cov + self.innovation_cov(mean))
    }

    /// Correction step. Fails without touching `mean`/`covariance` when the
    /// projected covariance is no longer positive definite.
    pub(crate) fn update(
        &self,
        mean: &mut StateMean,      // 1x8
        covariance: &mut StateCov, // 8x8
        measurement: &DetectBox,   // 1x4
    ) -> Result<(), TrackError> {
        let (projected_mean, projected_covariance) =
            self.project(mean, covariance);
        let innovation_cov = self.innovation_cov(mean);

        let b = (*covariance * self.update_mat.transpose()).transpose();
        let cholesky_factor = projected_covariance.cholesky().ok_or_else(|| {
            TrackError::NumericDegenerate(
                "projected covariance lost positive definiteness".into(),
            )
        })?;
        // kalman_gain: 4x8
        let kalman_gain = cholesky_factor.solve(&b);
        // innovation: 1x4
        let innovation = measurement - projected_mean;
        *mean += innovation * kalman_gain;

        // Joseph form is numerically more stable than P -= K S K^T in f32.
        let k = kalman_gain.transpose(); // 8x4
        let i_minus_kh = StateCov::identity() - k * self.update_mat;
        *covariance = i_minus_kh * *covariance * i_minus_kh.transpose()
            + k * innovation_cov * k.transpose();
        Ok(())
    }

    /// Squared Mahalanobis distance between the projected state and each
    /// measurement. A suitable gate is `CHI2INV95_4DOF`, or `CHI2INV95_2DOF`
    /// with `only_position`. Degenerate projections yield `f32::MAX`.
    pub(crate) fn gating_distance(
        &self,
        mean: &StateMean,
        covariance: &StateCov,
        measurements: &[DetectBox],
        only_position: bool,
    ) -> Vec<f32> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        if only_position {
            let s = projected_cov.fixed_view::<2, 2>(0, 0).into_owned();
            let Some(cholesky_factor) = s.cholesky() else {
                return vec![f32::MAX; measurements.len()];
            };
            measurements
                .iter()
                .map(|z| {
                    let d = Vector2::new(
                        z[(0, 0)] - projected_mean[(0, 0)],
                        z[(0, 1)] - projected_mean[(0, 1)],
                    );
                    d.dot(&cholesky_factor.solve(&d))
                })
                .collect()
        } else {
            let Some(cholesky_factor) = projected_cov.cholesky() else {
                return vec![f32::MAX; measurements.len()];
            };
            measurements
                .iter()
                .map(|z| {
                    let d: Vector4<f32> = (z - projected_mean).transpose();
                    d.dot(&cholesky_factor.solve(&d))
                })
                .collect()
        }
    }
}
