//! Pure Rust ECC camera motion estimator (Euclidean motion model).
//!
//! Maximizes the enhanced correlation coefficient between the previous
//! frame and the current frame over rotation + translation, on a
//! downscaled, blurred grayscale pair. Pixels inside detection boxes are
//! excluded from the correlation so foreground objects do not drag the
//! camera estimate along with them.

use crate::bot_sort::gmc::{detection_mask, GmcBackend};
use crate::bot_sort::imgproc::{
    central_gradients, downscale_to_long_edge, gaussian_blur, gray_u8_to_f32,
    warp_affine, warp_valid_mask,
};
use crate::detection::Detection;
use crate::error::GmcError;
use crate::frame::Frame;
use nalgebra::{Matrix3, Vector3};

#[derive(Debug, Clone, Copy)]
pub struct EccConfig {
    pub eps: f32,
    pub max_iter: usize,
    pub gauss_filt_size: usize,
    pub resize_long_edge: Option<usize>,
}

impl Default for EccConfig {
    fn default() -> Self {
        Self {
            eps: 1e-4,
            max_iter: 100,
            gauss_filt_size: 3,
            resize_long_edge: Some(350),
        }
    }
}

struct PreparedPlane {
    data: Vec<f32>,
    width: usize,
    height: usize,
    scale_x: f32,
    scale_y: f32,
}

#[derive(Default)]
pub struct EccGmc {
    cfg: EccConfig,
    prev: Option<PreparedPlane>,
}

impl EccGmc {
    pub fn new(cfg: EccConfig) -> Self {
        Self { cfg, prev: None }
    }

    fn prepare(&self, frame: &Frame<'_>) -> PreparedPlane {
        let full = gray_u8_to_f32(frame.data());
        let (scaled, w, h, sx, sy) = downscale_to_long_edge(
            &full,
            frame.cols(),
            frame.rows(),
            self.cfg.resize_long_edge,
        );
        let blurred = gaussian_blur(&scaled, w, h, self.cfg.gauss_filt_size);
        PreparedPlane {
            data: blurred,
            width: w,
            height: h,
            scale_x: sx,
            scale_y: sy,
        }
    }
}

impl GmcBackend for EccGmc {
    fn apply(
        &mut self,
        frame: &Frame<'_>,
        detections: &[Detection],
    ) -> Result<Matrix3<f32>, GmcError> {
        let curr = self.prepare(frame);

        let result = match &self.prev {
            Some(prev)
                if prev.width == curr.width && prev.height == curr.height =>
            {
                let foreground = detection_mask(
                    detections,
                    curr.width,
                    curr.height,
                    curr.scale_x,
                    curr.scale_y,
                );
                estimate_euclidean(
                    &prev.data,
                    &curr.data,
                    curr.width,
                    curr.height,
                    &self.cfg,
                    &foreground,
                )
                .map(|scaled| {
                    let mut h = scaled;
                    h[(0, 2)] /= curr.scale_x;
                    h[(1, 2)] /= curr.scale_y;
                    h
                })
            }
            Some(_) => Ok(Matrix3::identity()),
            None => Ok(Matrix3::identity()),
        };

        self.prev = Some(curr);
        result
    }
}

fn euclidean_map(theta: f32, tx: f32, ty: f32) -> Matrix3<f32> {
    let ct = theta.cos();
    let st = theta.sin();
    Matrix3::new(ct, -st, tx, st, ct, ty, 0.0, 0.0, 1.0)
}

/// One forward-additive ECC refinement over (theta, tx, ty). `template` is
/// the previous frame, `input` the current; the returned map takes previous
/// frame coordinates to current frame coordinates.
fn estimate_euclidean(
    template: &[f32],
    input: &[f32],
    width: usize,
    height: usize,
    cfg: &EccConfig,
    foreground: &[bool],
) -> Result<Matrix3<f32>, GmcError> {
    if width == 0 || height == 0 {
        return Err(GmcError::InvalidInput);
    }
    if template.len() != width * height || input.len() != width * height {
        return Err(GmcError::InvalidInput);
    }
    if cfg.gauss_filt_size == 0 || cfg.gauss_filt_size % 2 == 0 {
        return Err(GmcError::InvalidInput);
    }

    let (grad_x, grad_y) = central_gradients(input, width, height);

    let mut theta = 0.0f32;
    let mut tx = 0.0f32;
    let mut ty = 0.0f32;
    let mut last_rho = f32::NEG_INFINITY;
    let mut rho = -1.0f32;
    let n_pixels = width * height;

    for _ in 0..cfg.max_iter {
        let map = euclidean_map(theta, tx, ty);
        let warped = warp_affine(input, width, height, &map);
        let gxw = warp_affine(&grad_x, width, height, &map);
        let gyw = warp_affine(&grad_y, width, height, &map);

        let mut valid = warp_valid_mask(width, height, &map);
        for (v, &fg) in valid.iter_mut().zip(foreground.iter()) {
            *v = *v && !fg;
        }

        let valid_count = valid.iter().filter(|&&v| v).count();
        if valid_count < 16 {
            return Err(GmcError::NotConverged);
        }

        // Zero-mean statistics over the valid region.
        let mut t_mean = 0.0f32;
        let mut i_mean = 0.0f32;
        for i in 0..n_pixels {
            if valid[i] {
                t_mean += template[i];
                i_mean += warped[i];
            }
        }
        t_mean /= valid_count as f32;
        i_mean /= valid_count as f32;

        let mut t_norm_sq = 0.0f32;
        let mut i_norm_sq = 0.0f32;
        let mut corr = 0.0f32;
        for i in 0..n_pixels {
            if valid[i] {
                let tv = template[i] - t_mean;
                let iv = warped[i] - i_mean;
                t_norm_sq += tv * tv;
                i_norm_sq += iv * iv;
                corr += tv * iv;
            }
        }
        let t_norm = t_norm_sq.sqrt();
        let i_norm = i_norm_sq.sqrt();
        if t_norm <= 1e-6 || i_norm <= 1e-6 {
            return Err(GmcError::NotConverged);
        }

        rho = corr / (i_norm * t_norm);
        if !rho.is_finite() {
            return Err(GmcError::NotConverged);
        }
        if last_rho.is_finite() && (rho - last_rho).abs() < cfg.eps {
            break;
        }
        last_rho = rho;

        // Jacobian projections: J = [g . dW/dtheta, gx, gy].
        let ct = theta.cos();
        let st = theta.sin();
        let mut hessian = Matrix3::<f32>::zeros();
        let mut image_proj = Vector3::<f32>::zeros();
        let mut template_proj = Vector3::<f32>::zeros();

        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                if !valid[i] {
                    continue;
                }
                let xf = x as f32;
                let yf = y as f32;
                let hat_x = -(xf * st) - (yf * ct);
                let hat_y = (xf * ct) - (yf * st);
                let j = Vector3::new(
                    gxw[i] * hat_x + gyw[i] * hat_y,
                    gxw[i],
                    gyw[i],
                );
                let iv = warped[i] - i_mean;
                let tv = template[i] - t_mean;
                image_proj += j * iv;
                template_proj += j * tv;
                hessian += j * j.transpose();
            }
        }

        let hessian_inv =
            hessian.try_inverse().ok_or(GmcError::NotConverged)?;
        let image_proj_hessian = hessian_inv * image_proj;
        let lambda_n = i_norm_sq - image_proj.dot(&image_proj_hessian);
        let lambda_d = corr - template_proj.dot(&image_proj_hessian);
        if lambda_d <= 0.0 || !lambda_d.is_finite() {
            return Err(GmcError::NotConverged);
        }
        let lambda = lambda_n / lambda_d;
        if !lambda.is_finite() {
            return Err(GmcError::NotConverged);
        }

        let mut error_proj = Vector3::<f32>::zeros();
        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                if !valid[i] {
                    continue;
                }
                let xf = x as f32;
                let yf = y as f32;
                let hat_x = -(xf * st) - (yf * ct);
                let hat_y = (xf * ct) - (yf * st);
                let j = Vector3::new(
                    gxw[i] * hat_x + gyw[i] * hat_y,
                    gxw[i],
                    gyw[i],
                );
                let e = lambda * (template[i] - t_mean) - (warped[i] - i_mean);
                error_proj += j * e;
            }
        }

        let delta = hessian_inv * error_proj;
        theta += delta[0];
        tx += delta[1];
        ty += delta[2];
    }

    if !rho.is_finite() {
        return Err(GmcError::NotConverged);
    }
    Ok(euclidean_map(theta, tx, ty))
}
