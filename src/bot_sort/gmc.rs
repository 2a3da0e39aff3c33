//! Global motion compensation: estimates the camera egomotion between
//! consecutive frames as a 3x3 homography, applied to track states before
//! association.

use crate::bot_sort::ecc::EccGmc;
use crate::bot_sort::imgproc::{
    bilinear_at, central_gradients, downscale_to_long_edge, gaussian_blur,
    gray_u8_to_f32,
};
use crate::detection::Detection;
use crate::error::{GmcError, TrackError};
use crate::frame::Frame;
use nalgebra::{Matrix2, Matrix3, Matrix4, Vector2, Vector4};

/// Camera motion estimator backend. The homography maps the previous
/// frame's coordinate system onto the current frame's. Implementations own
/// whatever previous-frame state they need across calls.
pub trait GmcBackend {
    fn apply(
        &mut self,
        frame: &Frame<'_>,
        detections: &[Detection],
    ) -> Result<Matrix3<f32>, GmcError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GmcMethod {
    Orb,
    SparseOptFlow,
    Ecc,
    None,
}

impl GmcMethod {
    pub fn from_name(name: &str) -> Result<Self, TrackError> {
        match name {
            "orb" => Ok(Self::Orb),
            "sparse_optical_flow" => Ok(Self::SparseOptFlow),
            "ecc" => Ok(Self::Ecc),
            "none" => Ok(Self::None),
            other => Err(TrackError::InvalidInput(format!(
                "unknown gmc method \"{}\"",
                other
            ))),
        }
    }
}

/*----------------------------------------------------------------------------
Sparse optical flow backend
----------------------------------------------------------------------------*/

#[derive(Debug, Clone, Copy)]
pub struct SparseFlowConfig {
    pub resize_long_edge: Option<usize>,
    /// Spacing of the sample grid, in downscaled pixels.
    pub grid_step: usize,
    /// Half-size of the Lucas-Kanade window.
    pub window_radius: usize,
    pub lk_iterations: usize,
    /// Fewer matched points than this fails the frame.
    pub min_points: usize,
    /// Select gradient-response corners instead of a uniform grid.
    pub use_corners: bool,
    pub max_corners: usize,
}

impl Default for SparseFlowConfig {
    fn default() -> Self {
        Self {
            resize_long_edge: Some(350),
            grid_step: 12,
            window_radius: 5,
            lk_iterations: 4,
            min_points: 8,
            use_corners: false,
            max_corners: 200,
        }
    }
}

struct FlowPlane {
    data: Vec<f32>,
    grad_x: Vec<f32>,
    grad_y: Vec<f32>,
    width: usize,
    height: usize,
    scale_x: f32,
    scale_y: f32,
}

pub struct SparseFlowGmc {
    cfg: SparseFlowConfig,
    prev: Option<FlowPlane>,
}

impl SparseFlowGmc {
    pub fn new(cfg: SparseFlowConfig) -> Self {
        Self { cfg, prev: None }
    }

    fn prepare(&self, frame: &Frame<'_>) -> FlowPlane {
        let full = gray_u8_to_f32(frame.data());
        let (scaled, w, h, sx, sy) = downscale_to_long_edge(
            &full,
            frame.cols(),
            frame.rows(),
            self.cfg.resize_long_edge,
        );
        let blurred = gaussian_blur(&scaled, w, h, 3);
        let (grad_x, grad_y) = central_gradients(&blurred, w, h);
        FlowPlane {
            data: blurred,
            grad_x,
            grad_y,
            width: w,
            height: h,
            scale_x: sx,
            scale_y: sy,
        }
    }

    /// Sample positions on the previous plane, skipping foreground pixels.
    fn select_points(
        &self,
        prev: &FlowPlane,
        foreground: &[bool],
    ) -> Vec<(f32, f32)> {
        let margin = self.cfg.window_radius + 2;
        if prev.width <= 2 * margin || prev.height <= 2 * margin {
            return Vec::new();
        }

        if !self.cfg.use_corners {
            let mut points = Vec::new();
            let mut y = margin;
            while y < prev.height - margin {
                let mut x = margin;
                while x < prev.width - margin {
                    if !foreground[y * prev.width + x] {
                        points.push((x as f32, y as f32));
                    }
                    x += self.cfg.grid_step;
                }
                y += self.cfg.grid_step;
            }
            return points;
        }

        // Corner mode: rank candidates by the minimum eigenvalue of the
        // structure tensor and keep the strongest, spaced one grid cell
        // apart.
        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
        let mut y = margin;
        while y < prev.height - margin {
            let mut x = margin;
            while x < prev.width - margin {
                if !foreground[y * prev.width + x] {
                    let response = min_eigenvalue_response(
                        prev,
                        x,
                        y,
                        self.cfg.window_radius,
                    );
                    if response > 1.0 {
                        candidates.push((response, x, y));
                    }
                }
                x += 4;
            }
            y += 4;
        }
        candidates
            .sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let spacing = self.cfg.grid_step as isize;
        let mut points = Vec::new();
        let mut taken: Vec<(isize, isize)> = Vec::new();
        for (_, x, y) in candidates {
            let (xi, yi) = (x as isize, y as isize);
            if taken
                .iter()
                .all(|&(tx, ty)| (tx - xi).abs() + (ty - yi).abs() >= spacing)
            {
                taken.push((xi, yi));
                points.push((x as f32, y as f32));
                if points.len() >= self.cfg.max_corners {
                    break;
                }
            }
        }
        points
    }

    /// Track one point from the previous plane into the current one.
    fn track_point(
        &self,
        prev: &FlowPlane,
        curr: &FlowPlane,
        px: f32,
        py: f32,
    ) -> Option<(f32, f32)> {
        let radius = self.cfg.window_radius as isize;
        let (w, h) = (prev.width, prev.height);

        // Structure tensor over the template window.
        let mut gxx = 0.0f32;
        let mut gxy = 0.0f32;
        let mut gyy = 0.0f32;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let gx = bilinear_at(&prev.grad_x, w, h, px + dx as f32, py + dy as f32);
                let gy = bilinear_at(&prev.grad_y, w, h, px + dx as f32, py + dy as f32);
                gxx += gx * gx;
                gxy += gx * gy;
                gyy += gy * gy;
            }
        }
        let g = Matrix2::new(gxx, gxy, gxy, gyy);
        if g.determinant().abs() < 1e-3 {
            return None;
        }
        let g_inv = g.try_inverse()?;

        let mut flow = Vector2::new(0.0f32, 0.0);
        for _ in 0..self.cfg.lk_iterations {
            let mut b = Vector2::new(0.0f32, 0.0);
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let sx = px + dx as f32;
                    let sy = py + dy as f32;
                    let it = bilinear_at(
                        &curr.data,
                        curr.width,
                        curr.height,
                        sx + flow[0],
                        sy + flow[1],
                    ) - bilinear_at(&prev.data, w, h, sx, sy);
                    let gx = bilinear_at(&prev.grad_x, w, h, sx, sy);
                    let gy = bilinear_at(&prev.grad_y, w, h, sx, sy);
                    b[0] += it * gx;
                    b[1] += it * gy;
                }
            }
            let delta = -(g_inv * b);
            flow += delta;
            if delta.norm() < 0.01 {
                break;
            }
        }

        let max_flow = (2 * self.cfg.window_radius) as f32;
        if !flow[0].is_finite() || !flow[1].is_finite() || flow.norm() > max_flow
        {
            return None;
        }
        Some((px + flow[0], py + flow[1]))
    }
}

impl GmcBackend for SparseFlowGmc {
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
                let points = self.select_points(prev, &foreground);

                let mut pairs = Vec::with_capacity(points.len());
                for &(px, py) in &points {
                    if let Some(q) = self.track_point(prev, &curr, px, py) {
                        pairs.push(((px, py), q));
                    }
                }

                if pairs.len() < self.cfg.min_points {
                    Err(GmcError::NotConverged)
                } else {
                    fit_similarity_robust(&pairs, self.cfg.min_points).map(
                        |mut homography| {
                            homography[(0, 2)] /= curr.scale_x;
                            homography[(1, 2)] /= curr.scale_y;
                            homography
                        },
                    )
                }
            }
            _ => Ok(Matrix3::identity()),
        };

        self.prev = Some(curr);
        result
    }
}

fn min_eigenvalue_response(
    plane: &FlowPlane,
    x: usize,
    y: usize,
    radius: usize,
) -> f32 {
    let mut gxx = 0.0f32;
    let mut gxy = 0.0f32;
    let mut gyy = 0.0f32;
    for dy in -(radius as isize)..=(radius as isize) {
        for dx in -(radius as isize)..=(radius as isize) {
            let xi = (x as isize + dx) as usize;
            let yi = (y as isize + dy) as usize;
            let gx = plane.grad_x[yi * plane.width + xi];
            let gy = plane.grad_y[yi * plane.width + xi];
            gxx += gx * gx;
            gxy += gx * gy;
            gyy += gy * gy;
        }
    }
    let trace_half = 0.5 * (gxx + gyy);
    let det = gxx * gyy - gxy * gxy;
    trace_half - (trace_half * trace_half - det).max(0.0).sqrt()
}

/// Least-squares similarity transform [a, -b; b, a] + t from point pairs,
/// with one outlier rejection pass on the residuals.
fn fit_similarity_robust(
    pairs: &[((f32, f32), (f32, f32))],
    min_points: usize,
) -> Result<Matrix3<f32>, GmcError> {
    let first = fit_similarity(pairs)?;

    let mut residuals: Vec<f32> = pairs
        .iter()
        .map(|&((px, py), (qx, qy))| {
            let rx = first[(0, 0)] * px + first[(0, 1)] * py + first[(0, 2)] - qx;
            let ry = first[(1, 0)] * px + first[(1, 1)] * py + first[(1, 2)] - qy;
            (rx * rx + ry * ry).sqrt()
        })
        .collect();

    let mut sorted = residuals.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = sorted[sorted.len() / 2];
    let gate = (3.0 * median).max(1.0);

    let inliers: Vec<((f32, f32), (f32, f32))> = pairs
        .iter()
        .zip(residuals.drain(..))
        .filter(|(_, r)| *r <= gate)
        .map(|(&pair, _)| pair)
        .collect();

    if inliers.len() < min_points {
        return Ok(first);
    }
    fit_similarity(&inliers)
}

fn fit_similarity(
    pairs: &[((f32, f32), (f32, f32))],
) -> Result<Matrix3<f32>, GmcError> {
    if pairs.len() < 3 {
        return Err(GmcError::NotConverged);
    }

    // Normal equations for u = (a, b, tx, ty) with rows
    //   [px, -py, 1, 0] u = qx
    //   [py,  px, 0, 1] u = qy
    let mut ata = Matrix4::<f32>::zeros();
    let mut atb = Vector4::<f32>::zeros();
    for &((px, py), (qx, qy)) in pairs {
        let rows = [
            (Vector4::new(px, -py, 1.0, 0.0), qx),
            (Vector4::new(py, px, 0.0, 1.0), qy),
        ];
        for (row, rhs) in rows {
            ata += row * row.transpose();
            atb += row * rhs;
        }
    }

    let solution = ata.try_inverse().ok_or(GmcError::NotConverged)? * atb;
    let (a, b, tx, ty) = (solution[0], solution[1], solution[2], solution[3]);
    if !a.is_finite() || !b.is_finite() || !tx.is_finite() || !ty.is_finite() {
        return Err(GmcError::NotConverged);
    }
    Ok(Matrix3::new(a, -b, tx, b, a, ty, 0.0, 0.0, 1.0))
}

/// Mark downscaled pixels covered by a detection box.
pub(crate) fn detection_mask(
    detections: &[Detection],
    width: usize,
    height: usize,
    scale_x: f32,
    scale_y: f32,
) -> Vec<bool> {
    let mut mask = vec![false; width * height];
    for det in detections {
        let [x1, y1, x2, y2] = det.rect.get_tlbr();
        let x1 = ((x1 * scale_x).floor().max(0.0) as usize).min(width);
        let y1 = ((y1 * scale_y).floor().max(0.0) as usize).min(height);
        let x2 = ((x2 * scale_x).ceil().max(0.0) as usize).min(width);
        let y2 = ((y2 * scale_y).ceil().max(0.0) as usize).min(height);
        for y in y1..y2 {
            for cell in mask[y * width + x1..y * width + x2].iter_mut() {
                *cell = true;
            }
        }
    }
    mask
}

/*----------------------------------------------------------------------------
Factory
----------------------------------------------------------------------------*/

/// Owns the selected backend and guarantees a usable homography: estimator
/// failures surface as errors for the caller to count, and the caller falls
/// back to the identity for that frame.
pub struct GlobalMotionCompensation {
    backend: Option<Box<dyn GmcBackend>>,
}

impl GlobalMotionCompensation {
    pub fn new(method: GmcMethod) -> Self {
        let backend: Option<Box<dyn GmcBackend>> = match method {
            GmcMethod::None => None,
            GmcMethod::Ecc => Some(Box::<EccGmc>::default()),
            GmcMethod::SparseOptFlow => Some(Box::new(SparseFlowGmc::new(
                SparseFlowConfig::default(),
            ))),
            GmcMethod::Orb => Some(Box::new(SparseFlowGmc::new(
                SparseFlowConfig {
                    use_corners: true,
                    ..SparseFlowConfig::default()
                },
            ))),
        };
        Self { backend }
    }

    /// Use an externally provided estimator (e.g. a feature matcher from a
    /// vision stack).
    pub fn with_backend(backend: Box<dyn GmcBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub(crate) fn apply(
        &mut self,
        frame: &Frame<'_>,
        detections: &[Detection],
    ) -> Result<Matrix3<f32>, GmcError> {
        let Some(backend) = &mut self.backend else {
            return Ok(Matrix3::identity());
        };
        let homography = backend.apply(frame, detections)?;
        if homography.iter().all(|v| v.is_finite()) {
            Ok(homography)
        } else {
            Err(GmcError::NotConverged)
        }
    }
}
