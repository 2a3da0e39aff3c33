//! Grayscale helpers shared by the camera motion estimators.

use nalgebra::Matrix3;

pub(crate) fn gray_u8_to_f32(img: &[u8]) -> Vec<f32> {
    img.iter().map(|&v| v as f32).collect()
}

/// Downscale so the long edge does not exceed `target`. Returns the plane,
/// its size and the applied (sx, sy) scale; a no-op when already small.
pub(crate) fn downscale_to_long_edge(
    src: &[f32],
    width: usize,
    height: usize,
    target: Option<usize>,
) -> (Vec<f32>, usize, usize, f32, f32) {
    if let Some(target_long_edge) = target {
        let current_long = width.max(height);
        if target_long_edge > 0 && current_long > target_long_edge {
            let scale = target_long_edge as f32 / current_long as f32;
            let tw = ((width as f32 * scale).round() as usize).max(8);
            let th = ((height as f32 * scale).round() as usize).max(8);
            let scaled = resize_bilinear(src, width, height, tw, th);
            let sx = tw as f32 / width as f32;
            let sy = th as f32 / height as f32;
            return (scaled, tw, th, sx, sy);
        }
    }
    (src.to_vec(), width, height, 1.0, 1.0)
}

pub(crate) fn resize_bilinear(
    src: &[f32],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<f32> {
    let mut out = vec![0.0f32; dst_w * dst_h];
    let scale_x = src_w as f32 / dst_w as f32;
    let scale_y = src_h as f32 / dst_h as f32;
    for dy in 0..dst_h {
        let sy = (dy as f32 + 0.5) * scale_y - 0.5;
        let y0 = sy.floor().max(0.0) as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let wy = (sy - y0 as f32).max(0.0);
        for dx in 0..dst_w {
            let sx = (dx as f32 + 0.5) * scale_x - 0.5;
            let x0 = sx.floor().max(0.0) as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let wx = (sx - x0 as f32).max(0.0);
            let p00 = src[y0 * src_w + x0];
            let p01 = src[y0 * src_w + x1];
            let p10 = src[y1 * src_w + x0];
            let p11 = src[y1 * src_w + x1];
            out[dy * dst_w + dx] = (1.0 - wy) * ((1.0 - wx) * p00 + wx * p01)
                + wy * ((1.0 - wx) * p10 + wx * p11);
        }
    }
    out
}

fn gaussian_kernel(ksize: usize) -> Vec<f32> {
    let sigma = 0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let radius = (ksize / 2) as isize;
    let mut kernel = vec![0.0f32; ksize];
    let mut sum = 0.0f32;
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as isize - radius;
        let v = (-((x * x) as f32) / (2.0 * sigma * sigma)).exp();
        *k = v;
        sum += v;
    }
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Separable Gaussian blur with edge clamping. `ksize` must be odd;
/// `ksize <= 1` is a copy.
pub(crate) fn gaussian_blur(
    src: &[f32],
    w: usize,
    h: usize,
    ksize: usize,
) -> Vec<f32> {
    if ksize <= 1 {
        return src.to_vec();
    }
    let kernel = gaussian_kernel(ksize);
    let radius = (ksize / 2) as isize;
    let mut tmp = vec![0.0f32; w * h];
    let mut out = vec![0.0f32; w * h];

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &kv) in kernel.iter().enumerate() {
                let xx = (x as isize + k as isize - radius)
                    .clamp(0, (w - 1) as isize) as usize;
                acc += src[y * w + xx] * kv;
            }
            tmp[y * w + x] = acc;
        }
    }
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &kv) in kernel.iter().enumerate() {
                let yy = (y as isize + k as isize - radius)
                    .clamp(0, (h - 1) as isize) as usize;
                acc += tmp[yy * w + x] * kv;
            }
            out[y * w + x] = acc;
        }
    }
    out
}

/// Central-difference image gradients, clamped at the borders.
pub(crate) fn central_gradients(
    src: &[f32],
    w: usize,
    h: usize,
) -> (Vec<f32>, Vec<f32>) {
    let mut gx = vec![0.0f32; w * h];
    let mut gy = vec![0.0f32; w * h];
    for y in 0..h {
        let u = y.saturating_sub(1);
        let d = (y + 1).min(h - 1);
        for x in 0..w {
            let l = x.saturating_sub(1);
            let r = (x + 1).min(w - 1);
            gx[y * w + x] = 0.5 * (src[y * w + r] - src[y * w + l]);
            gy[y * w + x] = 0.5 * (src[d * w + x] - src[u * w + x]);
        }
    }
    (gx, gy)
}

pub(crate) fn bilinear_at(
    src: &[f32],
    w: usize,
    h: usize,
    x: f32,
    y: f32,
) -> f32 {
    if x < 0.0 || y < 0.0 || x >= (w - 1) as f32 || y >= (h - 1) as f32 {
        return 0.0;
    }
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let wx = x - x0 as f32;
    let wy = y - y0 as f32;
    let p00 = src[y0 * w + x0];
    let p01 = src[y0 * w + x1];
    let p10 = src[y1 * w + x0];
    let p11 = src[y1 * w + x1];
    (1.0 - wy) * ((1.0 - wx) * p00 + wx * p01)
        + wy * ((1.0 - wx) * p10 + wx * p11)
}

/// Sample `src` through the forward map (each output pixel reads
/// `map * (x, y, 1)` in the source).
pub(crate) fn warp_affine(
    src: &[f32],
    w: usize,
    h: usize,
    map: &Matrix3<f32>,
) -> Vec<f32> {
    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let xf = x as f32;
            let yf = y as f32;
            let sx = map[(0, 0)] * xf + map[(0, 1)] * yf + map[(0, 2)];
            let sy = map[(1, 0)] * xf + map[(1, 1)] * yf + map[(1, 2)];
            out[y * w + x] = bilinear_at(src, w, h, sx, sy);
        }
    }
    out
}

/// True where the mapped sample stays inside the source image.
pub(crate) fn warp_valid_mask(
    w: usize,
    h: usize,
    map: &Matrix3<f32>,
) -> Vec<bool> {
    let mut mask = vec![false; w * h];
    for y in 0..h {
        for x in 0..w {
            let xf = x as f32;
            let yf = y as f32;
            let sx = map[(0, 0)] * xf + map[(0, 1)] * yf + map[(0, 2)];
            let sy = map[(1, 0)] * xf + map[(1, 1)] * yf + map[(1, 2)];
            mask[y * w + x] = sx >= 0.0
                && sy >= 0.0
                && sx < (w - 1) as f32
                && sy < (h - 1) as f32;
        }
    }
    mask
}
