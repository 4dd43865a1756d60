//! Mask-weighted Gaussian smoothing.
//!
//! `smoothed = G(z·m) / max(G(m), ε)` with `m` the validity bitmap, so no-data
//! cells contribute nothing and do not drag their valid neighbours down.
//! Both convolutions are separable (row pass, then column pass) with the
//! kernel truncated at 3σ.
use crate::window::ElevationWindow;

/// Floor on the mask-weight denominator.
const WEIGHT_EPSILON: f64 = 1e-6;

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let half = (3.0 * sigma).ceil().max(1.0) as usize;
    let two_s2 = 2.0 * sigma * sigma;
    let mut k: Vec<f64> = (0..=2 * half)
        .map(|i| {
            let d = i as f64 - half as f64;
            (-d * d / two_s2).exp()
        })
        .collect();
    let sum: f64 = k.iter().sum();
    k.iter_mut().for_each(|w| *w /= sum);
    k
}

/// Separable convolution of a row-major grid, zero outside the grid.
fn convolve(data: &[f64], width: usize, height: usize, kernel: &[f64]) -> Vec<f64> {
    let half = (kernel.len() / 2) as isize;

    let mut rows = vec![0.0f64; data.len()];
    for r in 0..height {
        for c in 0..width {
            let mut acc = 0.0;
            for (ki, &kw) in kernel.iter().enumerate() {
                let cc = c as isize + ki as isize - half;
                if cc >= 0 && cc < width as isize {
                    acc += kw * data[r * width + cc as usize];
                }
            }
            rows[r * width + c] = acc;
        }
    }

    let mut out = vec![0.0f64; data.len()];
    for r in 0..height {
        for c in 0..width {
            let mut acc = 0.0;
            for (ki, &kw) in kernel.iter().enumerate() {
                let rr = r as isize + ki as isize - half;
                if rr >= 0 && rr < height as isize {
                    acc += kw * rows[rr as usize * width + c];
                }
            }
            out[r * width + c] = acc;
        }
    }
    out
}

/// Smoothed elevation surface; masked cells are `NEG_INFINITY`.
///
/// `sigma` is in cells. A non-positive sigma returns the raw surface.
pub fn masked_gaussian(window: &ElevationWindow, sigma: f64) -> Vec<f32> {
    let mask = window.mask();
    if sigma <= 0.0 || !sigma.is_finite() {
        return raw_surface(window);
    }

    let (w, h) = (window.width(), window.height());
    let weights: Vec<f64> = mask.iter().map(|&m| if m { 1.0 } else { 0.0 }).collect();
    let weighted: Vec<f64> = window
        .values()
        .iter()
        .zip(mask)
        .map(|(&v, &m)| if m { v as f64 } else { 0.0 })
        .collect();

    let kernel = gaussian_kernel(sigma);
    let num = convolve(&weighted, w, h, &kernel);
    let den = convolve(&weights, w, h, &kernel);

    num.iter()
        .zip(&den)
        .zip(mask)
        .map(|((&n, &d), &m)| if m { (n / d.max(WEIGHT_EPSILON)) as f32 } else { f32::NEG_INFINITY })
        .collect()
}

/// Raw elevations with masked cells set to `NEG_INFINITY`.
pub fn raw_surface(window: &ElevationWindow) -> Vec<f32> {
    window
        .values()
        .iter()
        .zip(window.mask())
        .map(|(&v, &m)| if m { v } else { f32::NEG_INFINITY })
        .collect()
}
