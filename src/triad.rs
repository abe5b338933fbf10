//! Triad roughness surface over a ratio × ratio grid
//!
//! Cell `[i][j]` scores the triad `1 : ratios[i] : ratios[j]`. The surface is
//! normalized by its own maximum so presentation can map it straight to a
//! colour/height range.

use crate::roughness_kernel::kernel;
use crate::spectrum::Spectrum;
use rayon::prelude::*;
use serde::Serialize;

/// Decimal places kept on every axis sample
const AXIS_DECIMALS: i32 = 6;
/// Tolerance for including `max_ratio` despite accumulation error
const AXIS_EPSILON: f64 = 1e-9;

/// Parameters of a triad surface build
#[derive(Debug, Clone)]
pub struct TriadParams {
    pub base_frequency: f64,
    pub spectrum: Spectrum,
    pub min_ratio: f64,
    pub max_ratio: f64,
    pub step: f64,
}

impl TriadParams {
    pub fn new(base_frequency: f64, spectrum: Spectrum) -> Self {
        Self {
            base_frequency,
            spectrum,
            min_ratio: 1.0,
            max_ratio: 2.0,
            step: 0.02,
        }
    }

    pub fn with_bounds(mut self, min_ratio: f64, max_ratio: f64) -> Self {
        self.min_ratio = min_ratio;
        self.max_ratio = max_ratio;
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }
}

/// Normalized triad roughness height-field
#[derive(Debug, Clone, Serialize)]
pub struct TriadSurface {
    /// Shared axis for both dimensions, ascending
    pub ratios: Vec<f64>,
    /// `values[i][j]` for `(ratios[i], ratios[j])`, each in `[0, 1]`
    pub values: Vec<Vec<f64>>,
    /// Largest raw score before normalization
    pub max_raw: f64,
}

/// A grid cell no higher than its eight neighbours
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocalMinimum {
    /// Ratio of the middle tone (`ratios[i]`)
    pub ratio_x: f64,
    /// Ratio of the top tone (`ratios[j]`)
    pub ratio_y: f64,
    pub value: f64,
}

fn round_axis(value: f64) -> f64 {
    let scale = 10f64.powi(AXIS_DECIMALS);
    (value * scale).round() / scale
}

/// Sample `[min_ratio, max_ratio]` by repeated addition of `step`.
///
/// Each sample is rounded to six decimals before the next addition so the
/// cardinality of the axis does not depend on accumulated float error.
/// A non-positive or non-finite step, or a non-finite bound, yields the
/// single sample `min_ratio`. A step below the rounding resolution stops
/// after the first sample it cannot advance past.
pub fn ratio_axis(min_ratio: f64, max_ratio: f64, step: f64) -> Vec<f64> {
    let finite = min_ratio.is_finite() && max_ratio.is_finite() && step.is_finite();
    if !finite || step <= 0.0 {
        return vec![round_axis(min_ratio)];
    }
    let mut axis = Vec::new();
    let mut r = round_axis(min_ratio);
    while r <= max_ratio + AXIS_EPSILON {
        axis.push(r);
        let next = round_axis(r + step);
        if next <= r {
            break;
        }
        r = next;
    }
    axis
}

fn triad_cell(f0: f64, r: f64, s: f64, multipliers: &[f64], loud: &[f64]) -> f64 {
    let mut total = 0.0;
    for (i, &wi) in multipliers.iter().enumerate() {
        let li = loud[i];
        let (a, ra, sa) = (f0 * wi, r * f0 * wi, s * f0 * wi);
        for (j, &wj) in multipliers.iter().enumerate() {
            let lj = loud[j];
            let (b, rb, sb) = (f0 * wj, r * f0 * wj, s * f0 * wj);
            total += kernel(a, b, li, lj)
                + kernel(ra, rb, li, lj)
                + kernel(a, rb, li, lj)
                + kernel(sa, sb, li, lj)
                + kernel(a, sb, li, lj)
                + kernel(ra, sb, li, lj);
        }
    }
    total / 2.0
}

/// Build the normalized triad surface.
///
/// Rows are computed in parallel; normalization waits for the full grid so
/// the result does not depend on scheduling.
pub fn build_triad_surface(params: &TriadParams) -> TriadSurface {
    let ratios = ratio_axis(params.min_ratio, params.max_ratio, params.step);
    let loud = params.spectrum.loudness();
    let multipliers = &params.spectrum.multipliers;
    let f0 = params.base_frequency;

    let mut values: Vec<Vec<f64>> = ratios
        .par_iter()
        .map(|&r| {
            ratios
                .iter()
                .map(|&s| triad_cell(f0, r, s, multipliers, &loud))
                .collect()
        })
        .collect();

    let max_raw = values
        .iter()
        .flat_map(|row| row.iter().copied())
        .fold(0.0f64, f64::max);

    for row in &mut values {
        for v in row.iter_mut() {
            *v = if max_raw > 0.0 { *v / max_raw } else { 0.0 };
        }
    }

    TriadSurface {
        ratios,
        values,
        max_raw,
    }
}

impl TriadSurface {
    pub fn rows(&self) -> usize {
        self.values.len()
    }

    pub fn cols(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    /// Normalized value of the cell nearest to `(r, s)`
    pub fn value_at(&self, r: f64, s: f64) -> Option<f64> {
        let i = nearest_index(&self.ratios, r)?;
        let j = nearest_index(&self.ratios, s)?;
        self.values.get(i)?.get(j).copied()
    }
}

fn nearest_index(axis: &[f64], x: f64) -> Option<usize> {
    axis.iter()
        .enumerate()
        .min_by(|a, b| (a.1 - x).abs().total_cmp(&(b.1 - x).abs()))
        .map(|(i, _)| i)
}

/// Interior cells that are `<=` all eight neighbours and `<= threshold`.
///
/// Plateaus count every member unless a neighbour is strictly lower. Boundary
/// cells are never reported. Sorted ascending by value, truncated to `limit`.
pub fn extract_local_minima(
    surface: &TriadSurface,
    threshold: f64,
    limit: usize,
) -> Vec<LocalMinimum> {
    let rows = surface.rows();
    let cols = surface.cols();
    if rows < 3 || cols < 3 {
        return Vec::new();
    }

    let v = &surface.values;
    let mut minima = Vec::new();
    for i in 1..rows - 1 {
        for j in 1..cols - 1 {
            let value = v[i][j];
            if value > threshold {
                continue;
            }
            let is_min = (i - 1..=i + 1)
                .flat_map(|ni| (j - 1..=j + 1).map(move |nj| (ni, nj)))
                .filter(|&(ni, nj)| (ni, nj) != (i, j))
                .all(|(ni, nj)| value <= v[ni][nj]);
            if is_min {
                minima.push(LocalMinimum {
                    ratio_x: surface.ratios[i],
                    ratio_y: surface.ratios[j],
                    value,
                });
            }
        }
    }

    minima.sort_by(|a, b| a.value.total_cmp(&b.value));
    minima.truncate(limit);
    minima
}
