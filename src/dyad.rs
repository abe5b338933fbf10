//! Dyad roughness: two harmonic tones at ratio `r` over a shared fundamental

use crate::roughness_kernel::kernel;
use crate::spectrum::Spectrum;
use crate::triad::ratio_axis;
use serde::Serialize;

/// One point of a dyad sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DyadSample {
    pub ratio: f64,
    pub raw: f64,
    pub normalized: f64,
}

/// Roughness of the interval `1 : ratio` built on `base_frequency`.
///
/// Sums over every ordered partial pair `(i, j)`, including `i == j`:
/// same-tone pairs count half, cross-tone pairs count fully, and the total
/// is halved. An empty spectrum scores 0.
pub fn dyad_score(base_frequency: f64, ratio: f64, spectrum: &Spectrum) -> f64 {
    let loud = spectrum.loudness();
    dyad_score_with_loudness(base_frequency, ratio, &spectrum.multipliers, &loud)
}

fn dyad_score_with_loudness(f0: f64, r: f64, multipliers: &[f64], loud: &[f64]) -> f64 {
    let mut total = 0.0;
    for (i, &wi) in multipliers.iter().enumerate() {
        let li = loud[i];
        for (j, &wj) in multipliers.iter().enumerate() {
            let lj = loud[j];
            total += 0.5 * kernel(f0 * wi, f0 * wj, li, lj)
                + 0.5 * kernel(r * f0 * wi, r * f0 * wj, li, lj)
                + kernel(f0 * wi, r * f0 * wj, li, lj);
        }
    }
    total / 2.0
}

/// Sweep `ratio` over `[min_ratio, max_ratio]` and normalize by the sweep maximum.
///
/// The axis is built like the triad surface axis. If the maximum is not
/// positive every normalized value is 0.
pub fn dyad_curve(
    base_frequency: f64,
    spectrum: &Spectrum,
    min_ratio: f64,
    max_ratio: f64,
    step: f64,
) -> Vec<DyadSample> {
    let loud = spectrum.loudness();
    let mut samples: Vec<DyadSample> = ratio_axis(min_ratio, max_ratio, step)
        .into_iter()
        .map(|ratio| DyadSample {
            ratio,
            raw: dyad_score_with_loudness(base_frequency, ratio, &spectrum.multipliers, &loud),
            normalized: 0.0,
        })
        .collect();

    let max = samples.iter().map(|s| s.raw).fold(0.0f64, f64::max);
    if max > 0.0 {
        for s in &mut samples {
            s.normalized = s.raw / max;
        }
    }
    samples
}

/// Interior points of a curve that are no higher than both neighbours and
/// at or below `threshold`, sorted ascending by normalized value, at most `limit`.
pub fn curve_minima(curve: &[DyadSample], threshold: f64, limit: usize) -> Vec<DyadSample> {
    if curve.len() < 3 {
        return Vec::new();
    }
    let mut minima: Vec<DyadSample> = curve
        .windows(3)
        .filter(|w| {
            let v = w[1].normalized;
            v <= w[0].normalized && v <= w[2].normalized && v <= threshold
        })
        .map(|w| w[1])
        .collect();
    minima.sort_by(|a, b| a.normalized.total_cmp(&b.normalized));
    minima.truncate(limit);
    minima
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::build_spectrum;

    #[test]
    fn test_single_partial_unison_is_zero() {
        let s = build_spectrum(220.0, 1, 1.0);
        assert_eq!(dyad_score(220.0, 1.0, &s), 0.0);
    }

    #[test]
    fn test_empty_spectrum_scores_zero() {
        assert_eq!(dyad_score(220.0, 1.2, &Spectrum::empty()), 0.0);
        let curve = dyad_curve(220.0, &Spectrum::empty(), 1.0, 2.0, 0.1);
        assert!(curve.iter().all(|s| s.normalized == 0.0));
    }

    #[test]
    fn test_weighting_matches_term_structure() {
        // Two partials, written out by hand
        let s = build_spectrum(200.0, 2, 1.0);
        let l: Vec<f64> = s.loudness();
        let (f0, r) = (200.0, 1.25);
        let mut expected = 0.0;
        for i in 0..2 {
            for j in 0..2 {
                let (wi, wj) = (s.multipliers[i], s.multipliers[j]);
                expected += 0.5 * kernel(f0 * wi, f0 * wj, l[i], l[j]);
                expected += 0.5 * kernel(r * f0 * wi, r * f0 * wj, l[i], l[j]);
                expected += kernel(f0 * wi, r * f0 * wj, l[i], l[j]);
            }
        }
        assert!((dyad_score(f0, r, &s) - expected / 2.0).abs() < 1e-15);
    }

    #[test]
    fn test_curve_normalized_with_exact_peak() {
        let s = build_spectrum(220.0, 6, 1.0);
        let curve = dyad_curve(220.0, &s, 1.0, 2.0, 0.01);
        assert!(curve.iter().all(|p| (0.0..=1.0).contains(&p.normalized)));
        assert!(curve.iter().any(|p| p.normalized == 1.0));
    }

    #[test]
    fn test_curve_minima_are_interior_and_sorted() {
        let s = build_spectrum(220.0, 6, 1.0);
        let curve = dyad_curve(220.0, &s, 1.0, 2.0, 0.005);
        let minima = curve_minima(&curve, 1.0, 10);
        assert!(!minima.is_empty());
        assert!(minima.windows(2).all(|w| w[0].normalized <= w[1].normalized));
        let first = curve[0].ratio;
        let last = curve[curve.len() - 1].ratio;
        assert!(minima.iter().all(|m| m.ratio != first && m.ratio != last));
        // The fifth is among the deepest consonances of a harmonic tone
        assert!(minima.iter().any(|m| (m.ratio - 1.5).abs() < 0.006));
    }
}
