//! Harmonic partial spectra
//!
//! A spectrum is two index-aligned sequences: frequency multipliers relative
//! to the fundamental (`ω_k = k`) and linear amplitudes (`a_k = k^-ρ`).

use crate::roughness_kernel::loudness;
use serde::{Deserialize, Serialize};

/// Harmonic partial stack of one tone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Frequency multipliers relative to the fundamental (ω ≥ 1)
    pub multipliers: Vec<f64>,
    /// Linear amplitude per partial (a > 0)
    pub amplitudes: Vec<f64>,
}

impl Spectrum {
    /// Build from parallel slices. Extra entries on the longer side are dropped.
    pub fn from_parts(multipliers: &[f64], amplitudes: &[f64]) -> Self {
        let n = multipliers.len().min(amplitudes.len());
        Self {
            multipliers: multipliers[..n].to_vec(),
            amplitudes: amplitudes[..n].to_vec(),
        }
    }

    /// Spectrum with no partials; every score over it is zero
    pub fn empty() -> Self {
        Self {
            multipliers: Vec::new(),
            amplitudes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.multipliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.multipliers.is_empty()
    }

    /// Kernel loudness weight of every partial, index-aligned
    pub fn loudness(&self) -> Vec<f64> {
        self.amplitudes.iter().map(|&a| loudness(a)).collect()
    }

    /// Iterate `(multiplier, amplitude)` pairs
    pub fn partials(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.multipliers
            .iter()
            .copied()
            .zip(self.amplitudes.iter().copied())
    }
}

/// Build a harmonic spectrum with `partials` harmonics and amplitude roll-off `rolloff`.
///
/// The fundamental only identifies the tone; multipliers are normalized to it.
/// A partial count of 0 is clamped to 1.
///
/// ```
/// use roughness::spectrum::build_spectrum;
///
/// let s = build_spectrum(220.0, 3, 1.0);
/// assert_eq!(s.multipliers, vec![1.0, 2.0, 3.0]);
/// assert_eq!(s.amplitudes[1], 0.5);
/// ```
pub fn build_spectrum(_fundamental: f64, partials: usize, rolloff: f64) -> Spectrum {
    let n = partials.max(1);
    let mut multipliers = Vec::with_capacity(n);
    let mut amplitudes = Vec::with_capacity(n);
    for k in 1..=n {
        let k = k as f64;
        multipliers.push(k);
        amplitudes.push(k.powf(-rolloff));
    }
    Spectrum {
        multipliers,
        amplitudes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harmonic_series() {
        let s = build_spectrum(110.0, 6, 2.0);
        assert_eq!(s.len(), 6);
        assert_eq!(s.multipliers, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(s.amplitudes[0], 1.0);
        assert!((s.amplitudes[3] - 1.0 / 16.0).abs() < 1e-15);
    }

    #[test]
    fn test_zero_partials_clamped() {
        let s = build_spectrum(440.0, 0, 1.0);
        assert_eq!(s.len(), 1);
        assert_eq!(s.amplitudes, vec![1.0]);
    }

    #[test]
    fn test_flat_rolloff() {
        let s = build_spectrum(440.0, 4, 0.0);
        assert!(s.amplitudes.iter().all(|&a| a == 1.0));
    }

    #[test]
    fn test_from_parts_truncates() {
        let s = Spectrum::from_parts(&[1.0, 2.0, 3.0], &[1.0, 0.5]);
        assert_eq!(s.len(), 2);
        assert!(Spectrum::empty().is_empty());
    }
}
