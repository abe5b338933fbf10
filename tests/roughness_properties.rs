/// Properties of the roughness kernel and the dyad aggregator
///
/// - kernel vanishes at unison and is symmetric in both argument pairs
/// - dyad sweeps normalize to [0, 1] with the argmax at exactly 1
/// - a single pure partial puts unison and octave well below the
///   semitone region
use roughness::dyad::{curve_minima, dyad_curve, dyad_score};
use roughness::roughness_kernel::{kernel, loudness};
use roughness::spectrum::{build_spectrum, Spectrum};

fn sample_at(curve: &[roughness::DyadSample], ratio: f64) -> f64 {
    curve
        .iter()
        .find(|s| (s.ratio - ratio).abs() < 1e-9)
        .map(|s| s.normalized)
        .unwrap_or_else(|| panic!("ratio {} not on the axis", ratio))
}

// ========== Kernel ==========

#[test]
fn test_kernel_zero_at_unison() {
    for &f in &[55.0, 220.0, 1000.0, 4186.0] {
        for &(l1, l2) in &[(0.0, 0.0), (0.1, 0.9), (1.0, 1.0), (2.5, 0.3)] {
            assert_eq!(kernel(f, f, l1, l2), 0.0, "f={} l=({}, {})", f, l1, l2);
        }
    }
}

#[test]
fn test_kernel_symmetry() {
    let pairs = [(220.0, 233.0), (440.0, 300.0), (100.0, 180.0)];
    for &(f1, f2) in &pairs {
        let base = kernel(f1, f2, 0.3, 0.7);
        assert!((base - kernel(f2, f1, 0.3, 0.7)).abs() < 1e-15);
        assert!((base - kernel(f1, f2, 0.7, 0.3)).abs() < 1e-15);
    }
}

#[test]
fn test_kernel_peaks_near_quarter_critical_band() {
    // Roughness rises from unison, peaks, then decays with separation
    let near = kernel(440.0, 445.0, 1.0, 1.0);
    let rough = kernel(440.0, 465.0, 1.0, 1.0);
    let far = kernel(440.0, 880.0, 1.0, 1.0);
    assert!(rough > near);
    assert!(rough > far);
    assert!(far >= 0.0);
}

#[test]
fn test_loudness_mapping() {
    assert!((loudness(1.0) - 1.0 / 16.0).abs() < 1e-12);
    assert!((loudness(10.0) - 0.25).abs() < 1e-12);
    assert!(loudness(0.5) < loudness(1.0));
}

// ========== Dyad ==========

#[test]
fn test_dyad_unison_single_partial_is_zero() {
    let spectrum = build_spectrum(220.0, 1, 1.0);
    assert_eq!(dyad_score(220.0, 1.0, &spectrum), 0.0);
}

#[test]
fn test_dyad_unison_is_finite_for_rich_spectrum() {
    let spectrum = build_spectrum(220.0, 12, 0.5);
    let score = dyad_score(220.0, 1.0, &spectrum);
    assert!(score.is_finite());
    assert!(score >= 0.0);
    assert_eq!(score, dyad_score(220.0, 1.0, &spectrum));
}

#[test]
fn test_dyad_empty_spectrum_scores_zero() {
    assert_eq!(dyad_score(220.0, 1.5, &Spectrum::empty()), 0.0);
}

#[test]
fn test_octave_smoother_than_semitone_region() {
    let spectrum = build_spectrum(220.0, 1, 1.0);
    let curve = dyad_curve(220.0, &spectrum, 1.0, 2.0, 0.005);
    assert_eq!(sample_at(&curve, 1.0), 0.0);
    assert!(sample_at(&curve, 2.0) < sample_at(&curve, 1.05));
}

#[test]
fn test_sweep_normalization() {
    let spectrum = build_spectrum(261.63, 6, 1.0);
    let curve = dyad_curve(261.63, &spectrum, 1.0, 2.0, 0.01);
    assert_eq!(curve.len(), 101);
    assert!(curve.iter().all(|s| (0.0..=1.0).contains(&s.normalized)));
    assert!(curve.iter().any(|s| s.normalized == 1.0));
}

#[test]
fn test_sweep_with_no_roughness_is_all_zero() {
    let curve = dyad_curve(220.0, &Spectrum::empty(), 1.0, 2.0, 0.1);
    assert!(curve.iter().all(|s| s.normalized == 0.0 && s.raw == 0.0));
}

#[test]
fn test_harmonic_spectrum_finds_just_intervals() {
    let spectrum = build_spectrum(220.0, 6, 1.0);
    let curve = dyad_curve(220.0, &spectrum, 1.0, 2.0, 0.005);
    let minima = curve_minima(&curve, 1.0, 20);
    let has = |r: f64| minima.iter().any(|m| (m.ratio - r).abs() < 0.011);
    assert!(has(1.5), "fifth missing from {:?}", minima);
    for pair in minima.windows(2) {
        assert!(pair[0].normalized <= pair[1].normalized);
    }
}
