//! Pairwise roughness kernel and loudness mapping
//!
//! Plomp–Levelt style dissonance curve in the parameterisation popularised by
//! Sethares: two decaying exponentials whose difference peaks at roughly a
//! quarter of a critical bandwidth and vanishes at unison and at wide
//! separations.
//!
//! Both aggregators (dyad and triad) call these two functions and nothing
//! else, so the constants below define the shape of every curve and surface.

/// Frequency-difference scale numerator
pub const X_STAR: f64 = 0.24;
/// Critical-band slope (per Hz of the lower partial)
pub const S1: f64 = 0.0207;
/// Critical-band offset (Hz)
pub const S2: f64 = 18.96;
/// Slow decay rate
pub const B1: f64 = 3.51;
/// Fast decay rate
pub const B2: f64 = 5.75;

/// Roughness of two sine partials.
///
/// Symmetric in the two frequencies and in the two loudness weights. The
/// result is scaled by the quieter partial only: `min(l1, l2)`.
///
/// ```
/// use roughness::roughness_kernel::kernel;
///
/// assert_eq!(kernel(440.0, 440.0, 1.0, 1.0), 0.0);
/// assert!(kernel(440.0, 466.0, 1.0, 1.0) > 0.0);
/// ```
#[inline]
pub fn kernel(f1: f64, f2: f64, l1: f64, l2: f64) -> f64 {
    let f_min = f1.min(f2);
    let f_max = f1.max(f2);
    let s = X_STAR / (S1 * f_min + S2);
    let p = s * (f_max - f_min);
    l1.min(l2) * ((-B1 * p).exp() - (-B2 * p).exp())
}

/// Map a linear partial amplitude to the loudness unit used by the kernel.
///
/// `L(a) = 2^(dB(a)/10) / 16` with `dB(a) = 20·log10(a)`. This is a fixed
/// empirical mapping, not phon loudness. Non-positive amplitudes have no
/// decibel value and yield NaN (or zero for exactly 0, since
/// `log10(0) = -inf`), which callers surface rather than clamp.
#[inline]
pub fn loudness(amplitude: f64) -> f64 {
    let db = 20.0 * amplitude.log10();
    2f64.powf(db / 10.0) / 16.0
}
