//! # Roughness - psychoacoustic dissonance explorer
//!
//! Roughness scores intervals and chords with a Plomp-Levelt style
//! sensory-dissonance model and plays them back through a click-free
//! additive synthesizer.
//!
//! ## Core Features
//!
//! - **Roughness Engine**: harmonic spectra, pairwise roughness kernel,
//!   dyad curves and normalized triad surfaces with local-minima search
//! - **Tone Scheduler**: chords of staggered-release partials, forced
//!   silencing on preemption, cancellable cleanup
//! - **Exclusivity Bus**: independent instances on one machine never sound
//!   at the same time (in-process or over Unix datagram sockets)
//! - **Output Graphs**: software render graph, recording mock, cpal device
//!
//! ## Quick Start
//!
//! ### Dissonance of a dyad
//!
//! ```rust
//! use roughness::dyad::dyad_score;
//! use roughness::spectrum::build_spectrum;
//!
//! let spectrum = build_spectrum(220.0, 6, 1.0);
//! let fifth = dyad_score(220.0, 1.5, &spectrum);
//! let tritone = dyad_score(220.0, 1.414, &spectrum);
//! assert!(fifth < tritone);
//! ```
//!
//! ### Consonant triads
//!
//! ```rust
//! use roughness::spectrum::build_spectrum;
//! use roughness::triad::{build_triad_surface, extract_local_minima, TriadParams};
//!
//! let params = TriadParams::new(220.0, build_spectrum(220.0, 4, 1.0)).with_step(0.05);
//! let surface = build_triad_surface(&params);
//! let minima = extract_local_minima(&surface, 0.5, 5);
//! assert!(minima.len() <= 5);
//! ```
//!
//! ### Rendering a chord
//!
//! ```rust
//! use roughness::chord_synth::EnvelopeTimes;
//! use roughness::graph::RenderGraphFactory;
//! use roughness::scheduler::{PlayRequest, ToneScheduler};
//! use roughness::spectrum::build_spectrum;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let scheduler = ToneScheduler::new(
//!     Arc::new(RenderGraphFactory::new(48_000.0)),
//!     EnvelopeTimes::default(),
//! );
//! let request = PlayRequest::new(220.0, build_spectrum(220.0, 6, 1.0))
//!     .with_tuning(vec![1.0, 1.25, 1.5]);
//! scheduler.play(&request).await.unwrap();
//! assert_eq!(scheduler.active_group_count(), 3);
//! # });
//! ```

pub mod bus;
pub mod chord_synth;
pub mod config;
pub mod dyad;
pub mod error;
pub mod graph;
#[cfg(unix)]
pub mod ipc;
pub mod pitch;
pub mod roughness_kernel;
pub mod scheduler;
pub mod spectrum;
pub mod triad;
pub mod voice;

pub use chord_synth::{ChordSynth, EnvelopeTimes};
pub use config::EngineConfig;
pub use dyad::{curve_minima, dyad_curve, dyad_score, DyadSample};
pub use error::{AudioError, AudioResult};
pub use roughness_kernel::{kernel, loudness};
pub use scheduler::{PlayRequest, ToneScheduler};
pub use spectrum::{build_spectrum, Spectrum};
pub use triad::{build_triad_surface, extract_local_minima, LocalMinimum, TriadParams, TriadSurface};
