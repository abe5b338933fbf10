//! Chord synth: every partial of one sounding tone
//!
//! One [`Voice`] per spectrum partial, summed into a master gain. Release
//! onsets stagger by partial index so the upper partials die first, but
//! every oscillator stops at the same absolute time.

use crate::error::AudioResult;
use crate::graph::{AudioGraph, NodeId};
use crate::spectrum::Spectrum;
use crate::voice::{Voice, FADE_IN};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Release timing for natural and forced endings (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeTimes {
    /// Note length: stop time after start, and release end of partial 0
    pub release: f64,
    /// Release end moves this much earlier per partial index
    pub stagger: f64,
    /// Forced-silence release of partial 0
    pub quick_release: f64,
    /// Forced-silence stagger per partial index
    pub quick_stagger: f64,
}

impl Default for EnvelopeTimes {
    fn default() -> Self {
        Self {
            release: 1.6,
            stagger: 0.08,
            quick_release: 0.12,
            quick_stagger: 0.01,
        }
    }
}

/// Master level for a chord of `partials` voices.
///
/// Floored at 0.5 so sparse and dense spectra stay comparable.
pub fn master_level(partials: usize) -> f64 {
    (1.0 / partials.max(1) as f64).max(0.5)
}

/// All voices of one tone for one play event
pub struct ChordSynth {
    graph: Arc<dyn AudioGraph>,
    spectrum: Spectrum,
    voices: Vec<Voice>,
    master: NodeId,
    times: EnvelopeTimes,
    forced_end: Option<f64>,
}

impl ChordSynth {
    pub fn new(
        graph: Arc<dyn AudioGraph>,
        spectrum: Spectrum,
        times: EnvelopeTimes,
    ) -> AudioResult<Self> {
        let master = graph.create_gain()?;
        graph.set_value(master, master_level(spectrum.len()), graph.current_time())?;

        let mut voices = Vec::with_capacity(spectrum.len());
        for &multiplier in &spectrum.multipliers {
            let voice = Voice::new(graph.clone(), multiplier)?;
            graph.connect(voice.output(), master)?;
            voices.push(voice);
        }

        Ok(Self {
            graph,
            spectrum,
            voices,
            master,
            times,
            forced_end: None,
        })
    }

    pub fn output(&self) -> NodeId {
        self.master
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Latest committed oscillator stop, `None` before `play`
    pub fn stop_time(&self) -> Option<f64> {
        self.voices
            .iter()
            .filter_map(Voice::committed_stop)
            .reduce(f64::max)
    }

    pub fn connect(&self, destination: NodeId) -> AudioResult<()> {
        self.graph.connect(self.master, destination)
    }

    /// Schedule the whole tone starting at `start`; returns the stop time.
    ///
    /// An empty spectrum schedules nothing and returns `start`.
    pub fn play(&mut self, base_frequency: f64, start: f64) -> AudioResult<f64> {
        if self.voices.is_empty() {
            return Ok(start);
        }

        let stop_at = start + self.times.release;
        let partials = self.voices.iter_mut().zip(self.spectrum.partials());
        for (idx, (voice, (multiplier, amplitude))) in partials.enumerate() {
            let release_end =
                (stop_at - idx as f64 * self.times.stagger).max(start + FADE_IN);

            voice.set_frequency(base_frequency * multiplier, start)?;
            voice.start(start)?;
            voice.fade_in(amplitude, start)?;
            voice.schedule_release(release_end)?;
            voice.stop(stop_at)?;
        }

        debug!(
            "Chord at {:.2} Hz: {} partials, {:.3}s..{:.3}s",
            base_frequency,
            self.voices.len(),
            start,
            stop_at
        );
        Ok(stop_at)
    }

    /// Quick staggered fade of every voice; returns the latest actual end.
    ///
    /// Repeating the call while a forced fade is still running keeps the
    /// first fade and returns its end.
    pub fn force_silence(&mut self, now: f64) -> AudioResult<f64> {
        if let Some(end) = self.forced_end {
            if end > now {
                return Ok(end);
            }
        }

        let mut latest = now;
        for (idx, voice) in self.voices.iter_mut().enumerate() {
            let target =
                (now + self.times.quick_release - idx as f64 * self.times.quick_stagger).max(now);
            let end = voice.force_fade_out(now, target)?;
            latest = latest.max(end);
        }
        self.forced_end = Some(latest);
        Ok(latest)
    }

    /// Release every node; voices first, then the master gain
    pub fn disconnect(&self) -> AudioResult<()> {
        for voice in &self.voices {
            voice.disconnect()?;
        }
        self.graph.disconnect(self.master)
    }
}
