//! One partial of one sounding tone: an oscillator and its gain envelope
//!
//! Envelope: gain 0 at start, linear fade-in to the partial amplitude over
//! [`FADE_IN`], exponential release to [`FLOOR`] at the voice's release time,
//! oscillator stop at the chord's stop time. Exponential ramps never target
//! 0, so the release always ends on the floor.

use crate::error::AudioResult;
use crate::graph::{AudioGraph, NodeId};
use std::sync::Arc;
use tracing::debug;

/// Linear fade-in length (seconds)
pub const FADE_IN: f64 = 0.002;
/// Release floor; exponential ramps cannot reach 0
pub const FLOOR: f64 = 1e-6;
/// Shortest forced fade-out (seconds)
pub const FORCE_GUARD: f64 = 0.010;
/// Stop times closer than this count as the same stop
pub const STOP_EPSILON: f64 = 1e-4;

/// Lifecycle of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Started,
    FadingIn,
    ReleaseScheduled,
    Stopped,
}

/// Oscillator + gain pair realizing one partial
pub struct Voice {
    graph: Arc<dyn AudioGraph>,
    oscillator: NodeId,
    gain: NodeId,
    state: VoiceState,
    committed_stop: Option<f64>,
}

impl Voice {
    /// Create the oscillator and gain nodes and wire them together
    pub fn new(graph: Arc<dyn AudioGraph>, frequency: f64) -> AudioResult<Self> {
        let oscillator = graph.create_oscillator(frequency)?;
        let gain = graph.create_gain()?;
        graph.connect(oscillator, gain)?;
        Ok(Self {
            graph,
            oscillator,
            gain,
            state: VoiceState::Idle,
            committed_stop: None,
        })
    }

    /// Node to connect downstream
    pub fn output(&self) -> NodeId {
        self.gain
    }

    pub fn oscillator(&self) -> NodeId {
        self.oscillator
    }

    pub fn state(&self) -> VoiceState {
        match self.committed_stop {
            Some(stop) if stop <= self.graph.current_time() => VoiceState::Stopped,
            _ => self.state,
        }
    }

    /// Stop time currently committed to the oscillator
    pub fn committed_stop(&self) -> Option<f64> {
        self.committed_stop
    }

    pub fn set_frequency(&self, frequency: f64, time: f64) -> AudioResult<()> {
        self.graph.set_frequency(self.oscillator, frequency, time)
    }

    /// Start the oscillator with the gain closed.
    ///
    /// An oscillator that is already running counts as started.
    pub fn start(&mut self, time: f64) -> AudioResult<()> {
        self.graph.set_value(self.gain, 0.0, time)?;
        match self.graph.start(self.oscillator, time) {
            Ok(()) => {}
            Err(e) if e.is_benign() => debug!("{}: {}", self.oscillator, e),
            Err(e) => return Err(e),
        }
        self.state = VoiceState::Started;
        Ok(())
    }

    /// Linear ramp to `amplitude`, reached [`FADE_IN`] after `start`
    pub fn fade_in(&mut self, amplitude: f64, start: f64) -> AudioResult<()> {
        self.graph.linear_ramp(self.gain, amplitude, start + FADE_IN)?;
        self.state = VoiceState::FadingIn;
        Ok(())
    }

    /// Exponential ramp to [`FLOOR`], reached at `release_end`
    pub fn schedule_release(&mut self, release_end: f64) -> AudioResult<()> {
        self.graph.exponential_ramp(self.gain, FLOOR, release_end)?;
        self.state = VoiceState::ReleaseScheduled;
        Ok(())
    }

    /// Commit an oscillator stop.
    ///
    /// A request at or before the committed stop (within [`STOP_EPSILON`])
    /// is a no-op; a later one re-commits.
    pub fn stop(&mut self, time: f64) -> AudioResult<()> {
        if let Some(committed) = self.committed_stop {
            if time <= committed + STOP_EPSILON {
                return Ok(());
            }
        }
        self.commit_stop(time)
    }

    fn commit_stop(&mut self, time: f64) -> AudioResult<()> {
        match self.graph.stop(self.oscillator, time) {
            Ok(()) => {}
            Err(e) if e.is_benign() => debug!("{}: {}", self.oscillator, e),
            Err(e) => return Err(e),
        }
        self.committed_stop = Some(time);
        Ok(())
    }

    /// Preempt the envelope: fade from the live gain to the floor and stop.
    ///
    /// The fade ends at `max(now + FORCE_GUARD, target)`; that end time is
    /// returned so the caller can size its cleanup deadline.
    pub fn force_fade_out(&mut self, now: f64, target: f64) -> AudioResult<f64> {
        // Read before cancelling: cancelling drops the ramp in progress
        let live = self.graph.current_value(self.gain)?;
        self.graph.cancel_scheduled(self.gain, now)?;
        self.graph.set_value(self.gain, live.max(FLOOR), now)?;

        let end = (now + FORCE_GUARD).max(target);
        self.graph.exponential_ramp(self.gain, FLOOR, end)?;

        // Automation was cancelled, so an earlier stop is allowed here
        self.committed_stop = None;
        self.commit_stop(end)?;
        self.state = VoiceState::ReleaseScheduled;
        Ok(end)
    }

    /// Detach both nodes from the graph
    pub fn disconnect(&self) -> AudioResult<()> {
        self.graph.disconnect(self.oscillator)?;
        self.graph.disconnect(self.gain)
    }
}
