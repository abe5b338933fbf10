//! Parameter automation timeline
//!
//! Set / linear-ramp / exponential-ramp events on absolute times. A ramp
//! event describes the segment that ends at its time and starts at the
//! previous event (or at the default value at time 0).

use crate::error::{AudioError, AudioResult};

#[derive(Debug, Clone, Copy, PartialEq)]
enum AutomationEvent {
    Set { value: f64, time: f64 },
    Linear { value: f64, time: f64 },
    Exponential { value: f64, time: f64 },
}

impl AutomationEvent {
    fn time(&self) -> f64 {
        match *self {
            AutomationEvent::Set { time, .. }
            | AutomationEvent::Linear { time, .. }
            | AutomationEvent::Exponential { time, .. } => time,
        }
    }

    fn value(&self) -> f64 {
        match *self {
            AutomationEvent::Set { value, .. }
            | AutomationEvent::Linear { value, .. }
            | AutomationEvent::Exponential { value, .. } => value,
        }
    }
}

/// Automation of one parameter
#[derive(Debug, Clone)]
pub struct ParamTimeline {
    default: f64,
    events: Vec<AutomationEvent>,
}

impl ParamTimeline {
    pub fn new(default: f64) -> Self {
        Self {
            default,
            events: Vec::new(),
        }
    }

    // Events stay sorted; equal times keep insertion order.
    fn insert(&mut self, event: AutomationEvent) {
        let pos = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(pos, event);
    }

    pub fn set_value(&mut self, value: f64, time: f64) {
        self.insert(AutomationEvent::Set { value, time });
    }

    pub fn linear_ramp(&mut self, value: f64, time: f64) {
        self.insert(AutomationEvent::Linear { value, time });
    }

    pub fn exponential_ramp(&mut self, value: f64, time: f64) -> AudioResult<()> {
        if !(value > 0.0) {
            return Err(AudioError::InvalidState(format!(
                "exponential ramp target must be positive, got {}",
                value
            )));
        }
        self.insert(AutomationEvent::Exponential { value, time });
        Ok(())
    }

    /// Remove every event at or after `time`
    pub fn cancel_from(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Time of the last scheduled event, if any
    pub fn last_event_time(&self) -> Option<f64> {
        self.events.last().map(AutomationEvent::time)
    }

    /// Parameter value at `time`
    pub fn value_at(&self, time: f64) -> f64 {
        let next_idx = self.events.partition_point(|e| e.time() <= time);
        let (prev_value, prev_time) = match next_idx.checked_sub(1) {
            Some(i) => (self.events[i].value(), self.events[i].time()),
            None => (self.default, 0.0),
        };

        let Some(next) = self.events.get(next_idx) else {
            return prev_value;
        };

        let span = next.time() - prev_time;
        let progress = if span > 0.0 {
            ((time - prev_time) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };

        match *next {
            AutomationEvent::Set { .. } => prev_value,
            AutomationEvent::Linear { value, .. } => prev_value + (value - prev_value) * progress,
            AutomationEvent::Exponential { value, .. } => {
                // Undefined from a non-positive start: hold
                if prev_value <= 0.0 {
                    prev_value
                } else {
                    prev_value * (value / prev_value).powf(progress)
                }
            }
        }
    }
}
