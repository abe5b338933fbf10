//! Cross-instance exclusivity signalling
//!
//! Before an instance starts a chord it publishes a [`StopSignal`] on its
//! channel; every other instance listening on that channel silences
//! itself. Delivery is best-effort and unordered.

use crate::error::AudioResult;
use crate::scheduler::InstanceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// "Stop whatever you are playing": sent by `sender` on `channel`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSignal {
    pub channel: String,
    pub sender: InstanceId,
    /// Free-form tag of the surface that triggered the play
    pub source: String,
}

impl StopSignal {
    pub fn new(channel: &str, sender: InstanceId, source: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender,
            source: source.to_string(),
        }
    }
}

pub type SignalHandler = Arc<dyn Fn(&StopSignal) + Send + Sync>;

/// Publish/subscribe primitive shared by independent instances
pub trait ExclusiveBus: Send + Sync {
    fn publish(&self, signal: &StopSignal) -> AudioResult<()>;

    fn subscribe(&self, channel: &str, handler: SignalHandler) -> AudioResult<()>;
}

/// In-process bus: handlers run synchronously inside `publish`.
///
/// Every subscriber on the channel is called, including the publisher's
/// own handler; receivers filter on [`StopSignal::sender`].
#[derive(Default)]
pub struct LocalBus {
    handlers: Mutex<HashMap<String, Vec<SignalHandler>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, Vec::len)
    }
}

impl ExclusiveBus for LocalBus {
    fn publish(&self, signal: &StopSignal) -> AudioResult<()> {
        // Clone out so handlers may publish or subscribe themselves
        let handlers: Vec<SignalHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&signal.channel)
            .cloned()
            .unwrap_or_default();

        debug!(
            "Bus '{}': {} from {} -> {} handlers",
            signal.channel,
            signal.source,
            signal.sender,
            handlers.len()
        );
        for handler in handlers {
            handler(signal);
        }
        Ok(())
    }

    fn subscribe(&self, channel: &str, handler: SignalHandler) -> AudioResult<()> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }
}
