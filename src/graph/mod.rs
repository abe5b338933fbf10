//! Audio clock + output graph capability
//!
//! The scheduler never talks to a device directly. It drives an
//! [`AudioGraph`]: a monotonic clock plus oscillator and gain nodes whose
//! parameters are automated against absolute clock times. Nodes are
//! addressed by [`NodeId`] handles so voices can hold them without
//! borrowing the graph.
//!
//! Implementations:
//! - [`RenderGraph`] - software graph, clock advanced by rendering frames
//! - [`MockGraph`] - records every call, delegates to a `RenderGraph`
//! - [`LiveOutput`] - cpal device fed from a `RenderGraph` (feature `live`)

pub mod mock;
pub mod render;
pub mod timeline;

#[cfg(feature = "live")]
pub mod live;

pub use mock::{GraphCall, MockGraph, MockGraphFactory};
pub use render::{RenderGraph, RenderGraphFactory};
pub use timeline::ParamTimeline;

#[cfg(feature = "live")]
pub use live::{LiveOutput, LiveOutputFactory};

use crate::error::AudioResult;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Handle of a node inside one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Future returned by [`AudioGraph::resume`]
pub type GraphFuture<'a> = Pin<Box<dyn Future<Output = AudioResult<()>> + Send + 'a>>;

/// Audio clock and output graph driven by the tone scheduler.
///
/// All times are absolute seconds on the graph's own clock. Parameter
/// methods on a gain node automate its gain; `set_frequency` automates an
/// oscillator's frequency.
pub trait AudioGraph: Send + Sync {
    /// Current time of the monotonic audio clock in seconds
    fn current_time(&self) -> f64;

    /// Make sure the clock is running. May suspend, may fail.
    fn resume(&self) -> GraphFuture<'_>;

    fn is_closed(&self) -> bool;

    /// Close the graph; every later call fails with `AudioError::Closed`
    fn close(&self);

    /// Final output node
    fn destination(&self) -> NodeId;

    /// Create a sine oscillator
    fn create_oscillator(&self, frequency: f64) -> AudioResult<NodeId>;

    /// Create a gain node (initial gain 1.0)
    fn create_gain(&self) -> AudioResult<NodeId>;

    /// Start an oscillator. Starting twice is `InvalidState`.
    fn start(&self, node: NodeId, time: f64) -> AudioResult<()>;

    /// Schedule an oscillator stop. A later call replaces the stop time;
    /// stopping an oscillator that already finished is `InvalidState`.
    fn stop(&self, node: NodeId, time: f64) -> AudioResult<()>;

    fn set_frequency(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()>;

    fn set_value(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()>;

    fn linear_ramp(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()>;

    /// Exponential ramp; `value` must be positive
    fn exponential_ramp(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()>;

    /// Drop every automation event at or after `time`
    fn cancel_scheduled(&self, node: NodeId, time: f64) -> AudioResult<()>;

    /// Live gain value at the current clock time
    fn current_value(&self, node: NodeId) -> AudioResult<f64>;

    fn connect(&self, from: NodeId, to: NodeId) -> AudioResult<()>;

    /// Remove every edge touching `node` and release it
    fn disconnect(&self, node: NodeId) -> AudioResult<()>;
}

/// Creates output graphs on demand
pub trait GraphFactory: Send + Sync {
    fn create(&self) -> AudioResult<Arc<dyn AudioGraph>>;
}
