//! Recording graph for tests and diagnostics
//!
//! Every call is logged as a [`GraphCall`] and then forwarded to an inner
//! [`RenderGraph`], so recorded sessions still produce real automation and
//! real samples. Failures can be injected to exercise the scheduler's
//! degraded paths.

use super::render::RenderGraph;
use super::{AudioGraph, GraphFactory, GraphFuture, NodeId};
use crate::error::{AudioError, AudioResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One call made against a [`MockGraph`]
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCall {
    Resume,
    Close,
    CreateOscillator { frequency: f64 },
    CreateGain,
    Start { node: NodeId, time: f64 },
    Stop { node: NodeId, time: f64 },
    SetFrequency { node: NodeId, value: f64, time: f64 },
    SetValue { node: NodeId, value: f64, time: f64 },
    LinearRamp { node: NodeId, value: f64, time: f64 },
    ExponentialRamp { node: NodeId, value: f64, time: f64 },
    CancelScheduled { node: NodeId, time: f64 },
    CurrentValue { node: NodeId },
    Connect { from: NodeId, to: NodeId },
    Disconnect { node: NodeId },
}

/// Recording [`AudioGraph`]
pub struct MockGraph {
    inner: RenderGraph,
    calls: Mutex<Vec<GraphCall>>,
    fail_resume: AtomicBool,
    fail_next_start: Mutex<Option<String>>,
}

impl MockGraph {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            inner: RenderGraph::new(sample_rate),
            calls: Mutex::new(Vec::new()),
            fail_resume: AtomicBool::new(false),
            fail_next_start: Mutex::new(None),
        }
    }

    fn log(&self) -> MutexGuard<'_, Vec<GraphCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: GraphCall) {
        self.log().push(call);
    }

    /// Snapshot of every call so far
    pub fn calls(&self) -> Vec<GraphCall> {
        self.log().clone()
    }

    pub fn clear_calls(&self) {
        self.log().clear();
    }

    /// Number of recorded calls matching `pred`
    pub fn count(&self, pred: impl Fn(&GraphCall) -> bool) -> usize {
        self.log().iter().filter(|c| pred(c)).count()
    }

    /// Make `resume` fail with `Unavailable` (device locked, no gesture yet)
    pub fn set_fail_resume(&self, fail: bool) {
        self.fail_resume.store(fail, Ordering::SeqCst);
    }

    /// Make the next `start` fail with a driver error
    pub fn fail_next_start(&self, message: &str) {
        *self
            .fail_next_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }

    /// Advance the clock without synthesizing
    pub fn advance(&self, seconds: f64) {
        self.inner.skip(seconds);
    }

    pub fn render(&self, frames: usize) -> Vec<f32> {
        self.inner.render(frames)
    }

    pub fn inner(&self) -> &RenderGraph {
        &self.inner
    }
}

impl AudioGraph for MockGraph {
    fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    fn resume(&self) -> GraphFuture<'_> {
        self.record(GraphCall::Resume);
        if self.fail_resume.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err::<(), AudioError>(AudioError::Unavailable(
                    "resume requires a user gesture".into(),
                ))
            });
        }
        self.inner.resume()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn close(&self) {
        self.record(GraphCall::Close);
        self.inner.close()
    }

    fn destination(&self) -> NodeId {
        self.inner.destination()
    }

    fn create_oscillator(&self, frequency: f64) -> AudioResult<NodeId> {
        self.record(GraphCall::CreateOscillator { frequency });
        self.inner.create_oscillator(frequency)
    }

    fn create_gain(&self) -> AudioResult<NodeId> {
        self.record(GraphCall::CreateGain);
        self.inner.create_gain()
    }

    fn start(&self, node: NodeId, time: f64) -> AudioResult<()> {
        self.record(GraphCall::Start { node, time });
        let injected = self
            .fail_next_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(message) = injected {
            return Err(AudioError::Driver(message));
        }
        self.inner.start(node, time)
    }

    fn stop(&self, node: NodeId, time: f64) -> AudioResult<()> {
        self.record(GraphCall::Stop { node, time });
        self.inner.stop(node, time)
    }

    fn set_frequency(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()> {
        self.record(GraphCall::SetFrequency { node, value, time });
        self.inner.set_frequency(node, value, time)
    }

    fn set_value(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()> {
        self.record(GraphCall::SetValue { node, value, time });
        self.inner.set_value(node, value, time)
    }

    fn linear_ramp(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()> {
        self.record(GraphCall::LinearRamp { node, value, time });
        self.inner.linear_ramp(node, value, time)
    }

    fn exponential_ramp(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()> {
        self.record(GraphCall::ExponentialRamp { node, value, time });
        self.inner.exponential_ramp(node, value, time)
    }

    fn cancel_scheduled(&self, node: NodeId, time: f64) -> AudioResult<()> {
        self.record(GraphCall::CancelScheduled { node, time });
        self.inner.cancel_scheduled(node, time)
    }

    fn current_value(&self, node: NodeId) -> AudioResult<f64> {
        self.record(GraphCall::CurrentValue { node });
        self.inner.current_value(node)
    }

    fn connect(&self, from: NodeId, to: NodeId) -> AudioResult<()> {
        self.record(GraphCall::Connect { from, to });
        self.inner.connect(from, to)
    }

    fn disconnect(&self, node: NodeId) -> AudioResult<()> {
        self.record(GraphCall::Disconnect { node });
        self.inner.disconnect(node)
    }
}

/// Hands out [`MockGraph`]s and keeps them reachable for assertions
pub struct MockGraphFactory {
    sample_rate: f64,
    graphs: Mutex<Vec<Arc<MockGraph>>>,
    fail_create: AtomicBool,
    fail_resume: AtomicBool,
}

impl MockGraphFactory {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            graphs: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            fail_resume: AtomicBool::new(false),
        }
    }

    fn graphs_lock(&self) -> MutexGuard<'_, Vec<Arc<MockGraph>>> {
        self.graphs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `create` fail with `Unavailable`
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Graphs created from now on refuse to resume
    pub fn set_fail_resume(&self, fail: bool) {
        self.fail_resume.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.graphs_lock().len()
    }

    /// Most recently created graph
    pub fn latest(&self) -> Option<Arc<MockGraph>> {
        self.graphs_lock().last().cloned()
    }
}

impl GraphFactory for MockGraphFactory {
    fn create(&self) -> AudioResult<Arc<dyn AudioGraph>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AudioError::Unavailable("no output device".into()));
        }
        let graph = Arc::new(MockGraph::new(self.sample_rate));
        graph.set_fail_resume(self.fail_resume.load(Ordering::SeqCst));
        self.graphs_lock().push(graph.clone());
        Ok(graph as Arc<dyn AudioGraph>)
    }
}
