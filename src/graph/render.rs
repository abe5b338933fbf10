//! Software output graph
//!
//! Sine oscillators feed gain nodes which feed the destination. The clock
//! only moves while rendering (or skipping) frames, so offline renders and
//! tests are fully deterministic. A device backend renders from the same
//! graph inside its audio callback.

use super::timeline::ParamTimeline;
use super::{AudioGraph, GraphFactory, GraphFuture, NodeId};
use crate::error::{AudioError, AudioResult};
use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
enum RunState {
    Suspended,
    Running,
    Closed,
}

#[derive(Debug)]
struct OscillatorState {
    frequency: ParamTimeline,
    start: Option<f64>,
    stop: Option<f64>,
    phase: f64,
}

#[derive(Debug)]
enum NodeKind {
    Destination,
    Oscillator(OscillatorState),
    Gain(ParamTimeline),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    inputs: Vec<NodeId>,
}

#[derive(Debug)]
struct GraphState {
    run_state: RunState,
    frames: u64,
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
}

impl GraphState {
    fn node_mut(&mut self, id: NodeId) -> AudioResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(AudioError::UnknownNode(id))
    }

    fn gain_mut(&mut self, id: NodeId) -> AudioResult<&mut ParamTimeline> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Gain(param) => Ok(param),
            _ => Err(AudioError::Driver(format!("{} is not a gain node", id))),
        }
    }

    fn oscillator_mut(&mut self, id: NodeId) -> AudioResult<&mut OscillatorState> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Oscillator(osc) => Ok(osc),
            _ => Err(AudioError::Driver(format!("{} is not an oscillator", id))),
        }
    }

    fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                kind,
                inputs: Vec::new(),
            },
        );
        id
    }

    // Post-order from the destination: inputs before the nodes they feed.
    fn render_order(&self, destination: NodeId) -> Vec<NodeId> {
        fn visit(
            state: &GraphState,
            id: NodeId,
            seen: &mut HashSet<NodeId>,
            order: &mut Vec<NodeId>,
        ) {
            if !seen.insert(id) {
                return;
            }
            if let Some(node) = state.nodes.get(&id) {
                for &input in &node.inputs {
                    visit(state, input, seen, order);
                }
                order.push(id);
            }
        }
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        visit(self, destination, &mut seen, &mut order);
        order
    }
}

/// Deterministic software audio graph
pub struct RenderGraph {
    sample_rate: f64,
    destination: NodeId,
    state: Mutex<GraphState>,
    /// Frames output as silence while the state was busy; folded into the clock
    missed: AtomicU64,
}

impl RenderGraph {
    pub fn new(sample_rate: f64) -> Self {
        let mut state = GraphState {
            run_state: RunState::Suspended,
            frames: 0,
            nodes: HashMap::new(),
            next_id: 0,
        };
        let destination = state.add(NodeKind::Destination);
        Self {
            sample_rate,
            destination,
            state: Mutex::new(state),
            missed: AtomicU64::new(0),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_open(&self) -> AudioResult<MutexGuard<'_, GraphState>> {
        let state = self.lock();
        if state.run_state == RunState::Closed {
            return Err(AudioError::Closed);
        }
        Ok(state)
    }

    fn now(&self, state: &GraphState) -> f64 {
        (state.frames + self.missed.load(Ordering::Relaxed)) as f64 / self.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.lock().run_state == RunState::Running
    }

    /// Number of live nodes, destination included
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Advance the clock without synthesizing
    pub fn skip(&self, seconds: f64) {
        let mut state = self.lock();
        if state.run_state == RunState::Running {
            state.frames += (seconds * self.sample_rate).round() as u64;
        }
    }

    /// Render `frames` mono samples and advance the clock.
    ///
    /// A suspended or closed graph renders silence and its clock stands still.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames];
        self.render_into(&mut out);
        out
    }

    pub fn render_into(&self, out: &mut [f32]) {
        let mut state = self.lock();
        self.render_locked(&mut state, out);
    }

    /// Render without waiting on control-thread work.
    ///
    /// When the graph state is held elsewhere the buffer is filled with
    /// silence, the frames still count toward the clock, and `false` is
    /// returned.
    pub fn try_render_into(&self, out: &mut [f32]) -> bool {
        match self.state.try_lock() {
            Ok(mut state) => {
                self.render_locked(&mut state, out);
                true
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                self.render_locked(&mut poisoned.into_inner(), out);
                true
            }
            Err(TryLockError::WouldBlock) => {
                out.iter_mut().for_each(|s| *s = 0.0);
                self.missed.fetch_add(out.len() as u64, Ordering::Relaxed);
                false
            }
        }
    }

    fn render_locked(&self, state: &mut GraphState, out: &mut [f32]) {
        let missed = self.missed.swap(0, Ordering::Relaxed);
        if state.run_state == RunState::Running {
            state.frames += missed;
        }
        if state.run_state != RunState::Running {
            out.iter_mut().for_each(|s| *s = 0.0);
            return;
        }

        let order = state.render_order(self.destination);
        let index: HashMap<NodeId, usize> =
            order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let inputs: Vec<Vec<usize>> = order
            .iter()
            .map(|id| {
                state.nodes[id]
                    .inputs
                    .iter()
                    .filter_map(|input| index.get(input).copied())
                    .collect()
            })
            .collect();

        let mut values = vec![0.0f64; order.len()];
        let start_frame = state.frames;
        for (n, sample) in out.iter_mut().enumerate() {
            let t = (start_frame + n as u64) as f64 / self.sample_rate;
            for (slot, id) in order.iter().enumerate() {
                let input_sum: f64 = inputs[slot].iter().map(|&i| values[i]).sum();
                let node = state.nodes.get_mut(id).map(|n| &mut n.kind);
                values[slot] = match node {
                    Some(NodeKind::Oscillator(osc)) => {
                        let active = osc.start.is_some_and(|s| t >= s)
                            && osc.stop.map_or(true, |s| t < s);
                        if active {
                            let v = osc.phase.sin();
                            osc.phase = (osc.phase + TAU * osc.frequency.value_at(t) / self.sample_rate) % TAU;
                            v
                        } else {
                            0.0
                        }
                    }
                    Some(NodeKind::Gain(param)) => input_sum * param.value_at(t),
                    Some(NodeKind::Destination) => input_sum,
                    None => 0.0,
                };
            }
            let mixed = index.get(&self.destination).map_or(0.0, |&i| values[i]);
            *sample = (mixed as f32).tanh();
        }
        state.frames += out.len() as u64;
    }
}

impl AudioGraph for RenderGraph {
    fn current_time(&self) -> f64 {
        let state = self.lock();
        self.now(&state)
    }

    fn resume(&self) -> GraphFuture<'_> {
        Box::pin(async move {
            let mut state = self.lock_open()?;
            if state.run_state == RunState::Suspended {
                debug!("Render graph resumed at {} Hz", self.sample_rate);
            }
            state.run_state = RunState::Running;
            Ok::<(), AudioError>(())
        })
    }

    fn is_closed(&self) -> bool {
        self.lock().run_state == RunState::Closed
    }

    fn close(&self) {
        let mut state = self.lock();
        state.run_state = RunState::Closed;
        state.nodes.retain(|_, n| matches!(n.kind, NodeKind::Destination));
    }

    fn destination(&self) -> NodeId {
        self.destination
    }

    fn create_oscillator(&self, frequency: f64) -> AudioResult<NodeId> {
        let mut state = self.lock_open()?;
        Ok(state.add(NodeKind::Oscillator(OscillatorState {
            frequency: ParamTimeline::new(frequency),
            start: None,
            stop: None,
            phase: 0.0,
        })))
    }

    fn create_gain(&self) -> AudioResult<NodeId> {
        let mut state = self.lock_open()?;
        Ok(state.add(NodeKind::Gain(ParamTimeline::new(1.0))))
    }

    fn start(&self, node: NodeId, time: f64) -> AudioResult<()> {
        let mut state = self.lock_open()?;
        let osc = state.oscillator_mut(node)?;
        if osc.start.is_some() {
            return Err(AudioError::InvalidState(format!("{} already started", node)));
        }
        osc.start = Some(time);
        Ok(())
    }

    fn stop(&self, node: NodeId, time: f64) -> AudioResult<()> {
        let mut state = self.lock_open()?;
        let now = self.now(&state);
        let osc = state.oscillator_mut(node)?;
        if osc.start.is_none() {
            return Err(AudioError::InvalidState(format!("{} stopped before start", node)));
        }
        if osc.stop.is_some_and(|s| s <= now) {
            return Err(AudioError::InvalidState(format!("{} already stopped", node)));
        }
        osc.stop = Some(time);
        Ok(())
    }

    fn set_frequency(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()> {
        let mut state = self.lock_open()?;
        state.oscillator_mut(node)?.frequency.set_value(value, time);
        Ok(())
    }

    fn set_value(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()> {
        let mut state = self.lock_open()?;
        state.gain_mut(node)?.set_value(value, time);
        Ok(())
    }

    fn linear_ramp(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()> {
        let mut state = self.lock_open()?;
        state.gain_mut(node)?.linear_ramp(value, time);
        Ok(())
    }

    fn exponential_ramp(&self, node: NodeId, value: f64, time: f64) -> AudioResult<()> {
        let mut state = self.lock_open()?;
        state.gain_mut(node)?.exponential_ramp(value, time)
    }

    fn cancel_scheduled(&self, node: NodeId, time: f64) -> AudioResult<()> {
        let mut state = self.lock_open()?;
        state.gain_mut(node)?.cancel_from(time);
        Ok(())
    }

    fn current_value(&self, node: NodeId) -> AudioResult<f64> {
        let mut state = self.lock_open()?;
        let now = self.now(&state);
        Ok(state.gain_mut(node)?.value_at(now))
    }

    fn connect(&self, from: NodeId, to: NodeId) -> AudioResult<()> {
        let mut state = self.lock_open()?;
        if !state.nodes.contains_key(&from) {
            return Err(AudioError::UnknownNode(from));
        }
        let target = state.node_mut(to)?;
        if !target.inputs.contains(&from) {
            target.inputs.push(from);
        }
        Ok(())
    }

    fn disconnect(&self, node: NodeId) -> AudioResult<()> {
        let mut state = self.lock_open()?;
        if node == self.destination {
            return Err(AudioError::Driver("cannot disconnect the destination".into()));
        }
        if state.nodes.remove(&node).is_none() {
            return Err(AudioError::UnknownNode(node));
        }
        for other in state.nodes.values_mut() {
            other.inputs.retain(|&input| input != node);
        }
        Ok(())
    }
}

/// Creates a fresh [`RenderGraph`] per request.
///
/// The most recent graph stays reachable so offline callers can pull
/// samples out of whatever the scheduler built.
pub struct RenderGraphFactory {
    sample_rate: f64,
    latest: Mutex<Option<Arc<RenderGraph>>>,
}

impl RenderGraphFactory {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            latest: Mutex::new(None),
        }
    }

    pub fn latest(&self) -> Option<Arc<RenderGraph>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl GraphFactory for RenderGraphFactory {
    fn create(&self) -> AudioResult<Arc<dyn AudioGraph>> {
        let graph = Arc::new(RenderGraph::new(self.sample_rate));
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(graph.clone());
        Ok(graph as Arc<dyn AudioGraph>)
    }
}
