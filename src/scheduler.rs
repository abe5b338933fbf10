//! Tone Scheduler
//!
//! Owns the output graph and the active voice groups of one instance.
//! A play request:
//!
//! 1. announces itself on the exclusivity bus so other instances go quiet
//! 2. creates (or recreates) the graph and resumes it
//! 3. force-silences whatever this instance is still sounding
//! 4. builds one [`ChordSynth`] per tuning entry and starts them all at a
//!    single captured clock time
//! 5. schedules each group's cleanup shortly after its stop time
//!
//! Cleanup deadlines live in audio-clock seconds. They are cancelled and
//! replaced when a group is force-silenced, and processed by
//! [`ToneScheduler::reap`] (or the reaper task from
//! [`ToneScheduler::spawn_reaper`]).

use crate::bus::{ExclusiveBus, StopSignal};
use crate::chord_synth::{ChordSynth, EnvelopeTimes};
use crate::error::{AudioError, AudioResult};
use crate::graph::{AudioGraph, GraphFactory};
use crate::spectrum::Spectrum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default delay between a group's stop time and its disconnection
pub const DEFAULT_CLEANUP_MARGIN: f64 = 0.05;
pub const DEFAULT_CHANNEL: &str = "roughness";

/// Identity of one scheduler instance on the exclusivity bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl InstanceId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{:016x}", self.0)
    }
}

/// Key of one active voice group (one chord synth)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

/// Cancellable cleanup deadlines, one per group
#[derive(Debug, Default)]
pub struct CleanupTimers {
    deadlines: BTreeMap<GroupId, f64>,
}

impl CleanupTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline for `group`, replacing any pending one
    pub fn schedule(&mut self, group: GroupId, deadline: f64) -> Option<f64> {
        self.deadlines.insert(group, deadline)
    }

    pub fn cancel(&mut self, group: GroupId) -> Option<f64> {
        self.deadlines.remove(&group)
    }

    pub fn deadline(&self, group: GroupId) -> Option<f64> {
        self.deadlines.get(&group).copied()
    }

    /// Remove and return every group whose deadline is at or before `now`
    pub fn due(&mut self, now: f64) -> Vec<GroupId> {
        let due: Vec<GroupId> = self
            .deadlines
            .iter()
            .filter(|(_, &deadline)| deadline <= now)
            .map(|(&group, _)| group)
            .collect();
        for group in &due {
            self.deadlines.remove(group);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }
}

/// One play request: a chord of `tuning.len()` tones sharing a spectrum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRequest {
    pub base_frequency: f64,
    pub spectrum: Spectrum,
    /// Frequency multiplier of each chord note, e.g. `[1.0, r, s]`
    pub tuning: Vec<f64>,
    pub channel: String,
    pub source: String,
}

impl PlayRequest {
    /// Single tone on the default channel
    pub fn new(base_frequency: f64, spectrum: Spectrum) -> Self {
        Self {
            base_frequency,
            spectrum,
            tuning: vec![1.0],
            channel: DEFAULT_CHANNEL.to_string(),
            source: String::new(),
        }
    }

    pub fn with_tuning(mut self, tuning: Vec<f64>) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn on_channel(mut self, channel: &str, source: &str) -> Self {
        self.channel = channel.to_string();
        self.source = source.to_string();
        self
    }
}

/// State shared with bus handlers and the reaper
#[derive(Default)]
struct SchedulerState {
    graph: Option<Arc<dyn AudioGraph>>,
    groups: BTreeMap<GroupId, ChordSynth>,
    timers: CleanupTimers,
    next_group: u64,
}

impl SchedulerState {
    /// Force-silence every active group and move its cleanup deadline
    fn stop_all(&mut self, margin: f64) -> AudioResult<usize> {
        let graph = match &self.graph {
            Some(graph) if !self.groups.is_empty() => graph.clone(),
            _ => return Ok(0),
        };
        let now = graph.current_time();

        let mut silenced = 0;
        for (&group, synth) in self.groups.iter_mut() {
            // Already stopped on its own; the natural deadline stands
            if synth.stop_time().is_some_and(|stop| stop <= now) {
                continue;
            }
            let end = synth.force_silence(now)? + margin;
            let deadline = match self.timers.deadline(group) {
                Some(existing) => existing.min(end),
                None => end,
            };
            self.timers.schedule(group, deadline);
            silenced += 1;
        }
        Ok(silenced)
    }

    /// Disconnect every group whose cleanup deadline has passed
    fn reap(&mut self) -> usize {
        let now = match &self.graph {
            Some(graph) => graph.current_time(),
            None => return 0,
        };

        let due = self.timers.due(now);
        for group in &due {
            if let Some(synth) = self.groups.remove(group) {
                if let Err(e) = synth.disconnect() {
                    warn!("Cleanup of group {:?} failed: {}", group, e);
                }
            }
        }
        if !due.is_empty() {
            debug!("Reaped {} voice groups", due.len());
        }
        due.len()
    }

    /// Graph is gone; nothing it owned can be disconnected any more
    fn forget_graph(&mut self) {
        self.graph = None;
        self.groups.clear();
        self.timers.clear();
    }
}

fn lock(state: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Schedules chords on an output graph for one logical instance
pub struct ToneScheduler {
    id: InstanceId,
    factory: Arc<dyn GraphFactory>,
    times: EnvelopeTimes,
    cleanup_margin: f64,
    state: Arc<Mutex<SchedulerState>>,
    bus: Option<Arc<dyn ExclusiveBus>>,
    subscribed: Mutex<HashSet<String>>,
}

impl ToneScheduler {
    pub fn new(factory: Arc<dyn GraphFactory>, times: EnvelopeTimes) -> Self {
        Self {
            id: InstanceId::random(),
            factory,
            times,
            cleanup_margin: DEFAULT_CLEANUP_MARGIN,
            state: Arc::new(Mutex::new(SchedulerState::default())),
            bus: None,
            subscribed: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_cleanup_margin(mut self, margin: f64) -> Self {
        self.cleanup_margin = margin.max(0.0);
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn ExclusiveBus>) -> Self {
        self.attach(bus);
        self
    }

    /// Use `bus` for exclusivity from now on.
    ///
    /// Channels are subscribed lazily, on the first request that uses them.
    pub fn attach(&mut self, bus: Arc<dyn ExclusiveBus>) {
        self.bus = Some(bus);
        self.subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn times(&self) -> EnvelopeTimes {
        self.times
    }

    /// Current graph, if one was created and not yet observed closed
    pub fn graph(&self) -> Option<Arc<dyn AudioGraph>> {
        lock(&self.state).graph.clone()
    }

    pub fn active_group_count(&self) -> usize {
        lock(&self.state).groups.len()
    }

    pub fn pending_cleanup_count(&self) -> usize {
        lock(&self.state).timers.len()
    }

    /// Cleanup deadline of every active group, in group order
    pub fn cleanup_deadlines(&self) -> Vec<f64> {
        let state = lock(&self.state);
        state
            .groups
            .keys()
            .filter_map(|&group| state.timers.deadline(group))
            .collect()
    }

    /// Subscribe this instance to `channel` on its bus, once.
    ///
    /// Signals from other instances force-silence everything this instance
    /// is sounding. Without a bus this does nothing.
    pub fn listen(&self, channel: &str) -> AudioResult<()> {
        let bus = match &self.bus {
            Some(bus) => bus,
            None => return Ok(()),
        };
        let mut subscribed = self
            .subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if subscribed.contains(channel) {
            return Ok(());
        }

        let id = self.id;
        let margin = self.cleanup_margin;
        let state = self.state.clone();
        bus.subscribe(
            channel,
            Arc::new(move |signal: &StopSignal| {
                if signal.sender == id {
                    return;
                }
                match lock(&state).stop_all(margin) {
                    Ok(0) => {}
                    Ok(n) => info!(
                        "{} silenced {} groups for {} ({})",
                        id, n, signal.sender, signal.source
                    ),
                    Err(e) => warn!("{} failed to yield to {}: {}", id, signal.sender, e),
                }
            }),
        )?;
        subscribed.insert(channel.to_string());
        debug!("{} listening on '{}'", self.id, channel);
        Ok(())
    }

    /// Return a running graph, creating or recreating it as needed.
    ///
    /// `Ok(None)` means the device is unavailable right now.
    async fn acquire_graph(&self) -> AudioResult<Option<Arc<dyn AudioGraph>>> {
        let graph = {
            let mut state = lock(&self.state);
            let reusable = state.graph.as_ref().filter(|g| !g.is_closed()).cloned();
            match reusable {
                Some(graph) => graph,
                None => {
                    if state.graph.is_some() {
                        info!("Output graph was closed; recreating");
                        state.forget_graph();
                    }
                    match self.factory.create() {
                        Ok(graph) => {
                            state.graph = Some(graph.clone());
                            graph
                        }
                        Err(e @ (AudioError::Unavailable(_) | AudioError::Closed)) => {
                            warn!("Output graph unavailable: {}", e);
                            return Ok(None);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        };

        match graph.resume().await {
            Ok(()) => Ok(Some(graph)),
            Err(e @ (AudioError::Unavailable(_) | AudioError::Closed)) => {
                warn!("Output graph did not resume: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Play a chord, silencing this instance and its channel peers first.
    ///
    /// An unavailable device abandons the request without touching any
    /// scheduler state.
    pub async fn play(&self, request: &PlayRequest) -> AudioResult<()> {
        self.listen(&request.channel)?;
        if let Some(bus) = &self.bus {
            let signal = StopSignal::new(&request.channel, self.id, &request.source);
            if let Err(e) = bus.publish(&signal) {
                warn!("Exclusivity signal not sent: {}", e);
            }
        }

        let graph = match self.acquire_graph().await? {
            Some(graph) => graph,
            None => return Ok(()),
        };

        let mut state = lock(&self.state);
        // Graph replaced while this request was waiting on resume
        match &state.graph {
            Some(current) if Arc::ptr_eq(current, &graph) => {}
            _ => return Ok(()),
        }

        state.reap();
        state.stop_all(self.cleanup_margin)?;

        let mut synths = Vec::with_capacity(request.tuning.len());
        for _ in &request.tuning {
            let built = ChordSynth::new(graph.clone(), request.spectrum.clone(), self.times)
                .and_then(|synth| synth.connect(graph.destination()).map(|()| synth));
            match built {
                Ok(synth) => synths.push(synth),
                Err(e) => {
                    release(&synths);
                    return Err(e);
                }
            }
        }

        // One timestamp for every note of the chord
        let start = graph.current_time();
        let played: AudioResult<Vec<f64>> = synths
            .iter_mut()
            .zip(&request.tuning)
            .map(|(synth, &multiplier)| synth.play(request.base_frequency * multiplier, start))
            .collect();
        let stops = match played {
            Ok(stops) => stops,
            Err(e) => {
                release(&synths);
                return Err(e);
            }
        };

        for (synth, stop) in synths.into_iter().zip(stops) {
            let group = GroupId(state.next_group);
            state.next_group += 1;
            state.timers.schedule(group, stop + self.cleanup_margin);
            state.groups.insert(group, synth);
        }

        info!(
            "{} playing {:.2} Hz x {:?} at {:.3}s ({})",
            self.id, request.base_frequency, request.tuning, start, request.source
        );
        Ok(())
    }

    /// Force-silence every active group; safe to call repeatedly
    pub fn stop_all(&self) -> AudioResult<()> {
        let n = lock(&self.state).stop_all(self.cleanup_margin)?;
        if n > 0 {
            info!("{} stopped {} groups", self.id, n);
        }
        Ok(())
    }

    /// Disconnect groups whose cleanup deadline has passed
    pub fn reap(&self) -> usize {
        lock(&self.state).reap()
    }

    /// Reap on a fixed wall-clock period until the task is aborted
    pub fn spawn_reaper(&self, period: Duration) -> JoinHandle<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                lock(&state).reap();
            }
        })
    }
}

fn release(synths: &[ChordSynth]) {
    for synth in synths {
        if let Err(e) = synth.disconnect() {
            debug!("Releasing unplayed synth failed: {}", e);
        }
    }
}
