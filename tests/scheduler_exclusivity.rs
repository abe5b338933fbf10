/// Tone scheduler: preemption, idempotent stop, cleanup and degraded paths
///
/// Two schedulers standing in for two independent instances share one
/// [`MockGraph`] (one physical device) and one [`LocalBus`], so the
/// recorded call log shows the global order of events.
use roughness::bus::{ExclusiveBus, LocalBus, StopSignal};
use roughness::chord_synth::EnvelopeTimes;
use roughness::graph::{AudioGraph, GraphCall, GraphFactory, MockGraph, MockGraphFactory, NodeId};
use roughness::scheduler::{PlayRequest, ToneScheduler, DEFAULT_CLEANUP_MARGIN};
use roughness::spectrum::{build_spectrum, Spectrum};
use roughness::AudioResult;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Every instance gets the same device graph
struct SharedGraph(Arc<MockGraph>);

impl GraphFactory for SharedGraph {
    fn create(&self) -> AudioResult<Arc<dyn AudioGraph>> {
        Ok(self.0.clone() as Arc<dyn AudioGraph>)
    }
}

fn request(tuning: Vec<f64>, source: &str) -> PlayRequest {
    PlayRequest::new(220.0, build_spectrum(220.0, 3, 1.0))
        .with_tuning(tuning)
        .on_channel("roughness", source)
}

fn oscillators_started(calls: &[GraphCall]) -> HashSet<NodeId> {
    calls
        .iter()
        .filter_map(|c| match c {
            GraphCall::Start { node, .. } => Some(*node),
            _ => None,
        })
        .collect()
}

// ========== Cross-instance exclusivity ==========

#[tokio::test]
async fn test_second_instance_silences_first_before_starting() {
    let graph = Arc::new(MockGraph::new(1000.0));
    let bus: Arc<dyn ExclusiveBus> = Arc::new(LocalBus::new());
    let a = ToneScheduler::new(Arc::new(SharedGraph(graph.clone())), EnvelopeTimes::default())
        .with_bus(bus.clone());
    let b = ToneScheduler::new(Arc::new(SharedGraph(graph.clone())), EnvelopeTimes::default())
        .with_bus(bus.clone());
    assert_ne!(a.id(), b.id());

    a.play(&request(vec![1.0, 1.5], "tab-a")).await.unwrap();
    let a_calls = graph.calls();
    let a_oscillators = oscillators_started(&a_calls);
    assert_eq!(a_oscillators.len(), 6);

    graph.advance(0.2);
    graph.clear_calls();
    b.play(&request(vec![1.0, 1.25], "tab-b")).await.unwrap();
    let calls = graph.calls();

    let first_forced = calls
        .iter()
        .position(|c| matches!(c, GraphCall::CancelScheduled { .. }))
        .expect("A was never force-faded");
    let first_b_start = calls
        .iter()
        .position(|c| matches!(c, GraphCall::Start { .. }))
        .expect("B never started");
    assert!(first_forced < first_b_start);

    // A's oscillators got their new, earlier stop before B started
    let a_restops = calls[..first_b_start]
        .iter()
        .filter(|c| matches!(c, GraphCall::Stop { node, .. } if a_oscillators.contains(node)))
        .count();
    assert_eq!(a_restops, 6);

    // B does not silence itself
    assert!(oscillators_started(&calls).is_disjoint(&a_oscillators));
    assert_eq!(b.active_group_count(), 2);
    assert_eq!(a.active_group_count(), 2);

    let a_deadlines = a.cleanup_deadlines();
    assert!(a_deadlines
        .iter()
        .all(|&d| d < 0.2 + 0.12 + DEFAULT_CLEANUP_MARGIN + 1e-9));
}

#[tokio::test]
async fn test_instances_on_other_channels_coexist() {
    let graph = Arc::new(MockGraph::new(1000.0));
    let bus: Arc<dyn ExclusiveBus> = Arc::new(LocalBus::new());
    let a = ToneScheduler::new(Arc::new(SharedGraph(graph.clone())), EnvelopeTimes::default())
        .with_bus(bus.clone());
    let b = ToneScheduler::new(Arc::new(SharedGraph(graph.clone())), EnvelopeTimes::default())
        .with_bus(bus);

    a.play(&request(vec![1.0], "a")).await.unwrap();
    graph.clear_calls();
    b.play(&request(vec![1.0], "b").on_channel("elsewhere", "b"))
        .await
        .unwrap();
    assert_eq!(
        graph.count(|c| matches!(c, GraphCall::CancelScheduled { .. })),
        0
    );
}

#[tokio::test]
async fn test_own_signal_is_ignored() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    let bus = Arc::new(LocalBus::new());
    let scheduler = ToneScheduler::new(factory.clone(), EnvelopeTimes::default()).with_bus(bus.clone());
    scheduler.play(&request(vec![1.0], "a")).await.unwrap();

    let graph = factory.latest().unwrap();
    graph.clear_calls();
    bus.publish(&StopSignal::new("roughness", scheduler.id(), "echo"))
        .unwrap();
    assert!(graph.calls().is_empty());
}

#[tokio::test]
async fn test_channel_subscribed_once() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    let bus = Arc::new(LocalBus::new());
    let scheduler = ToneScheduler::new(factory, EnvelopeTimes::default()).with_bus(bus.clone());
    scheduler.play(&request(vec![1.0], "a")).await.unwrap();
    scheduler.play(&request(vec![1.0], "a")).await.unwrap();
    assert_eq!(bus.subscriber_count("roughness"), 1);
}

#[tokio::test]
async fn test_exclusivity_signal_published_per_play() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    let bus = Arc::new(LocalBus::new());
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    bus.subscribe(
        "roughness",
        Arc::new(move |_: &StopSignal| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    let scheduler = ToneScheduler::new(factory, EnvelopeTimes::default()).with_bus(bus);
    scheduler.play(&request(vec![1.0], "a")).await.unwrap();
    scheduler.play(&request(vec![1.0], "a")).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

// ========== Within one instance ==========

#[tokio::test]
async fn test_new_request_silences_previous_generation() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    let scheduler = ToneScheduler::new(factory.clone(), EnvelopeTimes::default());
    scheduler.play(&request(vec![1.0, 1.5], "a")).await.unwrap();
    let graph = factory.latest().unwrap();
    graph.advance(0.3);
    scheduler.play(&request(vec![1.0], "a")).await.unwrap();

    assert_eq!(factory.created(), 1);
    assert_eq!(scheduler.active_group_count(), 3);
    let mut deadlines = scheduler.cleanup_deadlines();
    deadlines.sort_by(f64::total_cmp);
    assert!(deadlines[0] < 0.3 + 0.12 + DEFAULT_CLEANUP_MARGIN + 1e-9);
    assert!((deadlines[2] - (0.3 + 1.6 + DEFAULT_CLEANUP_MARGIN)).abs() < 1e-9);
}

#[tokio::test]
async fn test_stop_all_twice_replaces_cleanup() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    let scheduler = ToneScheduler::new(factory.clone(), EnvelopeTimes::default());
    scheduler.play(&request(vec![1.0, 1.25, 1.5], "a")).await.unwrap();
    let graph = factory.latest().unwrap();
    graph.advance(0.1);

    scheduler.stop_all().unwrap();
    let first = scheduler.cleanup_deadlines();
    let forced = graph.count(|c| matches!(c, GraphCall::CancelScheduled { .. }));
    scheduler.stop_all().unwrap();

    assert_eq!(scheduler.pending_cleanup_count(), 3);
    assert_eq!(scheduler.cleanup_deadlines(), first);
    assert_eq!(
        graph.count(|c| matches!(c, GraphCall::CancelScheduled { .. })),
        forced
    );

    graph.advance(0.5);
    assert_eq!(scheduler.reap(), 3);
    assert_eq!(scheduler.reap(), 0);
    assert_eq!(graph.inner().node_count(), 1);
}

#[tokio::test]
async fn test_stop_all_never_delays_cleanup() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    let scheduler = ToneScheduler::new(factory.clone(), EnvelopeTimes::default());
    scheduler.play(&request(vec![1.0], "a")).await.unwrap();
    let graph = factory.latest().unwrap();
    let natural = scheduler.cleanup_deadlines();
    assert!((natural[0] - (1.6 + DEFAULT_CLEANUP_MARGIN)).abs() < 1e-9);

    // Past the natural stop but not yet reaped
    graph.advance(1.61);
    graph.clear_calls();
    scheduler.stop_all().unwrap();
    assert_eq!(scheduler.cleanup_deadlines(), natural);
    assert_eq!(graph.count(|c| matches!(c, GraphCall::CancelScheduled { .. })), 0);

    graph.advance(0.05);
    assert_eq!(scheduler.reap(), 1);
}

#[tokio::test]
async fn test_stop_all_near_natural_end_keeps_earlier_deadline() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    let scheduler = ToneScheduler::new(factory.clone(), EnvelopeTimes::default());
    scheduler.play(&request(vec![1.0], "a")).await.unwrap();
    let graph = factory.latest().unwrap();
    let natural = scheduler.cleanup_deadlines()[0];

    graph.advance(1.55);
    scheduler.stop_all().unwrap();
    let deadline = scheduler.cleanup_deadlines()[0];
    assert!(deadline <= natural + 1e-12, "{} > {}", deadline, natural);
}

#[tokio::test]
async fn test_empty_spectrum_request_is_silent() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    let scheduler = ToneScheduler::new(factory.clone(), EnvelopeTimes::default());
    let silent = PlayRequest::new(220.0, Spectrum::empty()).with_tuning(vec![1.0, 1.5]);
    scheduler.play(&silent).await.unwrap();
    let graph = factory.latest().unwrap();
    assert_eq!(graph.count(|c| matches!(c, GraphCall::Start { .. })), 0);
    assert!(graph.render(500).iter().all(|&s| s == 0.0));
}

// ========== Degraded paths ==========

#[tokio::test]
async fn test_unavailable_device_leaves_no_state() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    factory.set_fail_create(true);
    let scheduler = ToneScheduler::new(factory.clone(), EnvelopeTimes::default());
    scheduler.play(&request(vec![1.0], "a")).await.unwrap();
    assert_eq!(scheduler.active_group_count(), 0);
    assert_eq!(scheduler.pending_cleanup_count(), 0);
    assert!(scheduler.graph().is_none());
}

#[tokio::test]
async fn test_failed_resume_abandons_request() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    factory.set_fail_resume(true);
    let scheduler = ToneScheduler::new(factory.clone(), EnvelopeTimes::default());
    scheduler.play(&request(vec![1.0, 1.5], "a")).await.unwrap();
    assert_eq!(scheduler.active_group_count(), 0);
    assert_eq!(scheduler.pending_cleanup_count(), 0);

    let graph = factory.latest().unwrap();
    assert_eq!(graph.count(|c| matches!(c, GraphCall::CreateOscillator { .. })), 0);

    // Unlocked later: the same graph is reused
    graph.set_fail_resume(false);
    scheduler.play(&request(vec![1.0, 1.5], "a")).await.unwrap();
    assert_eq!(factory.created(), 1);
    assert_eq!(scheduler.active_group_count(), 2);
}

#[tokio::test]
async fn test_closed_graph_is_recreated() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    let scheduler = ToneScheduler::new(factory.clone(), EnvelopeTimes::default());
    scheduler.play(&request(vec![1.0], "a")).await.unwrap();
    factory.latest().unwrap().close();

    scheduler.play(&request(vec![1.0, 2.0], "a")).await.unwrap();
    assert_eq!(factory.created(), 2);
    assert_eq!(scheduler.active_group_count(), 2);
    assert!(!scheduler.graph().unwrap().is_closed());
}

#[tokio::test]
async fn test_unexpected_driver_error_propagates() {
    let graph = Arc::new(MockGraph::new(1000.0));
    let scheduler = ToneScheduler::new(Arc::new(SharedGraph(graph.clone())), EnvelopeTimes::default());
    graph.fail_next_start("device lost");
    assert!(scheduler.play(&request(vec![1.0], "a")).await.is_err());
    assert_eq!(scheduler.active_group_count(), 0);
    assert_eq!(graph.inner().node_count(), 1);
}

#[tokio::test]
async fn test_reaper_task_disconnects_expired_groups() {
    let factory = Arc::new(MockGraphFactory::new(1000.0));
    let scheduler = ToneScheduler::new(factory.clone(), EnvelopeTimes::default());
    scheduler.play(&request(vec![1.0], "a")).await.unwrap();
    factory.latest().unwrap().advance(2.0);

    let reaper = scheduler.spawn_reaper(std::time::Duration::from_millis(5));
    for _ in 0..100 {
        if scheduler.active_group_count() == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    reaper.abort();
    assert_eq!(scheduler.active_group_count(), 0);
}
