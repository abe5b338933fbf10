/// Voices and chord synths against the recording and software graphs
///
/// Checks both what gets scheduled (recorded calls) and what comes out
/// (rendered samples).
use roughness::chord_synth::{ChordSynth, EnvelopeTimes};
use roughness::graph::{AudioGraph, GraphCall, MockGraph, RenderGraph};
use roughness::spectrum::{build_spectrum, Spectrum};
use roughness::voice::{Voice, FLOOR};
use std::sync::Arc;

fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

fn resumed<G: AudioGraph>(graph: G) -> Arc<G> {
    let graph = Arc::new(graph);
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(graph.resume())
        .unwrap();
    graph
}

// ========== Scheduling ==========

#[test]
fn test_every_partial_scheduled_from_one_start() {
    let graph = resumed(MockGraph::new(1000.0));
    let mut synth =
        ChordSynth::new(graph.clone(), build_spectrum(220.0, 6, 1.0), EnvelopeTimes::default())
            .unwrap();
    synth.connect(graph.destination()).unwrap();
    graph.clear_calls();

    synth.play(220.0, 0.5).unwrap();
    let starts: Vec<f64> = graph
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            GraphCall::Start { time, .. } => Some(time),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec![0.5; 6]);
}

#[test]
fn test_release_never_reaches_zero() {
    let graph = resumed(MockGraph::new(1000.0));
    let mut synth =
        ChordSynth::new(graph.clone(), build_spectrum(220.0, 4, 1.0), EnvelopeTimes::default())
            .unwrap();
    synth.play(220.0, 0.0).unwrap();
    synth.force_silence(0.2).unwrap();
    for call in graph.calls() {
        if let GraphCall::ExponentialRamp { value, .. } = call {
            assert_eq!(value, FLOOR);
        }
    }
}

#[test]
fn test_empty_spectrum_returns_start_and_is_silent() {
    let graph = resumed(RenderGraph::new(8000.0));
    let mut synth =
        ChordSynth::new(graph.clone(), Spectrum::empty(), EnvelopeTimes::default()).unwrap();
    synth.connect(graph.destination()).unwrap();
    assert_eq!(synth.play(220.0, 0.125).unwrap(), 0.125);
    assert_eq!(calculate_rms(&graph.render(4000)), 0.0);
}

// ========== Rendered output ==========

#[test]
fn test_chord_sounds_then_falls_silent() {
    let graph = resumed(RenderGraph::new(8000.0));
    let times = EnvelopeTimes {
        release: 0.5,
        ..EnvelopeTimes::default()
    };
    let mut synth = ChordSynth::new(graph.clone(), build_spectrum(220.0, 3, 1.0), times).unwrap();
    synth.connect(graph.destination()).unwrap();
    let stop = synth.play(220.0, 0.0).unwrap();
    assert_eq!(stop, 0.5);

    let early = graph.render(800);
    let tail = graph.render(3200);
    let after = graph.render(800);
    assert!(calculate_rms(&early) > 0.05, "rms {}", calculate_rms(&early));
    assert!(calculate_rms(&tail) < calculate_rms(&early));
    assert_eq!(calculate_rms(&after), 0.0);
}

#[test]
fn test_no_click_at_onset() {
    let graph = resumed(RenderGraph::new(48_000.0));
    let mut voice = Voice::new(graph.clone(), 1000.0).unwrap();
    graph.connect(voice.output(), graph.destination()).unwrap();
    voice.start(0.0).unwrap();
    voice.fade_in(1.0, 0.0).unwrap();

    // 2 ms fade at 48 kHz: the first samples stay tiny
    let out = graph.render(96);
    assert!(out[..6].iter().all(|s| s.abs() < 0.05));
    assert!(out[90..].iter().any(|s| s.abs() > 0.1));
}

#[test]
fn test_force_silence_cuts_tone_early() {
    let graph = resumed(RenderGraph::new(8000.0));
    let mut synth =
        ChordSynth::new(graph.clone(), build_spectrum(220.0, 2, 1.0), EnvelopeTimes::default())
            .unwrap();
    synth.connect(graph.destination()).unwrap();
    synth.play(220.0, 0.0).unwrap();
    graph.render(800);

    let end = synth.force_silence(graph.current_time()).unwrap();
    assert!(end < 0.3);
    graph.render(((end - graph.current_time()) * 8000.0).ceil() as usize + 8);
    assert_eq!(calculate_rms(&graph.render(800)), 0.0);
}
