//! Real-time output using cpal
//! Works with JACK, ALSA, OpenSL ES (Android/Termux), etc.
//!
//! The device stream renders from a shared [`RenderGraph`]. cpal streams
//! are not `Send` on every host, so the stream lives on its own thread and
//! is dropped once the graph is closed.

use super::render::RenderGraph;
use super::{AudioGraph, GraphFactory};
use crate::error::{AudioError, AudioResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, trace};

/// How often the stream thread checks whether its graph was closed
const CLOSE_POLL: Duration = Duration::from_millis(100);

/// An open device stream fed by a [`RenderGraph`]
pub struct LiveOutput {
    graph: Arc<RenderGraph>,
    sample_rate: u32,
}

impl LiveOutput {
    /// Open the default output device.
    ///
    /// The graph starts suspended; the device plays silence until the
    /// graph is resumed. Closing the graph tears the stream down.
    pub fn open() -> AudioResult<Self> {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("roughness-output".into())
            .spawn(move || match open_stream() {
                Ok((stream, graph, sample_rate)) => {
                    let _ = tx.send(Ok((graph.clone(), sample_rate)));
                    while !graph.is_closed() {
                        thread::sleep(CLOSE_POLL);
                    }
                    drop(stream);
                    info!("Audio stream closed");
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                }
            })?;

        let (graph, sample_rate) = rx
            .recv()
            .map_err(|_| AudioError::Unavailable("output thread exited".into()))??;

        Ok(Self { graph, sample_rate })
    }

    pub fn graph(&self) -> Arc<RenderGraph> {
        self.graph.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn open_stream() -> AudioResult<(cpal::Stream, Arc<RenderGraph>, u32)> {
    // Get the default audio host (JACK/ALSA/OpenSL ES/etc)
    let host = cpal::default_host();
    info!("Audio host: {:?}", host.id());

    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::Unavailable("No audio output device found".into()))?;
    if let Ok(name) = device.name() {
        info!("Audio device: {}", name);
    }

    let config = device
        .default_output_config()
        .map_err(|e| AudioError::Unavailable(e.to_string()))?;
    info!("Audio config: {:?}", config);

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let graph = Arc::new(RenderGraph::new(sample_rate as f64));

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &config.into(), graph.clone(), channels)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &config.into(), graph.clone(), channels)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(&device, &config.into(), graph.clone(), channels)
        }
        other => {
            return Err(AudioError::Unavailable(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    }?;

    stream
        .play()
        .map_err(|e| AudioError::Driver(e.to_string()))?;
    info!("Audio stream started at {} Hz", sample_rate);

    Ok((stream, graph, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    graph: Arc<RenderGraph>,
    channels: usize,
) -> AudioResult<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut mono: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                mono.resize(frames, 0.0);
                // Never wait on the control thread here
                if !graph.try_render_into(&mut mono) {
                    trace!("Graph busy, buffer of {} frames left silent", frames);
                }

                // Mono -> every channel
                for (frame, &sample) in data.chunks_mut(channels.max(1)).zip(mono.iter()) {
                    for channel in frame.iter_mut() {
                        *channel = T::from_sample(sample);
                    }
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Unavailable(e.to_string()))
}

/// Opens a fresh device stream per graph
#[derive(Default)]
pub struct LiveOutputFactory;

impl GraphFactory for LiveOutputFactory {
    fn create(&self) -> AudioResult<Arc<dyn AudioGraph>> {
        let output = LiveOutput::open()?;
        Ok(output.graph() as Arc<dyn AudioGraph>)
    }
}
