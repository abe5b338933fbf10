//! Roughness CLI - dissonance curves, triad maps and chord playback

use clap::{Args, Parser, Subcommand};
use hound::{SampleFormat, WavSpec, WavWriter};
use roughness::config::{AnalysisConfig, EngineConfig};
use roughness::dyad::{curve_minima, dyad_curve};
use roughness::graph::RenderGraphFactory;
use roughness::pitch::{nearest_note, ratio_to_cents};
use roughness::scheduler::{PlayRequest, ToneScheduler};
use roughness::triad::{build_triad_surface, extract_local_minima};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "roughness")]
#[command(about = "Sensory dissonance explorer and chord player", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/roughness/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `[analysis]` config table
#[derive(Args)]
struct SpectrumArgs {
    /// Fundamental frequency in Hz
    #[arg(short = 'f', long)]
    base: Option<f64>,

    /// Number of harmonic partials
    #[arg(short, long)]
    partials: Option<usize>,

    /// Amplitude roll-off exponent
    #[arg(short, long)]
    rolloff: Option<f64>,
}

impl SpectrumArgs {
    fn apply(&self, analysis: &mut AnalysisConfig) {
        if let Some(base) = self.base {
            analysis.base_frequency = base;
        }
        if let Some(partials) = self.partials {
            analysis.partials = partials;
        }
        if let Some(rolloff) = self.rolloff {
            analysis.rolloff = rolloff;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Dissonance curve of two tones over a ratio range
    Dyad {
        #[command(flatten)]
        spectrum: SpectrumArgs,

        /// Sweep spacing
        #[arg(short, long)]
        step: Option<f64>,

        /// Print every sample, not just the minima
        #[arg(long)]
        all: bool,
    },

    /// Minima of the triad dissonance surface
    Triad {
        #[command(flatten)]
        spectrum: SpectrumArgs,

        /// Grid spacing
        #[arg(short, long)]
        step: Option<f64>,

        /// Only report minima at or below this normalized value
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Maximum number of minima
        #[arg(short, long)]
        limit: Option<usize>,

        /// Write the whole surface as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Nearest note name and MIDI number of a frequency
    Note {
        /// Frequency in Hz
        frequency: f64,
    },

    /// Render a chord to WAV
    Render {
        /// Output WAV file path
        output: PathBuf,

        /// Chord ratios above the fundamental, e.g. 1.25 1.5
        ratios: Vec<f64>,

        #[command(flatten)]
        spectrum: SpectrumArgs,

        /// Sample rate in Hz
        #[arg(long)]
        sample_rate: Option<u32>,
    },

    /// Play a chord on the default output device
    #[cfg(feature = "live")]
    Play {
        /// Chord ratios above the fundamental, e.g. 1.25 1.5
        ratios: Vec<f64>,

        #[command(flatten)]
        spectrum: SpectrumArgs,

        /// Silence other processes playing on the same channel
        #[arg(long)]
        exclusive: bool,
    },
}

fn tuning(ratios: &[f64]) -> Vec<f64> {
    std::iter::once(1.0).chain(ratios.iter().copied()).collect()
}

fn describe_ratio(base: f64, ratio: f64) -> String {
    let label = nearest_note(base * ratio);
    format!(
        "{:>8.4}  {:>+8.1}c  {:<4} ({:+.1}c)",
        ratio,
        ratio_to_cents(ratio),
        label.name,
        label.cents
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = EngineConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Dyad {
            spectrum,
            step,
            all,
        } => {
            spectrum.apply(&mut config.analysis);
            let analysis = &config.analysis;
            let curve = dyad_curve(
                analysis.base_frequency,
                &analysis.spectrum(),
                analysis.min_ratio,
                analysis.max_ratio,
                step.unwrap_or(analysis.dyad_step),
            );

            if all {
                for sample in &curve {
                    println!("{:.6}\t{:.6}\t{:.6}", sample.ratio, sample.raw, sample.normalized);
                }
                return Ok(());
            }

            println!(
                "Dyad minima over {:.2} Hz ({} partials, {} samples)",
                analysis.base_frequency,
                analysis.partials,
                curve.len()
            );
            for sample in curve_minima(&curve, analysis.minima_threshold, analysis.minima_limit) {
                println!(
                    "{}  {:.4}",
                    describe_ratio(analysis.base_frequency, sample.ratio),
                    sample.normalized
                );
            }
        }

        Commands::Triad {
            spectrum,
            step,
            threshold,
            limit,
            json,
        } => {
            spectrum.apply(&mut config.analysis);
            if let Some(step) = step {
                config.analysis.step = step;
            }
            let analysis = &config.analysis;
            let surface = build_triad_surface(&analysis.triad_params());

            if let Some(path) = json {
                std::fs::write(&path, serde_json::to_string(&surface)?)?;
                println!("Surface written to {}", path.display());
            }

            let minima = extract_local_minima(
                &surface,
                threshold.unwrap_or(analysis.minima_threshold),
                limit.unwrap_or(analysis.minima_limit),
            );
            println!(
                "Triad minima over {:.2} Hz ({}x{} grid)",
                analysis.base_frequency,
                surface.rows(),
                surface.cols()
            );
            for minimum in minima {
                println!(
                    "1 : {:.4} : {:.4}  {:.4}  ({} / {})",
                    minimum.ratio_x,
                    minimum.ratio_y,
                    minimum.value,
                    nearest_note(analysis.base_frequency * minimum.ratio_x).name,
                    nearest_note(analysis.base_frequency * minimum.ratio_y).name
                );
            }
        }

        Commands::Note { frequency } => {
            let label = nearest_note(frequency);
            println!(
                "{:.2} Hz = {} (MIDI {}, {:+.1} cents)",
                frequency, label.name, label.midi, label.cents
            );
        }

        Commands::Render {
            output,
            ratios,
            spectrum,
            sample_rate,
        } => {
            spectrum.apply(&mut config.analysis);
            let sample_rate = sample_rate.unwrap_or(config.playback.sample_rate);
            let factory = Arc::new(RenderGraphFactory::new(sample_rate as f64));
            let scheduler = ToneScheduler::new(factory.clone(), config.playback.envelope_times())
                .with_cleanup_margin(config.playback.cleanup_margin);

            let request = PlayRequest::new(config.analysis.base_frequency, config.analysis.spectrum())
                .with_tuning(tuning(&ratios))
                .on_channel(&config.playback.channel, "render");
            scheduler.play(&request).await?;

            let graph = factory
                .latest()
                .ok_or("Render graph was not created")?;
            let duration = config.playback.release + config.playback.cleanup_margin;
            let samples = graph.render((duration * sample_rate as f64).ceil() as usize);
            scheduler.reap();

            let spec = WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            };
            let mut writer = WavWriter::create(&output, spec)?;
            for &sample in &samples {
                writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
            }
            writer.finalize()?;

            println!("Output:      {}", output.display());
            println!("Duration:    {:.2} seconds", duration);
            println!("Sample rate: {} Hz", sample_rate);
        }

        #[cfg(feature = "live")]
        Commands::Play {
            ratios,
            spectrum,
            exclusive,
        } => {
            use roughness::graph::{AudioGraph, LiveOutputFactory};

            spectrum.apply(&mut config.analysis);
            #[allow(unused_mut)]
            let mut scheduler = ToneScheduler::new(Arc::new(LiveOutputFactory), config.playback.envelope_times())
                .with_cleanup_margin(config.playback.cleanup_margin);

            #[cfg(unix)]
            let _bus = if exclusive {
                let bus = Arc::new(roughness::ipc::SocketBus::bind(
                    &roughness::ipc::default_socket_dir(),
                )?);
                scheduler.attach(bus.clone());
                Some(bus)
            } else {
                None
            };
            #[cfg(not(unix))]
            if exclusive {
                eprintln!("--exclusive needs Unix domain sockets; ignoring");
            }

            let request = PlayRequest::new(config.analysis.base_frequency, config.analysis.spectrum())
                .with_tuning(tuning(&ratios))
                .on_channel(&config.playback.channel, "cli");
            scheduler.play(&request).await?;
            if scheduler.active_group_count() == 0 {
                eprintln!("No audio output available");
                return Ok(());
            }

            let reaper = scheduler.spawn_reaper(std::time::Duration::from_millis(50));
            let hold = config.playback.release + config.playback.cleanup_margin + 0.1;
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs_f64(hold)) => {}
                _ = tokio::signal::ctrl_c() => {
                    scheduler.stop_all()?;
                    tokio::time::sleep(std::time::Duration::from_secs_f64(
                        config.playback.quick_release + config.playback.cleanup_margin,
                    ))
                    .await;
                }
            }
            reaper.abort();
            scheduler.reap();
            if let Some(graph) = scheduler.graph() {
                graph.close();
            }
        }
    }

    Ok(())
}
