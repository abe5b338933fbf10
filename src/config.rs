//! Engine configuration
//!
//! TOML file with an `[analysis]` table (spectrum and sweep parameters) and
//! a `[playback]` table (envelope timing and output settings). Every field
//! has a default, so a partial file or no file at all is valid.

use crate::chord_synth::EnvelopeTimes;
use crate::error::{AudioError, AudioResult};
use crate::scheduler::{DEFAULT_CHANNEL, DEFAULT_CLEANUP_MARGIN};
use crate::spectrum::{build_spectrum, Spectrum};
use crate::triad::TriadParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub base_frequency: f64,
    pub partials: usize,
    pub rolloff: f64,
    pub min_ratio: f64,
    pub max_ratio: f64,
    /// Triad grid spacing
    pub step: f64,
    /// Dyad curve spacing
    pub dyad_step: f64,
    pub minima_threshold: f64,
    pub minima_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_frequency: 220.0,
            partials: 6,
            rolloff: 1.0,
            min_ratio: 1.0,
            max_ratio: 2.0,
            step: 0.02,
            dyad_step: 0.005,
            minima_threshold: 1.0,
            minima_limit: 12,
        }
    }
}

impl AnalysisConfig {
    pub fn spectrum(&self) -> Spectrum {
        build_spectrum(self.base_frequency, self.partials, self.rolloff)
    }

    pub fn triad_params(&self) -> TriadParams {
        TriadParams::new(self.base_frequency, self.spectrum())
            .with_bounds(self.min_ratio, self.max_ratio)
            .with_step(self.step)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub sample_rate: u32,
    pub release: f64,
    pub stagger: f64,
    pub quick_release: f64,
    pub quick_stagger: f64,
    pub cleanup_margin: f64,
    pub channel: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        let times = EnvelopeTimes::default();
        Self {
            sample_rate: 48_000,
            release: times.release,
            stagger: times.stagger,
            quick_release: times.quick_release,
            quick_stagger: times.quick_stagger,
            cleanup_margin: DEFAULT_CLEANUP_MARGIN,
            channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}

impl PlaybackConfig {
    pub fn envelope_times(&self) -> EnvelopeTimes {
        EnvelopeTimes {
            release: self.release,
            stagger: self.stagger,
            quick_release: self.quick_release,
            quick_stagger: self.quick_stagger,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub analysis: AnalysisConfig,
    pub playback: PlaybackConfig,
}

impl EngineConfig {
    /// `<config dir>/roughness/config.toml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("roughness").join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> AudioResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> AudioResult<Self> {
        toml::from_str(content).map_err(|e| AudioError::Config(e.to_string()))
    }

    /// Load `path` (or the default path); a missing file yields defaults
    pub fn load_or_default(path: Option<&Path>) -> AudioResult<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn to_toml(&self) -> AudioResult<String> {
        toml::to_string_pretty(self).map_err(|e| AudioError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> AudioResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
