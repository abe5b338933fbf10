//! Error types for the output graph and the tone scheduler
//!
//! The roughness engine never fails; every error here comes from driving
//! an audio graph, talking to other instances, or loading configuration.

use crate::graph::NodeId;
use std::fmt;

/// Errors raised while scheduling or rendering reference tones
#[derive(Debug)]
pub enum AudioError {
    /// Driver-state conflict (start twice, stop after finishing).
    /// Benign: voices swallow these.
    InvalidState(String),
    /// Graph could not be created or resumed (no device, no permission yet)
    Unavailable(String),
    /// Graph has been closed and must be recreated
    Closed,
    /// Node handle does not exist in this graph
    UnknownNode(NodeId),
    /// Any other failure reported by the output driver
    Driver(String),
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serde(String),
    /// Configuration error
    Config(String),
}

impl AudioError {
    /// True for conditions the voice layer treats as a successful no-op
    pub fn is_benign(&self) -> bool {
        matches!(self, AudioError::InvalidState(_))
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::InvalidState(msg) => write!(f, "Invalid node state: {}", msg),
            AudioError::Unavailable(msg) => write!(f, "Audio output unavailable: {}", msg),
            AudioError::Closed => write!(f, "Audio graph is closed"),
            AudioError::UnknownNode(id) => write!(f, "Unknown graph node: {}", id),
            AudioError::Driver(msg) => write!(f, "Audio driver error: {}", msg),
            AudioError::Io(e) => write!(f, "IO error: {}", e),
            AudioError::Serde(msg) => write!(f, "Serialization error: {}", msg),
            AudioError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AudioError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AudioError {
    fn from(e: std::io::Error) -> Self {
        AudioError::Io(e)
    }
}

impl From<bincode::Error> for AudioError {
    fn from(e: bincode::Error) -> Self {
        AudioError::Serde(e.to_string())
    }
}

/// Result type for graph and scheduler operations
pub type AudioResult<T> = Result<T, AudioError>;
