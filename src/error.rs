//! Error types for the tracking engine.
//!
//! The engine performs no I/O on its hot path; what can fail is malformed
//! geometry from upstream, lookups against the scene, and configuration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackingError {
    /// A world coordinate or angle was NaN or infinite.
    #[error("non-finite input in {context}")]
    NonFiniteInput { context: &'static str },

    /// A motion event referenced a camera the scene does not know about.
    #[error("unknown camera: {0}")]
    UnknownCamera(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid scene: {0}")]
    InvalidScene(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrackingError>;
