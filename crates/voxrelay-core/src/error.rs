//! Error types for the voxrelay pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Model stream error: {0}")]
    Model(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// A collaborator across the wire (origin link, token service) failed
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
