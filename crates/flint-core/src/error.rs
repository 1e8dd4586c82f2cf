//! Error types for core data validation.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Mesh data failed validation
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// Texture data failed validation
    #[error("Invalid texture: {0}")]
    InvalidTexture(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
