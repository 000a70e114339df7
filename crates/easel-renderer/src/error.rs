use easel_core::{CoreError, ElementId};
use thiserror::Error;

use crate::pipeline::Phase;

/// Errors raised while producing a frame.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Host render error: {0}")]
    Host(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{phase} phase failed: {message}")]
    PhaseFailed { phase: Phase, message: String },

    #[error("Spatial index reports element {0} which is not in the tree")]
    StaleIndex(ElementId),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RenderError {
    pub fn host(message: impl Into<String>) -> Self {
        RenderError::Host(message.into())
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;
