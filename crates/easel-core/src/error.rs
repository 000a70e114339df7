use thiserror::Error;

use crate::element::ElementId;

/// Errors raised while building or querying an element tree.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Element {0} already exists in the tree")]
    DuplicateElement(ElementId),

    #[error("Element {0} not found")]
    UnknownElement(ElementId),

    #[error("Parent element {0} not found")]
    UnknownParent(ElementId),

    #[error("Malformed tree at element {id}: {reason}")]
    MalformedTree { id: ElementId, reason: &'static str },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
