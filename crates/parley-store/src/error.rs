use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A read expected a document that does not exist.
    #[error("Document not found")]
    NotFound,

    /// A conditional create found the document already present.
    #[error("Document already exists")]
    Conflict,

    /// A batch exceeded the caller-supplied cap.
    #[error("Batch of {got} operations exceeds cap of {cap}")]
    BatchTooLarge { got: usize, cap: usize },

    /// A value could not be converted to or from a document.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A domain value was not a JSON object.
    #[error("Value is not a document object")]
    NotAnObject,

    /// The backing store is unreachable or has shut down.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
