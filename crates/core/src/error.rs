use thiserror::Error;

pub type BuilderResult<T> = Result<T, BuilderError>;

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend refused the record. `message` is the server's own
    /// validation text and is shown to the operator as-is.
    #[error("Rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown block: {0}")]
    UnknownBlock(u64),

    #[error("Unknown condition row {row} in block {block}")]
    UnknownRow { block: u64, row: u64 },

    #[error("Invalid block transition from {from} via {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Duplicate activities are not allowed in one phase ({activity_type} #{activity_id})")]
    DuplicateActivity {
        activity_type: String,
        activity_id: i64,
    },

    #[error("Block {0} does not accept activity drops")]
    NotDropTarget(u64),

    #[error("Phase block {0} must be saved first")]
    ParentUnsaved(u64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BuilderError {
    /// Operator-facing text recorded on a block after a failed round trip.
    pub fn user_message(&self) -> String {
        match self {
            BuilderError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
