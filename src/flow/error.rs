use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid flow graph: {0}")]
    InvalidGraph(String),
    #[error("unknown node: {0}")]
    UnknownNode(String),
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("malformed flow graph: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("conversation is not waiting for input")]
    NoPendingInput,
    #[error("conversation was cancelled")]
    Cancelled,
    #[error("flow did not reach a stopping point within {0} steps")]
    StepLimit(usize),
}
