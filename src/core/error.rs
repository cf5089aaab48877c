//! Error types for completion exchanges and persistence.

use std::fmt;

/// Errors raised while configuring or running a completion exchange.
///
/// All variants are caught at the orchestrator boundary; none of them
/// propagate to the UI layer or inject text into the transcript.
#[derive(Debug)]
pub enum ChatError {
    /// The bearer credential is missing from the environment.
    MissingApiKey,
    /// The completion endpoint returned a non-success status.
    Request { status: u16, body: String },
    /// The response body could not be read mid-stream.
    StreamAccess(String),
    /// A `data:` payload was not valid JSON.
    Decode(String),
    /// The transcript file could not be written.
    Persist(String),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::MissingApiKey => {
                write!(f, "TOGETHER_API_KEY environment variable not set")
            }
            ChatError::Request { status, body } => {
                write!(f, "API request failed with status {status}: {body}")
            }
            ChatError::StreamAccess(detail) => {
                write!(f, "response stream unreadable: {detail}")
            }
            ChatError::Decode(detail) => write!(f, "malformed stream payload: {detail}"),
            ChatError::Persist(detail) => write!(f, "failed to persist transcript: {detail}"),
        }
    }
}

impl std::error::Error for ChatError {}
