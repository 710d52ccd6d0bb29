use std::error::Error as StdError;
use std::fmt;

use llm::LlmError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy used for logs, metrics and response metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Classification,
    Analysis,
    Retrieval,
    Generation,
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Classification => "classification",
            ErrorKind::Analysis => "analysis",
            ErrorKind::Retrieval => "retrieval",
            ErrorKind::Generation => "generation",
            ErrorKind::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An agent-level failure: what went wrong, and the underlying cause.
#[derive(Debug, Error)]
#[error("{kind} failure: {source}")]
pub struct AgentError {
    kind: ErrorKind,
    source: Box<dyn StdError + Send + Sync>,
}

impl AgentError {
    pub fn new<E>(kind: ErrorKind, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind,
            source: Box::new(source),
        }
    }

    pub fn analysis<E: StdError + Send + Sync + 'static>(source: E) -> Self {
        Self::new(ErrorKind::Analysis, source)
    }

    pub fn retrieval<E: StdError + Send + Sync + 'static>(source: E) -> Self {
        Self::new(ErrorKind::Retrieval, source)
    }

    pub fn generation<E: StdError + Send + Sync + 'static>(source: E) -> Self {
        Self::new(ErrorKind::Generation, source)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// The intent classifier could not produce a decision.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("intent classification failed: {0}")]
pub struct ClassificationError(#[from] pub LlmError);

impl From<ClassificationError> for AgentError {
    fn from(err: ClassificationError) -> Self {
        AgentError::new(ErrorKind::Classification, err)
    }
}

/// The request was refused before any agent ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestRejected {
    #[error("request has neither a question nor an image")]
    Empty,
}

impl RequestRejected {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_error_keeps_kind_and_source() {
        let err = AgentError::generation(LlmError::EmptyResponse);
        assert_eq!(err.kind(), ErrorKind::Generation);
        assert!(err.to_string().starts_with("generation failure"));
        assert!(err.source().is_some());
    }

    #[test]
    fn classification_errors_convert() {
        let err: AgentError = ClassificationError(LlmError::Schema("bad".into())).into();
        assert_eq!(err.kind(), ErrorKind::Classification);
    }

    #[test]
    fn kinds_serialize_snake_case() {
        let json = serde_json::to_string(&ErrorKind::Retrieval).unwrap();
        assert_eq!(json, "\"retrieval\"");
        assert_eq!(RequestRejected::Empty.kind(), ErrorKind::Validation);
    }
}
