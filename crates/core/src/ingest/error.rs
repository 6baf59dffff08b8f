use thiserror::Error;

/// Failure of one fetch→parse→normalize pass.
///
/// The scheduler flattens these into the snapshot's single `error` string; the kind is
/// only reported through logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed payload: {0}")]
    Format(String),
    #[error("source table has no rows")]
    EmptyDataset,
}

impl IngestError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Format(_) => "format",
            Self::EmptyDataset => "empty_dataset",
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
