use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriftwatchError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("history store error: {0}")]
    History(String),

    #[error("corpus error: {0}")]
    Corpus(String),

    #[error("crawl error: {0}")]
    Crawl(String),

    #[error("probe error: {0}")]
    Probe(String),

    #[error("report error: {0}")]
    Report(String),

    /// The canonical cancellation sentinel. Detected by variant match,
    /// never merged with other kinds.
    #[error("scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl DriftwatchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DriftwatchError::Cancelled)
    }
}

/// Walk an anyhow chain looking for the cancellation sentinel. Context
/// wrapping at each boundary must not hide a cancellation from the scheduler.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<DriftwatchError>()
            .is_some_and(DriftwatchError::is_cancelled)
    })
}
