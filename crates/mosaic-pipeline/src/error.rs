//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] mosaic_models::ConfigError),

    #[error("media error: {0}")]
    Media(#[from] mosaic_media::MediaError),

    #[error("catalog error: {0}")]
    Catalog(#[from] mosaic_catalog::CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Whether this is the cooperative-cancellation sentinel, at either
    /// layer.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
            || matches!(self, PipelineError::Media(e) if e.is_cancelled())
    }
}
