use std::path::PathBuf;

use support_common::error::CommonError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("dataset error in {}: {message}", .path.display())]
    Dataset { path: PathBuf, message: String },

    #[error("dataset contains no usable issue records")]
    EmptyDataset,

    #[error("query must not be empty")]
    EmptyQuery,

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl AppError {
    /// Whether the error came from the fallback service and should be shown as
    /// "try again later" rather than a problem with the user's input.
    pub fn is_service_failure(&self) -> bool {
        matches!(self, AppError::Common(_))
    }
}
