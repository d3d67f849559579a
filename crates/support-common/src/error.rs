use std::time::Duration;

/// Error types shared by every consumer of the remote text-generation service.
///
/// These errors are the user-facing taxonomy for fallback failures: callers surface both
/// variants as "try again later" and keep serving. Transport detail lives in
/// [`crate::openai::OpenAiClientError`] and is folded into these variants at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("fallback service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("fallback service timed out after {0:?}")]
    Timeout(Duration),
}

