use thiserror::Error;

/// Failures observed at the audio backend boundary. Callers of the backend only
/// ever see `false`; the error is logged and kept for `last_error`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("audio backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("unsupported audio source: {0}")]
    UnsupportedSource(String),
    #[error("audio backend used after dispose")]
    DisposedStateAccess,
    #[error("audio backend is not initialized")]
    NotReady,
    #[error("media platform error: {0}")]
    Platform(String),
}

impl BackendError {
    /// Whether the failure means audio cannot be produced for this source, as
    /// opposed to the backend being used outside its lifecycle.
    pub fn is_capability_loss(&self) -> bool {
        matches!(
            self,
            BackendError::BackendUnavailable(_)
                | BackendError::UnsupportedSource(_)
                | BackendError::Platform(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_are_not_capability_loss() {
        assert!(BackendError::Platform("no device".into()).is_capability_loss());
        assert!(BackendError::UnsupportedSource("take.mid".into()).is_capability_loss());
        assert!(!BackendError::NotReady.is_capability_loss());
        assert!(!BackendError::DisposedStateAccess.is_capability_loss());
    }
}
