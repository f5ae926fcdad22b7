use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),
}

impl CoreError {
    /// The playback error behind this one, if any.
    pub fn as_playback(&self) -> Option<&core_playback::PlaybackError> {
        match self {
            CoreError::Playback(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
