use redgreen_core::{SceneError, SessionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("request to /{endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("/{endpoint} returned {status}: {message}")]
    Status {
        endpoint: &'static str,
        status: u16,
        message: String,
    },
    #[error("unexpected response from /{endpoint}: {reason}")]
    Decode {
        endpoint: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("malformed scene: {0}")]
    Scene(#[from] SceneError),
}
