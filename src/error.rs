//! Error types for the audio engine

use thiserror::Error;

/// Errors surfaced by device, registry and buffer operations.
///
/// Every fallible operation returns one of these rather than panicking;
/// callers embedding the engine (for example behind a foreign-function
/// binding) are expected to translate them into their own exception
/// mechanism.
#[derive(Error, Debug)]
pub enum AudioError {
    /// Every slot in the registry already holds an open device.
    #[error("No more devices available")]
    NoSlotsAvailable,

    /// The device id is out of range or the slot is not open.
    #[error("Invalid device ID")]
    InvalidDeviceId,

    /// `initialize` was called on an already-initialized device.
    #[error("Already initialized")]
    AlreadyInitialized,

    /// A device operation was attempted before initialization completed.
    #[error("Device not initialized")]
    NotInitialized,

    /// Format negotiation with the audio backend failed.
    #[error("{0}")]
    BackendNegotiationFailed(String),

    /// A write reservation would overwrite unread data.
    #[error("Insufficient buffer space")]
    InsufficientSpace,

    /// The backend rejected a start/stop/reset request.
    #[error("{0}")]
    BackendOperationFailed(String),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, AudioError>;
