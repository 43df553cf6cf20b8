use thiserror::Error;

/// Errors raised by the computation component (the risk engine).
///
/// The gateway never shows these to callers verbatim. The dispatcher
/// flattens them into a generic bad request and the image handler into a
/// generic server error; the detail is only logged.
#[derive(Debug, Clone, Error)]
pub enum ComputeError {
    /// The engine answered with a non-success status
    #[error("Engine returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Network or connection error while talking to the engine
    #[error("Connection error: {0}")]
    Connection(String),

    /// The engine answered with something the gateway cannot interpret
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),

    /// Requested resource (array, tile, pyramid level) does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl ComputeError {
    /// Returns true if the error is likely transient (connection level).
    pub fn is_transient(&self) -> bool {
        match self {
            ComputeError::Connection(_) => true,
            ComputeError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
