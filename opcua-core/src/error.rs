use crate::status_code::StatusCode;
use thiserror::Error;

/// Main error type for OPC UA operations
#[derive(Error, Debug)]
pub enum UaError {
    #[error("Status: {0}")]
    Status(StatusCode),

    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Timeout")]
    Timeout,
}

impl UaError {
    /// Status code reported to a remote peer for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            UaError::Status(code) => *code,
            UaError::Connection(_) => StatusCode::BAD_COMMUNICATION_ERROR,
            UaError::InvalidData(_) => StatusCode::BAD_INVALID_ARGUMENT,
            UaError::Configuration(_) => StatusCode::BAD_INVALID_STATE,
            UaError::AccessDenied(_) => StatusCode::BAD_USER_ACCESS_DENIED,
            UaError::Timeout => StatusCode::BAD_TIMEOUT,
        }
    }
}

impl From<StatusCode> for UaError {
    fn from(code: StatusCode) -> Self {
        UaError::Status(code)
    }
}

/// Result type alias for OPC UA operations
pub type UaResult<T> = Result<T, UaError>;

/// Turn a status code into a result, `Ok` only for good codes
pub fn status_to_result(code: StatusCode) -> UaResult<()> {
    if code.is_good() {
        Ok(())
    } else {
        Err(UaError::Status(code))
    }
}
