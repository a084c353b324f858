use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no device at descriptor {0}")]
    NoDevice(usize),
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("device rejected request: {0}")]
    Rejected(String),
}
