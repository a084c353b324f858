use ev3_transport::{DeviceClass, DeviceType, Port, TransportError};
use thiserror::Error;

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("EV3 brick not found")]
    BrickNotFound,
    #[error("EV3 brick initialization failed: {0}")]
    Brick(#[source] TransportError),
    #[error("EV3 port initialization failed: {0}")]
    Ports(#[source] TransportError),
    #[error("{class} initialization failed: {source}")]
    Subsystem {
        class: DeviceClass,
        #[source]
        source: TransportError,
    },
    #[error("{kind} on port {port} is not plugged into the brick")]
    NotPluggedIn { kind: DeviceType, port: Port },
    #[error("{kind} (sequence number {sn}) is not responding: {source}")]
    NotResponding {
        kind: DeviceType,
        sn: usize,
        #[source]
        source: TransportError,
    },
    #[error("required device not found: {}", .missing.join(", "))]
    NotFound { missing: Vec<String> },
    #[error("invalid device request: {0}")]
    InvalidRequest(String),
}

impl RegistryError {
    /// Conditions the programs report as fatal rather than as plain errors.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RegistryError::BrickNotFound | RegistryError::NotFound { .. }
        )
    }
}
