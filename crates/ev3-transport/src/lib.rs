//! ev3-transport: blocking access to an EV3 brick
//!
//! This crate provides the [`Brick`] trait and the types describing what is
//! attached to the brick's ports, with feature-gated backends. The default build
//! enables a `mock` backend so that binaries and tests run on any host, and a
//! `sysfs` backend that talks to the ev3dev device classes under `/sys/class`.

mod types;
pub use types::{
    parse_address, port_name, Descriptor, DescriptorTable, DeviceClass, DeviceType, LightColor,
    LightSide, Polarity, Port, TachoCommand, DESC_LIMIT, EXT_PORT_NONE, PORT_COUNT,
};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::Brick;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockBrick, MockCall};

#[cfg(feature = "sysfs")]
mod sysfs;

#[cfg(feature = "sysfs")]
pub use sysfs::{SysfsBrick, DEFAULT_SYSFS_ROOT};
