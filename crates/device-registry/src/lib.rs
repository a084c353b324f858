//! device-registry: discovery and configuration of EV3 peripherals
//!
//! A [`Registrar`] owns the brick for the lifetime of a diagnostic run. It scans
//! the brick's descriptor tables for the devices a program needs, records where
//! each one was found in a [`SequenceTable`], puts it in the wanted mode and
//! releases the brick on every exit path.

mod types;
pub use types::*;

mod error;
pub use error::{RegistryError, Result};

mod registrar;
pub use registrar::{Registered, Registrar};

mod motors;
pub use motors::{effective_max_speed, MotorPair, MotorPairPorts, LEFT_MOTOR_SLOT, RIGHT_MOTOR_SLOT};
