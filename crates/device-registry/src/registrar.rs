use crate::{PresenceFlags, RegistryError, Result, SequenceTable, Wanted};
use ev3_transport::{Brick, DeviceClass, DESC_LIMIT, PORT_COUNT};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// A wanted device matched during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registered {
    pub slot: usize,
    /// Position of the matched descriptor in its table
    pub index: usize,
    /// Sequence number answering the plugged-in lookup
    pub sn: usize,
}

/// Owns the brick for a diagnostic run and finds the devices it needs.
///
/// Every failing operation releases the brick before returning, and so does
/// dropping the registrar.
pub struct Registrar<B: Brick> {
    brick: B,
    table: SequenceTable,
    presence: PresenceFlags,
    acquired: bool,
}

impl<B: Brick> Registrar<B> {
    pub fn new(brick: B) -> Self {
        Self {
            brick,
            table: SequenceTable::default(),
            presence: PresenceFlags::default(),
            acquired: false,
        }
    }

    pub fn brick(&self) -> &B {
        &self.brick
    }

    pub fn brick_mut(&mut self) -> &mut B {
        &mut self.brick
    }

    pub fn table(&self) -> &SequenceTable {
        &self.table
    }

    pub fn presence(&self) -> PresenceFlags {
        self.presence
    }

    /// Whether the brick is currently held.
    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Forget every previous match.
    pub fn reset(&mut self) {
        self.table.reset();
        self.presence = PresenceFlags::default();
    }

    /// Detect the brick and enumerate its ports; returns the port count.
    pub fn init_brick(&mut self) -> Result<usize> {
        self.guard(Self::init_brick_inner)
    }

    /// Populate the descriptor table of `class`; returns the device count.
    pub fn init_subsystem(&mut self, class: DeviceClass) -> Result<usize> {
        self.guard(|r| r.init_subsystem_inner(class))
    }

    /// Scan the already initialized descriptor table of `class` for `wanted`.
    pub fn scan(&mut self, class: DeviceClass, wanted: &[Wanted]) -> Result<Vec<Registered>> {
        self.guard(|r| r.scan_inner(class, wanted))
    }

    /// Full registration pass: reset, brick and port initialization,
    /// subsystem initialization, then scan. Fails fast on the first error.
    pub fn register(&mut self, class: DeviceClass, wanted: &[Wanted]) -> Result<Vec<Registered>> {
        validate(class, wanted)?;
        self.guard(|r| {
            r.reset();
            r.init_brick_inner()?;
            r.init_subsystem_inner(class)?;
            r.scan_inner(class, wanted)
        })
    }

    /// Register a single sensor.
    pub fn register_sensor(&mut self, wanted: Wanted) -> Result<Registered> {
        let label = wanted.label.clone();
        self.register(DeviceClass::Sensor, std::slice::from_ref(&wanted))?
            .into_iter()
            .next()
            .ok_or(RegistryError::NotFound {
                missing: vec![label],
            })
    }

    /// Give the brick back. Does nothing when it is not held.
    pub fn release(&mut self) {
        if self.acquired {
            self.brick.uninit();
            self.acquired = false;
            debug!("EV3 brick released");
        }
    }

    /// Run `f`, releasing the brick if it fails.
    pub(crate) fn guard<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = f(self);
        if result.is_err() {
            self.release();
        }
        result
    }

    fn init_brick_inner(&mut self) -> Result<usize> {
        if !self.acquired {
            match self.brick.init() {
                Ok(true) => {
                    self.acquired = true;
                    info!("EV3 brick found");
                }
                Ok(false) => {
                    error!(fatal = true, "EV3 brick not found");
                    return Err(RegistryError::BrickNotFound);
                }
                Err(e) => {
                    error!(error = %e, "EV3 brick initialization failed");
                    return Err(RegistryError::Brick(e));
                }
            }
        }
        let ports = self.brick.port_init().map_err(|e| {
            error!(error = %e, "error while initializing the EV3 ports");
            RegistryError::Ports(e)
        })?;
        if ports == PORT_COUNT {
            info!("all EV3 ports found");
        } else {
            warn!("found {ports}/{PORT_COUNT} EV3 ports");
        }
        Ok(ports)
    }

    fn init_subsystem_inner(&mut self, class: DeviceClass) -> Result<usize> {
        let count = self.brick.subsystem_init(class).map_err(|source| {
            error!(error = %source, "error while initializing the EV3 {class}s");
            RegistryError::Subsystem { class, source }
        })?;
        info!("found {count} EV3 {class}(s)");
        Ok(count)
    }

    fn scan_inner(&mut self, class: DeviceClass, wanted: &[Wanted]) -> Result<Vec<Registered>> {
        validate(class, wanted)?;
        let expected = PresenceFlags::expected(wanted);
        let descriptors = *self.brick.descriptors(class);
        let mut registered = Vec::with_capacity(wanted.len());

        for (index, desc) in descriptors.iter().enumerate() {
            if self.presence.missing(expected).is_empty() {
                break;
            }
            let Some(port) = desc.port else {
                continue;
            };
            let Some(w) = wanted
                .iter()
                .find(|w| !self.presence.contains(w.slot) && w.matches(desc))
            else {
                continue;
            };

            self.presence.set(w.slot);
            self.table.record(w.slot, index);
            info!(slot = w.slot, sn = index, %port, "{} found", w.label);

            let sn = self
                .brick
                .search_plugged_in(class, port, desc.extport, 0)
                .ok_or_else(|| {
                    error!(%port, "{} is not plugged into the EV3 brick", w.label);
                    RegistryError::NotPluggedIn {
                        kind: w.kind,
                        port,
                    }
                })?;

            if let Some(mode) = &w.mode {
                self.brick.set_sensor_mode(sn, mode).map_err(|source| {
                    error!(error = %source, "cannot switch {} to mode '{mode}'", w.label);
                    RegistryError::NotResponding {
                        kind: w.kind,
                        sn,
                        source,
                    }
                })?;
                debug!(sn, mode = mode.as_str(), "mode set");
            }

            registered.push(Registered {
                slot: w.slot,
                index,
                sn,
            });
        }

        let missing = self.presence.missing(expected);
        if !missing.is_empty() {
            let names: Vec<String> = wanted
                .iter()
                .filter(|w| missing.contains(w.slot))
                .map(|w| w.label.clone())
                .collect();
            for name in &names {
                error!(fatal = true, "{name} not found");
            }
            return Err(RegistryError::NotFound { missing: names });
        }
        Ok(registered)
    }
}

impl<B: Brick> Drop for Registrar<B> {
    fn drop(&mut self) {
        self.release();
    }
}

fn validate(class: DeviceClass, wanted: &[Wanted]) -> Result<()> {
    let mut slots = HashSet::new();
    for w in wanted {
        if w.slot >= DESC_LIMIT {
            return Err(RegistryError::InvalidRequest(format!(
                "slot {} of {} is out of range",
                w.slot, w.label
            )));
        }
        if !slots.insert(w.slot) {
            return Err(RegistryError::InvalidRequest(format!(
                "slot {} requested twice",
                w.slot
            )));
        }
        if w.kind.class() != Some(class) {
            return Err(RegistryError::InvalidRequest(format!(
                "{} is not a {class}",
                w.label
            )));
        }
        if w.mode.is_some() && class != DeviceClass::Sensor {
            return Err(RegistryError::InvalidRequest(format!(
                "{} has no modes",
                w.label
            )));
        }
    }
    Ok(())
}
