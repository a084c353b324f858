use crate::{
    Brick, Descriptor, DescriptorTable, DeviceClass, DeviceType, LightColor, LightSide, Polarity,
    Port, Result, TachoCommand, TransportError, DESC_LIMIT, PORT_COUNT,
};
use std::collections::{HashMap, HashSet};

/// Calls recorded by [`MockBrick`], in order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MockCall {
    Init,
    Uninit,
    PortInit,
    SubsystemInit(DeviceClass),
    SensorMode { sn: usize, mode: String },
    SensorPollMs { sn: usize, ms: u32 },
    TachoCommand { sn: usize, command: TachoCommand },
    TachoPolarity { sn: usize, polarity: Polarity },
    TachoDutyCycle { sn: usize, duty: i32 },
    Light { side: LightSide, color: LightColor },
}

/// An in-process brick built from a list of devices. Failures can be injected
/// per device so that every error path of a caller is testable.
#[derive(Debug, Clone)]
pub struct MockBrick {
    present: bool,
    ports: usize,
    fail_port_init: bool,
    fail_subsystem: HashSet<DeviceClass>,
    sensors: DescriptorTable,
    tachos: DescriptorTable,
    unplugged: HashSet<(DeviceClass, usize)>,
    failing: HashSet<(DeviceClass, usize)>,
    sensor_modes: HashMap<usize, String>,
    sensor_values: HashMap<(usize, usize), i32>,
    poll_ms: HashMap<usize, u32>,
    max_speeds: HashMap<usize, i32>,
    lights: HashMap<LightSide, LightColor>,
    initialized: bool,
    calls: Vec<MockCall>,
}

impl Default for MockBrick {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrick {
    /// A present brick with all 8 ports and nothing plugged in.
    pub fn new() -> Self {
        Self {
            present: true,
            ports: PORT_COUNT,
            fail_port_init: false,
            fail_subsystem: HashSet::new(),
            sensors: [Descriptor::EMPTY; DESC_LIMIT],
            tachos: [Descriptor::EMPTY; DESC_LIMIT],
            unplugged: HashSet::new(),
            failing: HashSet::new(),
            sensor_modes: HashMap::new(),
            sensor_values: HashMap::new(),
            poll_ms: HashMap::new(),
            max_speeds: HashMap::new(),
            lights: HashMap::new(),
            initialized: false,
            calls: Vec::new(),
        }
    }

    /// No brick answers `init`.
    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    pub fn with_ports(mut self, ports: usize) -> Self {
        self.ports = ports.min(PORT_COUNT);
        self
    }

    pub fn failing_port_init(mut self) -> Self {
        self.fail_port_init = true;
        self
    }

    pub fn failing_subsystem(mut self, class: DeviceClass) -> Self {
        self.fail_subsystem.insert(class);
        self
    }

    /// Put a descriptor at a specific sequence number.
    pub fn with_descriptor(mut self, class: DeviceClass, sn: usize, desc: Descriptor) -> Self {
        if sn < DESC_LIMIT {
            self.table_mut(class)[sn] = desc;
        }
        self
    }

    /// Add a sensor at the next free sequence number (default poll 10 ms).
    pub fn with_sensor(mut self, kind: DeviceType, port: Port) -> Self {
        if let Some(sn) = Self::free_slot(&self.sensors) {
            self.sensors[sn] = Descriptor::new(kind, port);
            self.poll_ms.insert(sn, 10);
        }
        self
    }

    /// Add a tacho motor at the next free sequence number.
    pub fn with_tacho(mut self, kind: DeviceType, port: Port, max_speed: i32) -> Self {
        if let Some(sn) = Self::free_slot(&self.tachos) {
            self.tachos[sn] = Descriptor::new(kind, port);
            self.max_speeds.insert(sn, max_speed);
        }
        self
    }

    pub fn with_sensor_value(mut self, sn: usize, index: usize, value: i32) -> Self {
        self.sensor_values.insert((sn, index), value);
        self
    }

    /// The descriptor stays in the table but the plugged-in lookup misses it.
    pub fn unplugged(mut self, class: DeviceClass, sn: usize) -> Self {
        self.unplugged.insert((class, sn));
        self
    }

    /// Every read or write addressed to this device fails.
    pub fn failing(mut self, class: DeviceClass, sn: usize) -> Self {
        self.failing.insert((class, sn));
        self
    }

    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn sensor_mode(&self, sn: usize) -> Option<&str> {
        self.sensor_modes.get(&sn).map(String::as_str)
    }

    pub fn light(&self, side: LightSide) -> Option<LightColor> {
        self.lights.get(&side).copied()
    }

    fn free_slot(table: &DescriptorTable) -> Option<usize> {
        table.iter().position(Descriptor::is_empty)
    }

    fn table_mut(&mut self, class: DeviceClass) -> &mut DescriptorTable {
        match class {
            DeviceClass::Sensor => &mut self.sensors,
            DeviceClass::Tacho => &mut self.tachos,
        }
    }

    fn check(&self, class: DeviceClass, sn: usize) -> Result<()> {
        let desc = self
            .descriptors(class)
            .get(sn)
            .ok_or(TransportError::NoDevice(sn))?;
        if desc.is_empty() {
            return Err(TransportError::NoDevice(sn));
        }
        if self.failing.contains(&(class, sn)) {
            return Err(TransportError::Rejected(format!("{class} {sn} did not answer")));
        }
        Ok(())
    }
}

impl Brick for MockBrick {
    fn init(&mut self) -> Result<bool> {
        self.calls.push(MockCall::Init);
        self.initialized = self.present;
        Ok(self.present)
    }

    fn uninit(&mut self) {
        self.calls.push(MockCall::Uninit);
        self.initialized = false;
    }

    fn port_init(&mut self) -> Result<usize> {
        self.calls.push(MockCall::PortInit);
        if self.fail_port_init {
            return Err(TransportError::Io("lego-port class unavailable".to_string()));
        }
        Ok(self.ports)
    }

    fn subsystem_init(&mut self, class: DeviceClass) -> Result<usize> {
        self.calls.push(MockCall::SubsystemInit(class));
        if self.fail_subsystem.contains(&class) {
            return Err(TransportError::Io(format!("{class} class unavailable")));
        }
        Ok(self
            .descriptors(class)
            .iter()
            .filter(|d| !d.is_empty())
            .count())
    }

    fn descriptors(&self, class: DeviceClass) -> &DescriptorTable {
        match class {
            DeviceClass::Sensor => &self.sensors,
            DeviceClass::Tacho => &self.tachos,
        }
    }

    fn search_plugged_in(
        &self,
        class: DeviceClass,
        port: Port,
        extport: u8,
        from: usize,
    ) -> Option<usize> {
        let table = self.descriptors(class);
        (from..DESC_LIMIT).find(|&sn| {
            let desc = &table[sn];
            !desc.is_empty()
                && desc.port == Some(port)
                && desc.extport == extport
                && !self.unplugged.contains(&(class, sn))
        })
    }

    fn set_sensor_mode(&mut self, sn: usize, mode: &str) -> Result<()> {
        self.calls.push(MockCall::SensorMode {
            sn,
            mode: mode.to_string(),
        });
        self.check(DeviceClass::Sensor, sn)?;
        self.sensor_modes.insert(sn, mode.to_string());
        Ok(())
    }

    fn sensor_value(&self, sn: usize, index: usize) -> Result<i32> {
        self.check(DeviceClass::Sensor, sn)?;
        Ok(self.sensor_values.get(&(sn, index)).copied().unwrap_or(0))
    }

    fn sensor_poll_ms(&self, sn: usize) -> Result<u32> {
        self.check(DeviceClass::Sensor, sn)?;
        Ok(self.poll_ms.get(&sn).copied().unwrap_or(0))
    }

    fn set_sensor_poll_ms(&mut self, sn: usize, ms: u32) -> Result<()> {
        self.calls.push(MockCall::SensorPollMs { sn, ms });
        self.check(DeviceClass::Sensor, sn)?;
        self.poll_ms.insert(sn, ms);
        Ok(())
    }

    fn tacho_max_speed(&self, sn: usize) -> Result<i32> {
        self.check(DeviceClass::Tacho, sn)?;
        Ok(self.max_speeds.get(&sn).copied().unwrap_or(0))
    }

    fn set_tacho_command(&mut self, sn: usize, command: TachoCommand) -> Result<()> {
        self.calls.push(MockCall::TachoCommand { sn, command });
        self.check(DeviceClass::Tacho, sn)
    }

    fn set_tacho_polarity(&mut self, sn: usize, polarity: Polarity) -> Result<()> {
        self.calls.push(MockCall::TachoPolarity { sn, polarity });
        self.check(DeviceClass::Tacho, sn)
    }

    fn set_tacho_duty_cycle_sp(&mut self, sn: usize, duty: i32) -> Result<()> {
        self.calls.push(MockCall::TachoDutyCycle { sn, duty });
        self.check(DeviceClass::Tacho, sn)
    }

    fn set_light(&mut self, side: LightSide, color: LightColor) -> Result<()> {
        self.calls.push(MockCall::Light { side, color });
        self.lights.insert(side, color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devices_fill_free_slots() {
        let brick = MockBrick::new()
            .with_sensor(DeviceType::Ev3Color, Port::In1)
            .with_sensor(DeviceType::Ev3Touch, Port::In2)
            .with_tacho(DeviceType::Ev3LargeMotor, Port::OutA, 1050);
        let sensors = brick.descriptors(DeviceClass::Sensor);
        assert_eq!(sensors[0].kind, DeviceType::Ev3Color);
        assert_eq!(sensors[1].kind, DeviceType::Ev3Touch);
        assert!(sensors[2].is_empty());
        assert_eq!(brick.tacho_max_speed(0).unwrap(), 1050);
    }

    #[test]
    fn test_sensor_values_default_to_zero() {
        let brick = MockBrick::new()
            .with_sensor(DeviceType::Ev3Ultrasonic, Port::In3)
            .with_sensor_value(0, 0, 255);
        assert_eq!(brick.sensor_value(0, 0).unwrap(), 255);
        assert_eq!(brick.sensor_value(0, 1).unwrap(), 0);
        assert_eq!(brick.sensor_poll_ms(0).unwrap(), 10);
    }

    #[test]
    fn test_unplugged_device_is_not_found_by_search() {
        let brick = MockBrick::new()
            .with_sensor(DeviceType::Ev3Touch, Port::In2)
            .unplugged(DeviceClass::Sensor, 0);
        assert_eq!(
            brick.search_plugged_in(DeviceClass::Sensor, Port::In2, 0, 0),
            None
        );
    }

    #[test]
    fn test_failing_device_rejects_commands() {
        let mut brick = MockBrick::new()
            .with_sensor(DeviceType::Ev3Color, Port::In1)
            .failing(DeviceClass::Sensor, 0);
        assert!(brick.set_sensor_mode(0, "COL-COLOR").is_err());
        assert_eq!(brick.sensor_mode(0), None);
        assert!(matches!(
            brick.sensor_value(5, 0),
            Err(TransportError::NoDevice(5))
        ));
    }

    #[test]
    fn test_init_reports_absence() {
        let mut brick = MockBrick::new().absent();
        assert!(!brick.init().unwrap());
        assert!(!brick.is_initialized());
        assert_eq!(brick.calls(), &[MockCall::Init]);
    }
}
