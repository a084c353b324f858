use crate::{
    DescriptorTable, DeviceClass, LightColor, LightSide, Polarity, Port, Result, TachoCommand,
    TransportError, DESC_LIMIT,
};

/// A minimal blocking interface to an EV3 brick.
///
/// Device addressing uses sequence numbers: the index of a device in its
/// class's descriptor table.
pub trait Brick {
    /// Detect the brick. `Ok(false)` means no brick is present.
    fn init(&mut self) -> Result<bool>;

    /// Release the brick. Safe to call more than once.
    fn uninit(&mut self);

    /// Enumerate the brick ports; returns how many of the 8 were found.
    fn port_init(&mut self) -> Result<usize>;

    /// Populate the descriptor table of `class`; returns the device count.
    fn subsystem_init(&mut self, class: DeviceClass) -> Result<usize>;

    /// Descriptor table of `class`. Free slots have `DeviceType::None`.
    fn descriptors(&self, class: DeviceClass) -> &DescriptorTable;

    /// Find the first device of `class` plugged into `port`/`extport`,
    /// starting at sequence number `from`.
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
            !desc.is_empty() && desc.port == Some(port) && desc.extport == extport
        })
    }

    /// Switch a sensor to one of its modes (`COL-COLOR`, `TOUCH`, ...).
    fn set_sensor_mode(&mut self, sn: usize, mode: &str) -> Result<()>;

    /// Read `value<index>` of a sensor in its current mode.
    fn sensor_value(&self, sn: usize, index: usize) -> Result<i32>;

    /// Sensor poll interval in milliseconds.
    fn sensor_poll_ms(&self, sn: usize) -> Result<u32>;

    fn set_sensor_poll_ms(&mut self, sn: usize, ms: u32) -> Result<()>;

    /// Maximum speed of a tacho motor, in tacho counts per second.
    fn tacho_max_speed(&self, sn: usize) -> Result<i32>;

    fn set_tacho_command(&mut self, sn: usize, command: TachoCommand) -> Result<()>;

    fn set_tacho_polarity(&mut self, sn: usize, polarity: Polarity) -> Result<()>;

    fn set_tacho_duty_cycle_sp(&mut self, sn: usize, duty: i32) -> Result<()>;

    /// Set one of the two brick status lights.
    fn set_light(&mut self, _side: LightSide, _color: LightColor) -> Result<()> {
        Err(TransportError::Unsupported("status lights"))
    }
}
