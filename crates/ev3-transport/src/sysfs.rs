use crate::{
    parse_address, Brick, Descriptor, DescriptorTable, DeviceClass, DeviceType, LightColor,
    LightSide, Polarity, Port, Result, TachoCommand, TransportError, DESC_LIMIT,
};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Device class root on an ev3dev system.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class";

/// The ev3dev sysfs device classes (`lego-port`, `lego-sensor`,
/// `tacho-motor`, `leds`) under a root directory.
pub struct SysfsBrick {
    root: PathBuf,
    initialized: bool,
    sensors: DescriptorTable,
    tachos: DescriptorTable,
}

impl Default for SysfsBrick {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsBrick {
    pub fn new() -> Self {
        Self::with_root(DEFAULT_SYSFS_ROOT)
    }

    /// Use another class root, e.g. a fixture tree in tests.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            initialized: false,
            sensors: [Descriptor::EMPTY; DESC_LIMIT],
            tachos: [Descriptor::EMPTY; DESC_LIMIT],
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn class_dir(&self, class: DeviceClass) -> PathBuf {
        match class {
            DeviceClass::Sensor => self.root.join("lego-sensor"),
            DeviceClass::Tacho => self.root.join("tacho-motor"),
        }
    }

    fn prefix(class: DeviceClass) -> &'static str {
        match class {
            DeviceClass::Sensor => "sensor",
            DeviceClass::Tacho => "motor",
        }
    }

    fn device_dir(&self, class: DeviceClass, sn: usize) -> PathBuf {
        self.class_dir(class).join(format!("{}{sn}", Self::prefix(class)))
    }

    fn read_attr(&self, class: DeviceClass, sn: usize, attr: &str) -> Result<String> {
        if self.table(class).get(sn).map_or(true, Descriptor::is_empty) {
            return Err(TransportError::NoDevice(sn));
        }
        read_trimmed(&self.device_dir(class, sn).join(attr))
    }

    fn read_num<T: FromStr>(&self, class: DeviceClass, sn: usize, attr: &str) -> Result<T> {
        let raw = self.read_attr(class, sn, attr)?;
        raw.parse()
            .map_err(|_| TransportError::InvalidValue(format!("{attr}='{raw}'")))
    }

    fn write_attr(&self, class: DeviceClass, sn: usize, attr: &str, value: &str) -> Result<()> {
        if self.table(class).get(sn).map_or(true, Descriptor::is_empty) {
            return Err(TransportError::NoDevice(sn));
        }
        let path = self.device_dir(class, sn).join(attr);
        debug!(path = %path.display(), value, "sysfs write");
        fs::write(&path, value).map_err(|e| io_error(&path, e))
    }

    fn table(&self, class: DeviceClass) -> &DescriptorTable {
        match class {
            DeviceClass::Sensor => &self.sensors,
            DeviceClass::Tacho => &self.tachos,
        }
    }

    /// Build the descriptor table of a class from its `<prefix><sn>` directories.
    fn scan_class(&self, class: DeviceClass) -> Result<(DescriptorTable, usize)> {
        let mut table = [Descriptor::EMPTY; DESC_LIMIT];
        let mut count = 0;
        let dir = self.class_dir(class);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            // No driver loaded for this class: nothing attached
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((table, 0)),
            Err(e) => return Err(io_error(&dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&dir, e))?;
            let name = entry.file_name();
            let Some(sn) = name
                .to_str()
                .and_then(|n| n.strip_prefix(Self::prefix(class)))
                .and_then(|n| n.parse::<usize>().ok())
            else {
                continue;
            };
            if sn >= DESC_LIMIT {
                warn!(%class, sn, "sequence number beyond descriptor table, ignored");
                continue;
            }
            let path = entry.path();
            let kind = DeviceType::from_driver_name(&read_trimmed(&path.join("driver_name"))?);
            let address = read_trimmed(&path.join("address"))?;
            let Some((port, extport, addr)) = parse_address(&address) else {
                warn!(%class, sn, address = %address, "unrecognized port address, ignored");
                continue;
            };
            table[sn] = Descriptor {
                kind,
                port: Some(port),
                extport,
                addr,
            };
            count += 1;
        }
        Ok((table, count))
    }

    fn led_brightness(&self, side: LightSide, channel: &str) -> PathBuf {
        self.root
            .join("leds")
            .join(format!("led{}:{channel}:brick-status", side.led_index()))
            .join("brightness")
    }
}

fn io_error(path: &Path, e: std::io::Error) -> TransportError {
    TransportError::Io(format!("{}: {e}", path.display()))
}

fn read_trimmed(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| io_error(path, e))
}

impl Brick for SysfsBrick {
    fn init(&mut self) -> Result<bool> {
        let ports = self.root.join("lego-port");
        match fs::metadata(&ports) {
            Ok(meta) if meta.is_dir() => {
                self.initialized = true;
                Ok(true)
            }
            Ok(_) => Err(TransportError::Io(format!(
                "{}: not a directory",
                ports.display()
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&ports, e)),
        }
    }

    fn uninit(&mut self) {
        self.initialized = false;
        self.sensors = [Descriptor::EMPTY; DESC_LIMIT];
        self.tachos = [Descriptor::EMPTY; DESC_LIMIT];
    }

    fn port_init(&mut self) -> Result<usize> {
        let dir = self.root.join("lego-port");
        let mut found = Vec::<Port>::new();
        for entry in fs::read_dir(&dir).map_err(|e| io_error(&dir, e))? {
            let entry = entry.map_err(|e| io_error(&dir, e))?;
            let Ok(address) = read_trimmed(&entry.path().join("address")) else {
                continue;
            };
            // Only the brick's own ports; multiplexer channels share a base port
            if let Some((port, crate::EXT_PORT_NONE, 0)) = parse_address(&address) {
                if !found.contains(&port) {
                    found.push(port);
                }
            }
        }
        Ok(found.len())
    }

    fn subsystem_init(&mut self, class: DeviceClass) -> Result<usize> {
        let (table, count) = self.scan_class(class)?;
        match class {
            DeviceClass::Sensor => self.sensors = table,
            DeviceClass::Tacho => self.tachos = table,
        }
        Ok(count)
    }

    fn descriptors(&self, class: DeviceClass) -> &DescriptorTable {
        self.table(class)
    }

    fn search_plugged_in(
        &self,
        class: DeviceClass,
        port: Port,
        extport: u8,
        from: usize,
    ) -> Option<usize> {
        let table = self.table(class);
        // The device directory disappears as soon as it is unplugged
        (from..DESC_LIMIT).find(|&sn| {
            let desc = &table[sn];
            !desc.is_empty()
                && desc.port == Some(port)
                && desc.extport == extport
                && self.device_dir(class, sn).is_dir()
        })
    }

    fn set_sensor_mode(&mut self, sn: usize, mode: &str) -> Result<()> {
        self.write_attr(DeviceClass::Sensor, sn, "mode", mode)
    }

    fn sensor_value(&self, sn: usize, index: usize) -> Result<i32> {
        self.read_num(DeviceClass::Sensor, sn, &format!("value{index}"))
    }

    fn sensor_poll_ms(&self, sn: usize) -> Result<u32> {
        self.read_num(DeviceClass::Sensor, sn, "poll_ms")
    }

    fn set_sensor_poll_ms(&mut self, sn: usize, ms: u32) -> Result<()> {
        self.write_attr(DeviceClass::Sensor, sn, "poll_ms", &ms.to_string())
    }

    fn tacho_max_speed(&self, sn: usize) -> Result<i32> {
        self.read_num(DeviceClass::Tacho, sn, "max_speed")
    }

    fn set_tacho_command(&mut self, sn: usize, command: TachoCommand) -> Result<()> {
        self.write_attr(DeviceClass::Tacho, sn, "command", command.as_str())
    }

    fn set_tacho_polarity(&mut self, sn: usize, polarity: Polarity) -> Result<()> {
        self.write_attr(DeviceClass::Tacho, sn, "polarity", polarity.as_str())
    }

    fn set_tacho_duty_cycle_sp(&mut self, sn: usize, duty: i32) -> Result<()> {
        self.write_attr(DeviceClass::Tacho, sn, "duty_cycle_sp", &duty.to_string())
    }

    fn set_light(&mut self, side: LightSide, color: LightColor) -> Result<()> {
        let (red, green) = color.channels();
        for (channel, on) in [("red", red), ("green", green)] {
            let path = self.led_brightness(side, channel);
            fs::write(&path, if on { "255" } else { "0" }).map_err(|e| io_error(&path, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, attr: &str, value: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(attr), value).unwrap();
    }

    fn fixture() -> TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for (i, port) in ["in1", "in2", "in3", "in4", "outA", "outB"].iter().enumerate() {
            write(
                &root.join("lego-port").join(format!("port{i}")),
                "address",
                &format!("ev3-ports:{port}\n"),
            );
        }
        let color = root.join("lego-sensor/sensor0");
        write(&color, "driver_name", "lego-ev3-color\n");
        write(&color, "address", "ev3-ports:in1\n");
        write(&color, "mode", "COL-REFLECT\n");
        write(&color, "poll_ms", "10\n");
        write(&color, "value0", "42\n");
        let sonar = root.join("lego-sensor/sensor3");
        write(&sonar, "driver_name", "lego-nxt-us\n");
        write(&sonar, "address", "ev3-ports:in2:i2c1\n");
        let motor = root.join("tacho-motor/motor2");
        write(&motor, "driver_name", "lego-ev3-l-motor\n");
        write(&motor, "address", "ev3-ports:outA\n");
        write(&motor, "max_speed", "1050\n");
        write(&motor, "command", "");
        for led in ["led0", "led1"] {
            for channel in ["red", "green"] {
                write(
                    &root.join("leds").join(format!("{led}:{channel}:brick-status")),
                    "brightness",
                    "0",
                );
            }
        }
        tmp
    }

    #[test]
    fn test_init_detects_brick() {
        let tmp = fixture();
        let mut brick = SysfsBrick::with_root(tmp.path());
        assert!(brick.init().unwrap());
        assert_eq!(brick.port_init().unwrap(), 6);

        let empty = tempfile::tempdir().unwrap();
        let mut absent = SysfsBrick::with_root(empty.path());
        assert!(!absent.init().unwrap());
    }

    #[test]
    fn test_subsystem_init_builds_descriptor_table() {
        let tmp = fixture();
        let mut brick = SysfsBrick::with_root(tmp.path());
        assert_eq!(brick.subsystem_init(DeviceClass::Sensor).unwrap(), 2);
        assert_eq!(brick.subsystem_init(DeviceClass::Tacho).unwrap(), 1);

        let sensors = brick.descriptors(DeviceClass::Sensor);
        assert_eq!(sensors[0].kind, DeviceType::Ev3Color);
        assert_eq!(sensors[0].port, Some(Port::In1));
        assert!(sensors[1].is_empty());
        assert_eq!(sensors[3].kind, DeviceType::NxtUltrasonic);
        assert_eq!(sensors[3].addr, 1);
        assert_eq!(
            brick.descriptors(DeviceClass::Tacho)[2].kind,
            DeviceType::Ev3LargeMotor
        );
        assert_eq!(
            brick.search_plugged_in(DeviceClass::Tacho, Port::OutA, 0, 0),
            Some(2)
        );
    }

    #[test]
    fn test_attributes_read_and_write() {
        let tmp = fixture();
        let mut brick = SysfsBrick::with_root(tmp.path());
        brick.subsystem_init(DeviceClass::Sensor).unwrap();
        brick.subsystem_init(DeviceClass::Tacho).unwrap();

        brick.set_sensor_mode(0, "COL-COLOR").unwrap();
        let mode = fs::read_to_string(tmp.path().join("lego-sensor/sensor0/mode")).unwrap();
        assert_eq!(mode, "COL-COLOR");
        assert_eq!(brick.sensor_value(0, 0).unwrap(), 42);
        assert_eq!(brick.sensor_poll_ms(0).unwrap(), 10);
        assert_eq!(brick.tacho_max_speed(2).unwrap(), 1050);

        brick.set_tacho_command(2, TachoCommand::Reset).unwrap();
        let cmd = fs::read_to_string(tmp.path().join("tacho-motor/motor2/command")).unwrap();
        assert_eq!(cmd, "reset");

        assert!(matches!(
            brick.set_sensor_mode(1, "TOUCH"),
            Err(TransportError::NoDevice(1))
        ));
    }

    #[test]
    fn test_amber_light_uses_both_channels() {
        let tmp = fixture();
        let mut brick = SysfsBrick::with_root(tmp.path());
        brick.set_light(LightSide::Right, LightColor::Amber).unwrap();
        let leds = tmp.path().join("leds");
        let red = fs::read_to_string(leds.join("led1:red:brick-status/brightness")).unwrap();
        let green = fs::read_to_string(leds.join("led1:green:brick-status/brightness")).unwrap();
        assert_eq!((red.as_str(), green.as_str()), ("255", "255"));
    }
}
