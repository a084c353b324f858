use core::fmt;
use core::str::FromStr;
use serde::Serialize;

use crate::TransportError;

/// Capacity of each descriptor table (sensors, tacho motors).
pub const DESC_LIMIT: usize = 64;

/// Number of physical ports on the brick (4 inputs, 4 outputs).
pub const PORT_COUNT: usize = 8;

/// Extension port value for devices plugged directly into a brick port.
pub const EXT_PORT_NONE: u8 = 0;

/// Device classes exposed by the brick, each with its own descriptor table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Sensor,
    Tacho,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Sensor => f.write_str("sensor"),
            DeviceClass::Tacho => f.write_str("tacho motor"),
        }
    }
}

/// Type code of an attached device
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Empty descriptor slot
    #[default]
    None,
    Ev3Color,
    Ev3Touch,
    Ev3Ultrasonic,
    Ev3Gyro,
    Ev3Infrared,
    NxtTouch,
    NxtLight,
    NxtSound,
    NxtUltrasonic,
    Ev3LargeMotor,
    Ev3MediumMotor,
    NxtMotor,
    /// A device whose driver is not known to this crate
    Unknown,
}

impl DeviceType {
    const DRIVERS: [(DeviceType, &'static str); 12] = [
        (DeviceType::Ev3Color, "lego-ev3-color"),
        (DeviceType::Ev3Touch, "lego-ev3-touch"),
        (DeviceType::Ev3Ultrasonic, "lego-ev3-us"),
        (DeviceType::Ev3Gyro, "lego-ev3-gyro"),
        (DeviceType::Ev3Infrared, "lego-ev3-ir"),
        (DeviceType::NxtTouch, "lego-nxt-touch"),
        (DeviceType::NxtLight, "lego-nxt-light"),
        (DeviceType::NxtSound, "lego-nxt-sound"),
        (DeviceType::NxtUltrasonic, "lego-nxt-us"),
        (DeviceType::Ev3LargeMotor, "lego-ev3-l-motor"),
        (DeviceType::Ev3MediumMotor, "lego-ev3-m-motor"),
        (DeviceType::NxtMotor, "lego-nxt-motor"),
    ];

    /// Map an ev3dev driver name (`lego-ev3-color`, ...) to a type code.
    pub fn from_driver_name(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() {
            return DeviceType::None;
        }
        Self::DRIVERS
            .iter()
            .find(|(_, driver)| *driver == name)
            .map(|(kind, _)| *kind)
            .unwrap_or(DeviceType::Unknown)
    }

    pub fn driver_name(&self) -> Option<&'static str> {
        Self::DRIVERS
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, driver)| *driver)
    }

    /// Descriptor table this type lives in, if any.
    pub fn class(&self) -> Option<DeviceClass> {
        match self {
            DeviceType::None | DeviceType::Unknown => None,
            DeviceType::Ev3LargeMotor | DeviceType::Ev3MediumMotor | DeviceType::NxtMotor => {
                Some(DeviceClass::Tacho)
            }
            _ => Some(DeviceClass::Sensor),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceType::None => "no device",
            DeviceType::Ev3Color => "EV3 color sensor",
            DeviceType::Ev3Touch => "EV3 touch sensor",
            DeviceType::Ev3Ultrasonic => "EV3 ultrasonic sensor",
            DeviceType::Ev3Gyro => "EV3 gyro sensor",
            DeviceType::Ev3Infrared => "EV3 infrared sensor",
            DeviceType::NxtTouch => "NXT touch sensor",
            DeviceType::NxtLight => "NXT light sensor",
            DeviceType::NxtSound => "NXT sound sensor",
            DeviceType::NxtUltrasonic => "NXT ultrasonic sensor",
            DeviceType::Ev3LargeMotor => "EV3 large motor",
            DeviceType::Ev3MediumMotor => "EV3 medium motor",
            DeviceType::NxtMotor => "NXT motor",
            DeviceType::Unknown => "unknown device",
        };
        f.write_str(label)
    }
}

/// Physical port of the brick
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum Port {
    #[serde(rename = "in1")]
    In1,
    #[serde(rename = "in2")]
    In2,
    #[serde(rename = "in3")]
    In3,
    #[serde(rename = "in4")]
    In4,
    #[serde(rename = "outA")]
    OutA,
    #[serde(rename = "outB")]
    OutB,
    #[serde(rename = "outC")]
    OutC,
    #[serde(rename = "outD")]
    OutD,
}

impl Port {
    pub const ALL: [Port; PORT_COUNT] = [
        Port::In1,
        Port::In2,
        Port::In3,
        Port::In4,
        Port::OutA,
        Port::OutB,
        Port::OutC,
        Port::OutD,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Port::In1 => "in1",
            Port::In2 => "in2",
            Port::In3 => "in3",
            Port::In4 => "in4",
            Port::OutA => "outA",
            Port::OutB => "outB",
            Port::OutC => "outC",
            Port::OutD => "outD",
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, Port::OutA | Port::OutB | Port::OutC | Port::OutD)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Port {
    type Err = TransportError;

    /// Accepts `in1`..`in4` / `outA`..`outD`, case-insensitively, as well as
    /// the short forms `1`..`4` and `A`..`D`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let short = lower
            .strip_prefix("in")
            .or_else(|| lower.strip_prefix("out"))
            .unwrap_or(&lower);
        let port = match short {
            "1" => Port::In1,
            "2" => Port::In2,
            "3" => Port::In3,
            "4" => Port::In4,
            "a" => Port::OutA,
            "b" => Port::OutB,
            "c" => Port::OutC,
            "d" => Port::OutD,
            _ => return Err(TransportError::InvalidValue(format!("port '{s}'"))),
        };
        // Reject mixed forms such as "ina" or "out1"
        if (lower.starts_with("in") && port.is_output())
            || (lower.starts_with("out") && !port.is_output())
        {
            return Err(TransportError::InvalidValue(format!("port '{s}'")));
        }
        Ok(port)
    }
}

/// One entry of a descriptor table. Entries with `kind == DeviceType::None`
/// are free slots.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, Serialize)]
pub struct Descriptor {
    pub kind: DeviceType,
    pub port: Option<Port>,
    /// Extension port (sensor multiplexer channel), `EXT_PORT_NONE` if direct
    pub extport: u8,
    /// I2C bus address, 0 for analog/UART devices
    pub addr: u8,
}

impl Descriptor {
    pub const EMPTY: Descriptor = Descriptor {
        kind: DeviceType::None,
        port: None,
        extport: EXT_PORT_NONE,
        addr: 0,
    };

    pub fn new(kind: DeviceType, port: Port) -> Self {
        Self {
            kind,
            port: Some(port),
            extport: EXT_PORT_NONE,
            addr: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind == DeviceType::None
    }

    /// Human-readable port name, `None` for free slots.
    pub fn port_name(&self) -> Option<String> {
        self.port.map(|p| port_name(p, self.extport, self.addr))
    }
}

pub type DescriptorTable = [Descriptor; DESC_LIMIT];

/// Parse an ev3dev device address such as `ev3-ports:in1`,
/// `ev3-ports:in2:i2c1` or `ev3-ports:in3:mux2` into `(port, extport, addr)`.
pub fn parse_address(address: &str) -> Option<(Port, u8, u8)> {
    let address = address.trim();
    let rest = address.strip_prefix("ev3-ports:").unwrap_or(address);
    let mut parts = rest.split(':');
    let port: Port = parts.next()?.parse().ok()?;
    let mut extport = EXT_PORT_NONE;
    let mut addr = 0;
    for part in parts {
        if let Some(n) = part.strip_prefix("i2c") {
            addr = n.parse().ok()?;
        } else if let Some(n) = part.strip_prefix("mux") {
            extport = n.parse().ok()?;
        } else {
            return None;
        }
    }
    Some((port, extport, addr))
}

/// Format a port the way ev3dev names it, without the `ev3-ports:` prefix.
pub fn port_name(port: Port, extport: u8, addr: u8) -> String {
    let mut name = port.name().to_string();
    if extport != EXT_PORT_NONE {
        name.push_str(&format!(":mux{extport}"));
    }
    if addr != 0 {
        name.push_str(&format!(":i2c{addr}"));
    }
    name
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LightSide {
    Left,
    Right,
}

impl LightSide {
    pub(crate) fn led_index(&self) -> u8 {
        match self {
            LightSide::Left => 0,
            LightSide::Right => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LightColor {
    Off,
    Red,
    Green,
    Amber,
}

impl LightColor {
    /// Brightness of the (red, green) channels.
    pub(crate) fn channels(&self) -> (bool, bool) {
        match self {
            LightColor::Off => (false, false),
            LightColor::Red => (true, false),
            LightColor::Green => (false, true),
            LightColor::Amber => (true, true),
        }
    }
}

/// Commands accepted by a tacho motor's `command` attribute
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TachoCommand {
    RunForever,
    RunToAbsPos,
    RunToRelPos,
    RunTimed,
    RunDirect,
    Stop,
    Reset,
}

impl TachoCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TachoCommand::RunForever => "run-forever",
            TachoCommand::RunToAbsPos => "run-to-abs-pos",
            TachoCommand::RunToRelPos => "run-to-rel-pos",
            TachoCommand::RunTimed => "run-timed",
            TachoCommand::RunDirect => "run-direct",
            TachoCommand::Stop => "stop",
            TachoCommand::Reset => "reset",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Default)]
pub enum Polarity {
    /// Positive set points move the motor forward
    #[default]
    Normal,
    Inversed,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Normal => "normal",
            Polarity::Inversed => "inversed",
        }
    }
}
