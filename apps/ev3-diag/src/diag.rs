//! The diagnostic runs behind each subcommand.
//!
//! Every run registers what it needs, lights the brick red while its test
//! phases run and green once done, then releases the brick.

use anyhow::Result;
use device_registry::{MotorPair, MotorPairPorts, Registered, Registrar, Wanted};
use ev3_transport::{Brick, DeviceClass, DeviceType, LightColor, LightSide, Port};
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

pub const COLOR_MODE: &str = "COL-COLOR";
pub const REFLECT_MODE: &str = "COL-REFLECT";
pub const TOUCH_MODE: &str = "TOUCH";
pub const ULTRASONIC_MODE: &str = "US-LISTEN";
pub const TOUCH_POLL_MS: u32 = 250;

/// One row of the `ports` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorReport {
    pub class: DeviceClass,
    pub index: usize,
    pub kind: DeviceType,
    pub driver: Option<&'static str>,
    pub port: Option<Port>,
    pub port_name: Option<String>,
    pub extport: u8,
    pub addr: u8,
    pub plugged_in: bool,
}

pub struct Session<B: Brick> {
    registrar: Registrar<B>,
    pace: Duration,
    phases: usize,
}

impl<B: Brick> Session<B> {
    pub fn new(brick: B, pace: Duration) -> Self {
        Self {
            registrar: Registrar::new(brick),
            pace,
            phases: 0,
        }
    }

    pub fn registrar(&self) -> &Registrar<B> {
        &self.registrar
    }

    pub fn color(&mut self) -> Result<()> {
        let sensor = self.register_sensor(DeviceType::Ev3Color, COLOR_MODE, "color sensor")?;
        self.lights(LightColor::Red);

        self.phase("reflected light test");
        self.light(LightSide::Left, LightColor::Amber);
        self.phase("ambient light test");
        self.light(LightSide::Right, LightColor::Amber);
        self.phase("color test");

        self.lights(LightColor::Green);
        self.restore_mode(sensor, REFLECT_MODE);
        self.finish();
        Ok(())
    }

    pub fn touch(&mut self) -> Result<()> {
        let sensor = self.register_sensor(DeviceType::Ev3Touch, TOUCH_MODE, "touch sensor")?;
        self.lights(LightColor::Red);

        self.log_poll_interval(sensor, "before");
        if let Err(e) = self
            .registrar
            .brick_mut()
            .set_sensor_poll_ms(sensor.sn, TOUCH_POLL_MS)
        {
            warn!(error = %e, "cannot set the touch sensor poll interval");
        }
        self.log_poll_interval(sensor, "after");

        self.phase("touch test");
        self.lights(LightColor::Green);
        self.finish();
        Ok(())
    }

    pub fn ultrasound(&mut self) -> Result<()> {
        let sensor = self.register_sensor(
            DeviceType::Ev3Ultrasonic,
            ULTRASONIC_MODE,
            "ultrasonic sensor",
        )?;
        self.lights(LightColor::Red);

        self.phase("continuous measurement test");
        self.phase("single measurement test");

        self.lights(LightColor::Green);
        self.restore_mode(sensor, ULTRASONIC_MODE);
        self.finish();
        Ok(())
    }

    pub fn tacho(&mut self, ports: MotorPairPorts) -> Result<MotorPair> {
        let pair = self.registrar.register_motor_pair(ports)?;
        info!("maximum speed: {}", pair.max_speed);
        self.lights(LightColor::Red);

        self.phase("absolute position test");
        self.phase("relative position test");
        self.phase("timed test");
        self.light(LightSide::Left, LightColor::Amber);
        self.phase("ramp test");
        self.light(LightSide::Right, LightColor::Amber);
        self.phase("direct test");

        self.lights(LightColor::Green);
        self.finish();
        Ok(pair)
    }

    pub fn stop(&mut self, ports: MotorPairPorts) -> Result<MotorPair> {
        let pair = self.registrar.register_motor_pair(ports)?;
        info!(left = pair.left, right = pair.right, "stopping the motors");
        self.finish();
        Ok(pair)
    }

    /// Dump every descriptor of both tables.
    pub fn ports(&mut self) -> Result<Vec<DescriptorReport>> {
        self.registrar.init_brick()?;
        self.registrar.init_subsystem(DeviceClass::Sensor)?;
        self.registrar.init_subsystem(DeviceClass::Tacho)?;

        let mut reports = Vec::new();
        for class in [DeviceClass::Sensor, DeviceClass::Tacho] {
            let brick = self.registrar.brick();
            for (index, desc) in brick.descriptors(class).iter().enumerate() {
                let Some(port) = desc.port else {
                    continue;
                };
                if desc.is_empty() {
                    continue;
                }
                let plugged_in = brick
                    .search_plugged_in(class, port, desc.extport, 0)
                    .is_some();
                let port_name = desc.port_name();
                info!(
                    class = %class,
                    index,
                    port = port_name.as_deref().unwrap_or("?"),
                    extport = desc.extport,
                    addr = desc.addr,
                    "{}",
                    desc.kind
                );
                if class == DeviceClass::Tacho && !plugged_in {
                    warn!(index, "EV3 tacho motor not plugged in");
                }
                reports.push(DescriptorReport {
                    class,
                    index,
                    kind: desc.kind,
                    driver: desc.kind.driver_name(),
                    port: desc.port,
                    port_name,
                    extport: desc.extport,
                    addr: desc.addr,
                    plugged_in,
                });
            }
        }

        self.lights(LightColor::Red);
        self.lights(LightColor::Green);
        self.finish();
        Ok(reports)
    }

    fn register_sensor(
        &mut self,
        kind: DeviceType,
        mode: &str,
        label: &str,
    ) -> Result<Registered> {
        let wanted = Wanted::new(0, kind).with_mode(mode).with_label(label);
        Ok(self.registrar.register_sensor(wanted)?)
    }

    fn restore_mode(&mut self, sensor: Registered, mode: &str) {
        if let Err(e) = self.registrar.brick_mut().set_sensor_mode(sensor.sn, mode) {
            error!(error = %e, "cannot switch the sensor to mode '{mode}'");
        }
    }

    fn log_poll_interval(&self, sensor: Registered, when: &str) {
        match self.registrar.brick().sensor_poll_ms(sensor.sn) {
            Ok(ms) => info!("poll interval {when}: {ms} ms"),
            Err(e) => warn!(error = %e, "cannot read the poll interval"),
        }
    }

    fn lights(&mut self, color: LightColor) {
        self.light(LightSide::Left, color);
        self.light(LightSide::Right, color);
    }

    fn light(&mut self, side: LightSide, color: LightColor) {
        if let Err(e) = self.registrar.brick_mut().set_light(side, color) {
            warn!(?side, ?color, error = %e, "cannot set the status light");
        }
    }

    /// Announce a test phase, pausing after the previous one.
    fn phase(&mut self, title: &str) {
        if self.phases > 0 && !self.pace.is_zero() {
            thread::sleep(self.pace);
        }
        self.phases += 1;
        info!("=== {title} ===");
    }

    fn finish(&mut self) {
        self.registrar.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ev3_transport::{MockBrick, MockCall};
    use std::time::Instant;

    fn session(brick: MockBrick) -> Session<MockBrick> {
        Session::new(brick, Duration::ZERO)
    }

    #[test]
    fn test_color_run() {
        let brick = MockBrick::new().with_sensor(DeviceType::Ev3Color, Port::In1);
        let mut s = session(brick);
        s.color().unwrap();

        let brick = s.registrar().brick();
        assert_eq!(brick.sensor_mode(0), Some(REFLECT_MODE));
        assert_eq!(brick.light(LightSide::Left), Some(LightColor::Green));
        assert_eq!(brick.light(LightSide::Right), Some(LightColor::Green));
        assert_eq!(brick.calls().last(), Some(&MockCall::Uninit));
    }

    #[test]
    fn test_color_run_without_sensor_fails() {
        let brick = MockBrick::new().with_sensor(DeviceType::Ev3Touch, Port::In1);
        let mut s = session(brick);
        assert!(s.color().is_err());
        // Lights never touched, brick released
        let brick = s.registrar().brick();
        assert_eq!(brick.light(LightSide::Left), None);
        assert!(!brick.is_initialized());
    }

    #[test]
    fn test_touch_run_sets_poll_interval() {
        let brick = MockBrick::new().with_sensor(DeviceType::Ev3Touch, Port::In2);
        let mut s = session(brick);
        s.touch().unwrap();
        let brick = s.registrar().brick();
        assert_eq!(brick.sensor_mode(0), Some(TOUCH_MODE));
        assert!(brick.calls().contains(&MockCall::SensorPollMs {
            sn: 0,
            ms: TOUCH_POLL_MS
        }));
    }

    #[test]
    fn test_single_phase_run_does_not_pause() {
        let brick = MockBrick::new().with_sensor(DeviceType::Ev3Touch, Port::In2);
        let mut s = Session::new(brick, Duration::from_secs(5));
        let started = Instant::now();
        s.touch().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(s.phases, 1);
    }

    #[test]
    fn test_ultrasound_run() {
        let brick = MockBrick::new().with_sensor(DeviceType::Ev3Ultrasonic, Port::In4);
        let mut s = session(brick);
        s.ultrasound().unwrap();
        assert_eq!(s.registrar().brick().sensor_mode(0), Some(ULTRASONIC_MODE));
    }

    #[test]
    fn test_tacho_run_reports_max_speed() {
        let brick = MockBrick::new()
            .with_tacho(DeviceType::Ev3LargeMotor, Port::OutA, 800)
            .with_tacho(DeviceType::Ev3LargeMotor, Port::OutB, 900);
        let mut s = session(brick);
        let pair = s.tacho(MotorPairPorts::default()).unwrap();
        assert_eq!(pair.max_speed, 800);
        assert!(!s.registrar().is_acquired());
    }

    #[test]
    fn test_ports_listing() {
        let brick = MockBrick::new()
            .with_sensor(DeviceType::Ev3Color, Port::In1)
            .with_tacho(DeviceType::Ev3LargeMotor, Port::OutA, 1050)
            .with_tacho(DeviceType::Ev3MediumMotor, Port::OutC, 1560)
            .unplugged(DeviceClass::Tacho, 1);
        let mut s = session(brick);
        let reports = s.ports().unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].class, DeviceClass::Sensor);
        assert_eq!(reports[0].port_name.as_deref(), Some("in1"));
        assert_eq!(reports[0].driver, Some("lego-ev3-color"));
        assert!(reports[1].plugged_in);
        assert!(!reports[2].plugged_in);

        let json = serde_json::to_value(&reports[2]).unwrap();
        assert_eq!(json["kind"], "ev3_medium_motor");
        assert_eq!(json["port"], "outC");
    }

    #[test]
    fn test_ports_without_brick() {
        let mut s = session(MockBrick::new().absent());
        assert!(s.ports().is_err());
        assert_eq!(s.registrar().brick().calls(), &[MockCall::Init]);
    }
}
