use crate::{Registered, RegistryError, Registrar, Result, Wanted};
use ev3_transport::{Brick, DeviceClass, DeviceType, Polarity, Port, TachoCommand};
use tracing::{error, info};

pub const LEFT_MOTOR_SLOT: usize = 0;
pub const RIGHT_MOTOR_SLOT: usize = 1;

/// Ports the two large motors of a drive base are expected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorPairPorts {
    pub left: Port,
    pub right: Port,
}

impl Default for MotorPairPorts {
    fn default() -> Self {
        Self {
            left: Port::OutA,
            right: Port::OutB,
        }
    }
}

/// Two registered large motors and the speed both can sustain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorPair {
    pub left: usize,
    pub right: usize,
    pub left_max_speed: i32,
    pub right_max_speed: i32,
    /// `min(left_max_speed, right_max_speed)`
    pub max_speed: i32,
}

/// Neither motor is ever driven faster than the slower one can go.
pub fn effective_max_speed(left: i32, right: i32) -> i32 {
    left.min(right)
}

impl<B: Brick> Registrar<B> {
    /// Find both large motors, read their maximum speeds, then reset them,
    /// set normal polarity and a zero duty cycle.
    pub fn register_motor_pair(&mut self, ports: MotorPairPorts) -> Result<MotorPair> {
        if ports.left == ports.right || !ports.left.is_output() || !ports.right.is_output() {
            return Err(RegistryError::InvalidRequest(format!(
                "motor ports {}/{} must be two distinct output ports",
                ports.left, ports.right
            )));
        }
        let wanted = [
            Wanted::new(LEFT_MOTOR_SLOT, DeviceType::Ev3LargeMotor)
                .on_port(ports.left)
                .with_label("left large motor"),
            Wanted::new(RIGHT_MOTOR_SLOT, DeviceType::Ev3LargeMotor)
                .on_port(ports.right)
                .with_label("right large motor"),
        ];
        let found = self.register(DeviceClass::Tacho, &wanted)?;
        self.guard(|r| r.configure_pair(&found))
    }

    fn configure_pair(&mut self, found: &[Registered]) -> Result<MotorPair> {
        let sn_of = |slot: usize| found.iter().find(|r| r.slot == slot).map(|r| r.sn);
        let (Some(left), Some(right)) = (sn_of(LEFT_MOTOR_SLOT), sn_of(RIGHT_MOTOR_SLOT)) else {
            return Err(RegistryError::NotFound {
                missing: vec!["large motors".to_string()],
            });
        };

        let left_max_speed = self.motor_op(left, "read the maximum speed", |b| {
            b.tacho_max_speed(left)
        })?;
        let right_max_speed = self.motor_op(right, "read the maximum speed", |b| {
            b.tacho_max_speed(right)
        })?;

        for sn in [left, right] {
            self.motor_op(sn, "send 'reset'", |b| {
                b.set_tacho_command(sn, TachoCommand::Reset)
            })?;
        }
        let max_speed = effective_max_speed(left_max_speed, right_max_speed);

        // Positive set points mean forward
        for sn in [left, right] {
            self.motor_op(sn, "set polarity 'normal'", |b| {
                b.set_tacho_polarity(sn, Polarity::Normal)
            })?;
        }
        for sn in [left, right] {
            self.motor_op(sn, "set duty cycle 0", |b| b.set_tacho_duty_cycle_sp(sn, 0))?;
        }

        info!(left, right, max_speed, "large motors ready");
        Ok(MotorPair {
            left,
            right,
            left_max_speed,
            right_max_speed,
            max_speed,
        })
    }

    fn motor_op<T>(
        &mut self,
        sn: usize,
        what: &str,
        op: impl FnOnce(&mut B) -> ev3_transport::Result<T>,
    ) -> Result<T> {
        op(self.brick_mut()).map_err(|source| {
            error!(sn, error = %source, "cannot {what} on the large motor");
            RegistryError::NotResponding {
                kind: DeviceType::Ev3LargeMotor,
                sn,
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ev3_transport::{MockBrick, MockCall};

    fn two_motors(left_speed: i32, right_speed: i32) -> MockBrick {
        MockBrick::new()
            .with_tacho(DeviceType::Ev3LargeMotor, Port::OutB, right_speed)
            .with_tacho(DeviceType::Ev3LargeMotor, Port::OutA, left_speed)
    }

    #[test]
    fn test_effective_max_speed_is_the_minimum() {
        assert_eq!(effective_max_speed(800, 900), 800);
        assert_eq!(effective_max_speed(900, 800), 800);
        assert_eq!(effective_max_speed(1050, 1050), 1050);
        for (l, r) in [(1, 2), (560, 1050), (7, 3)] {
            let m = effective_max_speed(l, r);
            assert!(m <= l && m <= r);
        }
    }

    #[test]
    fn test_pair_registration() {
        let mut reg = Registrar::new(two_motors(800, 900));
        let pair = reg.register_motor_pair(MotorPairPorts::default()).unwrap();
        assert_eq!(pair.left, 1);
        assert_eq!(pair.right, 0);
        assert_eq!(pair.max_speed, 800);
        assert_eq!(reg.table().get(LEFT_MOTOR_SLOT), Some(1));
        assert_eq!(reg.table().get(RIGHT_MOTOR_SLOT), Some(0));

        let calls = reg.brick().calls();
        assert!(calls.contains(&MockCall::TachoCommand {
            sn: 1,
            command: TachoCommand::Reset
        }));
        assert!(calls.contains(&MockCall::TachoPolarity {
            sn: 0,
            polarity: Polarity::Normal
        }));
        assert!(calls.contains(&MockCall::TachoDutyCycle { sn: 1, duty: 0 }));
    }

    #[test]
    fn test_missing_right_motor() {
        let brick = MockBrick::new().with_tacho(DeviceType::Ev3LargeMotor, Port::OutA, 1050);
        let mut reg = Registrar::new(brick);
        let err = reg
            .register_motor_pair(MotorPairPorts::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::NotFound { ref missing } if missing == &["right large motor".to_string()]
        ));
        assert!(reg.presence().contains(LEFT_MOTOR_SLOT));
        assert!(!reg.presence().contains(RIGHT_MOTOR_SLOT));
        assert!(!reg
            .brick()
            .calls()
            .iter()
            .any(|c| matches!(c, MockCall::TachoCommand { .. })));
    }

    #[test]
    fn test_medium_motor_does_not_count() {
        let brick = MockBrick::new()
            .with_tacho(DeviceType::Ev3LargeMotor, Port::OutA, 1050)
            .with_tacho(DeviceType::Ev3MediumMotor, Port::OutB, 1560);
        let mut reg = Registrar::new(brick);
        assert!(matches!(
            reg.register_motor_pair(MotorPairPorts::default()),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_max_speed_read_failure_releases_brick() {
        // Right motor (outB) sits at sequence number 0
        let brick = two_motors(800, 900).failing(DeviceClass::Tacho, 0);
        let mut reg = Registrar::new(brick);
        let err = reg
            .register_motor_pair(MotorPairPorts::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::NotResponding {
                kind: DeviceType::Ev3LargeMotor,
                sn: 0,
                ..
            }
        ));
        // Failed on the read, before any command went out
        assert!(!reg
            .brick()
            .calls()
            .iter()
            .any(|c| matches!(c, MockCall::TachoCommand { .. })));
        assert!(!reg.is_acquired());
        assert_eq!(reg.brick().calls().last(), Some(&MockCall::Uninit));
    }

    #[test]
    fn test_custom_ports() {
        let brick = MockBrick::new()
            .with_tacho(DeviceType::Ev3LargeMotor, Port::OutA, 900)
            .with_tacho(DeviceType::Ev3LargeMotor, Port::OutD, 1000);
        let mut reg = Registrar::new(brick);
        let pair = reg
            .register_motor_pair(MotorPairPorts {
                left: Port::OutD,
                right: Port::OutA,
            })
            .unwrap();
        assert_eq!((pair.left, pair.right), (1, 0));
        assert_eq!(pair.max_speed, 900);
    }

    #[test]
    fn test_same_port_twice_is_invalid() {
        let mut reg = Registrar::new(two_motors(800, 900));
        let ports = MotorPairPorts {
            left: Port::OutA,
            right: Port::OutA,
        };
        assert!(matches!(
            reg.register_motor_pair(ports),
            Err(RegistryError::InvalidRequest(_))
        ));
        assert!(reg.brick().calls().is_empty());
    }
}
