use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use device_registry::{MotorPairPorts, RegistryError};
use ev3_transport as ev3;
use ev3_transport::{Brick, DeviceType, Port};

mod config;
mod diag;

use config::{DiagConfig, DEFAULT_CONFIG_PATH};
use diag::Session;

#[derive(Parser, Debug)]
#[command(
    name = "ev3-diag",
    version,
    about = "EV3 brick sensor and motor diagnostics",
    disable_help_subcommand = true
)]
struct Cli {
    /// Use an in-process mock brick instead of the ev3dev sysfs tree
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    mock: bool,

    /// Root of the sysfs device classes
    #[arg(long, global = true, default_value = ev3::DEFAULT_SYSFS_ROOT)]
    sysfs_root: PathBuf,

    /// Logging and pacing configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Color sensor test (reflected light, ambient light, color)
    Color,
    /// Touch sensor test
    Touch,
    /// Ultrasonic sensor test
    Ultrasound,
    /// Large motor pair test
    Tacho {
        #[arg(long, default_value = "outA", value_parser = parse_port)]
        left: Port,
        #[arg(long, default_value = "outB", value_parser = parse_port)]
        right: Port,
    },
    /// Bring the large motor pair to a stop
    Stop {
        #[arg(long, default_value = "outD", value_parser = parse_port)]
        left: Port,
        #[arg(long, default_value = "outA", value_parser = parse_port)]
        right: Port,
    },
    /// List the sensors and motors attached to the brick
    Ports {
        /// Print the descriptors as JSON on stdout
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DiagConfig::load(&cli.config)
        .with_context(|| format!("logging initialization using '{}'", cli.config.display()))?;
    setup_tracing(&config);

    info!("Hello IIUN!");
    let result = if cli.mock {
        run(demo_brick(), &cli.command, &config)
    } else {
        run(ev3::SysfsBrick::with_root(&cli.sysfs_root), &cli.command, &config)
    };
    match result {
        Ok(()) => {
            info!("Bye IIUN!");
            Ok(())
        }
        Err(e) => {
            let fatal = e
                .downcast_ref::<RegistryError>()
                .is_some_and(RegistryError::is_fatal);
            error!(fatal, "{e:#}");
            Err(e)
        }
    }
}

fn setup_tracing(config: &DiagConfig) {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match tracing_subscriber::EnvFilter::try_new(&config.filter) {
            Ok(filter) => filter,
            Err(e) => {
                eprintln!("invalid log filter '{}': {e}", config.filter);
                eprintln!("logging disabled");
                return;
            }
        },
    };
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .try_init();
}

fn run<B: Brick>(brick: B, command: &Commands, config: &DiagConfig) -> Result<()> {
    let mut session = Session::new(brick, config.pace());
    match command {
        Commands::Color => session.color(),
        Commands::Touch => session.touch(),
        Commands::Ultrasound => session.ultrasound(),
        Commands::Tacho { left, right } => session
            .tacho(MotorPairPorts {
                left: *left,
                right: *right,
            })
            .map(|_| ()),
        Commands::Stop { left, right } => session
            .stop(MotorPairPorts {
                left: *left,
                right: *right,
            })
            .map(|_| ()),
        Commands::Ports { json } => {
            let reports = session.ports()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            }
            Ok(())
        }
    }
}

fn parse_port(s: &str) -> Result<Port, String> {
    s.parse().map_err(|e: ev3::TransportError| e.to_string())
}

/// A brick with one of every device the programs look for.
fn demo_brick() -> ev3::MockBrick {
    ev3::MockBrick::new()
        .with_sensor(DeviceType::Ev3Color, Port::In1)
        .with_sensor(DeviceType::Ev3Touch, Port::In2)
        .with_sensor(DeviceType::Ev3Ultrasonic, Port::In3)
        .with_tacho(DeviceType::Ev3LargeMotor, Port::OutA, 1050)
        .with_tacho(DeviceType::Ev3LargeMotor, Port::OutB, 1020)
        .with_tacho(DeviceType::Ev3LargeMotor, Port::OutD, 1050)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_motor_port_defaults() {
        let cli = Cli::try_parse_from(["ev3-diag", "stop"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Stop {
                left: Port::OutD,
                right: Port::OutA
            }
        ));
        assert!(Cli::try_parse_from(["ev3-diag", "tacho", "--left", "in5"]).is_err());
    }

    #[test]
    fn test_every_program_passes_on_the_demo_brick() {
        let config = DiagConfig {
            pace_ms: 0,
            ..DiagConfig::default()
        };
        for args in [
            vec!["ev3-diag", "color"],
            vec!["ev3-diag", "touch"],
            vec!["ev3-diag", "ultrasound"],
            vec!["ev3-diag", "tacho"],
            vec!["ev3-diag", "stop"],
            vec!["ev3-diag", "ports"],
        ] {
            let cli = Cli::try_parse_from(&args).unwrap();
            assert!(run(demo_brick(), &cli.command, &config).is_ok(), "{args:?}");
        }
    }

    #[test]
    fn test_missing_brick_fails() {
        let empty = tempfile::tempdir().unwrap();
        let config = DiagConfig {
            pace_ms: 0,
            ..DiagConfig::default()
        };
        let err = run(
            ev3::SysfsBrick::with_root(empty.path()),
            &Commands::Color,
            &config,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::BrickNotFound)
        ));
    }
}
