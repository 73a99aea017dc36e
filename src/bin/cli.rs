//! railcan CLI Client
//!
//! Command-line interface for driving a track-format processor through
//! a CAN-over-TCP gateway.

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use railcan::exchange::TracingMonitor;
use railcan::protocol::decode_text;
use railcan::transport::TcpBus;
use railcan::{Config, Direction, Exchanger, Result, TrackController};
use tracing_subscriber::{fmt, EnvFilter};

/// railcan CLI
#[derive(Parser, Debug)]
#[command(name = "railcan-cli")]
#[command(about = "Control model-railway hardware over a CAN gateway")]
#[command(version)]
struct Args {
    /// Gateway address (overrides the config file)
    #[arg(short, long)]
    gateway: Option<String>,

    /// Controller hash in hex (overrides the config file)
    #[arg(long, value_parser = parse_hex_u16)]
    hash: Option<u16>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<String>,

    /// Skip the bring-up sequence
    #[arg(long)]
    no_init: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Switch track power
    Power {
        state: OnOff,
    },

    /// Get or set a locomotive's speed
    Speed {
        #[arg(value_parser = parse_number_u16)]
        address: u16,
        /// New speed (0..=1023); omitted to query
        speed: Option<u16>,
    },

    /// Raise a locomotive's speed by one step
    Accelerate {
        #[arg(value_parser = parse_number_u16)]
        address: u16,
    },

    /// Lower a locomotive's speed by one step
    Decelerate {
        #[arg(value_parser = parse_number_u16)]
        address: u16,
    },

    /// Get or set a locomotive's direction
    Direction {
        #[arg(value_parser = parse_number_u16)]
        address: u16,
        /// New direction; omitted to query
        direction: Option<DirectionArg>,
    },

    /// Get, set or toggle a locomotive function
    Function {
        #[arg(value_parser = parse_number_u16)]
        address: u16,
        function: u8,
        /// New state; omitted to query
        state: Option<FunctionArg>,
    },

    /// Switch a magnetic accessory
    Accessory {
        #[arg(value_parser = parse_number_u16)]
        address: u16,
        position: u8,
        /// Power (0..=31)
        #[arg(long, default_value = "1")]
        power: u8,
        /// Release after this many milliseconds (0 keeps it active)
        #[arg(long, default_value = "0")]
        pulse: u16,
    },

    /// Get or set a turnout
    Turnout {
        #[arg(value_parser = parse_number_u16)]
        address: u16,
        /// New setting; omitted to query
        setting: Option<TurnoutArg>,
    },

    /// Read a configuration value
    ReadConfig {
        #[arg(value_parser = parse_number_u16)]
        address: u16,
        #[arg(value_parser = parse_number_u16)]
        number: u16,
    },

    /// Write a configuration value
    WriteConfig {
        #[arg(value_parser = parse_number_u16)]
        address: u16,
        #[arg(value_parser = parse_number_u16)]
        number: u16,
        value: u8,
    },

    /// Query the firmware version
    Version,

    /// Read a status channel
    Status {
        /// Device uid (0 for the only device)
        #[arg(value_parser = parse_number_u32)]
        uid: u32,
        channel: u8,
    },

    /// Exchange a raw text-encoded message, e.g. "0000   04 4 00 00 40 01"
    Send {
        message: String,
    },

    /// Print bus traffic
    Monitor {
        /// Stop after this many seconds
        #[arg(long, default_value = "10")]
        seconds: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OnOff {
    On,
    Off,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DirectionArg {
    Fwd,
    Rev,
    Toggle,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FunctionArg {
    On,
    Off,
    Toggle,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TurnoutArg {
    Straight,
    Round,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,railcan=info"));

    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(gateway) = args.gateway {
        config.gateway_addr = gateway;
    }
    if let Some(hash) = args.hash {
        config.hash = hash;
    }
    config.validate()?;

    let bus = TcpBus::connect(
        &config.gateway_addr,
        Duration::from_millis(config.connect_timeout_ms),
    )?;
    let exchanger = Exchanger::new(bus, &config).with_monitor(TracingMonitor);
    let mut controller = TrackController::from_exchanger(exchanger, config);

    if !args.no_init {
        controller.init()?;
    }

    match args.command {
        Commands::Power { state } => {
            controller.set_power(matches!(state, OnOff::On))?;
            println!("power {}", if matches!(state, OnOff::On) { "on" } else { "off" });
        }
        Commands::Speed { address, speed } => {
            if let Some(speed) = speed {
                controller.set_loco_speed(address, speed)?;
            }
            println!("{}", controller.get_loco_speed(address)?);
        }
        Commands::Accelerate { address } => {
            println!("{}", controller.accelerate_loco(address)?);
        }
        Commands::Decelerate { address } => {
            println!("{}", controller.decelerate_loco(address)?);
        }
        Commands::Direction { address, direction } => {
            match direction {
                Some(DirectionArg::Fwd) => controller.set_loco_direction(address, Direction::Forward)?,
                Some(DirectionArg::Rev) => controller.set_loco_direction(address, Direction::Reverse)?,
                Some(DirectionArg::Toggle) => controller.toggle_loco_direction(address)?,
                None => {}
            }
            println!("{:?}", controller.get_loco_direction(address)?);
        }
        Commands::Function {
            address,
            function,
            state,
        } => {
            let power = match state {
                Some(FunctionArg::On) => {
                    controller.set_loco_function(address, function, 1)?;
                    1
                }
                Some(FunctionArg::Off) => {
                    controller.set_loco_function(address, function, 0)?;
                    0
                }
                Some(FunctionArg::Toggle) => controller.toggle_loco_function(address, function)?,
                None => controller.get_loco_function(address, function)?,
            };
            println!("{}", power);
        }
        Commands::Accessory {
            address,
            position,
            power,
            pulse,
        } => {
            controller.set_accessory(address, position, power, pulse)?;
            let state = controller.get_accessory(address)?;
            println!("position {} power {}", state.position, state.power);
        }
        Commands::Turnout { address, setting } => {
            if let Some(setting) = setting {
                controller.set_turnout(address, matches!(setting, TurnoutArg::Straight))?;
            }
            let straight = controller.get_turnout(address)?;
            println!("{}", if straight { "straight" } else { "round" });
        }
        Commands::ReadConfig { address, number } => {
            println!("{}", controller.read_config(address, number)?);
        }
        Commands::WriteConfig {
            address,
            number,
            value,
        } => {
            controller.write_config(address, number, value)?;
            println!("ok");
        }
        Commands::Version => {
            let version = controller.get_version()?;
            println!("{}.{}", version.major, version.minor);
        }
        Commands::Status { uid, channel } => {
            println!("{}", controller.get_system_status(uid, channel)?);
        }
        Commands::Send { message } => {
            let request = decode_text(&message)?;
            let reply = controller.exchange_raw(&request)?;
            println!("{}", reply);
        }
        Commands::Monitor { seconds } => {
            let until = Instant::now() + Duration::from_secs(seconds);
            let exchanger = controller.exchanger();
            while Instant::now() < until {
                match exchanger.receive()? {
                    Some(message) => println!("{}", message),
                    None => std::thread::sleep(Duration::from_millis(1)),
                }
            }
        }
    }

    Ok(())
}

/// Decimal, or hex with a 0x prefix
fn parse_number_u16(s: &str) -> std::result::Result<u16, String> {
    match s.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => s.parse().map_err(|e: std::num::ParseIntError| e.to_string()),
    }
}

fn parse_number_u32(s: &str) -> std::result::Result<u32, String> {
    match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => s.parse().map_err(|e: std::num::ParseIntError| e.to_string()),
    }
}

fn parse_hex_u16(s: &str) -> std::result::Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}
