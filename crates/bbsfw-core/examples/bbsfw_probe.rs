//! BBS-FW Controller Probe
//!
//! Connects to a controller, prints what it reports about itself and its
//! configuration, then streams the event log until Ctrl-C.
//!
//! Usage:
//!   cargo run --example bbsfw_probe -- [OPTIONS] [PORT]
//!
//! Options:
//!   --port PORT       Serial port (default: first port found)
//!   --timeout SECS    Handshake timeout, power the controller on within it (default: 10)
//!   --save FILE       Save the configuration read from the controller as JSON
//!   --list            List serial ports and exit
//!
//! Set RUST_LOG=bbsfw_core=debug to see frame traffic.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use bbsfw_core::config::Configuration;
use bbsfw_core::protocol::{
    list_ports, Command, Connection, ConnectionConfig, ConnectionEvent, RequestResult,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut port_name: Option<String> = None;
    let mut timeout_secs = 10u64;
    let mut save_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                if i < args.len() {
                    port_name = Some(args[i].clone());
                }
            }
            "--timeout" | "-t" => {
                i += 1;
                if i < args.len() {
                    timeout_secs = args[i].parse().unwrap_or(10);
                }
            }
            "--save" | "-s" => {
                i += 1;
                if i < args.len() {
                    save_path = Some(args[i].clone());
                }
            }
            "--list" | "-l" => {
                for port in list_ports() {
                    println!("{}  {}", port.name, port.product.unwrap_or_default());
                }
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            arg if !arg.starts_with('-') => {
                port_name = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
            }
        }
        i += 1;
    }

    let port_name = match port_name {
        Some(name) => name,
        None => match list_ports().into_iter().next() {
            Some(port) => port.name,
            None => bail!("No serial ports found"),
        },
    };

    let connection = Connection::new(ConnectionConfig::default());
    let (tx, mut events) = mpsc::unbounded_channel();
    connection.set_observer(Arc::new(tx));

    println!("Connecting to {}, power on the controller now...", port_name);
    let connected = connection
        .connect(&port_name, Duration::from_secs(timeout_secs))
        .await
        .with_context(|| format!("Failed to open {}", port_name))?;
    if !connected {
        bail!("No response from controller within {}s", timeout_secs);
    }

    if let Some(info) = connection.device_info() {
        println!("Controller:     {}", info.controller);
        println!("Firmware:       {}", info.firmware_version);
        println!("Config version: {}", info.config_version);
    }

    let timeout = Duration::from_millis(Command::ReadConfig.timeout_ms());
    match connection.read_configuration(timeout).await? {
        RequestResult::Completed(config) => {
            print_config(&config);
            if let Some(path) = &save_path {
                config
                    .save_json(path)
                    .with_context(|| format!("Failed to save {}", path))?;
                println!("Saved configuration to {}", path);
            }
        }
        RequestResult::TimedOut => eprintln!("Reading configuration timed out"),
        RequestResult::Aborted => bail!("Connection lost"),
    }

    println!();
    println!("Event log (Ctrl-C to quit):");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ConnectionEvent::EventLog(entry)) => println!("{}", entry),
                Some(ConnectionEvent::Disconnected) | None => {
                    println!("Disconnected");
                    break;
                }
                Some(ConnectionEvent::Connected(_)) => {}
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    connection.close();
    Ok(())
}

fn print_config(config: &Configuration) {
    println!();
    println!("Max current:       {} A", config.max_current_amps);
    println!("Current ramp:      {} A/s", config.current_ramp_amps_s);
    println!("Max battery:       {:.2} V", config.max_battery_volts);
    println!("Low voltage cut:   {} V", config.low_cutoff_volts);
    println!("Max speed:         {} km/h", config.max_speed_kph);
    println!("Wheel size:        {:.1}\"", config.wheel_size_inch);
    println!("Throttle:          {}-{} mV", config.throttle_start_millivolts, config.throttle_end_millivolts);
    println!("Assist startup:    {}", config.assist_startup_level);

    for (name, levels) in [
        ("Standard", &config.standard_assist_levels),
        ("Sport", &config.sport_assist_levels),
    ] {
        println!("{} assist levels:", name);
        for (i, level) in levels.iter().enumerate() {
            println!(
                "  {}: flags=0x{:02x} current={}% throttle={}% cadence={}% speed={}%",
                i,
                level.flags.bits(),
                level.max_current_percent,
                level.max_throttle_percent,
                level.max_cadence_percent,
                level.max_speed_percent
            );
        }
    }

    for err in config.validate_all() {
        println!("warning: {}", err);
    }
}

fn print_help() {
    println!("BBS-FW Controller Probe");
    println!();
    println!("Usage: bbsfw_probe [OPTIONS] [PORT]");
    println!();
    println!("Options:");
    println!("  -p, --port PORT       Serial port (default: first port found)");
    println!("  -t, --timeout SECS    Handshake timeout in seconds (default: 10)");
    println!("  -s, --save FILE       Save configuration as JSON");
    println!("  -l, --list            List serial ports and exit");
    println!("  -h, --help            Show this help");
}
