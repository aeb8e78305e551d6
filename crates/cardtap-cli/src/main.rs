use anyhow::{Context, Result};
use cardtap_core::capture::{self, list_ports, ReplaySource, ResetLine, SerialLine};
use cardtap_core::config::{CaptureConfig, LineHandle, SessionConfig};
use cardtap_core::packet::Packet;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cardtap")]
#[command(about = "Passive ISO/IEC 7816-3 smart-card line sniffer")]
#[command(version)]
struct Args {
    /// Print packets as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports
    List,

    /// Decode a live line from a serial port
    Capture {
        /// Serial port wired to the card's I/O contact
        port: Option<String>,

        /// Baud rate at 372 clock ticks per ETU (card clock / 372)
        #[arg(short, long)]
        baud: Option<u32>,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Modem status line wired to RST (cd, dsr, cts, ri)
        #[arg(long)]
        reset_line: Option<ResetLine>,
    },

    /// Decode a raw line dump
    Replay {
        /// File holding raw bytes as read from the line
        file: PathBuf,

        /// Baud rate at 372 clock ticks per ETU
        #[arg(short, long, default_value_t = cardtap_core::config::DEFAULT_BASE_BAUD_RATE)]
        baud: u32,
    },
}

fn print_packet(packet: &Packet, json: bool) {
    if json {
        match serde_json::to_string(packet) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to encode packet: {}", e),
        }
        return;
    }
    println!(
        "{}  {:<16} {}",
        packet.timestamp.format("%H:%M:%S%.6f"),
        packet.classification.to_string(),
        packet.hex()
    );
}

fn capture_config(
    port: Option<String>,
    baud: Option<u32>,
    config: Option<PathBuf>,
    reset_line: Option<ResetLine>,
) -> Result<CaptureConfig> {
    let mut capture = match config {
        Some(path) => CaptureConfig::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => CaptureConfig::default(),
    };
    if let Some(port) = port {
        capture.session.line = LineHandle::new(port);
    }
    if let Some(baud) = baud {
        capture.session.base_baud_rate = baud;
    }
    if reset_line.is_some() {
        capture.reset_line = reset_line;
    }
    if capture.session.line.as_str().is_empty() {
        anyhow::bail!("No serial port given (pass a port or set session.line in the config)");
    }
    capture.validate()?;
    Ok(capture)
}

fn main() -> Result<()> {
    // RUST_LOG=debug shows speed details, RUST_LOG=trace every packet
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let json = args.json;

    match args.command {
        Command::List => {
            let ports = list_ports();
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                match (port.vid, port.pid) {
                    (Some(vid), Some(pid)) => println!(
                        "{}  {:04x}:{:04x}  {}",
                        port.name,
                        vid,
                        pid,
                        port.product.unwrap_or_default()
                    ),
                    _ => println!("{}", port.name),
                }
            }
        }
        Command::Capture {
            port,
            baud,
            config,
            reset_line,
        } => {
            let config = capture_config(port, baud, config, reset_line)?;
            let mut line = SerialLine::open(&config)
                .with_context(|| format!("Failed to open {}", config.session.line))?;

            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                info!("Stopping capture...");
                r.store(false, Ordering::SeqCst);
            })?;

            info!("Capturing on {} (Ctrl-C to stop)", config.session.line);
            capture::run(
                &mut line,
                config.session,
                |packet| print_packet(packet, json),
                &running,
            )?;
        }
        Command::Replay { file, baud } => {
            let reader = File::open(&file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let mut source = ReplaySource::new(BufReader::new(reader));
            let session = SessionConfig::new(LineHandle::new(file.display().to_string()), baud);
            let running = AtomicBool::new(true);
            capture::run(
                &mut source,
                session,
                |packet| print_packet(packet, json),
                &running,
            )?;
            info!("Baud rate changes: {:?}", source.baud_rates());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_config_from_args() {
        let config = capture_config(
            Some("/dev/ttyUSB0".to_string()),
            Some(10752),
            None,
            Some(ResetLine::Dsr),
        )
        .expect("valid arguments");
        assert_eq!(config.session.line.as_str(), "/dev/ttyUSB0");
        assert_eq!(config.session.base_baud_rate, 10752);
        assert_eq!(config.reset_line, Some(ResetLine::Dsr));
    }

    #[test]
    fn test_capture_config_requires_port() {
        assert!(capture_config(None, None, None, None).is_err());
    }

    #[test]
    fn test_capture_config_rejects_zero_baud() {
        assert!(capture_config(Some("/dev/ttyS0".to_string()), Some(0), None, None).is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["cardtap", "--json", "replay", "dump.bin", "-b", "9600"])
            .expect("valid command line");
        assert!(args.json);
        assert!(matches!(args.command, Command::Replay { baud: 9600, .. }));
    }
}
