//! Tail - print every packet a port agent sends.
//!
//! Connects to the data port, resyncs over the command port and prints each
//! packet until the connection fails or Ctrl-C is pressed.
//!
//! ```text
//! cargo run --example tail -- --host 10.0.0.5 --data-port 4001 --cmd-port 4002 -vv
//! cargo run --example tail -- --config agent.json --json
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use port_agent_client::logging::{init_logging, LogFormat};
use port_agent_client::{ClientEvent, Packet, PortAgentClient, PortAgentConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum CliLogFormat {
    #[default]
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

/// Print packets received from a port agent.
#[derive(Debug, Parser)]
#[command(name = "tail", about = "Print packets received from a port agent")]
struct Cli {
    /// Port agent host
    #[arg(long = "host", default_value = "localhost")]
    host: String,

    /// Data port
    #[arg(short = 'p', long = "data-port", default_value = "4001")]
    data_port: u16,

    /// Command port (resync and commands are skipped without it)
    #[arg(short = 'c', long = "cmd-port")]
    cmd_port: Option<u16>,

    /// Read the connection settings from a JSON file instead
    #[arg(long = "config", value_name = "FILE", conflicts_with_all = ["host", "data_port", "cmd_port"])]
    config: Option<PathBuf>,

    /// Expected heartbeat interval in seconds (0 disables the monitor)
    #[arg(long = "heartbeat")]
    heartbeat: Option<u64>,

    /// Send a break of this many seconds after connecting
    #[arg(long = "break", value_name = "SECS")]
    break_secs: Option<u64>,

    /// Print packets as JSON lines
    #[arg(long = "json")]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    log_format: CliLogFormat,
}

fn print_packet(packet: &Packet, json: bool) {
    if json {
        match serde_json::to_string(&packet.to_record()) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("failed to serialize packet: {}", e),
        }
        return;
    }

    let type_name = packet
        .packet_type()
        .map(|t| t.name())
        .unwrap_or("UNKNOWN");
    let flag = if packet.is_valid() { "" } else { " (bad checksum)" };
    println!(
        "{:.6} {} [{}]{}: {}",
        packet.timestamp().as_unix_secs(),
        type_name,
        packet.payload_len(),
        flag,
        String::from_utf8_lossy(packet.payload()).escape_debug()
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose.saturating_add(1), cli.log_format.into())?;

    let config = match &cli.config {
        Some(path) => PortAgentConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => PortAgentConfig::new(cli.host.clone(), cli.data_port, cli.cmd_port),
    };

    let mut builder = PortAgentClient::builder(config);
    if let Some(secs) = cli.heartbeat {
        builder = builder.heartbeat_interval(secs);
    }
    let (client, mut events) = builder.build_with_channel()?;

    client.init_comms().await?;
    if let Some(secs) = cli.break_secs {
        client.send_break(secs).await?;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::Packet(packet)) => print_packet(&packet, cli.json),
                Some(ClientEvent::Recoverable(e)) => eprintln!("skipped: {}", e),
                Some(ClientEvent::Fatal(e)) => {
                    eprintln!("connection lost: {}", e);
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.stop_comms().await;
    Ok(())
}
