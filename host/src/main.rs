//! esp8266-at-probe: exercise an ESP8266 over a USB-serial bridge.
//!
//! ```text
//! esp8266-at-probe --port /dev/ttyUSB0 probe
//! esp8266-at-probe --config link.json join
//! esp8266-at-probe --config link.json send "ch0=1.234"
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use esp8266_at::protocol::cmd;
use esp8266_at::ConnectionKind;
use esp8266_at_host::{HostConfig, HostError, HostResult, Link, RemoteEndpoint, RxMode, WifiCredentials};
use log::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "esp8266-at-probe", version, about = "Drive an ESP8266 AT module from the host")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overrides the configuration
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate the port is opened at, overrides the configuration
    #[arg(short, long)]
    baud: Option<u32>,

    /// Read the port directly instead of through the reader thread
    #[arg(long, default_value_t = false)]
    polled: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the module's baud rate and print its firmware version
    Probe,

    /// Join an access point and print the station address
    Join {
        #[arg(long)]
        ssid: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },

    /// Open a connection and send one line
    Send {
        /// Remote host, overrides the configuration
        #[arg(long)]
        host: Option<String>,
        /// Remote port, overrides the configuration
        #[arg(long)]
        remote_port: Option<u16>,
        /// Use UDP instead of TCP
        #[arg(long, default_value_t = false)]
        udp: bool,
        /// Skip the access point join
        #[arg(long, default_value_t = false)]
        no_join: bool,
        message: String,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    info!("esp8266-at {}", esp8266_at::VERSION);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> HostResult<()> {
    let mut config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(baud) = args.baud {
        config.baud = baud;
        config.driver.initial_baud = baud;
    }
    if args.polled {
        config.rx_mode = RxMode::Polled;
    }

    let mut link = Link::open(&config)?;

    match args.command {
        Command::Probe => probe(&mut link),
        Command::Join { ssid, password } => {
            let wifi = credentials(&config, ssid, password)?;
            join(&mut link, &wifi)
        }
        Command::Send { host, remote_port, udp, no_join, message } => {
            let remote = endpoint(&config, host, remote_port, udp)?;
            if !no_join {
                let wifi = credentials(&config, None, None)?;
                join(&mut link, &wifi)?;
            }
            send(&mut link, &remote, &message)
        }
    }
}

fn probe(link: &mut Link) -> HostResult<()> {
    let esp = &mut link.driver;
    let rate = esp.discover_baud_rate().ok_or(HostError::NoAnswer)?;
    println!("baud rate: {}", rate);

    let timeout = esp.config().ok_timeout_ms;
    let reply = esp.query(cmd::VERSION, timeout)?;
    for line in reply.as_str().lines().map(str::trim).filter(|l| !l.is_empty() && *l != "OK") {
        println!("{}", line);
    }
    Ok(())
}

fn join(link: &mut Link, wifi: &WifiCredentials) -> HostResult<()> {
    link.driver.connect_station(&wifi.ssid, &wifi.password)?;
    match link.driver.local_ip() {
        Ok(ip) => println!("station address: {}", ip),
        Err(e) => warn!("joined but address query failed: {}", e),
    }
    Ok(())
}

fn send(link: &mut Link, remote: &RemoteEndpoint, message: &str) -> HostResult<()> {
    if !link.is_receiving() {
        warn!("reader thread has stopped, replies will be missed");
    }
    let esp = &mut link.driver;
    esp.start_connection(remote.kind, &remote.host, remote.port, remote.local_port)?;

    let mut line = message.to_string();
    if !line.ends_with('\n') {
        line.push('\n');
    }
    let result = esp.send_payload(line.as_bytes());

    if let Err(e) = esp.close_connection() {
        warn!("close failed: {}", e);
    }
    result?;
    println!("sent {} bytes to {}:{}", line.len(), remote.host, remote.port);
    Ok(())
}

fn credentials(
    config: &HostConfig,
    ssid: Option<String>,
    password: Option<String>,
) -> HostResult<WifiCredentials> {
    match (ssid, password, &config.wifi) {
        (Some(ssid), Some(password), _) => Ok(WifiCredentials { ssid, password }),
        (Some(ssid), None, _) => Ok(WifiCredentials { ssid, password: String::new() }),
        (None, _, Some(wifi)) => Ok(wifi.clone()),
        (None, _, None) => Err(HostError::MissingCredentials),
    }
}

fn endpoint(
    config: &HostConfig,
    host: Option<String>,
    port: Option<u16>,
    udp: bool,
) -> HostResult<RemoteEndpoint> {
    let mut remote = match (host, port, &config.remote) {
        (Some(host), Some(port), _) => RemoteEndpoint {
            kind: ConnectionKind::Tcp,
            host,
            port,
            local_port: None,
        },
        (host, port, Some(base)) => RemoteEndpoint {
            host: host.unwrap_or_else(|| base.host.clone()),
            port: port.unwrap_or(base.port),
            ..base.clone()
        },
        _ => return Err(HostError::MissingRemote),
    };
    if udp {
        remote.kind = ConnectionKind::Udp;
    }
    Ok(remote)
}
