use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod inject;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge: accept tunnel clients and answer echo traffic.
    Serve(ServeArgs),
    /// Connect as a tunnel client and send configuration or traffic.
    Inject(InjectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Inject(args) => inject::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Port the UDP echo responder answers on.
    #[arg(long, default_value = "12345")]
    pub udp_echo_port: u16,
    /// Emit a synthetic loopback echo request at this interval (e.g. 5s).
    #[arg(long, value_name = "INTERVAL")]
    pub heartbeat: Option<String>,
    /// Disable the hex dump of every packet crossing the network layer.
    #[arg(long)]
    pub quiet_traffic: bool,
}

#[derive(Args, Debug)]
pub struct InjectArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Announce an IPv6 address before sending traffic (repeatable).
    #[arg(long, value_name = "ADDR")]
    pub address: Vec<Ipv6Addr>,
    /// Reconfigure the bridge's read-buffer size for this client.
    #[arg(long)]
    pub mtu: Option<u32>,
    /// Tunnel flags for the data frame.
    #[arg(long, default_value = "0")]
    pub flags: u16,
    /// Ethertype for the data frame, decimal or 0x-prefixed hex.
    #[arg(long, default_value = "0x86dd", value_parser = parse_u16)]
    pub ethertype: u16,
    /// Hex-encoded frame payload to send as a data frame.
    #[arg(long, conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read the raw frame payload from a file.
    #[arg(long, conflicts_with = "hex")]
    pub file: Option<PathBuf>,
    /// Wait for one data frame in response and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

fn parse_u16(input: &str) -> Result<u16, String> {
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid 16-bit value: {input}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_u16_accepts_decimal_and_hex() {
        assert_eq!(parse_u16("12345").unwrap(), 12345);
        assert_eq!(parse_u16("0x86dd").unwrap(), 0x86DD);
        assert_eq!(parse_u16("0X86DD").unwrap(), 0x86DD);
        assert!(parse_u16("0xZZ").is_err());
        assert!(parse_u16("70000").is_err());
    }
}
