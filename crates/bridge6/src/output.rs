use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    flags: u16,
    ethertype: u16,
    frame_size: usize,
    frame_hex: &'a str,
    timestamp: String,
}

/// Print a DATA frame received back from the bridge.
pub fn print_reply(flags: u16, ethertype: u16, frame: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let hex = hex_string(frame);
            let out = ReplyOutput {
                flags,
                ethertype,
                frame_size: frame.len(),
                frame_hex: &hex,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => {
            println!(
                "flags={flags:#06x} ethertype={ethertype:#06x} size={} frame={}",
                frame.len(),
                hex_string(frame)
            );
        }
        OutputFormat::Raw => {
            print_raw(frame);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
