use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Env var accepting full `tracing` filter directives, e.g.
/// `info,bridge6_stack=debug`. Takes precedence over `--log-level`.
pub const LOG_ENV: &str = "BRIDGE6_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Install the global stderr subscriber.
///
/// The bridge runs one named thread per tunnel client plus the accept and
/// heartbeat threads, so thread names are included to tie each line to its
/// session. `BRIDGE6_LOG` lets the per-client read loops and the traffic
/// hex dump be tuned per target without raising the global level.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
