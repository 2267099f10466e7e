use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Environment variable holding tracing filter directives. When set it
/// overrides `--log-level`, so per-module filters like
/// `emberframe_s101=trace` work without a dedicated flag.
pub const LOG_ENV_VAR: &str = "EMBERFRAME_LOG";

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

/// Initialize stderr logging for the CLI.
///
/// `EMBERFRAME_LOG` takes precedence; otherwise the whole crate tree logs at
/// `level`. Packet-level detail (frame boundaries, escapes) sits at `trace`
/// in the framing layer, so `--log-level trace` shows the full wire dialog.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
