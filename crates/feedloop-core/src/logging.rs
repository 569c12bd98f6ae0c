//! Log setup for binaries built on feedloop.
//!
//! The runtime itself only emits `tracing` events. Nothing is recorded until a
//! subscriber is installed, which keeps a terminal UI free of stray output.

use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming the file [`init_tracing`] writes to.
pub const LOG_ENV: &str = "FEEDLOOP_LOG";

/// Install a file subscriber when `FEEDLOOP_LOG` names a log file.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Without
/// `FEEDLOOP_LOG` this does nothing, so screens stay clean.
pub fn init_tracing() {
    let Some(path) = std::env::var_os(LOG_ENV) else {
        return;
    };
    let file = match log_to_file(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("warning: cannot open log file {}: {err}", Path::new(&path).display());
            return;
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init();
}

/// Install a subscriber writing to stderr, for headless binaries.
pub fn init_stderr_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

/// Open (or create) a log file in append mode.
pub fn log_to_file(path: impl AsRef<Path>) -> Result<std::fs::File, std::io::Error> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn log_to_file_appends() {
        let path = std::env::temp_dir().join(format!("feedloop-log-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);

        writeln!(log_to_file(&path).unwrap(), "first").unwrap();
        writeln!(log_to_file(&path).unwrap(), "second").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
        std::fs::remove_file(&path).unwrap();
    }
}
