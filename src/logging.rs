use crate::env_file::LoadedEnvFile;
use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Optional log file written alongside stderr, e.g. `LOG_FILE=app.log`.
pub const LOG_FILE_VAR: &str = "LOG_FILE";

/// Initialise `env_logger`. Call after the env file is applied so `RUST_LOG` and
/// `LOG_FILE` from it are respected.
pub fn init(binary: &str, loaded_env: Option<&LoadedEnvFile>) {
    let default_filter = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(default_filter);
    builder.format_timestamp_secs();

    let log_file = std::env::var(LOG_FILE_VAR).ok().filter(|p| !p.trim().is_empty());
    let file_error = match log_file.as_deref().map(|p| open_log_file(Path::new(p.trim()))) {
        Some(Ok(file)) => {
            builder
                .target(env_logger::Target::Pipe(Box::new(Tee::new(io::stderr(), file))))
                .write_style(env_logger::WriteStyle::Never);
            None
        }
        Some(Err(e)) => Some(e),
        None => None,
    };
    builder.init();

    if let (Some(path), Some(e)) = (&log_file, file_error) {
        warn!("Cannot open log file {}: {}; logging to stderr only", path, e);
    }

    if let Some(info) = loaded_env {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "{} {} (git {}) starting",
        binary,
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writes every record to both sinks.
struct Tee<A, B> {
    primary: A,
    secondary: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    fn new(primary: A, secondary: B) -> Self {
        Tee { primary, secondary }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.primary.write_all(buf)?;
        self.secondary.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.secondary.flush()
    }
}
