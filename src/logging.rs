use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lofter_config::Logging;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber: console output on stderr and/or an
/// appended log file, filtered by the configured level. `RUST_LOG` wins over
/// both the profile and `--verbose`.
pub fn init(logging: &Logging, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = logging
        .console
        .then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));
    let file = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .or_raise(|| ErrorKind::LogFile(path.clone()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .or_raise(|| ErrorKind::Logging)
}
