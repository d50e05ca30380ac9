use crate::error::{ErrorKind, Result};
use crate::types::{Config, Provider};
use std::str::FromStr;

fn invalid(message: impl Into<String>) -> Result<()> {
    exn::bail!(ErrorKind::Invalid(message.into()))
}

pub(crate) fn validate(config: &Config) -> Result<()> {
    if config.files.is_empty() && config.dirs.is_empty() {
        return invalid("no files or directories to upload");
    }

    match &config.provider {
        Provider::S3(s3) => {
            let required = [
                ("provider.bucket", &s3.bucket),
                ("provider.region", &s3.region),
                ("provider.key_id", &s3.key_id),
                ("provider.key_secret", &s3.key_secret),
            ];
            for (name, value) in required {
                if value.trim().is_empty() {
                    return invalid(format!("{name} is required"));
                }
            }
        },
        Provider::Local(local) => {
            if local.root.as_os_str().is_empty() {
                return invalid("provider.root is required");
            }
        },
    }

    if config.options.heartbeat == 0 {
        return invalid("options.heartbeat must be at least 1 second");
    }

    if tracing::Level::from_str(&config.logging.level).is_err() {
        return invalid(format!("logging.level '{}' is not a log level", config.logging.level));
    }

    Ok(())
}
