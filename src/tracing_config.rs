use std::{env, path::Path};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

/// Environment variable overriding the configured console format.
pub const LOG_FORMAT_ENV: &str = "NETCORED_LOG_FORMAT";

const DAYS_TO_KEEP: usize = 7;

/// Initialize tracing for the daemon
///
/// `RUST_LOG` wins over the configured level. The console format comes from
/// `NETCORED_LOG_FORMAT` (`json` or `pretty`), else from the configuration.
/// When a log directory is configured, a compact copy of every event is also
/// written to daily-rotated files there; keep the returned guard alive for
/// as long as logs should be flushed.
///
/// # Errors
/// Returns error if the log directory cannot be used or a subscriber is
/// already installed
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    let format = match env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => LogFormat::Json,
        Ok("pretty") => LogFormat::Pretty,
        _ => config.format,
    };

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let (writer, guard) = file_writer(dir)?;
            let layer = fmt::layer()
                .compact()
                .with_target(true)
                .with_level(true)
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);

    match format {
        LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stdout),
                )
                .try_init()?;
        }
        LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_level(true)
                        .with_thread_ids(true)
                        .with_thread_names(true)
                        .with_writer(std::io::stdout),
                )
                .try_init()?;
        }
    }

    Ok(guard)
}

fn file_writer(
    dir: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), Box<dyn std::error::Error>>
{
    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .max_log_files(DAYS_TO_KEEP)
        .filename_prefix("netcored")
        .filename_suffix("log")
        .build(dir)?;
    Ok(tracing_appender::non_blocking(file_appender))
}
