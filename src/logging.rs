use std::io::{self, IsTerminal};
use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    fmt::{self, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::cli::ColorChoice;

/// Directory, relative to the workspace, that holds log files.
pub const LOG_DIR: &str = ".retrace/logs";

/// How many daily log files are kept per command.
const MAX_LOG_FILES: usize = 7;

/// Keeps the background log file writer alive. Dropping it flushes pending
/// lines.
pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

fn console_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "info,libretrace=debug",
        2 => "info,libretrace=trace",
        _ => "trace",
    }
}

pub fn init_logging(
    verbosity: u8,
    color: ColorChoice,
    workspace_dir: Option<&Path>,
    file_log_level: Option<LevelFilter>,
    command_name: &str,
) -> LogGuard {
    let console_env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_filter(verbosity)));

    let use_ansi = match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stderr().is_terminal(),
    };

    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(use_ansi)
        .without_time()
        .with_target(false)
        .with_thread_names(false)
        .with_level(true)
        .with_filter(console_env_filter);

    let mut file_guard = None;

    let file_layer = match (workspace_dir, file_log_level) {
        (Some(dir), Some(level)) => {
            let log_dir = dir.join(LOG_DIR);

            let appender = fs_err::create_dir_all(&log_dir)
                .map_err(|err| err.to_string())
                .and_then(|()| {
                    tracing_appender::rolling::Builder::new()
                        .rotation(tracing_appender::rolling::Rotation::DAILY)
                        .filename_prefix(command_name)
                        .filename_suffix("log")
                        .max_log_files(MAX_LOG_FILES)
                        .build(&log_dir)
                        .map_err(|err| err.to_string())
                });

            match appender {
                Ok(appender) => {
                    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                    file_guard = Some(guard);

                    Some(
                        fmt::layer()
                            .with_writer(non_blocking)
                            .with_ansi(false)
                            .with_timer(UtcTime::rfc_3339())
                            .with_target(true)
                            .with_thread_names(true)
                            .with_level(true)
                            .with_filter(EnvFilter::new(level.to_string())),
                    )
                }
                Err(err) => {
                    eprintln!(
                        "Warning: could not log to {}: {err}",
                        log_dir.display()
                    );
                    None
                }
            }
        }
        _ => None,
    };

    // `try_init` also installs the `log` to `tracing` bridge.
    if let Err(err) = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Warning: could not install logger: {err}");
    }

    LogGuard {
        _file_guard: file_guard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_crate_level() {
        assert_eq!(console_filter(0), "info");
        assert_eq!(console_filter(1), "info,libretrace=debug");
        assert_eq!(console_filter(2), "info,libretrace=trace");
        assert_eq!(console_filter(9), "trace");
    }
}
