use std::{env, panic, process};

use backtrace::Backtrace;
use clap::Parser;

use libretrace::cli::{resolve_workspace_dir, Options};
use libretrace::config::Config;
use libretrace::logging;

fn main() {
    panic::set_hook(Box::new(|panic_info| {
        let message = match panic_info.payload().downcast_ref::<&str>() {
            Some(&message) => message.to_string(),
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(message) => message.clone(),
                None => "<no message>".to_string(),
            },
        };

        log::error!(
            "retrace crashed! You are running retrace {}.",
            env!("CARGO_PKG_VERSION")
        );
        log::error!("This is probably a retrace bug. Files touched by the last");
        log::error!("operation may be in an intermediate state.");
        log::error!("");
        log::error!("Details: {}", message);

        if let Some(location) = panic_info.location() {
            log::error!("in file {} on line {}", location.file(), location.line());
        }

        let should_backtrace = env::var("RUST_BACKTRACE")
            .map(|var| var == "1")
            .unwrap_or(false);

        if should_backtrace {
            eprintln!("{:?}", Backtrace::new());
        } else {
            eprintln!(
                "note: run with `RUST_BACKTRACE=1` environment variable to display a backtrace."
            );
        }

        process::exit(1);
    }));

    let options = Options::parse();

    let workspace_dir = resolve_workspace_dir(options.subcommand.workspace_path());

    // A broken config is reported by the command itself; logging just falls
    // back to the default file level.
    let file_log_level = if env::var("RETRACE_NO_FILE_LOG").is_ok() {
        None
    } else {
        match Config::load_from_dir(&workspace_dir) {
            Ok(config) => config.file_log_level(),
            Err(_) => Some(tracing::level_filters::LevelFilter::TRACE),
        }
    };

    let command_name = format!("retrace-{}", options.subcommand.command_name());

    let _log_guard = logging::init_logging(
        options.global.verbosity,
        options.global.color,
        Some(&workspace_dir),
        file_log_level,
        &command_name,
    );

    if let Err(err) = options.run() {
        log::error!("{:?}", err);
        process::exit(1);
    }
}
