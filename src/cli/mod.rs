//! Defines retrace's CLI through clap types.

mod check_config;
mod session;

use std::{
    borrow::Cow,
    env,
    path::{Path, PathBuf},
    str::FromStr,
};

use clap::Parser;
use thiserror::Error;

pub use self::check_config::CheckConfigCommand;
pub use self::session::SessionCommand;

/// Command line options that retrace accepts, defined using the clap crate.
#[derive(Debug, Parser)]
#[clap(name = "retrace", version, about)]
pub struct Options {
    #[clap(flatten)]
    pub global: GlobalOptions,

    /// Subcommand to run in this invocation.
    #[clap(subcommand)]
    pub subcommand: Subcommand,
}

impl Options {
    pub fn run(self) -> anyhow::Result<()> {
        match self.subcommand {
            Subcommand::Session(subcommand) => subcommand.run(self.global),
            Subcommand::CheckConfig(subcommand) => subcommand.run(),
        }
    }
}

#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Sets verbosity level. Can be specified multiple times.
    #[clap(long("verbose"), short, global(true), action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Set color behavior. Valid values are auto, always, and never.
    #[clap(long("color"), global(true), default_value("auto"))]
    pub color: ColorChoice,
}

#[derive(Debug, Clone, Copy)]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl FromStr for ColorChoice {
    type Err = ColorChoiceParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        match source {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(ColorChoiceParseError {
                attempted: source.to_owned(),
            }),
        }
    }
}

impl From<ColorChoice> for termcolor::ColorChoice {
    fn from(value: ColorChoice) -> Self {
        match value {
            ColorChoice::Auto => termcolor::ColorChoice::Auto,
            ColorChoice::Always => termcolor::ColorChoice::Always,
            ColorChoice::Never => termcolor::ColorChoice::Never,
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid color choice '{attempted}'. Valid values are: auto, always, never")]
pub struct ColorChoiceParseError {
    attempted: String,
}

#[derive(Debug, Parser)]
pub enum Subcommand {
    Session(SessionCommand),
    CheckConfig(CheckConfigCommand),
}

impl Subcommand {
    /// The workspace directory argument of this invocation, if one was given.
    pub fn workspace_path(&self) -> Option<&Path> {
        match self {
            Subcommand::Session(cmd) => cmd.dir.as_deref(),
            Subcommand::CheckConfig(cmd) => cmd.dir.as_deref(),
        }
    }

    pub fn command_name(&self) -> &'static str {
        match self {
            Subcommand::Session(_) => "session",
            Subcommand::CheckConfig(_) => "check-config",
        }
    }
}

pub fn resolve_path(path: &Path) -> Cow<'_, Path> {
    if path.is_absolute() {
        Cow::Borrowed(path)
    } else {
        let base = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Cow::Owned(base.join(path))
    }
}

/// Resolves a workspace argument to an absolute directory. No argument means
/// the current directory.
pub fn resolve_workspace_dir(path: Option<&Path>) -> PathBuf {
    match path {
        Some(path) => resolve_path(path).into_owned(),
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
