use std::ffi::OsString;
use std::process::{Command, Stdio};

use super::{ExecutorResult, OperationDescriptor, OperationKind, PrivilegedExecutor};

/// Makes `mv` and `cp` fail instead of entering a destination directory that
/// already exists. Only GNU coreutils has it.
const NO_TARGET_DIRECTORY: Option<&str> = if cfg!(target_os = "linux") {
    Some("-T")
} else {
    None
};

/// Runs the platform command for a descriptor behind a privilege helper such
/// as `sudo -n` or `pkexec`.
#[derive(Debug, Clone)]
pub struct HelperProcessExecutor {
    helper: Vec<String>,
}

impl HelperProcessExecutor {
    pub fn new(helper: Vec<String>) -> Self {
        Self { helper }
    }

    /// The full command line, helper first, for `operation`. Returns `None`
    /// if the descriptor lacks a path the command needs.
    pub fn command_line(&self, operation: &OperationDescriptor) -> Option<Vec<OsString>> {
        let source = operation.source_path.as_deref();
        let target = operation.target_path();

        let command: Vec<OsString> = match operation.kind {
            OperationKind::Copy => {
                let mut line: Vec<OsString> = vec!["cp".into(), "-R".into()];
                line.extend(NO_TARGET_DIRECTORY.map(OsString::from));
                line.extend([OsString::from("--"), source?.into(), target?.into()]);
                line
            }
            OperationKind::Move | OperationKind::Rename => {
                let mut line: Vec<OsString> = vec!["mv".into()];
                line.extend(NO_TARGET_DIRECTORY.map(OsString::from));
                line.extend([OsString::from("--"), source?.into(), target?.into()]);
                line
            }
            OperationKind::Delete => vec!["rm".into(), "-rf".into(), "--".into(), source?.into()],
            OperationKind::CreateFolder => {
                vec!["mkdir".into(), "-p".into(), "--".into(), target?.into()]
            }
            OperationKind::CreateFile => vec!["touch".into(), "--".into(), target?.into()],
        };

        Some(
            self.helper
                .iter()
                .map(OsString::from)
                .chain(command)
                .collect(),
        )
    }
}

impl PrivilegedExecutor for HelperProcessExecutor {
    fn execute(&self, operation: &OperationDescriptor) -> ExecutorResult {
        let Some(command_line) = self.command_line(operation) else {
            return ExecutorResult::failed(format!(
                "cannot run {} without all of its paths",
                operation.kind
            ));
        };
        let Some((program, args)) = command_line.split_first() else {
            return ExecutorResult::failed("no command to run");
        };

        log::debug!("Running privileged command: {:?}", command_line);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() => ExecutorResult::ok(),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    ExecutorResult::failed(format!("privileged command failed: {}", output.status))
                } else {
                    ExecutorResult::failed(stderr)
                }
            }
            Err(err) => ExecutorResult::failed(format!(
                "could not start {}: {}",
                program.to_string_lossy(),
                err
            )),
        }
    }
}
