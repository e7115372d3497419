use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use termcolor::{Color, ColorSpec, StandardStream, WriteColor};

use crate::boundary::{CommandResult, OperationResult};
use crate::config::Config;
use crate::elevated::{LineInput, OperationDescriptor};
use crate::engine::Operation;
use crate::session_id::SessionId;
use crate::workspace::Workspace;

use super::{resolve_workspace_dir, GlobalOptions};

const HELP: &str = "\
touch PATH            create an empty file
mkdir PATH            create a folder
rename PATH NAME      rename an item in place
mv SRC... DEST_DIR    move items into a folder
cp SRC DEST           copy an item (not recorded)
rm PATH               delete an item (not recorded)
undo | redo           walk the history
status                print whether undo and redo are available
history               list recorded actions, most recent first
reset                 forget all history
quit                  leave the session";

/// Record file operations in a directory and undo or redo them
/// interactively.
#[derive(Debug, Parser)]
pub struct SessionCommand {
    /// Workspace directory. Defaults to the current directory.
    pub dir: Option<PathBuf>,
}

impl SessionCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<()> {
        let dir = resolve_workspace_dir(self.dir.as_deref());
        let config = Config::load_from_dir(&dir)
            .with_context(|| format!("Could not load the config for {}", dir.display()))?;
        let input = LineInput::stdin();
        let workspace = Workspace::open(&dir, &config, input.clone())
            .with_context(|| format!("Could not open workspace {}", dir.display()))?;

        log::info!("Recording file operations in {}", dir.display());

        let mut out = StandardStream::stdout(global.color.into());
        repl(&workspace, &input, &mut out)?;

        Ok(())
    }
}

/// Runs commands until `quit` or the end of input. Consent prompts read
/// from the same input between commands.
fn repl(workspace: &Workspace, input: &LineInput, out: &mut impl WriteColor) -> io::Result<()> {
    let caller = workspace.boundary().session_id();

    loop {
        if input.is_interactive() {
            write!(out, "> ")?;
            out.flush()?;
        }

        let Some(line) = input.read_line()? else {
            break;
        };

        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(ReplCommand::Quit)) => break,
            Ok(Some(command)) => run_command(workspace, caller, command, out)?,
            Err(message) => print_failure(out, &message)?,
        }
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Touch(PathBuf),
    Mkdir(PathBuf),
    Rename(PathBuf, String),
    Move(Vec<PathBuf>, PathBuf),
    Copy(PathBuf, PathBuf),
    Remove(PathBuf),
    Undo,
    Redo,
    Status,
    History,
    Reset,
    Help,
    Quit,
}

/// Parses one input line. Blank lines and `#` comments yield `None`.
fn parse_line(line: &str) -> Result<Option<ReplCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    if name.starts_with('#') {
        return Ok(None);
    }
    let args: Vec<&str> = words.collect();

    let command = match (name, args.as_slice()) {
        ("touch", [path]) => ReplCommand::Touch(path.into()),
        ("mkdir", [path]) => ReplCommand::Mkdir(path.into()),
        ("rename", [path, new_name]) => ReplCommand::Rename(path.into(), (*new_name).to_owned()),
        ("mv", [sources @ .., dest]) if !sources.is_empty() => ReplCommand::Move(
            sources.iter().map(PathBuf::from).collect(),
            dest.into(),
        ),
        ("cp", [source, dest]) => ReplCommand::Copy(source.into(), dest.into()),
        ("rm", [path]) => ReplCommand::Remove(path.into()),
        ("undo", []) => ReplCommand::Undo,
        ("redo", []) => ReplCommand::Redo,
        ("status", []) => ReplCommand::Status,
        ("history", []) => ReplCommand::History,
        ("reset", []) => ReplCommand::Reset,
        ("help", []) => ReplCommand::Help,
        ("quit" | "exit", []) => ReplCommand::Quit,
        (
            "touch" | "mkdir" | "rename" | "mv" | "cp" | "rm" | "undo" | "redo" | "status"
            | "history" | "reset" | "help" | "quit" | "exit",
            _,
        ) => return Err(format!("wrong arguments for '{name}', try 'help'")),
        _ => return Err(format!("unknown command '{name}', try 'help'")),
    };

    Ok(Some(command))
}

fn run_command(
    workspace: &Workspace,
    caller: SessionId,
    command: ReplCommand,
    out: &mut impl WriteColor,
) -> io::Result<()> {
    let boundary = workspace.boundary();
    let resolve = |path: PathBuf| workspace.resolve(&path);

    match command {
        ReplCommand::Touch(path) => {
            let result = boundary.perform(caller, Operation::CreateFile { path: resolve(path) });
            print_operation(out, &result)
        }
        ReplCommand::Mkdir(path) => {
            let result =
                boundary.perform(caller, Operation::CreateFolder { path: resolve(path) });
            print_operation(out, &result)
        }
        ReplCommand::Rename(path, new_name) => {
            let result = boundary.perform(
                caller,
                Operation::Rename {
                    path: resolve(path),
                    new_name,
                },
            );
            print_operation(out, &result)
        }
        ReplCommand::Move(sources, dest_dir) => {
            let result = boundary.perform(
                caller,
                Operation::Move {
                    sources: sources.into_iter().map(resolve).collect(),
                    dest_dir: resolve(dest_dir),
                },
            );
            print_operation(out, &result)
        }
        ReplCommand::Copy(source, dest) => {
            let descriptor = OperationDescriptor::copy(resolve(source), resolve(dest));
            print_operation(out, &boundary.execute_elevated(caller, &descriptor))
        }
        ReplCommand::Remove(path) => {
            let descriptor = OperationDescriptor::delete(resolve(path));
            print_operation(out, &boundary.execute_elevated(caller, &descriptor))
        }
        ReplCommand::Undo => print_command(out, &boundary.undo(caller)),
        ReplCommand::Redo => print_command(out, &boundary.redo(caller)),
        ReplCommand::Reset => print_command(out, &boundary.reset(caller)),
        ReplCommand::Status => {
            let state = boundary.get_state(caller);
            let json = serde_json::to_string(&state).map_err(io::Error::other)?;
            writeln!(out, "{json}")
        }
        ReplCommand::History => print_history(workspace, out),
        ReplCommand::Help => writeln!(out, "{HELP}"),
        ReplCommand::Quit => Ok(()),
    }
}

fn print_history(workspace: &Workspace, out: &mut impl WriteColor) -> io::Result<()> {
    let history = workspace.boundary().history();
    let history = history.lock().unwrap_or_else(|e| e.into_inner());

    let undo: Vec<String> = history.undo_entries().rev().map(|a| a.describe()).collect();
    let redo: Vec<String> = history.redo_entries().rev().map(|a| a.describe()).collect();
    drop(history);

    for (title, entries) in [("undo", undo), ("redo", redo)] {
        writeln!(out, "{title}:")?;
        if entries.is_empty() {
            writeln!(out, "  (empty)")?;
        }
        for entry in entries {
            writeln!(out, "  {entry}")?;
        }
    }

    Ok(())
}

fn print_command(out: &mut impl WriteColor, result: &CommandResult) -> io::Result<()> {
    match &result.error {
        None if result.success => print_success(out, ""),
        error => print_failure(out, error.as_deref().unwrap_or("failed")),
    }
}

fn print_operation(out: &mut impl WriteColor, result: &OperationResult) -> io::Result<()> {
    if result.success {
        print_success(out, if result.elevated { " (elevated)" } else { "" })
    } else {
        print_failure(out, result.error.as_deref().unwrap_or("failed"))
    }
}

fn print_success(out: &mut impl WriteColor, suffix: &str) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    write!(out, "ok")?;
    out.reset()?;
    writeln!(out, "{suffix}")
}

fn print_failure(out: &mut impl WriteColor, message: &str) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    write!(out, "error")?;
    out.reset()?;
    writeln!(out, ": {message}")
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use termcolor::Buffer;

    use super::*;

    fn output(buffer: Buffer) -> String {
        String::from_utf8(buffer.into_inner()).unwrap()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_line("mv a b dest").unwrap(),
            Some(ReplCommand::Move(
                vec![PathBuf::from("a"), PathBuf::from("b")],
                PathBuf::from("dest")
            ))
        );
        assert_eq!(
            parse_line("rename a.txt b.txt").unwrap(),
            Some(ReplCommand::Rename(PathBuf::from("a.txt"), "b.txt".to_owned()))
        );
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# a comment").unwrap(), None);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            parse_line("mv only-one").unwrap_err(),
            "wrong arguments for 'mv', try 'help'"
        );
        assert_eq!(
            parse_line("frobnicate").unwrap_err(),
            "unknown command 'frobnicate', try 'help'"
        );
    }

    #[test]
    fn runs_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            watch: false,
            ..Config::default()
        };
        let workspace = Workspace::open_with_consent(dir.path(), &config, None).unwrap();
        let caller = workspace.boundary().session_id();
        let mut out = Buffer::no_color();

        for line in ["touch notes.txt", "rename notes.txt todo.txt", "undo", "status"] {
            let command = parse_line(line).unwrap().unwrap();
            run_command(&workspace, caller, command, &mut out).unwrap();
        }

        assert_eq!(
            output(out),
            "ok\nok\nok\n{\"canUndo\":true,\"canRedo\":true}\n"
        );
        assert!(dir.path().join("notes.txt").is_file());
        assert!(!dir.path().join("todo.txt").exists());
    }

    #[test]
    fn session_stops_at_quit() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            watch: false,
            ..Config::default()
        };
        let input = LineInput::new(
            Cursor::new("touch a.txt\n\nfrobnicate\nquit\ntouch b.txt\n"),
            false,
        );
        let workspace = Workspace::open(dir.path(), &config, input.clone()).unwrap();
        let mut out = Buffer::no_color();

        repl(&workspace, &input, &mut out).unwrap();

        assert_eq!(
            output(out),
            "ok\nerror: unknown command 'frobnicate', try 'help'\n"
        );
        assert!(dir.path().join("a.txt").is_file());
        assert!(!dir.path().join("b.txt").exists());
        assert_eq!(input.read_line().unwrap().as_deref(), Some("touch b.txt"));
    }

    #[test]
    fn failures_are_printed() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            watch: false,
            ..Config::default()
        };
        let workspace = Workspace::open_with_consent(dir.path(), &config, None).unwrap();
        let caller = workspace.boundary().session_id();
        let mut out = Buffer::no_color();

        run_command(&workspace, caller, ReplCommand::Undo, &mut out).unwrap();
        run_command(
            &workspace,
            caller,
            ReplCommand::Rename(PathBuf::from("x"), ".".to_owned()),
            &mut out,
        )
        .unwrap();

        assert_eq!(
            output(out),
            "error: Nothing to undo\nerror: Invalid name\n"
        );
    }
}
