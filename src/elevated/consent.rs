use std::fmt;
use std::io::{self, BufRead, BufReader, IsTerminal, Write};
use std::sync::{Arc, Mutex};

use super::ConsentProvider;

/// Line input shared by the session loop and consent prompts.
///
/// Each read holds the reader lock for a single line, so a prompt can read
/// its answer in the middle of a command.
#[derive(Clone)]
pub struct LineInput {
    reader: Arc<Mutex<Box<dyn BufRead + Send>>>,
    interactive: bool,
}

impl LineInput {
    pub fn stdin() -> Self {
        let interactive = io::stdin().is_terminal();
        Self::new(BufReader::new(io::stdin()), interactive)
    }

    pub fn new(reader: impl BufRead + Send + 'static, interactive: bool) -> Self {
        Self {
            reader: Arc::new(Mutex::new(Box::new(reader))),
            interactive,
        }
    }

    /// Whether a person is typing the input.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// The next line without its terminator, or `None` at the end of input.
    pub fn read_line(&self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .read_line(&mut line)?;

        if read == 0 {
            return Ok(None);
        }

        let len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(len);
        Ok(Some(line))
    }
}

impl fmt::Debug for LineInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineInput")
            .field("interactive", &self.interactive)
            .finish_non_exhaustive()
    }
}

/// Asks on stderr and reads the answer from the session's input. Declines
/// without asking when the input is not interactive.
#[derive(Debug, Clone)]
pub struct TerminalConsent {
    input: LineInput,
}

impl TerminalConsent {
    pub fn new(input: LineInput) -> Self {
        Self { input }
    }
}

impl ConsentProvider for TerminalConsent {
    fn confirm(&self, description: &str) -> bool {
        if !self.input.is_interactive() {
            log::debug!("Input is not interactive, declining: {}", description);
            return false;
        }

        // Unlocked handle: other threads may log while the answer is pending.
        let mut stderr = io::stderr();
        if write!(stderr, "{description} [y/N] ")
            .and_then(|_| stderr.flush())
            .is_err()
        {
            return false;
        }

        match self.input.read_line() {
            Ok(Some(answer)) => is_yes(&answer),
            Ok(None) => false,
            Err(err) => {
                log::warn!("Could not read consent answer: {}", err);
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
