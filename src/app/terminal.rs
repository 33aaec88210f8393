use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use tracing::warn;

use crate::credentials::Prompter;
use crate::notice::{Notice, Notifier};

/// Line-based prompts on a terminal. An empty line accepts the default;
/// end of input cancels.
pub(crate) struct TerminalPrompter {
    input: Option<Box<dyn BufRead>>,
    output: Box<dyn Write>,
}

impl TerminalPrompter {
    pub(crate) fn new(input: Option<Box<dyn BufRead>>, output: Box<dyn Write>) -> Self {
        Self { input, output }
    }

    pub(crate) fn stdin() -> Self {
        Self::new(Some(Box::new(io::stdin().lock())), Box::new(io::stderr()))
    }

    /// Prompt on the controlling terminal, for when stdin carries other data.
    /// Without one every prompt is cancelled.
    pub(crate) fn controlling_terminal() -> Self {
        let input = match File::open("/dev/tty") {
            Ok(tty) => Some(Box::new(BufReader::new(tty)) as Box<dyn BufRead>),
            Err(err) => {
                warn!("no controlling terminal for prompts: {err}");
                None
            }
        };
        Self::new(input, Box::new(io::stderr()))
    }
}

impl Prompter for TerminalPrompter {
    fn prompt(&mut self, message: &str, default: &str) -> Option<String> {
        let Some(input) = self.input.as_mut() else {
            warn!(message, "cannot prompt without a terminal");
            return None;
        };

        let shown = if default.is_empty() {
            format!("{message}: ")
        } else {
            format!("{message} [{default}]: ")
        };
        if let Err(err) = self
            .output
            .write_all(shown.as_bytes())
            .and_then(|()| self.output.flush())
        {
            warn!("failed to write prompt: {err}");
        }

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                let answer = line.trim_end_matches(['\r', '\n']);
                if answer.is_empty() {
                    Some(default.to_string())
                } else {
                    Some(answer.to_string())
                }
            }
            Err(err) => {
                warn!("failed to read answer: {err}");
                None
            }
        }
    }
}

/// Prints notices to stderr.
pub(crate) struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&mut self, notice: Notice) {
        warn!(?notice, "notifying user");
        eprintln!("jellympv: {notice}");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn prompter(input: &str) -> TerminalPrompter {
        TerminalPrompter::new(
            Some(Box::new(Cursor::new(input.to_string()))),
            Box::new(io::sink()),
        )
    }

    #[test]
    fn empty_line_accepts_default_and_eof_cancels() {
        let mut prompter = prompter("\nkey-2\r\n");
        assert_eq!(
            prompter.prompt("Server address", "http://jf.local").as_deref(),
            Some("http://jf.local")
        );
        assert_eq!(prompter.prompt("API key", "").as_deref(), Some("key-2"));
        assert_eq!(prompter.prompt("User id", "user"), None);
    }

    #[test]
    fn missing_terminal_cancels_every_prompt() {
        let mut prompter = TerminalPrompter::new(None, Box::new(io::sink()));
        assert_eq!(prompter.prompt("API key", "old"), None);
    }
}
