//! Interactive confirmation for privileged commands.

use nixie_common::executor::Confirmer;
use nixie_common::{Command, RiskLevel};
use owo_colors::OwoColorize;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

/// Where answers come from.
pub trait AnswerSource: Send {
    fn read_answer(&mut self, buf: &mut String) -> io::Result<usize>;
}

impl<R: BufRead + Send> AnswerSource for R {
    fn read_answer(&mut self, buf: &mut String) -> io::Result<usize> {
        self.read_line(buf)
    }
}

/// Process stdin through its global buffer, so answers and REPL lines are
/// consumed in order.
pub struct SharedStdin;

impl AnswerSource for SharedStdin {
    fn read_answer(&mut self, buf: &mut String) -> io::Result<usize> {
        io::stdin().lock().read_line(buf)
    }
}

/// Asks on stderr and reads the answer from `input`. Anything but y/yes
/// declines, including end of input.
pub struct PromptConfirmer<R> {
    input: Mutex<R>,
}

impl PromptConfirmer<SharedStdin> {
    pub fn stdin() -> Self {
        Self::new(SharedStdin)
    }
}

impl<R: AnswerSource> PromptConfirmer<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }
}

impl<R: AnswerSource> Confirmer for PromptConfirmer<R> {
    fn confirm(&self, command: &Command, risk: RiskLevel) -> bool {
        let mut stderr = io::stderr();
        let _ = write!(
            stderr,
            "{} {} (risk: {}) needs administrator privileges. Run it? [y/N] ",
            "[CONFIRM]".yellow(),
            command.display_text().bold(),
            risk
        );
        let _ = stderr.flush();

        let mut answer = String::new();
        let Ok(mut input) = self.input.lock() else {
            return false;
        };
        match input.read_answer(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_yes(&answer),
        }
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
