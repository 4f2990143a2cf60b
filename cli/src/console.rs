//! Interactive console implementation of the presentation port.
//!
//! All terminal styling lives here; the core crate only ever sees plain
//! strings.

use std::io::{self, BufRead, Write};

use crossterm::style::Stylize;
use rcm_core::view::View;
use rcm_core::RcmError;

/// Console view: prompts on stdout, reads confirmations from stdin.
pub struct ConsoleView {
    /// Answer every prompt with yes without asking (`--yes`).
    assume_yes: bool,
}

impl ConsoleView {
    pub fn new(assume_yes: bool) -> Self {
        ConsoleView { assume_yes }
    }
}

impl View for ConsoleView {
    fn ask(&mut self, prompt: &str) -> bool {
        if self.assume_yes {
            println!("{} {} y", prompt, "y/N:".bold());
            return true;
        }

        print!("{} {} ", prompt, "y/N:".bold());
        let _ = io::stdout().flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }

        answer.trim() == "y"
    }

    fn echo(&mut self, line: &str) {
        println!("{}", line);
    }

    fn success(&mut self, line: &str) {
        println!("{} {}", "OK ".green(), line);
    }

    fn aborted(&mut self) {
        println!("{}", "Aborted.".yellow());
    }
}

/// Print an error the same way failed operations are reported.
pub fn failure(err: &RcmError) {
    println!("{} {}", "ERR".red(), err);
}
