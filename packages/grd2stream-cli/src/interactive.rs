//! Terminal stand-ins for the GIS host's message bar, map tool and dialogs.

use grd2stream_rs::host::{
    CoordinatePicker, LogReporter, PickHandler, PickSubscription, RetryPrompt, Severity,
    StatusMessage, StatusReporter,
};
use grd2stream_rs::{FlowlineError, SeedPoint};
use std::io::{BufRead, IsTerminal, Write};

/// Prints status messages to stderr; when quiet, info and success only go to the log
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl StatusReporter for ConsoleReporter {
    fn push(&self, message: StatusMessage) {
        match message.severity {
            Severity::Info | Severity::Success if self.quiet => LogReporter.push(message),
            Severity::Info | Severity::Success => {
                eprintln!("{}: {}", message.title, message.text)
            }
            Severity::Warning => eprintln!("Warning: {}: {}", message.title, message.text),
            Severity::Critical => eprintln!("Error: {}: {}", message.title, message.text),
        }
    }
}

fn read_line() -> Option<String> {
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

/// Reads the seed coordinate as one "x,y" line from stdin
pub struct StdinPicker;

impl CoordinatePicker for StdinPicker {
    fn activate(&self) {
        if std::io::stdin().is_terminal() {
            eprint!("Seed coordinate (x,y): ");
            let _ = std::io::stderr().flush();
        }
    }

    /// Reads on a blocking thread; the handler runs once a valid line arrives
    fn on_pick(&self, mut handler: PickHandler) -> PickSubscription {
        let reader = tokio::task::spawn_blocking(move || {
            match read_line().filter(|l| !l.is_empty()) {
                Some(line) => match line.parse::<SeedPoint>() {
                    Ok(seed) => handler(seed),
                    Err(e) => eprintln!("Error: {}", e),
                },
                None => log::debug!("No seed coordinate on stdin"),
            }
        });
        // Dropping the JoinHandle only detaches the reader, it cannot be interrupted.
        PickSubscription::new(move || drop(reader))
    }

    fn deactivate(&self) {}
}

/// Yes/no questions on the terminal; declines when stdin is not interactive
pub struct StdinPrompt {
    assume_yes: bool,
}

impl StdinPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    pub fn confirm(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        if !std::io::stdin().is_terminal() {
            log::warn!("{} (no terminal, answering no)", question);
            return false;
        }
        eprint!("{} [y/N] ", question);
        let _ = std::io::stderr().flush();
        read_line()
            .map(|answer| matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
            .unwrap_or(false)
    }
}

impl RetryPrompt for StdinPrompt {
    fn confirm_retry(&self, attempt: u32, error: &FlowlineError) -> bool {
        eprintln!("Verification failed (attempt {}): {}", attempt, error);
        self.confirm("Retry the grd2stream installation?")
    }
}
