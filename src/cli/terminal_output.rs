//! Terminal output for live service logs
//!
//! Prints service output lines as they arrive from the supervised app.
//! Lines are dimmed and clipped to the terminal width so chatty ML
//! frameworks don't wrap the display into an unreadable wall, and
//! stdout is flushed after every line for immediate display.

use super::output::GLOBE;
use console::style;
use std::io::{self, Write};

/// Prints live service output to the terminal
///
/// A disabled printer swallows lines, so callers don't have to branch
/// on the stream flag themselves. The ready banner is always printed.
#[derive(Debug, Clone)]
pub struct ServiceLogPrinter {
    enabled: bool,
}

impl ServiceLogPrinter {
    /// Create a new printer; `enabled` usually comes from `--stream`
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Print one line of service output
    pub fn print_line(&self, line: &str) {
        if !self.enabled {
            return;
        }
        let width = terminal_width();
        println!("  {}", style(clip_line(line, width.saturating_sub(2))).dim());
        self.flush_stdout();
    }

    /// Print the ready banner with the discovered URL
    pub fn print_banner(&self, url: &str) {
        self.print_separator();
        println!("{} Running on {}", GLOBE, style(url).green().bold());
        self.print_separator();
        self.flush_stdout();
    }

    /// Print a separator line spanning the terminal width
    fn print_separator(&self) {
        println!("{}", "─".repeat(terminal_width()));
    }

    /// Flush stdout to ensure immediate display
    fn flush_stdout(&self) {
        let _ = io::stdout().flush();
    }
}

/// Terminal width, defaulting to 80 when it can't be determined
fn terminal_width() -> usize {
    term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80)
}

/// Clip a line to `max` characters, on a char boundary
fn clip_line(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        return line.to_string();
    }
    let clipped: String = line.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", clipped)
}
