use std::io::{self, Write};

use tracing::warn;

use super::{DisplaySink, SplitRow, TimerFrame};

/// Console renderer, the default [`DisplaySink`].
///
/// Writes one line per update to stdout. Useful when running the engine
/// headless or when a downstream process scrapes the stream instead of
/// embedding a renderer.
pub struct ConsoleDisplay {
    out: io::Stdout,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }

    fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{line}") {
            warn!("Failed to write display line: {}", e);
        }
    }
}

impl Default for ConsoleDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for ConsoleDisplay {
    fn set_timer(&mut self, frame: &TimerFrame) {
        self.write_line(&format!("[timer] {}", frame.text));
    }

    fn set_split_row(&mut self, row: &SplitRow) {
        let marker = if row.active { ">" } else { " " };
        let diff = row.diff_text.as_deref().unwrap_or("");
        self.write_line(&format!(
            "[split] {marker} {:2} {:<24} {:>12} {:>10}",
            row.index, row.label, row.time_text, diff
        ));
    }

    fn set_current_diff(&mut self, index: usize, diff_text: Option<&str>) {
        if let Some(diff) = diff_text {
            self.write_line(&format!("[split] diff {:2} {}", index, diff));
        }
    }

    fn hide_splits(&mut self) {
        self.write_line("[split] (hidden)");
    }

    fn alert(&mut self, message: &str) {
        self.write_line(&format!("[alert] {message}"));
    }
}
