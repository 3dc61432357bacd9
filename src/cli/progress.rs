//! Console Progress Rendering
//!
//! Turns the pipeline's `ProgressEvent` stream into terminal lines, or into
//! NDJSON when the caller wants machine-readable output.

use std::time::Instant;

use console::style;

use crate::wiki::ProgressEvent;

/// Console progress renderer
pub struct ConsoleRenderer {
    started: Instant,
    bar_width: usize,
    last_progress: u8,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            bar_width: 30,
            last_progress: 0,
        }
    }

    pub fn with_bar_width(mut self, width: usize) -> Self {
        self.bar_width = width;
        self
    }

    /// Render one event as a display line
    pub fn render(&mut self, event: &ProgressEvent) -> String {
        let elapsed = format_duration(self.started.elapsed().as_secs());

        match event {
            ProgressEvent::Progress {
                progress,
                message,
                current_page,
            } => {
                self.last_progress = *progress;
                let bar = render_progress_bar(*progress as usize, 100, self.bar_width);
                let page = current_page
                    .as_deref()
                    .map(|p| format!("\n  {}", style(p).dim()))
                    .unwrap_or_default();
                format!(
                    "{} {:>3}% {}{}",
                    style(bar).cyan(),
                    progress,
                    message,
                    page
                )
            }
            ProgressEvent::Ping { message } => {
                let note = message.as_deref().unwrap_or("still working");
                format!(
                    "{} {} ({}% after {})",
                    style("⋯").dim(),
                    style(note).dim(),
                    self.last_progress,
                    elapsed
                )
            }
            ProgressEvent::Complete {
                pages,
                broken_edges,
                ..
            } => {
                let mut line = format!(
                    "{} Generated {} pages in {}",
                    style("✓").green(),
                    pages.len(),
                    elapsed
                );
                if !broken_edges.is_empty() {
                    line.push_str(&format!(
                        "\n{} Broke {} dependency cycle edge(s): {}",
                        style("⚠").yellow(),
                        broken_edges.len(),
                        broken_edges
                            .iter()
                            .map(|e| format!("{} → {}", e.from, e.to))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
                line
            }
            ProgressEvent::Error { message } => {
                format!("{} {}", style("✗").red(), message)
            }
        }
    }
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// One event per line, as sent over the wire
pub fn render_ndjson(event: &ProgressEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

/// Render a simple progress bar
fn render_progress_bar(completed: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return format!("[{}]", " ".repeat(width));
    }

    let progress = (completed as f32 / total as f32).min(1.0);
    let filled = (progress * width as f32) as usize;
    let empty = width.saturating_sub(filled);

    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format duration as human-readable string
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
