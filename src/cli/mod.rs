pub mod commands;
pub mod progress;
pub mod ui;

pub use progress::{ConsoleRenderer, format_duration, render_ndjson};
