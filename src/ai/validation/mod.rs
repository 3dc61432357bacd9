//! Response Validation
//!
//! Turning free-text model output into something typed.

mod fence;
mod json_extract;

pub use fence::{find_fenced_block, unwrap_whole_fence};
pub use json_extract::{extract_json_str, parse_embedded_json};
