//! Progress events streamed to the caller of a pipeline run
//!
//! Wire format is JSON with a `type` discriminator:
//!
//! ```text
//! {"type":"progress","progress":42,"message":"...","currentPage":"..."}
//! {"type":"ping"}
//! {"type":"complete","pages":[...],"usage":{...},"brokenEdges":[...]}
//! {"type":"error","message":"..."}
//! ```

use serde::{Deserialize, Serialize};

use super::scheduler::BrokenEdge;
use crate::ai::usage::Usage;
use crate::types::GeneratedPage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        /// 0..=100, never decreasing within a run
        progress: u8,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_page: Option<String>,
    },
    /// Keep-alive while a model call is outstanding
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        pages: Vec<GeneratedPage>,
        usage: Usage,
        broken_edges: Vec<BrokenEdge>,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self::Progress {
            progress,
            message: message.into(),
            current_page: None,
        }
    }

    pub fn ping() -> Self {
        Self::Ping { message: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// `complete` and `error` end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    pub fn progress_value(&self) -> Option<u8> {
        match self {
            Self::Progress { progress, .. } => Some(*progress),
            _ => None,
        }
    }
}
