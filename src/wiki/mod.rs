//! AI-Driven Wiki Generation
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Snapshot → Context Cache → Planner → Scheduler → Generator (per level)
//!                                                        ↓
//!                            ProgressEvent stream ← Orchestrator
//! ```

pub mod context_cache;
pub mod events;
pub mod generator;
pub mod pipeline;
pub mod planner;
pub mod scheduler;

pub use context_cache::{ContextCacheBuilder, build_context_document};
pub use events::ProgressEvent;
pub use generator::{PageGenerator, PageLookup, build_page_prompt, summarize};
pub use pipeline::{PipelineOptions, PipelineStage, WikiPipeline};
pub use planner::{PAGE_ARCHETYPES, WikiPlanner, parse_plan};
pub use scheduler::{
    BrokenEdge, DependencyScheduler, ExecutionOrder, ExecutionPlan, ScheduleMode,
};
