//! wikiforge - Dependency-Aware Wiki Generation
//!
//! Turns a repository snapshot into a set of cross-linked wiki pages using a
//! generative model, streaming progress to the caller as it goes.
//!
//! ## Pipeline
//!
//! 1. Register the whole codebase with the model's context cache
//! 2. Ask the model for a page plan with dependencies and priorities
//! 3. Schedule pages into dependency levels, breaking cycles
//! 4. Generate each level concurrently, feeding finished pages to dependents
//!
//! ## Quick Start
//!
//! ```ignore
//! use futures::StreamExt;
//! use wikiforge::{ProgressEvent, WikiPipeline, PipelineOptions};
//! use wikiforge::ai::provider::{ProviderConfig, create_provider};
//!
//! let provider = create_provider(&ProviderConfig::default())?;
//! let pipeline = WikiPipeline::new(provider, PipelineOptions::default());
//! let mut events = std::pin::pin!(pipeline.run(&snapshot));
//! while let Some(event) = events.next().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: model provider abstraction, retry, heartbeat, usage accounting
//! - [`wiki`]: cache builder, planner, scheduler, generator, orchestrator
//! - [`config`]: layered configuration
//! - [`types`]: snapshot, page and error types

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod types;
pub mod wiki;

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, Result, WikiError};

// Domain Types
pub use types::{GeneratedPage, PlannedPage, RepositorySnapshot, SourceFile, WikiPlan};

// Pipeline
pub use wiki::{
    BrokenEdge, DependencyScheduler, ExecutionPlan, PipelineOptions, ProgressEvent, ScheduleMode,
    WikiPipeline,
};

// AI
pub use ai::{
    Heartbeat, LlmProvider, LlmResponse, Retrier, RetryPolicy, SharedProvider, Usage,
    UsageTracker, heartbeat_stream, with_heartbeat,
};
