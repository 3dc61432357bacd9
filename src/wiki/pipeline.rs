//! Wiki Generation Pipeline
//!
//! ## Stages
//!
//! ```text
//! Caching → Planning → Scheduling → Generating(level i of N) → Complete
//!     └──────────┴───────────┴──────────────┴──────→ Error
//! ```
//!
//! Each run owns its cache handle, plan and page lookup. Work happens in a
//! future that reports progress over a channel; the returned stream drains
//! that channel, adds heartbeat pings whenever it stays quiet for
//! `heartbeat_interval`, and ends with exactly one `complete` or `error`.
//!
//! ## Progress watermarks
//!
//! | Stage      | Range   |
//! |------------|---------|
//! | Caching    | 0 → 10  |
//! | Planning   | 12 → 20 |
//! | Generating | 20 → 95 |
//! | Complete   | 100     |

use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};

use super::context_cache::ContextCacheBuilder;
use super::events::ProgressEvent;
use super::generator::{PageGenerator, PageLookup};
use super::planner::WikiPlanner;
use super::scheduler::{BrokenEdge, DependencyScheduler, ScheduleMode};
use crate::ai::heartbeat::{Heartbeat, heartbeat_stream};
use crate::ai::provider::SharedProvider;
use crate::ai::retry::Retrier;
use crate::ai::usage::{SharedUsage, UsageTracker};
use crate::constants::pipeline::{self as pipeline_constants, progress as watermark};
use crate::types::{GeneratedPage, RepositorySnapshot, Result, RunId, WikiError};

/// Knobs for one pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub schedule_mode: ScheduleMode,
    /// Longest silence on the event stream before a ping
    pub heartbeat_interval: Duration,
    /// Page generations in flight per level (0 = whole level)
    pub max_concurrency: usize,
    pub cache_ttl: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            schedule_mode: ScheduleMode::default(),
            heartbeat_interval: Duration::from_secs(pipeline_constants::HEARTBEAT_INTERVAL_SECS),
            max_concurrency: 0,
            cache_ttl: Duration::from_secs(pipeline_constants::CACHE_TTL_SECS),
        }
    }
}

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Caching,
    Planning,
    Scheduling,
    Generating { level: usize, of: usize },
    Complete,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caching => write!(f, "caching"),
            Self::Planning => write!(f, "planning"),
            Self::Scheduling => write!(f, "scheduling"),
            Self::Generating { level, of } => write!(f, "generating level {} of {}", level, of),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// What a successful run hands to the `complete` event
#[derive(Debug, Clone)]
struct RunOutput {
    pages: Vec<GeneratedPage>,
    broken_edges: Vec<BrokenEdge>,
}

/// One wake-up of the event loop in [`WikiPipeline::run`]
enum Drive {
    Event(ProgressEvent),
    Finished(Result<RunOutput>),
    /// Work finished and every queued event was delivered
    Drained,
}

/// Emits progress events, clamped to never go backwards
///
/// 100 is reserved for [`ProgressReporter::finish`].
struct ProgressReporter {
    events: mpsc::UnboundedSender<ProgressEvent>,
    last: u8,
    stage: PipelineStage,
}

impl ProgressReporter {
    fn new(events: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            events,
            last: watermark::STARTED,
            stage: PipelineStage::Caching,
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        info!(from = %self.stage, to = %stage, "Pipeline stage transition");
        self.stage = stage;
    }

    fn report(&mut self, progress: u8, message: impl Into<String>, current_page: Option<String>) {
        let capped = progress.min(watermark::COMPLETE - 1);
        self.send(capped, message.into(), current_page);
    }

    fn finish(&mut self, message: impl Into<String>) {
        self.enter(PipelineStage::Complete);
        self.send(watermark::COMPLETE, message.into(), None);
    }

    fn send(&mut self, progress: u8, message: String, current_page: Option<String>) {
        self.last = self.last.max(progress);
        // The receiver only goes away when the stream was dropped
        let _ = self.events.send(ProgressEvent::Progress {
            progress: self.last,
            message,
            current_page,
        });
    }
}

/// Generating watermark after `completed` of `total` pages
fn generation_progress(completed: usize, total: usize) -> u8 {
    let span = (watermark::GENERATION_END - watermark::GENERATION_START) as usize;
    let done = if total == 0 {
        span
    } else {
        span * completed.min(total) / total
    };
    watermark::GENERATION_START + done as u8
}

/// Drives one repository snapshot to a finished wiki
pub struct WikiPipeline {
    provider: SharedProvider,
    options: PipelineOptions,
    retrier: Retrier,
    cancel: CancellationToken,
}

impl WikiPipeline {
    pub fn new(provider: SharedProvider, options: PipelineOptions) -> Self {
        Self {
            provider,
            options,
            retrier: Retrier::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = retrier;
        self
    }

    /// Use an externally owned token, e.g. one cancelled on Ctrl-C
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the pipeline, streaming progress
    ///
    /// The last event is always `complete` or `error`. Dropping the stream
    /// drops every in-flight model call.
    pub fn run<'a>(
        &'a self,
        snapshot: &'a RepositorySnapshot,
    ) -> impl Stream<Item = ProgressEvent> + 'a {
        let run_id = RunId::generate();
        let span = info_span!("wiki_run", run_id = %run_id, repo = %snapshot.full_name());
        let usage: SharedUsage = Arc::new(UsageTracker::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let work = self
            .execute(snapshot, Arc::clone(&usage), tx)
            .instrument(span);

        let events = stream! {
            let mut work = pin!(work);
            let mut outcome: Option<Result<RunOutput>> = None;

            loop {
                let step = tokio::select! {
                    biased;
                    Some(event) = rx.recv() => Drive::Event(event),
                    result = &mut work, if outcome.is_none() => Drive::Finished(result),
                    else => Drive::Drained,
                };
                match step {
                    Drive::Event(event) => yield event,
                    Drive::Finished(result) => outcome = Some(result),
                    Drive::Drained => break,
                }
            }

            match outcome {
                Some(Ok(output)) => {
                    yield ProgressEvent::Complete {
                        pages: output.pages,
                        usage: usage.usage(),
                        broken_edges: output.broken_edges,
                    };
                }
                Some(Err(err)) => {
                    error!(error = %err, "Wiki generation failed");
                    yield ProgressEvent::error(err.to_string());
                }
                None => yield ProgressEvent::error("Pipeline ended without a result"),
            }
        };

        heartbeat_stream(events, self.options.heartbeat_interval).map(|beat| match beat {
            Heartbeat::Ping => ProgressEvent::ping(),
            Heartbeat::Item(event) => event,
        })
    }

    async fn execute(
        &self,
        snapshot: &RepositorySnapshot,
        usage: SharedUsage,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Result<RunOutput> {
        let mut progress = ProgressReporter::new(events);

        // Caching
        progress.report(
            watermark::STARTED,
            format!("Building context cache for {}", snapshot.full_name()),
            None,
        );
        let cache_builder = ContextCacheBuilder::new(self.provider.clone(), self.options.cache_ttl);
        let cached = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(WikiError::Cancelled),
            cached = cache_builder.build(snapshot) => cached?,
        };
        usage.record_cache(&cached);
        progress.report(watermark::CACHE_DONE, "Context cache ready", None);

        // Planning
        progress.enter(PipelineStage::Planning);
        progress.report(watermark::PLANNING_STARTED, "Planning wiki pages", None);
        let planner = WikiPlanner::new(
            self.provider.clone(),
            self.retrier.clone(),
            Arc::clone(&usage),
        );
        let plan = planner
            .plan(&cached.handle, &snapshot.owner, &snapshot.repo, &self.cancel)
            .await?;

        // Scheduling
        progress.enter(PipelineStage::Scheduling);
        let mode = self.options.schedule_mode;
        let execution = DependencyScheduler::schedule(&plan, mode);
        let broken_edges = execution.broken_edges.clone();
        let batches = execution.into_batches();
        progress.report(
            watermark::PLAN_DONE,
            format!(
                "Planned {} pages in {} {}",
                plan.len(),
                batches.len(),
                if mode == ScheduleMode::Sequential { "steps" } else { "levels" }
            ),
            None,
        );

        // Generating
        let generator = PageGenerator::new(
            self.provider.clone(),
            self.retrier.clone(),
            Arc::clone(&usage),
        );
        let total = plan.len();
        let level_count = batches.len();
        let mut completed = 0;
        let mut lookup = PageLookup::new();

        for (index, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(WikiError::Cancelled);
            }

            progress.enter(PipelineStage::Generating {
                level: index + 1,
                of: level_count,
            });
            let titles = batch
                .iter()
                .map(|p| p.title.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            progress.report(
                generation_progress(completed, total),
                format!(
                    "Generating level {} of {} ({} pages)",
                    index + 1,
                    level_count,
                    batch.len()
                ),
                Some(titles),
            );

            let concurrency = match self.options.max_concurrency {
                0 => batch.len(),
                limit => limit.min(batch.len()),
            }
            .max(1);

            let mut level_pages = Vec::with_capacity(batch.len());
            {
                let lookup = &lookup;
                let mut results = stream::iter(batch)
                    .map(|page| {
                        generator.generate(&cached.handle, page, lookup, &plan, &self.cancel)
                    })
                    .buffer_unordered(concurrency);

                while let Some(result) = results.next().await {
                    let page = result?;
                    completed += 1;
                    progress.report(
                        generation_progress(completed, total),
                        format!("Generated {} ({}/{})", page.title, completed, total),
                        Some(page.title.clone()),
                    );
                    level_pages.push(page);
                }
            }

            // Visible to the next level only
            for page in level_pages {
                lookup.insert(page.slug.clone(), page);
            }
        }

        let pages: Vec<GeneratedPage> = plan
            .pages()
            .iter()
            .filter_map(|p| lookup.remove(&p.slug))
            .collect();

        let summary = usage.summary();
        info!(
            pages = pages.len(),
            broken_edges = broken_edges.len(),
            api_calls = summary.api_calls,
            avg_latency_ms = summary.avg_latency_ms as u64,
            "Wiki generation complete"
        );
        progress.finish(format!("Generated {} pages", pages.len()));

        Ok(RunOutput {
            pages,
            broken_edges,
        })
    }
}
