//! Generate Command
//!
//! Runs the wiki pipeline over a repository snapshot and writes the pages.
//!
//! Usage:
//!   wikiforge generate --snapshot repo.json [--output DIR] [--mode leveled]
//!                      [--model M] [--concurrency N] [--json]

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::pin::pin;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::ai::provider::{SharedProvider, create_provider};
use crate::ai::{Retrier, Usage};
use crate::cli::progress::{ConsoleRenderer, render_ndjson};
use crate::cli::ui::Output;
use crate::config::{Config, ConfigLoader};
use crate::types::{GeneratedPage, RepositorySnapshot, Result, WikiError};
use crate::wiki::{BrokenEdge, ProgressEvent, ScheduleMode, WikiPipeline};

/// CLI overrides for one generate run
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Repository snapshot JSON
    pub snapshot: PathBuf,
    pub output: Option<PathBuf>,
    pub mode: Option<ScheduleMode>,
    pub model: Option<String>,
    pub concurrency: Option<usize>,
    /// Print NDJSON events instead of styled progress
    pub json: bool,
}

/// Contents of `wiki.json`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiManifest {
    pub repository: String,
    pub generated_at: DateTime<Utc>,
    pub pages: Vec<GeneratedPage>,
    pub usage: Usage,
    pub broken_edges: Vec<BrokenEdge>,
}

pub fn run(options: GenerateOptions) -> Result<()> {
    let mut config = ConfigLoader::load()?;
    apply_overrides(&mut config, &options);
    config.validate()?;

    let snapshot = load_snapshot(&options.snapshot)?;
    let provider = create_provider(&config.llm.provider_config())?;
    info!(
        "Using LLM provider: {} ({})",
        provider.name(),
        provider.model()
    );

    let output_dir = options
        .output
        .clone()
        .unwrap_or_else(|| config.output.dir.clone());
    let output = Output::new().quiet(options.json);
    output.header(&format!("Generating wiki for {}", snapshot.full_name()));
    output.field("Model", provider.model());
    output.field("Mode", config.pipeline.schedule_mode);
    output.field("Files", snapshot.files.len());
    output.field("Output", output_dir.display());

    let rt = Runtime::new()?;
    let json = options.json;
    let manifest = rt.block_on(async {
        let pipeline = build_pipeline(provider, &config);
        let cancel = pipeline.cancellation_token();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling wiki generation");
                cancel.cancel();
            }
        });

        let mut renderer = ConsoleRenderer::new();
        let mut stdout = std::io::stdout();
        let result = drive(&pipeline, &snapshot, |event| {
            let line = if json {
                render_ndjson(event)?
            } else {
                renderer.render(event)
            };
            writeln!(stdout, "{}", line)?;
            Ok(())
        })
        .await;

        interrupt.abort();
        result
    })?;

    write_wiki(&output_dir, &manifest)?;

    output.success(&format!(
        "Wrote {} pages to {}",
        manifest.pages.len(),
        output_dir.display()
    ));
    output.info(&usage_line(&manifest.usage));
    Ok(())
}

fn apply_overrides(config: &mut Config, options: &GenerateOptions) {
    if let Some(mode) = options.mode {
        config.pipeline.schedule_mode = mode;
    }
    if let Some(model) = &options.model {
        config.llm.model = model.clone();
    }
    if let Some(concurrency) = options.concurrency {
        config.pipeline.max_concurrency = concurrency;
    }
}

fn load_snapshot(path: &Path) -> Result<RepositorySnapshot> {
    let content = fs::read_to_string(path).map_err(|e| {
        WikiError::Config(format!("Cannot read snapshot {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&content)?)
}

fn build_pipeline(provider: SharedProvider, config: &Config) -> WikiPipeline {
    WikiPipeline::new(provider, config.pipeline.options())
        .with_retrier(Retrier::new(config.retry.policy()))
}

/// Consume a run, handing every event to `on_event`, and return the result
async fn drive<F>(
    pipeline: &WikiPipeline,
    snapshot: &RepositorySnapshot,
    mut on_event: F,
) -> Result<WikiManifest>
where
    F: FnMut(&ProgressEvent) -> Result<()>,
{
    let mut events = pin!(pipeline.run(snapshot));

    while let Some(event) = events.next().await {
        on_event(&event)?;
        match event {
            ProgressEvent::Complete {
                pages,
                usage,
                broken_edges,
            } => {
                return Ok(WikiManifest {
                    repository: snapshot.full_name(),
                    generated_at: Utc::now(),
                    pages,
                    usage,
                    broken_edges,
                });
            }
            ProgressEvent::Error { message } => return Err(WikiError::RunFailed(message)),
            _ => {}
        }
    }

    Err(WikiError::RunFailed(
        "event stream ended without a result".to_string(),
    ))
}

/// Write `<slug>.md` per page plus `wiki.json`
///
/// Every slug is checked before anything is written.
fn write_wiki(dir: &Path, manifest: &WikiManifest) -> Result<()> {
    let files = manifest
        .pages
        .iter()
        .map(|page| Ok((page_path(dir, &page.slug)?, &page.content)))
        .collect::<Result<Vec<_>>>()?;

    fs::create_dir_all(dir)?;
    for (path, content) in files {
        fs::write(&path, content)?;
    }
    fs::write(
        dir.join("wiki.json"),
        serde_json::to_string_pretty(manifest)?,
    )?;
    info!(
        "Wrote {} pages and wiki.json to {}",
        manifest.pages.len(),
        dir.display()
    );
    Ok(())
}

/// `dir/<slug>.md`, provided the slug is a single plain path component
fn page_path(dir: &Path, slug: &str) -> Result<PathBuf> {
    let mut components = Path::new(slug).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(dir.join(format!("{}.md", slug))),
        _ => Err(WikiError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Refusing to write page with unsafe slug {:?}", slug),
        ))),
    }
}

fn usage_line(usage: &Usage) -> String {
    format!(
        "Tokens: {} (input: {}, output: {}, cached: {})",
        usage.total_tokens, usage.input_tokens, usage.output_tokens, usage.cache_tokens
    )
}
