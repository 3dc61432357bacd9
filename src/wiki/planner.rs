//! Page Planner
//!
//! Asks the model, grounded on the cached repository context, which wiki
//! pages to write and how they depend on each other.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::ai::provider::SharedProvider;
use crate::ai::retry::Retrier;
use crate::ai::usage::SharedUsage;
use crate::ai::validation::parse_embedded_json;
use crate::types::{CacheHandle, PlannedPage, Result, WikiError, WikiPlan, slugify};

/// Example page kinds offered to the model as inspiration only
pub const PAGE_ARCHETYPES: &[(&str, &str)] = &[
    ("Overview", "What the project is, who it is for, and how the pieces fit"),
    ("Getting Started", "Installation, configuration and a first successful run"),
    ("Architecture", "Major components, data flow and key design decisions"),
    ("API Reference", "Public interfaces, endpoints or exported functions"),
    ("Configuration", "Every setting, its default and its effect"),
    ("Examples", "Worked usage scenarios built on the other pages"),
    ("Development Guide", "Building, testing and contributing"),
    ("Deployment", "Packaging, environments and operations"),
    ("Troubleshooting", "Common failures and how to resolve them"),
];

/// Plans the wiki for one repository
pub struct WikiPlanner {
    provider: SharedProvider,
    retrier: Retrier,
    usage: SharedUsage,
}

impl WikiPlanner {
    pub fn new(provider: SharedProvider, retrier: Retrier, usage: SharedUsage) -> Self {
        Self {
            provider,
            retrier,
            usage,
        }
    }

    /// One retried model call, parsed into a [`WikiPlan`]
    ///
    /// Formatting problems in the response are [`WikiError::PlanParse`] and
    /// are not retried.
    #[instrument(skip(self, cache, cancel))]
    pub async fn plan(
        &self,
        cache: &CacheHandle,
        owner: &str,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<WikiPlan> {
        let prompt = build_plan_prompt(owner, repo);
        debug!(prompt_chars = prompt.len(), "Requesting wiki plan");

        let response = self
            .retrier
            .retry("plan", cancel, || self.provider.generate(&prompt, Some(cache)))
            .await?;
        self.usage.record_response(&response);

        let plan = parse_plan(&response.text, owner, repo)?;
        info!(pages = plan.len(), "Wiki plan ready");
        Ok(plan)
    }
}

fn build_plan_prompt(owner: &str, repo: &str) -> String {
    let archetypes = PAGE_ARCHETYPES
        .iter()
        .map(|(title, description)| format!("- **{}**: {}", title, description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"
<ROLE>
You are a documentation architect planning a wiki for the repository {owner}/{repo}.
The complete source code is available in the cached context.
</ROLE>

<ARCHETYPES>
Typical pages, for inspiration only. Include only pages the code actually supports
and add project-specific pages where they help.
{archetypes}
</ARCHETYPES>

<TASK>
Plan the wiki pages. For each page give:
- "title": human readable title
- "slug": lowercase, dash separated, unique
- "url": "/{owner}/{repo}/wiki/<slug>"
- "systemPrompt": a brief for the writer of this page
- "dependsOn": slugs of pages whose content this page builds on
- "priority": integer, higher is written first among independent pages

<RULES>
- Dependencies must point at slugs in this plan
- Avoid circular dependencies
- Prefer shallow dependency chains so pages can be written in parallel
</RULES>
</TASK>

<OUTPUT>
Respond with a single JSON object:
{{"pages": [{{"title": "...", "slug": "...", "url": "...", "systemPrompt": "...", "dependsOn": [], "priority": 0}}]}}
</OUTPUT>
"#,
        owner = owner,
        repo = repo,
        archetypes = archetypes,
    )
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    pages: Vec<RawPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPage {
    #[serde(default)]
    title: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, alias = "systemPrompt", alias = "prompt")]
    instructions: String,
    #[serde(default, alias = "depends_on", alias = "dependencies")]
    depends_on: Vec<String>,
    #[serde(default, deserialize_with = "lenient_priority")]
    priority: i32,
}

/// Accept `3`, `3.0` or `"3"`; anything else is priority 0
fn lenient_priority<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let priority = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    };
    Ok(priority.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
}

/// Parse the model's plan response
///
/// Slugs default to the slugified title and URLs to
/// `/{owner}/{repo}/wiki/{slug}`. An empty page list is an error.
pub fn parse_plan(text: &str, owner: &str, repo: &str) -> Result<WikiPlan> {
    let raw: RawPlan = parse_embedded_json(text)?;

    let pages: Vec<PlannedPage> = raw
        .pages
        .into_iter()
        .filter_map(|page| into_planned_page(page, owner, repo))
        .collect();

    if pages.is_empty() {
        return Err(WikiError::PlanParse(
            "plan contains no usable pages".to_string(),
        ));
    }

    Ok(WikiPlan::new(pages))
}

fn into_planned_page(raw: RawPage, owner: &str, repo: &str) -> Option<PlannedPage> {
    // Model-supplied slugs become file names, so they go through slugify too
    let slug = raw
        .slug
        .map(|s| slugify(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slugify(&raw.title));
    if slug.is_empty() {
        warn!(title = %raw.title, "Skipping planned page without title or slug");
        return None;
    }

    let title = if raw.title.trim().is_empty() {
        slug.clone()
    } else {
        raw.title.trim().to_string()
    };
    let url = raw
        .url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| format!("/{}/{}/wiki/{}", owner, repo, slug));
    let depends_on: Vec<String> = raw
        .depends_on
        .into_iter()
        .map(|d| slugify(&d))
        .filter(|d| !d.is_empty())
        .collect();

    Some(
        PlannedPage::new(title, slug)
            .with_url(url)
            .with_instructions(raw.instructions)
            .depends_on(depends_on)
            .with_priority(raw.priority),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::fake::FakeProvider;
    use crate::ai::retry::RetryPolicy;
    use crate::ai::usage::UsageTracker;
    use crate::types::LlmError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const PLAN: &str = r#"Here is the plan:
```json
{"pages": [
  {"title": "Overview", "slug": "overview", "systemPrompt": "Explain the project", "dependsOn": [], "priority": 10},
  {"title": "Getting Started", "url": "/custom/start", "systemPrompt": "Install", "dependsOn": ["overview"], "priority": "5"},
  {"title": "Overview", "slug": "overview", "systemPrompt": "duplicate"}
]}
```"#;

    #[test]
    fn test_parse_plan_fills_defaults() {
        let plan = parse_plan(PLAN, "acme", "rocket").unwrap();
        assert_eq!(plan.len(), 2);

        let overview = plan.get("overview").unwrap();
        assert_eq!(overview.url, "/acme/rocket/wiki/overview");
        assert_eq!(overview.instructions, "Explain the project");
        assert_eq!(overview.priority, 10);

        let start = plan.get("getting-started").unwrap();
        assert_eq!(start.url, "/custom/start");
        assert_eq!(start.depends_on, vec!["overview"]);
        assert_eq!(start.priority, 5);
    }

    #[test]
    fn test_parse_plan_normalizes_path_like_slugs() {
        let text = r#"{"pages": [
            {"title": "Escaped", "slug": "../x"},
            {"title": "Intro", "slug": "a/b", "dependsOn": ["../X"]},
            {"title": "Dots Only", "slug": "../.."}
        ]}"#;
        let plan = parse_plan(text, "acme", "rocket").unwrap();
        let slugs: Vec<&str> = plan.pages().iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["x", "a-b", "dots-only"]);
        assert_eq!(plan.get("a-b").unwrap().depends_on, vec!["x"]);
        assert_eq!(plan.get("x").unwrap().url, "/acme/rocket/wiki/x");
    }

    #[test]
    fn test_parse_plan_without_fence() {
        let text = r#"Sure. {"pages": [{"title": "API Reference", "instructions": "List endpoints"}]} Done."#;
        let plan = parse_plan(text, "acme", "rocket").unwrap();
        assert_eq!(plan.pages()[0].slug, "api-reference");
        assert_eq!(plan.pages()[0].instructions, "List endpoints");
    }

    #[test]
    fn test_parse_plan_errors() {
        assert!(matches!(
            parse_plan("I cannot help with that", "a", "b"),
            Err(WikiError::PlanParse(_))
        ));
        assert!(matches!(
            parse_plan(r#"{"pages": []}"#, "a", "b"),
            Err(WikiError::PlanParse(_))
        ));
        assert!(matches!(
            parse_plan(r#"{"pages": [{"title": "***"}]}"#, "a", "b"),
            Err(WikiError::PlanParse(_))
        ));
    }

    #[test]
    fn test_prompt_mentions_archetypes_and_contract() {
        let prompt = build_plan_prompt("acme", "rocket");
        assert!(prompt.contains("acme/rocket"));
        assert!(prompt.contains("Getting Started"));
        assert!(prompt.contains("\"dependsOn\""));
        assert!(prompt.contains("/acme/rocket/wiki/<slug>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_retries_rate_limit_but_not_parse_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let provider = Arc::new(FakeProvider::new(move |_| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(LlmError::rate_limited("429 RESOURCE_EXHAUSTED").into()),
                _ => Ok("no json here".to_string()),
            }
        }));
        let usage = Arc::new(UsageTracker::new());
        let planner = WikiPlanner::new(
            provider,
            Retrier::new(RetryPolicy::default()),
            usage.clone(),
        );

        let result = planner
            .plan(
                &CacheHandle::new("cachedContents/x"),
                "acme",
                "rocket",
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(WikiError::PlanParse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(usage.summary().api_calls, 1);
    }
}
