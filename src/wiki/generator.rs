//! Page Generator
//!
//! Writes one planned page. The prompt carries the page brief, a directory of
//! every planned page for cross-links, and the full text of the page's direct
//! dependencies so facts are built on rather than re-derived.

use std::collections::HashMap;
use std::fmt::Write as _;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::ai::provider::SharedProvider;
use crate::ai::retry::Retrier;
use crate::ai::usage::SharedUsage;
use crate::ai::validation::unwrap_whole_fence;
use crate::types::{
    CacheHandle, GeneratedPage, PlannedPage, Result, SUMMARY_MAX_CHARS, WikiError, WikiPlan,
};

/// Generated pages by slug
pub type PageLookup = HashMap<String, GeneratedPage>;

/// Generates the content of single pages
pub struct PageGenerator {
    provider: SharedProvider,
    retrier: Retrier,
    usage: SharedUsage,
}

impl PageGenerator {
    pub fn new(provider: SharedProvider, retrier: Retrier, usage: SharedUsage) -> Self {
        Self {
            provider,
            retrier,
            usage,
        }
    }

    /// Generate `page`, reading dependency content from `generated`
    ///
    /// Any failure, after retries, is wrapped in [`WikiError::Generation`].
    #[instrument(skip_all, fields(page = %page.slug))]
    pub async fn generate(
        &self,
        cache: &CacheHandle,
        page: &PlannedPage,
        generated: &PageLookup,
        plan: &WikiPlan,
        cancel: &CancellationToken,
    ) -> Result<GeneratedPage> {
        let prompt = build_page_prompt(page, generated, plan);
        debug!(prompt_chars = prompt.len(), "Generating page");

        let operation = format!("generate:{}", page.slug);
        let response = self
            .retrier
            .retry(&operation, cancel, || {
                self.provider.generate(&prompt, Some(cache))
            })
            .await
            .map_err(|e| match e {
                WikiError::Cancelled => e,
                other => WikiError::generation(&page.slug, other),
            })?;
        self.usage.record_response(&response);

        let content = clean_markdown(&response.text);
        let summary = summarize(&content, &page.title);

        Ok(GeneratedPage {
            slug: page.slug.clone(),
            title: page.title.clone(),
            content,
            url: page.url.clone(),
            summary,
        })
    }
}

/// Assemble the generation prompt for one page
pub fn build_page_prompt(page: &PlannedPage, generated: &PageLookup, plan: &WikiPlan) -> String {
    let mut directory = String::new();
    for planned in plan.pages() {
        let _ = writeln!(directory, "- [{}]({})", planned.title, planned.url);
    }

    let mut dependencies = String::new();
    for dep in page.depends_on.iter().filter_map(|slug| generated.get(slug)) {
        let _ = write!(
            dependencies,
            "<PAGE title=\"{}\" url=\"{}\">\n{}\n</PAGE>\n\n",
            dep.title, dep.url, dep.content
        );
    }
    if dependencies.is_empty() {
        dependencies.push_str("(none)\n");
    }

    let brief = if page.instructions.trim().is_empty() {
        format!("Write the \"{}\" page for this repository.", page.title)
    } else {
        page.instructions.trim().to_string()
    };

    format!(
        r#"
<ROLE>
You are a technical writer producing one page of a repository wiki.
The complete source code is available in the cached context.
</ROLE>

<PAGE_BRIEF>
Title: {title}
URL: {url}

{brief}
</PAGE_BRIEF>

<WIKI_DIRECTORY>
Every page in this wiki. Link to them with markdown links using these URLs.
{directory}</WIKI_DIRECTORY>

<DEPENDENCIES>
Pages this one builds on. Reuse their facts and link to them instead of repeating them.
{dependencies}</DEPENDENCIES>

<RULES>
- Only describe what exists in the code
- Start with a level-one heading containing the page title
- Return clean markdown only, no surrounding code fence and no commentary
</RULES>
"#,
        title = page.title,
        url = page.url,
        brief = brief,
        directory = directory,
        dependencies = dependencies,
    )
}

/// Strip a fence wrapping the whole response
pub fn clean_markdown(text: &str) -> String {
    unwrap_whole_fence(text, &["markdown", "md"])
        .unwrap_or(text)
        .trim()
        .to_string()
}

/// First paragraph that is neither a heading nor a code fence, capped at
/// [`SUMMARY_MAX_CHARS`]
///
/// Falls back to `title` when the page has no prose paragraph.
pub fn summarize(content: &str, title: &str) -> String {
    let paragraph = content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .find(|p| !p.starts_with('#') && !p.starts_with("```"));

    let Some(paragraph) = paragraph else {
        return title.to_string();
    };

    let flat = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SUMMARY_MAX_CHARS {
        return flat;
    }

    let cut: String = flat.chars().take(SUMMARY_MAX_CHARS - 3).collect();
    let cut = match cut.rfind(' ') {
        Some(space) if space > SUMMARY_MAX_CHARS / 2 => cut[..space].to_string(),
        _ => cut,
    };
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::fake::FakeProvider;
    use crate::ai::retry::RetryPolicy;
    use crate::ai::usage::UsageTracker;
    use crate::types::LlmError;
    use std::sync::Arc;

    fn plan() -> WikiPlan {
        WikiPlan::new(vec![
            PlannedPage::new("Overview", "overview").with_url("/acme/rocket/wiki/overview"),
            PlannedPage::new("Getting Started", "getting-started")
                .with_url("/acme/rocket/wiki/getting-started")
                .with_instructions("Explain installation")
                .depends_on(["overview", "missing"]),
        ])
    }

    fn overview_page() -> GeneratedPage {
        GeneratedPage {
            slug: "overview".to_string(),
            title: "Overview".to_string(),
            content: "# Overview\n\nRocket launches OVERVIEW-FACT.".to_string(),
            url: "/acme/rocket/wiki/overview".to_string(),
            summary: "Rocket launches OVERVIEW-FACT.".to_string(),
        }
    }

    #[test]
    fn test_prompt_sections() {
        let plan = plan();
        let mut lookup = PageLookup::new();
        lookup.insert("overview".to_string(), overview_page());

        let prompt = build_page_prompt(plan.get("getting-started").unwrap(), &lookup, &plan);
        assert!(prompt.contains("Explain installation"));
        assert!(prompt.contains("- [Overview](/acme/rocket/wiki/overview)"));
        assert!(prompt.contains("- [Getting Started](/acme/rocket/wiki/getting-started)"));
        assert!(prompt.contains("OVERVIEW-FACT"));
        assert!(prompt.contains("no surrounding code fence"));
    }

    #[test]
    fn test_prompt_without_dependencies() {
        let plan = plan();
        let prompt = build_page_prompt(plan.get("overview").unwrap(), &PageLookup::new(), &plan);
        assert!(prompt.contains("(none)"));
        assert!(prompt.contains("Write the \"Overview\" page"));
    }

    #[test]
    fn test_clean_markdown_unwraps_fence() {
        assert_eq!(clean_markdown("```markdown\n# A\n\nB\n```"), "# A\n\nB");
        assert_eq!(clean_markdown("  # A\n\nB  "), "# A\n\nB");
    }

    #[test]
    fn test_summarize() {
        assert_eq!(
            summarize("# Title\n\n## Sub\n\nFirst   para\nwraps.\n\nSecond.", "T"),
            "First para wraps."
        );
        assert_eq!(summarize("# Only headings\n\n## More", "Fallback"), "Fallback");
        assert_eq!(
            summarize("# Usage\n\n```rust\nlaunch();\n```\n\nCall launch once.", "T"),
            "Call launch once."
        );

        let long = format!("# T\n\n{}", "word ".repeat(100));
        let summary = summarize(&long, "T");
        assert!(summary.chars().count() <= SUMMARY_MAX_CHARS);
        assert!(summary.ends_with("..."));
    }

    #[tokio::test]
    async fn test_generate_page() {
        let provider = Arc::new(FakeProvider::new(|_| {
            Ok("```markdown\n# Getting Started\n\nInstall it.\n```".to_string())
        }));
        let usage = Arc::new(UsageTracker::new());
        let generator = PageGenerator::new(provider.clone(), Retrier::default(), usage.clone());
        let plan = plan();
        let mut lookup = PageLookup::new();
        lookup.insert("overview".to_string(), overview_page());

        let page = generator
            .generate(
                &CacheHandle::new("cachedContents/x"),
                plan.get("getting-started").unwrap(),
                &lookup,
                &plan,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(page.content, "# Getting Started\n\nInstall it.");
        assert_eq!(page.summary, "Install it.");
        assert_eq!(page.url, "/acme/rocket/wiki/getting-started");
        assert!(provider.prompts()[0].contains("OVERVIEW-FACT"));
        assert_eq!(usage.usage().output_tokens, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_failure_names_page() {
        let provider = Arc::new(FakeProvider::new(|_| {
            Err(LlmError::rate_limited("429 RESOURCE_EXHAUSTED").into())
        }));
        let generator = PageGenerator::new(
            provider.clone(),
            Retrier::new(RetryPolicy::default().with_max_retries(1)),
            Arc::new(UsageTracker::new()),
        );
        let plan = plan();

        let err = generator
            .generate(
                &CacheHandle::new("cachedContents/x"),
                plan.get("overview").unwrap(),
                &PageLookup::new(),
                &plan,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WikiError::Generation { ref page, .. } if page == "overview"));
        assert_eq!(provider.prompts().len(), 2);
    }
}
