//! Wiki page types
//!
//! Planned pages come out of the planner, generated pages out of the generator.
//! Both are immutable once created.

use serde::{Deserialize, Serialize};

/// A page the planner decided to write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedPage {
    pub title: String,
    /// Unique within a plan
    pub slug: String,
    /// Link target other pages use when cross-referencing this one
    pub url: String,
    /// Free-text generation brief
    pub instructions: String,
    /// Slugs this page builds on
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Higher runs first among otherwise equal pages
    #[serde(default)]
    pub priority: i32,
}

impl PlannedPage {
    pub fn new(title: impl Into<String>, slug: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            title: title.into(),
            url: format!("/{}", slug),
            slug,
            instructions: String::new(),
            depends_on: Vec::new(),
            priority: 0,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn depends_on<I, S>(mut self, slugs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = slugs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Ordered collection of planned pages, unique by slug
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WikiPlan {
    pages: Vec<PlannedPage>,
}

impl WikiPlan {
    /// Build a plan, dropping pages whose slug was already seen
    pub fn new(pages: Vec<PlannedPage>) -> Self {
        let mut plan = Self::default();
        for page in pages {
            if plan.get(&page.slug).is_some() {
                tracing::warn!(slug = %page.slug, "Dropping duplicate page slug from plan");
                continue;
            }
            plan.pages.push(page);
        }
        plan
    }

    pub fn pages(&self) -> &[PlannedPage] {
        &self.pages
    }

    pub fn get(&self, slug: &str) -> Option<&PlannedPage> {
        self.pages.iter().find(|p| p.slug == slug)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// A finished page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPage {
    pub slug: String,
    pub title: String,
    /// Markdown body
    pub content: String,
    pub url: String,
    /// First prose paragraph, at most [`SUMMARY_MAX_CHARS`] characters
    pub summary: String,
}

/// Upper bound on [`GeneratedPage::summary`] length in characters
pub const SUMMARY_MAX_CHARS: usize = 200;

/// Derive a URL-safe slug from a page title
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Getting Started"), "getting-started");
        assert_eq!(slugify("  API / Reference!! "), "api-reference");
        assert_eq!(slugify("v2.0 Notes"), "v2-0-notes");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_plan_drops_duplicate_slugs() {
        let plan = WikiPlan::new(vec![
            PlannedPage::new("Overview", "overview"),
            PlannedPage::new("Overview Again", "overview"),
            PlannedPage::new("Examples", "examples"),
        ]);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.get("overview").unwrap().title, "Overview");
        assert_eq!(plan.pages()[1].slug, "examples");
    }

    #[test]
    fn test_planned_page_wire_format() {
        let page = PlannedPage::new("Examples", "examples")
            .depends_on(["overview"])
            .with_priority(3);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["dependsOn"][0], "overview");
        assert_eq!(json["priority"], 3);
    }
}
