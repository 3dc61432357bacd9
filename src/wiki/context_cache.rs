//! Context Cache Builder
//!
//! Renders the whole repository snapshot into one document and registers it
//! with the provider's context cache. Later planner and generator calls only
//! send the cache handle plus a short prompt.

use std::fmt::Write as _;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::ai::provider::{CachedContext, SharedProvider};
use crate::types::{RepositorySnapshot, Result, WikiError};

/// Hex characters of the document digest used in the display name
const DIGEST_PREFIX_LEN: usize = 12;

/// Registers repository context with the model
pub struct ContextCacheBuilder {
    provider: SharedProvider,
    ttl: Duration,
}

impl ContextCacheBuilder {
    pub fn new(provider: SharedProvider, ttl: Duration) -> Self {
        Self { provider, ttl }
    }

    /// Build the context document and register it
    ///
    /// Any provider failure is returned as [`WikiError::CacheCreation`].
    #[instrument(skip(self, snapshot), fields(repo = %snapshot.full_name(), files = snapshot.files.len()))]
    pub async fn build(&self, snapshot: &RepositorySnapshot) -> Result<CachedContext> {
        let document = build_context_document(snapshot);
        let display_name = display_name(snapshot, &document);

        info!(
            bytes = document.len(),
            display_name = %display_name,
            "Registering repository context"
        );

        let cached = self
            .provider
            .create_cache(&document, self.ttl, &display_name)
            .await
            .map_err(|e| WikiError::CacheCreation(e.to_string()))?;

        info!(
            handle = %cached.handle,
            expires_at = %cached.expires_at,
            cached_tokens = cached.usage.cached_tokens,
            "Context cache ready"
        );
        Ok(cached)
    }
}

/// Format the snapshot as one markdown document
pub fn build_context_document(snapshot: &RepositorySnapshot) -> String {
    let mut doc = String::with_capacity(snapshot.total_bytes() as usize + 4096);

    let _ = writeln!(doc, "# Repository: {}\n", snapshot.full_name());
    if let Some(description) = &snapshot.description {
        let _ = writeln!(doc, "**Description**: {}", description);
    }
    if let Some(language) = &snapshot.primary_language {
        let _ = writeln!(doc, "**Primary Language**: {}", language);
    }
    let _ = writeln!(
        doc,
        "**Files**: {} ({} bytes)\n",
        snapshot.files.len(),
        snapshot.total_bytes()
    );

    if let Some(readme) = &snapshot.readme {
        doc.push_str("## README\n\n");
        doc.push_str(readme.trim_end());
        doc.push_str("\n\n");
    }

    if let Some(manifest) = &snapshot.package_manifest {
        doc.push_str("## Package Manifest\n\n```\n");
        doc.push_str(manifest.trim_end());
        doc.push_str("\n```\n\n");
    }

    doc.push_str("## Source Files\n\n");
    for file in &snapshot.files {
        let language = if file.language.is_empty() {
            "text"
        } else {
            file.language.as_str()
        };
        let _ = writeln!(
            doc,
            "### File: {} (language: {}, size: {} bytes)\n",
            file.path, language, file.size
        );
        let fence = fence_for(&file.content);
        let _ = writeln!(doc, "{}{}", fence, file.language);
        doc.push_str(file.content.trim_end());
        let _ = writeln!(doc, "\n{}\n", fence);
    }

    doc
}

/// Backtick fence longer than any run inside `content`
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for ch in content.chars() {
        if ch == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

fn display_name(snapshot: &RepositorySnapshot, document: &str) -> String {
    let hex = format!("{:x}", Sha256::digest(document.as_bytes()));
    format!(
        "wiki-{}-{}-{}",
        snapshot.owner,
        snapshot.repo,
        &hex[..DIGEST_PREFIX_LEN]
    )
}
