//! Config Command
//!
//! Manage wikiforge configuration.
//!
//! Usage:
//!   wikiforge config show [-f json]
//!   wikiforge config path
//!   wikiforge config init [-g] [--force]

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Show the merged effective configuration
pub fn show(format: &str) -> Result<()> {
    let config = ConfigLoader::load()?;
    println!("{}", ConfigLoader::render(&config, format == "json")?);
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    let output = Output::new();
    output.section("Configuration Paths");

    match ConfigLoader::global_config_path() {
        Some(global) => output.field(
            "Global",
            format!("{} {}", global.display(), exists_marker(global.exists())),
        ),
        None => output.field("Global", "(cannot determine config directory)"),
    }

    let project = ConfigLoader::project_config_path();
    output.field(
        "Project",
        format!("{} {}", project.display(), exists_marker(project.exists())),
    );
    output.field("Env", "WIKIFORGE_<SECTION>__<KEY> (e.g. WIKIFORGE_LLM__MODEL)");
    Ok(())
}

fn exists_marker(exists: bool) -> &'static str {
    if exists { "(exists)" } else { "(not found)" }
}

/// Initialize global or project configuration
pub fn init(global: bool, force: bool) -> Result<()> {
    let path = if global {
        ConfigLoader::init_global(force)?
    } else {
        ConfigLoader::init_project(force)?
    };

    let scope = if global { "global" } else { "project" };
    let output = Output::new();
    output.success(&format!("Initialized {} configuration", scope));
    output.field("Config", path.display());
    Ok(())
}
