//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/wikiforge/config.toml)
//! 3. Project config (.wikiforge/config.toml)
//! 4. Environment variables (WIKIFORGE_* prefix, `__` between sections)

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{Result, WikiError};

const ENV_PREFIX: &str = "WIKIFORGE_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_layers(
            Self::global_config_path().as_deref(),
            &Self::project_config_path(),
        )
    }

    /// Resolution chain with explicit file locations
    pub fn load_layers(global: Option<&Path>, project: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(project));
        }

        // WIKIFORGE_LLM__MODEL -> llm.model
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment
            .extract()
            .map_err(|e| WikiError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/wikiforge/ on Linux)
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "wikiforge").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".wikiforge")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Render the effective configuration as TOML or JSON
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| WikiError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write the default global config, returning its path
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            WikiError::Config("Cannot determine global config directory".to_string())
        })?;
        Self::write_default(&global_dir.join("config.toml"), force)
    }

    /// Write the default project config, returning its path
    pub fn init_project(force: bool) -> Result<PathBuf> {
        Self::write_default(&Self::project_config_path(), force)
    }

    fn write_default(path: &Path, force: bool) -> Result<PathBuf> {
        if path.exists() && !force {
            info!("Config exists: {}", path.display());
            return Err(WikiError::Config(format!(
                "Config already exists: {} (use --force to overwrite)",
                path.display()
            )));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, Self::default_config())?;
        info!("Created config: {}", path.display());
        Ok(path.to_path_buf())
    }

    /// Default config file content (TOML)
    fn default_config() -> &'static str {
        r#"# wikiforge configuration
# Project settings in .wikiforge/config.toml override ~/.config/wikiforge/config.toml.
# Environment variables override both, e.g. WIKIFORGE_LLM__MODEL=gemini-2.5-pro

version = "1.0"

[llm]
provider = "gemini"
model = "gemini-2.5-flash"
timeout_secs = 300
temperature = 0.2
max_output_tokens = 8192
# api_key is read from GEMINI_API_KEY when not set here

[retry]
max_retries = 3
base_delay_ms = 1000
max_delay_secs = 60
jitter = false

[pipeline]
schedule_mode = "leveled"
heartbeat_interval_secs = 15
max_concurrency = 0
cache_ttl_secs = 3600

[output]
dir = "wiki"
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::ScheduleMode;
    use figment::Jail;

    #[test]
    fn test_defaults_without_files() {
        Jail::expect_with(|jail| {
            let project = jail.directory().join(".wikiforge/config.toml");
            let config = ConfigLoader::load_layers(None, &project).unwrap();
            assert_eq!(config.version, "1.0");
            assert_eq!(config.llm.provider, "gemini");
            Ok(())
        });
    }

    #[test]
    fn test_project_overrides_global() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "global.toml",
                "[llm]\nmodel = \"global-model\"\n[retry]\nmax_retries = 7\n",
            )?;
            jail.create_dir(".wikiforge")?;
            jail.create_file(
                ".wikiforge/config.toml",
                "[llm]\nmodel = \"project-model\"\n[pipeline]\nschedule_mode = \"sequential\"\n",
            )?;

            let config = ConfigLoader::load_layers(
                Some(Path::new("global.toml")),
                Path::new(".wikiforge/config.toml"),
            )
            .unwrap();

            assert_eq!(config.llm.model, "project-model");
            assert_eq!(config.retry.max_retries, 7);
            assert_eq!(config.pipeline.schedule_mode, ScheduleMode::Sequential);
            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.set_env("WIKIFORGE_LLM__MODEL", "env-model");
            jail.set_env("WIKIFORGE_PIPELINE__MAX_CONCURRENCY", "4");

            let config =
                ConfigLoader::load_layers(None, Path::new(".wikiforge/config.toml")).unwrap();
            assert_eq!(config.llm.model, "env-model");
            assert_eq!(config.pipeline.max_concurrency, 4);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.toml", "[pipeline]\nheartbeat_interval_secs = 0\n")?;
            let result = ConfigLoader::load_layers(None, Path::new("bad.toml"));
            assert!(matches!(result, Err(WikiError::Config(_))));
            Ok(())
        });
    }

    #[test]
    fn test_default_config_file_parses() {
        Jail::expect_with(|jail| {
            jail.create_file("default.toml", ConfigLoader::default_config())?;
            let config = ConfigLoader::load_layers(None, Path::new("default.toml")).unwrap();
            assert_eq!(config.pipeline.heartbeat_interval_secs, 15);
            assert_eq!(config.output.dir, PathBuf::from("wiki"));
            Ok(())
        });
    }

    #[test]
    fn test_write_default_respects_force() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");

        ConfigLoader::write_default(&path, false).unwrap();
        assert!(path.exists());
        assert!(ConfigLoader::write_default(&path, false).is_err());
        assert!(ConfigLoader::write_default(&path, true).is_ok());
    }

    #[test]
    fn test_render_formats() {
        let config = Config::default();
        let toml = ConfigLoader::render(&config, false).unwrap();
        assert!(toml.contains("[pipeline]"));
        let json = ConfigLoader::render(&config, true).unwrap();
        assert!(json.contains("\"schedule_mode\": \"leveled\""));
    }
}
