//! Configuration Loader
//!
//! Environment-aware loading on top of the `config` crate. A base TOML file is
//! optionally followed by an environment overlay (`autoassign.production.toml`
//! next to `autoassign.toml`) and then by `AUTOASSIGN__SECTION__KEY` variables.

use ::config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::AutoAssignConfig;

/// Prefix for environment overrides (`AUTOASSIGN__BUILDER__LIMIT=25`)
pub const ENV_PREFIX: &str = "AUTOASSIGN";

/// Loaded, validated configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: AutoAssignConfig,
    environment: String,
    source_files: Vec<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load(path: Option<&Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with(path, &Self::detect_environment(), ENV_PREFIX)
    }

    /// Load with an explicit environment name and variable prefix.
    ///
    /// Tests use a unique prefix so they never observe each other's variables.
    pub fn load_with(
        path: Option<&Path>,
        environment: &str,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let mut builder = Config::builder();
        let mut source_files = Vec::new();

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigurationError::FileNotFound(path.display().to_string()));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            source_files.push(path.to_path_buf());

            if let Some(overlay) = Self::environment_overlay(path, environment) {
                debug!(overlay = %overlay.display(), "Applying environment configuration overlay");
                builder = builder.add_source(File::from(overlay.as_path()).format(FileFormat::Toml));
                source_files.push(overlay);
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AutoAssignConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            environment = %environment,
            files = source_files.len(),
            regeneration_policy = ?config.regeneration.policy,
            sweep_interval_ms = config.lifecycle.sweep_interval_ms,
            "⚙️ CONFIG: Auto-assign configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            source_files,
        }))
    }

    pub fn config(&self) -> &AutoAssignConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_files(&self) -> &[PathBuf] {
        &self.source_files
    }

    /// Current environment name, lowercased
    pub fn detect_environment() -> String {
        env::var("AUTOASSIGN_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn environment_overlay(base: &Path, environment: &str) -> Option<PathBuf> {
        let stem = base.file_stem()?.to_str()?;
        let overlay = base.with_file_name(format!("{stem}.{environment}.toml"));
        overlay.is_file().then_some(overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::RegenerationPolicy;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let manager = ConfigManager::load_with(None, "test", "AUTOASSIGN_T_DEFAULTS").unwrap();
        assert_eq!(manager.config(), &AutoAssignConfig::default());
        assert!(manager.source_files().is_empty());
    }

    #[test]
    fn test_toml_file_and_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_file(
            dir.path(),
            "autoassign.toml",
            r#"
[builder]
limit = 20

[builder.weights]
rating = 2.0
earnings_balance = 0.5

[regeneration]
policy = "supersede"
"#,
        );
        write_file(
            dir.path(),
            "autoassign.test.toml",
            "[lifecycle]\nsweep_interval_ms = 500\n",
        );

        let manager = ConfigManager::load_with(Some(&base), "test", "AUTOASSIGN_T_FILE").unwrap();
        let config = manager.config();
        assert_eq!(config.builder.limit, 20);
        assert_eq!(config.builder.weights.rating, 2.0);
        assert_eq!(config.builder.weights.earnings_balance, 0.5);
        assert_eq!(config.regeneration.policy, RegenerationPolicy::Supersede);
        assert_eq!(config.lifecycle.sweep_interval_ms, 500);
        assert_eq!(manager.source_files().len(), 2);
    }

    #[test]
    fn test_environment_variables_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_file(dir.path(), "autoassign.toml", "[query]\ndefault_page_size = 5\n");

        env::set_var("AUTOASSIGN_T_ENV__QUERY__DEFAULT_PAGE_SIZE", "25");
        let result = ConfigManager::load_with(Some(&base), "test", "AUTOASSIGN_T_ENV");
        env::remove_var("AUTOASSIGN_T_ENV__QUERY__DEFAULT_PAGE_SIZE");

        assert_eq!(result.unwrap().config().query.default_page_size, 25);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_file(dir.path(), "autoassign.toml", "[builder]\nlimit = 0\n");
        let result = ConfigManager::load_with(Some(&base), "test", "AUTOASSIGN_T_INVALID");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_missing_file_reported() {
        let result = ConfigManager::load_with(
            Some(Path::new("/nonexistent/autoassign.toml")),
            "test",
            "AUTOASSIGN_T_MISSING",
        );
        assert!(matches!(result, Err(ConfigurationError::FileNotFound(_))));
    }
}
