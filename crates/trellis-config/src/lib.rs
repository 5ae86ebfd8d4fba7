//! Engine configuration and logging setup.
//!
//! Configuration is read from TOML. Every key is optional; missing keys fall back to the
//! defaults documented on [`EngineConfig`].

use std::path::{Path, PathBuf};
use std::sync::Once;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis_project::JavaVersion;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // Keep the message without the source snippet.
        ConfigError::Toml(err.message().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// File name of the module descriptor probed in each source root.
    pub descriptor_file_name: String,

    /// Directory of endorsed override jars, relative to the project root unless absolute.
    pub endorsed_dir: PathBuf,

    /// Where content-hash named copies of unidentified override jars are kept.
    ///
    /// Relative to the project root unless absolute. Defaults to
    /// `target/.trellis/endorsed-cache`.
    pub scratch_dir: Option<PathBuf>,

    /// Maven-layout repository used to map identified overrides to canonical files.
    ///
    /// Defaults to `$HOME/.m2/repository`.
    pub local_repository: Option<PathBuf>,

    /// Path suffix identifying the optional platform extension library.
    pub extension_library: Option<PathBuf>,

    /// Minimum source level and toolchain release that enable module-path composition.
    pub module_release: JavaVersion,

    /// Schedule content-hash lookups against the remote artifact index.
    pub background_lookups: bool,

    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            descriptor_file_name: "module-info.java".to_string(),
            endorsed_dir: PathBuf::from("target/endorsed"),
            scratch_dir: None,
            local_repository: None,
            extension_library: Some(PathBuf::from("ext/jfxrt.jar")),
            module_release: JavaVersion::JAVA_9,
            background_lookups: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn endorsed_dir_for(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.endorsed_dir)
    }

    pub fn scratch_dir_for(&self, project_root: &Path) -> PathBuf {
        match &self.scratch_dir {
            Some(dir) => project_root.join(dir),
            None => project_root.join("target/.trellis/endorsed-cache"),
        }
    }

    pub fn local_repository(&self) -> Option<PathBuf> {
        self.local_repository.clone().or_else(default_local_repository)
    }
}

fn default_local_repository() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)?;
    Some(home.join(".m2/repository"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    pub level: String,

    /// Emit logs in JSON format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return "info".to_string();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_string(),
            "debug" => "debug".to_string(),
            "info" => "info".to_string(),
            "warn" | "warning" => "warn".to_string(),
            "error" => "error".to_string(),
            _ => trimmed.to_string(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter; `RUST_LOG` is merged in when set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        self.filter_with_env(std::env::var("RUST_LOG").ok().as_deref())
    }

    fn filter_with_env(&self, rust_log: Option<&str>) -> tracing_subscriber::EnvFilter {
        let env_directives = rust_log
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        match env_directives {
            Some(env_directives) => {
                let combined = format!(
                    "{},{env_directives}",
                    Self::normalize_level_directives(&self.level)
                );
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

static TRACING_INIT: Once = Once::new();

/// Install a global `fmt` subscriber writing to stderr.
///
/// Only the first call has an effect. An already-installed global subscriber is left alone.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();
        let result = if config.json {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
        };
        if let Err(err) = result {
            tracing::debug!(
                target = "trellis.config",
                error = %err,
                "global tracing subscriber already installed"
            );
        }
    });
}
