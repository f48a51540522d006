//! Configuration for the schema compiler
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schemac.toml)
//! - Environment variables (SCHEMAC__*)
//!
//! ## Example config file (schemac.toml):
//! ```toml
//! [compiler]
//! schema_dir = "./schemas"
//! strict_fields = true
//! skip_prefixes = ["target/", "old/"]
//!
//! [export]
//! output_format = "pretty"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::loader::LoadConfig;

/// Main configuration for `schemac`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Module loading and preparation
    #[serde(default)]
    pub compiler: CompilerSection,

    /// Model export settings
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerSection {
    /// Directory holding `<database>.toml` / `<database>.json` modules
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,

    /// Fail on malformed field declarations instead of skipping them
    #[serde(default = "default_true")]
    pub strict_fields: bool,

    /// Only load module files under these path prefixes
    #[serde(default)]
    pub include_prefixes: Vec<String>,

    /// Never load module files under these path prefixes
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output format (pretty or compact)
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

// Default value functions
fn default_schema_dir() -> PathBuf {
    PathBuf::from("schemas")
}

fn default_true() -> bool {
    true
}

fn default_skip_prefixes() -> Vec<String> {
    LoadConfig::default().skip_prefixes
}

impl Default for CompilerSection {
    fn default() -> Self {
        Self {
            schema_dir: default_schema_dir(),
            strict_fields: true,
            include_prefixes: Vec::new(),
            skip_prefixes: default_skip_prefixes(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Pretty,
        }
    }
}

impl CompilerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding an explicit file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "schemac.toml",
            ".schemac.toml",
            "config/schemac.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "kvschema", "schemac") {
            let xdg_config = config_dir.config_dir().join("schemac.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMAC__COMPILER__STRICT_FIELDS=false and friends
        builder = builder.add_source(
            Environment::with_prefix("SCHEMAC")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Schema directory, resolved against the current directory
    pub fn schema_dir(&self) -> PathBuf {
        if self.compiler.schema_dir.is_absolute() {
            self.compiler.schema_dir.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.compiler.schema_dir)
        }
    }

    /// Directory scanning settings
    pub fn load_config(&self) -> LoadConfig {
        LoadConfig {
            skip_prefixes: self.compiler.skip_prefixes.clone(),
            include_prefixes: self.compiler.include_prefixes.clone(),
        }
    }
}
