//! Configuration file loading for takeoff.
//!
//! Discovers and loads `takeoff.toml` from the project root.
//! Merges config file settings with CLI arguments (CLI takes precedence).

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use serde::Deserialize;
use takeoff_core::settings::DEFAULT_OUT_DIR;
use takeoff_domain::MetricDefaults;
use takeoff_types::config::FilterLogic;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "takeoff.toml";

/// Top-level configuration from takeoff.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TakeoffToml {
    /// Filter logic for metrics that leave it unset.
    pub defaults: DefaultsConfig,

    pub output: OutputConfig,

    pub run: RunConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub include_filter_logic: Option<FilterLogic>,
    pub subtract_filter_logic: Option<FilterLogic>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Artifact directory, relative to the project root.
    pub out_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Exit with code 3 when a metric row has status error.
    pub strict: bool,
}

/// Discover the takeoff.toml config file.
///
/// Returns `None` if no config file is found in `root`.
pub fn discover_config(root: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

/// Load and parse a takeoff.toml config file.
pub fn load_config(path: &Utf8Path) -> anyhow::Result<TakeoffToml> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

/// Parse a config file from a string.
pub fn parse_config(contents: &str) -> anyhow::Result<TakeoffToml> {
    let config: TakeoffToml = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load config from the project root, or return default if not found.
pub fn load_or_default(root: &Utf8Path) -> anyhow::Result<TakeoffToml> {
    match discover_config(root) {
        Some(path) => load_config(&path),
        None => Ok(TakeoffToml::default()),
    }
}

/// Merged configuration combining config file and CLI arguments.
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub defaults: MetricDefaults,
    pub out_dir: Utf8PathBuf,
    pub strict: bool,
}

/// Builder for merging config file with CLI arguments.
pub struct ConfigMerger {
    config: TakeoffToml,
}

impl ConfigMerger {
    pub fn new(config: TakeoffToml) -> Self {
        Self { config }
    }

    /// CLI `out_dir` replaces the file value; `strict` set on either side wins.
    pub fn merge(
        self,
        root: &Utf8Path,
        cli_out_dir: Option<Utf8PathBuf>,
        cli_strict: bool,
    ) -> MergedConfig {
        let builtin = MetricDefaults::default();
        let defaults = MetricDefaults {
            include_logic: self
                .config
                .defaults
                .include_filter_logic
                .unwrap_or(builtin.include_logic),
            subtract_logic: self
                .config
                .defaults
                .subtract_filter_logic
                .unwrap_or(builtin.subtract_logic),
        };

        let out_dir = cli_out_dir.unwrap_or_else(|| {
            root.join(
                self.config
                    .output
                    .out_dir
                    .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_OUT_DIR)),
            )
        });

        MergedConfig {
            defaults,
            out_dir,
            strict: cli_strict || self.config.run.strict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let contents = r#"
[defaults]
subtract_filter_logic = "AND"
include_filter_logic = "OR"

[output]
out_dir = "build/takeoff"

[run]
strict = true
"#;
        let config = parse_config(contents).unwrap();
        assert_eq!(config.defaults.subtract_filter_logic, Some(FilterLogic::And));
        assert_eq!(config.defaults.include_filter_logic, Some(FilterLogic::Or));
        assert_eq!(config.output.out_dir, Some(Utf8PathBuf::from("build/takeoff")));
        assert!(config.run.strict);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config("").unwrap();
        assert!(config.defaults.subtract_filter_logic.is_none());
        assert!(config.output.out_dir.is_none());
        assert!(!config.run.strict);
    }

    #[test]
    fn test_parse_rejects_unknown_logic() {
        assert!(parse_config("[defaults]\nsubtract_filter_logic = \"XOR\"\n").is_err());
    }

    #[test]
    fn test_merge_uses_builtin_defaults() {
        let merged = ConfigMerger::new(TakeoffToml::default()).merge(
            Utf8Path::new("proj"),
            None,
            false,
        );
        assert_eq!(merged.defaults, MetricDefaults::default());
        assert_eq!(merged.out_dir, Utf8PathBuf::from("proj/artifacts/takeoff"));
        assert!(!merged.strict);
    }

    #[test]
    fn test_merge_cli_overrides_file() {
        let config = parse_config(
            "[defaults]\nsubtract_filter_logic = \"AND\"\n[output]\nout_dir = \"out\"\n",
        )
        .unwrap();
        let merged = ConfigMerger::new(config).merge(
            Utf8Path::new("proj"),
            Some(Utf8PathBuf::from("elsewhere")),
            true,
        );
        assert_eq!(merged.defaults.subtract_logic, FilterLogic::And);
        assert_eq!(merged.defaults.include_logic, FilterLogic::And);
        assert_eq!(merged.out_dir, Utf8PathBuf::from("elsewhere"));
        assert!(merged.strict);
    }

    #[test]
    fn test_discover_and_load() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        assert!(discover_config(&root).is_none());
        assert!(!load_or_default(&root).unwrap().run.strict);

        fs::write(root.join(CONFIG_FILE_NAME), "[run]\nstrict = true\n").unwrap();
        assert_eq!(discover_config(&root), Some(root.join(CONFIG_FILE_NAME)));
        assert!(load_or_default(&root).unwrap().run.strict);
    }
}
