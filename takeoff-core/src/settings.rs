//! Clap-free settings for the metrics and repair pipelines.

use camino::Utf8PathBuf;
use takeoff_domain::MetricDefaults;

pub const DEFAULT_OUT_DIR: &str = "artifacts/takeoff";

/// Settings for the metrics pipeline.
#[derive(Debug, Clone)]
pub struct MetricsSettings {
    pub out_dir: Utf8PathBuf,

    /// Filter logic applied where a metric leaves it unset.
    pub defaults: MetricDefaults,

    /// Treat error rows as a failed run.
    pub strict: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            out_dir: Utf8PathBuf::from(DEFAULT_OUT_DIR),
            defaults: MetricDefaults::default(),
            strict: false,
        }
    }
}

/// Settings for the repair pipeline.
#[derive(Debug, Clone)]
pub struct RepairSettings {
    pub out_dir: Utf8PathBuf,

    // Repair behaviour
    pub dry_run: bool,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            out_dir: Utf8PathBuf::from(DEFAULT_OUT_DIR),
            dry_run: true,
        }
    }
}
