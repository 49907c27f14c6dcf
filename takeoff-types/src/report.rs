use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run-level summary written next to per-store artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeoffReport {
    pub schema: String,
    pub tool: ToolInfo,
    pub run: RunInfo,
    pub command: String,
    pub status: ReportStatus,

    #[serde(default)]
    pub inputs: Vec<InputInfo>,

    pub counts: ReportCounts,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputInfo {
    pub store: String,
    pub path: Utf8PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    pub elements: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub stores: u64,

    #[serde(default)]
    pub rows: u64,

    #[serde(default)]
    pub errors: u64,

    #[serde(default)]
    pub undefined: u64,

    #[serde(default)]
    pub changes: u64,
}
