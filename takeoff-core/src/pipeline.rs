//! Core metrics and repair pipelines, extracted from the CLI.
//!
//! These entry points are I/O-agnostic: stores arrive through an
//! [`ElementSource`] and artifacts leave through a [`WritePort`].

use crate::load::LoadedStore;
use crate::ports::{ElementSource, WritePort};
use crate::settings::{MetricsSettings, RepairSettings};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use fs_err as fs;
use rayon::prelude::*;
use takeoff_domain::{
    ConfigError, EntityStore, Filter, MetricDefaults, MetricSet, evaluate, validate_metrics,
};
use takeoff_edit::{RepairError, compile_rules, repair, validate_repairs};
use takeoff_render::{render_changes_md, render_report_md, render_results_md};
use takeoff_types::ElementId;
use takeoff_types::config::TakeoffConfig;
use takeoff_types::diagnostic::Diagnostic;
use takeoff_types::element::ElementsFile;
use takeoff_types::repair::ChangeLog;
use takeoff_types::report::{
    InputInfo, ReportCounts, ReportStatus, RunInfo, TakeoffReport, ToolInfo,
};
use takeoff_types::result::ResultTable;
use takeoff_types::schema;
use tracing::{debug, info};

/// Error type for pipeline results. Exit code 2 = configuration error, 1 = tool error.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ToolError {
    pub fn exit_code(&self) -> u8 {
        match self {
            ToolError::Config(_) => 2,
            ToolError::Internal(_) => 1,
        }
    }
}

impl From<RepairError> for ToolError {
    fn from(err: RepairError) -> Self {
        match err {
            RepairError::Config(e) => ToolError::Config(e),
            RepairError::Runtime(e) => ToolError::Internal(e),
        }
    }
}

/// Read and parse a YAML configuration file.
///
/// An unreadable file is a tool error; a file that does not parse is a
/// configuration error. An empty file is an empty configuration.
pub fn load_config(path: &Utf8Path) -> Result<TakeoffConfig, ToolError> {
    let text = fs::read_to_string(path).context("read takeoff configuration")?;
    parse_config(&text).map_err(|e| ToolError::Config(e.within(path.to_string())))
}

pub fn parse_config(text: &str) -> Result<TakeoffConfig, ConfigError> {
    if text.trim().is_empty() {
        return Ok(TakeoffConfig::default());
    }
    serde_yaml::from_str(text).map_err(|e| ConfigError::invalid(format!("invalid YAML: {e}")))
}

/// Results for one store.
#[derive(Debug, Clone)]
pub struct StoreMetrics {
    pub path: Utf8PathBuf,
    pub table: ResultTable,
}

/// Outcome of `run_metrics`.
#[derive(Debug, Clone)]
pub struct MetricsOutcome {
    pub stores: Vec<StoreMetrics>,
    pub report: TakeoffReport,
    /// `strict` was requested and at least one row has status error.
    pub strict_failure: bool,
}

/// Run the metrics pipeline over every store of `source`.
///
/// The configuration compiles once, before any store is loaded. Stores are
/// evaluated in parallel; results keep source order.
pub fn run_metrics(
    settings: &MetricsSettings,
    config: &TakeoffConfig,
    source: &dyn ElementSource,
    tool: ToolInfo,
) -> Result<MetricsOutcome, ToolError> {
    let started_at = Utc::now();

    let set = MetricSet::compile(config, &settings.defaults)?;
    info!(
        metrics = set.metrics.len(),
        derived = set.derived.len(),
        "compiled metric configuration"
    );

    let loaded = source.load_stores()?;

    let stores: Vec<StoreMetrics> = loaded
        .par_iter()
        .map(|s| {
            let rows = evaluate(&s.store, &set);
            debug!(store = %s.name, rows = rows.len(), "evaluated store");
            StoreMetrics {
                path: s.path.clone(),
                table: ResultTable::new(s.name.clone(), rows),
            }
        })
        .collect();

    let report = report_from_metrics(&stores, &loaded, tool, started_at);
    let strict_failure = settings.strict && report.counts.errors > 0;

    Ok(MetricsOutcome {
        stores,
        report,
        strict_failure,
    })
}

/// Write all metrics artifacts to the output directory.
pub fn write_metrics_artifacts(
    outcome: &MetricsOutcome,
    out_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    writer.create_dir_all(out_dir)?;

    for s in &outcome.stores {
        let dir = out_dir.join(&s.table.store);
        writer.create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(&s.table).context("serialize results")?;
        writer.write_file(&dir.join("results.json"), json.as_bytes())?;

        let md = render_results_md(&s.table);
        writer.write_file(&dir.join("results.md"), md.as_bytes())?;
    }

    write_report(&outcome.report, out_dir, writer)
}

/// Repairs for one store.
#[derive(Debug, Clone)]
pub struct StoreRepair {
    pub path: Utf8PathBuf,
    pub log: ChangeLog,
    pub patch: String,
    pub elements: ElementsFile,
}

/// Outcome of `run_repairs`.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub stores: Vec<StoreRepair>,
    pub report: TakeoffReport,
    pub dry_run: bool,
}

/// Run the repair pipeline over every store of `source`.
///
/// Rules compile once. Stores are repaired in parallel, each one strictly
/// rule by rule.
pub fn run_repairs(
    settings: &RepairSettings,
    config: &TakeoffConfig,
    source: &dyn ElementSource,
    tool: ToolInfo,
) -> Result<RepairOutcome, ToolError> {
    let started_at = Utc::now();

    let rules = compile_rules(&config.repairs)?;
    info!(rules = rules.len(), "compiled repair rules");

    let loaded = source.load_stores()?;
    let inputs: Vec<InputInfo> = loaded.iter().map(input_info).collect();

    let stores = loaded
        .into_par_iter()
        .map(|s| {
            let out = repair(s.store, &rules, &s.name)?;
            debug!(
                store = %s.name,
                changed = out.log.changed_count(),
                "repaired store"
            );
            Ok(StoreRepair {
                path: s.path,
                log: out.log,
                patch: out.patch,
                elements: ElementsFile::new(out.store.into_elements()),
            })
        })
        .collect::<Result<Vec<_>, RepairError>>()?;

    let report = report_from_repairs(&stores, inputs, settings.dry_run, tool, started_at);

    Ok(RepairOutcome {
        stores,
        report,
        dry_run: settings.dry_run,
    })
}

/// Write all repair artifacts to the output directory.
///
/// The repaired `elements.json` is only written outside dry-run.
pub fn write_repair_artifacts(
    outcome: &RepairOutcome,
    out_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    writer.create_dir_all(out_dir)?;

    for s in &outcome.stores {
        let dir = out_dir.join(&s.log.store);
        writer.create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(&s.log).context("serialize change log")?;
        writer.write_file(&dir.join("changes.json"), json.as_bytes())?;

        let md = render_changes_md(&s.log);
        writer.write_file(&dir.join("changes.md"), md.as_bytes())?;

        writer.write_file(&dir.join("patch.diff"), s.patch.as_bytes())?;

        if !outcome.dry_run {
            let elements =
                serde_json::to_string_pretty(&s.elements).context("serialize repaired store")?;
            writer.write_file(&dir.join("elements.json"), elements.as_bytes())?;
        }
    }

    write_report(&outcome.report, out_dir, writer)
}

/// Every configuration finding, metrics first, then repairs.
pub fn validate(config: &TakeoffConfig, defaults: &MetricDefaults) -> Vec<Diagnostic> {
    let mut out = validate_metrics(config, defaults);
    out.extend(validate_repairs(&config.repairs));
    out
}

/// Ids of the elements of `store` matching the filter expression `expr`.
pub fn select(store: &EntityStore, expr: &str) -> Result<Vec<ElementId>, ToolError> {
    let filter = Filter::parse(expr)?;
    Ok(store
        .iter()
        .filter(|e| filter.matches(e))
        .map(|e| e.id.clone())
        .collect())
}

fn write_report(
    report: &TakeoffReport,
    out_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize report")?;
    writer.write_file(&out_dir.join("report.json"), json.as_bytes())?;

    let md = render_report_md(report);
    writer.write_file(&out_dir.join("report.md"), md.as_bytes())
}

// ── report helpers ───────────────────────────────────────────────────────

pub(crate) fn report_from_metrics(
    stores: &[StoreMetrics],
    loaded: &[LoadedStore],
    tool: ToolInfo,
    started_at: DateTime<Utc>,
) -> TakeoffReport {
    let rows = stores.iter().flat_map(|s| s.table.rows.iter());
    let mut counts = ReportCounts {
        stores: stores.len() as u64,
        ..Default::default()
    };
    let mut missing = 0u64;
    for row in rows {
        counts.rows += 1;
        if row.is_error() {
            counts.errors += 1;
        }
        if row.value.is_undefined() {
            counts.undefined += 1;
        }
        missing += row.missing_values;
    }

    let mut reasons = Vec::new();
    if counts.errors > 0 {
        reasons.push(format!("{} metric row(s) with status error", counts.errors));
    }
    if counts.undefined > 0 {
        reasons.push(format!("{} undefined derived value(s)", counts.undefined));
    }
    if missing > 0 {
        reasons.push(format!("{missing} element(s) without a readable quantity"));
    }

    let status = if counts.errors > 0 {
        ReportStatus::Fail
    } else if reasons.is_empty() {
        ReportStatus::Pass
    } else {
        ReportStatus::Warn
    };

    TakeoffReport {
        schema: schema::TAKEOFF_REPORT_V1.to_string(),
        tool,
        run: run_info(started_at),
        command: "metrics".to_string(),
        status,
        inputs: loaded.iter().map(input_info).collect(),
        counts,
        reasons,
    }
}

pub(crate) fn report_from_repairs(
    stores: &[StoreRepair],
    inputs: Vec<InputInfo>,
    dry_run: bool,
    tool: ToolInfo,
    started_at: DateTime<Utc>,
) -> TakeoffReport {
    let changes: u64 = stores.iter().map(|s| s.log.changed_count() as u64).sum();

    let mut reasons = Vec::new();
    if dry_run && changes > 0 {
        reasons.push(format!("dry run: {changes} change(s) not written"));
    }

    TakeoffReport {
        schema: schema::TAKEOFF_REPORT_V1.to_string(),
        tool,
        run: run_info(started_at),
        command: "repair".to_string(),
        status: if changes == 0 {
            ReportStatus::Pass
        } else {
            ReportStatus::Warn
        },
        inputs,
        counts: ReportCounts {
            stores: stores.len() as u64,
            changes,
            ..Default::default()
        },
        reasons,
    }
}

fn input_info(s: &LoadedStore) -> InputInfo {
    InputInfo {
        store: s.name.clone(),
        path: s.path.clone(),
        sha256: s.sha256.clone(),
        elements: s.store.len() as u64,
    }
}

fn run_info(started_at: DateTime<Utc>) -> RunInfo {
    let ended_at = Utc::now();
    let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
    RunInfo {
        started_at,
        ended_at: Some(ended_at),
        duration_ms: Some(duration_ms),
    }
}
