mod config;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use config::{ConfigMerger, MergedConfig};
use std::io::IsTerminal;
use std::process::ExitCode;
use takeoff_core::adapters::{FsElementSource, FsWritePort};
use takeoff_core::load::load_store;
use takeoff_core::pipeline::{
    ToolError, load_config, run_metrics, run_repairs, select, validate, write_metrics_artifacts,
    write_repair_artifacts,
};
use takeoff_core::settings::{MetricsSettings, RepairSettings};
use takeoff_render::render_diagnostics_md;
use takeoff_types::report::ToolInfo;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Exit code for `--strict` runs with at least one error row.
const EXIT_STRICT: u8 = 3;

#[derive(Debug, Parser)]
#[command(
    name = "takeoff",
    version,
    about = "Config-driven quantity takeoff and repairs for building-model elements."
)]
struct Cli {
    /// Project root holding takeoff.toml (default: current directory).
    #[arg(long, global = true, default_value = ".")]
    root: Utf8PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute metrics for one or more element stores.
    Metrics(MetricsArgs),
    /// Apply repair rules to element stores (default: dry-run).
    Repair(RepairArgs),
    /// Check a metrics/repairs configuration without loading any store.
    Validate(ValidateArgs),
    /// Print the ids of elements matching a filter expression.
    Select(SelectArgs),
}

#[derive(Debug, Parser)]
struct MetricsArgs {
    /// YAML configuration with metrics and derived metrics.
    #[arg(long)]
    config: Utf8PathBuf,

    /// Element store files or glob patterns.
    #[arg(long = "store", required = true, num_args = 1..)]
    stores: Vec<String>,

    /// Output directory for artifacts (default: <root>/artifacts/takeoff).
    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,

    /// Exit with code 3 when any metric row has status error.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Debug, Parser)]
struct RepairArgs {
    /// YAML configuration with repair rules.
    #[arg(long)]
    config: Utf8PathBuf,

    /// Element store files or glob patterns.
    #[arg(long = "store", required = true, num_args = 1..)]
    stores: Vec<String>,

    /// Output directory for artifacts (default: <root>/artifacts/takeoff).
    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,

    /// Write the repaired stores. If omitted, only the change log and patch are emitted.
    #[arg(long, default_value_t = false)]
    apply: bool,
}

#[derive(Debug, Parser)]
struct ValidateArgs {
    /// YAML configuration to check.
    #[arg(long)]
    config: Utf8PathBuf,

    /// Output format (text, json).
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Parser)]
struct SelectArgs {
    /// One element store file.
    #[arg(long)]
    store: Utf8PathBuf,

    /// Filter expression, e.g. "type=IfcSpace AND LongName=TRH".
    #[arg(long)]
    filter: String,

    /// Output format (text, json).
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    match real_main() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn real_main() -> Result<u8, ToolError> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Metrics(args) => cmd_metrics(&cli.root, args),
        Command::Repair(args) => cmd_repair(&cli.root, args),
        Command::Validate(args) => cmd_validate(&cli.root, args),
        Command::Select(args) => cmd_select(args),
    }
}

fn merged_config(
    root: &Utf8Path,
    out_dir: Option<Utf8PathBuf>,
    strict: bool,
) -> anyhow::Result<MergedConfig> {
    let file_config = config::load_or_default(root).context("load takeoff.toml config")?;
    let merged = ConfigMerger::new(file_config).merge(root, out_dir, strict);
    debug!(
        "merged config: defaults={:?}, out_dir={}, strict={}",
        merged.defaults, merged.out_dir, merged.strict
    );
    Ok(merged)
}

fn cmd_metrics(root: &Utf8Path, args: MetricsArgs) -> Result<u8, ToolError> {
    let merged = merged_config(root, args.out_dir, args.strict)?;
    let config = load_config(&args.config)?;
    let settings = MetricsSettings {
        out_dir: merged.out_dir,
        defaults: merged.defaults,
        strict: merged.strict,
    };

    let source = FsElementSource::new(args.stores);
    let outcome = run_metrics(&settings, &config, &source, tool_info())?;
    write_metrics_artifacts(&outcome, &settings.out_dir, &FsWritePort)?;

    for s in &outcome.stores {
        println!(
            "{}: {} row(s), {} error(s)",
            s.table.store,
            s.table.rows.len(),
            s.table.error_count()
        );
    }
    info!("wrote metrics artifacts to {}", settings.out_dir);

    Ok(if outcome.strict_failure { EXIT_STRICT } else { 0 })
}

fn cmd_repair(root: &Utf8Path, args: RepairArgs) -> Result<u8, ToolError> {
    let merged = merged_config(root, args.out_dir, false)?;
    let config = load_config(&args.config)?;
    let settings = RepairSettings {
        out_dir: merged.out_dir,
        dry_run: !args.apply,
    };

    let source = FsElementSource::new(args.stores);
    let outcome = run_repairs(&settings, &config, &source, tool_info())?;
    write_repair_artifacts(&outcome, &settings.out_dir, &FsWritePort)?;

    let mode = if settings.dry_run { "dry-run" } else { "applied" };
    for s in &outcome.stores {
        println!(
            "{}: {} change(s) ({mode})",
            s.log.store,
            s.log.changed_count()
        );
    }
    info!("wrote repair artifacts to {}", settings.out_dir);

    Ok(0)
}

fn cmd_validate(root: &Utf8Path, args: ValidateArgs) -> Result<u8, ToolError> {
    let merged = merged_config(root, None, false)?;
    let config = load_config(&args.config)?;
    let diagnostics = validate(&config, &merged.defaults);

    match args.format {
        OutputFormat::Text => print!("{}", render_diagnostics_md(&diagnostics)),
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&diagnostics).context("serialize diagnostics")?;
            println!("{json}");
        }
    }

    Ok(if diagnostics.iter().any(|d| d.is_error()) {
        2
    } else {
        0
    })
}

fn cmd_select(args: SelectArgs) -> Result<u8, ToolError> {
    let name = args.store.file_stem().unwrap_or("store").to_string();
    let loaded = load_store(&args.store, name)?;
    let ids = select(&loaded.store, &args.filter)?;

    match args.format {
        OutputFormat::Text => {
            for id in &ids {
                println!("{id}");
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&ids).context("serialize ids")?;
            println!("{json}");
        }
    }
    debug!(store = %loaded.name, matched = ids.len(), "selected elements");

    Ok(0)
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "takeoff".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}
