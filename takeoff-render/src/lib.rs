//! Rendering helpers (markdown) for human-readable artifacts.

use takeoff_types::diagnostic::{Diagnostic, DiagnosticLevel};
use takeoff_types::repair::ChangeLog;
use takeoff_types::report::{ReportStatus, TakeoffReport};
use takeoff_types::result::{ResultTable, RowStatus};

pub fn render_results_md(table: &ResultTable) -> String {
    let mut out = String::new();
    out.push_str(&format!("# takeoff results: {}\n\n", table.store));
    out.push_str(&format!(
        "- Rows: {} (errors {})\n\n",
        table.rows.len(),
        table.error_count()
    ));

    if table.rows.is_empty() {
        out.push_str("_No metrics configured._\n");
        return out;
    }

    out.push_str("| Metric | Value | Unit | Category | Status | Elements |\n");
    out.push_str("|---|---:|---|---|---|---:|\n");
    for row in &table.rows {
        out.push_str(&format!(
            "| {} | {} | {} | {} | `{}` | {} |\n",
            cell(&row.metric_name),
            row.value,
            cell(&row.unit),
            cell(&row.category),
            status_label(row.status),
            row.element_count
        ));
    }

    let notes: Vec<_> = table
        .rows
        .iter()
        .filter(|r| {
            r.error.is_some() || r.missing_values > 0 || r.status == RowStatus::Undefined
        })
        .collect();
    if !notes.is_empty() {
        out.push_str("\n## Notes\n\n");
        for row in notes {
            if let Some(err) = &row.error {
                out.push_str(&format!("- `{}`: {}\n", row.metric_name, err));
            }
            if row.status == RowStatus::Undefined {
                out.push_str(&format!(
                    "- `{}`: undefined (division by zero or an undefined operand)\n",
                    row.metric_name
                ));
            }
            if row.missing_values > 0 {
                out.push_str(&format!(
                    "- `{}`: {} element(s) without a readable quantity\n",
                    row.metric_name, row.missing_values
                ));
            }
        }
    }

    out
}

pub fn render_changes_md(log: &ChangeLog) -> String {
    let mut out = String::new();
    out.push_str(&format!("# takeoff repairs: {}\n\n", log.store));
    out.push_str(&format!(
        "- Mutations: {}\n- Changed: {}\n\n",
        log.entries.len(),
        log.changed_count()
    ));

    out.push_str("## Rules\n\n");
    if log.rules.is_empty() {
        out.push_str("_No rules configured._\n");
        return out;
    }
    for (i, r) in log.rules.iter().enumerate() {
        out.push_str(&format!(
            "{}. `{}`: matched {}, changed {} of {}\n",
            i + 1,
            r.rule,
            r.matched,
            r.changed,
            r.mutations
        ));
    }

    let changed: Vec<_> = log.entries.iter().filter(|e| e.changed).collect();
    if changed.is_empty() {
        return out;
    }
    out.push_str("\n## Changes\n\n");
    out.push_str("| Element | Field | Old | New | Rule |\n");
    out.push_str("|---|---|---|---|---|\n");
    for e in changed {
        let old = e
            .old
            .as_ref()
            .map(|v| cell(&v.to_string()))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "| `{}` | `{}` | {} | {} | `{}` |\n",
            e.element_id,
            e.field,
            old,
            cell(&e.new.to_string()),
            e.rule
        ));
    }

    out
}

pub fn render_diagnostics_md(diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    out.push_str("# takeoff validate\n\n");
    if diagnostics.is_empty() {
        out.push_str("_No findings._\n");
        return out;
    }

    let errors = diagnostics.iter().filter(|d| d.is_error()).count();
    out.push_str(&format!(
        "- Errors: {}\n- Warnings: {}\n\n",
        errors,
        diagnostics.len() - errors
    ));
    for d in diagnostics {
        out.push_str(&format!(
            "- **{}** `{}`: {}\n",
            level_label(d.level),
            d.subject,
            d.message
        ));
    }
    out
}

pub fn render_report_md(report: &TakeoffReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# takeoff {}\n\n", report.command));
    out.push_str(&format!("- Status: `{}`\n", report_label(report.status)));
    out.push_str(&format!("- Stores: {}\n", report.counts.stores));
    out.push_str(&format!(
        "- Rows: {} (errors {}, undefined {})\n",
        report.counts.rows, report.counts.errors, report.counts.undefined
    ));
    if report.counts.changes > 0 {
        out.push_str(&format!("- Changes: {}\n", report.counts.changes));
    }
    for reason in &report.reasons {
        out.push_str(&format!("- Reason: {}\n", reason));
    }
    out
}

/// Escape table separators so values cannot break the row.
fn cell(s: &str) -> String {
    s.replace('|', "\\|")
}

fn status_label(s: RowStatus) -> &'static str {
    match s {
        RowStatus::Success => "success",
        RowStatus::Error => "error",
        RowStatus::Undefined => "undefined",
    }
}

fn level_label(l: DiagnosticLevel) -> &'static str {
    match l {
        DiagnosticLevel::Warning => "warning",
        DiagnosticLevel::Error => "error",
    }
}

fn report_label(s: ReportStatus) -> &'static str {
    match s {
        ReportStatus::Pass => "pass",
        ReportStatus::Warn => "warn",
        ReportStatus::Fail => "fail",
    }
}
