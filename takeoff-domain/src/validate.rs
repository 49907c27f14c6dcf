use crate::derived::DerivedSet;
use crate::metric::{MetricDefaults, MetricDefinition, MetricKind};
use std::collections::BTreeSet;
use takeoff_types::config::{MetricConfig, QuantityType, TakeoffConfig};
use takeoff_types::diagnostic::Diagnostic;

/// Check every metric section and collect findings instead of stopping at the first.
///
/// Errors here are exactly the conditions that make [`crate::MetricSet::compile`] fail;
/// warnings flag configurations that compile but are probably not what was meant.
pub fn validate_metrics(cfg: &TakeoffConfig, defaults: &MetricDefaults) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    for key in cfg.extra.keys() {
        out.push(Diagnostic::warning(
            "config",
            format!("unrecognized top-level section `{key}` is ignored"),
        ));
    }

    let mut seen = BTreeSet::new();
    let mut grouped = BTreeSet::new();

    for (kind, section) in [
        (MetricKind::Standard, &cfg.metrics),
        (MetricKind::RoomBased, &cfg.room_based_metrics),
        (MetricKind::GroupedByAttribute, &cfg.grouped_by_attribute_metrics),
    ] {
        for (name, metric_cfg) in section.iter() {
            let subject = format!("{}.{name}", kind.section());
            if !seen.insert(name.to_string()) {
                out.push(Diagnostic::error(
                    subject,
                    format!("duplicate metric name `{name}`"),
                ));
                continue;
            }
            check_metric(&subject, metric_cfg, &mut out);

            if let Some(message) = ungroupable_required(kind, metric_cfg) {
                out.push(Diagnostic::error(subject, message));
                grouped.insert(name.to_string());
                continue;
            }

            match MetricDefinition::compile(name, kind, metric_cfg, defaults) {
                Ok(def) if def.is_grouped() => {
                    grouped.insert(def.name);
                }
                Ok(_) => {}
                Err(e) => out.push(Diagnostic::error(subject, e.root().to_string())),
            }
        }
    }

    for name in cfg.derived_metrics.names() {
        if seen.contains(name) {
            out.push(Diagnostic::error(
                format!("derived_metrics.{name}"),
                format!("duplicate metric name `{name}`"),
            ));
        }
    }
    for (name, derived) in cfg.derived_metrics.iter() {
        for key in derived.extra.keys() {
            out.push(Diagnostic::warning(
                format!("derived_metrics.{name}"),
                format!("unrecognized key `{key}` is ignored"),
            ));
        }
    }

    // A metric that failed to compile is still a known name for derived references.
    let declared: BTreeSet<String> = seen.difference(&grouped).cloned().collect();
    if let Err(e) = DerivedSet::compile(&cfg.derived_metrics, &declared, &grouped) {
        out.push(Diagnostic::error("derived_metrics", e.to_string()));
    }

    out
}

fn check_metric(subject: &str, cfg: &MetricConfig, out: &mut Vec<Diagnostic>) {
    for key in cfg.extra.keys() {
        out.push(Diagnostic::warning(
            subject,
            format!("unrecognized key `{key}` is ignored"),
        ));
    }

    let subtracts = cfg.subtract_filter.as_ref().is_some_and(|s| !s.is_empty());
    if subtracts && cfg.subtract_filter_logic.is_none() {
        out.push(Diagnostic::warning(
            subject,
            "subtract_filter without subtract_filter_logic is ambiguous; set it explicitly",
        ));
    }

    if cfg.quantity_type == Some(QuantityType::Count) && cfg.property.is_some() {
        out.push(Diagnostic::warning(
            subject,
            "count metrics ignore `property`",
        ));
    }
}

/// A required grouped metric whose grouping key is absent fails on every store.
fn ungroupable_required(kind: MetricKind, cfg: &MetricConfig) -> Option<&'static str> {
    if !cfg.required {
        return None;
    }
    match kind {
        MetricKind::RoomBased if cfg.grouping_relation.is_none() => {
            Some("required metric can never resolve a group: `grouping_relation` is missing")
        }
        MetricKind::GroupedByAttribute if cfg.grouping_attribute.is_none() => {
            Some("required metric can never resolve a group: `grouping_attribute` is missing")
        }
        _ => None,
    }
}
