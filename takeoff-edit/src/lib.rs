//! Repair engine for takeoff element stores.
//!
//! Responsibilities:
//! - Compile repair rules (filter plus ordered field mutations).
//! - Apply rules to one store, strictly in declaration order, recording a change log.
//! - Generate a unified diff preview of the changed elements.

mod error;
mod rule;

pub use error::{RepairError, RepairResult};
pub use rule::{Mutation, RepairRule, compile_rules, validate_repairs};

use anyhow::Context;
use diffy::PatchFormatter;
use std::collections::{BTreeMap, HashMap};
use takeoff_domain::{EntityStore, FieldPath};
use takeoff_types::repair::{ChangeEntry, ChangeLog, RuleSummary};
use takeoff_types::{Element, ElementId, Scalar};
use tracing::{debug, info, warn};

/// Apply `rules` to `store` in place.
///
/// Each rule selects against the store as left by the rules before it. Every
/// mutation is logged, including writes that leave the value unchanged.
pub fn apply(store: &mut EntityStore, rules: &[RepairRule], store_name: &str) -> ChangeLog {
    let mut log = ChangeLog::new(store_name);

    for rule in rules {
        let selected: Vec<ElementId> = store
            .iter()
            .filter(|e| rule.filter.matches(e))
            .map(|e| e.id.clone())
            .collect();

        let mut summary = RuleSummary {
            rule: rule.name.clone(),
            matched: selected.len() as u64,
            ..Default::default()
        };

        for id in &selected {
            let Some(element) = store.get_mut(id) else {
                continue;
            };
            for mutation in &rule.mutations {
                let Some((old, new)) = write_field(element, &mutation.field, mutation.value.clone())
                else {
                    continue;
                };
                let changed = old.as_ref() != Some(&new);
                debug!(
                    rule = %rule.name,
                    element = %id,
                    field = %mutation.field,
                    changed,
                    "mutation"
                );
                summary.mutations += 1;
                if changed {
                    summary.changed += 1;
                }
                log.entries.push(ChangeEntry {
                    rule: rule.name.clone(),
                    element_id: id.clone(),
                    field: mutation.field.to_string(),
                    old,
                    new,
                    changed,
                });
            }
        }

        info!(
            rule = %rule.name,
            matched = summary.matched,
            changed = summary.changed,
            "applied repair rule"
        );
        log.rules.push(summary);
    }

    log
}

/// Owned form of [`apply`]: hands back the mutated store with its log.
pub fn apply_owned(
    mut store: EntityStore,
    rules: &[RepairRule],
    store_name: &str,
) -> (EntityStore, ChangeLog) {
    let log = apply(&mut store, rules, store_name);
    (store, log)
}

/// A repaired store together with its change log and diff preview.
#[derive(Debug, Clone)]
pub struct RepairOutput {
    pub store: EntityStore,
    pub log: ChangeLog,
    pub patch: String,
}

/// Apply `rules` to an owned store and render the patch of what changed.
pub fn repair(
    store: EntityStore,
    rules: &[RepairRule],
    store_name: &str,
) -> RepairResult<RepairOutput> {
    let before = store.elements().to_vec();
    let (store, log) = apply_owned(store, rules, store_name);
    let patch = preview_patch(store_name, &before, store.elements())
        .with_context(|| format!("preview patch for store {store_name}"))?;
    Ok(RepairOutput { store, log, patch })
}

/// Write one field and return `(old, new)`. The type tag is never written.
fn write_field(
    element: &mut Element,
    field: &FieldPath,
    value: Scalar,
) -> Option<(Option<Scalar>, Scalar)> {
    match field {
        FieldPath::TypeTag { key } => {
            warn!(element = %element.id, field = %key, "type tag is not writable; skipped");
            None
        }
        FieldPath::Attribute(name) => Some(put(&mut element.attributes, name.clone(), value)),
        FieldPath::Property { raw, set, property } => {
            if element.attributes.contains_key(raw) {
                return Some(put(&mut element.attributes, raw.clone(), value));
            }
            let (set_key, prop_key) = element.property_slot(set, property);
            let props = element.property_sets.entry(set_key).or_default();
            Some(put(props, prop_key, value))
        }
    }
}

/// Insert `value` under `key`, keeping the existing scalar kind where lossless.
fn put(map: &mut BTreeMap<String, Scalar>, key: String, value: Scalar) -> (Option<Scalar>, Scalar) {
    let value = match map.get(&key) {
        Some(existing) => value.coerce_like(existing),
        None => value,
    };
    let old = map.insert(key, value.clone());
    (old, value)
}

/// Unified diff of every element whose pretty JSON differs between `before` and `after`.
pub fn preview_patch(
    store_name: &str,
    before: &[Element],
    after: &[Element],
) -> anyhow::Result<String> {
    let old_by_id: HashMap<&ElementId, &Element> = before.iter().map(|e| (&e.id, e)).collect();

    let mut out = String::new();
    let formatter = PatchFormatter::new();

    for new in after {
        let old = match old_by_id.get(&new.id) {
            Some(old) if *old == new => continue,
            Some(old) => to_pretty(old)?,
            None => String::new(),
        };
        let new_text = to_pretty(new)?;
        let path = format!("{store_name}/{}", new.id);

        out.push_str(&format!("diff --git a/{0} b/{0}\n", path));
        out.push_str(&format!("--- a/{0}\n+++ b/{0}\n", path));

        let patch = diffy::create_patch(&old, &new_text);
        out.push_str(&formatter.fmt_patch(&patch).to_string());
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }

    Ok(out)
}

fn to_pretty(element: &Element) -> anyhow::Result<String> {
    let mut text = serde_json::to_string_pretty(element)
        .with_context(|| format!("serialize element {}", element.id))?;
    text.push('\n');
    Ok(text)
}
