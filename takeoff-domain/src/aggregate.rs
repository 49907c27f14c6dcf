//! Include/subtract selection and (grouped) summation.

use crate::extract::{QuantitySource, extract};
use crate::metric::{GroupingKey, MetricDefinition, MetricSet, RelationRef};
use crate::store::EntityStore;
use rayon::prelude::*;
use std::collections::HashMap;
use takeoff_types::result::{MetricValue, ResultRow, RowStatus};
use takeoff_types::{Element, ElementId};
use tracing::{debug, warn};

/// Outcome of one metric: a single row, or one row per group.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Single(ResultRow),
    Grouped(Vec<ResultRow>),
}

impl Aggregation {
    pub fn rows(&self) -> &[ResultRow] {
        match self {
            Aggregation::Single(row) => std::slice::from_ref(row),
            Aggregation::Grouped(rows) => rows,
        }
    }

    pub fn into_rows(self) -> Vec<ResultRow> {
        match self {
            Aggregation::Single(row) => vec![row],
            Aggregation::Grouped(rows) => rows,
        }
    }
}

/// Elements a metric sums over, split by role.
#[derive(Debug, Clone, Default)]
pub struct Selection<'s> {
    /// Include-set minus subtract-set, by element id, in store order.
    pub working: Vec<&'s Element>,
    /// Subtract-set elements outside the include-set.
    pub deductions: Vec<&'s Element>,
}

pub fn select<'s>(store: &'s EntityStore, metric: &MetricDefinition) -> Selection<'s> {
    let mut selection = Selection::default();
    for element in store.of_type(&metric.entity_type) {
        let included = metric.include.matches(element);
        let subtracted = metric.subtract.as_ref().is_some_and(|f| f.matches(element));
        match (included, subtracted) {
            (true, false) => selection.working.push(element),
            (false, true) => selection.deductions.push(element),
            _ => {}
        }
    }
    selection
}

/// Include-set minus subtract-set, by element id, in store order.
pub fn working_set<'s>(store: &'s EntityStore, metric: &MetricDefinition) -> Vec<&'s Element> {
    select(store, metric).working
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    sum: f64,
    count: u64,
    elements: u64,
    missing: u64,
    deducted: u64,
}

impl Tally {
    fn add(&mut self, metric: &MetricDefinition, element: &Element) {
        self.elements += 1;
        match extract(element, &metric.quantity) {
            Some(_) if metric.quantity.is_count() => self.count += 1,
            Some(v) => self.sum += v,
            None => {
                self.missing += 1;
                warn!(
                    metric = %metric.name,
                    element = %element.id,
                    source = %metric.quantity.describe(),
                    "quantity missing or not numeric; element skipped"
                );
            }
        }
    }

    fn deduct(&mut self, metric: &MetricDefinition, element: &Element) {
        if metric.quantity.is_count() {
            return;
        }
        match extract(element, &metric.quantity) {
            Some(v) => {
                self.sum -= v;
                self.deducted += 1;
            }
            None => {
                self.missing += 1;
                warn!(
                    metric = %metric.name,
                    element = %element.id,
                    source = %metric.quantity.describe(),
                    "deduction quantity missing or not numeric; element skipped"
                );
            }
        }
    }

    fn value(&self, source: &QuantitySource) -> MetricValue {
        match source {
            QuantitySource::Count => MetricValue::Count(self.count),
            QuantitySource::Property { .. } => MetricValue::Number(self.sum),
        }
    }
}

fn build_row(
    metric: &MetricDefinition,
    name: String,
    group: Option<String>,
    tally: &Tally,
) -> ResultRow {
    let empty_required = metric.required && tally.elements == 0;
    ResultRow {
        metric_name: name,
        value: tally.value(&metric.quantity),
        unit: metric.unit.clone(),
        category: metric.category.clone(),
        description: metric.description.clone(),
        status: if empty_required {
            RowStatus::Error
        } else {
            RowStatus::Success
        },
        error: empty_required.then(|| "no elements matched a required metric".to_string()),
        group,
        element_count: tally.elements,
        missing_values: tally.missing,
        deducted_count: tally.deducted,
    }
}

/// Group row name: metric name plus the lowercased group value, whitespace as `_`.
pub(crate) fn group_row_name(metric: &str, group: &str) -> String {
    let slug: String = group
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    format!("{metric}_{slug}")
}

/// Distinct group values an element belongs to.
fn group_values(store: &EntityStore, element: &Element, key: &GroupingKey) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |value: String| {
        if !value.trim().is_empty() && !out.contains(&value) {
            out.push(value);
        }
    };

    match key {
        GroupingKey::Attribute(path) => {
            if let Some(v) = path.resolve(element) {
                push(v.to_string());
            }
        }
        GroupingKey::Relation {
            relation,
            attribute,
        } => {
            for id in container_ids(element, relation) {
                let Some(container) = store.get(&id) else {
                    debug!(element = %element.id, container = %id, "related element not in store");
                    continue;
                };
                if let Some(v) = attribute.resolve(container) {
                    push(v.to_string());
                }
            }
        }
    }
    out
}

fn container_ids(element: &Element, relation: &RelationRef) -> Vec<ElementId> {
    match relation {
        RelationRef::Named(name) => element.related(name).to_vec(),
        RelationRef::Property(path) => match path.resolve(element) {
            Some(value) => value
                .to_string()
                .split([',', ';'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ElementId::from)
                .collect(),
            None => Vec::new(),
        },
    }
}

/// Evaluate one metric against one store.
pub fn aggregate(store: &EntityStore, metric: &MetricDefinition) -> Aggregation {
    let selection = select(store, metric);
    debug!(
        metric = %metric.name,
        entity_type = %metric.entity_type,
        working_set = selection.working.len(),
        deductions = selection.deductions.len(),
        "aggregating"
    );

    let Some(key) = &metric.grouping else {
        let mut tally = Tally::default();
        for element in &selection.working {
            tally.add(metric, element);
        }
        for element in &selection.deductions {
            tally.deduct(metric, element);
        }
        return Aggregation::Single(build_row(metric, metric.name.clone(), None, &tally));
    };

    let mut groups = Groups::default();
    for element in &selection.working {
        let values = group_values(store, element, key);
        if values.is_empty() {
            warn!(
                metric = %metric.name,
                element = %element.id,
                "grouping key does not resolve; element skipped"
            );
            continue;
        }
        for value in values {
            groups.slot(value).add(metric, element);
        }
    }
    if !metric.quantity.is_count() {
        for element in &selection.deductions {
            let values = group_values(store, element, key);
            if values.is_empty() {
                warn!(
                    metric = %metric.name,
                    element = %element.id,
                    "grouping key does not resolve; deduction skipped"
                );
                continue;
            }
            for value in values {
                groups.slot(value).deduct(metric, element);
            }
        }
    }

    if groups.entries.is_empty() {
        return Aggregation::Grouped(vec![build_row(
            metric,
            metric.name.clone(),
            None,
            &Tally::default(),
        )]);
    }

    Aggregation::Grouped(
        groups
            .entries
            .into_iter()
            .map(|(group, tally)| {
                build_row(metric, group_row_name(&metric.name, &group), Some(group), &tally)
            })
            .collect(),
    )
}

/// Per-group tallies in first-seen order.
#[derive(Default)]
struct Groups {
    entries: Vec<(String, Tally)>,
    index: HashMap<String, usize>,
}

impl Groups {
    fn slot(&mut self, value: String) -> &mut Tally {
        let i = match self.index.get(&value) {
            Some(&i) => i,
            None => {
                self.index.insert(value.clone(), self.entries.len());
                self.entries.push((value, Tally::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[i].1
    }
}

/// Evaluate independent metrics in parallel; rows come back in declaration order.
pub fn aggregate_all(store: &EntityStore, metrics: &[MetricDefinition]) -> Vec<ResultRow> {
    metrics
        .par_iter()
        .map(|m| aggregate(store, m).into_rows())
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Base metrics followed by derived metrics, for one store.
pub fn evaluate(store: &EntityStore, set: &MetricSet) -> Vec<ResultRow> {
    let mut rows = aggregate_all(store, &set.metrics);
    let derived = set.derived.evaluate_rows(&rows);
    rows.extend(derived);
    rows
}
