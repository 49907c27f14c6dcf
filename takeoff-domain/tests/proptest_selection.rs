//! Property-based tests for selection and aggregation.
//!
//! These tests verify that:
//! - AND/OR mapping filters are the conjunction/disjunction of their conditions
//! - The empty filter matches every element
//! - Sums do not depend on element order within a store
//! - An element in both include and subtract sets never contributes
//! - Subtract-only elements are deductions, never part of the working set

use proptest::prelude::*;
use std::collections::BTreeMap;
use takeoff_domain::{
    EntityStore, Filter, MetricDefaults, MetricDefinition, MetricKind, aggregate, select,
    working_set,
};
use takeoff_types::config::{FilterLogic, FilterSpec, FilterValue, MetricConfig, QuantityType};
use takeoff_types::result::MetricValue;
use takeoff_types::{Element, Scalar};

const KEYS: [&str; 3] = ["Name", "Pset_Common.Status", "Level"];

/// Strategy for an element carrying some subset of the filter keys.
fn arb_element(id: usize) -> impl Strategy<Value = Element> {
    (
        prop::option::of(prop::sample::select(vec!["GrossArea", "LUF", "Void"])),
        prop::option::of(prop::sample::select(vec!["New", "Existing"])),
        prop::option::of(0i64..4),
        0u32..1000,
    )
        .prop_map(move |(name, status, level, area)| {
            let mut e = Element::new(format!("e{id}"), "IfcSpace")
                .with_attribute("Area", f64::from(area) / 4.0);
            if let Some(name) = name {
                e = e.with_attribute("Name", name);
            }
            if let Some(status) = status {
                e = e.with_property("Pset_Common", "Status", status);
            }
            if let Some(level) = level {
                e = e.with_attribute("Level", level);
            }
            e
        })
}

fn arb_elements() -> impl Strategy<Value = Vec<Element>> {
    (0usize..12).prop_flat_map(|n| (0..n).map(arb_element).collect::<Vec<_>>())
}

/// Strategy for a mapping filter over a non-empty subset of `KEYS`.
fn arb_conditions() -> impl Strategy<Value = BTreeMap<String, FilterValue>> {
    (
        prop::option::of(prop::sample::select(vec!["grossarea", "LUF"])),
        prop::option::of(prop::sample::select(vec!["NEW", "existing"])),
        prop::option::of(0i64..4),
    )
        .prop_filter("at least one condition", |(a, b, c)| {
            a.is_some() || b.is_some() || c.is_some()
        })
        .prop_map(|(name, status, level)| {
            let mut map = BTreeMap::new();
            if let Some(v) = name {
                map.insert(KEYS[0].to_string(), FilterValue::Scalar(Scalar::from(v)));
            }
            if let Some(v) = status {
                map.insert(KEYS[1].to_string(), FilterValue::Scalar(Scalar::from(v)));
            }
            if let Some(v) = level {
                map.insert(KEYS[2].to_string(), FilterValue::Scalar(Scalar::from(v)));
            }
            map
        })
}

fn single(key: &str, value: &FilterValue) -> Filter {
    let map = BTreeMap::from([(key.to_string(), value.clone())]);
    Filter::from_mapping(&map, FilterLogic::And).unwrap()
}

fn area_metric(include: Option<FilterSpec>, subtract: Option<FilterSpec>) -> MetricDefinition {
    area_metric_with(include, FilterLogic::And, subtract, FilterLogic::Or)
}

fn area_metric_with(
    include: Option<FilterSpec>,
    include_logic: FilterLogic,
    subtract: Option<FilterSpec>,
    subtract_logic: FilterLogic,
) -> MetricDefinition {
    let cfg = MetricConfig {
        entity_type: Some("IfcSpace".to_string()),
        quantity_type: Some(QuantityType::Area),
        property: Some("Area".to_string()),
        include_filter: include,
        include_filter_logic: Some(include_logic),
        subtract_filter: subtract,
        subtract_filter_logic: Some(subtract_logic),
        ..Default::default()
    };
    MetricDefinition::compile("area", MetricKind::Standard, &cfg, &MetricDefaults::default())
        .unwrap()
}

fn number(value: MetricValue) -> f64 {
    value.as_f64().unwrap()
}

proptest! {
    /// AND holds iff every single-key condition holds.
    #[test]
    fn and_is_conjunction(elements in arb_elements(), map in arb_conditions()) {
        let filter = Filter::from_mapping(&map, FilterLogic::And).unwrap();
        for e in &elements {
            let expected = map.iter().all(|(k, v)| single(k, v).matches(e));
            prop_assert_eq!(filter.matches(e), expected);
        }
    }

    /// OR holds iff at least one single-key condition holds.
    #[test]
    fn or_is_disjunction(elements in arb_elements(), map in arb_conditions()) {
        let filter = Filter::from_mapping(&map, FilterLogic::Or).unwrap();
        for e in &elements {
            let expected = map.iter().any(|(k, v)| single(k, v).matches(e));
            prop_assert_eq!(filter.matches(e), expected);
        }
    }

    /// The empty filter is the identity for selection, for both connectives.
    #[test]
    fn empty_filter_matches_everything(elements in arb_elements()) {
        for logic in [FilterLogic::And, FilterLogic::Or] {
            let from_map = Filter::from_mapping(&BTreeMap::new(), logic).unwrap();
            let from_none = Filter::compile(None, logic).unwrap();
            let from_blank = Filter::compile(Some(&FilterSpec::Expression("  ".into())), logic).unwrap();
            for e in &elements {
                prop_assert!(from_map.matches(e));
                prop_assert!(from_none.matches(e));
                prop_assert!(from_blank.matches(e));
            }
        }
    }

    /// Reversing or rotating the store leaves the sum unchanged within tolerance.
    #[test]
    fn sums_are_order_invariant(elements in arb_elements(), shift in 0usize..12) {
        let metric = area_metric(
            Some(FilterSpec::Expression("NOT Name=Void".into())),
            Some(FilterSpec::Expression("Name=LUF".into())),
        );
        let forward = EntityStore::from_elements(elements.clone()).unwrap();

        let mut reordered = elements.clone();
        reordered.reverse();
        if !reordered.is_empty() {
            let k = shift % reordered.len();
            reordered.rotate_left(k);
        }
        let backward = EntityStore::from_elements(reordered).unwrap();

        let a = number(aggregate(&forward, &metric).into_rows()[0].value);
        let b = number(aggregate(&backward, &metric).into_rows()[0].value);
        prop_assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0));
    }

    /// The same mapping combined the same way for include and subtract selects nothing.
    #[test]
    fn subtract_overlap_never_contributes(
        elements in arb_elements(),
        map in arb_conditions(),
        logic in prop::sample::select(vec![FilterLogic::And, FilterLogic::Or]),
    ) {
        let spec = FilterSpec::Mapping(map);
        let metric = area_metric_with(Some(spec.clone()), logic, Some(spec), logic);
        let store = EntityStore::from_elements(elements).unwrap();

        let selection = select(&store, &metric);
        prop_assert!(selection.working.is_empty());
        prop_assert!(selection.deductions.is_empty());
        let row = aggregate(&store, &metric).into_rows().remove(0);
        prop_assert_eq!(row.value, MetricValue::Number(0.0));
        prop_assert_eq!(row.deducted_count, 0);
    }

    /// With AND include and OR subtract over one mapping, the elements matching only
    /// the OR side are deductions and the working set stays empty.
    #[test]
    fn subtract_only_matches_are_deductions(elements in arb_elements(), map in arb_conditions()) {
        let and = Filter::from_mapping(&map, FilterLogic::And).unwrap();
        let or = Filter::from_mapping(&map, FilterLogic::Or).unwrap();
        let spec = FilterSpec::Mapping(map);
        let metric = area_metric_with(Some(spec.clone()), FilterLogic::And, Some(spec), FilterLogic::Or);
        let store = EntityStore::from_elements(elements.clone()).unwrap();

        let expected: Vec<&Element> = elements
            .iter()
            .filter(|e| or.matches(e) && !and.matches(e))
            .collect();
        let deducted: f64 = expected.iter().map(|e| e.attribute("Area").and_then(Scalar::as_number).unwrap()).sum();

        let selection = select(&store, &metric);
        prop_assert!(selection.working.is_empty());
        let ids: Vec<_> = selection.deductions.iter().map(|e| &e.id).collect();
        let expected_ids: Vec<_> = expected.iter().map(|e| &e.id).collect();
        prop_assert_eq!(ids, expected_ids);

        let row = aggregate(&store, &metric).into_rows().remove(0);
        prop_assert_eq!(row.deducted_count, expected.len() as u64);
        prop_assert!((number(row.value) + deducted).abs() <= 1e-9 * deducted.max(1.0));
    }

    /// Count metrics are integral and equal the working-set size.
    #[test]
    fn counts_match_working_set(elements in arb_elements(), map in arb_conditions()) {
        let cfg = MetricConfig {
            entity_type: Some("ifcspace".to_string()),
            include_filter: Some(FilterSpec::Mapping(map)),
            ..Default::default()
        };
        let metric = MetricDefinition::compile("n", MetricKind::Standard, &cfg, &MetricDefaults::default()).unwrap();
        let store = EntityStore::from_elements(elements).unwrap();
        let expected = working_set(&store, &metric).len() as u64;
        let row = aggregate(&store, &metric).into_rows().remove(0);
        prop_assert_eq!(row.value, MetricValue::Count(expected));
    }
}
