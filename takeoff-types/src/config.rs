//! Raw configuration records, as authored in YAML.
//!
//! These are deliberately loose: shapes are checked here, meaning is checked when
//! `takeoff-domain` compiles them. Unknown keys land in `extra` so validation can
//! warn about them instead of failing the load.

use crate::Named;
use crate::element::Scalar;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Leftover keys captured by `#[serde(flatten)]`.
pub type ExtraKeys = BTreeMap<String, serde_json::Value>;

/// How per-key filter results combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterLogic {
    #[default]
    #[serde(rename = "AND", alias = "and", alias = "And")]
    And,
    #[serde(rename = "OR", alias = "or", alias = "Or")]
    Or,
}

impl FilterLogic {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterLogic::And => "AND",
            FilterLogic::Or => "OR",
        }
    }
}

impl fmt::Display for FilterLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityType {
    Area,
    Volume,
    Length,
    Count,
}

impl QuantityType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuantityType::Area => "area",
            QuantityType::Volume => "volume",
            QuantityType::Length => "length",
            QuantityType::Count => "count",
        }
    }

    pub fn default_unit(self) -> &'static str {
        match self {
            QuantityType::Area => "m²",
            QuantityType::Volume => "m³",
            QuantityType::Length => "m",
            QuantityType::Count => "count",
        }
    }
}

/// A filter as written: either a mapping of key → condition or a string expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    Expression(String),
    Mapping(BTreeMap<String, FilterValue>),
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        match self {
            FilterSpec::Expression(s) => s.trim().is_empty(),
            FilterSpec::Mapping(m) => m.is_empty(),
        }
    }
}

/// Right-hand side of one mapping filter key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(Scalar),
    List(Vec<FilterItem>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterItem {
    Scalar(Scalar),
    Tuple(Vec<Scalar>),
}

/// One metric record (`metrics`, `room_based_metrics`, `grouped_by_attribute_metrics`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_type: Option<QuantityType>,

    #[serde(
        default,
        rename = "ifc_entity",
        alias = "type",
        alias = "entity_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub entity_type: Option<String>,

    #[serde(default, alias = "pset_name", skip_serializing_if = "Option::is_none")]
    pub property_set: Option<String>,

    #[serde(default, alias = "prop_name", skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_filter: Option<FilterSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_filter_logic: Option<FilterLogic>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtract_filter: Option<FilterSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtract_filter_logic: Option<FilterLogic>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping_attribute: Option<String>,

    #[serde(
        default,
        alias = "room_reference_attribute_guid",
        skip_serializing_if = "Option::is_none"
    )]
    pub grouping_relation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(flatten)]
    pub extra: ExtraKeys,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedConfig {
    pub formula: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(flatten)]
    pub extra: ExtraKeys,
}

/// One repair action, written as a single-key map: `change_value: {field, value}`.
///
/// The map form is read and written by hand so it does not depend on how a
/// format encodes externally tagged enums (serde_yaml 0.9 expects `!tags`).
#[derive(Debug, Clone, PartialEq)]
pub enum ActionConfig {
    ChangeValue { field: String, value: Scalar },
}

const ACTION_KINDS: &[&str] = &["change_value"];

#[derive(Serialize, Deserialize)]
struct ChangeValueBody {
    field: String,
    value: Scalar,
}

impl Serialize for ActionConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            ActionConfig::ChangeValue { field, value } => map.serialize_entry(
                "change_value",
                &ChangeValueBody {
                    field: field.clone(),
                    value: value.clone(),
                },
            )?,
        }
        map.end()
    }
}

struct ActionVisitor;

impl<'de> Visitor<'de> for ActionVisitor {
    type Value = ActionConfig;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a single-key action map such as `change_value: {field, value}`")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let Some(kind) = access.next_key::<String>()? else {
            return Err(de::Error::invalid_length(0, &self));
        };
        let action = match kind.as_str() {
            "change_value" => {
                let body: ChangeValueBody = access.next_value()?;
                ActionConfig::ChangeValue {
                    field: body.field,
                    value: body.value,
                }
            }
            other => return Err(de::Error::unknown_variant(other, ACTION_KINDS)),
        };
        if access.next_key::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::custom("an action has exactly one key"));
        }
        Ok(action)
    }
}

impl<'de> Deserialize<'de> for ActionConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ActionVisitor)
    }
}

/// Body of a repair rule. Also accepted nested under `config:`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RepairBody>,

    #[serde(flatten)]
    pub extra: ExtraKeys,
}

impl RepairConfig {
    /// Flatten the optional `config:` wrapper. Top-level fields win.
    pub fn body(&self) -> RepairBody {
        let nested = self.config.clone().unwrap_or_default();
        RepairBody {
            filter: self.filter.clone().or(nested.filter),
            actions: if self.actions.is_empty() {
                nested.actions
            } else {
                self.actions.clone()
            },
        }
    }
}

/// Whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeoffConfig {
    pub metrics: Named<MetricConfig>,
    pub room_based_metrics: Named<MetricConfig>,
    pub grouped_by_attribute_metrics: Named<MetricConfig>,
    pub derived_metrics: Named<DerivedConfig>,
    pub repairs: Named<RepairConfig>,

    #[serde(flatten)]
    pub extra: ExtraKeys,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_units() {
        assert_eq!(QuantityType::Area.default_unit(), "m²");
        assert_eq!(QuantityType::Volume.default_unit(), "m³");
        assert_eq!(QuantityType::Count.default_unit(), "count");
    }

    #[test]
    fn repair_body_prefers_top_level() {
        let rule = RepairConfig {
            filter: Some(FilterSpec::Expression("type=IfcSpace".to_string())),
            config: Some(RepairBody {
                filter: Some(FilterSpec::Expression("type=IfcWall".to_string())),
                actions: vec![ActionConfig::ChangeValue {
                    field: "Name".to_string(),
                    value: Scalar::from("x"),
                }],
            }),
            ..Default::default()
        };
        let body = rule.body();
        assert_eq!(
            body.filter,
            Some(FilterSpec::Expression("type=IfcSpace".to_string()))
        );
        assert_eq!(body.actions.len(), 1);
    }
}
