//! Compile raw metric records into immutable, evaluable definitions.

use crate::derived::DerivedSet;
use crate::error::ConfigError;
use crate::extract::QuantitySource;
use crate::filter::Filter;
use crate::path::FieldPath;
use std::collections::BTreeSet;
use takeoff_types::config::{FilterLogic, MetricConfig, QuantityType, TakeoffConfig};
use tracing::{debug, warn};

/// Grouping attribute used by room-based metrics when none is configured.
pub const DEFAULT_ROOM_ATTRIBUTE: &str = "LongName";

/// Which configuration section a metric came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Standard,
    RoomBased,
    GroupedByAttribute,
}

impl MetricKind {
    pub fn section(self) -> &'static str {
        match self {
            MetricKind::Standard => "metrics",
            MetricKind::RoomBased => "room_based_metrics",
            MetricKind::GroupedByAttribute => "grouped_by_attribute_metrics",
        }
    }
}

/// How container ids are found for relation-based grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationRef {
    /// `element.relations[name]`.
    Named(String),
    /// A property whose value lists container ids, separated by `,` or `;`.
    Property(FieldPath),
}

impl RelationRef {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::EmptyField);
        }
        if raw.contains('.') {
            Ok(RelationRef::Property(FieldPath::parse(raw)?))
        } else {
            Ok(RelationRef::Named(raw.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingKey {
    /// Group by a value on the element itself.
    Attribute(FieldPath),
    /// Follow a relation to container elements and group by their attribute.
    Relation {
        relation: RelationRef,
        attribute: FieldPath,
    },
}

/// Defaults applied where a metric omits the filter logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDefaults {
    pub include_logic: FilterLogic,
    pub subtract_logic: FilterLogic,
}

impl Default for MetricDefaults {
    fn default() -> Self {
        Self {
            include_logic: FilterLogic::And,
            subtract_logic: FilterLogic::Or,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub name: String,
    pub kind: MetricKind,
    pub description: String,
    pub entity_type: String,
    pub quantity: QuantitySource,
    pub include: Filter,
    pub subtract: Option<Filter>,
    pub grouping: Option<GroupingKey>,
    pub unit: String,
    pub category: String,
    pub required: bool,
}

impl MetricDefinition {
    pub fn compile(
        name: &str,
        kind: MetricKind,
        cfg: &MetricConfig,
        defaults: &MetricDefaults,
    ) -> Result<Self, ConfigError> {
        Self::compile_inner(name, kind, cfg, defaults)
            .map_err(|e| e.within(format!("metric `{name}`")))
    }

    fn compile_inner(
        name: &str,
        kind: MetricKind,
        cfg: &MetricConfig,
        defaults: &MetricDefaults,
    ) -> Result<Self, ConfigError> {
        let entity_type = cfg
            .entity_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::invalid("missing `ifc_entity`"))?
            .to_string();

        let quantity = match (cfg.quantity_type, cfg.property.as_deref()) {
            (Some(QuantityType::Count), _) | (None, None) => QuantitySource::Count,
            (None, Some(_)) => {
                return Err(ConfigError::invalid(
                    "`quantity_type` is required when `property` is set",
                ));
            }
            (Some(q), Some(property)) => QuantitySource::Property {
                quantity: q,
                set: cfg.property_set.clone(),
                property: property.to_string(),
            },
            (Some(q), None) => {
                return Err(ConfigError::invalid(format!(
                    "`{}` metrics need a `property`",
                    q.as_str()
                )));
            }
        };

        let include = Filter::compile(
            cfg.include_filter.as_ref(),
            cfg.include_filter_logic.unwrap_or(defaults.include_logic),
        )?;

        let subtract = match &cfg.subtract_filter {
            Some(spec) if !spec.is_empty() => Some(Filter::compile(
                Some(spec),
                cfg.subtract_filter_logic.unwrap_or(defaults.subtract_logic),
            )?),
            _ => None,
        };

        let grouping = grouping_key(kind, cfg)?;
        let quantity_type = quantity.quantity_type();

        Ok(Self {
            name: name.to_string(),
            kind,
            description: cfg.description.clone().unwrap_or_default(),
            entity_type,
            quantity,
            include,
            subtract,
            grouping,
            unit: cfg
                .unit
                .clone()
                .unwrap_or_else(|| quantity_type.default_unit().to_string()),
            category: cfg
                .category
                .clone()
                .unwrap_or_else(|| quantity_type.as_str().to_string()),
            required: cfg.required,
        })
    }

    pub fn is_grouped(&self) -> bool {
        self.grouping.is_some()
    }
}

fn grouping_key(
    kind: MetricKind,
    cfg: &MetricConfig,
) -> Result<Option<GroupingKey>, ConfigError> {
    let attribute = cfg.grouping_attribute.as_deref();
    let relation = cfg.grouping_relation.as_deref();

    match (kind, relation, attribute) {
        (MetricKind::RoomBased, None, _) => Err(ConfigError::invalid(
            "room-based metrics need a `grouping_relation`",
        )),
        (MetricKind::GroupedByAttribute, _, None) => Err(ConfigError::invalid(
            "grouped metrics need a `grouping_attribute`",
        )),
        (MetricKind::GroupedByAttribute, _, Some(attr)) => {
            Ok(Some(GroupingKey::Attribute(FieldPath::parse(attr)?)))
        }
        (_, Some(rel), attr) => Ok(Some(GroupingKey::Relation {
            relation: RelationRef::parse(rel)?,
            attribute: FieldPath::parse(attr.unwrap_or(DEFAULT_ROOM_ATTRIBUTE))?,
        })),
        (MetricKind::Standard, None, Some(attr)) => {
            Ok(Some(GroupingKey::Attribute(FieldPath::parse(attr)?)))
        }
        (MetricKind::Standard, None, None) => Ok(None),
    }
}

/// Every metric of one configuration, compiled and checked as a whole.
#[derive(Debug, Clone, Default)]
pub struct MetricSet {
    pub metrics: Vec<MetricDefinition>,
    pub derived: DerivedSet,
}

impl MetricSet {
    /// Compile all metric sections. Fails on the first configuration error.
    pub fn compile(cfg: &TakeoffConfig, defaults: &MetricDefaults) -> Result<Self, ConfigError> {
        let mut metrics = Vec::new();
        let mut seen = BTreeSet::new();

        for (kind, section) in [
            (MetricKind::Standard, &cfg.metrics),
            (MetricKind::RoomBased, &cfg.room_based_metrics),
            (MetricKind::GroupedByAttribute, &cfg.grouped_by_attribute_metrics),
        ] {
            for (name, metric_cfg) in section.iter() {
                if !seen.insert(name.to_string()) {
                    return Err(ConfigError::DuplicateName {
                        name: name.to_string(),
                    });
                }
                for key in metric_cfg.extra.keys() {
                    warn!(metric = %name, key = %key, "ignoring unrecognized metric key");
                }
                let def = MetricDefinition::compile(name, kind, metric_cfg, defaults)?;
                debug!(
                    metric = %def.name,
                    section = kind.section(),
                    entity_type = %def.entity_type,
                    source = %def.quantity.describe(),
                    "compiled metric"
                );
                metrics.push(def);
            }
        }

        for name in cfg.derived_metrics.names() {
            if seen.contains(name) {
                return Err(ConfigError::DuplicateName {
                    name: name.to_string(),
                });
            }
        }

        let base: BTreeSet<String> = metrics
            .iter()
            .filter(|m| !m.is_grouped())
            .map(|m| m.name.clone())
            .collect();
        let grouped: BTreeSet<String> = metrics
            .iter()
            .filter(|m| m.is_grouped())
            .map(|m| m.name.clone())
            .collect();
        let derived = DerivedSet::compile(&cfg.derived_metrics, &base, &grouped)?;

        Ok(Self { metrics, derived })
    }

    pub fn len(&self) -> usize {
        self.metrics.len() + self.derived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
