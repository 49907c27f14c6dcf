use crate::condition::Condition;
use crate::error::ConfigError;
use crate::expr;
use crate::path::FieldPath;
use std::collections::BTreeMap;
use takeoff_types::Element;
use takeoff_types::config::{FilterLogic, FilterSpec, FilterValue};

/// A compiled filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Empty filter; the identity for selection.
    MatchAll,
    Test {
        path: FieldPath,
        condition: Condition,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Compile a filter as written in configuration.
    ///
    /// `logic` combines the keys of a mapping filter and is ignored for string
    /// expressions, which carry their own connectives.
    pub fn compile(spec: Option<&FilterSpec>, logic: FilterLogic) -> Result<Self, ConfigError> {
        match spec {
            None => Ok(Filter::MatchAll),
            Some(FilterSpec::Expression(src)) => Self::parse(src),
            Some(FilterSpec::Mapping(map)) => Self::from_mapping(map, logic),
        }
    }

    pub fn from_mapping(
        map: &BTreeMap<String, FilterValue>,
        logic: FilterLogic,
    ) -> Result<Self, ConfigError> {
        if map.is_empty() {
            return Ok(Filter::MatchAll);
        }
        let mut tests = Vec::with_capacity(map.len());
        for (key, value) in map {
            tests.push(Filter::Test {
                path: FieldPath::parse(key)?,
                condition: Condition::compile(key, value)?,
            });
        }
        Ok(match logic {
            FilterLogic::And => Filter::And(tests),
            FilterLogic::Or => Filter::Or(tests),
        })
    }

    /// Parse the string grammar (`key=value`, `AND`, `OR`, `NOT`, parentheses).
    pub fn parse(src: &str) -> Result<Self, ConfigError> {
        expr::parse(src)
    }

    pub fn matches(&self, element: &Element) -> bool {
        match self {
            Filter::MatchAll => true,
            Filter::Test { path, condition } => condition.evaluate(path.resolve(element).as_deref()),
            Filter::And(parts) => parts.iter().all(|p| p.matches(element)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(element)),
            Filter::Not(inner) => !inner.matches(element),
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Filter::MatchAll)
    }

    /// Every field path the filter reads, in evaluation order.
    pub fn paths(&self) -> Vec<&FieldPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            Filter::MatchAll => {}
            Filter::Test { path, .. } => out.push(path),
            Filter::And(parts) | Filter::Or(parts) => {
                for p in parts {
                    p.collect_paths(out);
                }
            }
            Filter::Not(inner) => inner.collect_paths(out),
        }
    }
}

pub fn matches(element: &Element, filter: &Filter) -> bool {
    filter.matches(element)
}

/// Compile-and-evaluate in one step, for ad-hoc selection.
pub fn matches_spec(
    element: &Element,
    spec: Option<&FilterSpec>,
    logic: FilterLogic,
) -> Result<bool, ConfigError> {
    Ok(Filter::compile(spec, logic)?.matches(element))
}
