use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Relative tolerance used when comparing numbers for equality.
pub const NUMERIC_TOLERANCE: f64 = 1e-9;

/// Stable element identifier, unique within one store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for ElementId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

// Loaders emit either GlobalId strings or numeric step ids.
impl<'de> Deserialize<'de> for ElementId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => ElementId(s),
            Raw::Unsigned(n) => ElementId(n.to_string()),
            Raw::Signed(n) => ElementId(n.to_string()),
        })
    }
}

/// A flat attribute or property value.
///
/// Nulls, arrays and maps are rejected at deserialization time, which is what keeps
/// element data at most two levels deep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    /// Numeric view of the value. Strings that parse as a finite float count as numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) if n.is_finite() => Some(*n),
            Scalar::Number(_) | Scalar::Bool(_) => None,
            Scalar::String(s) => parse_number(s),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Number(_) => "number",
            Scalar::String(_) => "string",
        }
    }

    /// Equality used by filters: case-insensitive for strings, numeric across
    /// number/numeric-string pairs, and `"true"`/`"false"` against booleans.
    pub fn loosely_equals(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) => numbers_equal(*a, *b),
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::String(a), Scalar::String(b)) => a == b || a.to_lowercase() == b.to_lowercase(),
            (Scalar::Number(n), Scalar::String(s)) | (Scalar::String(s), Scalar::Number(n)) => {
                parse_number(s).is_some_and(|v| numbers_equal(*n, v))
            }
            (Scalar::Bool(b), Scalar::String(s)) | (Scalar::String(s), Scalar::Bool(b)) => {
                parse_bool(s) == Some(*b)
            }
            (Scalar::Number(_), Scalar::Bool(_)) | (Scalar::Bool(_), Scalar::Number(_)) => false,
        }
    }

    /// Convert `self` to the kind of `existing` when that is lossless, otherwise keep it.
    pub fn coerce_like(self, existing: &Scalar) -> Scalar {
        match (existing, &self) {
            (Scalar::Number(_), Scalar::String(s)) => match parse_number(s) {
                Some(n) => Scalar::Number(n),
                None => self,
            },
            (Scalar::Bool(_), Scalar::String(s)) => match parse_bool(s) {
                Some(b) => Scalar::Bool(b),
                None => self,
            },
            (Scalar::String(_), Scalar::Number(n)) => Scalar::String(n.to_string()),
            (Scalar::String(_), Scalar::Bool(b)) => Scalar::String(b.to_string()),
            _ => self,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

pub fn numbers_equal(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= NUMERIC_TOLERANCE * scale
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// One selectable model item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,

    /// Open vocabulary type tag (`IfcSpace`, `IfcWall`, ...).
    #[serde(rename = "type")]
    pub entity_type: String,

    #[serde(
        default,
        alias = "direct_attributes",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub attributes: BTreeMap<String, Scalar>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub property_sets: BTreeMap<String, BTreeMap<String, Scalar>>,

    /// Named references to other elements (containment, adjacency).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, Vec<ElementId>>,
}

impl Element {
    pub fn new(id: impl Into<ElementId>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            attributes: BTreeMap::new(),
            property_sets: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_property(
        mut self,
        set: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<Scalar>,
    ) -> Self {
        self.property_sets
            .entry(set.into())
            .or_default()
            .insert(property.into(), value.into());
        self
    }

    pub fn with_relation(mut self, name: impl Into<String>, target: impl Into<ElementId>) -> Self {
        self.relations
            .entry(name.into())
            .or_default()
            .push(target.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Scalar> {
        self.attributes.get(name)
    }

    /// Property lookup. Set and property names match exactly first, then ignoring ASCII case.
    pub fn property(&self, set: &str, property: &str) -> Option<&Scalar> {
        let props = self.property_sets.get(matching_key(&self.property_sets, set)?)?;
        props.get(matching_key(props, property)?)
    }

    /// Stored `(set, property)` names that a write to `set.property` lands on.
    ///
    /// Resolves names like [`Element::property`], so a write is visible to the same
    /// lookup. Names not present yet are kept as given.
    pub fn property_slot(&self, set: &str, property: &str) -> (String, String) {
        let Some(set_key) = matching_key(&self.property_sets, set) else {
            return (set.to_string(), property.to_string());
        };
        let prop_key = self
            .property_sets
            .get(set_key)
            .and_then(|props| matching_key(props, property))
            .unwrap_or(property);
        (set_key.to_string(), prop_key.to_string())
    }

    pub fn related(&self, relation: &str) -> &[ElementId] {
        self.relations
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn matching_key<'m, V>(map: &'m BTreeMap<String, V>, key: &str) -> Option<&'m str> {
    if let Some((k, _)) = map.get_key_value(key) {
        return Some(k);
    }
    map.keys()
        .find(|k| k.eq_ignore_ascii_case(key))
        .map(String::as_str)
}

/// On-disk store document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementsFile {
    #[serde(default = "default_elements_schema")]
    pub schema: String,
    pub elements: Vec<Element>,
}

impl ElementsFile {
    pub fn new(elements: Vec<Element>) -> Self {
        Self {
            schema: default_elements_schema(),
            elements,
        }
    }
}

fn default_elements_schema() -> String {
    crate::schema::TAKEOFF_ELEMENTS_V1.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_names_fold_case_after_exact_match() {
        let e = Element::new("s1", "IfcSpace")
            .with_property("Pset_X", "Cat", "A")
            .with_property("pset_x", "cat", "exact");
        assert_eq!(e.property("Pset_X", "Cat"), Some(&Scalar::from("A")));
        assert_eq!(e.property("pset_x", "cat"), Some(&Scalar::from("exact")));
        assert_eq!(e.property("PSET_X", "CAT"), Some(&Scalar::from("A")));
        assert_eq!(e.property("Pset_X", "Other"), None);
    }

    #[test]
    fn property_slot_reuses_stored_names() {
        let e = Element::new("s1", "IfcSpace").with_property("Pset_X", "Cat", "A");
        assert_eq!(
            e.property_slot("pset_x", "CAT"),
            ("Pset_X".to_string(), "Cat".to_string())
        );
        assert_eq!(
            e.property_slot("pset_x", "New"),
            ("Pset_X".to_string(), "New".to_string())
        );
        assert_eq!(
            e.property_slot("Qto_New", "Area"),
            ("Qto_New".to_string(), "Area".to_string())
        );
    }

    #[test]
    fn string_equality_ignores_case() {
        assert!(Scalar::from("GrossArea").loosely_equals(&Scalar::from("grossarea")));
        assert!(!Scalar::from("GrossArea").loosely_equals(&Scalar::from("LUF")));
    }

    #[test]
    fn numeric_strings_compare_as_numbers() {
        assert!(Scalar::from(0.2).loosely_equals(&Scalar::from("0.20")));
        assert_eq!(Scalar::from(" 12.5 ").as_number(), Some(12.5));
        assert_eq!(Scalar::from("wide").as_number(), None);
        assert_eq!(Scalar::from(true).as_number(), None);
    }

    #[test]
    fn bools_match_their_spelling() {
        assert!(Scalar::from(true).loosely_equals(&Scalar::from("TRUE")));
        assert!(!Scalar::from(false).loosely_equals(&Scalar::from(0.0)));
    }

    #[test]
    fn coerce_keeps_existing_kind_when_lossless() {
        let existing = Scalar::from(3.0);
        assert_eq!(Scalar::from("4").coerce_like(&existing), Scalar::from(4.0));
        assert_eq!(
            Scalar::from("four").coerce_like(&existing),
            Scalar::from("four")
        );
        assert_eq!(
            Scalar::from(2.5).coerce_like(&Scalar::from("x")),
            Scalar::from("2.5")
        );
    }

    #[test]
    fn element_id_accepts_integers() {
        let id: ElementId = serde_json::from_str("17").expect("parse id");
        assert_eq!(id.as_str(), "17");
        let id: ElementId = serde_json::from_str("\"2O2Fr$t4X7Zf8NOew3FLOH\"").expect("parse id");
        assert_eq!(id.as_str(), "2O2Fr$t4X7Zf8NOew3FLOH");
    }

    #[test]
    fn nested_property_values_are_rejected() {
        let json = r#"{"id": 1, "type": "IfcWall", "property_sets": {"Pset": {"Width": {"deep": 1}}}}"#;
        assert!(serde_json::from_str::<Element>(json).is_err());
    }

    #[test]
    fn related_defaults_to_empty() {
        let e = Element::new("w1", "IfcWindow").with_relation("ContainedIn", "s1");
        assert_eq!(e.related("ContainedIn"), &[ElementId::from("s1")]);
        assert!(e.related("Adjacent").is_empty());
    }
}
