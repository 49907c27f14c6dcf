use crate::error::ConfigError;
use std::borrow::Cow;
use std::fmt;
use takeoff_types::{Element, Scalar};

/// A filter key or mutation target, parsed once at configuration load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    /// `type` / `IfcEntity`: the element type tag, unless a direct attribute
    /// of the same name exists.
    TypeTag { key: String },

    /// Undotted direct attribute.
    Attribute(String),

    /// `Set.Property`. The literal dotted attribute is still tried first.
    Property {
        raw: String,
        set: String,
        property: String,
    },
}

impl FieldPath {
    pub fn parse(key: &str) -> Result<Self, ConfigError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::EmptyField);
        }

        match key.matches('.').count() {
            0 if is_type_key(key) => Ok(FieldPath::TypeTag {
                key: key.to_string(),
            }),
            0 => Ok(FieldPath::Attribute(key.to_string())),
            1 => {
                let (set, property) = key.split_once('.').ok_or_else(|| malformed(key))?;
                let (set, property) = (set.trim(), property.trim());
                if set.is_empty() || property.is_empty() {
                    return Err(malformed(key));
                }
                Ok(FieldPath::Property {
                    raw: key.to_string(),
                    set: set.to_string(),
                    property: property.to_string(),
                })
            }
            _ => Err(malformed(key)),
        }
    }

    /// Parse a mutation target. The type tag cannot be written.
    pub fn parse_writable(key: &str) -> Result<Self, ConfigError> {
        match Self::parse(key)? {
            FieldPath::TypeTag { key } => Err(ConfigError::ReservedField { field: key }),
            other => Ok(other),
        }
    }

    /// Look the field up on one element. Missing fields resolve to `None`.
    pub fn resolve<'e>(&self, element: &'e Element) -> Option<Cow<'e, Scalar>> {
        match self {
            FieldPath::TypeTag { key } => Some(match element.attribute(key) {
                Some(v) => Cow::Borrowed(v),
                None => Cow::Owned(Scalar::String(element.entity_type.clone())),
            }),
            FieldPath::Attribute(name) => element.attribute(name).map(Cow::Borrowed),
            FieldPath::Property { raw, set, property } => element
                .attribute(raw)
                .or_else(|| element.property(set, property))
                .map(Cow::Borrowed),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldPath::TypeTag { key } => key,
            FieldPath::Attribute(name) => name,
            FieldPath::Property { raw, .. } => raw,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_type_key(key: &str) -> bool {
    key.eq_ignore_ascii_case("type") || key.eq_ignore_ascii_case("ifcentity")
}

fn malformed(key: &str) -> ConfigError {
    ConfigError::MalformedPath {
        path: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> Element {
        Element::new("w1", "IfcWall")
            .with_attribute("Name", "Basic Wall")
            .with_property("Pset_WallCommon", "IsExternal", true)
    }

    #[test]
    fn parses_each_shape() {
        assert_eq!(
            FieldPath::parse("Name").expect("parse"),
            FieldPath::Attribute("Name".to_string())
        );
        assert!(matches!(
            FieldPath::parse("type").expect("parse"),
            FieldPath::TypeTag { .. }
        ));
        assert_eq!(
            FieldPath::parse("Pset_WallCommon.IsExternal").expect("parse"),
            FieldPath::Property {
                raw: "Pset_WallCommon.IsExternal".to_string(),
                set: "Pset_WallCommon".to_string(),
                property: "IsExternal".to_string(),
            }
        );
    }

    #[test]
    fn rejects_deep_and_empty_paths() {
        assert!(matches!(
            FieldPath::parse("A.B.C"),
            Err(ConfigError::MalformedPath { .. })
        ));
        assert!(matches!(
            FieldPath::parse("A."),
            Err(ConfigError::MalformedPath { .. })
        ));
        assert_eq!(FieldPath::parse("  "), Err(ConfigError::EmptyField));
    }

    #[test]
    fn type_tag_is_not_writable() {
        assert!(matches!(
            FieldPath::parse_writable("type"),
            Err(ConfigError::ReservedField { .. })
        ));
        assert!(FieldPath::parse_writable("LongName").is_ok());
    }

    #[test]
    fn resolves_attribute_then_property() {
        let e = wall();
        let name = FieldPath::parse("Name").expect("parse");
        assert_eq!(name.resolve(&e).as_deref(), Some(&Scalar::from("Basic Wall")));

        let ty = FieldPath::parse("type").expect("parse");
        assert_eq!(ty.resolve(&e).as_deref(), Some(&Scalar::from("IfcWall")));

        let ext = FieldPath::parse("Pset_WallCommon.IsExternal").expect("parse");
        assert_eq!(ext.resolve(&e).as_deref(), Some(&Scalar::from(true)));

        let missing = FieldPath::parse("Pset_WallCommon.FireRating").expect("parse");
        assert!(missing.resolve(&e).is_none());
    }

    #[test]
    fn literal_dotted_attribute_wins() {
        let e = wall().with_attribute("Pset_WallCommon.IsExternal", false);
        let ext = FieldPath::parse("Pset_WallCommon.IsExternal").expect("parse");
        assert_eq!(ext.resolve(&e).as_deref(), Some(&Scalar::from(false)));
    }
}
