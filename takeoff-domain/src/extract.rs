use takeoff_types::Element;
use takeoff_types::config::QuantityType;

/// Where a metric reads its per-element number from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantitySource {
    /// Every matching element contributes 1.
    Count,

    /// Read `set.property`, or the direct attribute `property` when `set` is `None`.
    Property {
        quantity: QuantityType,
        set: Option<String>,
        property: String,
    },
}

impl QuantitySource {
    pub fn quantity_type(&self) -> QuantityType {
        match self {
            QuantitySource::Count => QuantityType::Count,
            QuantitySource::Property { quantity, .. } => *quantity,
        }
    }

    pub fn is_count(&self) -> bool {
        matches!(self, QuantitySource::Count)
    }

    /// Human-readable source path for log fields.
    pub fn describe(&self) -> String {
        match self {
            QuantitySource::Count => "count".to_string(),
            QuantitySource::Property {
                set: Some(set),
                property,
                ..
            } => format!("{set}.{property}"),
            QuantitySource::Property {
                set: None,
                property,
                ..
            } => property.clone(),
        }
    }
}

/// Per-element quantity. `None` means the value is missing or not numeric, which
/// is an extraction failure and must not be summed as zero.
pub fn extract(element: &Element, source: &QuantitySource) -> Option<f64> {
    match source {
        QuantitySource::Count => Some(1.0),
        QuantitySource::Property { set, property, .. } => {
            extract_property(element, set.as_deref(), property)
        }
    }
}

pub fn extract_property(element: &Element, set: Option<&str>, property: &str) -> Option<f64> {
    let value = match set {
        Some(set) => element.property(set, property),
        None => element.attribute(property),
    }?;
    value.as_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(set: Option<&str>, property: &str) -> QuantitySource {
        QuantitySource::Property {
            quantity: QuantityType::Area,
            set: set.map(str::to_string),
            property: property.to_string(),
        }
    }

    #[test]
    fn count_is_one_per_element() {
        let e = Element::new("d1", "IfcDoor");
        assert_eq!(extract(&e, &QuantitySource::Count), Some(1.0));
    }

    #[test]
    fn reads_property_set_value() {
        let e = Element::new("s1", "IfcSpace").with_property(
            "Qto_SpaceBaseQuantities",
            "NetFloorArea",
            42.5,
        );
        let src = area(Some("Qto_SpaceBaseQuantities"), "NetFloorArea");
        assert_eq!(extract(&e, &src), Some(42.5));
    }

    #[test]
    fn missing_or_text_values_are_none_not_zero() {
        let e = Element::new("s1", "IfcSpace")
            .with_property("Qto", "NetFloorArea", "n/a")
            .with_attribute("GrossArea", 0.0);
        assert_eq!(extract(&e, &area(Some("Qto"), "NetFloorArea")), None);
        assert_eq!(extract(&e, &area(Some("Qto"), "GrossFloorArea")), None);
        assert_eq!(extract(&e, &area(None, "GrossArea")), Some(0.0));
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let e = Element::new("s1", "IfcSpace").with_property("Qto", "NetFloorArea", "12.5");
        assert_eq!(extract_property(&e, Some("Qto"), "NetFloorArea"), Some(12.5));
    }
}
