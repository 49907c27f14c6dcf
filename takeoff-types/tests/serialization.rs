use pretty_assertions::assert_eq;
use takeoff_types::config::{
    ActionConfig, FilterItem, FilterLogic, FilterSpec, FilterValue, QuantityType, TakeoffConfig,
};
use takeoff_types::element::{Element, ElementsFile};
use takeoff_types::result::{MetricValue, ResultRow, RowStatus};
use takeoff_types::{ElementId, Scalar};

const CONFIG: &str = r#"
metrics:
  gross_floor_area:
    description: Gross floor area
    quantity_type: area
    ifc_entity: IfcSpace
    pset_name: Qto_SpaceBaseQuantities
    prop_name: NetFloorArea
    include_filter:
      Name: GrossArea
    subtract_filter:
      Name: [LUF]
    subtract_filter_logic: OR
  thick_walls:
    type: IfcWall
    include_filter: "Width>0.15 AND NOT IsExternal=true"
    unit: pcs
room_based_metrics:
  windows_per_room:
    ifc_entity: IfcWindow
    quantity_type: count
    room_reference_attribute_guid: ContainedIn
derived_metrics:
  ratio:
    formula: gross_floor_area / thick_walls
repairs:
  rename_trh:
    description: Fix technical room names
    config:
      filter: type=IfcSpace AND LongName=TRH
      actions:
        - change_value:
            field: LongName
            value: Technical Room
unexpected_section: 3
"#;

#[test]
fn parses_full_yaml_document() {
    let cfg: TakeoffConfig = serde_yaml::from_str(CONFIG).expect("parse config");

    let names: Vec<_> = cfg.metrics.names().collect();
    assert_eq!(names, vec!["gross_floor_area", "thick_walls"]);

    let gfa = cfg.metrics.get("gross_floor_area").expect("gfa");
    assert_eq!(gfa.quantity_type, Some(QuantityType::Area));
    assert_eq!(gfa.entity_type.as_deref(), Some("IfcSpace"));
    assert_eq!(gfa.property_set.as_deref(), Some("Qto_SpaceBaseQuantities"));
    assert_eq!(gfa.property.as_deref(), Some("NetFloorArea"));
    assert_eq!(gfa.subtract_filter_logic, Some(FilterLogic::Or));
    assert!(gfa.extra.is_empty());

    let Some(FilterSpec::Mapping(subtract)) = &gfa.subtract_filter else {
        panic!("subtract filter should be a mapping");
    };
    assert_eq!(
        subtract.get("Name"),
        Some(&FilterValue::List(vec![FilterItem::Scalar(Scalar::from("LUF"))]))
    );

    let walls = cfg.metrics.get("thick_walls").expect("walls");
    assert!(matches!(walls.include_filter, Some(FilterSpec::Expression(_))));

    let windows = cfg.room_based_metrics.get("windows_per_room").expect("windows");
    assert_eq!(windows.grouping_relation.as_deref(), Some("ContainedIn"));

    let rule = cfg.repairs.get("rename_trh").expect("rule");
    let body = rule.body();
    assert_eq!(
        body.actions,
        vec![ActionConfig::ChangeValue {
            field: "LongName".to_string(),
            value: Scalar::from("Technical Room"),
        }]
    );

    assert!(cfg.extra.contains_key("unexpected_section"));
}

#[test]
fn unknown_metric_keys_are_captured() {
    let cfg: TakeoffConfig = serde_yaml::from_str(
        r#"
metrics:
  m:
    ifc_entity: IfcSlab
    colour: red
"#,
    )
    .expect("parse config");
    let m = cfg.metrics.get("m").expect("metric");
    assert_eq!(m.extra.keys().collect::<Vec<_>>(), vec!["colour"]);
}

#[test]
fn comparison_tuples_parse_as_lists() {
    let cfg: TakeoffConfig = serde_yaml::from_str(
        r#"
metrics:
  m:
    ifc_entity: IfcWall
    include_filter:
      Width: [">", 0.15]
      Height: [[">=", 2], ["<", 3]]
"#,
    )
    .expect("parse config");
    let Some(FilterSpec::Mapping(filter)) = &cfg.metrics.get("m").expect("m").include_filter else {
        panic!("mapping expected");
    };
    assert_eq!(
        filter.get("Width"),
        Some(&FilterValue::List(vec![
            FilterItem::Scalar(Scalar::from(">")),
            FilterItem::Scalar(Scalar::from(0.15)),
        ]))
    );
    assert!(matches!(
        filter.get("Height"),
        Some(FilterValue::List(items)) if items.iter().all(|i| matches!(i, FilterItem::Tuple(_)))
    ));
}

#[test]
fn elements_file_roundtrip_keeps_shape() {
    let file = ElementsFile::new(vec![
        Element::new("s1", "IfcSpace")
            .with_attribute("LongName", "Office")
            .with_property("Qto_SpaceBaseQuantities", "NetFloorArea", 42.5),
        Element::new("w1", "IfcWindow").with_relation("ContainedIn", "s1"),
    ]);

    let json = serde_json::to_value(&file).expect("serialize");
    assert_eq!(json["schema"], "takeoff.elements.v1");
    assert_eq!(json["elements"][0]["type"], "IfcSpace");
    assert!(json["elements"][1].get("attributes").is_none());

    let back: ElementsFile = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, file);
    assert_eq!(back.elements[1].related("ContainedIn"), &[ElementId::from("s1")]);
}

#[test]
fn result_row_omits_empty_optionals() {
    let row = ResultRow {
        metric_name: "gross_floor_area".to_string(),
        value: MetricValue::Number(85.0),
        unit: "m²".to_string(),
        category: "area".to_string(),
        description: String::new(),
        status: RowStatus::Success,
        error: None,
        group: None,
        element_count: 1,
        missing_values: 0,
        deducted_count: 0,
    };
    let value = serde_json::to_value(&row).expect("serialize");
    assert_eq!(value["status"], "success");
    assert!(value.get("error").is_none());
    assert!(value.get("group").is_none());
}

#[test]
fn repair_actions_parse_plain_and_wrapped() {
    let cfg: TakeoffConfig = serde_yaml::from_str(
        r#"
repairs:
  plain:
    filter: "type=IfcSpace AND LongName=TRH"
    actions:
      - change_value: {field: LongName, value: Technical Room}
      - change_value:
          field: Pset_SpaceCommon.Reference
          value: 3
    note: kept for later
  wrapped:
    description: Legacy layout
    config:
      filter: type=IfcWall
      actions:
        - change_value: {field: Name, value: Wall}
"#,
    )
    .expect("parse repairs");

    let plain = cfg.repairs.get("plain").expect("plain rule");
    assert_eq!(
        plain.body().actions,
        vec![
            ActionConfig::ChangeValue {
                field: "LongName".to_string(),
                value: Scalar::from("Technical Room"),
            },
            ActionConfig::ChangeValue {
                field: "Pset_SpaceCommon.Reference".to_string(),
                value: Scalar::Number(3.0),
            },
        ]
    );
    assert_eq!(plain.extra.keys().collect::<Vec<_>>(), vec!["note"]);

    let wrapped = cfg.repairs.get("wrapped").expect("wrapped rule");
    assert_eq!(
        wrapped.body().actions,
        vec![ActionConfig::ChangeValue {
            field: "Name".to_string(),
            value: Scalar::from("Wall"),
        }]
    );

    let text = serde_yaml::to_string(&cfg).expect("serialize");
    assert!(text.contains("change_value:"));
    let again: TakeoffConfig = serde_yaml::from_str(&text).expect("reparse");
    assert_eq!(again, cfg);
}

#[test]
fn repair_actions_reject_unknown_kinds() {
    let err = serde_yaml::from_str::<TakeoffConfig>(
        "repairs:\n  r:\n    filter: type=IfcSpace\n    actions:\n      - delete_value: {field: Name}\n",
    )
    .expect_err("unknown action");
    assert!(err.to_string().contains("delete_value"));

    let err = serde_yaml::from_str::<TakeoffConfig>(
        "repairs:\n  r:\n    filter: type=IfcSpace\n    actions:\n      - change_value: {field: Name, value: A}\n        change_other: {field: Name, value: B}\n",
    )
    .expect_err("two keys");
    assert!(err.to_string().contains("exactly one key"));
}
