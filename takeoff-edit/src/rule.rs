use takeoff_domain::{ConfigError, FieldPath, Filter};
use takeoff_types::config::{ActionConfig, FilterLogic, RepairConfig};
use takeoff_types::diagnostic::Diagnostic;
use takeoff_types::{Named, Scalar};
use tracing::warn;

/// One field write.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub field: FieldPath,
    pub value: Scalar,
}

/// A compiled repair rule: a filter plus ordered mutations.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairRule {
    pub name: String,
    pub description: String,
    pub filter: Filter,
    pub mutations: Vec<Mutation>,
}

impl RepairRule {
    pub fn compile(name: &str, cfg: &RepairConfig) -> Result<Self, ConfigError> {
        Self::compile_inner(name, cfg).map_err(|e| e.within(format!("repair rule `{name}`")))
    }

    fn compile_inner(name: &str, cfg: &RepairConfig) -> Result<Self, ConfigError> {
        let body = cfg.body();

        let spec = body
            .filter
            .as_ref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::invalid("missing `filter`"))?;
        let filter = Filter::compile(Some(spec), FilterLogic::And)?;

        let mut mutations = Vec::with_capacity(body.actions.len());
        for action in &body.actions {
            match action {
                ActionConfig::ChangeValue { field, value } => mutations.push(Mutation {
                    field: FieldPath::parse_writable(field)?,
                    value: value.clone(),
                }),
            }
        }

        Ok(Self {
            name: name.to_string(),
            description: cfg.description.clone().unwrap_or_default(),
            filter,
            mutations,
        })
    }
}

/// Compile every rule in declaration order. Fails on the first configuration error.
pub fn compile_rules(rules: &Named<RepairConfig>) -> Result<Vec<RepairRule>, ConfigError> {
    let mut out = Vec::with_capacity(rules.len());
    for (name, cfg) in rules.iter() {
        for key in cfg.extra.keys() {
            warn!(rule = %name, key = %key, "ignoring unrecognized repair key");
        }
        out.push(RepairRule::compile(name, cfg)?);
    }
    Ok(out)
}

/// Collect findings for every repair rule without stopping at the first.
pub fn validate_repairs(rules: &Named<RepairConfig>) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for (name, cfg) in rules.iter() {
        let subject = format!("repairs.{name}");
        for key in cfg.extra.keys() {
            out.push(Diagnostic::warning(
                &subject,
                format!("unrecognized key `{key}` is ignored"),
            ));
        }
        match RepairRule::compile(name, cfg) {
            Ok(rule) if rule.mutations.is_empty() => {
                out.push(Diagnostic::warning(&subject, "rule has no actions"));
            }
            Ok(_) => {}
            Err(e) => out.push(Diagnostic::error(&subject, e.root().to_string())),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use takeoff_types::config::{FilterSpec, RepairBody};

    fn rule(filter: &str, field: &str) -> RepairConfig {
        RepairConfig {
            filter: Some(FilterSpec::Expression(filter.to_string())),
            actions: vec![ActionConfig::ChangeValue {
                field: field.to_string(),
                value: Scalar::from("x"),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn compiles_legacy_wrapper() {
        let cfg = RepairConfig {
            description: Some("rename".to_string()),
            config: Some(RepairBody {
                filter: Some(FilterSpec::Expression("type=IfcSpace".to_string())),
                actions: vec![ActionConfig::ChangeValue {
                    field: "Pset_SpaceCommon.Reference".to_string(),
                    value: Scalar::from("R1"),
                }],
            }),
            ..Default::default()
        };
        let rule = RepairRule::compile("r", &cfg).expect("compile");
        assert_eq!(rule.description, "rename");
        assert_eq!(rule.mutations.len(), 1);
        assert!(matches!(rule.mutations[0].field, FieldPath::Property { .. }));
    }

    #[test]
    fn type_tag_cannot_be_written() {
        let err = RepairRule::compile("r", &rule("type=IfcSpace", "type")).expect_err("reserved");
        assert!(matches!(err.root(), ConfigError::ReservedField { .. }));
    }

    #[test]
    fn deep_paths_are_malformed() {
        let err = RepairRule::compile("r", &rule("type=IfcSpace", "A.B.C")).expect_err("malformed");
        assert!(matches!(err.root(), ConfigError::MalformedPath { .. }));
        assert!(err.to_string().starts_with("repair rule `r`"));
    }

    #[test]
    fn missing_filter_is_an_error() {
        let cfg = RepairConfig {
            filter: None,
            ..rule("", "Name")
        };
        assert!(RepairRule::compile("r", &cfg).is_err());
    }

    #[test]
    fn validation_reports_each_rule() {
        let rules = Named::new()
            .with("ok", rule("type=IfcSpace", "Name"))
            .with("bad", rule("(type=IfcSpace", "Name"))
            .with(
                "empty",
                RepairConfig {
                    actions: vec![],
                    ..rule("type=IfcWall", "Name")
                },
            );
        let diags = validate_repairs(&rules);
        let got: Vec<_> = diags
            .iter()
            .map(|d| (d.subject.as_str(), d.is_error()))
            .collect();
        assert_eq!(got, vec![("repairs.bad", true), ("repairs.empty", false)]);
    }
}
