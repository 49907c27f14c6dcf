use crate::element::{ElementId, Scalar};
use serde::{Deserialize, Serialize};

/// One applied mutation. Logged even when `old == new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub rule: String,
    pub element_id: ElementId,
    pub field: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Scalar>,

    pub new: Scalar,
    pub changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub rule: String,
    pub matched: u64,
    pub mutations: u64,
    pub changed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub schema: String,
    pub store: String,

    #[serde(default)]
    pub entries: Vec<ChangeEntry>,

    #[serde(default)]
    pub rules: Vec<RuleSummary>,
}

impl ChangeLog {
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            schema: crate::schema::TAKEOFF_CHANGES_V1.to_string(),
            store: store.into(),
            entries: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn changed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.changed).count()
    }

    /// True when no entry altered a value.
    pub fn is_noop(&self) -> bool {
        self.changed_count() == 0
    }
}
