use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub destination: String,
    #[serde(default)]
    pub expression: String,
}

/// Raw mapping as written in the config file: either an ordered list of
/// entries or an object keyed by destination column. Expressions are
/// validated later against live metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingSpec {
    List(Vec<MappingEntry>),
    Object(BTreeMap<String, String>),
}

impl MappingSpec {
    pub fn to_raw(&self) -> Vec<(String, String)> {
        match self {
            MappingSpec::List(entries) => entries
                .iter()
                .map(|e| (e.destination.clone(), e.expression.clone()))
                .collect(),
            MappingSpec::Object(map) => map
                .iter()
                .map(|(d, e)| (d.clone(), e.clone()))
                .collect(),
        }
    }
}

impl From<Vec<(String, String)>> for MappingSpec {
    fn from(raw: Vec<(String, String)>) -> Self {
        MappingSpec::List(
            raw.into_iter()
                .map(|(destination, expression)| MappingEntry {
                    destination,
                    expression,
                })
                .collect(),
        )
    }
}
