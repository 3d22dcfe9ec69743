//! Label selectors.
//!
//! Dynamic claims use a selector to pick the range they allocate from. The
//! shape follows the usual `match_labels` / `match_expressions` pair; all
//! requirements must hold for a label set to match.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::labels::Labels;

/// Operator of a selector expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// A single requirement on one label key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl SelectorRequirement {
    pub fn matches(&self, labels: &Labels) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::In => value.is_some_and(|v| self.values.contains(v)),
            SelectorOperator::NotIn => value.map_or(true, |v| !self.values.contains(v)),
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
        }
    }
}

/// Label selector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<SelectorRequirement>,
}

impl LabelSelector {
    /// Selector requiring `key=value`
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    pub fn with_expression(mut self, requirement: SelectorRequirement) -> Self {
        self.match_expressions.push(requirement);
        self
    }

    /// An empty selector matches nothing; it would otherwise select every entry
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        if self.is_empty() {
            return false;
        }
        self.match_labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
            && self.match_expressions.iter().all(|req| req.matches(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_match_labels() {
        let selector = LabelSelector::default().with_label("site", "ams");
        assert!(selector.matches(&labels(&[("site", "ams"), ("rack", "1")])));
        assert!(!selector.matches(&labels(&[("site", "fra")])));
        assert!(!selector.matches(&labels(&[])));
    }

    #[test]
    fn test_expressions() {
        let selector = LabelSelector::default()
            .with_expression(SelectorRequirement {
                key: "site".to_string(),
                operator: SelectorOperator::In,
                values: vec!["ams".to_string(), "fra".to_string()],
            })
            .with_expression(SelectorRequirement {
                key: "legacy".to_string(),
                operator: SelectorOperator::DoesNotExist,
                values: Vec::new(),
            });

        assert!(selector.matches(&labels(&[("site", "fra")])));
        assert!(!selector.matches(&labels(&[("site", "fra"), ("legacy", "yes")])));
        assert!(!selector.matches(&labels(&[("site", "lon")])));

        let not_in = SelectorRequirement {
            key: "site".to_string(),
            operator: SelectorOperator::NotIn,
            values: vec!["ams".to_string()],
        };
        assert!(not_in.matches(&labels(&[])));
        assert!(!not_in.matches(&labels(&[("site", "ams")])));
    }

    #[test]
    fn test_empty_selector_matches_nothing() {
        assert!(!LabelSelector::default().matches(&labels(&[("site", "ams")])));
    }
}
