//! Flag groups and their occurrence constraints.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::UsageError;

/// Constraint applied to the flags of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagGroupKind {
    /// No constraint.
    #[default]
    Optional,
    /// Every flag in the group must be given.
    Required,
    ExactlyOne,
    AtMostOne,
    AtLeastOne,
}

/// A set of flag keys sharing a constraint and a heading.
///
/// Every tool has an unnamed default group of kind
/// [`FlagGroupKind::Optional`] holding flags declared without a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagGroup {
    kind: FlagGroupKind,
    name: Option<String>,
    desc: String,
    flag_keys: Vec<String>,
}

impl FlagGroup {
    pub fn new(kind: FlagGroupKind, name: Option<String>, desc: impl Into<String>) -> Self {
        Self {
            kind,
            name,
            desc: desc.into(),
            flag_keys: Vec::new(),
        }
    }

    pub fn kind(&self) -> FlagGroupKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn flag_keys(&self) -> &[String] {
        &self.flag_keys
    }

    pub fn is_empty(&self) -> bool {
        self.flag_keys.is_empty()
    }

    pub(crate) fn add_flag_key(&mut self, key: &str) {
        if !self.flag_keys.iter().any(|k| k == key) {
            self.flag_keys.push(key.to_string());
        }
    }

    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "flags".to_string())
    }

    /// Checks the group against the set of flag keys given on the command
    /// line. `display` maps a key to the name shown in errors.
    pub fn validate(
        &self,
        seen: &BTreeSet<String>,
        display: impl Fn(&str) -> String,
    ) -> Vec<UsageError> {
        let given: Vec<String> = self
            .flag_keys
            .iter()
            .filter(|k| seen.contains(k.as_str()))
            .map(|k| display(k))
            .collect();
        let all = || self.flag_keys.iter().map(|k| display(k)).collect::<Vec<_>>();
        match self.kind {
            FlagGroupKind::Optional => Vec::new(),
            FlagGroupKind::Required => self
                .flag_keys
                .iter()
                .filter(|k| !seen.contains(k.as_str()))
                .map(|k| UsageError::FlagRequired { flag: display(k) })
                .collect(),
            FlagGroupKind::ExactlyOne | FlagGroupKind::AtLeastOne if given.is_empty() => {
                vec![UsageError::FlagGroupRequiresOne {
                    group: self.label(),
                    flags: all(),
                }]
            }
            FlagGroupKind::ExactlyOne | FlagGroupKind::AtMostOne if given.len() > 1 => {
                vec![UsageError::FlagGroupConflict {
                    group: self.label(),
                    flags: given,
                }]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(kind: FlagGroupKind) -> FlagGroup {
        let mut group = FlagGroup::new(kind, Some("mode".into()), "");
        group.add_flag_key("fast");
        group.add_flag_key("slow");
        group
    }

    fn seen(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn show(key: &str) -> String {
        format!("--{key}")
    }

    #[test]
    fn test_required_group_reports_each_missing_flag() {
        let errors = group(FlagGroupKind::Required).validate(&seen(&["fast"]), show);
        assert_eq!(errors, vec![UsageError::FlagRequired { flag: "--slow".into() }]);
    }

    #[test]
    fn test_exactly_one() {
        let g = group(FlagGroupKind::ExactlyOne);
        assert!(g.validate(&seen(&["slow"]), show).is_empty());
        assert!(matches!(
            g.validate(&seen(&[]), show).as_slice(),
            [UsageError::FlagGroupRequiresOne { .. }]
        ));
        assert!(matches!(
            g.validate(&seen(&["fast", "slow"]), show).as_slice(),
            [UsageError::FlagGroupConflict { .. }]
        ));
    }

    #[test]
    fn test_at_most_and_at_least_one() {
        assert!(group(FlagGroupKind::AtMostOne).validate(&seen(&[]), show).is_empty());
        assert_eq!(
            group(FlagGroupKind::AtLeastOne).validate(&seen(&[]), show).len(),
            1
        );
        assert!(group(FlagGroupKind::AtLeastOne)
            .validate(&seen(&["fast", "slow"]), show)
            .is_empty());
    }

    #[test]
    fn test_duplicate_keys_ignored() {
        let mut g = group(FlagGroupKind::Optional);
        g.add_flag_key("fast");
        assert_eq!(g.flag_keys(), ["fast", "slow"]);
    }
}
