//! Per-word-path storage of every priority layer's definition.

use std::collections::BTreeMap;
use std::sync::Arc;

use tooltree_core::ToolDefinition;

/// An alias: a word path standing for another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub words: Vec<String>,
    pub target: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) enum SlotEntry {
    /// Still open to further configuration at this priority.
    Pending(ToolDefinition),
    Finished(Arc<ToolDefinition>),
    Alias(Alias),
}

impl SlotEntry {
    pub(crate) fn tool(&self) -> Option<&ToolDefinition> {
        match self {
            Self::Pending(tool) => Some(tool),
            Self::Finished(tool) => Some(tool),
            Self::Alias(_) => None,
        }
    }
}

/// Every priority layer's entry for one word path.
///
/// The current entry is the one at the active priority if some layer
/// claimed it, else the one at the top priority. The active priority
/// never decreases.
#[derive(Debug, Clone, Default)]
pub(crate) struct NameSlot {
    entries: BTreeMap<i64, SlotEntry>,
    active_priority: Option<i64>,
}

impl NameSlot {
    pub(crate) fn get(&self, priority: i64) -> Option<&SlotEntry> {
        self.entries.get(&priority)
    }

    pub(crate) fn insert(&mut self, priority: i64, entry: SlotEntry) {
        self.entries.insert(priority, entry);
    }

    pub(crate) fn top_priority(&self) -> Option<i64> {
        self.entries.keys().next_back().copied()
    }

    pub(crate) fn active_priority(&self) -> Option<i64> {
        self.active_priority
    }

    pub(crate) fn can_activate(&self, priority: i64) -> bool {
        self.active_priority.is_none_or(|active| priority >= active)
    }

    /// Claims `priority` as active. Returns `false` if a higher claim
    /// already exists.
    pub(crate) fn activate(&mut self, priority: i64) -> bool {
        if !self.can_activate(priority) {
            return false;
        }
        self.active_priority = Some(priority);
        true
    }

    pub(crate) fn current_priority(&self) -> Option<i64> {
        self.active_priority
            .filter(|p| self.entries.contains_key(p))
            .or_else(|| self.top_priority())
    }

    pub(crate) fn current(&self) -> Option<(i64, &SlotEntry)> {
        let priority = self.current_priority()?;
        self.entries.get(&priority).map(|entry| (priority, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(priority: i64) -> SlotEntry {
        SlotEntry::Pending(ToolDefinition::new(vec!["a".into()], priority))
    }

    #[test]
    fn test_top_when_nothing_active() {
        let mut slot = NameSlot::default();
        slot.insert(-1, tool(-1));
        slot.insert(2, tool(2));
        assert_eq!(slot.top_priority(), Some(2));
        assert_eq!(slot.current().map(|(p, _)| p), Some(2));
    }

    #[test]
    fn test_active_overrides_top() {
        let mut slot = NameSlot::default();
        slot.insert(-1, tool(-1));
        slot.insert(2, tool(2));
        assert!(slot.activate(-1));
        assert_eq!(slot.current().map(|(p, _)| p), Some(-1));
    }

    #[test]
    fn test_active_never_decreases() {
        let mut slot = NameSlot::default();
        assert!(slot.activate(1));
        assert!(!slot.activate(-3));
        assert_eq!(slot.active_priority(), Some(1));
        assert!(slot.activate(4));
        assert_eq!(slot.active_priority(), Some(4));
    }
}
