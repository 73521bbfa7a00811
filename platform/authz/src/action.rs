use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical actions a rule can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    /// Wildcard covering every action.
    Manage,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Manage => "manage",
        }
    }

    /// True when a rule granting `self` covers `requested`.
    pub fn covers(self, requested: Action) -> bool {
        self == Action::Manage || self == requested
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps raw service verbs onto canonical actions.
///
/// The table is an explicit value handed to the policy builder; nothing in
/// the crate resolves verbs through global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasTable {
    verbs: HashMap<String, Action>,
}

impl AliasTable {
    pub fn empty() -> Self {
        Self {
            verbs: HashMap::new(),
        }
    }

    pub fn with_alias(mut self, verb: impl Into<String>, action: Action) -> Self {
        self.verbs.insert(verb.into(), action);
        self
    }

    /// Resolves a verb; canonical action names always resolve to themselves.
    pub fn resolve(&self, verb: &str) -> Option<Action> {
        if let Some(action) = self.verbs.get(verb) {
            return Some(*action);
        }
        [
            Action::Create,
            Action::Read,
            Action::Update,
            Action::Delete,
            Action::Manage,
        ]
        .into_iter()
        .find(|action| action.as_str() == verb)
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::empty()
            .with_alias("get", Action::Read)
            .with_alias("find", Action::Read)
            .with_alias("patch", Action::Update)
            .with_alias("remove", Action::Delete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_aliases_cover_service_methods() {
        let aliases = AliasTable::default();
        assert_eq!(aliases.resolve("find"), Some(Action::Read));
        assert_eq!(aliases.resolve("get"), Some(Action::Read));
        assert_eq!(aliases.resolve("patch"), Some(Action::Update));
        assert_eq!(aliases.resolve("update"), Some(Action::Update));
        assert_eq!(aliases.resolve("remove"), Some(Action::Delete));
        assert_eq!(aliases.resolve("create"), Some(Action::Create));
        assert_eq!(aliases.resolve("manage"), Some(Action::Manage));
        assert_eq!(aliases.resolve("publish"), None);
    }

    #[test]
    fn empty_table_still_knows_canonical_names() {
        let aliases = AliasTable::empty();
        assert_eq!(aliases.resolve("delete"), Some(Action::Delete));
        assert_eq!(aliases.resolve("remove"), None);
    }

    #[test]
    fn manage_covers_everything() {
        assert!(Action::Manage.covers(Action::Delete));
        assert!(Action::Read.covers(Action::Read));
        assert!(!Action::Read.covers(Action::Update));
        assert!(!Action::Read.covers(Action::Manage));
    }
}
