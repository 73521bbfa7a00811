use serde::{Deserialize, Serialize};

use crate::action::{Action, AliasTable};
use crate::condition::Condition;
use crate::subject::ALL_SUBJECTS;

/// One additive grant: `actions` on `subjects`, optionally limited by a
/// field condition and to a subset of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub actions: Vec<Action>,
    pub subjects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl Rule {
    pub fn new<S: Into<String>>(
        actions: impl IntoIterator<Item = Action>,
        subjects: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            actions: actions.into_iter().collect(),
            subjects: subjects.into_iter().map(Into::into).collect(),
            condition: None,
            fields: None,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn on_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_unconditional(&self) -> bool {
        self.condition.is_none()
    }

    /// True when the rule grants `action` on `subject_type`, ignoring any
    /// condition.
    pub fn applies_to(&self, action: Action, subject_type: &str) -> bool {
        self.actions.iter().any(|granted| granted.covers(action))
            && self
                .subjects
                .iter()
                .any(|s| s == subject_type || s == ALL_SUBJECTS)
    }
}

/// The ordered rules compiled for one principal within one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySet {
    rules: Vec<Rule>,
    #[serde(skip)]
    aliases: AliasTable,
}

impl PolicySet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self::with_aliases(rules, AliasTable::default())
    }

    pub fn with_aliases(rules: Vec<Rule>, aliases: AliasTable) -> Self {
        Self { rules, aliases }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn resolve(&self, verb: &str) -> Option<Action> {
        self.aliases.resolve(verb)
    }

    /// Rules granting `action` on `subject_type`, in declaration order.
    pub fn rules_for<'a>(
        &'a self,
        action: Action,
        subject_type: &'a str,
    ) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules
            .iter()
            .filter(move |rule| rule.applies_to(action, subject_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn applies_to_honours_wildcards() {
        let manage = Rule::new([Action::Manage], ["users", "rooms"]);
        assert!(manage.applies_to(Action::Delete, "rooms"));
        assert!(!manage.applies_to(Action::Delete, "reservations"));

        let everything = Rule::new([Action::Read], [ALL_SUBJECTS]);
        assert!(everything.applies_to(Action::Read, "qrcodes"));
        assert!(!everything.applies_to(Action::Create, "qrcodes"));
    }

    #[test]
    fn rules_for_preserves_declaration_order() {
        let policy = PolicySet::new(vec![
            Rule::new([Action::Read], ["rooms"]),
            Rule::new([Action::Create], ["rooms"]),
            Rule::new([Action::Manage], ["rooms"]).when(Condition::eq("open", json!(true))),
        ]);
        let matched: Vec<_> = policy.rules_for(Action::Read, "rooms").collect();
        assert_eq!(matched.len(), 2);
        assert!(matched[0].is_unconditional());
        assert!(!matched[1].is_unconditional());
    }

    #[test]
    fn serializes_without_empty_optionals() {
        let rule = Rule::new([Action::Update], ["seatStatus"]);
        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({"actions": ["update"], "subjects": ["seatStatus"]})
        );
    }
}
