//! Single-record checks and query derivation over a [`PolicySet`].

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::filter::{Filter, OR};
use crate::rule::PolicySet;
use crate::subject::Subject;

impl PolicySet {
    /// Whether `verb` is allowed on `subject` right now.
    pub fn can<'s>(&self, verb: &str, subject: impl Into<Subject<'s>>) -> bool {
        self.can_at(verb, subject, Utc::now())
    }

    /// Like [`PolicySet::can`], with relative conditions resolved against
    /// `now`.
    ///
    /// For a bare subject type conditions are not evaluated: any rule
    /// covering the action and type allows.
    pub fn can_at<'s>(&self, verb: &str, subject: impl Into<Subject<'s>>, now: DateTime<Utc>) -> bool {
        let subject = subject.into();
        let Some(action) = self.resolve(verb) else {
            debug!(verb, subject_type = subject.subject_type(), "unknown verb");
            return false;
        };

        let allowed = self
            .rules_for(action, subject.subject_type())
            .any(|rule| match (&rule.condition, subject) {
                (None, _) | (Some(_), Subject::Type(_)) => true,
                (Some(condition), Subject::Record(tagged)) => condition.evaluate(tagged.record, now),
            });
        debug!(%action, subject_type = subject.subject_type(), allowed, "authorization check");
        allowed
    }

    /// Filter selecting the `subject_type` records `verb` is allowed on.
    ///
    /// `None` means nothing is allowed; an empty filter means everything is.
    pub fn derive_query(&self, subject_type: &str, verb: &str) -> Option<Filter> {
        self.derive_query_at(subject_type, verb, Utc::now())
    }

    pub fn derive_query_at(&self, subject_type: &str, verb: &str, now: DateTime<Utc>) -> Option<Filter> {
        let action = self.resolve(verb)?;

        let mut matched = false;
        let mut branches = Vec::new();
        for rule in self.rules_for(action, subject_type) {
            matched = true;
            match &rule.condition {
                None => return Some(Filter::new()),
                Some(condition) => branches.push(condition.to_filter(now).into_value()),
            }
        }
        if !matched {
            return None;
        }
        Some(Filter::clause(OR, Value::Array(branches)).collapse_single_or())
    }

    /// Fields of `schema` the principal may touch when performing `verb` on
    /// `subject_type`.
    pub fn accessible_fields(&self, verb: &str, subject_type: &str, schema: &[String]) -> Vec<String> {
        let Some(action) = self.resolve(verb) else {
            return Vec::new();
        };
        let mut allowed: Vec<String> = Vec::new();
        for rule in self.rules_for(action, subject_type) {
            match &rule.fields {
                None => return schema.to_vec(),
                Some(fields) => {
                    for field in fields {
                        if schema.contains(field) && !allowed.contains(field) {
                            allowed.push(field.clone());
                        }
                    }
                }
            }
        }
        schema
            .iter()
            .filter(|field| allowed.contains(field))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;
    use uuid::Uuid;

    use crate::action::{Action, AliasTable};
    use crate::condition::Condition;
    use crate::policy::{DeploymentMode, PolicyBuilder, Principal, subjects::*};
    use crate::rule::{PolicySet, Rule};
    use crate::subject::Subject;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-16T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn policy_for(principal: Principal, mode: DeploymentMode) -> PolicySet {
        PolicyBuilder::new(AliasTable::default(), mode).build(&principal)
    }

    fn reservation(owner: Uuid, confirmed: bool, expired: bool, age: Duration) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "userId": owner.to_string(),
            "seatId": "seat-7",
            "confirmed": confirmed,
            "expired": expired,
            "createdAt": (now() - age).to_rfc3339(),
        })
    }

    #[test]
    fn anonymous_reads_rooms_but_cannot_reserve() {
        let policy = policy_for(Principal::Anonymous, DeploymentMode::Production);
        let room = json!({"id": "r1", "name": "Library"});
        assert!(policy.can("find", Subject::record(ROOMS, &room)));
        assert!(policy.can("read", ROOMS));
        assert!(policy.can("patch", SEAT_STATUS));
        assert!(!policy.can("create", Subject::record(RESERVATIONS, &json!({}))));
        assert!(!policy.can("create", USERS));
    }

    #[test]
    fn owner_may_cancel_fresh_unconfirmed_reservation() {
        let me = Uuid::new_v4();
        let policy = policy_for(Principal::user(me), DeploymentMode::Production);

        let fresh = reservation(me, false, false, Duration::minutes(1));
        assert!(policy.can_at("remove", Subject::record(RESERVATIONS, &fresh), now()));

        let confirmed = reservation(me, true, false, Duration::minutes(1));
        assert!(!policy.can_at("remove", Subject::record(RESERVATIONS, &confirmed), now()));

        let stale = reservation(me, false, false, Duration::minutes(6));
        assert!(!policy.can_at("remove", Subject::record(RESERVATIONS, &stale), now()));

        let mut seatless = reservation(me, true, true, Duration::days(3));
        seatless["seatId"] = json!(null);
        assert!(policy.can_at("remove", Subject::record(RESERVATIONS, &seatless), now()));

        let theirs = reservation(Uuid::new_v4(), false, false, Duration::minutes(1));
        assert!(!policy.can_at("remove", Subject::record(RESERVATIONS, &theirs), now()));
    }

    #[test]
    fn active_reservations_are_visible_to_every_user() {
        let me = Uuid::new_v4();
        let policy = policy_for(Principal::user(me), DeploymentMode::Production);
        let other = Uuid::new_v4();

        let active = reservation(other, true, false, Duration::hours(1));
        assert!(policy.can("get", Subject::record(RESERVATIONS, &active)));

        let expired = reservation(other, true, true, Duration::hours(1));
        assert!(!policy.can("get", Subject::record(RESERVATIONS, &expired)));

        let mine_expired = reservation(me, true, true, Duration::hours(1));
        assert!(policy.can("get", Subject::record(RESERVATIONS, &mine_expired)));
    }

    #[test]
    fn users_only_read_themselves() {
        let me = Uuid::new_v4();
        let policy = policy_for(Principal::user(me), DeploymentMode::Production);
        let own = json!({"id": me.to_string(), "name": "me"});
        let other = json!({"id": Uuid::new_v4().to_string(), "name": "you"});
        assert!(policy.can("get", Subject::record(USERS, &own)));
        assert!(!policy.can("get", Subject::record(USERS, &other)));
        assert!(!policy.can("patch", Subject::record(USERS, &own)));
    }

    #[test]
    fn admin_manages_core_subjects() {
        let policy = policy_for(Principal::admin(Uuid::new_v4()), DeploymentMode::Production);
        let record = json!({"id": "x", "userId": Uuid::new_v4().to_string(), "expired": true});
        for subject in [USERS, ROOMS, RESERVATIONS] {
            for verb in ["create", "read", "update", "delete", "find", "get", "patch", "remove"] {
                assert!(policy.can(verb, Subject::record(subject, &record)), "{verb} {subject}");
            }
        }
        assert!(policy.can("create", MAILER));
        assert!(!policy.can("delete", SEAT_STATUS));
    }

    #[test]
    fn bootstrap_user_creation_depends_on_mode() {
        let payload = json!({"email": "new@example.com"});
        let dev = policy_for(Principal::Anonymous, DeploymentMode::Development);
        assert!(dev.can("create", Subject::record(USERS, &payload)));
        let prod = policy_for(Principal::Anonymous, DeploymentMode::Production);
        assert!(!prod.can("create", Subject::record(USERS, &payload)));
    }

    #[test]
    fn unknown_verbs_are_denied() {
        let policy = policy_for(Principal::admin(Uuid::new_v4()), DeploymentMode::Development);
        assert!(!policy.can("publish", ROOMS));
        assert_eq!(policy.derive_query(ROOMS, "publish"), None);
    }

    #[test]
    fn type_checks_ignore_conditions() {
        let policy = policy_for(Principal::user(Uuid::new_v4()), DeploymentMode::Production);
        assert!(policy.can("remove", RESERVATIONS));
        assert!(!policy.can("patch", RESERVATIONS));
    }

    #[test]
    fn derived_query_distinguishes_everything_from_nothing() {
        let anon = policy_for(Principal::Anonymous, DeploymentMode::Production);
        assert_eq!(anon.derive_query(ROOMS, "find"), Some(Filter::new()));
        assert_eq!(anon.derive_query(RESERVATIONS, "find"), None);

        let admin = policy_for(Principal::admin(Uuid::new_v4()), DeploymentMode::Production);
        assert_eq!(admin.derive_query(RESERVATIONS, "remove"), Some(Filter::new()));
    }

    #[test]
    fn derived_read_query_is_collapsed() {
        let me = Uuid::new_v4();
        let policy = policy_for(Principal::user(me), DeploymentMode::Production);
        assert_eq!(
            policy.derive_query_at(USERS, "get", now()).unwrap().into_value(),
            json!({"id": me.to_string()})
        );
        assert_eq!(
            policy.derive_query_at(RESERVATIONS, "find", now()).unwrap().into_value(),
            json!({"$or": [{"expired": false}, {"userId": me.to_string()}]})
        );
    }

    #[test]
    fn derived_delete_query_pins_the_cancel_window() {
        let me = Uuid::new_v4();
        let policy = policy_for(Principal::user(me), DeploymentMode::Production);
        assert_eq!(
            policy.derive_query_at(RESERVATIONS, "remove", now()).unwrap().into_value(),
            json!({
                "userId": me.to_string(),
                "$or": [
                    {
                        "createdAt": {"$gte": "2026-10-16T11:55:00Z"},
                        "confirmed": false,
                        "expired": false
                    },
                    {"seatId": null}
                ]
            })
        );
    }

    #[test]
    fn several_conditional_rules_are_or_combined() {
        let policy = PolicySet::new(vec![
            Rule::new([Action::Read], ["rooms"]).when(Condition::eq("open", json!(true))),
            Rule::new([Action::Read], ["rooms"]).when(Condition::eq("floor", json!(1))),
        ]);
        assert_eq!(
            policy.derive_query("rooms", "find").unwrap().into_value(),
            json!({"$or": [{"open": true}, {"floor": 1}]})
        );
    }

    #[test]
    fn accessible_fields_follow_matching_rules() {
        let schema: Vec<String> = ["uid", "name", "email", "password", "admin"]
            .into_iter()
            .map(String::from)
            .collect();
        let policy = PolicySet::new(vec![
            Rule::new([Action::Read], ["users"]).on_fields(["name", "email", "nickname"]),
            Rule::new([Action::Read], ["users"]).on_fields(["uid"]),
            Rule::new([Action::Update], ["users"]),
        ]);
        assert_eq!(policy.accessible_fields("find", "users", &schema), vec!["uid", "name", "email"]);
        assert_eq!(policy.accessible_fields("patch", "users", &schema), schema);
        assert!(policy.accessible_fields("remove", "users", &schema).is_empty());
    }
}
