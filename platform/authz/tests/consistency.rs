use chrono::{DateTime, Duration, Utc};
use platform_authz::{AliasTable, DeploymentMode, PolicyBuilder, Principal, Subject, subjects::*};
use serde_json::{Value, json};
use uuid::Uuid;

const VERBS: [&str; 10] = [
    "find", "get", "create", "update", "patch", "remove", "read", "delete", "manage", "publish",
];

const SUBJECT_TYPES: [&str; 7] = [ROOMS, SEAT_STATUS, QRCODES, USERS, RESERVATIONS, MAILER, "payments"];

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-10-16T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn principals(me: Uuid) -> Vec<Principal> {
    vec![Principal::Anonymous, Principal::user(me), Principal::admin(me)]
}

fn records(me: Uuid) -> Vec<Value> {
    let other = Uuid::new_v4();
    let mut grid = Vec::new();
    for owner in [me, other] {
        for confirmed in [false, true] {
            for expired in [false, true] {
                for age in [Duration::seconds(0), Duration::minutes(5), Duration::minutes(5) + Duration::seconds(1)] {
                    for seat in [json!("seat-3"), Value::Null] {
                        grid.push(json!({
                            "id": Uuid::new_v4().to_string(),
                            "userId": owner.to_string(),
                            "seatId": seat,
                            "confirmed": confirmed,
                            "expired": expired,
                            "createdAt": (now() - age).to_rfc3339(),
                        }));
                    }
                }
            }
        }
        grid.push(json!({"id": owner.to_string(), "name": "someone", "admin": false}));
    }
    grid.push(json!({"userId": me.to_string(), "confirmed": false}));
    grid.push(json!({}));
    grid.push(json!([]));
    grid
}

#[test]
fn single_checks_agree_with_derived_queries() {
    let me = Uuid::new_v4();
    let grid = records(me);
    for mode in [DeploymentMode::Production, DeploymentMode::Development] {
        let builder = PolicyBuilder::new(AliasTable::default(), mode);
        for principal in principals(me) {
            let policy = builder.build(&principal);
            for subject_type in SUBJECT_TYPES {
                for verb in VERBS {
                    let derived = policy.derive_query_at(subject_type, verb, now());
                    for record in &grid {
                        let by_check = policy.can_at(verb, Subject::record(subject_type, record), now());
                        let by_query = derived
                            .as_ref()
                            .is_some_and(|filter| filter.matches(record).unwrap());
                        assert_eq!(
                            by_check, by_query,
                            "{principal:?} {mode:?} {verb} {subject_type} on {record}"
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn unconditional_grants_allow_every_record() {
    let me = Uuid::new_v4();
    let grid = records(me);
    let builder = PolicyBuilder::new(AliasTable::default(), DeploymentMode::Production);
    for principal in principals(me) {
        let policy = builder.build(&principal);
        for rule in policy.rules().iter().filter(|r| r.is_unconditional()) {
            for action in &rule.actions {
                for subject_type in &rule.subjects {
                    for record in &grid {
                        assert!(policy.can(action.as_str(), Subject::record(subject_type, record)));
                    }
                }
            }
        }
    }
}

#[test]
fn cancel_window_boundary_is_inclusive() {
    let me = Uuid::new_v4();
    let policy = PolicyBuilder::new(AliasTable::default(), DeploymentMode::Production).build(&Principal::user(me));
    let at_edge = json!({
        "userId": me.to_string(),
        "seatId": "seat-1",
        "confirmed": false,
        "expired": false,
        "createdAt": (now() - Duration::minutes(5)).to_rfc3339(),
    });
    assert!(policy.can_at("remove", Subject::record(RESERVATIONS, &at_edge), now()));
    let filter = policy.derive_query_at(RESERVATIONS, "remove", now()).unwrap();
    assert!(filter.matches(&at_edge).unwrap());
}
