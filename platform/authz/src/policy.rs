//! The reservation suite's business policy.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::action::{Action, AliasTable};
use crate::condition::{Condition, Operand};
use crate::filter::Operator;
use crate::rule::{PolicySet, Rule};

pub mod subjects {
    pub const ROOMS: &str = "rooms";
    pub const SEAT_STATUS: &str = "seatStatus";
    pub const QRCODES: &str = "qrcodes";
    pub const USERS: &str = "users";
    pub const RESERVATIONS: &str = "reservations";
    pub const MAILER: &str = "mailer";
}

/// Record fields the policy conditions refer to.
pub mod fields {
    pub const ID: &str = "id";
    pub const USER_ID: &str = "userId";
    pub const SEAT_ID: &str = "seatId";
    pub const CREATED_AT: &str = "createdAt";
    pub const CONFIRMED: &str = "confirmed";
    pub const EXPIRED: &str = "expired";
}

/// Window in which an unconfirmed reservation may still be withdrawn.
pub const CANCEL_WINDOW_MINUTES: i64 = 5;

/// The acting identity of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    #[default]
    Anonymous,
    User { id: Uuid, admin: bool },
}

impl Principal {
    pub fn user(id: Uuid) -> Self {
        Principal::User { id, admin: false }
    }

    pub fn admin(id: Uuid) -> Self {
        Principal::User { id, admin: true }
    }

    pub fn id(&self) -> Option<Uuid> {
        match self {
            Principal::Anonymous => None,
            Principal::User { id, .. } => Some(*id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::User { admin: true, .. })
    }
}

/// Deployment mode; non-production deployments allow account bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Production,
    #[default]
    Development,
}

impl DeploymentMode {
    pub fn is_production(self) -> bool {
        self == DeploymentMode::Production
    }
}

/// Compiles the rule set for a principal.
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    aliases: AliasTable,
    mode: DeploymentMode,
}

impl PolicyBuilder {
    pub fn new(aliases: AliasTable, mode: DeploymentMode) -> Self {
        Self { aliases, mode }
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn build(&self, principal: &Principal) -> PolicySet {
        use subjects::*;

        let mut rules = vec![
            Rule::new([Action::Read], [ROOMS, SEAT_STATUS, QRCODES]),
            Rule::new([Action::Update], [SEAT_STATUS]),
        ];

        if let Some(id) = principal.id() {
            let me = Value::String(id.to_string());
            rules.push(Rule::new([Action::Read], [USERS]).when(Condition::eq(fields::ID, me.clone())));
            rules.push(Rule::new([Action::Read], [RESERVATIONS]).when(Condition::any([
                Condition::eq(fields::EXPIRED, json!(false)),
                Condition::eq(fields::USER_ID, me.clone()),
            ])));
            rules.push(Rule::new([Action::Create], [RESERVATIONS]));
            rules.push(Rule::new([Action::Delete], [RESERVATIONS]).when(Condition::all([
                Condition::eq(fields::USER_ID, me),
                Condition::any([
                    Condition::all([
                        Condition::compare(
                            fields::CREATED_AT,
                            Operator::Gte,
                            Operand::ago(Duration::minutes(CANCEL_WINDOW_MINUTES)),
                        ),
                        Condition::eq(fields::CONFIRMED, json!(false)),
                        Condition::eq(fields::EXPIRED, json!(false)),
                    ]),
                    Condition::is_null(fields::SEAT_ID),
                ]),
            ])));
        }

        if principal.is_admin() {
            rules.push(Rule::new([Action::Manage], [USERS, ROOMS, RESERVATIONS]));
            rules.push(Rule::new([Action::Create], [MAILER]));
        }

        if !self.mode.is_production() {
            rules.push(Rule::new([Action::Create], [USERS]));
        }

        PolicySet::with_aliases(rules, self.aliases.clone())
    }
}
