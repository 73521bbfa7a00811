//! Attribute-based authorization for the reservation suite services.
//!
//! The crate compiles a [`PolicySet`] per request from the caller's
//! [`Principal`], answers single-record checks ([`PolicySet::can`]), derives
//! store filters for collection calls ([`PolicySet::derive_query`]) and ties
//! both together in the [`Authorize`] hook run before every service method.

mod action;
mod condition;
mod error;
mod evaluator;
mod filter;
mod pipeline;
mod policy;
mod rule;
mod subject;
mod value;

pub use action::{Action, AliasTable};
pub use condition::{Comparison, Condition, Operand};
pub use error::AuthzError;
pub use filter::{AND, Filter, FilterError, OR, Operator, is_directive};
pub use pipeline::{Authorize, CLIENT_DIRECTIVE, HookContext, Method, Params, RecordStore};
pub use policy::{CANCEL_WINDOW_MINUTES, DeploymentMode, PolicyBuilder, Principal, fields, subjects};
pub use rule::{PolicySet, Rule};
pub use subject::{ALL_SUBJECTS, Subject, TaggedRecord};
pub use value::{compare, lookup, values_equal};
