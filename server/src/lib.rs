//! HTTP surface for the reservation suite services.

pub mod config;
pub mod http;
pub mod seed;
