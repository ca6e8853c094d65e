//! Commission grid matching and distribution engine for a multi-tenant
//! insurance back office.
//!
//! Start at [`engine::CommissionEngine`]; the single calculation path is
//! [`engine::calculate_breakdown`].

pub mod book;
pub mod clock;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod event;
pub mod money;
pub mod party_resolver;
pub mod policy;
pub mod rate_resolution;
pub mod reconciliation;
pub mod report;
pub mod store;
pub mod types;
