//! Pixelhost shared types and configuration
//!
//! Home of everything more than one crate needs: database pool
//! construction, the status enums persisted on `servers` rows, and the
//! static plan-resource and game/variant tables consumed when building
//! panel provisioning payloads.

pub mod db;
pub mod games;
pub mod resources;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use games::{game_variant, GameVariant};
pub use resources::{plan_resources, PlanResources};
pub use types::{BillingCycle, JobKind, ProvisionStatus, RecurrenceUnit, ServerStatus};
