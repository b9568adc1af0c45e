//! The availability engine: slot catalog, resolver and bulk planner.
//!
//! Everything here is synchronous and free of I/O. Callers fetch records,
//! hand them in, and apply whatever intents come back.

mod catalog;
mod error;
mod planner;
mod resolver;
mod validate;

pub use catalog::{SLOTS_PER_DAY, catalog_contains, generate_catalog};
pub use error::EngineError;
pub use planner::{plan_clear_all, plan_replicate, plan_toggle, plan_weekends_off};
pub use resolver::{DefaultPolicy, resolve, resolve_defaults, resolve_lenient, resolve_with_policy};
pub use validate::{check_label, fetch_range, horizon_range, parse_date, parse_id, parse_time24};
