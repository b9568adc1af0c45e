//! Provider availability scheduling.
//!
//! The `engine` module is the pure core: slot catalog, resolver and bulk
//! planner. The rest is the caller side: a durable reference store,
//! change notification, a scheduler that drives fetch/plan/apply/resolve,
//! and an optimistic day view for UIs.

pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod scheduler;
pub mod store;
pub mod view;
pub mod wal;

pub use config::Config;
pub use engine::EngineError;
pub use scheduler::{BulkOutcome, Scheduler};
pub use store::{AvailabilityStore, InMemoryStore};
pub use view::DayView;
