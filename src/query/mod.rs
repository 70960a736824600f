//! Query resolution and execution.
//!
//! Turns stored definitions and request overrides into statements, runs
//! them through the transactional executor, and fans batches out across
//! tasks.

pub mod adhoc;
pub mod batch;
pub mod executor;
pub mod params;
pub mod placeholders;
pub mod preamble;

pub use adhoc::{AdHocRequest, AdHocRunner};
pub use batch::{BatchCoordinator, BatchOutcome, ExecutionResult, Outcome};
pub use executor::{ExecutionReport, ExecutionState, QueryExecutor};
pub use params::{EffectiveParameters, OverrideRequest, SharedRequest, Statement};
pub use placeholders::{BoundSql, PlaceholderStyle};
pub use preamble::build_preamble;
