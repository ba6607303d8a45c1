pub mod ladder;
pub mod reconcile;
pub mod state;

pub use ladder::{BalanceTracker, LevelPlan, Shortfall};
pub use reconcile::{FillSummary, LatestFill};
pub use state::{GridPhase, GridSnapshot, TickOutcome, TrackedOrders};
