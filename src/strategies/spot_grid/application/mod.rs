pub mod engine;
pub mod scheduler;
pub mod settlement;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{GridDeps, GridEngine, PairSpec};
pub use scheduler::Scheduler;
pub use settlement::{SettledBalances, SettlementGate, Sleeper, TokioSleeper};
