//! 现货网格策略：围绕参考价维护对称的买卖限价单梯队

pub mod application;
pub mod domain;

pub use application::{GridDeps, GridEngine, PairSpec, Scheduler};
pub use domain::{GridPhase, GridSnapshot, TickOutcome};
