// 策略模块
pub mod spot_grid;

pub use spot_grid::{GridEngine, Scheduler};
