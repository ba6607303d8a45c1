// 核心模块 - 只包含核心业务逻辑
pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use self::config::*;
pub use self::error::*;
pub use self::exchange::*;
pub use self::types::*;
