// 工具模块 - 日志与告警
pub mod logging;
pub mod webhook;

pub use logging::init_logging;
pub use webhook::{LogNotifier, WebhookNotifier};
