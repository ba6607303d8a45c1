//! 日志初始化：控制台 + 可选文件输出
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::str::FromStr;

use crate::core::config::LoggingConfig;
use crate::core::error::GridError;
use crate::core::types::Result;

const PATTERN: &str = "[{d(%Y-%m-%d %H:%M:%S%.3f)}] [{l}] [{M}] {m}{n}";

/// 根据配置构建 log4rs 配置
pub fn build_config(config: &LoggingConfig) -> Result<Config> {
    let level = LevelFilter::from_str(&config.level)
        .map_err(|_| GridError::ConfigError(format!("无效的日志级别: {}", config.level)))?;

    let mut builder = Config::builder();
    let mut root = Root::builder();

    if config.console {
        let console = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build();
        builder = builder.appender(Appender::builder().build("console", Box::new(console)));
        root = root.appender("console");
    }

    if let Some(path) = &config.file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build(path)
            .map_err(|e| GridError::ConfigError(format!("打开日志文件失败 {}: {}", path, e)))?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    builder
        .build(root.build(level))
        .map_err(|e| GridError::ConfigError(format!("日志配置错误: {}", e)))
}

/// 初始化全局日志器
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let log_config = build_config(config)?;
    log4rs::init_config(log_config)
        .map_err(|e| GridError::ConfigError(format!("日志初始化失败: {}", e)))?;
    Ok(())
}
