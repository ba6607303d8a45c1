use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::ScheduleConfig;
use crate::core::exchange::{Notifier, PriceFeed};
use crate::core::types::Result;
use crate::strategies::spot_grid::domain::state::TickOutcome;

use super::engine::GridEngine;

/// 固定间隔驱动引擎，任何错误都只告警并继续
pub struct Scheduler {
    engine: GridEngine,
    feed: Arc<dyn PriceFeed>,
    notifier: Arc<dyn Notifier>,
    pair: String,
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(
        engine: GridEngine,
        feed: Arc<dyn PriceFeed>,
        notifier: Arc<dyn Notifier>,
        pair: &str,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            engine,
            feed,
            notifier,
            pair: pair.to_string(),
            config,
        }
    }

    pub fn engine(&self) -> &GridEngine {
        &self.engine
    }

    /// 取价并执行一次tick
    pub async fn run_once(&mut self) -> Result<TickOutcome> {
        let current_price = self.feed.mid_price(&self.pair).await?;
        log::info!("最新价格: {}", current_price);
        let outcome = self.engine.tick(current_price).await?;
        log::debug!("{:?}", self.engine.snapshot());
        Ok(outcome)
    }

    /// 执行一次tick并吞掉错误，返回下次执行前的等待时间
    pub async fn step(&mut self) -> Duration {
        match self.run_once().await {
            Ok(_) => self.config.tick_interval(),
            Err(e) => {
                log::error!("网格tick异常: {:?}", e);
                self.notifier.send_alert(&e.to_string()).await;
                self.config.error_backoff()
            }
        }
    }

    /// 循环运行直到 shutdown 完成
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let delay = self.step().await;
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("收到停止信号，退出调度循环");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
