use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::config::SettlementConfig;
use crate::core::error::GridError;
use crate::core::exchange::AccountState;
use crate::core::types::{Balance, Result};

/// 等待间隔抽象，测试中可替换为立即返回
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 资金已解锁时的余额
#[derive(Debug, Clone)]
pub struct SettledBalances {
    pub base: Balance,
    pub quote: Balance,
}

/// 撤单后检查冻结资金是否全部释放
pub struct SettlementGate {
    account: Arc<dyn AccountState>,
    sleeper: Arc<dyn Sleeper>,
    config: SettlementConfig,
    base_asset: String,
    quote_asset: String,
}

impl SettlementGate {
    pub fn new(
        account: Arc<dyn AccountState>,
        sleeper: Arc<dyn Sleeper>,
        config: SettlementConfig,
        base_asset: &str,
        quote_asset: &str,
    ) -> Self {
        Self {
            account,
            sleeper,
            config,
            base_asset: base_asset.to_string(),
            quote_asset: quote_asset.to_string(),
        }
    }

    pub async fn wait_unlocked(&self) -> Result<SettledBalances> {
        let attempts = self.config.attempts;
        for attempt in 1..=attempts {
            let base = self.account.balance(&self.base_asset).await?;
            let quote = self.account.balance(&self.quote_asset).await?;
            if base.is_settled() && quote.is_settled() {
                return Ok(SettledBalances { base, quote });
            }

            if attempt < attempts {
                log::info!(
                    "资金尚未全部解锁 ({} hold {}, {} hold {})，等待{}ms再检查... (尝试 {}/{})",
                    base.asset,
                    base.hold,
                    quote.asset,
                    quote.hold,
                    self.config.interval_ms,
                    attempt,
                    attempts
                );
                self.sleeper.sleep(self.config.interval()).await;
            }
        }

        log::warn!("资金未能全部解锁，已尝试 {} 次", attempts);
        Err(GridError::SettlementTimeout { attempts })
    }
}
