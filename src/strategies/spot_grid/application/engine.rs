//! 网格引擎
//!
//! 每个tick根据已跟踪挂单与交易所活跃挂单的差集决定：等待、追价、初始化或对账重建。
//! 参考价与挂单集合只由本引擎持有，tick之间不存在并发修改。

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::config::{GridConfig, SettlementConfig};
use crate::core::error::GridError;
use crate::core::exchange::{AccountState, Notifier, OrderGateway};
use crate::core::types::{
    Fill, OrderId, OrderRef, OrderSide, OrderStatusReport, PlaceOutcome, Result,
};
use crate::strategies::spot_grid::domain::ladder::{self, BalanceTracker, LevelPlan, Shortfall};
use crate::strategies::spot_grid::domain::reconcile::{shift_reference, FillSummary, LatestFill};
use crate::strategies::spot_grid::domain::state::{
    GridPhase, GridSnapshot, TickOutcome, TrackedOrders,
};

use super::settlement::{SettlementGate, Sleeper};

/// 交易对标识
#[derive(Debug, Clone)]
pub struct PairSpec {
    /// 交易所内部名称，用于查询挂单与成交
    pub name: String,
    pub base_asset: String,
    pub quote_asset: String,
}

/// 引擎依赖的外部组件
#[derive(Clone)]
pub struct GridDeps {
    pub account: Arc<dyn AccountState>,
    pub gateway: Arc<dyn OrderGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub sleeper: Arc<dyn Sleeper>,
}

pub struct GridEngine {
    pair: PairSpec,
    grid: GridConfig,
    account: Arc<dyn AccountState>,
    gateway: Arc<dyn OrderGateway>,
    notifier: Arc<dyn Notifier>,
    settlement: SettlementGate,
    reference_price: Option<Decimal>,
    tracked: TrackedOrders,
    last_phase: Option<GridPhase>,
}

impl GridEngine {
    pub fn new(
        pair: PairSpec,
        grid: GridConfig,
        settlement: SettlementConfig,
        deps: GridDeps,
    ) -> Self {
        let gate = SettlementGate::new(
            deps.account.clone(),
            deps.sleeper,
            settlement,
            &pair.base_asset,
            &pair.quote_asset,
        );
        Self {
            pair,
            grid,
            account: deps.account,
            gateway: deps.gateway,
            notifier: deps.notifier,
            settlement: gate,
            reference_price: None,
            tracked: TrackedOrders::default(),
            last_phase: None,
        }
    }

    pub fn reference_price(&self) -> Option<Decimal> {
        self.reference_price
    }

    pub fn tracked(&self) -> &TrackedOrders {
        &self.tracked
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            pair: self.pair.name.clone(),
            reference_price: self.reference_price,
            last_phase: self.last_phase,
            buy_orders: self.tracked.buys().cloned().collect(),
            sell_orders: self.tracked.sells().cloned().collect(),
        }
    }

    /// 检查并更新买卖挂单，保持每侧 num_orders 个挂单
    pub async fn tick(&mut self, current_price: Decimal) -> Result<TickOutcome> {
        let open_ids = self.account.open_orders(&self.pair.name).await?;
        let vanished = self.tracked.vanished(&open_ids);
        let phase = self.tracked.phase(&vanished);
        self.last_phase = Some(phase);

        let last_trade = self.last_trade(current_price).await?;
        let mut latest = LatestFill::seeded(&last_trade);
        let mut summary = FillSummary::default();
        let step = self.grid.price_step;

        let reference = match phase {
            GridPhase::AwaitingFill => {
                log::info!("等待挂单成交...");
                return Ok(TickOutcome::Waiting);
            }
            GridPhase::Chase => {
                let reference = self
                    .reference_price
                    .unwrap_or_else(|| ladder::floor_to_step(last_trade.price, step));
                if current_price < reference + step {
                    log::info!("等待挂单成交...");
                    return Ok(TickOutcome::ChaseNotTriggered);
                }
                let ceiling = last_trade.price + step * Decimal::from(self.grid.risk_guard_steps);
                if current_price >= ceiling {
                    self.alert(&format!(
                        "价格偏离最近成交价太远，停止挂买单\n当前价: {} 最近成交价: {} 上限: {}",
                        current_price, last_trade.price, ceiling
                    ))
                    .await;
                    return Ok(TickOutcome::RiskGuardHalted);
                }
                log::info!("仓位已清空，参考价上移至 {}", reference + step);
                reference + step
            }
            GridPhase::Bootstrap => {
                let reference = ladder::floor_to_step(last_trade.price, step);
                log::info!("初始化参考价 {} (最近成交价 {})", reference, last_trade.price);
                reference
            }
            GridPhase::Reconcile => {
                let start = self
                    .reference_price
                    .unwrap_or_else(|| ladder::floor_to_step(last_trade.price, step));
                self.reconcile(&vanished, start, &mut latest, &mut summary)
                    .await?
            }
        };

        self.rebuild(phase, reference, &open_ids, &latest, summary)
            .await
    }

    /// 账户最近一笔成交；没有任何成交记录时以当前价代替
    async fn last_trade(&self, current_price: Decimal) -> Result<Fill> {
        match self.account.last_fill(&self.pair.name).await? {
            Some(fill) => Ok(fill),
            None => {
                log::warn!("{} 无历史成交，使用当前价 {} 作为最近成交价", self.pair.name, current_price);
                Ok(Fill {
                    side: OrderSide::Sell,
                    quantity: Decimal::ZERO,
                    price: current_price,
                    timestamp: 0,
                })
            }
        }
    }

    /// 确认消失的挂单是否成交，返回偏移后的参考价
    async fn reconcile(
        &self,
        vanished: &[OrderId],
        start: Decimal,
        latest: &mut LatestFill,
        summary: &mut FillSummary,
    ) -> Result<Decimal> {
        let mut reference = start;
        for &id in vanished {
            let Some(order) = self.tracked.get(id) else {
                continue;
            };

            match self.gateway.query_status(id).await? {
                OrderStatusReport::Filled(report) => {
                    // 方向以下单时记录为准
                    let fill = Fill {
                        side: order.side,
                        quantity: report.quantity.round_dp(self.grid.quantity_decimals),
                        price: report.price.round_dp(self.grid.price_decimals),
                        timestamp: report.timestamp,
                    };
                    log::info!("订单 #{} 已成交: {} {} @ {}", id, fill.side, fill.quantity, fill.price);
                    summary.push(&fill, &self.pair.base_asset);
                    reference = shift_reference(reference, fill.side, self.grid.price_step);
                    latest.observe(&fill);
                }
                OrderStatusReport::Canceled => {
                    log::info!("订单 #{} 已取消 ({} @ {})", id, order.side, order.price);
                }
                OrderStatusReport::Open => {
                    log::warn!("订单 #{} 不在活跃列表中但状态仍为open", id);
                }
            }
        }
        Ok(reference)
    }

    async fn rebuild(
        &mut self,
        phase: GridPhase,
        reference: Decimal,
        open_ids: &[OrderId],
        latest: &LatestFill,
        summary: FillSummary,
    ) -> Result<TickOutcome> {
        // 取消剩余挂单
        if !open_ids.is_empty() {
            log::info!("取消 {} 的 {} 个剩余挂单", self.pair.name, open_ids.len());
            self.gateway.cancel_batch(open_ids).await?;
        }

        let balances = match self.settlement.wait_unlocked().await {
            Ok(balances) => balances,
            Err(GridError::SettlementTimeout { attempts }) => {
                self.tracked.clear();
                let mut text = format!("资金尚未全部解锁 (尝试{}次)，无法创建新挂单", attempts);
                if !summary.is_empty() {
                    text.push_str("\n\n");
                    text.push_str(&summary.render());
                }
                self.alert(&text).await;
                return Ok(TickOutcome::SettlementAborted);
            }
            Err(e) => return Err(e),
        };

        if !summary.is_empty() {
            self.notifier.send_alert(&summary.render()).await;
        }

        self.tracked.clear();

        let buy_base = ladder::next_buy_base(&self.grid, latest.side, latest.quantity);
        let buys = ladder::buy_levels(&self.grid, reference, buy_base);
        let sells = ladder::sell_levels(&self.grid, reference);

        self.place_side(buys, BalanceTracker::new(balances.quote.available()))
            .await;
        self.place_side(sells, BalanceTracker::new(balances.base.available()))
            .await;

        let reference = reference.round_dp(self.grid.price_decimals);
        self.reference_price = Some(reference);
        log::info!(
            "网格重建完成: 参考价 {} 买单 {} 个 卖单 {} 个",
            reference,
            self.tracked.buy_count(),
            self.tracked.sell_count()
        );

        Ok(TickOutcome::Rebuilt {
            phase,
            reference_price: reference,
            buy_orders: self.tracked.buy_count(),
            sell_orders: self.tracked.sell_count(),
        })
    }

    /// 逐档挂单；余额不足时放弃本侧剩余档位，单笔失败只告警
    async fn place_side(&mut self, plans: Vec<LevelPlan>, mut tracker: BalanceTracker) {
        for plan in plans {
            if let Err(shortfall) = tracker.admit(&plan) {
                self.report_shortfall(&plan, shortfall).await;
                break;
            }

            let action = match plan.side {
                OrderSide::Buy => "买入",
                OrderSide::Sell => "卖出",
            };

            if self.grid.dry_run {
                log::info!(
                    "[dry_run] 在{}{}{}{}挂单成功",
                    plan.price,
                    action,
                    plan.quantity,
                    self.pair.base_asset
                );
                continue;
            }

            match self
                .gateway
                .place(plan.side, plan.quantity, plan.price)
                .await
            {
                Ok(PlaceOutcome::Placed { order_id }) => {
                    log::info!(
                        "在{}{}{}{}挂单成功 (#{})",
                        plan.price,
                        action,
                        plan.quantity,
                        self.pair.base_asset,
                        order_id
                    );
                    self.tracked.insert(OrderRef {
                        id: order_id,
                        side: plan.side,
                        price: plan.price,
                        quantity: plan.quantity,
                    });
                    tracker.consume(&plan);
                }
                Ok(PlaceOutcome::Rejected { code, message }) => {
                    let code = code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
                    self.alert(&format!("挂单失败！\nerror_code: {}\nerror_message: {}", code, message))
                        .await;
                }
                Err(e) if e.is_placement_failure() => {
                    self.alert(&e.to_string()).await;
                }
                Err(e) => {
                    log::error!("在{}{}{}挂单异常: {}", plan.price, action, plan.quantity, e);
                    self.alert(&format!("挂单异常！\n{}", e)).await;
                }
            }
        }
        log::debug!("本侧挂单结束，剩余可用 {}", tracker.available());
    }

    async fn report_shortfall(&self, plan: &LevelPlan, shortfall: Shortfall) {
        match plan.side {
            OrderSide::Buy => {
                self.alert(&format!(
                    "{}余额: {}，无法在{}买入{}{}",
                    self.pair.quote_asset,
                    shortfall.available,
                    plan.price,
                    plan.quantity,
                    self.pair.base_asset
                ))
                .await;
            }
            OrderSide::Sell => {
                log::warn!(
                    "{}余额: {}，无法在{}卖出{}{} (需要 {})",
                    self.pair.base_asset,
                    shortfall.available,
                    plan.price,
                    plan.quantity,
                    self.pair.base_asset,
                    shortfall.required
                );
            }
        }
    }

    async fn alert(&self, text: &str) {
        log::warn!("{}", text);
        self.notifier.send_alert(text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::paper::PaperExchange;
    use crate::strategies::spot_grid::application::settlement::tests::CountingSleeper;
    use crate::strategies::spot_grid::application::testing::RecordingNotifier;
    use crate::strategies::spot_grid::domain::ladder::tests::sample_grid;
    use rust_decimal_macros::dec;

    struct Harness {
        paper: Arc<PaperExchange>,
        notifier: Arc<RecordingNotifier>,
        engine: GridEngine,
    }

    async fn harness_with(grid: GridConfig, paper: PaperExchange, attempts: u32) -> Harness {
        let paper = Arc::new(paper);
        paper
            .seed_fill(Fill {
                side: OrderSide::Sell,
                quantity: dec!(1),
                price: dec!(10.23),
                timestamp: 1_000,
            })
            .await;
        let notifier = Arc::new(RecordingNotifier::default());
        let deps = GridDeps {
            account: paper.clone(),
            gateway: paper.clone(),
            notifier: notifier.clone(),
            sleeper: Arc::new(CountingSleeper::default()),
        };
        let engine = GridEngine::new(
            PairSpec {
                name: "HYPE/USDC".to_string(),
                base_asset: "HYPE".to_string(),
                quote_asset: "USDC".to_string(),
            },
            grid,
            SettlementConfig {
                attempts,
                interval_ms: 1000,
            },
            deps,
        );
        Harness {
            paper,
            notifier,
            engine,
        }
    }

    /// 第一次下单返回指定错误，其余请求转发到模拟盘
    struct FailFirstGateway {
        inner: Arc<PaperExchange>,
        first_error: std::sync::Mutex<Option<GridError>>,
    }

    #[async_trait::async_trait]
    impl OrderGateway for FailFirstGateway {
        async fn place(
            &self,
            side: OrderSide,
            quantity: Decimal,
            price: Decimal,
        ) -> Result<PlaceOutcome> {
            let error = self.first_error.lock().ok().and_then(|mut e| e.take());
            if let Some(e) = error {
                return Err(e);
            }
            self.inner.place(side, quantity, price).await
        }

        async fn cancel_batch(&self, order_ids: &[OrderId]) -> Result<()> {
            self.inner.cancel_batch(order_ids).await
        }

        async fn query_status(&self, order_id: OrderId) -> Result<OrderStatusReport> {
            self.inner.query_status(order_id).await
        }
    }

    /// 首档买单报错后引导一次，返回跟踪的买单价格与告警
    async fn bootstrap_with_failing_first_order(error: GridError) -> (GridEngine, Vec<String>) {
        let h = harness().await;
        let gateway = Arc::new(FailFirstGateway {
            inner: h.paper.clone(),
            first_error: std::sync::Mutex::new(Some(error)),
        });
        let mut engine = GridEngine::new(
            PairSpec {
                name: "HYPE/USDC".to_string(),
                base_asset: "HYPE".to_string(),
                quote_asset: "USDC".to_string(),
            },
            sample_grid(),
            SettlementConfig {
                attempts: 5,
                interval_ms: 0,
            },
            GridDeps {
                account: h.paper.clone(),
                gateway,
                notifier: h.notifier.clone(),
                sleeper: Arc::new(CountingSleeper::default()),
            },
        );
        let outcome = engine.tick(dec!(10.23)).await.unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Rebuilt {
                buy_orders: 2,
                sell_orders: 3,
                ..
            }
        ));
        let messages = h.notifier.messages();
        (engine, messages)
    }

    #[tokio::test]
    async fn server_error_on_one_level_keeps_placing_the_rest() {
        let (engine, messages) = bootstrap_with_failing_first_order(GridError::GatewayServerError {
            message: "502 Bad Gateway".to_string(),
        })
        .await;

        let mut buys = prices(engine.tracked().buys().cloned());
        buys.sort_by(|a, b| b.0.cmp(&a.0));
        assert_eq!(buys, vec![(dec!(9.0), dec!(1.1)), (dec!(8.5), dec!(1.2))]);
        assert_eq!(engine.tracked().sell_count(), 3);
        assert_eq!(messages, vec!["挂单服务器错误: 502 Bad Gateway".to_string()]);
    }

    #[tokio::test]
    async fn client_error_on_one_level_is_alerted_once() {
        let (engine, messages) = bootstrap_with_failing_first_order(GridError::GatewayClientError {
            code: 400,
            message: "Insufficient spot balance".to_string(),
        })
        .await;

        assert_eq!(engine.tracked().buy_count(), 2);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("挂单失败!"));
    }

    #[tokio::test]
    async fn unexpected_error_on_one_level_is_alerted_as_exception() {
        let (engine, messages) =
            bootstrap_with_failing_first_order(GridError::ParseError("connection reset".to_string()))
                .await;

        assert_eq!(engine.tracked().buy_count(), 2);
        assert_eq!(engine.tracked().sell_count(), 3);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("挂单异常"));
        assert!(messages[0].contains("connection reset"));
    }

    async fn harness() -> Harness {
        harness_with(
            sample_grid(),
            PaperExchange::new("HYPE", "USDC", dec!(10), dec!(1000), dec!(10.23)),
            5,
        )
        .await
    }

    fn prices(orders: impl Iterator<Item = OrderRef>) -> Vec<(Decimal, Decimal)> {
        orders.map(|o| (o.price, o.quantity)).collect()
    }

    #[tokio::test]
    async fn bootstrap_builds_symmetric_ladder() {
        let mut h = harness().await;
        let outcome = h.engine.tick(dec!(10.23)).await.unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Rebuilt {
                phase: GridPhase::Bootstrap,
                reference_price: dec!(10.0),
                buy_orders: 3,
                sell_orders: 3,
            }
        );
        assert_eq!(h.engine.reference_price(), Some(dec!(10.0)));

        let mut buys = prices(h.engine.tracked().buys().cloned());
        buys.sort_by(|a, b| b.0.cmp(&a.0));
        assert_eq!(
            buys,
            vec![(dec!(9.5), dec!(1.0)), (dec!(9.0), dec!(1.1)), (dec!(8.5), dec!(1.2))]
        );
        let mut sells = prices(h.engine.tracked().sells().cloned());
        sells.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            sells,
            vec![(dec!(10.5), dec!(1)), (dec!(11.0), dec!(1)), (dec!(11.5), dec!(1))]
        );
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn repeated_ticks_without_fills_are_idempotent() {
        let mut h = harness().await;
        h.engine.tick(dec!(10.23)).await.unwrap();
        let before = h.paper.open_orders("HYPE/USDC").await.unwrap();

        for price in [dec!(10.1), dec!(10.4), dec!(9.6)] {
            h.paper.set_mid_price(price).await;
            assert_eq!(h.engine.tick(price).await.unwrap(), TickOutcome::Waiting);
        }

        assert_eq!(h.paper.open_orders("HYPE/USDC").await.unwrap(), before);
        assert_eq!(h.engine.reference_price(), Some(dec!(10.0)));
    }

    #[tokio::test]
    async fn buy_fill_moves_reference_down_and_scales_size() {
        let mut h = harness().await;
        h.engine.tick(dec!(10.23)).await.unwrap();

        let fills = h.paper.set_mid_price(dec!(9.5)).await;
        assert_eq!(fills.len(), 1);

        let outcome = h.engine.tick(dec!(9.5)).await.unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Rebuilt {
                phase: GridPhase::Reconcile,
                ..
            }
        ));
        assert_eq!(h.engine.reference_price(), Some(dec!(9.5)));

        let mut buys = prices(h.engine.tracked().buys().cloned());
        buys.sort_by(|a, b| b.0.cmp(&a.0));
        // 基础数量 = 成交数量 1.0 + 0.1
        assert_eq!(buys[0], (dec!(9.0), dec!(1.1)));
        assert_eq!(buys[2], (dec!(8.0), dec!(1.3)));

        let messages = h.notifier.messages();
        assert_eq!(messages, vec!["BUY 1.0HYPE at 9.5".to_string()]);
    }

    #[tokio::test]
    async fn simultaneous_buy_fills_resolve_by_lower_price() {
        let mut h = harness().await;
        h.engine.tick(dec!(10.23)).await.unwrap();

        // 一次穿过两档买单，两笔成交时间戳相同
        let fills = h.paper.set_mid_price(dec!(8.9)).await;
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].timestamp, fills[1].timestamp);

        h.engine.tick(dec!(8.9)).await.unwrap();
        assert_eq!(h.engine.reference_price(), Some(dec!(9.0)));

        let mut buys = prices(h.engine.tracked().buys().cloned());
        buys.sort_by(|a, b| b.0.cmp(&a.0));
        // 9.0 档数量 1.1 胜出：1.1 + 0.1
        assert_eq!(buys[0], (dec!(8.5), dec!(1.2)));
    }

    #[tokio::test]
    async fn sell_fill_moves_reference_up_and_resets_size() {
        let mut h = harness().await;
        h.engine.tick(dec!(10.23)).await.unwrap();

        h.paper.set_mid_price(dec!(10.6)).await;
        h.engine.tick(dec!(10.6)).await.unwrap();

        assert_eq!(h.engine.reference_price(), Some(dec!(10.5)));
        let mut buys = prices(h.engine.tracked().buys().cloned());
        buys.sort_by(|a, b| b.0.cmp(&a.0));
        assert_eq!(buys[0], (dec!(10.0), dec!(1)));
    }

    #[tokio::test]
    async fn canceled_orders_do_not_shift_reference() {
        let mut h = harness().await;
        h.engine.tick(dec!(10.23)).await.unwrap();

        let victim = h.engine.tracked().sells().next().unwrap().id;
        h.paper.cancel_batch(&[victim]).await.unwrap();

        let outcome = h.engine.tick(dec!(10.23)).await.unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Rebuilt {
                phase: GridPhase::Reconcile,
                buy_orders: 3,
                sell_orders: 3,
                ..
            }
        ));
        assert_eq!(h.engine.reference_price(), Some(dec!(10.0)));
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn quote_shortfall_stops_buy_side() {
        let mut h = harness_with(
            sample_grid(),
            PaperExchange::new("HYPE", "USDC", dec!(10), dec!(15), dec!(10.23)),
            5,
        )
        .await;

        let outcome = h.engine.tick(dec!(10.23)).await.unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Rebuilt {
                buy_orders: 1,
                sell_orders: 3,
                ..
            }
        ));
        let messages = h.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("USDC余额: 5.5"));
        assert!(messages[0].contains("无法在9.0买入1.1HYPE"));
    }

    #[tokio::test]
    async fn base_shortfall_is_logged_not_alerted() {
        let mut h = harness_with(
            sample_grid(),
            PaperExchange::new("HYPE", "USDC", dec!(1.5), dec!(1000), dec!(10.23)),
            5,
        )
        .await;

        let outcome = h.engine.tick(dec!(10.23)).await.unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Rebuilt {
                buy_orders: 3,
                sell_orders: 1,
                ..
            }
        ));
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn placements_never_exceed_tracked_balance() {
        let mut h = harness_with(
            sample_grid(),
            PaperExchange::new("HYPE", "USDC", dec!(10), dec!(19.4), dec!(10.23)),
            5,
        )
        .await;
        h.engine.tick(dec!(10.23)).await.unwrap();

        let committed: Decimal = h
            .engine
            .tracked()
            .buys()
            .map(|o| o.price * o.quantity)
            .sum();
        assert!(committed <= dec!(19.4));
        assert_eq!(h.engine.tracked().buy_count(), 2);
        // 交易所侧没有因余额不足而拒单
        assert_eq!(h.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn settlement_timeout_aborts_rebuild() {
        let mut h = harness().await;
        h.engine.tick(dec!(10.23)).await.unwrap();

        h.paper.set_mid_price(dec!(9.5)).await;
        h.paper.freeze("USDC", dec!(1)).await;

        let outcome = h.engine.tick(dec!(9.5)).await.unwrap();
        assert_eq!(outcome, TickOutcome::SettlementAborted);
        assert!(h.engine.tracked().is_empty());
        assert!(h.paper.open_orders("HYPE/USDC").await.unwrap().is_empty());
        // 参考价未提交
        assert_eq!(h.engine.reference_price(), Some(dec!(10.0)));

        let messages = h.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("无法创建新挂单"));
        assert!(messages[0].contains("BUY 1.0HYPE at 9.5"));
    }

    #[tokio::test]
    async fn each_sell_fill_shifts_reference_one_step() {
        let mut h = harness().await;
        h.engine.tick(dec!(10.23)).await.unwrap();

        // 一次穿过全部三档卖单
        h.paper.set_mid_price(dec!(11.6)).await;
        h.engine.tick(dec!(11.6)).await.unwrap();
        assert_eq!(h.engine.reference_price(), Some(dec!(11.5)));
        assert_eq!(h.engine.tracked().sell_count(), 3);
    }

    #[tokio::test]
    async fn chase_respects_step_threshold_and_risk_guard() {
        let mut grid = sample_grid();
        grid.num_orders = 1;
        let mut h = harness_with(
            grid,
            PaperExchange::new("HYPE", "USDC", dec!(1), dec!(1000), dec!(10.23)),
            5,
        )
        .await;
        h.engine.tick(dec!(10.23)).await.unwrap();

        // 卖单成交：参考价 10.5，余额 0 HYPE，只挂买单
        h.paper.set_mid_price(dec!(10.6)).await;
        h.engine.tick(dec!(10.6)).await.unwrap();
        assert_eq!(h.engine.reference_price(), Some(dec!(10.5)));
        assert_eq!(h.engine.tracked().sell_count(), 0);
        assert_eq!(h.engine.tracked().buy_count(), 1);

        assert_eq!(
            h.engine.tick(dec!(10.9)).await.unwrap(),
            TickOutcome::ChaseNotTriggered
        );

        let outcome = h.engine.tick(dec!(11.0)).await.unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Rebuilt {
                phase: GridPhase::Chase,
                reference_price,
                ..
            } if reference_price == dec!(11.0)
        ));

        // 最近成交价 10.5，上限 10.5 + 10 * 0.5 = 15.5
        h.paper.set_mid_price(dec!(15.5)).await;
        assert_eq!(
            h.engine.tick(dec!(15.5)).await.unwrap(),
            TickOutcome::RiskGuardHalted
        );
        assert_eq!(h.engine.reference_price(), Some(dec!(11.0)));
        assert!(h
            .notifier
            .messages()
            .iter()
            .any(|m| m.contains("价格偏离最近成交价太远")));
    }

    #[tokio::test]
    async fn dry_run_places_nothing_and_keeps_bootstrapping() {
        let mut grid = sample_grid();
        grid.dry_run = true;
        let mut h = harness_with(
            grid,
            PaperExchange::new("HYPE", "USDC", dec!(10), dec!(1000), dec!(10.23)),
            5,
        )
        .await;

        for _ in 0..2 {
            let outcome = h.engine.tick(dec!(10.23)).await.unwrap();
            assert_eq!(
                outcome,
                TickOutcome::Rebuilt {
                    phase: GridPhase::Bootstrap,
                    reference_price: dec!(10.0),
                    buy_orders: 0,
                    sell_orders: 0,
                }
            );
        }
        assert!(h.paper.open_orders("HYPE/USDC").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_still_cancels_leftover_orders() {
        let mut grid = sample_grid();
        grid.dry_run = true;
        let mut h = harness_with(
            grid,
            PaperExchange::new("HYPE", "USDC", dec!(10), dec!(1000), dec!(10.23)),
            5,
        )
        .await;
        h.paper
            .place(OrderSide::Buy, dec!(1), dec!(8))
            .await
            .unwrap();

        let outcome = h.engine.tick(dec!(10.23)).await.unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Rebuilt {
                phase: GridPhase::Bootstrap,
                buy_orders: 0,
                sell_orders: 0,
                ..
            }
        ));
        assert!(h.paper.open_orders("HYPE/USDC").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_placement_is_alerted_and_next_level_continues() {
        let mut grid = sample_grid();
        // 第一档价格为 0 被交易所拒绝
        grid.price_step = dec!(5);
        let mut h = harness_with(
            grid,
            PaperExchange::new("HYPE", "USDC", dec!(10), dec!(1000), dec!(5.1)),
            5,
        )
        .await;
        h.paper
            .seed_fill(Fill {
                side: OrderSide::Sell,
                quantity: dec!(1),
                price: dec!(5.1),
                timestamp: 2_000,
            })
            .await;

        let outcome = h.engine.tick(dec!(5.1)).await.unwrap();
        // 参考价 5：买单 0 / -5 / -10 全部被拒，卖单 10 / 15 / 20 正常
        assert!(matches!(
            outcome,
            TickOutcome::Rebuilt {
                buy_orders: 0,
                sell_orders: 3,
                ..
            }
        ));
        let messages = h.notifier.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.starts_with("挂单失败")));
    }

    #[tokio::test]
    async fn missing_history_falls_back_to_current_price() {
        let paper = Arc::new(PaperExchange::new("HYPE", "USDC", dec!(10), dec!(1000), dec!(7.7)));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut engine = GridEngine::new(
            PairSpec {
                name: "HYPE/USDC".to_string(),
                base_asset: "HYPE".to_string(),
                quote_asset: "USDC".to_string(),
            },
            sample_grid(),
            SettlementConfig {
                attempts: 1,
                interval_ms: 0,
            },
            GridDeps {
                account: paper.clone(),
                gateway: paper.clone(),
                notifier,
                sleeper: Arc::new(CountingSleeper::default()),
            },
        );
        engine.tick(dec!(7.7)).await.unwrap();
        assert_eq!(engine.reference_price(), Some(dec!(7.5)));
    }
}
