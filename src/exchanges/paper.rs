//! 模拟盘交易所
//!
//! 单交易对的内存撮合：限价单冻结资金，中间价穿过挂单价时按挂单价成交，
//! 撤单释放冻结。可选延迟释放（settlement_lag）用于模拟交易所资金解锁滞后。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::core::error::GridError;
use crate::core::exchange::{AccountState, OrderGateway, PriceFeed};
use crate::core::types::{
    Balance, Fill, OrderId, OrderSide, OrderStatusReport, PlaceOutcome, Result,
};

#[derive(Debug, Clone)]
struct PaperOrder {
    side: OrderSide,
    price: Decimal,
    quantity: Decimal,
}

#[derive(Debug, Clone)]
enum PaperOrderState {
    Open(PaperOrder),
    Filled(Fill),
    Canceled,
}

/// 延迟释放的冻结资金
#[derive(Debug, Clone)]
struct PendingRelease {
    asset: String,
    amount: Decimal,
    remaining_polls: u32,
}

#[derive(Debug, Default)]
struct PaperBook {
    mid_price: Decimal,
    totals: HashMap<String, Decimal>,
    frozen: HashMap<String, Decimal>,
    pending: Vec<PendingRelease>,
    orders: BTreeMap<OrderId, PaperOrderState>,
    fills: Vec<Fill>,
    next_id: OrderId,
    last_timestamp: i64,
}

impl PaperBook {
    fn total(&self, asset: &str) -> Decimal {
        self.totals.get(asset).copied().unwrap_or_default()
    }

    fn adjust_total(&mut self, asset: &str, delta: Decimal) {
        *self.totals.entry(asset.to_string()).or_default() += delta;
    }

    fn open_orders(&self) -> impl Iterator<Item = (&OrderId, &PaperOrder)> {
        self.orders.iter().filter_map(|(id, state)| match state {
            PaperOrderState::Open(order) => Some((id, order)),
            _ => None,
        })
    }

    fn order_hold(&self, asset: &str, base: &str, quote: &str) -> Decimal {
        self.open_orders()
            .map(|(_, order)| match order.side {
                OrderSide::Buy if asset == quote => order.price * order.quantity,
                OrderSide::Sell if asset == base => order.quantity,
                _ => Decimal::ZERO,
            })
            .sum()
    }

    fn pending_hold(&self, asset: &str) -> Decimal {
        self.pending
            .iter()
            .filter(|p| p.asset == asset && p.remaining_polls > 0)
            .map(|p| p.amount)
            .sum()
    }

    fn hold(&self, asset: &str, base: &str, quote: &str) -> Decimal {
        self.order_hold(asset, base, quote)
            + self.frozen.get(asset).copied().unwrap_or_default()
            + self.pending_hold(asset)
    }

    fn next_timestamp(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn release(&mut self, asset: &str, amount: Decimal, lag: u32) {
        if lag > 0 && !amount.is_zero() {
            self.pending.push(PendingRelease {
                asset: asset.to_string(),
                amount,
                remaining_polls: lag,
            });
        }
    }
}

/// 内存模拟交易所
pub struct PaperExchange {
    base_asset: String,
    quote_asset: String,
    settlement_lag: u32,
    price_source: Option<(Arc<dyn PriceFeed>, String)>,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(
        base_asset: &str,
        quote_asset: &str,
        base_balance: Decimal,
        quote_balance: Decimal,
        mid_price: Decimal,
    ) -> Self {
        let mut book = PaperBook {
            mid_price,
            next_id: 1,
            ..PaperBook::default()
        };
        book.totals.insert(base_asset.to_string(), base_balance);
        book.totals.insert(quote_asset.to_string(), quote_balance);

        Self {
            base_asset: base_asset.to_string(),
            quote_asset: quote_asset.to_string(),
            settlement_lag: 0,
            price_source: None,
            book: Mutex::new(book),
        }
    }

    /// 撤单后冻结资金在若干次余额查询后才释放
    pub fn with_settlement_lag(mut self, polls: u32) -> Self {
        self.settlement_lag = polls;
        self
    }

    /// 跟随外部行情：每次查询中间价时先从上游取价并撮合
    pub fn with_price_source(mut self, feed: Arc<dyn PriceFeed>, pair: &str) -> Self {
        self.price_source = Some((feed, pair.to_string()));
        self
    }

    pub fn pair_name(&self) -> String {
        format!("{}/{}", self.base_asset, self.quote_asset)
    }

    /// 写入一笔历史成交（最新在前）
    pub async fn seed_fill(&self, fill: Fill) {
        let mut book = self.book.lock().await;
        book.last_timestamp = book.last_timestamp.max(fill.timestamp);
        book.fills.insert(0, fill);
    }

    /// 额外冻结一笔资金（模拟交易所侧未释放的占用）
    pub async fn freeze(&self, asset: &str, amount: Decimal) {
        let mut book = self.book.lock().await;
        *book.frozen.entry(asset.to_string()).or_default() += amount;
    }

    /// 释放所有额外冻结（遵循 settlement_lag）
    pub async fn release_all_holds(&self) {
        let mut book = self.book.lock().await;
        let frozen: Vec<(String, Decimal)> = book.frozen.drain().collect();
        for (asset, amount) in frozen {
            book.release(&asset, amount, self.settlement_lag);
        }
    }

    /// 更新中间价并撮合所有被穿过的挂单，返回本次成交
    pub async fn set_mid_price(&self, price: Decimal) -> Vec<Fill> {
        let mut book = self.book.lock().await;
        book.mid_price = price;

        let crossed: Vec<(OrderId, PaperOrder)> = book
            .open_orders()
            .filter(|(_, order)| match order.side {
                OrderSide::Buy => price <= order.price,
                OrderSide::Sell => price >= order.price,
            })
            .map(|(id, order)| (*id, order.clone()))
            .collect();

        if crossed.is_empty() {
            return Vec::new();
        }

        let timestamp = book.next_timestamp();
        let mut fills = Vec::with_capacity(crossed.len());
        for (id, order) in crossed {
            let notional = order.price * order.quantity;
            match order.side {
                OrderSide::Buy => {
                    book.adjust_total(&self.quote_asset, -notional);
                    book.adjust_total(&self.base_asset, order.quantity);
                }
                OrderSide::Sell => {
                    book.adjust_total(&self.base_asset, -order.quantity);
                    book.adjust_total(&self.quote_asset, notional);
                }
            }
            let fill = Fill {
                side: order.side,
                quantity: order.quantity,
                price: order.price,
                timestamp,
            };
            log::info!("[paper] 成交 #{} {} {} @ {}", id, fill.side, fill.quantity, fill.price);
            book.orders.insert(id, PaperOrderState::Filled(fill.clone()));
            book.fills.insert(0, fill.clone());
            fills.push(fill);
        }
        fills
    }

    pub async fn current_mid(&self) -> Decimal {
        self.book.lock().await.mid_price
    }
}

#[async_trait]
impl PriceFeed for PaperExchange {
    async fn mid_price(&self, _pair: &str) -> Result<Decimal> {
        if let Some((feed, pair)) = &self.price_source {
            let price = feed.mid_price(pair).await?;
            self.set_mid_price(price).await;
            return Ok(price);
        }
        Ok(self.current_mid().await)
    }
}

#[async_trait]
impl AccountState for PaperExchange {
    async fn balance(&self, asset: &str) -> Result<Balance> {
        let mut book = self.book.lock().await;
        let hold = book.hold(asset, &self.base_asset, &self.quote_asset);
        let total = book.total(asset);

        for pending in book.pending.iter_mut().filter(|p| p.asset == asset) {
            pending.remaining_polls = pending.remaining_polls.saturating_sub(1);
        }
        book.pending.retain(|p| p.remaining_polls > 0);

        Ok(Balance::new(asset, total, hold))
    }

    async fn recent_fills(&self, _pair: &str) -> Result<Vec<Fill>> {
        Ok(self.book.lock().await.fills.clone())
    }

    async fn open_orders(&self, _pair: &str) -> Result<Vec<OrderId>> {
        Ok(self.book.lock().await.open_orders().map(|(id, _)| *id).collect())
    }
}

#[async_trait]
impl OrderGateway for PaperExchange {
    async fn place(
        &self,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<PlaceOutcome> {
        if quantity <= Decimal::ZERO || price <= Decimal::ZERO {
            return Ok(PlaceOutcome::Rejected {
                code: None,
                message: format!("Order has invalid size {} or price {}", quantity, price),
            });
        }

        let mut book = self.book.lock().await;
        let (asset, required) = match side {
            OrderSide::Buy => (self.quote_asset.clone(), price * quantity),
            OrderSide::Sell => (self.base_asset.clone(), quantity),
        };
        let available =
            book.total(&asset) - book.hold(&asset, &self.base_asset, &self.quote_asset);
        if available < required {
            return Err(GridError::GatewayClientError {
                code: 400,
                message: format!(
                    "Insufficient spot balance: {} required {}, available {}",
                    asset, required, available
                ),
            });
        }

        let order_id = book.next_id;
        book.next_id += 1;
        book.orders.insert(
            order_id,
            PaperOrderState::Open(PaperOrder {
                side,
                price,
                quantity,
            }),
        );
        Ok(PlaceOutcome::Placed { order_id })
    }

    async fn cancel_batch(&self, order_ids: &[OrderId]) -> Result<()> {
        let mut book = self.book.lock().await;
        for id in order_ids {
            let order = match book.orders.get(id) {
                Some(PaperOrderState::Open(order)) => order.clone(),
                _ => continue,
            };
            book.orders.insert(*id, PaperOrderState::Canceled);
            let (asset, amount) = match order.side {
                OrderSide::Buy => (self.quote_asset.clone(), order.price * order.quantity),
                OrderSide::Sell => (self.base_asset.clone(), order.quantity),
            };
            book.release(&asset, amount, self.settlement_lag);
        }
        Ok(())
    }

    async fn query_status(&self, order_id: OrderId) -> Result<OrderStatusReport> {
        let book = self.book.lock().await;
        match book.orders.get(&order_id) {
            Some(PaperOrderState::Open(_)) => Ok(OrderStatusReport::Open),
            Some(PaperOrderState::Filled(fill)) => Ok(OrderStatusReport::Filled(fill.clone())),
            Some(PaperOrderState::Canceled) => Ok(OrderStatusReport::Canceled),
            None => Err(GridError::GatewayClientError {
                code: 404,
                message: format!("unknown order id {}", order_id),
            }),
        }
    }
}
