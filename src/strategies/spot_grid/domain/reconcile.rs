//! 成交对账：消失订单的参考价偏移与“最新成交”判定

use rust_decimal::Decimal;

use crate::core::types::{Fill, OrderSide};

/// 对账过程中维护的最新成交记录
#[derive(Debug, Clone, PartialEq)]
pub struct LatestFill {
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub timestamp: i64,
    /// 同时间戳比较用的价格，随数量替换而更新；记录的 price 保持首笔
    tie_price: Decimal,
}

impl LatestFill {
    /// 以账户最近成交为初值，时间戳归零，任何刚确认的成交都更新
    pub fn seeded(fill: &Fill) -> Self {
        Self {
            side: fill.side,
            quantity: fill.quantity,
            price: fill.price,
            timestamp: 0,
            tie_price: fill.price,
        }
    }

    /// 更晚的成交覆盖整条记录；同一时间戳、同方向时取更保守的价格
    /// (买单取更低价，卖单取更高价)，且只替换数量
    pub fn observe(&mut self, fill: &Fill) {
        if fill.timestamp > self.timestamp {
            self.side = fill.side;
            self.quantity = fill.quantity;
            self.price = fill.price;
            self.timestamp = fill.timestamp;
            self.tie_price = fill.price;
        } else if fill.timestamp == self.timestamp && fill.side == self.side {
            let more_conservative = match fill.side {
                OrderSide::Buy => fill.price < self.tie_price,
                OrderSide::Sell => fill.price > self.tie_price,
            };
            if more_conservative {
                self.quantity = fill.quantity;
                self.tie_price = fill.price;
            }
        }
    }
}

/// 成交导致的参考价偏移：买入成交下移一档，卖出成交上移一档
pub fn shift_reference(reference: Decimal, side: OrderSide, step: Decimal) -> Decimal {
    match side {
        OrderSide::Buy => reference - step,
        OrderSide::Sell => reference + step,
    }
}

/// 成交通知文本
#[derive(Debug, Default, Clone)]
pub struct FillSummary {
    lines: Vec<String>,
}

impl FillSummary {
    pub fn push(&mut self, fill: &Fill, base_asset: &str) {
        self.lines.push(format!(
            "{} {}{} at {}",
            fill.side, fill.quantity, base_asset, fill.price
        ));
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}
