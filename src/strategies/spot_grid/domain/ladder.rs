//! 网格价格/数量计算
//!
//! 纯算法部分：参考价取整、逐档价格与数量、余额准入。不访问交易所。

use rust_decimal::Decimal;

use crate::core::config::GridConfig;
use crate::core::types::OrderSide;

/// 单档挂单计划
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelPlan {
    pub level: u32,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
}

impl LevelPlan {
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// 价格抹零，向下取整为 step 的整数倍
pub fn floor_to_step(price: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return price;
    }
    (price / step).floor() * step
}

/// 买单：自参考价向下逐档，数量逐档递增
pub fn buy_levels(config: &GridConfig, reference: Decimal, base_quantity: Decimal) -> Vec<LevelPlan> {
    (0..config.num_orders)
        .map(|i| {
            let offset = config.price_step * Decimal::from(i + 1);
            LevelPlan {
                level: i,
                side: OrderSide::Buy,
                price: (reference - offset).round_dp(config.price_decimals),
                quantity: (base_quantity + config.buy_increment * Decimal::from(i))
                    .round_dp(config.quantity_decimals),
            }
        })
        .collect()
}

/// 卖单：自参考价向上逐档，固定数量
pub fn sell_levels(config: &GridConfig, reference: Decimal) -> Vec<LevelPlan> {
    (0..config.num_orders)
        .map(|i| {
            let offset = config.price_step * Decimal::from(i + 1);
            LevelPlan {
                level: i,
                side: OrderSide::Sell,
                price: (reference + offset).round_dp(config.price_decimals),
                quantity: config.sell_quantity,
            }
        })
        .collect()
}

/// 买单基础数量：上一笔为买入成交则在其数量上加仓，否则重置
pub fn next_buy_base(config: &GridConfig, latest_side: OrderSide, latest_quantity: Decimal) -> Decimal {
    match latest_side {
        OrderSide::Buy => latest_quantity + config.buy_increment,
        OrderSide::Sell => config.initial_buy_quantity,
    }
}

/// 余额不足
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shortfall {
    pub required: Decimal,
    pub available: Decimal,
}

/// 单边挂单过程中的本地余额跟踪，每成功挂一单即扣减
#[derive(Debug, Clone, Copy)]
pub struct BalanceTracker {
    available: Decimal,
}

impl BalanceTracker {
    pub fn new(available: Decimal) -> Self {
        Self { available }
    }

    pub fn available(&self) -> Decimal {
        self.available
    }

    /// 买单占用计价资产（价格×数量），卖单占用基础资产（数量）
    pub fn requirement(plan: &LevelPlan) -> Decimal {
        match plan.side {
            OrderSide::Buy => plan.notional(),
            OrderSide::Sell => plan.quantity,
        }
    }

    pub fn admit(&self, plan: &LevelPlan) -> Result<(), Shortfall> {
        let required = Self::requirement(plan);
        if self.available >= required {
            Ok(())
        } else {
            Err(Shortfall {
                required,
                available: self.available,
            })
        }
    }

    pub fn consume(&mut self, plan: &LevelPlan) {
        self.available -= Self::requirement(plan);
    }
}
