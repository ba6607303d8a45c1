//! 统一的类型定义模块
//! 网格引擎与交易所适配层之间传递的数据结构
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::error::GridError;

// ============= 基础类型定义 =============

/// 结果类型别名
pub type Result<T> = std::result::Result<T, GridError>;

/// 交易所订单ID
pub type OrderId = u64;

/// 账户余额
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub total: Decimal,
    pub hold: Decimal,
}

impl Balance {
    pub fn new(asset: &str, total: Decimal, hold: Decimal) -> Self {
        Self {
            asset: asset.to_string(),
            total,
            hold,
        }
    }

    pub fn available(&self) -> Decimal {
        self.total - self.hold
    }

    pub fn is_settled(&self) -> bool {
        self.hold.is_zero()
    }
}

// ============= 订单相关 =============

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn label(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 接受 BUY/SELL 以及 Hyperliquid 的 B/A 缩写
impl FromStr for OrderSide {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "B" | "BID" => Ok(OrderSide::Buy),
            "SELL" | "A" | "ASK" => Ok(OrderSide::Sell),
            other => Err(GridError::validation(
                "side",
                format!("Order side should be BUY or SELL, got '{}'", other),
            )),
        }
    }
}

/// 本引擎挂出的订单（仅驻留内存）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRef {
    pub id: OrderId,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// 成交记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    /// 毫秒时间戳
    pub timestamp: i64,
}

/// 下单结果
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceOutcome {
    Placed { order_id: OrderId },
    /// 交易所受理了请求但拒绝了订单（业务规则错误）
    Rejected { code: Option<i32>, message: String },
}

/// 订单终态查询结果
#[derive(Debug, Clone, PartialEq)]
pub enum OrderStatusReport {
    Filled(Fill),
    Open,
    Canceled,
}
