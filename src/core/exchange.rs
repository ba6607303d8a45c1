use crate::core::types::{Balance, Fill, OrderId, OrderSide, OrderStatusReport, PlaceOutcome, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// 行情接口
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// 获取交易对中间价
    async fn mid_price(&self, pair: &str) -> Result<Decimal>;
}

/// 账户接口
#[async_trait]
pub trait AccountState: Send + Sync {
    /// 获取单个资产余额（未持有的资产返回零余额）
    async fn balance(&self, asset: &str) -> Result<Balance>;

    /// 获取交易对最近成交，按时间倒序
    async fn recent_fills(&self, pair: &str) -> Result<Vec<Fill>>;

    /// 获取交易对当前活跃订单ID
    async fn open_orders(&self, pair: &str) -> Result<Vec<OrderId>>;

    /// 获取交易对最新一笔成交
    async fn last_fill(&self, pair: &str) -> Result<Option<Fill>> {
        Ok(self.recent_fills(pair).await?.into_iter().next())
    }
}

/// 下单接口
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// 挂限价单 (GTC)
    async fn place(&self, side: OrderSide, quantity: Decimal, price: Decimal)
        -> Result<PlaceOutcome>;

    /// 批量取消订单
    async fn cancel_batch(&self, order_ids: &[OrderId]) -> Result<()>;

    /// 查询订单状态
    async fn query_status(&self, order_id: OrderId) -> Result<OrderStatusReport>;
}

/// 告警通道，投递失败只记日志
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(&self, text: &str);
}
