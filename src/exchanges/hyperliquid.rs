use crate::core::error::GridError;
use crate::core::exchange::{AccountState, OrderGateway, PriceFeed};
use crate::core::types::*;
use async_trait::async_trait;
use ethers::signers::LocalWallet;
use hyperliquid_rust_sdk::{
    BaseUrl, ClientCancelRequest, ClientLimit, ClientOrder, ClientOrderRequest,
    ExchangeClient, ExchangeDataStatus, ExchangeResponseStatus,
};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";
const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";

#[derive(Debug, Deserialize)]
struct SpotMeta {
    tokens: Vec<SpotToken>,
    universe: Vec<SpotPair>,
}

#[derive(Debug, Deserialize)]
struct SpotToken {
    name: String,
    index: u32,
}

#[derive(Debug, Deserialize)]
struct SpotPair {
    name: String,
    tokens: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct SpotUserState {
    balances: Vec<SpotBalance>,
}

#[derive(Debug, Deserialize)]
struct SpotBalance {
    coin: String,
    total: Decimal,
    hold: Decimal,
}

#[derive(Debug, Deserialize)]
struct UserFill {
    coin: String,
    px: Decimal,
    sz: Decimal,
    side: String,
    time: i64,
}

#[derive(Debug, Deserialize)]
struct OpenOrder {
    coin: String,
    oid: OrderId,
}

#[derive(Debug, Deserialize)]
struct OrderStatusResponse {
    status: String,
    #[serde(default)]
    order: Option<OrderStatusEnvelope>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusEnvelope {
    order: OrderDetail,
    status: String,
    status_timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDetail {
    side: String,
    limit_px: Decimal,
    orig_sz: Decimal,
}

/// Hyperliquid 现货交易所
///
/// 查询走公开的 /info 接口；配置了 API 代理钱包私钥后，下单与撤单通过 SDK 签名发往 /exchange。
pub struct HyperliquidExchange {
    client: Client,
    base_url: String,
    use_testnet: bool,
    wallet_address: String,
    pair: String,
    trader: Option<ExchangeClient>,
}

impl HyperliquidExchange {
    /// 创建只读实例
    pub fn new(
        wallet_address: String,
        use_testnet: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = if use_testnet {
            TESTNET_API_URL
        } else {
            MAINNET_API_URL
        };
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            use_testnet,
            wallet_address,
            pair: String::new(),
            trader: None,
        })
    }

    /// 绑定交易对名称（spotMeta 中的 name，例如 "@107"），下单与撤单都使用该名称
    pub fn with_pair(mut self, pair: &str) -> Self {
        self.pair = pair.to_string();
        self
    }

    /// 加载 API 代理钱包，开启签名下单/撤单
    pub async fn with_agent_key(mut self, private_key: &str) -> Result<Self> {
        let wallet: LocalWallet = private_key
            .trim()
            .parse()
            .map_err(|e| GridError::ConfigError(format!("无效的代理钱包私钥: {}", e)))?;
        let base_url = if self.use_testnet {
            BaseUrl::Testnet
        } else {
            BaseUrl::Mainnet
        };
        let trader = ExchangeClient::new(None, wallet, Some(base_url), None, None)
            .await
            .map_err(|e| GridError::ConfigError(format!("初始化Hyperliquid交易客户端失败: {}", e)))?;
        self.trader = Some(trader);
        Ok(self)
    }

    pub fn can_trade(&self) -> bool {
        self.trader.is_some()
    }

    fn trader(&self) -> Result<&ExchangeClient> {
        self.trader
            .as_ref()
            .ok_or_else(|| GridError::NotSupported("未配置代理钱包私钥，Hyperliquid 只读".to_string()))
    }

    async fn info<T: DeserializeOwned>(&self, body: serde_json::Value) -> Result<T> {
        let url = format!("{}/info", self.base_url);
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(GridError::GatewayServerError {
                message: format!("HTTP {}: {}", status, text),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GridError::GatewayClientError {
                code: status.as_u16() as i32,
                message: text,
            });
        }

        let value: serde_json::Value = response.json().await?;
        serde_json::from_value(value).map_err(|e| GridError::ParseError(e.to_string()))
    }

    /// 根据基础/计价资产名称查找现货交易对名称
    pub async fn resolve_spot_pair(&self, base_asset: &str, quote_asset: &str) -> Result<String> {
        let meta: SpotMeta = self.info(serde_json::json!({ "type": "spotMeta" })).await?;
        find_pair(&meta, base_asset, quote_asset)
    }
}

fn find_pair(meta: &SpotMeta, base_asset: &str, quote_asset: &str) -> Result<String> {
    let index_of = |name: &str| {
        meta.tokens
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.index)
    };
    let unknown = || GridError::UnknownPair {
        base: base_asset.to_string(),
        quote: quote_asset.to_string(),
    };

    let base = index_of(base_asset).ok_or_else(unknown)?;
    let quote = index_of(quote_asset).ok_or_else(unknown)?;
    meta.universe
        .iter()
        .find(|p| p.tokens == [base, quote])
        .map(|p| p.name.clone())
        .ok_or_else(unknown)
}

fn parse_status(response: OrderStatusResponse, order_id: OrderId) -> Result<OrderStatusReport> {
    let envelope = match (response.status.as_str(), response.order) {
        ("order", Some(envelope)) => envelope,
        (status, _) => {
            return Err(GridError::GatewayClientError {
                code: 404,
                message: format!("订单 {} 查询失败: {}", order_id, status),
            })
        }
    };

    match envelope.status.as_str() {
        "filled" => Ok(OrderStatusReport::Filled(Fill {
            side: envelope.order.side.parse()?,
            quantity: envelope.order.orig_sz,
            price: envelope.order.limit_px,
            timestamp: envelope.status_timestamp,
        })),
        "open" | "triggered" => Ok(OrderStatusReport::Open),
        // canceled / marginCanceled / rejected 等终态均按取消处理
        _ => Ok(OrderStatusReport::Canceled),
    }
}

fn to_f64(field: &str, value: Decimal) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| GridError::validation(field, format!("无法转换为浮点数: {}", value)))
}

fn sdk_error(e: hyperliquid_rust_sdk::Error) -> GridError {
    GridError::GatewayServerError {
        message: format!("Hyperliquid 请求失败: {}", e),
    }
}

/// 解析下单返回：statuses[0] 为 resting/filled 视为挂单成功，error 为交易所拒单
fn place_outcome(status: ExchangeResponseStatus) -> Result<PlaceOutcome> {
    let response = match status {
        ExchangeResponseStatus::Ok(response) => response,
        ExchangeResponseStatus::Err(message) => {
            return Ok(PlaceOutcome::Rejected {
                code: None,
                message,
            })
        }
    };

    match response.data.and_then(|d| d.statuses.into_iter().next()) {
        Some(ExchangeDataStatus::Resting(order)) => Ok(PlaceOutcome::Placed { order_id: order.oid }),
        Some(ExchangeDataStatus::Filled(order)) => Ok(PlaceOutcome::Placed { order_id: order.oid }),
        Some(ExchangeDataStatus::Error(message)) => Ok(PlaceOutcome::Rejected {
            code: None,
            message,
        }),
        other => Err(GridError::GatewayServerError {
            message: format!("无法识别的下单返回: {:?}", other),
        }),
    }
}

/// 批量撤单返回中失败的订单
fn cancel_failures(
    order_ids: &[OrderId],
    status: ExchangeResponseStatus,
) -> Result<Vec<(OrderId, String)>> {
    let response = match status {
        ExchangeResponseStatus::Ok(response) => response,
        ExchangeResponseStatus::Err(message) => {
            return Err(GridError::GatewayServerError { message })
        }
    };

    let statuses = response.data.map(|d| d.statuses).unwrap_or_default();
    Ok(order_ids
        .iter()
        .zip(statuses)
        .filter_map(|(&id, status)| match status {
            ExchangeDataStatus::Error(message) => Some((id, message)),
            _ => None,
        })
        .collect())
}

#[async_trait]
impl PriceFeed for HyperliquidExchange {
    async fn mid_price(&self, pair: &str) -> Result<Decimal> {
        let mids: HashMap<String, Decimal> =
            self.info(serde_json::json!({ "type": "allMids" })).await?;
        mids.get(pair)
            .copied()
            .ok_or_else(|| GridError::ParseError(format!("allMids 中缺少 {}", pair)))
    }
}

#[async_trait]
impl AccountState for HyperliquidExchange {
    async fn balance(&self, asset: &str) -> Result<Balance> {
        let state: SpotUserState = self
            .info(serde_json::json!({
                "type": "spotClearinghouseState",
                "user": self.wallet_address,
            }))
            .await?;

        Ok(state
            .balances
            .into_iter()
            .find(|b| b.coin == asset)
            .map(|b| Balance::new(asset, b.total, b.hold))
            .unwrap_or_else(|| Balance::new(asset, Decimal::ZERO, Decimal::ZERO)))
    }

    async fn recent_fills(&self, pair: &str) -> Result<Vec<Fill>> {
        let fills: Vec<UserFill> = self
            .info(serde_json::json!({
                "type": "userFills",
                "user": self.wallet_address,
            }))
            .await?;

        fills
            .into_iter()
            .filter(|f| f.coin == pair)
            .map(|f| {
                Ok(Fill {
                    side: f.side.parse()?,
                    quantity: f.sz,
                    price: f.px,
                    timestamp: f.time,
                })
            })
            .collect()
    }

    async fn open_orders(&self, pair: &str) -> Result<Vec<OrderId>> {
        let orders: Vec<OpenOrder> = self
            .info(serde_json::json!({
                "type": "openOrders",
                "user": self.wallet_address,
            }))
            .await?;

        Ok(orders
            .into_iter()
            .filter(|o| o.coin == pair)
            .map(|o| o.oid)
            .collect())
    }
}

#[async_trait]
impl OrderGateway for HyperliquidExchange {
    async fn place(
        &self,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<PlaceOutcome> {
        let trader = self.trader()?;
        let request = ClientOrderRequest {
            asset: self.pair.clone(),
            is_buy: side == OrderSide::Buy,
            reduce_only: false,
            limit_px: to_f64("price", price)?,
            sz: to_f64("quantity", quantity)?,
            cloid: None,
            order_type: ClientOrder::Limit(ClientLimit {
                tif: "Gtc".to_string(),
            }),
        };

        let status = trader.order(request, None).await.map_err(sdk_error)?;
        place_outcome(status)
    }

    async fn cancel_batch(&self, order_ids: &[OrderId]) -> Result<()> {
        let trader = self.trader()?;
        if order_ids.is_empty() {
            return Ok(());
        }

        let cancels = order_ids
            .iter()
            .map(|&oid| ClientCancelRequest {
                asset: self.pair.clone(),
                oid,
            })
            .collect();
        let status = trader.bulk_cancel(cancels, None).await.map_err(sdk_error)?;
        for (order_id, message) in cancel_failures(order_ids, status)? {
            // 订单可能已成交或已被取消
            log::warn!("撤销订单 #{} 失败: {}", order_id, message);
        }
        Ok(())
    }

    async fn query_status(&self, order_id: OrderId) -> Result<OrderStatusReport> {
        let response: OrderStatusResponse = self
            .info(serde_json::json!({
                "type": "orderStatus",
                "user": self.wallet_address,
                "oid": order_id,
            }))
            .await?;
        parse_status(response, order_id)
    }
}
