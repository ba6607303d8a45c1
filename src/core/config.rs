use crate::core::error::GridError;
use config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 环境变量覆盖前缀，例如 SPOTGRID__GRID__DRY_RUN=false
pub const ENV_PREFIX: &str = "SPOTGRID";

/// 策略主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub strategy: StrategyInfo,
    pub pair: PairConfig,
    pub grid: GridConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: String,
}

/// 交易对配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub base_asset: String,
    pub quote_asset: String,
    /// 交易所内部的交易对名称，留空时由交易所元数据解析
    #[serde(default)]
    pub name: Option<String>,
}

/// 网格配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub initial_buy_quantity: Decimal,
    pub buy_increment: Decimal,
    pub sell_quantity: Decimal,
    pub price_step: Decimal,
    pub num_orders: u32,
    pub price_decimals: u32,
    pub quantity_decimals: u32,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    /// 追价风控：当前价不得超过最近成交价 + N 个价格步长
    #[serde(default = "default_risk_guard_steps")]
    pub risk_guard_steps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub tick_interval_secs: u64,
    pub error_backoff_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            error_backoff_secs: 5,
        }
    }
}

impl ScheduleConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

/// 资金解锁检查配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval_ms: 1000,
        }
    }
}

impl SettlementConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Paper,
    Hyperliquid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub kind: ExchangeKind,
    #[serde(default = "default_testnet")]
    pub testnet: bool,
    /// 存放钱包地址的环境变量名
    #[serde(default = "default_wallet_env")]
    pub wallet_address_env: String,
    /// 存放 API 代理钱包私钥的环境变量名（签名下单/撤单）
    #[serde(default = "default_agent_key_env")]
    pub agent_key_env: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub paper: PaperConfig,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            kind: ExchangeKind::Paper,
            testnet: default_testnet(),
            wallet_address_env: default_wallet_env(),
            agent_key_env: default_agent_key_env(),
            request_timeout_secs: default_request_timeout(),
            paper: PaperConfig::default(),
        }
    }
}

/// 模拟盘初始状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    pub base_balance: Decimal,
    pub quote_balance: Decimal,
    pub start_price: Decimal,
    /// 撤单后冻结资金延迟释放的余额查询次数
    #[serde(default)]
    pub settlement_lag: u32,
    /// 价格跟随 Hyperliquid allMids
    #[serde(default)]
    pub live_prices: bool,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            base_balance: Decimal::from(10),
            quote_balance: Decimal::from(1000),
            start_price: Decimal::from(10),
            settlement_lag: 0,
            live_prices: false,
        }
    }
}

/// 通知配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// dry_run 时只写日志不推送
    #[serde(default = "default_true")]
    pub mute_in_dry_run: bool,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_seconds: u64,
    #[serde(default)]
    pub wecom: Option<WeComConfig>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mute_in_dry_run: true,
            rate_limit_seconds: default_rate_limit(),
            wecom: None,
            telegram: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeComConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub mentioned_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,
    #[serde(default = "default_chat_id_env")]
    pub chat_id_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: None,
            console: true,
        }
    }
}

fn default_dry_run() -> bool {
    true
}

fn default_risk_guard_steps() -> u32 {
    10
}

fn default_testnet() -> bool {
    true
}

fn default_wallet_env() -> String {
    "HYPERLIQUID_ADDRESS".to_string()
}

fn default_agent_key_env() -> String {
    "HYPERLIQUID_AGENT_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_rate_limit() -> u64 {
    60
}

fn default_bot_token_env() -> String {
    "BOT_TOKEN".to_string()
}

fn default_chat_id_env() -> String {
    "CHAT_ID".to_string()
}

impl AppConfig {
    /// 从YAML文件加载配置，并叠加 SPOTGRID__ 前缀的环境变量
    pub fn from_file(path: &str) -> Result<Self, GridError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).format(FileFormat::Yaml))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| GridError::ConfigError(format!("读取配置文件失败: {}", e)))?;
        Self::from_settings(settings)
    }

    /// 从YAML文本加载配置（不读取环境变量）
    pub fn from_yaml_str(contents: &str) -> Result<Self, GridError> {
        let settings = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Yaml))
            .build()
            .map_err(|e| GridError::ConfigError(format!("解析配置失败: {}", e)))?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: Config) -> Result<Self, GridError> {
        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| GridError::ConfigError(format!("配置字段错误: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GridError> {
        let grid = &self.grid;
        if grid.price_step <= Decimal::ZERO {
            return Err(GridError::validation("grid.price_step", "必须大于0"));
        }
        if grid.num_orders == 0 {
            return Err(GridError::validation("grid.num_orders", "必须大于0"));
        }
        if grid.initial_buy_quantity <= Decimal::ZERO || grid.sell_quantity <= Decimal::ZERO {
            return Err(GridError::validation("grid", "挂单数量必须大于0"));
        }
        if grid.buy_increment < Decimal::ZERO {
            return Err(GridError::validation("grid.buy_increment", "不能为负数"));
        }
        if grid.risk_guard_steps == 0 {
            return Err(GridError::validation("grid.risk_guard_steps", "必须大于0"));
        }
        if self.settlement.attempts == 0 {
            return Err(GridError::validation("settlement.attempts", "必须大于0"));
        }
        if self.pair.base_asset.is_empty() || self.pair.quote_asset.is_empty() {
            return Err(GridError::validation("pair", "基础资产和计价资产不能为空"));
        }
        if self.exchange.kind == ExchangeKind::Hyperliquid && self.exchange.agent_key_env.is_empty() {
            return Err(GridError::validation("exchange.agent_key_env", "不能为空"));
        }
        Ok(())
    }
}
