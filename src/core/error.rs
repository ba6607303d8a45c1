use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("参数验证错误: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("挂单失败! error_code: {code} error_message: {message}")]
    GatewayClientError { code: i32, message: String },

    #[error("挂单服务器错误: {message}")]
    GatewayServerError { message: String },

    #[error("资金尚未全部解锁 (已尝试 {attempts} 次)")]
    SettlementTimeout { attempts: u32 },

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("交易对未找到: {base}/{quote}")]
    UnknownPair { base: String, quote: String },

    #[error("数据解析错误: {0}")]
    ParseError(String),

    #[error("不支持的功能: {0}")]
    NotSupported(String),
}

impl GridError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        GridError::ValidationError {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// 单笔挂单层面即可消化的错误：告警后继续下一档
    pub fn is_placement_failure(&self) -> bool {
        matches!(
            self,
            GridError::ValidationError { .. }
                | GridError::GatewayClientError { .. }
                | GridError::GatewayServerError { .. }
        )
    }
}
