// 交易所实现
pub mod hyperliquid;
pub mod paper;

pub use hyperliquid::HyperliquidExchange;
pub use paper::PaperExchange;
