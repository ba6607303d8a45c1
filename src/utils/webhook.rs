//! Webhook通知模块
//! 告警推送到企业微信 / Telegram，推送失败只记日志

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::core::config::NotificationConfig;
use crate::core::error::GridError;
use crate::core::exchange::Notifier;
use crate::core::types::Result;

/// 企业微信文本消息
#[derive(Debug, Serialize)]
struct WeChatWorkMessage {
    msgtype: String,
    text: TextContent,
}

#[derive(Debug, Serialize)]
struct TextContent {
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    mentioned_list: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Clone)]
struct TelegramTarget {
    bot_token: String,
    chat_id: String,
}

/// Webhook通知器
pub struct WebhookNotifier {
    strategy: String,
    config: NotificationConfig,
    muted: bool,
    client: Client,
    telegram: Option<TelegramTarget>,
    /// 上次发送时间记录（按标题限流）
    last_send_times: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl WebhookNotifier {
    /// 创建通知器，Telegram 凭证从环境变量读取
    pub fn new(strategy: &str, config: NotificationConfig, dry_run: bool) -> Result<Self> {
        let telegram = match (&config.telegram, config.enabled) {
            (Some(tg), true) => Some(TelegramTarget {
                bot_token: read_env(&tg.bot_token_env)?,
                chat_id: read_env(&tg.chat_id_env)?,
            }),
            _ => None,
        };

        Ok(Self {
            strategy: strategy.to_string(),
            muted: dry_run && config.mute_in_dry_run,
            config,
            client: Client::new(),
            telegram,
            last_send_times: RwLock::new(HashMap::new()),
        })
    }

    /// 是否需要真正推送（开关、静默、限流）
    async fn should_deliver(&self, text: &str) -> bool {
        if !self.config.enabled || self.muted {
            return false;
        }

        // 以完整文本为键，内容相同才限流
        if !self.check_rate_limit(text).await {
            debug!("跳过推送，限流中: {}", text.lines().next().unwrap_or_default());
            return false;
        }
        true
    }

    /// 检查限流
    async fn check_rate_limit(&self, key: &str) -> bool {
        let mut times = self.last_send_times.write().await;
        let now = Utc::now();

        if let Some(last_time) = times.get(key) {
            let elapsed = now.signed_duration_since(*last_time);
            if elapsed < Duration::seconds(self.config.rate_limit_seconds as i64) {
                return false;
            }
        }

        times.insert(key.to_string(), now);
        true
    }

    fn build_message(&self, text: &str) -> String {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        format!("[{}] {}\n{}", self.strategy, now, text)
    }

    /// 发送到企业微信
    async fn send_to_wechat_work(&self, url: &str, content: String) -> Result<()> {
        let message = WeChatWorkMessage {
            msgtype: "text".to_string(),
            text: TextContent {
                content,
                mentioned_list: self
                    .config
                    .wecom
                    .as_ref()
                    .map(|w| w.mentioned_list.clone())
                    .unwrap_or_default(),
            },
        };

        let response = self.client.post(url).json(&message).send().await?;
        if !response.status().is_success() {
            return Err(GridError::GatewayServerError {
                message: format!("企业微信返回 {}", response.status()),
            });
        }
        Ok(())
    }

    async fn send_to_telegram(&self, target: &TelegramTarget, content: &str) -> Result<()> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            target.bot_token
        );
        let message = TelegramMessage {
            chat_id: &target.chat_id,
            text: content,
        };

        let response = self.client.post(&url).json(&message).send().await?;
        if !response.status().is_success() {
            return Err(GridError::GatewayServerError {
                message: format!("Telegram返回 {}", response.status()),
            });
        }
        Ok(())
    }
}

fn read_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| GridError::ConfigError(format!("缺少环境变量 {}", name)))
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_alert(&self, text: &str) {
        warn!("[告警] {}", text);
        if !self.should_deliver(text).await {
            return;
        }

        let content = self.build_message(text);
        if let Some(wecom) = &self.config.wecom {
            match self.send_to_wechat_work(&wecom.webhook_url, content.clone()).await {
                Ok(()) => info!("成功发送企业微信通知"),
                Err(e) => warn!("企业微信发送失败: {}", e),
            }
        }
        if let Some(target) = &self.telegram {
            match self.send_to_telegram(target, &content).await {
                Ok(()) => info!("成功发送Telegram通知"),
                Err(e) => warn!("Telegram发送失败: {}", e),
            }
        }
    }
}

/// 只写日志的通知器
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_alert(&self, text: &str) {
        warn!("[告警] {}", text);
    }
}
