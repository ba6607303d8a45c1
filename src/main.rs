use anyhow::Context;
use clap::Parser;
use spotgrid::core::config::{AppConfig, ExchangeConfig, ExchangeKind};
use spotgrid::core::exchange::{AccountState, Notifier, OrderGateway, PriceFeed};
use spotgrid::exchanges::{HyperliquidExchange, PaperExchange};
use spotgrid::strategies::spot_grid::{GridDeps, GridEngine, PairSpec, Scheduler};
use spotgrid::strategies::spot_grid::application::TokioSleeper;
use spotgrid::utils::{init_logging, LogNotifier, WebhookNotifier};
use std::sync::Arc;
use std::time::Duration;

/// 现货网格交易程序
#[derive(Debug, Parser)]
#[command(name = "spotgrid", version, about = "现货网格交易")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, value_name = "FILE")]
    config: String,

    /// 强制 dry_run（只打印不下单）
    #[arg(long)]
    dry_run: bool,

    /// 只执行一次tick后退出
    #[arg(long)]
    once: bool,
}

/// 交易所适配器
struct Venue {
    feed: Arc<dyn PriceFeed>,
    account: Arc<dyn AccountState>,
    gateway: Arc<dyn OrderGateway>,
    pair: String,
}

fn info_client(exchange: &ExchangeConfig) -> anyhow::Result<HyperliquidExchange> {
    let wallet = std::env::var(&exchange.wallet_address_env)
        .with_context(|| format!("缺少环境变量 {}", exchange.wallet_address_env))?;
    Ok(HyperliquidExchange::new(
        wallet,
        exchange.testnet,
        Duration::from_secs(exchange.request_timeout_secs),
    )?)
}

async fn resolve_pair(config: &AppConfig, info: &HyperliquidExchange) -> anyhow::Result<String> {
    if let Some(name) = &config.pair.name {
        return Ok(name.clone());
    }
    let name = info
        .resolve_spot_pair(&config.pair.base_asset, &config.pair.quote_asset)
        .await?;
    log::info!(
        "{}/{} 对应现货交易对 {}",
        config.pair.base_asset,
        config.pair.quote_asset,
        name
    );
    Ok(name)
}

async fn build_venue(config: &AppConfig) -> anyhow::Result<Venue> {
    let exchange = &config.exchange;
    match exchange.kind {
        ExchangeKind::Paper => {
            let paper_config = &exchange.paper;
            let mut paper = PaperExchange::new(
                &config.pair.base_asset,
                &config.pair.quote_asset,
                paper_config.base_balance,
                paper_config.quote_balance,
                paper_config.start_price,
            )
            .with_settlement_lag(paper_config.settlement_lag);

            if paper_config.live_prices {
                let info = info_client(exchange)?;
                let remote_pair = resolve_pair(config, &info).await?;
                paper = paper.with_price_source(Arc::new(info), &remote_pair);
            }

            let pair = paper.pair_name();
            let paper = Arc::new(paper);
            log::info!("使用模拟盘 {}", pair);
            Ok(Venue {
                feed: paper.clone(),
                account: paper.clone(),
                gateway: paper,
                pair,
            })
        }
        ExchangeKind::Hyperliquid => {
            let info = info_client(exchange)?;
            let pair = resolve_pair(config, &info).await?;
            let mut client = info.with_pair(&pair);
            match std::env::var(&exchange.agent_key_env) {
                Ok(key) => client = client.with_agent_key(&key).await?,
                Err(_) if config.grid.dry_run => {
                    log::warn!("未设置 {}，Hyperliquid 以只读模式运行", exchange.agent_key_env)
                }
                Err(_) => anyhow::bail!("实盘交易需要环境变量 {}", exchange.agent_key_env),
            }
            log::info!(
                "使用 Hyperliquid {} {}",
                if exchange.testnet { "testnet" } else { "mainnet" },
                if client.can_trade() { "(可交易)" } else { "(只读)" }
            );
            let client = Arc::new(client);
            Ok(Venue {
                feed: client.clone(),
                account: client.clone(),
                gateway: client,
                pair,
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = AppConfig::from_file(&cli.config)
        .with_context(|| format!("加载配置失败: {}", cli.config))?;
    if cli.dry_run {
        config.grid.dry_run = true;
    }

    init_logging(&config.logging)?;
    log::info!(
        "启动策略 {} ({}/{}) dry_run={}",
        config.strategy.name,
        config.pair.base_asset,
        config.pair.quote_asset,
        config.grid.dry_run
    );

    let notifier: Arc<dyn Notifier> = if config.notifications.enabled {
        Arc::new(WebhookNotifier::new(
            &config.strategy.name,
            config.notifications.clone(),
            config.grid.dry_run,
        )?)
    } else {
        Arc::new(LogNotifier)
    };

    let venue = build_venue(&config).await?;
    let engine = GridEngine::new(
        PairSpec {
            name: venue.pair.clone(),
            base_asset: config.pair.base_asset.clone(),
            quote_asset: config.pair.quote_asset.clone(),
        },
        config.grid.clone(),
        config.settlement.clone(),
        GridDeps {
            account: venue.account,
            gateway: venue.gateway,
            notifier: notifier.clone(),
            sleeper: Arc::new(TokioSleeper),
        },
    );
    let mut scheduler = Scheduler::new(
        engine,
        venue.feed,
        notifier,
        &venue.pair,
        config.schedule.clone(),
    );

    if cli.once {
        let outcome = scheduler.run_once().await?;
        log::info!("单次执行结果: {:?}", outcome);
        return Ok(());
    }

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("监听停止信号失败: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    log::info!("策略已停止");
    Ok(())
}
