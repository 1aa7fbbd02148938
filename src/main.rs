//! Parley Teams 服务
//!
//! 配置见 config/default.toml，可用 PARLEY__* 环境变量覆盖；另外识别:
//! - AZURE_OPENAI_ENDPOINT / AZURE_OPENAI_API_KEY / ASSISTANT_ID
//! - MicrosoftAppId / MicrosoftAppPassword（不设置时按 Emulator 方式不鉴权）
//!
//! 启动: cargo run

#[cfg(feature = "teams")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Context;
    use parley::config::load_config;
    use parley::core::create_orchestrator;
    use parley::integrations::teams::{create_router, BotConnectorClient, TeamsState};
    use tokio_util::sync::CancellationToken;

    dotenvy::dotenv().ok();
    parley::observability::init();

    let cfg = load_config(None).context("Failed to load configuration")?;
    let channel = Arc::new(BotConnectorClient::from_config(&cfg.channel)?);
    let orchestrator = Arc::new(create_orchestrator(&cfg, channel)?);

    let shutdown = CancellationToken::new();

    // 配置了空闲超时时，定期清理过期会话
    if let Some(ttl) = cfg.session.idle_ttl() {
        let sessions = Arc::clone(orchestrator.sessions());
        let token = shutdown.clone();
        let period = ttl.min(Duration::from_secs(300));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = sessions.cleanup_expired().await;
                        if removed > 0 {
                            tracing::info!("Removed {} idle sessions", removed);
                        }
                    }
                }
            }
        });
    }

    let app = create_router(Arc::new(TeamsState { orchestrator }));

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Parley Teams bot listening on http://{}", addr);
    tracing::info!("Messaging endpoint: http://YOUR_HOST:{}/api/messages", cfg.server.port);

    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

#[cfg(not(feature = "teams"))]
fn main() {
    eprintln!("请使用 --features teams 编译: cargo run --features teams");
    std::process::exit(1);
}
