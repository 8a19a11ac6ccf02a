use anyhow::{Context, Result};
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use loghook::cli::RelayCli;
use loghook::config::RelayConfig;
use loghook::dispatch::Dispatcher;
use loghook::logging;
use loghook::rule::RuleSet;
use loghook::server::RelayServer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = RelayCli::parse();

    // 설정 로드 (파일 -> 환경변수 -> CLI 순으로 적용)
    let mut config = RelayConfig::load(&cli.config)
        .await
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    // 로깅 초기화
    logging::init_tracing(&config.log)?;

    tracing::info!(
        addr = %config.server.bind_addr(),
        rules = config.rules.len(),
        test_mode = config.test_mode,
        config = %cli.config.display(),
        "loghook starting"
    );
    if config.test_mode && config.test_webhook.is_none() {
        tracing::warn!("test_mode is enabled but test_webhook is not configured, nothing extra will fire");
    }

    // 규칙 컴파일 및 디스패처 기동
    let rules = RuleSet::compile(&config.rules)
        .map_err(|e| anyhow::anyhow!("failed to compile rules: {}", e))?;
    let cancel = CancellationToken::new();
    let (dispatcher, dispatch_handle) = Dispatcher::spawn(&config.dispatch, cancel.clone())
        .map_err(|e| anyhow::anyhow!("failed to start dispatcher: {}", e))?;

    tracing::info!("dispatcher started");

    // 릴레이 서버 기동
    let config = Arc::new(config);
    let server = RelayServer::new(Arc::clone(&config), rules, dispatch_handle, cancel.clone());
    let mut server_task = tokio::spawn(async move { server.run().await });

    // 종료 시그널 또는 서버 조기 종료(바인드 실패 등) 대기
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        result = &mut server_task => {
            cancel.cancel();
            dispatcher.shutdown().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(anyhow::anyhow!("relay server failed: {}", e)),
                Err(e) => Err(anyhow::anyhow!("relay server task panicked: {}", e)),
            };
        }
    }

    // 우아한 종료
    cancel.cancel();
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "relay server exited with error"),
        Err(e) => tracing::error!(error = %e, "relay server task panicked"),
    }
    dispatcher.shutdown().await;

    tracing::info!("loghook shut down");
    Ok(())
}
