//! Oyda 数据网关服务入口

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use common::config::AppConfig;
use data_service::state::AppState;
use data_service::{create_router, SERVICE_NAME};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置（含 .env）
    let config = AppConfig::load_with_service(SERVICE_NAME);

    let state = AppState::new(config.clone()).context("初始化应用状态失败")?;
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!(
        service = SERVICE_NAME,
        address = %addr,
        registry = %config.package_registry_url,
        "启动服务"
    );

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;
    axum::serve(listener, app).await.context("服务运行失败")?;
    Ok(())
}
