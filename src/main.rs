//! Flairy - Rust Backend
//!
//! 使用 axum 框架构建的后端服务，提供聊天建议、开场白、聊天分析、截图 OCR 和回复生成功能。

use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod llm;
mod models;
mod services;
mod state;
mod utils;

use api::create_api_routes;
use config::AppConfig;
use state::create_shared_state;
use utils::rate_limiter::FixedWindowRateLimiter;

/// 过期限流窗口的清理间隔
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flairy_backend=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Flairy backend...");

    // 配置只在启动时加载一次
    let config = Arc::new(AppConfig::load().context("failed to load configuration")?);
    info!(
        "Configuration loaded: model={}, vision_model={}, default_language={}, backend={}",
        config.model,
        config.vision_model,
        config.default_language,
        config.has_backend()
    );

    let rate_limiter = Arc::new(FixedWindowRateLimiter::from_settings(&config.rate_limit));
    {
        let rate_limiter = Arc::clone(&rate_limiter);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
            loop {
                ticker.tick().await;
                rate_limiter.cleanup_expired();
            }
        });
    }

    // 创建共享状态
    let state = create_shared_state(Arc::clone(&config), rate_limiter)
        .context("failed to initialise services")?;

    // 配置 CORS（允许所有来源）
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 构建路由
    let app = Router::new()
        .merge(create_api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.bind_addr))?;
    info!("Server listening on: {}", addr);

    // 启动服务器
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
