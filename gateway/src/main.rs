//! crewdesk-gateway - Crewdesk 工作区网关
//!
//! 认证、授权与页面/API 路由的统一入口。启动时加载策略文档，
//! 加载失败（重试耗尽）即拒绝启动，绝不带着空策略上线。

mod auth;
mod error;
mod gate;
mod middleware;
mod policy_api;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use crewdesk_access::{FilePolicyRepository, PolicyStore};
use crewdesk_common::retry::RetryConfig;
use crewdesk_config::AppConfig;
use crewdesk_telemetry::{init_metrics, init_tracing};
use tracing::info;

use crate::state::GatewayState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config_path =
        std::env::var("CREWDESK_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = AppConfig::load(&config_path)?;

    init_tracing(config.log_level(), config.is_production());
    let metrics_handle = init_metrics();

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        "Starting Crewdesk gateway"
    );

    let repo = Arc::new(FilePolicyRepository::new(&config.policy.path));
    let retry = RetryConfig::new(
        config.policy.load_attempts,
        Duration::from_millis(200),
        Duration::from_secs(5),
    );
    let store = Arc::new(PolicyStore::bootstrap(repo, &retry).await?);

    let state = GatewayState::new(&config, store, routes::default_route_table())?;
    let app = routes::build_router(state)
        .route("/metrics", get(move || async move { metrics_handle.render() }));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, app).await?;
    Ok(())
}
