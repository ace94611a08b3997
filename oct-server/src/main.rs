//! OCT评审服务器主程序

use clap::Parser;
use oct_analysis::{BuiltinClassifier, ClassificationOracle, RemoteClassifier};
use oct_core::{OctError, Result};
use oct_database::{DatabasePool, DatabaseQueries};
use oct_storage::MediaStore;
use oct_web::{AppState, AuthService, TokenIssuer, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

mod config;
use config::ServiceConfig;

/// OCT评审服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "oct-server")]
#[command(about = "OCT影像记录与评审服务器")]
struct Args {
    /// 监听端口，优先于配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("启动OCT评审服务器...");

    let mut config = ServiceConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("OCT评审服务器配置:");
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  媒体目录: {}", config.storage.media_root);
    info!(
        "  分类服务: {}",
        config.analysis.endpoint.as_deref().unwrap_or("builtin")
    );

    // 连接数据库并确保表结构就绪
    let pool = DatabasePool::connect(&config.database.url, config.database.max_connections).await?;
    DatabaseQueries::new(&pool).create_tables().await?;

    let storage = MediaStore::new(
        config.storage.media_root.as_str(),
        config.storage.media_base_url.clone(),
    );

    let oracle: Arc<dyn ClassificationOracle> = match &config.analysis.endpoint {
        Some(endpoint) => Arc::new(RemoteClassifier::new(endpoint.clone())),
        None => Arc::new(BuiltinClassifier),
    };

    let tokens = TokenIssuer::new(
        config.auth.jwt_secret.clone(),
        config.auth.access_token_minutes,
        config.auth.refresh_token_days,
    );
    let auth = AuthService::new(pool.clone(), tokens);

    let state = Arc::new(AppState {
        pool,
        storage,
        oracle,
        auth,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| OctError::Config(format!("invalid listen address: {}", e)))?;

    WebServer::new(addr, state).run().await
}
