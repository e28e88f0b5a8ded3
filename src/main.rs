//! Freelance Marketplace API Server
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Client (Frontend)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum Web Server                         │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │              Rate limit (auth/api/search/submit)         ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                      Routes Layer                        ││
//! │  │  /auth  /missions  /contracts  /invoices  /admin  ...   ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Services Layer                        ││
//! │  │  Sessions   CatalogCache   Mailer   OAuth   Registry    ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Data Layer                            ││
//! │  │  PostgreSQL (Store)          Redis (limits, cache)      ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use redis::aio::ConnectionManager;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// 라이브러리에서 가져오기
use marketplace_api::{routes, services::mailer, AppState, Config, Database};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "marketplace_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting Freelance Marketplace API Server");

    // 설정 로드
    let config = Config::from_env()?;
    tracing::info!(environment = ?config.environment, "📋 Configuration loaded");

    // 데이터베이스 연결
    let db = Database::connect(&config.database_url).await?;
    tracing::info!("🗄️  Database connected");

    // 마이그레이션 실행
    db.run_migrations().await?;
    tracing::info!("📦 Migrations completed");

    // Redis (선택)
    let redis = connect_redis(config.redis_url.as_deref()).await;

    // 서비스 초기화
    let mailer = mailer::from_config(&config.email)?;
    let port = config.port;

    // 앱 상태 구성
    let state = AppState::new(config, Arc::new(db), redis, mailer)?;
    state.limiter.spawn_sweeper();

    // 라우터 구성
    let app = routes::build_router(state);

    // 서버 시작
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("🌐 Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server stopped");
    Ok(())
}

/// Redis 연결
///
/// 실패하면 경고만 남기고 프로세스 로컬 rate limit / 캐시로 동작
async fn connect_redis(url: Option<&str>) -> Option<ConnectionManager> {
    let url = url?;

    let client = match redis::Client::open(url) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid REDIS_URL, using in-process rate limits and cache");
            return None;
        }
    };

    match client.get_connection_manager().await {
        Ok(manager) => {
            tracing::info!("🧰 Redis connected");
            Some(manager)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, using in-process rate limits and cache");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // 신호를 못 받으면 종료하지 않고 계속 서비스
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
