//! Freelance Marketplace API Library
//!
//! # Overview
//!
//! 클라이언트/프리랜서 매칭 마켓플레이스의 백엔드 API
//! (미션, 제안, 계약, 마일스톤, 송장, 분쟁, 지원 티켓, 메시지, 크레딧, 카탈로그, 관리자)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                          API                              │
//! │                                                           │
//! │  ┌─────────┐  ┌──────────┐  ┌─────────┐  ┌──────────┐    │
//! │  │ Routes  │──│ Services │  │ Domain  │  │  Types   │    │
//! │  └────┬────┘  └────┬─────┘  └────┬────┘  └──────────┘    │
//! │       │            │             │                        │
//! │       └────────────┴──────┬──────┘                        │
//! │                           ▼                               │
//! │                 db::Store (trait object)                  │
//! └───────────────────────────┼───────────────────────────────┘
//!                ┌────────────┴────────────┐
//!                ▼                         ▼
//!         ┌────────────┐            ┌─────────────┐
//!         │ PostgreSQL │            │ MemoryStore │
//!         └────────────┘            └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 처리
//! - `domain`: 상태 전이 테이블, 송장 계산
//! - `db`: 저장소 trait와 PostgreSQL / 인메모리 구현
//! - `services`: rate limiter, 카탈로그 캐시, 세션, 메일, OAuth, 외부 조회
//! - `auth`: Bearer 토큰 extractor
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `types`: 공통 타입 정의 (페이지네이션 등)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use marketplace_api::{config::Config, db::Database, routes, services::mailer, AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let db = Database::connect(&config.database_url).await?;
//!     let mailer = mailer::from_config(&config.email)?;
//!     let state = AppState::new(config, std::sync::Arc::new(db), None, mailer)?;
//!     let app = routes::build_router(state);
//!     // ... 서버 시작
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use redis::aio::ConnectionManager;

pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use db::{Database, MemoryStore, Store};
pub use error::ApiError;

use services::{CatalogCache, Mailer, OAuthClient, RateLimiter, RegistryClient, SessionSigner};

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub limiter: Arc<RateLimiter>,
    pub catalog: Arc<CatalogCache>,
    pub sessions: Arc<SessionSigner>,
    pub mailer: Arc<dyn Mailer>,
    pub oauth: Arc<OAuthClient>,
    pub registry: Arc<RegistryClient>,
}

impl AppState {
    /// 설정으로부터 서비스 구성
    ///
    /// `redis`가 None이면 rate limiter와 캐시 모두 프로세스 로컬로 동작
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        redis: Option<ConnectionManager>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let oauth = OAuthClient::new(&config)?;
        let registry = RegistryClient::new(&config.company_registry_url, &config.address_api_url)?;

        Ok(Self {
            store,
            limiter: Arc::new(RateLimiter::new(redis.clone())),
            catalog: Arc::new(CatalogCache::new(redis)),
            sessions: Arc::new(SessionSigner::new(&config.session_secret)),
            mailer,
            oauth: Arc::new(oauth),
            registry: Arc::new(registry),
            config: Arc::new(config),
        })
    }
}
