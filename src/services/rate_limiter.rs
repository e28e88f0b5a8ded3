//! Rate Limiter
//!
//! # Interview Q&A
//!
//! Q: 알고리즘은?
//! A: Redis sorted set 기반 sliding window
//!    - key: `ratelimit:{bucket}:{identifier}`
//!    - 요청마다 ZADD(now) → ZREMRANGEBYSCORE(0, now - window) → ZCARD → PEXPIRE
//!    - MULTI/EXEC 파이프라인 하나로 원자적 실행
//!
//! Q: Redis가 없거나 죽으면?
//! A: 프로세스 로컬 fixed window로 대체 (요청은 절대 실패시키지 않음)
//!    - 인스턴스가 여러 개면 인스턴스별로 따로 카운트됨
//!    - 만료된 엔트리는 60초마다 백그라운드 sweeper가 정리
//!
//! Q: 식별자는?
//! A: `X-Forwarded-For` 첫 번째 값 → `X-Real-IP` → "anonymous"

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use redis::aio::ConnectionManager;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// sweeper 주기
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// 요청 종류별 한도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Auth,
    Api,
    Search,
    Submit,
}

impl Bucket {
    pub fn name(self) -> &'static str {
        match self {
            Bucket::Auth => "auth",
            Bucket::Api => "api",
            Bucket::Search => "search",
            Bucket::Submit => "submit",
        }
    }

    /// window 안에서 허용되는 요청 수
    pub fn limit(self) -> u32 {
        match self {
            Bucket::Auth => 5,
            Bucket::Api => 100,
            Bucket::Search => 30,
            Bucket::Submit => 10,
        }
    }

    pub fn window_ms(self) -> u64 {
        60_000
    }
}

/// 판정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// unix timestamp (ms)
    pub reset: u64,
}

impl RateLimitDecision {
    fn from_count(bucket: Bucket, count: u64, reset: u64) -> Self {
        let limit = bucket.limit();
        Self {
            success: count <= limit as u64,
            limit,
            remaining: (limit as u64).saturating_sub(count) as u32,
            reset,
        }
    }

    /// `Retry-After` 초 (올림, 최소 1)
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        let wait_ms = self.reset.saturating_sub(now_ms);
        wait_ms.div_ceil(1000).max(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct LocalWindow {
    count: u32,
    reset_at: u64,
}

pub struct RateLimiter {
    redis: Option<ConnectionManager>,
    local: Mutex<HashMap<String, LocalWindow>>,
}

impl RateLimiter {
    pub fn new(redis: Option<ConnectionManager>) -> Self {
        Self {
            redis,
            local: Mutex::new(HashMap::new()),
        }
    }

    /// Redis 없이 로컬 window만 사용
    pub fn local_only() -> Self {
        Self::new(None)
    }

    pub async fn limit(&self, identifier: &str, bucket: Bucket) -> RateLimitDecision {
        self.limit_at(identifier, bucket, now_ms()).await
    }

    /// 시각을 주입받는 버전 (테스트에서 시간 제어)
    pub async fn limit_at(&self, identifier: &str, bucket: Bucket, now_ms: u64) -> RateLimitDecision {
        let key = format!("ratelimit:{}:{}", bucket.name(), identifier);

        if let Some(redis) = &self.redis {
            match limit_shared(redis.clone(), &key, bucket, now_ms).await {
                Ok(decision) => return decision,
                Err(e) => {
                    warn!(error = %e, key = %key, "Redis rate limit failed, falling back to local window");
                }
            }
        }

        self.limit_local(&key, bucket, now_ms)
    }

    fn limit_local(&self, key: &str, bucket: Bucket, now_ms: u64) -> RateLimitDecision {
        let mut local = self.lock();
        let window = local.entry(key.to_string()).or_insert(LocalWindow {
            count: 0,
            reset_at: now_ms + bucket.window_ms(),
        });

        if now_ms >= window.reset_at {
            window.count = 1;
            window.reset_at = now_ms + bucket.window_ms();
        } else {
            window.count += 1;
        }

        RateLimitDecision::from_count(bucket, window.count as u64, window.reset_at)
    }

    /// 만료된 로컬 엔트리 제거, 제거된 개수 반환
    pub fn sweep(&self, now_ms: u64) -> usize {
        let mut local = self.lock();
        let before = local.len();
        local.retain(|_, window| window.reset_at > now_ms);
        before - local.len()
    }

    /// 60초마다 sweep
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let removed = limiter.sweep(now_ms());
                if removed > 0 {
                    debug!(removed, "Swept expired rate limit windows");
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LocalWindow>> {
        self.local.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn limit_shared(
    mut conn: ConnectionManager,
    key: &str,
    bucket: Bucket,
    now_ms: u64,
) -> redis::RedisResult<RateLimitDecision> {
    let window = bucket.window_ms();
    // 같은 ms에 들어온 요청도 구분되도록 member에 uuid
    let member = format!("{}-{}", now_ms, Uuid::new_v4());

    let (count,): (u64,) = redis::pipe()
        .atomic()
        .zadd(key, member, now_ms)
        .ignore()
        .zrembyscore(key, 0, now_ms.saturating_sub(window))
        .ignore()
        .zcard(key)
        .pexpire(key, window as i64)
        .ignore()
        .query_async(&mut conn)
        .await?;

    Ok(RateLimitDecision::from_count(bucket, count, now_ms + window))
}

pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// 클라이언트 식별자 추출
pub fn client_identifier(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

// ============ HTTP Middleware ============

/// `middleware::from_fn_with_state`에 넘기는 상태
#[derive(Clone)]
pub struct RateLimitLayer {
    pub limiter: Arc<RateLimiter>,
    pub bucket: Bucket,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>, bucket: Bucket) -> Self {
        Self { limiter, bucket }
    }
}

/// 한도 초과 시 429 + `Retry-After` / `X-RateLimit-*`
pub async fn enforce(State(layer): State<RateLimitLayer>, request: Request, next: Next) -> Response {
    let identifier = client_identifier(request.headers());
    let now = now_ms();
    let decision = layer.limiter.limit_at(&identifier, layer.bucket, now).await;

    if decision.success {
        return next.run(request).await;
    }

    warn!(
        bucket = layer.bucket.name(),
        identifier = %identifier,
        "Rate limit exceeded"
    );

    let mut response = ApiError::RateLimited.into_response();
    let headers = response.headers_mut();
    insert_header(headers, "retry-after", decision.retry_after_secs(now));
    insert_header(headers, "x-ratelimit-limit", decision.limit as u64);
    insert_header(headers, "x-ratelimit-remaining", decision.remaining as u64);
    insert_header(headers, "x-ratelimit-reset", decision.reset);
    response
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: u64) {
    headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    #[tokio::test]
    async fn test_every_bucket_allows_exactly_its_limit() {
        for bucket in [Bucket::Auth, Bucket::Api, Bucket::Search, Bucket::Submit] {
            let limiter = RateLimiter::local_only();
            for i in 0..bucket.limit() {
                let d = limiter.limit_at("1.2.3.4", bucket, T0 + i as u64).await;
                assert!(d.success, "{} request {} should pass", bucket.name(), i + 1);
                assert_eq!(d.remaining, bucket.limit() - i - 1);
            }
            let d = limiter.limit_at("1.2.3.4", bucket, T0 + 1_000).await;
            assert!(!d.success);
            assert_eq!(d.remaining, 0);
            assert_eq!(d.limit, bucket.limit());
        }
    }

    #[tokio::test]
    async fn test_window_resets_after_elapsed() {
        let limiter = RateLimiter::local_only();
        for _ in 0..=Bucket::Auth.limit() {
            limiter.limit_at("ip", Bucket::Auth, T0).await;
        }
        assert!(!limiter.limit_at("ip", Bucket::Auth, T0 + 59_999).await.success);

        let d = limiter.limit_at("ip", Bucket::Auth, T0 + 60_000).await;
        assert!(d.success);
        assert_eq!(d.remaining, Bucket::Auth.limit() - 1);
        assert_eq!(d.reset, T0 + 120_000);
    }

    #[tokio::test]
    async fn test_identifiers_do_not_share_quota() {
        let limiter = RateLimiter::local_only();
        for _ in 0..Bucket::Auth.limit() {
            limiter.limit_at("a", Bucket::Auth, T0).await;
        }
        assert!(!limiter.limit_at("a", Bucket::Auth, T0).await.success);
        assert!(limiter.limit_at("b", Bucket::Auth, T0).await.success);
        // 같은 식별자라도 bucket이 다르면 별개
        assert!(limiter.limit_at("a", Bucket::Search, T0).await.success);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_windows() {
        let limiter = RateLimiter::local_only();
        limiter.limit_at("a", Bucket::Api, T0).await;
        limiter.limit_at("b", Bucket::Api, T0 + 30_000).await;

        assert_eq!(limiter.sweep(T0 + 60_000), 1);
        assert_eq!(limiter.sweep(T0 + 90_000), 1);
        assert_eq!(limiter.sweep(T0 + 90_000), 0);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let d = RateLimitDecision { success: false, limit: 5, remaining: 0, reset: T0 + 1_500 };
        assert_eq!(d.retry_after_secs(T0), 2);
        assert_eq!(d.retry_after_secs(T0 + 1_500), 1);
        assert_eq!(d.retry_after_secs(T0 + 10_000), 1);
    }

    #[test]
    fn test_client_identifier() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_identifier(&headers), "anonymous");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_identifier(&headers), "10.0.0.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_identifier(&headers), "203.0.113.7");
    }
}
