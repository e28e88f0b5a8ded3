//! Services Module
//!
//! 핸들러가 쓰는 인프라 서비스
//!
//! # Services
//! - `RateLimiter`: bucket별 요청 한도 (Redis sliding window + 로컬 fallback)
//! - `CatalogCache`: 카테고리/스킬 cache-aside
//! - `SessionSigner`: 세션 토큰, OAuth state 서명
//! - `Mailer`: 로그인 코드 메일 발송
//! - `OAuthClient`: Google / LinkedIn 로그인
//! - `RegistryClient`: 기업 검색, 주소 geocoding 프록시

pub mod cache;
pub mod mailer;
pub mod oauth;
pub mod rate_limiter;
pub mod registry;
pub mod session;

pub use cache::CatalogCache;
pub use mailer::{Mailer, OutgoingEmail};
pub use oauth::{OAuthClient, Provider};
pub use rate_limiter::{Bucket, RateLimitDecision, RateLimiter};
pub use registry::RegistryClient;
pub use session::{SessionClaims, SessionSigner};
