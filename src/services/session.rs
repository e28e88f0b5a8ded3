//! Session Tokens
//!
//! # Interview Q&A
//!
//! Q: 토큰 형식은?
//! A: `base64url(claims_json).base64url(HMAC-SHA256(claims_json))`
//!    - claims: `{sub, role, exp}` (exp는 unix 초)
//!    - 서버 상태 없이 검증 가능, 30일 유효
//!
//! Q: JWT 라이브러리를 안 쓰는 이유는?
//! A: 알고리즘이 하나로 고정 (alg 헤더 혼동 공격 여지 없음)
//!    - 서명 비교는 `Mac::verify_slice` (상수 시간)
//!
//! Q: OAuth state는?
//! A: 같은 서명 방식으로 `{provider, nonce, exp}`를 서명, 10분 유효
//!    - 콜백에서 서명/만료/provider 일치 확인 → CSRF 방지

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::domain::Role;
use crate::error::{ApiError, ApiResult};

type HmacSha256 = Hmac<Sha256>;

/// 세션 유효 기간
pub const SESSION_TTL_DAYS: i64 = 30;

/// OAuth state / 로그인 코드 유효 기간
pub const SHORT_LIVED_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct OAuthState {
    provider: String,
    nonce: String,
    exp: i64,
}

pub struct SessionSigner {
    secret: Vec<u8>,
}

impl SessionSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// 세션 토큰 발급
    pub fn issue(&self, user_id: Uuid, role: Role, now: DateTime<Utc>) -> ApiResult<String> {
        let claims = SessionClaims {
            sub: user_id,
            role,
            exp: (now + Duration::days(SESSION_TTL_DAYS)).timestamp(),
        };
        self.sign(&claims)
    }

    /// 서명 + 만료 확인
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> ApiResult<SessionClaims> {
        let claims: SessionClaims = self.open(token).ok_or(ApiError::Unauthorized)?;
        if claims.exp <= now.timestamp() {
            return Err(ApiError::Unauthorized);
        }
        Ok(claims)
    }

    /// OAuth authorize 요청에 붙일 state
    pub fn issue_oauth_state(&self, provider: &str, now: DateTime<Utc>) -> ApiResult<String> {
        let nonce: [u8; 16] = rand::thread_rng().gen();
        self.sign(&OAuthState {
            provider: provider.to_string(),
            nonce: hex::encode(nonce),
            exp: (now + Duration::minutes(SHORT_LIVED_MINUTES)).timestamp(),
        })
    }

    pub fn verify_oauth_state(&self, state: &str, provider: &str, now: DateTime<Utc>) -> ApiResult<()> {
        let parsed: OAuthState = self
            .open(state)
            .ok_or_else(|| ApiError::BadRequest("invalid OAuth state".to_string()))?;

        if parsed.provider != provider || parsed.exp <= now.timestamp() {
            return Err(ApiError::BadRequest("invalid OAuth state".to_string()));
        }
        Ok(())
    }

    fn sign<T: Serialize>(&self, payload: &T) -> ApiResult<String> {
        let json = serde_json::to_vec(payload).map_err(|_| ApiError::InternalError)?;
        let mut mac = self.mac()?;
        mac.update(&json);
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&json),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// 서명이 맞으면 payload 디코드
    fn open<T: DeserializeOwned>(&self, token: &str) -> Option<T> {
        let (body, signature) = token.split_once('.')?;
        let json = URL_SAFE_NO_PAD.decode(body).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(&json);
        mac.verify_slice(&signature).ok()?;

        serde_json::from_slice(&json).ok()
    }

    fn mac(&self) -> ApiResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| ApiError::InternalError)
    }
}

// ============ One-time login codes ============

/// 6자리 숫자 코드
pub fn generate_login_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// 저장용 해시 (이메일에 묶어서 다른 계정 코드와 섞이지 않게)
pub fn hash_login_code(email: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hasher.update(b":");
    hasher.update(code.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// 공유 시크릿 비교 (`subtle`, 길이 외에는 내용에 따라 시간이 달라지지 않음)
pub fn secrets_match(presented: &[u8], expected: &[u8]) -> bool {
    presented.ct_eq(expected).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> SessionSigner {
        SessionSigner::new("test-secret")
    }

    #[test]
    fn test_issue_and_verify() {
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let token = signer().issue(user_id, Role::Freelancer, now).unwrap();

        let claims = signer().verify(&token, now).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Freelancer);
        assert_eq!(claims.exp, (now + Duration::days(30)).timestamp());
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = Utc::now();
        let token = signer().issue(Uuid::new_v4(), Role::Client, now).unwrap();
        let later = now + Duration::days(31);
        assert!(matches!(signer().verify(&token, later), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let now = Utc::now();
        let token = signer().issue(Uuid::new_v4(), Role::Client, now).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        // role을 ADMIN으로 바꾼 claims에 기존 서명을 붙임
        let forged_claims = SessionClaims {
            sub: Uuid::new_v4(),
            role: Role::Admin,
            exp: now.timestamp() + 3600,
        };
        let forged_body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("{}.{}", forged_body, signature);

        assert!(signer().verify(&forged, now).is_err());
        assert!(SessionSigner::new("other").verify(&token, now).is_err());
        assert!(signer().verify("garbage", now).is_err());
    }

    #[test]
    fn test_oauth_state() {
        let now = Utc::now();
        let state = signer().issue_oauth_state("google", now).unwrap();

        assert!(signer().verify_oauth_state(&state, "google", now).is_ok());
        assert!(signer().verify_oauth_state(&state, "linkedin", now).is_err());
        assert!(signer()
            .verify_oauth_state(&state, "google", now + Duration::minutes(11))
            .is_err());
    }

    #[test]
    fn test_login_code() {
        let code = generate_login_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        assert_eq!(
            hash_login_code("A@example.com", "123456"),
            hash_login_code("a@example.com ", "123456")
        );
        assert_ne!(
            hash_login_code("a@example.com", "123456"),
            hash_login_code("b@example.com", "123456")
        );
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match(b"secret", b"secret"));
        assert!(!secrets_match(b"secret", b"secreT"));
        assert!(!secrets_match(b"secret", b"secrets"));
        assert!(!secrets_match(b"", b"secret"));
    }
}
