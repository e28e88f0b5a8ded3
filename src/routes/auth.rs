//! Authentication Endpoints
//!
//! # Interview Q&A
//!
//! Q: 비밀번호가 없는 이유는?
//! A: 이메일 1회용 코드(magic link)와 OAuth만 지원
//!    - 코드는 SHA-256 해시만 저장, 10분 유효, 한 번 쓰면 삭제
//!    - 첫 로그인 시 계정 자동 생성
//!
//! Q: OAuth CSRF는?
//! A: authorize URL을 만들 때 서명된 `state`를 같이 발급하고
//!    콜백에서 서명/만료/provider 일치를 확인

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auth::AuthUser;
use crate::db::{NewUser, StoreError, User, UserRepository};
use crate::domain::Role;
use crate::error::{ApiError, ApiResult};
use crate::services::mailer::login_code_email;
use crate::services::oauth::Provider;
use crate::services::session::{generate_login_code, hash_login_code, SHORT_LIVED_MINUTES};
use crate::types::is_valid_email;
use crate::AppState;

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MagicLinkResponse {
    pub sent: bool,
    pub expires_in_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
    /// 첫 로그인 시 계정 역할 (FREELANCER만 의미 있음)
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct OAuthUrlResponse {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackRequest {
    pub code: String,
    pub state: String,
    pub role: Option<Role>,
}

// ============ Handlers ============

/// POST /api/auth/magic-link
///
/// 6자리 코드를 만들어 해시를 저장하고 메일 발송
pub async fn request_magic_link(
    State(state): State<AppState>,
    Json(req): Json<MagicLinkRequest>,
) -> ApiResult<(StatusCode, Json<MagicLinkResponse>)> {
    let email = req.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::ValidationError("email is not valid".to_string()));
    }

    let code = generate_login_code();
    let expires_at = Utc::now() + Duration::minutes(SHORT_LIVED_MINUTES);
    state
        .store
        .save_login_code(&email, &hash_login_code(&email, &code), expires_at)
        .await?;

    let message = login_code_email(&email, &code, &state.config.public_app_url);
    if let Err(e) = state.mailer.send(message).await {
        error!(error = %e, "Failed to send login code");
        return Err(ApiError::ServiceUnavailable("email delivery".to_string()));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MagicLinkResponse {
            sent: true,
            expires_in_secs: SHORT_LIVED_MINUTES * 60,
        }),
    ))
}

/// POST /api/auth/verify
///
/// 코드 소비 → (필요하면 계정 생성) → 세션 토큰
pub async fn verify_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyCodeRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let email = req.email.trim().to_lowercase();
    let code = req.code.trim();

    let consumed = state
        .store
        .consume_login_code(&email, &hash_login_code(&email, code), Utc::now())
        .await?;
    if !consumed {
        return Err(ApiError::Unauthorized);
    }

    let user = find_or_create_user(&state, &email, None, None, req.role).await?;
    session_for(&state, user).map(Json)
}

/// GET /api/auth/oauth/:provider/url
pub async fn oauth_url(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> ApiResult<Json<OAuthUrlResponse>> {
    let provider: Provider = provider.parse()?;
    let oauth_state = state.sessions.issue_oauth_state(provider.as_str(), Utc::now())?;
    let url = state.oauth.authorize_url(provider, &oauth_state)?;

    Ok(Json(OAuthUrlResponse {
        url,
        state: oauth_state,
    }))
}

/// POST /api/auth/oauth/:provider/callback
///
/// state 검증 → code 교환 → userinfo 이메일로 계정 조회/생성
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(req): Json<OAuthCallbackRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let provider: Provider = provider.parse()?;
    state
        .sessions
        .verify_oauth_state(&req.state, provider.as_str(), Utc::now())?;

    let profile = state.oauth.exchange(provider, &req.code).await?;
    let email = profile.email.trim().to_lowercase();

    let user = find_or_create_user(&state, &email, profile.name, profile.picture, req.role).await?;
    info!(user_id = %user.id, provider = provider.as_str(), "OAuth login");
    session_for(&state, user).map(Json)
}

/// GET /api/auth/me
pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

// ============ Helpers ============

async fn find_or_create_user(
    state: &AppState,
    email: &str,
    name: Option<String>,
    avatar_url: Option<String>,
    requested_role: Option<Role>,
) -> ApiResult<User> {
    if let Some(user) = state.store.find_user_by_email(email).await? {
        return Ok(user);
    }

    // ADMIN은 스스로 가입할 수 없음
    let role = match requested_role {
        Some(Role::Freelancer) => Role::Freelancer,
        _ => Role::Client,
    };
    let display_name = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());

    let created = state
        .store
        .create_user(NewUser {
            email: email.to_string(),
            display_name,
            role,
            avatar_url,
        })
        .await;

    match created {
        Ok(user) => {
            info!(user_id = %user.id, role = %user.role, "New account created");
            Ok(user)
        }
        // 동시 첫 로그인: 먼저 만든 쪽을 사용
        Err(StoreError::Conflict(_)) => state
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ApiError::InternalError),
        Err(e) => Err(e.into()),
    }
}

fn session_for(state: &AppState, user: User) -> ApiResult<SessionResponse> {
    let token = state.sessions.issue(user.id, user.role, Utc::now())?;
    Ok(SessionResponse { token, user })
}
