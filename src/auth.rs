//! Authentication extractors
//!
//! # Interview Q&A
//!
//! Q: 인증은 어디서 처리하는가?
//! A: 핸들러 인자의 extractor (`AuthUser`, `AdminUser`)
//!    - `Authorization: Bearer <session token>` 서명/만료 확인
//!    - 토큰의 사용자를 저장소에서 다시 읽음 (역할 변경, 삭제 즉시 반영)
//!    - 인자에 extractor가 없는 핸들러는 공개 엔드포인트
//!
//! Q: 실패 시 응답은?
//! A: 토큰 없음/위조/만료/사용자 없음 → 401, 관리자 전용인데 역할이 다르면 → 403

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use uuid::Uuid;

use crate::db::{User, UserRepository};
use crate::domain::Role;
use crate::error::ApiError;
use crate::AppState;

/// 로그인한 사용자
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }

    /// 특정 역할 요구
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.user.role != role {
            return Err(ApiError::Forbidden(format!(
                "only {} accounts can do this",
                role.as_str().to_lowercase()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let claims = state.sessions.verify(token, Utc::now())?;

        let user = state
            .store
            .find_user(claims.sub)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        Ok(AuthUser { user })
    }
}

/// 관리자 전용
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden("admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}
