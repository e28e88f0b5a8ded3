//! Admin Endpoints
//!
//! # Interview Q&A
//!
//! Q: 관리자 권한은 어떻게 확인하는가?
//! A: 핸들러 인자의 `AdminUser` extractor (토큰 없음 401, 관리자 아님 403)
//!
//! Q: 카탈로그를 수정하면 캐시는?
//! A: 쓰기 성공 직후 `invalidate_catalog()`로 모든 locale 키 삭제
//!    - 다음 조회가 저장소에서 다시 계산해서 채움 (cache-aside)
//!
//! Q: 서비스 API 키는 왜 마스킹하는가?
//! A: 관리 화면 목록에는 마지막 4자만 노출
//!    - 평문은 내부 엔드포인트(`/api/internal/api-keys/:service`)로만 배포

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AdminUser;
use crate::db::{
    AdminRepository, AdminStats, BillingRepository, CatalogRepository, Category, CategoryPatch,
    CreditTransaction, Gig, GigFilter, GigRepository, Mission, MissionFilter, MissionRepository,
    NewApiKey, NewCategory, NewCreditTransaction, NewSkill, ServiceApiKey, Skill, UserRepository,
};
use crate::domain::{ensure_transition, CreditKind, GigStatus, MissionStatus};
use crate::error::{ApiError, ApiResult};
use crate::routes::gigs::load_gig;
use crate::routes::missions::load_mission;
use crate::services::session::secrets_match;
use crate::types::{check_length, PageQuery, Paginated};
use crate::AppState;

/// 내부 서비스 인증 헤더
pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    pub user_id: Uuid,
    pub amount: i64,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub service: String,
    pub key_value: String,
    pub description: Option<String>,
}

/// 목록용 (값은 마스킹)
#[derive(Debug, Serialize)]
pub struct ApiKeyView {
    pub id: Uuid,
    pub service: String,
    pub masked_value: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<ServiceApiKey> for ApiKeyView {
    fn from(key: ServiceApiKey) -> Self {
        Self {
            masked_value: mask_key(&key.key_value),
            id: key.id,
            service: key.service,
            description: key.description,
            created_by: key.created_by,
            created_at: key.created_at,
        }
    }
}

/// 내부 서비스용 (평문)
#[derive(Debug, Serialize)]
pub struct InternalKeyResponse {
    pub service: String,
    pub key: String,
}

// ============ Stats & Moderation ============

/// GET /api/admin/stats
pub async fn stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<AdminStats>> {
    Ok(Json(state.store.stats().await?))
}

/// GET /api/admin/missions/pending
pub async fn pending_missions(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<Mission>>> {
    let (page, limit) = query.resolve();
    let filter = MissionFilter {
        status: Some(MissionStatus::PendingReview),
        page,
        limit,
        ..Default::default()
    };
    let found = state.store.list_missions(&filter).await?;
    Ok(Json(Paginated::from_page(found, page, limit)))
}

/// POST /api/admin/missions/:id/approve
///
/// PENDING_REVIEW → OPEN
pub async fn approve_mission(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Mission>> {
    let current = load_mission(&state, id).await?;
    ensure_transition(current.status, MissionStatus::Open)?;

    let saved = state
        .store
        .set_mission_status(id, current.status, MissionStatus::Open, None)
        .await?;
    info!(mission_id = %id, admin_id = %admin.id(), "Mission approved");
    Ok(Json(saved))
}

/// POST /api/admin/missions/:id/reject
///
/// PENDING_REVIEW → REJECTED (사유 저장)
pub async fn reject_mission(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<Json<Mission>> {
    check_length("reason", &req.reason, 3, 1000)?;
    let current = load_mission(&state, id).await?;
    ensure_transition(current.status, MissionStatus::Rejected)?;

    let reason = Some(req.reason.trim().to_string());
    let saved = state
        .store
        .set_mission_status(id, current.status, MissionStatus::Rejected, reason)
        .await?;
    info!(mission_id = %id, admin_id = %admin.id(), "Mission rejected");
    Ok(Json(saved))
}

/// GET /api/admin/gigs/pending
pub async fn pending_gigs(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<Gig>>> {
    let (page, limit) = query.resolve();
    let filter = GigFilter {
        status: Some(GigStatus::PendingReview),
        page,
        limit,
        ..Default::default()
    };
    let found = state.store.list_gigs(&filter).await?;
    Ok(Json(Paginated::from_page(found, page, limit)))
}

/// POST /api/admin/gigs/:id/approve
pub async fn approve_gig(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Gig>> {
    let current = load_gig(&state, id).await?;
    ensure_transition(current.status, GigStatus::Active)?;
    if current.status != GigStatus::PendingReview {
        return Err(ApiError::Conflict("gig is not awaiting review".to_string()));
    }

    let saved = state
        .store
        .set_gig_status(id, current.status, GigStatus::Active, None)
        .await?;
    info!(gig_id = %id, admin_id = %admin.id(), "Gig approved");
    Ok(Json(saved))
}

/// POST /api/admin/gigs/:id/reject
pub async fn reject_gig(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<Json<Gig>> {
    check_length("reason", &req.reason, 3, 1000)?;
    let current = load_gig(&state, id).await?;
    ensure_transition(current.status, GigStatus::Rejected)?;

    let reason = Some(req.reason.trim().to_string());
    let saved = state
        .store
        .set_gig_status(id, current.status, GigStatus::Rejected, reason)
        .await?;
    info!(gig_id = %id, admin_id = %admin.id(), "Gig rejected");
    Ok(Json(saved))
}

// ============ Catalog ============

/// POST /api/admin/categories
pub async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(new): Json<NewCategory>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    validate_slug(&new.slug)?;
    let category = state.store.create_category(new).await?;
    state.catalog.invalidate_catalog().await;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/admin/categories/:id
pub async fn update_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<CategoryPatch>,
) -> ApiResult<Json<Category>> {
    if let Some(slug) = &patch.slug {
        validate_slug(slug)?;
    }
    if patch.parent_id == Some(id) {
        return Err(ApiError::ValidationError("a category cannot be its own parent".to_string()));
    }

    let category = state.store.update_category(id, patch).await?;
    state.catalog.invalidate_catalog().await;
    Ok(Json(category))
}

/// POST /api/admin/skills
pub async fn create_skill(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(new): Json<NewSkill>,
) -> ApiResult<(StatusCode, Json<Skill>)> {
    validate_slug(&new.slug)?;
    let skill = state.store.create_skill(new).await?;
    state.catalog.invalidate_catalog().await;
    Ok((StatusCode::CREATED, Json(skill)))
}

// ============ Credits ============

/// POST /api/admin/credits/grant
pub async fn grant_credits(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<GrantCreditsRequest>,
) -> ApiResult<(StatusCode, Json<CreditTransaction>)> {
    if req.amount <= 0 {
        return Err(ApiError::ValidationError("amount must be positive".to_string()));
    }
    if state.store.find_user(req.user_id).await?.is_none() {
        return Err(ApiError::NotFound("user".to_string()));
    }

    let tx = state
        .store
        .add_credit_transaction(NewCreditTransaction {
            user_id: req.user_id,
            amount: req.amount,
            kind: CreditKind::Grant,
            reference_id: None,
            note: req.note,
        })
        .await?;

    info!(user_id = %req.user_id, amount = req.amount, admin_id = %admin.id(), "Credits granted");
    Ok((StatusCode::CREATED, Json(tx)))
}

// ============ Service API keys ============

/// GET /api/admin/api-keys
pub async fn list_api_keys(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<ApiKeyView>>> {
    let keys = state.store.list_api_keys().await?;
    Ok(Json(keys.into_iter().map(ApiKeyView::from).collect()))
}

/// POST /api/admin/api-keys
pub async fn create_api_key(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateApiKeyRequest>,
) -> ApiResult<(StatusCode, Json<ApiKeyView>)> {
    validate_slug(&req.service)?;
    check_length("key_value", &req.key_value, 8, 4096)?;

    let key = state
        .store
        .create_api_key(NewApiKey {
            service: req.service,
            key_value: req.key_value.trim().to_string(),
            description: req.description,
            created_by: admin.id(),
        })
        .await?;

    info!(service = %key.service, admin_id = %admin.id(), "Service API key stored");
    Ok((StatusCode::CREATED, Json(key.into())))
}

/// DELETE /api/admin/api-keys/:id
pub async fn delete_api_key(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_api_key(id).await? {
        return Err(ApiError::NotFound("api key".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/internal/api-keys/:service
///
/// `X-Internal-Secret` 헤더 필수 (상수 시간 비교)
pub async fn internal_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(service): Path<String>,
) -> ApiResult<Json<InternalKeyResponse>> {
    let Some(expected) = state.config.internal_api_secret.as_deref() else {
        warn!("Internal key request rejected: INTERNAL_API_SECRET is not set");
        return Err(ApiError::Unauthorized);
    };

    let presented = headers
        .get(INTERNAL_SECRET_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();
    if !secrets_match(presented, expected.as_bytes()) {
        warn!(service = %service, "Internal key request with invalid secret");
        return Err(ApiError::Unauthorized);
    }

    let key = state
        .store
        .find_api_key_by_service(&service)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("api key for {}", service)))?;

    Ok(Json(InternalKeyResponse {
        service: key.service,
        key: key.key_value,
    }))
}

// ============ Helpers ============

fn mask_key(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "********".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

/// 소문자, 숫자, `-`, `_`
fn validate_slug(slug: &str) -> ApiResult<()> {
    let valid = (2..=64).contains(&slug.len())
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        return Err(ApiError::ValidationError(format!(
            "'{}' must be 2-64 lowercase letters, digits, '-' or '_'",
            slug
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk_live_abcdef123456"), "****3456");
        assert_eq!(mask_key("short"), "********");
        assert!(!mask_key("sk_live_abcdef123456").contains("sk_live"));
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("web-development").is_ok());
        assert!(validate_slug("company_registry").is_ok());
        assert!(validate_slug("Web Dev").is_err());
        assert!(validate_slug("x").is_err());
    }
}
