//! Gig Endpoints
//!
//! 프리랜서가 올리는 고정가 서비스. 공개 목록은 ACTIVE만.
//! 검토 승인/반려는 admin 라우트에서.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{Gig, GigFilter, GigRepository, NewGig};
use crate::domain::{ensure_transition, GigStatus, Role};
use crate::error::{ApiError, ApiResult};
use crate::types::{check_length, PageQuery, Paginated};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateGigRequest {
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub skills: Vec<String>,
    /// 가격 (cents)
    pub price: i64,
    pub delivery_days: i32,
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGigRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub skills: Option<Vec<String>>,
    pub price: Option<i64>,
    pub delivery_days: Option<i32>,
    pub status: Option<GigStatus>,
}

#[derive(Debug, Deserialize)]
pub struct GigListQuery {
    pub status: Option<GigStatus>,
    pub category_id: Option<Uuid>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl GigListQuery {
    fn filter(&self, status: Option<GigStatus>, freelancer_id: Option<Uuid>) -> GigFilter {
        let (page, limit) = PageQuery { page: self.page, limit: self.limit }.resolve();
        GigFilter {
            status,
            freelancer_id,
            category_id: self.category_id,
            query: self
                .q
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string),
            page,
            limit,
        }
    }
}

/// POST /api/gigs
pub async fn create_gig(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateGigRequest>,
) -> ApiResult<(StatusCode, Json<Gig>)> {
    auth.require(Role::Freelancer)?;
    validate_content(&req.title, &req.description, req.price, req.delivery_days)?;

    let gig = state
        .store
        .create_gig(NewGig {
            freelancer_id: auth.id(),
            title: req.title.trim().to_string(),
            description: req.description.trim().to_string(),
            category_id: req.category_id,
            skills: req.skills,
            price: req.price,
            delivery_days: req.delivery_days,
            status: if req.draft {
                GigStatus::Draft
            } else {
                GigStatus::PendingReview
            },
        })
        .await?;

    info!(gig_id = %gig.id, status = %gig.status, "Gig created");
    Ok((StatusCode::CREATED, Json(gig)))
}

/// GET /api/gigs
///
/// 공개 목록 (ACTIVE만)
pub async fn list_gigs(
    State(state): State<AppState>,
    Query(query): Query<GigListQuery>,
) -> ApiResult<Json<Paginated<Gig>>> {
    let filter = query.filter(Some(GigStatus::Active), None);
    let found = state.store.list_gigs(&filter).await?;
    Ok(Json(Paginated::from_page(found, filter.page, filter.limit)))
}

/// GET /api/gigs/mine
pub async fn list_my_gigs(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<GigListQuery>,
) -> ApiResult<Json<Paginated<Gig>>> {
    let filter = query.filter(query.status, Some(auth.id()));
    let found = state.store.list_gigs(&filter).await?;
    Ok(Json(Paginated::from_page(found, filter.page, filter.limit)))
}

/// GET /api/gigs/:id
pub async fn get_gig(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Gig>> {
    let gig = load_gig(&state, id).await?;
    let privileged = auth
        .as_ref()
        .is_some_and(|a| a.is_admin() || a.id() == gig.freelancer_id);

    if gig.status != GigStatus::Active && !privileged {
        return Err(ApiError::NotFound("gig".to_string()));
    }
    Ok(Json(gig))
}

/// PUT /api/gigs/:id
///
/// 작성자 전용. 보관(ARCHIVED)된 gig은 수정 불가
pub async fn update_gig(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateGigRequest>,
) -> ApiResult<Json<Gig>> {
    let current = load_gig(&state, id).await?;
    if current.freelancer_id != auth.id() {
        return Err(ApiError::Forbidden("only the gig owner can edit it".to_string()));
    }
    if current.status == GigStatus::Archived {
        return Err(ApiError::Conflict("archived gigs cannot be edited".to_string()));
    }

    if let Some(next) = req.status {
        ensure_transition(current.status, next)?;
        if !owner_may_set(current.status, next) {
            return Err(ApiError::Forbidden(format!(
                "gig status {} is set by a moderator",
                next
            )));
        }
    }

    let mut gig = current.clone();
    if let Some(title) = req.title {
        gig.title = title.trim().to_string();
    }
    if let Some(description) = req.description {
        gig.description = description.trim().to_string();
    }
    if req.category_id.is_some() {
        gig.category_id = req.category_id;
    }
    if let Some(skills) = req.skills {
        gig.skills = skills;
    }
    if let Some(price) = req.price {
        gig.price = price;
    }
    if let Some(days) = req.delivery_days {
        gig.delivery_days = days;
    }
    if let Some(next) = req.status {
        gig.status = next;
        if next == GigStatus::PendingReview {
            gig.rejection_reason = None;
        }
    }

    validate_content(&gig.title, &gig.description, gig.price, gig.delivery_days)?;

    let saved = state.store.update_gig(&gig, current.status).await?;
    Ok(Json(saved))
}

// ============ Helpers ============

pub(crate) async fn load_gig(state: &AppState, id: Uuid) -> ApiResult<Gig> {
    state
        .store
        .find_gig(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("gig".to_string()))
}

/// 검토 결과(PENDING_REVIEW → ACTIVE / REJECTED)는 관리자만
fn owner_may_set(from: GigStatus, next: GigStatus) -> bool {
    from != GigStatus::PendingReview
        || !matches!(next, GigStatus::Active | GigStatus::Rejected)
}

fn validate_content(title: &str, description: &str, price: i64, delivery_days: i32) -> ApiResult<()> {
    check_length("title", title, 5, 200)?;
    check_length("description", description, 20, 10_000)?;
    if price <= 0 {
        return Err(ApiError::ValidationError("price must be positive".to_string()));
    }
    if !(1..=365).contains(&delivery_days) {
        return Err(ApiError::ValidationError(
            "delivery_days must be between 1 and 365".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_transitions() {
        assert!(owner_may_set(GigStatus::Draft, GigStatus::PendingReview));
        assert!(owner_may_set(GigStatus::Active, GigStatus::Paused));
        assert!(owner_may_set(GigStatus::Paused, GigStatus::Active));
        assert!(!owner_may_set(GigStatus::PendingReview, GigStatus::Active));
        assert!(!owner_may_set(GigStatus::PendingReview, GigStatus::Rejected));
    }
}
