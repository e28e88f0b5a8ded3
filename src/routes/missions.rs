//! Mission Endpoints
//!
//! # Interview Q&A
//!
//! Q: 미션 상태는 누가 바꾸는가?
//! A: 전이 테이블(`domain::status`)이 가능한 전이를, 핸들러가 주체를 결정
//!    - 작성자: 검토 요청(PENDING_REVIEW), 초안으로 되돌리기(DRAFT), 취소(CANCELLED)
//!    - 관리자: 승인(OPEN) / 반려(REJECTED) → admin 라우트
//!    - 시스템: 제안 수락(IN_PROGRESS), 계약 완료(COMPLETED)
//!
//! Q: 테이블에 없는 전이를 요청하면?
//! A: 400, 저장된 상태는 그대로 (쓰기 전에 검증)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{Mission, MissionFilter, MissionRepository, NewMission};
use crate::domain::{ensure_transition, MissionStatus, Role};
use crate::error::{ApiError, ApiResult};
use crate::types::{check_length, PageQuery, Paginated};
use crate::AppState;

// ============ Request Types ============

#[derive(Debug, Deserialize)]
pub struct CreateMissionRequest {
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub skills: Vec<String>,
    /// 예산 (cents)
    pub budget_min: i64,
    pub budget_max: i64,
    pub deadline: Option<NaiveDate>,
    /// true면 DRAFT로 저장 (검토 요청 안 함)
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMissionRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub skills: Option<Vec<String>>,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub deadline: Option<NaiveDate>,
    pub status: Option<MissionStatus>,
}

impl UpdateMissionRequest {
    fn has_field_edits(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.category_id.is_some()
            || self.skills.is_some()
            || self.budget_min.is_some()
            || self.budget_max.is_some()
            || self.deadline.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct MissionListQuery {
    pub status: Option<MissionStatus>,
    pub category_id: Option<Uuid>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl MissionListQuery {
    fn page(&self) -> (u32, u32) {
        PageQuery { page: self.page, limit: self.limit }.resolve()
    }

    fn query(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
    }
}

// ============ Handlers ============

/// POST /api/missions
///
/// 클라이언트 전용, 기본 PENDING_REVIEW
pub async fn create_mission(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateMissionRequest>,
) -> ApiResult<(StatusCode, Json<Mission>)> {
    auth.require(Role::Client)?;
    validate_content(&req.title, &req.description, req.budget_min, req.budget_max)?;

    let status = if req.draft {
        MissionStatus::Draft
    } else {
        MissionStatus::PendingReview
    };

    let mission = state
        .store
        .create_mission(NewMission {
            client_id: auth.id(),
            title: req.title.trim().to_string(),
            description: req.description.trim().to_string(),
            category_id: req.category_id,
            skills: req.skills,
            budget_min: req.budget_min,
            budget_max: req.budget_max,
            deadline: req.deadline,
            status,
        })
        .await?;

    info!(mission_id = %mission.id, status = %mission.status, "Mission created");
    Ok((StatusCode::CREATED, Json(mission)))
}

/// GET /api/missions
///
/// 공개 목록 (OPEN만)
pub async fn list_missions(
    State(state): State<AppState>,
    Query(query): Query<MissionListQuery>,
) -> ApiResult<Json<Paginated<Mission>>> {
    let (page, limit) = query.page();
    let filter = MissionFilter {
        status: Some(MissionStatus::Open),
        client_id: None,
        category_id: query.category_id,
        query: query.query(),
        page,
        limit,
    };

    let found = state.store.list_missions(&filter).await?;
    Ok(Json(Paginated::from_page(found, page, limit)))
}

/// GET /api/missions/mine
///
/// 내 미션 (모든 상태, `status`로 필터)
pub async fn list_my_missions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<MissionListQuery>,
) -> ApiResult<Json<Paginated<Mission>>> {
    let (page, limit) = query.page();
    let filter = MissionFilter {
        status: query.status,
        client_id: Some(auth.id()),
        category_id: query.category_id,
        query: query.query(),
        page,
        limit,
    };

    let found = state.store.list_missions(&filter).await?;
    Ok(Json(Paginated::from_page(found, page, limit)))
}

/// GET /api/missions/:id
///
/// 게시 전 미션은 작성자와 관리자만 조회
pub async fn get_mission(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Mission>> {
    let mission = load_mission(&state, id).await?;

    let public = matches!(
        mission.status,
        MissionStatus::Open | MissionStatus::InProgress | MissionStatus::Completed
    );
    let privileged = auth
        .as_ref()
        .is_some_and(|a| a.is_admin() || a.id() == mission.client_id);

    if !public && !privileged {
        return Err(ApiError::NotFound("mission".to_string()));
    }
    Ok(Json(mission))
}

/// PUT /api/missions/:id
///
/// 작성자 전용. 내용 수정은 DRAFT / PENDING_REVIEW / REJECTED에서만,
/// `status`는 전이 테이블을 거침
pub async fn update_mission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMissionRequest>,
) -> ApiResult<Json<Mission>> {
    let current = load_mission(&state, id).await?;
    if current.client_id != auth.id() {
        return Err(ApiError::Forbidden("only the mission owner can edit it".to_string()));
    }

    if let Some(next) = req.status {
        ensure_transition(current.status, next)?;
        if !owner_may_set(next) {
            return Err(ApiError::Forbidden(format!(
                "mission status {} is not set by the owner",
                next
            )));
        }
    }

    if req.has_field_edits() && !current.status.is_editable() {
        return Err(ApiError::Conflict(format!(
            "mission can no longer be edited in status {}",
            current.status
        )));
    }

    let mut mission = current.clone();
    if let Some(title) = req.title {
        mission.title = title.trim().to_string();
    }
    if let Some(description) = req.description {
        mission.description = description.trim().to_string();
    }
    if req.category_id.is_some() {
        mission.category_id = req.category_id;
    }
    if let Some(skills) = req.skills {
        mission.skills = skills;
    }
    if let Some(min) = req.budget_min {
        mission.budget_min = min;
    }
    if let Some(max) = req.budget_max {
        mission.budget_max = max;
    }
    if req.deadline.is_some() {
        mission.deadline = req.deadline;
    }
    if let Some(next) = req.status {
        mission.status = next;
        // 다시 검토 요청하면 이전 반려 사유는 지움
        if next == MissionStatus::PendingReview {
            mission.rejection_reason = None;
        }
    }

    validate_content(
        &mission.title,
        &mission.description,
        mission.budget_min,
        mission.budget_max,
    )?;

    let saved = state.store.update_mission(&mission, current.status).await?;
    if saved.status != current.status {
        info!(mission_id = %id, from = %current.status, to = %saved.status, "Mission status changed");
    }
    Ok(Json(saved))
}

/// DELETE /api/missions/:id
///
/// DRAFT만 삭제 가능 (그 외 409)
pub async fn delete_mission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mission = load_mission(&state, id).await?;
    if mission.client_id != auth.id() {
        return Err(ApiError::Forbidden("only the mission owner can delete it".to_string()));
    }
    if mission.status != MissionStatus::Draft {
        return Err(ApiError::Conflict("only draft missions can be deleted".to_string()));
    }

    state.store.delete_mission(id, MissionStatus::Draft).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Helpers ============

pub(crate) async fn load_mission(state: &AppState, id: Uuid) -> ApiResult<Mission> {
    state
        .store
        .find_mission(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("mission".to_string()))
}

/// 작성자가 직접 요청할 수 있는 상태
fn owner_may_set(next: MissionStatus) -> bool {
    matches!(
        next,
        MissionStatus::Draft | MissionStatus::PendingReview | MissionStatus::Cancelled
    )
}

fn validate_content(title: &str, description: &str, budget_min: i64, budget_max: i64) -> ApiResult<()> {
    check_length("title", title, 5, 200)?;
    check_length("description", description, 20, 10_000)?;
    if budget_min < 0 {
        return Err(ApiError::ValidationError("budget_min must not be negative".to_string()));
    }
    if budget_min > budget_max {
        return Err(ApiError::ValidationError(
            "budget_min must not exceed budget_max".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_content() {
        let description = "A description that is long enough";
        assert!(validate_content("Build an API", description, 100, 200).is_ok());
        assert!(validate_content("API", description, 100, 200).is_err());
        assert!(validate_content("Build an API", "too short", 100, 200).is_err());
        assert!(validate_content("Build an API", description, 300, 200).is_err());
    }

    #[test]
    fn test_owner_cannot_approve() {
        assert!(owner_may_set(MissionStatus::PendingReview));
        assert!(owner_may_set(MissionStatus::Cancelled));
        assert!(!owner_may_set(MissionStatus::Open));
        assert!(!owner_may_set(MissionStatus::InProgress));
    }
}
