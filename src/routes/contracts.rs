//! Contract & Milestone Endpoints
//!
//! # Interview Q&A
//!
//! Q: 계약은 언제 ACTIVE가 되는가?
//! A: 양쪽 모두 서명했을 때 (PENDING → ACTIVE, start_date = 서명 완료 시각)
//!
//! Q: 완료는?
//! A: 클라이언트만. 계약 ACTIVE → COMPLETED와 미션 IN_PROGRESS → COMPLETED를 한 트랜잭션으로
//!
//! Q: 마일스톤 상태는 누가 바꾸는가?
//! A: 작업 진행은 프리랜서, 검수와 지급은 클라이언트
//!    - 프리랜서: PENDING → IN_PROGRESS → SUBMITTED
//!    - 클라이언트: SUBMITTED → APPROVED (또는 IN_PROGRESS로 수정 요청), APPROVED → PAID

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{Contract, ContractRepository, Milestone, NewMilestone};
use crate::domain::{ensure_transition, ContractStatus, MilestoneStatus, Role};
use crate::error::{ApiError, ApiResult};
use crate::types::{check_length, PageQuery, Paginated};
use crate::AppState;

// ============ Request Types ============

#[derive(Debug, Deserialize)]
pub struct CreateMilestoneRequest {
    pub title: String,
    /// 금액 (cents)
    pub amount: i64,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct MilestoneStatusRequest {
    pub status: MilestoneStatus,
}

// ============ Contract Handlers ============

/// GET /api/contracts
pub async fn list_contracts(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<Contract>>> {
    let (page, limit) = query.resolve();
    let found = state
        .store
        .list_contracts_for_user(auth.id(), page, limit)
        .await?;
    Ok(Json(Paginated::from_page(found, page, limit)))
}

/// GET /api/contracts/:id
pub async fn get_contract(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Contract>> {
    let contract = load_contract(&state, id).await?;
    ensure_party_or_admin(&auth, &contract)?;
    Ok(Json(contract))
}

/// POST /api/contracts/:id/sign
///
/// 호출한 당사자의 서명 기록, 양쪽 서명이 모이면 ACTIVE
pub async fn sign_contract(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Contract>> {
    let current = load_contract(&state, id).await?;
    if !current.is_party(auth.id()) {
        return Err(ApiError::Forbidden("only contract parties can sign".to_string()));
    }
    // 서명은 PENDING에서만 의미가 있음
    ensure_transition(current.status, ContractStatus::Active)?;
    if current.status != ContractStatus::Pending {
        return Err(ApiError::Conflict("contract is not awaiting signatures".to_string()));
    }

    let (party, signed_at) = if auth.id() == current.client_id {
        (Role::Client, current.client_signed_at)
    } else {
        (Role::Freelancer, current.freelancer_signed_at)
    };
    if signed_at.is_some() {
        return Err(ApiError::Conflict("contract already signed by this party".to_string()));
    }

    // 서명 기록과 ACTIVE 전환은 저장소의 단일 갱신으로 (상대방 동시 서명 보존)
    let saved = state.store.sign_contract(id, party, Utc::now()).await?;
    if saved.status == ContractStatus::Active {
        info!(contract_id = %id, "Contract fully signed, now active");
    }
    Ok(Json(saved))
}

/// POST /api/contracts/:id/complete
///
/// 클라이언트 전용
pub async fn complete_contract(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Contract>> {
    let contract = load_contract(&state, id).await?;
    if contract.client_id != auth.id() {
        return Err(ApiError::Forbidden("only the client can complete a contract".to_string()));
    }
    ensure_transition(contract.status, ContractStatus::Completed)?;
    if contract.status == ContractStatus::Disputed {
        return Err(ApiError::Conflict("contract is under dispute".to_string()));
    }

    let completed = state.store.complete_contract(id, Utc::now()).await?;
    info!(contract_id = %id, mission_id = %completed.mission_id, "Contract completed");
    Ok(Json(completed))
}

/// POST /api/contracts/:id/cancel
///
/// 어느 당사자든 (분쟁 중이면 관리자 해결을 거쳐야 함)
pub async fn cancel_contract(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Contract>> {
    let current = load_contract(&state, id).await?;
    if !current.is_party(auth.id()) {
        return Err(ApiError::Forbidden("only contract parties can cancel".to_string()));
    }
    ensure_transition(current.status, ContractStatus::Cancelled)?;
    if current.status == ContractStatus::Disputed {
        return Err(ApiError::Conflict("contract is under dispute".to_string()));
    }

    let saved = state
        .store
        .cancel_contract(id, current.status, Utc::now())
        .await?;
    info!(contract_id = %id, by = %auth.id(), "Contract cancelled");
    Ok(Json(saved))
}

// ============ Milestone Handlers ============

/// GET /api/contracts/:id/milestones
pub async fn list_milestones(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Milestone>>> {
    let contract = load_contract(&state, id).await?;
    ensure_party_or_admin(&auth, &contract)?;
    Ok(Json(state.store.list_milestones(id).await?))
}

/// POST /api/contracts/:id/milestones
///
/// 클라이언트 전용, PENDING / ACTIVE 계약에만
pub async fn create_milestone(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateMilestoneRequest>,
) -> ApiResult<(StatusCode, Json<Milestone>)> {
    let contract = load_contract(&state, id).await?;
    if contract.client_id != auth.id() {
        return Err(ApiError::Forbidden("only the client can add milestones".to_string()));
    }
    if !matches!(contract.status, ContractStatus::Pending | ContractStatus::Active) {
        return Err(ApiError::Conflict(format!(
            "milestones cannot be added to a {} contract",
            contract.status
        )));
    }
    check_length("title", &req.title, 3, 200)?;
    if req.amount <= 0 {
        return Err(ApiError::ValidationError("amount must be positive".to_string()));
    }

    let milestone = state
        .store
        .create_milestone(NewMilestone {
            contract_id: id,
            title: req.title.trim().to_string(),
            amount: req.amount,
            due_date: req.due_date,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(milestone)))
}

/// PUT /api/milestones/:id/status
pub async fn update_milestone_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<MilestoneStatusRequest>,
) -> ApiResult<Json<Milestone>> {
    let milestone = state
        .store
        .find_milestone(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("milestone".to_string()))?;
    let contract = load_contract(&state, milestone.contract_id).await?;
    if !contract.is_party(auth.id()) {
        return Err(ApiError::Forbidden("only contract parties can update milestones".to_string()));
    }

    ensure_transition(milestone.status, req.status)?;

    let expected_actor = milestone_actor(milestone.status, req.status);
    let actor_id = match expected_actor {
        Role::Freelancer => contract.freelancer_id,
        _ => contract.client_id,
    };
    if actor_id != auth.id() {
        return Err(ApiError::Forbidden(format!(
            "only the {} moves a milestone to {}",
            expected_actor.as_str().to_lowercase(),
            req.status
        )));
    }

    let updated = state
        .store
        .update_milestone_status(id, milestone.status, req.status)
        .await?;
    Ok(Json(updated))
}

// ============ Helpers ============

pub(crate) async fn load_contract(state: &AppState, id: Uuid) -> ApiResult<Contract> {
    state
        .store
        .find_contract(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("contract".to_string()))
}

pub(crate) fn ensure_party_or_admin(auth: &AuthUser, contract: &Contract) -> ApiResult<()> {
    if contract.is_party(auth.id()) || auth.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("not a party to this contract".to_string()))
    }
}

/// 전이별 주체: 작업 진행은 프리랜서, 나머지는 클라이언트
fn milestone_actor(from: MilestoneStatus, to: MilestoneStatus) -> Role {
    match (from, to) {
        (MilestoneStatus::Pending, MilestoneStatus::InProgress)
        | (MilestoneStatus::InProgress, MilestoneStatus::Submitted) => Role::Freelancer,
        _ => Role::Client,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milestone_actor() {
        use MilestoneStatus::*;
        assert_eq!(milestone_actor(Pending, InProgress), Role::Freelancer);
        assert_eq!(milestone_actor(InProgress, Submitted), Role::Freelancer);
        // 수정 요청은 클라이언트가 보냄
        assert_eq!(milestone_actor(Submitted, InProgress), Role::Client);
        assert_eq!(milestone_actor(Submitted, Approved), Role::Client);
        assert_eq!(milestone_actor(Approved, Paid), Role::Client);
    }
}
