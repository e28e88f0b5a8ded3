//! Proposal Endpoints
//!
//! # Interview Q&A
//!
//! Q: 제안서 제출 비용은?
//! A: 1 크레딧, 제안서 insert와 같은 트랜잭션에서 차감
//!    - 같은 미션에 두 번 제출 → 409 (크레딧도 차감 안 됨)
//!    - 잔액 부족 → 409 `INSUFFICIENT_CREDITS`
//!    - 철회(withdraw)하면 환불
//!
//! Q: 수락은?
//! A: 한 트랜잭션: 제안 ACCEPTED, 나머지 PENDING 제안 REJECTED,
//!    미션 OPEN → IN_PROGRESS, PENDING 계약 생성

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{Contract, ContractRepository, NewProposal, Proposal};
use crate::domain::{ensure_transition, MissionStatus, ProposalStatus, Role, PROPOSAL_CREDIT_COST};
use crate::error::{ApiError, ApiResult};
use crate::routes::missions::load_mission;
use crate::types::{check_length, PageQuery, Paginated};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitProposalRequest {
    /// 제안 금액 (cents)
    pub price: i64,
    pub timeline_days: i32,
    pub message: String,
}

/// POST /api/missions/:id/proposals
pub async fn submit_proposal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(mission_id): Path<Uuid>,
    Json(req): Json<SubmitProposalRequest>,
) -> ApiResult<(StatusCode, Json<Proposal>)> {
    auth.require(Role::Freelancer)?;

    if req.price <= 0 {
        return Err(ApiError::ValidationError("price must be positive".to_string()));
    }
    if req.timeline_days <= 0 {
        return Err(ApiError::ValidationError("timeline_days must be positive".to_string()));
    }
    check_length("message", &req.message, 20, 5000)?;

    let mission = load_mission(&state, mission_id).await?;
    if mission.status != MissionStatus::Open {
        return Err(ApiError::Conflict("mission is not accepting proposals".to_string()));
    }

    let proposal = state
        .store
        .submit_proposal(
            NewProposal {
                mission_id,
                freelancer_id: auth.id(),
                price: req.price,
                timeline_days: req.timeline_days,
                message: req.message.trim().to_string(),
            },
            PROPOSAL_CREDIT_COST,
        )
        .await?;

    info!(proposal_id = %proposal.id, mission_id = %mission_id, "Proposal submitted");
    Ok((StatusCode::CREATED, Json(proposal)))
}

/// GET /api/missions/:id/proposals
///
/// 미션 작성자 / 관리자
pub async fn list_for_mission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(mission_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Proposal>>> {
    let mission = load_mission(&state, mission_id).await?;
    if mission.client_id != auth.id() && !auth.is_admin() {
        return Err(ApiError::Forbidden("only the mission owner can see proposals".to_string()));
    }

    Ok(Json(state.store.list_proposals_for_mission(mission_id).await?))
}

/// GET /api/proposals/mine
pub async fn list_mine(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<Proposal>>> {
    let (page, limit) = query.resolve();
    let found = state
        .store
        .list_proposals_by_freelancer(auth.id(), page, limit)
        .await?;
    Ok(Json(Paginated::from_page(found, page, limit)))
}

/// POST /api/proposals/:id/accept
///
/// 미션 작성자 전용, 생성된 계약 반환
pub async fn accept_proposal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Contract>)> {
    let proposal = load_proposal(&state, id).await?;
    let mission = load_mission(&state, proposal.mission_id).await?;
    if mission.client_id != auth.id() {
        return Err(ApiError::Forbidden("only the mission owner can accept proposals".to_string()));
    }

    ensure_transition(proposal.status, ProposalStatus::Accepted)?;
    ensure_transition(mission.status, MissionStatus::InProgress)?;

    let contract = state.store.accept_proposal(id).await?;
    info!(proposal_id = %id, contract_id = %contract.id, "Proposal accepted");
    Ok((StatusCode::CREATED, Json(contract)))
}

/// POST /api/proposals/:id/reject
pub async fn reject_proposal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Proposal>> {
    let proposal = load_proposal(&state, id).await?;
    let mission = load_mission(&state, proposal.mission_id).await?;
    if mission.client_id != auth.id() {
        return Err(ApiError::Forbidden("only the mission owner can reject proposals".to_string()));
    }

    ensure_transition(proposal.status, ProposalStatus::Rejected)?;
    let updated = state
        .store
        .update_proposal_status(id, proposal.status, ProposalStatus::Rejected)
        .await?;
    Ok(Json(updated))
}

/// POST /api/proposals/:id/withdraw
///
/// 제출자 전용, 크레딧 환불
pub async fn withdraw_proposal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Proposal>> {
    let proposal = load_proposal(&state, id).await?;
    if proposal.freelancer_id != auth.id() {
        return Err(ApiError::Forbidden("only the author can withdraw a proposal".to_string()));
    }

    ensure_transition(proposal.status, ProposalStatus::Withdrawn)?;
    let updated = state
        .store
        .withdraw_proposal(id, PROPOSAL_CREDIT_COST)
        .await?;
    Ok(Json(updated))
}

async fn load_proposal(state: &AppState, id: Uuid) -> ApiResult<Proposal> {
    state
        .store
        .find_proposal(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("proposal".to_string()))
}
