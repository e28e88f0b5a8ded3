//! Dispute Endpoints
//!
//! # Interview Q&A
//!
//! Q: 분쟁이 열리면 계약은?
//! A: 같은 트랜잭션에서 ACTIVE → DISPUTED (분쟁 중에는 완료/취소 불가)
//!
//! Q: 해결되면?
//! A: 관리자가 RESOLVED로 바꿀 때 계약 결과를 정함
//!    - 기본: 계약 ACTIVE로 복귀
//!    - `contract_outcome`이 COMPLETED / CANCELLED면 그 상태로, end_date 기록
//!    - COMPLETED면 미션도 IN_PROGRESS → COMPLETED (같은 트랜잭션)
//!    - 해결 없이 CLOSED (취하)하면 ACTIVE로 복귀

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::db::{Dispute, NewDispute, SupportRepository};
use crate::domain::{ensure_transition, ContractStatus, DisputeStatus};
use crate::error::{ApiError, ApiResult};
use crate::routes::contracts::load_contract;
use crate::types::{check_length, PageQuery, Paginated};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenDisputeRequest {
    pub contract_id: Uuid,
    pub reason: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct DisputeListQuery {
    pub status: Option<DisputeStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDisputeRequest {
    pub status: DisputeStatus,
    pub resolution: Option<String>,
    /// RESOLVED일 때 계약 결과 (ACTIVE / COMPLETED / CANCELLED)
    pub contract_outcome: Option<ContractStatus>,
}

/// POST /api/disputes
///
/// ACTIVE 계약의 당사자만
pub async fn open_dispute(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<OpenDisputeRequest>,
) -> ApiResult<(StatusCode, Json<Dispute>)> {
    let contract = load_contract(&state, req.contract_id).await?;
    if !contract.is_party(auth.id()) {
        return Err(ApiError::Forbidden("only contract parties can open a dispute".to_string()));
    }
    ensure_transition(contract.status, ContractStatus::Disputed)?;

    check_length("reason", &req.reason, 3, 200)?;
    check_length("description", &req.description, 20, 10_000)?;

    let dispute = state
        .store
        .open_dispute(NewDispute {
            contract_id: contract.id,
            opened_by: auth.id(),
            reason: req.reason.trim().to_string(),
            description: req.description.trim().to_string(),
        })
        .await?;

    info!(dispute_id = %dispute.id, contract_id = %contract.id, "Dispute opened");
    Ok((StatusCode::CREATED, Json(dispute)))
}

/// GET /api/disputes
///
/// 관리자는 전체, 그 외는 본인이 당사자인 분쟁
pub async fn list_disputes(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<DisputeListQuery>,
) -> ApiResult<Json<Paginated<Dispute>>> {
    let (page, limit) = PageQuery { page: query.page, limit: query.limit }.resolve();
    let party = (!auth.is_admin()).then(|| auth.id());

    let found = state
        .store
        .list_disputes(party, query.status, page, limit)
        .await?;
    Ok(Json(Paginated::from_page(found, page, limit)))
}

/// GET /api/disputes/:id
pub async fn get_dispute(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Dispute>> {
    let dispute = load_dispute(&state, id).await?;
    let is_party = dispute.client_id == auth.id() || dispute.freelancer_id == auth.id();
    if !is_party && !auth.is_admin() {
        return Err(ApiError::Forbidden("not a party to this dispute".to_string()));
    }
    Ok(Json(dispute))
}

/// PUT /api/admin/disputes/:id
pub async fn update_dispute(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDisputeRequest>,
) -> ApiResult<Json<Dispute>> {
    let current = load_dispute(&state, id).await?;
    ensure_transition(current.status, req.status)?;

    let contract_outcome = contract_outcome(current.status, req.status, req.contract_outcome)?;

    let mut dispute = current.clone();
    dispute.status = req.status;
    if req.status == DisputeStatus::Resolved {
        let resolution = req
            .resolution
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ApiError::ValidationError("resolution is required".to_string()))?;
        dispute.resolution = Some(resolution.to_string());
        dispute.resolved_by = Some(admin.id());
    }

    let saved = state
        .store
        .update_dispute(&dispute, current.status, contract_outcome)
        .await?;

    info!(
        dispute_id = %id,
        from = %current.status,
        to = %saved.status,
        outcome = ?contract_outcome,
        "Dispute updated"
    );
    Ok(Json(saved))
}

// ============ Helpers ============

async fn load_dispute(state: &AppState, id: Uuid) -> ApiResult<Dispute> {
    state
        .store
        .find_dispute(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("dispute".to_string()))
}

/// 분쟁 전이에 따라 계약이 가야 할 상태
fn contract_outcome(
    from: DisputeStatus,
    to: DisputeStatus,
    requested: Option<ContractStatus>,
) -> ApiResult<Option<ContractStatus>> {
    match to {
        DisputeStatus::Resolved => match requested.unwrap_or(ContractStatus::Active) {
            outcome @ (ContractStatus::Active
            | ContractStatus::Completed
            | ContractStatus::Cancelled) => Ok(Some(outcome)),
            other => Err(ApiError::ValidationError(format!(
                "contract_outcome cannot be {}",
                other
            ))),
        },
        // 해결 없이 닫히면 계약은 ACTIVE로 복귀
        DisputeStatus::Closed if from != DisputeStatus::Resolved => Ok(Some(ContractStatus::Active)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_outcome() {
        use DisputeStatus::*;
        assert_eq!(
            contract_outcome(UnderReview, Resolved, None).unwrap(),
            Some(ContractStatus::Active)
        );
        assert_eq!(
            contract_outcome(UnderReview, Resolved, Some(ContractStatus::Cancelled)).unwrap(),
            Some(ContractStatus::Cancelled)
        );
        assert!(contract_outcome(UnderReview, Resolved, Some(ContractStatus::Pending)).is_err());
        assert_eq!(
            contract_outcome(Open, Closed, None).unwrap(),
            Some(ContractStatus::Active)
        );
        assert_eq!(contract_outcome(Resolved, Closed, None).unwrap(), None);
        assert_eq!(contract_outcome(Open, UnderReview, None).unwrap(), None);
    }
}
