//! Credit Endpoints
//!
//! 잔액 = 원장(credit_transactions) 합계, 따로 저장하지 않음

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::db::{BillingRepository, CreditTransaction};
use crate::error::ApiResult;
use crate::types::{PageQuery, Paginated};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

/// GET /api/credits
pub async fn get_balance(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = state.store.credit_balance(auth.id()).await?;
    Ok(Json(BalanceResponse { balance }))
}

/// GET /api/credits/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<CreditTransaction>>> {
    let (page, limit) = query.resolve();
    let found = state
        .store
        .list_credit_transactions(auth.id(), page, limit)
        .await?;
    Ok(Json(Paginated::from_page(found, page, limit)))
}
