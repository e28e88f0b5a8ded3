//! Invoice Endpoints
//!
//! # Interview Q&A
//!
//! Q: 송장 금액은 어디서 계산하는가?
//! A: `domain::invoice::price_invoice` 한 곳, 저장 전에 라우트에서
//!    - 항목별 round(quantity × unit_price), 세금 round(subtotal × rate / 100)
//!    - 수량/세율은 `Decimal`, 0.5 cent는 0에서 먼 쪽으로 반올림
//!    - i64 범위를 넘으면 400, 클라이언트가 보낸 합계는 받지 않음
//!
//! Q: 번호는?
//! A: `INV-{연도}-{5자리}`, 연도별 카운터를 저장소가 송장 insert와 같은 트랜잭션에서 증가
//!
//! Q: 누가 어떤 상태로 바꾸는가?
//! A: 발행(프리랜서) → 발송/취소(프리랜서) → 지급 완료(클라이언트)
//!    연체 표시는 만기일이 지난 뒤 어느 쪽이든

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{BillingRepository, Invoice, InvoiceWithItems, NewInvoice};
use crate::domain::invoice::validate_items;
use crate::domain::{ensure_transition, price_invoice, ContractStatus, InvoiceStatus, LineItem};
use crate::error::{ApiError, ApiResult};
use crate::routes::contracts::load_contract;
use crate::types::{PageQuery, Paginated};
use crate::AppState;

/// 송장당 최대 항목 수
const MAX_ITEMS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub contract_id: Uuid,
    pub items: Vec<LineItem>,
    /// 퍼센트 (20.0 = 20%)
    #[serde(default)]
    pub tax_rate: Decimal,
    pub due_date: Option<NaiveDate>,
}

/// POST /api/invoices
///
/// 계약의 프리랜서만 발행 (DRAFT)
pub async fn create_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateInvoiceRequest>,
) -> ApiResult<(StatusCode, Json<InvoiceWithItems>)> {
    let contract = load_contract(&state, req.contract_id).await?;
    if contract.freelancer_id != auth.id() {
        return Err(ApiError::Forbidden("only the contract freelancer can issue invoices".to_string()));
    }
    if matches!(contract.status, ContractStatus::Pending | ContractStatus::Cancelled) {
        return Err(ApiError::Conflict(format!(
            "cannot invoice a {} contract",
            contract.status
        )));
    }

    if req.items.is_empty() || req.items.len() > MAX_ITEMS {
        return Err(ApiError::ValidationError(format!(
            "an invoice needs between 1 and {} items",
            MAX_ITEMS
        )));
    }
    validate_items(&req.items, req.tax_rate)?;
    let priced = price_invoice(&req.items, req.tax_rate)?;

    let invoice = state
        .store
        .create_invoice(NewInvoice {
            contract_id: contract.id,
            issuer_id: contract.freelancer_id,
            recipient_id: contract.client_id,
            lines: priced.lines,
            tax_rate: req.tax_rate,
            totals: priced.totals,
            due_date: req.due_date,
        })
        .await?;

    info!(
        invoice_id = %invoice.invoice.id,
        number = %invoice.invoice.number,
        total = invoice.invoice.total_amount,
        "Invoice issued"
    );
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// GET /api/invoices
///
/// 발행했거나 받은 송장
pub async fn list_invoices(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<Invoice>>> {
    let (page, limit) = query.resolve();
    let found = state
        .store
        .list_invoices_for_user(auth.id(), page, limit)
        .await?;
    Ok(Json(Paginated::from_page(found, page, limit)))
}

/// GET /api/invoices/:id
pub async fn get_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<InvoiceWithItems>> {
    let invoice = load_invoice(&state, id).await?;
    let inv = &invoice.invoice;
    if inv.issuer_id != auth.id() && inv.recipient_id != auth.id() && !auth.is_admin() {
        return Err(ApiError::Forbidden("not a party to this invoice".to_string()));
    }
    Ok(Json(invoice))
}

/// POST /api/invoices/:id/send
pub async fn send_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Invoice>> {
    change_status(&state, &auth, id, InvoiceStatus::Sent).await.map(Json)
}

/// POST /api/invoices/:id/cancel
pub async fn cancel_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Invoice>> {
    change_status(&state, &auth, id, InvoiceStatus::Cancelled).await.map(Json)
}

/// POST /api/invoices/:id/pay
pub async fn mark_paid(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Invoice>> {
    change_status(&state, &auth, id, InvoiceStatus::Paid).await.map(Json)
}

/// POST /api/invoices/:id/overdue
pub async fn mark_overdue(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Invoice>> {
    change_status(&state, &auth, id, InvoiceStatus::Overdue).await.map(Json)
}

// ============ Helpers ============

async fn load_invoice(state: &AppState, id: Uuid) -> ApiResult<InvoiceWithItems> {
    state
        .store
        .find_invoice(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("invoice".to_string()))
}

async fn change_status(
    state: &AppState,
    auth: &AuthUser,
    id: Uuid,
    next: InvoiceStatus,
) -> ApiResult<Invoice> {
    let invoice = load_invoice(state, id).await?.invoice;
    let is_issuer = invoice.issuer_id == auth.id();
    let is_recipient = invoice.recipient_id == auth.id();

    let allowed = match next {
        InvoiceStatus::Sent | InvoiceStatus::Cancelled => is_issuer,
        InvoiceStatus::Paid => is_recipient,
        InvoiceStatus::Overdue => is_issuer || is_recipient,
        InvoiceStatus::Draft => false,
    };
    if !allowed {
        return Err(ApiError::Forbidden(format!(
            "you cannot mark this invoice {}",
            next
        )));
    }

    ensure_transition(invoice.status, next)?;

    let today = Utc::now().date_naive();
    if next == InvoiceStatus::Overdue && !is_past_due(invoice.due_date, today) {
        return Err(ApiError::Conflict("invoice is not past its due date".to_string()));
    }

    let paid_at = (next == InvoiceStatus::Paid).then(Utc::now);
    let updated = state
        .store
        .update_invoice_status(id, invoice.status, next, paid_at)
        .await?;

    info!(invoice_id = %id, from = %invoice.status, to = %next, "Invoice status changed");
    Ok(updated)
}

fn is_past_due(due_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    due_date.is_some_and(|due| due < today)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_past_due() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        assert!(is_past_due(NaiveDate::from_ymd_opt(2026, 3, 9), today));
        assert!(!is_past_due(Some(today), today));
        assert!(!is_past_due(None, today));
    }
}
