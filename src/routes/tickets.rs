//! Support Ticket Endpoints
//!
//! - 누구나 첫 메시지와 함께 티켓 생성
//! - 작성자와 관리자가 답글, 관리자가 OPEN 티켓에 답하면 IN_PROGRESS
//! - 작성자가 WAITING_ON_USER 티켓에 답하면 IN_PROGRESS로 복귀
//! - 작성자는 닫기만, 관리자는 전이 테이블 안에서 자유롭게

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::db::{NewTicket, SupportRepository, SupportTicket, TicketMessage};
use crate::domain::{ensure_transition, TicketPriority, TicketStatus};
use crate::error::{ApiError, ApiResult};
use crate::types::{check_length, PageQuery, Paginated};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub category: String,
    pub priority: Option<TicketPriority>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    pub status: Option<TicketStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct TicketStatusRequest {
    pub status: TicketStatus,
}

#[derive(Debug, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: SupportTicket,
    pub messages: Vec<TicketMessage>,
}

/// POST /api/tickets
pub async fn create_ticket(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateTicketRequest>,
) -> ApiResult<(StatusCode, Json<SupportTicket>)> {
    check_length("subject", &req.subject, 3, 200)?;
    check_length("category", &req.category, 2, 50)?;
    check_length("message", &req.message, 1, 10_000)?;

    let ticket = state
        .store
        .create_ticket(NewTicket {
            user_id: auth.id(),
            subject: req.subject.trim().to_string(),
            category: req.category.trim().to_lowercase(),
            priority: req.priority.unwrap_or(TicketPriority::Medium),
            message: req.message.trim().to_string(),
        })
        .await?;

    info!(ticket_id = %ticket.id, priority = %ticket.priority, "Support ticket opened");
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// GET /api/tickets
///
/// 관리자는 전체 큐, 그 외는 본인 티켓
pub async fn list_tickets(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<TicketListQuery>,
) -> ApiResult<Json<Paginated<SupportTicket>>> {
    let (page, limit) = PageQuery { page: query.page, limit: query.limit }.resolve();
    let owner = (!auth.is_admin()).then(|| auth.id());

    let found = state
        .store
        .list_tickets(owner, query.status, page, limit)
        .await?;
    Ok(Json(Paginated::from_page(found, page, limit)))
}

/// GET /api/tickets/:id
pub async fn get_ticket(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TicketDetail>> {
    let ticket = load_visible_ticket(&state, &auth, id).await?;
    let messages = state.store.list_ticket_messages(id).await?;
    Ok(Json(TicketDetail { ticket, messages }))
}

/// POST /api/tickets/:id/messages
pub async fn reply(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplyRequest>,
) -> ApiResult<(StatusCode, Json<TicketMessage>)> {
    let ticket = load_visible_ticket(&state, &auth, id).await?;
    if ticket.status == TicketStatus::Closed {
        return Err(ApiError::Conflict("ticket is closed".to_string()));
    }
    check_length("body", &req.body, 1, 10_000)?;

    let is_staff = auth.is_admin();
    let message = state
        .store
        .add_ticket_message(id, auth.id(), req.body.trim(), is_staff)
        .await?;

    if let Some(next) = status_after_reply(ticket.status, is_staff) {
        // 답글은 이미 저장됨, 상태 갱신 경합은 로그만
        if let Err(e) = state.store.update_ticket_status(id, ticket.status, next).await {
            warn!(ticket_id = %id, error = %e, "Ticket status not updated after reply");
        }
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/tickets/:id/close
pub async fn close_ticket(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SupportTicket>> {
    let ticket = load_visible_ticket(&state, &auth, id).await?;
    ensure_transition(ticket.status, TicketStatus::Closed)?;

    let updated = state
        .store
        .update_ticket_status(id, ticket.status, TicketStatus::Closed)
        .await?;
    Ok(Json(updated))
}

/// PUT /api/admin/tickets/:id/status
pub async fn set_ticket_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<TicketStatusRequest>,
) -> ApiResult<Json<SupportTicket>> {
    let ticket = state
        .store
        .find_ticket(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("ticket".to_string()))?;
    ensure_transition(ticket.status, req.status)?;

    let updated = state
        .store
        .update_ticket_status(id, ticket.status, req.status)
        .await?;
    Ok(Json(updated))
}

// ============ Helpers ============

async fn load_visible_ticket(state: &AppState, auth: &AuthUser, id: Uuid) -> ApiResult<SupportTicket> {
    let ticket = state
        .store
        .find_ticket(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("ticket".to_string()))?;

    if ticket.user_id != auth.id() && !auth.is_admin() {
        return Err(ApiError::Forbidden("not your ticket".to_string()));
    }
    Ok(ticket)
}

/// 답글 후 자동 상태 변경
fn status_after_reply(current: TicketStatus, is_staff: bool) -> Option<TicketStatus> {
    match (current, is_staff) {
        (TicketStatus::Open, true) => Some(TicketStatus::InProgress),
        (TicketStatus::WaitingOnUser, false) => Some(TicketStatus::InProgress),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_after_reply() {
        assert_eq!(status_after_reply(TicketStatus::Open, true), Some(TicketStatus::InProgress));
        assert_eq!(status_after_reply(TicketStatus::Open, false), None);
        assert_eq!(
            status_after_reply(TicketStatus::WaitingOnUser, false),
            Some(TicketStatus::InProgress)
        );
        assert_eq!(status_after_reply(TicketStatus::InProgress, true), None);
    }
}
