//! Messaging Endpoints
//!
//! # Interview Q&A
//!
//! Q: 안 읽은 메시지 수는 어떻게 관리하는가?
//! A: 대화 행에 참여자별 카운터 (unread_a, unread_b)
//!    - 메시지 전송: insert + last_message_at + 상대방 카운터 +1 (한 트랜잭션)
//!    - 읽음 처리: 본인 카운터 0
//!    - 목록 조회 때 메시지를 세지 않아도 됨

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{Conversation, Message, MessagingRepository, UserRepository};
use crate::error::{ApiError, ApiResult};
use crate::types::{check_length, PageQuery, Paginated};
use crate::AppState;

const MAX_MESSAGE_LEN: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    pub recipient_id: Uuid,
    pub mission_id: Option<Uuid>,
    /// 첫 메시지 (선택)
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

/// 요청자 기준 대화 요약
#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub id: Uuid,
    pub other_participant_id: Uuid,
    pub mission_id: Option<Uuid>,
    pub unread: i32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ConversationView {
    fn for_user(conversation: &Conversation, user_id: Uuid) -> Self {
        let other = if conversation.participant_a == user_id {
            conversation.participant_b
        } else {
            conversation.participant_a
        };

        Self {
            id: conversation.id,
            other_participant_id: other,
            mission_id: conversation.mission_id,
            unread: conversation.unread_for(user_id),
            last_message_at: conversation.last_message_at,
            created_at: conversation.created_at,
        }
    }
}

/// GET /api/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<ConversationView>>> {
    let conversations = state.store.list_conversations(auth.id()).await?;
    Ok(Json(
        conversations
            .iter()
            .map(|c| ConversationView::for_user(c, auth.id()))
            .collect(),
    ))
}

/// POST /api/conversations
///
/// 같은 두 사람 + 같은 미션이면 기존 대화 재사용
pub async fn start_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<StartConversationRequest>,
) -> ApiResult<(StatusCode, Json<ConversationView>)> {
    if req.recipient_id == auth.id() {
        return Err(ApiError::BadRequest("cannot message yourself".to_string()));
    }
    if state.store.find_user(req.recipient_id).await?.is_none() {
        return Err(ApiError::NotFound("recipient".to_string()));
    }
    if let Some(body) = &req.body {
        check_length("body", body, 1, MAX_MESSAGE_LEN)?;
    }

    let mut conversation = state
        .store
        .find_or_create_conversation(auth.id(), req.recipient_id, req.mission_id)
        .await?;

    if let Some(body) = &req.body {
        let message = state
            .store
            .send_message(conversation.id, auth.id(), body.trim())
            .await?;
        conversation.last_message_at = Some(message.created_at);
    }

    Ok((
        StatusCode::CREATED,
        Json(ConversationView::for_user(&conversation, auth.id())),
    ))
}

/// GET /api/conversations/:id/messages
///
/// 최신순
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paginated<Message>>> {
    load_own_conversation(&state, &auth, id).await?;

    let (page, limit) = query.resolve();
    let found = state.store.list_messages(id, page, limit).await?;
    Ok(Json(Paginated::from_page(found, page, limit)))
}

/// POST /api/conversations/:id/messages
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    load_own_conversation(&state, &auth, id).await?;
    check_length("body", &req.body, 1, MAX_MESSAGE_LEN)?;

    let message = state
        .store
        .send_message(id, auth.id(), req.body.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/conversations/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    load_own_conversation(&state, &auth, id).await?;
    state.store.mark_conversation_read(id, auth.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn load_own_conversation(state: &AppState, auth: &AuthUser, id: Uuid) -> ApiResult<Conversation> {
    let conversation = state
        .store
        .find_conversation(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("conversation".to_string()))?;

    // 참여자가 아니면 존재 자체를 숨김
    if !conversation.has_participant(auth.id()) {
        return Err(ApiError::NotFound("conversation".to_string()));
    }
    Ok(conversation)
}
