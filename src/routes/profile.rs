//! Profile Endpoints
//!
//! 본인 프로필 수정, 자격증/학력, 프리랜서 공개 프로필

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{Certification, Education, NewCertification, NewEducation, ProfilePatch, User, UserRepository};
use crate::domain::Role;
use crate::error::{ApiError, ApiResult};
use crate::types::{check_length, PageQuery, Paginated};
use crate::AppState;

// ============ Response Types ============

/// 공개 프로필 (이메일 제외)
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub headline: Option<String>,
    pub bio: Option<String>,
    pub hourly_rate: Option<i64>,
    pub skills: Vec<String>,
    pub avatar_url: Option<String>,
    pub member_since: DateTime<Utc>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name,
            role: user.role,
            headline: user.headline,
            bio: user.bio,
            hourly_rate: user.hourly_rate,
            skills: user.skills,
            avatar_url: user.avatar_url,
            member_since: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FreelancerProfileResponse {
    #[serde(flatten)]
    pub profile: PublicProfile,
    pub certifications: Vec<Certification>,
    pub education: Vec<Education>,
}

#[derive(Debug, Deserialize)]
pub struct FreelancerQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// ============ Handlers ============

/// PUT /api/profile
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(patch): Json<ProfilePatch>,
) -> ApiResult<Json<User>> {
    validate_patch(&auth, &patch)?;
    let user = state.store.update_profile(auth.id(), patch).await?;
    Ok(Json(user))
}

/// GET /api/profile/certifications
pub async fn list_certifications(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Certification>>> {
    Ok(Json(state.store.list_certifications(auth.id()).await?))
}

/// POST /api/profile/certifications
pub async fn add_certification(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(new): Json<NewCertification>,
) -> ApiResult<(StatusCode, Json<Certification>)> {
    check_length("name", &new.name, 2, 200)?;
    check_length("issuer", &new.issuer, 2, 200)?;

    let cert = state.store.add_certification(auth.id(), new).await?;
    Ok((StatusCode::CREATED, Json(cert)))
}

/// DELETE /api/profile/certifications/:id
pub async fn delete_certification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_certification(auth.id(), id).await? {
        return Err(ApiError::NotFound("certification".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/profile/education
pub async fn list_education(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Education>>> {
    Ok(Json(state.store.list_education(auth.id()).await?))
}

/// POST /api/profile/education
pub async fn add_education(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(new): Json<NewEducation>,
) -> ApiResult<(StatusCode, Json<Education>)> {
    check_length("school", &new.school, 2, 200)?;
    check_length("degree", &new.degree, 2, 200)?;
    if let (Some(start), Some(end)) = (new.start_year, new.end_year) {
        if end < start {
            return Err(ApiError::ValidationError(
                "end_year must not be before start_year".to_string(),
            ));
        }
    }

    let education = state.store.add_education(auth.id(), new).await?;
    Ok((StatusCode::CREATED, Json(education)))
}

/// DELETE /api/profile/education/:id
pub async fn delete_education(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_education(auth.id(), id).await? {
        return Err(ApiError::NotFound("education".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/freelancers
pub async fn list_freelancers(
    State(state): State<AppState>,
    Query(query): Query<FreelancerQuery>,
) -> ApiResult<Json<Paginated<PublicProfile>>> {
    let (page, limit) = PageQuery { page: query.page, limit: query.limit }.resolve();
    let q = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());

    let found = state.store.search_freelancers(q, page, limit).await?;
    Ok(Json(Paginated::from_page(found, page, limit).map(PublicProfile::from)))
}

/// GET /api/freelancers/:id
pub async fn get_freelancer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FreelancerProfileResponse>> {
    let user = state
        .store
        .find_user(id)
        .await?
        .filter(|u| u.role == Role::Freelancer)
        .ok_or_else(|| ApiError::NotFound("freelancer".to_string()))?;

    let certifications = state.store.list_certifications(id).await?;
    let education = state.store.list_education(id).await?;

    Ok(Json(FreelancerProfileResponse {
        profile: user.into(),
        certifications,
        education,
    }))
}

// ============ Helpers ============

fn validate_patch(auth: &AuthUser, patch: &ProfilePatch) -> ApiResult<()> {
    if let Some(name) = &patch.display_name {
        check_length("display_name", name, 2, 100)?;
    }
    if let Some(headline) = &patch.headline {
        check_length("headline", headline, 0, 200)?;
    }
    if let Some(bio) = &patch.bio {
        check_length("bio", bio, 0, 5000)?;
    }
    if matches!(patch.hourly_rate, Some(rate) if rate < 0) {
        return Err(ApiError::ValidationError(
            "hourly_rate must not be negative".to_string(),
        ));
    }

    // CLIENT ↔ FREELANCER만 허용
    if let Some(role) = patch.role {
        if role == Role::Admin || auth.is_admin() {
            return Err(ApiError::Forbidden("role cannot be changed to or from admin".to_string()));
        }
    }

    Ok(())
}
