//! Catalog Endpoints
//!
//! 카테고리 트리 / 스킬 목록 (locale별, 캐시 경유)

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::services::cache::{normalize_locale, CategoryNode, SkillView};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LocaleQuery {
    pub locale: Option<String>,
}

/// GET /api/categories?locale=fr
pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<LocaleQuery>,
) -> ApiResult<Json<Vec<CategoryNode>>> {
    let locale = normalize_locale(query.locale.as_deref());
    let tree = state.catalog.categories(state.store.as_ref(), locale).await?;
    Ok(Json(tree))
}

/// GET /api/skills?locale=fr
pub async fn list_skills(
    State(state): State<AppState>,
    Query(query): Query<LocaleQuery>,
) -> ApiResult<Json<Vec<SkillView>>> {
    let locale = normalize_locale(query.locale.as_deref());
    let skills = state.catalog.skills(state.store.as_ref(), locale).await?;
    Ok(Json(skills))
}
