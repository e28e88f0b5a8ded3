//! Search & Lookup Endpoints
//!
//! - `/api/search`: 공개 미션(OPEN), gig(ACTIVE), 프리랜서 프로필 부분 일치 검색
//! - `/api/lookup/*`: 회사 등록부 / 주소 검색 프록시

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{Gig, GigFilter, GigRepository, Mission, MissionFilter, MissionRepository, UserRepository};
use crate::domain::{GigStatus, MissionStatus};
use crate::error::ApiResult;
use crate::routes::profile::PublicProfile;
use crate::services::registry::{validate_query, AddressSummary, CompanySummary};
use crate::types::{PageQuery, Paginated};
use crate::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    Missions,
    Gigs,
    Freelancers,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    #[serde(default)]
    pub kind: SearchKind,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// 종류와 관계없이 `{items, pagination}` 모양
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SearchResults {
    Missions(Paginated<Mission>),
    Gigs(Paginated<Gig>),
    Freelancers(Paginated<PublicProfile>),
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub q: Option<String>,
}

/// GET /api/search?q=&kind=missions|gigs|freelancers
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResults>> {
    let (page, limit) = PageQuery { page: query.page, limit: query.limit }.resolve();
    let text = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string);

    let results = match query.kind {
        SearchKind::Missions => {
            let filter = MissionFilter {
                status: Some(MissionStatus::Open),
                query: text,
                page,
                limit,
                ..Default::default()
            };
            let found = state.store.list_missions(&filter).await?;
            SearchResults::Missions(Paginated::from_page(found, page, limit))
        }
        SearchKind::Gigs => {
            let filter = GigFilter {
                status: Some(GigStatus::Active),
                query: text,
                page,
                limit,
                ..Default::default()
            };
            let found = state.store.list_gigs(&filter).await?;
            SearchResults::Gigs(Paginated::from_page(found, page, limit))
        }
        SearchKind::Freelancers => {
            let found = state
                .store
                .search_freelancers(text.as_deref(), page, limit)
                .await?;
            SearchResults::Freelancers(
                Paginated::from_page(found, page, limit).map(PublicProfile::from),
            )
        }
    };

    Ok(Json(results))
}

/// GET /api/lookup/company?q=
pub async fn lookup_company(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> ApiResult<Json<Vec<CompanySummary>>> {
    let q = validate_query(query.q.as_deref())?;
    Ok(Json(state.registry.search_companies(&q).await?))
}

/// GET /api/lookup/address?q=
pub async fn lookup_address(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> ApiResult<Json<Vec<AddressSummary>>> {
    let q = validate_query(query.q.as_deref())?;
    Ok(Json(state.registry.search_addresses(&q).await?))
}
