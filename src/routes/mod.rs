//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/api/auth/*` - 로그인 (magic link, OAuth), 현재 사용자
//! - `/api/profile/*`, `/api/freelancers/*` - 프로필
//! - `/api/categories`, `/api/skills` - 카탈로그
//! - `/api/missions/*`, `/api/proposals/*` - 미션 / 제안
//! - `/api/contracts/*`, `/api/milestones/*` - 계약 / 마일스톤
//! - `/api/invoices/*`, `/api/credits/*` - 송장 / 크레딧
//! - `/api/gigs/*` - 고정가 서비스
//! - `/api/disputes/*`, `/api/tickets/*` - 분쟁 / 지원
//! - `/api/conversations/*` - 메시지
//! - `/api/search`, `/api/lookup/*` - 검색 / 외부 조회
//! - `/api/admin/*` - 관리자
//! - `/api/internal/*` - 내부 서비스 (공유 비밀)
//!
//! # Rate limits
//!
//! ```text
//! /api/*                      api     100/min
//! /api/auth/* (me 제외)       auth      5/min
//! /api/search, /api/lookup/*  search   30/min
//! 생성 POST                   submit   10/min
//! ```

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod contracts;
pub mod credits;
pub mod disputes;
pub mod gigs;
pub mod health;
pub mod invoices;
pub mod messages;
pub mod missions;
pub mod profile;
pub mod proposals;
pub mod search;
pub mod tickets;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::rate_limiter::{self, Bucket, RateLimitLayer};
use crate::AppState;

/// 라우터 생성
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state);

    let auth_limit = middleware::from_fn_with_state(
        RateLimitLayer::new(state.limiter.clone(), Bucket::Auth),
        rate_limiter::enforce,
    );
    let search_limit = middleware::from_fn_with_state(
        RateLimitLayer::new(state.limiter.clone(), Bucket::Search),
        rate_limiter::enforce,
    );
    let submit_limit = middleware::from_fn_with_state(
        RateLimitLayer::new(state.limiter.clone(), Bucket::Submit),
        rate_limiter::enforce,
    );
    let api_limit = middleware::from_fn_with_state(
        RateLimitLayer::new(state.limiter.clone(), Bucket::Api),
        rate_limiter::enforce,
    );

    // 로그인 시도
    let login = Router::new()
        .route("/auth/magic-link", post(auth::request_magic_link))
        .route("/auth/verify", post(auth::verify_code))
        .route("/auth/oauth/:provider/url", get(auth::oauth_url))
        .route("/auth/oauth/:provider/callback", post(auth::oauth_callback))
        .route_layer(auth_limit);

    let lookups = Router::new()
        .route("/search", get(search::search))
        .route("/lookup/company", get(search::lookup_company))
        .route("/lookup/address", get(search::lookup_address))
        .route_layer(search_limit);

    let api = Router::new()
        .merge(login)
        .route("/auth/me", get(auth::me))
        .merge(lookups)

        // Profile
        .route("/profile", put(profile::update_profile))
        .route(
            "/profile/certifications",
            get(profile::list_certifications).post(profile::add_certification),
        )
        .route("/profile/certifications/:id", delete(profile::delete_certification))
        .route(
            "/profile/education",
            get(profile::list_education).post(profile::add_education),
        )
        .route("/profile/education/:id", delete(profile::delete_education))
        .route("/freelancers", get(profile::list_freelancers))
        .route("/freelancers/:id", get(profile::get_freelancer))

        // Catalog
        .route("/categories", get(catalog::list_categories))
        .route("/skills", get(catalog::list_skills))

        // Missions & proposals
        .route(
            "/missions",
            get(missions::list_missions)
                .merge(post(missions::create_mission).layer(submit_limit.clone())),
        )
        .route("/missions/mine", get(missions::list_my_missions))
        .route(
            "/missions/:id",
            get(missions::get_mission)
                .put(missions::update_mission)
                .delete(missions::delete_mission),
        )
        .route(
            "/missions/:id/proposals",
            get(proposals::list_for_mission)
                .merge(post(proposals::submit_proposal).layer(submit_limit.clone())),
        )
        .route("/proposals/mine", get(proposals::list_mine))
        .route("/proposals/:id/accept", post(proposals::accept_proposal))
        .route("/proposals/:id/reject", post(proposals::reject_proposal))
        .route("/proposals/:id/withdraw", post(proposals::withdraw_proposal))

        // Contracts & milestones
        .route("/contracts", get(contracts::list_contracts))
        .route("/contracts/:id", get(contracts::get_contract))
        .route("/contracts/:id/sign", post(contracts::sign_contract))
        .route("/contracts/:id/complete", post(contracts::complete_contract))
        .route("/contracts/:id/cancel", post(contracts::cancel_contract))
        .route(
            "/contracts/:id/milestones",
            get(contracts::list_milestones).post(contracts::create_milestone),
        )
        .route("/milestones/:id/status", put(contracts::update_milestone_status))

        // Invoices & credits
        .route(
            "/invoices",
            get(invoices::list_invoices)
                .merge(post(invoices::create_invoice).layer(submit_limit.clone())),
        )
        .route("/invoices/:id", get(invoices::get_invoice))
        .route("/invoices/:id/send", post(invoices::send_invoice))
        .route("/invoices/:id/cancel", post(invoices::cancel_invoice))
        .route("/invoices/:id/pay", post(invoices::mark_paid))
        .route("/invoices/:id/overdue", post(invoices::mark_overdue))
        .route("/credits", get(credits::get_balance))
        .route("/credits/transactions", get(credits::list_transactions))

        // Gigs
        .route(
            "/gigs",
            get(gigs::list_gigs).merge(post(gigs::create_gig).layer(submit_limit.clone())),
        )
        .route("/gigs/mine", get(gigs::list_my_gigs))
        .route("/gigs/:id", get(gigs::get_gig).put(gigs::update_gig))

        // Disputes & support
        .route(
            "/disputes",
            get(disputes::list_disputes)
                .merge(post(disputes::open_dispute).layer(submit_limit.clone())),
        )
        .route("/disputes/:id", get(disputes::get_dispute))
        .route(
            "/tickets",
            get(tickets::list_tickets)
                .merge(post(tickets::create_ticket).layer(submit_limit.clone())),
        )
        .route("/tickets/:id", get(tickets::get_ticket))
        .route(
            "/tickets/:id/messages",
            post(tickets::reply).layer(submit_limit.clone()),
        )
        .route("/tickets/:id/close", post(tickets::close_ticket))

        // Messaging
        .route(
            "/conversations",
            get(messages::list_conversations)
                .merge(post(messages::start_conversation).layer(submit_limit.clone())),
        )
        .route(
            "/conversations/:id/messages",
            get(messages::list_messages)
                .merge(post(messages::send_message).layer(submit_limit)),
        )
        .route("/conversations/:id/read", post(messages::mark_read))

        // Admin
        .route("/admin/stats", get(admin::stats))
        .route("/admin/missions/pending", get(admin::pending_missions))
        .route("/admin/missions/:id/approve", post(admin::approve_mission))
        .route("/admin/missions/:id/reject", post(admin::reject_mission))
        .route("/admin/gigs/pending", get(admin::pending_gigs))
        .route("/admin/gigs/:id/approve", post(admin::approve_gig))
        .route("/admin/gigs/:id/reject", post(admin::reject_gig))
        .route("/admin/categories", post(admin::create_category))
        .route("/admin/categories/:id", put(admin::update_category))
        .route("/admin/skills", post(admin::create_skill))
        .route("/admin/credits/grant", post(admin::grant_credits))
        .route(
            "/admin/api-keys",
            get(admin::list_api_keys).post(admin::create_api_key),
        )
        .route("/admin/api-keys/:id", delete(admin::delete_api_key))
        .route("/admin/disputes/:id", put(disputes::update_dispute))
        .route("/admin/tickets/:id/status", put(tickets::set_ticket_status))

        // Internal
        .route("/internal/api-keys/:service", get(admin::internal_api_key))

        .route_layer(api_limit);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .nest("/api", api)

        // 미들웨어
        .layer(TraceLayer::new_for_http())
        .layer(cors)

        // 상태 주입
        .with_state(state)
}

/// CORS 설정
///
/// - 프로덕션: `ALLOWED_ORIGINS`에 있는 도메인만
/// - 개발: localhost 프론트엔드 허용
fn cors_layer(state: &AppState) -> CorsLayer {
    if state.config.is_production() {
        let origins: Vec<HeaderValue> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|s| s.trim().parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        CorsLayer::new()
            .allow_origin([
                HeaderValue::from_static("http://localhost:5173"), // Vite dev server
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:5173"),
            ])
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
