//! 라우터 전체를 인메모리 저장소 위에서 호출하는 통합 테스트
//!
//! Redis 없이 프로세스 로컬 rate limit / 캐시로 동작

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use marketplace_api::config::{Config, EmailConfig, Environment};
use marketplace_api::db::{NewUser, User, UserRepository};
use marketplace_api::domain::Role;
use marketplace_api::services::{Mailer, OutgoingEmail};
use marketplace_api::{routes, AppState, MemoryStore, Store};

// ============ Fixtures ============

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

impl RecordingMailer {
    fn last_code(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let text = &sent.last().expect("no email sent").text;
        let start = text.find("code is ").expect("code missing") + "code is ".len();
        text[start..start + 6].to_string()
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    mailer: Arc<RecordingMailer>,
}

fn test_config() -> Config {
    Config {
        port: 0,
        database_url: "postgres://unused".to_string(),
        redis_url: None,
        session_secret: "integration-test-secret".to_string(),
        internal_api_secret: Some("internal-secret".to_string()),
        public_app_url: "http://localhost:5173".to_string(),
        email: EmailConfig {
            api_url: "http://localhost:9/emails".to_string(),
            api_key: None,
            from: "noreply@example.com".to_string(),
        },
        google: None,
        linkedin: None,
        oauth_redirect_base: "http://localhost:5173/auth/callback".to_string(),
        company_registry_url: "http://localhost:9/companies".to_string(),
        address_api_url: "http://localhost:9/addresses".to_string(),
        allowed_origins: Vec::new(),
        environment: Environment::Development,
    }
}

fn test_app() -> TestApp {
    let mailer = Arc::new(RecordingMailer::default());
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let state = AppState::new(test_config(), store, None, mailer.clone()).unwrap();
    TestApp {
        router: routes::build_router(state.clone()),
        state,
        mailer,
    }
}

impl TestApp {
    async fn user(&self, email: &str, role: Role) -> (User, String) {
        let user = self
            .state
            .store
            .create_user(NewUser {
                email: email.to_string(),
                display_name: email.split('@').next().unwrap().to_string(),
                role,
                avatar_url: None,
            })
            .await
            .unwrap();
        let token = tokio_test::assert_ok!(self.state.sessions.issue(user.id, user.role, Utc::now()));
        (user, token)
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.send(request(method, uri, token, body)).await;
        let status = response.status();
        (status, json_body(response).await)
    }
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn mission_body() -> Value {
    json!({
        "title": "Build a landing page",
        "description": "We need a responsive landing page for our product launch.",
        "skills": ["react", "css"],
        "budget_min": 100000,
        "budget_max": 250000
    })
}

fn proposal_body() -> Value {
    json!({
        "price": 200000,
        "timeline_days": 14,
        "message": "I have built many landing pages and can start right away."
    })
}

// ============ Tests ============

#[tokio::test]
async fn test_health_check() {
    let app = test_app();
    let (status, body) = app.call("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["connected"], true);
}

#[tokio::test]
async fn test_mission_to_completed_contract() {
    let app = test_app();
    let (_, client) = app.user("client@example.com", Role::Client).await;
    let (_, freelancer) = app.user("freelancer@example.com", Role::Freelancer).await;
    let (_, admin) = app.user("admin@example.com", Role::Admin).await;

    // 미션 생성 → 검토 대기
    let (status, mission) = app
        .call("POST", "/api/missions", Some(&client), Some(mission_body()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(mission["status"], "PENDING_REVIEW");
    let mission_id = mission["id"].as_str().unwrap().to_string();

    // 공개 목록에는 아직 없음
    let (_, open) = app.call("GET", "/api/missions", None, None).await;
    assert_eq!(open["items"].as_array().unwrap().len(), 0);

    // 관리자 승인 → OPEN
    let (status, approved) = app
        .call(
            "POST",
            &format!("/api/admin/missions/{}/approve", mission_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "OPEN");

    // 제안 제출: 크레딧 1 차감
    let proposals_uri = format!("/api/missions/{}/proposals", mission_id);
    let (status, proposal) = app
        .call("POST", &proposals_uri, Some(&freelancer), Some(proposal_body()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(proposal["status"], "PENDING");
    let proposal_id = proposal["id"].as_str().unwrap().to_string();

    let (_, credits) = app.call("GET", "/api/credits", Some(&freelancer), None).await;
    assert_eq!(credits["balance"], 9);

    // 같은 미션에 두 번째 제안은 거절
    let (status, _) = app
        .call("POST", &proposals_uri, Some(&freelancer), Some(proposal_body()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // 수락 → PENDING 계약, 미션 IN_PROGRESS
    let (status, contract) = app
        .call(
            "POST",
            &format!("/api/proposals/{}/accept", proposal_id),
            Some(&client),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(contract["status"], "PENDING");
    assert_eq!(contract["amount"], 200000);
    let contract_id = contract["id"].as_str().unwrap().to_string();

    let (_, mission) = app
        .call("GET", &format!("/api/missions/{}", mission_id), Some(&client), None)
        .await;
    assert_eq!(mission["status"], "IN_PROGRESS");

    // 양측 서명 → ACTIVE
    let sign_uri = format!("/api/contracts/{}/sign", contract_id);
    let (status, signed) = app.call("POST", &sign_uri, Some(&client), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(signed["status"], "PENDING");
    assert!(signed["start_date"].is_null());

    let (status, signed) = app.call("POST", &sign_uri, Some(&freelancer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(signed["status"], "ACTIVE");
    assert!(signed["start_date"].is_string());

    // 송장: 2 x 1000 + 20% 세금
    let (status, invoice) = app
        .call(
            "POST",
            "/api/invoices",
            Some(&freelancer),
            Some(json!({
                "contract_id": contract_id,
                "items": [{ "description": "Design", "quantity": 2.0, "unit_price": 1000 }],
                "tax_rate": 20.0
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invoice["status"], "DRAFT");
    assert_eq!(invoice["subtotal"], 2000);
    assert_eq!(invoice["tax_amount"], 400);
    assert_eq!(invoice["total_amount"], 2400);
    assert!(invoice["number"].as_str().unwrap().ends_with("-00001"));
    assert_eq!(invoice["items"].as_array().unwrap().len(), 1);

    // 클라이언트 완료 처리
    let (status, completed) = app
        .call(
            "POST",
            &format!("/api/contracts/{}/complete", contract_id),
            Some(&client),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["status"], "COMPLETED");

    let (_, mission) = app
        .call("GET", &format!("/api/missions/{}", mission_id), Some(&client), None)
        .await;
    assert_eq!(mission["status"], "COMPLETED");
}

#[tokio::test]
async fn test_invalid_transition_leaves_status_unchanged() {
    let app = test_app();
    let (_, client) = app.user("client@example.com", Role::Client).await;
    let (_, admin) = app.user("admin@example.com", Role::Admin).await;

    let (_, mission) = app
        .call("POST", "/api/missions", Some(&client), Some(mission_body()))
        .await;
    let mission_uri = format!("/api/missions/{}", mission["id"].as_str().unwrap());
    app.call(
        "POST",
        &format!("/api/admin/missions/{}/approve", mission["id"].as_str().unwrap()),
        Some(&admin),
        None,
    )
    .await;

    let (status, body) = app
        .call("PUT", &mission_uri, Some(&client), Some(json!({ "status": "DRAFT" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (_, mission) = app.call("GET", &mission_uri, Some(&client), None).await;
    assert_eq!(mission["status"], "OPEN");
}

#[tokio::test]
async fn test_authentication_and_roles() {
    let app = test_app();
    let (_, freelancer) = app.user("freelancer@example.com", Role::Freelancer).await;

    let (status, body) = app.call("GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app.call("GET", "/api/auth/me", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call("GET", "/api/admin/stats", Some(&freelancer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    // 프리랜서는 미션을 만들 수 없음
    let (status, _) = app
        .call("POST", "/api/missions", Some(&freelancer), Some(mission_body()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_magic_link_login() {
    let app = test_app();
    let email = "new.freelancer@example.com";

    let (status, body) = app
        .call("POST", "/api/auth/magic-link", None, Some(json!({ "email": email })))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["sent"], true);

    let code = app.mailer.last_code();
    let verify = json!({ "email": email, "code": code, "role": "FREELANCER" });

    let (status, session) = app
        .call("POST", "/api/auth/verify", None, Some(verify.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["user"]["role"], "FREELANCER");
    let token = session["token"].as_str().unwrap().to_string();

    let (status, me) = app.call("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], email);

    // 코드는 한 번만 사용 가능
    let (status, _) = app.call("POST", "/api/auth/verify", None, Some(verify)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 가입 보너스
    let (_, credits) = app.call("GET", "/api/credits", Some(&token), None).await;
    assert_eq!(credits["balance"], 10);
}

#[tokio::test]
async fn test_auth_bucket_rate_limit() {
    let app = test_app();
    let attempt = || {
        let mut req = request(
            "POST",
            "/api/auth/magic-link",
            None,
            Some(json!({ "email": "someone@example.com" })),
        );
        req.headers_mut()
            .insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        req
    };

    for _ in 0..5 {
        let response = app.send(attempt()).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let response = app.send(attempt()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let headers = response.headers();
    assert!(headers.contains_key("retry-after"));
    assert_eq!(headers["x-ratelimit-limit"], "5");
    assert_eq!(headers["x-ratelimit-remaining"], "0");

    let body = json_body(response).await;
    assert_eq!(body["code"], "RATE_LIMITED");

    // 다른 클라이언트는 별도 window
    let mut other = attempt();
    other
        .headers_mut()
        .insert("x-forwarded-for", "198.51.100.2".parse().unwrap());
    assert_eq!(app.send(other).await.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_internal_api_key_access() {
    let app = test_app();
    let (_, admin) = app.user("admin@example.com", Role::Admin).await;

    let (status, created) = app
        .call(
            "POST",
            "/api/admin/api-keys",
            Some(&admin),
            Some(json!({ "service": "registry", "key_value": "sk_live_1234567890abcd" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["masked_value"], "****abcd");

    let (_, listed) = app.call("GET", "/api/admin/api-keys", Some(&admin), None).await;
    assert_eq!(listed[0]["masked_value"], "****abcd");
    assert!(listed[0].get("key_value").is_none());

    let internal = |secret: &str| {
        let mut req = request("GET", "/api/internal/api-keys/registry", None, None);
        req.headers_mut()
            .insert("x-internal-secret", secret.parse().unwrap());
        req
    };

    let response = app.send(internal("wrong-secret")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send(internal("internal-secret")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["key"], "sk_live_1234567890abcd");

    let mut unknown = internal("internal-secret");
    *unknown.uri_mut() = "/api/internal/api-keys/unknown".parse().unwrap();
    assert_eq!(app.send(unknown).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lookup_rejects_short_query() {
    let app = test_app();

    let (status, _) = app.call("GET", "/api/lookup/company?q=ab", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call("GET", "/api/lookup/address", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_catalog_cache_invalidated_on_admin_write() {
    let app = test_app();
    let (_, admin) = app.user("admin@example.com", Role::Admin).await;

    let (status, categories) = app.call("GET", "/api/categories", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(categories.as_array().unwrap().len(), 0);

    let (status, _) = app
        .call(
            "POST",
            "/api/admin/categories",
            Some(&admin),
            Some(json!({
                "slug": "web-development",
                "translations": { "en": "Web development", "fr": "Développement web" }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, categories) = app.call("GET", "/api/categories?locale=fr", None, None).await;
    let categories = categories.as_array().unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0]["slug"], "web-development");
}

#[tokio::test]
async fn test_profile_and_public_freelancer_view() {
    let app = test_app();
    let (freelancer, token) = app.user("dev@example.com", Role::Freelancer).await;

    let (status, _) = app
        .call("PUT", "/api/profile", Some(&token), Some(json!({ "role": "ADMIN" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app
        .call(
            "PUT",
            "/api/profile",
            Some(&token),
            Some(json!({ "headline": "Rust backend developer", "hourly_rate": 9000 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["headline"], "Rust backend developer");

    let (status, _) = app
        .call(
            "POST",
            "/api/profile/certifications",
            Some(&token),
            Some(json!({ "name": "Cloud Practitioner", "issuer": "Example Cloud" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, profile) = app
        .call("GET", &format!("/api/freelancers/{}", freelancer.id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["headline"], "Rust backend developer");
    assert_eq!(profile["certifications"].as_array().unwrap().len(), 1);
    assert!(profile.get("email").is_none());
}

// ============ Contract lifecycle helpers ============

struct Parties {
    client: String,
    freelancer: String,
    admin: String,
}

async fn parties(app: &TestApp) -> Parties {
    let (_, client) = app.user("client@example.com", Role::Client).await;
    let (_, freelancer) = app.user("freelancer@example.com", Role::Freelancer).await;
    let (_, admin) = app.user("admin@example.com", Role::Admin).await;
    Parties { client, freelancer, admin }
}

/// 승인된 미션 → 수락된 제안 → (선택) 양측 서명까지 진행, (mission_id, contract_id) 반환
async fn contract_between(app: &TestApp, p: &Parties, signed: bool) -> (String, String) {
    let (_, mission) = app
        .call("POST", "/api/missions", Some(&p.client), Some(mission_body()))
        .await;
    let mission_id = mission["id"].as_str().unwrap().to_string();
    app.call(
        "POST",
        &format!("/api/admin/missions/{}/approve", mission_id),
        Some(&p.admin),
        None,
    )
    .await;

    let (_, proposal) = app
        .call(
            "POST",
            &format!("/api/missions/{}/proposals", mission_id),
            Some(&p.freelancer),
            Some(proposal_body()),
        )
        .await;
    let (status, contract) = app
        .call(
            "POST",
            &format!("/api/proposals/{}/accept", proposal["id"].as_str().unwrap()),
            Some(&p.client),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let contract_id = contract["id"].as_str().unwrap().to_string();

    if signed {
        let sign_uri = format!("/api/contracts/{}/sign", contract_id);
        app.call("POST", &sign_uri, Some(&p.client), None).await;
        let (_, signed) = app.call("POST", &sign_uri, Some(&p.freelancer), None).await;
        assert_eq!(signed["status"], "ACTIVE");
    }

    (mission_id, contract_id)
}

// ============ Disputes ============

#[tokio::test]
async fn test_dispute_resolved_as_completed_finishes_mission() {
    let app = test_app();
    let p = parties(&app).await;
    let (mission_id, contract_id) = contract_between(&app, &p, true).await;
    let contract_uri = format!("/api/contracts/{}", contract_id);

    // 분쟁 제기 → 계약 DISPUTED
    let (status, dispute) = app
        .call(
            "POST",
            "/api/disputes",
            Some(&p.freelancer),
            Some(json!({
                "contract_id": contract_id,
                "reason": "Unpaid work",
                "description": "The delivered pages were accepted but never paid."
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(dispute["status"], "OPEN");
    let dispute_uri = format!("/api/admin/disputes/{}", dispute["id"].as_str().unwrap());

    let (_, contract) = app.call("GET", &contract_uri, Some(&p.client), None).await;
    assert_eq!(contract["status"], "DISPUTED");

    // 분쟁 중에는 당사자 완료 불가
    let (status, _) = app
        .call("POST", &format!("{}/complete", contract_uri), Some(&p.client), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // 관리자만 처리
    let (status, _) = app
        .call("PUT", &dispute_uri, Some(&p.client), Some(json!({ "status": "UNDER_REVIEW" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, review) = app
        .call("PUT", &dispute_uri, Some(&p.admin), Some(json!({ "status": "UNDER_REVIEW" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(review["status"], "UNDER_REVIEW");

    // 해결 사유 없이 RESOLVED는 거부
    let (status, _) = app
        .call("PUT", &dispute_uri, Some(&p.admin), Some(json!({ "status": "RESOLVED" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, resolved) = app
        .call(
            "PUT",
            &dispute_uri,
            Some(&p.admin),
            Some(json!({
                "status": "RESOLVED",
                "resolution": "Work was delivered, contract closed as completed",
                "contract_outcome": "COMPLETED"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "RESOLVED");
    assert!(resolved["resolved_by"].is_string());

    let (_, contract) = app.call("GET", &contract_uri, Some(&p.client), None).await;
    assert_eq!(contract["status"], "COMPLETED");
    assert!(contract["end_date"].is_string());

    let (_, mission) = app
        .call("GET", &format!("/api/missions/{}", mission_id), Some(&p.client), None)
        .await;
    assert_eq!(mission["status"], "COMPLETED");
}

#[tokio::test]
async fn test_withdrawn_dispute_restores_active_contract() {
    let app = test_app();
    let p = parties(&app).await;
    let (mission_id, contract_id) = contract_between(&app, &p, true).await;
    let contract_uri = format!("/api/contracts/{}", contract_id);

    // PENDING 계약에는 분쟁 불가이므로 ACTIVE 계약으로 진행
    let (_, dispute) = app
        .call(
            "POST",
            "/api/disputes",
            Some(&p.client),
            Some(json!({
                "contract_id": contract_id,
                "reason": "Missed deadline",
                "description": "The first draft was due last week and has not arrived."
            })),
        )
        .await;
    let dispute_uri = format!("/api/admin/disputes/{}", dispute["id"].as_str().unwrap());

    let (status, closed) = app
        .call("PUT", &dispute_uri, Some(&p.admin), Some(json!({ "status": "CLOSED" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "CLOSED");

    let (_, contract) = app.call("GET", &contract_uri, Some(&p.client), None).await;
    assert_eq!(contract["status"], "ACTIVE");
    assert!(contract["end_date"].is_null());

    let (_, mission) = app
        .call("GET", &format!("/api/missions/{}", mission_id), Some(&p.client), None)
        .await;
    assert_eq!(mission["status"], "IN_PROGRESS");

    // 종료된 분쟁은 다시 바꿀 수 없음
    let (status, body) = app
        .call("PUT", &dispute_uri, Some(&p.admin), Some(json!({ "status": "UNDER_REVIEW" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

// ============ Gigs ============

fn gig_body(title: &str, draft: bool) -> Value {
    json!({
        "title": title,
        "description": "Pixel-perfect landing page built with React and Tailwind.",
        "skills": ["react"],
        "price": 50000,
        "delivery_days": 7,
        "draft": draft
    })
}

#[tokio::test]
async fn test_gig_moderation_and_public_list() {
    let app = test_app();
    let p = parties(&app).await;

    let (status, first) = app
        .call("POST", "/api/gigs", Some(&p.freelancer), Some(gig_body("Landing page", false)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["status"], "PENDING_REVIEW");
    let first_id = first["id"].as_str().unwrap().to_string();

    let (_, second) = app
        .call("POST", "/api/gigs", Some(&p.freelancer), Some(gig_body("Logo design", false)))
        .await;
    let second_id = second["id"].as_str().unwrap().to_string();

    let (_, draft) = app
        .call("POST", "/api/gigs", Some(&p.freelancer), Some(gig_body("Draft offer", true)))
        .await;
    assert_eq!(draft["status"], "DRAFT");

    // 승인 전 공개 목록은 비어 있음
    let (_, public) = app.call("GET", "/api/gigs", None, None).await;
    assert_eq!(public["items"].as_array().unwrap().len(), 0);

    let (_, queue) = app.call("GET", "/api/admin/gigs/pending", Some(&p.admin), None).await;
    assert_eq!(queue["items"].as_array().unwrap().len(), 2);

    // 프리랜서는 스스로 승인할 수 없음
    let approve_uri = format!("/api/admin/gigs/{}/approve", first_id);
    let (status, _) = app.call("POST", &approve_uri, Some(&p.freelancer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approved) = app.call("POST", &approve_uri, Some(&p.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "ACTIVE");
    assert_eq!(approved["title"], "Landing page");

    let (status, rejected) = app
        .call(
            "POST",
            &format!("/api/admin/gigs/{}/reject", second_id),
            Some(&p.admin),
            Some(json!({ "reason": "Portfolio samples are missing" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "REJECTED");
    assert_eq!(rejected["rejection_reason"], "Portfolio samples are missing");

    // 이미 처리된 기그를 다시 승인하면 전이 오류
    let (status, _) = app.call("POST", &approve_uri, Some(&p.admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 공개 목록에는 ACTIVE만
    let (_, public) = app.call("GET", "/api/gigs", None, None).await;
    let items = public["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], first_id.as_str());

    let (_, queue) = app.call("GET", "/api/admin/gigs/pending", Some(&p.admin), None).await;
    assert_eq!(queue["items"].as_array().unwrap().len(), 0);
}

// ============ Support tickets ============

#[tokio::test]
async fn test_staff_reply_moves_ticket_in_progress() {
    let app = test_app();
    let p = parties(&app).await;

    let (status, ticket) = app
        .call(
            "POST",
            "/api/tickets",
            Some(&p.client),
            Some(json!({
                "subject": "Cannot download invoice",
                "category": "Billing",
                "message": "The PDF link returns an error."
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ticket["status"], "OPEN");
    assert_eq!(ticket["priority"], "MEDIUM");
    let ticket_uri = format!("/api/tickets/{}", ticket["id"].as_str().unwrap());
    let messages_uri = format!("{}/messages", ticket_uri);

    // 사용자 추가 답글은 상태를 바꾸지 않음
    let (status, _) = app
        .call("POST", &messages_uri, Some(&p.client), Some(json!({ "body": "Any update?" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, detail) = app.call("GET", &ticket_uri, Some(&p.client), None).await;
    assert_eq!(detail["status"], "OPEN");

    // 다른 사용자는 볼 수 없음
    let (status, _) = app.call("GET", &ticket_uri, Some(&p.freelancer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, reply) = app
        .call(
            "POST",
            &messages_uri,
            Some(&p.admin),
            Some(json!({ "body": "We are looking into it." })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["is_staff"], true);

    let (_, detail) = app.call("GET", &ticket_uri, Some(&p.client), None).await;
    assert_eq!(detail["status"], "IN_PROGRESS");
    let messages = detail["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["is_staff"], false);
    assert_eq!(messages[2]["is_staff"], true);
}

// ============ Milestones ============

#[tokio::test]
async fn test_milestone_steps_enforce_actor() {
    let app = test_app();
    let p = parties(&app).await;
    let (_, contract_id) = contract_between(&app, &p, true).await;
    let milestones_uri = format!("/api/contracts/{}/milestones", contract_id);

    let body = json!({ "title": "Wireframes", "amount": 50000 });
    let (status, _) = app
        .call("POST", &milestones_uri, Some(&p.freelancer), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, milestone) = app
        .call("POST", &milestones_uri, Some(&p.client), Some(body))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(milestone["status"], "PENDING");
    let status_uri = format!("/api/milestones/{}/status", milestone["id"].as_str().unwrap());

    // (호출자, 목표 상태, 기대 응답)
    let steps = [
        (&p.client, "IN_PROGRESS", StatusCode::FORBIDDEN),
        (&p.freelancer, "IN_PROGRESS", StatusCode::OK),
        (&p.freelancer, "SUBMITTED", StatusCode::OK),
        (&p.freelancer, "APPROVED", StatusCode::FORBIDDEN),
        // 수정 요청은 클라이언트
        (&p.client, "IN_PROGRESS", StatusCode::OK),
        (&p.freelancer, "SUBMITTED", StatusCode::OK),
        (&p.client, "APPROVED", StatusCode::OK),
        (&p.freelancer, "PAID", StatusCode::FORBIDDEN),
        (&p.client, "PAID", StatusCode::OK),
        (&p.client, "IN_PROGRESS", StatusCode::BAD_REQUEST),
    ];

    let mut current = "PENDING";
    for (token, target, expected) in steps {
        let (status, body) = app
            .call("PUT", &status_uri, Some(token.as_str()), Some(json!({ "status": target })))
            .await;
        assert_eq!(status, expected, "{} -> {}", current, target);
        if status == StatusCode::OK {
            assert_eq!(body["status"], target);
            current = target;
        }
    }

    let (_, list) = app.call("GET", &milestones_uri, Some(&p.freelancer), None).await;
    assert_eq!(list[0]["status"], "PAID");
}

// ============ Proposals ============

#[tokio::test]
async fn test_withdraw_refunds_credit() {
    let app = test_app();
    let p = parties(&app).await;
    let (_, other) = app.user("other@example.com", Role::Freelancer).await;

    let (_, mission) = app
        .call("POST", "/api/missions", Some(&p.client), Some(mission_body()))
        .await;
    let mission_id = mission["id"].as_str().unwrap();
    app.call(
        "POST",
        &format!("/api/admin/missions/{}/approve", mission_id),
        Some(&p.admin),
        None,
    )
    .await;

    let (_, proposal) = app
        .call(
            "POST",
            &format!("/api/missions/{}/proposals", mission_id),
            Some(&p.freelancer),
            Some(proposal_body()),
        )
        .await;
    let withdraw_uri = format!("/api/proposals/{}/withdraw", proposal["id"].as_str().unwrap());

    let (_, credits) = app.call("GET", "/api/credits", Some(&p.freelancer), None).await;
    assert_eq!(credits["balance"], 9);

    let (status, _) = app.call("POST", &withdraw_uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, withdrawn) = app.call("POST", &withdraw_uri, Some(&p.freelancer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(withdrawn["status"], "WITHDRAWN");

    let (_, credits) = app.call("GET", "/api/credits", Some(&p.freelancer), None).await;
    assert_eq!(credits["balance"], 10);

    // 두 번째 철회는 전이 오류, 환불도 한 번만
    let (status, body) = app.call("POST", &withdraw_uri, Some(&p.freelancer), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (_, credits) = app.call("GET", "/api/credits", Some(&p.freelancer), None).await;
    assert_eq!(credits["balance"], 10);
}

// ============ Invoices ============

#[tokio::test]
async fn test_invoice_rounds_half_cents_and_rejects_overflow() {
    let app = test_app();
    let p = parties(&app).await;
    let (_, contract_id) = contract_between(&app, &p, true).await;

    let (status, invoice) = app
        .call(
            "POST",
            "/api/invoices",
            Some(&p.freelancer),
            Some(json!({
                "contract_id": contract_id,
                "items": [{ "description": "Consulting", "quantity": 0.145, "unit_price": 100 }],
                "tax_rate": 0
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invoice["subtotal"], 15);
    assert_eq!(invoice["items"][0]["amount"], 15);
    assert_eq!(invoice["items"][0]["quantity"], 0.145);

    let (status, body) = app
        .call(
            "POST",
            "/api/invoices",
            Some(&p.freelancer),
            Some(json!({
                "contract_id": contract_id,
                "items": [{ "description": "Everything", "quantity": 2, "unit_price": i64::MAX }],
                "tax_rate": 20
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}
