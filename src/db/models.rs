//! Database Models
//!
//! Row types (`sqlx::FromRow`) and the input structs the repositories accept.
//! Money columns are cents (`BIGINT`), quantities and tax rates are `NUMERIC`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

use crate::domain::{
    ContractStatus, CreditKind, DisputeStatus, GigStatus, InvoiceStatus, InvoiceTotals,
    MilestoneStatus, MissionStatus, PricedLine, ProposalStatus, Role, TicketPriority,
    TicketStatus,
};

/// 페이지 결과 (items + 전체 개수)
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self { items: Vec::new(), total: 0 }
    }
}

// ============ Users / profiles ============

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub headline: Option<String>,
    pub bio: Option<String>,
    /// 시간당 단가 (cents)
    pub hourly_rate: Option<i64>,
    pub skills: Vec<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub headline: Option<String>,
    pub bio: Option<String>,
    pub hourly_rate: Option<i64>,
    pub skills: Option<Vec<String>>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Certification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub issuer: String,
    pub issued_on: Option<NaiveDate>,
    pub credential_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCertification {
    pub name: String,
    pub issuer: String,
    pub issued_on: Option<NaiveDate>,
    pub credential_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Education {
    pub id: Uuid,
    pub user_id: Uuid,
    pub school: String,
    pub degree: String,
    pub field_of_study: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEducation {
    pub school: String,
    pub degree: String,
    pub field_of_study: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

// ============ Missions / gigs ============

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Mission {
    pub id: Uuid,
    pub client_id: Uuid,
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub skills: Vec<String>,
    pub budget_min: i64,
    pub budget_max: i64,
    pub deadline: Option<NaiveDate>,
    pub status: MissionStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMission {
    pub client_id: Uuid,
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub skills: Vec<String>,
    pub budget_min: i64,
    pub budget_max: i64,
    pub deadline: Option<NaiveDate>,
    pub status: MissionStatus,
}

#[derive(Debug, Clone, Default)]
pub struct MissionFilter {
    pub status: Option<MissionStatus>,
    pub client_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub query: Option<String>,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Gig {
    pub id: Uuid,
    pub freelancer_id: Uuid,
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub skills: Vec<String>,
    pub price: i64,
    pub delivery_days: i32,
    pub status: GigStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGig {
    pub freelancer_id: Uuid,
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub skills: Vec<String>,
    pub price: i64,
    pub delivery_days: i32,
    pub status: GigStatus,
}

#[derive(Debug, Clone, Default)]
pub struct GigFilter {
    pub status: Option<GigStatus>,
    pub freelancer_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub query: Option<String>,
    pub page: u32,
    pub limit: u32,
}

// ============ Proposals / contracts / milestones ============

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Proposal {
    pub id: Uuid,
    pub mission_id: Uuid,
    pub freelancer_id: Uuid,
    /// 제안 금액 (cents)
    pub price: i64,
    pub timeline_days: i32,
    pub message: String,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProposal {
    pub mission_id: Uuid,
    pub freelancer_id: Uuid,
    pub price: i64,
    pub timeline_days: i32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Contract {
    pub id: Uuid,
    pub mission_id: Uuid,
    pub proposal_id: Uuid,
    pub client_id: Uuid,
    pub freelancer_id: Uuid,
    pub amount: i64,
    pub status: ContractStatus,
    pub client_signed_at: Option<DateTime<Utc>>,
    pub freelancer_signed_at: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.client_id == user_id || self.freelancer_id == user_id
    }

    pub fn is_fully_signed(&self) -> bool {
        self.client_signed_at.is_some() && self.freelancer_signed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Milestone {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub title: String,
    pub amount: i64,
    pub due_date: Option<NaiveDate>,
    pub status: MilestoneStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMilestone {
    pub contract_id: Uuid,
    pub title: String,
    pub amount: i64,
    pub due_date: Option<NaiveDate>,
}

// ============ Billing ============

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub number: String,
    pub contract_id: Uuid,
    /// 발행자 (프리랜서)
    pub issuer_id: Uuid,
    /// 수신자 (클라이언트)
    pub recipient_id: Uuid,
    pub status: InvoiceStatus,
    pub subtotal: i64,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub tax_rate: Decimal,
    pub tax_amount: i64,
    pub total_amount: i64,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub position: i32,
    pub description: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub quantity: Decimal,
    pub unit_price: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub contract_id: Uuid,
    pub issuer_id: Uuid,
    pub recipient_id: Uuid,
    /// 라우트에서 금액을 확정한 항목
    pub lines: Vec<PricedLine>,
    pub tax_rate: Decimal,
    pub totals: InvoiceTotals,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    /// 양수: 적립, 음수: 사용
    pub amount: i64,
    pub kind: CreditKind,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCreditTransaction {
    pub user_id: Uuid,
    pub amount: i64,
    pub kind: CreditKind,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
}

// ============ Disputes / support ============

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Dispute {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub client_id: Uuid,
    pub freelancer_id: Uuid,
    pub opened_by: Uuid,
    pub reason: String,
    pub description: String,
    pub status: DisputeStatus,
    pub resolution: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDispute {
    pub contract_id: Uuid,
    pub opened_by: Uuid,
    pub reason: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SupportTicket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub category: String,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub user_id: Uuid,
    pub subject: String,
    pub category: String,
    pub priority: TicketPriority,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

// ============ Messaging ============

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    /// 항상 participant_a < participant_b
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub mission_id: Option<Uuid>,
    pub unread_a: i32,
    pub unread_b: i32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    pub fn unread_for(&self, user_id: Uuid) -> i32 {
        if user_id == self.participant_a {
            self.unread_a
        } else if user_id == self.participant_b {
            self.unread_b
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

// ============ Catalog ============

/// locale → 표시 이름
pub type Translations = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub slug: String,
    pub position: i32,
    pub translations: Json<Translations>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub parent_id: Option<Uuid>,
    pub slug: String,
    #[serde(default)]
    pub position: i32,
    pub translations: Translations,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    pub parent_id: Option<Uuid>,
    pub slug: Option<String>,
    pub position: Option<i32>,
    pub translations: Option<Translations>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Skill {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub slug: String,
    pub translations: Json<Translations>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSkill {
    pub category_id: Option<Uuid>,
    pub slug: String,
    pub translations: Translations,
}

// ============ Admin ============

/// 외부 서비스 자격 증명 (관리자가 등록, 내부 서비스에 배포)
#[derive(Debug, Clone, FromRow)]
pub struct ServiceApiKey {
    pub id: Uuid,
    pub service: String,
    pub key_value: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub service: String,
    pub key_value: String,
    pub description: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AdminStats {
    pub users_by_role: BTreeMap<String, i64>,
    pub missions_by_status: BTreeMap<String, i64>,
    pub pending_gigs: i64,
    pub open_disputes: i64,
    pub open_tickets: i64,
}
