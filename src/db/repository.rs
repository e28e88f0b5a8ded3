//! Repository Pattern Implementation
//!
//! # Interview Q&A
//!
//! Q: 왜 trait로 분리했는가?
//! A: 핸들러가 저장소 구현을 모르게 하기 위해
//!    - PostgreSQL 구현: `Database` (db/mod.rs)
//!    - 인메모리 구현: `MemoryStore` (db/memory.rs), 라우터 테스트와 로컬 실행용
//!    - `AppState`는 `Arc<dyn Store>`만 들고 있음
//!
//! Q: 여러 테이블을 건드리는 작업은?
//! A: 트랜잭션이 필요한 작업은 repository 메서드 하나로 노출
//!    - `submit_proposal`: 제안서 insert + 크레딧 차감
//!    - `accept_proposal`: 제안 수락 + 나머지 거절 + 미션 IN_PROGRESS + 계약 생성
//!    - `complete_contract`: 계약 + 미션 COMPLETED
//!    - `open_dispute`: 분쟁 insert + 계약 DISPUTED
//!    - `send_message`: 메시지 insert + last_message_at + unread 카운터
//!
//! Q: 동시 수정은?
//! A: 상태 변경은 전부 compare-and-set (`WHERE status = expected`)
//!    - 상태만 바꾸는 작업(승인, 거절, 취소)은 해당 컬럼만 UPDATE
//!    - 행 전체를 다시 쓰는 작업(owner 편집, 분쟁 처리)은 읽은 `updated_at`까지 비교
//!    - 서명은 한 문장 UPDATE (상대 서명을 덮어쓰지 않음)
//!    - 매칭되는 행이 없으면 `StoreError::StaleState` → 409

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::*;
use super::StoreResult;
use crate::domain::{
    ContractStatus, DisputeStatus, GigStatus, InvoiceStatus, MilestoneStatus, MissionStatus,
    ProposalStatus, Role, TicketStatus,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// 프리랜서는 가입 보너스 크레딧을 같은 트랜잭션에서 적립
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;
    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> StoreResult<User>;
    async fn search_freelancers(
        &self,
        query: Option<&str>,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<User>>;

    async fn list_certifications(&self, user_id: Uuid) -> StoreResult<Vec<Certification>>;
    async fn add_certification(
        &self,
        user_id: Uuid,
        new: NewCertification,
    ) -> StoreResult<Certification>;
    async fn delete_certification(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool>;

    async fn list_education(&self, user_id: Uuid) -> StoreResult<Vec<Education>>;
    async fn add_education(&self, user_id: Uuid, new: NewEducation) -> StoreResult<Education>;
    async fn delete_education(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool>;

    /// 이메일당 코드는 하나만 유효 (기존 코드 교체)
    async fn save_login_code(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// 일치하고 만료되지 않았으면 삭제 후 true
    async fn consume_login_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait MissionRepository: Send + Sync {
    async fn create_mission(&self, new: NewMission) -> StoreResult<Mission>;
    async fn find_mission(&self, id: Uuid) -> StoreResult<Option<Mission>>;
    async fn list_missions(&self, filter: &MissionFilter) -> StoreResult<Page<Mission>>;
    /// 전체 행 저장, `expected` 상태이고 `mission.updated_at`이 저장된 값과 같을 때만
    async fn update_mission(
        &self,
        mission: &Mission,
        expected: MissionStatus,
    ) -> StoreResult<Mission>;
    /// 상태와 거절 사유만 변경
    async fn set_mission_status(
        &self,
        id: Uuid,
        expected: MissionStatus,
        next: MissionStatus,
        rejection_reason: Option<String>,
    ) -> StoreResult<Mission>;
    async fn delete_mission(&self, id: Uuid, expected: MissionStatus) -> StoreResult<()>;
}

#[async_trait]
pub trait GigRepository: Send + Sync {
    async fn create_gig(&self, new: NewGig) -> StoreResult<Gig>;
    async fn find_gig(&self, id: Uuid) -> StoreResult<Option<Gig>>;
    async fn list_gigs(&self, filter: &GigFilter) -> StoreResult<Page<Gig>>;
    /// `update_mission`과 같은 버전 비교
    async fn update_gig(&self, gig: &Gig, expected: GigStatus) -> StoreResult<Gig>;
    async fn set_gig_status(
        &self,
        id: Uuid,
        expected: GigStatus,
        next: GigStatus,
        rejection_reason: Option<String>,
    ) -> StoreResult<Gig>;
}

#[async_trait]
pub trait ContractRepository: Send + Sync {
    /// 중복 제출 → Conflict, 잔액 부족 → InsufficientCredits
    async fn submit_proposal(&self, new: NewProposal, credit_cost: i64) -> StoreResult<Proposal>;
    async fn find_proposal(&self, id: Uuid) -> StoreResult<Option<Proposal>>;
    async fn list_proposals_for_mission(&self, mission_id: Uuid) -> StoreResult<Vec<Proposal>>;
    async fn list_proposals_by_freelancer(
        &self,
        freelancer_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Proposal>>;
    async fn update_proposal_status(
        &self,
        id: Uuid,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> StoreResult<Proposal>;
    /// PENDING → WITHDRAWN + 크레딧 환불
    async fn withdraw_proposal(&self, id: Uuid, refund: i64) -> StoreResult<Proposal>;
    /// 수락 트랜잭션, 생성된 PENDING 계약 반환
    async fn accept_proposal(&self, proposal_id: Uuid) -> StoreResult<Contract>;

    async fn find_contract(&self, id: Uuid) -> StoreResult<Option<Contract>>;
    async fn list_contracts_for_user(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Contract>>;
    /// PENDING 계약에 `party` 서명 기록, 상대가 이미 서명했으면 같은 문장에서
    /// ACTIVE + `start_date = now`. 이미 서명했거나 PENDING이 아니면 StaleState
    async fn sign_contract(&self, id: Uuid, party: Role, now: DateTime<Utc>) -> StoreResult<Contract>;
    /// `expected` → CANCELLED, `end_date = now`
    async fn cancel_contract(
        &self,
        id: Uuid,
        expected: ContractStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Contract>;
    /// 계약 ACTIVE → COMPLETED, 미션 IN_PROGRESS → COMPLETED
    async fn complete_contract(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Contract>;

    async fn create_milestone(&self, new: NewMilestone) -> StoreResult<Milestone>;
    async fn find_milestone(&self, id: Uuid) -> StoreResult<Option<Milestone>>;
    async fn list_milestones(&self, contract_id: Uuid) -> StoreResult<Vec<Milestone>>;
    async fn update_milestone_status(
        &self,
        id: Uuid,
        expected: MilestoneStatus,
        next: MilestoneStatus,
    ) -> StoreResult<Milestone>;
}

#[async_trait]
pub trait BillingRepository: Send + Sync {
    /// 번호 할당 + 송장/항목 insert
    async fn create_invoice(&self, new: NewInvoice) -> StoreResult<InvoiceWithItems>;
    async fn find_invoice(&self, id: Uuid) -> StoreResult<Option<InvoiceWithItems>>;
    async fn list_invoices_for_user(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Invoice>>;
    async fn update_invoice_status(
        &self,
        id: Uuid,
        expected: InvoiceStatus,
        next: InvoiceStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Invoice>;

    async fn credit_balance(&self, user_id: Uuid) -> StoreResult<i64>;
    async fn list_credit_transactions(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<CreditTransaction>>;
    async fn add_credit_transaction(
        &self,
        new: NewCreditTransaction,
    ) -> StoreResult<CreditTransaction>;
}

#[async_trait]
pub trait SupportRepository: Send + Sync {
    /// 분쟁 insert + 계약 ACTIVE → DISPUTED
    async fn open_dispute(&self, new: NewDispute) -> StoreResult<Dispute>;
    async fn find_dispute(&self, id: Uuid) -> StoreResult<Option<Dispute>>;
    /// `party`가 있으면 해당 사용자가 당사자인 분쟁만
    async fn list_disputes(
        &self,
        party: Option<Uuid>,
        status: Option<DisputeStatus>,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Dispute>>;
    /// 분쟁 저장 (`updated_at` 버전 비교), `contract_outcome`이 있으면 같은 트랜잭션에서
    /// 계약 DISPUTED → outcome. COMPLETED / CANCELLED는 `end_date`를 기록하고
    /// COMPLETED는 미션도 IN_PROGRESS → COMPLETED
    async fn update_dispute(
        &self,
        dispute: &Dispute,
        expected: DisputeStatus,
        contract_outcome: Option<ContractStatus>,
    ) -> StoreResult<Dispute>;

    /// 티켓 + 첫 메시지
    async fn create_ticket(&self, new: NewTicket) -> StoreResult<SupportTicket>;
    async fn find_ticket(&self, id: Uuid) -> StoreResult<Option<SupportTicket>>;
    async fn list_tickets(
        &self,
        owner: Option<Uuid>,
        status: Option<TicketStatus>,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<SupportTicket>>;
    async fn add_ticket_message(
        &self,
        ticket_id: Uuid,
        author_id: Uuid,
        body: &str,
        is_staff: bool,
    ) -> StoreResult<TicketMessage>;
    async fn list_ticket_messages(&self, ticket_id: Uuid) -> StoreResult<Vec<TicketMessage>>;
    async fn update_ticket_status(
        &self,
        id: Uuid,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> StoreResult<SupportTicket>;
}

#[async_trait]
pub trait MessagingRepository: Send + Sync {
    async fn find_or_create_conversation(
        &self,
        a: Uuid,
        b: Uuid,
        mission_id: Option<Uuid>,
    ) -> StoreResult<Conversation>;
    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>>;
    async fn list_conversations(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>>;
    /// 메시지 insert + last_message_at + 상대방 unread +1 (한 트랜잭션)
    async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> StoreResult<Message>;
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Message>>;
    async fn mark_conversation_read(&self, conversation_id: Uuid, user_id: Uuid)
        -> StoreResult<()>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn list_skills(&self) -> StoreResult<Vec<Skill>>;
    async fn create_category(&self, new: NewCategory) -> StoreResult<Category>;
    async fn update_category(&self, id: Uuid, patch: CategoryPatch) -> StoreResult<Category>;
    async fn create_skill(&self, new: NewSkill) -> StoreResult<Skill>;
}

#[async_trait]
pub trait AdminRepository: Send + Sync {
    async fn list_api_keys(&self) -> StoreResult<Vec<ServiceApiKey>>;
    async fn create_api_key(&self, new: NewApiKey) -> StoreResult<ServiceApiKey>;
    async fn delete_api_key(&self, id: Uuid) -> StoreResult<bool>;
    async fn find_api_key_by_service(&self, service: &str) -> StoreResult<Option<ServiceApiKey>>;
    async fn stats(&self) -> StoreResult<AdminStats>;
    async fn health_check(&self) -> StoreResult<()>;
}

/// 전체 저장소 (AppState가 들고 있는 trait object)
pub trait Store:
    UserRepository
    + MissionRepository
    + GigRepository
    + ContractRepository
    + BillingRepository
    + SupportRepository
    + MessagingRepository
    + CatalogRepository
    + AdminRepository
{
}

impl<T> Store for T where
    T: UserRepository
        + MissionRepository
        + GigRepository
        + ContractRepository
        + BillingRepository
        + SupportRepository
        + MessagingRepository
        + CatalogRepository
        + AdminRepository
{
}
