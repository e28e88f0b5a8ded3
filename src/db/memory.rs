//! In-memory store
//!
//! `Store`의 모든 trait를 PostgreSQL 구현과 같은 의미로 구현
//! (가입 보너스, compare-and-set, 유니크 충돌, 트랜잭션 단위 변경).
//!
//! 라우터 테스트와 DATABASE_URL 없이 띄우는 로컬 실행에 사용.
//! 하나의 Mutex 아래에서 변경하므로 각 메서드가 곧 하나의 트랜잭션.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use super::messaging::ordered_pair;
use super::models::*;
use super::repository::*;
use super::{StoreError, StoreResult};
use crate::domain::{
    format_invoice_number, ContractStatus, CreditKind, DisputeStatus,
    GigStatus, InvoiceStatus, MilestoneStatus, MissionStatus, ProposalStatus, Role,
    TicketStatus, WELCOME_CREDITS,
};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    certifications: Vec<Certification>,
    education: Vec<Education>,
    login_codes: HashMap<String, (String, DateTime<Utc>)>,
    missions: Vec<Mission>,
    gigs: Vec<Gig>,
    proposals: Vec<Proposal>,
    contracts: Vec<Contract>,
    milestones: Vec<Milestone>,
    invoice_counters: HashMap<i32, i64>,
    invoices: Vec<Invoice>,
    invoice_items: Vec<InvoiceItem>,
    credits: Vec<CreditTransaction>,
    disputes: Vec<Dispute>,
    tickets: Vec<SupportTicket>,
    ticket_messages: Vec<TicketMessage>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    categories: Vec<Category>,
    skills: Vec<Skill>,
    api_keys: Vec<ServiceApiKey>,
}

impl Inner {
    fn balance(&self, user_id: Uuid) -> i64 {
        self.credits
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.amount)
            .sum()
    }

    fn push_credit(
        &mut self,
        user_id: Uuid,
        amount: i64,
        kind: CreditKind,
        reference_id: Option<Uuid>,
        note: Option<String>,
    ) -> CreditTransaction {
        let row = CreditTransaction {
            id: Uuid::new_v4(),
            user_id,
            amount,
            kind,
            reference_id,
            note,
            created_at: Utc::now(),
        };
        self.credits.push(row.clone());
        row
    }

    fn user_exists(&self, id: Uuid) -> bool {
        self.users.iter().any(|u| u.id == id)
    }
}

/// 최신순 정렬 + 페이지 자르기 (insert 순서가 곧 created_at 순서)
fn newest_first<T: Clone>(rows: Vec<&T>, page: u32, limit: u32) -> Page<T> {
    let total = rows.len() as i64;
    let items = rows
        .into_iter()
        .rev()
        .skip(page as usize * limit as usize)
        .take(limit as usize)
        .cloned()
        .collect();
    Page { items, total }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// `updated_at` 버전 증가, 같은 시각 안의 두 번째 쓰기도 다른 값이 되도록 최소 1µs 전진
fn next_version(prev: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(prev + chrono::Duration::microseconds(1))
}

/// 인메모리 저장소
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // 패닉으로 poison 되어도 데이터는 그대로 사용
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_lowercase();
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut inner = self.lock();
        let email = new.email.to_lowercase();

        if inner.users.iter().any(|u| u.email == email) {
            return Err(StoreError::Conflict(format!("email {} already registered", email)));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            display_name: new.display_name,
            role: new.role,
            headline: None,
            bio: None,
            hourly_rate: None,
            skills: Vec::new(),
            avatar_url: new.avatar_url,
            created_at: now,
            updated_at: now,
        };
        inner.users.push(user.clone());

        if user.role == Role::Freelancer {
            inner.push_credit(
                user.id,
                WELCOME_CREDITS,
                CreditKind::Welcome,
                None,
                Some("welcome bonus".to_string()),
            );
        }

        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> StoreResult<User> {
        let mut inner = self.lock();
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound("user"))?;

        if let Some(display_name) = patch.display_name {
            user.display_name = display_name;
        }
        if let Some(headline) = patch.headline {
            user.headline = Some(headline);
        }
        if let Some(bio) = patch.bio {
            user.bio = Some(bio);
        }
        if let Some(rate) = patch.hourly_rate {
            user.hourly_rate = Some(rate);
        }
        if let Some(skills) = patch.skills {
            user.skills = skills;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn search_freelancers(
        &self,
        query: Option<&str>,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<User>> {
        let inner = self.lock();
        let rows = inner
            .users
            .iter()
            .filter(|u| u.role == Role::Freelancer)
            .filter(|u| match query {
                None => true,
                Some(q) => {
                    contains_ci(&u.display_name, q)
                        || u.headline.as_deref().map_or(false, |h| contains_ci(h, q))
                        || contains_ci(&u.skills.join(" "), q)
                }
            })
            .collect();
        Ok(newest_first(rows, page, limit))
    }

    async fn list_certifications(&self, user_id: Uuid) -> StoreResult<Vec<Certification>> {
        let inner = self.lock();
        let mut rows: Vec<Certification> = inner
            .certifications
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.issued_on.cmp(&a.issued_on));
        Ok(rows)
    }

    async fn add_certification(
        &self,
        user_id: Uuid,
        new: NewCertification,
    ) -> StoreResult<Certification> {
        let mut inner = self.lock();
        if !inner.user_exists(user_id) {
            return Err(StoreError::NotFound("referenced resource"));
        }
        let row = Certification {
            id: Uuid::new_v4(),
            user_id,
            name: new.name,
            issuer: new.issuer,
            issued_on: new.issued_on,
            credential_url: new.credential_url,
            created_at: Utc::now(),
        };
        inner.certifications.push(row.clone());
        Ok(row)
    }

    async fn delete_certification(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.lock();
        let before = inner.certifications.len();
        inner
            .certifications
            .retain(|c| !(c.id == id && c.user_id == user_id));
        Ok(inner.certifications.len() < before)
    }

    async fn list_education(&self, user_id: Uuid) -> StoreResult<Vec<Education>> {
        let inner = self.lock();
        let mut rows: Vec<Education> = inner
            .education
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.start_year.cmp(&a.start_year));
        Ok(rows)
    }

    async fn add_education(&self, user_id: Uuid, new: NewEducation) -> StoreResult<Education> {
        let mut inner = self.lock();
        if !inner.user_exists(user_id) {
            return Err(StoreError::NotFound("referenced resource"));
        }
        let row = Education {
            id: Uuid::new_v4(),
            user_id,
            school: new.school,
            degree: new.degree,
            field_of_study: new.field_of_study,
            start_year: new.start_year,
            end_year: new.end_year,
            created_at: Utc::now(),
        };
        inner.education.push(row.clone());
        Ok(row)
    }

    async fn delete_education(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.lock();
        let before = inner.education.len();
        inner.education.retain(|e| !(e.id == id && e.user_id == user_id));
        Ok(inner.education.len() < before)
    }

    async fn save_login_code(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.lock()
            .login_codes
            .insert(email.to_lowercase(), (code_hash.to_string(), expires_at));
        Ok(())
    }

    async fn consume_login_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        let email = email.to_lowercase();
        let valid = matches!(
            inner.login_codes.get(&email),
            Some((hash, expires_at)) if hash == code_hash && *expires_at > now
        );
        if valid {
            inner.login_codes.remove(&email);
        }
        Ok(valid)
    }
}

#[async_trait]
impl MissionRepository for MemoryStore {
    async fn create_mission(&self, new: NewMission) -> StoreResult<Mission> {
        let mut inner = self.lock();
        if !inner.user_exists(new.client_id) {
            return Err(StoreError::NotFound("referenced resource"));
        }
        let now = Utc::now();
        let mission = Mission {
            id: Uuid::new_v4(),
            client_id: new.client_id,
            title: new.title,
            description: new.description,
            category_id: new.category_id,
            skills: new.skills,
            budget_min: new.budget_min,
            budget_max: new.budget_max,
            deadline: new.deadline,
            status: new.status,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };
        inner.missions.push(mission.clone());
        Ok(mission)
    }

    async fn find_mission(&self, id: Uuid) -> StoreResult<Option<Mission>> {
        Ok(self.lock().missions.iter().find(|m| m.id == id).cloned())
    }

    async fn list_missions(&self, filter: &MissionFilter) -> StoreResult<Page<Mission>> {
        let inner = self.lock();
        let rows = inner
            .missions
            .iter()
            .filter(|m| filter.status.map_or(true, |s| m.status == s))
            .filter(|m| filter.client_id.map_or(true, |c| m.client_id == c))
            .filter(|m| filter.category_id.map_or(true, |c| m.category_id == Some(c)))
            .filter(|m| {
                filter.query.as_deref().map_or(true, |q| {
                    contains_ci(&m.title, q) || contains_ci(&m.description, q)
                })
            })
            .collect();
        Ok(newest_first(rows, filter.page, filter.limit))
    }

    async fn update_mission(
        &self,
        mission: &Mission,
        expected: MissionStatus,
    ) -> StoreResult<Mission> {
        let mut inner = self.lock();
        let row = inner
            .missions
            .iter_mut()
            .find(|m| {
                m.id == mission.id && m.status == expected && m.updated_at == mission.updated_at
            })
            .ok_or_else(|| StoreError::StaleState("mission".to_string()))?;

        let created_at = row.created_at;
        let version = next_version(row.updated_at);
        *row = mission.clone();
        row.created_at = created_at;
        row.updated_at = version;
        Ok(row.clone())
    }

    async fn set_mission_status(
        &self,
        id: Uuid,
        expected: MissionStatus,
        next: MissionStatus,
        rejection_reason: Option<String>,
    ) -> StoreResult<Mission> {
        let mut inner = self.lock();
        let row = inner
            .missions
            .iter_mut()
            .find(|m| m.id == id && m.status == expected)
            .ok_or_else(|| StoreError::StaleState("mission".to_string()))?;

        row.status = next;
        row.rejection_reason = rejection_reason;
        row.updated_at = next_version(row.updated_at);
        Ok(row.clone())
    }

    async fn delete_mission(&self, id: Uuid, expected: MissionStatus) -> StoreResult<()> {
        let mut inner = self.lock();
        let before = inner.missions.len();
        inner.missions.retain(|m| !(m.id == id && m.status == expected));
        if inner.missions.len() == before {
            return Err(StoreError::StaleState("mission".to_string()));
        }
        inner.proposals.retain(|p| p.mission_id != id);
        Ok(())
    }
}

#[async_trait]
impl GigRepository for MemoryStore {
    async fn create_gig(&self, new: NewGig) -> StoreResult<Gig> {
        let mut inner = self.lock();
        if !inner.user_exists(new.freelancer_id) {
            return Err(StoreError::NotFound("referenced resource"));
        }
        let now = Utc::now();
        let gig = Gig {
            id: Uuid::new_v4(),
            freelancer_id: new.freelancer_id,
            title: new.title,
            description: new.description,
            category_id: new.category_id,
            skills: new.skills,
            price: new.price,
            delivery_days: new.delivery_days,
            status: new.status,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };
        inner.gigs.push(gig.clone());
        Ok(gig)
    }

    async fn find_gig(&self, id: Uuid) -> StoreResult<Option<Gig>> {
        Ok(self.lock().gigs.iter().find(|g| g.id == id).cloned())
    }

    async fn list_gigs(&self, filter: &GigFilter) -> StoreResult<Page<Gig>> {
        let inner = self.lock();
        let rows = inner
            .gigs
            .iter()
            .filter(|g| filter.status.map_or(true, |s| g.status == s))
            .filter(|g| filter.freelancer_id.map_or(true, |f| g.freelancer_id == f))
            .filter(|g| filter.category_id.map_or(true, |c| g.category_id == Some(c)))
            .filter(|g| {
                filter.query.as_deref().map_or(true, |q| {
                    contains_ci(&g.title, q) || contains_ci(&g.description, q)
                })
            })
            .collect();
        Ok(newest_first(rows, filter.page, filter.limit))
    }

    async fn update_gig(&self, gig: &Gig, expected: GigStatus) -> StoreResult<Gig> {
        let mut inner = self.lock();
        let row = inner
            .gigs
            .iter_mut()
            .find(|g| g.id == gig.id && g.status == expected && g.updated_at == gig.updated_at)
            .ok_or_else(|| StoreError::StaleState("gig".to_string()))?;

        let created_at = row.created_at;
        let version = next_version(row.updated_at);
        *row = gig.clone();
        row.created_at = created_at;
        row.updated_at = version;
        Ok(row.clone())
    }

    async fn set_gig_status(
        &self,
        id: Uuid,
        expected: GigStatus,
        next: GigStatus,
        rejection_reason: Option<String>,
    ) -> StoreResult<Gig> {
        let mut inner = self.lock();
        let row = inner
            .gigs
            .iter_mut()
            .find(|g| g.id == id && g.status == expected)
            .ok_or_else(|| StoreError::StaleState("gig".to_string()))?;

        row.status = next;
        row.rejection_reason = rejection_reason;
        row.updated_at = next_version(row.updated_at);
        Ok(row.clone())
    }
}

#[async_trait]
impl ContractRepository for MemoryStore {
    async fn submit_proposal(&self, new: NewProposal, credit_cost: i64) -> StoreResult<Proposal> {
        let mut inner = self.lock();

        if !inner.user_exists(new.freelancer_id) {
            return Err(StoreError::NotFound("user"));
        }
        if !inner.missions.iter().any(|m| m.id == new.mission_id) {
            return Err(StoreError::NotFound("referenced resource"));
        }
        if inner.balance(new.freelancer_id) < credit_cost {
            return Err(StoreError::InsufficientCredits);
        }
        if inner
            .proposals
            .iter()
            .any(|p| p.mission_id == new.mission_id && p.freelancer_id == new.freelancer_id)
        {
            return Err(StoreError::Conflict(
                "proposal already submitted for this mission".to_string(),
            ));
        }

        let now = Utc::now();
        let proposal = Proposal {
            id: Uuid::new_v4(),
            mission_id: new.mission_id,
            freelancer_id: new.freelancer_id,
            price: new.price,
            timeline_days: new.timeline_days,
            message: new.message,
            status: ProposalStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        inner.proposals.push(proposal.clone());

        if credit_cost > 0 {
            inner.push_credit(
                proposal.freelancer_id,
                -credit_cost,
                CreditKind::ProposalSpend,
                Some(proposal.id),
                None,
            );
        }

        Ok(proposal)
    }

    async fn find_proposal(&self, id: Uuid) -> StoreResult<Option<Proposal>> {
        Ok(self.lock().proposals.iter().find(|p| p.id == id).cloned())
    }

    async fn list_proposals_for_mission(&self, mission_id: Uuid) -> StoreResult<Vec<Proposal>> {
        Ok(self
            .lock()
            .proposals
            .iter()
            .filter(|p| p.mission_id == mission_id)
            .cloned()
            .collect())
    }

    async fn list_proposals_by_freelancer(
        &self,
        freelancer_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Proposal>> {
        let inner = self.lock();
        let rows = inner
            .proposals
            .iter()
            .filter(|p| p.freelancer_id == freelancer_id)
            .collect();
        Ok(newest_first(rows, page, limit))
    }

    async fn update_proposal_status(
        &self,
        id: Uuid,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> StoreResult<Proposal> {
        let mut inner = self.lock();
        let row = inner
            .proposals
            .iter_mut()
            .find(|p| p.id == id && p.status == expected)
            .ok_or_else(|| StoreError::StaleState("proposal".to_string()))?;
        row.status = next;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn withdraw_proposal(&self, id: Uuid, refund: i64) -> StoreResult<Proposal> {
        let mut inner = self.lock();
        let row = inner
            .proposals
            .iter_mut()
            .find(|p| p.id == id && p.status == ProposalStatus::Pending)
            .ok_or_else(|| StoreError::StaleState("proposal".to_string()))?;
        row.status = ProposalStatus::Withdrawn;
        row.updated_at = Utc::now();
        let proposal = row.clone();

        if refund > 0 {
            inner.push_credit(
                proposal.freelancer_id,
                refund,
                CreditKind::ProposalRefund,
                Some(proposal.id),
                None,
            );
        }

        Ok(proposal)
    }

    async fn accept_proposal(&self, proposal_id: Uuid) -> StoreResult<Contract> {
        let mut inner = self.lock();

        // 변경 전에 모든 조건 확인 (부분 적용 없음)
        let proposal = inner
            .proposals
            .iter()
            .find(|p| p.id == proposal_id && p.status == ProposalStatus::Pending)
            .cloned()
            .ok_or_else(|| StoreError::StaleState("proposal".to_string()))?;

        let mission_idx = inner
            .missions
            .iter()
            .position(|m| m.id == proposal.mission_id && m.status == MissionStatus::Open)
            .ok_or_else(|| StoreError::StaleState("mission".to_string()))?;

        let now = Utc::now();

        let mission = &mut inner.missions[mission_idx];
        mission.status = MissionStatus::InProgress;
        mission.updated_at = now;
        let client_id = mission.client_id;

        for p in inner.proposals.iter_mut() {
            if p.mission_id != proposal.mission_id || p.status != ProposalStatus::Pending {
                continue;
            }
            p.status = if p.id == proposal.id {
                ProposalStatus::Accepted
            } else {
                ProposalStatus::Rejected
            };
            p.updated_at = now;
        }

        let contract = Contract {
            id: Uuid::new_v4(),
            mission_id: proposal.mission_id,
            proposal_id: proposal.id,
            client_id,
            freelancer_id: proposal.freelancer_id,
            amount: proposal.price,
            status: ContractStatus::Pending,
            client_signed_at: None,
            freelancer_signed_at: None,
            start_date: None,
            end_date: None,
            created_at: now,
            updated_at: now,
        };
        inner.contracts.push(contract.clone());

        Ok(contract)
    }

    async fn find_contract(&self, id: Uuid) -> StoreResult<Option<Contract>> {
        Ok(self.lock().contracts.iter().find(|c| c.id == id).cloned())
    }

    async fn list_contracts_for_user(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Contract>> {
        let inner = self.lock();
        let rows = inner.contracts.iter().filter(|c| c.is_party(user_id)).collect();
        Ok(newest_first(rows, page, limit))
    }

    async fn sign_contract(
        &self,
        id: Uuid,
        party: Role,
        now: DateTime<Utc>,
    ) -> StoreResult<Contract> {
        let mut inner = self.lock();
        let row = inner
            .contracts
            .iter_mut()
            .find(|c| c.id == id && c.status == ContractStatus::Pending)
            .ok_or_else(|| StoreError::StaleState("contract".to_string()))?;

        let own = if party == Role::Client {
            &mut row.client_signed_at
        } else {
            &mut row.freelancer_signed_at
        };
        if own.is_some() {
            return Err(StoreError::StaleState("contract".to_string()));
        }
        *own = Some(now);

        if row.is_fully_signed() {
            row.status = ContractStatus::Active;
            row.start_date = Some(now);
        }
        row.updated_at = next_version(row.updated_at);
        Ok(row.clone())
    }

    async fn cancel_contract(
        &self,
        id: Uuid,
        expected: ContractStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Contract> {
        let mut inner = self.lock();
        let row = inner
            .contracts
            .iter_mut()
            .find(|c| c.id == id && c.status == expected)
            .ok_or_else(|| StoreError::StaleState("contract".to_string()))?;

        row.status = ContractStatus::Cancelled;
        row.end_date = Some(now);
        row.updated_at = next_version(row.updated_at);
        Ok(row.clone())
    }

    async fn complete_contract(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Contract> {
        let mut inner = self.lock();

        let contract_idx = inner
            .contracts
            .iter()
            .position(|c| c.id == id && c.status == ContractStatus::Active)
            .ok_or_else(|| StoreError::StaleState("contract".to_string()))?;
        let mission_id = inner.contracts[contract_idx].mission_id;

        let mission_idx = inner
            .missions
            .iter()
            .position(|m| m.id == mission_id && m.status == MissionStatus::InProgress)
            .ok_or_else(|| StoreError::StaleState("mission".to_string()))?;

        let mission = &mut inner.missions[mission_idx];
        mission.status = MissionStatus::Completed;
        mission.updated_at = now;

        let contract = &mut inner.contracts[contract_idx];
        contract.status = ContractStatus::Completed;
        contract.end_date = Some(now);
        contract.updated_at = now;
        Ok(contract.clone())
    }

    async fn create_milestone(&self, new: NewMilestone) -> StoreResult<Milestone> {
        let mut inner = self.lock();
        if !inner.contracts.iter().any(|c| c.id == new.contract_id) {
            return Err(StoreError::NotFound("referenced resource"));
        }
        let now = Utc::now();
        let milestone = Milestone {
            id: Uuid::new_v4(),
            contract_id: new.contract_id,
            title: new.title,
            amount: new.amount,
            due_date: new.due_date,
            status: MilestoneStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        inner.milestones.push(milestone.clone());
        Ok(milestone)
    }

    async fn find_milestone(&self, id: Uuid) -> StoreResult<Option<Milestone>> {
        Ok(self.lock().milestones.iter().find(|m| m.id == id).cloned())
    }

    async fn list_milestones(&self, contract_id: Uuid) -> StoreResult<Vec<Milestone>> {
        let inner = self.lock();
        let mut rows: Vec<Milestone> = inner
            .milestones
            .iter()
            .filter(|m| m.contract_id == contract_id)
            .cloned()
            .collect();
        // NULLS LAST
        rows.sort_by_key(|m| (m.due_date.is_none(), m.due_date));
        Ok(rows)
    }

    async fn update_milestone_status(
        &self,
        id: Uuid,
        expected: MilestoneStatus,
        next: MilestoneStatus,
    ) -> StoreResult<Milestone> {
        let mut inner = self.lock();
        let row = inner
            .milestones
            .iter_mut()
            .find(|m| m.id == id && m.status == expected)
            .ok_or_else(|| StoreError::StaleState("milestone".to_string()))?;
        row.status = next;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

#[async_trait]
impl BillingRepository for MemoryStore {
    async fn create_invoice(&self, new: NewInvoice) -> StoreResult<InvoiceWithItems> {
        let mut inner = self.lock();
        if !inner.contracts.iter().any(|c| c.id == new.contract_id) {
            return Err(StoreError::NotFound("referenced resource"));
        }

        let totals = new.totals;
        let now = Utc::now();
        let year = now.year();

        let counter = inner.invoice_counters.entry(year).or_insert(0);
        *counter += 1;
        let sequence = *counter;

        let invoice = Invoice {
            id: Uuid::new_v4(),
            number: format_invoice_number(year, sequence),
            contract_id: new.contract_id,
            issuer_id: new.issuer_id,
            recipient_id: new.recipient_id,
            status: InvoiceStatus::Draft,
            subtotal: totals.subtotal,
            tax_rate: new.tax_rate,
            tax_amount: totals.tax_amount,
            total_amount: totals.total_amount,
            due_date: new.due_date,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };

        let items: Vec<InvoiceItem> = new
            .lines
            .iter()
            .enumerate()
            .map(|(position, line)| InvoiceItem {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                position: position as i32,
                description: line.description.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                amount: line.amount,
            })
            .collect();

        inner.invoices.push(invoice.clone());
        inner.invoice_items.extend(items.iter().cloned());

        Ok(InvoiceWithItems { invoice, items })
    }

    async fn find_invoice(&self, id: Uuid) -> StoreResult<Option<InvoiceWithItems>> {
        let inner = self.lock();
        let invoice = match inner.invoices.iter().find(|i| i.id == id) {
            Some(invoice) => invoice.clone(),
            None => return Ok(None),
        };
        let mut items: Vec<InvoiceItem> = inner
            .invoice_items
            .iter()
            .filter(|item| item.invoice_id == id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.position);
        Ok(Some(InvoiceWithItems { invoice, items }))
    }

    async fn list_invoices_for_user(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Invoice>> {
        let inner = self.lock();
        let rows = inner
            .invoices
            .iter()
            .filter(|i| i.issuer_id == user_id || i.recipient_id == user_id)
            .collect();
        Ok(newest_first(rows, page, limit))
    }

    async fn update_invoice_status(
        &self,
        id: Uuid,
        expected: InvoiceStatus,
        next: InvoiceStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Invoice> {
        let mut inner = self.lock();
        let row = inner
            .invoices
            .iter_mut()
            .find(|i| i.id == id && i.status == expected)
            .ok_or_else(|| StoreError::StaleState("invoice".to_string()))?;
        row.status = next;
        if paid_at.is_some() {
            row.paid_at = paid_at;
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn credit_balance(&self, user_id: Uuid) -> StoreResult<i64> {
        Ok(self.lock().balance(user_id))
    }

    async fn list_credit_transactions(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<CreditTransaction>> {
        let inner = self.lock();
        let rows = inner.credits.iter().filter(|t| t.user_id == user_id).collect();
        Ok(newest_first(rows, page, limit))
    }

    async fn add_credit_transaction(
        &self,
        new: NewCreditTransaction,
    ) -> StoreResult<CreditTransaction> {
        let mut inner = self.lock();
        if !inner.user_exists(new.user_id) {
            return Err(StoreError::NotFound("referenced resource"));
        }
        Ok(inner.push_credit(new.user_id, new.amount, new.kind, new.reference_id, new.note))
    }
}

#[async_trait]
impl SupportRepository for MemoryStore {
    async fn open_dispute(&self, new: NewDispute) -> StoreResult<Dispute> {
        let mut inner = self.lock();
        let now = Utc::now();

        let contract = inner
            .contracts
            .iter_mut()
            .find(|c| c.id == new.contract_id && c.status == ContractStatus::Active)
            .ok_or_else(|| StoreError::StaleState("contract".to_string()))?;
        contract.status = ContractStatus::Disputed;
        contract.updated_at = now;
        let (client_id, freelancer_id) = (contract.client_id, contract.freelancer_id);

        let dispute = Dispute {
            id: Uuid::new_v4(),
            contract_id: new.contract_id,
            client_id,
            freelancer_id,
            opened_by: new.opened_by,
            reason: new.reason,
            description: new.description,
            status: DisputeStatus::Open,
            resolution: None,
            resolved_by: None,
            created_at: now,
            updated_at: now,
        };
        inner.disputes.push(dispute.clone());
        Ok(dispute)
    }

    async fn find_dispute(&self, id: Uuid) -> StoreResult<Option<Dispute>> {
        Ok(self.lock().disputes.iter().find(|d| d.id == id).cloned())
    }

    async fn list_disputes(
        &self,
        party: Option<Uuid>,
        status: Option<DisputeStatus>,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Dispute>> {
        let inner = self.lock();
        let rows = inner
            .disputes
            .iter()
            .filter(|d| party.map_or(true, |p| d.client_id == p || d.freelancer_id == p))
            .filter(|d| status.map_or(true, |s| d.status == s))
            .collect();
        Ok(newest_first(rows, page, limit))
    }

    async fn update_dispute(
        &self,
        dispute: &Dispute,
        expected: DisputeStatus,
        contract_outcome: Option<ContractStatus>,
    ) -> StoreResult<Dispute> {
        let mut inner = self.lock();
        let now = Utc::now();

        let dispute_idx = inner
            .disputes
            .iter()
            .position(|d| {
                d.id == dispute.id && d.status == expected && d.updated_at == dispute.updated_at
            })
            .ok_or_else(|| StoreError::StaleState("dispute".to_string()))?;

        if let Some(outcome) = contract_outcome {
            let contract_id = inner.disputes[dispute_idx].contract_id;
            let contract_idx = inner
                .contracts
                .iter()
                .position(|c| c.id == contract_id && c.status == ContractStatus::Disputed)
                .ok_or_else(|| StoreError::StaleState("contract".to_string()))?;
            let mission_id = inner.contracts[contract_idx].mission_id;

            // 검증을 모두 끝낸 뒤 변경 (실패 시 부분 반영 없음)
            let mission_idx = if outcome == ContractStatus::Completed {
                let idx = inner
                    .missions
                    .iter()
                    .position(|m| m.id == mission_id && m.status == MissionStatus::InProgress)
                    .ok_or_else(|| StoreError::StaleState("mission".to_string()))?;
                Some(idx)
            } else {
                None
            };

            if let Some(idx) = mission_idx {
                let mission = &mut inner.missions[idx];
                mission.status = MissionStatus::Completed;
                mission.updated_at = now;
            }

            let contract = &mut inner.contracts[contract_idx];
            contract.status = outcome;
            if matches!(outcome, ContractStatus::Completed | ContractStatus::Cancelled) {
                contract.end_date = Some(now);
            }
            contract.updated_at = now;
        }

        let row = &mut inner.disputes[dispute_idx];
        row.status = dispute.status;
        row.resolution = dispute.resolution.clone();
        row.resolved_by = dispute.resolved_by;
        row.updated_at = next_version(row.updated_at);
        Ok(row.clone())
    }

    async fn create_ticket(&self, new: NewTicket) -> StoreResult<SupportTicket> {
        let mut inner = self.lock();
        if !inner.user_exists(new.user_id) {
            return Err(StoreError::NotFound("referenced resource"));
        }
        let now = Utc::now();
        let ticket = SupportTicket {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            subject: new.subject,
            category: new.category,
            priority: new.priority,
            status: TicketStatus::Open,
            created_at: now,
            updated_at: now,
        };
        inner.tickets.push(ticket.clone());
        inner.ticket_messages.push(TicketMessage {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            author_id: new.user_id,
            body: new.message,
            is_staff: false,
            created_at: now,
        });
        Ok(ticket)
    }

    async fn find_ticket(&self, id: Uuid) -> StoreResult<Option<SupportTicket>> {
        Ok(self.lock().tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn list_tickets(
        &self,
        owner: Option<Uuid>,
        status: Option<TicketStatus>,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<SupportTicket>> {
        let inner = self.lock();
        let mut rows: Vec<&SupportTicket> = inner
            .tickets
            .iter()
            .filter(|t| owner.map_or(true, |o| t.user_id == o))
            .filter(|t| status.map_or(true, |s| t.status == s))
            .collect();
        // newest_first가 뒤집으므로 오름차순으로 정렬
        rows.sort_by_key(|t| t.updated_at);
        Ok(newest_first(rows, page, limit))
    }

    async fn add_ticket_message(
        &self,
        ticket_id: Uuid,
        author_id: Uuid,
        body: &str,
        is_staff: bool,
    ) -> StoreResult<TicketMessage> {
        let mut inner = self.lock();
        let now = Utc::now();
        let ticket = inner
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket_id)
            .ok_or(StoreError::NotFound("referenced resource"))?;
        ticket.updated_at = now;

        let message = TicketMessage {
            id: Uuid::new_v4(),
            ticket_id,
            author_id,
            body: body.to_string(),
            is_staff,
            created_at: now,
        };
        inner.ticket_messages.push(message.clone());
        Ok(message)
    }

    async fn list_ticket_messages(&self, ticket_id: Uuid) -> StoreResult<Vec<TicketMessage>> {
        Ok(self
            .lock()
            .ticket_messages
            .iter()
            .filter(|m| m.ticket_id == ticket_id)
            .cloned()
            .collect())
    }

    async fn update_ticket_status(
        &self,
        id: Uuid,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> StoreResult<SupportTicket> {
        let mut inner = self.lock();
        let row = inner
            .tickets
            .iter_mut()
            .find(|t| t.id == id && t.status == expected)
            .ok_or_else(|| StoreError::StaleState("ticket".to_string()))?;
        row.status = next;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

#[async_trait]
impl MessagingRepository for MemoryStore {
    async fn find_or_create_conversation(
        &self,
        a: Uuid,
        b: Uuid,
        mission_id: Option<Uuid>,
    ) -> StoreResult<Conversation> {
        let (participant_a, participant_b) = ordered_pair(a, b);
        let mut inner = self.lock();

        if let Some(existing) = inner.conversations.iter().find(|c| {
            c.participant_a == participant_a
                && c.participant_b == participant_b
                && c.mission_id == mission_id
        }) {
            return Ok(existing.clone());
        }

        if !inner.user_exists(participant_a) || !inner.user_exists(participant_b) {
            return Err(StoreError::NotFound("referenced resource"));
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            participant_a,
            participant_b,
            mission_id,
            unread_a: 0,
            unread_b: 0,
            last_message_at: None,
            created_at: Utc::now(),
        };
        inner.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self.lock().conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn list_conversations(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let inner = self.lock();
        let mut rows: Vec<Conversation> = inner
            .conversations
            .iter()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        rows.sort_by(|x, y| {
            y.last_message_at
                .cmp(&x.last_message_at)
                .then(y.created_at.cmp(&x.created_at))
        });
        Ok(rows)
    }

    async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> StoreResult<Message> {
        let mut inner = self.lock();
        let now = Utc::now();

        let conversation = inner
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or(StoreError::NotFound("conversation"))?;

        if sender_id == conversation.participant_a {
            conversation.unread_b += 1;
        } else if sender_id == conversation.participant_b {
            conversation.unread_a += 1;
        }
        conversation.last_message_at = Some(now);

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            body: body.to_string(),
            created_at: now,
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Message>> {
        let inner = self.lock();
        let rows = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        Ok(newest_first(rows, page, limit))
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        if let Some(conversation) = inner
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            if conversation.participant_a == user_id {
                conversation.unread_a = 0;
            }
            if conversation.participant_b == user_id {
                conversation.unread_b = 0;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut rows = self.lock().categories.clone();
        rows.sort_by(|a, b| a.position.cmp(&b.position).then(a.slug.cmp(&b.slug)));
        Ok(rows)
    }

    async fn list_skills(&self) -> StoreResult<Vec<Skill>> {
        let mut rows = self.lock().skills.clone();
        rows.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(rows)
    }

    async fn create_category(&self, new: NewCategory) -> StoreResult<Category> {
        let mut inner = self.lock();
        if inner.categories.iter().any(|c| c.slug == new.slug) {
            return Err(StoreError::Conflict(format!("category slug {} exists", new.slug)));
        }
        let row = Category {
            id: Uuid::new_v4(),
            parent_id: new.parent_id,
            slug: new.slug,
            position: new.position,
            translations: sqlx::types::Json(new.translations),
        };
        inner.categories.push(row.clone());
        Ok(row)
    }

    async fn update_category(&self, id: Uuid, patch: CategoryPatch) -> StoreResult<Category> {
        let mut inner = self.lock();

        if let Some(slug) = &patch.slug {
            if inner.categories.iter().any(|c| &c.slug == slug && c.id != id) {
                return Err(StoreError::Conflict(format!("category slug {} exists", slug)));
            }
        }

        let row = inner
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::NotFound("category"))?;

        if let Some(parent_id) = patch.parent_id {
            row.parent_id = Some(parent_id);
        }
        if let Some(slug) = patch.slug {
            row.slug = slug;
        }
        if let Some(position) = patch.position {
            row.position = position;
        }
        if let Some(translations) = patch.translations {
            row.translations = sqlx::types::Json(translations);
        }
        Ok(row.clone())
    }

    async fn create_skill(&self, new: NewSkill) -> StoreResult<Skill> {
        let mut inner = self.lock();
        if inner.skills.iter().any(|s| s.slug == new.slug) {
            return Err(StoreError::Conflict(format!("skill slug {} exists", new.slug)));
        }
        let row = Skill {
            id: Uuid::new_v4(),
            category_id: new.category_id,
            slug: new.slug,
            translations: sqlx::types::Json(new.translations),
        };
        inner.skills.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl AdminRepository for MemoryStore {
    async fn list_api_keys(&self) -> StoreResult<Vec<ServiceApiKey>> {
        let mut rows = self.lock().api_keys.clone();
        rows.sort_by(|a, b| a.service.cmp(&b.service));
        Ok(rows)
    }

    async fn create_api_key(&self, new: NewApiKey) -> StoreResult<ServiceApiKey> {
        let mut inner = self.lock();
        if inner.api_keys.iter().any(|k| k.service == new.service) {
            return Err(StoreError::Conflict(format!(
                "api key for {} already exists",
                new.service
            )));
        }
        let row = ServiceApiKey {
            id: Uuid::new_v4(),
            service: new.service,
            key_value: new.key_value,
            description: new.description,
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        inner.api_keys.push(row.clone());
        Ok(row)
    }

    async fn delete_api_key(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.lock();
        let before = inner.api_keys.len();
        inner.api_keys.retain(|k| k.id != id);
        Ok(inner.api_keys.len() < before)
    }

    async fn find_api_key_by_service(&self, service: &str) -> StoreResult<Option<ServiceApiKey>> {
        Ok(self
            .lock()
            .api_keys
            .iter()
            .find(|k| k.service == service)
            .cloned())
    }

    async fn stats(&self) -> StoreResult<AdminStats> {
        let inner = self.lock();
        let mut stats = AdminStats::default();

        for user in &inner.users {
            *stats
                .users_by_role
                .entry(user.role.as_str().to_string())
                .or_insert(0) += 1;
        }
        for mission in &inner.missions {
            *stats
                .missions_by_status
                .entry(mission.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats.pending_gigs = inner
            .gigs
            .iter()
            .filter(|g| g.status == GigStatus::PendingReview)
            .count() as i64;
        stats.open_disputes = inner
            .disputes
            .iter()
            .filter(|d| matches!(d.status, DisputeStatus::Open | DisputeStatus::UnderReview))
            .count() as i64;
        stats.open_tickets = inner
            .tickets
            .iter()
            .filter(|t| !matches!(t.status, TicketStatus::Resolved | TicketStatus::Closed))
            .count() as i64;

        Ok(stats)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    async fn freelancer(store: &MemoryStore, email: &str) -> User {
        store
            .create_user(NewUser {
                email: email.to_string(),
                display_name: "Freelancer".to_string(),
                role: Role::Freelancer,
                avatar_url: None,
            })
            .await
            .unwrap()
    }

    async fn client(store: &MemoryStore) -> User {
        store
            .create_user(NewUser {
                email: "client@example.com".to_string(),
                display_name: "Client".to_string(),
                role: Role::Client,
                avatar_url: None,
            })
            .await
            .unwrap()
    }

    async fn open_mission(store: &MemoryStore, client_id: Uuid) -> Mission {
        store
            .create_mission(NewMission {
                client_id,
                title: "Build an API".to_string(),
                description: "Rust backend".to_string(),
                category_id: None,
                skills: vec!["rust".to_string()],
                budget_min: 100_000,
                budget_max: 200_000,
                deadline: None,
                status: MissionStatus::Open,
            })
            .await
            .unwrap()
    }

    fn proposal(mission_id: Uuid, freelancer_id: Uuid) -> NewProposal {
        NewProposal {
            mission_id,
            freelancer_id,
            price: 150_000,
            timeline_days: 14,
            message: "I can do it".to_string(),
        }
    }

    #[tokio::test]
    async fn test_welcome_credits_only_for_freelancers() {
        let store = MemoryStore::new();
        let f = freelancer(&store, "f@example.com").await;
        let c = client(&store).await;

        assert_eq!(store.credit_balance(f.id).await.unwrap(), WELCOME_CREDITS);
        assert_eq!(store.credit_balance(c.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        freelancer(&store, "dup@example.com").await;
        let err = store
            .create_user(NewUser {
                email: "DUP@example.com".to_string(),
                display_name: "Other".to_string(),
                role: Role::Client,
                avatar_url: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_proposal_conflicts_and_charges_once() {
        let store = MemoryStore::new();
        let c = client(&store).await;
        let f = freelancer(&store, "f@example.com").await;
        let mission = open_mission(&store, c.id).await;

        store.submit_proposal(proposal(mission.id, f.id), 1).await.unwrap();
        let err = store
            .submit_proposal(proposal(mission.id, f.id), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.credit_balance(f.id).await.unwrap(), WELCOME_CREDITS - 1);
    }

    #[tokio::test]
    async fn test_insufficient_credits() {
        let store = MemoryStore::new();
        let c = client(&store).await;
        let f = freelancer(&store, "f@example.com").await;
        let mission = open_mission(&store, c.id).await;

        let err = store
            .submit_proposal(proposal(mission.id, f.id), WELCOME_CREDITS + 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientCredits));
        assert!(store.list_proposals_for_mission(mission.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_rejects_other_proposals() {
        let store = MemoryStore::new();
        let c = client(&store).await;
        let f1 = freelancer(&store, "f1@example.com").await;
        let f2 = freelancer(&store, "f2@example.com").await;
        let mission = open_mission(&store, c.id).await;

        let p1 = store.submit_proposal(proposal(mission.id, f1.id), 1).await.unwrap();
        let p2 = store.submit_proposal(proposal(mission.id, f2.id), 1).await.unwrap();

        let contract = store.accept_proposal(p1.id).await.unwrap();
        assert_eq!(contract.status, ContractStatus::Pending);
        assert_eq!(contract.amount, p1.price);
        assert_eq!(contract.client_id, c.id);

        let p2 = store.find_proposal(p2.id).await.unwrap().unwrap();
        assert_eq!(p2.status, ProposalStatus::Rejected);

        let mission = store.find_mission(mission.id).await.unwrap().unwrap();
        assert_eq!(mission.status, MissionStatus::InProgress);

        // 두 번째 수락은 CAS 실패
        let err = store.accept_proposal(p1.id).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleState(_)));
    }

    #[tokio::test]
    async fn test_update_mission_is_compare_and_set() {
        let store = MemoryStore::new();
        let c = client(&store).await;
        let mut mission = open_mission(&store, c.id).await;

        mission.status = MissionStatus::Cancelled;
        let err = store
            .update_mission(&mission, MissionStatus::Draft)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleState(_)));

        let stored = store.find_mission(mission.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MissionStatus::Open);
    }

    async fn pending_contract(store: &MemoryStore) -> Contract {
        let c = client(store).await;
        let f = freelancer(store, "f@example.com").await;
        let mission = open_mission(store, c.id).await;
        let p = store.submit_proposal(proposal(mission.id, f.id), 1).await.unwrap();
        store.accept_proposal(p.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_update_mission_rejects_stale_version() {
        let store = MemoryStore::new();
        let c = client(&store).await;
        let mission = open_mission(&store, c.id).await;

        let mut first = mission.clone();
        first.title = "First edit".to_string();
        store.update_mission(&first, MissionStatus::Open).await.unwrap();

        // 같은 스냅샷에서 출발한 두 번째 저장은 거부
        let mut second = mission.clone();
        second.description = "Second edit".to_string();
        let err = store
            .update_mission(&second, MissionStatus::Open)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleState(_)));

        let stored = store.find_mission(mission.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "First edit");
        assert_eq!(stored.description, mission.description);
    }

    #[tokio::test]
    async fn test_status_change_keeps_concurrent_edit() {
        let store = MemoryStore::new();
        let c = client(&store).await;
        let mut mission = store
            .create_mission(NewMission {
                client_id: c.id,
                title: "Build an API".to_string(),
                description: "Rust backend".to_string(),
                category_id: None,
                skills: vec!["rust".to_string()],
                budget_min: 100_000,
                budget_max: 200_000,
                deadline: None,
                status: MissionStatus::PendingReview,
            })
            .await
            .unwrap();

        mission.title = "Build a Rust API".to_string();
        store
            .update_mission(&mission, MissionStatus::PendingReview)
            .await
            .unwrap();

        // 관리자 승인은 상태 컬럼만 변경
        let approved = store
            .set_mission_status(mission.id, MissionStatus::PendingReview, MissionStatus::Open, None)
            .await
            .unwrap();
        assert_eq!(approved.status, MissionStatus::Open);
        assert_eq!(approved.title, "Build a Rust API");

        // 승인 이전 스냅샷으로 저장 시도하면 상태 CAS에서 거부
        let err = store
            .update_mission(&mission, MissionStatus::PendingReview)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleState(_)));
    }

    #[tokio::test]
    async fn test_concurrent_signatures_both_kept() {
        let store = MemoryStore::new();
        let contract = pending_contract(&store).await;
        let now = Utc::now();

        // 두 당사자가 같은 PENDING 스냅샷을 읽고 각자 서명
        let first = store.sign_contract(contract.id, Role::Client, now).await.unwrap();
        assert_eq!(first.status, ContractStatus::Pending);
        assert!(first.client_signed_at.is_some());

        let second = store
            .sign_contract(contract.id, Role::Freelancer, now)
            .await
            .unwrap();
        assert_eq!(second.status, ContractStatus::Active);
        assert_eq!(second.client_signed_at, Some(now));
        assert_eq!(second.freelancer_signed_at, Some(now));
        assert_eq!(second.start_date, Some(now));

        let err = store
            .sign_contract(contract.id, Role::Client, now)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleState(_)));
    }

    #[tokio::test]
    async fn test_double_sign_by_same_party_is_stale() {
        let store = MemoryStore::new();
        let contract = pending_contract(&store).await;

        store
            .sign_contract(contract.id, Role::Freelancer, Utc::now())
            .await
            .unwrap();
        let err = store
            .sign_contract(contract.id, Role::Freelancer, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleState(_)));

        let stored = store.find_contract(contract.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ContractStatus::Pending);
        assert!(stored.client_signed_at.is_none());
    }

    async fn disputed_contract(store: &MemoryStore) -> (Contract, Dispute) {
        let contract = pending_contract(store).await;
        store.sign_contract(contract.id, Role::Client, Utc::now()).await.unwrap();
        store
            .sign_contract(contract.id, Role::Freelancer, Utc::now())
            .await
            .unwrap();
        let dispute = store
            .open_dispute(NewDispute {
                contract_id: contract.id,
                opened_by: contract.client_id,
                reason: "Late delivery".to_string(),
                description: "Nothing delivered".to_string(),
            })
            .await
            .unwrap();
        (contract, dispute)
    }

    #[tokio::test]
    async fn test_dispute_completed_outcome_completes_mission() {
        let store = MemoryStore::new();
        let (contract, dispute) = disputed_contract(&store).await;

        let mut resolved = dispute.clone();
        resolved.status = DisputeStatus::Resolved;
        resolved.resolution = Some("Work accepted".to_string());
        store
            .update_dispute(&resolved, DisputeStatus::Open, Some(ContractStatus::Completed))
            .await
            .unwrap();

        let contract = store.find_contract(contract.id).await.unwrap().unwrap();
        assert_eq!(contract.status, ContractStatus::Completed);
        assert!(contract.end_date.is_some());

        let mission = store.find_mission(contract.mission_id).await.unwrap().unwrap();
        assert_eq!(mission.status, MissionStatus::Completed);
    }

    #[tokio::test]
    async fn test_dispute_outcomes_set_end_date_only_when_terminal() {
        let store = MemoryStore::new();
        let (contract, dispute) = disputed_contract(&store).await;

        let mut review = dispute.clone();
        review.status = DisputeStatus::UnderReview;
        let review = store
            .update_dispute(&review, DisputeStatus::Open, None)
            .await
            .unwrap();

        // 검토 전 스냅샷은 상태가 맞아도 버전이 달라 거부
        let mut stale = dispute.clone();
        stale.status = DisputeStatus::Closed;
        let err = store
            .update_dispute(&stale, DisputeStatus::UnderReview, Some(ContractStatus::Active))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleState(_)));

        let mut resolved = review.clone();
        resolved.status = DisputeStatus::Resolved;
        store
            .update_dispute(&resolved, DisputeStatus::UnderReview, Some(ContractStatus::Active))
            .await
            .unwrap();

        let restored = store.find_contract(contract.id).await.unwrap().unwrap();
        assert_eq!(restored.status, ContractStatus::Active);
        assert!(restored.end_date.is_none());
        let mission = store.find_mission(contract.mission_id).await.unwrap().unwrap();
        assert_eq!(mission.status, MissionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_dispute_cancelled_outcome_sets_end_date() {
        let store = MemoryStore::new();
        let (contract, dispute) = disputed_contract(&store).await;

        let mut resolved = dispute.clone();
        resolved.status = DisputeStatus::Resolved;
        store
            .update_dispute(&resolved, DisputeStatus::Open, Some(ContractStatus::Cancelled))
            .await
            .unwrap();

        let contract = store.find_contract(contract.id).await.unwrap().unwrap();
        assert_eq!(contract.status, ContractStatus::Cancelled);
        assert!(contract.end_date.is_some());
    }

    #[tokio::test]
    async fn test_invoice_numbers_are_sequential() {
        let store = MemoryStore::new();
        let c = client(&store).await;
        let f = freelancer(&store, "f@example.com").await;
        let mission = open_mission(&store, c.id).await;
        let p = store.submit_proposal(proposal(mission.id, f.id), 1).await.unwrap();
        let contract = store.accept_proposal(p.id).await.unwrap();

        let items = vec![crate::domain::LineItem {
            description: "Work".to_string(),
            quantity: Decimal::TWO,
            unit_price: 1_000,
        }];
        let tax_rate = Decimal::from(20);
        let priced = crate::domain::price_invoice(&items, tax_rate).unwrap();
        let new_invoice = || NewInvoice {
            contract_id: contract.id,
            issuer_id: f.id,
            recipient_id: c.id,
            lines: priced.lines.clone(),
            tax_rate,
            totals: priced.totals,
            due_date: None,
        };

        let first = store.create_invoice(new_invoice()).await.unwrap();
        let second = store.create_invoice(new_invoice()).await.unwrap();

        let year = Utc::now().year();
        assert_eq!(first.invoice.number, format_invoice_number(year, 1));
        assert_eq!(second.invoice.number, format_invoice_number(year, 2));
        assert_eq!(first.invoice.total_amount, 2_400);
        assert_eq!(first.items.len(), 1);
    }

    #[tokio::test]
    async fn test_unread_counters() {
        let store = MemoryStore::new();
        let c = client(&store).await;
        let f = freelancer(&store, "f@example.com").await;

        let conv = store.find_or_create_conversation(f.id, c.id, None).await.unwrap();
        let again = store.find_or_create_conversation(c.id, f.id, None).await.unwrap();
        assert_eq!(conv.id, again.id);

        store.send_message(conv.id, c.id, "hello").await.unwrap();
        store.send_message(conv.id, c.id, "are you there?").await.unwrap();

        let conv = store.find_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(conv.unread_for(f.id), 2);
        assert_eq!(conv.unread_for(c.id), 0);

        store.mark_conversation_read(conv.id, f.id).await.unwrap();
        let conv = store.find_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(conv.unread_for(f.id), 0);
    }

    #[tokio::test]
    async fn test_login_code_single_use() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let expires = now + chrono::Duration::minutes(10);

        store.save_login_code("a@example.com", "hash", expires).await.unwrap();
        assert!(!store.consume_login_code("a@example.com", "wrong", now).await.unwrap());
        assert!(store.consume_login_code("A@example.com", "hash", now).await.unwrap());
        assert!(!store.consume_login_code("a@example.com", "hash", now).await.unwrap());
    }
}
