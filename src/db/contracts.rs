//! Proposals, contracts and milestones (PostgreSQL)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{offset, Database, StoreError, StoreResult};
use super::models::*;
use super::repository::ContractRepository;
use crate::domain::{
    ContractStatus, CreditKind, MilestoneStatus, MissionStatus, ProposalStatus, Role,
};

#[async_trait]
impl ContractRepository for Database {
    async fn submit_proposal(&self, new: NewProposal, credit_cost: i64) -> StoreResult<Proposal> {
        let mut tx = self.pool.begin().await?;

        // 같은 사용자의 동시 제출을 직렬화 (잔액 검사 → 차감 사이 경합 방지)
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(new.freelancer_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("user"))?;

        let balance: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM credit_transactions WHERE user_id = $1",
        )
        .bind(new.freelancer_id)
        .fetch_one(&mut *tx)
        .await?;

        if balance.0 < credit_cost {
            return Err(StoreError::InsufficientCredits);
        }

        let proposal = sqlx::query_as::<_, Proposal>(
            r#"
            INSERT INTO proposals (
                id, mission_id, freelancer_id, price, timeline_days, message, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.mission_id)
        .bind(new.freelancer_id)
        .bind(new.price)
        .bind(new.timeline_days)
        .bind(&new.message)
        .fetch_one(&mut *tx)
        .await?;

        if credit_cost > 0 {
            sqlx::query(
                r#"
                INSERT INTO credit_transactions (id, user_id, amount, kind, reference_id, created_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(new.freelancer_id)
            .bind(-credit_cost)
            .bind(CreditKind::ProposalSpend)
            .bind(proposal.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(proposal)
    }

    async fn find_proposal(&self, id: Uuid) -> StoreResult<Option<Proposal>> {
        let proposal = sqlx::query_as::<_, Proposal>("SELECT * FROM proposals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(proposal)
    }

    async fn list_proposals_for_mission(&self, mission_id: Uuid) -> StoreResult<Vec<Proposal>> {
        let rows = sqlx::query_as::<_, Proposal>(
            "SELECT * FROM proposals WHERE mission_id = $1 ORDER BY created_at ASC",
        )
        .bind(mission_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_proposals_by_freelancer(
        &self,
        freelancer_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Proposal>> {
        let items = sqlx::query_as::<_, Proposal>(
            r#"
            SELECT * FROM proposals
            WHERE freelancer_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(freelancer_id)
        .bind(limit as i64)
        .bind(offset(page, limit))
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM proposals WHERE freelancer_id = $1")
                .bind(freelancer_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(Page { items, total: total.0 })
    }

    async fn update_proposal_status(
        &self,
        id: Uuid,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> StoreResult<Proposal> {
        let updated = sqlx::query_as::<_, Proposal>(
            r#"
            UPDATE proposals SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| StoreError::StaleState("proposal".to_string()))
    }

    async fn withdraw_proposal(&self, id: Uuid, refund: i64) -> StoreResult<Proposal> {
        let mut tx = self.pool.begin().await?;

        let proposal = sqlx::query_as::<_, Proposal>(
            r#"
            UPDATE proposals SET status = 'WITHDRAWN', updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::StaleState("proposal".to_string()))?;

        if refund > 0 {
            sqlx::query(
                r#"
                INSERT INTO credit_transactions (id, user_id, amount, kind, reference_id, created_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(proposal.freelancer_id)
            .bind(refund)
            .bind(CreditKind::ProposalRefund)
            .bind(proposal.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(proposal)
    }

    async fn accept_proposal(&self, proposal_id: Uuid) -> StoreResult<Contract> {
        let mut tx = self.pool.begin().await?;

        let proposal = sqlx::query_as::<_, Proposal>(
            r#"
            UPDATE proposals SET status = 'ACCEPTED', updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(proposal_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::StaleState("proposal".to_string()))?;

        let mission = sqlx::query_as::<_, Mission>(
            r#"
            UPDATE missions SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(proposal.mission_id)
        .bind(MissionStatus::Open)
        .bind(MissionStatus::InProgress)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::StaleState("mission".to_string()))?;

        // 나머지 대기 중인 제안은 모두 거절
        sqlx::query(
            r#"
            UPDATE proposals SET status = 'REJECTED', updated_at = NOW()
            WHERE mission_id = $1 AND id <> $2 AND status = 'PENDING'
            "#,
        )
        .bind(mission.id)
        .bind(proposal.id)
        .execute(&mut *tx)
        .await?;

        let contract = sqlx::query_as::<_, Contract>(
            r#"
            INSERT INTO contracts (
                id, mission_id, proposal_id, client_id, freelancer_id, amount, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(mission.id)
        .bind(proposal.id)
        .bind(mission.client_id)
        .bind(proposal.freelancer_id)
        .bind(proposal.price)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(contract)
    }

    async fn find_contract(&self, id: Uuid) -> StoreResult<Option<Contract>> {
        let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(contract)
    }

    async fn list_contracts_for_user(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Contract>> {
        let items = sqlx::query_as::<_, Contract>(
            r#"
            SELECT * FROM contracts
            WHERE client_id = $1 OR freelancer_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset(page, limit))
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM contracts WHERE client_id = $1 OR freelancer_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page { items, total: total.0 })
    }

    async fn sign_contract(
        &self,
        id: Uuid,
        party: Role,
        now: DateTime<Utc>,
    ) -> StoreResult<Contract> {
        // 한 문장으로 서명 기록, 상대방 서명이 이미 있으면 같은 문장에서 ACTIVE 전환
        // (행 잠금 후 WHERE 재평가, 동시 서명 두 건이 서로를 덮어쓰지 않음)
        let updated = sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts SET
                client_signed_at = CASE WHEN $2 THEN COALESCE(client_signed_at, $3)
                                        ELSE client_signed_at END,
                freelancer_signed_at = CASE WHEN $2 THEN freelancer_signed_at
                                            ELSE COALESCE(freelancer_signed_at, $3) END,
                status = CASE WHEN (CASE WHEN $2 THEN freelancer_signed_at
                                         ELSE client_signed_at END) IS NOT NULL
                              THEN 'ACTIVE'::contract_status ELSE status END,
                start_date = CASE WHEN (CASE WHEN $2 THEN freelancer_signed_at
                                             ELSE client_signed_at END) IS NOT NULL
                                  THEN $3 ELSE start_date END,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'PENDING'
              AND (CASE WHEN $2 THEN client_signed_at ELSE freelancer_signed_at END) IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(party == Role::Client)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| StoreError::StaleState("contract".to_string()))
    }

    async fn cancel_contract(
        &self,
        id: Uuid,
        expected: ContractStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<Contract> {
        let updated = sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts SET status = 'CANCELLED', end_date = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| StoreError::StaleState("contract".to_string()))
    }

    async fn complete_contract(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Contract> {
        let mut tx = self.pool.begin().await?;

        let contract = sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts SET status = 'COMPLETED', end_date = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'ACTIVE'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::StaleState("contract".to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE missions SET status = 'COMPLETED', updated_at = NOW()
            WHERE id = $1 AND status = 'IN_PROGRESS'
            "#,
        )
        .bind(contract.mission_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StaleState("mission".to_string()));
        }

        tx.commit().await?;
        Ok(contract)
    }

    async fn create_milestone(&self, new: NewMilestone) -> StoreResult<Milestone> {
        let milestone = sqlx::query_as::<_, Milestone>(
            r#"
            INSERT INTO milestones (id, contract_id, title, amount, due_date, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'PENDING', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.contract_id)
        .bind(&new.title)
        .bind(new.amount)
        .bind(new.due_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(milestone)
    }

    async fn find_milestone(&self, id: Uuid) -> StoreResult<Option<Milestone>> {
        let milestone = sqlx::query_as::<_, Milestone>("SELECT * FROM milestones WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(milestone)
    }

    async fn list_milestones(&self, contract_id: Uuid) -> StoreResult<Vec<Milestone>> {
        let rows = sqlx::query_as::<_, Milestone>(
            "SELECT * FROM milestones WHERE contract_id = $1 ORDER BY due_date ASC NULLS LAST, created_at ASC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_milestone_status(
        &self,
        id: Uuid,
        expected: MilestoneStatus,
        next: MilestoneStatus,
    ) -> StoreResult<Milestone> {
        let updated = sqlx::query_as::<_, Milestone>(
            r#"
            UPDATE milestones SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| StoreError::StaleState("milestone".to_string()))
    }
}
