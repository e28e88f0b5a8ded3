//! Disputes and support tickets (PostgreSQL)

use async_trait::async_trait;
use uuid::Uuid;

use super::{offset, Database, StoreError, StoreResult};
use super::models::*;
use super::repository::SupportRepository;
use crate::domain::{ContractStatus, DisputeStatus, TicketStatus};

#[async_trait]
impl SupportRepository for Database {
    async fn open_dispute(&self, new: NewDispute) -> StoreResult<Dispute> {
        let mut tx = self.pool.begin().await?;

        let contract = sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = $3
            RETURNING *
            "#,
        )
        .bind(new.contract_id)
        .bind(ContractStatus::Disputed)
        .bind(ContractStatus::Active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::StaleState("contract".to_string()))?;

        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            INSERT INTO disputes (
                id, contract_id, client_id, freelancer_id, opened_by, reason, description,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'OPEN', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(contract.id)
        .bind(contract.client_id)
        .bind(contract.freelancer_id)
        .bind(new.opened_by)
        .bind(&new.reason)
        .bind(&new.description)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(dispute)
    }

    async fn find_dispute(&self, id: Uuid) -> StoreResult<Option<Dispute>> {
        let dispute = sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(dispute)
    }

    async fn list_disputes(
        &self,
        party: Option<Uuid>,
        status: Option<DisputeStatus>,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Dispute>> {
        let items = sqlx::query_as::<_, Dispute>(
            r#"
            SELECT * FROM disputes
            WHERE ($1::UUID IS NULL OR client_id = $1 OR freelancer_id = $1)
              AND ($2::dispute_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(party)
        .bind(status)
        .bind(limit as i64)
        .bind(offset(page, limit))
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM disputes
            WHERE ($1::UUID IS NULL OR client_id = $1 OR freelancer_id = $1)
              AND ($2::dispute_status IS NULL OR status = $2)
            "#,
        )
        .bind(party)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page { items, total: total.0 })
    }

    async fn update_dispute(
        &self,
        dispute: &Dispute,
        expected: DisputeStatus,
        contract_outcome: Option<ContractStatus>,
    ) -> StoreResult<Dispute> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes SET
                status = $3,
                resolution = $4,
                resolved_by = $5,
                updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1 AND status = $2 AND updated_at = $6
            RETURNING *
            "#,
        )
        .bind(dispute.id)
        .bind(expected)
        .bind(dispute.status)
        .bind(&dispute.resolution)
        .bind(dispute.resolved_by)
        .bind(dispute.updated_at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::StaleState("dispute".to_string()))?;

        if let Some(outcome) = contract_outcome {
            // 종료 결과(COMPLETED/CANCELLED)는 end_date 기록, ACTIVE 복귀는 유지
            let mission_id: Option<(Uuid,)> = sqlx::query_as(
                r#"
                UPDATE contracts SET
                    status = $2,
                    end_date = CASE WHEN $2 IN ('COMPLETED'::contract_status, 'CANCELLED'::contract_status)
                                    THEN NOW() ELSE end_date END,
                    updated_at = NOW()
                WHERE id = $1 AND status = $3
                RETURNING mission_id
                "#,
            )
            .bind(updated.contract_id)
            .bind(outcome)
            .bind(ContractStatus::Disputed)
            .fetch_optional(&mut *tx)
            .await?;

            let (mission_id,) =
                mission_id.ok_or_else(|| StoreError::StaleState("contract".to_string()))?;

            if outcome == ContractStatus::Completed {
                let result = sqlx::query(
                    r#"
                    UPDATE missions SET status = 'COMPLETED', updated_at = NOW()
                    WHERE id = $1 AND status = 'IN_PROGRESS'
                    "#,
                )
                .bind(mission_id)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::StaleState("mission".to_string()));
                }
            }
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn create_ticket(&self, new: NewTicket) -> StoreResult<SupportTicket> {
        let mut tx = self.pool.begin().await?;

        let ticket = sqlx::query_as::<_, SupportTicket>(
            r#"
            INSERT INTO support_tickets (id, user_id, subject, category, priority, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'OPEN', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.subject)
        .bind(&new.category)
        .bind(new.priority)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO ticket_messages (id, ticket_id, author_id, body, is_staff, created_at)
            VALUES ($1, $2, $3, $4, FALSE, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ticket.id)
        .bind(new.user_id)
        .bind(&new.message)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ticket)
    }

    async fn find_ticket(&self, id: Uuid) -> StoreResult<Option<SupportTicket>> {
        let ticket =
            sqlx::query_as::<_, SupportTicket>("SELECT * FROM support_tickets WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(ticket)
    }

    async fn list_tickets(
        &self,
        owner: Option<Uuid>,
        status: Option<TicketStatus>,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<SupportTicket>> {
        let items = sqlx::query_as::<_, SupportTicket>(
            r#"
            SELECT * FROM support_tickets
            WHERE ($1::UUID IS NULL OR user_id = $1)
              AND ($2::ticket_status IS NULL OR status = $2)
            ORDER BY updated_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(owner)
        .bind(status)
        .bind(limit as i64)
        .bind(offset(page, limit))
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM support_tickets
            WHERE ($1::UUID IS NULL OR user_id = $1)
              AND ($2::ticket_status IS NULL OR status = $2)
            "#,
        )
        .bind(owner)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page { items, total: total.0 })
    }

    async fn add_ticket_message(
        &self,
        ticket_id: Uuid,
        author_id: Uuid,
        body: &str,
        is_staff: bool,
    ) -> StoreResult<TicketMessage> {
        let mut tx = self.pool.begin().await?;

        let message = sqlx::query_as::<_, TicketMessage>(
            r#"
            INSERT INTO ticket_messages (id, ticket_id, author_id, body, is_staff, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ticket_id)
        .bind(author_id)
        .bind(body)
        .bind(is_staff)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE support_tickets SET updated_at = NOW() WHERE id = $1")
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(message)
    }

    async fn list_ticket_messages(&self, ticket_id: Uuid) -> StoreResult<Vec<TicketMessage>> {
        let rows = sqlx::query_as::<_, TicketMessage>(
            "SELECT * FROM ticket_messages WHERE ticket_id = $1 ORDER BY created_at ASC",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_ticket_status(
        &self,
        id: Uuid,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> StoreResult<SupportTicket> {
        let updated = sqlx::query_as::<_, SupportTicket>(
            r#"
            UPDATE support_tickets SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| StoreError::StaleState("ticket".to_string()))
    }
}
