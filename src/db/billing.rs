//! Invoices and the credit ledger (PostgreSQL)

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use super::{offset, Database, StoreError, StoreResult};
use super::models::*;
use super::repository::BillingRepository;
use crate::domain::{format_invoice_number, InvoiceStatus};

impl Database {
    async fn invoice_items(&self, invoice_id: Uuid) -> StoreResult<Vec<InvoiceItem>> {
        let items = sqlx::query_as::<_, InvoiceItem>(
            "SELECT * FROM invoice_items WHERE invoice_id = $1 ORDER BY position ASC",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}

#[async_trait]
impl BillingRepository for Database {
    async fn create_invoice(&self, new: NewInvoice) -> StoreResult<InvoiceWithItems> {
        let totals = new.totals;
        let year = Utc::now().year();

        let mut tx = self.pool.begin().await?;

        // 연도별 카운터, 행 잠금으로 번호 중복 방지
        let sequence: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO invoice_counters (year, last_value)
            VALUES ($1, 1)
            ON CONFLICT (year)
            DO UPDATE SET last_value = invoice_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(year)
        .fetch_one(&mut *tx)
        .await?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                id, number, contract_id, issuer_id, recipient_id, status,
                subtotal, tax_rate, tax_amount, total_amount, due_date,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 'DRAFT', $6, $7, $8, $9, $10, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(format_invoice_number(year, sequence.0))
        .bind(new.contract_id)
        .bind(new.issuer_id)
        .bind(new.recipient_id)
        .bind(totals.subtotal)
        .bind(new.tax_rate)
        .bind(totals.tax_amount)
        .bind(totals.total_amount)
        .bind(new.due_date)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(new.lines.len());
        for (position, line) in new.lines.iter().enumerate() {
            let item = sqlx::query_as::<_, InvoiceItem>(
                r#"
                INSERT INTO invoice_items (id, invoice_id, position, description, quantity, unit_price, amount)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invoice.id)
            .bind(position as i32)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.amount)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        tx.commit().await?;
        Ok(InvoiceWithItems { invoice, items })
    }

    async fn find_invoice(&self, id: Uuid) -> StoreResult<Option<InvoiceWithItems>> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match invoice {
            Some(invoice) => {
                let items = self.invoice_items(invoice.id).await?;
                Ok(Some(InvoiceWithItems { invoice, items }))
            }
            None => Ok(None),
        }
    }

    async fn list_invoices_for_user(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<Invoice>> {
        let items = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices
            WHERE issuer_id = $1 OR recipient_id = $1
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
            "SELECT COUNT(*) FROM invoices WHERE issuer_id = $1 OR recipient_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page { items, total: total.0 })
    }

    async fn update_invoice_status(
        &self,
        id: Uuid,
        expected: InvoiceStatus,
        next: InvoiceStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Invoice> {
        let updated = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices SET
                status = $3,
                paid_at = COALESCE($4, paid_at),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .bind(paid_at)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| StoreError::StaleState("invoice".to_string()))
    }

    async fn credit_balance(&self, user_id: Uuid) -> StoreResult<i64> {
        let balance: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM credit_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(balance.0)
    }

    async fn list_credit_transactions(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<CreditTransaction>> {
        let items = sqlx::query_as::<_, CreditTransaction>(
            r#"
            SELECT * FROM credit_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset(page, limit))
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM credit_transactions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(Page { items, total: total.0 })
    }

    async fn add_credit_transaction(
        &self,
        new: NewCreditTransaction,
    ) -> StoreResult<CreditTransaction> {
        let row = sqlx::query_as::<_, CreditTransaction>(
            r#"
            INSERT INTO credit_transactions (id, user_id, amount, kind, reference_id, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.amount)
        .bind(new.kind)
        .bind(new.reference_id)
        .bind(&new.note)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
