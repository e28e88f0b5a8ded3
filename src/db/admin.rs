//! Service API keys, dashboard stats and health (PostgreSQL)

use async_trait::async_trait;
use uuid::Uuid;

use super::{Database, StoreResult};
use super::models::*;
use super::repository::AdminRepository;

#[async_trait]
impl AdminRepository for Database {
    async fn list_api_keys(&self) -> StoreResult<Vec<ServiceApiKey>> {
        let rows = sqlx::query_as::<_, ServiceApiKey>(
            "SELECT * FROM service_api_keys ORDER BY service ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_api_key(&self, new: NewApiKey) -> StoreResult<ServiceApiKey> {
        let row = sqlx::query_as::<_, ServiceApiKey>(
            r#"
            INSERT INTO service_api_keys (id, service, key_value, description, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.service)
        .bind(&new.key_value)
        .bind(&new.description)
        .bind(new.created_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_api_key(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM service_api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_api_key_by_service(&self, service: &str) -> StoreResult<Option<ServiceApiKey>> {
        let row = sqlx::query_as::<_, ServiceApiKey>(
            "SELECT * FROM service_api_keys WHERE service = $1",
        )
        .bind(service)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn stats(&self) -> StoreResult<AdminStats> {
        let users: Vec<(String, i64)> =
            sqlx::query_as("SELECT role::TEXT, COUNT(*) FROM users GROUP BY role")
                .fetch_all(&self.pool)
                .await?;

        let missions: Vec<(String, i64)> =
            sqlx::query_as("SELECT status::TEXT, COUNT(*) FROM missions GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let counts: (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM gigs WHERE status = 'PENDING_REVIEW'),
                (SELECT COUNT(*) FROM disputes WHERE status IN ('OPEN', 'UNDER_REVIEW')),
                (SELECT COUNT(*) FROM support_tickets WHERE status NOT IN ('RESOLVED', 'CLOSED'))
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AdminStats {
            users_by_role: users.into_iter().collect(),
            missions_by_status: missions.into_iter().collect(),
            pending_gigs: counts.0,
            open_disputes: counts.1,
            open_tickets: counts.2,
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
