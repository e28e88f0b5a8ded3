//! Missions and gigs (PostgreSQL)

use async_trait::async_trait;
use uuid::Uuid;

use super::{like_pattern, offset, Database, StoreError, StoreResult};
use super::models::*;
use super::repository::{GigRepository, MissionRepository};
use crate::domain::{GigStatus, MissionStatus};

#[async_trait]
impl MissionRepository for Database {
    async fn create_mission(&self, new: NewMission) -> StoreResult<Mission> {
        let mission = sqlx::query_as::<_, Mission>(
            r#"
            INSERT INTO missions (
                id, client_id, title, description, category_id, skills,
                budget_min, budget_max, deadline, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.client_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.category_id)
        .bind(&new.skills)
        .bind(new.budget_min)
        .bind(new.budget_max)
        .bind(new.deadline)
        .bind(new.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(mission)
    }

    async fn find_mission(&self, id: Uuid) -> StoreResult<Option<Mission>> {
        let mission = sqlx::query_as::<_, Mission>("SELECT * FROM missions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(mission)
    }

    async fn list_missions(&self, filter: &MissionFilter) -> StoreResult<Page<Mission>> {
        let pattern = filter.query.as_deref().map(like_pattern);

        let items = sqlx::query_as::<_, Mission>(
            r#"
            SELECT * FROM missions
            WHERE ($1::mission_status IS NULL OR status = $1)
              AND ($2::UUID IS NULL OR client_id = $2)
              AND ($3::UUID IS NULL OR category_id = $3)
              AND ($4::TEXT IS NULL OR title ILIKE $4 OR description ILIKE $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.status)
        .bind(filter.client_id)
        .bind(filter.category_id)
        .bind(&pattern)
        .bind(filter.limit as i64)
        .bind(offset(filter.page, filter.limit))
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM missions
            WHERE ($1::mission_status IS NULL OR status = $1)
              AND ($2::UUID IS NULL OR client_id = $2)
              AND ($3::UUID IS NULL OR category_id = $3)
              AND ($4::TEXT IS NULL OR title ILIKE $4 OR description ILIKE $4)
            "#,
        )
        .bind(filter.status)
        .bind(filter.client_id)
        .bind(filter.category_id)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page { items, total: total.0 })
    }

    async fn update_mission(
        &self,
        mission: &Mission,
        expected: MissionStatus,
    ) -> StoreResult<Mission> {
        let updated = sqlx::query_as::<_, Mission>(
            r#"
            UPDATE missions SET
                title = $3,
                description = $4,
                category_id = $5,
                skills = $6,
                budget_min = $7,
                budget_max = $8,
                deadline = $9,
                status = $10,
                rejection_reason = $11,
                updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1 AND status = $2 AND updated_at = $12
            RETURNING *
            "#,
        )
        .bind(mission.id)
        .bind(expected)
        .bind(&mission.title)
        .bind(&mission.description)
        .bind(mission.category_id)
        .bind(&mission.skills)
        .bind(mission.budget_min)
        .bind(mission.budget_max)
        .bind(mission.deadline)
        .bind(mission.status)
        .bind(&mission.rejection_reason)
        .bind(mission.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| StoreError::StaleState("mission".to_string()))
    }

    async fn set_mission_status(
        &self,
        id: Uuid,
        expected: MissionStatus,
        next: MissionStatus,
        rejection_reason: Option<String>,
    ) -> StoreResult<Mission> {
        let updated = sqlx::query_as::<_, Mission>(
            r#"
            UPDATE missions SET
                status = $3,
                rejection_reason = $4,
                updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .bind(rejection_reason)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| StoreError::StaleState("mission".to_string()))
    }

    async fn delete_mission(&self, id: Uuid, expected: MissionStatus) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM missions WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(expected)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StaleState("mission".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GigRepository for Database {
    async fn create_gig(&self, new: NewGig) -> StoreResult<Gig> {
        let gig = sqlx::query_as::<_, Gig>(
            r#"
            INSERT INTO gigs (
                id, freelancer_id, title, description, category_id, skills,
                price, delivery_days, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.freelancer_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.category_id)
        .bind(&new.skills)
        .bind(new.price)
        .bind(new.delivery_days)
        .bind(new.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(gig)
    }

    async fn find_gig(&self, id: Uuid) -> StoreResult<Option<Gig>> {
        let gig = sqlx::query_as::<_, Gig>("SELECT * FROM gigs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(gig)
    }

    async fn list_gigs(&self, filter: &GigFilter) -> StoreResult<Page<Gig>> {
        let pattern = filter.query.as_deref().map(like_pattern);

        let items = sqlx::query_as::<_, Gig>(
            r#"
            SELECT * FROM gigs
            WHERE ($1::gig_status IS NULL OR status = $1)
              AND ($2::UUID IS NULL OR freelancer_id = $2)
              AND ($3::UUID IS NULL OR category_id = $3)
              AND ($4::TEXT IS NULL OR title ILIKE $4 OR description ILIKE $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.status)
        .bind(filter.freelancer_id)
        .bind(filter.category_id)
        .bind(&pattern)
        .bind(filter.limit as i64)
        .bind(offset(filter.page, filter.limit))
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM gigs
            WHERE ($1::gig_status IS NULL OR status = $1)
              AND ($2::UUID IS NULL OR freelancer_id = $2)
              AND ($3::UUID IS NULL OR category_id = $3)
              AND ($4::TEXT IS NULL OR title ILIKE $4 OR description ILIKE $4)
            "#,
        )
        .bind(filter.status)
        .bind(filter.freelancer_id)
        .bind(filter.category_id)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page { items, total: total.0 })
    }

    async fn update_gig(&self, gig: &Gig, expected: GigStatus) -> StoreResult<Gig> {
        let updated = sqlx::query_as::<_, Gig>(
            r#"
            UPDATE gigs SET
                title = $3,
                description = $4,
                category_id = $5,
                skills = $6,
                price = $7,
                delivery_days = $8,
                status = $9,
                rejection_reason = $10,
                updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1 AND status = $2 AND updated_at = $11
            RETURNING *
            "#,
        )
        .bind(gig.id)
        .bind(expected)
        .bind(&gig.title)
        .bind(&gig.description)
        .bind(gig.category_id)
        .bind(&gig.skills)
        .bind(gig.price)
        .bind(gig.delivery_days)
        .bind(gig.status)
        .bind(&gig.rejection_reason)
        .bind(gig.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| StoreError::StaleState("gig".to_string()))
    }

    async fn set_gig_status(
        &self,
        id: Uuid,
        expected: GigStatus,
        next: GigStatus,
        rejection_reason: Option<String>,
    ) -> StoreResult<Gig> {
        let updated = sqlx::query_as::<_, Gig>(
            r#"
            UPDATE gigs SET
                status = $3,
                rejection_reason = $4,
                updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .bind(rejection_reason)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| StoreError::StaleState("gig".to_string()))
    }
}
