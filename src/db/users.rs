//! Users, profile records and login codes (PostgreSQL)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{like_pattern, offset, Database, StoreError, StoreResult};
use super::models::*;
use super::repository::UserRepository;
use crate::domain::{CreditKind, Role, WELCOME_CREDITS};

#[async_trait]
impl UserRepository for Database {
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, display_name, role, avatar_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.email.to_lowercase())
        .bind(&new.display_name)
        .bind(new.role)
        .bind(&new.avatar_url)
        .fetch_one(&mut *tx)
        .await?;

        if user.role == Role::Freelancer {
            sqlx::query(
                r#"
                INSERT INTO credit_transactions (id, user_id, amount, kind, note, created_at)
                VALUES ($1, $2, $3, $4, 'welcome bonus', NOW())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user.id)
            .bind(WELCOME_CREDITS)
            .bind(CreditKind::Welcome)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> StoreResult<User> {
        // NULL이면 기존 값 유지
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                display_name = COALESCE($2, display_name),
                headline = COALESCE($3, headline),
                bio = COALESCE($4, bio),
                hourly_rate = COALESCE($5, hourly_rate),
                skills = COALESCE($6, skills),
                role = COALESCE($7, role),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&patch.display_name)
        .bind(&patch.headline)
        .bind(&patch.bio)
        .bind(patch.hourly_rate)
        .bind(&patch.skills)
        .bind(patch.role)
        .fetch_optional(&self.pool)
        .await?;

        user.ok_or(StoreError::NotFound("user"))
    }

    async fn search_freelancers(
        &self,
        query: Option<&str>,
        page: u32,
        limit: u32,
    ) -> StoreResult<Page<User>> {
        let pattern = query.map(like_pattern);

        let items = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE role = 'FREELANCER'
              AND ($1::TEXT IS NULL
                   OR display_name ILIKE $1
                   OR headline ILIKE $1
                   OR array_to_string(skills, ' ') ILIKE $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&pattern)
        .bind(limit as i64)
        .bind(offset(page, limit))
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM users
            WHERE role = 'FREELANCER'
              AND ($1::TEXT IS NULL
                   OR display_name ILIKE $1
                   OR headline ILIKE $1
                   OR array_to_string(skills, ' ') ILIKE $1)
            "#,
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page { items, total: total.0 })
    }

    async fn list_certifications(&self, user_id: Uuid) -> StoreResult<Vec<Certification>> {
        let rows = sqlx::query_as::<_, Certification>(
            "SELECT * FROM certifications WHERE user_id = $1 ORDER BY issued_on DESC NULLS LAST",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_certification(
        &self,
        user_id: Uuid,
        new: NewCertification,
    ) -> StoreResult<Certification> {
        let row = sqlx::query_as::<_, Certification>(
            r#"
            INSERT INTO certifications (id, user_id, name, issuer, issued_on, credential_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&new.name)
        .bind(&new.issuer)
        .bind(new.issued_on)
        .bind(&new.credential_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_certification(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM certifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_education(&self, user_id: Uuid) -> StoreResult<Vec<Education>> {
        let rows = sqlx::query_as::<_, Education>(
            "SELECT * FROM education WHERE user_id = $1 ORDER BY start_year DESC NULLS LAST",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_education(&self, user_id: Uuid, new: NewEducation) -> StoreResult<Education> {
        let row = sqlx::query_as::<_, Education>(
            r#"
            INSERT INTO education (id, user_id, school, degree, field_of_study, start_year, end_year, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&new.school)
        .bind(&new.degree)
        .bind(&new.field_of_study)
        .bind(new.start_year)
        .bind(new.end_year)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_education(&self, user_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM education WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_login_code(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO login_codes (email, code_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email)
            DO UPDATE SET code_hash = EXCLUDED.code_hash, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(email.to_lowercase())
        .bind(code_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_login_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM login_codes WHERE email = $1 AND code_hash = $2 AND expires_at > $3",
        )
        .bind(email.to_lowercase())
        .bind(code_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
