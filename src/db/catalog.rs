//! Categories and skills (PostgreSQL)

use async_trait::async_trait;
use sqlx::types::Json;
use uuid::Uuid;

use super::{Database, StoreError, StoreResult};
use super::models::*;
use super::repository::CatalogRepository;

#[async_trait]
impl CatalogRepository for Database {
    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories ORDER BY position ASC, slug ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_skills(&self) -> StoreResult<Vec<Skill>> {
        let rows = sqlx::query_as::<_, Skill>("SELECT * FROM skills ORDER BY slug ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn create_category(&self, new: NewCategory) -> StoreResult<Category> {
        let row = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (id, parent_id, slug, position, translations)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.parent_id)
        .bind(&new.slug)
        .bind(new.position)
        .bind(Json(&new.translations))
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_category(&self, id: Uuid, patch: CategoryPatch) -> StoreResult<Category> {
        let row = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET
                parent_id = COALESCE($2, parent_id),
                slug = COALESCE($3, slug),
                position = COALESCE($4, position),
                translations = COALESCE($5, translations)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.parent_id)
        .bind(&patch.slug)
        .bind(patch.position)
        .bind(patch.translations.as_ref().map(Json))
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound("category"))
    }

    async fn create_skill(&self, new: NewSkill) -> StoreResult<Skill> {
        let row = sqlx::query_as::<_, Skill>(
            r#"
            INSERT INTO skills (id, category_id, slug, translations)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.category_id)
        .bind(&new.slug)
        .bind(Json(&new.translations))
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
