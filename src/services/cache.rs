//! Catalog Cache
//!
//! 카테고리 트리 / 스킬 목록 cache-aside
//!
//! - key: `catalog:categories:{locale}`, `catalog:skills:{locale}`
//! - TTL 1시간, 카탈로그 쓰기마다 전체 무효화
//! - Redis가 설정되어 있으면 Redis, 아니면 프로세스 로컬 맵
//! - 캐시 읽기/쓰기 실패는 경고만 남기고 저장소에서 다시 계산

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::db::{CatalogRepository, Category, Skill, Store, Translations};
use crate::error::ApiResult;

pub const SUPPORTED_LOCALES: [&str; 2] = ["fr", "en"];
pub const DEFAULT_LOCALE: &str = "en";

const CATALOG_TTL: Duration = Duration::from_secs(3600);

pub fn categories_key(locale: &str) -> String {
    format!("catalog:categories:{}", locale)
}

pub fn skills_key(locale: &str) -> String {
    format!("catalog:skills:{}", locale)
}

/// `fr-FR` → `fr`, 지원하지 않으면 `en`
pub fn normalize_locale(requested: Option<&str>) -> &'static str {
    let lang = requested
        .and_then(|l| l.split(['-', '_']).next())
        .map(|l| l.trim().to_lowercase())
        .unwrap_or_default();

    SUPPORTED_LOCALES
        .iter()
        .copied()
        .find(|l| *l == lang)
        .unwrap_or(DEFAULT_LOCALE)
}

/// locale → en → slug 순으로 표시 이름 결정
pub fn resolve_translation(translations: &Translations, locale: &str, slug: &str) -> String {
    translations
        .get(locale)
        .or_else(|| translations.get(DEFAULT_LOCALE))
        .filter(|name| !name.is_empty())
        .cloned()
        .unwrap_or_else(|| slug.to_string())
}

// ============ Localized views ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub children: Vec<CategoryNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillView {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub slug: String,
    pub name: String,
}

/// parent_id로 트리 구성 (입력 순서 = position 순서 유지)
pub fn build_tree(categories: &[Category], locale: &str) -> Vec<CategoryNode> {
    fn children_of(
        parent: Option<Uuid>,
        categories: &[Category],
        locale: &str,
        depth: usize,
    ) -> Vec<CategoryNode> {
        // 순환 참조 방어
        if depth > categories.len() {
            return Vec::new();
        }
        categories
            .iter()
            .filter(|c| c.parent_id == parent)
            .map(|c| CategoryNode {
                id: c.id,
                slug: c.slug.clone(),
                name: resolve_translation(&c.translations, locale, &c.slug),
                children: children_of(Some(c.id), categories, locale, depth + 1),
            })
            .collect()
    }

    // 부모가 목록에 없는 카테고리는 루트로 취급
    let known: std::collections::HashSet<Uuid> = categories.iter().map(|c| c.id).collect();
    let mut roots = children_of(None, categories, locale, 0);
    for orphan in categories
        .iter()
        .filter(|c| c.parent_id.map_or(false, |p| !known.contains(&p)))
    {
        roots.push(CategoryNode {
            id: orphan.id,
            slug: orphan.slug.clone(),
            name: resolve_translation(&orphan.translations, locale, &orphan.slug),
            children: children_of(Some(orphan.id), categories, locale, 1),
        });
    }
    roots
}

pub fn localize_skills(skills: &[Skill], locale: &str) -> Vec<SkillView> {
    skills
        .iter()
        .map(|s| SkillView {
            id: s.id,
            category_id: s.category_id,
            slug: s.slug.clone(),
            name: resolve_translation(&s.translations, locale, &s.slug),
        })
        .collect()
}

// ============ Cache ============

struct LocalEntry {
    json: String,
    expires_at: Instant,
}

pub struct CatalogCache {
    redis: Option<ConnectionManager>,
    local: Mutex<HashMap<String, LocalEntry>>,
    ttl: Duration,
}

impl CatalogCache {
    pub fn new(redis: Option<ConnectionManager>) -> Self {
        Self {
            redis,
            local: Mutex::new(HashMap::new()),
            ttl: CATALOG_TTL,
        }
    }

    pub fn local_only() -> Self {
        Self::new(None)
    }

    /// 로컬 카테고리 트리
    pub async fn categories(&self, store: &dyn Store, locale: &str) -> ApiResult<Vec<CategoryNode>> {
        let key = categories_key(locale);
        if let Some(hit) = self.get_json::<Vec<CategoryNode>>(&key).await {
            return Ok(hit);
        }

        let rows = store.list_categories().await?;
        let tree = build_tree(&rows, locale);
        self.set_json(&key, &tree).await;
        Ok(tree)
    }

    /// 로컬 스킬 목록
    pub async fn skills(&self, store: &dyn Store, locale: &str) -> ApiResult<Vec<SkillView>> {
        let key = skills_key(locale);
        if let Some(hit) = self.get_json::<Vec<SkillView>>(&key).await {
            return Ok(hit);
        }

        let rows = store.list_skills().await?;
        let skills = localize_skills(&rows, locale);
        self.set_json(&key, &skills).await;
        Ok(skills)
    }

    /// 모든 locale의 카탈로그 키 삭제
    pub async fn invalidate_catalog(&self) {
        let keys: Vec<String> = SUPPORTED_LOCALES
            .iter()
            .flat_map(|l| [categories_key(l), skills_key(l)])
            .collect();

        {
            let mut local = self.lock();
            for key in &keys {
                local.remove(key);
            }
        }

        if let Some(redis) = &self.redis {
            let mut conn = redis.clone();
            if let Err(e) = conn.del::<_, ()>(&keys).await {
                warn!(error = %e, "Failed to invalidate catalog cache in Redis");
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match &self.redis {
            Some(redis) => {
                let mut conn = redis.clone();
                match conn.get::<_, Option<String>>(key).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(error = %e, key, "Catalog cache read failed");
                        None
                    }
                }
            }
            None => {
                let local = self.lock();
                local
                    .get(key)
                    .filter(|entry| entry.expires_at > Instant::now())
                    .map(|entry| entry.json.clone())
            }
        }?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, key, "Discarding undecodable catalog cache entry");
                None
            }
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, key, "Failed to encode catalog cache entry");
                return;
            }
        };

        match &self.redis {
            Some(redis) => {
                let mut conn = redis.clone();
                if let Err(e) = conn.set_ex::<_, _, ()>(key, json, self.ttl.as_secs()).await {
                    warn!(error = %e, key, "Catalog cache write failed");
                }
            }
            None => {
                self.lock().insert(
                    key.to_string(),
                    LocalEntry {
                        json,
                        expires_at: Instant::now() + self.ttl,
                    },
                );
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LocalEntry>> {
        self.local.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, NewCategory};
    use sqlx::types::Json;

    fn translations(pairs: &[(&str, &str)]) -> Translations {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn category(slug: &str, parent_id: Option<Uuid>, names: &[(&str, &str)]) -> Category {
        Category {
            id: Uuid::new_v4(),
            parent_id,
            slug: slug.to_string(),
            position: 0,
            translations: Json(translations(names)),
        }
    }

    #[test]
    fn test_translation_fallback() {
        let t = translations(&[("en", "Development"), ("fr", "Développement")]);
        assert_eq!(resolve_translation(&t, "fr", "dev"), "Développement");
        assert_eq!(resolve_translation(&t, "de", "dev"), "Development");

        let only_fr = translations(&[("fr", "Design")]);
        assert_eq!(resolve_translation(&only_fr, "en", "design"), "design");
    }

    #[test]
    fn test_normalize_locale() {
        assert_eq!(normalize_locale(Some("fr-FR")), "fr");
        assert_eq!(normalize_locale(Some("EN")), "en");
        assert_eq!(normalize_locale(Some("de")), "en");
        assert_eq!(normalize_locale(None), "en");
    }

    #[test]
    fn test_build_tree() {
        let root = category("dev", None, &[("en", "Development")]);
        let child = category("web", Some(root.id), &[("en", "Web")]);
        let other = category("design", None, &[]);

        let tree = build_tree(&[root.clone(), child, other], "en");
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].name, "Development");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].slug, "web");
        assert_eq!(tree[1].name, "design");
    }

    #[tokio::test]
    async fn test_local_cache_and_invalidation() {
        let store = MemoryStore::new();
        let cache = CatalogCache::local_only();

        store
            .create_category(NewCategory {
                parent_id: None,
                slug: "dev".to_string(),
                position: 0,
                translations: translations(&[("en", "Development")]),
            })
            .await
            .unwrap();

        assert_eq!(cache.categories(&store, "en").await.unwrap().len(), 1);

        store
            .create_category(NewCategory {
                parent_id: None,
                slug: "design".to_string(),
                position: 1,
                translations: Translations::new(),
            })
            .await
            .unwrap();

        // 무효화 전에는 캐시된 값
        assert_eq!(cache.categories(&store, "en").await.unwrap().len(), 1);

        cache.invalidate_catalog().await;
        assert_eq!(cache.categories(&store, "en").await.unwrap().len(), 2);
    }
}
