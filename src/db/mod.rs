//! Database Module
//!
//! # Interview Q&A
//!
//! Q: 왜 PostgreSQL인가?
//! A: 마켓플레이스 데이터는 전형적인 관계형 스키마
//!    1. ACID 트랜잭션: 제안 수락 → 계약 생성 같은 다단계 변경을 원자적으로
//!    2. enum 타입: 상태 컬럼을 DB 레벨에서도 제한
//!    3. 부분 유니크/외래키: 참조 무결성
//!
//! Q: 커넥션 풀은?
//! A: SQLx의 PgPool
//!    - max_connections: 10, min_connections: 1
//!    - acquire_timeout: 3초
//!
//! Q: 쿼리 방식은?
//! A: `sqlx::query_as::<_, T>` 런타임 바인딩
//!    - 빌드 시 DB 접속 불필요 (CI 단순화)
//!    - 컬럼 이름과 `FromRow` 필드 이름을 일치시킴

mod admin;
mod billing;
mod catalog;
mod contracts;
pub mod memory;
mod messaging;
mod missions;
pub mod models;
pub mod repository;
mod support;
mod users;

pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;

use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

/// 저장소 에러
///
/// 핸들러는 이 타입을 `ApiError`로 변환만 함 (`?`)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    /// compare-and-set 실패 (다른 요청이 먼저 상태를 바꿈)
    #[error("{0} changed concurrently")]
    StaleState(String),

    #[error("insufficient credits")]
    InsufficientCredits,

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => return StoreError::Conflict(db_err.message().to_string()),
                // foreign_key_violation
                Some("23503") => return StoreError::NotFound("referenced resource"),
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 데이터베이스 연결 및 쿼리 담당
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10 (트래픽에 따라 조정)
    /// - min_connections: 1 (idle 시 최소 유지)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// LIMIT/OFFSET 계산
pub(crate) fn offset(page: u32, limit: u32) -> i64 {
    page as i64 * limit as i64
}

/// ILIKE 패턴 (`%query%`), 와일드카드 문자는 이스케이프
pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn test_offset() {
        assert_eq!(offset(0, 20), 0);
        assert_eq!(offset(3, 20), 60);
    }
}
