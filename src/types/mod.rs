//! Common Types Module
//!
//! 애플리케이션 전반에서 사용되는 공통 타입 정의

use serde::{Deserialize, Serialize};

use crate::db::Page;
use crate::error::ApiError;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 목록 쿼리 파라미터
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// 페이지 (0부터 시작)
    pub page: Option<u32>,
    /// 페이지 크기 (기본 20, 최대 100)
    pub limit: Option<u32>,
}

impl PageQuery {
    /// (page, limit)
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(0);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_next: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: i64) -> Self {
        let total = total.max(0) as u64;
        Self {
            page,
            limit,
            total,
            has_next: (page as u64 + 1) * (limit as u64) < total,
        }
    }
}

/// 목록 응답 `{items, pagination}`
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paginated<T> {
    pub fn from_page(page: Page<T>, page_no: u32, limit: u32) -> Self {
        Self {
            pagination: Pagination::new(page_no, limit, page.total),
            items: page.items,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// 문자열 길이 검증 (문자 수 기준)
pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(ApiError::ValidationError(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

/// 간단한 이메일 형식 검증
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_defaults_and_cap() {
        assert_eq!(PageQuery::default().resolve(), (0, 20));
        let q = PageQuery { page: Some(2), limit: Some(500) };
        assert_eq!(q.resolve(), (2, 100));
        let q = PageQuery { page: None, limit: Some(0) };
        assert_eq!(q.resolve(), (0, 1));
    }

    #[test]
    fn test_has_next() {
        assert!(Pagination::new(0, 20, 21).has_next);
        assert!(!Pagination::new(0, 20, 20).has_next);
        assert!(!Pagination::new(1, 20, 40).has_next);
        assert!(!Pagination::new(0, 20, 0).has_next);
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("jo@example.com"));
        assert!(!is_valid_email("jo@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jo example@example.com"));
    }

    #[test]
    fn test_check_length() {
        assert!(check_length("title", "Build an API", 5, 200).is_ok());
        assert!(check_length("title", "API", 5, 200).is_err());
    }
}
