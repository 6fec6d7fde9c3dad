use crate::error::{AppError, AppResult};
use crate::websocket::message_types::describe_validation;
use serde::Deserialize;
use validator::Validate;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// `?limit=&page=` as sent by clients.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PageQuery {
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<u32>,
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: Option<u32>,
}

impl PageQuery {
    pub fn into_page(self) -> AppResult<Page> {
        self.validate()
            .map_err(|e| AppError::Pagination(describe_validation(&e)))?;
        Ok(Page {
            page: self.page.unwrap_or(1),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let page = PageQuery::default().into_page().unwrap();
        assert_eq!(page, Page { page: 1, limit: 20 });
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn offset_skips_previous_pages() {
        assert_eq!(Page::new(3, 10).offset(), 20);
    }

    #[test]
    fn rejects_out_of_range() {
        for (limit, page) in [(Some(0), None), (Some(101), None), (None, Some(0))] {
            let query = PageQuery { limit, page };
            assert!(matches!(query.into_page(), Err(AppError::Pagination(_))));
        }
        let ok = PageQuery {
            limit: Some(100),
            page: Some(7),
        };
        assert_eq!(ok.into_page().unwrap(), Page { page: 7, limit: 100 });
    }
}
