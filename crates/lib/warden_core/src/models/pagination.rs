//! List query parameters and paged results.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Page/search parameters for list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default)]
    pub keyword: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            keyword: None,
        }
    }
}

impl ListQuery {
    /// Page size clamped to `1..=MAX_PER_PAGE`.
    pub fn limit(&self) -> u32 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// Row offset for the requested page (pages are 1-based).
    pub fn offset(&self) -> u32 {
        self.page.max(1).saturating_sub(1).saturating_mul(self.limit())
    }

    /// Stable cache-key fragment for this query.
    pub fn cache_fragment(&self) -> String {
        format!(
            "p{}_pp{}:k{}",
            self.page.max(1),
            self.limit(),
            self.keyword.as_deref().unwrap_or("")
        )
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}
