//! LIMIT / OFFSET handling

/// Pagination configuration. Pages are 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl Pagination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    /// Effective limit; a page without a limit uses `per_page`
    pub fn effective_limit(&self, per_page: i64) -> Option<i64> {
        match (self.limit, self.page) {
            (Some(limit), _) => Some(limit),
            (None, Some(_)) => Some(per_page),
            (None, None) => None,
        }
    }

    /// `OFFSET = (page - 1) * limit`, saturating at `i64::MAX`
    pub fn offset(&self, per_page: i64) -> Option<i64> {
        let page = self.page.filter(|p| *p > 1)?;
        let limit = self.effective_limit(per_page)?.max(0);
        Some((page - 1).saturating_mul(limit))
    }

    pub fn to_sql(&self, per_page: i64) -> String {
        let mut clauses = Vec::new();

        if let Some(limit) = self.effective_limit(per_page) {
            clauses.push(format!("LIMIT {}", limit));
        }

        if let Some(offset) = self.offset(per_page) {
            clauses.push(format!("OFFSET {}", offset));
        }

        clauses.join(" ")
    }
}

