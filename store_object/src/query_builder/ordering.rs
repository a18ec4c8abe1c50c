//! ORDER BY parsing

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Parse one order field: `-name` sorts descending, `+name` or `name` ascending
pub fn parse_order(field: &str) -> Option<(String, SortOrder)> {
    let field = field.trim();
    let (name, order) = if let Some(rest) = field.strip_prefix('-') {
        (rest, SortOrder::Desc)
    } else if let Some(rest) = field.strip_prefix('+') {
        (rest, SortOrder::Asc)
    } else {
        (field, SortOrder::Asc)
    };
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some((name.to_string(), order))
    }
}
