//! Builder state shared by [`MapBuilder`](super::MapBuilder) and
//! [`RecordBuilder`](super::RecordBuilder)

use tokio_util::sync::CancellationToken;

use cache_system::CacheKey;
use type_mapping::{adapt_concat_len, adapt_placeholders, adapt_where, inline_nulls, DbValue, Dialect};

use crate::query_builder::filter::QueryFilter;
use crate::query_builder::ordering::{parse_order, SortOrder};
use crate::query_builder::pagination::Pagination;
use crate::query_builder::sql_generation::SqlGenerator;

/// One conjunct of the WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Raw clause, possibly using the `"a,b|c"` field sugar
    Raw { clause: String, args: Vec<DbValue> },
    Filter(QueryFilter),
}

#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub table: String,
    pub database: String,
    pub selected: Vec<String>,
    pub conditions: Vec<Condition>,
    pub raw_query: Option<(String, Vec<DbValue>)>,
    pub order_by: Vec<(String, SortOrder)>,
    pub pagination: Pagination,
    pub per_page: i64,
    /// Builder calls in the order they were made
    pub trace: Vec<&'static str>,
    pub debug: bool,
    pub no_cache: bool,
    pub cancel: Option<CancellationToken>,
}

impl QueryState {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            per_page: 10,
            ..Self::default()
        }
    }

    pub fn database(&mut self, name: &str) {
        self.trace.push("database");
        self.database = name.to_string();
    }

    pub fn select(&mut self, columns: &[&str]) {
        self.trace.push("select");
        self.selected
            .extend(columns.iter().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()));
    }

    pub fn filter(&mut self, clause: &str, args: Vec<DbValue>) {
        self.trace.push("where");
        self.conditions.push(Condition::Raw {
            clause: clause.to_string(),
            args,
        });
    }

    pub fn filter_by(&mut self, filter: QueryFilter) {
        self.trace.push("filter_by");
        self.conditions.push(Condition::Filter(filter));
    }

    pub fn query(&mut self, raw: &str, args: Vec<DbValue>) {
        self.trace.push("query");
        self.raw_query = Some((raw.to_string(), args));
    }

    pub fn limit(&mut self, n: i64) {
        self.trace.push("limit");
        self.pagination.limit = Some(n);
    }

    pub fn page(&mut self, n: i64) {
        self.trace.push("page");
        self.pagination.page = Some(n);
    }

    pub fn order_by(&mut self, fields: &[&str]) {
        self.trace.push("order_by");
        self.order_by
            .extend(fields.iter().filter_map(|f| parse_order(f)));
    }

    pub fn has_where(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// WHERE body and its arguments, in canonical form
    pub fn where_clause(&self, dialect: Dialect) -> (String, Vec<DbValue>) {
        let mut args = Vec::new();
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|c| match c {
                Condition::Raw { clause, args: a } => {
                    args.extend(a.iter().cloned());
                    adapt_concat_len(&adapt_where(clause, Some(&self.table)), dialect)
                }
                Condition::Filter(filter) => {
                    SqlGenerator::build_condition_sql(filter, dialect, &mut args)
                }
            })
            .filter(|p| !p.is_empty())
            .collect();

        let clause = if parts.len() > 1 {
            parts
                .iter()
                .map(|p| format!("({})", p))
                .collect::<Vec<_>>()
                .join(" AND ")
        } else {
            parts.join("")
        };
        (clause, args)
    }

    fn projection(&self, default: &str) -> String {
        if self.selected.is_empty() {
            default.to_string()
        } else {
            self.selected.join(", ")
        }
    }

    /// Canonical SELECT. A raw query replaces the whole statement and ignores
    /// ordering and pagination.
    pub fn build_select(&self, dialect: Dialect, projection: &str) -> (String, Vec<DbValue>) {
        if let Some((raw, args)) = &self.raw_query {
            return (adapt_concat_len(raw, dialect), args.clone());
        }

        let mut sql = format!("SELECT {} FROM {}", self.projection(projection), self.table);
        let (clause, args) = self.where_clause(dialect);
        if !clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        let order = SqlGenerator::build_order_clause(&self.order_by);
        if !order.is_empty() {
            sql.push(' ');
            sql.push_str(&order);
        }
        let limit = self.pagination.to_sql(self.per_page);
        if !limit.is_empty() {
            sql.push(' ');
            sql.push_str(&limit);
        }
        (sql, args)
    }

    /// Canonical `SELECT COUNT(*)`
    pub fn build_count(&self, dialect: Dialect) -> (String, Vec<DbValue>) {
        if let Some((raw, args)) = &self.raw_query {
            return (
                format!("SELECT COUNT(*) FROM ({}) AS counted", adapt_concat_len(raw, dialect)),
                args.clone(),
            );
        }
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let (clause, args) = self.where_clause(dialect);
        if !clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        (sql, args)
    }

    /// Cache key for a statement built from this state
    pub fn cache_key(&self, database: &str, statement: &str, args: &[DbValue]) -> CacheKey {
        let mut key = CacheKey::new(database, &self.table).with_args(args);
        key.selected = self.selected.join(",");
        key.statement = statement.to_string();
        key.order_by = SqlGenerator::build_order_clause(&self.order_by);
        key.where_clause = self
            .conditions
            .iter()
            .map(|c| format!("{:?}", c))
            .collect::<Vec<_>>()
            .join(";");
        key.raw_query = self
            .raw_query
            .as_ref()
            .map(|(raw, _)| raw.clone())
            .unwrap_or_default();
        key.limit = self.pagination.limit.unwrap_or(0);
        key.page = self.pagination.page.unwrap_or(0);
        key.offset = self.pagination.offset(self.per_page).unwrap_or(0);
        key
    }
}

/// Last rewrite before execution: literal NULLs, then dialect placeholders
pub fn finalize(sql: &str, args: Vec<DbValue>, dialect: Dialect) -> (String, Vec<DbValue>) {
    let (sql, args) = inline_nulls(sql, args);
    (adapt_placeholders(&sql, dialect), args)
}
