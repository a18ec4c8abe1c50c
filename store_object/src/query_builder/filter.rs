//! Structured filter trees
//!
//! Filters are rendered with canonical `?` placeholders by
//! [`SqlGenerator`](super::sql_generation::SqlGenerator).

use type_mapping::{DbValue, ToDbValue};

/// Query condition operators
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Eq,        // =
    Ne,        // !=
    Gt,        // >
    Gte,       // >=
    Lt,        // <
    Lte,       // <=
    Like,      // LIKE
    ILike,     // ILIKE (LOWER() LIKE LOWER() off postgres)
    In,        // IN
    NotIn,     // NOT IN
    IsNull,    // IS NULL
    IsNotNull, // IS NOT NULL
}

/// Value side of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    None,
    Single(DbValue),
    List(Vec<DbValue>),
}

/// Single condition in WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCondition {
    pub field: String,
    pub operator: QueryOperator,
    pub value: FilterValue,
}

/// Logical operators for combining conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

/// Query filter that can be nested
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    Condition(QueryCondition),
    Group {
        operator: LogicalOperator,
        filters: Vec<QueryFilter>,
    },
}

impl QueryFilter {
    pub fn condition(field: &str, operator: QueryOperator, value: FilterValue) -> Self {
        Self::Condition(QueryCondition {
            field: field.to_string(),
            operator,
            value,
        })
    }

    fn single(field: &str, operator: QueryOperator, value: &impl ToDbValue) -> Self {
        Self::condition(field, operator, FilterValue::Single(value.to_db_value()))
    }

    pub fn and(filters: Vec<QueryFilter>) -> Self {
        Self::Group {
            operator: LogicalOperator::And,
            filters,
        }
    }

    pub fn or(filters: Vec<QueryFilter>) -> Self {
        Self::Group {
            operator: LogicalOperator::Or,
            filters,
        }
    }

    pub fn eq(field: &str, value: impl ToDbValue) -> Self {
        Self::single(field, QueryOperator::Eq, &value)
    }

    pub fn ne(field: &str, value: impl ToDbValue) -> Self {
        Self::single(field, QueryOperator::Ne, &value)
    }

    pub fn gt(field: &str, value: impl ToDbValue) -> Self {
        Self::single(field, QueryOperator::Gt, &value)
    }

    pub fn gte(field: &str, value: impl ToDbValue) -> Self {
        Self::single(field, QueryOperator::Gte, &value)
    }

    pub fn lt(field: &str, value: impl ToDbValue) -> Self {
        Self::single(field, QueryOperator::Lt, &value)
    }

    pub fn lte(field: &str, value: impl ToDbValue) -> Self {
        Self::single(field, QueryOperator::Lte, &value)
    }

    pub fn like(field: &str, pattern: &str) -> Self {
        Self::single(field, QueryOperator::Like, &pattern)
    }

    /// Case-insensitive LIKE
    pub fn ilike(field: &str, pattern: &str) -> Self {
        Self::single(field, QueryOperator::ILike, &pattern)
    }

    pub fn in_values<V: ToDbValue>(field: &str, values: &[V]) -> Self {
        Self::condition(
            field,
            QueryOperator::In,
            FilterValue::List(values.iter().map(ToDbValue::to_db_value).collect()),
        )
    }

    pub fn not_in_values<V: ToDbValue>(field: &str, values: &[V]) -> Self {
        Self::condition(
            field,
            QueryOperator::NotIn,
            FilterValue::List(values.iter().map(ToDbValue::to_db_value).collect()),
        )
    }

    pub fn is_null(field: &str) -> Self {
        Self::condition(field, QueryOperator::IsNull, FilterValue::None)
    }

    pub fn is_not_null(field: &str) -> Self {
        Self::condition(field, QueryOperator::IsNotNull, FilterValue::None)
    }
}
