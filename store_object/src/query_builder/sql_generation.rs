//! Canonical SQL fragments
//!
//! Everything here emits `?` placeholders; dialect placeholders are applied once
//! on the finished statement.

use type_mapping::{DbValue, Dialect};

use crate::query_builder::filter::{
    FilterValue, LogicalOperator, QueryCondition, QueryFilter, QueryOperator,
};
use crate::query_builder::ordering::SortOrder;

pub struct SqlGenerator;

impl SqlGenerator {
    /// Build the body of a WHERE clause (without the keyword)
    pub fn build_filters(
        filters: &[QueryFilter],
        dialect: Dialect,
        values: &mut Vec<DbValue>,
    ) -> String {
        filters
            .iter()
            .map(|f| Self::build_condition_sql(f, dialect, values))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    pub fn build_condition_sql(
        filter: &QueryFilter,
        dialect: Dialect,
        values: &mut Vec<DbValue>,
    ) -> String {
        match filter {
            QueryFilter::Condition(condition) => {
                Self::build_single_condition_sql(condition, dialect, values)
            }
            QueryFilter::Group { operator, filters } => {
                if filters.is_empty() {
                    return match operator {
                        LogicalOperator::And => "1=1".to_string(),
                        LogicalOperator::Or => "1=0".to_string(),
                    };
                }
                let operator_str = match operator {
                    LogicalOperator::And => " AND ",
                    LogicalOperator::Or => " OR ",
                };

                let group_conditions = filters
                    .iter()
                    .map(|f| Self::build_condition_sql(f, dialect, values))
                    .collect::<Vec<_>>()
                    .join(operator_str);

                format!("({})", group_conditions)
            }
        }
    }

    fn build_single_condition_sql(
        condition: &QueryCondition,
        dialect: Dialect,
        values: &mut Vec<DbValue>,
    ) -> String {
        let field = &condition.field;

        let comparison = |symbol: &str, values: &mut Vec<DbValue>| match &condition.value {
            FilterValue::Single(value) => {
                values.push(value.clone());
                format!("{} {} ?", field, symbol)
            }
            _ => "1=0".to_string(),
        };

        match &condition.operator {
            QueryOperator::Eq => match &condition.value {
                FilterValue::None | FilterValue::Single(DbValue::Null) => {
                    format!("{} IS NULL", field)
                }
                _ => comparison("=", values),
            },
            QueryOperator::Ne => match &condition.value {
                FilterValue::None | FilterValue::Single(DbValue::Null) => {
                    format!("{} IS NOT NULL", field)
                }
                _ => comparison("!=", values),
            },
            QueryOperator::Gt => comparison(">", values),
            QueryOperator::Gte => comparison(">=", values),
            QueryOperator::Lt => comparison("<", values),
            QueryOperator::Lte => comparison("<=", values),
            QueryOperator::Like => comparison("LIKE", values),
            QueryOperator::ILike => match &condition.value {
                FilterValue::Single(value) => {
                    values.push(value.clone());
                    if dialect.is_postgres_family() {
                        format!("{} ILIKE ?", field)
                    } else {
                        format!("LOWER({}) LIKE LOWER(?)", field)
                    }
                }
                _ => "1=0".to_string(),
            },
            QueryOperator::In => match &condition.value {
                FilterValue::List(list) if !list.is_empty() => {
                    values.extend(list.iter().cloned());
                    format!("{} IN ({})", field, Self::placeholders(list.len()))
                }
                // Empty IN clause
                _ => "1=0".to_string(),
            },
            QueryOperator::NotIn => match &condition.value {
                FilterValue::List(list) if !list.is_empty() => {
                    values.extend(list.iter().cloned());
                    format!("{} NOT IN ({})", field, Self::placeholders(list.len()))
                }
                _ => "1=1".to_string(),
            },
            QueryOperator::IsNull => format!("{} IS NULL", field),
            QueryOperator::IsNotNull => format!("{} IS NOT NULL", field),
        }
    }

    /// `?, ?, ?`
    pub fn placeholders(n: usize) -> String {
        vec!["?"; n].join(", ")
    }

    /// Build ORDER BY clause
    pub fn build_order_clause(order_by: &[(String, SortOrder)]) -> String {
        if order_by.is_empty() {
            return String::new();
        }

        let order_items: Vec<String> = order_by
            .iter()
            .map(|(field, order)| format!("{} {}", field, order.to_sql()))
            .collect();

        format!("ORDER BY {}", order_items.join(", "))
    }
}
