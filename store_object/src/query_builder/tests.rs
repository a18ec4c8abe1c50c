//! Statement composition tests

#[cfg(test)]
mod tests {
    use crate::query_builder::state::finalize;
    use crate::query_builder::{
        ordering::parse_order, Pagination, QueryFilter, QueryState, SortOrder, SqlGenerator,
    };
    use type_mapping::{args, DbValue, Dialect};

    fn select(state: &QueryState, dialect: Dialect) -> (String, Vec<DbValue>) {
        let (sql, args) = state.build_select(dialect, "*");
        finalize(&sql, args, dialect)
    }

    // ========================================
    // WHERE sugar and placeholders
    // ========================================

    #[test]
    fn test_where_sugar_mysql() {
        let mut state = QueryState::new("u");
        state.filter("email,age", args!["a@b", 30]);

        let (sql, args) = select(&state, Dialect::Mysql);
        assert_eq!(sql, "SELECT * FROM u WHERE u.email = ? AND u.age = ?");
        assert_eq!(args, vec![DbValue::Text("a@b".into()), DbValue::Int(30)]);
    }

    #[test]
    fn test_where_sugar_postgres_placeholders() {
        let mut state = QueryState::new("u");
        state.filter("email,age", args!["a@b", 30]);

        let (sql, _) = select(&state, Dialect::Postgres);
        assert_eq!(sql, "SELECT * FROM u WHERE u.email = $1 AND u.age = $2");
    }

    #[test]
    fn test_where_sugar_or() {
        let mut state = QueryState::new("u");
        state.filter("email|name", args!["x", "y"]);

        let (sql, _) = select(&state, Dialect::Maria);
        assert_eq!(sql, "SELECT * FROM u WHERE u.email = ? OR u.name = ?");
    }

    #[test]
    fn test_explicit_clause_is_kept() {
        let mut state = QueryState::new("u");
        state.filter("id > ? AND name LIKE ?", args![3, "a%"]);

        let (sql, _) = select(&state, Dialect::Sqlite);
        assert_eq!(sql, "SELECT * FROM u WHERE id > $1 AND name LIKE $2");
    }

    #[test]
    fn test_multiple_conditions_are_grouped() {
        let mut state = QueryState::new("u");
        state.filter("id = ? OR id = ?", args![1, 2]);
        state.filter_by(QueryFilter::eq("active", true));

        let (sql, args) = select(&state, Dialect::Mysql);
        assert_eq!(
            sql,
            "SELECT * FROM u WHERE (id = ? OR id = ?) AND (active = ?)"
        );
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_null_argument_becomes_is_null() {
        let mut state = QueryState::new("u");
        state.filter("name = ? AND age = ?", vec![DbValue::Null, DbValue::Int(4)]);

        let (sql, args) = select(&state, Dialect::Postgres);
        assert_eq!(sql, "SELECT * FROM u WHERE name IS NULL AND age = $1");
        assert_eq!(args, vec![DbValue::Int(4)]);
    }

    #[test]
    fn test_len_is_adapted_in_where() {
        let mut state = QueryState::new("u");
        state.filter("len(name) > ?", args![3]);

        let (sql, _) = select(&state, Dialect::Sqlite);
        assert_eq!(sql, "SELECT * FROM u WHERE length(name) > $1");
        let (sql, _) = select(&state, Dialect::Mysql);
        assert_eq!(sql, "SELECT * FROM u WHERE char_length(name) > ?");
    }

    // ========================================
    // Projection, ordering, pagination
    // ========================================

    #[test]
    fn test_select_order_limit_page() {
        let mut state = QueryState::new("posts");
        state.select(&["id", "title"]);
        state.order_by(&["-created", "+title", "id"]);
        state.limit(20);
        state.page(3);

        let (sql, _) = select(&state, Dialect::Mysql);
        assert_eq!(
            sql,
            "SELECT id, title FROM posts ORDER BY created DESC, title ASC, id ASC LIMIT 20 OFFSET 40"
        );
    }

    #[test]
    fn test_page_without_limit_uses_default() {
        let mut state = QueryState::new("posts");
        state.per_page = 10;
        state.page(2);

        let (sql, _) = select(&state, Dialect::Sqlite);
        assert_eq!(sql, "SELECT * FROM posts LIMIT 10 OFFSET 10");
    }

    #[test]
    fn test_raw_query_disables_order_and_limit() {
        let mut state = QueryState::new("posts");
        state.order_by(&["-id"]);
        state.limit(5);
        state.query("SELECT title FROM posts WHERE id = ?", args![9]);

        let (sql, args) = select(&state, Dialect::Postgres);
        assert_eq!(sql, "SELECT title FROM posts WHERE id = $1");
        assert_eq!(args, vec![DbValue::Int(9)]);
    }

    #[test]
    fn test_count_statement() {
        let mut state = QueryState::new("u");
        state.filter("age", args![30]);
        let (sql, _) = state.build_count(Dialect::Mysql);
        assert_eq!(sql, "SELECT COUNT(*) FROM u WHERE u.age = ?");

        state.query("SELECT * FROM u", vec![]);
        let (sql, _) = state.build_count(Dialect::Mysql);
        assert_eq!(sql, "SELECT COUNT(*) FROM (SELECT * FROM u) AS counted");
    }

    #[test]
    fn test_parse_order() {
        assert_eq!(parse_order("-id"), Some(("id".into(), SortOrder::Desc)));
        assert_eq!(parse_order("+id"), Some(("id".into(), SortOrder::Asc)));
        assert_eq!(parse_order(" name "), Some(("name".into(), SortOrder::Asc)));
        assert_eq!(parse_order("-"), None);
    }

    #[test]
    fn test_pagination_edges() {
        let p = Pagination::new().with_limit(10).with_page(1);
        assert_eq!(p.to_sql(10), "LIMIT 10");
        let p = Pagination::new().with_page(0);
        assert_eq!(p.offset(10), None);
        assert_eq!(Pagination::new().to_sql(10), "");
    }

    #[test]
    fn test_huge_page_saturates_offset() {
        let p = Pagination::new().with_page(i64::MAX).with_limit(50);
        assert_eq!(p.offset(10), Some(i64::MAX));
        assert_eq!(p.to_sql(10), format!("LIMIT 50 OFFSET {}", i64::MAX));
        assert_eq!(Pagination::new().with_page(4).with_limit(-5).offset(10), Some(0));

        let mut state = QueryState::new("t");
        state.per_page = i64::MAX;
        state.page(i64::MAX);
        let (sql, args) = state.build_select(Dialect::Sqlite, "*");
        let key = state.cache_key("db", &sql, &args);
        assert_eq!(key.offset, i64::MAX);
        assert_eq!(key.page, i64::MAX);
    }

    // ========================================
    // Structured filters
    // ========================================

    #[test]
    fn test_filter_operators() {
        let mut values = Vec::new();
        let sql = SqlGenerator::build_filters(
            &[
                QueryFilter::gte("age", 18),
                QueryFilter::ne("name", "bob"),
                QueryFilter::is_not_null("email"),
            ],
            Dialect::Sqlite,
            &mut values,
        );
        assert_eq!(sql, "age >= ? AND name != ? AND email IS NOT NULL");
        assert_eq!(values, vec![DbValue::Int(18), DbValue::Text("bob".into())]);
    }

    #[test]
    fn test_filter_nested_groups() {
        let filter = QueryFilter::or(vec![
            QueryFilter::eq("status", "active"),
            QueryFilter::and(vec![
                QueryFilter::eq("status", "pending"),
                QueryFilter::lt("age", 30),
            ]),
        ]);
        let mut values = Vec::new();
        let sql = SqlGenerator::build_condition_sql(&filter, Dialect::Mysql, &mut values);
        assert_eq!(sql, "(status = ? OR (status = ? AND age < ?))");
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_filter_empty_in_lists() {
        let mut values = Vec::new();
        let empty: [i64; 0] = [];
        let sql = SqlGenerator::build_filters(
            &[
                QueryFilter::in_values("id", &empty),
                QueryFilter::not_in_values("id", &empty),
            ],
            Dialect::Postgres,
            &mut values,
        );
        assert_eq!(sql, "1=0 AND 1=1");
        assert!(values.is_empty());
    }

    #[test]
    fn test_filter_in_list() {
        let mut values = Vec::new();
        let sql = SqlGenerator::build_condition_sql(
            &QueryFilter::in_values("id", &[1, 2, 3]),
            Dialect::Mysql,
            &mut values,
        );
        assert_eq!(sql, "id IN (?, ?, ?)");
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_ilike_per_dialect() {
        let filter = QueryFilter::ilike("name", "%Ann%");
        let mut values = Vec::new();
        assert_eq!(
            SqlGenerator::build_condition_sql(&filter, Dialect::Postgres, &mut values),
            "name ILIKE ?"
        );
        assert_eq!(
            SqlGenerator::build_condition_sql(&filter, Dialect::Sqlite, &mut values),
            "LOWER(name) LIKE LOWER(?)"
        );
    }

    #[test]
    fn test_eq_null_becomes_is_null() {
        let mut values = Vec::new();
        let sql = SqlGenerator::build_condition_sql(
            &QueryFilter::eq("deleted_at", DbValue::Null),
            Dialect::Mysql,
            &mut values,
        );
        assert_eq!(sql, "deleted_at IS NULL");
        assert!(values.is_empty());
    }

    #[test]
    fn test_special_characters_stay_bound() {
        let mut state = QueryState::new("u");
        state.filter_by(QueryFilter::eq("name", "'; DROP TABLE users; --"));
        let (sql, args) = select(&state, Dialect::Mysql);
        assert_eq!(sql, "SELECT * FROM u WHERE name = ?");
        assert_eq!(args, vec![DbValue::Text("'; DROP TABLE users; --".into())]);
    }

    // ========================================
    // Cache keys and call trace
    // ========================================

    #[test]
    fn test_cache_key_separates_databases_and_args() {
        let mut state = QueryState::new("t");
        state.filter("id", args![1]);
        let (sql, args) = state.build_select(Dialect::Sqlite, "*");

        let a = state.cache_key("db1", &sql, &args);
        let b = state.cache_key("db2", &sql, &args);
        assert_ne!(a, b);
        assert_eq!(a, state.cache_key("db1", &sql, &args));

        let other = state.cache_key("db1", &sql, &args![2]);
        assert_ne!(a, other);
    }

    #[test]
    fn test_call_trace_order() {
        let mut state = QueryState::new("t");
        state.select(&["a"]);
        state.filter("a", args![1]);
        state.limit(1);
        assert_eq!(state.trace, vec!["select", "where", "limit"]);
    }
}
