//! Structured cache keys

use type_mapping::DbValue;

/// Every builder field that influences the generated SELECT.
///
/// Two builders with equal state produce equal keys; the database name is part
/// of the key so identical tables in different databases never collide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub database: String,
    pub table: String,
    pub selected: String,
    pub statement: String,
    pub order_by: String,
    pub where_clause: String,
    pub raw_query: String,
    pub offset: i64,
    pub limit: i64,
    pub page: i64,
    pub args: String,
}

impl CacheKey {
    pub fn new(database: &str, table: &str) -> Self {
        Self {
            database: database.to_string(),
            table: table.to_string(),
            ..Self::default()
        }
    }

    /// Stringify query arguments so they can take part in hashing
    pub fn stringify_args(args: &[DbValue]) -> String {
        args.iter()
            .map(|a| format!("{}:{}", a.type_name(), a))
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn with_args(mut self, args: &[DbValue]) -> Self {
        self.args = Self::stringify_args(args);
        self
    }

    pub fn matches(&self, database: &str, table: &str) -> bool {
        self.database == database && self.table == table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(key: &CacheKey) -> u64 {
        let mut h = DefaultHasher::new();
        key.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_equal_state_equal_hash() {
        let a = CacheKey {
            where_clause: "email = ?".into(),
            limit: 10,
            ..CacheKey::new("main", "users")
        }
        .with_args(&[DbValue::Text("a@b".into())]);
        let b = CacheKey {
            where_clause: "email = ?".into(),
            limit: 10,
            ..CacheKey::new("main", "users")
        }
        .with_args(&[DbValue::Text("a@b".into())]);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_database_and_args_distinguish_keys() {
        let a = CacheKey::new("one", "t");
        let b = CacheKey::new("two", "t");
        assert_ne!(a, b);

        let x = CacheKey::new("one", "t").with_args(&[DbValue::Int(1)]);
        let y = CacheKey::new("one", "t").with_args(&[DbValue::Text("1".into())]);
        assert_ne!(x, y);
    }
}
