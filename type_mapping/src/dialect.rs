//! Supported SQL dialects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::DialectError;

/// The SQL variant spoken by a registered database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    Cockroach,
    Mysql,
    Maria,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Cockroach => "cockroach",
            Dialect::Mysql => "mysql",
            Dialect::Maria => "maria",
        }
    }

    /// PostgreSQL wire-compatible backends
    pub fn is_postgres_family(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Cockroach)
    }

    pub fn is_mysql_family(&self) -> bool {
        matches!(self, Dialect::Mysql | Dialect::Maria)
    }

    /// Whether `?` placeholders are rewritten to `$1, $2, ...`
    pub fn uses_numbered_placeholders(&self) -> bool {
        matches!(self, Dialect::Sqlite | Dialect::Postgres | Dialect::Cockroach)
    }

    /// Quote an identifier, doubling any embedded quote character
    pub fn quote_identifier(&self, name: &str) -> String {
        let quote = if self.is_postgres_family() { '"' } else { '`' };
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push(quote);
        for c in name.chars() {
            if c == quote {
                quoted.push(quote);
            }
            quoted.push(c);
        }
        quoted.push(quote);
        quoted
    }
}

impl FromStr for Dialect {
    type Err = DialectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "cockroach" | "cockroachdb" => Ok(Dialect::Cockroach),
            "mysql" => Ok(Dialect::Mysql),
            "maria" | "mariadb" => Ok(Dialect::Maria),
            other => Err(DialectError::UnsupportedDialect(other.to_string())),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
