//! Identifier validation
//!
//! Table and column names end up inside generated SQL, so every name that
//! enters the registry is checked here first.

use std::fmt;
use thiserror::Error;

/// Validation errors for database identifiers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid characters in name '{0}': only alphanumeric characters and underscores are allowed")]
    InvalidCharacters(String),

    #[error("Name '{name}' is too long: {length} characters (max {max_length})")]
    TooLong {
        name: String,
        length: usize,
        max_length: usize,
    },

    #[error("Name cannot be empty")]
    Empty,

    #[error("Name '{0}' must start with a letter or underscore")]
    InvalidStartCharacter(String),

    #[error("Name '{0}' is a reserved SQL keyword")]
    ReservedKeyword(String),
}

/// PostgreSQL identifier length limit
const MAX_LENGTH: usize = 63;

/// Statement keywords that would break unquoted where-clause sugar
const RESERVED_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "FROM", "WHERE", "JOIN", "ON", "AS", "AND", "OR",
    "NOT", "NULL", "TRUE", "FALSE", "CASE", "WHEN", "THEN", "ELSE", "END", "IN", "LIKE", "BETWEEN",
    "ORDER", "BY", "GROUP", "HAVING", "LIMIT", "OFFSET", "UNION", "DISTINCT", "CREATE", "DROP",
    "ALTER", "TABLE", "PRIMARY", "FOREIGN", "REFERENCES", "CONSTRAINT",
];

fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }

    if name.len() > MAX_LENGTH {
        return Err(ValidationError::TooLong {
            name: name.to_string(),
            length: name.len(),
            max_length: MAX_LENGTH,
        });
    }

    let first_char = name.chars().next().ok_or(ValidationError::Empty)?;
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(ValidationError::InvalidStartCharacter(name.to_string()));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidCharacters(name.to_string()));
    }

    if RESERVED_KEYWORDS.contains(&name.to_ascii_uppercase().as_str()) {
        return Err(ValidationError::ReservedKeyword(name.to_string()));
    }

    Ok(())
}

/// A validated table name that is safe to use in SQL queries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedTableName(String);

impl ValidatedTableName {
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        validate_identifier(name)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated column name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedFieldName(String);

impl ValidatedFieldName {
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        validate_identifier(name)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedFieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn validate_table_name(name: &str) -> Result<ValidatedTableName, ValidationError> {
    ValidatedTableName::new(name)
}

pub fn validate_field_name(name: &str) -> Result<ValidatedFieldName, ValidationError> {
    ValidatedFieldName::new(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_table_names() {
        for name in ["users", "user_profiles", "_tables_infos", "m2m_users_groups", "t1"] {
            assert!(validate_table_name(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_table_names() {
        assert_eq!(validate_table_name(""), Err(ValidationError::Empty));
        assert!(matches!(
            validate_table_name("1users"),
            Err(ValidationError::InvalidStartCharacter(_))
        ));
        assert!(matches!(
            validate_table_name("users; DROP TABLE users; --"),
            Err(ValidationError::InvalidCharacters(_))
        ));
        assert!(matches!(
            validate_table_name("select"),
            Err(ValidationError::ReservedKeyword(_))
        ));
    }

    #[test]
    fn test_too_long_name() {
        let name = "a".repeat(64);
        assert!(matches!(
            validate_field_name(&name),
            Err(ValidationError::TooLong { length: 64, .. })
        ));
        assert!(validate_field_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_display() {
        let name = ValidatedTableName::new("orders").unwrap();
        assert_eq!(name.to_string(), "orders");
        assert_eq!(name.into_string(), "orders");
    }
}
