//! SQL quoting for the queries the store and the ingest loader generate.
//!
//! Table and canonical column names are validated identifiers. Source CSV
//! headers such as `Temperature (c)` are quoted verbatim. User-supplied
//! strings only ever reach SQL as single-quoted literals.

use crate::error::{Result, WqError};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_IDENTIFIER_LEN: usize = 128;
const MAX_LITERAL_LEN: usize = 1024;

static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
    // Hard-coded pattern, known to be valid.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*$")
        .expect("Hard-coded regex pattern should be valid")
});

/// SQL identifier and literal escaping utilities.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates and double-quotes a SQL identifier.
    ///
    /// # Examples
    /// ```rust
    /// use wq_guard::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_identifier("odo").unwrap(), "\"odo\"");
    /// assert!(SqlSecurity::escape_identifier("odo; DROP TABLE observations--").is_err());
    /// ```
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;
        Ok(format!("\"{identifier}\""))
    }

    /// Validates a SQL identifier without escaping it.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(WqError::Configuration(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }
        if identifier.len() > MAX_IDENTIFIER_LEN {
            return Err(WqError::Configuration(format!(
                "SQL identifier too long (max {MAX_IDENTIFIER_LEN} characters)"
            )));
        }
        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(WqError::Configuration(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers, underscores, and dots"
            )));
        }
        Self::check_reserved_words(identifier)
    }

    /// Quotes an arbitrary column header (spaces, parentheses, slashes allowed).
    pub fn quote_identifier(name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(WqError::Configuration(
                "column name cannot be empty".to_string(),
            ));
        }
        if name.len() > MAX_IDENTIFIER_LEN {
            return Err(WqError::Configuration(format!(
                "column name too long (max {MAX_IDENTIFIER_LEN} characters)"
            )));
        }
        if name.contains('\0') {
            return Err(WqError::Configuration(
                "column name cannot contain null bytes".to_string(),
            ));
        }
        Ok(format!("\"{}\"", name.replace('"', "\"\"")))
    }

    /// Renders `value` as a single-quoted SQL string literal.
    pub fn quote_literal(value: &str) -> Result<String> {
        if value.len() > MAX_LITERAL_LEN {
            return Err(WqError::invalid_argument(format!(
                "parameter value too long (max {MAX_LITERAL_LEN} characters)"
            )));
        }
        if value.contains('\0') {
            return Err(WqError::invalid_argument(
                "parameter value cannot contain null bytes",
            ));
        }
        Ok(format!("'{}'", value.replace('\'', "''")))
    }

    fn check_reserved_words(identifier: &str) -> Result<()> {
        const RESERVED: &[&str] = &[
            "union", "select", "insert", "update", "delete", "drop", "create", "alter", "exec",
            "execute", "declare", "truncate",
        ];

        let lower = identifier.to_lowercase();
        for word in lower.split(['.', '_']) {
            if RESERVED.contains(&word) {
                return Err(WqError::Configuration(format!(
                    "SQL identifier contains reserved word: '{word}'"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        for ident in ["observations", "temperature", "_row_id", "wq.observations"] {
            assert!(SqlSecurity::escape_identifier(ident).is_ok(), "{ident}");
        }
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(SqlSecurity::escape_identifier("").is_err());
        assert!(SqlSecurity::escape_identifier("1col").is_err());
        assert!(SqlSecurity::escape_identifier("a;b").is_err());
        assert!(SqlSecurity::escape_identifier("drop_table").is_err());
        assert!(SqlSecurity::escape_identifier(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_quote_identifier_keeps_source_headers() {
        assert_eq!(
            SqlSecurity::quote_identifier("Temperature (c)").unwrap(),
            "\"Temperature (c)\""
        );
        assert_eq!(
            SqlSecurity::quote_identifier("ODO mg/L").unwrap(),
            "\"ODO mg/L\""
        );
        assert_eq!(SqlSecurity::quote_identifier("a\"b").unwrap(), "\"a\"\"b\"");
        assert!(SqlSecurity::quote_identifier("bad\0").is_err());
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(SqlSecurity::quote_literal("03/14/21").unwrap(), "'03/14/21'");
        assert_eq!(
            SqlSecurity::quote_literal("x' OR '1'='1").unwrap(),
            "'x'' OR ''1''=''1'"
        );
        let err = SqlSecurity::quote_literal("a\0b").unwrap_err();
        assert!(err.is_client_error());
    }
}
