//! SQL statement helpers.
//!
//! Read-only guard for ad hoc queries and statement splitting for script files.

use regex_lite::Regex;

use crate::errors::AppError;

/// Validates and splits SQL text.
pub struct SqlValidator;

/// Whole-word keywords rejected by the read-only guard. Any run of
/// whitespace may separate `DELETE` and `FROM`.
const FORBIDDEN_PATTERN: &str = r"(?i)\b(?:DROP|TRUNCATE|ALTER)\b|\bDELETE\s+FROM\b";

impl SqlValidator {
    /// Rejects statements that drop, truncate, delete or alter.
    ///
    /// # Errors
    /// Returns `AppError::UnsafeSql` if the SQL contains forbidden keywords.
    pub fn validate(sql: &str) -> Result<(), AppError> {
        let forbidden = Regex::new(FORBIDDEN_PATTERN)
            .map_err(|e| AppError::Config(format!("bad SQL guard pattern: {}", e)))?;
        match forbidden.find(sql) {
            Some(hit) => {
                let keyword = hit
                    .as_str()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_uppercase();
                Err(AppError::UnsafeSql(format!("forbidden operation: {}", keyword)))
            }
            None => Ok(()),
        }
    }

    /// Splits a script into statements.
    ///
    /// With `multi_part` the text is split on `;`; otherwise the whole text
    /// is one statement. Whitespace-only pieces are dropped.
    pub fn split_statements(script: &str, multi_part: bool) -> Vec<String> {
        let pieces: Vec<&str> = if multi_part {
            script.split(';').collect()
        } else {
            vec![script]
        };
        pieces
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}
