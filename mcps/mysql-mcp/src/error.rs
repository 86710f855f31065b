//! Error taxonomy for the gate
//!
//! [`GateError`] is what callers see. Driver failures arrive as
//! [`DriverError`] and are reduced to a stable, redacted message by
//! [`format_database_error`] before they become a `GateError::Driver`.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    /// Malformed or dangerous SQL, bad parameters, bad tool arguments
    #[error("{0}")]
    Validation(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not connected to database")]
    NotConnected,

    /// Engine-reported failure, already formatted and redacted
    #[error("{0}")]
    Driver(String),

    #[error("{0}")]
    TransactionState(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GateError {
    /// Stable category name, included in error envelope details
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::Validation(_) | GateError::InvalidIdentifier(_) => "validation_error",
            GateError::PermissionDenied(_) => "permission_denied",
            GateError::NotConnected => "not_connected",
            GateError::Driver(_) => "driver_error",
            GateError::TransactionState(_) => "transaction_state_error",
            GateError::Config(_) => "config_error",
        }
    }
}

/// Raw failure reported by a [`crate::db::Database`] implementation
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self,
            DriverError::PoolClosed | DriverError::Sqlx(sqlx::Error::PoolClosed)
        )
    }
}

impl From<DriverError> for GateError {
    fn from(err: DriverError) -> Self {
        if err.is_disconnected() {
            GateError::NotConnected
        } else {
            GateError::Driver(format_database_error(&err.to_string()))
        }
    }
}

static MISSING_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"table '([^']+)' doesn't exist").expect("Invalid missing table regex")
});

static PASSWORD_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)password["']?\s*[:=]\s*["']?[^"'\s]+"#).expect("Invalid password regex")
});

static URL_CREDENTIALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"mysql://[^@]+@").expect("Invalid URL credentials regex"));

/// Map raw driver error text to a user-facing message
///
/// Common engine failures collapse to fixed messages; anything else is
/// passed through as `Database error: ...` with passwords and URL
/// credentials masked.
pub fn format_database_error(raw: &str) -> String {
    let lower = raw.to_lowercase();

    if lower.contains("access denied") || lower.contains("password") {
        return "Database authentication failed. Please check credentials.".to_string();
    }
    if lower.contains("timeout") || lower.contains("timed out") {
        return "Database connection timed out. Please try again.".to_string();
    }
    if lower.contains("connection refused") || lower.contains("can't connect") {
        return "Unable to connect to database. Please check if the database is running."
            .to_string();
    }
    if lower.contains("unknown database") {
        return "Database not found. Please check the database name.".to_string();
    }
    if lower.contains("table") && lower.contains("doesn't exist") {
        return match MISSING_TABLE.captures(&lower) {
            Some(caps) => format!("Table '{}' does not exist.", &caps[1]),
            None => "Table does not exist.".to_string(),
        };
    }
    if lower.contains("duplicate entry") {
        return "Duplicate entry error. A record with this value already exists.".to_string();
    }
    if lower.contains("foreign key constraint") {
        return "Foreign key constraint violation. Please check related records.".to_string();
    }
    if lower.contains("syntax error") {
        return "SQL syntax error. Please check your query.".to_string();
    }

    let redacted = PASSWORD_FRAGMENT.replace_all(raw, "password=***");
    let redacted = URL_CREDENTIALS.replace_all(&redacted, "mysql://***@");
    format!("Database error: {}", redacted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_categories() {
        assert_eq!(
            format_database_error("Access denied for user 'app'@'10.0.0.1'"),
            "Database authentication failed. Please check credentials."
        );
        assert_eq!(
            format_database_error("pool timed out while waiting for an open connection"),
            "Database connection timed out. Please try again."
        );
        assert_eq!(
            format_database_error("error communicating with database: Connection refused (os error 111)"),
            "Unable to connect to database. Please check if the database is running."
        );
        assert_eq!(
            format_database_error("error returned from database: 1049 (42000): Unknown database 'shop'"),
            "Database not found. Please check the database name."
        );
        assert_eq!(
            format_database_error("Duplicate entry 'a@b.c' for key 'users.email'"),
            "Duplicate entry error. A record with this value already exists."
        );
        assert_eq!(
            format_database_error("Cannot add or update a child row: a foreign key constraint fails"),
            "Foreign key constraint violation. Please check related records."
        );
        assert_eq!(
            format_database_error("You have an error in your SQL syntax; check the manual ... syntax error"),
            "SQL syntax error. Please check your query."
        );
    }

    #[test]
    fn test_missing_table_name_is_extracted() {
        assert_eq!(
            format_database_error("1146 (42S02): Table 'shop.orders' doesn't exist"),
            "Table 'shop.orders' does not exist."
        );
        assert_eq!(
            format_database_error("table orders doesn't exist"),
            "Table does not exist."
        );
    }

    #[test]
    fn test_passthrough_is_redacted() {
        let msg = format_database_error("bad url mysql://app:s3cret@db:3306/shop");
        assert_eq!(msg, "Database error: bad url mysql://***@db:3306/shop");
        assert!(!msg.contains("s3cret"));
    }

    #[test]
    fn test_disconnected_driver_error_is_not_connected() {
        let err: GateError = DriverError::PoolClosed.into();
        assert!(matches!(err, GateError::NotConnected));
        assert_eq!(err.kind(), "not_connected");

        let err: GateError = DriverError::Sqlx(sqlx::Error::PoolClosed).into();
        assert!(matches!(err, GateError::NotConnected));
    }

    #[test]
    fn test_driver_error_is_formatted() {
        let err: GateError = DriverError::Other("Duplicate entry '1' for key 'PRIMARY'".into()).into();
        assert_eq!(
            err.to_string(),
            "Duplicate entry error. A record with this value already exists."
        );
    }
}
