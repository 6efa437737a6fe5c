//! Database-specific error types and conversions.

use warden_core::error::WardenError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// Another transaction wrote the same record first. The statement can
    /// be run again as-is.
    #[error("Write conflict: {0}")]
    Conflict(String),
}

impl DbError {
    /// Classify an error raised while sending a statement.
    pub(crate) fn store(err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if is_retryable(&message) {
            DbError::Conflict(message)
        } else {
            DbError::Surreal(err)
        }
    }

    /// Classify an error reported by `Response::check`.
    pub(crate) fn query(err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if is_retryable(&message) {
            DbError::Conflict(message)
        } else {
            DbError::Query(message)
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }
}

fn is_retryable(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("can be retried")
        || message.contains("transaction conflict")
        || message.contains("write conflict")
}

impl From<DbError> for WardenError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => WardenError::NotFound { entity, id },
            other => WardenError::Database(other.to_string()),
        }
    }
}

/// Parse a UUID column, naming the column in the error.
pub(crate) fn parse_uuid(column: &str, value: &str) -> Result<uuid::Uuid, DbError> {
    uuid::Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("invalid {column} UUID: {e}")))
}

/// Parse an optional UUID column.
pub(crate) fn parse_opt_uuid(
    column: &str,
    value: Option<&str>,
) -> Result<Option<uuid::Uuid>, DbError> {
    value.map(|v| parse_uuid(column, v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_messages_are_conflicts() {
        assert!(is_retryable(
            "Transaction conflict: Write conflict, retry the transaction. \
             This transaction can be retried"
        ));
        assert!(is_retryable("Failed to commit transaction due to a read or write conflict"));
        assert!(!is_retryable("Database record `credential:abc` already exists"));
        assert!(!is_retryable("Parse error: unexpected token"));
    }

    #[test]
    fn conflicts_surface_as_database_errors() {
        let err: WardenError = DbError::Conflict("write conflict".into()).into();
        assert!(matches!(err, WardenError::Database(msg) if msg.contains("write conflict")));
    }
}
