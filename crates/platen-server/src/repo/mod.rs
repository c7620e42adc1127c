use platen_core::Error;
use sea_orm::{DbErr, SqlErr};

pub mod files;
pub mod jobs;
pub mod printers;
pub mod users;

/// Map a database error into the core taxonomy without attributing it to a
/// specific unique key. Use `map_unique` at insert/update sites that know
/// which constraint can fire.
pub fn map_db_err(err: DbErr) -> Error {
    if is_unique_violation(&err) {
        return Error::unique("record", "unique field");
    }
    Error::Repository(err.to_string())
}

/// Like `map_db_err`, but attributes a unique violation to `entity.field`.
pub fn map_unique(err: DbErr, entity: &str, field: &str) -> Error {
    if is_unique_violation(&err) {
        return Error::unique(entity, field);
    }
    Error::Repository(err.to_string())
}

fn is_unique_violation(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    // Fallback for backends whose driver error is not classified.
    let text = err.to_string().to_ascii_lowercase();
    text.contains("unique constraint") || text.contains("duplicate key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_errors_are_not_unique_violations() {
        let err = DbErr::Custom("connection reset".to_string());
        assert!(!is_unique_violation(&err));
        assert!(matches!(map_db_err(err), Error::Repository(_)));
    }

    #[test]
    fn unique_violation_text_is_recognised() {
        let err = DbErr::Custom("UNIQUE constraint failed: jobs.name".to_string());
        assert!(is_unique_violation(&err));
        let mapped = map_unique(err, "job", "name");
        assert!(matches!(mapped, Error::UniqueConstraint { .. }));
    }
}
