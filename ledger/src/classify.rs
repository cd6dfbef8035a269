use serde::Serialize;
use std::fmt;

use crate::error::StorageError;

/// Storage engine family, fixed for the lifetime of a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Sqlite => f.write_str("sqlite"),
            Dialect::Postgres => f.write_str("postgres"),
        }
    }
}

/// Error code as reported by an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode<'a> {
    /// Five character SQLSTATE.
    SqlState(&'a str),
    /// Extended result code.
    Numeric(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertErrorClass {
    Duplicate,
    Other,
}

/// `unique_violation`.
pub const POSTGRES_UNIQUE_VIOLATION: &str = "23505";

/// `SQLITE_CONSTRAINT_UNIQUE`.
pub const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

const DUPLICATE_KEY_CODES: &[(Dialect, ErrorCode<'static>)] = &[
    (Dialect::Postgres, ErrorCode::SqlState(POSTGRES_UNIQUE_VIOLATION)),
    (Dialect::Sqlite, ErrorCode::Numeric(SQLITE_CONSTRAINT_UNIQUE)),
];

/// Classifies a bare engine code under the given dialect.
pub fn classify_code(dialect: Dialect, code: ErrorCode<'_>) -> InsertErrorClass {
    let duplicate = DUPLICATE_KEY_CODES
        .iter()
        .any(|(rule_dialect, rule_code)| *rule_dialect == dialect && *rule_code == code);
    if duplicate {
        InsertErrorClass::Duplicate
    } else {
        InsertErrorClass::Other
    }
}

/// Classifies a failed action insert. Postgres reports a violated unique
/// index as a SQLSTATE string, SQLite as an extended result code.
///
/// Errors without an engine code (row decoding, connection setup) are never
/// duplicates.
pub fn classify_insert_error(dialect: Dialect, err: &StorageError) -> InsertErrorClass {
    err.code()
        .map_or(InsertErrorClass::Other, |code| classify_code(dialect, code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rusqlite::ffi;

    fn sqlite_failure(code: i32) -> StorageError {
        StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(code),
            Some("simulated".to_string()),
        ))
    }

    #[test]
    fn table_codes_match_engine_constants() {
        assert_eq!(
            postgres::error::SqlState::UNIQUE_VIOLATION.code(),
            POSTGRES_UNIQUE_VIOLATION
        );
        assert_eq!(ffi::SQLITE_CONSTRAINT_UNIQUE, SQLITE_CONSTRAINT_UNIQUE);
    }

    #[test]
    fn postgres_unique_violation_is_duplicate() {
        assert_eq!(
            classify_code(Dialect::Postgres, ErrorCode::SqlState("23505")),
            InsertErrorClass::Duplicate
        );
    }

    #[test]
    fn postgres_other_states_are_not_duplicates() {
        // foreign_key_violation, not_null_violation, check_violation,
        // connection_failure, admin_shutdown
        for state in ["23503", "23502", "23514", "08006", "57P01"] {
            assert_eq!(
                classify_code(Dialect::Postgres, ErrorCode::SqlState(state)),
                InsertErrorClass::Other,
                "state {state}"
            );
        }
    }

    #[test]
    fn sqlite_unique_constraint_is_duplicate() {
        assert_eq!(
            classify_insert_error(Dialect::Sqlite, &sqlite_failure(ffi::SQLITE_CONSTRAINT_UNIQUE)),
            InsertErrorClass::Duplicate
        );
    }

    #[test]
    fn sqlite_other_failures_are_not_duplicates() {
        for code in [
            ffi::SQLITE_CONSTRAINT_NOTNULL,
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
            ffi::SQLITE_CONSTRAINT_CHECK,
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY,
            ffi::SQLITE_BUSY,
            ffi::SQLITE_IOERR,
            ffi::SQLITE_CANTOPEN,
        ] {
            assert_eq!(
                classify_insert_error(Dialect::Sqlite, &sqlite_failure(code)),
                InsertErrorClass::Other,
                "code {code}"
            );
        }
    }

    #[test]
    fn codes_do_not_cross_dialects() {
        assert_eq!(
            classify_code(Dialect::Sqlite, ErrorCode::SqlState(POSTGRES_UNIQUE_VIOLATION)),
            InsertErrorClass::Other
        );
        assert_eq!(
            classify_code(Dialect::Postgres, ErrorCode::Numeric(SQLITE_CONSTRAINT_UNIQUE)),
            InsertErrorClass::Other
        );
        assert_eq!(
            classify_insert_error(
                Dialect::Postgres,
                &sqlite_failure(ffi::SQLITE_CONSTRAINT_UNIQUE)
            ),
            InsertErrorClass::Other
        );
    }

    #[test]
    fn codeless_errors_are_not_duplicates() {
        let err = StorageError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.code(), None);
        assert_eq!(
            classify_insert_error(Dialect::Sqlite, &err),
            InsertErrorClass::Other
        );

        let err = StorageError::OutOfRange {
            column: "team_id",
            value: -1,
        };
        assert_eq!(
            classify_insert_error(Dialect::Postgres, &err),
            InsertErrorClass::Other
        );
    }

    proptest! {
        #[test]
        fn only_the_unique_code_is_a_sqlite_duplicate(code in any::<i32>()) {
            let expected = if code == SQLITE_CONSTRAINT_UNIQUE {
                InsertErrorClass::Duplicate
            } else {
                InsertErrorClass::Other
            };
            prop_assert_eq!(classify_code(Dialect::Sqlite, ErrorCode::Numeric(code)), expected);
        }

        #[test]
        fn only_the_unique_state_is_a_postgres_duplicate(state in "[0-9A-Z]{5}") {
            let expected = if state == POSTGRES_UNIQUE_VIOLATION {
                InsertErrorClass::Duplicate
            } else {
                InsertErrorClass::Other
            };
            prop_assert_eq!(
                classify_code(Dialect::Postgres, ErrorCode::SqlState(&state)),
                expected
            );
        }
    }
}
