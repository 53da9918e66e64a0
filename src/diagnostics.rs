//! Diagnostic records collected on statements and connections.

use std::fmt;

use crate::error::{Error, SqlState};

/// One diagnostic record. Reading records is non destructive, repeated calls
/// to [`Diagnostics::record`] return the same message.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub state: SqlState,
    /// Error code native to the data source, `0` if none applies.
    pub native_error: i32,
    pub message: String,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "State: {}, Native error: {}, Message: {}",
            self.state.as_str(),
            self.native_error,
            self.message
        )
    }
}

/// Ordered list of diagnostic records. The most recent error is record `1`.
#[derive(Debug, Default)]
pub struct Diagnostics {
    records: Vec<Record>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new diagnostic. It becomes record number one, older entries
    /// move up.
    pub fn push(&mut self, state: SqlState, message: impl Into<String>) {
        self.records.insert(
            0,
            Record {
                state,
                native_error: 0,
                message: message.into(),
            },
        );
    }

    /// Record the diagnostic matching an [`Error`].
    pub fn push_error(&mut self, error: &Error) {
        self.push(error.sql_state(), error.to_string());
    }

    /// Retrieve a record by its one based number.
    pub fn record(&self, rec_number: usize) -> Option<&Record> {
        if rec_number == 0 {
            return None;
        }
        self.records.get(rec_number - 1)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forget all records. Invoked at the start of most public calls and on
    /// statement recycle.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_recent_record_is_number_one() {
        let mut diags = Diagnostics::new();
        diags.push(SqlState::GENERAL_ERROR, "first");
        diags.push(SqlState::INVALID_CURSOR_STATE, "second");
        assert_eq!("second", diags.record(1).unwrap().message);
        assert_eq!("first", diags.record(2).unwrap().message);
    }

    #[test]
    fn reading_is_not_destructive() {
        let mut diags = Diagnostics::new();
        diags.push(SqlState::GENERAL_ERROR, "oops");
        assert_eq!("oops", diags.record(1).unwrap().message);
        assert_eq!("oops", diags.record(1).unwrap().message);
    }

    #[test]
    fn record_number_zero_is_invalid() {
        let mut diags = Diagnostics::new();
        diags.push(SqlState::GENERAL_ERROR, "oops");
        assert!(diags.record(0).is_none());
    }

    #[test]
    fn formatting() {
        let rec = Record {
            state: SqlState::SEQUENCE_ERROR,
            native_error: 0,
            message: "Function sequence error".to_string(),
        };
        assert_eq!(
            "State: HY010, Native error: 0, Message: Function sequence error",
            format!("{rec}")
        );
    }
}
