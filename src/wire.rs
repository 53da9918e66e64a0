//! Interface to the wire protocol client.
//!
//! The protocol implementation itself is an external collaborator. The core
//! only requires an opaque command sender which returns query results with
//! status, columns, rows and a command tag. All calls are synchronous and
//! may block.

use crate::{error::Error, types::ColumnInfo, types::Oid};

/// Outcome status of one query sent over the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultStatus {
    EmptyQuery,
    CommandOk,
    TuplesOk,
    CopyOut,
    CopyIn,
    BadResponse,
    NonfatalError,
    FatalError,
    EndTuples,
    InternalError,
}

impl ResultStatus {
    /// The command has definitely been executed by the backend.
    pub fn successful(self) -> bool {
        !matches!(
            self,
            ResultStatus::BadResponse | ResultStatus::NonfatalError | ResultStatus::FatalError
        )
    }

    /// The command may have been executed, warnings do not count as
    /// failure.
    pub fn maybe_successful(self) -> bool {
        !matches!(self, ResultStatus::BadResponse | ResultStatus::FatalError)
    }
}

/// One row as delivered by the wire layer. `None` marks a NULL field.
pub type WireRow = Vec<Option<Vec<u8>>>;

/// Result of one query as surfaced by the wire layer.
#[derive(Clone, Debug)]
pub struct QueryResult {
    pub status: ResultStatus,
    /// `CommandComplete` tag, e.g. `INSERT 0 5` or `SELECT 3`.
    pub command_tag: String,
    /// Error or notice text, empty if none.
    pub message: String,
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<WireRow>,
}

impl QueryResult {
    pub fn command_ok(tag: impl Into<String>) -> Self {
        QueryResult {
            status: ResultStatus::CommandOk,
            command_tag: tag.into(),
            message: String::new(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn tuples(columns: Vec<ColumnInfo>, rows: Vec<WireRow>) -> Self {
        let tag = format!("SELECT {}", rows.len());
        QueryResult {
            status: ResultStatus::TuplesOk,
            command_tag: tag,
            message: String::new(),
            columns,
            rows,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        QueryResult {
            status: ResultStatus::FatalError,
            command_tag: String::new(),
            message: message.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Affected row count parsed from the command tag, if the tag carries
    /// one.
    pub fn rows_affected(&self) -> Option<u64> {
        let mut it = self.command_tag.split_ascii_whitespace();
        let verb = it.next()?;
        let second = it.next();
        let third = it.next();
        match (verb, second, third) {
            // INSERT <oid> <count>
            ("INSERT", Some(_), Some(count)) => count.parse().ok(),
            (_, Some(count), None) => count.parse().ok(),
            _ => None,
        }
    }
}

/// Parameter and column shape of a statement as described by the server in
/// response to Parse/Describe.
#[derive(Clone, Debug, Default)]
pub struct StatementDescription {
    pub param_types: Vec<Oid>,
    pub columns: Vec<ColumnInfo>,
}

/// One parameter value of a Bind request.
#[derive(Clone, Debug)]
pub struct BindParam {
    pub pg_type: Oid,
    /// `None` binds NULL.
    pub value: Option<Vec<u8>>,
    /// `true` = binary wire format, `false` = text.
    pub binary: bool,
}

/// Seek origin of [`WireClient::lo_lseek64`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoWhence {
    Set,
    Cur,
    End,
}

/// Open mode of a large object descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoMode {
    Read,
    Write,
    ReadWrite,
}

/// Synchronous command sender the driver core is built against.
///
/// Mutable receiver everywhere: one connection serializes all wire traffic,
/// exclusivity is expressed through `&mut` rather than an internal mutex.
pub trait WireClient {
    /// Send one (possibly multi statement) query through the simple query
    /// protocol. One [`QueryResult`] per contained statement.
    fn send_query(&mut self, sql: &str) -> Result<Vec<QueryResult>, Error>;

    /// Parse `sql` under `plan_name` (empty = unnamed plan) and describe
    /// its parameters and result columns.
    fn parse_and_describe(
        &mut self,
        plan_name: &str,
        sql: &str,
        num_params: u16,
    ) -> Result<StatementDescription, Error>;

    /// Bind parameter values to a previously parsed plan and execute it.
    fn bind_and_execute(
        &mut self,
        plan_name: &str,
        params: &[BindParam],
    ) -> Result<QueryResult, Error>;

    /// Issue a cancel request for the currently running statement on a
    /// transient sibling connection.
    fn cancel_request(&mut self) -> Result<(), Error>;

    fn lo_creat(&mut self) -> Result<Oid, Error>;
    fn lo_open(&mut self, oid: Oid, mode: LoMode) -> Result<i32, Error>;
    fn lo_read(&mut self, fd: i32, max: usize) -> Result<Vec<u8>, Error>;
    fn lo_write(&mut self, fd: i32, data: &[u8]) -> Result<usize, Error>;
    fn lo_lseek64(&mut self, fd: i32, offset: i64, whence: LoWhence) -> Result<i64, Error>;
    fn lo_tell64(&mut self, fd: i32) -> Result<i64, Error>;
    fn lo_close(&mut self, fd: i32) -> Result<(), Error>;
}

/// Wire doubles for the unit tests of the crate.
#[cfg(test)]
pub mod tests_support {
    use super::*;
    use crate::error::Error;

    /// Records everything sent and plays back canned results, front to
    /// back. With no scripted results every query succeeds with an empty
    /// command result.
    #[derive(Default)]
    pub struct NullWire {
        pub sent: Vec<String>,
        pub scripted: Vec<Vec<QueryResult>>,
        pub bind_log: Vec<(String, Vec<BindParam>)>,
    }

    impl NullWire {
        pub fn script(&mut self, results: Vec<QueryResult>) {
            self.scripted.push(results);
        }
    }

    impl WireClient for NullWire {
        fn send_query(&mut self, sql: &str) -> Result<Vec<QueryResult>, Error> {
            self.sent.push(sql.to_string());
            if self.scripted.is_empty() {
                Ok(vec![QueryResult::command_ok("OK")])
            } else {
                Ok(self.scripted.remove(0))
            }
        }

        fn parse_and_describe(
            &mut self,
            _plan_name: &str,
            sql: &str,
            _num_params: u16,
        ) -> Result<StatementDescription, Error> {
            self.sent.push(format!("PARSE {sql}"));
            Ok(StatementDescription::default())
        }

        fn bind_and_execute(
            &mut self,
            plan_name: &str,
            params: &[BindParam],
        ) -> Result<QueryResult, Error> {
            self.bind_log.push((plan_name.to_string(), params.to_vec()));
            if self.scripted.is_empty() {
                Ok(QueryResult::command_ok("OK"))
            } else {
                Ok(self.scripted.remove(0).remove(0))
            }
        }

        fn cancel_request(&mut self) -> Result<(), Error> {
            Ok(())
        }

        fn lo_creat(&mut self) -> Result<Oid, Error> {
            Ok(1)
        }

        fn lo_open(&mut self, _oid: Oid, _mode: LoMode) -> Result<i32, Error> {
            Ok(0)
        }

        fn lo_read(&mut self, _fd: i32, _max: usize) -> Result<Vec<u8>, Error> {
            Ok(Vec::new())
        }

        fn lo_write(&mut self, _fd: i32, data: &[u8]) -> Result<usize, Error> {
            Ok(data.len())
        }

        fn lo_lseek64(&mut self, _fd: i32, _offset: i64, _whence: LoWhence) -> Result<i64, Error> {
            Ok(0)
        }

        fn lo_tell64(&mut self, _fd: i32) -> Result<i64, Error> {
            Ok(0)
        }

        fn lo_close(&mut self, _fd: i32) -> Result<(), Error> {
            Ok(())
        }
    }
}
