//! # About
//!
//! `pg-odbc` implements the core of a PostgreSQL driver exposing a call
//! level (ODBC style) interface: the query rewriter which translates
//! escape sequences and parameter markers, the bidirectional type
//! conversion engine between C buffers and PostgreSQL wire text, and the
//! statement, cursor and result machinery on top. The wire protocol client
//! itself is pluggable through the [`wire::WireClient`] trait.

mod connection;
mod cursor;
mod diagnostics;
mod error;
mod escape;
mod keyset;
mod options;
mod params;
mod positioned;
mod resolve;
mod rewrite;
mod savepoint;
mod statement;

pub mod convert;
pub mod encoding;
pub mod scanner;
pub mod sqltypes;
pub mod types;
pub mod wire;

pub use self::{
    connection::{Connection, LocalContext},
    convert::{Copied, GetDataClass, GetDataInfo, Indicator},
    cursor::{ResultMode, ResultSet, ScrollOutcome, ScrollState},
    diagnostics::{Diagnostics, Record},
    error::{Error, SqlState},
    keyset::{DeletedList, KeySetEntry, RollbackEntry},
    options::{
        Concurrency, ConnectionOptions, CursorCommitBehavior, CursorType, CvtNullDate,
        RollbackPolicy, StatementOptions, UnknownSizes, UpdatableCursors,
    },
    params::{CValue, ParamBinding, ParamInfo, PutDataSlot},
    rewrite::ProcessedStmt,
    savepoint::savepoint_name,
    scanner::{StatementType, TableRef},
    statement::{
        ColAttribute, ColAttributeValue, ColBinding, Executed, ParamDataOutcome, PreparedState,
        Statement, StmtStatus,
    },
};
// Reexports
pub use widestring::{U16Str, U16String};

use wire::WireClient;

/// End the current transaction and reconcile the positioned edit logs of
/// the given statements: committed edits become permanent, rolled back
/// ones are undone in the caches.
pub fn end_transaction<W: WireClient>(
    conn: &mut Connection<W>,
    statements: &mut [&mut Statement],
    commit: bool,
) -> Result<(), Error> {
    if commit {
        conn.commit()?;
        for stmt in statements {
            stmt.transaction_committed();
        }
    } else {
        conn.rollback()?;
        for stmt in statements {
            stmt.transaction_rolled_back();
        }
    }
    Ok(())
}
