//! Per statement savepoint coordination.
//!
//! With statement scoped rollback, each execution inside an explicit
//! transaction is bracketed by `SAVEPOINT _EXEC_SVP_<id>`: released on
//! success, rolled back to on error, so one failing statement does not
//! poison the transaction.

use log::debug;

use crate::{
    connection::Connection,
    error::Error,
    options::RollbackPolicy,
    wire::WireClient,
};

/// Savepoint token scoped to one statement execution.
pub fn savepoint_name(statement_id: u32) -> String {
    format!("_EXEC_SVP_{statement_id}")
}

/// Open the statement savepoint when the policy calls for one. Returns the
/// token to be released or rolled back to afterwards.
pub fn set_statement_savepoint<W: WireClient>(
    conn: &mut Connection<W>,
    statement_id: u32,
    needs_savepoint: bool,
) -> Result<Option<String>, Error> {
    if conn.is_in_error_transaction() {
        return Ok(None);
    }
    if conn.options.rollback_policy != RollbackPolicy::Statement {
        return Ok(None);
    }
    if !needs_savepoint || !conn.is_in_transaction() {
        return Ok(None);
    }
    let name = savepoint_name(statement_id);
    let results = conn.send_query(&format!("SAVEPOINT {name}"))?;
    match results.first().and_then(Connection::<W>::result_error) {
        Some(err) => Err(err),
        None => {
            debug!("opened statement savepoint {name}");
            Ok(Some(name))
        }
    }
}

/// Close the statement savepoint: release it after success, roll back to
/// it after an error. In autocommit, an error outside an explicit
/// transaction additionally commits the recovered transaction away.
pub fn discard_statement_savepoint<W: WireClient>(
    conn: &mut Connection<W>,
    savepoint: Option<String>,
    had_error: bool,
) -> Result<(), Error> {
    let Some(name) = savepoint else {
        if had_error {
            match conn.options.rollback_policy {
                RollbackPolicy::Transaction => conn.abort(),
                RollbackPolicy::None | RollbackPolicy::Statement => {
                    conn.note_statement_error();
                }
            }
        }
        return Ok(());
    };
    if had_error {
        let results = conn.send_query(&format!("ROLLBACK TO {name}"))?;
        if results
            .first()
            .and_then(Connection::<W>::result_error)
            .is_some()
        {
            conn.abort();
            return Ok(());
        }
        conn.note_savepoint_recovery();
        if conn.is_autocommit() {
            conn.commit()?;
        }
    } else {
        let results = conn.send_query(&format!("RELEASE {name}"))?;
        if let Some(err) = results.first().and_then(Connection::<W>::result_error) {
            conn.abort();
            return Err(err);
        }
    }
    Ok(())
}
