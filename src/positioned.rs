//! Positioned update, delete, insert and refresh.
//!
//! Rows of an updatable cursor are addressed by the tuple identity kept in
//! the keyset. Since PostgreSQL tids move on every update, a successful
//! edit re-reads the row through `currtid2` to refresh the cached identity
//! and fields.

use log::debug;

use crate::{
    connection::Connection,
    error::{Error, SqlState},
    keyset::{KS_ADDED, KS_DELETED, KS_UPDATED, KeySetEntry},
    params::{CValue, ParamBinding, ParamInfo},
    rewrite::{FLGB_PARAM_CAST, QueryBuild, ResolveMode, RewriteCtx},
    resolve::resolve_one_param,
    scanner::TableRef,
    statement::Statement,
    types::pgtype_to_sqltype,
    wire::{QueryResult, WireClient},
};

/// Render one C value as an inline literal for a generated statement,
/// using the same resolver the rewriter uses.
fn render_literal<W: WireClient>(
    conn: &mut Connection<W>,
    value: &CValue,
    sql_type: crate::sqltypes::SqlType,
) -> Result<String, Error> {
    let apd = [ParamBinding::single(value.clone())];
    let ipd = [ParamInfo::input(sql_type)];
    let mut proc_return = false;
    let mut ctx = RewriteCtx {
        conn,
        apd: &apd,
        ipd: &ipd,
        pdata: &[],
        proc_return: &mut proc_return,
        discard_output: false,
    };
    let mut qb = QueryBuild::new(ResolveMode::ReplaceParams, &ctx, 0);
    qb.flags |= FLGB_PARAM_CAST;
    resolve_one_param(&mut qb, None, &mut ctx)?;
    qb.into_text()
}

fn require_row_identity(stmt: &Statement, global_row: usize) -> Result<KeySetEntry, Error> {
    let res = stmt.current_result()?;
    let entry = res
        .keyset
        .get(global_row)
        .copied()
        .ok_or_else(|| Error::Validation("The cursor maintains no keyset.".to_string()))?;
    if entry.is_deleted() {
        return Err(Error::Validation("The row is already deleted.".to_string()));
    }
    Ok(entry)
}

fn require_table(stmt: &Statement) -> Result<TableRef, Error> {
    stmt.table()
        .cloned()
        .ok_or_else(|| Error::Validation("The statement is read only.".to_string()))
}

fn run_single<W: WireClient>(
    conn: &mut Connection<W>,
    sql: &str,
) -> Result<QueryResult, Error> {
    let mut results = conn.send_query(sql)?;
    if results.is_empty() {
        return Err(Error::Internal("no result for generated statement".to_string()));
    }
    let result = results.remove(0);
    if let Some(err) = Connection::<W>::result_error(&result) {
        return Err(err);
    }
    Ok(result)
}

/// Column names of the public result columns, quoted for splicing.
fn quoted_column_list(stmt: &Statement) -> Result<String, Error> {
    let res = stmt.current_result()?;
    Ok(res
        .columns
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect::<Vec<_>>()
        .join(", "))
}

/// Re-read one row by its (possibly stale) identity and refresh cache and
/// keyset. Returns `false` when the row is gone.
fn reread_row<W: WireClient>(
    stmt: &mut Statement,
    conn: &mut Connection<W>,
    global_row: usize,
    entry: &KeySetEntry,
) -> Result<bool, Error> {
    let table = require_table(stmt)?;
    let columns = quoted_column_list(stmt)?;
    let sql = format!(
        "select {columns}, \"ctid\", \"oid\" from {} where ctid = currtid2('{}', '{}') and oid = {}",
        table.quoted(),
        table.quoted(),
        entry.tid_literal(),
        entry.oid,
    );
    let result = run_single(conn, &sql)?;
    let Some(mut row) = result.rows.into_iter().next() else {
        return Ok(false);
    };
    let oid_field = row.pop().unwrap_or(None);
    let tid_field = row.pop().unwrap_or(None);
    let (block, offset) = tid_field
        .as_deref()
        .and_then(KeySetEntry::parse_tid)
        .unwrap_or((0, 0));
    let oid = oid_field
        .as_deref()
        .and_then(|v| std::str::from_utf8(v).ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(entry.oid);
    let res = stmt.current_result_mut()?;
    res.replace_row(global_row, row);
    if let Some(ks) = res.keyset.get_mut(global_row) {
        ks.block = block;
        ks.offset = offset;
        ks.oid = oid;
    }
    Ok(true)
}

/// `SetPos(UPDATE)`: build and run an UPDATE addressing the row by tid,
/// then refresh the cached identity from the server.
pub fn pos_update<W: WireClient>(
    stmt: &mut Statement,
    conn: &mut Connection<W>,
    global_row: usize,
    values: &[Option<CValue>],
) -> Result<(), Error> {
    let entry = require_row_identity(stmt, global_row)?;
    let table = require_table(stmt)?;

    let mut assignments = Vec::new();
    {
        let res = stmt.current_result()?;
        for (col, value) in values.iter().enumerate() {
            let Some(value) = value else { continue };
            let Some(info) = res.columns.get(col) else {
                continue;
            };
            let sql_type = pgtype_to_sqltype(info.type_oid, false, false);
            let name = info.name.clone();
            let literal = {
                // Rendering needs the connection; column data was copied.
                render_literal(conn, value, sql_type)?
            };
            assignments.push(format!("\"{name}\" = {literal}"));
        }
    }
    if assignments.is_empty() {
        return Err(Error::Validation(
            "No updatable column value was supplied.".to_string(),
        ));
    }

    let sql = format!(
        "update {} set {} where ctid = '{}' and oid = {}",
        table.quoted(),
        assignments.join(", "),
        entry.tid_literal(),
        entry.oid,
    );
    debug!("positioned update: {sql}");

    stmt.current_result_mut()?.log_rollback(global_row, false);
    let result = run_single(conn, &sql)?;
    match result.rows_affected().unwrap_or(0) {
        1 => {
            if reread_row(stmt, conn, global_row, &entry)? {
                if let Some(ks) = stmt.current_result_mut()?.keyset.get_mut(global_row) {
                    ks.status |= KS_UPDATED;
                }
                Ok(())
            } else {
                mark_row_gone(stmt, global_row)?;
                Ok(())
            }
        }
        0 => {
            mark_row_gone(stmt, global_row)?;
            stmt.diagnostics.push(
                SqlState::ROW_VERSION_CHANGED,
                "The row was changed or deleted by another transaction.",
            );
            Ok(())
        }
        n => Err(Error::Internal(format!(
            "positioned update touched {n} rows"
        ))),
    }
}

fn mark_row_gone(stmt: &mut Statement, global_row: usize) -> Result<(), Error> {
    let res = stmt.current_result_mut()?;
    if let Some(ks) = res.keyset.get_mut(global_row) {
        ks.status |= KS_DELETED;
    }
    res.deleted.add(global_row as u32);
    Ok(())
}

/// `SetPos(DELETE)`.
pub fn pos_delete<W: WireClient>(
    stmt: &mut Statement,
    conn: &mut Connection<W>,
    global_row: usize,
) -> Result<(), Error> {
    let entry = require_row_identity(stmt, global_row)?;
    let table = require_table(stmt)?;
    let sql = format!(
        "delete from {} where ctid = '{}' and oid = {}",
        table.quoted(),
        entry.tid_literal(),
        entry.oid,
    );
    debug!("positioned delete: {sql}");

    stmt.current_result_mut()?.log_rollback(global_row, false);
    let result = run_single(conn, &sql)?;
    match result.rows_affected().unwrap_or(0) {
        1 => {
            mark_row_gone(stmt, global_row)?;
            Ok(())
        }
        0 => {
            mark_row_gone(stmt, global_row)?;
            stmt.diagnostics.push(
                SqlState::ROW_VERSION_CHANGED,
                "The row was changed or deleted by another transaction.",
            );
            Ok(())
        }
        n => Err(Error::Internal(format!(
            "positioned delete touched {n} rows"
        ))),
    }
}

/// `SetPos(ADD)`: insert a row built from the supplied column values and
/// append it to the cache with the identity the server reports back.
pub fn pos_add<W: WireClient>(
    stmt: &mut Statement,
    conn: &mut Connection<W>,
    values: &[Option<CValue>],
) -> Result<(), Error> {
    let table = require_table(stmt)?;
    let mut names = Vec::new();
    let mut literals = Vec::new();
    let mut row: Vec<Option<Vec<u8>>> = Vec::new();
    {
        let res = stmt.current_result()?;
        let columns: Vec<_> = res.columns.clone();
        for (col, info) in columns.iter().enumerate() {
            let value = values.get(col).cloned().flatten();
            match value {
                Some(value) => {
                    let sql_type = pgtype_to_sqltype(info.type_oid, false, false);
                    names.push(format!("\"{}\"", info.name));
                    let literal = render_literal(conn, &value, sql_type)?;
                    // Cache the textual image the way the server would
                    // return it: strip quoting for plain literals.
                    row.push(Some(value_image(&value)));
                    literals.push(literal);
                }
                None => row.push(None),
            }
        }
    }
    if names.is_empty() {
        return Err(Error::Validation(
            "No column value was supplied for the insert.".to_string(),
        ));
    }
    let sql = format!(
        "insert into {} ({}) values ({}) returning ctid, oid",
        table.quoted(),
        names.join(", "),
        literals.join(", "),
    );
    debug!("positioned insert: {sql}");
    let result = run_single(conn, &sql)?;
    let mut identity = KeySetEntry {
        status: KS_ADDED,
        ..KeySetEntry::default()
    };
    if let Some(ret) = result.rows.into_iter().next() {
        if let Some((block, offset)) = ret
            .first()
            .and_then(|f| f.as_deref())
            .and_then(KeySetEntry::parse_tid)
        {
            identity.block = block;
            identity.offset = offset;
        }
        identity.oid = ret
            .get(1)
            .and_then(|f| f.as_deref())
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
    }
    let res = stmt.current_result_mut()?;
    let global = res.append_row(row, identity);
    res.log_rollback(global, true);
    Ok(())
}

/// `SetPos(REFRESH)`: re-read the row and refresh the cache.
pub fn pos_refresh<W: WireClient>(
    stmt: &mut Statement,
    conn: &mut Connection<W>,
    global_row: usize,
) -> Result<(), Error> {
    let entry = require_row_identity(stmt, global_row)?;
    if !reread_row(stmt, conn, global_row, &entry)? {
        mark_row_gone(stmt, global_row)?;
        stmt.diagnostics.push(
            SqlState::ROW_VERSION_CHANGED,
            "The row was changed or deleted by another transaction.",
        );
    }
    Ok(())
}

/// Text image of a value as it would come back from the server, used to
/// patch the cache after a positioned insert.
fn value_image(value: &CValue) -> Vec<u8> {
    match value {
        CValue::Char(bytes) => bytes.clone(),
        CValue::WChar(text) => text.to_string_lossy().into_bytes(),
        CValue::Binary(bytes) => {
            let mut image = b"\\x".to_vec();
            image.extend_from_slice(&crate::convert::bytea::bin_to_hex(bytes));
            image
        }
        CValue::Bit(v) => if *v != 0 { b"t" } else { b"f" }.to_vec(),
        CValue::TinyInt(v) => v.to_string().into_bytes(),
        CValue::UTinyInt(v) => v.to_string().into_bytes(),
        CValue::SmallInt(v) => v.to_string().into_bytes(),
        CValue::USmallInt(v) => v.to_string().into_bytes(),
        CValue::Long(v) => v.to_string().into_bytes(),
        CValue::ULong(v) => v.to_string().into_bytes(),
        CValue::BigInt(v) => v.to_string().into_bytes(),
        CValue::UBigInt(v) => v.to_string().into_bytes(),
        CValue::Float(v) => v.to_string().into_bytes(),
        CValue::Double(v) => v.to_string().into_bytes(),
        CValue::Numeric(ns) => crate::convert::numeric::numeric_to_string(ns).into_bytes(),
        CValue::Guid(g) => crate::convert::text::guid_to_string(g).to_lowercase().into_bytes(),
        CValue::Date(d) => format!("{:04}-{:02}-{:02}", d.year, d.month, d.day).into_bytes(),
        CValue::Time(t) => format!("{:02}:{:02}:{:02}", t.hour, t.minute, t.second).into_bytes(),
        CValue::Timestamp(ts) => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            ts.year, ts.month, ts.day, ts.hour, ts.minute, ts.second
        )
        .into_bytes(),
        CValue::Interval(iv) => crate::convert::interval::interval_to_string(iv, 6).into_bytes(),
        CValue::Null | CValue::DataAtExec => Vec::new(),
    }
}
