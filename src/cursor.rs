//! Result cache and scrollable cursor positioning.
//!
//! A result set either materializes all rows client side or, in
//! declare/fetch mode, holds one window of rows streamed from a server
//! side cursor. Keyset columns spliced in by the rewriter are stripped off
//! into the keyset on ingestion.

use log::debug;

use crate::{
    connection::Connection,
    error::Error,
    keyset::{DeletedList, KS_ADDED, KS_DELETED, KS_UPDATED, KeySetEntry, RollbackEntry},
    sqltypes::{FetchOrientation, RowStatus},
    types::ColumnInfo,
    wire::{QueryResult, ResultStatus, WireClient, WireRow},
};

/// How the rows of this result are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultMode {
    /// All rows cached client side (including synthetic catalog results).
    Buffered,
    /// A window of rows streamed from a declared cursor.
    Streamed,
}

/// One result set of a statement.
#[derive(Debug)]
pub struct ResultSet {
    pub columns: Vec<ColumnInfo>,
    /// Row cache; in streamed mode only the current window.
    rows: Vec<WireRow>,
    pub mode: ResultMode,
    pub status: ResultStatus,
    pub command_tag: String,
    pub message: String,
    /// Name of the server side cursor backing a streamed result.
    pub portal_name: Option<String>,
    /// Global index of `rows[0]` in streamed mode.
    base: usize,
    /// Total rows seen so far; final once `fetched_all`.
    num_total_rows: usize,
    fetched_all: bool,
    /// Rows fetched per round trip in streamed mode.
    fetch_chunk: usize,
    pub haskeyset: bool,
    pub keyset: Vec<KeySetEntry>,
    pub rollback: Vec<RollbackEntry>,
    pub deleted: DeletedList,
}

impl ResultSet {
    /// Ingest one wire result. With `haskeyset` the two trailing columns
    /// (ctid, oid) move into the keyset instead of the public row.
    pub fn from_wire(result: QueryResult, haskeyset: bool) -> Self {
        let mut columns = result.columns;
        let mut rows = result.rows;
        let mut keyset = Vec::new();
        if haskeyset && columns.len() >= 2 {
            columns.truncate(columns.len() - 2);
            for row in &mut rows {
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
                    .unwrap_or(0);
                keyset.push(KeySetEntry {
                    block,
                    offset,
                    oid,
                    status: 0,
                });
            }
        }
        let num_total_rows = rows.len();
        ResultSet {
            columns,
            rows,
            mode: ResultMode::Buffered,
            status: result.status,
            command_tag: result.command_tag,
            message: result.message,
            portal_name: None,
            base: 0,
            num_total_rows,
            fetched_all: true,
            fetch_chunk: 0,
            haskeyset,
            keyset,
            rollback: Vec::new(),
            deleted: DeletedList::default(),
        }
    }

    /// Empty streamed result backed by the given portal.
    pub fn streamed(columns: Vec<ColumnInfo>, portal_name: String, fetch_chunk: usize) -> Self {
        ResultSet {
            columns,
            rows: Vec::new(),
            mode: ResultMode::Streamed,
            status: ResultStatus::TuplesOk,
            command_tag: String::new(),
            message: String::new(),
            portal_name: Some(portal_name),
            base: 0,
            num_total_rows: 0,
            fetched_all: false,
            fetch_chunk: fetch_chunk.max(1),
            haskeyset: false,
            keyset: Vec::new(),
            rollback: Vec::new(),
            deleted: DeletedList::default(),
        }
    }

    /// Synthetic result materialized by the driver itself.
    pub fn manual(columns: Vec<ColumnInfo>, rows: Vec<WireRow>) -> Self {
        ResultSet::from_wire(QueryResult::tuples(columns, rows), false)
    }

    pub fn is_tuples(&self) -> bool {
        matches!(
            self.status,
            ResultStatus::TuplesOk | ResultStatus::EndTuples
        )
    }

    /// Number of columns visible to the caller.
    pub fn num_public_columns(&self) -> usize {
        self.columns.len()
    }

    /// Total number of cached rows, the hidden ones included.
    pub fn num_total_rows(&self) -> usize {
        self.num_total_rows
    }

    /// Row count visible to the caller.
    pub fn num_public_rows(&self) -> usize {
        self.num_total_rows - self.deleted.len()
    }

    pub fn rows_affected(&self) -> Option<u64> {
        let probe = QueryResult {
            status: self.status,
            command_tag: self.command_tag.clone(),
            message: String::new(),
            columns: Vec::new(),
            rows: Vec::new(),
        };
        probe.rows_affected()
    }

    /// Field value of a cached row by global index, `None` for NULL.
    pub fn value(&self, global_row: usize, column: usize) -> Option<&[u8]> {
        if global_row < self.base {
            return None;
        }
        self.rows
            .get(global_row - self.base)?
            .get(column)?
            .as_deref()
    }

    /// Replace the cached fields of one row (positioned update re-read).
    pub fn replace_row(&mut self, global_row: usize, row: WireRow) {
        if global_row >= self.base {
            if let Some(slot) = self.rows.get_mut(global_row - self.base) {
                *slot = row;
            }
        }
    }

    /// Append a row added through a positioned insert; returns its global
    /// index.
    pub fn append_row(&mut self, row: WireRow, keyset: KeySetEntry) -> usize {
        let global = self.base + self.rows.len();
        self.rows.push(row);
        if self.haskeyset {
            self.keyset.push(keyset);
        }
        self.num_total_rows += 1;
        global
    }

    /// Drop the cached row appended by a positioned insert (rollback).
    fn remove_last_row(&mut self) {
        if !self.rows.is_empty() {
            self.rows.pop();
            self.keyset.pop();
            self.num_total_rows -= 1;
        }
    }

    /// Ensure rows up to (and including) the global index are cached,
    /// fetching more from a streamed portal as needed. Returns `false`
    /// when the result is exhausted before reaching the index.
    pub fn ensure_row<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        global_row: usize,
    ) -> Result<bool, Error> {
        loop {
            if global_row < self.base + self.rows.len() {
                return Ok(true);
            }
            if self.fetched_all || self.mode == ResultMode::Buffered {
                return Ok(false);
            }
            self.fetch_next_window(conn)?;
        }
    }

    fn fetch_next_window<W: WireClient>(&mut self, conn: &mut Connection<W>) -> Result<(), Error> {
        let portal = self
            .portal_name
            .clone()
            .ok_or_else(|| Error::Internal("streamed result without a portal".to_string()))?;
        let sql = format!("fetch {} in \"{}\"", self.fetch_chunk, portal);
        let mut results = conn.send_query(&sql)?;
        if results.is_empty() {
            self.fetched_all = true;
            return Ok(());
        }
        let result = results.remove(0);
        if let Some(err) = Connection::<W>::result_error(&result) {
            return Err(err);
        }
        debug!("fetched {} rows from portal {portal}", result.rows.len());
        if result.rows.len() < self.fetch_chunk {
            self.fetched_all = true;
        }
        // Only one window is held; earlier rows are gone for good, which
        // is fine for the forward only cursors this mode serves.
        self.base += self.rows.len();
        self.num_total_rows = self.base + result.rows.len();
        self.rows = result.rows;
        if self.columns.is_empty() {
            self.columns = result.columns;
        }
        Ok(())
    }

    /// Row status bits maintained for the caller.
    pub fn row_status(&self, global_row: usize) -> RowStatus {
        if self.deleted.contains(global_row as u32) {
            return RowStatus::Deleted;
        }
        if let Some(entry) = self.keyset.get(global_row) {
            if entry.status & KS_DELETED != 0 {
                return RowStatus::Deleted;
            }
            if entry.status & KS_UPDATED != 0 {
                return RowStatus::Updated;
            }
            if entry.status & KS_ADDED != 0 {
                return RowStatus::Added;
            }
        }
        RowStatus::Success
    }

    /// Capture the identity of a row before a positioned edit.
    pub fn log_rollback(&mut self, global_row: usize, added: bool) {
        let (block, offset) = self
            .keyset
            .get(global_row)
            .map(|e| (e.block, e.offset))
            .unwrap_or((0, 0));
        self.rollback.push(RollbackEntry {
            row: global_row,
            block,
            offset,
            added,
        });
    }

    /// Transaction committed: the edits are permanent.
    pub fn discard_rollback(&mut self) {
        self.rollback.clear();
        // Deleted rows stay hidden for the life of the cursor, but their
        // undo information is gone.
    }

    /// Transaction rolled back: replay the log in reverse, restoring row
    /// identities and hiding insert placeholders.
    pub fn undo_rollback(&mut self) {
        while let Some(entry) = self.rollback.pop() {
            if entry.added {
                self.remove_last_row();
                continue;
            }
            if let Some(ks) = self.keyset.get_mut(entry.row) {
                ks.block = entry.block;
                ks.offset = entry.offset;
                ks.status &= !(KS_DELETED | KS_UPDATED | KS_ADDED);
            }
            self.deleted.remove(entry.row as u32);
        }
    }
}

impl ResultSet {
    /// A row hidden from the caller (deleted through this cursor).
    pub fn is_hidden(&self, global_row: usize) -> bool {
        self.deleted.contains(global_row as u32)
    }

    /// First visible row at or after `from`.
    pub fn next_valid(&self, from: usize) -> Option<usize> {
        (from..self.num_total_rows).find(|&g| !self.is_hidden(g))
    }

    /// First visible row at or before `from`.
    pub fn prev_valid(&self, from: usize) -> Option<usize> {
        (0..=from.min(self.num_total_rows.saturating_sub(1)))
            .rev()
            .find(|&g| !self.is_hidden(g))
    }

    /// Step `n` visible rows forward from a visible anchor.
    pub fn nth_valid_forward(&self, anchor: usize, n: usize) -> Option<usize> {
        let mut at = self.next_valid(anchor)?;
        for _ in 0..n {
            at = self.next_valid(at + 1)?;
        }
        Some(at)
    }

    /// Step `n` visible rows backward from a visible anchor.
    pub fn nth_valid_backward(&self, anchor: usize, n: usize) -> Option<usize> {
        let mut at = self.prev_valid(anchor)?;
        for _ in 0..n {
            if at == 0 {
                return None;
            }
            at = self.prev_valid(at - 1)?;
        }
        Some(at)
    }
}

/// Outcome of a cursor movement.
#[derive(Debug, PartialEq, Eq)]
pub enum ScrollOutcome {
    /// New rowset starting at this global row index.
    Rowset(usize),
    /// Moved past either end; the position parks on the sentinel.
    NoData,
}

/// Scroll position of a statement over its current result. Positions are
/// global row indexes; movement steps over rows hidden by the deleted
/// list, so a position stays put when rows vanish behind it.
#[derive(Debug, Clone, Default)]
pub struct ScrollState {
    /// Global indexes of the rows of the current rowset.
    pub rowset: Vec<usize>,
    pub before_first: bool,
    pub after_last: bool,
    pub rowset_size: usize,
}

impl ScrollState {
    pub fn new(rowset_size: usize) -> Self {
        ScrollState {
            rowset: Vec::new(),
            before_first: true,
            after_last: false,
            rowset_size: rowset_size.max(1),
        }
    }

    pub fn positioned(&self) -> bool {
        !self.rowset.is_empty()
    }

    /// Resolve a scroll request to the first row of the new rowset.
    pub fn scroll(&mut self, orientation: FetchOrientation, result: &ResultSet) -> ScrollOutcome {
        let size = self.rowset_size;
        let start: Option<usize> = match orientation {
            FetchOrientation::Next => {
                if self.after_last {
                    None
                } else if self.before_first {
                    result.next_valid(0)
                } else {
                    self.rowset
                        .last()
                        .and_then(|&last| result.next_valid(last + 1))
                }
            }
            FetchOrientation::Prior => {
                if self.before_first {
                    None
                } else {
                    // Walk one rowset of visible rows back from the row
                    // before the current rowset (or from the end when
                    // parked past it). A partial walk snaps to the start.
                    let anchor = if self.after_last {
                        result.num_total_rows().checked_sub(1)
                    } else {
                        self.rowset.first().and_then(|&f| f.checked_sub(1))
                    };
                    match anchor {
                        None => None,
                        Some(anchor) => result
                            .nth_valid_backward(anchor, size - 1)
                            .or_else(|| result.next_valid(0)),
                    }
                }
            }
            FetchOrientation::First => result.next_valid(0),
            FetchOrientation::Last => {
                let end = result.num_total_rows().checked_sub(1);
                end.and_then(|end| {
                    result
                        .nth_valid_backward(end, size - 1)
                        .or_else(|| result.next_valid(0))
                })
            }
            FetchOrientation::Absolute(n) => {
                if n > 0 {
                    result.nth_valid_forward(0, n as usize - 1)
                } else if n < 0 {
                    result
                        .num_total_rows()
                        .checked_sub(1)
                        .and_then(|end| result.nth_valid_backward(end, (-n) as usize - 1))
                } else {
                    self.rowset.clear();
                    self.before_first = true;
                    self.after_last = false;
                    return ScrollOutcome::NoData;
                }
            }
            FetchOrientation::Relative(n) => {
                if self.before_first {
                    if n > 0 {
                        result.nth_valid_forward(0, n as usize - 1)
                    } else {
                        None
                    }
                } else if self.after_last {
                    None
                } else {
                    let anchor = self.rowset.first().copied().unwrap_or(0);
                    if n >= 0 {
                        result.nth_valid_forward(anchor, n as usize)
                    } else {
                        result.nth_valid_backward(anchor, (-n) as usize)
                    }
                }
            }
            FetchOrientation::Bookmark(bookmark) => {
                if bookmark < 0 {
                    None
                } else {
                    result.next_valid(bookmark as usize)
                }
            }
        };

        match start {
            Some(start) => {
                // Materialize the window of visible rows.
                self.rowset.clear();
                let mut at = start;
                loop {
                    self.rowset.push(at);
                    if self.rowset.len() >= size {
                        break;
                    }
                    match result.next_valid(at + 1) {
                        Some(next) => at = next,
                        None => break,
                    }
                }
                self.before_first = false;
                self.after_last = false;
                ScrollOutcome::Rowset(start)
            }
            None => {
                // Park on the sentinel matching the direction moved.
                let moved_backward = matches!(orientation, FetchOrientation::Prior)
                    || matches!(orientation, FetchOrientation::Relative(n) if n < 0)
                    || matches!(orientation, FetchOrientation::Absolute(n) if n < 0);
                if moved_backward {
                    self.before_first = true;
                    self.after_last = false;
                } else {
                    self.after_last = true;
                    self.before_first = false;
                }
                self.rowset.clear();
                ScrollOutcome::NoData
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PG_TYPE_INT4;

    fn int_rows(n: usize) -> Vec<WireRow> {
        (1..=n)
            .map(|i| vec![Some(i.to_string().into_bytes())])
            .collect()
    }

    fn result_with(n: usize) -> ResultSet {
        ResultSet::from_wire(
            QueryResult::tuples(vec![ColumnInfo::new("i", PG_TYPE_INT4)], int_rows(n)),
            false,
        )
    }

    #[test]
    fn keyset_columns_are_stripped() {
        let columns = vec![
            ColumnInfo::new("a", PG_TYPE_INT4),
            ColumnInfo::new("ctid", crate::types::PG_TYPE_TID),
            ColumnInfo::new("oid", crate::types::PG_TYPE_OID),
        ];
        let rows = vec![vec![
            Some(b"7".to_vec()),
            Some(b"(0,1)".to_vec()),
            Some(b"1234".to_vec()),
        ]];
        let res = ResultSet::from_wire(QueryResult::tuples(columns, rows), true);
        assert_eq!(1, res.num_public_columns());
        assert_eq!(1, res.keyset.len());
        assert_eq!(
            KeySetEntry {
                block: 0,
                offset: 1,
                oid: 1234,
                status: 0
            },
            res.keyset[0]
        );
        assert_eq!(Some(&b"7"[..]), res.value(0, 0));
    }

    #[test]
    fn relative_zero_keeps_position() {
        let res = result_with(5);
        let mut state = ScrollState::new(1);
        assert_eq!(ScrollOutcome::Rowset(0), state.scroll(FetchOrientation::Next, &res));
        assert_eq!(
            ScrollOutcome::Rowset(2),
            state.scroll(FetchOrientation::Absolute(3), &res)
        );
        assert_eq!(
            ScrollOutcome::Rowset(2),
            state.scroll(FetchOrientation::Relative(0), &res)
        );
    }

    #[test]
    fn scroll_sequence_first_relative_last_prior() {
        let res = result_with(3210);
        let mut state = ScrollState::new(1);
        assert_eq!(ScrollOutcome::Rowset(0), state.scroll(FetchOrientation::First, &res));
        assert_eq!(
            ScrollOutcome::Rowset(100),
            state.scroll(FetchOrientation::Relative(100), &res)
        );
        assert_eq!(
            ScrollOutcome::Rowset(3209),
            state.scroll(FetchOrientation::Last, &res)
        );
        assert_eq!(
            ScrollOutcome::Rowset(3208),
            state.scroll(FetchOrientation::Prior, &res)
        );
    }

    #[test]
    fn past_the_end_parks_on_sentinel() {
        let res = result_with(2);
        let mut state = ScrollState::new(1);
        assert_eq!(ScrollOutcome::Rowset(0), state.scroll(FetchOrientation::Next, &res));
        assert_eq!(ScrollOutcome::Rowset(1), state.scroll(FetchOrientation::Next, &res));
        assert_eq!(ScrollOutcome::NoData, state.scroll(FetchOrientation::Next, &res));
        // Prior from the sentinel returns the last row again.
        assert_eq!(ScrollOutcome::Rowset(1), state.scroll(FetchOrientation::Prior, &res));
    }

    #[test]
    fn prior_before_first_snaps_to_start() {
        let res = result_with(10);
        let mut state = ScrollState::new(3);
        assert_eq!(
            ScrollOutcome::Rowset(1),
            state.scroll(FetchOrientation::Absolute(2), &res)
        );
        assert_eq!(ScrollOutcome::Rowset(0), state.scroll(FetchOrientation::Prior, &res));
    }

    #[test]
    fn bookmark_resolves_to_row() {
        let res = result_with(100);
        let mut state = ScrollState::new(1);
        assert_eq!(
            ScrollOutcome::Rowset(42),
            state.scroll(FetchOrientation::Bookmark(42), &res)
        );
    }

    #[test]
    fn movement_skips_hidden_rows() {
        let mut res = result_with(5);
        res.deleted.add(1);
        res.deleted.add(3);
        let mut state = ScrollState::new(1);
        assert_eq!(ScrollOutcome::Rowset(0), state.scroll(FetchOrientation::Next, &res));
        assert_eq!(ScrollOutcome::Rowset(2), state.scroll(FetchOrientation::Next, &res));
        assert_eq!(ScrollOutcome::Rowset(4), state.scroll(FetchOrientation::Next, &res));
        assert_eq!(ScrollOutcome::NoData, state.scroll(FetchOrientation::Next, &res));
        assert_eq!(ScrollOutcome::Rowset(4), state.scroll(FetchOrientation::Prior, &res));
        assert_eq!(ScrollOutcome::Rowset(2), state.scroll(FetchOrientation::Prior, &res));
    }

    #[test]
    fn deleting_behind_the_position_does_not_shift_it() {
        let mut res = result_with(4);
        let mut state = ScrollState::new(1);
        for expected in 0..4 {
            assert_eq!(
                ScrollOutcome::Rowset(expected),
                state.scroll(FetchOrientation::Next, &res)
            );
            res.deleted.add(expected as u32);
        }
        assert_eq!(ScrollOutcome::NoData, state.scroll(FetchOrientation::Next, &res));
    }

    #[test]
    fn rollback_log_restores_row_identity() {
        let columns = vec![
            ColumnInfo::new("a", PG_TYPE_INT4),
            ColumnInfo::new("ctid", crate::types::PG_TYPE_TID),
            ColumnInfo::new("oid", crate::types::PG_TYPE_OID),
        ];
        let rows = vec![vec![
            Some(b"7".to_vec()),
            Some(b"(0,1)".to_vec()),
            Some(b"55".to_vec()),
        ]];
        let mut res = ResultSet::from_wire(QueryResult::tuples(columns, rows), true);
        res.log_rollback(0, false);
        res.keyset[0].block = 9;
        res.keyset[0].offset = 9;
        res.keyset[0].status |= KS_UPDATED;
        res.undo_rollback();
        assert_eq!((0, 1), (res.keyset[0].block, res.keyset[0].offset));
        assert_eq!(RowStatus::Success, res.row_status(0));
    }

    #[test]
    fn deleted_rows_reduce_public_count() {
        let mut res = result_with(5);
        res.deleted.add(2);
        assert_eq!(5, res.num_total_rows());
        assert_eq!(4, res.num_public_rows());
    }
}
