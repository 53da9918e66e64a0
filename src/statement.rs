//! Statement lifecycle: prepare, execute, fetch and the data at execution
//! protocol.
//!
//! A statement owns its SQL text, parameter and column bindings, the chain
//! of result sets of the current execution and its diagnostics. All
//! operations which may touch the wire take the connection explicitly.

use log::{debug, warn};

use crate::{
    connection::Connection,
    convert::{Copied, GetDataInfo, Indicator, to_c::copy_and_convert_field},
    cursor::{ResultMode, ResultSet, ScrollOutcome, ScrollState},
    diagnostics::Diagnostics,
    error::{Error, SqlState},
    options::{Concurrency, CursorType, StatementOptions},
    params::{CValue, ParamBinding, ParamInfo, PutDataSlot},
    positioned,
    rewrite::{self, ProcessedStmt, ResolveMode, RewriteCtx},
    savepoint,
    scanner::{
        self, FLGP_MULTIPLE_STATEMENT, FLGP_SELECT_FOR_READONLY,
        FLGP_SELECT_FOR_UPDATE_OR_SHARE, FLGP_SELECT_INTO, StatementType, TableRef,
    },
    sqltypes::{
        CDataType, FetchOrientation, FreeStmtOption, ParamDirection, RowStatus, SetPosOperation,
        SqlType,
    },
    types::{ColumnInfo, PG_TYPE_REFCURSOR, pgtype_to_sqltype},
    wire::{QueryResult, StatementDescription, WireClient},
};

/// Execution status of a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StmtStatus {
    #[default]
    Allocated,
    Ready,
    Executing,
    /// Result metadata was obtained by executing before the user asked to;
    /// the next execute may short circuit.
    Premature,
    Finished,
}

/// Server side prepare progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PreparedState {
    #[default]
    NotYetPrepared,
    PreparingTemporarily,
    PreparingPermanently,
    PreparedTemporarily,
    PreparedPermanently,
    /// Described once to obtain metadata, not kept as a plan.
    OnceDescribed,
}

/// Outcome of `execute`: done, or the caller owes parameter data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Executed {
    Done,
    NeedData,
}

/// Outcome of `param_data`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamDataOutcome {
    /// Stream the value of this parameter index through `put_data`.
    NeedData(usize),
    /// All values delivered, the statement has been executed.
    Executed,
}

/// Column descriptor fields retrievable through `ColAttribute`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColAttribute {
    Name,
    Label,
    SqlType,
    Length,
    ColumnSize,
    Scale,
    Nullable,
    Unsigned,
}

/// Value of one column descriptor field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColAttributeValue {
    Text(String),
    Number(i64),
}

/// One bound result column. The driver owns the fetch buffers, offsets
/// into caller arrays are computed per call and never stored.
#[derive(Debug)]
pub struct ColBinding {
    pub c_type: CDataType,
    pub buffer_len: usize,
    /// `rowset_size * buffer_len` bytes, one slot per rowset row.
    pub data: Vec<u8>,
    pub indicators: Vec<Option<Indicator>>,
}

impl ColBinding {
    fn new(c_type: CDataType, buffer_len: usize) -> Self {
        ColBinding {
            c_type,
            buffer_len,
            data: Vec::new(),
            indicators: Vec::new(),
        }
    }

    /// Value bytes of one rowset row, sized per the reported indicator.
    pub fn row_slice(&self, row: usize) -> Option<&[u8]> {
        let indicator = *self.indicators.get(row)?;
        match indicator {
            Some(Indicator::Length(len)) => {
                let at = row * self.buffer_len;
                let copied = len.min(self.buffer_len);
                Some(&self.data[at..at + copied])
            }
            _ => None,
        }
    }

    pub fn indicator(&self, row: usize) -> Option<Indicator> {
        self.indicators.get(row).copied().flatten()
    }
}

pub struct Statement {
    id: u32,
    pub options: StatementOptions,
    pub diagnostics: Diagnostics,
    statement_text: Option<String>,
    statement_type: StatementType,
    status: StmtStatus,
    prepared: PreparedState,
    is_prepare_statement: bool,
    plan_name: String,
    processed: Vec<ProcessedStmt>,
    descriptions: Vec<StatementDescription>,
    param_bindings: Vec<ParamBinding>,
    param_info: Vec<ParamInfo>,
    pdata: Vec<PutDataSlot>,
    col_bindings: Vec<Option<ColBinding>>,
    cursor_name: Option<String>,
    results: Vec<ResultSet>,
    current_result: usize,
    scroll: ScrollState,
    row_statuses: Vec<RowStatus>,
    last_fetch_count: usize,
    current_row_in_rowset: usize,
    gdata: GetDataInfo,
    proc_return: bool,
    discard_output: bool,
    accessed_db: bool,
    table: Option<TableRef>,
    updatable: bool,
    /// Parameters awaiting `PutData`, by index, plus the delivery cursor.
    need_data_params: Vec<usize>,
    current_need_param: Option<usize>,
    /// An implicit transaction was opened for a held cursor or large
    /// object and is committed when the statement closes.
    implicit_tx: bool,
    /// Result metadata came from faked parameters and must not be reused.
    inaccurate_result: bool,
}

impl Statement {
    pub fn new<W: WireClient>(conn: &mut Connection<W>) -> Self {
        let id = conn.next_statement_id();
        Statement {
            id,
            options: StatementOptions::default(),
            diagnostics: Diagnostics::new(),
            statement_text: None,
            statement_type: StatementType::Other,
            status: StmtStatus::Allocated,
            prepared: PreparedState::NotYetPrepared,
            is_prepare_statement: false,
            plan_name: String::new(),
            processed: Vec::new(),
            descriptions: Vec::new(),
            param_bindings: Vec::new(),
            param_info: Vec::new(),
            pdata: Vec::new(),
            col_bindings: Vec::new(),
            cursor_name: None,
            results: Vec::new(),
            current_result: 0,
            scroll: ScrollState::new(1),
            row_statuses: Vec::new(),
            last_fetch_count: 0,
            current_row_in_rowset: 0,
            gdata: GetDataInfo::default(),
            proc_return: false,
            discard_output: false,
            accessed_db: false,
            table: None,
            updatable: false,
            need_data_params: Vec::new(),
            current_need_param: None,
            implicit_tx: false,
            inaccurate_result: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn status(&self) -> StmtStatus {
        self.status
    }

    pub fn prepared_state(&self) -> PreparedState {
        self.prepared
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    pub fn table(&self) -> Option<&TableRef> {
        self.table.as_ref()
    }

    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    // ----- cursor name ---------------------------------------------------

    pub fn cursor_name(&self) -> String {
        self.cursor_name
            .clone()
            .unwrap_or_else(|| format!("SQL_CUR{}", self.id))
    }

    pub fn set_cursor_name(&mut self, name: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::Validation("Cursor names must not be empty.".to_string()));
        }
        self.cursor_name = Some(name.to_string());
        Ok(())
    }

    // ----- bindings ------------------------------------------------------

    /// Bind one parameter marker (one based index).
    #[allow(clippy::too_many_arguments)]
    pub fn bind_parameter(
        &mut self,
        param_number: u16,
        direction: ParamDirection,
        values: ParamBinding,
        sql_type: SqlType,
        column_size: usize,
        decimal_digits: i16,
    ) -> Result<(), Error> {
        if param_number == 0 {
            return Err(Error::Validation(
                "Parameter numbers are one based.".to_string(),
            ));
        }
        let index = (param_number - 1) as usize;
        if self.param_bindings.len() <= index {
            self.param_bindings
                .resize_with(index + 1, || ParamBinding::array(Vec::new()));
            self.param_info
                .resize_with(index + 1, || ParamInfo::input(SqlType::Unknown));
            self.pdata.resize_with(index + 1, PutDataSlot::default);
        }
        let data_at_exec = values.values.iter().any(CValue::is_data_at_exec);
        self.param_bindings[index] = values;
        self.param_info[index] = ParamInfo {
            direction,
            sql_type,
            column_size,
            decimal_digits,
            pg_type: 0,
            data_at_exec,
        };
        Ok(())
    }

    pub fn describe_param(&self, param_number: u16) -> Result<&ParamInfo, Error> {
        self.param_info
            .get((param_number.max(1) - 1) as usize)
            .ok_or_else(|| Error::Validation("Parameter index out of range.".to_string()))
    }

    pub fn num_params(&self) -> usize {
        self.param_bindings.len()
    }

    /// Bind one result column (one based index).
    pub fn bind_col(
        &mut self,
        column_number: u16,
        c_type: CDataType,
        buffer_len: usize,
    ) -> Result<(), Error> {
        if column_number == 0 {
            return Err(Error::Validation("Column numbers are one based.".to_string()));
        }
        let index = (column_number - 1) as usize;
        if self.col_bindings.len() <= index {
            self.col_bindings.resize_with(index + 1, || None);
        }
        self.col_bindings[index] = Some(ColBinding::new(c_type, buffer_len));
        Ok(())
    }

    pub fn unbind_cols(&mut self) {
        self.col_bindings.clear();
    }

    pub fn reset_params(&mut self) {
        self.param_bindings.clear();
        self.param_info.clear();
        self.pdata.clear();
        self.proc_return = false;
    }

    pub fn col_binding(&self, column_number: u16) -> Option<&ColBinding> {
        self.col_bindings
            .get((column_number.max(1) - 1) as usize)?
            .as_ref()
    }

    // ----- lifecycle -----------------------------------------------------

    /// Discard the open result chain; the statement may run again.
    pub fn close<W: WireClient>(&mut self, conn: &mut Connection<W>) -> Result<(), Error> {
        // Close a server side portal still open in declare/fetch mode.
        let portal = self
            .current_result_opt()
            .and_then(|r| r.portal_name.clone());
        if let Some(portal) = portal {
            if !conn.is_dead() && conn.is_in_transaction() {
                if let Err(err) = conn.send_query(&format!("close \"{portal}\"")) {
                    warn!("closing cursor {portal} failed: {err}");
                }
            }
        }
        if self.implicit_tx {
            conn.commit()?;
            self.implicit_tx = false;
        }
        self.recycle();
        Ok(())
    }

    pub fn free<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        option: FreeStmtOption,
    ) -> Result<(), Error> {
        match option {
            FreeStmtOption::Close => self.close(conn),
            FreeStmtOption::Unbind => {
                self.unbind_cols();
                Ok(())
            }
            FreeStmtOption::ResetParams => {
                self.reset_params();
                Ok(())
            }
        }
    }

    /// Reset result state, keeping text and bindings.
    fn recycle(&mut self) {
        self.results.clear();
        self.current_result = 0;
        self.scroll = ScrollState::new(self.options.row_array_size);
        self.row_statuses.clear();
        self.last_fetch_count = 0;
        self.current_row_in_rowset = 0;
        self.gdata.reset_all();
        self.diagnostics.clear();
        self.accessed_db = false;
        self.need_data_params.clear();
        self.current_need_param = None;
        self.inaccurate_result = false;
        for slot in &mut self.pdata {
            slot.clear();
        }
        if self.prepared == PreparedState::OnceDescribed {
            self.prepared = PreparedState::NotYetPrepared;
        }
        self.status = if self.statement_text.is_some() {
            StmtStatus::Ready
        } else {
            StmtStatus::Allocated
        };
    }

    /// Store the SQL text for later execution.
    pub fn prepare(&mut self, text: &str) -> Result<(), Error> {
        if self.status == StmtStatus::Executing {
            return Err(Error::Validation(
                "Statement is currently executing.".to_string(),
            ));
        }
        self.statement_text = Some(text.to_string());
        self.statement_type = StatementType::classify(text);
        self.prepared = PreparedState::NotYetPrepared;
        self.is_prepare_statement = true;
        self.plan_name.clear();
        self.processed.clear();
        self.descriptions.clear();
        self.proc_return = false;
        self.recycle();
        Ok(())
    }

    /// Prepare and execute in one step.
    pub fn exec_direct<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        text: &str,
    ) -> Result<Executed, Error> {
        self.prepare(text)?;
        self.is_prepare_statement = false;
        self.execute(conn)
    }

    /// The escape-translated text as it would go to the server.
    pub fn native_sql<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        text: &str,
    ) -> Result<String, Error> {
        let statement_type = StatementType::classify(text);
        let mut proc_return = false;
        let num_markers =
            scanner::scan_query_and_count_params(text.as_bytes(), conn.encoding)?.1 as usize;
        let have_values = self.param_bindings.len() >= num_markers;
        let mut ctx = RewriteCtx {
            conn,
            apd: &self.param_bindings,
            ipd: &self.param_info,
            pdata: &self.pdata,
            proc_return: &mut proc_return,
            discard_output: false,
        };
        if have_values {
            let result = rewrite::build_inline_statement(
                text,
                statement_type,
                "SQL_CUR0",
                &StatementOptions::default(),
                &mut ctx,
                ResolveMode::ReplaceParams,
                false,
                false,
            )?;
            Ok(result.text)
        } else {
            let result =
                rewrite::build_prepare_statements(text, statement_type, &mut ctx, false)?;
            Ok(result
                .statements
                .into_iter()
                .map(|s| s.query)
                .collect::<Vec<_>>()
                .join(";"))
        }
    }

    // ----- execution -----------------------------------------------------

    pub fn execute<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
    ) -> Result<Executed, Error> {
        self.diagnostics.clear();
        if self.status == StmtStatus::Executing {
            return Err(Error::Validation(
                "Statement is currently executing.".to_string(),
            ));
        }
        if self.statement_text.is_none() {
            self.diagnostics
                .push(SqlState::SEQUENCE_ERROR, "No statement to execute.");
            return Err(Error::Validation("No statement to execute.".to_string()));
        }
        if self.status == StmtStatus::Premature {
            if !self.inaccurate_result {
                self.status = StmtStatus::Finished;
                return Ok(Executed::Done);
            }
            self.soft_recycle();
        }
        if self.status == StmtStatus::Finished {
            self.soft_recycle();
        }

        // Data at execution parameters suspend the execution until the
        // caller delivered every value.
        if self.current_need_param.is_none() {
            self.need_data_params = self
                .param_info
                .iter()
                .enumerate()
                .filter(|(i, info)| {
                    info.data_at_exec
                        && self
                            .pdata
                            .get(*i)
                            .map(|slot| slot.buffer.is_none() && slot.lobj_oid.is_none())
                            .unwrap_or(true)
                })
                .map(|(i, _)| i)
                .collect();
            if !self.need_data_params.is_empty() {
                return Ok(Executed::NeedData);
            }
        }

        self.run_to_completion(conn, ResolveMode::ReplaceParams)?;
        Ok(Executed::Done)
    }

    /// Recycle results but keep the need-data bookkeeping alive.
    fn soft_recycle(&mut self) {
        let need = std::mem::take(&mut self.need_data_params);
        let current = self.current_need_param.take();
        self.recycle();
        self.need_data_params = need;
        self.current_need_param = current;
    }

    fn run_to_completion<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        value_mode: ResolveMode,
    ) -> Result<(), Error> {
        let statement_type = self.statement_type;
        self.analyze_updatability(conn);
        rewrite::apply_cursor_downgrades(
            &mut self.options,
            statement_type,
            self.updatable,
            &conn.options.updatable_cursors.clone(),
        );

        let needs_savepoint = !self.accessed_db && !statement_type.no_savepoint_needed();
        let svp = savepoint::set_statement_savepoint(conn, self.id, needs_savepoint)?;
        self.status = StmtStatus::Executing;

        let run = self.run_query(conn, value_mode);
        self.accessed_db = true;
        self.status = StmtStatus::Finished;
        match run {
            Ok(()) => {
                self.note_inserted_table(conn);
                savepoint::discard_statement_savepoint(conn, svp, false)?;
                Ok(())
            }
            Err(err) => {
                self.diagnostics.push_error(&err);
                if let Err(cleanup) = savepoint::discard_statement_savepoint(conn, svp, true) {
                    warn!("savepoint cleanup failed: {cleanup}");
                }
                Err(err)
            }
        }
    }

    /// Remember the target of a successful INSERT for the `@@identity`
    /// rewrite.
    fn note_inserted_table<W: WireClient>(&self, conn: &mut Connection<W>) {
        if self.statement_type != StatementType::Insert {
            return;
        }
        let Some(text) = self.statement_text.as_deref() else {
            return;
        };
        use crate::scanner::StripPrefixIgnoreCase;
        let bytes = text.as_bytes();
        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(0);
        let Some(rest) = bytes[start..].strip_prefix_ignore_case(b"insert") else {
            return;
        };
        let ws = rest
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(0);
        let Some(rest) = rest[ws..].strip_prefix_ignore_case(b"into") else {
            return;
        };
        if let Some(table) = scanner::eat_table_identifier(rest) {
            conn.last_insert_table = Some(table);
        }
    }

    fn analyze_updatability<W: WireClient>(&mut self, conn: &Connection<W>) {
        self.table = None;
        self.updatable = false;
        if self.statement_type != StatementType::Select {
            return;
        }
        let Some(text) = self.statement_text.as_deref() else {
            return;
        };
        let bytes = text.as_bytes();
        let Ok((from_pos, _)) = scanner::locate_from_where(bytes, conn.encoding) else {
            return;
        };
        let Some(from_pos) = from_pos else { return };
        let Ok((_, _, multi)) = scanner::scan_query_and_count_params(bytes, conn.encoding) else {
            return;
        };
        if multi {
            return;
        }
        self.table = scanner::eat_table_identifier(&bytes[from_pos + 4..]);
        self.updatable = self.table.is_some();
    }

    fn use_server_prepare<W: WireClient>(&self, conn: &Connection<W>) -> bool {
        conn.options.use_server_side_prepare
            && self.options.concurrency == Concurrency::ReadOnly
            && !conn.options.use_declare_fetch
    }

    fn run_query<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        value_mode: ResolveMode,
    ) -> Result<(), Error> {
        if self.use_server_prepare(conn) {
            self.run_prepared(conn)
        } else {
            self.run_inline(conn, value_mode)
        }
    }

    /// Extended query protocol: Parse/Describe once, Bind/Execute per
    /// parameter set row.
    fn run_prepared<W: WireClient>(&mut self, conn: &mut Connection<W>) -> Result<(), Error> {
        self.prepare_server_side(conn)?;

        let paramset_size = self
            .param_bindings
            .iter()
            .map(|b| b.values.len())
            .max()
            .unwrap_or(1)
            .max(1);

        let mut results: Vec<QueryResult> = Vec::new();
        let mut affected_total: u64 = 0;
        for row in 0..paramset_size {
            let mut first_param = 0usize;
            for pstmt in self.processed.clone() {
                let mut proc_return = self.proc_return;
                let mut ctx = RewriteCtx {
                    conn,
                    apd: &self.param_bindings,
                    ipd: &self.param_info,
                    pdata: &self.pdata,
                    proc_return: &mut proc_return,
                    discard_output: self.discard_output,
                };
                let bind_params = rewrite::build_bind_request_from(
                    pstmt.num_params as usize,
                    first_param,
                    &mut ctx,
                    row,
                )?;
                first_param += pstmt.num_params as usize;
                let result = conn.wire().bind_and_execute(&self.plan_name, &bind_params)?;
                if let Some(err) = Connection::<W>::result_error(&result) {
                    conn.note_statement_error();
                    return Err(err);
                }
                affected_total += result.rows_affected().unwrap_or(0);
                if row == 0 {
                    results.push(result);
                } else if let Some(first) = results.last_mut() {
                    // Arrayed execution accumulates the affected count.
                    first.command_tag = format!("EXECUTE {affected_total}");
                }
            }
        }
        match self.prepared {
            PreparedState::PreparingPermanently => {
                self.prepared = PreparedState::PreparedPermanently
            }
            PreparedState::PreparingTemporarily => {
                self.prepared = PreparedState::PreparedTemporarily
            }
            _ => {}
        }
        self.ingest_results(conn, results, false)?;
        Ok(())
    }

    fn prepare_server_side<W: WireClient>(&mut self, conn: &mut Connection<W>) -> Result<(), Error> {
        if matches!(
            self.prepared,
            PreparedState::PreparedPermanently | PreparedState::PreparedTemporarily
        ) {
            return Ok(());
        }
        let text = self.statement_text.clone().unwrap_or_default();
        let mut proc_return = self.proc_return;
        let mut ctx = RewriteCtx {
            conn,
            apd: &self.param_bindings,
            ipd: &self.param_info,
            pdata: &self.pdata,
            proc_return: &mut proc_return,
            discard_output: self.discard_output,
        };
        let prep = rewrite::build_prepare_statements(&text, self.statement_type, &mut ctx, false)?;
        self.proc_return = proc_return;
        self.processed = prep.statements;
        self.plan_name = if self.is_prepare_statement {
            format!("_PLAN{}", self.id)
        } else {
            String::new()
        };
        self.prepared = if self.plan_name.is_empty() {
            PreparedState::PreparingTemporarily
        } else {
            PreparedState::PreparingPermanently
        };

        self.descriptions.clear();
        for pstmt in &self.processed {
            let desc = conn
                .wire()
                .parse_and_describe(&self.plan_name, &pstmt.query, pstmt.num_params)?;
            self.descriptions.push(desc);
        }
        Ok(())
    }

    /// Simple query protocol with parameters inlined.
    fn run_inline<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        value_mode: ResolveMode,
    ) -> Result<(), Error> {
        let text = self.statement_text.clone().unwrap_or_default();
        let cursor_name = self.cursor_name();
        let paramset_size = self
            .param_bindings
            .iter()
            .map(|b| b.values.len())
            .max()
            .unwrap_or(1)
            .max(1);

        // The keyset splitting trick is not used; keyset cursors run as a
        // buffered select with the identity columns appended.
        let mut build_options = self.options.clone();
        if build_options.cursor_type == CursorType::KeysetDriven {
            build_options.cursor_type = CursorType::Static;
        }

        let mut all_results: Vec<QueryResult> = Vec::new();
        let mut keyset_created = false;
        let mut use_fetch_cursor = false;
        let mut affected_total: u64 = 0;
        for row in 0..paramset_size {
            let mut proc_return = self.proc_return;
            let mut ctx = RewriteCtx {
                conn,
                apd: &self.param_bindings,
                ipd: &self.param_info,
                pdata: &self.pdata,
                proc_return: &mut proc_return,
                discard_output: self.discard_output,
            };
            let built = rewrite::build_inline_statement_for_row(
                &text,
                self.statement_type,
                &cursor_name,
                &build_options,
                &mut ctx,
                value_mode,
                true,
                self.options.keep_cursor_with_hold,
                row,
            )?;
            self.proc_return = proc_return;
            self.statement_type = built.statement_type;
            if built.flags
                & (FLGP_SELECT_INTO | FLGP_MULTIPLE_STATEMENT | FLGP_SELECT_FOR_UPDATE_OR_SHARE)
                != 0
                || built.flags & FLGP_SELECT_FOR_READONLY != 0
            {
                self.options.concurrency = Concurrency::ReadOnly;
            }
            keyset_created = built.keyset_created;
            use_fetch_cursor = built.use_fetch_cursor;
            self.inaccurate_result = value_mode == ResolveMode::FakeParams;

            if use_fetch_cursor && conn.is_autocommit() && !conn.is_in_transaction() {
                conn.begin()?;
                self.implicit_tx = true;
            }

            let results = conn.send_query(&built.text)?;
            for result in &results {
                if let Some(err) = Connection::<W>::result_error(result) {
                    return Err(err);
                }
                affected_total += result.rows_affected().unwrap_or(0);
            }
            if row == 0 {
                all_results = results;
            } else if let Some(first) = all_results.first_mut() {
                first.command_tag = format!("EXECUTE {affected_total}");
            }
        }

        if use_fetch_cursor {
            // The declare produced no rows; rows arrive through FETCH.
            let streamed = ResultSet::streamed(
                Vec::new(),
                cursor_name,
                conn.options.fetch_size as usize,
            );
            self.results = vec![streamed];
            self.current_result = 0;
            self.after_ingest();
            return Ok(());
        }
        self.ingest_results(conn, all_results, keyset_created)?;
        Ok(())
    }

    fn ingest_results<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        results: Vec<QueryResult>,
        keyset: bool,
    ) -> Result<(), Error> {
        let mut sets: Vec<ResultSet> = results
            .into_iter()
            .map(|r| ResultSet::from_wire(r, keyset))
            .collect();

        // A procedure returning refcursors exposes each portal as its own
        // result set.
        if conn.options.fetch_refcursors {
            let mut expanded = Vec::new();
            for set in sets {
                if set.is_tuples()
                    && set.columns.len() == 1
                    && set.columns[0].type_oid == PG_TYPE_REFCURSOR
                {
                    let mut portals = Vec::new();
                    for row in 0..set.num_total_rows() {
                        if let Some(name) = set.value(row, 0) {
                            portals.push(String::from_utf8_lossy(name).to_string());
                        }
                    }
                    for portal in portals {
                        let fetched = conn.send_query(&format!("FETCH ALL IN \"{portal}\""))?;
                        for result in fetched {
                            if let Some(err) = Connection::<W>::result_error(&result) {
                                return Err(err);
                            }
                            expanded.push(ResultSet::from_wire(result, false));
                        }
                    }
                } else {
                    expanded.push(set);
                }
            }
            sets = expanded;
        }

        self.results = sets;
        self.current_result = 0;
        self.after_ingest();
        Ok(())
    }

    fn after_ingest(&mut self) {
        self.scroll = ScrollState::new(self.options.row_array_size);
        self.row_statuses.clear();
        self.last_fetch_count = 0;
        self.current_row_in_rowset = 0;
        self.gdata.reset_all();
        if let Some(res) = self.current_result_opt() {
            debug!(
                "statement {} finished, tag={} rows={}",
                self.id,
                res.command_tag,
                res.num_total_rows()
            );
        }
    }

    // ----- data at execution ---------------------------------------------

    /// Advance the data at execution protocol. The first call names the
    /// first pending parameter; each further call closes the previous one
    /// and either names the next or executes the statement.
    pub fn param_data<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
    ) -> Result<ParamDataOutcome, Error> {
        match self.current_need_param {
            None => {
                if self.need_data_params.is_empty() {
                    return Err(Error::Validation(
                        "No parameter is awaiting data.".to_string(),
                    ));
                }
                self.current_need_param = Some(0);
                Ok(ParamDataOutcome::NeedData(self.need_data_params[0]))
            }
            Some(pos) => {
                self.finish_put_data(conn, self.need_data_params[pos])?;
                let next = pos + 1;
                if next < self.need_data_params.len() {
                    self.current_need_param = Some(next);
                    Ok(ParamDataOutcome::NeedData(self.need_data_params[next]))
                } else {
                    self.current_need_param = None;
                    self.need_data_params.clear();
                    self.run_to_completion(conn, ResolveMode::ReplaceParams)?;
                    Ok(ParamDataOutcome::Executed)
                }
            }
        }
    }

    /// Deliver one chunk of the pending parameter's value.
    pub fn put_data<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        data: &[u8],
        c_type: CDataType,
    ) -> Result<(), Error> {
        let Some(pos) = self.current_need_param else {
            return Err(Error::Validation(
                "PutData requires a preceding ParamData.".to_string(),
            ));
        };
        let index = self.need_data_params[pos];
        if index >= self.pdata.len() {
            return Err(Error::Internal("missing put data slot".to_string()));
        }
        let is_lo = self
            .param_info
            .get(index)
            .map(|info| info.pg_type == crate::types::PG_TYPE_LO)
            .unwrap_or(false);
        if is_lo {
            // Stream straight into a large object.
            if self.pdata[index].lobj_fd.is_none() {
                if conn.is_autocommit() && !conn.is_in_transaction() {
                    conn.begin()?;
                    self.implicit_tx = true;
                }
                let oid = conn.wire().lo_creat()?;
                let fd = conn.wire().lo_open(oid, crate::wire::LoMode::Write)?;
                self.pdata[index].lobj_oid = Some(oid);
                self.pdata[index].lobj_fd = Some(fd);
            }
            let fd = self.pdata[index].lobj_fd.expect("opened above");
            let mut written = 0;
            while written < data.len() {
                written += conn.wire().lo_write(fd, &data[written..])?;
            }
        } else {
            let slot = &mut self.pdata[index];
            slot.c_type = Some(c_type);
            slot.append(data);
        }
        Ok(())
    }

    fn finish_put_data<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        index: usize,
    ) -> Result<(), Error> {
        if let Some(slot) = self.pdata.get_mut(index) {
            if let Some(fd) = slot.lobj_fd.take() {
                conn.wire().lo_close(fd)?;
            }
            if slot.buffer.is_none() && slot.lobj_oid.is_none() {
                // No chunk arrived at all; an empty value was meant.
                slot.buffer = Some(Vec::new());
            }
        }
        Ok(())
    }

    /// Abort the running operation. Cancels a pending data at execution
    /// exchange locally, otherwise fires a cancel request over a sibling
    /// connection.
    pub fn cancel<W: WireClient>(&mut self, conn: &mut Connection<W>) -> Result<(), Error> {
        if self.current_need_param.is_some() || !self.need_data_params.is_empty() {
            self.need_data_params.clear();
            self.current_need_param = None;
            for slot in &mut self.pdata {
                slot.clear();
            }
            self.status = StmtStatus::Ready;
            return Ok(());
        }
        conn.wire().cancel_request()?;
        self.status = StmtStatus::Finished;
        self.diagnostics
            .push(SqlState::OPERATION_CANCELED, "Operation canceled.");
        Ok(())
    }

    // ----- metadata ------------------------------------------------------

    fn current_result_opt(&self) -> Option<&ResultSet> {
        self.results.get(self.current_result)
    }

    pub fn current_result(&self) -> Result<&ResultSet, Error> {
        self.current_result_opt().ok_or_else(|| {
            Error::Validation("Statement has no open result.".to_string())
        })
    }

    pub fn current_result_mut(&mut self) -> Result<&mut ResultSet, Error> {
        self.results
            .get_mut(self.current_result)
            .ok_or_else(|| Error::Validation("Statement has no open result.".to_string()))
    }

    /// Column metadata before execution, served from Parse/Describe when
    /// server side prepare is on, otherwise via a premature execution.
    pub fn describe_result<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
    ) -> Result<Vec<ColumnInfo>, Error> {
        if let Some(res) = self.current_result_opt() {
            return Ok(res.columns.clone());
        }
        if self.use_server_prepare(conn) {
            self.prepare_server_side(conn)?;
            self.prepared = PreparedState::OnceDescribed;
            return Ok(self
                .descriptions
                .first()
                .map(|d| d.columns.clone())
                .unwrap_or_default());
        }
        // Premature execution: run now (with faked values for unbound
        // parameters), the caller's execute may reuse the outcome.
        let fake = self
            .param_bindings
            .iter()
            .all(|b| b.values.is_empty());
        let mode = if fake {
            ResolveMode::FakeParams
        } else {
            ResolveMode::ReplaceParams
        };
        self.run_to_completion(conn, mode)?;
        self.status = StmtStatus::Premature;
        Ok(self
            .current_result_opt()
            .map(|r| r.columns.clone())
            .unwrap_or_default())
    }

    pub fn num_result_cols(&self) -> Result<usize, Error> {
        Ok(self.current_result()?.num_public_columns())
    }

    pub fn describe_col<W: WireClient>(
        &self,
        conn: &Connection<W>,
        column_number: u16,
    ) -> Result<(ColumnInfo, SqlType), Error> {
        let res = self.current_result()?;
        let info = res
            .columns
            .get((column_number.max(1) - 1) as usize)
            .cloned()
            .ok_or_else(|| Error::Validation("Column index out of range.".to_string()))?;
        let sql_type = pgtype_to_sqltype(
            info.type_oid,
            conn.options.bools_as_char,
            conn.options.bytes_as_long_varbinary,
        );
        Ok((info, sql_type))
    }

    /// One descriptor field of a result column, `ColAttribute` style.
    pub fn col_attribute<W: WireClient>(
        &self,
        conn: &Connection<W>,
        column_number: u16,
        attribute: ColAttribute,
    ) -> Result<ColAttributeValue, Error> {
        let (info, sql_type) = self.describe_col(conn, column_number)?;
        let value = match attribute {
            ColAttribute::Name | ColAttribute::Label => ColAttributeValue::Text(info.name),
            ColAttribute::SqlType => ColAttributeValue::Number(sql_type as i64),
            ColAttribute::Length | ColAttribute::ColumnSize => {
                ColAttributeValue::Number(crate::types::reported_column_size(
                    &info,
                    conn.options.max_varchar_size,
                    conn.options.max_longvarchar_size,
                ) as i64)
            }
            ColAttribute::Scale => ColAttributeValue::Number(
                info.numeric_precision_scale()
                    .map(|(_, s)| s as i64)
                    .unwrap_or(0),
            ),
            ColAttribute::Nullable => ColAttributeValue::Number(1),
            ColAttribute::Unsigned => ColAttributeValue::Number(0),
        };
        Ok(value)
    }

    pub fn more_results(&mut self) -> bool {
        if self.current_result + 1 < self.results.len() {
            self.current_result += 1;
            self.after_ingest();
            true
        } else {
            false
        }
    }

    /// Rows affected by the last execution, `-1` when not applicable.
    pub fn row_count(&self) -> i64 {
        match self.current_result_opt() {
            Some(res) if res.is_tuples() => res.num_public_rows() as i64,
            Some(res) => res
                .rows_affected()
                .map(|n| n as i64)
                .unwrap_or(-1),
            None => -1,
        }
    }

    pub fn last_fetch_count(&self) -> usize {
        self.last_fetch_count
    }

    pub fn row_statuses(&self) -> &[RowStatus] {
        &self.row_statuses
    }

    // ----- fetching ------------------------------------------------------

    /// Fetch the next rowset.
    pub fn fetch<W: WireClient>(&mut self, conn: &mut Connection<W>) -> Result<usize, Error> {
        self.fetch_scroll(conn, FetchOrientation::Next)
    }

    /// Position the cursor and materialize one rowset into the bound
    /// columns. Returns the number of rows fetched, zero at either end.
    pub fn fetch_scroll<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        orientation: FetchOrientation,
    ) -> Result<usize, Error> {
        if self.current_result_opt().is_none() {
            return Err(Error::Validation(
                "No result set to fetch from.".to_string(),
            ));
        }
        let streamed = self
            .current_result()?
            .mode
            == ResultMode::Streamed;
        if streamed
            && !matches!(
                orientation,
                FetchOrientation::Next | FetchOrientation::Relative(_)
            )
            && self.options.cursor_type == CursorType::ForwardOnly
        {
            return Err(Error::Validation(
                "A forward only cursor supports only Next.".to_string(),
            ));
        }
        if !matches!(orientation, FetchOrientation::Next)
            && self.options.cursor_type == CursorType::ForwardOnly
            && !streamed
        {
            return Err(Error::Validation(
                "Scrolling requires a scrollable cursor.".to_string(),
            ));
        }
        if matches!(orientation, FetchOrientation::Bookmark(_)) && !self.options.use_bookmarks {
            return Err(Error::Validation(
                "Bookmarks have not been enabled on this statement.".to_string(),
            ));
        }

        self.scroll.rowset_size = self.options.row_array_size.max(1);

        // Streamed results learn their size on demand; pull at least one
        // window past the current position.
        if streamed {
            let size = self.scroll.rowset_size;
            let needed = match orientation {
                FetchOrientation::Next => self
                    .scroll
                    .rowset
                    .last()
                    .map(|&last| last + size)
                    .unwrap_or(size - 1),
                FetchOrientation::Relative(n) if n > 0 => {
                    let first = self.scroll.rowset.first().copied().unwrap_or(0);
                    first + n as usize + size - 1
                }
                _ => 0,
            };
            self.current_result_mut()?.ensure_row(conn, needed)?;
        }

        let outcome = {
            let result = self
                .results
                .get(self.current_result)
                .ok_or_else(|| Error::Validation("Statement has no open result.".to_string()))?;
            self.scroll.scroll(orientation, result)
        };
        match outcome {
            ScrollOutcome::Rowset(_) => self.materialize_rowset(conn),
            ScrollOutcome::NoData => {
                self.last_fetch_count = 0;
                self.row_statuses.clear();
                Ok(0)
            }
        }
    }

    fn materialize_rowset<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
    ) -> Result<usize, Error> {
        let rowset_size = self.scroll.rowset_size;
        let rowset: Vec<usize> = self.scroll.rowset.clone();
        let num_columns = self.current_result()?.num_public_columns();
        self.gdata.ensure(num_columns);
        self.close_lo_sessions(conn);
        self.gdata.reset_all();
        self.current_row_in_rowset = 0;
        self.row_statuses = vec![RowStatus::NoRow; rowset_size];

        // Size the bound column buffers for this rowset.
        for binding in self.col_bindings.iter_mut().flatten() {
            binding.data = vec![0; binding.buffer_len * rowset_size];
            binding.indicators = vec![None; rowset_size];
        }

        let mut fetched = 0;
        for (row, &global) in rowset.iter().enumerate() {
            self.row_statuses[row] = self.current_result()?.row_status(global);
            fetched += 1;

            for col in 0..self.col_bindings.len().min(num_columns) {
                let Some(binding) = self.col_bindings[col].as_ref() else {
                    continue;
                };
                let c_type = binding.c_type;
                let buffer_len = binding.buffer_len;
                let field_type = self.current_result()?.columns[col].type_oid;
                let value: Option<Vec<u8>> = self
                    .current_result()?
                    .value(global, col)
                    .map(|v| v.to_vec());
                let mut out = vec![0; buffer_len];
                let copied = copy_and_convert_field(
                    conn,
                    field_type,
                    value.as_deref(),
                    c_type,
                    6,
                    &mut out,
                    None,
                )?;
                if copied.is_truncated() {
                    self.row_statuses[row] = RowStatus::SuccessWithInfo;
                    self.diagnostics.push(
                        SqlState::STRING_DATA_RIGHT_TRUNCATION,
                        "String data, right truncated.",
                    );
                }
                let binding = self.col_bindings[col].as_mut().expect("checked above");
                let at = row * buffer_len;
                binding.data[at..at + buffer_len].copy_from_slice(&out);
                binding.indicators[row] = match copied {
                    Copied::Ok { indicator } | Copied::Truncated { indicator } => Some(indicator),
                    Copied::NoData => None,
                };
            }
        }
        self.last_fetch_count = fetched;
        Ok(fetched)
    }

    /// Descriptors of large objects still open from interrupted `GetData`
    /// streams are closed when the row advances.
    fn close_lo_sessions<W: WireClient>(&mut self, conn: &mut Connection<W>) {
        for gdc in &mut self.gdata.columns {
            if let Some(fd) = gdc.lo_fd.take() {
                if let Err(err) = conn.wire().lo_close(fd) {
                    warn!("closing abandoned large object stream failed: {err}");
                }
                if gdc.lo_commit_needed {
                    if let Err(err) = conn.commit() {
                        warn!("committing abandoned large object stream failed: {err}");
                    }
                    gdc.lo_commit_needed = false;
                }
            }
        }
    }

    /// `ExtendedFetch`: scroll and report the fetch count together with
    /// the per row status array.
    pub fn extended_fetch<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        orientation: FetchOrientation,
    ) -> Result<(usize, Vec<RowStatus>), Error> {
        let count = self.fetch_scroll(conn, orientation)?;
        Ok((count, self.row_statuses.clone()))
    }

    /// Read one field of the current row, continuing a previous partial
    /// read of the same column. Column `0` retrieves the bookmark.
    pub fn get_data<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        column_number: u16,
        c_type: CDataType,
        out: &mut [u8],
    ) -> Result<Copied, Error> {
        let global = *self
            .scroll
            .rowset
            .get(self.current_row_in_rowset)
            .ok_or_else(|| {
                Error::Validation("The cursor is not positioned on a row.".to_string())
            })?;

        if column_number == 0 {
            let bookmark = (global as u32).to_le_bytes();
            if out.len() < 4 {
                return Ok(Copied::Truncated {
                    indicator: Indicator::Length(4),
                });
            }
            out[..4].copy_from_slice(&bookmark);
            return Ok(Copied::Ok {
                indicator: Indicator::Length(4),
            });
        }

        let col = (column_number - 1) as usize;
        let result = self.current_result()?;
        if col >= result.num_public_columns() {
            return Err(Error::Validation("Column index out of range.".to_string()));
        }
        let field_type = result.columns[col].type_oid;
        let value: Option<Vec<u8>> = result.value(global, col).map(|v| v.to_vec());
        self.gdata.ensure(col + 1);
        let gdc = &mut self.gdata.columns[col];
        copy_and_convert_field(conn, field_type, value.as_deref(), c_type, 6, out, Some(gdc))
    }

    /// Bookmark of the row at the given rowset position, its global row
    /// index.
    pub fn bookmark(&self, row_in_rowset: usize) -> Result<i64, Error> {
        let global = self.scroll.rowset.get(row_in_rowset).ok_or_else(|| {
            Error::Validation("The cursor is not positioned on a row.".to_string())
        })?;
        Ok(*global as i64)
    }

    /// Interpret a variable width bookmark buffer: the low four bytes are
    /// the row index, the rest is ignored.
    pub fn bookmark_from_bytes(bytes: &[u8]) -> Result<i64, Error> {
        if bytes.len() < 4 {
            return Err(Error::Validation(
                "Bookmarks must be at least four bytes wide.".to_string(),
            ));
        }
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64)
    }

    // ----- positioned operations -----------------------------------------

    /// Position within the rowset or run a positioned operation on the
    /// given rowset row (zero based).
    pub fn set_pos<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        row_in_rowset: usize,
        operation: SetPosOperation,
        values: &[Option<CValue>],
    ) -> Result<(), Error> {
        if !self.scroll.positioned() && operation != SetPosOperation::Add {
            return Err(Error::Validation(
                "The cursor is not positioned on a rowset.".to_string(),
            ));
        }
        if row_in_rowset >= self.last_fetch_count && operation != SetPosOperation::Add {
            return Err(Error::Validation(
                "Row is outside the fetched rowset.".to_string(),
            ));
        }
        let global = self
            .scroll
            .rowset
            .get(row_in_rowset)
            .copied()
            .unwrap_or_default();
        match operation {
            SetPosOperation::Position => {
                self.current_row_in_rowset = row_in_rowset;
                self.gdata.reset_all();
                Ok(())
            }
            SetPosOperation::Refresh => positioned::pos_refresh(self, conn, global),
            SetPosOperation::Update => positioned::pos_update(self, conn, global, values),
            SetPosOperation::Delete => positioned::pos_delete(self, conn, global),
            SetPosOperation::Add => positioned::pos_add(self, conn, values),
        }
    }

    /// `BulkOperations`: run a positioned operation on a row addressed by
    /// its bookmark instead of its rowset position.
    pub fn bulk_operation<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        operation: SetPosOperation,
        bookmark: i64,
        values: &[Option<CValue>],
    ) -> Result<(), Error> {
        if !self.options.use_bookmarks && operation != SetPosOperation::Add {
            return Err(Error::Validation(
                "Bookmarks have not been enabled on this statement.".to_string(),
            ));
        }
        let global = bookmark.max(0) as usize;
        match operation {
            SetPosOperation::Add => positioned::pos_add(self, conn, values),
            SetPosOperation::Update => positioned::pos_update(self, conn, global, values),
            SetPosOperation::Delete => positioned::pos_delete(self, conn, global),
            SetPosOperation::Refresh => positioned::pos_refresh(self, conn, global),
            SetPosOperation::Position => Err(Error::Validation(
                "Position is not a bulk operation.".to_string(),
            )),
        }
    }

    // ----- transaction boundaries ----------------------------------------

    /// The enclosing transaction committed: edits become permanent.
    pub fn transaction_committed(&mut self) {
        for res in &mut self.results {
            res.discard_rollback();
        }
        self.implicit_tx = false;
    }

    /// The enclosing transaction rolled back: undo positioned edits and
    /// restore cached identities.
    pub fn transaction_rolled_back(&mut self) {
        for res in &mut self.results {
            res.undo_rollback();
        }
        self.implicit_tx = false;
    }
}
