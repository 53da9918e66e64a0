//! Query rewriting: escape expansion, parameter substitution, cursor
//! wrapping and multi statement splitting.
//!
//! The scanner walks the user SQL byte by byte while a [`QueryBuild`]
//! collects the output. Depending on the resolve mode, parameter markers
//! become quoted literals, `NULL` placeholders, `$n` markers or out of band
//! bind values.

use log::debug;

use crate::{
    connection::Connection,
    error::Error,
    escape::convert_escape,
    options::{Concurrency, CursorType, StatementOptions},
    params::{ParamBinding, ParamInfo, PutDataSlot},
    resolve::resolve_one_param,
    scanner::{
        self, DOLLAR_QUOTE, ESCAPE_END, ESCAPE_START, FLGP_MULTIPLE_STATEMENT, FLGP_SELECT_INTO,
        FLGP_SELECT_FOR_UPDATE_OR_SHARE, FLGP_USING_CURSOR, IDENTIFIER_QUOTE, IN_COMMENT_BLOCK,
        IN_DOLLAR_QUOTE, IN_DQUOTE_IDENTIFIER, IN_ESCAPE, IN_IDENT_KEYWORD, IN_LINE_COMMENT,
        IN_LITERAL, LITERAL_QUOTE, QueryParse, StatementType, StripPrefixIgnoreCase, find_tag,
    },
    sqltypes::ParamDirection,
    wire::{BindParam, WireClient},
};

/// Modes of the parameter resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveMode {
    /// Replace parameter markers with quoted literal values.
    ReplaceParams,
    /// The query is only sent to describe its result set, markers become
    /// `NULL` literals when no value is known yet.
    FakeParams,
    /// Build text suitable for a server side Parse, markers become `$n`.
    BuildingPrepare,
    /// Build the raw values of a Bind request.
    BuildingBindRequest,
}

pub const FLGB_INACCURATE_RESULT: u32 = 1 << 4;
pub const FLGB_CREATE_KEYSET: u32 = 1 << 5;
pub const FLGB_KEYSET_DRIVEN: u32 = 1 << 6;
pub const FLGB_CONVERT_LF: u32 = 1 << 7;
pub const FLGB_DISCARD_OUTPUT: u32 = 1 << 8;
pub const FLGB_BINARY_AS_POSSIBLE: u32 = 1 << 9;
pub const FLGB_LITERAL_EXTENSION: u32 = 1 << 10;
pub const FLGB_HEX_BIN_FORMAT: u32 = 1 << 11;
pub const FLGB_PARAM_CAST: u32 = 1 << 12;

/// Everything the resolver needs besides the scan state: the connection
/// (for options and inline large object writes) and the parameter
/// descriptors of the statement being rewritten.
pub struct RewriteCtx<'a, W> {
    pub conn: &'a mut Connection<W>,
    pub apd: &'a [ParamBinding],
    pub ipd: &'a [ParamInfo],
    pub pdata: &'a [PutDataSlot],
    /// Set when the statement carries a `{? = call}` return marker. Updated
    /// when the rewriter discovers one.
    pub proc_return: &'a mut bool,
    pub discard_output: bool,
}

/// Output buffer and parameter counters of one rewrite pass.
pub struct QueryBuild {
    pub out: Vec<u8>,
    pub mode: ResolveMode,
    pub flags: u32,
    /// Index of the most recently resolved marker, pre incremented.
    pub param_number: i32,
    pub dollar_number: u16,
    pub num_io_params: u16,
    pub num_output_params: u16,
    pub num_discard_params: u16,
    pub proc_return: u16,
    pub brace_level: i32,
    pub parenthesize_the_first: bool,
    /// Parameter set row currently being resolved.
    pub current_row: usize,
    pub load_stmt_len: usize,
    pub load_from_pos: usize,
    /// Values collected in `BuildingBindRequest` mode.
    pub bind_params: Vec<BindParam>,
}

impl QueryBuild {
    pub fn new<W>(mode: ResolveMode, ctx: &RewriteCtx<'_, W>, current_row: usize) -> Self {
        let mut flags = 0;
        let options = &ctx.conn.options;
        if options.lf_conversion {
            flags |= FLGB_CONVERT_LF;
        }
        if options.literal_extension {
            flags |= FLGB_LITERAL_EXTENSION;
        }
        if options.hex_bytea_format {
            flags |= FLGB_HEX_BIN_FORMAT;
        }
        if ctx.discard_output {
            flags |= FLGB_DISCARD_OUTPUT;
        }
        let num_output_params = ctx
            .ipd
            .iter()
            .filter(|p| p.direction == ParamDirection::Output)
            .count() as u16;
        let num_io_params = ctx
            .ipd
            .iter()
            .filter(|p| p.direction != ParamDirection::Input)
            .count() as u16;
        let proc_return = u16::from(*ctx.proc_return);
        let mut num_discard_params = 0;
        if ctx.discard_output {
            num_discard_params = num_output_params;
        }
        if num_discard_params < proc_return {
            num_discard_params = proc_return;
        }
        QueryBuild {
            out: Vec::with_capacity(4096),
            mode,
            flags,
            param_number: -1,
            dollar_number: 0,
            num_io_params,
            num_output_params,
            num_discard_params,
            proc_return,
            brace_level: 0,
            parenthesize_the_first: false,
            current_row,
            load_stmt_len: 0,
            load_from_pos: 0,
            bind_params: Vec::new(),
        }
    }

    /// Nested builder sharing counters and mode, used to capture escape
    /// function arguments.
    pub fn nested(&self) -> QueryBuild {
        QueryBuild {
            out: Vec::with_capacity(1024),
            mode: self.mode,
            flags: self.flags,
            param_number: self.param_number,
            dollar_number: self.dollar_number,
            num_io_params: self.num_io_params,
            num_output_params: self.num_output_params,
            num_discard_params: self.num_discard_params,
            proc_return: self.proc_return,
            brace_level: self.brace_level,
            parenthesize_the_first: self.parenthesize_the_first,
            current_row: self.current_row,
            load_stmt_len: 0,
            load_from_pos: 0,
            bind_params: Vec::new(),
        }
    }

    /// Fold the counters of a nested builder back into this one.
    pub fn adopt_counters(&mut self, nested: &QueryBuild) {
        self.param_number = nested.param_number;
        self.dollar_number = nested.dollar_number;
        self.flags = nested.flags;
    }

    pub fn npos(&self) -> usize {
        self.out.len()
    }

    pub fn push(&mut self, byte: u8) {
        self.out.push(byte);
    }

    pub fn push_str(&mut self, s: &str) {
        self.out.extend_from_slice(s.as_bytes());
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    pub fn start_brace(&mut self) {
        let mut replace_by_parenthesis = true;
        if self.brace_level == 0 {
            if self.npos() == 0 {
                self.parenthesize_the_first = false;
                replace_by_parenthesis = false;
            } else {
                self.parenthesize_the_first = true;
            }
        }
        if replace_by_parenthesis {
            self.push(b'(');
        }
        self.brace_level += 1;
    }

    pub fn end_brace(&mut self) {
        let replace_by_parenthesis = self.brace_level > 1 || self.parenthesize_the_first;
        if replace_by_parenthesis {
            self.push(b')');
        }
        self.brace_level -= 1;
    }

    /// Append a space when the byte after the closing `}` would otherwise
    /// glue to the emitted identifier.
    pub fn space_to_separate_identifiers(&mut self, qp: &QueryParse<'_>) {
        if qp.peek(0) != Some(ESCAPE_END) {
            return;
        }
        if let Some(next) = qp.peek(1) {
            if next.is_ascii_alphanumeric() || next == b'_' || next == b'$' || next >= 0x80 {
                self.push(b' ');
            }
        }
    }

    pub fn into_text(self) -> Result<String, Error> {
        String::from_utf8(self.out).map_err(|_| Error::Encoding)
    }
}

fn remove_declare_cursor(qb: &mut QueryBuild, qp: &mut QueryParse<'_>) {
    qp.flags &= !FLGP_USING_CURSOR;
    if qp.declare_pos == 0 {
        return;
    }
    qb.out.drain(..qp.declare_pos);
    qp.declare_pos = 0;
}

/// Process the byte under the scanner cursor, appending output and
/// reacting to parameter markers and escapes. One call per source byte;
/// the callee may consume additional bytes by advancing `qp.opos`.
pub fn inner_process_tokens<W: WireClient>(
    qp: &mut QueryParse<'_>,
    qb: &mut QueryBuild,
    ctx: &mut RewriteCtx<'_, W>,
) -> Result<(), Error> {
    // Keyset columns are spliced in front of the FROM clause, and the
    // keyset gathering query replaces the WHERE clause onwards.
    if qb.flags & FLGB_CREATE_KEYSET != 0 {
        if qp.from_pos == Some(qp.opos) {
            qb.push_str(", \"ctid\", \"oid\" ");
            qb.load_from_pos = qb.npos();
        } else if qp.where_pos == Some(qp.opos) {
            qb.load_stmt_len = qb.npos();
            if qb.flags & FLGB_KEYSET_DRIVEN != 0 {
                qb.push_str("where ctid = '(0,0)';select \"ctid\", \"oid\" from ");
                let from = qp.from_pos.unwrap_or(0);
                let clause = &qp.statement[from + 5..qp.opos];
                qb.push_bytes(clause);
            }
        }
    }

    let oldchar = qp.current();
    if qp.current_is_continuation() {
        if qp.in_idle() {
            qp.token_restart(oldchar);
            qp.enter(IN_IDENT_KEYWORD);
        } else if !qp.token.is_empty() {
            qp.token_continue(oldchar);
        }
        qb.push(oldchar);
        return Ok(());
    }

    // Token completed in this call, drives the keyword rewrites below.
    let mut finished_token: Option<Vec<u8>> = None;

    if qp.is_in(IN_IDENT_KEYWORD) {
        if oldchar.is_ascii_alphanumeric() || oldchar == DOLLAR_QUOTE || oldchar == b'_' {
            qb.push(oldchar);
            qp.token_continue(oldchar);
            return Ok(());
        }
        finished_token = qp.token_finish(0);
        qp.exit(IN_IDENT_KEYWORD);
    }

    if qp.is_in(IN_ESCAPE) {
        qp.exit(IN_ESCAPE);
        qb.push(oldchar);
        return Ok(());
    } else if qp.is_in(IN_DOLLAR_QUOTE) {
        if oldchar == DOLLAR_QUOTE {
            if let Some((tag_start, tag_len)) = qp.dollar_tag {
                let tag = &qp.statement[tag_start..tag_start + tag_len];
                if qp.rest().starts_with(tag) {
                    qb.push_bytes(tag);
                    qp.opos += tag_len - 1;
                    qp.exit(IN_DOLLAR_QUOTE);
                    qp.dollar_tag = None;
                    return Ok(());
                }
            }
        }
        qb.push(oldchar);
        return Ok(());
    } else if qp.is_in(IN_LITERAL) {
        if oldchar == LITERAL_QUOTE {
            qp.token_finish(oldchar);
            qp.exit(IN_LITERAL);
        } else {
            qp.token_continue(oldchar);
            if Some(oldchar) == qp.escape_in_literal {
                qp.enter(IN_ESCAPE);
            }
        }
        qb.push(oldchar);
        return Ok(());
    } else if qp.is_in(IN_DQUOTE_IDENTIFIER) {
        if oldchar == IDENTIFIER_QUOTE {
            qp.token_finish(oldchar);
            qp.exit(IN_DQUOTE_IDENTIFIER);
        } else {
            qp.token_continue(oldchar);
        }
        qb.push(oldchar);
        return Ok(());
    } else if qp.is_in(IN_COMMENT_BLOCK) {
        if oldchar == b'/' && qp.peek(1) == Some(b'*') {
            qp.comment_level += 1;
            qb.push(oldchar);
            qp.opos += 1;
            qb.push(qp.current());
            return Ok(());
        } else if oldchar == b'*' && qp.peek(1) == Some(b'/') {
            qp.comment_level -= 1;
            if qp.comment_level == 0 {
                qp.exit(IN_COMMENT_BLOCK);
            }
            qb.push(oldchar);
            qp.opos += 1;
            qb.push(qp.current());
            return Ok(());
        }
        qb.push(oldchar);
        return Ok(());
    } else if qp.is_in(IN_LINE_COMMENT) {
        if oldchar == b'\n' {
            qp.exit(IN_LINE_COMMENT);
        }
        qb.push(oldchar);
        return Ok(());
    }

    if !qp.in_idle() {
        return Err(Error::Internal(
            "scanner left in a lexical state outside idle".to_string(),
        ));
    }

    // Squeeze carriage-return/linefeed pairs to linefeed only.
    if qb.flags & FLGB_CONVERT_LF != 0 && oldchar == b'\r' && qp.peek(1) == Some(b'\n') {
        return Ok(());
    }

    if oldchar == ESCAPE_START {
        qp.token_finish(0);
        return convert_escape(qp, qb, ctx);
    } else if oldchar == ESCAPE_END {
        qp.token_finish(0);
        qb.end_brace();
        return Ok(());
    } else if oldchar == b'@' && qp.rest().strip_prefix_ignore_case(b"@@identity").is_some() {
        // No catalog access here; the sequence of the last insert is the
        // best available answer.
        if ctx.conn.last_insert_table.is_some() {
            qb.push_str("lastval()");
        } else {
            qb.push_str("NULL");
        }
        qp.opos += 9;
        return Ok(());
    } else if oldchar != b'?' {
        match oldchar {
            DOLLAR_QUOTE => {
                finished_token = finished_token.or_else(|| qp.token_finish(0));
                if let Some(tag_len) = find_tag(qp.rest(), qp.encoding) {
                    qp.enter(IN_DOLLAR_QUOTE);
                    qp.dollar_tag = Some((qp.opos, tag_len));
                    qb.push_bytes(&qp.statement[qp.opos..qp.opos + tag_len]);
                    qp.opos += tag_len - 1;
                    return Ok(());
                }
            }
            LITERAL_QUOTE => {
                finished_token = finished_token.or_else(|| qp.token_restart(oldchar));
                qp.enter(IN_LITERAL);
                qp.escape_in_literal = scanner::default_escape_in_literal(
                    qp.statement,
                    qp.opos,
                    ctx.conn.options.escape_in_literal,
                );
            }
            IDENTIFIER_QUOTE => {
                finished_token = finished_token.or_else(|| qp.token_restart(oldchar));
                qp.enter(IN_DQUOTE_IDENTIFIER);
            }
            b'/' if qp.peek(1) == Some(b'*') => {
                qp.comment_level += 1;
                finished_token = finished_token.or_else(|| qp.token_finish(0));
                qp.enter(IN_COMMENT_BLOCK);
            }
            b'-' if qp.peek(1) == Some(b'-') => {
                finished_token = finished_token.or_else(|| qp.token_finish(0));
                qp.enter(IN_LINE_COMMENT);
            }
            b';' => {
                finished_token = finished_token.or_else(|| qp.token_restart(0));
                // Multiple statements cannot be prepared as one; reset the
                // marker counter per statement and drop cursor wrapping.
                qb.dollar_number = 0;
                if qp.flags & FLGP_USING_CURSOR != 0 {
                    let rest_after = &qp.statement[qp.opos + 1..];
                    if rest_after.iter().any(|b| !b.is_ascii_whitespace()) {
                        qp.flags |= FLGP_MULTIPLE_STATEMENT;
                        qb.flags &= !FLGB_KEYSET_DRIVEN;
                        remove_declare_cursor(qb, qp);
                    }
                }
            }
            _ if oldchar.is_ascii_alphanumeric() => {
                finished_token = finished_token.or_else(|| qp.token_restart(oldchar));
                qp.enter(IN_IDENT_KEYWORD);
            }
            _ => {
                finished_token = finished_token.or_else(|| qp.token_restart(oldchar));
            }
        }

        // Keyword driven rewrites once a token has just been completed.
        if let Some(token) = finished_token.as_deref() {
            match token.len() {
                4 => {
                    if qp.flags & FLGP_USING_CURSOR != 0
                        && token.eq_ignore_ascii_case(b"into")
                        && scanner::into_table_from(&qp.statement[qp.opos - token.len()..])
                    {
                        qp.flags |= FLGP_SELECT_INTO;
                        qb.flags &= !FLGB_KEYSET_DRIVEN;
                        qp.statement_type = StatementType::Create;
                        remove_declare_cursor(qb, qp);
                    } else if token.eq_ignore_ascii_case(b"join") {
                        scanner::check_join(qp.statement, qp.opos);
                    }
                }
                3 => {
                    if qp.flags & FLGP_USING_CURSOR != 0 && token.eq_ignore_ascii_case(b"for") {
                        let (flg, _) = scanner::table_for_update_or_share(qp.rest());
                        qp.flags |= flg;
                        if flg & FLGP_SELECT_FOR_UPDATE_OR_SHARE != 0 {
                            remove_declare_cursor(qb, qp);
                        }
                    }
                }
                1 => {
                    if qp.statement_type == StatementType::Insert
                        && token == b"("
                        && oldchar == b')'
                    {
                        if let Some(endpos) = scanner::insert_without_target(&qp.rest()[1..]) {
                            qb.out.truncate(qb.npos() - 1);
                            qb.push_str(" DEFAULT VALUES");
                            qp.opos += endpos;
                            return Ok(());
                        }
                    }
                }
                _ => {}
            }
        }

        qb.push(oldchar);
        return Ok(());
    } else {
        qp.token_restart(oldchar);
    }

    // It's a `?` parameter marker alright.
    resolve_one_param(qb, Some(qp), ctx)?;
    Ok(())
}

/// A rewritten statement as sent to the server, one per statement of a
/// multi statement query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedStmt {
    pub query: String,
    pub num_params: u16,
}

/// Result of an inline (client side binding) rewrite.
#[derive(Debug)]
pub struct InlineResult {
    pub text: String,
    /// `FLGP_*` flags collected by the scan.
    pub flags: u32,
    pub statement_type: StatementType,
    /// Select text without the declare prefix, used to re-read keyset rows.
    pub load_statement: Option<String>,
    pub use_fetch_cursor: bool,
    pub keyset_created: bool,
}

/// Decide cursor downgrades for the statement and report whether a keyset
/// may be maintained. Mirrors the downgrade ladder of the original driver:
/// dynamic falls back to keyset driven, keyset driven to static, static to
/// read only whenever updatability cannot be proven.
pub fn apply_cursor_downgrades(
    options: &mut StatementOptions,
    statement_type: StatementType,
    updatable: bool,
    allow: &crate::options::UpdatableCursors,
) {
    if statement_type != StatementType::Select {
        options.cursor_type = CursorType::ForwardOnly;
        options.concurrency = Concurrency::ReadOnly;
        return;
    }
    if options.cursor_type == CursorType::ForwardOnly {
        options.concurrency = Concurrency::ReadOnly;
        return;
    }
    if options.concurrency == Concurrency::ReadOnly {
        return;
    }
    if options.cursor_type == CursorType::Dynamic && !allow.allow_dynamic {
        options.cursor_type = CursorType::KeysetDriven;
    }
    if options.cursor_type == CursorType::KeysetDriven && !allow.allow_keyset_driven {
        options.cursor_type = CursorType::Static;
    }
    if options.cursor_type == CursorType::Static && !allow.allow_static {
        options.concurrency = Concurrency::ReadOnly;
        return;
    }
    if !updatable {
        options.concurrency = Concurrency::ReadOnly;
        options.cursor_type = CursorType::Static;
    }
}

/// Build the statement text with parameters inlined (or faked), prepending
/// a declare cursor when configured and splicing keyset columns for
/// updatable cursors.
#[allow(clippy::too_many_arguments)]
pub fn build_inline_statement<W: WireClient>(
    statement: &str,
    statement_type: StatementType,
    cursor_name: &str,
    options: &StatementOptions,
    ctx: &mut RewriteCtx<'_, W>,
    mode: ResolveMode,
    external: bool,
    with_hold: bool,
) -> Result<InlineResult, Error> {
    build_inline_statement_for_row(
        statement,
        statement_type,
        cursor_name,
        options,
        ctx,
        mode,
        external,
        with_hold,
        0,
    )
}

/// [`build_inline_statement`] for one row of an arrayed parameter set.
#[allow(clippy::too_many_arguments)]
pub fn build_inline_statement_for_row<W: WireClient>(
    statement: &str,
    statement_type: StatementType,
    cursor_name: &str,
    options: &StatementOptions,
    ctx: &mut RewriteCtx<'_, W>,
    mode: ResolveMode,
    external: bool,
    with_hold: bool,
    current_row: usize,
) -> Result<InlineResult, Error> {
    let bytes = statement.as_bytes();
    let mut qp = QueryParse::new(bytes, ctx.conn.encoding, statement_type)?;
    let mut qb = QueryBuild::new(mode, ctx, current_row);
    // Inlined values always carry their explicit cast where one applies.
    qb.flags |= FLGB_PARAM_CAST;

    let keyset_capable = statement_type == StatementType::Select
        && options.concurrency != Concurrency::ReadOnly
        && matches!(
            options.cursor_type,
            CursorType::KeysetDriven | CursorType::Static | CursorType::Dynamic
        );
    if keyset_capable {
        let (from_pos, where_pos) = scanner::locate_from_where(bytes, ctx.conn.encoding)?;
        qp.from_pos = from_pos;
        qp.where_pos = where_pos;
    }

    let mut use_fetch_cursor = false;
    if statement_type.may_use_cursor() && external {
        if ctx.conn.options.use_declare_fetch {
            use_fetch_cursor = true;
            let opt_scroll = if options.cursor_type != CursorType::ForwardOnly {
                " scroll"
            } else {
                ""
            };
            let opt_hold = if with_hold { " with hold" } else { "" };
            qb.push_str(&format!(
                "declare \"{cursor_name}\"{opt_scroll} cursor{opt_hold} for "
            ));
            qp.flags |= FLGP_USING_CURSOR;
            qp.declare_pos = qb.npos();
        }
        if options.concurrency != Concurrency::ReadOnly {
            qb.flags |= FLGB_CREATE_KEYSET;
            if options.cursor_type == CursorType::KeysetDriven {
                qb.flags |= FLGB_KEYSET_DRIVEN;
            }
        }
    }

    while qp.opos < qp.len() {
        inner_process_tokens(&mut qp, &mut qb, ctx)?;
        qp.opos += 1;
    }

    if qp.flags & FLGP_USING_CURSOR == 0 {
        use_fetch_cursor = false;
    }

    // Keyset driven selects without a WHERE clause still need the keyset
    // gathering query appended.
    let mut load_statement = None;
    let keyset_created = qb.flags & FLGB_CREATE_KEYSET != 0
        && qp.flags & (FLGP_SELECT_INTO | FLGP_MULTIPLE_STATEMENT) == 0;
    if let Some(from_pos) = qp.from_pos {
        let mut npos = qb.load_stmt_len;
        if npos == 0 {
            npos = qb.npos();
            while npos > 0 {
                let b = qb.out[npos - 1];
                if b.is_ascii_whitespace() {
                    npos -= 1;
                    continue;
                }
                if b != b';' {
                    break;
                }
                npos -= 1;
            }
            if qb.flags & FLGB_KEYSET_DRIVEN != 0 {
                qb.out.truncate(npos);
                qb.push_str(" where ctid = '(0,0)';select \"ctid\", \"oid\" from ");
                let clause_end = qp.len();
                let clause = &qp.statement[from_pos + 5..clause_end];
                qb.push_bytes(clause);
            }
        }
        let load =
            String::from_utf8(qb.out[qp.declare_pos..npos.max(qp.declare_pos)].to_vec())
                .map_err(|_| Error::Encoding)?;
        load_statement = Some(load);
    }

    debug!(
        "rewrote statement, flags={:x} fetch_cursor={use_fetch_cursor}",
        qp.flags
    );
    let flags = qp.flags;
    let statement_type = qp.statement_type;
    Ok(InlineResult {
        text: qb.into_text()?,
        flags,
        statement_type,
        load_statement,
        use_fetch_cursor,
        keyset_created,
    })
}

/// Result of a prepare mode rewrite: the `$n` marked text split into its
/// individual statements.
#[derive(Debug)]
pub struct PrepareResult {
    pub statements: Vec<ProcessedStmt>,
    pub flags: u32,
    pub proc_return: bool,
}

/// Process the original SQL for execution with server side prepared
/// statements: split a multi statement query into parts and replace `?`
/// markers with `$n`. With `fake_params` markers become NULL literals
/// instead, used when a result shape must be described before execution.
pub fn build_prepare_statements<W: WireClient>(
    statement: &str,
    statement_type: StatementType,
    ctx: &mut RewriteCtx<'_, W>,
    fake_params: bool,
) -> Result<PrepareResult, Error> {
    let bytes = statement.as_bytes();
    let mut qp = QueryParse::new(bytes, ctx.conn.encoding, statement_type)?;
    let mode = if fake_params {
        ResolveMode::FakeParams
    } else {
        ResolveMode::BuildingPrepare
    };
    let mut qb = QueryBuild::new(mode, ctx, 0);
    if ctx.conn.options.param_cast && !fake_params {
        qb.flags |= FLGB_PARAM_CAST;
    }

    while qp.opos < qp.len() {
        inner_process_tokens(&mut qp, &mut qb, ctx)?;
        qp.opos += 1;
    }
    let flags = qp.flags;
    let built = qb.into_text()?;

    // Split both the original and the rewritten text statement by
    // statement; the original yields the per statement marker counts.
    let encoding = ctx.conn.encoding;
    let mut statements = Vec::new();
    let mut org: &[u8] = bytes;
    let mut srv: &[u8] = built.as_bytes();
    loop {
        let (endp_org, num_params, more) = scanner::scan_query_and_count_params(org, encoding)?;
        let (endp_srv, _, _) = scanner::scan_query_and_count_params(srv, encoding)?;
        let query = String::from_utf8(srv[..endp_srv].to_vec()).map_err(|_| Error::Encoding)?;
        statements.push(ProcessedStmt {
            query,
            num_params: if fake_params { 0 } else { num_params },
        });
        if !more {
            break;
        }
        org = &org[(endp_org + 1).min(org.len())..];
        srv = &srv[(endp_srv + 1).min(srv.len())..];
    }

    Ok(PrepareResult {
        statements,
        flags,
        proc_return: *ctx.proc_return,
    })
}

/// Build the parameter values of a Bind request for one execution row.
pub fn build_bind_request<W: WireClient>(
    num_params: usize,
    ctx: &mut RewriteCtx<'_, W>,
    current_row: usize,
) -> Result<Vec<BindParam>, Error> {
    build_bind_request_from(num_params, 0, ctx, current_row)
}

/// Like [`build_bind_request`], starting at an absolute parameter index;
/// used for the later statements of a multi statement query.
pub fn build_bind_request_from<W: WireClient>(
    num_params: usize,
    first_param: usize,
    ctx: &mut RewriteCtx<'_, W>,
    current_row: usize,
) -> Result<Vec<BindParam>, Error> {
    let mut qb = QueryBuild::new(ResolveMode::BuildingBindRequest, ctx, current_row);
    qb.flags |= FLGB_BINARY_AS_POSSIBLE;
    qb.param_number = first_param as i32 - 1;
    for _ in 0..num_params {
        qb.out.clear();
        resolve_one_param(&mut qb, None, ctx)?;
    }
    Ok(qb.bind_params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        options::ConnectionOptions,
        params::CValue,
        sqltypes::SqlType,
        wire::tests_support::NullWire,
    };

    fn conn() -> Connection<NullWire> {
        Connection::new(NullWire::default(), ConnectionOptions::default())
    }

    fn rewrite(statement: &str) -> String {
        rewrite_with(statement, &[], &[])
    }

    fn rewrite_with(statement: &str, apd: &[ParamBinding], ipd: &[ParamInfo]) -> String {
        let mut conn = conn();
        let mut proc_return = false;
        let mut ctx = RewriteCtx {
            conn: &mut conn,
            apd,
            ipd,
            pdata: &[],
            proc_return: &mut proc_return,
            discard_output: false,
        };
        let options = StatementOptions::default();
        let res = build_inline_statement(
            statement,
            StatementType::classify(statement),
            "SQL_CUR1",
            &options,
            &mut ctx,
            ResolveMode::ReplaceParams,
            false,
            false,
        )
        .unwrap();
        res.text
    }

    #[test]
    fn plain_text_is_preserved() {
        for sql in [
            "SELECT a, b FROM t WHERE a > 10 ORDER BY b",
            "select 'lite''ral' || \"col\"",
            "select /* c ? */ 1 -- tail ?",
            "update t set a = 1",
        ] {
            assert_eq!(sql, rewrite(sql));
        }
    }

    #[test]
    fn dollar_quoted_region_is_copied_verbatim() {
        let sql = "select $tag$ ? { ' \" \n $x$ $tag$ from t";
        assert_eq!(sql, rewrite(sql));
    }

    #[test]
    fn parameters_are_inlined() {
        let apd = [
            ParamBinding::single(CValue::Long(3)),
            ParamBinding::single(CValue::Char(b"foo".to_vec())),
        ];
        let ipd = [
            ParamInfo::input(SqlType::Integer),
            ParamInfo::input(SqlType::Varchar),
        ];
        let text = rewrite_with("SELECT * FROM t WHERE id = ? AND name = ?", &apd, &ipd);
        assert_eq!("SELECT * FROM t WHERE id = 3 AND name = 'foo'", text);
    }

    #[test]
    fn question_marks_inside_literals_are_not_parameters() {
        let text = rewrite("select '?', \"?\" from t");
        assert_eq!("select '?', \"?\" from t", text);
    }

    #[test]
    fn prepare_mode_emits_dollar_markers() {
        let mut conn = conn();
        let apd = [
            ParamBinding::single(CValue::Long(1)),
            ParamBinding::single(CValue::Long(2)),
        ];
        let ipd = [
            ParamInfo::input(SqlType::Integer),
            ParamInfo::input(SqlType::Varchar),
        ];
        let mut proc_return = false;
        let mut ctx = RewriteCtx {
            conn: &mut conn,
            apd: &apd,
            ipd: &ipd,
            pdata: &[],
            proc_return: &mut proc_return,
            discard_output: false,
        };
        let res = build_prepare_statements(
            "SELECT * FROM t WHERE id = ? AND name = ?",
            StatementType::Select,
            &mut ctx,
            false,
        )
        .unwrap();
        assert_eq!(1, res.statements.len());
        assert_eq!(
            "SELECT * FROM t WHERE id = $1::int4 AND name = $2",
            res.statements[0].query
        );
        assert_eq!(2, res.statements[0].num_params);
    }

    #[test]
    fn existing_cast_suppresses_param_cast() {
        let mut conn = conn();
        let ipd = [ParamInfo::input(SqlType::Integer)];
        let mut proc_return = false;
        let mut ctx = RewriteCtx {
            conn: &mut conn,
            apd: &[],
            ipd: &ipd,
            pdata: &[],
            proc_return: &mut proc_return,
            discard_output: false,
        };
        let res = build_prepare_statements(
            "SELECT ?::numeric",
            StatementType::Select,
            &mut ctx,
            false,
        )
        .unwrap();
        assert_eq!("SELECT $1::numeric", res.statements[0].query);
    }

    #[test]
    fn multi_statement_split_counts_params_per_statement() {
        let mut conn = conn();
        let ipd = [
            ParamInfo::input(SqlType::Integer),
            ParamInfo::input(SqlType::Integer),
            ParamInfo::input(SqlType::Integer),
        ];
        let mut proc_return = false;
        let mut ctx = RewriteCtx {
            conn: &mut conn,
            apd: &[],
            ipd: &ipd,
            pdata: &[],
            proc_return: &mut proc_return,
            discard_output: false,
        };
        let res = build_prepare_statements(
            "insert into t values (?); select ? + ?",
            StatementType::Insert,
            &mut ctx,
            false,
        )
        .unwrap();
        assert_eq!(2, res.statements.len());
        assert_eq!("insert into t values ($1::int4)", res.statements[0].query);
        assert_eq!(1, res.statements[0].num_params);
        // The dollar counter restarts per statement.
        assert_eq!(" select $1::int4 + $2::int4", res.statements[1].query);
        assert_eq!(2, res.statements[1].num_params);
    }

    #[test]
    fn insert_empty_values_becomes_default_values() {
        let text = rewrite("insert into t () values ()");
        assert_eq!("insert into t  DEFAULT VALUES", text);
    }

    #[test]
    fn declare_fetch_wraps_select() {
        let mut conn = conn();
        conn.options.use_declare_fetch = true;
        let mut proc_return = false;
        let mut ctx = RewriteCtx {
            conn: &mut conn,
            apd: &[],
            ipd: &[],
            pdata: &[],
            proc_return: &mut proc_return,
            discard_output: false,
        };
        let options = StatementOptions::default();
        let res = build_inline_statement(
            "select * from t",
            StatementType::Select,
            "SQL_CUR7",
            &options,
            &mut ctx,
            ResolveMode::ReplaceParams,
            true,
            false,
        )
        .unwrap();
        assert_eq!(
            "declare \"SQL_CUR7\" cursor for select * from t",
            res.text
        );
        assert!(res.use_fetch_cursor);
    }

    #[test]
    fn select_for_update_disables_cursor_wrapping() {
        let mut conn = conn();
        conn.options.use_declare_fetch = true;
        let mut proc_return = false;
        let mut ctx = RewriteCtx {
            conn: &mut conn,
            apd: &[],
            ipd: &[],
            pdata: &[],
            proc_return: &mut proc_return,
            discard_output: false,
        };
        let options = StatementOptions::default();
        let res = build_inline_statement(
            "select * from t for update",
            StatementType::Select,
            "SQL_CUR7",
            &options,
            &mut ctx,
            ResolveMode::ReplaceParams,
            true,
            false,
        )
        .unwrap();
        assert_eq!("select * from t for update", res.text);
        assert!(!res.use_fetch_cursor);
        assert!(res.flags & FLGP_SELECT_FOR_UPDATE_OR_SHARE != 0);
    }

    #[test]
    fn keyset_columns_are_spliced_in() {
        let mut conn = conn();
        let mut proc_return = false;
        let mut ctx = RewriteCtx {
            conn: &mut conn,
            apd: &[],
            ipd: &[],
            pdata: &[],
            proc_return: &mut proc_return,
            discard_output: false,
        };
        let mut options = StatementOptions::default();
        options.cursor_type = CursorType::KeysetDriven;
        options.concurrency = Concurrency::RowVersion;
        let res = build_inline_statement(
            "select a from t where a > 0",
            StatementType::Select,
            "SQL_CUR1",
            &options,
            &mut ctx,
            ResolveMode::ReplaceParams,
            true,
            false,
        )
        .unwrap();
        assert_eq!(
            "select a , \"ctid\", \"oid\" from t where ctid = '(0,0)';\
             select \"ctid\", \"oid\" from t where a > 0",
            res.text
        );
        assert!(res.keyset_created);
        assert_eq!(
            Some("select a , \"ctid\", \"oid\" from t ".to_string()),
            res.load_statement
        );
    }

    #[test]
    fn parameter_count_invariance() {
        // Markers outside lexical states all get resolved, none survive.
        let apd = [
            ParamBinding::single(CValue::Long(1)),
            ParamBinding::single(CValue::Long(2)),
            ParamBinding::single(CValue::Long(3)),
        ];
        let ipd = [
            ParamInfo::input(SqlType::Integer),
            ParamInfo::input(SqlType::Integer),
            ParamInfo::input(SqlType::Integer),
        ];
        let text = rewrite_with("select ?, '?', ?, $q$?$q$, ?", &apd, &ipd);
        assert_eq!("select 1, '?', 2, $q$?$q$, 3", text);
    }
}
