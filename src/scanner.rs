//! Lexical scanner over user supplied SQL.
//!
//! Tracks the parse states (identifier, literal, double quoted identifier,
//! dollar quote, comments, escape-in-literal) byte by byte so the rewriter
//! only ever reacts to `?`, `{`, `;` and friends when they are plain SQL
//! syntax. Multi byte characters are carried verbatim, their continuation
//! bytes never trigger a transition.

use crate::{
    encoding::{ClientEncoding, continuation_map},
    error::Error,
};

pub const LITERAL_QUOTE: u8 = b'\'';
pub const IDENTIFIER_QUOTE: u8 = b'"';
pub const DOLLAR_QUOTE: u8 = b'$';
pub const ESCAPE_START: u8 = b'{';
pub const ESCAPE_END: u8 = b'}';
/// Prefix marking a literal with backslash escape semantics, `E'...'`.
pub const LITERAL_EXT: u8 = b'E';

/// Parse state bits. Outside idle exactly one of these is set, except that
/// `IN_ESCAPE` rides on top of `IN_LITERAL`.
pub const IN_IDENT_KEYWORD: u32 = 1;
pub const IN_DQUOTE_IDENTIFIER: u32 = 1 << 1;
pub const IN_LITERAL: u32 = 1 << 2;
pub const IN_ESCAPE: u32 = 1 << 3;
pub const IN_DOLLAR_QUOTE: u32 = 1 << 4;
pub const IN_COMMENT_BLOCK: u32 = 1 << 5;
pub const IN_LINE_COMMENT: u32 = 1 << 6;

/// Flags collected while scanning one statement.
pub const FLGP_USING_CURSOR: u32 = 1 << 1;
pub const FLGP_SELECT_INTO: u32 = 1 << 2;
pub const FLGP_SELECT_FOR_UPDATE_OR_SHARE: u32 = 1 << 3;
pub const FLGP_MULTIPLE_STATEMENT: u32 = 1 << 5;
pub const FLGP_SELECT_FOR_READONLY: u32 = 1 << 6;

/// Kind of SQL statement, recognized from the first keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    Grant,
    Revoke,
    ProcCall,
    Lock,
    With,
    Transaction,
    #[default]
    Other,
}

impl StatementType {
    /// Classify a statement by its first token.
    pub fn classify(statement: &str) -> Self {
        let trimmed = statement.trim_start();
        if trimmed.starts_with('{') {
            return StatementType::ProcCall;
        }
        let word: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        match word.to_ascii_uppercase().as_str() {
            "SELECT" => StatementType::Select,
            "INSERT" => StatementType::Insert,
            "UPDATE" => StatementType::Update,
            "DELETE" => StatementType::Delete,
            "CREATE" => StatementType::Create,
            "ALTER" => StatementType::Alter,
            "DROP" => StatementType::Drop,
            "GRANT" => StatementType::Grant,
            "REVOKE" => StatementType::Revoke,
            "LOCK" => StatementType::Lock,
            "WITH" => StatementType::With,
            "BEGIN" | "COMMIT" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" | "END" | "ABORT" => {
                StatementType::Transaction
            }
            "CALL" => StatementType::ProcCall,
            _ => StatementType::Other,
        }
    }

    /// The statement may return rows and qualifies for cursor wrapping.
    pub fn may_use_cursor(self) -> bool {
        matches!(self, StatementType::Select | StatementType::With)
    }

    /// The statement cannot touch user data, no savepoint is required.
    pub fn no_savepoint_needed(self) -> bool {
        matches!(self, StatementType::Transaction)
    }
}

/// Rolling token buffer. Tokens longer than the buffer are recognized by
/// their first 63 bytes, which is plenty for the keywords of interest.
#[derive(Debug)]
pub struct TokenBuf {
    buf: [u8; 64],
    len: usize,
}

impl TokenBuf {
    fn new() -> Self {
        TokenBuf {
            buf: [0; 64],
            len: 0,
        }
    }

    fn start(&mut self, byte: u8) {
        self.buf[0] = byte;
        self.len = 1;
    }

    fn push(&mut self, byte: u8) {
        if self.len + 1 < self.buf.len() {
            self.buf[self.len] = byte;
            self.len += 1;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn eq_ignore_case(&self, keyword: &str) -> bool {
        self.as_bytes().eq_ignore_ascii_case(keyword.as_bytes())
    }
}

/// Scanner state over one source statement.
pub struct QueryParse<'a> {
    pub statement: &'a [u8],
    /// Continuation flags, one per statement byte.
    continuation: Vec<bool>,
    pub statement_type: StatementType,
    /// Current byte position.
    pub opos: usize,
    pub in_status: u32,
    pub comment_level: u32,
    /// Byte range of the active dollar quote tag within `statement`.
    pub dollar_tag: Option<(usize, usize)>,
    /// Escape character active inside the current literal.
    pub escape_in_literal: Option<u8>,
    pub token: TokenBuf,
    pub prev_token_end: bool,
    /// Position of the `FROM` keyword of an updatable select, if known.
    pub from_pos: Option<usize>,
    /// Position of the `WHERE` keyword of an updatable select, if known.
    pub where_pos: Option<usize>,
    /// Output length of the `declare ... cursor for ` prefix.
    pub declare_pos: usize,
    pub flags: u32,
    pub encoding: ClientEncoding,
}

impl<'a> QueryParse<'a> {
    pub fn new(
        statement: &'a [u8],
        encoding: ClientEncoding,
        statement_type: StatementType,
    ) -> Result<Self, Error> {
        Ok(QueryParse {
            statement,
            continuation: continuation_map(statement, encoding)?,
            statement_type,
            opos: 0,
            in_status: 0,
            comment_level: 0,
            dollar_tag: None,
            escape_in_literal: None,
            token: TokenBuf::new(),
            prev_token_end: true,
            from_pos: None,
            where_pos: None,
            declare_pos: 0,
            flags: 0,
            encoding,
        })
    }

    pub fn len(&self) -> usize {
        self.statement.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statement.is_empty()
    }

    pub fn current(&self) -> u8 {
        self.statement[self.opos]
    }

    pub fn current_is_continuation(&self) -> bool {
        self.continuation[self.opos]
    }

    pub fn peek(&self, offset: usize) -> Option<u8> {
        self.statement.get(self.opos + offset).copied()
    }

    /// Remaining statement text starting at the current position.
    pub fn rest(&self) -> &'a [u8] {
        &self.statement[self.opos..]
    }

    pub fn in_idle(&self) -> bool {
        self.in_status == 0
    }

    pub fn is_in(&self, status: u32) -> bool {
        self.in_status & status != 0
    }

    pub fn enter(&mut self, status: u32) {
        self.in_status |= status;
    }

    pub fn exit(&mut self, status: u32) {
        self.in_status &= !status;
    }

    // Token buffer handling. `finish` seals the current token and hands it
    // out, `restart` seals and immediately opens a new one with the byte.

    pub fn token_start(&mut self, byte: u8) {
        self.prev_token_end = false;
        self.token.start(byte);
    }

    pub fn token_finish(&mut self, byte: u8) -> Option<Vec<u8>> {
        if self.prev_token_end {
            return None;
        }
        if byte != 0 {
            self.token.push(byte);
        }
        self.prev_token_end = true;
        Some(self.token.as_bytes().to_vec())
    }

    pub fn token_restart(&mut self, byte: u8) -> Option<Vec<u8>> {
        let finished = self.token_finish(0);
        if byte != 0 && !byte.is_ascii_whitespace() {
            self.token_start(byte);
        }
        finished
    }

    pub fn token_continue(&mut self, byte: u8) {
        if self.prev_token_end {
            self.token_start(byte);
        } else {
            self.token.push(byte);
        }
    }
}

/// Length of the `$tag$` starting at `text[0]` (which must be a dollar),
/// `None` when no valid closing dollar follows.
pub fn find_tag(text: &[u8], encoding: ClientEncoding) -> Option<usize> {
    let map = continuation_map(text, encoding).ok()?;
    for (i, &b) in text.iter().enumerate().skip(1) {
        if map[i] {
            continue;
        }
        if b == DOLLAR_QUOTE {
            return Some(i + 1);
        }
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            break;
        }
    }
    None
}

/// Length of the identifier at the start of `text` (quoted or not) and the
/// position of the next token, if any.
pub fn find_identifier(text: &[u8]) -> (usize, Option<usize>) {
    let mut dquote = false;
    let mut len = None;
    let mut i = 0;
    while i < text.len() {
        let b = text[i];
        if i == 0 {
            if b == IDENTIFIER_QUOTE {
                dquote = true;
                i += 1;
                continue;
            }
            if !b.is_ascii_alphabetic() && b != b'_' {
                len = Some(0);
                break;
            }
            i += 1;
            continue;
        }
        if dquote {
            if b == IDENTIFIER_QUOTE {
                if text.get(i + 1) == Some(&IDENTIFIER_QUOTE) {
                    i += 2;
                    continue;
                }
                len = Some(i + 1);
                i += 1;
                break;
            }
            i += 1;
        } else {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'$' {
                i += 1;
                continue;
            }
            len = Some(i);
            break;
        }
    }
    let len = len.unwrap_or(if dquote { 0 } else { text.len() });
    let next = text[len.max(i.min(text.len()))..]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|p| len.max(i.min(text.len())) + p);
    (len, next)
}

/// Unquote and fold an identifier: a quoted name loses its quotes, an
/// unquoted one is folded to lower case.
pub fn normalize_identifier(raw: &[u8]) -> String {
    if raw.first() == Some(&IDENTIFIER_QUOTE) {
        let inner = &raw[1..raw.len().saturating_sub(1)];
        let mut out = String::new();
        let mut i = 0;
        while i < inner.len() {
            if inner[i] == IDENTIFIER_QUOTE && inner.get(i + 1) == Some(&IDENTIFIER_QUOTE) {
                out.push('"');
                i += 2;
            } else {
                out.push(inner[i] as char);
                i += 1;
            }
        }
        out
    } else {
        String::from_utf8_lossy(raw).to_ascii_lowercase()
    }
}

/// Schema qualified table reference parsed from the head of a FROM clause.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub table: String,
}

impl TableRef {
    /// Quoted form suitable for splicing into generated SQL.
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{}\".\"{}\"", schema, self.table),
            None => format!("\"{}\"", self.table),
        }
    }
}

/// Read the (optionally schema qualified) table name at the start of a FROM
/// clause. Returns `None` for anything but a plain table reference.
pub fn eat_table_identifier(text: &[u8]) -> Option<TableRef> {
    let start = text.iter().position(|b| !b.is_ascii_whitespace())?;
    let text = &text[start..];
    let (len, next) = find_identifier(text);
    if len == 0 {
        return None;
    }
    let first = normalize_identifier(&text[..len]);
    // A dot directly after the identifier qualifies it.
    if text.get(len) == Some(&b'.') {
        let rest = &text[len + 1..];
        let (len2, _) = find_identifier(rest);
        if len2 == 0 {
            return None;
        }
        return Some(TableRef {
            schema: Some(first),
            table: normalize_identifier(&rest[..len2]),
        });
    }
    let _ = next;
    Some(TableRef {
        schema: None,
        table: first,
    })
}

/// True when the text after a `SELECT ... INTO` token looks like
/// `INTO table FROM`, i.e. the statement creates a table.
pub fn into_table_from(text: &[u8]) -> bool {
    let Some(rest) = text.strip_prefix_ignore_case(b"into") else {
        return false;
    };
    let Some(start) = rest.iter().position(|b| !b.is_ascii_whitespace()) else {
        return false;
    };
    let rest = &rest[start..];
    match rest.first() {
        None => return false,
        Some(&b',') | Some(&LITERAL_QUOTE) | Some(&DOLLAR_QUOTE) => return false,
        Some(&b'-') | Some(&b'/') => return true,
        Some(&IDENTIFIER_QUOTE) => {
            let (len, _) = find_identifier(rest);
            if len == 0 {
                return false;
            }
            return after_target_is_from(&rest[len..]);
        }
        _ => {}
    }
    let end = rest
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(rest.len());
    after_target_is_from(&rest[end..])
}

fn after_target_is_from(rest: &[u8]) -> bool {
    let Some(start) = rest.iter().position(|b| !b.is_ascii_whitespace()) else {
        return false;
    };
    let rest = &rest[start..];
    match rest.first() {
        Some(&b'/') | Some(&b'-') => true,
        _ => rest.strip_prefix_ignore_case(b"from").is_some(),
    }
}

/// Classification of the clause following a top level `FOR` keyword in a
/// SELECT.
pub fn table_for_update_or_share(text: &[u8]) -> (u32, usize) {
    let Some(start) = text.iter().position(|b| !b.is_ascii_whitespace()) else {
        return (0, 0);
    };
    let rest = &text[start..];
    let (flag, advance) = if rest.strip_prefix_ignore_case(b"update").is_some() {
        (FLGP_SELECT_FOR_UPDATE_OR_SHARE, 6)
    } else if rest.strip_prefix_ignore_case(b"share").is_some() {
        (FLGP_SELECT_FOR_UPDATE_OR_SHARE, 5)
    } else if rest.strip_prefix_ignore_case(b"read").is_some() {
        (FLGP_SELECT_FOR_READONLY, 4)
    } else {
        // `for` followed by something else, treat as possibly locking.
        return (FLGP_SELECT_FOR_UPDATE_OR_SHARE, 0);
    };
    let mut rest = &rest[advance..];
    if rest.first().is_some_and(|b| !b.is_ascii_whitespace()) {
        return (flag, 0);
    }
    if flag == FLGP_SELECT_FOR_READONLY {
        let Some(ws) = rest.iter().position(|b| !b.is_ascii_whitespace()) else {
            return (flag, 0);
        };
        rest = &rest[ws..];
        if rest.strip_prefix_ignore_case(b"only").is_none() {
            return (flag, 0);
        }
        rest = &rest[4..];
        if rest.first().is_some_and(|b| !b.is_ascii_whitespace()) {
            return (flag, 0);
        }
    }
    let endpos = text.len() - rest.len();
    (flag, endpos)
}

/// Inspect the tokens before a `JOIN` keyword at `pos` in `text` and report
/// whether it is an outer join. `None` when the preceding token is not a
/// join qualifier at all.
pub fn check_join(text: &[u8], pos: usize) -> Option<bool> {
    // Walk back over `join` itself and whitespace before it.
    let mut end = pos.min(text.len());
    while end > 0 && text[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    if end < 4 {
        return None;
    }
    end -= 4; // the word `join`
    while end > 0 && text[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    let mut start = end;
    while start > 0 && !text[start - 1].is_ascii_whitespace() {
        start -= 1;
    }
    let token = &text[start..end];
    if token.eq_ignore_ascii_case(b"full")
        || token.eq_ignore_ascii_case(b"left")
        || token.eq_ignore_ascii_case(b"right")
        || token.eq_ignore_ascii_case(b"outer")
    {
        Some(true)
    } else if token.eq_ignore_ascii_case(b"inner") || token.eq_ignore_ascii_case(b"cross") {
        Some(false)
    } else {
        None
    }
}

/// True when the text after the `()` of an `INSERT INTO t ()` is
/// `VALUES ()`, i.e. the statement inserts all defaults. Returns how many
/// bytes were consumed.
pub fn insert_without_target(text: &[u8]) -> Option<usize> {
    let start = text.iter().position(|b| !b.is_ascii_whitespace())?;
    let rest = text[start..].strip_prefix_ignore_case(b"values")?;
    if rest.first().is_some_and(|b| !b.is_ascii_whitespace()) {
        return None;
    }
    let ws = rest.iter().position(|b| !b.is_ascii_whitespace())?;
    let rest = &rest[ws..];
    let rest = rest.strip_prefix(b"(")?;
    let rest = rest.strip_prefix(b")")?;
    let consumed = text.len() - rest.len();
    match rest.first() {
        None => Some(consumed),
        Some(&b) if b.is_ascii_whitespace() || b == b';' => Some(consumed),
        _ => None,
    }
}

/// Scan `query` for the end of its first statement. Returns the byte
/// position of the terminating `;` (or the text length), the number of
/// parameter markers seen before it and whether another statement follows.
pub fn scan_query_and_count_params(
    query: &[u8],
    encoding: ClientEncoding,
) -> Result<(usize, u16, bool), Error> {
    let mut qp = QueryParse::new(query, encoding, StatementType::Other)?;
    let mut num_params = 0u16;
    let mut end = query.len();
    let mut more = false;
    while qp.opos < qp.len() {
        let byte = qp.current();
        if qp.current_is_continuation() {
            qp.opos += 1;
            continue;
        }
        if !qp.in_idle() {
            step_lexical_state(&mut qp, byte, encoding);
        } else {
            match byte {
                b'?' => num_params += 1,
                b';' => {
                    let rest = &query[qp.opos + 1..];
                    if rest.iter().any(|b| !b.is_ascii_whitespace()) {
                        more = true;
                    }
                    end = qp.opos;
                    break;
                }
                LITERAL_QUOTE => {
                    qp.enter(IN_LITERAL);
                    qp.escape_in_literal = default_escape_in_literal(query, qp.opos, None);
                }
                IDENTIFIER_QUOTE => qp.enter(IN_DQUOTE_IDENTIFIER),
                DOLLAR_QUOTE => {
                    if let Some(tag_len) = find_tag(qp.rest(), encoding) {
                        qp.enter(IN_DOLLAR_QUOTE);
                        qp.dollar_tag = Some((qp.opos, tag_len));
                        qp.opos += tag_len - 1;
                    }
                }
                b'/' if qp.peek(1) == Some(b'*') => {
                    qp.comment_level += 1;
                    qp.enter(IN_COMMENT_BLOCK);
                    qp.opos += 1;
                }
                b'-' if qp.peek(1) == Some(b'-') => {
                    qp.enter(IN_LINE_COMMENT);
                    qp.opos += 1;
                }
                _ => {}
            }
        }
        qp.opos += 1;
    }
    Ok((end, num_params, more))
}

/// Escape character active in the literal opened at `quote_pos`, honoring a
/// connection level escape and the `E'...'` prefix.
pub fn default_escape_in_literal(
    statement: &[u8],
    quote_pos: usize,
    configured: Option<u8>,
) -> Option<u8> {
    if configured.is_some() {
        return configured;
    }
    if quote_pos > 0 && statement[quote_pos - 1].to_ascii_uppercase() == LITERAL_EXT {
        return Some(b'\\');
    }
    None
}

/// Locate the top level `FROM` and `WHERE` keywords of a select statement,
/// skipping anything inside parentheses, literals or comments. Used to
/// derive the keyset queries for updatable cursors.
pub fn locate_from_where(
    statement: &[u8],
    encoding: ClientEncoding,
) -> Result<(Option<usize>, Option<usize>), Error> {
    let mut qp = QueryParse::new(statement, encoding, StatementType::Select)?;
    let mut paren_depth = 0i32;
    let mut from_pos = None;
    let mut where_pos = None;
    let mut prev_was_boundary = true;
    while qp.opos < qp.len() {
        let byte = qp.current();
        if qp.current_is_continuation() {
            prev_was_boundary = false;
            qp.opos += 1;
            continue;
        }
        if !qp.in_idle() {
            // Re-use the single statement scanner's state handling by
            // feeding it through the same transitions.
            step_lexical_state(&mut qp, byte, encoding);
            qp.opos += 1;
            continue;
        }
        match byte {
            b'(' => paren_depth += 1,
            b')' => paren_depth -= 1,
            LITERAL_QUOTE => {
                qp.enter(IN_LITERAL);
                qp.escape_in_literal = default_escape_in_literal(statement, qp.opos, None);
            }
            IDENTIFIER_QUOTE => qp.enter(IN_DQUOTE_IDENTIFIER),
            DOLLAR_QUOTE => {
                if let Some(tag_len) = find_tag(qp.rest(), encoding) {
                    qp.enter(IN_DOLLAR_QUOTE);
                    qp.dollar_tag = Some((qp.opos, tag_len));
                    qp.opos += tag_len - 1;
                }
            }
            b'/' if qp.peek(1) == Some(b'*') => {
                qp.comment_level += 1;
                qp.enter(IN_COMMENT_BLOCK);
                qp.opos += 1;
            }
            b'-' if qp.peek(1) == Some(b'-') => {
                qp.enter(IN_LINE_COMMENT);
                qp.opos += 1;
            }
            _ => {
                if paren_depth == 0 && prev_was_boundary {
                    let rest = qp.rest();
                    if from_pos.is_none()
                        && rest.strip_prefix_ignore_case(b"from").is_some()
                        && boundary_after(rest, 4)
                    {
                        from_pos = Some(qp.opos);
                    } else if where_pos.is_none()
                        && rest.strip_prefix_ignore_case(b"where").is_some()
                        && boundary_after(rest, 5)
                    {
                        where_pos = Some(qp.opos);
                    }
                }
            }
        }
        prev_was_boundary = !byte.is_ascii_alphanumeric() && byte != b'_' && byte != b'$';
        qp.opos += 1;
    }
    Ok((from_pos, where_pos))
}

fn boundary_after(rest: &[u8], len: usize) -> bool {
    rest.get(len)
        .map(|b| !b.is_ascii_alphanumeric() && *b != b'_' && *b != b'$')
        .unwrap_or(true)
}

fn step_lexical_state(qp: &mut QueryParse<'_>, byte: u8, _encoding: ClientEncoding) {
    if qp.is_in(IN_ESCAPE) {
        qp.exit(IN_ESCAPE);
    } else if qp.is_in(IN_DOLLAR_QUOTE) {
        if byte == DOLLAR_QUOTE {
            if let Some((tag_start, tag_len)) = qp.dollar_tag {
                let tag_start_slice = &qp.statement[tag_start..tag_start + tag_len];
                if qp.rest().starts_with(tag_start_slice) {
                    qp.opos += tag_len - 1;
                    qp.exit(IN_DOLLAR_QUOTE);
                    qp.dollar_tag = None;
                }
            }
        }
    } else if qp.is_in(IN_LITERAL) {
        if byte == LITERAL_QUOTE {
            qp.exit(IN_LITERAL);
        } else if Some(byte) == qp.escape_in_literal {
            qp.enter(IN_ESCAPE);
        }
    } else if qp.is_in(IN_DQUOTE_IDENTIFIER) {
        if byte == IDENTIFIER_QUOTE {
            qp.exit(IN_DQUOTE_IDENTIFIER);
        }
    } else if qp.is_in(IN_COMMENT_BLOCK) {
        if byte == b'*' && qp.peek(1) == Some(b'/') {
            qp.comment_level -= 1;
            if qp.comment_level == 0 {
                qp.exit(IN_COMMENT_BLOCK);
            }
            qp.opos += 1;
        } else if byte == b'/' && qp.peek(1) == Some(b'*') {
            qp.comment_level += 1;
            qp.opos += 1;
        }
    } else if qp.is_in(IN_LINE_COMMENT) && byte == b'\n' {
        qp.exit(IN_LINE_COMMENT);
    }
}

/// Case insensitive prefix stripping for byte slices.
pub trait StripPrefixIgnoreCase {
    fn strip_prefix_ignore_case(&self, prefix: &[u8]) -> Option<&[u8]>;
}

impl StripPrefixIgnoreCase for [u8] {
    fn strip_prefix_ignore_case(&self, prefix: &[u8]) -> Option<&[u8]> {
        if self.len() >= prefix.len() && self[..prefix.len()].eq_ignore_ascii_case(prefix) {
            Some(&self[prefix.len()..])
        } else {
            None
        }
    }
}
