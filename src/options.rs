//! Connection and statement options recognized by the driver core.

/// Policy applied when a statement fails inside an explicit transaction.
/// Corresponds to the `Protocol=7.4-{0,1,2}` connection setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RollbackPolicy {
    /// No automatic recovery. Subsequent statements fail until the user
    /// rolls back.
    None,
    /// The whole transaction is rolled back on error.
    Transaction,
    /// A savepoint is taken per statement, an error rolls back to it.
    #[default]
    Statement,
}

/// Which cursor kinds may maintain a keyset for positioned updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct UpdatableCursors {
    pub allow_static: bool,
    pub allow_keyset_driven: bool,
    pub allow_dynamic: bool,
}

impl UpdatableCursors {
    pub fn all() -> Self {
        UpdatableCursors {
            allow_static: true,
            allow_keyset_driven: true,
            allow_dynamic: true,
        }
    }

    pub fn any(&self) -> bool {
        self.allow_static || self.allow_keyset_driven || self.allow_dynamic
    }
}

/// Behavior of server side cursors at transaction commit, as reported by
/// the server or configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CursorCommitBehavior {
    Delete,
    #[default]
    Close,
    Preserve,
}

/// Direction(s) in which empty date strings and NULL are mapped into each
/// other for FoxPro style clients. Never inferred, always explicit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CvtNullDate {
    #[default]
    Off,
    /// Empty date strings sent as parameters become NULL.
    EmptyToNull,
    /// Additionally NULL date columns are fetched as empty strings.
    Both,
}

/// How column sizes of unbounded types are reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UnknownSizes {
    #[default]
    Maximum,
    DontKnow,
    Longest,
}

/// Connection scoped configuration. Captured once at connection creation,
/// statements inherit from it.
#[derive(Clone, Debug)]
pub struct ConnectionOptions {
    /// Prefer extended query protocol Parse over client side parameter
    /// inlining.
    pub use_server_side_prepare: bool,
    /// Wrap SELECT statements in `DECLARE ... CURSOR FOR` and fetch in
    /// chunks.
    pub use_declare_fetch: bool,
    /// Rows fetched per round trip in declare/fetch mode.
    pub fetch_size: u32,
    pub updatable_cursors: UpdatableCursors,
    pub rollback_policy: RollbackPolicy,
    /// Exchange booleans as `VARCHAR(5)` instead of `BIT`.
    pub bools_as_char: bool,
    /// Report `bytea` columns as `LONGVARBINARY`.
    pub bytes_as_long_varbinary: bool,
    /// Translate `\n` <-> `\r\n` on text columns and statement text.
    pub lf_conversion: bool,
    pub max_varchar_size: usize,
    pub max_longvarchar_size: usize,
    pub unknown_sizes: UnknownSizes,
    /// After a procedure call returning refcursors, fetch from each portal.
    pub fetch_refcursors: bool,
    pub cvt_null_date: CvtNullDate,
    /// Enable the driver side statement parser for metadata without a round
    /// trip.
    pub parse_statement: bool,
    /// Render boolean true as `-1` for FoxPro compatible clients.
    pub true_is_minus1: bool,
    /// Accepted but ignored, the wire layer owns timeouts.
    pub query_timeout: u32,
    /// Append an explicit `::type` cast to `$n` markers during server side
    /// prepare.
    pub param_cast: bool,
    /// Server reports standard_conforming_strings = off, literals with
    /// backslashes need the `E` prefix.
    pub literal_extension: bool,
    /// Server understands the `\x` hex format for bytea literals.
    pub hex_bytea_format: bool,
    /// Escape character active inside plain literals, if any.
    pub escape_in_literal: Option<u8>,
    pub cursor_commit_behavior: CursorCommitBehavior,
    /// On string conversion failure produce an empty value instead of
    /// failing the statement.
    pub empty_on_conversion_error: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            use_server_side_prepare: true,
            use_declare_fetch: false,
            fetch_size: 100,
            updatable_cursors: UpdatableCursors::default(),
            rollback_policy: RollbackPolicy::default(),
            bools_as_char: false,
            bytes_as_long_varbinary: false,
            lf_conversion: false,
            max_varchar_size: 255,
            max_longvarchar_size: 8190,
            unknown_sizes: UnknownSizes::default(),
            fetch_refcursors: false,
            cvt_null_date: CvtNullDate::default(),
            parse_statement: false,
            true_is_minus1: false,
            query_timeout: 0,
            param_cast: true,
            literal_extension: false,
            hex_bytea_format: true,
            escape_in_literal: Some(b'\\'),
            cursor_commit_behavior: CursorCommitBehavior::default(),
            empty_on_conversion_error: false,
        }
    }
}

/// Kind of cursor requested for a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CursorType {
    #[default]
    ForwardOnly,
    Static,
    KeysetDriven,
    Dynamic,
}

/// Concurrency requested for a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Concurrency {
    #[default]
    ReadOnly,
    Lock,
    RowVersion,
    Values,
}

/// Statement scoped options, initialized from the connection.
#[derive(Clone, Debug)]
pub struct StatementOptions {
    pub cursor_type: CursorType,
    pub concurrency: Concurrency,
    /// Rows materialized per block fetch.
    pub row_array_size: usize,
    /// `0` = column wise binding, else length of one row in bytes.
    pub bind_type: usize,
    pub use_bookmarks: bool,
    /// Upper bound on rows a SELECT may return, `0` = unlimited.
    pub max_rows: usize,
    pub keep_cursor_with_hold: bool,
}

impl Default for StatementOptions {
    fn default() -> Self {
        StatementOptions {
            cursor_type: CursorType::default(),
            concurrency: Concurrency::default(),
            row_array_size: 1,
            bind_type: 0,
            use_bookmarks: false,
            max_rows: 0,
            keep_cursor_with_hold: false,
        }
    }
}
