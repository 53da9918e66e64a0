use thiserror::Error as ThisError;

/// Five byte SQLSTATE code identifying the class of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SqlState(pub [u8; 5]);

impl SqlState {
    /// General syntax error or access rule violation reported by the server.
    pub const SYNTAX_ERROR: SqlState = SqlState(*b"42601");
    /// String data, right truncated.
    pub const STRING_DATA_RIGHT_TRUNCATION: SqlState = SqlState(*b"01004");
    /// Restricted data type attribute violation.
    pub const RESTRICTED_DATA_TYPE: SqlState = SqlState(*b"07006");
    /// Invalid cursor state.
    pub const INVALID_CURSOR_STATE: SqlState = SqlState(*b"24000");
    /// Invalid cursor position.
    pub const INVALID_CURSOR_POSITION: SqlState = SqlState(*b"HY109");
    /// Function sequence error.
    pub const SEQUENCE_ERROR: SqlState = SqlState(*b"HY010");
    /// Invalid string or buffer length.
    pub const INVALID_BUFFER_LEN: SqlState = SqlState(*b"HY090");
    /// Indicator variable required but not supplied.
    pub const INDICATOR_REQUIRED: SqlState = SqlState(*b"22002");
    /// Invalid character value for cast specification.
    pub const INVALID_CHAR_VALUE: SqlState = SqlState(*b"22018");
    /// Operation canceled.
    pub const OPERATION_CANCELED: SqlState = SqlState(*b"HY008");
    /// Connection failure.
    pub const CONNECTION_FAILURE: SqlState = SqlState(*b"08S01");
    /// General error.
    pub const GENERAL_ERROR: SqlState = SqlState(*b"HY000");
    /// Optional feature not implemented.
    pub const NOT_IMPLEMENTED: SqlState = SqlState(*b"HYC00");
    /// Row value out of range (keyset row version changed).
    pub const ROW_VERSION_CHANGED: SqlState = SqlState(*b"01001");

    /// View the state as text. Always succeeds, states are ASCII.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("HY000")
    }
}

/// Error type shared by all fallible operations of the driver core.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The wire layer failed; the connection is no longer usable.
    #[error("Connection to the server is lost:\n{0}")]
    Protocol(String),
    /// The server rejected a statement. The server message is preserved
    /// verbatim.
    #[error("Error reported by the server:\n{0}")]
    Server(String),
    /// The caller supplied arguments the driver can reject without a round
    /// trip, e.g. a parameter index out of range.
    #[error("{0}")]
    Validation(String),
    /// The requested conversion between a C type and a PostgreSQL type is
    /// not supported.
    #[error("Conversion from PostgreSQL type {pg_type} to the requested C type is not supported.")]
    UnsupportedConversion { pg_type: crate::types::Oid },
    /// Column or parameter text could not be converted between the client
    /// encoding and the required wire encoding.
    #[error("Could not convert text between the client encoding and the server encoding.")]
    InvalidStringConversion,
    /// The statement text contains bytes which are not valid in the client
    /// encoding.
    #[error("Statement text is not valid in the client encoding.")]
    Encoding,
    /// Statement execution has been canceled from another thread.
    #[error("Operation canceled.")]
    OperationCancelled,
    /// An internal invariant has been violated. Statement and connection are
    /// unusable until freed.
    #[error("Internal driver error: {0}")]
    Internal(String),
}

impl Error {
    /// SQLSTATE associated with this error kind.
    pub fn sql_state(&self) -> SqlState {
        match self {
            Error::Protocol(_) => SqlState::CONNECTION_FAILURE,
            Error::Server(_) => SqlState::SYNTAX_ERROR,
            Error::Validation(_) => SqlState::GENERAL_ERROR,
            Error::UnsupportedConversion { .. } => SqlState::RESTRICTED_DATA_TYPE,
            Error::InvalidStringConversion => SqlState::INVALID_CHAR_VALUE,
            Error::Encoding => SqlState::INVALID_CHAR_VALUE,
            Error::OperationCancelled => SqlState::OPERATION_CANCELED,
            Error::Internal(_) => SqlState::GENERAL_ERROR,
        }
    }
}
