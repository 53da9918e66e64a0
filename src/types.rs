//! PostgreSQL type oids and their mapping onto the SQL and C type systems.

use crate::sqltypes::{CDataType, SqlType};

/// Object identifier of a PostgreSQL type.
pub type Oid = u32;

/// The `unknown` pseudo type of untyped literals.
pub const PG_TYPE_UNKNOWN: Oid = 705;
pub const PG_TYPE_BOOL: Oid = 16;
pub const PG_TYPE_BYTEA: Oid = 17;
pub const PG_TYPE_CHAR: Oid = 18;
pub const PG_TYPE_NAME: Oid = 19;
pub const PG_TYPE_INT8: Oid = 20;
pub const PG_TYPE_INT2: Oid = 21;
pub const PG_TYPE_INT2VECTOR: Oid = 22;
pub const PG_TYPE_INT4: Oid = 23;
pub const PG_TYPE_TEXT: Oid = 25;
pub const PG_TYPE_OID: Oid = 26;
pub const PG_TYPE_TID: Oid = 27;
pub const PG_TYPE_XML: Oid = 142;
pub const PG_TYPE_FLOAT4: Oid = 700;
pub const PG_TYPE_FLOAT8: Oid = 701;
pub const PG_TYPE_MONEY: Oid = 790;
pub const PG_TYPE_BPCHAR: Oid = 1042;
pub const PG_TYPE_VARCHAR: Oid = 1043;
pub const PG_TYPE_DATE: Oid = 1082;
pub const PG_TYPE_TIME: Oid = 1083;
pub const PG_TYPE_TIMESTAMP_NO_TMZONE: Oid = 1114;
pub const PG_TYPE_TIMESTAMP: Oid = 1184;
pub const PG_TYPE_INTERVAL: Oid = 1186;
pub const PG_TYPE_NUMERIC: Oid = 1700;
pub const PG_TYPE_REFCURSOR: Oid = 1790;
pub const PG_TYPE_UUID: Oid = 2950;
pub const PG_TYPE_VOID: Oid = 2278;
/// Conventional oid of the `lo` large object domain.
pub const PG_TYPE_LO: Oid = 987654;

/// Maximum decimal precision reported for `numeric` without a typmod.
pub const PG_NUMERIC_MAX_PRECISION: usize = 1000;
/// Significant digits produced for `float8` parameters.
pub const PG_DOUBLE_DIGITS: usize = 15;
/// Significant digits produced for `float4` parameters.
pub const PG_REAL_DIGITS: usize = 7;

/// SQL type a result column of the given PostgreSQL type is reported as.
pub fn pgtype_to_sqltype(pg_type: Oid, bools_as_char: bool, bytea_as_long_varbinary: bool) -> SqlType {
    match pg_type {
        PG_TYPE_BOOL => {
            if bools_as_char {
                SqlType::Varchar
            } else {
                SqlType::Bit
            }
        }
        PG_TYPE_BYTEA => {
            if bytea_as_long_varbinary {
                SqlType::LongVarbinary
            } else {
                SqlType::Varbinary
            }
        }
        PG_TYPE_INT8 => SqlType::BigInt,
        PG_TYPE_INT2 => SqlType::SmallInt,
        PG_TYPE_INT4 | PG_TYPE_OID => SqlType::Integer,
        PG_TYPE_TEXT | PG_TYPE_XML => SqlType::LongVarchar,
        PG_TYPE_FLOAT4 => SqlType::Real,
        PG_TYPE_FLOAT8 => SqlType::Double,
        PG_TYPE_MONEY | PG_TYPE_NUMERIC => SqlType::Numeric,
        PG_TYPE_BPCHAR => SqlType::Char,
        PG_TYPE_NAME | PG_TYPE_VARCHAR | PG_TYPE_UUID | PG_TYPE_REFCURSOR => SqlType::Varchar,
        PG_TYPE_DATE => SqlType::Date,
        PG_TYPE_TIME => SqlType::Time,
        PG_TYPE_TIMESTAMP | PG_TYPE_TIMESTAMP_NO_TMZONE => SqlType::Timestamp,
        PG_TYPE_LO => SqlType::LongVarbinary,
        _ => SqlType::Varchar,
    }
}

/// C type a column of the given PostgreSQL type converts to when the caller
/// asks for the default.
pub fn pgtype_to_default_ctype(pg_type: Oid) -> CDataType {
    match pg_type {
        PG_TYPE_BOOL => CDataType::Bit,
        PG_TYPE_BYTEA | PG_TYPE_LO => CDataType::Binary,
        PG_TYPE_INT8 => CDataType::SBigInt,
        PG_TYPE_INT2 => CDataType::SShort,
        PG_TYPE_INT4 | PG_TYPE_OID => CDataType::SLong,
        PG_TYPE_FLOAT4 => CDataType::Float,
        PG_TYPE_FLOAT8 => CDataType::Double,
        PG_TYPE_DATE => CDataType::Date,
        PG_TYPE_TIME => CDataType::Time,
        PG_TYPE_TIMESTAMP | PG_TYPE_TIMESTAMP_NO_TMZONE => CDataType::Timestamp,
        _ => CDataType::Char,
    }
}

/// C type a parameter of the given SQL type is read as when bound with
/// `CDataType::Default`.
pub fn sqltype_to_default_ctype(sql_type: SqlType) -> CDataType {
    match sql_type {
        SqlType::Integer => CDataType::SLong,
        SqlType::SmallInt | SqlType::TinyInt => CDataType::SShort,
        SqlType::BigInt => CDataType::SBigInt,
        SqlType::Real => CDataType::Float,
        SqlType::Float | SqlType::Double => CDataType::Double,
        SqlType::Bit => CDataType::Bit,
        SqlType::Date => CDataType::Date,
        SqlType::Time => CDataType::Time,
        SqlType::Timestamp => CDataType::Timestamp,
        SqlType::Binary | SqlType::Varbinary | SqlType::LongVarbinary => CDataType::Binary,
        SqlType::WChar | SqlType::WVarchar | SqlType::WLongVarchar => CDataType::WChar,
        SqlType::Guid => CDataType::Guid,
        _ => CDataType::Char,
    }
}

/// PostgreSQL type oid a parameter of the given SQL type is bound with in a
/// Bind request. `0` lets the server decide.
pub fn sqltype_to_bind_pgtype(sql_type: SqlType, bools_as_char: bool) -> Oid {
    match sql_type {
        SqlType::Integer => PG_TYPE_INT4,
        SqlType::SmallInt | SqlType::TinyInt => PG_TYPE_INT2,
        SqlType::BigInt => PG_TYPE_INT8,
        SqlType::Real => PG_TYPE_FLOAT4,
        SqlType::Float | SqlType::Double => PG_TYPE_FLOAT8,
        SqlType::Numeric | SqlType::Decimal => PG_TYPE_NUMERIC,
        SqlType::Binary | SqlType::Varbinary | SqlType::LongVarbinary => PG_TYPE_BYTEA,
        SqlType::Date => PG_TYPE_DATE,
        SqlType::Time => PG_TYPE_TIME,
        SqlType::Timestamp => PG_TYPE_TIMESTAMP_NO_TMZONE,
        SqlType::Bit => {
            if bools_as_char {
                PG_TYPE_VARCHAR
            } else {
                PG_TYPE_BOOL
            }
        }
        // Let the server infer character data and everything else, so that
        // e.g. a text parameter compared against an int4 column works.
        _ => 0,
    }
}

/// Cast name appended to a `$n` marker when parameter casting is on. Empty
/// when the type is better left to the server.
pub fn sqltype_to_pgcast(sql_type: SqlType) -> &'static str {
    match sql_type {
        SqlType::Integer => "::int4",
        SqlType::SmallInt | SqlType::TinyInt => "::smallint",
        SqlType::BigInt => "::int8",
        SqlType::Real => "::float4",
        SqlType::Float | SqlType::Double => "::float8",
        SqlType::Numeric | SqlType::Decimal => "::numeric",
        SqlType::Date => "::date",
        SqlType::Time => "::time",
        SqlType::Timestamp => "::timestamp",
        // Character data stays uncast so the server may infer the type
        // from the expression, e.g. when compared against an int column.
        _ => "",
    }
}

/// Description of one result set column as reported by the wire layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_oid: Oid,
    /// Type modifier, `-1` if none. Carries e.g. numeric precision/scale or
    /// varchar length.
    pub atttypmod: i32,
    /// Declared length of the type, `-1` for varlena types.
    pub typlen: i32,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_oid: Oid) -> Self {
        ColumnInfo {
            name: name.into(),
            type_oid,
            atttypmod: -1,
            typlen: -1,
        }
    }

    /// Numeric precision and scale encoded in the typmod, if any.
    pub fn numeric_precision_scale(&self) -> Option<(u16, i16)> {
        if self.type_oid != PG_TYPE_NUMERIC || self.atttypmod < 4 {
            return None;
        }
        let typmod = self.atttypmod - 4;
        Some(((typmod >> 16) as u16, (typmod & 0xffff) as i16))
    }

    /// Declared character length encoded in the typmod, if any.
    pub fn character_length(&self) -> Option<usize> {
        match self.type_oid {
            PG_TYPE_BPCHAR | PG_TYPE_VARCHAR if self.atttypmod >= 4 => {
                Some((self.atttypmod - 4) as usize)
            }
            _ => None,
        }
    }
}

/// Column size reported to the caller for a column of the given type,
/// honoring the configured fallbacks for unbounded types.
pub fn reported_column_size(
    info: &ColumnInfo,
    max_varchar_size: usize,
    max_longvarchar_size: usize,
) -> usize {
    match info.type_oid {
        PG_TYPE_BOOL => 1,
        PG_TYPE_INT2 => 5,
        PG_TYPE_INT4 | PG_TYPE_OID => 10,
        PG_TYPE_INT8 => 19,
        PG_TYPE_FLOAT4 => 7,
        PG_TYPE_FLOAT8 => 15,
        PG_TYPE_DATE => 10,
        PG_TYPE_TIME => 8,
        PG_TYPE_TIMESTAMP | PG_TYPE_TIMESTAMP_NO_TMZONE => 26,
        PG_TYPE_UUID => 36,
        PG_TYPE_NUMERIC => info
            .numeric_precision_scale()
            .map(|(p, _)| p as usize)
            .unwrap_or(PG_NUMERIC_MAX_PRECISION),
        PG_TYPE_BPCHAR | PG_TYPE_VARCHAR => {
            info.character_length().unwrap_or(max_varchar_size)
        }
        PG_TYPE_TEXT | PG_TYPE_XML | PG_TYPE_BYTEA => max_longvarchar_size,
        _ => max_varchar_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_typmod_decodes_precision_and_scale() {
        let mut info = ColumnInfo::new("n", PG_TYPE_NUMERIC);
        info.atttypmod = ((10 << 16) | 3) + 4;
        assert_eq!(Some((10, 3)), info.numeric_precision_scale());
    }

    #[test]
    fn varchar_typmod_decodes_length() {
        let mut info = ColumnInfo::new("v", PG_TYPE_VARCHAR);
        info.atttypmod = 20 + 4;
        assert_eq!(Some(20), info.character_length());
    }

    #[test]
    fn unbounded_text_reports_configured_maximum() {
        let info = ColumnInfo::new("t", PG_TYPE_TEXT);
        assert_eq!(8190, reported_column_size(&info, 255, 8190));
    }
}
