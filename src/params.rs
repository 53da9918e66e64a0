//! Application side parameter descriptors.
//!
//! The caller binds parameters as typed C values. Array binding is modeled
//! as one value per row of the parameter set; the driver never stores raw
//! pointers into caller memory across call boundaries.

use widestring::U16String;

use crate::{
    sqltypes::{
        CDataType, CDate, CGuid, CInterval, CNumeric, CTime, CTimestamp, ParamDirection,
    },
    sqltypes::SqlType,
    types::Oid,
};

/// One C value handed over by the application.
#[derive(Clone, Debug, PartialEq)]
pub enum CValue {
    Null,
    /// Narrow text in the client encoding.
    Char(Vec<u8>),
    /// UTF-16 text.
    WChar(U16String),
    Binary(Vec<u8>),
    Bit(u8),
    TinyInt(i8),
    UTinyInt(u8),
    SmallInt(i16),
    USmallInt(u16),
    Long(i32),
    ULong(u32),
    BigInt(i64),
    UBigInt(u64),
    Float(f32),
    Double(f64),
    Date(CDate),
    Time(CTime),
    Timestamp(CTimestamp),
    Numeric(CNumeric),
    Guid(CGuid),
    Interval(CInterval),
    /// Value will be streamed through `PutData` at execution time.
    DataAtExec,
}

impl CValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CValue::Null)
    }

    pub fn is_data_at_exec(&self) -> bool {
        matches!(self, CValue::DataAtExec)
    }

    /// C type matching this value, used to pick the conversion.
    pub fn c_type(&self) -> CDataType {
        match self {
            CValue::Null | CValue::Char(_) | CValue::DataAtExec => CDataType::Char,
            CValue::WChar(_) => CDataType::WChar,
            CValue::Binary(_) => CDataType::Binary,
            CValue::Bit(_) => CDataType::Bit,
            CValue::TinyInt(_) => CDataType::STinyInt,
            CValue::UTinyInt(_) => CDataType::UTinyInt,
            CValue::SmallInt(_) => CDataType::SShort,
            CValue::USmallInt(_) => CDataType::UShort,
            CValue::Long(_) => CDataType::SLong,
            CValue::ULong(_) => CDataType::ULong,
            CValue::BigInt(_) => CDataType::SBigInt,
            CValue::UBigInt(_) => CDataType::UBigInt,
            CValue::Float(_) => CDataType::Float,
            CValue::Double(_) => CDataType::Double,
            CValue::Date(_) => CDataType::Date,
            CValue::Time(_) => CDataType::Time,
            CValue::Timestamp(_) => CDataType::Timestamp,
            CValue::Numeric(_) => CDataType::Numeric,
            CValue::Guid(_) => CDataType::Guid,
            CValue::Interval(iv) => match iv.kind {
                crate::sqltypes::IntervalKind::Year => CDataType::IntervalYear,
                crate::sqltypes::IntervalKind::Month => CDataType::IntervalMonth,
                crate::sqltypes::IntervalKind::Day => CDataType::IntervalDay,
                crate::sqltypes::IntervalKind::Hour => CDataType::IntervalHour,
                crate::sqltypes::IntervalKind::Minute => CDataType::IntervalMinute,
                crate::sqltypes::IntervalKind::Second => CDataType::IntervalSecond,
                crate::sqltypes::IntervalKind::YearToMonth => CDataType::IntervalYearToMonth,
                crate::sqltypes::IntervalKind::DayToHour => CDataType::IntervalDayToHour,
                crate::sqltypes::IntervalKind::DayToMinute => CDataType::IntervalDayToMinute,
                crate::sqltypes::IntervalKind::DayToSecond => CDataType::IntervalDayToSecond,
                crate::sqltypes::IntervalKind::HourToMinute => CDataType::IntervalHourToMinute,
                crate::sqltypes::IntervalKind::HourToSecond => CDataType::IntervalHourToSecond,
                crate::sqltypes::IntervalKind::MinuteToSecond => CDataType::IntervalMinuteToSecond,
            },
        }
    }
}

/// Application parameter binding, the APD side of a parameter.
#[derive(Clone, Debug)]
pub struct ParamBinding {
    /// One value per row of the parameter set.
    pub values: Vec<CValue>,
    /// Fraction precision used when rendering seconds fractions.
    pub precision: i32,
}

impl ParamBinding {
    pub fn single(value: CValue) -> Self {
        ParamBinding {
            values: vec![value],
            precision: 6,
        }
    }

    pub fn array(values: Vec<CValue>) -> Self {
        ParamBinding {
            values,
            precision: 6,
        }
    }

    pub fn value_at(&self, row: usize) -> &CValue {
        self.values.get(row).unwrap_or(&CValue::Null)
    }
}

/// Implementation parameter descriptor, the IPD side of a parameter.
#[derive(Clone, Debug)]
pub struct ParamInfo {
    pub direction: ParamDirection,
    pub sql_type: SqlType,
    pub column_size: usize,
    pub decimal_digits: i16,
    /// Forced PostgreSQL type oid, `0` when the SQL type decides.
    pub pg_type: Oid,
    pub data_at_exec: bool,
}

impl ParamInfo {
    pub fn input(sql_type: SqlType) -> Self {
        ParamInfo {
            direction: ParamDirection::Input,
            sql_type,
            column_size: 0,
            decimal_digits: 0,
            pg_type: 0,
            data_at_exec: false,
        }
    }

    pub fn output(sql_type: SqlType) -> Self {
        ParamInfo {
            direction: ParamDirection::Output,
            ..ParamInfo::input(sql_type)
        }
    }
}

/// Bytes staged by `PutData` calls for one data at execution parameter.
#[derive(Clone, Debug, Default)]
pub struct PutDataSlot {
    /// Staged value bytes. `None` until the first `PutData`, which makes
    /// an absent value distinguishable from an empty one.
    pub buffer: Option<Vec<u8>>,
    /// C type of the staged stream.
    pub c_type: Option<CDataType>,
    /// Large object receiving the stream instead of `buffer`.
    pub lobj_oid: Option<Oid>,
    pub lobj_fd: Option<i32>,
}

impl PutDataSlot {
    pub fn append(&mut self, bytes: &[u8]) {
        self.buffer.get_or_insert_with(Vec::new).extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.buffer = None;
        self.c_type = None;
        self.lobj_oid = None;
        self.lobj_fd = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_past_parameter_set_reads_as_null() {
        let binding = ParamBinding::single(CValue::Long(42));
        assert_eq!(&CValue::Long(42), binding.value_at(0));
        assert!(binding.value_at(5).is_null());
    }

    #[test]
    fn put_data_appends_across_calls() {
        let mut slot = PutDataSlot::default();
        slot.append(b"foo");
        slot.append(b"bar");
        assert_eq!(Some(b"foobar".to_vec()), slot.buffer);
    }
}
