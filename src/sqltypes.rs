//! Types and constants of the call-level interface this driver implements.
//!
//! These mirror the C API vocabulary (SQL data types, C buffer types,
//! parameter directions, date/time/numeric structs) without binding to any
//! native library. Only symbols the driver core actually speaks are defined.

/// Length indicator value signalling a NULL value.
pub const NULL_DATA: isize = -1;
/// Length indicator value signalling that the total length of the value is
/// not known in advance.
pub const NO_TOTAL: isize = -4;
/// Length indicator value signalling a null terminated input string.
pub const NTS: isize = -3;
/// Length indicator used by positioned updates to exclude a column from the
/// generated `SET` list.
pub const IGNORE: isize = -6;
/// Offset applied to a length indicator to announce a data at execution
/// parameter together with its total length.
pub const LEN_DATA_AT_EXEC_OFFSET: isize = -100;
/// Length indicator announcing a data at execution parameter of unknown
/// length.
pub const DATA_AT_EXEC: isize = -2;

/// SQL data type of a column or parameter as declared by the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i16)]
pub enum SqlType {
    Unknown = 0,
    Char = 1,
    Numeric = 2,
    Decimal = 3,
    Integer = 4,
    SmallInt = 5,
    Float = 6,
    Real = 7,
    Double = 8,
    Date = 91,
    Time = 92,
    Timestamp = 93,
    Varchar = 12,
    LongVarchar = -1,
    Binary = -2,
    Varbinary = -3,
    LongVarbinary = -4,
    BigInt = -5,
    TinyInt = -6,
    Bit = -7,
    WChar = -8,
    WVarchar = -9,
    WLongVarchar = -10,
    Guid = -11,
    IntervalYear = 101,
    IntervalMonth = 102,
    IntervalDay = 103,
    IntervalHour = 104,
    IntervalMinute = 105,
    IntervalSecond = 106,
    IntervalYearToMonth = 107,
    IntervalDayToHour = 108,
    IntervalDayToMinute = 109,
    IntervalDayToSecond = 110,
    IntervalHourToMinute = 111,
    IntervalHourToSecond = 112,
    IntervalMinuteToSecond = 113,
}

impl SqlType {
    pub fn is_character(self) -> bool {
        matches!(
            self,
            SqlType::Char
                | SqlType::Varchar
                | SqlType::LongVarchar
                | SqlType::WChar
                | SqlType::WVarchar
                | SqlType::WLongVarchar
        )
    }

    pub fn is_binary(self) -> bool {
        matches!(
            self,
            SqlType::Binary | SqlType::Varbinary | SqlType::LongVarbinary
        )
    }

    pub fn is_interval(self) -> bool {
        (SqlType::IntervalYear as i16..=SqlType::IntervalMinuteToSecond as i16)
            .contains(&(self as i16))
    }
}

/// C buffer type requested by the application for a column or offered for a
/// parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i16)]
pub enum CDataType {
    /// Let the driver pick the C type matching the SQL type.
    Default = 99,
    Char = 1,
    WChar = -8,
    SLong = -16,
    ULong = -18,
    SShort = -15,
    UShort = -17,
    STinyInt = -26,
    UTinyInt = -28,
    SBigInt = -25,
    UBigInt = -27,
    Float = 7,
    Double = 8,
    Bit = -7,
    Binary = -2,
    Date = 91,
    Time = 92,
    Timestamp = 93,
    Numeric = 2,
    Guid = -11,
    IntervalYear = 101,
    IntervalMonth = 102,
    IntervalDay = 103,
    IntervalHour = 104,
    IntervalMinute = 105,
    IntervalSecond = 106,
    IntervalYearToMonth = 107,
    IntervalDayToHour = 108,
    IntervalDayToMinute = 109,
    IntervalDayToSecond = 110,
    IntervalHourToMinute = 111,
    IntervalHourToSecond = 112,
    IntervalMinuteToSecond = 113,
}

impl CDataType {
    pub fn is_interval(self) -> bool {
        (CDataType::IntervalYear as i16..=CDataType::IntervalMinuteToSecond as i16)
            .contains(&(self as i16))
    }
}

/// Direction of a bound parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamDirection {
    Input,
    InputOutput,
    Output,
}

/// `SQL_DATE_STRUCT`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CDate {
    pub year: i16,
    pub month: u16,
    pub day: u16,
}

/// `SQL_TIME_STRUCT`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CTime {
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

/// `SQL_TIMESTAMP_STRUCT`. `fraction` is in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CTimestamp {
    pub year: i16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub fraction: u32,
}

/// Number of bytes in the mantissa of [`CNumeric`].
pub const MAX_NUMERIC_LEN: usize = 16;

/// `SQL_NUMERIC_STRUCT`. The value is `mantissa * 10^-scale`, the mantissa
/// stored little endian. `sign` is `1` for positive, `0` for negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CNumeric {
    pub precision: u8,
    pub scale: i8,
    pub sign: u8,
    pub val: [u8; MAX_NUMERIC_LEN],
}

impl Default for CNumeric {
    fn default() -> Self {
        CNumeric {
            precision: 0,
            scale: 0,
            sign: 1,
            val: [0; MAX_NUMERIC_LEN],
        }
    }
}

/// `SQLGUID`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CGuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Interval subtype discriminator, `SQL_IS_*`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalKind {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    YearToMonth,
    DayToHour,
    DayToMinute,
    DayToSecond,
    HourToMinute,
    HourToSecond,
    MinuteToSecond,
}

impl IntervalKind {
    /// Subtype implied by an interval C data type.
    pub fn from_c_type(c_type: CDataType) -> Option<Self> {
        let kind = match c_type {
            CDataType::IntervalYear => IntervalKind::Year,
            CDataType::IntervalMonth => IntervalKind::Month,
            CDataType::IntervalDay => IntervalKind::Day,
            CDataType::IntervalHour => IntervalKind::Hour,
            CDataType::IntervalMinute => IntervalKind::Minute,
            CDataType::IntervalSecond => IntervalKind::Second,
            CDataType::IntervalYearToMonth => IntervalKind::YearToMonth,
            CDataType::IntervalDayToHour => IntervalKind::DayToHour,
            CDataType::IntervalDayToMinute => IntervalKind::DayToMinute,
            CDataType::IntervalDayToSecond => IntervalKind::DayToSecond,
            CDataType::IntervalHourToMinute => IntervalKind::HourToMinute,
            CDataType::IntervalHourToSecond => IntervalKind::HourToSecond,
            CDataType::IntervalMinuteToSecond => IntervalKind::MinuteToSecond,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_year_month(self) -> bool {
        matches!(
            self,
            IntervalKind::Year | IntervalKind::Month | IntervalKind::YearToMonth
        )
    }
}

/// `SQL_INTERVAL_STRUCT`. Fields are magnitudes, `sign_negative` carries the
/// sign for the whole value. `fraction` is in the unit implied by the
/// associated precision (see the interval conversion module).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CInterval {
    pub kind: IntervalKind,
    pub sign_negative: bool,
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub fraction: u32,
}

impl CInterval {
    pub fn new(kind: IntervalKind) -> Self {
        CInterval {
            kind,
            sign_negative: false,
            year: 0,
            month: 0,
            day: 0,
            hour: 0,
            minute: 0,
            second: 0,
            fraction: 0,
        }
    }
}

impl CDate {
    pub const SIZE: usize = 6;

    pub fn to_bytes(self) -> [u8; 6] {
        let mut out = [0; 6];
        out[0..2].copy_from_slice(&self.year.to_ne_bytes());
        out[2..4].copy_from_slice(&self.month.to_ne_bytes());
        out[4..6].copy_from_slice(&self.day.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(CDate {
            year: i16::from_ne_bytes([bytes[0], bytes[1]]),
            month: u16::from_ne_bytes([bytes[2], bytes[3]]),
            day: u16::from_ne_bytes([bytes[4], bytes[5]]),
        })
    }
}

impl CTime {
    pub const SIZE: usize = 6;

    pub fn to_bytes(self) -> [u8; 6] {
        let mut out = [0; 6];
        out[0..2].copy_from_slice(&self.hour.to_ne_bytes());
        out[2..4].copy_from_slice(&self.minute.to_ne_bytes());
        out[4..6].copy_from_slice(&self.second.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(CTime {
            hour: u16::from_ne_bytes([bytes[0], bytes[1]]),
            minute: u16::from_ne_bytes([bytes[2], bytes[3]]),
            second: u16::from_ne_bytes([bytes[4], bytes[5]]),
        })
    }
}

impl CTimestamp {
    pub const SIZE: usize = 16;

    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0; 16];
        out[0..2].copy_from_slice(&self.year.to_ne_bytes());
        out[2..4].copy_from_slice(&self.month.to_ne_bytes());
        out[4..6].copy_from_slice(&self.day.to_ne_bytes());
        out[6..8].copy_from_slice(&self.hour.to_ne_bytes());
        out[8..10].copy_from_slice(&self.minute.to_ne_bytes());
        out[10..12].copy_from_slice(&self.second.to_ne_bytes());
        out[12..16].copy_from_slice(&self.fraction.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(CTimestamp {
            year: i16::from_ne_bytes([bytes[0], bytes[1]]),
            month: u16::from_ne_bytes([bytes[2], bytes[3]]),
            day: u16::from_ne_bytes([bytes[4], bytes[5]]),
            hour: u16::from_ne_bytes([bytes[6], bytes[7]]),
            minute: u16::from_ne_bytes([bytes[8], bytes[9]]),
            second: u16::from_ne_bytes([bytes[10], bytes[11]]),
            fraction: u32::from_ne_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }
}

impl CNumeric {
    pub const SIZE: usize = 3 + MAX_NUMERIC_LEN;

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0; Self::SIZE];
        out[0] = self.precision;
        out[1] = self.scale as u8;
        out[2] = self.sign;
        out[3..].copy_from_slice(&self.val);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let mut val = [0; MAX_NUMERIC_LEN];
        val.copy_from_slice(&bytes[3..3 + MAX_NUMERIC_LEN]);
        Some(CNumeric {
            precision: bytes[0],
            scale: bytes[1] as i8,
            sign: bytes[2],
            val,
        })
    }
}

impl CGuid {
    pub const SIZE: usize = 16;

    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0; 16];
        out[0..4].copy_from_slice(&self.data1.to_ne_bytes());
        out[4..6].copy_from_slice(&self.data2.to_ne_bytes());
        out[6..8].copy_from_slice(&self.data3.to_ne_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let mut data4 = [0; 8];
        data4.copy_from_slice(&bytes[8..16]);
        Some(CGuid {
            data1: u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data2: u16::from_ne_bytes([bytes[4], bytes[5]]),
            data3: u16::from_ne_bytes([bytes[6], bytes[7]]),
            data4,
        })
    }
}

impl IntervalKind {
    fn code(self) -> u8 {
        match self {
            IntervalKind::Year => 1,
            IntervalKind::Month => 2,
            IntervalKind::Day => 3,
            IntervalKind::Hour => 4,
            IntervalKind::Minute => 5,
            IntervalKind::Second => 6,
            IntervalKind::YearToMonth => 7,
            IntervalKind::DayToHour => 8,
            IntervalKind::DayToMinute => 9,
            IntervalKind::DayToSecond => 10,
            IntervalKind::HourToMinute => 11,
            IntervalKind::HourToSecond => 12,
            IntervalKind::MinuteToSecond => 13,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => IntervalKind::Year,
            2 => IntervalKind::Month,
            3 => IntervalKind::Day,
            4 => IntervalKind::Hour,
            5 => IntervalKind::Minute,
            6 => IntervalKind::Second,
            7 => IntervalKind::YearToMonth,
            8 => IntervalKind::DayToHour,
            9 => IntervalKind::DayToMinute,
            10 => IntervalKind::DayToSecond,
            11 => IntervalKind::HourToMinute,
            12 => IntervalKind::HourToSecond,
            13 => IntervalKind::MinuteToSecond,
            _ => return None,
        })
    }
}

impl CInterval {
    pub const SIZE: usize = 30;

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0; Self::SIZE];
        out[0] = self.kind.code();
        out[1] = u8::from(self.sign_negative);
        for (slot, value) in [
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.fraction,
        ]
        .into_iter()
        .enumerate()
        {
            let at = 2 + slot * 4;
            out[at..at + 4].copy_from_slice(&value.to_ne_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let kind = IntervalKind::from_code(bytes[0])?;
        let mut fields = [0u32; 7];
        for (slot, field) in fields.iter_mut().enumerate() {
            let at = 2 + slot * 4;
            *field = u32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        }
        Some(CInterval {
            kind,
            sign_negative: bytes[1] != 0,
            year: fields[0],
            month: fields[1],
            day: fields[2],
            hour: fields[3],
            minute: fields[4],
            second: fields[5],
            fraction: fields[6],
        })
    }
}

/// Cursor scroll orientation of a `FetchScroll` request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOrientation {
    Next,
    Prior,
    First,
    Last,
    Absolute(i64),
    Relative(i64),
    Bookmark(i64),
}

/// Operation requested through `SetPos`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetPosOperation {
    Position,
    Refresh,
    Update,
    Delete,
    Add,
}

/// Per row status reported in the row status array of a block fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowStatus {
    Success,
    SuccessWithInfo,
    Updated,
    Deleted,
    Added,
    Error,
    NoRow,
}

/// How a `Free` call should treat the statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FreeStmtOption {
    /// Discard the open result but keep bindings, the statement may be
    /// executed again.
    Close,
    /// Release all column bindings.
    Unbind,
    /// Release all parameter bindings.
    ResetParams,
}
