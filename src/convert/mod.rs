//! The bidirectional type conversion engine.
//!
//! `to_c` converts server returned column values into caller C buffers,
//! the sibling modules hold the scalar codecs shared with the parameter
//! resolver.

pub mod bytea;
pub mod datetime;
pub mod interval;
pub mod lobj;
pub mod numeric;
pub mod text;
pub mod to_c;

/// Existence and length of a converted value, reported back to the caller
/// alongside the data.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Indicator {
    /// Value is NULL, nothing was written.
    Null,
    /// Value exists but its total length is not known (large object midway
    /// through streaming).
    NoTotal,
    /// Number of bytes the full converted value requires. In case of
    /// truncation this is the length before truncation.
    Length(usize),
}

impl Indicator {
    /// Value as stored in a caller's length/indicator slot.
    pub fn to_isize(self) -> isize {
        match self {
            Indicator::Null => crate::sqltypes::NULL_DATA,
            Indicator::NoTotal => crate::sqltypes::NO_TOTAL,
            Indicator::Length(len) => len as isize,
        }
    }
}

/// Outcome of one field conversion.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Copied {
    /// The whole remaining value fit into the caller's buffer.
    Ok { indicator: Indicator },
    /// Only part of the value fit; a further `GetData` call continues
    /// where this one stopped.
    Truncated { indicator: Indicator },
    /// A previous call already drained the value.
    NoData,
}

impl Copied {
    pub fn indicator(&self) -> Option<Indicator> {
        match self {
            Copied::Ok { indicator } | Copied::Truncated { indicator } => Some(*indicator),
            Copied::NoData => None,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Copied::Truncated { .. })
    }
}

/// Incremental read state of one column within the current row. Reset when
/// the row advances.
#[derive(Debug, Default)]
pub struct GetDataClass {
    /// Fully converted value, kept while the caller drains it piecewise.
    pub ttlbuf: Option<Vec<u8>>,
    /// Bytes of `ttlbuf` not yet handed out. `None` outside a `GetData`
    /// session.
    pub data_left: Option<usize>,
    /// Open large object descriptor being streamed.
    pub lo_fd: Option<i32>,
    /// Bytes of the large object not yet read.
    pub lo_left: Option<u64>,
    /// The implicit transaction wrapping the large object read must be
    /// committed when the stream closes.
    pub lo_commit_needed: bool,
}

impl GetDataClass {
    pub fn reset(&mut self) {
        self.ttlbuf = None;
        self.data_left = None;
        self.lo_fd = None;
        self.lo_left = None;
        self.lo_commit_needed = false;
    }

    pub fn in_progress(&self) -> bool {
        self.data_left.is_some() || self.lo_fd.is_some()
    }
}

/// Per statement collection of incremental read states, one per column.
#[derive(Debug, Default)]
pub struct GetDataInfo {
    pub columns: Vec<GetDataClass>,
}

impl GetDataInfo {
    pub fn ensure(&mut self, num_columns: usize) {
        if self.columns.len() < num_columns {
            self.columns.resize_with(num_columns, GetDataClass::default);
        }
    }

    pub fn reset_all(&mut self) {
        for gdc in &mut self.columns {
            gdc.reset();
        }
    }
}
