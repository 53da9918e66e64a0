//! Large object streaming.
//!
//! A column of the large object domain holds the oid of the object; the
//! value itself is read through the `lo_*` RPCs. Reads are incremental so
//! values larger than the caller's buffer arrive chunk by chunk. In
//! autocommit mode the whole exchange is bracketed by an implicit
//! transaction since descriptors only live inside one.

use atoi::FromRadix10;
use log::debug;

use crate::{
    connection::Connection,
    convert::{Copied, GetDataClass, Indicator, bytea::bin_to_hex, to_c::terminator_len},
    error::Error,
    sqltypes::CDataType,
    wire::{LoMode, LoWhence, WireClient},
};

/// Read the large object referenced by `value` (its oid in text form) into
/// the caller's buffer, resuming from the state left by a previous call.
pub fn convert_lo<W: WireClient>(
    conn: &mut Connection<W>,
    value: &[u8],
    c_type: CDataType,
    out: &mut [u8],
    gdc: Option<&mut GetDataClass>,
) -> Result<Copied, Error> {
    if !matches!(
        c_type,
        CDataType::Binary | CDataType::Char | CDataType::WChar
    ) {
        return Err(Error::UnsupportedConversion {
            pg_type: crate::types::PG_TYPE_LO,
        });
    }

    let mut local_state = GetDataClass::default();
    let state = match gdc {
        Some(state) => state,
        None => &mut local_state,
    };

    if state.lo_fd.is_none() {
        let (oid, _) = u32::from_radix_10(value);
        if oid == 0 {
            return Ok(Copied::Ok {
                indicator: Indicator::Null,
            });
        }
        if conn.is_autocommit() && !conn.is_in_transaction() {
            conn.begin()?;
            state.lo_commit_needed = true;
        }
        let fd = conn.wire().lo_open(oid, LoMode::Read)?;
        let total = conn.wire().lo_lseek64(fd, 0, LoWhence::End)?;
        conn.wire().lo_lseek64(fd, 0, LoWhence::Set)?;
        debug!("opened large object {oid}, {total} bytes");
        state.lo_fd = Some(fd);
        state.lo_left = Some(total.max(0) as u64);
    }

    let fd = state.lo_fd.expect("descriptor opened above");
    let left = state.lo_left.unwrap_or(0);
    let terminator = terminator_len(c_type);

    // A character target renders each byte as two hex digits.
    let per_byte = match c_type {
        CDataType::Char => 2,
        CDataType::WChar => 4,
        _ => 1,
    };
    let space = out.len().saturating_sub(terminator) / per_byte;
    let to_read = (left as usize).min(space);

    let chunk = if to_read > 0 {
        conn.wire().lo_read(fd, to_read)?
    } else {
        Vec::new()
    };
    let left_after = left - chunk.len() as u64;
    state.lo_left = Some(left_after);

    let rendered = match c_type {
        CDataType::Binary => chunk,
        CDataType::Char => bin_to_hex(&chunk),
        CDataType::WChar => bin_to_hex(&chunk)
            .into_iter()
            .flat_map(|b| (b as u16).to_le_bytes())
            .collect(),
        _ => unreachable!(),
    };
    out[..rendered.len()].copy_from_slice(&rendered);
    for i in 0..terminator {
        if rendered.len() + i < out.len() {
            out[rendered.len() + i] = 0;
        }
    }

    if left_after == 0 {
        // Last chunk: close the descriptor and the implicit transaction.
        conn.wire().lo_close(fd)?;
        state.lo_fd = None;
        if state.lo_commit_needed {
            conn.commit()?;
            state.lo_commit_needed = false;
        }
        state.data_left = Some(0);
        Ok(Copied::Ok {
            indicator: Indicator::Length(rendered.len()),
        })
    } else {
        Ok(Copied::Truncated {
            indicator: Indicator::Length((left as usize) * per_byte),
        })
    }
}

/// Stream staged `PutData` bytes into a fresh large object; returns its
/// oid to be sent as the actual parameter value.
pub struct LoWriter {
    pub oid: u32,
    fd: i32,
    commit_needed: bool,
}

impl LoWriter {
    pub fn create<W: WireClient>(conn: &mut Connection<W>) -> Result<Self, Error> {
        let mut commit_needed = false;
        if conn.is_autocommit() && !conn.is_in_transaction() {
            conn.begin()?;
            commit_needed = true;
        }
        let oid = conn.wire().lo_creat()?;
        let fd = conn.wire().lo_open(oid, LoMode::Write)?;
        Ok(LoWriter {
            oid,
            fd,
            commit_needed,
        })
    }

    pub fn write<W: WireClient>(
        &mut self,
        conn: &mut Connection<W>,
        data: &[u8],
    ) -> Result<(), Error> {
        let mut written = 0;
        while written < data.len() {
            written += conn.wire().lo_write(self.fd, &data[written..])?;
        }
        Ok(())
    }

    pub fn close<W: WireClient>(self, conn: &mut Connection<W>) -> Result<(), Error> {
        conn.wire().lo_close(self.fd)?;
        if self.commit_needed {
            conn.commit()?;
        }
        Ok(())
    }
}
