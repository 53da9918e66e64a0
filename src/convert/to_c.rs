//! Conversion of server returned column values into caller C buffers.
//!
//! Driven by the pair of PostgreSQL column type and requested C type. Text
//! targets support incremental reads: when the caller's buffer is too
//! small, the converted value is parked in the column's [`GetDataClass`]
//! and subsequent calls continue where the previous one stopped.

use atoi::{FromRadix10, FromRadix10Signed};
use log::debug;

use crate::{
    connection::Connection,
    convert::{
        Copied, GetDataClass, Indicator,
        bytea::{bin_to_hex, pgbinary_to_bin},
        datetime::{SimpleTime, stime_to_date, stime_to_time, stime_to_timestamp, timestamp_to_stime},
        interval::parse_interval,
        lobj::convert_lo,
        numeric::parse_numeric,
        text::{lf_to_crlf, normalize_money, parse_guid},
    },
    error::Error,
    options::CvtNullDate,
    sqltypes::{CDataType, CDate, CGuid, CTime, CTimestamp},
    types::{
        self, Oid, PG_TYPE_BOOL, PG_TYPE_BPCHAR, PG_TYPE_BYTEA, PG_TYPE_DATE, PG_TYPE_INT2VECTOR,
        PG_TYPE_INT4, PG_TYPE_LO, PG_TYPE_MONEY, PG_TYPE_TEXT, PG_TYPE_TIME, PG_TYPE_TIMESTAMP,
        PG_TYPE_TIMESTAMP_NO_TMZONE, PG_TYPE_UNKNOWN, PG_TYPE_UUID, PG_TYPE_VARCHAR,
        PG_TYPE_XML,
    },
    wire::WireClient,
};

/// Terminating zero appended after character data, none after binary.
pub fn terminator_len(c_type: CDataType) -> usize {
    match c_type {
        CDataType::WChar => 2,
        CDataType::Binary => 0,
        _ => 1,
    }
}

/// Clip a copy length to a whole number of characters of the target type.
fn adjust_copy_len(c_type: CDataType, len: usize) -> usize {
    match c_type {
        CDataType::WChar => (len / 2) * 2,
        _ => len,
    }
}

fn write_fixed(out: &mut [u8], bytes: &[u8]) -> Result<Copied, Error> {
    if out.len() < bytes.len() {
        return Ok(Copied::Truncated {
            indicator: Indicator::Length(bytes.len()),
        });
    }
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(Copied::Ok {
        indicator: Indicator::Length(bytes.len()),
    })
}

fn text_of(value: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(value)
}

fn int_of(value: &[u8]) -> i64 {
    i64::from_radix_10_signed(value.trim_ascii()).0
}

fn uint_of(value: &[u8]) -> u64 {
    u64::from_radix_10(value.trim_ascii()).0
}

fn float_of(value: &[u8]) -> f64 {
    let text = text_of(value);
    let trimmed = text.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "nan" => f64::NAN,
        "infinity" | "inf" => f64::INFINITY,
        "-infinity" | "-inf" => f64::NEG_INFINITY,
        _ => trimmed.parse().unwrap_or(0.0),
    }
}

/// Convert one field into the caller's buffer.
///
/// * `gdc` - incremental read state of the column, `None` for bound column
///   fetches which always restart from the beginning of the value.
/// * `precision` - fraction precision applied to interval targets.
pub fn copy_and_convert_field<W: WireClient>(
    conn: &mut Connection<W>,
    field_type: Oid,
    value: Option<&[u8]>,
    c_type: CDataType,
    precision: i32,
    out: &mut [u8],
    mut gdc: Option<&mut GetDataClass>,
) -> Result<Copied, Error> {
    // A drained column reports no more data until the row advances.
    if let Some(state) = gdc.as_deref_mut() {
        if state.data_left == Some(0) && state.lo_fd.is_none() {
            state.reset();
            return Ok(Copied::NoData);
        }
    }

    let requested = c_type;

    let Some(value) = value else {
        // FoxPro mode maps NULL date columns onto empty strings.
        if conn.options.cvt_null_date == CvtNullDate::Both
            && matches!(
                field_type,
                PG_TYPE_DATE | PG_TYPE_TIMESTAMP | PG_TYPE_TIMESTAMP_NO_TMZONE
            )
            && matches!(
                requested,
                CDataType::Char | CDataType::WChar | CDataType::Date | CDataType::Default
            )
        {
            return match requested {
                CDataType::Char => {
                    if out.is_empty() {
                        Ok(Copied::Truncated {
                            indicator: Indicator::Length(0),
                        })
                    } else {
                        out[0] = 0;
                        Ok(Copied::Ok {
                            indicator: Indicator::Length(0),
                        })
                    }
                }
                CDataType::WChar => {
                    if out.len() < 2 {
                        Ok(Copied::Truncated {
                            indicator: Indicator::Length(0),
                        })
                    } else {
                        out[0] = 0;
                        out[1] = 0;
                        Ok(Copied::Ok {
                            indicator: Indicator::Length(0),
                        })
                    }
                }
                _ => {
                    let zero = CDate::default().to_bytes();
                    write_fixed(out, &zero)
                }
            };
        }
        return Ok(Copied::Ok {
            indicator: Indicator::Null,
        });
    };

    // Large objects take their own streaming path.
    if field_type == PG_TYPE_LO {
        let lo_target = if requested == CDataType::Default {
            CDataType::Binary
        } else {
            requested
        };
        return convert_lo(conn, value, lo_target, out, gdc);
    }

    let c_type = if requested == CDataType::Default {
        types::pgtype_to_default_ctype(field_type)
    } else {
        requested
    };

    // Bring specific server types into a more useful shape first.
    let mut std_time = SimpleTime::default();
    let mut neut: Vec<u8> = value.to_vec();
    match field_type {
        PG_TYPE_DATE => {
            timestamp_to_stime(&text_of(value), &mut std_time, false, None);
        }
        PG_TYPE_TIME => {
            timestamp_to_stime(&text_of(value), &mut std_time, false, None);
        }
        PG_TYPE_TIMESTAMP | PG_TYPE_TIMESTAMP_NO_TMZONE => {
            let text = text_of(value).to_string();
            let lowered = text.trim().to_ascii_lowercase();
            if lowered.starts_with("infinity") {
                std_time = SimpleTime::positive_infinity();
            } else if lowered.starts_with("-infinity") {
                std_time = SimpleTime::negative_infinity();
            } else if lowered.starts_with("invalid") {
                // Something conspicuous rather than garbage.
                std_time = conn.local.timestamp_now();
            } else {
                let apply_zone = field_type != PG_TYPE_TIMESTAMP_NO_TMZONE;
                let local = conn.local;
                timestamp_to_stime(&text, &mut std_time, apply_zone, Some(&local));
            }
        }
        PG_TYPE_BOOL => {
            let rendered: &[u8] = match value.first() {
                Some(b'f') | Some(b'F') | Some(b'n') | Some(b'N') | Some(b'0') => b"0",
                _ => {
                    if conn.options.true_is_minus1 {
                        b"-1"
                    } else {
                        b"1"
                    }
                }
            };
            neut = rendered.to_vec();
        }
        PG_TYPE_INT2VECTOR => {
            if requested == CDataType::Default {
                // Length prefixed array of shorts, used by index metadata.
                let text = text_of(value).to_string();
                let mut shorts: Vec<i16> = Vec::new();
                for token in text.split_ascii_whitespace() {
                    match token.parse::<i16>() {
                        Ok(v) => shorts.push(v),
                        Err(_) => break,
                    }
                }
                let mut bytes = Vec::with_capacity((shorts.len() + 1) * 2);
                bytes.extend_from_slice(&(shorts.len() as i16).to_ne_bytes());
                for v in shorts {
                    bytes.extend_from_slice(&v.to_ne_bytes());
                }
                return write_fixed(out, &bytes);
            }
        }
        PG_TYPE_MONEY => {
            if let Some(normalized) = normalize_money(&text_of(value)) {
                neut = normalized.into_bytes();
            } else if !matches!(c_type, CDataType::Char | CDataType::WChar) {
                return Err(Error::UnsupportedConversion {
                    pg_type: field_type,
                });
            }
        }
        _ => {}
    }

    // Character targets (and binary reads of text sources) take the
    // incremental text path.
    let text_bin_handling = match c_type {
        CDataType::Char | CDataType::WChar => true,
        CDataType::Binary => matches!(
            field_type,
            PG_TYPE_UNKNOWN
                | PG_TYPE_BPCHAR
                | PG_TYPE_VARCHAR
                | PG_TYPE_TEXT
                | PG_TYPE_XML
                | PG_TYPE_BYTEA
        ),
        _ => false,
    };

    if text_bin_handling {
        let pre_converted: Option<Vec<u8>> = match field_type {
            PG_TYPE_DATE => Some(stime_to_date(&std_time).into_bytes()),
            PG_TYPE_TIME => Some(stime_to_time(&std_time).into_bytes()),
            PG_TYPE_TIMESTAMP | PG_TYPE_TIMESTAMP_NO_TMZONE => {
                Some(stime_to_timestamp(&std_time, 9).into_bytes())
            }
            PG_TYPE_UUID => Some(text_of(&neut).to_uppercase().into_bytes()),
            _ => None,
        };
        let neut_text = pre_converted.as_deref().unwrap_or(&neut);
        return convert_text_field(
            conn,
            field_type,
            neut_text,
            c_type,
            out,
            gdc,
        );
    }

    // Fixed width targets.
    let result = match c_type {
        CDataType::Date => {
            conn.local.fill_date(&mut std_time);
            let ds = CDate {
                year: std_time.y as i16,
                month: std_time.m as u16,
                day: std_time.d as u16,
            };
            write_fixed(out, &ds.to_bytes())?
        }
        CDataType::Time => {
            let ts = CTime {
                hour: std_time.hh as u16,
                minute: std_time.mm as u16,
                second: std_time.ss as u16,
            };
            write_fixed(out, &ts.to_bytes())?
        }
        CDataType::Timestamp => {
            conn.local.fill_date(&mut std_time);
            let ts = CTimestamp {
                year: std_time.y as i16,
                month: std_time.m as u16,
                day: std_time.d as u16,
                hour: std_time.hh as u16,
                minute: std_time.mm as u16,
                second: std_time.ss as u16,
                fraction: std_time.fr,
            };
            write_fixed(out, &ts.to_bytes())?
        }
        CDataType::Bit | CDataType::UTinyInt => {
            write_fixed(out, &[int_of(&neut) as u8])?
        }
        CDataType::STinyInt => write_fixed(out, &[(int_of(&neut) as i8) as u8])?,
        CDataType::SShort => write_fixed(out, &(int_of(&neut) as i16).to_ne_bytes())?,
        CDataType::UShort => write_fixed(out, &(uint_of(&neut) as u16).to_ne_bytes())?,
        CDataType::SLong => write_fixed(out, &(int_of(&neut) as i32).to_ne_bytes())?,
        CDataType::ULong => write_fixed(out, &(uint_of(&neut) as u32).to_ne_bytes())?,
        CDataType::SBigInt => write_fixed(out, &int_of(&neut).to_ne_bytes())?,
        CDataType::UBigInt => write_fixed(out, &uint_of(&neut).to_ne_bytes())?,
        CDataType::Float => write_fixed(out, &(float_of(&neut) as f32).to_ne_bytes())?,
        CDataType::Double => write_fixed(out, &float_of(&neut).to_ne_bytes())?,
        CDataType::Numeric => {
            let (ns, overflow) = parse_numeric(&text_of(&neut));
            let copied = write_fixed(out, &ns.to_bytes())?;
            if overflow {
                Copied::Truncated {
                    indicator: copied.indicator().unwrap_or(Indicator::Null),
                }
            } else {
                copied
            }
        }
        CDataType::Guid => {
            let guid: CGuid = parse_guid(&text_of(&neut)).ok_or(Error::UnsupportedConversion {
                pg_type: field_type,
            })?;
            write_fixed(out, &guid.to_bytes())?
        }
        CDataType::Binary => {
            // A bookmark read of an int4 column returns the native value,
            // an uuid its struct form; everything else is unsupported.
            if field_type == PG_TYPE_INT4 {
                let ival = uint_of(&neut) as u32;
                debug!("varbookmark read, value={ival}");
                write_fixed(out, &ival.to_ne_bytes())?
            } else if field_type == PG_TYPE_UUID {
                let guid = parse_guid(&text_of(&neut)).ok_or(Error::UnsupportedConversion {
                    pg_type: field_type,
                })?;
                write_fixed(out, &guid.to_bytes())?
            } else {
                return Err(Error::UnsupportedConversion {
                    pg_type: field_type,
                });
            }
        }
        c if c.is_interval() => {
            let st = parse_interval(c, precision, &text_of(&neut)).ok_or(
                Error::UnsupportedConversion {
                    pg_type: field_type,
                },
            )?;
            write_fixed(out, &st.to_bytes())?
        }
        _ => {
            return Err(Error::UnsupportedConversion {
                pg_type: field_type,
            });
        }
    };

    if let Some(state) = gdc {
        if !result.is_truncated() {
            state.data_left = Some(0);
        }
    }
    Ok(result)
}

/// Serve a text (or bytea) value into a character or binary buffer with
/// truncation and resume handling.
fn convert_text_field<W: WireClient>(
    conn: &Connection<W>,
    field_type: Oid,
    neut: &[u8],
    c_type: CDataType,
    out: &mut [u8],
    gdc: Option<&mut GetDataClass>,
) -> Result<Copied, Error> {
    let lf_conv = conn.options.lf_conversion;
    let terminator = terminator_len(c_type);

    match gdc {
        Some(state) => {
            if state.data_left.is_none() {
                let converted = convert_text_value(field_type, neut, c_type, lf_conv)?;
                state.data_left = Some(converted.len());
                state.ttlbuf = Some(converted);
            }
            let data_left = state.data_left.unwrap_or(0);
            let buffer = state.ttlbuf.take().unwrap_or_default();
            let (copied, copy_len) = serve_chunk(&buffer, data_left, terminator, c_type, out);
            if copied.is_truncated() {
                state.data_left = Some(data_left - copy_len);
                state.ttlbuf = Some(buffer);
            } else {
                state.data_left = Some(0);
            }
            Ok(copied)
        }
        None => {
            let converted = convert_text_value(field_type, neut, c_type, lf_conv)?;
            let (copied, _) = serve_chunk(&converted, converted.len(), terminator, c_type, out);
            Ok(copied)
        }
    }
}

/// Copy as much of the remaining value as fits, terminator included, and
/// report how it went.
fn serve_chunk(
    buffer: &[u8],
    data_left: usize,
    terminator: usize,
    c_type: CDataType,
    out: &mut [u8],
) -> (Copied, usize) {
    let offset = buffer.len() - data_left;
    let available = &buffer[offset..];

    let copy_len = if out.len() <= terminator {
        0
    } else if available.len() + terminator > out.len() {
        adjust_copy_len(c_type, out.len() - terminator)
    } else {
        available.len()
    };
    out[..copy_len].copy_from_slice(&available[..copy_len]);
    for i in 0..terminator {
        if copy_len + i < out.len() {
            out[copy_len + i] = 0;
        }
    }

    let truncated = available.len() + terminator > out.len();
    let indicator = Indicator::Length(available.len());
    let copied = if truncated {
        Copied::Truncated { indicator }
    } else {
        Copied::Ok { indicator }
    };
    (copied, copy_len)
}

/// Produce the fully converted byte image of a text value for the target
/// C type: bytea decoding, linefeed conversion and UTF-16 widening.
fn convert_text_value(
    field_type: Oid,
    neut: &[u8],
    c_type: CDataType,
    lf_conv: bool,
) -> Result<Vec<u8>, Error> {
    if field_type == PG_TYPE_BYTEA {
        let raw = pgbinary_to_bin(neut);
        return Ok(match c_type {
            CDataType::Binary => raw,
            CDataType::WChar => {
                let hex = bin_to_hex(&raw);
                widen_utf16(&hex)?
            }
            _ => bin_to_hex(&raw),
        });
    }
    let (converted, _) = lf_to_crlf(neut, lf_conv);
    match c_type {
        CDataType::WChar => widen_utf16(&converted),
        _ => Ok(converted),
    }
}

fn widen_utf16(bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let text = std::str::from_utf8(bytes).map_err(|_| Error::InvalidStringConversion)?;
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        options::ConnectionOptions,
        sqltypes::{CInterval, CNumeric, IntervalKind},
        types::{PG_TYPE_INT2, PG_TYPE_INT8, PG_TYPE_NUMERIC},
        wire::tests_support::NullWire,
    };

    fn conn() -> Connection<NullWire> {
        Connection::new(NullWire::default(), ConnectionOptions::default())
    }

    fn convert(
        conn: &mut Connection<NullWire>,
        field_type: Oid,
        value: &[u8],
        c_type: CDataType,
        out: &mut [u8],
    ) -> Copied {
        copy_and_convert_field(conn, field_type, Some(value), c_type, 6, out, None).unwrap()
    }

    #[test]
    fn int4_to_slong() {
        let mut conn = conn();
        let mut out = [0u8; 4];
        let copied = convert(&mut conn, PG_TYPE_INT4, b"-123", CDataType::SLong, &mut out);
        assert_eq!(Copied::Ok { indicator: Indicator::Length(4) }, copied);
        assert_eq!(-123, i32::from_ne_bytes(out));
    }

    #[test]
    fn int8_to_sbigint() {
        let mut conn = conn();
        let mut out = [0u8; 8];
        convert(&mut conn, PG_TYPE_INT8, b"4611686018427387904", CDataType::SBigInt, &mut out);
        assert_eq!(1 << 62, i64::from_ne_bytes(out));
    }

    #[test]
    fn null_reports_null_indicator() {
        let mut conn = conn();
        let mut out = [0u8; 4];
        let copied =
            copy_and_convert_field(&mut conn, PG_TYPE_INT4, None, CDataType::SLong, 6, &mut out, None)
                .unwrap();
        assert_eq!(Copied::Ok { indicator: Indicator::Null }, copied);
    }

    #[test]
    fn text_truncates_and_resumes() {
        let mut conn = conn();
        let mut gdc = GetDataClass::default();
        let mut out = [0u8; 4];
        let copied = copy_and_convert_field(
            &mut conn,
            PG_TYPE_TEXT,
            Some(b"foobar"),
            CDataType::Char,
            6,
            &mut out,
            Some(&mut gdc),
        )
        .unwrap();
        assert_eq!(Copied::Truncated { indicator: Indicator::Length(6) }, copied);
        assert_eq!(b"foo\0", &out);

        let copied = copy_and_convert_field(
            &mut conn,
            PG_TYPE_TEXT,
            Some(b"foobar"),
            CDataType::Char,
            6,
            &mut out,
            Some(&mut gdc),
        )
        .unwrap();
        assert_eq!(Copied::Ok { indicator: Indicator::Length(3) }, copied);
        assert_eq!(b"bar\0", &out);

        // The value is drained now.
        let copied = copy_and_convert_field(
            &mut conn,
            PG_TYPE_TEXT,
            Some(b"foobar"),
            CDataType::Char,
            6,
            &mut out,
            Some(&mut gdc),
        )
        .unwrap();
        assert_eq!(Copied::NoData, copied);
    }

    #[test]
    fn wchar_truncation_respects_character_boundary() {
        let mut conn = conn();
        let mut out = [0u8; 5];
        let copied = convert(&mut conn, PG_TYPE_TEXT, b"abc", CDataType::WChar, &mut out);
        // Only one UTF-16 unit fits next to the two byte terminator.
        assert!(copied.is_truncated());
        assert_eq!(Some(Indicator::Length(6)), copied.indicator());
        assert_eq!(u16::from_le_bytes([out[0], out[1]]), u16::from(b'a'));
    }

    #[test]
    fn bool_column_renders_zero_or_one() {
        let mut conn = conn();
        let mut out = [0u8; 4];
        let copied = convert(&mut conn, PG_TYPE_BOOL, b"t", CDataType::Char, &mut out);
        assert_eq!(Some(Indicator::Length(1)), copied.indicator());
        assert_eq!(b'1', out[0]);
        let copied = convert(&mut conn, PG_TYPE_BOOL, b"f", CDataType::Char, &mut out);
        assert_eq!(Some(Indicator::Length(1)), copied.indicator());
        assert_eq!(b'0', out[0]);
    }

    #[test]
    fn bool_true_is_minus_one_mode() {
        let mut conn = conn();
        conn.options.true_is_minus1 = true;
        let mut out = [0u8; 4];
        let copied = convert(&mut conn, PG_TYPE_BOOL, b"t", CDataType::Char, &mut out);
        assert_eq!(Some(Indicator::Length(2)), copied.indicator());
        assert_eq!(b"-1", &out[..2]);
    }

    #[test]
    fn bytea_to_char_is_uppercase_hex() {
        let mut conn = conn();
        let mut out = [0u8; 16];
        let copied = convert(&mut conn, PG_TYPE_BYTEA, b"\\x0aff", CDataType::Char, &mut out);
        assert_eq!(Some(Indicator::Length(4)), copied.indicator());
        assert_eq!(b"0AFF\0", &out[..5]);
    }

    #[test]
    fn bytea_escape_form_to_binary() {
        let mut conn = conn();
        let mut out = [0u8; 4];
        let copied = convert(&mut conn, PG_TYPE_BYTEA, b"a\\007", CDataType::Binary, &mut out);
        assert_eq!(Some(Indicator::Length(2)), copied.indicator());
        assert_eq!(&[b'a', 0x07], &out[..2]);
    }

    #[test]
    fn numeric_column_to_numeric_struct() {
        let mut conn = conn();
        let mut out = [0u8; CNumeric::SIZE];
        let copied = convert(&mut conn, PG_TYPE_NUMERIC, b"-25.212", CDataType::Numeric, &mut out);
        assert!(!copied.is_truncated());
        let ns = CNumeric::from_bytes(&out).unwrap();
        assert_eq!(0, ns.sign);
        assert_eq!(3, ns.scale);
        assert_eq!(5, ns.precision);
    }

    #[test]
    fn date_column_to_date_struct() {
        let mut conn = conn();
        let mut out = [0u8; CDate::SIZE];
        convert(&mut conn, PG_TYPE_DATE, b"2011-04-22", CDataType::Date, &mut out);
        let ds = CDate::from_bytes(&out).unwrap();
        assert_eq!((2011, 4, 22), (ds.year, ds.month, ds.day));
    }

    #[test]
    fn timestamp_column_to_timestamp_struct() {
        let mut conn = conn();
        let mut out = [0u8; CTimestamp::SIZE];
        convert(
            &mut conn,
            PG_TYPE_TIMESTAMP,
            b"2011-04-22 18:25:33.0123",
            CDataType::Timestamp,
            &mut out,
        );
        let ts = CTimestamp::from_bytes(&out).unwrap();
        assert_eq!((2011, 18, 33), (ts.year as i32, ts.hour as i32, ts.second as i32));
        assert_eq!(12_300_000, ts.fraction);
    }

    #[test]
    fn interval_column_to_interval_struct() {
        let mut conn = conn();
        let mut out = [0u8; CInterval::SIZE];
        convert(
            &mut conn,
            crate::types::PG_TYPE_INTERVAL,
            b"3 days 04:05:06",
            CDataType::IntervalDayToSecond,
            &mut out,
        );
        let iv = CInterval::from_bytes(&out).unwrap();
        assert_eq!(IntervalKind::DayToSecond, iv.kind);
        assert_eq!((3, 4, 5, 6), (iv.day, iv.hour, iv.minute, iv.second));
    }

    #[test]
    fn uuid_fetched_as_char_is_uppercase() {
        let mut conn = conn();
        let mut out = [0u8; 40];
        let value = b"a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";
        let copied = convert(&mut conn, PG_TYPE_UUID, value, CDataType::Char, &mut out);
        assert_eq!(Some(Indicator::Length(36)), copied.indicator());
        assert_eq!(b"A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11", &out[..36]);
    }

    #[test]
    fn int2vector_default_returns_length_prefixed_shorts() {
        let mut conn = conn();
        let mut out = [0u8; 8];
        let copied = convert(&mut conn, PG_TYPE_INT2VECTOR, b"1 2 3", CDataType::Default, &mut out);
        assert_eq!(Some(Indicator::Length(8)), copied.indicator());
        let shorts: Vec<i16> = out
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(vec![3, 1, 2, 3], shorts);
    }

    #[test]
    fn lf_conversion_expands_linefeeds() {
        let mut conn = conn();
        conn.options.lf_conversion = true;
        let mut out = [0u8; 8];
        let copied = convert(&mut conn, PG_TYPE_TEXT, b"a\nb", CDataType::Char, &mut out);
        assert_eq!(Some(Indicator::Length(4)), copied.indicator());
        assert_eq!(b"a\r\nb\0", &out[..5]);
    }

    #[test]
    fn smallint_column_to_sshort() {
        let mut conn = conn();
        let mut out = [0u8; 2];
        convert(&mut conn, PG_TYPE_INT2, b"-7", CDataType::SShort, &mut out);
        assert_eq!(-7, i16::from_ne_bytes(out));
    }

    #[test]
    fn unsupported_conversion_is_reported() {
        let mut conn = conn();
        let mut out = [0u8; 4];
        let result = copy_and_convert_field(
            &mut conn,
            PG_TYPE_INT4,
            Some(b"1"),
            CDataType::Guid,
            6,
            &mut out,
            None,
        );
        assert!(matches!(result, Err(Error::UnsupportedConversion { .. })));
    }
}
