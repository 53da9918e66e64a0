//! Resolution of one `?` parameter marker into its output form.
//!
//! Depending on the build mode a marker becomes a quoted literal, a `NULL`
//! placeholder, a `$n` marker or a raw Bind value. The caller's C value is
//! first brought into a neutral form (text or a date/time struct), then
//! embellished according to the declared SQL type.

use log::debug;

use crate::{
    connection::Connection,
    convert::{
        bytea::{bin_to_pgbinary, hex_to_bin},
        datetime::{SimpleTime, parse_datetime, stime_to_date, stime_to_time, stime_to_timestamp},
        interval::interval_to_string,
        numeric::numeric_to_string,
        text::guid_to_string,
    },
    error::Error,
    options::CvtNullDate,
    params::CValue,
    rewrite::{
        FLGB_BINARY_AS_POSSIBLE, FLGB_CONVERT_LF, FLGB_DISCARD_OUTPUT, FLGB_HEX_BIN_FORMAT,
        FLGB_INACCURATE_RESULT, FLGB_LITERAL_EXTENSION, FLGB_PARAM_CAST, QueryBuild, ResolveMode,
        RewriteCtx,
    },
    scanner::{LITERAL_QUOTE, QueryParse},
    sqltypes::{CDataType, ParamDirection, SqlType},
    types::{
        self, PG_TYPE_BOOL, PG_TYPE_BYTEA, PG_TYPE_DATE, PG_TYPE_LO, PG_TYPE_TIMESTAMP,
        PG_TYPE_TIMESTAMP_NO_TMZONE, PG_TYPE_VOID, sqltype_to_bind_pgtype,
    },
    wire::{BindParam, WireClient},
};

/// Neutral representation of a parameter value before the SQL type
/// dependent embellishment.
enum Neutral {
    Text(Vec<u8>),
    Time(SimpleTime),
}

/// `?` followed by `::` or `as`, i.e. the marker already carries a cast.
fn parameter_is_with_cast(qp: Option<&QueryParse<'_>>) -> bool {
    let Some(qp) = qp else { return false };
    if qp.current() != b'?' {
        return false;
    }
    let mut rest = &qp.rest()[1..];
    while let Some((first, tail)) = rest.split_first() {
        if !first.is_ascii_whitespace() {
            break;
        }
        rest = tail;
    }
    if rest.starts_with(b"::") {
        return true;
    }
    if rest.len() >= 3 && rest[..2].eq_ignore_ascii_case(b"as") && rest[2].is_ascii_whitespace() {
        return true;
    }
    false
}

fn valid_int_literal(text: &[u8]) -> Option<bool> {
    let (negative, digits) = match text.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, text),
    };
    if digits.is_empty() || !digits.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(negative)
}

fn format_float(value: f64, digits: usize) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value < 0.0 {
            "-Infinity".to_string()
        } else {
            "Infinity".to_string()
        }
    } else {
        // Shortest representation which still round trips; clipped to the
        // significant digits of the wire type.
        let formatted = format!("{value}");
        if formatted
            .bytes()
            .filter(|b| b.is_ascii_digit())
            .count()
            <= digits
        {
            formatted
        } else {
            let g = format!("{:.prec$e}", value, prec = digits - 1);
            normalize_exponent(&g)
        }
    }
}

/// `1.25e3` style output into the `1250` / `1.25e+07` forms the server
/// accepts either way; Rust's exponent form is already accepted, only a
/// trailing `e0` is dropped.
fn normalize_exponent(text: &str) -> String {
    match text.strip_suffix("e0") {
        Some(mantissa) => mantissa.to_string(),
        None => text.to_string(),
    }
}

/// Double quote characters and the literal escape character, squeezing
/// CR/LF pairs when linefeed conversion is on.
fn append_special_chars(qb: &mut QueryBuild, bytes: &[u8], escape_in_literal: Option<u8>) {
    let convlf = qb.flags & FLGB_CONVERT_LF != 0;
    let double_special = qb.mode != ResolveMode::BuildingBindRequest;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if convlf && b == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            i += 1;
            continue;
        }
        if double_special && (b == LITERAL_QUOTE || Some(b) == escape_in_literal) {
            qb.push(b);
        }
        qb.push(b);
        i += 1;
    }
}

fn push_null<W: WireClient>(qb: &mut QueryBuild, pg_type: u32, req_bind: bool, _ctx: &RewriteCtx<'_, W>) {
    if req_bind {
        qb.bind_params.push(BindParam {
            pg_type,
            value: None,
            binary: false,
        });
    } else {
        qb.push_str("NULL");
    }
}

/// Resolve the parameter marker the scanner sits on (or, with `qp` absent,
/// the next parameter of a Bind request build).
pub fn resolve_one_param<W: WireClient>(
    qb: &mut QueryBuild,
    qp: Option<&mut QueryParse<'_>>,
    ctx: &mut RewriteCtx<'_, W>,
) -> Result<(), Error> {
    let mut qp = qp;
    let outputs_value = matches!(
        qb.mode,
        ResolveMode::ReplaceParams | ResolveMode::BuildingBindRequest
    );
    let req_bind = qb.mode == ResolveMode::BuildingBindRequest;

    qb.param_number += 1;
    let param_number = qb.param_number as usize;

    let apara = ctx.apd.get(param_number);
    let ipara = ctx.ipd.get(param_number);

    if (apara.is_none() || ipara.is_none()) && outputs_value {
        return Err(Error::Validation(
            "The number of bound parameters is smaller than the number of parameter markers."
                .to_string(),
        ));
    }

    // The marker reserved by `{? = call}` never receives a value, the
    // return arrives as a result column.
    if param_number < qb.proc_return as usize {
        if let Some(ipara) = ipara {
            if ipara.direction != ParamDirection::Output {
                return Err(Error::Validation(
                    "The procedure return value must be bound as an output parameter.".to_string(),
                ));
            }
        }
        return Ok(());
    }

    if let Some(ipara) = ipara {
        if ipara.direction == ParamDirection::Output {
            if qb.flags & FLGB_DISCARD_OUTPUT != 0 {
                discard_output_marker(qb, qp.as_deref_mut());
                return Ok(());
            }
            if req_bind {
                qb.bind_params.push(BindParam {
                    pg_type: PG_TYPE_VOID,
                    value: None,
                    binary: false,
                });
                return Ok(());
            }
        }
    }

    if (apara.is_none() || ipara.is_none()) && qb.mode == ResolveMode::FakeParams {
        qb.push_str("NULL");
        qb.flags |= FLGB_INACCURATE_RESULT;
        return Ok(());
    }

    if qb.mode == ResolveMode::BuildingPrepare {
        qb.dollar_number += 1;
        let mut marker = format!("${}", qb.dollar_number);
        if let Some(ipara) = ipara {
            if ipara.direction != ParamDirection::Output
                && qb.flags & FLGB_PARAM_CAST != 0
                && !parameter_is_with_cast(qp.as_deref())
            {
                marker.push_str(types::sqltype_to_pgcast(ipara.sql_type));
            }
        }
        qb.push_str(&marker);
        return Ok(());
    }

    // Beyond this point both descriptors exist.
    let apara = apara.expect("application descriptor present");
    let ipara = ipara.expect("implementation descriptor present");
    let param_sqltype = ipara.sql_type;
    let param_pgtype = if ipara.pg_type != 0 {
        ipara.pg_type
    } else {
        sqltype_to_bind_pgtype(param_sqltype, ctx.conn.options.bools_as_char)
    };
    let bind_pgtype = param_pgtype;
    let precision = apara.precision;

    // Data at execution values read from the staged `PutData` buffer.
    let value_row = apara.value_at(qb.current_row).clone();
    let mut staged_lo_oid = None;
    let value = if value_row.is_data_at_exec() {
        let slot = ctx.pdata.get(param_number);
        match slot {
            Some(slot) if slot.lobj_oid.is_some() => {
                staged_lo_oid = slot.lobj_oid;
                CValue::Binary(Vec::new())
            }
            Some(slot) if slot.buffer.is_some() => match slot.c_type {
                Some(CDataType::WChar) => {
                    let bytes = slot.buffer.clone().unwrap_or_default();
                    let units: Vec<u16> = bytes
                        .chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]))
                        .collect();
                    CValue::WChar(widestring::U16String::from_vec(units))
                }
                Some(CDataType::Binary) => CValue::Binary(slot.buffer.clone().unwrap_or_default()),
                _ => CValue::Char(slot.buffer.clone().unwrap_or_default()),
            },
            _ => {
                if qb.mode == ResolveMode::FakeParams {
                    qb.push_str("NULL");
                    qb.flags |= FLGB_INACCURATE_RESULT;
                    return Ok(());
                }
                return Err(Error::Validation(
                    "No data supplied for a data at execution parameter.".to_string(),
                ));
            }
        }
    } else {
        value_row
    };

    if value.is_null() || ipara.direction == ParamDirection::Output {
        push_null(qb, bind_pgtype, req_bind, ctx);
        return Ok(());
    }

    // Convert the C value into a neutral format.
    let neutral = match &value {
        CValue::Char(bytes) => Neutral::Text(bytes.clone()),
        CValue::WChar(text) => {
            let folded = text.to_string().map_err(|_| {
                if ctx.conn.options.empty_on_conversion_error {
                    Error::Validation(String::new())
                } else {
                    Error::InvalidStringConversion
                }
            });
            match folded {
                Ok(text) => Neutral::Text(text.into_bytes()),
                Err(Error::Validation(_)) => Neutral::Text(Vec::new()),
                Err(err) => return Err(err),
            }
        }
        CValue::Binary(bytes) => Neutral::Text(bytes.clone()),
        CValue::Bit(v) => Neutral::Text(if *v != 0 { b"1".to_vec() } else { b"0".to_vec() }),
        CValue::TinyInt(v) => Neutral::Text(v.to_string().into_bytes()),
        CValue::UTinyInt(v) => Neutral::Text(v.to_string().into_bytes()),
        CValue::SmallInt(v) => Neutral::Text(v.to_string().into_bytes()),
        CValue::USmallInt(v) => Neutral::Text(v.to_string().into_bytes()),
        CValue::Long(v) => Neutral::Text(v.to_string().into_bytes()),
        CValue::ULong(v) => Neutral::Text(v.to_string().into_bytes()),
        CValue::BigInt(v) => Neutral::Text(v.to_string().into_bytes()),
        CValue::UBigInt(v) => Neutral::Text(v.to_string().into_bytes()),
        CValue::Float(v) => Neutral::Text(
            format_float(*v as f64, types::PG_REAL_DIGITS).into_bytes(),
        ),
        CValue::Double(v) => Neutral::Text(
            format_float(*v, types::PG_DOUBLE_DIGITS).into_bytes(),
        ),
        CValue::Numeric(ns) => Neutral::Text(numeric_to_string(ns).into_bytes()),
        CValue::Guid(g) => Neutral::Text(guid_to_string(g).into_bytes()),
        CValue::Interval(iv) => {
            Neutral::Text(interval_to_string(iv, precision).into_bytes())
        }
        CValue::Date(d) => Neutral::Time(SimpleTime {
            y: d.year as i32,
            m: d.month as u32,
            d: d.day as u32,
            ..SimpleTime::default()
        }),
        CValue::Time(t) => {
            let mut st = SimpleTime {
                hh: t.hour as u32,
                mm: t.minute as u32,
                ss: t.second as u32,
                ..SimpleTime::default()
            };
            // A time may be converted into a timestamp target, fill the
            // date part from the captured context.
            ctx.conn.local.fill_date(&mut st);
            Neutral::Time(st)
        }
        CValue::Timestamp(ts) => Neutral::Time(SimpleTime {
            y: ts.year as i32,
            m: ts.month as u32,
            d: ts.day as u32,
            hh: ts.hour as u32,
            mm: ts.minute as u32,
            ss: ts.second as u32,
            fr: ts.fraction,
            ..SimpleTime::default()
        }),
        CValue::Null | CValue::DataAtExec => unreachable!("handled above"),
    };

    // FoxPro compatibility: empty date strings become NULL.
    if ctx.conn.options.cvt_null_date != CvtNullDate::Off
        && matches!(
            param_pgtype,
            PG_TYPE_DATE | PG_TYPE_TIMESTAMP | PG_TYPE_TIMESTAMP_NO_TMZONE
        )
        && matches!(value, CValue::Char(_) | CValue::WChar(_))
    {
        if let Neutral::Text(text) = &neutral {
            if text.is_empty() {
                push_null(qb, bind_pgtype, req_bind, ctx);
                return Ok(());
            }
        }
    }

    // Embellish per the declared SQL type.
    let mut send_buf: Vec<u8>;
    let mut need_quotes = true;
    let mut add_parens = false;
    let mut lastadd: Option<&str> = None;
    let mut final_binary_convert = false;
    let mut is_binary = false;

    match param_sqltype {
        SqlType::Char
        | SqlType::Varchar
        | SqlType::LongVarchar
        | SqlType::WChar
        | SqlType::WVarchar
        | SqlType::WLongVarchar
        | SqlType::Bit => {
            send_buf = match neutral {
                Neutral::Text(mut text) => {
                    if param_pgtype == PG_TYPE_BOOL
                        && text.first() == Some(&b'-')
                        && text.get(1) == Some(&b'1')
                    {
                        text = b"1".to_vec();
                    }
                    text
                }
                Neutral::Time(st) => {
                    stime_to_timestamp(&st, 0).into_bytes()
                }
            };
        }
        SqlType::Date => {
            let mut st = match neutral {
                Neutral::Time(st) => st,
                Neutral::Text(text) => {
                    let mut st = SimpleTime::default();
                    parse_datetime(&String::from_utf8_lossy(&text), &mut st);
                    st
                }
            };
            st.hh = 0;
            st.mm = 0;
            st.ss = 0;
            send_buf = stime_to_date(&st).into_bytes();
            lastadd = Some("::date");
        }
        SqlType::Time => {
            let st = match neutral {
                Neutral::Time(st) => st,
                Neutral::Text(text) => {
                    let mut st = SimpleTime::default();
                    parse_datetime(&String::from_utf8_lossy(&text), &mut st);
                    st
                }
            };
            send_buf = stime_to_time(&st).into_bytes();
            lastadd = Some("::time");
        }
        SqlType::Timestamp => {
            let st = match neutral {
                Neutral::Time(st) => st,
                Neutral::Text(text) => {
                    let mut st = SimpleTime::default();
                    parse_datetime(&String::from_utf8_lossy(&text), &mut st);
                    st
                }
            };
            send_buf = stime_to_timestamp(&st, 6).into_bytes();
            lastadd = Some("::timestamp");
        }
        SqlType::Binary | SqlType::Varbinary | SqlType::LongVarbinary => {
            let raw = match (&value, neutral) {
                (CValue::Binary(_), Neutral::Text(bytes)) => bytes,
                (CValue::Char(_) | CValue::WChar(_), Neutral::Text(bytes)) => hex_to_bin(&bytes),
                _ => {
                    return Err(Error::Validation(
                        "Cannot convert this C type to a binary SQL type.".to_string(),
                    ));
                }
            };
            if param_pgtype == PG_TYPE_BYTEA {
                if qb.flags & FLGB_BINARY_AS_POSSIBLE != 0 {
                    debug!("sending binary parameter of {} bytes", raw.len());
                    is_binary = true;
                    send_buf = raw;
                } else {
                    final_binary_convert = true;
                    send_buf = raw;
                }
            } else if param_pgtype == PG_TYPE_LO {
                let oid = match staged_lo_oid {
                    Some(oid) => oid,
                    None => write_inline_large_object(ctx.conn, &raw)?,
                };
                send_buf = oid.to_string().into_bytes();
                lastadd = Some("::lo");
            } else {
                return Err(Error::Validation(
                    "Cannot convert binary data to a type other than bytea or a large object."
                        .to_string(),
                ));
            }
        }
        SqlType::Real => {
            send_buf = neutral_text(neutral);
            lastadd = Some("::float4");
        }
        SqlType::Float | SqlType::Double => {
            send_buf = neutral_text(neutral);
            lastadd = Some("::float8");
        }
        SqlType::Integer => {
            send_buf = neutral_text(neutral);
            match valid_int_literal(&send_buf) {
                Some(negative) => {
                    need_quotes = false;
                    add_parens = negative;
                }
                None => lastadd = Some("::int4"),
            }
        }
        SqlType::SmallInt | SqlType::TinyInt => {
            send_buf = neutral_text(neutral);
            match valid_int_literal(&send_buf) {
                Some(negative) => {
                    need_quotes = false;
                    add_parens = negative;
                }
                None => lastadd = Some("::smallint"),
            }
        }
        _ => {
            send_buf = neutral_text(neutral);
        }
    }

    if req_bind {
        if is_binary {
            qb.bind_params.push(BindParam {
                pg_type: bind_pgtype,
                value: Some(send_buf),
                binary: true,
            });
        } else {
            qb.bind_params.push(BindParam {
                pg_type: bind_pgtype,
                value: Some(send_buf),
                binary: false,
            });
        }
        return Ok(());
    }

    if add_parens {
        qb.push(b'(');
    }
    if need_quotes {
        if qb.flags & FLGB_LITERAL_EXTENSION != 0 {
            qb.push(crate::scanner::LITERAL_EXT);
        }
        qb.push(LITERAL_QUOTE);
        if final_binary_convert {
            let hex = qb.flags & FLGB_HEX_BIN_FORMAT != 0;
            let encoded = bin_to_pgbinary(&send_buf, hex);
            qb.push_bytes(&encoded);
        } else {
            let escape = ctx.conn.options.escape_in_literal;
            append_special_chars(qb, &send_buf, escape);
        }
        qb.push(LITERAL_QUOTE);
    } else {
        qb.push_bytes(&send_buf);
    }
    if add_parens {
        qb.push(b')');
    }
    if let Some(cast) = lastadd {
        if qb.flags & FLGB_PARAM_CAST != 0 {
            qb.push_str(cast);
        }
    }
    Ok(())
}

fn neutral_text(neutral: Neutral) -> Vec<u8> {
    match neutral {
        Neutral::Text(text) => text,
        Neutral::Time(st) => stime_to_timestamp(&st, 0).into_bytes(),
    }
}

/// Trim a discarded output marker together with its separating comma, so
/// the emitted call stays syntactically valid.
fn discard_output_marker(qb: &mut QueryBuild, qp: Option<&mut QueryParse<'_>>) {
    let mut npos = qb.npos();
    while npos > 0 && qb.out[npos - 1].is_ascii_whitespace() {
        npos -= 1;
    }
    if npos == 0 {
        return;
    }
    match qb.out[npos - 1] {
        b',' => {
            qb.out.truncate(npos - 1);
        }
        b'(' => {
            // The marker opens the list, consume the comma which follows.
            if let Some(qp) = qp {
                let mut pos = qp.opos + 1;
                while pos < qp.len() && qp.statement[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                if pos < qp.len() && qp.statement[pos] == b',' {
                    qp.opos = pos;
                }
            }
        }
        _ => {}
    }
}

/// Write a whole binary value into a fresh large object, bracketed by an
/// implicit transaction when the connection is in autocommit.
fn write_inline_large_object<W: WireClient>(
    conn: &mut Connection<W>,
    data: &[u8],
) -> Result<u32, Error> {
    let was_in_transaction = conn.is_in_transaction();
    if !was_in_transaction {
        conn.begin()?;
    }
    let oid = conn.wire().lo_creat()?;
    let fd = conn.wire().lo_open(oid, crate::wire::LoMode::Write)?;
    let mut written = 0;
    while written < data.len() {
        written += conn.wire().lo_write(fd, &data[written..])?;
    }
    conn.wire().lo_close(fd)?;
    if !was_in_transaction {
        conn.commit()?;
    }
    Ok(oid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        options::ConnectionOptions,
        params::{ParamBinding, ParamInfo},
        sqltypes::{CDate, CGuid, CInterval, CTimestamp, IntervalKind},
        wire::tests_support::NullWire,
    };

    fn resolve(value: CValue, sql_type: SqlType) -> String {
        resolve_with_options(value, sql_type, ConnectionOptions::default())
    }

    fn resolve_with_options(
        value: CValue,
        sql_type: SqlType,
        options: ConnectionOptions,
    ) -> String {
        let mut conn = Connection::new(NullWire::default(), options);
        let apd = [ParamBinding::single(value)];
        let ipd = [ParamInfo::input(sql_type)];
        let mut proc_return = false;
        let mut ctx = RewriteCtx {
            conn: &mut conn,
            apd: &apd,
            ipd: &ipd,
            pdata: &[],
            proc_return: &mut proc_return,
            discard_output: false,
        };
        let mut qb = QueryBuild::new(ResolveMode::ReplaceParams, &ctx, 0);
        qb.flags |= FLGB_PARAM_CAST;
        resolve_one_param(&mut qb, None, &mut ctx).unwrap();
        String::from_utf8(qb.out).unwrap()
    }

    #[test]
    fn positive_integer_is_unquoted() {
        assert_eq!("42", resolve(CValue::Long(42), SqlType::Integer));
    }

    #[test]
    fn negative_integer_is_parenthesized() {
        assert_eq!("(-42)", resolve(CValue::Long(-42), SqlType::Integer));
    }

    #[test]
    fn string_is_quoted_and_doubled() {
        assert_eq!(
            "'it''s'",
            resolve(CValue::Char(b"it's".to_vec()), SqlType::Varchar)
        );
    }

    #[test]
    fn backslash_doubles_with_escape_in_literal() {
        assert_eq!(
            "'a\\\\b'",
            resolve(CValue::Char(b"a\\b".to_vec()), SqlType::Varchar)
        );
    }

    #[test]
    fn literal_extension_prefix() {
        let mut options = ConnectionOptions::default();
        options.literal_extension = true;
        assert_eq!(
            "E'x'",
            resolve_with_options(CValue::Char(b"x".to_vec()), SqlType::Varchar, options)
        );
    }

    #[test]
    fn date_gets_cast() {
        let date = CDate {
            year: 2011,
            month: 4,
            day: 22,
        };
        assert_eq!(
            "'2011-04-22'::date",
            resolve(CValue::Date(date), SqlType::Date)
        );
    }

    #[test]
    fn timestamp_with_fraction() {
        let ts = CTimestamp {
            year: 2011,
            month: 4,
            day: 22,
            hour: 18,
            minute: 25,
            second: 33,
            fraction: 120_000_000,
        };
        assert_eq!(
            "'2011-04-22 18:25:33.12'::timestamp",
            resolve(CValue::Timestamp(ts), SqlType::Timestamp)
        );
    }

    #[test]
    fn double_nan_is_spelled_out() {
        assert_eq!(
            "'NaN'::float8",
            resolve(CValue::Double(f64::NAN), SqlType::Double)
        );
    }

    #[test]
    fn double_infinity_is_spelled_out() {
        assert_eq!(
            "'-Infinity'::float8",
            resolve(CValue::Double(f64::NEG_INFINITY), SqlType::Double)
        );
    }

    #[test]
    fn bytea_uses_hex_literal() {
        assert_eq!(
            "'\\x00FF'",
            resolve(CValue::Binary(vec![0x00, 0xff]), SqlType::Varbinary)
        );
    }

    #[test]
    fn guid_renders_uppercase() {
        let g = CGuid {
            data1: 0xa0eebc99,
            data2: 0x9c0b,
            data3: 0x4ef8,
            data4: [0xbb, 0x6d, 0x6b, 0xb9, 0xbd, 0x38, 0x0a, 0x11],
        };
        assert_eq!(
            "'A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11'",
            resolve(CValue::Guid(g), SqlType::Guid)
        );
    }

    #[test]
    fn interval_renders_canonical_form() {
        let mut iv = CInterval::new(IntervalKind::DayToSecond);
        iv.day = 1;
        iv.hour = 2;
        iv.minute = 3;
        iv.second = 4;
        assert_eq!(
            "'1 days 02:03:04'",
            resolve(CValue::Interval(iv), SqlType::Varchar)
        );
    }

    #[test]
    fn bool_true_minus_one_folds_to_one() {
        let mut info = ParamInfo::input(SqlType::Bit);
        info.pg_type = PG_TYPE_BOOL;
        let mut conn = Connection::new(NullWire::default(), ConnectionOptions::default());
        let apd = [ParamBinding::single(CValue::Char(b"-1".to_vec()))];
        let ipd = [info];
        let mut proc_return = false;
        let mut ctx = RewriteCtx {
            conn: &mut conn,
            apd: &apd,
            ipd: &ipd,
            pdata: &[],
            proc_return: &mut proc_return,
            discard_output: false,
        };
        let mut qb = QueryBuild::new(ResolveMode::ReplaceParams, &ctx, 0);
        resolve_one_param(&mut qb, None, &mut ctx).unwrap();
        assert_eq!("'1'", String::from_utf8(qb.out).unwrap());
    }

    #[test]
    fn empty_date_string_becomes_null_in_foxpro_mode() {
        let mut options = ConnectionOptions::default();
        options.cvt_null_date = CvtNullDate::EmptyToNull;
        assert_eq!(
            "NULL",
            resolve_with_options(CValue::Char(Vec::new()), SqlType::Date, options)
        );
    }

    #[test]
    fn null_binds_as_null() {
        assert_eq!("NULL", resolve(CValue::Null, SqlType::Integer));
    }

    #[test]
    fn bind_request_prefers_binary_for_bytea() {
        let mut conn = Connection::new(NullWire::default(), ConnectionOptions::default());
        let apd = [ParamBinding::single(CValue::Binary(vec![1, 2, 3]))];
        let ipd = [ParamInfo::input(SqlType::Varbinary)];
        let mut proc_return = false;
        let mut ctx = RewriteCtx {
            conn: &mut conn,
            apd: &apd,
            ipd: &ipd,
            pdata: &[],
            proc_return: &mut proc_return,
            discard_output: false,
        };
        let mut qb = QueryBuild::new(ResolveMode::BuildingBindRequest, &ctx, 0);
        qb.flags |= FLGB_BINARY_AS_POSSIBLE;
        resolve_one_param(&mut qb, None, &mut ctx).unwrap();
        assert_eq!(1, qb.bind_params.len());
        assert!(qb.bind_params[0].binary);
        assert_eq!(Some(vec![1, 2, 3]), qb.bind_params[0].value);
        assert_eq!(PG_TYPE_BYTEA, qb.bind_params[0].pg_type);
    }

    #[test]
    fn float_formatting_limits_significant_digits() {
        assert_eq!("0.25", format_float(0.25, 7));
        assert_eq!("1", format_float(1.0, 15));
        let text = format_float(1.000000000000000222, 15);
        assert!(text.starts_with('1'), "{text}");
    }
}
