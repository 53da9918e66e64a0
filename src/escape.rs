//! Rewriting of call-level `{...}` escape sequences.
//!
//! Handles `{d}`, `{t}`, `{ts}` literals, `{oj}` outer joins, `{escape}`,
//! `{fn ...}` scalar functions and `{call ...}` procedure invocations with
//! an optional `{? = call ...}` return marker. Scalar function names map
//! onto PostgreSQL expressions through a static template table.

use crate::{
    error::Error,
    rewrite::{QueryBuild, RewriteCtx, inner_process_tokens},
    scanner::{ESCAPE_END, LITERAL_QUOTE, QueryParse, find_identifier},
    wire::WireClient,
};

/// Templates mapping call-level scalar functions to PostgreSQL SQL.
///
/// A name beginning with `%N` matches only invocations with `N` arguments.
/// A name of the form `NAME(FIRSTARG` additionally requires the first user
/// argument to equal `FIRSTARG` textually. `$1`..`$N` in the template refer
/// to the argument texts, `$*` splices the whole comma separated list.
static MAP_FUNCS: &[(&str, &str)] = &[
    ("CHAR", "chr($*)"),
    ("CONCAT", "concat($1::text, $2::text)"),
    (
        "INSERT",
        "substring($1 from 1 for $2 - 1) || $4 || substring($1 from $2 + $3)",
    ),
    ("LCASE", "lower($*)"),
    ("%2LOCATE", "strpos($2,  $1)"),
    ("%3LOCATE", "strpos(substring($2 from $3), $1) + $3 - 1"),
    ("LENGTH", "char_length($*)"),
    ("SPACE", "repeat(' ', $1)"),
    ("SUBSTRING", "substr($*)"),
    ("UCASE", "upper($*)"),
    ("CEILING", "ceil($*)"),
    ("LOG", "ln($*)"),
    ("LOG10", "log($*)"),
    ("%0RAND", "random()"),
    ("%1RAND", "(setseed($1) * .0 + random())"),
    ("TRUNCATE", "trunc($*)"),
    ("CURRENT_DATE", "current_date"),
    ("CURRENT_TIME", "current_time"),
    ("CURRENT_TIMESTAMP", "current_timestamp"),
    ("LOCALTIME", "localtime"),
    ("LOCALTIMESTAMP", "localtimestamp"),
    ("CURRENT_USER", "cast(current_user as text)"),
    ("SESSION_USER", "cast(session_user as text)"),
    ("CURDATE", "current_date"),
    ("CURTIME", "current_time"),
    ("DAYNAME", "to_char($1, 'Day')"),
    ("DAYOFMONTH", "cast(extract(day from $1) as integer)"),
    ("DAYOFWEEK", "(cast(extract(dow from $1) as integer) + 1)"),
    ("DAYOFYEAR", "cast(extract(doy from $1) as integer)"),
    ("HOUR", "cast(extract(hour from $1) as integer)"),
    ("MINUTE", "cast(extract(minute from $1) as integer)"),
    ("MONTH", "cast(extract(month from $1) as integer)"),
    ("MONTHNAME", " to_char($1, 'Month')"),
    ("QUARTER", "cast(extract(quarter from $1) as integer)"),
    ("SECOND", "cast(extract(second from $1) as integer)"),
    ("WEEK", "cast(extract(week from $1) as integer)"),
    ("YEAR", "cast(extract(year from $1) as integer)"),
    ("TIMESTAMPADD(SQL_TSI_YEAR", "($3+make_interval(years := $2))"),
    ("TIMESTAMPADD(SQL_TSI_MONTH", "($3+make_interval(months := $2))"),
    ("TIMESTAMPADD(SQL_TSI_WEEK", "($3+make_interval(weeks := $2))"),
    ("TIMESTAMPADD(SQL_TSI_DAY", "($3+make_interval(days := $2))"),
    ("TIMESTAMPADD(SQL_TSI_HOUR", "($3+make_interval(hours := $2))"),
    ("TIMESTAMPADD(SQL_TSI_MINUTE", "($3+make_interval(mins := $2))"),
    ("TIMESTAMPADD(SQL_TSI_SECOND", "($3+make_interval(secs := $2))"),
    (
        "TIMESTAMPADD(SQL_TSI_FRAC_SECOND",
        "($3+make_interval(secs := $2::float / 1000000))",
    ),
    (
        "TIMESTAMPDIFF(SQL_TSI_DAY",
        "cast((extract(epoch from $3) - extract(epoch from $2)) / (24*60*60) as int)",
    ),
    (
        "TIMESTAMPDIFF(SQL_TSI_HOUR",
        "cast((extract(epoch from $3) - extract(epoch from $2)) / 3600 as int)",
    ),
    (
        "TIMESTAMPDIFF(SQL_TSI_MINUTE",
        "cast((extract(epoch from $3) - extract(epoch from $2)) / 60 as int)",
    ),
    (
        "TIMESTAMPDIFF(SQL_TSI_SECOND",
        "cast((extract(epoch from $3) - extract(epoch from $2)) as int)",
    ),
    (
        "TIMESTAMPDIFF(SQL_TSI_FRAC_SECOND",
        "mod(cast(extract(second from ($3 - $2)) as numeric), 1.0) * 1000000",
    ),
    ("IFNULL", "coalesce($*)"),
    ("USER", "cast(current_user as text)"),
];

/// Cast names for the `CONVERT(expr, SQL_xxx)` escape.
static CONVERT_CASTS: &[(&str, &str)] = &[
    ("INTEGER", "int4"),
    ("CHAR", "varchar"),
    ("VARCHAR", "varchar"),
    ("LONGVARCHAR", "text"),
    ("WCHAR", "varchar"),
    ("WVARCHAR", "varchar"),
    ("WLONGVARCHAR", "text"),
    ("NUMERIC", "numeric"),
    ("DOUBLE", "float8"),
    ("FLOAT", "float8"),
    ("REAL", "float4"),
    ("BIGINT", "int8"),
    ("DECIMAL", "numeric"),
    ("SMALLINT", "int2"),
    ("TYPE_DATE", "date"),
    ("TYPE_TIME", "time"),
    ("TYPE_TIMESTAMP", "timestamp"),
    ("BIT", "bit"),
];

/// Look up the template for a scalar function name, discriminating by
/// argument count and, for the `NAME(FIRSTARG` entries, the first
/// argument text.
fn map_function(func: &str, param_count: usize, keyword: &str) -> Option<&'static str> {
    for (odbc_name, template) in MAP_FUNCS {
        let name = *odbc_name;
        if let Some(rest) = name.strip_prefix('%') {
            let arity = rest.as_bytes()[0] - b'0';
            if arity as usize == param_count && rest[1..].eq_ignore_ascii_case(func) {
                return Some(template);
            }
        } else if name.eq_ignore_ascii_case(func) {
            return Some(template);
        } else if let Some(paren) = name.find('(') {
            if name[..paren].eq_ignore_ascii_case(func)
                && name[paren + 1..].eq_ignore_ascii_case(keyword)
            {
                return Some(template);
            }
        }
    }
    None
}

/// Byte ranges of the arguments of a parenthesized list, inclusive, inside
/// the nested output buffer.
type ParamPos = Vec<(isize, isize)>;

/// Scan a `( arg, arg, ... )` list through the main token processor into
/// the nested builder, recording the output range of each argument.
/// Returns the ranges and the output length right after the closing
/// parenthesis. The scan stops at the `}` closing the escape.
fn process_parameters<W: WireClient>(
    qp: &mut QueryParse<'_>,
    qb: &mut QueryBuild,
    ctx: &mut RewriteCtx<'_, W>,
) -> Result<(ParamPos, usize), Error> {
    let mut inner_parenthesis = 0;
    let mut param_pos: ParamPos = vec![(-1, -1)];
    let mut param_count = 0;
    let mut output_count = 0;
    while qp.opos < qp.len() {
        inner_process_tokens(qp, qb, ctx)?;
        if !qp.current_is_continuation() && qp.in_idle() {
            match qp.current() {
                b',' => {
                    if inner_parenthesis == 1 {
                        param_pos[param_count].1 = qb.npos() as isize - 2;
                        param_count += 1;
                        param_pos.push((qb.npos() as isize, -1));
                    }
                }
                b'(' => {
                    if inner_parenthesis == 0 {
                        param_pos[param_count] = (qb.npos() as isize, -1);
                    }
                    inner_parenthesis += 1;
                }
                b')' => {
                    inner_parenthesis -= 1;
                    if inner_parenthesis == 0 {
                        param_pos[param_count].1 = qb.npos() as isize - 2;
                        param_count += 1;
                        param_pos.push((-1, -1));
                    }
                    output_count = qb.npos();
                }
                ESCAPE_END => {
                    if inner_parenthesis == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        qp.opos += 1;
    }
    if param_pos[param_count].0 >= 0 {
        return Err(Error::Validation(
            "Closing parenthesis of the escape argument list is missing.".to_string(),
        ));
    }
    param_pos.truncate(param_count);
    // A single empty argument means an empty list.
    if param_count == 1 {
        let (from, to) = param_pos[0];
        let empty = (from..=to)
            .all(|i| i < 0 || qb.out[i as usize].is_ascii_whitespace());
        if empty {
            param_pos.clear();
        }
    }
    Ok((param_pos, output_count))
}

fn splice_template(
    qb: &mut QueryBuild,
    template: &str,
    nested: &QueryBuild,
    param_pos: &ParamPos,
    output_count: usize,
) -> Result<(), Error> {
    let mut chars = template.bytes().peekable();
    while let Some(b) = chars.next() {
        if b != b'$' {
            qb.push(b);
            continue;
        }
        let (from, to) = match chars.next() {
            Some(b'*') => (1isize, output_count as isize - 2),
            Some(d @ b'1'..=b'9') => {
                let pidx = (d - b'1') as usize;
                let Some(&pos) = param_pos.get(pidx) else {
                    return Err(Error::Validation(format!(
                        "Argument {} of the escape function is missing.",
                        pidx + 1
                    )));
                };
                pos
            }
            _ => {
                return Err(Error::Internal(
                    "malformed scalar function template".to_string(),
                ));
            }
        };
        if to >= from && from >= 0 {
            qb.push_bytes(&nested.out[from as usize..=to as usize]);
        }
    }
    Ok(())
}

fn convert_cast_name(sql_type_token: &str) -> Option<&'static str> {
    let trimmed = sql_type_token.trim();
    let rest = trimmed.strip_prefix("SQL_")?;
    CONVERT_CASTS
        .iter()
        .find(|(name, _)| rest.eq_ignore_ascii_case(name))
        .map(|(_, cast)| *cast)
}

/// Rewrite the `CONVERT(expr, SQL_xxx)` escape: a quoted or numeric first
/// argument keeps literal form, everything else is parenthesized with an
/// explicit cast appended.
fn convert_convert(
    qb: &mut QueryBuild,
    nested: &QueryBuild,
    param_pos: &ParamPos,
) -> Result<(), Error> {
    if param_pos.len() != 2 {
        return Err(Error::Validation(
            "CONVERT requires exactly two arguments.".to_string(),
        ));
    }
    let (from, to) = param_pos[0];
    let arg = &nested.out[from as usize..=to as usize];
    let first = arg
        .iter()
        .copied()
        .find(|b| !b.is_ascii_whitespace())
        .unwrap_or(b' ');
    let (add_quote, add_cast) = if first == LITERAL_QUOTE {
        (false, false)
    } else if first == b'-' || first.is_ascii_digit() {
        (true, false)
    } else {
        (false, true)
    };
    if add_quote {
        qb.push(LITERAL_QUOTE);
        qb.push_bytes(arg);
        qb.push(LITERAL_QUOTE);
    } else if add_cast {
        qb.push(b'(');
        qb.push_bytes(arg);
        qb.push(b')');
        let (tfrom, tto) = param_pos[1];
        let type_token = String::from_utf8_lossy(&nested.out[tfrom as usize..=tto as usize])
            .trim()
            .to_string();
        if let Some(cast) = convert_cast_name(&type_token) {
            qb.push_str("::");
            qb.push_str(cast);
        }
    } else {
        qb.push_bytes(arg);
    }
    Ok(())
}

/// Rewrite the escape sequence opened by the `{` under the scanner cursor.
/// On return the cursor sits on the byte which the main loop advances past
/// (the closing `}` for the self contained forms).
pub fn convert_escape<W: WireClient>(
    qp: &mut QueryParse<'_>,
    qb: &mut QueryBuild,
    ctx: &mut RewriteCtx<'_, W>,
) -> Result<(), Error> {
    if qp.current() == crate::scanner::ESCAPE_START {
        qp.opos += 1;
    }
    skip_spaces(qp);

    // `{? = call ...}` marks a procedure return value.
    if qp.peek(0) == Some(b'?') {
        qb.param_number += 1;
        qb.proc_return = 1;
        *ctx.proc_return = true;
        qp.opos += 1;
        skip_spaces(qp);
        if qp.peek(0) != Some(b'=') {
            qp.opos -= 1;
            return Ok(());
        }
        qp.opos += 1;
        skip_spaces(qp);
    }

    let key = read_word(qp);
    skip_spaces(qp);

    if key.eq_ignore_ascii_case("call") {
        qb.start_brace();
        if qb.num_io_params > 1 || qb.proc_return == 0 {
            qb.push_str("SELECT * FROM ");
        } else {
            qb.push_str("SELECT ");
        }
        let (funclen, next) = find_identifier(qp.rest());
        if funclen > 0 {
            if let Some(next_pos) = next {
                if qp.rest().get(next_pos) == Some(&ESCAPE_END) {
                    // Parameterless `{call proc}`.
                    qb.push_bytes(&qp.rest()[..funclen]);
                    qb.push_str("()");
                    qb.end_brace();
                    qp.opos += next_pos;
                    return Ok(());
                }
            }
        }
        // Let the main loop process name and argument list; the closing
        // `}` pops the brace.
        qp.opos -= 1;
        Ok(())
    } else if key.eq_ignore_ascii_case("d") {
        let body = extract_to_escape_end(qp)?;
        qb.push_bytes(&body);
        qb.push_str("::date");
        qb.space_to_separate_identifiers(qp);
        Ok(())
    } else if key.eq_ignore_ascii_case("t") {
        let body = extract_to_escape_end(qp)?;
        qb.push_bytes(&body);
        qb.push_str("::time");
        qb.space_to_separate_identifiers(qp);
        Ok(())
    } else if key.eq_ignore_ascii_case("ts") {
        let body = extract_to_escape_end(qp)?;
        qb.push_bytes(&body);
        qb.push_str("::timestamp");
        qb.space_to_separate_identifiers(qp);
        Ok(())
    } else if key.eq_ignore_ascii_case("oj") {
        qb.start_brace();
        qp.opos -= 1;
        Ok(())
    } else if key.eq_ignore_ascii_case("escape") {
        let body = extract_to_escape_end(qp)?;
        qb.push_str("escape ");
        qb.push_bytes(&body);
        qb.space_to_separate_identifiers(qp);
        Ok(())
    } else if key.eq_ignore_ascii_case("fn") {
        let func = read_function_name(qp);
        skip_spaces(qp);
        if qp.peek(0) != Some(b'(') {
            // One of the argumentless function constants.
            if let Some(template) = map_function(&func, 0, "") {
                qb.push_str(template);
            } else {
                qb.push_str(&func);
            }
            // Position on the closing brace.
            while qp.peek(0).is_some() && qp.peek(0) != Some(ESCAPE_END) {
                qp.opos += 1;
            }
            return Ok(());
        }

        let mut nested = qb.nested();
        let (param_pos, output_count) = process_parameters(qp, &mut nested, ctx)?;

        if func.eq_ignore_ascii_case("convert") {
            convert_convert(qb, &nested, &param_pos)?;
        } else {
            let keyword = param_pos
                .first()
                .map(|&(from, to)| {
                    if to >= from && from >= 0 {
                        String::from_utf8_lossy(&nested.out[from as usize..=to as usize])
                            .trim()
                            .split_ascii_whitespace()
                            .next()
                            .unwrap_or("")
                            .to_string()
                    } else {
                        String::new()
                    }
                })
                .unwrap_or_default();
            match map_function(&func, param_pos.len(), &keyword) {
                Some(template) => {
                    splice_template(qb, template, &nested, &param_pos, output_count)?
                }
                None => {
                    // Unknown functions pass through with their argument
                    // list unchanged.
                    qb.push_str(&func);
                    qb.push_bytes(&nested.out);
                }
            }
        }
        qb.adopt_counters(&nested);
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Unrecognized escape keyword '{key}'."
        )))
    }
}

fn skip_spaces(qp: &mut QueryParse<'_>) {
    while qp
        .peek(0)
        .map(|b| b.is_ascii_whitespace())
        .unwrap_or(false)
    {
        qp.opos += 1;
    }
}

fn read_word(qp: &mut QueryParse<'_>) -> String {
    let mut word = String::new();
    while let Some(b) = qp.peek(0) {
        if b.is_ascii_whitespace() || word.len() >= 32 {
            break;
        }
        if !b.is_ascii_alphanumeric() && b != b'_' && b != b'?' && b != b'=' {
            break;
        }
        word.push(b as char);
        qp.opos += 1;
    }
    word
}

fn read_function_name(qp: &mut QueryParse<'_>) -> String {
    let mut name = String::new();
    while let Some(b) = qp.peek(0) {
        if b == b'(' || b.is_ascii_whitespace() {
            break;
        }
        if name.len() < 64 {
            name.push(b as char);
        }
        qp.opos += 1;
    }
    name
}

/// Copy the statement text up to the closing `}`, leaving the cursor on
/// the brace.
fn extract_to_escape_end(qp: &mut QueryParse<'_>) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    loop {
        match qp.peek(0) {
            None => {
                return Err(Error::Validation(
                    "Escape sequence misses its closing brace.".to_string(),
                ));
            }
            Some(ESCAPE_END) => break,
            Some(b) => {
                body.push(b);
                qp.opos += 1;
            }
        }
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_discrimination() {
        assert_eq!(Some("random()"), map_function("RAND", 0, ""));
        assert_eq!(
            Some("(setseed($1) * .0 + random())"),
            map_function("rand", 1, "")
        );
        assert_eq!(Some("strpos($2,  $1)"), map_function("locate", 2, ""));
    }

    #[test]
    fn first_argument_dispatch() {
        assert_eq!(
            Some("($3+make_interval(days := $2))"),
            map_function("TIMESTAMPADD", 3, "SQL_TSI_DAY")
        );
        assert!(map_function("TIMESTAMPADD", 3, "SQL_TSI_LIGHTYEAR").is_none());
    }

    #[test]
    fn unknown_functions_are_not_mapped() {
        assert!(map_function("SOUNDEX", 1, "").is_none());
    }

    #[test]
    fn convert_cast_table() {
        assert_eq!(Some("int4"), convert_cast_name("SQL_INTEGER"));
        assert_eq!(Some("timestamp"), convert_cast_name(" SQL_TYPE_TIMESTAMP"));
        assert_eq!(None, convert_cast_name("INTEGER"));
    }
}
