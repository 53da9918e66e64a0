//! Interval values: PostgreSQL default style text to the C interval struct
//! and back.

use crate::sqltypes::{CDataType, CInterval, IntervalKind};

fn trimmed_i64(s: &str) -> Option<(i64, &str)> {
    let s = s.trim_start();
    let mut end = 0;
    let bytes = s.as_bytes();
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == 0 || (end == 1 && !bytes[0].is_ascii_digit()) {
        return None;
    }
    s[..end].parse().ok().map(|v| (v, &s[end..]))
}

fn word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(|c: char| c.is_whitespace()) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, ""),
    }
}

/// Fraction digits clipped to `precision` and padded to a full field, the
/// way `.5` with precision 6 means 500000 microseconds.
fn precision_part(precision: i32, digits: &str) -> u32 {
    let precision = if precision < 0 { 6 } else { precision as usize };
    if precision == 0 {
        return 0;
    }
    let mut fraction = ['0'; 9];
    for (i, c) in digits.chars().take(9).enumerate() {
        fraction[i] = c;
    }
    fraction[..precision.min(9)]
        .iter()
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

fn parse_hms(s: &str) -> Option<(i64, u32, u32, &str)> {
    let (hours, rest) = trimmed_i64(s)?;
    let rest = rest.strip_prefix(':')?;
    let (minutes, rest) = trimmed_i64(rest)?;
    let rest = rest.strip_prefix(':')?;
    let (seconds, rest) = trimmed_i64(rest)?;
    Some((hours, minutes as u32, seconds as u32, rest))
}

fn fraction_digits(s: &str) -> (&str, &str) {
    match s.strip_prefix('.') {
        Some(rest) => {
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            (&rest[..end], &rest[end..])
        }
        None => ("", s),
    }
}

/// Parse a PostgreSQL default style interval (`N-M`, `N years M mons`,
/// `N days HH:MM:SS.frac`, bare `HH:MM:SS`) into the interval struct
/// matching the C data type. Returns `None` when the text does not fit the
/// requested subtype.
pub fn parse_interval(c_type: CDataType, precision: i32, text: &str) -> Option<CInterval> {
    let kind = IntervalKind::from_c_type(c_type)?;
    let mut st = CInterval::new(kind);
    let text = text.trim();

    // `years-months` (sql standard style year to month)
    if let Some((years, rest)) = trimmed_i64(text) {
        if let Some(rest) = rest.strip_prefix('-') {
            if let Some((months, rest)) = trimmed_i64(rest) {
                if rest.trim().is_empty() {
                    if kind != IntervalKind::YearToMonth {
                        return None;
                    }
                    st.sign_negative = years < 0;
                    st.year = years.unsigned_abs() as u32;
                    st.month = months.unsigned_abs() as u32;
                    return Some(st);
                }
            }
        }
    }

    // `days HH:MM:SS[.frac]`
    if let Some((days, rest)) = trimmed_i64(text) {
        if let Some((hours, minutes, seconds, rest)) = parse_hms(rest) {
            let (frac, rest) = fraction_digits(rest);
            if rest.trim().is_empty() && !kind.is_year_month() {
                st.sign_negative = days < 0;
                st.day = days.unsigned_abs() as u32;
                st.hour = hours.unsigned_abs() as u32;
                st.minute = minutes;
                st.second = seconds;
                st.fraction = precision_part(precision, frac);
                return Some(st);
            }
        }
    }

    // `N years M mons [...]` and single unit forms.
    let mut rest = text;
    let mut matched = false;
    while let Some((value, after_value)) = trimmed_i64(rest) {
        let (unit, after_unit) = word(after_value);
        let unit = unit.to_ascii_lowercase();
        if unit.starts_with("year") {
            if !matches!(kind, IntervalKind::Year | IntervalKind::YearToMonth) {
                return None;
            }
            st.sign_negative = value < 0;
            st.year = value.unsigned_abs() as u32;
        } else if unit.starts_with("mon") {
            if !matches!(kind, IntervalKind::Month | IntervalKind::YearToMonth) {
                return None;
            }
            if !matched {
                st.sign_negative = value < 0;
            }
            st.month = value.unsigned_abs() as u32;
        } else if unit.starts_with("day") {
            if kind.is_year_month() {
                return None;
            }
            st.sign_negative = value < 0;
            st.day = value.unsigned_abs() as u32;
            // A time of day may follow.
            if let Some((hours, minutes, seconds, after)) = parse_hms(after_unit) {
                let (frac, after) = fraction_digits(after);
                if after.trim().is_empty() {
                    st.hour = hours.unsigned_abs() as u32;
                    st.minute = minutes;
                    st.second = seconds;
                    st.fraction = precision_part(precision, frac);
                    return Some(st);
                }
            }
        } else if matched {
            return Some(st);
        } else {
            // Not a unit form after all, fall through to the bare time.
            break;
        }
        matched = true;
        rest = after_unit;
        if rest.trim().is_empty() {
            return Some(st);
        }
    }

    // Bare `HH:MM:SS[.frac]`
    if !matched && !kind.is_year_month() {
        if let Some((hours, minutes, seconds, rest)) = parse_hms(text) {
            let (frac, rest) = fraction_digits(rest);
            if rest.trim().is_empty() {
                st.sign_negative = hours < 0;
                st.hour = hours.unsigned_abs() as u32;
                st.minute = minutes;
                st.second = seconds;
                st.fraction = precision_part(precision, frac);
                return Some(st);
            }
        }
    }

    if matched { Some(st) } else { None }
}

/// Render an interval struct the way the parameter resolver sends it,
/// `[-]N years [-]M mons` or `[-]N days [-]HH:MM:SS[.frac]` with exactly
/// the digits demanded by the struct's fraction (trailing zeroes
/// stripped).
pub fn interval_to_string(st: &CInterval, precision: i32) -> String {
    let sign = if st.sign_negative { "-" } else { "" };
    match st.kind {
        IntervalKind::Year => format!("{sign}{} years", st.year),
        IntervalKind::Month | IntervalKind::YearToMonth => {
            format!("{sign}{} years {sign}{} mons", st.year, st.month)
        }
        IntervalKind::Day => format!("{sign}{} days", st.day),
        IntervalKind::Hour | IntervalKind::DayToHour => {
            format!("{sign}{} days {sign}{:02}:00:00", st.day, st.hour)
        }
        IntervalKind::Minute | IntervalKind::HourToMinute | IntervalKind::DayToMinute => {
            format!(
                "{sign}{} days {sign}{:02}:{:02}:00",
                st.day, st.hour, st.minute
            )
        }
        _ => {
            let mut out = format!(
                "{sign}{} days {sign}{:02}:{:02}:{:02}",
                st.day, st.hour, st.minute, st.second
            );
            if st.fraction > 0 {
                let mut fraction = st.fraction;
                let mut prec = if precision < 0 { 6 } else { precision };
                while fraction % 10 == 0 && prec > 0 {
                    fraction /= 10;
                    prec -= 1;
                }
                out.push_str(&format!(".{:0width$}", fraction, width = prec.max(1) as usize));
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_to_month_dash_form() {
        let st = parse_interval(CDataType::IntervalYearToMonth, 6, "3-11").unwrap();
        assert_eq!((3, 11, false), (st.year, st.month, st.sign_negative));
    }

    #[test]
    fn verbose_year_month_form() {
        let st = parse_interval(CDataType::IntervalYearToMonth, 6, "2 years 4 mons").unwrap();
        assert_eq!((2, 4), (st.year, st.month));
    }

    #[test]
    fn days_with_time_of_day() {
        let st = parse_interval(CDataType::IntervalDayToSecond, 6, "5 days 04:03:02.5").unwrap();
        assert_eq!((5, 4, 3, 2), (st.day, st.hour, st.minute, st.second));
        assert_eq!(500_000, st.fraction);
    }

    #[test]
    fn compact_day_time_form() {
        let st = parse_interval(CDataType::IntervalDayToSecond, 6, "-1 02:00:00").unwrap();
        assert!(st.sign_negative);
        assert_eq!((1, 2), (st.day, st.hour));
    }

    #[test]
    fn bare_time() {
        let st = parse_interval(CDataType::IntervalHourToSecond, 6, "10:20:30").unwrap();
        assert_eq!((10, 20, 30), (st.hour, st.minute, st.second));
    }

    #[test]
    fn year_month_text_rejected_for_day_subtype() {
        assert!(parse_interval(CDataType::IntervalDay, 6, "3 years").is_none());
    }

    #[test]
    fn render_day_to_second_strips_trailing_zeroes() {
        let mut st = CInterval::new(IntervalKind::DayToSecond);
        st.day = 1;
        st.hour = 2;
        st.minute = 3;
        st.second = 4;
        st.fraction = 500_000;
        assert_eq!("1 days 02:03:04.5", interval_to_string(&st, 6));
    }

    #[test]
    fn render_negative_repeats_sign() {
        let mut st = CInterval::new(IntervalKind::DayToHour);
        st.sign_negative = true;
        st.day = 2;
        st.hour = 5;
        assert_eq!("-2 days -05:00:00", interval_to_string(&st, 6));
    }
}
