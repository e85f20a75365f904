//! Timestamp functions
//!
//! Accepted `to_timestamp` input forms:
//!
//! ```text
//! YYYY[T]
//! YYYY-MM[T]
//! YYYY-MM-DD[T]
//! YYYY-MM-DDTHH:MM[offset]
//! YYYY-MM-DDTHH:MM:SS[offset]
//! YYYY-MM-DDTHH:MM:SS.fffffffff[offset]
//!
//! offset := Z | (+|-)HH[[:]MM]        (defaults to +00:00)
//! ```
//!
//! `date_diff` works on UTC-normalized instants while `extract` and
//! `to_string` read the fields in the timestamp's own offset.

use std::fmt::Write as _;

use chrono::{
    DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveTime, SubsecRound, TimeDelta,
    TimeZone, Timelike, Utc,
};
use nom::{
    branch::alt,
    bytes::complete::take_while_m_n,
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, map, map_res, opt, value},
    sequence::{preceded, tuple},
    IResult,
};

use crate::query::ast::DatePart;
use crate::query::error::{CastError, EvalError, QueryResult};
use crate::query::value::{Timestamp, Value};

use super::integer_arg;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Zulu,
    Fixed(i32),
}

#[derive(Debug, Clone, Copy, Default)]
struct Clock {
    hour: u32,
    minute: u32,
    second: u32,
    nanos: u32,
}

fn fixed_digits<'a>(count: usize) -> impl FnMut(&'a str) -> IResult<&'a str, u32> {
    map_res(
        take_while_m_n(count, count, |c: char| c.is_ascii_digit()),
        |digits: &str| digits.parse::<u32>(),
    )
}

fn date(input: &str) -> IResult<&str, (i32, u32, u32)> {
    let (input, year) = fixed_digits(4)(input)?;
    let (input, month) = opt(preceded(char('-'), fixed_digits(2)))(input)?;
    let (input, day) = match month {
        Some(_) => opt(preceded(char('-'), fixed_digits(2)))(input)?,
        None => (input, None),
    };
    Ok((input, (year as i32, month.unwrap_or(1), day.unwrap_or(1))))
}

/// Decimal fraction of a second, as nanoseconds
fn fraction(input: &str) -> IResult<&str, u32> {
    map_res(preceded(char('.'), digit1), |digits: &str| {
        let kept = &digits[..digits.len().min(9)];
        format!("{:0<9}", kept).parse::<u32>()
    })(input)
}

fn clock(input: &str) -> IResult<&str, Clock> {
    let (input, hour) = fixed_digits(2)(input)?;
    let (input, minute) = preceded(char(':'), fixed_digits(2))(input)?;
    let (input, second) = opt(preceded(char(':'), fixed_digits(2)))(input)?;
    let (input, nanos) = match second {
        Some(_) => opt(fraction)(input)?,
        None => (input, None),
    };
    Ok((
        input,
        Clock {
            hour,
            minute,
            second: second.unwrap_or(0),
            nanos: nanos.unwrap_or(0),
        },
    ))
}

fn zone(input: &str) -> IResult<&str, Zone> {
    alt((
        value(Zone::Zulu, one_of("Zz")),
        map(
            tuple((
                one_of("+-"),
                fixed_digits(2),
                opt(preceded(opt(char(':')), fixed_digits(2))),
            )),
            |(sign, hours, minutes)| {
                let seconds = (hours * 3600 + minutes.unwrap_or(0) * 60) as i32;
                Zone::Fixed(if sign == '-' { -seconds } else { seconds })
            },
        ),
    ))(input)
}

fn timestamp(input: &str) -> IResult<&str, ((i32, u32, u32), Option<Clock>, Option<Zone>)> {
    let (input, ymd) = date(input)?;
    let (input, separator) = opt(one_of("Tt"))(input)?;
    let (input, time) = match separator {
        Some(_) => opt(clock)(input)?,
        None => (input, None),
    };
    let (input, zone) = match time {
        Some(_) => opt(zone)(input)?,
        None => (input, None),
    };
    Ok((input, (ymd, time, zone)))
}

/// Parse the textual timestamp forms listed in the module docs
pub fn parse_timestamp(text: &str) -> Result<Timestamp, CastError> {
    let invalid = || CastError::InvalidTimestamp(text.to_string());

    let (_, ((year, month, day), time, zone)) =
        all_consuming(timestamp)(text.trim()).map_err(|_| invalid())?;
    let time = time.unwrap_or_default();

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
    let clock = NaiveTime::from_hms_nano_opt(time.hour, time.minute, time.second, time.nanos)
        .ok_or_else(invalid)?;
    let (offset_seconds, zulu) = match zone {
        Some(Zone::Zulu) => (0, true),
        Some(Zone::Fixed(seconds)) => (seconds, false),
        None => (0, false),
    };
    let offset = FixedOffset::east_opt(offset_seconds).ok_or_else(invalid)?;
    let datetime = offset
        .from_local_datetime(&date.and_time(clock))
        .single()
        .ok_or_else(invalid)?;

    Ok(Timestamp::new(datetime, zulu))
}

fn expect_timestamp(function: &'static str, value: &Value) -> Result<Timestamp, EvalError> {
    match value {
        Value::Timestamp(ts) => Ok(*ts),
        other => Err(EvalError::InvalidArgument {
            function,
            message: format!("expected a timestamp, found {}", other.kind_name()),
        }),
    }
}

/// `to_timestamp(text)`
pub fn to_timestamp(value: &Value) -> QueryResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
        Value::Str(s) => Ok(Value::Timestamp(parse_timestamp(s)?)),
        other => Err(EvalError::InvalidArgument {
            function: "to_timestamp",
            message: format!("expected a string, found {}", other.kind_name()),
        }
        .into()),
    }
}

/// Current instant in UTC, whole seconds
pub fn utcnow() -> Value {
    let now = Utc::now().trunc_subsecs(0).fixed_offset();
    Value::Timestamp(Timestamp::new(now, false))
}

fn add_months(
    datetime: DateTime<FixedOffset>,
    months: i64,
) -> Option<DateTime<FixedOffset>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        datetime.checked_add_months(magnitude)
    } else {
        datetime.checked_sub_months(magnitude)
    }
}

/// `date_add(part, quantity, timestamp)`. Month arithmetic clamps to the
/// end of the month; the offset is preserved.
pub fn date_add(part: DatePart, quantity: &Value, ts: &Value) -> QueryResult<Value> {
    if ts.is_null() {
        return Ok(Value::Null);
    }
    let quantity = match integer_arg("date_add", quantity)? {
        Some(quantity) => quantity,
        None => return Ok(Value::Null),
    };
    let ts = expect_timestamp("date_add", ts)?;
    let datetime = ts.datetime;

    let shifted = match part {
        DatePart::Year => quantity
            .checked_mul(12)
            .and_then(|months| add_months(datetime, months)),
        DatePart::Month => add_months(datetime, quantity),
        DatePart::Day => TimeDelta::try_days(quantity).and_then(|d| datetime.checked_add_signed(d)),
        DatePart::Hour => {
            TimeDelta::try_hours(quantity).and_then(|d| datetime.checked_add_signed(d))
        }
        DatePart::Minute => {
            TimeDelta::try_minutes(quantity).and_then(|d| datetime.checked_add_signed(d))
        }
        DatePart::Second => {
            TimeDelta::try_seconds(quantity).and_then(|d| datetime.checked_add_signed(d))
        }
        other => {
            return Err(EvalError::InvalidArgument {
                function: "date_add",
                message: format!("unsupported unit '{}'", other.name()),
            }
            .into())
        }
    };

    let shifted = shifted.ok_or(EvalError::Overflow("date_add"))?;
    Ok(Value::Timestamp(Timestamp::new(shifted, ts.zulu)))
}

/// `date_diff(part, from, to)`: whole units from `from` to `to`
pub fn date_diff(part: DatePart, from: &Value, to: &Value) -> QueryResult<Value> {
    if from.is_null() || to.is_null() {
        return Ok(Value::Null);
    }
    let from = expect_timestamp("date_diff", from)?.datetime.naive_utc();
    let to = expect_timestamp("date_diff", to)?.datetime.naive_utc();

    let elapsed = to.signed_duration_since(from);
    let units = match part {
        DatePart::Year => i64::from(to.year() - from.year()),
        DatePart::Month => {
            i64::from(to.year() - from.year()) * 12 + i64::from(to.month() as i32 - from.month() as i32)
        }
        DatePart::Day => to.date().signed_duration_since(from.date()).num_days(),
        DatePart::Hour => elapsed.num_hours(),
        DatePart::Minute => elapsed.num_minutes(),
        DatePart::Second => elapsed.num_seconds(),
        other => {
            return Err(EvalError::InvalidArgument {
                function: "date_diff",
                message: format!("unsupported unit '{}'", other.name()),
            }
            .into())
        }
    };
    Ok(Value::Int(units))
}

/// `extract(part FROM timestamp)`; `day` is the day of the year
pub fn extract(part: DatePart, ts: &Value) -> QueryResult<Value> {
    if ts.is_null() {
        return Ok(Value::Null);
    }
    let ts = expect_timestamp("extract", ts)?;
    let datetime = ts.datetime;
    let offset = ts.offset_seconds();

    let field = match part {
        DatePart::Year => i64::from(datetime.year()),
        DatePart::Month => i64::from(datetime.month()),
        DatePart::Day => i64::from(datetime.ordinal()),
        DatePart::Week => i64::from(datetime.iso_week().week()),
        DatePart::Hour => i64::from(datetime.hour()),
        DatePart::Minute => i64::from(datetime.minute()),
        DatePart::Second => i64::from(datetime.second()),
        DatePart::TimezoneHour => i64::from(offset / 3600),
        DatePart::TimezoneMinute => i64::from(offset % 3600 / 60),
    };
    Ok(Value::Int(field))
}

/// `to_string(timestamp, format)`
pub fn to_string(ts: &Value, format: &Value) -> QueryResult<Value> {
    if ts.is_null() || format.is_null() {
        return Ok(Value::Null);
    }
    let ts = expect_timestamp("to_string", ts)?;
    let format = match format {
        Value::Str(s) => s,
        other => {
            return Err(EvalError::InvalidArgument {
                function: "to_string",
                message: format!("expected a format string, found {}", other.kind_name()),
            }
            .into())
        }
    };
    Ok(Value::Str(format_timestamp(&ts, format)))
}

/// Longest run of a pattern letter consumed as one token
fn max_run(letter: char) -> Option<usize> {
    match letter {
        'y' | 'S' => Some(usize::MAX),
        'M' | 'X' | 'x' => Some(5),
        'd' | 'H' | 'h' | 'm' | 's' => Some(2),
        'n' | 'a' => Some(1),
        _ => None,
    }
}

/// Render a timestamp with the pattern-letter format language
///
/// ```text
/// y   year (yy: two digits, y and yyy+: zero padded to the run length)
/// M   month (MM padded, MMM Mar, MMMM March, MMMMM M)
/// d   day       H  hour 0-23     h  hour 1-12
/// m   minute    s  second        a  AM/PM
/// S   fraction of a second, one digit per letter
/// n   nanoseconds
/// X   offset, Z when zero (X +HH, XX +HHMM, XXX +HH:MM)
/// x   offset (x H, xx HMM, xxx +HH:MM)
/// ```
///
/// Any other character is copied through.
pub fn format_timestamp(ts: &Timestamp, pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let letter = chars[i];
        let Some(max) = max_run(letter) else {
            out.push(letter);
            i += 1;
            continue;
        };
        let run = chars[i..].iter().take_while(|&&c| c == letter).count();
        let width = run.min(max);
        write_token(&mut out, ts, letter, width);
        i += width;
    }

    out
}

fn write_token(out: &mut String, ts: &Timestamp, letter: char, width: usize) {
    let dt = &ts.datetime;
    let nanos = dt.nanosecond() % 1_000_000_000;
    let offset = ts.offset_seconds();
    let sign = if offset < 0 { '-' } else { '+' };
    let offset_hours = offset.unsigned_abs() / 3600;
    let offset_minutes = offset.unsigned_abs() % 3600 / 60;

    // Writing into a String cannot fail.
    let _ = match (letter, width) {
        ('y', 2) => write!(out, "{:02}", dt.year().rem_euclid(100)),
        ('y', 1) => write!(out, "{}", dt.year()),
        ('y', w) => write!(out, "{:0w$}", dt.year(), w = w),
        ('M', 1) => write!(out, "{}", dt.month()),
        ('M', 2) => write!(out, "{:02}", dt.month()),
        ('M', w) => {
            let name = MONTH_NAMES[dt.month0() as usize];
            let shown = match w {
                3 => &name[..3],
                4 => name,
                _ => &name[..1],
            };
            out.write_str(shown)
        }
        ('d', 1) => write!(out, "{}", dt.day()),
        ('d', _) => write!(out, "{:02}", dt.day()),
        ('H', 1) => write!(out, "{}", dt.hour()),
        ('H', _) => write!(out, "{:02}", dt.hour()),
        ('h', 1) => write!(out, "{}", dt.hour12().1),
        ('h', _) => write!(out, "{:02}", dt.hour12().1),
        ('m', 1) => write!(out, "{}", dt.minute()),
        ('m', _) => write!(out, "{:02}", dt.minute()),
        ('s', 1) => write!(out, "{}", dt.second()),
        ('s', _) => write!(out, "{:02}", dt.second()),
        ('S', w) => {
            let digits = format!("{:09}", nanos);
            if w <= 9 {
                out.write_str(&digits[..w])
            } else {
                write!(out, "{}{}", digits, "0".repeat(w - 9))
            }
        }
        ('n', _) => write!(out, "{}", nanos),
        ('a', _) => out.write_str(if dt.hour() < 12 { "AM" } else { "PM" }),
        ('X', _) if offset == 0 => out.write_str("Z"),
        ('X', 1) => write!(out, "{}{:02}", sign, offset_hours),
        ('X', 2) | ('X', 4) => write!(out, "{}{:02}{:02}", sign, offset_hours, offset_minutes),
        ('X', _) => write!(out, "{}{:02}:{:02}", sign, offset_hours, offset_minutes),
        ('x', 1) => write!(out, "{}", offset / 3600),
        ('x', 2) | ('x', 4) => write!(out, "{}{:02}", offset / 3600, offset_minutes),
        ('x', _) => write!(out, "{}{:02}:{:02}", sign, offset_hours, offset_minutes),
        (other, _) => write!(out, "{}", other),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(text: &str) -> Timestamp {
        parse_timestamp(text).unwrap()
    }

    fn tsv(text: &str) -> Value {
        Value::Timestamp(ts(text))
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(ts("2007T").to_string(), "2007-01-01T00:00:00+00:00");
        assert_eq!(ts("2007-09T").to_string(), "2007-09-01T00:00:00+00:00");
        assert_eq!(ts("2007-09-17T").to_string(), "2007-09-17T00:00:00+00:00");
        assert_eq!(ts("2007-09-17T17:56Z").to_string(), "2007-09-17T17:56:00Z");
        assert_eq!(ts("2007-09-17T17:56:05Z").to_string(), "2007-09-17T17:56:05Z");
        assert_eq!(
            ts("2007-09-17T17:56:05.234Z").to_string(),
            "2007-09-17T17:56:05.234000Z"
        );
        assert_eq!(ts("2007-09-17T17:56+12:08").to_string(), "2007-09-17T17:56:00+12:08");
        assert_eq!(
            ts("2007-09-17T17:56:05-05:30").to_string(),
            "2007-09-17T17:56:05-05:30"
        );
        assert_eq!(
            ts("2007-09-17T17:56:05.234+02:44").to_string(),
            "2007-09-17T17:56:05.234000+02:44"
        );
        assert_eq!(ts("2007-09-17T17:56:05+0530").to_string(), "2007-09-17T17:56:05+05:30");
        assert_eq!(ts("2010-01-15T13:30:10Z").to_string(), "2010-01-15T13:30:10Z");
    }

    #[test]
    fn test_parse_fraction_is_decimal() {
        assert_eq!(ts("2007-09-17T17:56:05.5678Z").datetime.nanosecond(), 567_800_000);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_timestamp("2007-13-01T").is_err());
        assert!(parse_timestamp("07-09-17").is_err());
        assert!(parse_timestamp("2007-09-17T25:00Z").is_err());
        assert!(parse_timestamp("2007-09-17T17:56Zjunk").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_date_add() {
        let base = tsv("2009-09-17T17:56:06.234567Z");
        let add = |part, n| date_add(part, &Value::Int(n), &base).unwrap().to_string();
        assert_eq!(add(DatePart::Year, 2), "2011-09-17T17:56:06.234567Z");
        assert_eq!(add(DatePart::Month, -5), "2009-04-17T17:56:06.234567Z");
        assert_eq!(add(DatePart::Day, 15), "2009-10-02T17:56:06.234567Z");
        assert_eq!(add(DatePart::Hour, -18), "2009-09-16T23:56:06.234567Z");
        assert_eq!(add(DatePart::Minute, 4), "2009-09-17T18:00:06.234567Z");
        assert_eq!(add(DatePart::Second, 54), "2009-09-17T17:57:00.234567Z");
    }

    #[test]
    fn test_date_add_clamps_month_end() {
        let base = tsv("2009-01-31T00:00:00+02:00");
        let shifted = date_add(DatePart::Month, &Value::Int(1), &base).unwrap();
        assert_eq!(shifted.to_string(), "2009-02-28T00:00:00+02:00");
    }

    #[test]
    fn test_date_diff() {
        let a = tsv("2009-09-17T17:56:06.234567Z");
        let b = tsv("2007-09-17T19:30:05.234567Z");
        let diff = |part| date_diff(part, &a, &b).unwrap();
        assert_eq!(diff(DatePart::Year), Value::Int(-2));
        assert_eq!(diff(DatePart::Month), Value::Int(-24));
        assert_eq!(diff(DatePart::Day), Value::Int(-731));

        let c = tsv("2009-09-17T17:56:06Z");
        let d = tsv("2011-09-17T17:56:06Z");
        assert_eq!(date_diff(DatePart::Hour, &c, &d).unwrap(), Value::Int(17520));
    }

    #[test]
    fn test_date_diff_across_offsets() {
        let a = tsv("2009-09-17T17:56:06+07:00");
        let b = tsv("2009-09-17T17:56:06Z");
        assert_eq!(date_diff(DatePart::Hour, &a, &b).unwrap(), Value::Int(7));
        assert_eq!(date_diff(DatePart::Minute, &b, &a).unwrap(), Value::Int(-420));
    }

    #[test]
    fn test_extract() {
        let t = tsv("2009-09-17T17:56:06.234567-07:45");
        let get = |part| extract(part, &t).unwrap();
        assert_eq!(get(DatePart::Year), Value::Int(2009));
        assert_eq!(get(DatePart::Month), Value::Int(9));
        assert_eq!(get(DatePart::Day), Value::Int(260));
        assert_eq!(get(DatePart::Week), Value::Int(38));
        assert_eq!(get(DatePart::Hour), Value::Int(17));
        assert_eq!(get(DatePart::Minute), Value::Int(56));
        assert_eq!(get(DatePart::Second), Value::Int(6));
        assert_eq!(get(DatePart::TimezoneHour), Value::Int(-7));
        assert_eq!(get(DatePart::TimezoneMinute), Value::Int(-45));
    }

    #[test]
    fn test_format_tokens() {
        let t = ts("2009-03-17T17:56:06.234567Z");
        assert_eq!(
            format_timestamp(&t, "yydaMMMM h m s.n"),
            "0917PMMarch 5 56 6.234567000"
        );
        assert_eq!(format_timestamp(&t, "yyyyyy"), "002009");
        assert_eq!(format_timestamp(&t, "yyy-MM-dd"), "2009-03-17");
        assert_eq!(format_timestamp(&t, "M MM MMM MMMMM"), "3 03 Mar M");
        assert_eq!(format_timestamp(&t, "HH:mm:ss"), "17:56:06");
        assert_eq!(format_timestamp(&t, "SSSSSSSSSS"), "2345670000");
        assert_eq!(format_timestamp(&t, "S"), "2");
        assert_eq!(format_timestamp(&t, "X XX XXX"), "Z Z Z");
        assert_eq!(format_timestamp(&t, "x xx xxx"), "0 000 +00:00");
    }

    #[test]
    fn test_format_day_runs_split() {
        let t = ts("2009-03-07T01:02:03Z");
        assert_eq!(format_timestamp(&t, "ddd"), "077");
        assert_eq!(format_timestamp(&t, "hh a"), "01 AM");
    }

    #[test]
    fn test_format_offsets() {
        let t = ts("2009-03-07T01:02:03-04:25");
        assert_eq!(format_timestamp(&t, "X"), "-04");
        assert_eq!(format_timestamp(&t, "XX"), "-0425");
        assert_eq!(format_timestamp(&t, "XXX"), "-04:25");
        assert_eq!(format_timestamp(&t, "x"), "-4");
        assert_eq!(format_timestamp(&t, "xx"), "-425");

        let t = ts("2009-03-07T01:02:03+12:05");
        assert_eq!(format_timestamp(&t, "x"), "12");
        assert_eq!(format_timestamp(&t, "xxxx"), "1205");
        assert_eq!(format_timestamp(&t, "xxxxx"), "+12:05");
    }

    #[test]
    fn test_format_round_trip() {
        let original = ts("2011-05-04T10:20:30.123456789-03:30");
        let text = format_timestamp(&original, "yyyy-MM-ddTHH:mm:ss.SSSSSSSSSXXX");
        assert_eq!(text, "2011-05-04T10:20:30.123456789-03:30");
        assert_eq!(parse_timestamp(&text).unwrap(), original);
    }

    #[test]
    fn test_utcnow_has_second_precision() {
        let Value::Timestamp(now) = utcnow() else {
            panic!("utcnow must return a timestamp");
        };
        assert_eq!(now.datetime.nanosecond(), 0);
        assert!(now.to_string().ends_with("+00:00"));
    }

    #[test]
    fn test_nulls_propagate() {
        assert_eq!(extract(DatePart::Year, &Value::Null).unwrap(), Value::Null);
        assert_eq!(to_timestamp(&Value::Null).unwrap(), Value::Null);
        assert_eq!(
            date_add(DatePart::Day, &Value::Null, &tsv("2009T")).unwrap(),
            Value::Null
        );
    }
}
