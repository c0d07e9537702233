use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use thiserror::Error;

/// A point in time together with the UTC offset it was recorded in.
pub type Timestamp = DateTime<FixedOffset>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("empty timestamp")]
    Empty,
    #[error("unrecognised timestamp layout `{0}`")]
    Layout(String),
    #[error("invalid date in `{0}`")]
    Date(String),
    #[error("invalid time of day in `{0}`")]
    Time(String),
    #[error("invalid UTC offset in `{0}`")]
    Offset(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("am") {
            Some(Meridiem::Am)
        } else if s.eq_ignore_ascii_case("pm") {
            Some(Meridiem::Pm)
        } else {
            None
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Parses the timestamp layouts found in extraction dumps and typed by examiners.
///
/// Accepts RFC 3339, `YYYY-MM-DD hh:mm:ss` with an optional offset (`-8`,
/// `+0530`, `-08:00`, `Z`, `UTC`), `MM/DD/YYYY hh:mm:ss [AM|PM]`, and a bare
/// date (midnight). A missing offset is read as UTC.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, TimestampError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(TimestampError::Empty);
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts);
    }

    let (date, rest) = match input.split_once(|c: char| c == 'T' || c.is_whitespace()) {
        Some((date, rest)) => (date, Some(rest.trim())),
        None => (input, None),
    };

    let date = parse_date(date, input)?;
    match rest {
        Some(rest) if !rest.is_empty() => {
            let (time, offset) = parse_clock_and_offset(rest, input, true)?;
            assemble(date, time, offset, input)
        }
        _ => assemble(date, NaiveTime::MIN, utc(), input),
    }
}

/// Parses the `EXIFCaptureTime` metadata layout, `MM/DD/YYYY hh:mm:ss AM|PM`.
///
/// The value carries no offset and is read as UTC.
pub fn parse_exif_capture_time(value: &str) -> Result<Timestamp, TimestampError> {
    let normalized = value.trim().replace('T', " ");
    let mut parts = normalized.split_whitespace();

    let (Some(date), Some(clock), Some(meridiem), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TimestampError::Layout(value.to_string()));
    };

    if !date.contains('/') {
        return Err(TimestampError::Layout(value.to_string()));
    }
    let meridiem =
        Meridiem::parse(meridiem).ok_or_else(|| TimestampError::Layout(value.to_string()))?;

    let date = parse_date(date, value)?;
    let time = parse_clock(clock, Some(meridiem), value)?;
    assemble(date, time, utc(), value)
}

/// Parses the EXIF `DateTime` metadata layout, `YYYY:MM:DD hh:mm:ss[offset]`.
///
/// The date may also use `-` separators. Hour `24` is read as midnight.
pub fn parse_exif_date_time(value: &str) -> Result<Timestamp, TimestampError> {
    let normalized = value.trim().replacen('T', " ", 1);
    let Some((date, rest)) = normalized.split_once(' ') else {
        return Err(TimestampError::Layout(value.to_string()));
    };

    // year first, either separator
    if !matches!(date.as_bytes().get(4), Some(b':') | Some(b'-')) {
        return Err(TimestampError::Layout(value.to_string()));
    }

    let date = parse_date(date, value)?;
    let (time, offset) = parse_clock_and_offset(rest.trim(), value, false)?;
    assemble(date, time, offset, value)
}

fn assemble(
    date: NaiveDate,
    time: NaiveTime,
    offset: FixedOffset,
    input: &str,
) -> Result<Timestamp, TimestampError> {
    offset
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()
        .ok_or_else(|| TimestampError::Layout(input.to_string()))
}

fn parse_date(date: &str, input: &str) -> Result<NaiveDate, TimestampError> {
    let err = || TimestampError::Date(input.to_string());

    let parts: Vec<&str> = date.split(['-', ':', '/']).collect();
    let [first, second, third] = parts.as_slice() else {
        return Err(err());
    };

    // slashes mean month/day/year
    let (year, month, day) = if date.contains('/') {
        (third, first, second)
    } else {
        (first, second, third)
    };

    if year.len() != 4 {
        return Err(err());
    }

    NaiveDate::from_ymd_opt(
        year.parse().map_err(|_| err())?,
        month.parse().map_err(|_| err())?,
        day.parse().map_err(|_| err())?,
    )
    .ok_or_else(err)
}

fn parse_clock_and_offset(
    rest: &str,
    input: &str,
    allow_meridiem: bool,
) -> Result<(NaiveTime, FixedOffset), TimestampError> {
    let split = rest
        .find(['+', '-', 'Z', 'z', ' ', 'U'])
        .unwrap_or(rest.len());
    let (clock, tail) = rest.split_at(split);
    let mut tail = tail.trim_start();

    let mut meridiem = None;
    if allow_meridiem {
        if let Some(m) = tail.get(..2).and_then(Meridiem::parse) {
            meridiem = Some(m);
            tail = tail[2..].trim_start();
        }
    }

    let offset = if tail.is_empty() {
        utc()
    } else {
        parse_offset(tail).ok_or_else(|| TimestampError::Offset(input.to_string()))?
    };

    Ok((parse_clock(clock, meridiem, input)?, offset))
}

fn parse_clock(
    clock: &str,
    meridiem: Option<Meridiem>,
    input: &str,
) -> Result<NaiveTime, TimestampError> {
    let err = || TimestampError::Time(input.to_string());
    let number = |s: &str| -> Result<u32, TimestampError> {
        if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        s.parse().map_err(|_| err())
    };

    let mut parts = clock.split(':');
    let mut hour = number(parts.next().unwrap_or_default())?;
    let minute = number(parts.next().ok_or_else(err)?)?;
    let (second, nanos) = match parts.next() {
        Some(sec) => {
            let (whole, frac) = sec.split_once('.').unwrap_or((sec, ""));
            (number(whole)?, fraction_to_nanos(frac).ok_or_else(err)?)
        }
        None => (0, 0),
    };
    if parts.next().is_some() {
        return Err(err());
    }

    match meridiem {
        Some(meridiem) => {
            if !(1..=12).contains(&hour) {
                return Err(err());
            }
            hour = match (meridiem, hour) {
                (Meridiem::Am, 12) => 0,
                (Meridiem::Pm, h) if h != 12 => h + 12,
                (_, h) => h,
            };
        }
        // some sources write midnight as 24:mm:ss
        None if hour == 24 => hour = 0,
        None => {}
    }

    NaiveTime::from_hms_nano_opt(hour, minute, second, nanos).ok_or_else(err)
}

fn fraction_to_nanos(frac: &str) -> Option<u32> {
    if frac.is_empty() {
        return Some(0);
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = &frac[..frac.len().min(9)];
    format!("{:0<9}", digits).parse().ok()
}

fn parse_offset(offset: &str) -> Option<FixedOffset> {
    let offset = offset.trim();
    if ["z", "utc", "gmt"]
        .iter()
        .any(|name| offset.eq_ignore_ascii_case(name))
    {
        return Some(utc());
    }

    let offset = offset
        .strip_prefix("UTC")
        .or_else(|| offset.strip_prefix("GMT"))
        .unwrap_or(offset);

    let (sign, digits) = match offset.as_bytes().first()? {
        b'+' => (1, &offset[1..]),
        b'-' => (-1, &offset[1..]),
        _ => return None,
    };

    let (hours, minutes) = match digits.split_once(':') {
        Some(parts) => parts,
        None if digits.len() == 4 && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.split_at(2)
        }
        None => (digits, "00"),
    };

    let valid = |s: &str, max_len: usize| {
        !s.is_empty() && s.len() <= max_len && s.bytes().all(|b| b.is_ascii_digit())
    };
    if !valid(hours, 2) || !valid(minutes, 2) {
        return None;
    }

    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
