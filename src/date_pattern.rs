//! Date/time patterns in the widespread `yyyy-MM-dd HH:mm:ss` notation.
//!
//! A pattern is compiled once into tokens and then matched strictly: two
//! letter fields need exactly two digits, `/` stands for the date separator
//! and `:` for the time separator chosen at parse time.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{ReaderError, Result};

/// Pseudo pattern for spreadsheet serial numbers.
pub const SERIAL_DATE: &str = "SerialDate";

/// Valid spreadsheet serial range (0100-01-01 up to 9999-12-31).
pub const SERIAL_MIN: f64 = -657_435.0;
pub const SERIAL_MAX: f64 = 2_958_466.0;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const DAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Year { digits: usize },
    Month { min: usize },
    MonthName { abbreviated: bool },
    Day { min: usize },
    DayName { abbreviated: bool },
    Hour24 { min: usize },
    Hour12 { min: usize },
    Minute { min: usize },
    Second { min: usize },
    Fraction { digits: usize, optional: bool },
    AmPm { short: bool },
    DateSeparator,
    TimeSeparator,
    Literal(String),
}

impl Token {
    fn is_date(&self) -> bool {
        matches!(
            self,
            Token::Year { .. }
                | Token::Month { .. }
                | Token::MonthName { .. }
                | Token::Day { .. }
                | Token::DayName { .. }
        )
    }

    fn is_time(&self) -> bool {
        matches!(
            self,
            Token::Hour24 { .. }
                | Token::Hour12 { .. }
                | Token::Minute { .. }
                | Token::Second { .. }
                | Token::Fraction { .. }
                | Token::AmPm { .. }
        )
    }

    fn length_range(&self) -> (usize, usize) {
        match self {
            Token::Year { digits } => (*digits, *digits),
            Token::Month { min }
            | Token::Day { min }
            | Token::Hour24 { min }
            | Token::Hour12 { min }
            | Token::Minute { min }
            | Token::Second { min } => (*min, 2),
            Token::MonthName { abbreviated: true } | Token::DayName { abbreviated: true } => {
                (3, 3)
            }
            Token::MonthName { abbreviated: false } => (3, 9),
            Token::DayName { abbreviated: false } => (6, 9),
            Token::Fraction { digits, optional } => {
                (if *optional { 0 } else { *digits }, *digits)
            }
            Token::AmPm { short } => {
                if *short {
                    (1, 1)
                } else {
                    (2, 2)
                }
            }
            Token::DateSeparator | Token::TimeSeparator => (1, 1),
            Token::Literal(text) => {
                let len = text.chars().count();
                (len, len)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePattern {
    pattern: String,
    tokens: Vec<Token>,
}

impl DatePattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| ReaderError::DatePattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };
        if pattern.trim().is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut idx = 0usize;
        while idx < chars.len() {
            let ch = chars[idx];
            let mut run = 1usize;
            while idx + run < chars.len() && chars[idx + run] == ch {
                run += 1;
            }
            let token = match ch {
                'y' => Some(Token::Year {
                    digits: if run <= 2 { 2 } else { 4 },
                }),
                'M' => Some(match run {
                    1 | 2 => Token::Month { min: run },
                    3 => Token::MonthName { abbreviated: true },
                    _ => Token::MonthName { abbreviated: false },
                }),
                'd' => Some(match run {
                    1 | 2 => Token::Day { min: run },
                    3 => Token::DayName { abbreviated: true },
                    _ => Token::DayName { abbreviated: false },
                }),
                'H' => Some(Token::Hour24 { min: run.min(2) }),
                'h' => Some(Token::Hour12 { min: run.min(2) }),
                'm' => Some(Token::Minute { min: run.min(2) }),
                's' => Some(Token::Second { min: run.min(2) }),
                'f' | 'F' => {
                    if run > 7 {
                        return Err(invalid("more than seven fraction digits"));
                    }
                    Some(Token::Fraction {
                        digits: run,
                        optional: ch == 'F',
                    })
                }
                't' => Some(Token::AmPm { short: run == 1 }),
                '/' => {
                    run = 1;
                    Some(Token::DateSeparator)
                }
                ':' => {
                    run = 1;
                    Some(Token::TimeSeparator)
                }
                '\'' | '"' => {
                    let close = chars[idx + 1..]
                        .iter()
                        .position(|c| *c == ch)
                        .ok_or_else(|| invalid("unterminated quoted literal"))?;
                    literal.extend(&chars[idx + 1..idx + 1 + close]);
                    idx += close + 2;
                    continue;
                }
                '\\' => {
                    let escaped = chars
                        .get(idx + 1)
                        .ok_or_else(|| invalid("pattern ends with an escape"))?;
                    literal.push(*escaped);
                    idx += 2;
                    continue;
                }
                _ => {
                    literal.push(ch);
                    idx += 1;
                    continue;
                }
            };
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.extend(token);
            idx += run;
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        if !tokens.iter().any(|t| t.is_date() || t.is_time()) {
            return Err(invalid("pattern contains no date or time field"));
        }
        Ok(Self {
            pattern: pattern.to_string(),
            tokens,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn has_date(&self) -> bool {
        self.tokens.iter().any(Token::is_date)
    }

    pub fn has_time(&self) -> bool {
        self.tokens.iter().any(Token::is_time)
    }

    /// Shortest and longest text (in chars) the pattern can match.
    pub fn length_range(&self) -> (usize, usize) {
        self.tokens.iter().fold((0, 0), |(min, max), token| {
            let (lo, hi) = token.length_range();
            (min + lo, max + hi)
        })
    }

    pub fn parse(
        &self,
        text: &str,
        date_separator: char,
        time_separator: char,
    ) -> Option<NaiveDateTime> {
        let chars: Vec<char> = text.trim().chars().collect();
        let mut pos = 0usize;
        let mut year: Option<i32> = None;
        let mut month: Option<u32> = None;
        let mut day: Option<u32> = None;
        let mut hour = 0u32;
        let mut hour12: Option<u32> = None;
        let mut pm: Option<bool> = None;
        let mut minute = 0u32;
        let mut second = 0u32;
        let mut nanos = 0u32;

        for token in &self.tokens {
            match token {
                Token::Year { digits } => {
                    let (value, _) = take_digits(&chars, &mut pos, *digits, *digits)?;
                    let value = match (*digits, value) {
                        (2, 0..=49) => 2000 + value,
                        (2, _) => 1900 + value,
                        _ => value,
                    };
                    year = Some(value as i32);
                }
                Token::Month { min } => month = Some(take_digits(&chars, &mut pos, *min, 2)?.0),
                Token::MonthName { abbreviated } => {
                    month = Some(take_name(&chars, &mut pos, &MONTHS, *abbreviated)? as u32 + 1)
                }
                Token::Day { min } => day = Some(take_digits(&chars, &mut pos, *min, 2)?.0),
                Token::DayName { abbreviated } => {
                    take_name(&chars, &mut pos, &DAYS, *abbreviated)?;
                }
                Token::Hour24 { min } => hour = take_digits(&chars, &mut pos, *min, 2)?.0,
                Token::Hour12 { min } => hour12 = Some(take_digits(&chars, &mut pos, *min, 2)?.0),
                Token::Minute { min } => minute = take_digits(&chars, &mut pos, *min, 2)?.0,
                Token::Second { min } => second = take_digits(&chars, &mut pos, *min, 2)?.0,
                Token::Fraction { digits, optional } => {
                    let min = if *optional { 0 } else { *digits };
                    let (value, taken) = take_digits(&chars, &mut pos, min, *digits)?;
                    nanos = value * 10u32.pow(9 - taken as u32);
                }
                Token::AmPm { short } => {
                    let marker = if *short { 1 } else { 2 };
                    let slice: String = chars.get(pos..pos + marker)?.iter().collect();
                    let upper = slice.to_ascii_uppercase();
                    pm = match upper.chars().next()? {
                        'A' if *short || upper == "AM" => Some(false),
                        'P' if *short || upper == "PM" => Some(true),
                        _ => return None,
                    };
                    pos += marker;
                }
                Token::DateSeparator => expect_char(&chars, &mut pos, date_separator)?,
                Token::TimeSeparator => expect_char(&chars, &mut pos, time_separator)?,
                Token::Literal(text) => {
                    for expected in text.chars() {
                        let actual = *chars.get(pos)?;
                        if !actual.eq_ignore_ascii_case(&expected) {
                            return None;
                        }
                        pos += 1;
                    }
                }
            }
        }
        if pos != chars.len() {
            return None;
        }

        if let Some(value) = hour12 {
            if !(1..=12).contains(&value) {
                return None;
            }
            hour = match pm {
                Some(true) => value % 12 + 12,
                Some(false) | None => value % 12,
            };
        } else if pm == Some(true) && hour < 12 {
            hour += 12;
        }

        let date = NaiveDate::from_ymd_opt(
            year.unwrap_or(1899),
            month.unwrap_or(12),
            day.unwrap_or(30),
        )?;
        let time = NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)?;
        Some(NaiveDateTime::new(date, time))
    }
}

fn take_digits(chars: &[char], pos: &mut usize, min: usize, max: usize) -> Option<(u32, usize)> {
    let mut value = 0u32;
    let mut taken = 0usize;
    while taken < max {
        match chars.get(*pos + taken).and_then(|c| c.to_digit(10)) {
            Some(digit) => {
                value = value * 10 + digit;
                taken += 1;
            }
            None => break,
        }
    }
    if taken < min {
        return None;
    }
    *pos += taken;
    Some((value, taken))
}

/// Matches an English month or day name and returns its index.
fn take_name(chars: &[char], pos: &mut usize, names: &[&str], abbreviated: bool) -> Option<usize> {
    let rest: String = chars[*pos..].iter().collect::<String>().to_lowercase();
    for (idx, name) in names.iter().enumerate() {
        let candidate = if abbreviated { &name[..3] } else { name };
        if rest.starts_with(candidate) {
            *pos += candidate.chars().count();
            return Some(idx);
        }
    }
    None
}

fn expect_char(chars: &[char], pos: &mut usize, expected: char) -> Option<()> {
    if *chars.get(*pos)? == expected {
        *pos += 1;
        Some(())
    } else {
        None
    }
}

fn serial_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Converts a spreadsheet day count (fraction = time of day) to a timestamp.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(SERIAL_MIN..=SERIAL_MAX).contains(&serial) {
        return None;
    }
    let millis = (serial * 86_400_000.0).round() as i64;
    serial_epoch().checked_add_signed(Duration::milliseconds(millis))
}

pub fn datetime_to_serial(value: &NaiveDateTime) -> f64 {
    let delta = *value - serial_epoch();
    delta.num_milliseconds() as f64 / 86_400_000.0
}
