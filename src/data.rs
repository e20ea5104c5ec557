use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A converted cell. Null cells are `None` at the accessor level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Double(f64),
    Decimal(Decimal),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Guid(Uuid),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Double(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Decimal(d) => d.normalize().to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::DateTime(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
            Value::Guid(g) => g.to_string(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Double(f) => Some(*f),
            Value::Decimal(d) => rust_decimal::prelude::ToPrimitive::to_f64(d),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            Value::Double(f) => Decimal::try_from(*f).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Value::Guid(g) => Some(*g),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Parses GUID text with or without braces.
pub fn parse_guid(value: &str) -> Option<Uuid> {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(trimmed);
    // hyphenated or plain hex only
    if inner.len() != 36 && inner.len() != 32 {
        return None;
    }
    Uuid::parse_str(inner).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    #[test]
    fn display_drops_midnight_and_integral_fractions() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(Value::DateTime(date).as_display(), "2024-05-06");
        let stamp = date + chrono::Duration::seconds(3661);
        assert_eq!(Value::DateTime(stamp).as_display(), "2024-05-06 01:01:01");
        assert_eq!(Value::Double(42.0).as_display(), "42");
        assert_eq!(Value::Double(4.25).as_display(), "4.25");
        assert_eq!(
            Value::Decimal(Decimal::from_str("1.500").unwrap()).as_display(),
            "1.5"
        );
    }

    #[test]
    fn numeric_accessors_widen() {
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Value::Integer(3).as_decimal(), Some(Decimal::from(3)));
        assert_eq!(Value::String("3".into()).as_i64(), None);
    }

    #[test]
    fn guid_accepts_braces() {
        let expected = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(parse_guid("{67E55044-10B1-426F-9247-BB680E5FE0C8}"), Some(expected));
        assert_eq!(parse_guid("67e5504410b1426f9247bb680e5fe0c8"), Some(expected));
        assert_eq!(parse_guid("not-a-guid"), None);
        assert_eq!(parse_guid("12345"), None);
    }
}
