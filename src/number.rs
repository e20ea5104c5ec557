//! Locale aware number text parsing.
//!
//! [`normalize`] reduces a cell to a canonical `-1234.5e3` form given a
//! decimal and group separator. Grouping must be regular: the first group
//! holds one to three digits, every later group exactly three.

use std::str::FromStr;

use rust_decimal::Decimal;

const CURRENCY_SYMBOLS: &[char] = &[
    '$', '€', '£', '¥', '₹', '₽', '₩', '¢', '₺', '₪', '₫', '₴', '₦', '฿', '₱', '₡',
];

/// How a percentage or per-mille suffix scales the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaling {
    None,
    Percent,
    PerMille,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberText {
    /// Digits with an optional leading `-`, `.` as decimal point and an
    /// optional `e` exponent.
    pub canonical: String,
    pub has_decimal: bool,
    pub has_exponent: bool,
    pub has_group: bool,
    pub scaling: Scaling,
    pub had_currency: bool,
    /// Integer part has a superfluous leading zero, as in zip codes.
    pub leading_zero: bool,
}

/// Parsing rules shared by all number conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberRules {
    pub decimal_separator: char,
    pub group_separator: Option<char>,
    pub allow_scaling: bool,
    pub strip_currency: bool,
}

impl NumberRules {
    pub fn new(decimal_separator: char, group_separator: Option<char>) -> Self {
        Self {
            decimal_separator,
            group_separator,
            allow_scaling: true,
            strip_currency: true,
        }
    }
}

fn strip_currency(text: &str) -> (&str, bool) {
    let trimmed = text
        .trim_start_matches(|c| CURRENCY_SYMBOLS.contains(&c))
        .trim_end_matches(|c| CURRENCY_SYMBOLS.contains(&c));
    let stripped = trimmed.len() != text.len();
    (trimmed.trim(), stripped)
}

pub fn normalize(text: &str, rules: &NumberRules) -> Option<NumberText> {
    if Some(rules.decimal_separator) == rules.group_separator {
        return None;
    }
    let mut body = text.trim();
    if body.is_empty() {
        return None;
    }

    let mut negative = false;
    if body.len() > 2 && body.starts_with('(') && body.ends_with(')') {
        negative = true;
        body = body[1..body.len() - 1].trim();
    }

    let mut scaling = Scaling::None;
    if rules.allow_scaling {
        if let Some(rest) = body.strip_suffix('%') {
            scaling = Scaling::Percent;
            body = rest.trim_end();
        } else if let Some(rest) = body.strip_suffix('‰') {
            scaling = Scaling::PerMille;
            body = rest.trim_end();
        }
    }

    let mut had_currency = false;
    if rules.strip_currency {
        let (rest, stripped) = strip_currency(body);
        body = rest;
        had_currency |= stripped;
    }

    if let Some(rest) = body.strip_prefix('-') {
        if negative {
            return None;
        }
        negative = true;
        body = rest;
    } else if let Some(rest) = body.strip_prefix('+') {
        body = rest;
    }

    // "-$5" has the symbol behind the sign
    if rules.strip_currency {
        let (rest, stripped) = strip_currency(body);
        body = rest;
        had_currency |= stripped;
    }

    let mut canonical = String::with_capacity(body.len() + 1);
    if negative {
        canonical.push('-');
    }

    let mut integer_digits = 0usize;
    let mut current_group = 0usize;
    let mut groups = 0usize;
    let mut fraction_digits = 0usize;
    let mut has_decimal = false;
    let mut in_exponent = false;
    let mut exponent_digits = 0usize;
    let mut exponent_sign_allowed = false;
    let mut first_integer_digit = None;

    for ch in body.chars() {
        if ch.is_ascii_digit() {
            exponent_sign_allowed = false;
            if in_exponent {
                exponent_digits += 1;
            } else if has_decimal {
                fraction_digits += 1;
            } else {
                if first_integer_digit.is_none() {
                    first_integer_digit = Some(ch);
                }
                integer_digits += 1;
                current_group += 1;
            }
            canonical.push(ch);
            continue;
        }
        if in_exponent {
            if exponent_sign_allowed && (ch == '+' || ch == '-') {
                exponent_sign_allowed = false;
                if ch == '-' {
                    canonical.push('-');
                }
                continue;
            }
            return None;
        }
        if ch == rules.decimal_separator {
            if has_decimal {
                return None;
            }
            if groups > 0 && current_group != 3 {
                return None;
            }
            has_decimal = true;
            if integer_digits == 0 {
                canonical.push('0');
            }
            canonical.push('.');
            continue;
        }
        if Some(ch) == rules.group_separator {
            if has_decimal {
                return None;
            }
            if groups == 0 {
                if current_group == 0 || current_group > 3 {
                    return None;
                }
            } else if current_group != 3 {
                return None;
            }
            groups += 1;
            current_group = 0;
            continue;
        }
        if (ch == 'e' || ch == 'E') && integer_digits + fraction_digits > 0 {
            if groups > 0 && !has_decimal && current_group != 3 {
                return None;
            }
            in_exponent = true;
            exponent_sign_allowed = true;
            canonical.push('e');
            continue;
        }
        return None;
    }

    if integer_digits + fraction_digits == 0 {
        return None;
    }
    if in_exponent && exponent_digits == 0 {
        return None;
    }
    if groups > 0 && !has_decimal && !in_exponent && current_group != 3 {
        return None;
    }

    Some(NumberText {
        canonical,
        has_decimal,
        has_exponent: in_exponent,
        has_group: groups > 0,
        scaling,
        had_currency,
        leading_zero: integer_digits > 1 && first_integer_digit == Some('0'),
    })
}

impl NumberText {
    fn divisor(&self) -> Option<Decimal> {
        match self.scaling {
            Scaling::None => None,
            Scaling::Percent => Some(Decimal::ONE_HUNDRED),
            Scaling::PerMille => Some(Decimal::ONE_THOUSAND),
        }
    }

    /// Whole numbers only: no decimal separator, exponent or scaling.
    pub fn to_i64(&self) -> Option<i64> {
        if self.has_decimal || self.has_exponent || self.scaling != Scaling::None {
            return None;
        }
        self.canonical.parse().ok()
    }

    /// Fixed-point text only; exponent notation is left to [`Self::to_f64`].
    pub fn to_decimal(&self) -> Option<Decimal> {
        if self.has_exponent {
            return None;
        }
        let value = Decimal::from_str(&self.canonical).ok()?;
        match self.divisor() {
            Some(divisor) => value.checked_div(divisor),
            None => Some(value),
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        let value: f64 = self.canonical.parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        Some(match self.scaling {
            Scaling::None => value,
            Scaling::Percent => value / 100.0,
            Scaling::PerMille => value / 1000.0,
        })
    }
}

pub fn parse_i64(text: &str, rules: &NumberRules) -> Option<i64> {
    normalize(text, rules)?.to_i64()
}

pub fn parse_decimal(text: &str, rules: &NumberRules) -> Option<Decimal> {
    normalize(text, rules)?.to_decimal()
}

pub fn parse_f64(text: &str, rules: &NumberRules) -> Option<f64> {
    normalize(text, rules)?.to_f64()
}
