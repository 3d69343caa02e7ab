//! Sort-Key Codec
//!
//! Converts a number, a string, or a list of those into a `String` whose
//! plain lexicographic (byte) order matches the intuitive order of the input:
//!
//! - numbers compare numerically, sign included;
//! - all numbers sort before all strings;
//! - strings compare character by character, and `"ab"` sorts before any
//!   longer string starting with `"ab"`;
//! - lists compare element-wise, then by length.
//!
//! # Encoding
//!
//! A number becomes a tag followed by [`NUMBER_DIGITS`] digits in base 65533.
//! The digits spell the `f64` bit pattern remapped so that unsigned order is
//! numeric order: negative numbers have every bit flipped, the rest only the
//! sign bit. Every finite number keeps its full precision, so distinct
//! numbers never share an encoding. `-0.0` encodes like `0.0` and NaN like
//! positive infinity.
//!
//! Digit `d` maps to code point `2 + d`, skipping the UTF-16 surrogate block
//! so every digit is a valid `char`.
//!
//! A string becomes a tag, its characters and a separator (code point 1).
//! Code points 0 to 2 inside the string are escaped as two characters
//! starting with code point 2, so the separator stays below every character
//! a string can hold.
//!
//! The encoding never yields an empty string: the keyed-list reconciler
//! reserves the empty string for "filtered out".

use std::fmt;

/// Number of digit values per position.
const DIGIT_BASE: u64 = 65533;

/// Digits per number. 65533^5 is the first power at or above 2^64.
pub const NUMBER_DIGITS: usize = 5;

/// Separator ending strings.
const SEPARATOR: char = '\u{1}';

/// Lead character of an escaped code point 0, 1 or 2.
const ESCAPE: char = '\u{2}';

/// Tag placed before every number.
const NUMBER_TAG: char = '\u{60}';

/// Tag placed before every string, above the number tag.
const STRING_TAG: char = '\u{B0}';

/// A user sort key.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Number(f64),
    Str(String),
    List(Vec<SortKey>),
}

impl From<f64> for SortKey {
    fn from(n: f64) -> Self {
        SortKey::Number(n)
    }
}

impl From<i32> for SortKey {
    fn from(n: i32) -> Self {
        SortKey::Number(n.into())
    }
}

impl From<i64> for SortKey {
    fn from(n: i64) -> Self {
        SortKey::Number(n as f64)
    }
}

impl From<usize> for SortKey {
    fn from(n: usize) -> Self {
        SortKey::Number(n as f64)
    }
}

impl From<&str> for SortKey {
    fn from(s: &str) -> Self {
        SortKey::Str(s.to_owned())
    }
}

impl From<String> for SortKey {
    fn from(s: String) -> Self {
        SortKey::Str(s)
    }
}

impl<T: Into<SortKey>> From<Vec<T>> for SortKey {
    fn from(items: Vec<T>) -> Self {
        SortKey::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Number(n) => write!(f, "{n}"),
            SortKey::Str(s) => write!(f, "{s:?}"),
            SortKey::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Encode a sort key into its order-preserving string form.
pub fn encode(key: &SortKey) -> String {
    let mut out = String::new();
    push_key(&mut out, key);
    if out.is_empty() {
        // Only an empty list gets here; it sorts before every other key.
        out.push(SEPARATOR);
    }
    out
}

fn push_key(out: &mut String, key: &SortKey) {
    match key {
        SortKey::Number(n) => push_number(out, *n),
        SortKey::Str(s) => push_str(out, s),
        SortKey::List(items) => {
            for item in items {
                push_key(out, item);
            }
        }
    }
}

fn push_str(out: &mut String, s: &str) {
    out.push(STRING_TAG);
    for c in s.chars() {
        if c <= ESCAPE {
            out.push(ESCAPE);
            out.push(char::from_u32(u32::from(c) + 2).unwrap_or(ESCAPE));
        } else {
            out.push(c);
        }
    }
    out.push(SEPARATOR);
}

fn digit_char(digit: u32) -> char {
    let mut code = 2 + digit;
    if code >= 0xD800 {
        code += 0x800;
    }
    char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Map an `f64` onto a `u64` with the same order.
fn ordered_bits(n: f64) -> u64 {
    let n = if n.is_nan() {
        f64::INFINITY
    } else if n == 0.0 {
        0.0
    } else {
        n
    };
    let bits = n.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits | 1 << 63
    }
}

fn push_number(out: &mut String, n: f64) {
    let mut rest = ordered_bits(n);
    let mut digits = [0u32; NUMBER_DIGITS];
    for slot in digits.iter_mut().rev() {
        *slot = (rest % DIGIT_BASE) as u32;
        rest /= DIGIT_BASE;
    }
    out.push(NUMBER_TAG);
    for digit in digits {
        out.push(digit_char(digit));
    }
}
