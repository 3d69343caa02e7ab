//! Fractional string keys.
//!
//! [`key_between`] produces a key that sorts strictly between two existing
//! keys, so an item can be placed between two neighbours without renumbering
//! anything else. Keys are read as base-94 fractions over the printable ASCII
//! range `'!'..='~'`; `'!'` is the zero digit. A valid key never ends in the
//! zero digit, which guarantees there is always room below it.

use crate::error::{Error, Result};

const ZERO: u8 = b'!';
const BASE: u8 = b'~' - b'!' + 1;

fn digits(key: &str) -> Result<Vec<u8>> {
    let bytes = key.as_bytes();
    if bytes.last() == Some(&ZERO) || bytes.iter().any(|b| !(ZERO..=b'~').contains(b)) {
        return Err(Error::InvalidKey(key.to_owned()));
    }
    Ok(bytes.iter().map(|b| b - ZERO).collect())
}

/// A key strictly between `lo` and `hi`. `None` bounds are open.
///
/// Fails with [`Error::KeyOrder`] when `lo >= hi` or when `hi` is the empty
/// string (nothing sorts below it), and with [`Error::InvalidKey`] for keys
/// outside the alphabet or ending in the zero digit.
pub fn key_between(lo: Option<&str>, hi: Option<&str>) -> Result<String> {
    let order_error = || Error::KeyOrder {
        lo: lo.map(str::to_owned),
        hi: hi.map(str::to_owned),
    };
    let a = digits(lo.unwrap_or(""))?;
    let b = match hi {
        Some(hi) => {
            let b = digits(hi)?;
            if b.is_empty() || lo.is_some_and(|lo| lo >= hi) {
                return Err(order_error());
            }
            Some(b)
        }
        None => None,
    };
    let mid = midpoint(&a, b.as_deref());
    Ok(mid.into_iter().map(|d| (d + ZERO) as char).collect())
}

/// Digits strictly between `a` and `b` (open above when `b` is `None`).
/// Requires `a < b`.
fn midpoint(a: &[u8], b: Option<&[u8]>) -> Vec<u8> {
    if let Some(b) = b {
        // Shared prefix, reading missing digits of `a` as zero.
        let shared = b
            .iter()
            .enumerate()
            .take_while(|(i, d)| a.get(*i).copied().unwrap_or(0) == **d)
            .count();
        if shared > 0 {
            let mut out = b[..shared].to_vec();
            out.extend(midpoint(a.get(shared..).unwrap_or(&[]), Some(&b[shared..])));
            return out;
        }
    }

    let low = a.first().copied().unwrap_or(0);
    let high = b.and_then(|b| b.first().copied()).unwrap_or(BASE);
    if high - low > 1 {
        return vec![(low + high) / 2];
    }
    // Adjacent digits: widen.
    if let Some(b) = b.filter(|b| b.len() > 1) {
        return vec![b[0]];
    }
    let mut out = vec![low];
    out.extend(midpoint(a.get(1..).unwrap_or(&[]), None));
    out
}
