//! Lexicographically ordered fractional index strings.
//!
//! A fractional index is a string whose lexicographic order stands in for a
//! position in a list: between any two indices another index can be
//! generated, so single elements can be inserted into or removed from an
//! ordered list without renumbering their neighbours. The top-K operator
//! annotates each element of a window with such an index and keeps the index
//! stable for as long as the element does not move.
//!
//! Indices are strings over a base-62 digit alphabet. The generator computes
//! a midpoint digit string strictly between its neighbours, extending the
//! string by one digit only when the neighbours are adjacent. Generated
//! indices never end in the smallest digit, which guarantees room below every
//! index.

use crate::error::{Error, Result};

const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Returns a string strictly between `left` and `right` lexicographically.
///
/// `None` stands for the corresponding end of the key space: no lower bound
/// on the left, no upper bound on the right. Both bounds given must satisfy
/// `left < right`; violations fail with [`Error::InternalInvariant`], since
/// the caller is expected to hand in neighbours from an ordered list.
pub fn key_between(left: Option<&str>, right: Option<&str>) -> Result<String> {
    if let Some(left) = left {
        validate(left)?;
    }
    if let (Some(left), Some(right)) = (left, right) {
        if left >= right {
            return Err(Error::InternalInvariant(format!(
                "fractional index bounds out of order: {left:?} >= {right:?}"
            )));
        }
    }
    if let Some(right) = right {
        validate(right)?;
    }
    let key = midpoint(left.unwrap_or(""), right);
    debug_assert!(left.map_or(true, |l| l < key.as_str()));
    debug_assert!(right.map_or(true, |r| key.as_str() < r));
    Ok(key)
}

/// A digit string strictly between `low` and `high`, where the empty string
/// is the least digit string and `None` is beyond all of them.
fn midpoint(low: &str, high: Option<&str>) -> String {
    if let Some(high) = high {
        // Shared prefixes carry over verbatim; the interesting digits are the
        // first ones that differ.
        let mut shared = 0;
        let low_bytes = low.as_bytes();
        let high_bytes = high.as_bytes();
        while high_bytes.get(shared) == Some(low_bytes.get(shared).unwrap_or(&DIGITS[0])) {
            shared += 1;
        }
        if shared > 0 {
            let rest = midpoint(low.get(shared..).unwrap_or(""), high.get(shared..));
            return format!("{}{}", &high[..shared], rest);
        }
    }

    let low_digit = low.as_bytes().first().map_or(0, |b| digit_of(*b));
    let high_digit = high.map_or(DIGITS.len(), |h| digit_of(h.as_bytes()[0]));

    if high_digit - low_digit > 1 {
        // Room at this position; take the middle digit.
        let mid = (low_digit + high_digit + 1) / 2;
        (DIGITS[mid] as char).to_string()
    } else {
        match high {
            // The bounds are adjacent at this digit but the upper bound
            // continues, so its first digit alone sits strictly between.
            Some(high) if high.len() > 1 => high[..1].to_string(),
            // Adjacent digits with nothing usable above: keep the lower digit
            // and recurse with the remainder of the lower bound, unbounded
            // above.
            _ => {
                let rest = midpoint(low.get(1..).unwrap_or(""), None);
                format!("{}{}", DIGITS[low_digit] as char, rest)
            }
        }
    }
}

fn digit_of(byte: u8) -> usize {
    DIGITS.iter().position(|d| *d == byte).expect("validated fractional index digit")
}

fn validate(key: &str) -> Result<()> {
    if key.is_empty()
        || key.bytes().any(|b| !DIGITS.contains(&b))
        || key.as_bytes().last() == Some(&DIGITS[0])
    {
        return Err(Error::InternalInvariant(format!("malformed fractional index: {key:?}")));
    }
    Ok(())
}
