//! Version-directory name comparison.
//!
//! Versions compare by dot-separated components: numeric pairs compare as
//! numbers, anything else compares lexicographically, and missing trailing
//! components count as zero, so `"2.0.0"` equals `"2"` and `"1.9"` sorts
//! before `"1.10"`.

use std::cmp::Ordering;

/// Three-way comparison of two version-directory names.
pub fn compare(l: &str, r: &str) -> Ordering {
    let mut lit = l.split('.');
    let mut rit = r.split('.');

    loop {
        match (lit.next(), rit.next()) {
            (Some(a), Some(b)) => {
                let ord = compare_components(a, b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            // The shorter version is equal if every remaining component of
            // the longer one is numeric zero, otherwise it sorts first.
            (Some(a), None) => {
                if !is_zero(a) || lit.any(|part| !is_zero(part)) {
                    return Ordering::Greater;
                }
                return Ordering::Equal;
            }
            (None, Some(b)) => {
                if !is_zero(b) || rit.any(|part| !is_zero(part)) {
                    return Ordering::Less;
                }
                return Ordering::Equal;
            }
            (None, None) => return Ordering::Equal,
        }
    }
}

/// `true` iff `l` sorts strictly before `r`.
pub fn version_less(l: &str, r: &str) -> bool {
    compare(l, r) == Ordering::Less
}

fn compare_components(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

fn is_zero(part: &str) -> bool {
    matches!(part.parse::<i64>(), Ok(0))
}
