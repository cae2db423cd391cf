//! Package version ordering, as pacman's `vercmp` defines it.
//!
//! A full version is `[epoch:]pkgver[-pkgrel]`. Epochs compare first
//! (missing means `0`), then the version, then the release when both sides
//! carry one. Version strings are compared segment by segment: runs of
//! digits numerically, runs of letters lexically, and a numeric segment is
//! always newer than an alphabetic one (`1.0a` < `1.0.1`, `1.0rc1` < `1.0`).

use std::cmp::Ordering;

/// Compare two full versions.
pub fn vercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let (epoch_a, ver_a, rel_a) = split_evr(a);
    let (epoch_b, ver_b, rel_b) = split_evr(b);

    segment_cmp(epoch_a, epoch_b)
        .then_with(|| segment_cmp(ver_a, ver_b))
        .then_with(|| match (rel_a, rel_b) {
            (Some(x), Some(y)) => segment_cmp(x, y),
            _ => Ordering::Equal,
        })
}

/// Split `epoch:version-release`. The release is whatever follows the last
/// `-`.
fn split_evr(full: &str) -> (&str, &str, Option<&str>) {
    let (epoch, rest) = match full.split_once(':') {
        Some((epoch, rest)) if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) => (epoch, rest),
        _ => ("0", full),
    };
    match rest.rsplit_once('-') {
        Some((version, release)) => (epoch, version, Some(release)),
        None => (epoch, rest, None),
    }
}

fn segment_cmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        let (start_i, start_j) = (i, j);
        while i < a.len() && !a[i].is_ascii_alphanumeric() {
            i += 1;
        }
        while j < b.len() && !b[j].is_ascii_alphanumeric() {
            j += 1;
        }
        if i >= a.len() || j >= b.len() {
            break;
        }
        // More separators wins: `1.0..1` > `1.0.1`.
        let (sep_a, sep_b) = (i - start_i, j - start_j);
        if sep_a != sep_b {
            return sep_a.cmp(&sep_b);
        }

        let numeric = a[i].is_ascii_digit();
        let take = |s: &[u8], mut k: usize| {
            while k < s.len()
                && (if numeric {
                    s[k].is_ascii_digit()
                } else {
                    s[k].is_ascii_alphabetic()
                })
            {
                k += 1;
            }
            k
        };
        let end_i = take(a, i);
        let end_j = take(b, j);

        // Segments of different types.
        if end_j == j {
            return if numeric { Ordering::Greater } else { Ordering::Less };
        }

        let seg_a = &a[i..end_i];
        let seg_b = &b[j..end_j];
        let ordering = if numeric {
            let seg_a = trim_zeros(seg_a);
            let seg_b = trim_zeros(seg_b);
            seg_a.len().cmp(&seg_b.len()).then_with(|| seg_a.cmp(seg_b))
        } else {
            seg_a.cmp(seg_b)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
        i = end_i;
        j = end_j;
    }

    let rest_a = &a[i..];
    let rest_b = &b[j..];
    if rest_a.is_empty() && rest_b.is_empty() {
        return Ordering::Equal;
    }
    // A trailing alphabetic segment never beats the end of the string.
    let b_alpha = rest_b.first().is_some_and(u8::is_ascii_alphabetic);
    let a_alpha = rest_a.first().is_some_and(u8::is_ascii_alphabetic);
    if (rest_a.is_empty() && !b_alpha) || a_alpha {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

fn trim_zeros(digits: &[u8]) -> &[u8] {
    let start = digits.iter().position(|&d| d != b'0').unwrap_or(digits.len());
    &digits[start..]
}
