//! Ordering of loosely structured version names such as `web-17-1df06f1` or `v1.2.3`
//!
//! Names are compared by their embedded runs of decimal digits, position by
//! position. Everything that is not a digit is ignored.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

/// Every maximal digit run in `v`, left to right, with leading zeros stripped
pub fn extract_numbers(v: &str) -> Vec<&str> {
    DIGIT_RUN
        .find_iter(v)
        .map(|m| {
            let trimmed = m.as_str().trim_start_matches('0');
            if trimmed.is_empty() {
                "0"
            } else {
                trimmed
            }
        })
        .collect()
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Returns true if `a` is older than `b`.
///
/// The first position where the numbers differ decides. When one sequence is a
/// prefix of the other no position decides and the result is `false`, so
/// `"1.2.3"` vs `"1.2"` is "not less than" in either direction.
pub fn version_less_than(a: &str, b: &str) -> bool {
    let xa = extract_numbers(a);
    let xb = extract_numbers(b);

    for (na, nb) in xa.iter().zip(xb.iter()) {
        match compare_numbers(na, nb) {
            Ordering::Equal => continue,
            Ordering::Less => return true,
            Ordering::Greater => return false,
        }
    }

    false
}

/// Greatest non-empty name according to [`version_less_than`]
pub fn find_latest_version<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter(|name| !name.is_empty())
        .fold(None, |latest, name| match latest {
            Some(current) if !version_less_than(current, name) => Some(current),
            _ => Some(name),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_less_than() {
        let table = [
            ("1", "1", false),
            ("2", "1", false),
            ("1", "2", true),
            ("v1.2.3", "v1.2.3", false),
            ("v1.2.3", "v1.3.3", true),
            ("v1.2.3", "v1.2.4", true),
            ("v1.2.3", "v2.2.3", true),
            ("instance-12", "instance-12", false),
            ("instance-12", "instance-11", false),
            ("instance-12", "instance-13", true),
            ("1.1", "2", true),
            ("1.2.3", "2", true),
            ("2", "1.1", false),
            ("2", "1.2.3", false),
            ("instance-9-14be32d", "instance-17-1df06f1", true),
        ];

        for (a, b, expect) in table {
            assert_eq!(version_less_than(a, b), expect, "{} < {}", a, b);
        }
    }

    #[test]
    fn test_prefix_is_not_less_in_either_direction() {
        assert!(!version_less_than("1.2", "1.2.3"));
        assert!(!version_less_than("1.2.3", "1.2"));
        assert!(!version_less_than("web", "web-3"));
    }

    #[test]
    fn test_large_numbers_do_not_overflow() {
        assert!(version_less_than(
            "build-99999999999999999999999",
            "build-100000000000000000000000"
        ));
        assert!(version_less_than("web-009", "web-10"));
    }

    #[test]
    fn test_extract_numbers() {
        let table: [(&str, &[&str]); 12] = [
            ("123", &["123"]),
            ("abc-123", &["123"]),
            ("abc-123-def", &["123"]),
            ("abc-123-def-456", &["123", "456"]),
            ("v1.2.3", &["1", "2", "3"]),
            ("v.1.2.3", &["1", "2", "3"]),
            ("1/2/3", &["1", "2", "3"]),
            ("1_2_3", &["1", "2", "3"]),
            ("01_02_03", &["1", "2", "3"]),
            ("+1", &["1"]),
            ("-0", &["0"]),
            ("no-digits", &[]),
        ];

        for (input, expect) in table {
            assert_eq!(extract_numbers(input), expect.to_vec(), "{}", input);
        }
    }

    #[test]
    fn test_find_latest_version() {
        assert_eq!(find_latest_version(Vec::<&str>::new()), None);
        assert_eq!(find_latest_version(["", ""]), None);
        assert_eq!(
            find_latest_version(["abc-5", "abc-6", "abc-8", "abc-3"]),
            Some("abc-8")
        );
        assert_eq!(find_latest_version(["web-9", "", "web-10"]), Some("web-10"));
    }
}
