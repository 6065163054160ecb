//! Text normalization helpers shared by the field extractors.

/// Collapse all whitespace runs to single spaces and trim.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse the numeric content of a rendered money/figure string.
///
/// Everything except ASCII digits and the decimal separator is stripped
/// before parsing, so `"$1,234 goal"` yields `1234.0`. When more than one
/// `.` survives, all but the last are treated as grouping separators.
/// A string with no digits yields `None`, never zero and never a panic.
pub fn digits_f64(s: &str) -> Option<f64> {
    let kept: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if !kept.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    let dots = kept.matches('.').count();
    let normalized = if dots > 1 {
        let last = kept.rfind('.').unwrap();
        kept.char_indices()
            .filter(|(i, c)| *c != '.' || *i == last)
            .map(|(_, c)| c)
            .collect()
    } else {
        kept
    };

    normalized.parse::<f64>().ok()
}

/// Parse the digit content of a count string as an integer.
/// `"1,234 backers"` yields `1234`; a digit-free string yields `None`.
pub fn digits_i64(s: &str) -> Option<i64> {
    let kept: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if kept.is_empty() {
        return None;
    }
    kept.parse::<i64>().ok()
}

/// Remove digits (and any extra characters) from a string, then trim.
/// Used to isolate a currency symbol from a rendered amount.
pub fn strip_digits(s: &str, extra: &[char]) -> String {
    s.chars()
        .filter(|c| !c.is_ascii_digit() && !extra.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_with_label() {
        assert_eq!(digits_f64("$1,234 goal"), Some(1234.0));
        assert_eq!(digits_f64("$2,500 pledged"), Some(2500.0));
    }

    #[test]
    fn money_with_decimals() {
        assert_eq!(digits_f64("£12.50"), Some(12.5));
    }

    #[test]
    fn grouping_dots_keep_last_as_decimal() {
        assert_eq!(digits_f64("US$ 1.234.56"), Some(1234.56));
    }

    #[test]
    fn no_digits_is_missing_not_zero() {
        assert_eq!(digits_f64("no digits here"), None);
        assert_eq!(digits_f64(""), None);
        assert_eq!(digits_i64("Reward no longer available"), None);
    }

    #[test]
    fn count_strips_grouping() {
        assert_eq!(digits_i64("1,234 backers"), Some(1234));
        assert_eq!(digits_i64("45"), Some(45));
    }

    #[test]
    fn count_concatenates_all_digit_runs() {
        // Same behavior as the digit-join this replaces: callers that want a
        // specific token split it out first (see the reward limit badge).
        assert_eq!(digits_i64("45 left of 100"), Some(45100));
    }

    #[test]
    fn symbol_isolation() {
        assert_eq!(strip_digits("US$ 1,234.56", &[',', '.']), "US$");
        assert_eq!(strip_digits("£602,874", &[',', '.']), "£");
    }

    #[test]
    fn whitespace_collapse() {
        assert_eq!(clean_text("  a \n\t b  "), "a b");
    }
}
