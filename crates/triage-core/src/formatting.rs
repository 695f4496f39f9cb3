use crate::normalize::Age;

/// Text written for `true` flags in exported tables; `false` is blank.
pub const FLAG_TRUE: &str = "YES";

/// Render a boolean column the way the exports do: `"YES"` or empty.
pub fn format_flag(value: bool) -> &'static str {
    if value {
        FLAG_TRUE
    } else {
        ""
    }
}

/// Format a count with thousands separators.
///
/// # Examples
///
/// ```
/// use triage_core::formatting::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1234), "1,234");
/// assert_eq!(format_count(1234567), "1,234,567");
/// ```
pub fn format_count(value: usize) -> String {
    group_thousands(&value.to_string())
}

/// Format an age for console output: `"12d"` or `"unknown"`.
pub fn format_age(age: Age) -> String {
    match age {
        Age::Days(d) => format!("{}d", d),
        Age::Unknown => "unknown".to_string(),
    }
}

/// Insert `,` every three digits from the right.
fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
