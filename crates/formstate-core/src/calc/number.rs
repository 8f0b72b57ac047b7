//! Locale-aware number parsing and result formatting.

/// Display strings for non-finite results.
pub const SENTINEL_NAN: &str = "NaN";
pub const SENTINEL_POS_INF: &str = "∞";
pub const SENTINEL_NEG_INF: &str = "-∞";

/// Fractional digits kept when a calculation declares no `digits`.
const DEFAULT_FRACTION_DIGITS: usize = 12;

/// Parse a user-entered number using `delimiter` as decimal separator.
///
/// Accepts an optional sign, digits, one decimal delimiter and an optional
/// exponent. Everything else (grouping characters, the other delimiter,
/// `inf`/`nan` spellings) fails.
pub fn parse_localized(input: &str, delimiter: char) -> Option<f64> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    let other = if delimiter == '.' { ',' } else { '.' };
    if s.contains(other) {
        return None;
    }
    let normalized: String = s.chars().map(|c| if c == delimiter { '.' } else { c }).collect();
    if !normalized
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    if !normalized.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// True for the display strings of non-finite results.
pub fn is_sentinel(value: &str) -> bool {
    matches!(value, SENTINEL_NAN | SENTINEL_POS_INF | SENTINEL_NEG_INF)
}

/// Format a calculation result for display.
pub fn format_result(value: f64, digits: Option<u32>, delimiter: char) -> String {
    if value.is_nan() {
        return SENTINEL_NAN.to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            SENTINEL_POS_INF.to_string()
        } else {
            SENTINEL_NEG_INF.to_string()
        };
    }

    let mut s = match digits {
        Some(d) => format!("{:.*}", d as usize, value),
        None => {
            let mut s = format!("{:.*}", DEFAULT_FRACTION_DIGITS, value);
            if s.contains('.') {
                while s.ends_with('0') {
                    s.pop();
                }
                if s.ends_with('.') {
                    s.pop();
                }
            }
            s
        }
    };

    if s.starts_with('-') && s[1..].chars().all(|c| c == '0' || c == '.') {
        s.remove(0);
    }
    if delimiter != '.' {
        s = s.replace('.', &delimiter.to_string());
    }
    s
}
