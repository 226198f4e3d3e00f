//! Float formatting shared by every progress frame, so one frame never mixes spellings of the same value.
//!
//! Non-finite values are always spelled `nan`, `inf` and `-inf`, and exponents are always signed with at least two digits.

/// Format `value` with `precision` digits after the decimal point, e.g. `0.450000`
pub fn format_fixed(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return non_finite(value);
    }
    format!("{:.*}", precision, value)
}

/// Format `value` in scientific notation with `precision` digits after the decimal point and an explicitly signed,
/// at-least-two-digit exponent, e.g. `1.00e-03`.
pub fn format_scientific(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return non_finite(value);
    }
    pad_exponent(&format!("{:.*e}", precision, value))
}

/// Format `value` as the shortest text that reads back as the same float. Whole numbers keep a trailing `.0`,
/// and very large or small magnitudes switch to scientific notation, e.g. `1e-05`.
pub fn format_shortest(value: f64) -> String {
    if !value.is_finite() {
        return non_finite(value);
    }
    pad_exponent(&format!("{:?}", value))
}

fn non_finite(value: f64) -> String {
    format!("{}", value).to_lowercase()
}

fn pad_exponent(formatted: &str) -> String {
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => formatted.to_string(),
    }
}
