//! Lenient monetary parsing for OCR output. Amounts are carried as i64
//! minor units (hundredths); the two wire notations are the Indonesian
//! `1.000.000,00` and the US `1,000,000.00`, disambiguated by which
//! separator appears last.

/// Parses an amount string into minor units. Returns None for empty cells,
/// dashes and text that carries no digits.
pub fn parse_amount_minor(text: &str) -> Option<i64> {
    let mut cleaned = text.trim().to_string();
    if cleaned.is_empty() || cleaned == "-" || cleaned.eq_ignore_ascii_case("n/a") {
        return None;
    }

    for symbol in ["Rp", "IDR", "$", "€", "£", "¥"] {
        cleaned = cleaned.replace(symbol, "");
    }
    cleaned.retain(|ch| !ch.is_whitespace());

    let mut negative = false;
    if cleaned.starts_with('(') && cleaned.ends_with(')') {
        negative = true;
        cleaned = cleaned
            .trim_start_matches('(')
            .trim_end_matches(')')
            .to_string();
    }
    if let Some(rest) = cleaned.strip_prefix('-') {
        negative = true;
        cleaned = rest.to_string();
    }
    if let Some(rest) = cleaned.strip_prefix('+') {
        cleaned = rest.to_string();
    }
    // Trailing D/C markers sometimes survive cell splitting.
    for marker in ["CR", "DB", "DR", "cr", "db", "dr"] {
        if let Some(rest) = cleaned.strip_suffix(marker) {
            cleaned = rest.to_string();
            break;
        }
    }

    if cleaned.is_empty() || !cleaned.chars().any(|ch| ch.is_ascii_digit()) {
        return None;
    }

    let normalized = normalize_separators(&cleaned);
    let (integer_part, fraction_part) = match normalized.split_once('.') {
        Some((int, frac)) => (int.to_string(), frac.to_string()),
        None => (normalized, String::new()),
    };

    let integer_digits = integer_part
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    let integer: i64 = if integer_digits.is_empty() {
        0
    } else {
        integer_digits.parse().ok()?
    };

    let fraction_digits = fraction_part
        .chars()
        .filter(char::is_ascii_digit)
        .take(2)
        .collect::<String>();
    let fraction: i64 = match fraction_digits.len() {
        0 => 0,
        1 => fraction_digits.parse::<i64>().ok()? * 10,
        _ => fraction_digits.parse().ok()?,
    };

    let amount = integer.checked_mul(100)?.checked_add(fraction)?;
    Some(if negative { -amount } else { amount })
}

/// Rewrites the string so that `.` is the decimal separator and no grouping
/// separators remain.
fn normalize_separators(value: &str) -> String {
    let has_comma = value.contains(',');
    let has_dot = value.contains('.');

    if has_comma && has_dot {
        let last_comma = value.rfind(',').unwrap_or(0);
        let last_dot = value.rfind('.').unwrap_or(0);
        if last_comma > last_dot {
            // Indonesian: dots group, comma is decimal.
            value.replace('.', "").replace(',', ".")
        } else {
            // US: commas group, dot is decimal.
            value.replace(',', "")
        }
    } else if has_comma {
        // A single comma with fewer than three trailing digits is a
        // decimal separator; anything else is grouping.
        let digits_after = value.rfind(',').map(|pos| value.len() - pos - 1);
        if value.matches(',').count() == 1 && digits_after.is_some_and(|digits| digits < 3) {
            value.replace(',', ".")
        } else {
            value.replace(',', "")
        }
    } else if has_dot {
        // Mirrored rule: a single dot stays decimal only with fewer than
        // three trailing digits.
        let digits_after = value.rfind('.').map(|pos| value.len() - pos - 1);
        if value.matches('.').count() == 1 && digits_after.is_some_and(|digits| digits < 3) {
            value.to_string()
        } else {
            value.replace('.', "")
        }
    } else {
        value.to_string()
    }
}

/// Formats minor units in Indonesian notation, e.g. `1.000.000,00`.
#[must_use]
pub fn format_amount_id(minor: i64) -> String {
    format_grouped(minor, '.', ',')
}

/// Formats minor units in US notation, e.g. `1,000,000.00`.
#[must_use]
pub fn format_amount_us(minor: i64) -> String {
    format_grouped(minor, ',', '.')
}

fn format_grouped(minor: i64, group: char, decimal: char) -> String {
    let negative = minor < 0;
    let absolute = minor.unsigned_abs();
    let integer = absolute / 100;
    let fraction = absolute % 100;

    let digits = integer.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index).is_multiple_of(3) {
            grouped.push(group);
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}{grouped}{decimal}{fraction:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_indonesian_notation() {
        assert_eq!(parse_amount_minor("1.000.000,00"), Some(100_000_000));
        assert_eq!(parse_amount_minor("Rp 2.500.000"), Some(250_000_000));
        assert_eq!(parse_amount_minor("1000,50"), Some(100_050));
    }

    #[test]
    fn parses_us_notation() {
        assert_eq!(parse_amount_minor("1,000,000.00"), Some(100_000_000));
        assert_eq!(parse_amount_minor("1,000"), Some(100_000));
        assert_eq!(parse_amount_minor("1000.50"), Some(100_050));
    }

    #[test]
    fn single_dot_with_three_digits_is_grouping() {
        assert_eq!(parse_amount_minor("1.000"), Some(100_000));
        assert_eq!(parse_amount_minor("110.000"), Some(11_000_000));
    }

    #[test]
    fn separator_rules_use_the_three_digit_boundary() {
        // Four trailing digits after a dot: grouping, not a decimal.
        assert_eq!(parse_amount_minor("1.5000"), Some(1_500_000));
        // One trailing digit after a comma: decimal, not grouping.
        assert_eq!(parse_amount_minor("1000,5"), Some(100_050));
        assert_eq!(parse_amount_minor("1000.5"), Some(100_050));
        // Four trailing digits after a comma: grouping.
        assert_eq!(parse_amount_minor("1,0000"), Some(1_000_000));
    }

    #[test]
    fn parenthesised_and_signed_amounts_are_negative() {
        assert_eq!(parse_amount_minor("(1.000.000,00)"), Some(-100_000_000));
        assert_eq!(parse_amount_minor("-500,00"), Some(-50_000));
    }

    #[test]
    fn empty_cells_are_none() {
        assert_eq!(parse_amount_minor(""), None);
        assert_eq!(parse_amount_minor("-"), None);
        assert_eq!(parse_amount_minor("N/A"), None);
        assert_eq!(parse_amount_minor("Rp "), None);
    }

    #[test]
    fn trailing_markers_are_stripped() {
        assert_eq!(parse_amount_minor("1.000.000,00 CR"), Some(100_000_000));
    }

    #[test]
    fn formats_both_notations() {
        assert_eq!(format_amount_id(100_000_000), "1.000.000,00");
        assert_eq!(format_amount_us(100_000_000), "1,000,000.00");
        assert_eq!(format_amount_id(-12_345), "-123,45");
        assert_eq!(format_amount_us(50), "0.50");
    }

    #[test]
    fn format_then_parse_round_trips() {
        let samples: [i64; 8] = [
            0,
            50,
            100,
            123_456,
            100_000_000,
            987_654_321_09,
            10_i64.pow(12),
            10_i64.pow(14) + 7,
        ];
        for minor in samples {
            assert_eq!(
                parse_amount_minor(&format_amount_id(minor)),
                Some(minor),
                "indonesian round trip for {minor}"
            );
            assert_eq!(
                parse_amount_minor(&format_amount_us(minor)),
                Some(minor),
                "us round trip for {minor}"
            );
        }
    }
}
