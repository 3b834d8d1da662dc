use chrono::NaiveDate;

const NUMERIC_FORMATS: [&str; 6] = [
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y-%m-%d",
    "%d/%m/%y",
    "%d-%m-%y",
];

/// Parses a date from the closed list of formats seen on Indonesian tax
/// artifacts, including spelled-out Indonesian and English month names.
pub fn parse_flexible_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in NUMERIC_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    parse_spelled_month(trimmed)
}

/// Handles `1 Januari 2024`, `01 Jan 2024` and the English equivalents.
fn parse_spelled_month(text: &str) -> Option<NaiveDate> {
    let parts = text.split_whitespace().collect::<Vec<_>>();
    if parts.len() != 3 {
        return None;
    }
    let day: u32 = parts[0].parse().ok()?;
    let month = month_number(parts[1])?;
    let year: i32 = parts[2].parse().ok()?;
    if !(1000..=9999).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let month = match lower.as_str() {
        "jan" | "januari" | "january" => 1,
        "feb" | "februari" | "february" => 2,
        "mar" | "maret" | "march" => 3,
        "apr" | "april" => 4,
        "mei" | "may" => 5,
        "jun" | "juni" | "june" => 6,
        "jul" | "juli" | "july" => 7,
        "agu" | "aug" | "agustus" | "august" => 8,
        "sep" | "september" => 9,
        "okt" | "oct" | "oktober" | "october" => 10,
        "nov" | "november" => 11,
        "des" | "dec" | "desember" | "december" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn parses_numeric_formats() {
        assert_eq!(parse_flexible_date("10/03/2024"), Some(date(2024, 3, 10)));
        assert_eq!(parse_flexible_date("10-03-2024"), Some(date(2024, 3, 10)));
        assert_eq!(parse_flexible_date("10.03.2024"), Some(date(2024, 3, 10)));
        assert_eq!(parse_flexible_date("2024-03-10"), Some(date(2024, 3, 10)));
    }

    #[test]
    fn two_digit_years_land_in_the_2000s() {
        assert_eq!(parse_flexible_date("05/01/24"), Some(date(2024, 1, 5)));
    }

    #[test]
    fn parses_indonesian_month_names() {
        assert_eq!(parse_flexible_date("1 Januari 2024"), Some(date(2024, 1, 1)));
        assert_eq!(parse_flexible_date("17 Agustus 2023"), Some(date(2023, 8, 17)));
        assert_eq!(parse_flexible_date("5 Mei 2024"), Some(date(2024, 5, 5)));
        assert_eq!(parse_flexible_date("31 Des 2024"), Some(date(2024, 12, 31)));
    }

    #[test]
    fn parses_english_month_names() {
        assert_eq!(parse_flexible_date("01 Jan 2024"), Some(date(2024, 1, 1)));
        assert_eq!(parse_flexible_date("12 March 2024"), Some(date(2024, 3, 12)));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_flexible_date(""), None);
        assert_eq!(parse_flexible_date("SALDO AWAL"), None);
        assert_eq!(parse_flexible_date("32/13/2024"), None);
        assert_eq!(parse_flexible_date("1 Foo 2024"), None);
    }
}
