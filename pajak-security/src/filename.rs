use crate::SecurityError;
use crate::SecurityResult;

const RESERVED_WINDOWS_STEMS: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const MAX_FILENAME_BYTES: usize = 255;

/// Produces a filesystem-safe name: no traversal, no separators, no control
/// characters, no reserved Windows stems, at most 255 bytes with the
/// extension preserved.
pub fn sanitize_filename(filename: &str) -> SecurityResult<String> {
    if filename.trim().is_empty() {
        return Err(SecurityError::Validation("filename cannot be empty".into()));
    }

    let mut name = filename.replace("../", "").replace("..\\", "");
    name.retain(|ch| ch != '/' && ch != '\\' && ch != '\0' && !ch.is_control());

    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (name.clone(), None),
    };

    let clean_stem = stem
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == ' ' || ch == '.' || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let clean_ext = extension.map(|ext| {
        ext.chars()
            .filter(|ch| ch.is_alphanumeric() || *ch == '_')
            .collect::<String>()
    });

    let mut sanitized = match &clean_ext {
        Some(ext) if !ext.is_empty() => format!("{clean_stem}.{ext}"),
        _ => clean_stem,
    };
    sanitized = sanitized.trim_matches(|ch| ch == '.' || ch == ' ').to_string();

    if sanitized.is_empty() {
        return Err(SecurityError::Validation(format!(
            "filename {filename:?} sanitizes to nothing"
        )));
    }
    sanitized = sanitized.replace("..", "_");

    let stem_upper = sanitized
        .split('.')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    if RESERVED_WINDOWS_STEMS.contains(&stem_upper.as_str()) {
        return Err(SecurityError::Validation(format!(
            "filename {sanitized:?} uses a reserved name"
        )));
    }

    if sanitized.len() > MAX_FILENAME_BYTES {
        sanitized = clamp_preserving_extension(&sanitized);
    }

    Ok(sanitized)
}

fn clamp_preserving_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => {
            let budget = MAX_FILENAME_BYTES.saturating_sub(ext.len() + 1);
            let clamped = truncate_at_char_boundary(stem, budget);
            format!("{clamped}.{ext}")
        }
        _ => truncate_at_char_boundary(name, MAX_FILENAME_BYTES).to_string(),
    }
}

fn truncate_at_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_path_traversal() {
        let name = sanitize_filename("../../etc/passwd").expect("sanitize");
        assert!(!name.contains(".."));
        assert!(!name.contains('/'));
        assert_eq!(name, "etcpasswd");
    }

    #[test]
    fn strips_backslash_traversal_and_control_chars() {
        let name = sanitize_filename("..\\boot\\fak\x00tur\x07.pdf").expect("sanitize");
        assert!(!name.contains('\\'));
        assert!(!name.chars().any(char::is_control));
        assert_eq!(name, "bootfaktur.pdf");
    }

    #[test]
    fn replaces_special_characters_in_stem() {
        let name = sanitize_filename("faktur<pajak>*2024?.pdf").expect("sanitize");
        assert_eq!(name, "faktur_pajak__2024_.pdf");
    }

    #[test]
    fn rejects_reserved_windows_names() {
        for candidate in ["CON.pdf", "con.pdf", "LPT1.png", "nul"] {
            let err = sanitize_filename(candidate).unwrap_err();
            assert!(matches!(err, SecurityError::Validation(_)), "{candidate}");
        }
    }

    #[test]
    fn clamps_long_names_preserving_extension() {
        let long = format!("{}.pdf", "a".repeat(400));
        let name = sanitize_filename(&long).expect("sanitize");
        assert!(name.len() <= 255);
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn rejects_names_that_sanitize_to_nothing() {
        for candidate in ["", "   ", "...", "///"] {
            assert!(sanitize_filename(candidate).is_err(), "{candidate:?}");
        }
    }

    #[test]
    fn leaves_ordinary_names_alone() {
        assert_eq!(
            sanitize_filename("Rekening Koran Maret 2024.pdf").expect("sanitize"),
            "Rekening Koran Maret 2024.pdf"
        );
    }
}
