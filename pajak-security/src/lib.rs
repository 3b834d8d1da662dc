#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::sync::Arc;

use async_trait::async_trait;
use md5::Md5;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

mod filename;
mod pdf;

pub use crate::filename::sanitize_filename;
pub use crate::pdf::count_pdf_pages;

pub type SecurityResult<T> = Result<T, SecurityError>;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("scanner failure: {0}")]
    Scanner(String),
}

pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;
pub const DEFAULT_MAX_PDF_PAGES: usize = 30;

pub fn default_allowed_extensions() -> Vec<String> {
    ["pdf", "png", "jpg", "jpeg", "tiff", "bmp", "xlsx", "xls"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanVerdict {
    Clean,
    Infected,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirusScanOutcome {
    Clean,
    Infected { signature: String },
}

#[async_trait]
pub trait VirusScanner: Send + Sync {
    async fn scan(&self, payload: &[u8]) -> SecurityResult<VirusScanOutcome>;
}

/// Scanner used when AV integration is disabled by configuration.
#[derive(Default)]
pub struct DisabledVirusScanner;

#[async_trait]
impl VirusScanner for DisabledVirusScanner {
    async fn scan(&self, _payload: &[u8]) -> SecurityResult<VirusScanOutcome> {
        Ok(VirusScanOutcome::Clean)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub md5: String,
    pub sha256: String,
    pub mime_detected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub filename: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub virus_scan: ScanVerdict,
    pub file_info: FileInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_suggestion: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub max_file_size_bytes: u64,
    pub max_pdf_pages: usize,
    pub allowed_extensions: Vec<String>,
    pub enable_virus_scan: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_MB * 1024 * 1024,
            max_pdf_pages: DEFAULT_MAX_PDF_PAGES,
            allowed_extensions: default_allowed_extensions(),
            enable_virus_scan: false,
        }
    }
}

/// Validates one uploaded blob. Checks accumulate failures instead of
/// short-circuiting, except the size ceiling which stops further work.
pub struct FileSecurityValidator {
    config: ValidatorConfig,
    scanner: Arc<dyn VirusScanner>,
}

impl FileSecurityValidator {
    #[must_use]
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            scanner: Arc::new(DisabledVirusScanner),
        }
    }

    #[must_use]
    pub fn with_scanner(mut self, scanner: Arc<dyn VirusScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub async fn validate(
        &self,
        filename: &str,
        declared_mime: &str,
        payload: &[u8],
    ) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut split_suggestion = None;

        let mut file_info = FileInfo {
            md5: md5_hex(payload),
            sha256: sha256_hex(payload),
            mime_detected: String::new(),
            page_count: None,
            size_bytes: payload.len() as u64,
        };

        // (a) Size. An oversized payload is not inspected any further.
        if payload.len() as u64 > self.config.max_file_size_bytes {
            errors.push(format!(
                "file size ({:.2} MB) exceeds maximum allowed size ({} MB)",
                payload.len() as f64 / (1024.0 * 1024.0),
                self.config.max_file_size_bytes / (1024 * 1024),
            ));
            return ValidationReport {
                filename: filename.to_string(),
                valid: false,
                errors,
                warnings,
                virus_scan: ScanVerdict::Skipped,
                file_info,
                split_suggestion,
            };
        }

        // (b) Extension allowlist.
        let extension = file_extension(filename);
        if !self
            .config
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
        {
            errors.push(format!(
                "file extension '{extension}' not allowed; allowed extensions: {}",
                self.config.allowed_extensions.join(", ")
            ));
        }

        // (c) Sniffed MIME vs extension. Sniffing falls back to the
        // extension mapping when the payload is unrecognisable.
        let sniffed = sniff_mime(payload);
        let detected = sniffed.map(str::to_string).unwrap_or_else(|| {
            mime_guess::from_path(filename)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string()
        });
        file_info.mime_detected = detected.clone();
        if let Some(expected) = expected_mimes(&extension) {
            if sniffed.is_some() && !expected.contains(&detected.as_str()) {
                errors.push(format!(
                    "MIME type mismatch: detected {detected}, expected one of {}",
                    expected.join(", ")
                ));
            }
        }
        // The declared MIME is untrusted input; a disagreement with the
        // sniffed type is worth surfacing but is not a rejection on its own.
        if !declared_mime.trim().is_empty()
            && sniffed.is_some()
            && !declared_mime.eq_ignore_ascii_case(&detected)
        {
            warnings.push(format!(
                "declared MIME {declared_mime} does not match detected {detected}"
            ));
        }

        // (d) PDF page ceiling.
        if extension.eq_ignore_ascii_case("pdf") {
            match count_pdf_pages(payload) {
                Some(pages) => {
                    file_info.page_count = Some(pages);
                    if pages > self.config.max_pdf_pages {
                        let parts = pages.div_ceil(self.config.max_pdf_pages);
                        errors.push(format!(
                            "PDF has {pages} pages; maximum allowed is {}",
                            self.config.max_pdf_pages
                        ));
                        split_suggestion = Some(format!("Split into {parts} files"));
                    }
                }
                None => warnings.push("unable to determine PDF page count".to_string()),
            }
        }

        // (e) Optional AV scan.
        let virus_scan = if self.config.enable_virus_scan {
            match self.scanner.scan(payload).await {
                Ok(VirusScanOutcome::Clean) => ScanVerdict::Clean,
                Ok(VirusScanOutcome::Infected { signature }) => {
                    errors.push(format!("virus detected: {signature}"));
                    ScanVerdict::Infected
                }
                Err(err) => {
                    errors.push(format!("virus scanning failed: {err}"));
                    ScanVerdict::Infected
                }
            }
        } else {
            ScanVerdict::Skipped
        };

        // (f) Heuristics. These produce warnings, not hard failures, except
        // an empty payload which can never be processed.
        if payload.is_empty() {
            errors.push("file is empty".to_string());
        } else if payload.len() < 100 {
            warnings.push("file is unusually small".to_string());
        }
        if payload.len() >= 2 && payload[..payload.len().min(1024)].windows(2).any(|w| w == b"MZ")
        {
            warnings.push("file contains executable content signatures".to_string());
        }
        let head = &payload[..payload.len().min(10_000)];
        for marker in [
            b"<script".as_slice(),
            b"javascript:".as_slice(),
            b"vbscript:".as_slice(),
            b"<?php".as_slice(),
        ] {
            if contains_subslice_ignore_case(head, marker) {
                warnings.push("file contains script-like content".to_string());
                break;
            }
        }
        if filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
            || filename.chars().any(char::is_control)
        {
            warnings.push("filename contains suspicious characters".to_string());
        }

        ValidationReport {
            filename: filename.to_string(),
            valid: errors.is_empty(),
            errors,
            warnings,
            virus_scan,
            file_info,
            split_suggestion,
        }
    }
}

fn file_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn expected_mimes(extension: &str) -> Option<Vec<&'static str>> {
    let mimes: Vec<&'static str> = match extension {
        "pdf" => vec!["application/pdf"],
        "png" => vec!["image/png"],
        "jpg" | "jpeg" => vec!["image/jpeg"],
        "tiff" => vec!["image/tiff"],
        "bmp" => vec!["image/bmp", "image/x-ms-bmp"],
        "xlsx" => vec!["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"],
        "xls" => vec!["application/vnd.ms-excel", "application/msexcel"],
        _ => return None,
    };
    Some(mimes)
}

/// Magic-byte sniffing for the allowlisted formats. Returns None when the
/// payload matches none of them.
fn sniff_mime(payload: &[u8]) -> Option<&'static str> {
    if payload.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    if payload.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some("image/png");
    }
    if payload.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if payload.starts_with(b"II*\0") || payload.starts_with(b"MM\0*") {
        return Some("image/tiff");
    }
    if payload.starts_with(b"BM") {
        return Some("image/bmp");
    }
    if payload.starts_with(b"PK\x03\x04") {
        return Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet");
    }
    if payload.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return Some("application/vnd.ms-excel");
    }
    None
}

fn contains_subslice_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| {
        window
            .iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

pub fn md5_hex(payload: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

pub fn sha256_hex(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn validator() -> FileSecurityValidator {
        FileSecurityValidator::new(ValidatorConfig::default())
    }

    fn pdf_payload(pages: usize) -> Vec<u8> {
        let mut payload = b"%PDF-1.7\n".to_vec();
        for index in 0..pages {
            payload.extend_from_slice(
                format!("{} 0 obj << /Type /Page >> endobj\n", index + 10).as_bytes(),
            );
        }
        payload.extend_from_slice(b"trailer\n");
        // Pad past the small-file heuristic.
        payload.resize(payload.len().max(512), b' ');
        payload
    }

    #[tokio::test]
    async fn accepts_well_formed_pdf() {
        let report = validator()
            .validate("faktur.pdf", "application/pdf", &pdf_payload(3))
            .await;

        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.file_info.mime_detected, "application/pdf");
        assert_eq!(report.file_info.page_count, Some(3));
        assert_eq!(report.virus_scan, ScanVerdict::Skipped);
    }

    #[tokio::test]
    async fn oversized_file_short_circuits() {
        let config = ValidatorConfig {
            max_file_size_bytes: 16,
            ..ValidatorConfig::default()
        };
        let validator = FileSecurityValidator::new(config);
        let report = validator
            .validate("big.exe", "application/pdf", &[0u8; 64])
            .await;

        assert!(!report.valid);
        // Only the size error; the extension check never ran.
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("exceeds maximum"));
    }

    #[tokio::test]
    async fn rejects_disallowed_extension_and_mime_mismatch() {
        let report = validator()
            .validate("payload.exe", "application/pdf", b"MZ executable body here")
            .await;

        assert!(!report.valid);
        assert!(report.errors.iter().any(|err| err.contains("not allowed")));
        assert!(
            report
                .warnings
                .iter()
                .any(|warning| warning.contains("executable"))
        );
    }

    #[tokio::test]
    async fn mismatched_magic_bytes_fail_mime_check() {
        let mut payload = vec![0x89, b'P', b'N', b'G'];
        payload.resize(256, 0);
        let report = validator()
            .validate("statement.pdf", "application/pdf", &payload)
            .await;

        assert!(!report.valid);
        assert!(
            report
                .errors
                .iter()
                .any(|err| err.contains("MIME type mismatch"))
        );
    }

    #[tokio::test]
    async fn pdf_over_page_ceiling_suggests_split() {
        let config = ValidatorConfig {
            max_pdf_pages: 30,
            ..ValidatorConfig::default()
        };
        let validator = FileSecurityValidator::new(config);
        let report = validator
            .validate("rekening.pdf", "application/pdf", &pdf_payload(75))
            .await;

        assert!(!report.valid);
        assert_eq!(report.file_info.page_count, Some(75));
        assert_eq!(report.split_suggestion.as_deref(), Some("Split into 3 files"));
    }

    #[tokio::test]
    async fn empty_payload_is_rejected() {
        let report = validator().validate("empty.png", "image/png", &[]).await;
        assert!(!report.valid);
        assert!(report.errors.iter().any(|err| err.contains("empty")));
    }

    #[tokio::test]
    async fn infected_payload_fails_when_scanning_enabled() {
        struct MatchingScanner;

        #[async_trait]
        impl VirusScanner for MatchingScanner {
            async fn scan(&self, payload: &[u8]) -> SecurityResult<VirusScanOutcome> {
                if payload.starts_with(b"EICAR") {
                    Ok(VirusScanOutcome::Infected {
                        signature: "Eicar-Test-Signature".into(),
                    })
                } else {
                    Ok(VirusScanOutcome::Clean)
                }
            }
        }

        let config = ValidatorConfig {
            enable_virus_scan: true,
            ..ValidatorConfig::default()
        };
        let validator =
            FileSecurityValidator::new(config).with_scanner(Arc::new(MatchingScanner));

        let mut payload = b"EICAR".to_vec();
        payload.extend_from_slice(&[0x89, b'P', b'N', b'G']);
        payload.resize(256, 0);
        let report = validator.validate("sample.png", "image/png", &payload).await;

        assert_eq!(report.virus_scan, ScanVerdict::Infected);
        assert!(report.errors.iter().any(|err| err.contains("virus")));
    }

    #[test]
    fn checksums_match_known_vectors() {
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
