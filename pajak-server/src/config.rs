use std::env;
use std::path::PathBuf;

use pajak_security::DEFAULT_MAX_FILE_SIZE_MB;
use pajak_security::DEFAULT_MAX_PDF_PAGES;
use pajak_security::default_allowed_extensions;

/// Runtime configuration, read once from the environment at boot.
/// Provider credentials are opaque strings; their presence gates the
/// corresponding code path.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub upload_dir: PathBuf,
    pub results_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub max_file_size_mb: u64,
    pub max_pdf_pages_per_file: usize,
    pub allowed_extensions: Vec<String>,
    pub enable_virus_scan: bool,
    pub cors_origins: Vec<String>,
    pub environment: String,
    pub max_batch_files: usize,
    pub use_smart_mapper: bool,
    pub hybrid_bank: bool,
    pub ocr_endpoint: Option<String>,
    pub ocr_api_key: Option<String>,
    pub ocr_local_command: Option<String>,
    pub mapper_endpoint: Option<String>,
    pub mapper_api_key: Option<String>,
    pub mapper_model: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_address: var_or("PAJAK_BIND", "127.0.0.1:8000"),
            upload_dir: PathBuf::from(var_or("PAJAK_UPLOAD_DIR", "data/uploads")),
            results_dir: PathBuf::from(var_or("PAJAK_RESULTS_DIR", "data/results")),
            exports_dir: PathBuf::from(var_or("PAJAK_EXPORTS_DIR", "data/exports")),
            max_file_size_mb: parse_or("PAJAK_MAX_FILE_SIZE_MB", DEFAULT_MAX_FILE_SIZE_MB),
            max_pdf_pages_per_file: parse_or("PAJAK_MAX_PDF_PAGES", DEFAULT_MAX_PDF_PAGES),
            allowed_extensions: list_or("PAJAK_ALLOWED_EXTENSIONS", default_allowed_extensions()),
            enable_virus_scan: bool_or("PAJAK_ENABLE_VIRUS_SCAN", false),
            cors_origins: list_or("PAJAK_CORS_ORIGINS", Vec::new()),
            environment: var_or("PAJAK_ENVIRONMENT", "development"),
            max_batch_files: parse_or(
                "PAJAK_MAX_BATCH_FILES",
                pajak_pipeline::DEFAULT_MAX_BATCH_FILES,
            ),
            use_smart_mapper: bool_or("PAJAK_USE_SMART_MAPPER", true),
            hybrid_bank: bool_or("PAJAK_HYBRID_BANK", true),
            ocr_endpoint: non_empty("PAJAK_OCR_ENDPOINT"),
            ocr_api_key: non_empty("PAJAK_OCR_API_KEY"),
            ocr_local_command: non_empty("PAJAK_OCR_COMMAND"),
            mapper_endpoint: non_empty("PAJAK_MAPPER_ENDPOINT"),
            mapper_api_key: non_empty("PAJAK_MAPPER_API_KEY"),
            mapper_model: var_or("PAJAK_MAPPER_MODEL", "default"),
        }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn bool_or(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn list_or(name: &str, default: Vec<String>) -> Vec<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        _ => default,
    }
}
