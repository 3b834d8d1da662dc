#![deny(clippy::print_stdout, clippy::print_stderr)]

use chrono::NaiveDate;
use pajak_ocr::Table;
use pajak_ocr::TableRow;
use pajak_parsers::parse_amount_minor;
use regex_lite::Regex;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub mod adapters;
mod detector;
mod hybrid;
mod rule_based;
mod validator;

pub use crate::detector::BankDetector;
pub use crate::hybrid::BankReport;
pub use crate::hybrid::HybridBankProcessor;
pub use crate::hybrid::HybridConfig;
pub use crate::rule_based::ParsedTransaction;
pub use crate::rule_based::ParseStatistics;
pub use crate::rule_based::RuleBasedParser;
pub use crate::validator::Chunk;
pub use crate::validator::ChunkTransaction;
pub use crate::validator::ChunkValidation;
pub use crate::validator::ProgressiveValidator;
pub use crate::validator::ValidationOutcome;
pub use crate::validator::ValidationStats;
pub use crate::validator::chunk_by_saldo_context;

pub type BankResult<T> = Result<T, BankError>;

#[derive(Debug, Error)]
pub enum BankError {
    #[error("bank not detected")]
    BankNotDetected,
    #[error("invalid statement: {0}")]
    Invalid(String),
    #[error("mapper fallback failed: {0}")]
    MapperFallback(String),
}

/// The single transaction schema every bank layout is normalized into.
/// Amounts are minor units; sign lives in the debit/credit split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardizedTransaction {
    pub transaction_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posting_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    pub description: String,
    #[serde(default)]
    pub transaction_type: String,
    #[serde(default)]
    pub reference_number: String,
    pub debit_minor: i64,
    pub credit_minor: i64,
    pub balance_minor: i64,
    pub bank_name: String,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub account_holder: String,
    #[serde(default)]
    pub raw_data: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
}

/// Adapter contract. One value per supported statement layout; selection is
/// the ordered list in [`BankDetector`].
pub trait BankAdapter: Send + Sync {
    fn bank_name(&self) -> &'static str;

    fn bank_code(&self) -> &'static str;

    fn keywords(&self) -> &'static [&'static str];

    fn detect(&self, text: &str) -> bool {
        let upper = text.to_uppercase();
        self.keywords()
            .iter()
            .any(|keyword| upper.contains(&keyword.to_uppercase()))
    }

    fn extract_account_info(&self, text: &str) -> AccountInfo {
        AccountInfo {
            bank_name: self.bank_name().to_string(),
            account_number: extract_account_number(text),
            account_holder: extract_account_holder(text),
        }
    }

    /// Parses table rows when present; otherwise the adapter falls back to
    /// its own line-oriented regex over the raw text. Fallback output is
    /// untrusted until the progressive validator has run over it.
    fn parse(&self, text: &str, tables: &[Table]) -> Vec<StandardizedTransaction>;
}

/// Detector-routed normalization: the first adapter whose keywords match
/// owns the statement. No adapter matching is a hard error; callers fall
/// back to the mapper-driven flow instead of guessing a layout.
pub fn normalize_statement(
    text: &str,
    tables: &[Table],
) -> BankResult<(AccountInfo, Vec<StandardizedTransaction>)> {
    let detector = BankDetector::new();
    let adapter = detector.detect(text).ok_or(BankError::BankNotDetected)?;
    let account = adapter.extract_account_info(text);
    let transactions = adapter.parse(text, tables);
    if transactions.is_empty() {
        return Err(BankError::Invalid(format!(
            "{} matched but no transactions parsed",
            adapter.bank_name()
        )));
    }
    Ok((account, transactions))
}

/// Safe indexed cell accessor. Synthetic tables and OCR glitches produce
/// rows with fewer cells than the layout expects.
#[must_use]
pub fn cell_text(row: &TableRow, index: usize) -> String {
    row.cells
        .get(index)
        .map(|cell| cell.text.trim().to_string())
        .unwrap_or_default()
}

/// Splits an amount by an explicit direction flag (`D`/`DB`/`DR` vs
/// `C`/`CR`/`K`). An unclear flag defaults to credit.
#[must_use]
pub fn split_by_flag(flag: &str, amount_minor: i64) -> (i64, i64) {
    match flag.trim().to_uppercase().as_str() {
        "D" | "DB" | "DR" | "DEBIT" | "DEBET" => (amount_minor, 0),
        _ => (0, amount_minor),
    }
}

const DEBIT_INDICATORS: [&str; 10] = [
    "TARIK", "BAYAR", "TRANSFER KE", "TRF KE", "BIAYA", "ADMIN", "PAJAK", "PEMBAYARAN", "ATM",
    "KLIRING KELUAR",
];
const CREDIT_INDICATORS: [&str; 8] = [
    "SETOR", "TERIMA", "TRANSFER DARI", "TRF DARI", "BUNGA", "GAJI", "REFUND", "KLIRING MASUK",
];

/// Infers the direction from keywords in the description. Ambiguous
/// descriptions default to credit.
#[must_use]
pub fn split_by_description(description: &str, amount_minor: i64) -> (i64, i64) {
    let upper = description.to_uppercase();
    let debit_hit = DEBIT_INDICATORS
        .iter()
        .any(|indicator| upper.contains(indicator));
    let credit_hit = CREDIT_INDICATORS
        .iter()
        .any(|indicator| upper.contains(indicator));
    if debit_hit && !credit_hit {
        (amount_minor, 0)
    } else {
        (0, amount_minor)
    }
}

/// Splits a signed mutation cell: `CR`/`+` credit, `DB`/`DR` debit,
/// parentheses or a minus sign debit, anything else credit.
#[must_use]
pub fn split_signed(mutation: &str) -> Option<(i64, i64)> {
    let trimmed = mutation.trim();
    let upper = trimmed.to_uppercase();
    if upper.contains("CR") || trimmed.contains('+') {
        let amount = parse_amount_minor(&upper.replace("CR", "").replace('+', ""))?;
        return Some((0, amount.abs()));
    }
    if upper.contains("DB") || upper.contains("DR") {
        let amount = parse_amount_minor(&upper.replace("DB", "").replace("DR", ""))?;
        return Some((amount.abs(), 0));
    }
    let amount = parse_amount_minor(trimmed)?;
    if amount < 0 {
        Some((amount.abs(), 0))
    } else {
        Some((0, amount))
    }
}

pub(crate) fn extract_account_number(text: &str) -> String {
    static PATTERN: &str = r"(?i)(?:REKENING|ACCOUNT|NO\s*REK)\s*(?:NO\.?|NUMBER)?\s*[:.]?\s*(\d{10,16})";
    if let Ok(regex) = Regex::new(PATTERN)
        && let Some(captures) = regex.captures(text)
        && let Some(digits) = captures.get(1)
    {
        return digits.as_str().to_string();
    }
    // Bare 10-16 digit run as a last resort.
    if let Ok(regex) = Regex::new(r"\b(\d{10,16})\b")
        && let Some(captures) = regex.captures(text)
        && let Some(digits) = captures.get(1)
    {
        return digits.as_str().to_string();
    }
    String::new()
}

pub(crate) fn extract_account_holder(text: &str) -> String {
    static PATTERN: &str = r"(?i)(?:NAMA|NAME|PEMILIK)\s*[:.]?\s*([A-Z][A-Z\s.&,]{2,60})";
    if let Ok(regex) = Regex::new(PATTERN)
        && let Some(captures) = regex.captures(text)
        && let Some(name) = captures.get(1)
    {
        return name
            .as_str()
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .trim_end_matches([',', '.'])
            .to_string();
    }
    String::new()
}
