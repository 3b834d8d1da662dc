#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::fmt::Display;

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

mod engine;
mod ppn;
mod scoring;
mod store;

pub use crate::engine::AiExtractionSummary;
pub use crate::engine::AutoMatchOutcome;
pub use crate::engine::ImportSummary;
pub use crate::engine::ReconciliationEngine;
pub use crate::ppn::PpnMatchOutcome;
pub use crate::ppn::PpnSplit;
pub use crate::scoring::MatchScore;
pub use crate::scoring::score_candidate;
pub use crate::store::InMemoryReconStore;
pub use crate::store::ReconStore;

pub type ProjectId = String;
pub type InvoiceId = String;
pub type TransactionId = String;
pub type EvidenceId = String;
pub type MatchId = String;

pub type ReconResult<T> = Result<T, ReconError>;

#[derive(Debug, Error)]
pub enum ReconError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("resource conflict: {0}")]
    Conflict(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub const HIGH_CONFIDENCE: f64 = 0.90;
pub const MEDIUM_CONFIDENCE: f64 = 0.70;
pub const LOW_CONFIDENCE: f64 = 0.50;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Draft,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Unmatched,
    AutoMatched,
    ManualMatched,
}

impl MatchStatus {
    #[must_use]
    pub fn is_matched(self) -> bool {
        !matches!(self, MatchStatus::Unmatched)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    Active,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    Keluaran,
    Masukan,
}

impl Display for InvoiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceKind::Keluaran => write!(f, "keluaran"),
            InvoiceKind::Masukan => write!(f, "masukan"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCounters {
    pub total_invoices: usize,
    pub total_transactions: usize,
    pub matched_count: usize,
    pub unmatched_invoices: usize,
    pub unmatched_transactions: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTotals {
    pub invoice_sum_minor: i64,
    pub transaction_sum_minor: i64,
    pub variance_minor: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationProject {
    pub id: ProjectId,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub company_npwp: String,
    pub status: ProjectStatus,
    pub counters: ProjectCounters,
    pub totals: ProjectTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxInvoice {
    pub id: InvoiceId,
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_result_id: Option<String>,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub invoice_type: InvoiceKind,
    pub vendor_name: String,
    pub vendor_npwp: String,
    pub dpp_minor: i64,
    pub ppn_minor: i64,
    pub total_amount_minor: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model_used: Option<String>,
    pub extraction_confidence: f64,
    pub match_status: MatchStatus,
    pub match_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_transaction_id: Option<TransactionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: TransactionId,
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_result_id: Option<String>,
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub transaction_type: String,
    pub reference_number: String,
    pub debit_minor: i64,
    pub credit_minor: i64,
    pub balance_minor: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_vendor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model_used: Option<String>,
    pub extraction_confidence: f64,
    pub match_status: MatchStatus,
    pub match_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_invoice_id: Option<InvoiceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_at: Option<DateTime<Utc>>,
}

impl BankTransaction {
    /// The amount side that carries the movement; sign lives in placement.
    #[must_use]
    pub fn amount_minor(&self) -> i64 {
        if self.credit_minor > 0 {
            self.credit_minor
        } else {
            self.debit_minor
        }
    }
}

/// Withholding-tax evidence (bukti potong), the C leg of the PPN variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithholdingEvidence {
    pub id: EvidenceId,
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_result_id: Option<String>,
    pub document_number: String,
    pub document_date: NaiveDate,
    pub counterparty_name: String,
    pub counterparty_npwp: String,
    pub gross_amount_minor: i64,
    pub withheld_minor: i64,
    pub match_status: MatchStatus,
    pub match_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_invoice_id: Option<InvoiceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationMatch {
    pub id: MatchId,
    pub project_id: ProjectId,
    pub invoice_id: InvoiceId,
    pub transaction_id: TransactionId,
    pub match_type: MatchType,
    pub match_score: f64,
    pub amount_variance_minor: i64,
    pub date_variance_days: i64,
    pub score_amount: f64,
    pub score_date: f64,
    pub score_vendor: f64,
    pub score_reference: f64,
    pub status: MatchState,
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateProjectRequest {
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub company_npwp: String,
}

impl CreateProjectRequest {
    pub fn normalize(mut self) -> ReconResult<Self> {
        if self.name.trim().is_empty() {
            return Err(ReconError::Validation("project name cannot be empty".into()));
        }
        if self.period_end < self.period_start {
            return Err(ReconError::Validation(
                "period end precedes period start".into(),
            ));
        }
        self.name = self.name.trim().to_string();
        if !self.company_npwp.trim().is_empty() {
            self.company_npwp = normalize_npwp(&self.company_npwp)?;
        } else {
            self.company_npwp = String::new();
        }
        Ok(self)
    }
}

/// NPWP: 15 digits, conventionally printed `XX.XXX.XXX.X-XXX.XXX`.
/// Normalizes to the printed form; rejects anything that is not 15 digits.
pub fn normalize_npwp(raw: &str) -> ReconResult<String> {
    let digits = raw
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    if digits.len() != 15 {
        return Err(ReconError::Validation(format!(
            "NPWP must contain 15 digits, got {}",
            digits.len()
        )));
    }
    Ok(format!(
        "{}.{}.{}.{}-{}.{}",
        &digits[0..2],
        &digits[2..5],
        &digits[5..8],
        &digits[8..9],
        &digits[9..12],
        &digits[12..15]
    ))
}

/// Digit-only comparison; formatting differences never break NPWP equality.
#[must_use]
pub fn npwp_matches(left: &str, right: &str) -> bool {
    let digits = |value: &str| {
        value
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
    };
    let left = digits(left);
    let right = digits(right);
    !left.is_empty() && left == right
}

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn npwp_normalization_formats_fifteen_digits() {
        assert_eq!(
            normalize_npwp("012345678901000").expect("normalize"),
            "01.234.567.8-901.000"
        );
        assert_eq!(
            normalize_npwp("01.234.567.8-901.000").expect("normalize"),
            "01.234.567.8-901.000"
        );
    }

    #[test]
    fn npwp_with_wrong_digit_count_is_rejected() {
        assert!(normalize_npwp("12345").is_err());
        assert!(normalize_npwp("").is_err());
    }

    #[test]
    fn npwp_matching_ignores_formatting() {
        assert!(npwp_matches("01.234.567.8-901.000", "012345678901000"));
        assert!(!npwp_matches("012345678901000", "099999999999999"));
        assert!(!npwp_matches("", ""));
    }

    #[test]
    fn project_request_rejects_inverted_period() {
        let err = CreateProjectRequest {
            user_id: "user-1".into(),
            name: "Maret 2024".into(),
            description: None,
            period_start: NaiveDate::from_ymd_opt(2024, 3, 31).expect("date"),
            period_end: NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"),
            company_npwp: "012345678901000".into(),
        }
        .normalize()
        .unwrap_err();
        assert!(matches!(err, ReconError::Validation(_)));
    }

    #[test]
    fn transaction_amount_prefers_credit_side() {
        let mut txn = BankTransaction {
            id: generate_id(),
            project_id: "project".into(),
            scan_result_id: None,
            bank_name: "Bank BCA".into(),
            account_number: String::new(),
            account_holder: String::new(),
            transaction_date: NaiveDate::from_ymd_opt(2024, 3, 10).expect("date"),
            description: "TRF".into(),
            transaction_type: String::new(),
            reference_number: String::new(),
            debit_minor: 0,
            credit_minor: 50_000_000,
            balance_minor: 0,
            extracted_vendor_name: None,
            extracted_invoice_number: None,
            ai_model_used: None,
            extraction_confidence: 1.0,
            match_status: MatchStatus::Unmatched,
            match_confidence: 0.0,
            matched_invoice_id: None,
            matched_by: None,
            matched_at: None,
        };
        assert_eq!(txn.amount_minor(), 50_000_000);

        txn.credit_minor = 0;
        txn.debit_minor = 20_000_000;
        assert_eq!(txn.amount_minor(), 20_000_000);
    }
}
