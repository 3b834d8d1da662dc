use std::sync::Arc;
use std::time::Instant;

use pajak_mapper::MapperMetadata;
use pajak_mapper::SmartMapper;
use pajak_ocr::Table;
use pajak_parsers::parse_amount_minor;
use pajak_parsers::parse_flexible_date;
use regex_lite::Regex;
use serde::Deserialize;
use serde::Serialize;
use tracing::error;
use tracing::info;

use crate::BankDetector;
use crate::ChunkTransaction;
use crate::ChunkValidation;
use crate::ProgressiveValidator;
use crate::RuleBasedParser;
use crate::StandardizedTransaction;
use crate::chunk_by_saldo_context;
use crate::extract_account_holder;
use crate::extract_account_number;

pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Confidence assigned to rows that came back from the mapper; the mapper
/// reports no per-row score of its own.
const MAPPER_ROW_CONFIDENCE: f64 = 0.70;

#[derive(Debug, Clone)]
pub struct HybridConfig {
    pub chunk_size: usize,
    pub tolerance_minor: i64,
    pub confidence_threshold: f64,
    pub enable_mapper_fallback: bool,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            tolerance_minor: crate::validator::DEFAULT_TOLERANCE_MINOR,
            confidence_threshold: crate::validator::DEFAULT_CONFIDENCE_THRESHOLD,
            enable_mapper_fallback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankInfo {
    pub nama_bank: String,
    pub nomor_rekening: String,
    pub nama_pemilik: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaldoInfo {
    /// Whole currency units, as printed on the statement header.
    pub saldo_awal: String,
    pub saldo_akhir: String,
    pub mata_uang: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub total_transaksi: usize,
    pub total_debet: String,
    pub total_kredit: String,
    pub net_change: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub hybrid_processing: bool,
    pub rule_based_percentage: f64,
    #[serde(rename = "gpt_usage_percentage")]
    pub mapper_usage_percentage: f64,
    pub token_savings_percentage: f64,
    pub chunks_processed: usize,
    #[serde(rename = "chunks_with_gpt")]
    pub chunks_with_mapper: usize,
    pub chunks_unresolved: usize,
    pub validation_pass_rate: f64,
    pub processing_time_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankReport {
    pub document_type: String,
    pub processing_strategy: Vec<String>,
    pub bank_info: BankInfo,
    pub saldo_info: SaldoInfo,
    pub transactions: Vec<serde_json::Value>,
    pub summary: TransactionSummary,
    pub confidence: f64,
    pub processing_metadata: ProcessingMetadata,
}

impl BankReport {
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Rule-based parsing first, saldo-driven validation second, mapper
/// fallback only for the chunks that failed. The expensive model call is
/// the exception, not the pipeline.
pub struct HybridBankProcessor {
    parser: RuleBasedParser,
    validator: ProgressiveValidator,
    detector: BankDetector,
    mapper: Option<Arc<dyn SmartMapper>>,
    config: HybridConfig,
}

impl HybridBankProcessor {
    #[must_use]
    pub fn new(mapper: Option<Arc<dyn SmartMapper>>, config: HybridConfig) -> Self {
        Self {
            parser: RuleBasedParser::new(),
            validator: ProgressiveValidator::new(
                config.tolerance_minor,
                config.confidence_threshold,
            ),
            detector: BankDetector::new(),
            mapper,
            config,
        }
    }

    pub async fn process_bank_statement(&self, raw_text: &str, tables: &[Table]) -> BankReport {
        let started = Instant::now();

        let bank_name = match self.detector.detect(raw_text) {
            Some(adapter) => adapter.bank_name().to_string(),
            None => extract_bank_name(raw_text),
        };
        let account_number = extract_account_number(raw_text);
        let account_holder = extract_account_holder(raw_text);
        let saldo_awal_minor = extract_saldo_awal_minor(raw_text).unwrap_or(0);

        let transactions = if tables.is_empty() {
            // No structured tables: the detected adapter's regex fallback
            // supplies candidate rows. That output is untrusted until the
            // validator has run over it.
            self.adapter_text_fallback(raw_text)
        } else {
            let parsed = self.parser.parse_transactions(tables);
            let parse_stats = self.parser.statistics(&parsed);
            info!(
                total = parse_stats.total,
                high = parse_stats.high_confidence,
                low = parse_stats.low_confidence,
                "rule-based parse finished"
            );
            parsed.into_iter().map(ChunkTransaction::from).collect()
        };
        let rule_based_count = transactions.len();
        let chunks =
            chunk_by_saldo_context(transactions, saldo_awal_minor, self.config.chunk_size);
        let chunk_count = chunks.len();

        let mut validations = self.validator.validate_all_chunks(chunks);
        let pre_mapper_stats = ProgressiveValidator::stats(&validations);
        info!(
            passed = pre_mapper_stats.passed,
            failed = pre_mapper_stats.failed,
            needs_mapper = pre_mapper_stats.needs_mapper,
            "progressive validation finished"
        );

        let mut chunks_with_mapper = 0usize;
        let mut chunks_unresolved = 0usize;
        if self.config.enable_mapper_fallback && self.mapper.is_some() {
            for validation in &mut validations {
                if !validation.validation.needs_mapper {
                    continue;
                }
                match self.run_mapper_fallback(validation, &bank_name).await {
                    Ok(replacement) => {
                        validation.transactions = replacement;
                        validation.processed_with_mapper = true;
                        validation.saldo_end_minor = validation
                            .transactions
                            .last()
                            .and_then(|txn| txn.balance_minor)
                            .unwrap_or(validation.saldo_start_minor);
                        chunks_with_mapper += 1;
                    }
                    Err(err) => {
                        // Keep the rule-based content; the chunk stays
                        // unresolved and the overall confidence reflects it.
                        error!(chunk_id = validation.chunk_id, error = %err, "mapper fallback failed");
                        chunks_unresolved += 1;
                    }
                }
            }
        } else {
            chunks_unresolved = pre_mapper_stats.needs_mapper;
        }

        let merged = validations
            .iter()
            .flat_map(|validation| validation.transactions.iter().cloned())
            .collect::<Vec<_>>();

        let saldo_akhir_minor = merged
            .last()
            .and_then(|txn| txn.balance_minor)
            .unwrap_or(saldo_awal_minor);

        let confidence = overall_confidence(&merged, &validations);

        let total_debet: i64 = merged.iter().map(|txn| txn.debit_minor).sum();
        let total_kredit: i64 = merged.iter().map(|txn| txn.credit_minor).sum();

        let token_savings = if chunk_count == 0 {
            0.0
        } else {
            (chunk_count - chunks_with_mapper) as f64 / chunk_count as f64 * 100.0
        };

        let report = BankReport {
            document_type: "rekening_koran".to_string(),
            processing_strategy: vec![
                "hybrid".to_string(),
                "rule_based".to_string(),
                "progressive_validation".to_string(),
            ],
            bank_info: BankInfo {
                nama_bank: bank_name,
                nomor_rekening: or_na(account_number),
                nama_pemilik: or_na(account_holder),
            },
            saldo_info: SaldoInfo {
                saldo_awal: (saldo_awal_minor / 100).to_string(),
                saldo_akhir: (saldo_akhir_minor / 100).to_string(),
                mata_uang: "IDR".to_string(),
            },
            transactions: merged.iter().map(transaction_row).collect(),
            summary: TransactionSummary {
                total_transaksi: merged.len(),
                total_debet: (total_debet / 100).to_string(),
                total_kredit: (total_kredit / 100).to_string(),
                net_change: ((total_kredit - total_debet) / 100).to_string(),
            },
            confidence,
            processing_metadata: ProcessingMetadata {
                hybrid_processing: true,
                rule_based_percentage: if merged.is_empty() {
                    0.0
                } else {
                    rule_based_count as f64 / merged.len() as f64 * 100.0
                },
                mapper_usage_percentage: if chunk_count == 0 {
                    0.0
                } else {
                    chunks_with_mapper as f64 / chunk_count as f64 * 100.0
                },
                token_savings_percentage: token_savings,
                chunks_processed: chunk_count,
                chunks_with_mapper,
                chunks_unresolved,
                validation_pass_rate: pre_mapper_stats.pass_rate * 100.0,
                processing_time_seconds: started.elapsed().as_secs_f64(),
            },
        };

        info!(
            transactions = report.summary.total_transaksi,
            chunks = chunk_count,
            mapper_chunks = chunks_with_mapper,
            savings = format!("{token_savings:.1}%"),
            "hybrid bank processing finished"
        );

        report
    }

    fn adapter_text_fallback(&self, raw_text: &str) -> Vec<ChunkTransaction> {
        match crate::normalize_statement(raw_text, &[]) {
            Ok((_, transactions)) => transactions
                .into_iter()
                .map(standardized_to_chunk)
                .collect(),
            Err(err) => {
                info!(error = %err, "no adapter route for statement text");
                Vec::new()
            }
        }
    }

    async fn run_mapper_fallback(
        &self,
        validation: &ChunkValidation,
        bank_name: &str,
    ) -> Result<Vec<ChunkTransaction>, String> {
        let Some(mapper) = &self.mapper else {
            return Err("no mapper configured".to_string());
        };

        let chunk_text = chunk_text(&validation.transactions);
        let metadata = MapperMetadata {
            bank_name: Some(bank_name.to_string()),
            saldo_start_minor: Some(validation.saldo_start_minor),
            company_npwp: None,
        };

        let payload = mapper
            .extract_from_text(&chunk_text, "rekening_koran", Some(metadata))
            .await
            .map_err(|err| err.to_string())?;

        let rows = pajak_mapper::transactions_field(&payload)
            .ok_or_else(|| "mapper payload has no transactions array".to_string())?;
        let transactions = rows.iter().map(mapper_row_to_transaction).collect::<Vec<_>>();
        if transactions.is_empty() {
            return Err("mapper returned zero transactions".to_string());
        }
        Ok(transactions)
    }
}

fn or_na(value: String) -> String {
    if value.is_empty() { "N/A".to_string() } else { value }
}

/// Overall confidence blends row confidence with how many chunks validated
/// on the first pass: `0.6 * avg + 0.4 * pass_rate`. A mapper-repaired
/// chunk still counts against the pass rate; the repair is visible in the
/// metadata, not hidden from the score.
fn overall_confidence(merged: &[ChunkTransaction], validations: &[ChunkValidation]) -> f64 {
    if merged.is_empty() {
        return 0.0;
    }
    let avg = merged.iter().map(|txn| txn.confidence).sum::<f64>() / merged.len() as f64;
    let total = validations.len();
    let passed = validations
        .iter()
        .filter(|validation| validation.validation.is_valid)
        .count();
    let pass_rate = if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64
    };
    avg * 0.6 + pass_rate * 0.4
}

const KNOWN_BANKS: [&str; 9] = [
    "BCA", "Mandiri", "BNI", "BRI", "CIMB", "Permata", "BTN", "BSI", "Danamon",
];

fn extract_bank_name(text: &str) -> String {
    for bank in KNOWN_BANKS {
        let pattern = format!(r"(?i)\b{bank}\b");
        if let Ok(regex) = Regex::new(&pattern)
            && regex.is_match(text)
        {
            return format!("Bank {bank}");
        }
    }
    "N/A".to_string()
}

fn extract_saldo_awal_minor(text: &str) -> Option<i64> {
    let regex = Regex::new(r"(?i)saldo(?:\s+awal)?[:\s]+([0-9.,]+)").ok()?;
    let captures = regex.captures(text)?;
    parse_amount_minor(captures.get(1)?.as_str())
}

/// Formats a chunk back into plain statement lines for the mapper call.
fn chunk_text(transactions: &[ChunkTransaction]) -> String {
    let mut text = String::new();
    for txn in transactions {
        let date = txn
            .date
            .map(|date| date.format("%d/%m/%Y").to_string())
            .unwrap_or_default();
        text.push_str(&format!(
            "{date} {} {} {} {}\n",
            txn.description,
            minor_to_decimal(txn.debit_minor),
            minor_to_decimal(txn.credit_minor),
            txn.balance_minor.map(minor_to_decimal).unwrap_or_default(),
        ));
    }
    text
}

fn minor_to_decimal(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let absolute = minor.unsigned_abs();
    format!("{sign}{}.{:02}", absolute / 100, absolute % 100)
}

fn transaction_row(txn: &ChunkTransaction) -> serde_json::Value {
    serde_json::json!({
        "tanggal": txn.date.map(|date| date.format("%Y-%m-%d").to_string()).unwrap_or_default(),
        "keterangan": txn.description,
        "debet": minor_to_decimal(txn.debit_minor),
        "kredit": minor_to_decimal(txn.credit_minor),
        "saldo": txn.balance_minor.map(minor_to_decimal).unwrap_or_default(),
        "referensi": txn.reference,
        "confidence": txn.confidence,
    })
}

/// Adapter output re-scored with the completeness weights the rule parser
/// uses, so the validator treats both sources the same way.
fn standardized_to_chunk(txn: StandardizedTransaction) -> ChunkTransaction {
    let mut confidence = 0.25;
    if !txn.description.trim().is_empty() {
        confidence += 0.15;
    }
    if txn.debit_minor > 0 || txn.credit_minor > 0 {
        confidence += 0.30;
    }
    confidence += 0.30;
    ChunkTransaction {
        date: Some(txn.transaction_date),
        description: txn.description,
        debit_minor: txn.debit_minor,
        credit_minor: txn.credit_minor,
        balance_minor: Some(txn.balance_minor),
        reference: txn.reference_number,
        confidence,
    }
}

fn value_to_minor(value: Option<&serde_json::Value>) -> i64 {
    match value {
        Some(serde_json::Value::String(text)) => parse_amount_minor(text).unwrap_or(0),
        Some(serde_json::Value::Number(number)) => number
            .as_f64()
            .map(|amount| (amount * 100.0).round() as i64)
            .unwrap_or(0),
        _ => 0,
    }
}

fn mapper_row_to_transaction(row: &serde_json::Value) -> ChunkTransaction {
    let date = row
        .get("tanggal")
        .and_then(serde_json::Value::as_str)
        .and_then(parse_flexible_date);
    let description = row
        .get("keterangan")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    let balance = match row.get("saldo") {
        Some(value) if !value.is_null() => Some(value_to_minor(Some(value))),
        _ => None,
    };
    ChunkTransaction {
        date,
        description,
        debit_minor: value_to_minor(row.get("debet")).abs(),
        credit_minor: value_to_minor(row.get("kredit")).abs(),
        balance_minor: balance,
        reference: row
            .get("referensi")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string(),
        confidence: row
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(MAPPER_ROW_CONFIDENCE),
    }
}
