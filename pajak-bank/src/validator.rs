use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::rule_based::ParsedTransaction;

pub const DEFAULT_TOLERANCE_MINOR: i64 = 1;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.90;

/// The record validated and merged by the hybrid pipeline, regardless of
/// whether it came from the rule parser or the mapper fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTransaction {
    pub date: Option<NaiveDate>,
    pub description: String,
    pub debit_minor: i64,
    pub credit_minor: i64,
    pub balance_minor: Option<i64>,
    #[serde(default)]
    pub reference: String,
    pub confidence: f64,
}

impl From<ParsedTransaction> for ChunkTransaction {
    fn from(parsed: ParsedTransaction) -> Self {
        Self {
            date: parsed.date,
            description: parsed.description,
            debit_minor: parsed.debit_minor,
            credit_minor: parsed.credit_minor,
            balance_minor: parsed.balance_minor,
            reference: parsed.reference,
            confidence: parsed.confidence,
        }
    }
}

/// A contiguous window of transactions carrying the balance it expects to
/// start from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub saldo_start_minor: i64,
    pub saldo_end_minor: i64,
    pub transactions: Vec<ChunkTransaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub saldo_match: bool,
    pub expected_saldo_minor: Option<i64>,
    pub actual_saldo_minor: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub needs_mapper: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkValidation {
    pub chunk_id: usize,
    pub validation: ValidationOutcome,
    pub transactions: Vec<ChunkTransaction>,
    pub saldo_start_minor: i64,
    pub saldo_end_minor: i64,
    pub processed_with_mapper: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total_chunks: usize,
    pub passed: usize,
    pub failed: usize,
    pub needs_mapper: usize,
    pub processed_with_mapper: usize,
    /// Fraction of chunks that validated, in 0..=1.
    pub pass_rate: f64,
    /// Fraction of chunks routed to the mapper, in 0..=1.
    pub mapper_rate: f64,
}

/// Decides, per chunk, whether the cheap rule-based parse can be trusted or
/// the expensive mapper fallback is required.
#[derive(Debug, Clone)]
pub struct ProgressiveValidator {
    tolerance_minor: i64,
    confidence_threshold: f64,
}

impl Default for ProgressiveValidator {
    fn default() -> Self {
        Self {
            tolerance_minor: DEFAULT_TOLERANCE_MINOR,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl ProgressiveValidator {
    #[must_use]
    pub fn new(tolerance_minor: i64, confidence_threshold: f64) -> Self {
        Self {
            tolerance_minor: tolerance_minor.max(0),
            confidence_threshold,
        }
    }

    /// `previous_balance + credit - debit` must land on the reported
    /// balance within tolerance.
    #[must_use]
    pub fn validate_transaction_saldo(
        &self,
        transaction: &ChunkTransaction,
        previous_saldo_minor: i64,
    ) -> (bool, i64) {
        let calculated =
            previous_saldo_minor + transaction.credit_minor - transaction.debit_minor;
        let reported = transaction.balance_minor.unwrap_or(0);
        let is_valid = (calculated - reported).abs() <= self.tolerance_minor;
        (is_valid, calculated)
    }

    fn validate_saldo_continuity(
        &self,
        transactions: &[ChunkTransaction],
        saldo_start_minor: i64,
    ) -> ValidationOutcome {
        let Some(last) = transactions.last() else {
            return ValidationOutcome {
                is_valid: false,
                saldo_match: false,
                expected_saldo_minor: Some(saldo_start_minor),
                actual_saldo_minor: None,
                error_message: Some("no transactions in chunk".into()),
                needs_mapper: true,
            };
        };

        let mut current = saldo_start_minor;
        let mut all_valid = true;
        let mut errors = Vec::new();
        for (index, transaction) in transactions.iter().enumerate() {
            let (is_valid, calculated) = self.validate_transaction_saldo(transaction, current);
            if !is_valid {
                all_valid = false;
                errors.push(format!(
                    "txn {index}: expected saldo {calculated}, got {}",
                    transaction.balance_minor.unwrap_or(0)
                ));
            }
            current = calculated;
        }

        let final_reported = last.balance_minor.unwrap_or(0);
        let saldo_match = (final_reported - current).abs() <= self.tolerance_minor;

        ValidationOutcome {
            is_valid: all_valid && saldo_match,
            saldo_match,
            expected_saldo_minor: Some(current),
            actual_saldo_minor: Some(final_reported),
            error_message: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
            needs_mapper: !(all_valid && saldo_match),
        }
    }

    fn missing_fields(transactions: &[ChunkTransaction]) -> Vec<String> {
        let mut missing = Vec::new();
        for (index, transaction) in transactions.iter().enumerate() {
            if transaction.date.is_none() {
                missing.push(format!("txn {index}: missing date"));
            }
            if transaction.description.trim().is_empty() {
                missing.push(format!("txn {index}: missing description"));
            }
            if transaction.balance_minor.is_none() {
                missing.push(format!("txn {index}: missing balance"));
            }
        }
        missing
    }

    fn average_confidence(transactions: &[ChunkTransaction]) -> f64 {
        if transactions.is_empty() {
            return 0.0;
        }
        transactions.iter().map(|txn| txn.confidence).sum::<f64>() / transactions.len() as f64
    }

    #[must_use]
    pub fn validate_chunk(
        &self,
        chunk_id: usize,
        transactions: Vec<ChunkTransaction>,
        saldo_start_minor: i64,
        previous_chunk_saldo_minor: Option<i64>,
    ) -> ChunkValidation {
        let saldo_validation = self.validate_saldo_continuity(&transactions, saldo_start_minor);

        let missing = Self::missing_fields(&transactions);
        let is_complete = missing.is_empty();

        let inter_chunk_valid = match previous_chunk_saldo_minor {
            Some(previous) => {
                let valid = (saldo_start_minor - previous).abs() <= self.tolerance_minor;
                if !valid {
                    warn!(
                        chunk_id,
                        expected = previous,
                        got = saldo_start_minor,
                        "chunk start does not continue previous chunk"
                    );
                }
                valid
            }
            None => true,
        };

        let low_confidence =
            Self::average_confidence(&transactions) < self.confidence_threshold;

        let needs_mapper =
            saldo_validation.needs_mapper || !is_complete || !inter_chunk_valid || low_confidence;

        let saldo_end_minor = transactions
            .last()
            .and_then(|txn| txn.balance_minor)
            .unwrap_or(saldo_start_minor);

        let mut error_message = saldo_validation.error_message.clone();
        if !is_complete {
            let joined = missing.join("; ");
            error_message = Some(match error_message {
                Some(existing) => format!("{existing}; {joined}"),
                None => joined,
            });
        }

        ChunkValidation {
            chunk_id,
            validation: ValidationOutcome {
                is_valid: saldo_validation.is_valid && is_complete && inter_chunk_valid,
                saldo_match: saldo_validation.saldo_match,
                expected_saldo_minor: saldo_validation.expected_saldo_minor,
                actual_saldo_minor: saldo_validation.actual_saldo_minor,
                error_message,
                needs_mapper,
            },
            transactions,
            saldo_start_minor,
            saldo_end_minor,
            processed_with_mapper: false,
        }
    }

    #[must_use]
    pub fn validate_all_chunks(&self, chunks: Vec<Chunk>) -> Vec<ChunkValidation> {
        let mut validations = Vec::with_capacity(chunks.len());
        let mut previous_saldo = None;
        for (index, chunk) in chunks.into_iter().enumerate() {
            let validation = self.validate_chunk(
                index,
                chunk.transactions,
                chunk.saldo_start_minor,
                previous_saldo,
            );
            previous_saldo = Some(validation.saldo_end_minor);
            validations.push(validation);
        }
        validations
    }

    #[must_use]
    pub fn stats(validations: &[ChunkValidation]) -> ValidationStats {
        let total = validations.len();
        let passed = validations
            .iter()
            .filter(|validation| validation.validation.is_valid)
            .count();
        let needs_mapper = validations
            .iter()
            .filter(|validation| validation.validation.needs_mapper)
            .count();
        let processed = validations
            .iter()
            .filter(|validation| validation.processed_with_mapper)
            .count();
        ValidationStats {
            total_chunks: total,
            passed,
            failed: total - passed,
            needs_mapper,
            processed_with_mapper: processed,
            pass_rate: fraction(passed, total),
            mapper_rate: fraction(needs_mapper, total),
        }
    }
}

fn fraction(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Partitions transactions into windows of `chunk_size`, each carrying the
/// balance context it expects to start from.
#[must_use]
pub fn chunk_by_saldo_context(
    transactions: Vec<ChunkTransaction>,
    saldo_awal_minor: i64,
    chunk_size: usize,
) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut current_saldo = saldo_awal_minor;

    for transaction in transactions {
        current.push(transaction);
        if current.len() >= chunk_size {
            let saldo_end = current
                .last()
                .and_then(|txn| txn.balance_minor)
                .unwrap_or(current_saldo);
            chunks.push(Chunk {
                saldo_start_minor: current_saldo,
                saldo_end_minor: saldo_end,
                transactions: std::mem::take(&mut current),
            });
            current_saldo = saldo_end;
        }
    }

    if !current.is_empty() {
        let saldo_end = current
            .last()
            .and_then(|txn| txn.balance_minor)
            .unwrap_or(current_saldo);
        chunks.push(Chunk {
            saldo_start_minor: current_saldo,
            saldo_end_minor: saldo_end,
            transactions: current,
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn txn(day: u32, credit: i64, debit: i64, balance: i64) -> ChunkTransaction {
        ChunkTransaction {
            date: NaiveDate::from_ymd_opt(2024, 3, day),
            description: format!("TXN {day}"),
            debit_minor: debit,
            credit_minor: credit,
            balance_minor: Some(balance),
            reference: String::new(),
            confidence: 1.0,
        }
    }

    #[test]
    fn continuous_chunk_passes() {
        let validator = ProgressiveValidator::default();
        let transactions = vec![
            txn(1, 100_000, 0, 1_100_000),
            txn(2, 0, 50_000, 1_050_000),
            txn(3, 25_000, 0, 1_075_000),
        ];
        let result = validator.validate_chunk(0, transactions, 1_000_000, None);

        assert!(result.validation.is_valid);
        assert!(!result.validation.needs_mapper);
        assert_eq!(result.saldo_end_minor, 1_075_000);
    }

    #[test]
    fn arithmetic_error_routes_to_mapper() {
        let validator = ProgressiveValidator::default();
        let transactions = vec![
            txn(1, 100_000, 0, 1_100_000),
            // Reported balance off by 10_000 minor units.
            txn(2, 0, 50_000, 1_060_000),
        ];
        let result = validator.validate_chunk(0, transactions, 1_000_000, None);

        assert!(!result.validation.is_valid);
        assert!(result.validation.needs_mapper);
        assert!(
            result
                .validation
                .error_message
                .as_deref()
                .is_some_and(|message| message.contains("txn 1"))
        );
    }

    #[test]
    fn tolerance_absorbs_single_minor_unit() {
        let validator = ProgressiveValidator::default();
        let transactions = vec![txn(1, 100_000, 0, 1_100_001)];
        let result = validator.validate_chunk(0, transactions, 1_000_000, None);
        assert!(result.validation.is_valid);
    }

    #[test]
    fn missing_fields_fail_completeness() {
        let validator = ProgressiveValidator::default();
        let mut incomplete = txn(1, 100_000, 0, 1_100_000);
        incomplete.date = None;
        incomplete.description.clear();
        let result = validator.validate_chunk(0, vec![incomplete], 1_000_000, None);

        assert!(!result.validation.is_valid);
        assert!(result.validation.needs_mapper);
        let message = result.validation.error_message.expect("message");
        assert!(message.contains("missing date"));
        assert!(message.contains("missing description"));
    }

    #[test]
    fn inter_chunk_discontinuity_fails() {
        let validator = ProgressiveValidator::default();
        let transactions = vec![txn(5, 10_000, 0, 2_010_000)];
        let result = validator.validate_chunk(1, transactions, 2_000_000, Some(1_500_000));

        assert!(!result.validation.is_valid);
        assert!(result.validation.needs_mapper);
        // Saldo arithmetic inside the chunk is still fine.
        assert!(result.validation.saldo_match);
    }

    #[test]
    fn low_average_confidence_routes_to_mapper_without_failing_validity() {
        let validator = ProgressiveValidator::default();
        let mut shaky = txn(1, 100_000, 0, 1_100_000);
        shaky.confidence = 0.4;
        let result = validator.validate_chunk(0, vec![shaky], 1_000_000, None);

        assert!(result.validation.is_valid);
        assert!(result.validation.needs_mapper);
    }

    #[test]
    fn empty_chunk_needs_mapper() {
        let validator = ProgressiveValidator::default();
        let result = validator.validate_chunk(0, Vec::new(), 500, None);
        assert!(!result.validation.is_valid);
        assert!(result.validation.needs_mapper);
        assert_eq!(result.saldo_end_minor, 500);
    }

    #[test]
    fn chunking_carries_saldo_context() {
        let transactions = (1u32..=5)
            .map(|index| txn(index, 100_000, 0, 1_000_000 + 100_000 * i64::from(index)))
            .collect::<Vec<_>>();
        let chunks = chunk_by_saldo_context(transactions, 1_000_000, 2);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].saldo_start_minor, 1_000_000);
        assert_eq!(chunks[0].saldo_end_minor, 1_200_000);
        assert_eq!(chunks[1].saldo_start_minor, 1_200_000);
        assert_eq!(chunks[2].transactions.len(), 1);
        assert_eq!(chunks[2].saldo_end_minor, 1_500_000);
    }

    #[test]
    fn validate_all_chunks_threads_previous_saldo() {
        let validator = ProgressiveValidator::default();
        let chunks = vec![
            Chunk {
                saldo_start_minor: 1_000_000,
                saldo_end_minor: 1_100_000,
                transactions: vec![txn(1, 100_000, 0, 1_100_000)],
            },
            // Start disagrees with the previous chunk's end.
            Chunk {
                saldo_start_minor: 1_400_000,
                saldo_end_minor: 1_500_000,
                transactions: vec![txn(2, 100_000, 0, 1_500_000)],
            },
        ];
        let validations = validator.validate_all_chunks(chunks);

        assert!(validations[0].validation.is_valid);
        assert!(!validations[1].validation.is_valid);

        let stats = ProgressiveValidator::stats(&validations);
        assert_eq!(stats.passed, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.pass_rate - 0.5).abs() < 1e-9);
    }
}
