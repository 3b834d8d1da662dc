use serde::Deserialize;
use serde::Serialize;

use crate::BankTransaction;
use crate::TaxInvoice;

/// Sub-scores and weighted total for a candidate (invoice, transaction)
/// pair. Weights: amount 50%, date 25%, vendor 15%, reference 10%.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub amount: f64,
    pub date: f64,
    pub vendor: f64,
    pub reference: f64,
    pub total: f64,
    pub amount_variance_minor: i64,
    pub date_variance_days: i64,
}

const WEIGHT_AMOUNT: f64 = 0.50;
const WEIGHT_DATE: f64 = 0.25;
const WEIGHT_VENDOR: f64 = 0.15;
const WEIGHT_REFERENCE: f64 = 0.10;
const DATE_TOLERANCE_DAYS: i64 = 7;

#[must_use]
pub fn score_candidate(invoice: &TaxInvoice, transaction: &BankTransaction) -> MatchScore {
    let transaction_amount = transaction.amount_minor();
    let amount = amount_score(invoice.total_amount_minor, transaction_amount);
    let date_variance_days = (invoice.invoice_date - transaction.transaction_date)
        .num_days()
        .abs();
    let date = date_score(date_variance_days);
    let vendor = vendor_score(
        &invoice.vendor_name,
        &transaction.description,
        transaction.extracted_vendor_name.as_deref(),
    );
    let reference = reference_score(
        &invoice.invoice_number,
        &transaction.reference_number,
        &transaction.description,
        transaction.extracted_invoice_number.as_deref(),
    );

    let total = amount * WEIGHT_AMOUNT
        + date * WEIGHT_DATE
        + vendor * WEIGHT_VENDOR
        + reference * WEIGHT_REFERENCE;

    MatchScore {
        amount,
        date,
        vendor,
        reference,
        total,
        amount_variance_minor: (invoice.total_amount_minor - transaction_amount).abs(),
        date_variance_days,
    }
}

/// 1.0 exact, 0.95 within 1%, 0.85 within 5%, 0.70 within 10%, then a
/// linear falloff of 2 per unit ratio beyond 10%.
#[must_use]
pub fn amount_score(invoice_minor: i64, transaction_minor: i64) -> f64 {
    if invoice_minor == 0 || transaction_minor == 0 {
        return 0.0;
    }
    let ratio = (invoice_minor - transaction_minor).abs() as f64 / invoice_minor as f64;
    if ratio == 0.0 {
        1.0
    } else if ratio <= 0.01 {
        0.95
    } else if ratio <= 0.05 {
        0.85
    } else if ratio <= 0.10 {
        0.70
    } else {
        (0.70 - (ratio - 0.10) * 2.0).max(0.0)
    }
}

/// 1.0 same day, 0.95 within 1, 0.85 within 3, 0.70 within 7, then 0.05
/// off per extra day.
#[must_use]
pub fn date_score(days_diff: i64) -> f64 {
    let days = days_diff.abs();
    if days == 0 {
        1.0
    } else if days <= 1 {
        0.95
    } else if days <= 3 {
        0.85
    } else if days <= DATE_TOLERANCE_DAYS {
        0.70
    } else {
        (0.70 - (days - DATE_TOLERANCE_DAYS) as f64 * 0.05).max(0.0)
    }
}

/// Substring containment wins outright; otherwise the longest common
/// subsequence ratio. When the mapper extracted a clean vendor name from
/// the transaction, the better of the two comparisons counts.
#[must_use]
pub fn vendor_score(
    vendor_name: &str,
    description: &str,
    extracted_vendor: Option<&str>,
) -> f64 {
    let base = vendor_similarity(vendor_name, description);
    match extracted_vendor {
        Some(extracted) if !extracted.trim().is_empty() => {
            base.max(vendor_similarity(vendor_name, extracted))
        }
        _ => base,
    }
}

fn vendor_similarity(vendor_name: &str, target: &str) -> f64 {
    let vendor = vendor_name.trim().to_uppercase();
    let target = target.trim().to_uppercase();
    if vendor.is_empty() || target.is_empty() {
        return 0.0;
    }
    if target.contains(&vendor) {
        return 1.0;
    }
    lcs_ratio(&vendor, &target)
}

/// 1.0 when the invoice number sits in the reference, 0.8 in the
/// description, 0.5 when any `-`-separated part of length >= 3 appears in
/// either, 0 otherwise.
#[must_use]
pub fn reference_score(
    invoice_number: &str,
    reference: &str,
    description: &str,
    extracted_invoice: Option<&str>,
) -> f64 {
    let invoice = invoice_number.trim().to_uppercase();
    if invoice.is_empty() {
        return 0.0;
    }
    let mut reference = reference.trim().to_uppercase();
    if let Some(extracted) = extracted_invoice
        && !extracted.trim().is_empty()
    {
        // A mapper-extracted invoice number behaves like a reference field.
        reference.push(' ');
        reference.push_str(&extracted.trim().to_uppercase());
    }
    let description = description.trim().to_uppercase();

    if reference.contains(&invoice) {
        return 1.0;
    }
    if description.contains(&invoice) {
        return 0.8;
    }
    for part in invoice.split('-').filter(|part| part.len() >= 3) {
        if reference.contains(part) || description.contains(part) {
            return 0.5;
        }
    }
    0.0
}

/// Combines component scores with the standard weights. The PPN variant
/// reuses this for its invoice-to-evidence pairing.
#[must_use]
pub fn weighted_total(amount: f64, date: f64, vendor: f64, reference: f64) -> f64 {
    amount * WEIGHT_AMOUNT
        + date * WEIGHT_DATE
        + vendor * WEIGHT_VENDOR
        + reference * WEIGHT_REFERENCE
}

/// `2 * lcs / (len_a + len_b)` over characters.
fn lcs_ratio(left: &str, right: &str) -> f64 {
    let left_chars: Vec<char> = left.chars().collect();
    let right_chars: Vec<char> = right.chars().collect();
    if left_chars.is_empty() || right_chars.is_empty() {
        return 0.0;
    }

    let mut previous = vec![0usize; right_chars.len() + 1];
    let mut current = vec![0usize; right_chars.len() + 1];
    for left_char in &left_chars {
        for (column, right_char) in right_chars.iter().enumerate() {
            current[column + 1] = if left_char == right_char {
                previous[column] + 1
            } else {
                previous[column + 1].max(current[column])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    let lcs = previous[right_chars.len()];
    2.0 * lcs as f64 / (left_chars.len() + right_chars.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crate::InvoiceKind;
    use crate::MatchStatus;
    use crate::generate_id;
    use pretty_assertions::assert_eq;

    fn approx(left: f64, right: f64) {
        assert!((left - right).abs() < 1e-9, "{left} != {right}");
    }

    pub(crate) fn invoice(total_minor: i64, date: NaiveDate, vendor: &str, number: &str) -> TaxInvoice {
        TaxInvoice {
            id: generate_id(),
            project_id: "project".into(),
            scan_result_id: None,
            invoice_number: number.into(),
            invoice_date: date,
            invoice_type: InvoiceKind::Keluaran,
            vendor_name: vendor.into(),
            vendor_npwp: String::new(),
            dpp_minor: 0,
            ppn_minor: 0,
            total_amount_minor: total_minor,
            ai_model_used: None,
            extraction_confidence: 1.0,
            match_status: MatchStatus::Unmatched,
            match_confidence: 0.0,
            matched_transaction_id: None,
            matched_by: None,
            matched_at: None,
        }
    }

    pub(crate) fn transaction(
        credit_minor: i64,
        date: NaiveDate,
        description: &str,
        reference: &str,
    ) -> BankTransaction {
        BankTransaction {
            id: generate_id(),
            project_id: "project".into(),
            scan_result_id: None,
            bank_name: "Bank BCA".into(),
            account_number: String::new(),
            account_holder: String::new(),
            transaction_date: date,
            description: description.into(),
            transaction_type: String::new(),
            reference_number: reference.into(),
            debit_minor: 0,
            credit_minor,
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
        }
    }

    #[test]
    fn amount_score_bands() {
        approx(amount_score(100_000, 100_000), 1.0);
        approx(amount_score(100_000, 99_500), 0.95);
        approx(amount_score(100_000, 96_000), 0.85);
        approx(amount_score(100_000, 91_000), 0.70);
        // 20% off: 0.70 - 0.10 * 2 = 0.50
        approx(amount_score(100_000, 80_000), 0.50);
        approx(amount_score(100_000, 0), 0.0);
        approx(amount_score(0, 100_000), 0.0);
        // Far off collapses to zero, never negative.
        approx(amount_score(100_000, 10_000), 0.0);
    }

    #[test]
    fn date_score_bands() {
        approx(date_score(0), 1.0);
        approx(date_score(1), 0.95);
        approx(date_score(3), 0.85);
        approx(date_score(7), 0.70);
        approx(date_score(9), 0.60);
        approx(date_score(30), 0.0);
    }

    #[test]
    fn vendor_substring_wins() {
        approx(vendor_score("PT MAJU", "TRF PT MAJU REF123", None), 1.0);
        assert!(vendor_score("PT MAJU", "SETOR TUNAI", None) < 0.6);
        approx(vendor_score("", "anything", None), 0.0);
    }

    #[test]
    fn extracted_vendor_lifts_the_score() {
        let with_extracted =
            vendor_score("PT MAJU JAYA", "TRSF 889021/11", Some("PT MAJU JAYA"));
        approx(with_extracted, 1.0);
    }

    #[test]
    fn reference_score_bands() {
        approx(reference_score("INV-2024-001", "INV-2024-001", "", None), 1.0);
        approx(
            reference_score("INV-2024-001", "", "BAYAR INV-2024-001", None),
            0.8,
        );
        approx(reference_score("INV-2024-001", "REF 2024 X", "", None), 0.5);
        approx(reference_score("INV-2024-001", "", "", None), 0.0);
        approx(reference_score("", "REF", "DESC", None), 0.0);
    }

    #[test]
    fn extracted_invoice_number_counts_as_reference() {
        approx(
            reference_score("INV-77", "", "", Some("INV-77")),
            1.0,
        );
    }

    #[test]
    fn lcs_ratio_is_symmetric_and_bounded() {
        approx(lcs_ratio("ABCD", "ABCD"), 1.0);
        let forward = lcs_ratio("PT MAJU", "PT MJU");
        let backward = lcs_ratio("PT MJU", "PT MAJU");
        approx(forward, backward);
        assert!(forward > 0.8 && forward < 1.0);
        approx(lcs_ratio("", "X"), 0.0);
    }

    #[test]
    fn candidate_scoring_weights_components() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).expect("date");
        let invoice = invoice(50_000_000, date, "PT MAJU", "INV-100");
        let txn = transaction(50_000_000, date, "TRF PT MAJU INV-100", "");

        let score = score_candidate(&invoice, &txn);
        approx(score.amount, 1.0);
        approx(score.date, 1.0);
        approx(score.vendor, 1.0);
        approx(score.reference, 0.8);
        approx(score.total, 0.5 + 0.25 + 0.15 + 0.08);
        assert_eq!(score.amount_variance_minor, 0);
        assert_eq!(score.date_variance_days, 0);
    }
}
