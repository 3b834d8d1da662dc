//! PPN reconciliation variant. The document set {Faktur Keluaran (A),
//! Faktur Masukan (B), Bukti Potong (C), Rekening Koran (E)} is treated
//! together: invoices are auto-split into A or B by comparing the seller's
//! NPWP against the project's company NPWP, then A pairs against C and B
//! against E with the standard scoring framework.

use std::collections::HashSet;

use pajak_storage::User;
use serde::Serialize;
use tracing::info;

use crate::InvoiceId;
use crate::InvoiceKind;
use crate::MatchStatus;
use crate::MatchType;
use crate::ProjectId;
use crate::ReconError;
use crate::ReconResult;
use crate::ReconciliationEngine;
use crate::TaxInvoice;
use crate::WithholdingEvidence;
use crate::npwp_matches;
use crate::scoring;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PpnSplit {
    pub keluaran: Vec<InvoiceId>,
    pub masukan: Vec<InvoiceId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PpnMatchOutcome {
    pub project_id: ProjectId,
    pub split: PpnSplit,
    pub evidence_matches: usize,
    pub transaction_matches: usize,
}

impl ReconciliationEngine {
    /// Routes each unmatched invoice into A (the company is the seller,
    /// output tax) or B (input tax). The decision is recorded on the row.
    pub async fn ppn_split_invoices(
        &self,
        user: &User,
        project_id: &ProjectId,
    ) -> ReconResult<PpnSplit> {
        let project = self.get_project(user, project_id).await?;
        if project.company_npwp.trim().is_empty() {
            return Err(ReconError::Validation(
                "PPN reconciliation requires the project company NPWP".into(),
            ));
        }

        let mut split = PpnSplit::default();
        for mut invoice in self.store.list_invoices(project_id).await? {
            let kind = if npwp_matches(&invoice.vendor_npwp, &project.company_npwp) {
                InvoiceKind::Keluaran
            } else {
                InvoiceKind::Masukan
            };
            if invoice.invoice_type != kind {
                invoice.invoice_type = kind;
                self.store.save_invoice(&invoice).await?;
            }
            match kind {
                InvoiceKind::Keluaran => split.keluaran.push(invoice.id),
                InvoiceKind::Masukan => split.masukan.push(invoice.id),
            }
        }
        Ok(split)
    }

    /// The full PPN pass: split, then A↔C against withholding evidence and
    /// B↔E against bank transactions, both greedy first-best.
    pub async fn ppn_auto_match(
        &self,
        user: &User,
        project_id: &ProjectId,
        min_confidence: f64,
    ) -> ReconResult<PpnMatchOutcome> {
        let split = self.ppn_split_invoices(user, project_id).await?;

        let invoices = self.store.list_invoices(project_id).await?;
        let keluaran_ids: HashSet<&InvoiceId> = split.keluaran.iter().collect();
        let masukan_ids: HashSet<&InvoiceId> = split.masukan.iter().collect();

        let evidence_matches = self
            .match_against_evidence(
                project_id,
                invoices
                    .iter()
                    .filter(|invoice| {
                        keluaran_ids.contains(&invoice.id)
                            && invoice.match_status == MatchStatus::Unmatched
                    })
                    .cloned()
                    .collect(),
                min_confidence,
            )
            .await?;

        let transaction_matches = self
            .match_subset_against_transactions(
                project_id,
                invoices
                    .into_iter()
                    .filter(|invoice| {
                        masukan_ids.contains(&invoice.id)
                            && invoice.match_status == MatchStatus::Unmatched
                    })
                    .collect(),
                min_confidence,
            )
            .await?;

        self.update_project_statistics(project_id).await?;
        info!(
            project_id = %project_id,
            keluaran = split.keluaran.len(),
            masukan = split.masukan.len(),
            evidence_matches,
            transaction_matches,
            "PPN reconciliation finished"
        );

        Ok(PpnMatchOutcome {
            project_id: project_id.clone(),
            split,
            evidence_matches,
            transaction_matches,
        })
    }

    /// A↔C: evidence is scored with the same component curves, with the
    /// counterparty name standing in for the transaction description and
    /// the document number for the reference. The pairing is recorded on
    /// the evidence row.
    async fn match_against_evidence(
        &self,
        project_id: &ProjectId,
        invoices: Vec<TaxInvoice>,
        min_confidence: f64,
    ) -> ReconResult<usize> {
        let mut evidence = self
            .store
            .list_evidence(project_id)
            .await?
            .into_iter()
            .filter(|item| item.match_status == MatchStatus::Unmatched)
            .collect::<Vec<_>>();

        let mut matched = 0usize;
        for invoice in invoices {
            let mut best: Option<(usize, f64)> = None;
            for (index, item) in evidence.iter().enumerate() {
                if item.match_status.is_matched() {
                    continue;
                }
                let score = score_against_evidence(&invoice, item);
                if score < min_confidence {
                    continue;
                }
                if best.is_none_or(|(_, current)| score > current) {
                    best = Some((index, score));
                }
            }
            if let Some((index, score)) = best {
                let item = &mut evidence[index];
                item.match_status = MatchStatus::AutoMatched;
                item.match_confidence = score;
                item.matched_invoice_id = Some(invoice.id.clone());
                self.store.save_evidence(item).await?;
                matched += 1;
            }
        }
        Ok(matched)
    }

    /// B↔E: identical to the standard greedy pass, restricted to the B
    /// invoices.
    async fn match_subset_against_transactions(
        &self,
        project_id: &ProjectId,
        invoices: Vec<TaxInvoice>,
        min_confidence: f64,
    ) -> ReconResult<usize> {
        let mut transactions = self
            .store
            .list_transactions(project_id)
            .await?
            .into_iter()
            .filter(|transaction| transaction.match_status == MatchStatus::Unmatched)
            .collect::<Vec<_>>();

        let mut consumed: HashSet<String> = HashSet::new();
        let mut matched = 0usize;
        for mut invoice in invoices {
            let mut best: Option<(usize, crate::MatchScore)> = None;
            for (index, transaction) in transactions.iter().enumerate() {
                if consumed.contains(&transaction.id) {
                    continue;
                }
                let score = crate::score_candidate(&invoice, transaction);
                if score.total < min_confidence {
                    continue;
                }
                if best
                    .as_ref()
                    .is_none_or(|(_, current)| score.total > current.total)
                {
                    best = Some((index, score));
                }
            }
            if let Some((index, score)) = best {
                let transaction = &mut transactions[index];
                consumed.insert(transaction.id.clone());
                self.record_match(
                    project_id,
                    &mut invoice,
                    transaction,
                    score,
                    MatchType::Auto,
                    None,
                    None,
                )
                .await?;
                matched += 1;
            }
        }
        Ok(matched)
    }
}

fn score_against_evidence(invoice: &TaxInvoice, evidence: &WithholdingEvidence) -> f64 {
    let amount = scoring::amount_score(invoice.total_amount_minor, evidence.gross_amount_minor);
    let days = (invoice.invoice_date - evidence.document_date).num_days();
    let date = scoring::date_score(days);
    let vendor = scoring::vendor_score(&invoice.vendor_name, &evidence.counterparty_name, None);
    let reference = scoring::reference_score(
        &invoice.invoice_number,
        &evidence.document_number,
        "",
        None,
    );
    scoring::weighted_total(amount, date, vendor, reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crate::generate_id;

    fn evidence(gross_minor: i64, date: NaiveDate, counterparty: &str) -> WithholdingEvidence {
        WithholdingEvidence {
            id: generate_id(),
            project_id: "project".into(),
            scan_result_id: None,
            document_number: "BP-001".into(),
            document_date: date,
            counterparty_name: counterparty.into(),
            counterparty_npwp: String::new(),
            gross_amount_minor: gross_minor,
            withheld_minor: gross_minor / 50,
            match_status: MatchStatus::Unmatched,
            match_confidence: 0.0,
            matched_invoice_id: None,
        }
    }

    fn invoice(total_minor: i64, date: NaiveDate, vendor: &str) -> TaxInvoice {
        TaxInvoice {
            id: generate_id(),
            project_id: "project".into(),
            scan_result_id: None,
            invoice_number: "INV-001".into(),
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

    #[test]
    fn evidence_scoring_uses_the_same_curves() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).expect("date");
        let invoice = invoice(50_000_000, date, "PT MAJU");
        let exact = evidence(50_000_000, date, "PT MAJU");
        let off = evidence(30_000_000, date, "CV LAIN");

        let exact_score = score_against_evidence(&invoice, &exact);
        let off_score = score_against_evidence(&invoice, &off);
        assert!(exact_score > 0.85);
        assert!(off_score < exact_score);
    }
}
