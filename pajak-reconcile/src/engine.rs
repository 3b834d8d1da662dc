use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use chrono::Utc;
use pajak_mapper::SmartMapper;
use pajak_parsers::parse_amount_minor;
use pajak_parsers::parse_flexible_date;
use pajak_storage::Store;
use pajak_storage::User;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::BankTransaction;
use crate::CreateProjectRequest;
use crate::HIGH_CONFIDENCE;
use crate::InvoiceId;
use crate::InvoiceKind;
use crate::MEDIUM_CONFIDENCE;
use crate::MatchId;
use crate::MatchScore;
use crate::MatchState;
use crate::MatchStatus;
use crate::MatchType;
use crate::ProjectCounters;
use crate::ProjectId;
use crate::ProjectStatus;
use crate::ProjectTotals;
use crate::ReconError;
use crate::ReconResult;
use crate::ReconStore;
use crate::ReconciliationMatch;
use crate::ReconciliationProject;
use crate::TaxInvoice;
use crate::TransactionId;
use crate::WithholdingEvidence;
use crate::generate_id;
use crate::score_candidate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AiExtractionSummary {
    pub processed: usize,
    pub extracted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoMatchOutcome {
    pub project_id: ProjectId,
    pub total_invoices: usize,
    pub total_transactions: usize,
    pub matches_found: usize,
    pub high_confidence_matches: usize,
    pub medium_confidence_matches: usize,
    pub low_confidence_matches: usize,
    pub processing_time_seconds: f64,
}

/// Scores candidate (invoice, transaction) pairs and runs greedy
/// first-best assignment. Greedy is the accepted trade-off here; a
/// bipartite assignment would be globally better at more compute.
pub struct ReconciliationEngine {
    pub(crate) store: Arc<dyn ReconStore>,
    scans: Arc<dyn Store>,
    mapper: Option<Arc<dyn SmartMapper>>,
}

impl ReconciliationEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn ReconStore>,
        scans: Arc<dyn Store>,
        mapper: Option<Arc<dyn SmartMapper>>,
    ) -> Self {
        Self {
            store,
            scans,
            mapper,
        }
    }

    pub async fn create_project(
        &self,
        user: &User,
        request: CreateProjectRequest,
    ) -> ReconResult<ReconciliationProject> {
        let request = request.normalize()?;
        let now = Utc::now();
        let project = ReconciliationProject {
            id: generate_id(),
            user_id: user.id.clone(),
            name: request.name,
            description: request.description,
            period_start: request.period_start,
            period_end: request.period_end,
            company_npwp: request.company_npwp,
            status: ProjectStatus::Active,
            counters: ProjectCounters::default(),
            totals: ProjectTotals::default(),
            created_at: now,
            updated_at: now,
        };
        let project = self.store.create_project(project).await?;
        info!(project_id = %project.id, name = %project.name, "reconciliation project created");
        Ok(project)
    }

    pub async fn get_project(
        &self,
        user: &User,
        project_id: &ProjectId,
    ) -> ReconResult<ReconciliationProject> {
        let project = self.store.get_project(project_id).await?;
        Self::require_owner(user, &project)?;
        Ok(project)
    }

    pub async fn list_projects(&self, user: &User) -> ReconResult<Vec<ReconciliationProject>> {
        self.store.list_projects_for_user(&user.id).await
    }

    pub async fn list_invoices(
        &self,
        user: &User,
        project_id: &ProjectId,
    ) -> ReconResult<Vec<TaxInvoice>> {
        self.get_project(user, project_id).await?;
        self.store.list_invoices(project_id).await
    }

    pub async fn list_transactions(
        &self,
        user: &User,
        project_id: &ProjectId,
    ) -> ReconResult<Vec<BankTransaction>> {
        self.get_project(user, project_id).await?;
        self.store.list_transactions(project_id).await
    }

    pub async fn list_matches(
        &self,
        user: &User,
        project_id: &ProjectId,
    ) -> ReconResult<Vec<ReconciliationMatch>> {
        self.get_project(user, project_id).await?;
        self.store.list_matches(project_id).await
    }

    fn require_owner(user: &User, project: &ReconciliationProject) -> ReconResult<()> {
        if user.is_admin || project.user_id == user.id {
            Ok(())
        } else {
            Err(ReconError::Validation(format!(
                "project {} belongs to another user",
                project.id
            )))
        }
    }

    async fn batch_scan_results(
        &self,
        user: &User,
        batch_id: &str,
        document_types: &[&str],
    ) -> ReconResult<Vec<pajak_storage::ScanResult>> {
        let batch = self
            .scans
            .get_batch(&batch_id.to_string())
            .await
            .map_err(|err| ReconError::Storage(err.to_string()))?;
        if !user.is_admin && batch.user_id != user.id {
            return Err(ReconError::Validation(format!(
                "batch {batch_id} belongs to another user"
            )));
        }
        let results = self
            .scans
            .list_results_for_batch(&batch_id.to_string())
            .await
            .map_err(|err| ReconError::Storage(err.to_string()))?;
        Ok(results
            .into_iter()
            .filter(|result| document_types.contains(&result.document_type.as_str()))
            .collect())
    }

    /// Imports faktur pajak rows out of a processed scan batch. Idempotent
    /// by scan result id: re-running skips everything already imported.
    pub async fn import_invoices_from_batch(
        &self,
        user: &User,
        project_id: &ProjectId,
        batch_id: &str,
    ) -> ReconResult<ImportSummary> {
        self.get_project(user, project_id).await?;
        let results = self
            .batch_scan_results(user, batch_id, &["faktur_pajak"])
            .await?;

        let mut summary = ImportSummary::default();
        for result in results {
            summary.total += 1;
            if self
                .store
                .find_invoice_by_scan(project_id, &result.id)
                .await?
                .is_some()
            {
                summary.skipped += 1;
                continue;
            }
            let Some(fields) = invoice_fields(&result.extracted_data) else {
                warn!(
                    scan_result = %result.id,
                    file = %result.original_filename,
                    "skipping invoice with unparseable fields"
                );
                summary.skipped += 1;
                continue;
            };
            let invoice = TaxInvoice {
                id: generate_id(),
                project_id: project_id.clone(),
                scan_result_id: Some(result.id.clone()),
                invoice_number: fields.number,
                invoice_date: fields.date,
                invoice_type: fields.kind,
                vendor_name: fields.vendor_name,
                vendor_npwp: fields.vendor_npwp,
                dpp_minor: fields.dpp_minor,
                ppn_minor: fields.ppn_minor,
                total_amount_minor: fields.total_minor,
                ai_model_used: fields.ai_model_used,
                extraction_confidence: result.confidence,
                match_status: MatchStatus::Unmatched,
                match_confidence: 0.0,
                matched_transaction_id: None,
                matched_by: None,
                matched_at: None,
            };
            self.store.insert_invoice(invoice).await?;
            summary.imported += 1;
        }

        self.update_project_statistics(project_id).await?;
        info!(
            project_id = %project_id,
            imported = summary.imported,
            skipped = summary.skipped,
            "invoice import finished"
        );
        Ok(summary)
    }

    /// Imports bank transactions out of rekening-koran scan results.
    /// Idempotent by (scan result id, date, description).
    pub async fn import_transactions_from_batch(
        &self,
        user: &User,
        project_id: &ProjectId,
        batch_id: &str,
    ) -> ReconResult<ImportSummary> {
        self.get_project(user, project_id).await?;
        let results = self
            .batch_scan_results(user, batch_id, &["rekening_koran"])
            .await?;

        let mut summary = ImportSummary::default();
        for result in results {
            let extracted = &result.extracted_data;
            let rows = transaction_rows(extracted);
            let bank_name = string_at(extracted, &["bank_info", "nama_bank"])
                .or_else(|| string_at(extracted, &["bank_name"]))
                .unwrap_or_default();
            let account_number = string_at(extracted, &["bank_info", "nomor_rekening"])
                .or_else(|| string_at(extracted, &["nomor_rekening"]))
                .unwrap_or_default();
            let account_holder = string_at(extracted, &["bank_info", "nama_pemilik"])
                .unwrap_or_default();

            for row in rows {
                summary.total += 1;
                let Some(date) = row
                    .get("tanggal")
                    .and_then(serde_json::Value::as_str)
                    .and_then(parse_flexible_date)
                else {
                    summary.skipped += 1;
                    continue;
                };
                let description = row
                    .get("keterangan")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if self
                    .store
                    .transaction_exists(&result.id, date, &description)
                    .await?
                {
                    summary.skipped += 1;
                    continue;
                }

                let transaction = BankTransaction {
                    id: generate_id(),
                    project_id: project_id.clone(),
                    scan_result_id: Some(result.id.clone()),
                    bank_name: bank_name.clone(),
                    account_number: account_number.clone(),
                    account_holder: account_holder.clone(),
                    transaction_date: date,
                    description,
                    transaction_type: row
                        .get("jenis")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    reference_number: row
                        .get("referensi")
                        .or_else(|| row.get("nomor_referensi"))
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    debit_minor: amount_at(row, &["debet", "debit"]),
                    credit_minor: amount_at(row, &["kredit", "credit"]),
                    balance_minor: amount_at(row, &["saldo", "balance"]),
                    extracted_vendor_name: None,
                    extracted_invoice_number: None,
                    ai_model_used: None,
                    extraction_confidence: result.confidence,
                    match_status: MatchStatus::Unmatched,
                    match_confidence: 0.0,
                    matched_invoice_id: None,
                    matched_by: None,
                    matched_at: None,
                };
                self.store.insert_transaction(transaction).await?;
                summary.imported += 1;
            }
        }

        self.update_project_statistics(project_id).await?;
        info!(
            project_id = %project_id,
            imported = summary.imported,
            skipped = summary.skipped,
            "transaction import finished"
        );
        Ok(summary)
    }

    /// Imports bukti potong (PPh 21/23) rows, the C leg of the PPN
    /// variant. Idempotent by scan result id.
    pub async fn import_evidence_from_batch(
        &self,
        user: &User,
        project_id: &ProjectId,
        batch_id: &str,
    ) -> ReconResult<ImportSummary> {
        self.get_project(user, project_id).await?;
        let results = self
            .batch_scan_results(user, batch_id, &["pph21", "pph23"])
            .await?;

        let mut summary = ImportSummary::default();
        for result in results {
            summary.total += 1;
            if self
                .store
                .find_evidence_by_scan(project_id, &result.id)
                .await?
                .is_some()
            {
                summary.skipped += 1;
                continue;
            }
            let Some(fields) = evidence_fields(&result.extracted_data) else {
                summary.skipped += 1;
                continue;
            };
            let evidence = WithholdingEvidence {
                id: generate_id(),
                project_id: project_id.clone(),
                scan_result_id: Some(result.id.clone()),
                document_number: fields.number,
                document_date: fields.date,
                counterparty_name: fields.counterparty_name,
                counterparty_npwp: fields.counterparty_npwp,
                gross_amount_minor: fields.gross_minor,
                withheld_minor: fields.withheld_minor,
                match_status: MatchStatus::Unmatched,
                match_confidence: 0.0,
                matched_invoice_id: None,
            };
            self.store.insert_evidence(evidence).await?;
            summary.imported += 1;
        }

        Ok(summary)
    }

    /// Pulls clean vendor names out of messy transaction descriptions via
    /// the smart mapper. Rows that already carry one are left alone.
    pub async fn ai_extract_vendor_from_transactions(
        &self,
        user: &User,
        project_id: &ProjectId,
        batch_size: usize,
    ) -> ReconResult<AiExtractionSummary> {
        let Some(mapper) = self.mapper.clone() else {
            warn!("smart mapper unavailable; skipping vendor extraction");
            return Ok(AiExtractionSummary::default());
        };
        self.get_project(user, project_id).await?;

        let mut summary = AiExtractionSummary::default();
        let transactions = self.store.list_transactions(project_id).await?;
        for mut transaction in transactions
            .into_iter()
            .filter(|transaction| transaction.extracted_vendor_name.is_none())
            .take(batch_size.max(1))
        {
            summary.processed += 1;
            let text = format!(
                "{} {}",
                transaction.description, transaction.reference_number
            );
            match mapper
                .extract_from_text(&text, "vendor_extraction", None)
                .await
            {
                Ok(payload) => {
                    let vendor = payload
                        .get("vendor_name")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    if vendor.is_empty() || vendor == "UNKNOWN" {
                        summary.failed += 1;
                        continue;
                    }
                    transaction.extracted_vendor_name = Some(vendor);
                    transaction.ai_model_used = Some(mapper.model_name().to_string());
                    transaction.extraction_confidence = 0.85;
                    self.store.save_transaction(&transaction).await?;
                    summary.extracted += 1;
                }
                Err(err) => {
                    warn!(transaction_id = %transaction.id, error = %err, "vendor extraction failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Pulls invoice numbers out of transaction references/descriptions.
    pub async fn ai_extract_invoice_from_transactions(
        &self,
        user: &User,
        project_id: &ProjectId,
        batch_size: usize,
    ) -> ReconResult<AiExtractionSummary> {
        let Some(mapper) = self.mapper.clone() else {
            warn!("smart mapper unavailable; skipping invoice number extraction");
            return Ok(AiExtractionSummary::default());
        };
        self.get_project(user, project_id).await?;

        let mut summary = AiExtractionSummary::default();
        let transactions = self.store.list_transactions(project_id).await?;
        for mut transaction in transactions
            .into_iter()
            .filter(|transaction| transaction.extracted_invoice_number.is_none())
            .take(batch_size.max(1))
        {
            summary.processed += 1;
            let text = format!(
                "{} {}",
                transaction.description, transaction.reference_number
            );
            match mapper
                .extract_from_text(&text, "invoice_number_extraction", None)
                .await
            {
                Ok(payload) => {
                    let number = payload
                        .get("invoice_number")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    if number.is_empty() || number == "NONE" {
                        summary.failed += 1;
                        continue;
                    }
                    transaction.extracted_invoice_number = Some(number);
                    transaction.ai_model_used = Some(mapper.model_name().to_string());
                    transaction.extraction_confidence = 0.90;
                    self.store.save_transaction(&transaction).await?;
                    summary.extracted += 1;
                }
                Err(err) => {
                    warn!(transaction_id = %transaction.id, error = %err, "invoice number extraction failed");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Greedy first-best assignment. Invoices are visited in declared
    /// order; each takes the highest-scoring unmatched transaction at or
    /// above the threshold, and a consumed transaction is gone for the
    /// rest of the pass.
    pub async fn auto_match_project(
        &self,
        user: &User,
        project_id: &ProjectId,
        min_confidence: f64,
    ) -> ReconResult<AutoMatchOutcome> {
        let started = Instant::now();
        self.get_project(user, project_id).await?;

        let invoices = self
            .store
            .list_invoices(project_id)
            .await?
            .into_iter()
            .filter(|invoice| invoice.match_status == MatchStatus::Unmatched)
            .collect::<Vec<_>>();
        let mut transactions = self
            .store
            .list_transactions(project_id)
            .await?
            .into_iter()
            .filter(|transaction| transaction.match_status == MatchStatus::Unmatched)
            .collect::<Vec<_>>();

        let mut outcome = AutoMatchOutcome {
            project_id: project_id.clone(),
            total_invoices: invoices.len(),
            total_transactions: transactions.len(),
            matches_found: 0,
            high_confidence_matches: 0,
            medium_confidence_matches: 0,
            low_confidence_matches: 0,
            processing_time_seconds: 0.0,
        };
        if invoices.is_empty() || transactions.is_empty() {
            return Ok(outcome);
        }

        let mut consumed: HashSet<TransactionId> = HashSet::new();
        for mut invoice in invoices {
            let mut best: Option<(usize, MatchScore)> = None;
            for (index, transaction) in transactions.iter().enumerate() {
                if consumed.contains(&transaction.id) {
                    continue;
                }
                let score = score_candidate(&invoice, transaction);
                if score.total < min_confidence {
                    continue;
                }
                let better = best
                    .as_ref()
                    .is_none_or(|(_, current)| score.total > current.total);
                if better {
                    best = Some((index, score));
                }
            }

            let Some((index, score)) = best else {
                continue;
            };
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

            outcome.matches_found += 1;
            if score.total >= HIGH_CONFIDENCE {
                outcome.high_confidence_matches += 1;
            } else if score.total >= MEDIUM_CONFIDENCE {
                outcome.medium_confidence_matches += 1;
            } else {
                outcome.low_confidence_matches += 1;
            }
        }

        self.update_project_statistics(project_id).await?;
        outcome.processing_time_seconds = started.elapsed().as_secs_f64();
        info!(
            project_id = %project_id,
            matches = outcome.matches_found,
            high = outcome.high_confidence_matches,
            "auto-matching finished"
        );
        Ok(outcome)
    }

    /// Top-k candidate transactions for one invoice, scored and sorted.
    pub async fn suggest_matches(
        &self,
        user: &User,
        project_id: &ProjectId,
        invoice_id: &InvoiceId,
        limit: usize,
    ) -> ReconResult<Vec<(BankTransaction, MatchScore)>> {
        self.get_project(user, project_id).await?;
        let invoice = self.store.get_invoice(invoice_id).await?;
        if invoice.project_id != *project_id {
            return Err(ReconError::NotFound(format!(
                "invoice {invoice_id} in project {project_id}"
            )));
        }

        let mut suggestions = self
            .store
            .list_transactions(project_id)
            .await?
            .into_iter()
            .filter(|transaction| transaction.match_status == MatchStatus::Unmatched)
            .map(|transaction| {
                let score = score_candidate(&invoice, &transaction);
                (transaction, score)
            })
            .collect::<Vec<_>>();
        suggestions.sort_by(|left, right| {
            right
                .1
                .total
                .partial_cmp(&left.1.total)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        suggestions.truncate(limit.max(1));
        Ok(suggestions)
    }

    /// User-asserted match. The threshold does not apply; the score is
    /// still computed and stored for audit.
    pub async fn manual_match(
        &self,
        user: &User,
        project_id: &ProjectId,
        invoice_id: &InvoiceId,
        transaction_id: &TransactionId,
        notes: Option<String>,
    ) -> ReconResult<ReconciliationMatch> {
        self.get_project(user, project_id).await?;
        let mut invoice = self.store.get_invoice(invoice_id).await?;
        let mut transaction = self.store.get_transaction(transaction_id).await?;
        if invoice.project_id != *project_id || transaction.project_id != *project_id {
            return Err(ReconError::NotFound(
                "invoice or transaction not in project".into(),
            ));
        }
        if invoice.match_status.is_matched() {
            return Err(ReconError::Conflict(format!(
                "invoice {invoice_id} is already matched"
            )));
        }
        if transaction.match_status.is_matched() {
            return Err(ReconError::Conflict(format!(
                "transaction {transaction_id} is already matched"
            )));
        }

        let score = score_candidate(&invoice, &transaction);
        let entry = self
            .record_match(
                project_id,
                &mut invoice,
                &mut transaction,
                score,
                MatchType::Manual,
                Some(user.id.clone()),
                notes,
            )
            .await?;
        self.update_project_statistics(project_id).await?;
        Ok(entry)
    }

    /// Rejects a match and returns both sides to unmatched.
    pub async fn unmatch(
        &self,
        user: &User,
        project_id: &ProjectId,
        match_id: &MatchId,
        reason: Option<String>,
    ) -> ReconResult<()> {
        self.get_project(user, project_id).await?;
        let mut entry = self.store.get_match(match_id).await?;
        if entry.project_id != *project_id {
            return Err(ReconError::NotFound(format!(
                "match {match_id} in project {project_id}"
            )));
        }
        if entry.status == MatchState::Rejected {
            return Err(ReconError::Validation(format!(
                "match {match_id} is already rejected"
            )));
        }

        entry.status = MatchState::Rejected;
        entry.rejection_reason = reason;
        self.store.save_match(&entry).await?;

        if let Ok(mut invoice) = self.store.get_invoice(&entry.invoice_id).await {
            invoice.match_status = MatchStatus::Unmatched;
            invoice.match_confidence = 0.0;
            invoice.matched_transaction_id = None;
            invoice.matched_by = None;
            invoice.matched_at = None;
            self.store.save_invoice(&invoice).await?;
        }
        if let Ok(mut transaction) = self.store.get_transaction(&entry.transaction_id).await {
            transaction.match_status = MatchStatus::Unmatched;
            transaction.match_confidence = 0.0;
            transaction.matched_invoice_id = None;
            transaction.matched_by = None;
            transaction.matched_at = None;
            self.store.save_transaction(&transaction).await?;
        }

        self.update_project_statistics(project_id).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn record_match(
        &self,
        project_id: &ProjectId,
        invoice: &mut TaxInvoice,
        transaction: &mut BankTransaction,
        score: MatchScore,
        match_type: MatchType,
        matched_by: Option<String>,
        notes: Option<String>,
    ) -> ReconResult<ReconciliationMatch> {
        let entry = ReconciliationMatch {
            id: generate_id(),
            project_id: project_id.clone(),
            invoice_id: invoice.id.clone(),
            transaction_id: transaction.id.clone(),
            match_type,
            match_score: score.total,
            amount_variance_minor: score.amount_variance_minor,
            date_variance_days: score.date_variance_days,
            score_amount: score.amount,
            score_date: score.date,
            score_vendor: score.vendor,
            score_reference: score.reference,
            status: MatchState::Active,
            confirmed: false,
            rejection_reason: None,
            notes,
            matched_by: matched_by.clone(),
            created_at: Utc::now(),
        };
        let entry = self.store.insert_match(entry).await?;

        let status = match match_type {
            MatchType::Auto => MatchStatus::AutoMatched,
            MatchType::Manual => MatchStatus::ManualMatched,
        };
        let now = Utc::now();

        invoice.match_status = status;
        invoice.match_confidence = score.total;
        invoice.matched_transaction_id = Some(transaction.id.clone());
        invoice.matched_by = matched_by.clone();
        invoice.matched_at = Some(now);
        self.store.save_invoice(invoice).await?;

        transaction.match_status = status;
        transaction.match_confidence = score.total;
        transaction.matched_invoice_id = Some(invoice.id.clone());
        transaction.matched_by = matched_by;
        transaction.matched_at = Some(now);
        self.store.save_transaction(transaction).await?;

        Ok(entry)
    }

    /// Recomputes counters and totals from the authoritative rows.
    pub async fn update_project_statistics(&self, project_id: &ProjectId) -> ReconResult<()> {
        let mut project = self.store.get_project(project_id).await?;
        let invoices = self.store.list_invoices(project_id).await?;
        let transactions = self.store.list_transactions(project_id).await?;
        let matches = self.store.list_matches(project_id).await?;

        let matched_invoices = invoices
            .iter()
            .filter(|invoice| invoice.match_status.is_matched())
            .count();
        let matched_transactions = transactions
            .iter()
            .filter(|transaction| transaction.match_status.is_matched())
            .count();
        let invoice_sum: i64 = invoices
            .iter()
            .map(|invoice| invoice.total_amount_minor)
            .sum();
        let transaction_sum: i64 = transactions
            .iter()
            .map(|transaction| transaction.credit_minor + transaction.debit_minor)
            .sum();

        project.counters = ProjectCounters {
            total_invoices: invoices.len(),
            total_transactions: transactions.len(),
            matched_count: matches
                .iter()
                .filter(|entry| entry.status == MatchState::Active)
                .count(),
            unmatched_invoices: invoices.len() - matched_invoices,
            unmatched_transactions: transactions.len() - matched_transactions,
        };
        project.totals = ProjectTotals {
            invoice_sum_minor: invoice_sum,
            transaction_sum_minor: transaction_sum,
            variance_minor: (invoice_sum - transaction_sum).abs(),
        };
        project.updated_at = Utc::now();
        self.store.save_project(&project).await
    }
}

struct InvoiceFields {
    number: String,
    date: NaiveDate,
    kind: InvoiceKind,
    vendor_name: String,
    vendor_npwp: String,
    dpp_minor: i64,
    ppn_minor: i64,
    total_minor: i64,
    ai_model_used: Option<String>,
}

/// Reads invoice fields out of an opaque scan payload. The smart-mapped
/// shape is preferred; the flat legacy keys are the fallback. Extracted
/// maps are feature-tested, never deep-typed.
fn invoice_fields(extracted: &serde_json::Value) -> Option<InvoiceFields> {
    let source = extracted.get("smart_mapped").unwrap_or(extracted);

    let number = string_at(source, &["invoice", "number"])
        .or_else(|| string_at(source, &["nomor_faktur"]))
        .unwrap_or_default();
    let date = string_at(source, &["invoice", "issueDate"])
        .or_else(|| string_at(source, &["tanggal_faktur"]))
        .as_deref()
        .and_then(parse_flexible_date)?;
    let kind = match string_at(source, &["invoice", "kind"])
        .or_else(|| string_at(source, &["jenis_faktur"]))
        .unwrap_or_default()
        .to_ascii_lowercase()
        .as_str()
    {
        "masukan" => InvoiceKind::Masukan,
        _ => InvoiceKind::Keluaran,
    };
    let vendor_name = string_at(source, &["seller", "name"])
        .or_else(|| string_at(source, &["nama_penjual"]))
        .unwrap_or_default();
    let vendor_npwp = string_at(source, &["seller", "npwp"])
        .or_else(|| string_at(source, &["npwp_penjual"]))
        .unwrap_or_default();

    let financials = source.get("financials").unwrap_or(source);
    Some(InvoiceFields {
        number,
        date,
        kind,
        vendor_name,
        vendor_npwp,
        dpp_minor: amount_at(financials, &["dpp"]),
        ppn_minor: amount_at(financials, &["ppn"]),
        total_minor: amount_at(financials, &["total"]),
        ai_model_used: string_at(extracted, &["ai_model_used"]),
    })
}

struct EvidenceFields {
    number: String,
    date: NaiveDate,
    counterparty_name: String,
    counterparty_npwp: String,
    gross_minor: i64,
    withheld_minor: i64,
}

fn evidence_fields(extracted: &serde_json::Value) -> Option<EvidenceFields> {
    let source = extracted.get("smart_mapped").unwrap_or(extracted);
    let date = string_at(source, &["tanggal"])
        .or_else(|| string_at(source, &["document", "date"]))
        .as_deref()
        .and_then(parse_flexible_date)?;
    Some(EvidenceFields {
        number: string_at(source, &["nomor"])
            .or_else(|| string_at(source, &["document", "number"]))
            .unwrap_or_default(),
        date,
        counterparty_name: string_at(source, &["identitas_penerima_penghasilan", "nama"])
            .or_else(|| string_at(source, &["counterparty", "name"]))
            .unwrap_or_default(),
        counterparty_npwp: string_at(source, &["identitas_penerima_penghasilan", "npwp_nik"])
            .or_else(|| string_at(source, &["counterparty", "npwp"]))
            .unwrap_or_default(),
        gross_minor: amount_at(source, &["penghasilan_bruto", "gross_amount"]),
        withheld_minor: amount_at(source, &["pph", "withheld"]),
    })
}

/// The hybrid report keeps transactions at the top level; the simplified
/// flow nests them under the smart-mapped payload. Either shape imports.
fn transaction_rows(extracted: &serde_json::Value) -> Vec<&serde_json::Value> {
    if let Some(rows) = extracted
        .get("transactions")
        .and_then(serde_json::Value::as_array)
    {
        return rows.iter().collect();
    }
    if let Some(rows) = extracted
        .get("smart_mapped")
        .and_then(|mapped| mapped.get("transactions"))
        .and_then(serde_json::Value::as_array)
    {
        return rows.iter().collect();
    }
    Vec::new()
}

/// Walks a dotted path of object keys; a single-element path is a flat key.
fn string_at(value: &serde_json::Value, path: &[&str]) -> Option<String> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(key)?;
    }
    match cursor {
        serde_json::Value::String(text) if !text.trim().is_empty() => {
            Some(text.trim().to_string())
        }
        _ => None,
    }
}

/// First present key wins; strings go through the lenient amount parser,
/// numbers are whole currency units.
fn amount_at(value: &serde_json::Value, keys: &[&str]) -> i64 {
    for key in keys {
        match value.get(key) {
            Some(serde_json::Value::String(text)) => {
                if let Some(minor) = parse_amount_minor(text) {
                    return minor;
                }
            }
            Some(serde_json::Value::Number(number)) => {
                if let Some(amount) = number.as_f64() {
                    return (amount * 100.0).round() as i64;
                }
            }
            _ => {}
        }
    }
    0
}
