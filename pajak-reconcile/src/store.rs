use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::BankTransaction;
use crate::EvidenceId;
use crate::InvoiceId;
use crate::MatchId;
use crate::ProjectId;
use crate::ReconError;
use crate::ReconResult;
use crate::ReconciliationMatch;
use crate::ReconciliationProject;
use crate::TaxInvoice;
use crate::TransactionId;
use crate::WithholdingEvidence;

#[async_trait]
pub trait ReconStore: Send + Sync {
    async fn create_project(
        &self,
        project: ReconciliationProject,
    ) -> ReconResult<ReconciliationProject>;

    async fn get_project(&self, project_id: &ProjectId) -> ReconResult<ReconciliationProject>;

    async fn save_project(&self, project: &ReconciliationProject) -> ReconResult<()>;

    async fn list_projects_for_user(&self, user_id: &str)
    -> ReconResult<Vec<ReconciliationProject>>;

    async fn insert_invoice(&self, invoice: TaxInvoice) -> ReconResult<TaxInvoice>;

    async fn get_invoice(&self, invoice_id: &InvoiceId) -> ReconResult<TaxInvoice>;

    async fn save_invoice(&self, invoice: &TaxInvoice) -> ReconResult<()>;

    /// Invoices in insertion order; auto-matching iterates this order.
    async fn list_invoices(&self, project_id: &ProjectId) -> ReconResult<Vec<TaxInvoice>>;

    async fn find_invoice_by_scan(
        &self,
        project_id: &ProjectId,
        scan_result_id: &str,
    ) -> ReconResult<Option<TaxInvoice>>;

    async fn insert_transaction(&self, transaction: BankTransaction)
    -> ReconResult<BankTransaction>;

    async fn get_transaction(&self, transaction_id: &TransactionId)
    -> ReconResult<BankTransaction>;

    async fn save_transaction(&self, transaction: &BankTransaction) -> ReconResult<()>;

    async fn list_transactions(&self, project_id: &ProjectId) -> ReconResult<Vec<BankTransaction>>;

    async fn transaction_exists(
        &self,
        scan_result_id: &str,
        transaction_date: NaiveDate,
        description: &str,
    ) -> ReconResult<bool>;

    async fn insert_evidence(
        &self,
        evidence: WithholdingEvidence,
    ) -> ReconResult<WithholdingEvidence>;

    async fn save_evidence(&self, evidence: &WithholdingEvidence) -> ReconResult<()>;

    async fn list_evidence(&self, project_id: &ProjectId) -> ReconResult<Vec<WithholdingEvidence>>;

    async fn find_evidence_by_scan(
        &self,
        project_id: &ProjectId,
        scan_result_id: &str,
    ) -> ReconResult<Option<WithholdingEvidence>>;

    async fn insert_match(&self, entry: ReconciliationMatch) -> ReconResult<ReconciliationMatch>;

    async fn get_match(&self, match_id: &MatchId) -> ReconResult<ReconciliationMatch>;

    async fn save_match(&self, entry: &ReconciliationMatch) -> ReconResult<()>;

    async fn list_matches(&self, project_id: &ProjectId) -> ReconResult<Vec<ReconciliationMatch>>;
}

#[derive(Default)]
struct ReconState {
    projects: HashMap<ProjectId, ReconciliationProject>,
    invoices: HashMap<InvoiceId, TaxInvoice>,
    invoice_order: HashMap<ProjectId, Vec<InvoiceId>>,
    transactions: HashMap<TransactionId, BankTransaction>,
    transaction_order: HashMap<ProjectId, Vec<TransactionId>>,
    evidence: HashMap<EvidenceId, WithholdingEvidence>,
    evidence_order: HashMap<ProjectId, Vec<EvidenceId>>,
    matches: HashMap<MatchId, ReconciliationMatch>,
}

#[derive(Default)]
pub struct InMemoryReconStore {
    state: RwLock<ReconState>,
}

impl InMemoryReconStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconStore for InMemoryReconStore {
    async fn create_project(
        &self,
        project: ReconciliationProject,
    ) -> ReconResult<ReconciliationProject> {
        let mut guard = self.state.write().await;
        if guard.projects.contains_key(&project.id) {
            return Err(ReconError::Conflict(format!(
                "project {} already exists",
                project.id
            )));
        }
        guard.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn get_project(&self, project_id: &ProjectId) -> ReconResult<ReconciliationProject> {
        let guard = self.state.read().await;
        guard
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| ReconError::NotFound(format!("project {project_id}")))
    }

    async fn save_project(&self, project: &ReconciliationProject) -> ReconResult<()> {
        let mut guard = self.state.write().await;
        if !guard.projects.contains_key(&project.id) {
            return Err(ReconError::NotFound(format!("project {}", project.id)));
        }
        guard.projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn list_projects_for_user(
        &self,
        user_id: &str,
    ) -> ReconResult<Vec<ReconciliationProject>> {
        let guard = self.state.read().await;
        let mut projects = guard
            .projects
            .values()
            .filter(|project| project.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        projects.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(projects)
    }

    async fn insert_invoice(&self, invoice: TaxInvoice) -> ReconResult<TaxInvoice> {
        let mut guard = self.state.write().await;
        if !guard.projects.contains_key(&invoice.project_id) {
            return Err(ReconError::NotFound(format!(
                "project {}",
                invoice.project_id
            )));
        }
        guard
            .invoice_order
            .entry(invoice.project_id.clone())
            .or_default()
            .push(invoice.id.clone());
        guard.invoices.insert(invoice.id.clone(), invoice.clone());
        Ok(invoice)
    }

    async fn get_invoice(&self, invoice_id: &InvoiceId) -> ReconResult<TaxInvoice> {
        let guard = self.state.read().await;
        guard
            .invoices
            .get(invoice_id)
            .cloned()
            .ok_or_else(|| ReconError::NotFound(format!("invoice {invoice_id}")))
    }

    async fn save_invoice(&self, invoice: &TaxInvoice) -> ReconResult<()> {
        let mut guard = self.state.write().await;
        if !guard.invoices.contains_key(&invoice.id) {
            return Err(ReconError::NotFound(format!("invoice {}", invoice.id)));
        }
        guard.invoices.insert(invoice.id.clone(), invoice.clone());
        Ok(())
    }

    async fn list_invoices(&self, project_id: &ProjectId) -> ReconResult<Vec<TaxInvoice>> {
        let guard = self.state.read().await;
        Ok(guard
            .invoice_order
            .get(project_id)
            .map(|order| {
                order
                    .iter()
                    .filter_map(|id| guard.invoices.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_invoice_by_scan(
        &self,
        project_id: &ProjectId,
        scan_result_id: &str,
    ) -> ReconResult<Option<TaxInvoice>> {
        let guard = self.state.read().await;
        Ok(guard
            .invoices
            .values()
            .find(|invoice| {
                invoice.project_id == *project_id
                    && invoice.scan_result_id.as_deref() == Some(scan_result_id)
            })
            .cloned())
    }

    async fn insert_transaction(
        &self,
        transaction: BankTransaction,
    ) -> ReconResult<BankTransaction> {
        let mut guard = self.state.write().await;
        if !guard.projects.contains_key(&transaction.project_id) {
            return Err(ReconError::NotFound(format!(
                "project {}",
                transaction.project_id
            )));
        }
        guard
            .transaction_order
            .entry(transaction.project_id.clone())
            .or_default()
            .push(transaction.id.clone());
        guard
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(transaction)
    }

    async fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> ReconResult<BankTransaction> {
        let guard = self.state.read().await;
        guard
            .transactions
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| ReconError::NotFound(format!("transaction {transaction_id}")))
    }

    async fn save_transaction(&self, transaction: &BankTransaction) -> ReconResult<()> {
        let mut guard = self.state.write().await;
        if !guard.transactions.contains_key(&transaction.id) {
            return Err(ReconError::NotFound(format!(
                "transaction {}",
                transaction.id
            )));
        }
        guard
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }

    async fn list_transactions(
        &self,
        project_id: &ProjectId,
    ) -> ReconResult<Vec<BankTransaction>> {
        let guard = self.state.read().await;
        Ok(guard
            .transaction_order
            .get(project_id)
            .map(|order| {
                order
                    .iter()
                    .filter_map(|id| guard.transactions.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn transaction_exists(
        &self,
        scan_result_id: &str,
        transaction_date: NaiveDate,
        description: &str,
    ) -> ReconResult<bool> {
        let guard = self.state.read().await;
        Ok(guard.transactions.values().any(|transaction| {
            transaction.scan_result_id.as_deref() == Some(scan_result_id)
                && transaction.transaction_date == transaction_date
                && transaction.description == description
        }))
    }

    async fn insert_evidence(
        &self,
        evidence: WithholdingEvidence,
    ) -> ReconResult<WithholdingEvidence> {
        let mut guard = self.state.write().await;
        if !guard.projects.contains_key(&evidence.project_id) {
            return Err(ReconError::NotFound(format!(
                "project {}",
                evidence.project_id
            )));
        }
        guard
            .evidence_order
            .entry(evidence.project_id.clone())
            .or_default()
            .push(evidence.id.clone());
        guard.evidence.insert(evidence.id.clone(), evidence.clone());
        Ok(evidence)
    }

    async fn save_evidence(&self, evidence: &WithholdingEvidence) -> ReconResult<()> {
        let mut guard = self.state.write().await;
        if !guard.evidence.contains_key(&evidence.id) {
            return Err(ReconError::NotFound(format!("evidence {}", evidence.id)));
        }
        guard.evidence.insert(evidence.id.clone(), evidence.clone());
        Ok(())
    }

    async fn list_evidence(
        &self,
        project_id: &ProjectId,
    ) -> ReconResult<Vec<WithholdingEvidence>> {
        let guard = self.state.read().await;
        Ok(guard
            .evidence_order
            .get(project_id)
            .map(|order| {
                order
                    .iter()
                    .filter_map(|id| guard.evidence.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_evidence_by_scan(
        &self,
        project_id: &ProjectId,
        scan_result_id: &str,
    ) -> ReconResult<Option<WithholdingEvidence>> {
        let guard = self.state.read().await;
        Ok(guard
            .evidence
            .values()
            .find(|evidence| {
                evidence.project_id == *project_id
                    && evidence.scan_result_id.as_deref() == Some(scan_result_id)
            })
            .cloned())
    }

    async fn insert_match(&self, entry: ReconciliationMatch) -> ReconResult<ReconciliationMatch> {
        let mut guard = self.state.write().await;
        let duplicate = guard.matches.values().any(|existing| {
            existing.status == crate::MatchState::Active
                && existing.invoice_id == entry.invoice_id
                && existing.transaction_id == entry.transaction_id
        });
        if duplicate {
            return Err(ReconError::Conflict(format!(
                "active match already exists for invoice {} and transaction {}",
                entry.invoice_id, entry.transaction_id
            )));
        }
        guard.matches.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    async fn get_match(&self, match_id: &MatchId) -> ReconResult<ReconciliationMatch> {
        let guard = self.state.read().await;
        guard
            .matches
            .get(match_id)
            .cloned()
            .ok_or_else(|| ReconError::NotFound(format!("match {match_id}")))
    }

    async fn save_match(&self, entry: &ReconciliationMatch) -> ReconResult<()> {
        let mut guard = self.state.write().await;
        if !guard.matches.contains_key(&entry.id) {
            return Err(ReconError::NotFound(format!("match {}", entry.id)));
        }
        guard.matches.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn list_matches(&self, project_id: &ProjectId) -> ReconResult<Vec<ReconciliationMatch>> {
        let guard = self.state.read().await;
        let mut matches = guard
            .matches
            .values()
            .filter(|entry| entry.project_id == *project_id)
            .cloned()
            .collect::<Vec<_>>();
        matches.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(matches)
    }
}
