#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use pajak_bank::HybridBankProcessor;
use pajak_mapper::SmartMapper;
use pajak_ocr::OcrGateway;
use pajak_ocr::OcrRequest;
use pajak_parsers::DocumentType;
use pajak_parsers::ParserRegistry;
use pajak_progress::FileEventStatus;
use pajak_progress::ProgressBus;
use pajak_progress::ProgressEvent;
use pajak_security::FileSecurityValidator;
use pajak_security::sanitize_filename;
use pajak_storage::Batch;
use pajak_storage::BatchId;
use pajak_storage::BatchStatus;
use pajak_storage::DocumentFile;
use pajak_storage::FileStatus;
use pajak_storage::LogLevel;
use pajak_storage::ProcessingLog;
use pajak_storage::ScanResult;
use pajak_storage::StorageError;
use pajak_storage::Store;
use pajak_storage::User;
use pajak_storage::UserId;
use pajak_storage::generate_id;
use pajak_vault::FileVault;
use pajak_vault::VaultError;
use thiserror::Error;
use tracing::error;
use tracing::info;
use tracing::warn;

mod cancel;

pub use crate::cancel::BatchOwnership;
pub use crate::cancel::CancellationRegistry;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not permitted: {0}")]
    Forbidden(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub const DEFAULT_MAX_BATCH_FILES: usize = 50;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_batch_files: usize,
    /// Structured extraction through the smart mapper for invoice-family
    /// documents. Without it only raw-text envelopes are persisted.
    pub use_smart_mapper: bool,
    /// Hybrid rekening-koran processing. When off, the simplified flow
    /// delegates the whole statement to the smart mapper in one shot.
    /// The two flows never mix within a deployment.
    pub hybrid_bank: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch_files: DEFAULT_MAX_BATCH_FILES,
            use_smart_mapper: true,
            hybrid_bank: true,
        }
    }
}

/// One uploaded blob, as received by the API facade.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub declared_type: String,
    pub declared_mime: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub batch: Batch,
    pub files: Vec<DocumentFile>,
}

/// Drives a batch from accepted upload to terminal status. Exactly one
/// background task owns a batch id; files inside a batch run sequentially
/// to keep provider pressure bounded.
pub struct BatchOrchestrator {
    store: Arc<dyn Store>,
    vault: FileVault,
    security: FileSecurityValidator,
    ocr: OcrGateway,
    parsers: ParserRegistry,
    mapper: Option<Arc<dyn SmartMapper>>,
    hybrid: HybridBankProcessor,
    bus: Arc<ProgressBus>,
    cancellations: CancellationRegistry,
    ownership: BatchOwnership,
    config: PipelineConfig,
}

impl BatchOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        vault: FileVault,
        security: FileSecurityValidator,
        ocr: OcrGateway,
        mapper: Option<Arc<dyn SmartMapper>>,
        hybrid: HybridBankProcessor,
        bus: Arc<ProgressBus>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            vault,
            security,
            ocr,
            parsers: ParserRegistry::new(),
            mapper,
            hybrid,
            bus,
            cancellations: CancellationRegistry::default(),
            ownership: BatchOwnership::default(),
            config,
        }
    }

    #[must_use]
    pub fn cancellations(&self) -> &CancellationRegistry {
        &self.cancellations
    }

    /// Accepts an upload batch: one Batch row, one DocumentFile row per
    /// file. Files that fail security validation are recorded as failed and
    /// logged; they never reach the vault. Only a batch whose every file
    /// was rejected comes back already failed.
    pub async fn submit_batch(
        &self,
        user_id: &UserId,
        files: Vec<UploadedFile>,
    ) -> PipelineResult<SubmitOutcome> {
        let user = self.store.get_user(user_id).await?;
        if !user.is_active {
            return Err(PipelineError::Forbidden(format!(
                "user {} is deactivated",
                user.username
            )));
        }
        if files.is_empty() {
            return Err(PipelineError::Validation(
                "at least one file is required".into(),
            ));
        }
        if files.len() > self.config.max_batch_files {
            return Err(PipelineError::Validation(format!(
                "batch of {} files exceeds the limit of {}",
                files.len(),
                self.config.max_batch_files
            )));
        }

        let batch = self
            .store
            .insert_batch(Batch::new(user_id.clone(), files.len()))
            .await?;

        let mut stored_files = Vec::with_capacity(files.len());
        let mut rejected = 0usize;

        for (index, upload) in files.into_iter().enumerate() {
            match self.admit_file(&batch, index, &upload).await? {
                AdmittedFile::Stored(file) => stored_files.push(file),
                AdmittedFile::Rejected(file, reasons) => {
                    rejected += 1;
                    self.log(
                        &batch.id,
                        LogLevel::Warning,
                        format!("file {} rejected: {}", upload.filename, reasons.join("; ")),
                    )
                    .await;
                    stored_files.push(file);
                }
            }
        }

        let mut batch = self.store.get_batch(&batch.id).await?;
        batch.processed_files = rejected;
        if rejected == batch.total_files {
            batch.error_message = Some("all files failed security validation".into());
            batch.finish(BatchStatus::Failed)?;
        }
        self.store.update_batch(&batch).await?;

        info!(
            batch_id = %batch.id,
            total = batch.total_files,
            rejected,
            "batch submitted"
        );

        Ok(SubmitOutcome {
            batch,
            files: stored_files,
        })
    }

    async fn admit_file(
        &self,
        batch: &Batch,
        index: usize,
        upload: &UploadedFile,
    ) -> PipelineResult<AdmittedFile> {
        let sanitized = match sanitize_filename(&upload.filename) {
            Ok(name) => name,
            Err(err) => {
                let file = self
                    .insert_file_row(batch, &upload.filename, upload, String::new(), String::new())
                    .await?;
                return Ok(AdmittedFile::Rejected(file, vec![err.to_string()]));
            }
        };

        let report = self
            .security
            .validate(&sanitized, &upload.declared_mime, &upload.payload)
            .await;
        if !report.valid {
            let file = self
                .insert_file_row(batch, &sanitized, upload, String::new(), report.file_info.sha256)
                .await?;
            return Ok(AdmittedFile::Rejected(file, report.errors));
        }

        let artifact = self
            .vault
            .store(&batch.id, index, &sanitized, &upload.payload)
            .await?;

        let mut file = DocumentFile {
            id: generate_id(),
            batch_id: batch.id.clone(),
            display_name: sanitized,
            stored_path: artifact.path.display().to_string(),
            declared_type: upload.declared_type.clone(),
            size_bytes: artifact.size_bytes,
            mime_type: report.file_info.mime_detected.clone(),
            content_hash: artifact.sha256,
            status: FileStatus::Pending,
            processing_start: None,
            processing_end: None,
            result_id: None,
        };
        file = self.store.insert_file(file).await?;
        Ok(AdmittedFile::Stored(file))
    }

    async fn insert_file_row(
        &self,
        batch: &Batch,
        name: &str,
        upload: &UploadedFile,
        stored_path: String,
        content_hash: String,
    ) -> PipelineResult<DocumentFile> {
        let file = DocumentFile {
            id: generate_id(),
            batch_id: batch.id.clone(),
            display_name: name.to_string(),
            stored_path,
            declared_type: upload.declared_type.clone(),
            size_bytes: upload.payload.len() as u64,
            mime_type: upload.declared_mime.clone(),
            content_hash,
            status: FileStatus::Failed,
            processing_start: None,
            processing_end: Some(Utc::now()),
            result_id: None,
        };
        Ok(self.store.insert_file(file).await?)
    }

    /// Spawns the background task that owns this batch. Any panic-free
    /// error path inside translates into a failed batch plus a terminal
    /// event; the handle is returned for tests that want to await it.
    pub fn spawn_process(self: &Arc<Self>, batch_id: BatchId) -> tokio::task::JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = orchestrator.process_batch(&batch_id).await {
                error!(batch_id = %batch_id, error = %err, "batch processing failed");
                orchestrator.fail_batch(&batch_id, &err.to_string()).await;
            }
        })
    }

    /// Requests cooperative cancellation. In-flight provider calls are not
    /// interrupted; the flag is observed between files.
    pub async fn cancel(&self, user: &User, batch_id: &BatchId) -> PipelineResult<()> {
        let batch = self.store.get_batch(batch_id).await?;
        Self::require_owner(user, &batch)?;
        if batch.status.is_terminal() {
            return Err(PipelineError::Validation(format!(
                "batch {batch_id} is already {}",
                batch.status
            )));
        }
        self.cancellations.request(batch_id).await;
        self.log(batch_id, LogLevel::Info, "cancellation requested".into())
            .await;
        Ok(())
    }

    pub async fn get_batch(&self, user: &User, batch_id: &BatchId) -> PipelineResult<Batch> {
        let batch = self.store.get_batch(batch_id).await?;
        Self::require_owner(user, &batch)?;
        Ok(batch)
    }

    pub async fn list_batches(&self, user: &User) -> PipelineResult<Vec<Batch>> {
        Ok(self.store.list_batches_for_user(&user.id).await?)
    }

    pub async fn list_results(
        &self,
        user: &User,
        batch_id: &BatchId,
    ) -> PipelineResult<Vec<ScanResult>> {
        let batch = self.store.get_batch(batch_id).await?;
        Self::require_owner(user, &batch)?;
        Ok(self.store.list_results_for_batch(batch_id).await?)
    }

    pub async fn get_result(&self, user: &User, result_id: &str) -> PipelineResult<ScanResult> {
        let result = self.store.get_result(&result_id.to_string()).await?;
        let batch = self.store.get_batch(&result.batch_id).await?;
        Self::require_owner(user, &batch)?;
        Ok(result)
    }

    pub async fn logs(
        &self,
        user: &User,
        batch_id: &BatchId,
    ) -> PipelineResult<Vec<ProcessingLog>> {
        let batch = self.store.get_batch(batch_id).await?;
        Self::require_owner(user, &batch)?;
        Ok(self.store.logs_for_batch(batch_id).await?)
    }

    fn require_owner(user: &User, batch: &Batch) -> PipelineResult<()> {
        if user.is_admin || batch.user_id == user.id {
            Ok(())
        } else {
            Err(PipelineError::Forbidden(format!(
                "batch {} belongs to another user",
                batch.id
            )))
        }
    }

    /// The per-batch loop. Files run in declared order, one at a time;
    /// failures stay local to the file. Exactly one task may own a batch.
    pub async fn process_batch(&self, batch_id: &BatchId) -> PipelineResult<()> {
        if !self.ownership.acquire(batch_id).await {
            return Err(PipelineError::Validation(format!(
                "batch {batch_id} is already being processed"
            )));
        }
        let result = self.process_batch_owned(batch_id).await;
        self.ownership.release(batch_id).await;
        result
    }

    async fn process_batch_owned(&self, batch_id: &BatchId) -> PipelineResult<()> {
        let batch = self.store.get_batch(batch_id).await?;
        if batch.status.is_terminal() {
            return Ok(());
        }
        let files = self.store.list_files_for_batch(batch_id).await?;
        let total_files = batch.total_files;

        self.bus
            .publish(
                batch_id,
                ProgressEvent::BatchProgress {
                    status: BatchStatus::Processing.to_string(),
                    total_files,
                    processed_files: batch.processed_files,
                    progress_percentage: Some(batch.progress_percentage()),
                    message: "batch processing started".into(),
                },
            )
            .await;

        let mut cancelled = false;
        for (index, file) in files.iter().enumerate() {
            if file.status != FileStatus::Pending {
                continue;
            }
            if self.cancellations.is_requested(batch_id).await {
                cancelled = true;
                break;
            }
            self.process_file(batch_id, index, total_files, file.clone())
                .await?;
        }

        self.finish_batch(batch_id, cancelled).await
    }

    async fn process_file(
        &self,
        batch_id: &BatchId,
        index: usize,
        total_files: usize,
        mut file: DocumentFile,
    ) -> PipelineResult<()> {
        file.status = FileStatus::Processing;
        file.processing_start = Some(Utc::now());
        self.store.update_file(&file).await?;
        self.emit_file(batch_id, &file, index, total_files, FileEventStatus::Processing, None, None)
            .await;

        let started = Instant::now();
        match self.extract_file(batch_id, index, total_files, &file).await {
            Ok((extracted, raw_text, confidence, engine_used)) => {
                let elapsed = started.elapsed().as_secs_f64();
                let result = ScanResult {
                    id: generate_id(),
                    batch_id: batch_id.clone(),
                    document_file_id: file.id.clone(),
                    document_type: DocumentType::from_declared(&file.declared_type)
                        .wire_name()
                        .to_string(),
                    original_filename: file.display_name.clone(),
                    raw_text,
                    extracted_data: extracted,
                    confidence,
                    engine_used,
                    processing_time_seconds: elapsed,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                };
                let result = self.store.insert_result(result).await?;

                file.status = FileStatus::Completed;
                file.processing_end = Some(Utc::now());
                file.result_id = Some(result.id.clone());
                self.store.update_file(&file).await?;
                self.bump_processed(batch_id).await?;
                self.log(
                    batch_id,
                    LogLevel::Info,
                    format!("processed {}", file.display_name),
                )
                .await;
                self.emit_file(
                    batch_id,
                    &file,
                    index,
                    total_files,
                    FileEventStatus::Completed,
                    Some(confidence),
                    Some(elapsed),
                )
                .await;
            }
            Err(err) => {
                warn!(batch_id = %batch_id, file = %file.display_name, error = %err, "file failed");
                file.status = FileStatus::Failed;
                file.processing_end = Some(Utc::now());
                self.store.update_file(&file).await?;
                self.bump_processed(batch_id).await?;
                self.log(
                    batch_id,
                    LogLevel::Error,
                    format!("{} failed: {err}", file.display_name),
                )
                .await;
                self.emit_file(
                    batch_id,
                    &file,
                    index,
                    total_files,
                    FileEventStatus::Error,
                    None,
                    None,
                )
                .await;
            }
        }

        let batch = self.store.get_batch(batch_id).await?;
        self.bus
            .publish(
                batch_id,
                ProgressEvent::BatchProgress {
                    status: batch.status.to_string(),
                    total_files,
                    processed_files: batch.processed_files,
                    progress_percentage: Some(batch.progress_percentage()),
                    message: format!(
                        "processed {} of {} files",
                        batch.processed_files, total_files
                    ),
                },
            )
            .await;
        Ok(())
    }

    /// OCR plus per-type extraction. Returns (extracted, raw_text,
    /// confidence in 0..=1, engine name).
    async fn extract_file(
        &self,
        batch_id: &BatchId,
        index: usize,
        total_files: usize,
        file: &DocumentFile,
    ) -> Result<(serde_json::Value, String, f64, String), PipelineError> {
        let payload = self
            .vault
            .read(std::path::Path::new(&file.stored_path))
            .await?;

        self.emit_file(
            batch_id,
            file,
            index,
            total_files,
            FileEventStatus::OcrProcessing,
            None,
            None,
        )
        .await;

        let request = OcrRequest {
            document_id: file.id.clone(),
            stored_path: file.stored_path.clone(),
            mime_type: file.mime_type.clone(),
            payload,
        };
        let outcome = self
            .ocr
            .extract_text(&request)
            .await
            .map_err(|err| PipelineError::Internal(err.to_string()))?;

        let document_type = DocumentType::from_declared(&file.declared_type);
        let ocr_confidence = (outcome.confidence / 100.0).clamp(0.0, 1.0);

        if document_type == DocumentType::RekeningKoran && self.config.hybrid_bank {
            let report = self
                .hybrid
                .process_bank_statement(&outcome.raw_text, &outcome.tables)
                .await;
            let confidence = report.confidence.clamp(0.0, 1.0);
            return Ok((
                report.to_value(),
                outcome.raw_text,
                confidence,
                outcome.engine_used,
            ));
        }

        let mut envelope = self.parsers.parse(document_type, &outcome.raw_text);
        if self.config.use_smart_mapper
            && let Some(mapper) = &self.mapper
        {
            match mapper
                .extract_from_text(&outcome.raw_text, document_type.wire_name(), None)
                .await
            {
                Ok(payload) => {
                    if let Some(object) = envelope.as_object_mut() {
                        object.insert("smart_mapped".into(), payload);
                        object.insert(
                            "ai_model_used".into(),
                            serde_json::Value::String(mapper.model_name().to_string()),
                        );
                    }
                }
                Err(err) => {
                    // Mapper failures are recoverable; the raw-text envelope
                    // is still a usable result.
                    warn!(batch_id = %batch_id, error = %err, "smart mapper failed");
                    self.log(
                        batch_id,
                        LogLevel::Warning,
                        format!("smart mapper failed for {}: {err}", file.display_name),
                    )
                    .await;
                }
            }
        }

        Ok((
            envelope,
            outcome.raw_text,
            ocr_confidence,
            outcome.engine_used,
        ))
    }

    async fn bump_processed(&self, batch_id: &BatchId) -> PipelineResult<()> {
        let mut batch = self.store.get_batch(batch_id).await?;
        batch.processed_files += 1;
        self.store.update_batch(&batch).await?;
        Ok(())
    }

    async fn finish_batch(&self, batch_id: &BatchId, cancelled: bool) -> PipelineResult<()> {
        let files = self.store.list_files_for_batch(batch_id).await?;
        let succeeded = files
            .iter()
            .filter(|file| file.status == FileStatus::Completed)
            .count();
        let failed = files
            .iter()
            .filter(|file| file.status == FileStatus::Failed)
            .count();

        let status = if cancelled {
            BatchStatus::Cancelled
        } else if failed == 0 {
            BatchStatus::Completed
        } else if succeeded > 0 {
            BatchStatus::Partial
        } else {
            BatchStatus::Failed
        };

        let mut batch = self.store.get_batch(batch_id).await?;
        if cancelled {
            batch.error_message = Some("cancelled by user".into());
        }
        batch.finish(status)?;
        self.store.update_batch(&batch).await?;
        self.cancellations.clear(batch_id).await;

        let attempted = succeeded + failed;
        let success_rate = if attempted == 0 {
            0.0
        } else {
            succeeded as f64 / attempted as f64 * 100.0
        };

        let event = if status == BatchStatus::Failed {
            ProgressEvent::BatchError {
                error: "batch_failed".into(),
                message: "no file in the batch could be processed".into(),
            }
        } else {
            ProgressEvent::BatchComplete {
                status: status.to_string(),
                success_rate,
                message: format!("{succeeded} of {} files processed", batch.total_files),
            }
        };
        self.bus.publish(batch_id, event).await;
        self.log(
            batch_id,
            LogLevel::Info,
            format!("batch finished with status {status}"),
        )
        .await;
        info!(batch_id = %batch_id, status = %status, succeeded, failed, "batch finished");
        Ok(())
    }

    /// Outermost error boundary for the background task.
    async fn fail_batch(&self, batch_id: &BatchId, message: &str) {
        if let Ok(mut batch) = self.store.get_batch(batch_id).await
            && !batch.status.is_terminal()
        {
            batch.error_message = Some(message.to_string());
            if batch.finish(BatchStatus::Failed).is_ok() {
                let _ = self.store.update_batch(&batch).await;
            }
        }
        self.cancellations.clear(batch_id).await;
        self.bus
            .publish(
                batch_id,
                ProgressEvent::BatchError {
                    error: "batch_failed".into(),
                    message: message.to_string(),
                },
            )
            .await;
        self.log(batch_id, LogLevel::Error, message.to_string()).await;
    }

    async fn emit_file(
        &self,
        batch_id: &BatchId,
        file: &DocumentFile,
        index: usize,
        total_files: usize,
        status: FileEventStatus,
        confidence: Option<f64>,
        processing_time: Option<f64>,
    ) {
        let message = match status {
            FileEventStatus::Processing => format!("processing {}", file.display_name),
            FileEventStatus::OcrProcessing => format!("running OCR on {}", file.display_name),
            FileEventStatus::Completed => format!("{} completed", file.display_name),
            FileEventStatus::Error => format!("{} failed", file.display_name),
        };
        self.bus
            .publish(
                batch_id,
                ProgressEvent::FileProgress {
                    filename: file.display_name.clone(),
                    file_index: index,
                    total_files,
                    status,
                    confidence,
                    processing_time,
                    message,
                },
            )
            .await;
    }

    async fn log(&self, batch_id: &BatchId, level: LogLevel, message: String) {
        let log = ProcessingLog {
            batch_id: batch_id.clone(),
            level,
            message,
            timestamp: Utc::now(),
        };
        if let Err(err) = self.store.append_log(log).await {
            error!(batch_id = %batch_id, error = %err, "failed to append processing log");
        }
    }
}

enum AdmittedFile {
    Stored(DocumentFile),
    Rejected(DocumentFile, Vec<String>),
}
