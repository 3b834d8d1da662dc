#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::fmt::Display;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

mod in_memory;

pub use crate::in_memory::InMemoryStore;

pub type UserId = String;
pub type BatchId = String;
pub type FileId = String;
pub type ResultId = String;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("resource conflict: {0}")]
    Conflict(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl BatchStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, BatchStatus::Processing)
    }
}

impl Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Processing => write!(f, "processing"),
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Partial => write!(f, "partial"),
            BatchStatus::Failed => write!(f, "failed"),
            BatchStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Failed)
    }
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Pending => write!(f, "pending"),
            FileStatus::Processing => write!(f, "processing"),
            FileStatus::Completed => write!(f, "completed"),
            FileStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub is_admin: bool,
}

impl NewUser {
    pub fn normalize(mut self) -> StorageResult<Self> {
        if self.username.trim().is_empty() {
            return Err(StorageError::Validation("username cannot be empty".into()));
        }
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(StorageError::Validation(
                "email must be a valid address".into(),
            ));
        }
        if self.password_hash.trim().is_empty() {
            return Err(StorageError::Validation(
                "password hash cannot be empty".into(),
            ));
        }
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_ascii_lowercase();
        self.full_name = self.full_name.trim().to_string();
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub user_id: UserId,
    pub status: BatchStatus,
    pub total_files: usize,
    pub processed_files: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Batch {
    #[must_use]
    pub fn new(user_id: UserId, total_files: usize) -> Self {
        Self {
            id: generate_id(),
            user_id,
            status: BatchStatus::Processing,
            total_files,
            processed_files: 0,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        self.processed_files as f64 / self.total_files as f64 * 100.0
    }

    /// Moves the batch into a terminal status. Terminal statuses never
    /// transition again.
    pub fn finish(&mut self, status: BatchStatus) -> StorageResult<()> {
        if self.status.is_terminal() {
            return Err(StorageError::InvalidTransition(format!(
                "batch {} is already {}",
                self.id, self.status
            )));
        }
        if !status.is_terminal() {
            return Err(StorageError::InvalidTransition(format!(
                "{status} is not a terminal batch status"
            )));
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFile {
    pub id: FileId,
    pub batch_id: BatchId,
    pub display_name: String,
    pub stored_path: String,
    pub declared_type: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub content_hash: String,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<ResultId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: ResultId,
    pub batch_id: BatchId,
    pub document_file_id: FileId,
    pub document_type: String,
    pub original_filename: String,
    pub raw_text: String,
    pub extracted_data: serde_json::Value,
    pub confidence: f64,
    pub engine_used: String,
    pub processing_time_seconds: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn normalize(mut self) -> StorageResult<Self> {
        if self.batch_id.trim().is_empty() {
            return Err(StorageError::Validation("batch id cannot be empty".into()));
        }
        if self.document_file_id.trim().is_empty() {
            return Err(StorageError::Validation(
                "document file id cannot be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(StorageError::Validation(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        self.document_type = self.document_type.trim().to_string();
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingLog {
    pub batch_id: BatchId,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: NewUser) -> StorageResult<User>;

    async fn get_user(&self, user_id: &UserId) -> StorageResult<User>;

    async fn find_user_by_username(&self, username: &str) -> StorageResult<Option<User>>;

    async fn record_login(&self, user_id: &UserId) -> StorageResult<User>;

    async fn set_user_active(&self, user_id: &UserId, active: bool) -> StorageResult<User>;

    async fn insert_batch(&self, batch: Batch) -> StorageResult<Batch>;

    async fn get_batch(&self, batch_id: &BatchId) -> StorageResult<Batch>;

    async fn update_batch(&self, batch: &Batch) -> StorageResult<()>;

    async fn list_batches_for_user(&self, user_id: &UserId) -> StorageResult<Vec<Batch>>;

    async fn insert_file(&self, file: DocumentFile) -> StorageResult<DocumentFile>;

    async fn get_file(&self, file_id: &FileId) -> StorageResult<DocumentFile>;

    async fn update_file(&self, file: &DocumentFile) -> StorageResult<()>;

    /// Files are returned in the order they were added to the batch.
    async fn list_files_for_batch(&self, batch_id: &BatchId) -> StorageResult<Vec<DocumentFile>>;

    async fn insert_result(&self, result: ScanResult) -> StorageResult<ScanResult>;

    async fn get_result(&self, result_id: &ResultId) -> StorageResult<ScanResult>;

    async fn list_results_for_batch(&self, batch_id: &BatchId) -> StorageResult<Vec<ScanResult>>;

    async fn append_log(&self, log: ProcessingLog) -> StorageResult<()>;

    async fn logs_for_batch(&self, batch_id: &BatchId) -> StorageResult<Vec<ProcessingLog>>;

    /// Cheap liveness probe used by the startup contract.
    async fn ping(&self) -> StorageResult<()>;
}

#[cfg(feature = "postgres-store")]
#[derive(Clone)]
pub struct PostgresStore {
    connection_string: String,
}

#[cfg(feature = "postgres-store")]
impl PostgresStore {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }

    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn batch_status_display_matches_wire_names() {
        assert_eq!(BatchStatus::Processing.to_string(), "processing");
        assert_eq!(BatchStatus::Partial.to_string(), "partial");
        assert_eq!(BatchStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn finish_sets_completed_at_once() {
        let mut batch = Batch::new("user-1".into(), 3);
        assert!(batch.completed_at.is_none());

        batch.finish(BatchStatus::Partial).expect("first finish");
        assert!(batch.completed_at.is_some());

        let err = batch.finish(BatchStatus::Failed).unwrap_err();
        assert!(matches!(err, StorageError::InvalidTransition(_)));
        assert_eq!(batch.status, BatchStatus::Partial);
    }

    #[test]
    fn finish_rejects_non_terminal_status() {
        let mut batch = Batch::new("user-1".into(), 1);
        let err = batch.finish(BatchStatus::Processing).unwrap_err();
        assert!(matches!(err, StorageError::InvalidTransition(_)));
    }

    #[test]
    fn new_user_normalizes() {
        let user = NewUser {
            username: " budi ".into(),
            email: " Budi@Example.COM ".into(),
            password_hash: "hash".into(),
            full_name: " Budi Santoso ".into(),
            is_admin: false,
        }
        .normalize()
        .expect("user should normalize");

        assert_eq!(user.username, "budi");
        assert_eq!(user.email, "budi@example.com");
        assert_eq!(user.full_name, "Budi Santoso");
    }

    #[test]
    fn scan_result_rejects_out_of_range_confidence() {
        let result = ScanResult {
            id: generate_id(),
            batch_id: "batch-1".into(),
            document_file_id: "file-1".into(),
            document_type: "faktur_pajak".into(),
            original_filename: "faktur.pdf".into(),
            raw_text: String::new(),
            extracted_data: serde_json::json!({}),
            confidence: 1.2,
            engine_used: "mock".into(),
            processing_time_seconds: 0.1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let err = result.normalize().unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }

    #[test]
    fn progress_percentage_handles_empty_batch() {
        let batch = Batch::new("user-1".into(), 0);
        assert_eq!(batch.progress_percentage(), 0.0);
    }
}
