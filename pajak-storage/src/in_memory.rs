use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::Batch;
use crate::BatchId;
use crate::DocumentFile;
use crate::FileId;
use crate::NewUser;
use crate::ProcessingLog;
use crate::ResultId;
use crate::ScanResult;
use crate::StorageError;
use crate::StorageResult;
use crate::Store;
use crate::User;
use crate::UserId;
use crate::generate_id;

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, User>,
    batches: HashMap<BatchId, Batch>,
    files: HashMap<FileId, DocumentFile>,
    // Insertion order per batch; list_files_for_batch must preserve it.
    file_order: HashMap<BatchId, Vec<FileId>>,
    results: HashMap<ResultId, ScanResult>,
    result_order: HashMap<BatchId, Vec<ResultId>>,
    logs: Vec<ProcessingLog>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_unique_user(state: &StoreState, user: &NewUser) -> StorageResult<()> {
        for existing in state.users.values() {
            if existing.username.eq_ignore_ascii_case(&user.username) {
                return Err(StorageError::Conflict(format!(
                    "username {} already taken",
                    user.username
                )));
            }
            if existing.email.eq_ignore_ascii_case(&user.email) {
                return Err(StorageError::Conflict(format!(
                    "email {} already registered",
                    user.email
                )));
            }
        }
        Ok(())
    }

    fn guard_batch_update(existing: &Batch, updated: &Batch) -> StorageResult<()> {
        if existing.status.is_terminal() && existing.status != updated.status {
            return Err(StorageError::InvalidTransition(format!(
                "batch {} is already {}",
                existing.id, existing.status
            )));
        }
        if updated.processed_files > updated.total_files {
            return Err(StorageError::Validation(format!(
                "processed_files {} exceeds total_files {}",
                updated.processed_files, updated.total_files
            )));
        }
        if updated.processed_files < existing.processed_files {
            return Err(StorageError::Validation(
                "processed_files cannot decrease".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let user = user.normalize()?;
        let mut guard = self.state.write().await;
        Self::ensure_unique_user(&guard, &user)?;
        let record = User {
            id: generate_id(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            is_active: true,
            is_admin: user.is_admin,
            created_at: Utc::now(),
            last_login: None,
        };
        guard.users.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_user(&self, user_id: &UserId) -> StorageResult<User> {
        let guard = self.state.read().await;
        guard
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("user {user_id}")))
    }

    async fn find_user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let guard = self.state.read().await;
        Ok(guard
            .users
            .values()
            .find(|user| user.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn record_login(&self, user_id: &UserId) -> StorageResult<User> {
        let mut guard = self.state.write().await;
        let user = guard
            .users
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(format!("user {user_id}")))?;
        user.last_login = Some(Utc::now());
        Ok(user.clone())
    }

    async fn set_user_active(&self, user_id: &UserId, active: bool) -> StorageResult<User> {
        let mut guard = self.state.write().await;
        let user = guard
            .users
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(format!("user {user_id}")))?;
        user.is_active = active;
        Ok(user.clone())
    }

    async fn insert_batch(&self, batch: Batch) -> StorageResult<Batch> {
        let mut guard = self.state.write().await;
        if guard.batches.contains_key(&batch.id) {
            return Err(StorageError::Conflict(format!(
                "batch {} already exists",
                batch.id
            )));
        }
        guard.batches.insert(batch.id.clone(), batch.clone());
        guard.file_order.entry(batch.id.clone()).or_default();
        guard.result_order.entry(batch.id.clone()).or_default();
        Ok(batch)
    }

    async fn get_batch(&self, batch_id: &BatchId) -> StorageResult<Batch> {
        let guard = self.state.read().await;
        guard
            .batches
            .get(batch_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("batch {batch_id}")))
    }

    async fn update_batch(&self, batch: &Batch) -> StorageResult<()> {
        let mut guard = self.state.write().await;
        let existing = guard
            .batches
            .get(&batch.id)
            .ok_or_else(|| StorageError::NotFound(format!("batch {}", batch.id)))?;
        Self::guard_batch_update(existing, batch)?;
        guard.batches.insert(batch.id.clone(), batch.clone());
        Ok(())
    }

    async fn list_batches_for_user(&self, user_id: &UserId) -> StorageResult<Vec<Batch>> {
        let guard = self.state.read().await;
        let mut batches = guard
            .batches
            .values()
            .filter(|batch| batch.user_id == *user_id)
            .cloned()
            .collect::<Vec<_>>();
        batches.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(batches)
    }

    async fn insert_file(&self, file: DocumentFile) -> StorageResult<DocumentFile> {
        let mut guard = self.state.write().await;
        if !guard.batches.contains_key(&file.batch_id) {
            return Err(StorageError::NotFound(format!("batch {}", file.batch_id)));
        }
        if guard.files.contains_key(&file.id) {
            return Err(StorageError::Conflict(format!(
                "file {} already exists",
                file.id
            )));
        }
        guard
            .file_order
            .entry(file.batch_id.clone())
            .or_default()
            .push(file.id.clone());
        guard.files.insert(file.id.clone(), file.clone());
        Ok(file)
    }

    async fn get_file(&self, file_id: &FileId) -> StorageResult<DocumentFile> {
        let guard = self.state.read().await;
        guard
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("file {file_id}")))
    }

    async fn update_file(&self, file: &DocumentFile) -> StorageResult<()> {
        let mut guard = self.state.write().await;
        let existing = guard
            .files
            .get(&file.id)
            .ok_or_else(|| StorageError::NotFound(format!("file {}", file.id)))?;
        if existing.status.is_terminal() && existing.status != file.status {
            return Err(StorageError::InvalidTransition(format!(
                "file {} is already {}",
                existing.id, existing.status
            )));
        }
        guard.files.insert(file.id.clone(), file.clone());
        Ok(())
    }

    async fn list_files_for_batch(&self, batch_id: &BatchId) -> StorageResult<Vec<DocumentFile>> {
        let guard = self.state.read().await;
        let order = guard
            .file_order
            .get(batch_id)
            .ok_or_else(|| StorageError::NotFound(format!("batch {batch_id}")))?;
        Ok(order
            .iter()
            .filter_map(|file_id| guard.files.get(file_id))
            .cloned()
            .collect())
    }

    async fn insert_result(&self, result: ScanResult) -> StorageResult<ScanResult> {
        let result = result.normalize()?;
        let mut guard = self.state.write().await;
        if !guard.batches.contains_key(&result.batch_id) {
            return Err(StorageError::NotFound(format!("batch {}", result.batch_id)));
        }
        guard
            .result_order
            .entry(result.batch_id.clone())
            .or_default()
            .push(result.id.clone());
        guard.results.insert(result.id.clone(), result.clone());
        Ok(result)
    }

    async fn get_result(&self, result_id: &ResultId) -> StorageResult<ScanResult> {
        let guard = self.state.read().await;
        guard
            .results
            .get(result_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("scan result {result_id}")))
    }

    async fn list_results_for_batch(&self, batch_id: &BatchId) -> StorageResult<Vec<ScanResult>> {
        let guard = self.state.read().await;
        let order = guard
            .result_order
            .get(batch_id)
            .ok_or_else(|| StorageError::NotFound(format!("batch {batch_id}")))?;
        Ok(order
            .iter()
            .filter_map(|result_id| guard.results.get(result_id))
            .cloned()
            .collect())
    }

    async fn append_log(&self, log: ProcessingLog) -> StorageResult<()> {
        let mut guard = self.state.write().await;
        guard.logs.push(log);
        Ok(())
    }

    async fn logs_for_batch(&self, batch_id: &BatchId) -> StorageResult<Vec<ProcessingLog>> {
        let guard = self.state.read().await;
        Ok(guard
            .logs
            .iter()
            .filter(|log| log.batch_id == *batch_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> StorageResult<()> {
        let _ = self.state.read().await;
        Ok(())
    }
}
