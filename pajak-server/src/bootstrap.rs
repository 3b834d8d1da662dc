use std::sync::Arc;

use pajak_bank::HybridBankProcessor;
use pajak_bank::HybridConfig;
use pajak_mapper::HttpSmartMapper;
use pajak_mapper::SmartMapper;
use pajak_ocr::CommandOcrProvider;
use pajak_ocr::HttpOcrProvider;
use pajak_ocr::OcrError;
use pajak_ocr::OcrGateway;
use pajak_ocr::OcrProvider;
use pajak_pipeline::BatchOrchestrator;
use pajak_pipeline::PipelineConfig;
use pajak_progress::ProgressBus;
use pajak_reconcile::InMemoryReconStore;
use pajak_reconcile::ReconciliationEngine;
use pajak_security::FileSecurityValidator;
use pajak_security::ValidatorConfig;
use pajak_storage::InMemoryStore;
use pajak_storage::Store;
use pajak_vault::FileVault;
use pajak_vault::VaultError;
use thiserror::Error;
use tracing::info;
use tracing::warn;

use crate::AppState;
use crate::AuthService;
use crate::Config;
use crate::RateLimiter;

#[derive(Debug, Error)]
pub enum BootError {
    #[error("storage directory check failed: {0}")]
    Vault(#[from] VaultError),
    #[error("database unreachable: {0}")]
    Storage(String),
    #[error("OCR initialization failed: {0}")]
    Ocr(#[from] OcrError),
}

/// Builds the full application state and enforces the startup contract:
/// writable storage directories, a reachable store and at least one OCR
/// provider. Any failure refuses to start the process.
pub async fn bootstrap(config: Config) -> Result<AppState, BootError> {
    for dir in [&config.upload_dir, &config.results_dir, &config.exports_dir] {
        FileVault::new(dir.clone()).ensure_writable().await?;
    }
    let vault = FileVault::new(config.upload_dir.clone());

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store
        .ping()
        .await
        .map_err(|err| BootError::Storage(err.to_string()))?;

    let primary: Option<Arc<dyn OcrProvider>> =
        match (&config.ocr_endpoint, &config.ocr_api_key) {
            (Some(endpoint), Some(api_key)) => {
                Some(Arc::new(HttpOcrProvider::new(endpoint, api_key)?))
            }
            _ => None,
        };
    let fallback: Option<Arc<dyn OcrProvider>> = match &config.ocr_local_command {
        Some(command) => Some(Arc::new(CommandOcrProvider::new(command)?)),
        None => None,
    };
    let ocr = OcrGateway::new(primary, fallback)?;
    info!(engines = ?ocr.engines(), "OCR gateway ready");

    let mapper: Option<Arc<dyn SmartMapper>> =
        match (&config.mapper_endpoint, &config.mapper_api_key) {
            (Some(endpoint), Some(api_key)) => {
                match HttpSmartMapper::new(endpoint, api_key, config.mapper_model.clone()) {
                    Ok(mapper) => Some(Arc::new(mapper)),
                    Err(err) => {
                        warn!(error = %err, "smart mapper misconfigured; continuing without it");
                        None
                    }
                }
            }
            _ => None,
        };
    if mapper.is_none() {
        warn!("no smart mapper configured; structured extraction is raw-text only");
    }

    let security = FileSecurityValidator::new(ValidatorConfig {
        max_file_size_bytes: config.max_file_size_mb * 1024 * 1024,
        max_pdf_pages: config.max_pdf_pages_per_file,
        allowed_extensions: config.allowed_extensions.clone(),
        // The AV daemon is an external collaborator; without one wired in,
        // the toggle stays off regardless of configuration.
        enable_virus_scan: false,
    });
    if config.enable_virus_scan {
        warn!("virus scanning requested but no scanner is wired into this build");
    }

    let bus = ProgressBus::shared();
    let hybrid = HybridBankProcessor::new(mapper.clone(), HybridConfig::default());
    let orchestrator = Arc::new(BatchOrchestrator::new(
        store.clone(),
        vault,
        security,
        ocr,
        mapper.clone(),
        hybrid,
        bus.clone(),
        PipelineConfig {
            max_batch_files: config.max_batch_files,
            use_smart_mapper: config.use_smart_mapper && mapper.is_some(),
            hybrid_bank: config.hybrid_bank,
        },
    ));

    let engine = Arc::new(ReconciliationEngine::new(
        Arc::new(InMemoryReconStore::new()),
        store.clone(),
        mapper,
    ));

    Ok(AppState {
        orchestrator,
        engine,
        auth: Arc::new(AuthService::new(store.clone())),
        bus,
        store,
        limiter: Arc::new(RateLimiter::new()),
        config: Arc::new(config),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &std::path::Path) -> Config {
        let mut config = Config::from_env();
        config.upload_dir = root.join("uploads");
        config.results_dir = root.join("results");
        config.exports_dir = root.join("exports");
        config
    }

    #[tokio::test]
    async fn refuses_to_start_without_an_ocr_provider() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = test_config(dir.path());
        config.ocr_endpoint = None;
        config.ocr_api_key = None;
        config.ocr_local_command = None;

        let err = bootstrap(config).await.unwrap_err();
        assert!(matches!(err, BootError::Ocr(OcrError::NoProvider)));
    }

    #[tokio::test]
    async fn boots_with_a_local_command_provider() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = test_config(dir.path());
        config.ocr_endpoint = None;
        config.ocr_api_key = None;
        config.ocr_local_command = Some("cat {path}".into());

        let state = bootstrap(config).await.expect("bootstrap");
        assert!(state.config.upload_dir.exists());
    }

    #[tokio::test]
    async fn refuses_unwritable_upload_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"a file, not a directory").expect("write");

        let mut config = test_config(dir.path());
        config.upload_dir = blocked;
        config.ocr_local_command = Some("cat {path}".into());

        let err = bootstrap(config).await.unwrap_err();
        assert!(matches!(err, BootError::Vault(_)));
    }
}
