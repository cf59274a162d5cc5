//! External scanner service.
//!
//! Owns the scan records for engine runs: creates them, drives the
//! executor, persists normalized results, and feeds failing checks into
//! the finding pipeline during orchestrated scans.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use uuid::Uuid;

use crate::error::{Result, WardError};
use crate::executor::metrics::MetricsSnapshot;
use crate::executor::normalize::{to_external_finding, to_scan_result};
use crate::executor::{EngineExecutor, ScanEngineParams, DEFAULT_MEMORY_LIMIT_MB, DEFAULT_RETRY_COUNT, DEFAULT_TIMEOUT_SECS};
use crate::findings::FindingStore;
use crate::model::{CheckState, ExternalScan, ExternalScanResult, RunStatus};
use crate::store::Store;

/// One engine provider to run, with optional per-provider overrides.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub provider: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ProviderSpec {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            args: Vec::new(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExternalScannerConfig {
    pub engine_bin: PathBuf,
    pub work_dir: PathBuf,
    pub timeout: Duration,
    pub memory_limit_mb: u64,
    pub retry_count: u32,
    pub providers: Vec<ProviderSpec>,
}

impl ExternalScannerConfig {
    pub fn new(engine_bin: PathBuf, work_dir: PathBuf) -> Self {
        Self {
            engine_bin,
            work_dir,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            retry_count: DEFAULT_RETRY_COUNT,
            providers: vec![ProviderSpec::new("cloudsploit")],
        }
    }
}

pub struct ExternalScannerService {
    store: Arc<dyn Store>,
    findings: FindingStore,
    executor: Arc<EngineExecutor>,
    config: ExternalScannerConfig,
}

impl ExternalScannerService {
    pub fn new(
        store: Arc<dyn Store>,
        findings: FindingStore,
        executor: Arc<EngineExecutor>,
        config: ExternalScannerConfig,
    ) -> Self {
        Self {
            store,
            findings,
            executor,
            config,
        }
    }

    fn params_for(&self, spec: &ProviderSpec, scan_id: Uuid) -> ScanEngineParams {
        ScanEngineParams {
            provider: spec.provider.clone(),
            engine_bin: self.config.engine_bin.clone(),
            args: spec.args.clone(),
            output_path: self.config.work_dir.join(format!("scan-{scan_id}.json")),
            timeout: spec.timeout.unwrap_or(self.config.timeout),
            memory_limit_mb: self.config.memory_limit_mb,
            retry_count: self.config.retry_count,
        }
    }

    fn spec_for(&self, provider: &str) -> ProviderSpec {
        self.config
            .providers
            .iter()
            .find(|s| s.provider == provider)
            .cloned()
            .unwrap_or_else(|| ProviderSpec::new(provider))
    }

    /// Create a scan record and run the engine in the background.
    /// Returns the scan id immediately.
    pub async fn start_scan(self: &Arc<Self>, provider: &str) -> Result<Uuid> {
        let scan = self.store.create_external_scan(provider).await?;
        let service = self.clone();
        let spec = self.spec_for(provider);
        tokio::spawn(async move {
            service.run_scan(scan.id, spec).await;
        });
        Ok(scan.id)
    }

    /// Full lifecycle of one engine run: pending -> running -> completed
    /// or failed, with results persisted on success.
    async fn run_scan(&self, scan_id: Uuid, spec: ProviderSpec) {
        if let Err(err) = self
            .store
            .set_external_scan_status(scan_id, RunStatus::Running, None, None)
            .await
        {
            error!(%scan_id, error = %err, "failed to mark scan running");
            return;
        }

        let params = self.params_for(&spec, scan_id);
        match self.executor.execute(&params).await {
            Ok(outcome) => {
                let results: Vec<ExternalScanResult> = outcome
                    .items
                    .iter()
                    .map(|item| to_scan_result(scan_id, item))
                    .collect();
                let count = results.len() as u64;
                let persisted = async {
                    self.store.insert_external_results(results).await?;
                    self.store
                        .set_external_scan_status(scan_id, RunStatus::Completed, None, Some(count))
                        .await
                }
                .await;
                match persisted {
                    Ok(()) => info!(
                        %scan_id,
                        provider = %spec.provider,
                        count,
                        attempts = outcome.attempts,
                        duration_ms = outcome.duration.as_millis() as u64,
                        "engine scan completed"
                    ),
                    Err(err) => error!(%scan_id, error = %err, "failed to persist scan results"),
                }
            }
            Err(err) => {
                error!(%scan_id, provider = %spec.provider, error = %err, "engine scan failed");
                if let Err(store_err) = self
                    .store
                    .set_external_scan_status(
                        scan_id,
                        RunStatus::Failed,
                        Some(err.to_string()),
                        None,
                    )
                    .await
                {
                    error!(%scan_id, error = %store_err, "failed to mark scan failed");
                }
            }
        }
    }

    /// Run every configured provider as part of an orchestrated scan job
    /// and feed failing checks into the finding pipeline. A failing
    /// provider is logged and skipped. Returns the number of findings
    /// recorded.
    pub async fn run_external_scans(&self, scan_job_id: Uuid) -> Result<u64> {
        let mut recorded = 0u64;
        for spec in self.config.providers.clone() {
            let scan = self.store.create_external_scan(&spec.provider).await?;
            self.run_scan(scan.id, spec.clone()).await;

            let Some(scan) = self.store.get_external_scan(scan.id).await? else {
                continue;
            };
            if scan.status != RunStatus::Completed {
                continue;
            }
            for result in self.store.list_external_results(scan.id).await? {
                if result.status != CheckState::Fail {
                    continue;
                }
                let finding = to_external_finding(&spec.provider, &result);
                self.findings
                    .upsert_from_external_finding(&finding, Some(scan_job_id))
                    .await?;
                recorded += 1;
            }
        }
        Ok(recorded)
    }

    pub async fn get_scan_status(&self, scan_id: Uuid) -> Result<ExternalScan> {
        self.store
            .get_external_scan(scan_id)
            .await?
            .ok_or(WardError::NotFound {
                entity: "external scan",
                id: scan_id.to_string(),
            })
    }

    pub async fn get_scan_results(&self, scan_id: Uuid) -> Result<Vec<ExternalScanResult>> {
        self.store.list_external_results(scan_id).await
    }

    pub fn execution_metrics(&self) -> MetricsSnapshot {
        let gate = self.executor.gate();
        self.executor
            .metrics()
            .snapshot(gate.queued(), gate.max_concurrent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::queue::ScanGate;
    use crate::executor::{EngineRun, EngineRunner};
    use crate::store::memory::MemoryStore;
    use crate::store::FindingFilter;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    /// Writes scripted items to the expected output file, like a real
    /// engine would.
    struct FileWritingRunner {
        items: serde_json::Value,
        fail_with_stderr: Option<String>,
    }

    #[async_trait]
    impl EngineRunner for FileWritingRunner {
        async fn run(&self, params: &ScanEngineParams) -> crate::error::Result<EngineRun> {
            if let Some(stderr) = &self.fail_with_stderr {
                return Ok(EngineRun {
                    exit_code: Some(1),
                    stderr: stderr.clone(),
                    ..EngineRun::default()
                });
            }
            tokio::fs::write(&params.output_path, self.items.to_string()).await?;
            Ok(EngineRun {
                exit_code: Some(0),
                peak_rss_kb: 2048,
                ..EngineRun::default()
            })
        }
    }

    fn service(
        dir: &TempDir,
        runner: FileWritingRunner,
    ) -> (Arc<ExternalScannerService>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let findings = FindingStore::new(store.clone());
        let executor = Arc::new(EngineExecutor::new(
            Arc::new(runner),
            Arc::new(ScanGate::default()),
        ));
        let config = ExternalScannerConfig::new(
            PathBuf::from("/usr/local/bin/scanner"),
            dir.path().to_path_buf(),
        );
        (
            Arc::new(ExternalScannerService::new(
                store.clone(),
                findings,
                executor,
                config,
            )),
            store,
        )
    }

    #[tokio::test]
    async fn completed_scan_stores_results_and_count() {
        let dir = TempDir::new().unwrap();
        let (service, _store) = service(
            &dir,
            FileWritingRunner {
                items: json!([
                    {"plugin": "bucketEncryption", "status": "OK"},
                    {"plugin": "iamMfa", "status": "FAIL", "resource": "alice"}
                ]),
                fail_with_stderr: None,
            },
        );

        let scan_id = service.start_scan("cloudsploit").await.unwrap();
        // poll until the background task settles
        let scan = loop {
            let scan = service.get_scan_status(scan_id).await.unwrap();
            if scan.status == RunStatus::Completed || scan.status == RunStatus::Failed {
                break scan;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        assert_eq!(scan.status, RunStatus::Completed);
        assert_eq!(scan.result_count, 2);
        let results = service.get_scan_results(scan_id).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].status, CheckState::Fail);
    }

    #[tokio::test]
    async fn failed_scan_records_error_message() {
        let dir = TempDir::new().unwrap();
        let (service, _store) = service(
            &dir,
            FileWritingRunner {
                items: json!([]),
                fail_with_stderr: Some("AccessDenied: not authorized".to_string()),
            },
        );

        let scan_id = service.start_scan("cloudsploit").await.unwrap();
        let scan = loop {
            let scan = service.get_scan_status(scan_id).await.unwrap();
            if scan.status == RunStatus::Failed {
                break scan;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        assert!(scan.error_message.is_some());
        assert!(service.get_scan_results(scan_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn orchestrated_run_feeds_failing_checks_into_findings() {
        let dir = TempDir::new().unwrap();
        let (service, store) = service(
            &dir,
            FileWritingRunner {
                items: json!([
                    {"plugin": "bucketEncryption", "status": "OK"},
                    {
                        "plugin": "openSsh",
                        "status": "FAIL",
                        "resource": "sg-1",
                        "region": "us-east-1",
                        "severity": "high",
                        "message": "Port 22 open to the world"
                    }
                ]),
                fail_with_stderr: None,
            },
        );
        let job = store
            .create_scan_job(crate::model::ScanJobType::Full)
            .await
            .unwrap();

        let recorded = service.run_external_scans(job.id).await.unwrap();
        assert_eq!(recorded, 1);

        let page = store.find_findings(FindingFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].rule_code, "OPENSSH");
        assert_eq!(page.items[0].scan_job_id, Some(job.id));
    }
}
