//! Scan orchestration.
//!
//! Drives the full pipeline for one scan job: collect resources,
//! evaluate rules in batches, upsert findings, optionally run the
//! external scanner providers, then close the job out. Pipelines are
//! single-flight; concurrent requests queue behind the running one.

mod queue;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{error, info};
use uuid::Uuid;

use crate::collector::{CollectOptions, ResourceCollector};
use crate::error::{Result, WardError};
use crate::executor::service::ExternalScannerService;
use crate::findings::FindingStore;
use crate::model::{CollectedResource, NormalizedResource, ScanJob, ScanJobType};
use crate::orchestrator::queue::{Admission, QueuedScan, ScanQueue};
use crate::rules::RuleEngine;
use crate::store::Store;

/// Resources are evaluated against the rule set in batches of this size.
pub const BATCH_EVAL_SIZE: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct ScanJobResult {
    pub job_id: Uuid,
    pub resource_count: u64,
    pub finding_count: u64,
}

pub struct ScanOrchestrator {
    store: Arc<dyn Store>,
    collector: ResourceCollector,
    engine: RuleEngine,
    findings: FindingStore,
    scanner: Option<Arc<ExternalScannerService>>,
    collect_options: CollectOptions,
    queue: ScanQueue,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        collector: ResourceCollector,
        engine: RuleEngine,
        findings: FindingStore,
        collect_options: CollectOptions,
    ) -> Self {
        Self {
            store,
            collector,
            engine,
            findings,
            scanner: None,
            collect_options,
            queue: ScanQueue::new(),
        }
    }

    /// Attach the external scanner providers to the pipeline.
    pub fn with_scanner(mut self, scanner: Arc<ExternalScannerService>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Run a scan and wait for it to finish. If another scan is in
    /// flight, this one queues behind it.
    pub async fn run_scan(self: &Arc<Self>, job_type: ScanJobType) -> Result<ScanJobResult> {
        let (job_id, rx) = self.submit(job_type).await?;
        rx.await.map_err(|_| {
            WardError::Scan(format!("scan pipeline dropped before completing job {job_id}"))
        })?
    }

    /// Submit a scan and return its job id immediately. The job is
    /// created in `pending` state and picked up by the pipeline.
    pub async fn trigger_scan(self: &Arc<Self>, job_type: ScanJobType) -> Result<Uuid> {
        let (job_id, _rx) = self.submit(job_type).await?;
        Ok(job_id)
    }

    async fn submit(
        self: &Arc<Self>,
        job_type: ScanJobType,
    ) -> Result<(Uuid, oneshot::Receiver<Result<ScanJobResult>>)> {
        let job = self.store.create_scan_job(job_type).await?;
        let (tx, rx) = oneshot::channel();
        let queued = QueuedScan {
            job_id: job.id,
            completion: tx,
        };
        let (admission, scan) = self.queue.admit(queued).await;
        if let (Admission::Run, Some(scan)) = (admission, scan) {
            let orchestrator = self.clone();
            tokio::spawn(async move {
                orchestrator.drive(scan).await;
            });
        }
        Ok((job.id, rx))
    }

    /// Run the admitted scan, then keep draining the queue until empty.
    /// Failures drain too; one broken scan must not wedge the pipeline.
    async fn drive(self: Arc<Self>, mut scan: QueuedScan) {
        loop {
            let result = self.execute(scan.job_id).await;
            // the submitter may have gone away; the job record still holds
            // the outcome
            let _ = scan.completion.send(result);
            match self.queue.next().await {
                Some(next) => scan = next,
                None => break,
            }
        }
    }

    async fn execute(&self, job_id: Uuid) -> Result<ScanJobResult> {
        match self.pipeline(job_id).await {
            Ok(result) => Ok(result),
            Err(err) => {
                error!(%job_id, error = %err, "scan job failed");
                if let Err(store_err) =
                    self.store.set_job_failed(job_id, &err.to_string()).await
                {
                    error!(%job_id, error = %store_err, "failed to mark job failed");
                }
                Err(err)
            }
        }
    }

    async fn pipeline(&self, job_id: Uuid) -> Result<ScanJobResult> {
        self.store.set_job_running(job_id).await?;
        info!(%job_id, "scan started");

        let resource_count = self
            .collector
            .collect(job_id, &self.collect_options)
            .await?;
        let resources: Vec<NormalizedResource> = self
            .store
            .list_resources(job_id)
            .await?
            .into_iter()
            .map(to_normalized)
            .collect();

        let mut finding_count = 0u64;
        for chunk in resources.chunks(BATCH_EVAL_SIZE) {
            for violation in self.engine.evaluate_batch(chunk) {
                self.findings
                    .upsert_from_violation(&violation, Some(job_id))
                    .await?;
                finding_count += 1;
            }
        }

        if let Some(scanner) = &self.scanner {
            finding_count += scanner.run_external_scans(job_id).await?;
        }

        self.store
            .set_job_completed(job_id, resource_count, finding_count)
            .await?;
        info!(%job_id, resource_count, finding_count, "scan completed");
        Ok(ScanJobResult {
            job_id,
            resource_count,
            finding_count,
        })
    }

    pub async fn get_scan_status(&self, job_id: Uuid) -> Result<ScanJob> {
        self.store
            .get_scan_job(job_id)
            .await?
            .ok_or(WardError::NotFound {
                entity: "scan job",
                id: job_id.to_string(),
            })
    }

    pub async fn list_scan_jobs(&self, limit: usize) -> Result<Vec<ScanJob>> {
        self.store.list_scan_jobs(limit).await
    }
}

fn to_normalized(resource: CollectedResource) -> NormalizedResource {
    NormalizedResource {
        id: resource.resource_id,
        resource_type: resource.resource_type,
        region: resource.region,
        account_id: resource.account_id,
        arn: None,
        metadata: resource.metadata,
        fetched_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::inventory::{InventorySource, JsonInventory};
    use crate::model::RunStatus;
    use crate::store::memory::MemoryStore;
    use crate::store::FindingFilter;
    use serde_json::json;
    use std::time::Duration;

    fn inventory() -> Arc<dyn InventorySource> {
        Arc::new(
            JsonInventory::from_value(json!({
                "us-east-1": {
                    "storage-bucket": [
                        {"name": "logs", "public_access_block": true, "encryption": false}
                    ],
                    "block-volume": [
                        {"volume_id": "vol-1", "encrypted": true}
                    ],
                    "identity-principal": [
                        {"user_name": "alice", "mfa_active": false, "access_keys_count": 1}
                    ]
                }
            }))
            .unwrap(),
        )
    }

    fn orchestrator(store: Arc<MemoryStore>) -> Arc<ScanOrchestrator> {
        let options = CollectOptions {
            regions: vec!["us-east-1".to_string()],
            account_id: "123456789012".to_string(),
        };
        Arc::new(ScanOrchestrator::new(
            store.clone(),
            ResourceCollector::new(store.clone(), inventory()),
            RuleEngine::new(),
            FindingStore::new(store),
            options,
        ))
    }

    #[tokio::test]
    async fn full_pipeline_counts_resources_and_findings() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());

        let result = orchestrator.run_scan(ScanJobType::Full).await.unwrap();
        assert_eq!(result.resource_count, 3);
        // unencrypted bucket + principal without MFA
        assert_eq!(result.finding_count, 2);

        let job = store.get_scan_job(result.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, RunStatus::Completed);
        assert_eq!(job.resource_count, 3);
        assert_eq!(job.finding_count, 2);

        let page = store.find_findings(FindingFilter::default()).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn concurrent_requests_serialize_and_all_complete() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());

        let (a, b) = tokio::join!(
            orchestrator.run_scan(ScanJobType::Full),
            orchestrator.run_scan(ScanJobType::OnDemand),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert_ne!(a.job_id, b.job_id);

        for id in [a.job_id, b.job_id] {
            let job = store.get_scan_job(id).await.unwrap().unwrap();
            assert_eq!(job.status, RunStatus::Completed);
        }
    }

    #[tokio::test]
    async fn trigger_scan_returns_job_id_before_completion() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());

        let job_id = orchestrator.trigger_scan(ScanJobType::Incremental).await.unwrap();
        // the id is usable immediately
        assert!(store.get_scan_job(job_id).await.unwrap().is_some());

        let job = loop {
            let job = store.get_scan_job(job_id).await.unwrap().unwrap();
            if job.status == RunStatus::Completed || job.status == RunStatus::Failed {
                break job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert_eq!(job.status, RunStatus::Completed);
        assert_eq!(job.job_type, ScanJobType::Incremental);
    }

    #[tokio::test]
    async fn repeat_scans_dedupe_findings() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());

        orchestrator.run_scan(ScanJobType::Full).await.unwrap();
        let second = orchestrator.run_scan(ScanJobType::Full).await.unwrap();

        // same violations observed again update the existing findings
        assert_eq!(second.finding_count, 2);
        let page = store.find_findings(FindingFilter::default()).await.unwrap();
        assert_eq!(page.total, 2);
        for finding in &page.items {
            assert_eq!(finding.scan_job_id, Some(second.job_id));
        }
    }
}
