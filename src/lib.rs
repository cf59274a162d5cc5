//! Cloudward — cloud security scanning and compliance readiness engine.
//!
//! Collects normalized cloud resources, evaluates them against a builtin
//! rule set, tracks deduplicated findings through a triage lifecycle,
//! drives an external scanner engine as a subprocess, and rolls check
//! outcomes up a compliance framework catalog into readiness snapshots.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cloudward::collector::inventory::JsonInventory;
//! use cloudward::model::ScanJobType;
//! use cloudward::{Engine, EngineOptions};
//!
//! # async fn run() -> cloudward::error::Result<()> {
//! let inventory = Arc::new(JsonInventory::from_file("inventory.json".as_ref())?);
//! let engine = Engine::new(inventory, EngineOptions::default()).await?;
//! let result = engine.run_scan(ScanJobType::Full).await?;
//! println!("resources: {}, findings: {}", result.resource_count, result.finding_count);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod collector;
pub mod config;
pub mod coverage;
pub mod error;
pub mod executor;
pub mod findings;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod rules;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use catalog::Catalog;
use collector::{CollectOptions, ResourceCollector};
use config::Config;
use coverage::CoverageAggregator;
use error::Result;
use executor::queue::ScanGate;
use executor::service::ExternalScannerService;
use executor::{EngineExecutor, EngineRunner, SubprocessRunner};
use findings::FindingStore;
use model::ScanJobType;
use orchestrator::{ScanJobResult, ScanOrchestrator};
use output::ScanReport;
use rules::RuleEngine;
use store::{FindingFilter, MemoryStore, Store};

/// Options for assembling an [`Engine`].
#[derive(Clone)]
pub struct EngineOptions {
    pub config: Config,
    /// Catalog seed; defaults to the builtin SOC 2 seed.
    pub catalog: Option<Catalog>,
    /// Override the engine subprocess runner (used by tests).
    pub runner: Option<Arc<dyn EngineRunner>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            config: Config::default(),
            catalog: None,
            runner: None,
        }
    }
}

/// Facade wiring the store, orchestrator, scanner and aggregator
/// together over an in-memory store.
pub struct Engine {
    store: Arc<MemoryStore>,
    orchestrator: Arc<ScanOrchestrator>,
    scanner: Option<Arc<ExternalScannerService>>,
    aggregator: Arc<CoverageAggregator>,
    sweep_interval: Duration,
    pending_limit: usize,
}

impl Engine {
    pub async fn new(
        inventory: Arc<dyn collector::inventory::InventorySource>,
        options: EngineOptions,
    ) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let store_dyn: Arc<dyn Store> = store.clone();
        store_dyn
            .seed_catalog(options.catalog.unwrap_or_else(Catalog::builtin))
            .await?;

        let findings = FindingStore::new(store_dyn.clone());
        let collect_options = CollectOptions {
            regions: options.config.collector.regions.clone(),
            account_id: options.config.collector.account_id.clone(),
        };

        let scanner = if options.config.executor.enabled {
            let runner = options
                .runner
                .unwrap_or_else(|| Arc::new(SubprocessRunner::new()));
            let gate = Arc::new(ScanGate::new(options.config.executor.max_concurrent_scans));
            let executor = Arc::new(EngineExecutor::new(runner, gate));
            Some(Arc::new(ExternalScannerService::new(
                store_dyn.clone(),
                findings.clone(),
                executor,
                options.config.executor.scanner_config(),
            )))
        } else {
            None
        };

        let mut orchestrator = ScanOrchestrator::new(
            store_dyn.clone(),
            ResourceCollector::new(store_dyn.clone(), inventory),
            RuleEngine::new(),
            findings,
            collect_options,
        );
        if let Some(scanner) = &scanner {
            orchestrator = orchestrator.with_scanner(scanner.clone());
        }

        Ok(Self {
            store,
            orchestrator: Arc::new(orchestrator),
            scanner,
            aggregator: Arc::new(CoverageAggregator::new(store_dyn)),
            sweep_interval: Duration::from_secs(options.config.coverage.sweep_interval_secs),
            pending_limit: options.config.coverage.pending_limit,
        })
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    pub fn orchestrator(&self) -> Arc<ScanOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn scanner(&self) -> Option<Arc<ExternalScannerService>> {
        self.scanner.clone()
    }

    pub fn aggregator(&self) -> Arc<CoverageAggregator> {
        self.aggregator.clone()
    }

    /// Run a scan to completion and aggregate its coverage.
    pub async fn run_scan(&self, job_type: ScanJobType) -> Result<ScanJobResult> {
        let result = self.orchestrator.run_scan(job_type).await?;
        self.aggregator.aggregate_scan(result.job_id).await?;
        Ok(result)
    }

    /// Submit a scan and return its job id without waiting. Coverage for
    /// fire-and-forget scans is picked up by the sweeper.
    pub async fn trigger_scan(&self, job_type: ScanJobType) -> Result<Uuid> {
        self.orchestrator.trigger_scan(job_type).await
    }

    /// Start the background coverage sweep.
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.aggregator
            .spawn_sweeper(self.sweep_interval, self.pending_limit)
    }

    /// Assemble the renderable report for a finished scan.
    pub async fn report(&self, job_id: Uuid) -> Result<ScanReport> {
        let job = self.orchestrator.get_scan_status(job_id).await?;
        let store: Arc<dyn Store> = self.store.clone();
        let findings = store
            .find_findings(FindingFilter {
                scan_job_id: Some(job_id),
                limit: Some(usize::MAX),
                ..FindingFilter::default()
            })
            .await?
            .items;
        let coverage = self.aggregator.get_coverage(job_id).await?;
        Ok(ScanReport {
            job,
            findings,
            coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ScopeStatus;
    use crate::collector::inventory::JsonInventory;
    use crate::model::{FindingStatus, RunStatus};
    use serde_json::json;

    fn inventory() -> Arc<dyn collector::inventory::InventorySource> {
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

    fn options() -> EngineOptions {
        let mut config = Config::default();
        config.collector.regions = vec!["us-east-1".to_string()];
        EngineOptions {
            config,
            ..EngineOptions::default()
        }
    }

    #[tokio::test]
    async fn scan_evaluates_and_aggregates() {
        let engine = Engine::new(inventory(), options()).await.unwrap();
        let result = engine.run_scan(ScanJobType::Full).await.unwrap();

        assert_eq!(result.resource_count, 3);
        assert_eq!(result.finding_count, 2);

        let report = engine.report(result.job_id).await.unwrap();
        assert_eq!(report.job.status, RunStatus::Completed);
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.coverage.len(), 1);
        // cc6-1 partial (failing checks), cc7-2 ready (silent)
        assert_eq!(report.coverage[0].readiness_percent, 50);
    }

    #[tokio::test]
    async fn findings_survive_triage_across_scans() {
        let engine = Engine::new(inventory(), options()).await.unwrap();
        let first = engine.run_scan(ScanJobType::Full).await.unwrap();

        let store: Arc<dyn Store> = engine.store();
        let finding = store
            .find_findings(FindingFilter::default())
            .await
            .unwrap()
            .items
            .remove(0);
        let acknowledged = store
            .transition_finding(finding.id, FindingStatus::Acknowledged)
            .await
            .unwrap();
        assert_eq!(acknowledged.status, FindingStatus::Acknowledged);

        let second = engine.run_scan(ScanJobType::Full).await.unwrap();
        assert_ne!(first.job_id, second.job_id);

        let after = store.get_finding(finding.id).await.unwrap().unwrap();
        // re-observation refreshes the sighting but not the triage state
        assert_eq!(after.status, FindingStatus::Acknowledged);
        assert_eq!(after.scan_job_id, Some(second.job_id));
        assert!(after.last_seen_at >= acknowledged.last_seen_at);
    }

    #[tokio::test]
    async fn rescoped_catalog_reaches_full_readiness() {
        let engine = Engine::new(inventory(), options()).await.unwrap();
        engine
            .aggregator()
            .set_criteria_scope("cr-cc6-1", ScopeStatus::OutOfScope)
            .await
            .unwrap();

        let result = engine.run_scan(ScanJobType::Full).await.unwrap();
        let coverage = engine.aggregator().get_coverage(result.job_id).await.unwrap();
        assert_eq!(coverage[0].in_scope_criteria, 1);
        assert_eq!(coverage[0].readiness_percent, 100);
    }
}
