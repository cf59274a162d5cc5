//! Storage port for the scanning engine.
//!
//! The relational store is an external collaborator; the engine only
//! depends on this trait. Every upsert keyed by a unique constraint
//! (`(resource_id, rule_id)` for findings, `(entity, scan_id)` for
//! snapshots) must be transactional — concurrent upserts to the same key
//! serialize inside the implementation, since the engine holds no locks
//! of its own.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::catalog::{
    Catalog, ComplianceMapping, ControlStatus, Criteria, CriteriaStatus, FrameworkArea,
    FrameworkCatalog, FrameworkStatus, GrcControl, ScopeStatus,
};
use crate::error::Result;
use crate::model::{
    CollectedResource, ComplianceRule, ExternalScan, ExternalScanResult, Finding, FindingStatus,
    RunStatus, ScanJob, ScanJobType, Severity,
};

pub use memory::MemoryStore;

/// Input for the transactional finding upsert.
#[derive(Debug, Clone)]
pub struct FindingUpsert {
    pub resource_id: String,
    pub resource_type: String,
    pub rule_id: Uuid,
    pub rule_code: String,
    pub severity: Severity,
    pub message: String,
    pub control_ids: Vec<String>,
    pub raw_resource: serde_json::Value,
    pub scan_job_id: Option<Uuid>,
}

/// Filter for finding queries. `limit` defaults to 50 in implementations.
#[derive(Debug, Clone, Default)]
pub struct FindingFilter {
    pub status: Option<FindingStatus>,
    pub severity: Option<Severity>,
    pub scan_job_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// A page of findings plus the unpaged total.
#[derive(Debug, Clone)]
pub struct FindingPage {
    pub items: Vec<Finding>,
    pub total: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- scan jobs ---

    async fn create_scan_job(&self, job_type: ScanJobType) -> Result<ScanJob>;
    async fn get_scan_job(&self, id: Uuid) -> Result<Option<ScanJob>>;
    async fn list_scan_jobs(&self, limit: usize) -> Result<Vec<ScanJob>>;
    async fn set_job_running(&self, id: Uuid) -> Result<()>;
    async fn set_job_completed(
        &self,
        id: Uuid,
        resource_count: u64,
        finding_count: u64,
    ) -> Result<()>;
    async fn set_job_failed(&self, id: Uuid, error_message: &str) -> Result<()>;
    /// Ids of completed scan jobs, most recently completed first.
    async fn completed_scan_job_ids(&self, limit: usize) -> Result<Vec<Uuid>>;

    // --- collected resources ---

    /// Batched insert; duplicates of `(scan_job_id, resource_id)` are
    /// suppressed. Returns the number of rows actually inserted.
    async fn insert_resources(&self, batch: Vec<CollectedResource>) -> Result<u64>;
    async fn list_resources(&self, scan_job_id: Uuid) -> Result<Vec<CollectedResource>>;

    // --- compliance rules ---

    /// Get-or-create by `code`, transactionally. The passed rule is only
    /// used when no row with that code exists yet.
    async fn ensure_rule(&self, rule: ComplianceRule) -> Result<ComplianceRule>;
    async fn get_rule_by_code(&self, code: &str) -> Result<Option<ComplianceRule>>;
    async fn list_rules(&self) -> Result<Vec<ComplianceRule>>;

    // --- findings ---

    /// Transactional upsert by `(resource_id, rule_id)`. On conflict only
    /// `last_seen_at`, `raw_resource` and `scan_job_id` are refreshed.
    async fn upsert_finding(&self, upsert: FindingUpsert) -> Result<Finding>;
    async fn get_finding(&self, id: Uuid) -> Result<Option<Finding>>;
    /// Apply a lifecycle transition, rejecting pairs outside the
    /// transition table. The check runs inside the store lock.
    async fn transition_finding(&self, id: Uuid, to: FindingStatus) -> Result<Finding>;
    async fn find_findings(&self, filter: FindingFilter) -> Result<FindingPage>;

    // --- external scans ---

    async fn create_external_scan(&self, provider: &str) -> Result<ExternalScan>;
    async fn get_external_scan(&self, id: Uuid) -> Result<Option<ExternalScan>>;
    async fn set_external_scan_status(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
        result_count: Option<u64>,
    ) -> Result<()>;
    async fn insert_external_results(&self, results: Vec<ExternalScanResult>) -> Result<()>;
    async fn list_external_results(&self, scan_id: Uuid) -> Result<Vec<ExternalScanResult>>;
    async fn completed_external_scan_ids(&self, limit: usize) -> Result<Vec<Uuid>>;

    // --- framework catalog ---

    /// Load the static seed. Fails if a catalog is already present.
    async fn seed_catalog(&self, catalog: Catalog) -> Result<()>;
    async fn list_frameworks(&self) -> Result<Vec<FrameworkCatalog>>;
    async fn list_areas(&self, framework_id: &str) -> Result<Vec<FrameworkArea>>;
    async fn list_framework_criteria(&self, framework_id: &str) -> Result<Vec<Criteria>>;
    async fn set_criteria_scope(&self, criteria_id: &str, scope: ScopeStatus) -> Result<Criteria>;
    async fn list_criteria_controls(&self, criteria_id: &str) -> Result<Vec<GrcControl>>;
    async fn list_controls(&self) -> Result<Vec<GrcControl>>;
    async fn list_control_checks(&self, control_id: &str) -> Result<Vec<String>>;
    /// Idempotent upsert of a control/check mapping.
    async fn upsert_control_check_mapping(&self, control_id: &str, check_id: &str) -> Result<()>;
    async fn list_compliance_mappings(&self) -> Result<Vec<ComplianceMapping>>;

    // --- per-scan status snapshots ---

    async fn upsert_control_status(&self, status: ControlStatus) -> Result<()>;
    async fn upsert_criteria_status(&self, status: CriteriaStatus) -> Result<()>;
    async fn upsert_framework_status(&self, status: FrameworkStatus) -> Result<()>;
    async fn framework_statuses_for_scan(&self, scan_id: Uuid) -> Result<Vec<FrameworkStatus>>;
    async fn get_control_status(
        &self,
        control_id: &str,
        scan_id: Uuid,
    ) -> Result<Option<ControlStatus>>;
    async fn get_criteria_status(
        &self,
        criteria_id: &str,
        scan_id: Uuid,
    ) -> Result<Option<CriteriaStatus>>;
    async fn latest_framework_status(&self, framework_id: &str) -> Result<Option<FrameworkStatus>>;
    async fn latest_control_status(&self, control_id: &str) -> Result<Option<ControlStatus>>;
    async fn latest_criteria_status(&self, criteria_id: &str) -> Result<Option<CriteriaStatus>>;
    /// Distinct scan ids that already have a framework snapshot.
    async fn aggregated_scan_ids(&self) -> Result<Vec<Uuid>>;
}
