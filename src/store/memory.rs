//! In-memory reference implementation of the storage port.
//!
//! Backs the CLI and the test suite. A single mutex over the whole state
//! gives every unique-key upsert the transactional behavior the port
//! requires; a relational implementation would rely on its unique
//! constraints instead.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::catalog::{
    Catalog, ComplianceMapping, ControlCheckMapping, ControlStatus, Criteria, CriteriaStatus,
    FrameworkArea, FrameworkCatalog, FrameworkStatus, GrcControl, ScopeStatus,
};
use crate::error::{Result, WardError};
use crate::findings::lifecycle;
use crate::model::{
    CollectedResource, ComplianceRule, ExternalScan, ExternalScanResult, Finding, FindingStatus,
    RunStatus, ScanJob, ScanJobType, Severity,
};
use crate::store::{FindingFilter, FindingPage, FindingUpsert, Store};

#[derive(Default)]
struct State {
    scan_jobs: HashMap<Uuid, ScanJob>,
    scan_job_order: Vec<Uuid>,
    resources: Vec<CollectedResource>,
    resource_keys: HashSet<(Uuid, String)>,
    rules: HashMap<String, ComplianceRule>,
    findings: HashMap<(String, Uuid), Finding>,
    finding_ids: HashMap<Uuid, (String, Uuid)>,
    external_scans: HashMap<Uuid, ExternalScan>,
    external_scan_order: Vec<Uuid>,
    external_results: Vec<ExternalScanResult>,
    catalog: Catalog,
    control_checks: Vec<ControlCheckMapping>,
    control_statuses: Vec<ControlStatus>,
    criteria_statuses: Vec<CriteriaStatus>,
    framework_statuses: Vec<FrameworkStatus>,
}

/// In-memory [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_scan_job(&self, job_type: ScanJobType) -> Result<ScanJob> {
        let mut state = self.state.lock().await;
        let job = ScanJob {
            id: Uuid::new_v4(),
            job_type,
            status: RunStatus::Pending,
            resource_count: 0,
            finding_count: 0,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: Utc::now(),
        };
        state.scan_jobs.insert(job.id, job.clone());
        state.scan_job_order.push(job.id);
        Ok(job)
    }

    async fn get_scan_job(&self, id: Uuid) -> Result<Option<ScanJob>> {
        Ok(self.state.lock().await.scan_jobs.get(&id).cloned())
    }

    async fn list_scan_jobs(&self, limit: usize) -> Result<Vec<ScanJob>> {
        let state = self.state.lock().await;
        Ok(state
            .scan_job_order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| state.scan_jobs.get(id).cloned())
            .collect())
    }

    async fn set_job_running(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        let job = state.scan_jobs.get_mut(&id).ok_or(WardError::NotFound {
            entity: "scan job",
            id: id.to_string(),
        })?;
        job.status = RunStatus::Running;
        job.started_at = Some(Utc::now());
        Ok(())
    }

    async fn set_job_completed(
        &self,
        id: Uuid,
        resource_count: u64,
        finding_count: u64,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let job = state.scan_jobs.get_mut(&id).ok_or(WardError::NotFound {
            entity: "scan job",
            id: id.to_string(),
        })?;
        job.status = RunStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.resource_count = resource_count;
        job.finding_count = finding_count;
        Ok(())
    }

    async fn set_job_failed(&self, id: Uuid, error_message: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let job = state.scan_jobs.get_mut(&id).ok_or(WardError::NotFound {
            entity: "scan job",
            id: id.to_string(),
        })?;
        job.status = RunStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error_message = Some(error_message.to_string());
        Ok(())
    }

    async fn completed_scan_job_ids(&self, limit: usize) -> Result<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut completed: Vec<&ScanJob> = state
            .scan_jobs
            .values()
            .filter(|j| j.status == RunStatus::Completed)
            .collect();
        completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(completed.iter().take(limit).map(|j| j.id).collect())
    }

    async fn insert_resources(&self, batch: Vec<CollectedResource>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut inserted = 0u64;
        for resource in batch {
            let key = (resource.scan_job_id, resource.resource_id.clone());
            if state.resource_keys.insert(key) {
                state.resources.push(resource);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_resources(&self, scan_job_id: Uuid) -> Result<Vec<CollectedResource>> {
        let state = self.state.lock().await;
        Ok(state
            .resources
            .iter()
            .filter(|r| r.scan_job_id == scan_job_id)
            .cloned()
            .collect())
    }

    async fn ensure_rule(&self, rule: ComplianceRule) -> Result<ComplianceRule> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.rules.get(&rule.code) {
            return Ok(existing.clone());
        }
        state.rules.insert(rule.code.clone(), rule.clone());
        Ok(rule)
    }

    async fn get_rule_by_code(&self, code: &str) -> Result<Option<ComplianceRule>> {
        Ok(self.state.lock().await.rules.get(code).cloned())
    }

    async fn list_rules(&self) -> Result<Vec<ComplianceRule>> {
        let state = self.state.lock().await;
        let mut rules: Vec<ComplianceRule> = state.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(rules)
    }

    async fn upsert_finding(&self, upsert: FindingUpsert) -> Result<Finding> {
        let mut state = self.state.lock().await;
        let key = (upsert.resource_id.clone(), upsert.rule_id);
        let now = Utc::now();

        if let Some(existing) = state.findings.get_mut(&key) {
            existing.last_seen_at = now;
            existing.raw_resource = upsert.raw_resource;
            existing.scan_job_id = upsert.scan_job_id;
            return Ok(existing.clone());
        }

        let finding = Finding {
            id: Uuid::new_v4(),
            resource_id: upsert.resource_id,
            resource_type: upsert.resource_type,
            rule_id: upsert.rule_id,
            rule_code: upsert.rule_code,
            severity: upsert.severity,
            message: upsert.message,
            control_ids: upsert.control_ids,
            raw_resource: upsert.raw_resource,
            status: FindingStatus::Open,
            first_seen_at: now,
            last_seen_at: now,
            scan_job_id: upsert.scan_job_id,
        };
        state.finding_ids.insert(finding.id, key.clone());
        state.findings.insert(key, finding.clone());
        Ok(finding)
    }

    async fn get_finding(&self, id: Uuid) -> Result<Option<Finding>> {
        let state = self.state.lock().await;
        Ok(state
            .finding_ids
            .get(&id)
            .and_then(|key| state.findings.get(key))
            .cloned())
    }

    async fn transition_finding(&self, id: Uuid, to: FindingStatus) -> Result<Finding> {
        let mut state = self.state.lock().await;
        let key = state
            .finding_ids
            .get(&id)
            .cloned()
            .ok_or(WardError::NotFound {
                entity: "finding",
                id: id.to_string(),
            })?;
        let finding = state.findings.get_mut(&key).ok_or(WardError::NotFound {
            entity: "finding",
            id: id.to_string(),
        })?;
        if !lifecycle::can_transition(finding.status, to) {
            return Err(WardError::InvalidTransition {
                from: finding.status,
                to,
            });
        }
        finding.status = to;
        Ok(finding.clone())
    }

    async fn find_findings(&self, filter: FindingFilter) -> Result<FindingPage> {
        let state = self.state.lock().await;
        let mut matched: Vec<&Finding> = state
            .findings
            .values()
            .filter(|f| filter.status.is_none_or(|s| f.status == s))
            .filter(|f| filter.severity.is_none_or(|s| f.severity == s))
            .filter(|f| filter.scan_job_id.is_none_or(|id| f.scan_job_id == Some(id)))
            .collect();
        matched.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));

        let total = matched.len() as u64;
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(50);
        let items = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(FindingPage { items, total })
    }

    async fn create_external_scan(&self, provider: &str) -> Result<ExternalScan> {
        let mut state = self.state.lock().await;
        let scan = ExternalScan {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
            result_count: 0,
            created_at: Utc::now(),
        };
        state.external_scans.insert(scan.id, scan.clone());
        state.external_scan_order.push(scan.id);
        Ok(scan)
    }

    async fn get_external_scan(&self, id: Uuid) -> Result<Option<ExternalScan>> {
        Ok(self.state.lock().await.external_scans.get(&id).cloned())
    }

    async fn set_external_scan_status(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
        result_count: Option<u64>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let scan = state.external_scans.get_mut(&id).ok_or(WardError::NotFound {
            entity: "external scan",
            id: id.to_string(),
        })?;
        scan.status = status;
        match status {
            RunStatus::Running => scan.started_at = Some(Utc::now()),
            RunStatus::Completed | RunStatus::Failed => scan.completed_at = Some(Utc::now()),
            RunStatus::Pending => {}
        }
        if let Some(message) = error_message {
            scan.error_message = Some(message);
        }
        if let Some(count) = result_count {
            scan.result_count = count;
        }
        Ok(())
    }

    async fn insert_external_results(&self, results: Vec<ExternalScanResult>) -> Result<()> {
        self.state.lock().await.external_results.extend(results);
        Ok(())
    }

    async fn list_external_results(&self, scan_id: Uuid) -> Result<Vec<ExternalScanResult>> {
        let state = self.state.lock().await;
        Ok(state
            .external_results
            .iter()
            .filter(|r| r.scan_id == scan_id)
            .cloned()
            .collect())
    }

    async fn completed_external_scan_ids(&self, limit: usize) -> Result<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut completed: Vec<&ExternalScan> = state
            .external_scans
            .values()
            .filter(|s| s.status == RunStatus::Completed)
            .collect();
        completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(completed.iter().take(limit).map(|s| s.id).collect())
    }

    async fn seed_catalog(&self, catalog: Catalog) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.catalog.frameworks.is_empty() {
            return Err(WardError::Catalog("catalog already seeded".into()));
        }
        state.catalog = catalog;
        Ok(())
    }

    async fn list_frameworks(&self) -> Result<Vec<FrameworkCatalog>> {
        let state = self.state.lock().await;
        let mut frameworks = state.catalog.frameworks.clone();
        frameworks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(frameworks)
    }

    async fn list_areas(&self, framework_id: &str) -> Result<Vec<FrameworkArea>> {
        let state = self.state.lock().await;
        Ok(state
            .catalog
            .areas
            .iter()
            .filter(|a| a.framework_id == framework_id)
            .cloned()
            .collect())
    }

    async fn list_framework_criteria(&self, framework_id: &str) -> Result<Vec<Criteria>> {
        let state = self.state.lock().await;
        let area_ids: HashSet<&str> = state
            .catalog
            .areas
            .iter()
            .filter(|a| a.framework_id == framework_id)
            .map(|a| a.id.as_str())
            .collect();
        let mut criteria: Vec<Criteria> = state
            .catalog
            .criteria
            .iter()
            .filter(|c| area_ids.contains(c.area_id.as_str()))
            .cloned()
            .collect();
        criteria.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(criteria)
    }

    async fn set_criteria_scope(&self, criteria_id: &str, scope: ScopeStatus) -> Result<Criteria> {
        let mut state = self.state.lock().await;
        let criteria = state
            .catalog
            .criteria
            .iter_mut()
            .find(|c| c.id == criteria_id)
            .ok_or(WardError::NotFound {
                entity: "criteria",
                id: criteria_id.to_string(),
            })?;
        criteria.scope_status = scope;
        Ok(criteria.clone())
    }

    async fn list_criteria_controls(&self, criteria_id: &str) -> Result<Vec<GrcControl>> {
        let state = self.state.lock().await;
        let control_ids: HashSet<&str> = state
            .catalog
            .criteria_controls
            .iter()
            .filter(|m| m.criteria_id == criteria_id)
            .map(|m| m.control_id.as_str())
            .collect();
        Ok(state
            .catalog
            .controls
            .iter()
            .filter(|c| control_ids.contains(c.id.as_str()))
            .cloned()
            .collect())
    }

    async fn list_controls(&self) -> Result<Vec<GrcControl>> {
        Ok(self.state.lock().await.catalog.controls.clone())
    }

    async fn list_control_checks(&self, control_id: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let mut checks: Vec<String> = state
            .control_checks
            .iter()
            .filter(|m| m.control_id == control_id)
            .map(|m| m.check_id.clone())
            .collect();
        checks.sort();
        Ok(checks)
    }

    async fn upsert_control_check_mapping(&self, control_id: &str, check_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let exists = state
            .control_checks
            .iter()
            .any(|m| m.control_id == control_id && m.check_id == check_id);
        if !exists {
            state.control_checks.push(ControlCheckMapping {
                control_id: control_id.to_string(),
                check_id: check_id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_compliance_mappings(&self) -> Result<Vec<ComplianceMapping>> {
        Ok(self.state.lock().await.catalog.compliance_mappings.clone())
    }

    async fn upsert_control_status(&self, status: ControlStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .control_statuses
            .iter_mut()
            .find(|s| s.control_id == status.control_id && s.scan_id == status.scan_id)
        {
            *existing = status;
        } else {
            state.control_statuses.push(status);
        }
        Ok(())
    }

    async fn upsert_criteria_status(&self, status: CriteriaStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .criteria_statuses
            .iter_mut()
            .find(|s| s.criteria_id == status.criteria_id && s.scan_id == status.scan_id)
        {
            *existing = status;
        } else {
            state.criteria_statuses.push(status);
        }
        Ok(())
    }

    async fn upsert_framework_status(&self, status: FrameworkStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .framework_statuses
            .iter_mut()
            .find(|s| s.framework_id == status.framework_id && s.scan_id == status.scan_id)
        {
            *existing = status;
        } else {
            state.framework_statuses.push(status);
        }
        Ok(())
    }

    async fn framework_statuses_for_scan(&self, scan_id: Uuid) -> Result<Vec<FrameworkStatus>> {
        let state = self.state.lock().await;
        Ok(state
            .framework_statuses
            .iter()
            .filter(|s| s.scan_id == scan_id)
            .cloned()
            .collect())
    }

    async fn get_control_status(
        &self,
        control_id: &str,
        scan_id: Uuid,
    ) -> Result<Option<ControlStatus>> {
        let state = self.state.lock().await;
        Ok(state
            .control_statuses
            .iter()
            .find(|s| s.control_id == control_id && s.scan_id == scan_id)
            .cloned())
    }

    async fn get_criteria_status(
        &self,
        criteria_id: &str,
        scan_id: Uuid,
    ) -> Result<Option<CriteriaStatus>> {
        let state = self.state.lock().await;
        Ok(state
            .criteria_statuses
            .iter()
            .find(|s| s.criteria_id == criteria_id && s.scan_id == scan_id)
            .cloned())
    }

    async fn latest_framework_status(&self, framework_id: &str) -> Result<Option<FrameworkStatus>> {
        let state = self.state.lock().await;
        Ok(state
            .framework_statuses
            .iter()
            .rev()
            .find(|s| s.framework_id == framework_id)
            .cloned())
    }

    async fn latest_control_status(&self, control_id: &str) -> Result<Option<ControlStatus>> {
        let state = self.state.lock().await;
        Ok(state
            .control_statuses
            .iter()
            .rev()
            .find(|s| s.control_id == control_id)
            .cloned())
    }

    async fn latest_criteria_status(&self, criteria_id: &str) -> Result<Option<CriteriaStatus>> {
        let state = self.state.lock().await;
        Ok(state
            .criteria_statuses
            .iter()
            .rev()
            .find(|s| s.criteria_id == criteria_id)
            .cloned())
    }

    async fn aggregated_scan_ids(&self) -> Result<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut seen = HashSet::new();
        Ok(state
            .framework_statuses
            .iter()
            .filter(|s| seen.insert(s.scan_id))
            .map(|s| s.scan_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_upsert(resource_id: &str, rule_id: Uuid) -> FindingUpsert {
        FindingUpsert {
            resource_id: resource_id.into(),
            resource_type: "block-volume".into(),
            rule_id,
            rule_code: "EBS_VOLUME_ENCRYPTED".into(),
            severity: Severity::High,
            message: "volume not encrypted".into(),
            control_ids: vec!["SOC2-CC6.1".into()],
            raw_resource: json!({"encrypted": false}),
            scan_job_id: None,
        }
    }

    #[tokio::test]
    async fn finding_upsert_preserves_status_and_first_seen() {
        let store = MemoryStore::new();
        let rule_id = Uuid::new_v4();

        let first = store.upsert_finding(sample_upsert("vol-1", rule_id)).await.unwrap();
        store
            .transition_finding(first.id, FindingStatus::Acknowledged)
            .await
            .unwrap();

        let mut second = sample_upsert("vol-1", rule_id);
        second.raw_resource = json!({"encrypted": false, "state": "in-use"});
        let updated = store.upsert_finding(second).await.unwrap();

        assert_eq!(updated.id, first.id);
        assert_eq!(updated.status, FindingStatus::Acknowledged);
        assert_eq!(updated.first_seen_at, first.first_seen_at);
        assert!(updated.last_seen_at >= first.last_seen_at);
        assert_eq!(updated.raw_resource["state"], "in-use");
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let store = MemoryStore::new();
        let finding = store
            .upsert_finding(sample_upsert("vol-2", Uuid::new_v4()))
            .await
            .unwrap();

        store
            .transition_finding(finding.id, FindingStatus::Resolved)
            .await
            .unwrap();
        let err = store
            .transition_finding(finding.id, FindingStatus::Suppressed)
            .await
            .unwrap_err();
        assert!(matches!(err, WardError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn duplicate_resources_within_scan_are_suppressed() {
        let store = MemoryStore::new();
        let job = store.create_scan_job(ScanJobType::Full).await.unwrap();
        let resource = CollectedResource {
            scan_job_id: job.id,
            resource_id: "bucket-1".into(),
            resource_type: crate::model::ResourceType::StorageBucket,
            region: "us-east-1".into(),
            account_id: None,
            metadata: json!({}),
        };

        let inserted = store
            .insert_resources(vec![resource.clone(), resource.clone()])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        let again = store.insert_resources(vec![resource]).await.unwrap();
        assert_eq!(again, 0);
        assert_eq!(store.list_resources(job.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn snapshot_upsert_overwrites_never_duplicates() {
        let store = MemoryStore::new();
        let scan_id = Uuid::new_v4();
        let mut status = FrameworkStatus {
            framework_id: "fw-soc2".into(),
            scan_id,
            readiness_percent: 40,
            ready_criteria: 2,
            total_criteria: 5,
            total_controls: 5,
            total_automated_checks: 9,
            in_scope_criteria: 5,
            out_of_scope_criteria: 1,
        };
        store.upsert_framework_status(status.clone()).await.unwrap();
        status.readiness_percent = 60;
        store.upsert_framework_status(status.clone()).await.unwrap();

        let rows = store.framework_statuses_for_scan(scan_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].readiness_percent, 60);
    }

    #[tokio::test]
    async fn seed_catalog_is_load_once() {
        let store = MemoryStore::new();
        store.seed_catalog(Catalog::builtin()).await.unwrap();
        let err = store.seed_catalog(Catalog::builtin()).await.unwrap_err();
        assert!(matches!(err, WardError::Catalog(_)));
    }
}
