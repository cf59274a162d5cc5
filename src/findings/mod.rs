//! Deduplicated finding tracking.
//!
//! Findings are keyed by `(resource_id, rule_id)`. The first sighting of
//! an unknown rule code materializes a [`ComplianceRule`] row from the
//! rule metadata embedded in the violation or external finding — this is
//! how externally sourced rule catalogs enter the system without a
//! separate sync step.

pub mod lifecycle;

use std::sync::Arc;

use uuid::Uuid;

use crate::error::Result;
use crate::model::{ComplianceRule, ExternalFinding, Finding, FindingStatus};
use crate::rules::Violation;
use crate::store::{FindingFilter, FindingPage, FindingUpsert, Store};

/// Service wrapping the store's finding operations.
#[derive(Clone)]
pub struct FindingStore {
    store: Arc<dyn Store>,
}

impl FindingStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Upsert a rule-engine violation. Human triage state on an existing
    /// finding survives the re-observation.
    pub async fn upsert_from_violation(
        &self,
        violation: &Violation,
        scan_job_id: Option<Uuid>,
    ) -> Result<Finding> {
        let rule = self
            .store
            .ensure_rule(ComplianceRule {
                id: Uuid::new_v4(),
                code: violation.rule_code.clone(),
                name: violation.rule_name.clone(),
                description: violation.description.clone(),
                resource_type: violation.resource_type.as_str().to_string(),
                severity: violation.severity,
                control_ids: violation.control_ids.clone(),
                enabled: true,
            })
            .await?;

        self.store
            .upsert_finding(FindingUpsert {
                resource_id: violation.resource_id.clone(),
                resource_type: violation.resource_type.as_str().to_string(),
                rule_id: rule.id,
                rule_code: violation.rule_code.clone(),
                severity: violation.severity,
                message: violation.message.clone(),
                control_ids: violation.control_ids.clone(),
                raw_resource: violation.raw_resource.clone(),
                scan_job_id,
            })
            .await
    }

    /// Upsert a failing check reported by an external scanner engine.
    pub async fn upsert_from_external_finding(
        &self,
        finding: &ExternalFinding,
        scan_job_id: Option<Uuid>,
    ) -> Result<Finding> {
        let rule = self
            .store
            .ensure_rule(ComplianceRule {
                id: Uuid::new_v4(),
                code: finding.rule_code.clone(),
                name: finding.rule_name.clone(),
                description: None,
                resource_type: finding.resource_type.clone(),
                severity: finding.severity,
                control_ids: finding.control_ids.clone(),
                enabled: true,
            })
            .await?;

        self.store
            .upsert_finding(FindingUpsert {
                resource_id: finding.resource_id.clone(),
                resource_type: finding.resource_type.clone(),
                rule_id: rule.id,
                rule_code: finding.rule_code.clone(),
                severity: finding.severity,
                message: finding.message.clone(),
                control_ids: finding.control_ids.clone(),
                raw_resource: finding
                    .raw_resource
                    .clone()
                    .unwrap_or(serde_json::Value::Null),
                scan_job_id,
            })
            .await
    }

    /// Apply a lifecycle transition; rejects pairs outside the table.
    pub async fn update_status(&self, id: Uuid, status: FindingStatus) -> Result<Finding> {
        self.store.transition_finding(id, status).await
    }

    pub async fn find_many(&self, filter: FindingFilter) -> Result<FindingPage> {
        self.store.find_findings(filter).await
    }
}
