//! In-process rule evaluation.
//!
//! Rules are pure functions over a single normalized resource — they
//! never perform I/O. The registry is static and resolved once; plugins
//! are filtered by resource type before evaluation.

pub mod builtin;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{NormalizedResource, ResourceType, Severity};

/// Result of evaluating one rule against one resource.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub passed: bool,
    pub message: Option<String>,
}

impl RuleOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// A compliance rule plugin. Implementations carry their own static
/// metadata so the finding store can materialize a rule row on first
/// sighting.
pub trait RulePlugin: Send + Sync {
    fn code(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn resource_type(&self) -> ResourceType;
    fn severity(&self) -> Severity;
    fn control_ids(&self) -> &'static [&'static str];
    fn remediation(&self) -> &'static str;
    fn evaluate(&self, resource: &NormalizedResource) -> RuleOutcome;
}

/// One failing rule evaluation, carrying the rule metadata and the
/// resource's metadata bag as evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub rule_code: String,
    pub rule_name: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub message: String,
    pub control_ids: Vec<String>,
    pub remediation: String,
    pub raw_resource: serde_json::Value,
}

/// Rule metadata for list output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub code: String,
    pub name: String,
    pub description: String,
    pub resource_type: ResourceType,
    pub severity: Severity,
    pub control_ids: Vec<String>,
}

/// Evaluates resources against all applicable registered rules.
pub struct RuleEngine {
    plugins: Vec<Arc<dyn RulePlugin>>,
}

impl RuleEngine {
    /// Create an engine backed by the static builtin registry.
    pub fn new() -> Self {
        Self {
            plugins: builtin::registry(),
        }
    }

    /// Evaluate one resource against every rule matching its type.
    pub fn evaluate(&self, resource: &NormalizedResource) -> Vec<Violation> {
        let mut violations = Vec::new();
        for plugin in self
            .plugins
            .iter()
            .filter(|p| p.resource_type() == resource.resource_type)
        {
            let outcome = plugin.evaluate(resource);
            if !outcome.passed {
                violations.push(Violation {
                    resource_id: resource.id.clone(),
                    resource_type: resource.resource_type,
                    rule_code: plugin.code().to_string(),
                    rule_name: plugin.name().to_string(),
                    description: Some(plugin.description().to_string()),
                    severity: plugin.severity(),
                    message: outcome
                        .message
                        .unwrap_or_else(|| format!("{} failed", plugin.name())),
                    control_ids: plugin.control_ids().iter().map(|c| c.to_string()).collect(),
                    remediation: plugin.remediation().to_string(),
                    raw_resource: resource.metadata.clone(),
                });
            }
        }
        violations
    }

    /// Evaluate a batch, concatenating violations in resource order.
    pub fn evaluate_batch(&self, resources: &[NormalizedResource]) -> Vec<Violation> {
        resources.iter().flat_map(|r| self.evaluate(r)).collect()
    }

    /// Metadata for every registered rule.
    pub fn list_rules(&self) -> Vec<RuleDescriptor> {
        self.plugins
            .iter()
            .map(|p| RuleDescriptor {
                code: p.code().to_string(),
                name: p.name().to_string(),
                description: p.description().to_string(),
                resource_type: p.resource_type(),
                severity: p.severity(),
                control_ids: p.control_ids().iter().map(|c| c.to_string()).collect(),
            })
            .collect()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use crate::model::{NormalizedResource, ResourceType};

    /// Build a resource with the given type and metadata for rule tests.
    pub fn resource(
        id: &str,
        resource_type: ResourceType,
        metadata: serde_json::Value,
    ) -> NormalizedResource {
        NormalizedResource {
            id: id.into(),
            resource_type,
            region: "us-east-1".into(),
            account_id: None,
            arn: None,
            metadata,
            fetched_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::resource;
    use super::*;
    use crate::model::ResourceType;
    use serde_json::json;

    #[test]
    fn engine_filters_by_resource_type() {
        let engine = RuleEngine::new();
        // An unencrypted volume must never trip storage-bucket rules.
        let violations = engine.evaluate(&resource(
            "vol-1",
            ResourceType::BlockVolume,
            json!({"encrypted": false}),
        ));
        assert!(violations.iter().all(|v| v.rule_code == "EBS_VOLUME_ENCRYPTED"));
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn violation_carries_rule_metadata_and_evidence() {
        let engine = RuleEngine::new();
        let metadata = json!({"encrypted": false, "volume_id": "vol-9"});
        let violations = engine.evaluate(&resource(
            "vol-9",
            ResourceType::BlockVolume,
            metadata.clone(),
        ));
        let v = &violations[0];
        assert_eq!(v.severity, crate::model::Severity::High);
        assert!(!v.control_ids.is_empty());
        assert_eq!(v.raw_resource, metadata);
        assert!(!v.remediation.is_empty());
    }

    #[test]
    fn list_rules_covers_every_builtin() {
        let engine = RuleEngine::new();
        let codes: Vec<String> = engine.list_rules().into_iter().map(|r| r.code).collect();
        for expected in [
            "S3_PUBLIC_ACCESS_BLOCK",
            "S3_ENCRYPTION",
            "IAM_MFA_ENABLED",
            "SG_PUBLIC_INGRESS",
            "RDS_STORAGE_ENCRYPTED",
            "EBS_VOLUME_ENCRYPTED",
            "CLOUDTRAIL_ENABLED",
        ] {
            assert!(codes.contains(&expected.to_string()), "missing {expected}");
        }
    }
}
