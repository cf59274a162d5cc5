use crate::model::{NormalizedResource, ResourceType, Severity};
use crate::rules::{RuleOutcome, RulePlugin};

/// CLOUDTRAIL_ENABLED: at least one audit trail must exist per account.
pub struct AuditTrailEnabledRule;

impl RulePlugin for AuditTrailEnabledRule {
    fn code(&self) -> &'static str {
        "CLOUDTRAIL_ENABLED"
    }

    fn name(&self) -> &'static str {
        "Audit trail must be enabled"
    }

    fn description(&self) -> &'static str {
        "At least one audit trail should record account activity"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::AuditTrail
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn control_ids(&self) -> &'static [&'static str] {
        &["CIS-3.1", "SOC2-CC7.2"]
    }

    fn remediation(&self) -> &'static str {
        "Enable an audit trail for account activity logging"
    }

    fn evaluate(&self, resource: &NormalizedResource) -> RuleOutcome {
        match resource.metadata["trail_name"].as_str() {
            Some(name) if name != "none" => RuleOutcome::pass(),
            _ => RuleOutcome::fail("No audit trail is configured"),
        }
    }
}
