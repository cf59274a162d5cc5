use crate::model::{NormalizedResource, ResourceType, Severity};
use crate::rules::{RuleOutcome, RulePlugin};

/// RDS_STORAGE_ENCRYPTED: managed databases must use encrypted storage.
pub struct DatabaseEncryptionRule;

impl RulePlugin for DatabaseEncryptionRule {
    fn code(&self) -> &'static str {
        "RDS_STORAGE_ENCRYPTED"
    }

    fn name(&self) -> &'static str {
        "Managed database must have storage encryption enabled"
    }

    fn description(&self) -> &'static str {
        "Managed database instances should use encrypted storage"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::ManagedDatabase
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn control_ids(&self) -> &'static [&'static str] {
        &["CIS-4.3", "SOC2-CC6.1", "HIPAA-164.312"]
    }

    fn remediation(&self) -> &'static str {
        "Enable storage encryption on the database instance"
    }

    fn evaluate(&self, resource: &NormalizedResource) -> RuleOutcome {
        if resource.metadata["storage_encrypted"] == true {
            return RuleOutcome::pass();
        }
        let instance = resource.metadata["instance_id"].as_str().unwrap_or(&resource.id);
        RuleOutcome::fail(format!(
            "Database instance {instance} does not have storage encryption enabled"
        ))
    }
}
