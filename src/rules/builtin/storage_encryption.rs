use crate::model::{NormalizedResource, ResourceType, Severity};
use crate::rules::{RuleOutcome, RulePlugin};

/// S3_ENCRYPTION: storage buckets should use server-side encryption.
pub struct StorageEncryptionRule;

impl RulePlugin for StorageEncryptionRule {
    fn code(&self) -> &'static str {
        "S3_ENCRYPTION"
    }

    fn name(&self) -> &'static str {
        "Storage bucket should have encryption enabled"
    }

    fn description(&self) -> &'static str {
        "Storage buckets should use server-side encryption at rest"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::StorageBucket
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn control_ids(&self) -> &'static [&'static str] {
        &["CIS-1.21", "SOC2-CC6.1", "HIPAA-164.312"]
    }

    fn remediation(&self) -> &'static str {
        "Enable default server-side encryption on the storage bucket"
    }

    fn evaluate(&self, resource: &NormalizedResource) -> RuleOutcome {
        if resource.metadata["encryption"] == true {
            return RuleOutcome::pass();
        }
        let name = resource.metadata["name"].as_str().unwrap_or(&resource.id);
        RuleOutcome::fail(format!(
            "Storage bucket {name} does not have encryption enabled"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::resource;
    use serde_json::json;

    #[test]
    fn passes_when_encrypted() {
        let outcome = StorageEncryptionRule.evaluate(&resource(
            "bucket-a",
            ResourceType::StorageBucket,
            json!({"encryption": true}),
        ));
        assert!(outcome.passed);
    }

    #[test]
    fn fails_when_unencrypted() {
        let outcome = StorageEncryptionRule.evaluate(&resource(
            "bucket-b",
            ResourceType::StorageBucket,
            json!({"encryption": false}),
        ));
        assert!(!outcome.passed);
    }
}
