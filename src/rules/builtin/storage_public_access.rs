use crate::model::{NormalizedResource, ResourceType, Severity};
use crate::rules::{RuleOutcome, RulePlugin};

/// S3_PUBLIC_ACCESS_BLOCK: storage buckets must have their public access
/// block configured.
pub struct StoragePublicAccessRule;

impl RulePlugin for StoragePublicAccessRule {
    fn code(&self) -> &'static str {
        "S3_PUBLIC_ACCESS_BLOCK"
    }

    fn name(&self) -> &'static str {
        "Storage bucket must block public access"
    }

    fn description(&self) -> &'static str {
        "Block public access should be enabled on storage buckets"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::StorageBucket
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn control_ids(&self) -> &'static [&'static str] {
        &["CIS-1.20", "SOC2-CC6.1"]
    }

    fn remediation(&self) -> &'static str {
        "Enable Block Public Access on the storage bucket"
    }

    fn evaluate(&self, resource: &NormalizedResource) -> RuleOutcome {
        if resource.metadata["public_access_block"] == true {
            return RuleOutcome::pass();
        }
        let name = resource.metadata["name"].as_str().unwrap_or(&resource.id);
        RuleOutcome::fail(format!(
            "Storage bucket {name} does not have Block Public Access enabled"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::resource;
    use serde_json::json;

    #[test]
    fn passes_with_block_configured() {
        let outcome = StoragePublicAccessRule.evaluate(&resource(
            "bucket-a",
            ResourceType::StorageBucket,
            json!({"name": "bucket-a", "public_access_block": true}),
        ));
        assert!(outcome.passed);
    }

    #[test]
    fn fails_without_block() {
        let outcome = StoragePublicAccessRule.evaluate(&resource(
            "bucket-b",
            ResourceType::StorageBucket,
            json!({"name": "bucket-b", "public_access_block": false}),
        ));
        assert!(!outcome.passed);
        assert!(outcome.message.unwrap().contains("bucket-b"));
    }

    #[test]
    fn missing_field_counts_as_unblocked() {
        let outcome = StoragePublicAccessRule.evaluate(&resource(
            "bucket-c",
            ResourceType::StorageBucket,
            json!({"name": "bucket-c"}),
        ));
        assert!(!outcome.passed);
    }
}
