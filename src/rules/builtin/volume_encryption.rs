use crate::model::{NormalizedResource, ResourceType, Severity};
use crate::rules::{RuleOutcome, RulePlugin};

/// EBS_VOLUME_ENCRYPTED: block volumes must be encrypted.
pub struct VolumeEncryptionRule;

impl RulePlugin for VolumeEncryptionRule {
    fn code(&self) -> &'static str {
        "EBS_VOLUME_ENCRYPTED"
    }

    fn name(&self) -> &'static str {
        "Block volume must be encrypted"
    }

    fn description(&self) -> &'static str {
        "Block volumes should use encryption at rest"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::BlockVolume
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn control_ids(&self) -> &'static [&'static str] {
        &["CIS-4.2", "SOC2-CC6.1", "HIPAA-164.312"]
    }

    fn remediation(&self) -> &'static str {
        "Enable encryption on the block volume"
    }

    fn evaluate(&self, resource: &NormalizedResource) -> RuleOutcome {
        if resource.metadata["encrypted"] == true {
            return RuleOutcome::pass();
        }
        let volume = resource.metadata["volume_id"].as_str().unwrap_or(&resource.id);
        RuleOutcome::fail(format!("Block volume {volume} is not encrypted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::resource;
    use serde_json::json;

    #[test]
    fn passes_when_encrypted() {
        let outcome = VolumeEncryptionRule.evaluate(&resource(
            "vol-1",
            ResourceType::BlockVolume,
            json!({"encrypted": true}),
        ));
        assert!(outcome.passed);
    }

    #[test]
    fn fails_when_unencrypted() {
        let outcome = VolumeEncryptionRule.evaluate(&resource(
            "vol-2",
            ResourceType::BlockVolume,
            json!({"volume_id": "vol-2", "encrypted": false}),
        ));
        assert!(!outcome.passed);
        assert!(outcome.message.unwrap().contains("vol-2"));
    }
}
