//! Normalization of raw engine output into scan results and findings.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::model::{CheckState, ExternalFinding, ExternalScanResult, Severity};

/// Output is valid when it parses as a non-empty JSON array whose every
/// element is an object carrying a `plugin` or `title` key. An empty
/// array means the engine produced no checks at all, which only happens
/// when it crashed mid-write or emitted diagnostics instead of results.
pub fn is_valid_output(value: &Value) -> bool {
    match value.as_array() {
        Some(items) => {
            !items.is_empty()
                && items
                    .iter()
                    .all(|item| item.get("plugin").is_some() || item.get("title").is_some())
        }
        None => false,
    }
}

/// `OK` passes, `FAIL` fails, `WARN` maps to informational. Unknown
/// states are treated as passing rather than inflating failure counts.
pub fn normalize_state(status: &Value) -> CheckState {
    match status.as_str().map(str::to_uppercase).as_deref() {
        Some("OK") => CheckState::Pass,
        Some("FAIL") => CheckState::Fail,
        Some("WARN") => CheckState::Info,
        _ => CheckState::Pass,
    }
}

pub fn normalize_severity(value: &Value) -> Severity {
    value
        .as_str()
        .and_then(Severity::from_str_lenient)
        .unwrap_or(Severity::Medium)
}

/// Convert one raw engine item into a stored scan result.
pub fn to_scan_result(scan_id: Uuid, item: &Value) -> ExternalScanResult {
    let rule_name = item["plugin"]
        .as_str()
        .or_else(|| item["title"].as_str())
        .unwrap_or("unknown")
        .to_string();
    ExternalScanResult {
        scan_id,
        rule_name,
        status: normalize_state(&item["status"]),
        resource_id: item["resource"].as_str().map(str::to_owned),
        region: item["region"].as_str().map(str::to_owned),
        message: item["message"].as_str().map(str::to_owned),
        raw: item.clone(),
        timestamp: Utc::now(),
    }
}

/// Failing results feed the finding pipeline as external findings.
pub fn to_external_finding(provider: &str, result: &ExternalScanResult) -> ExternalFinding {
    ExternalFinding {
        source: provider.to_string(),
        resource_id: result
            .resource_id
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        resource_type: result.raw["category"]
            .as_str()
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|| "external".to_string()),
        region: result.region.clone().unwrap_or_else(|| "global".to_string()),
        rule_code: rule_code_for(&result.rule_name),
        rule_name: result.rule_name.clone(),
        severity: normalize_severity(&result.raw["severity"]),
        message: result
            .message
            .clone()
            .unwrap_or_else(|| format!("{} reported a failure", result.rule_name)),
        control_ids: Vec::new(),
        raw_resource: Some(result.raw.clone()),
    }
}

fn rule_code_for(rule_name: &str) -> String {
    rule_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_arrays_of_plugin_or_title_items() {
        assert!(is_valid_output(&json!([{"plugin": "s3Encryption"}])));
        assert!(is_valid_output(&json!([{"title": "S3 Encryption"}])));
        assert!(!is_valid_output(&json!({"error": "boom"})));
        assert!(!is_valid_output(&json!([{"plugin": "ok"}, {"status": "FAIL"}])));
    }

    #[test]
    fn empty_result_set_is_invalid() {
        // the engine always reports every check it ran; an empty array
        // means it never got that far
        assert!(!is_valid_output(&json!([])));
    }

    #[test]
    fn maps_engine_states() {
        assert_eq!(normalize_state(&json!("OK")), CheckState::Pass);
        assert_eq!(normalize_state(&json!("fail")), CheckState::Fail);
        assert_eq!(normalize_state(&json!("Warn")), CheckState::Info);
        assert_eq!(normalize_state(&json!("UNKNOWN")), CheckState::Pass);
        assert_eq!(normalize_state(&json!(null)), CheckState::Pass);
    }

    #[test]
    fn severity_falls_back_to_medium() {
        assert_eq!(normalize_severity(&json!("critical")), Severity::Critical);
        assert_eq!(normalize_severity(&json!("nonsense")), Severity::Medium);
        assert_eq!(normalize_severity(&json!(null)), Severity::Medium);
    }

    #[test]
    fn converts_raw_items_to_results() {
        let scan_id = Uuid::new_v4();
        let result = to_scan_result(
            scan_id,
            &json!({
                "plugin": "bucketEncryption",
                "status": "FAIL",
                "resource": "arn:aws:s3:::logs",
                "region": "us-east-1",
                "message": "Bucket is unencrypted"
            }),
        );
        assert_eq!(result.scan_id, scan_id);
        assert_eq!(result.rule_name, "bucketEncryption");
        assert_eq!(result.status, CheckState::Fail);
        assert_eq!(result.resource_id.as_deref(), Some("arn:aws:s3:::logs"));
    }

    #[test]
    fn failing_results_become_findings() {
        let result = to_scan_result(
            Uuid::new_v4(),
            &json!({
                "title": "Bucket Encryption",
                "status": "FAIL",
                "category": "S3",
                "severity": "high",
                "region": "eu-west-1"
            }),
        );
        let finding = to_external_finding("cloudsploit", &result);
        assert_eq!(finding.source, "cloudsploit");
        assert_eq!(finding.rule_code, "BUCKET_ENCRYPTION");
        assert_eq!(finding.resource_type, "s3");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.region, "eu-west-1");
    }
}
