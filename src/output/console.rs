use crate::model::Severity;
use crate::output::ScanReport;

/// Render a scan report as console text, findings grouped worst-first.
pub fn render(report: &ScanReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "\n  Scan {} ({}) - {}\n",
        report.job.id, report.job.job_type, report.job.status
    ));
    output.push_str(&format!(
        "  Resources: {}  Findings: {}\n\n",
        report.job.resource_count, report.job.finding_count
    ));

    if report.findings.is_empty() {
        output.push_str("  No open findings.\n\n");
    } else {
        let mut sorted: Vec<_> = report.findings.iter().collect();
        sorted.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });

        for finding in sorted {
            let severity_tag = match finding.severity {
                Severity::Critical => "[CRITICAL]",
                Severity::High => "[HIGH]    ",
                Severity::Medium => "[MEDIUM]  ",
                Severity::Low => "[LOW]     ",
                Severity::Informational => "[INFO]    ",
            };
            output.push_str(&format!(
                "  {} {} {}\n",
                severity_tag, finding.rule_code, finding.message
            ));
            output.push_str(&format!(
                "           resource: {} ({})\n\n",
                finding.resource_id, finding.resource_type
            ));
        }
    }

    if !report.coverage.is_empty() {
        output.push_str("  Compliance readiness:\n");
        for status in &report.coverage {
            output.push_str(&format!(
                "    {}: {}% ({}/{} in-scope criteria ready)\n",
                status.framework_id,
                status.readiness_percent,
                status.ready_criteria,
                status.in_scope_criteria
            ));
        }
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Finding, FindingStatus, RunStatus, ScanJob, ScanJobType};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn report(findings: Vec<Finding>) -> ScanReport {
        ScanReport {
            job: ScanJob {
                id: Uuid::new_v4(),
                job_type: ScanJobType::Full,
                status: RunStatus::Completed,
                resource_count: 3,
                finding_count: findings.len() as u64,
                started_at: Some(Utc::now()),
                completed_at: Some(Utc::now()),
                error_message: None,
                created_at: Utc::now(),
            },
            findings,
            coverage: Vec::new(),
        }
    }

    fn finding(severity: Severity, rule_code: &str) -> Finding {
        Finding {
            id: Uuid::new_v4(),
            resource_id: "bucket-a".into(),
            resource_type: "storage-bucket".into(),
            rule_id: Uuid::new_v4(),
            rule_code: rule_code.into(),
            severity,
            message: "bucket-a violates the rule".into(),
            control_ids: vec![],
            raw_resource: json!({}),
            status: FindingStatus::Open,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            scan_job_id: None,
        }
    }

    #[test]
    fn empty_report_says_so() {
        let text = render(&report(vec![]));
        assert!(text.contains("No open findings"));
    }

    #[test]
    fn findings_sorted_worst_first() {
        let text = render(&report(vec![
            finding(Severity::Medium, "S3_ENCRYPTION"),
            finding(Severity::Critical, "CLOUDTRAIL_ENABLED"),
        ]));
        let critical = text.find("CLOUDTRAIL_ENABLED").unwrap();
        let medium = text.find("S3_ENCRYPTION").unwrap();
        assert!(critical < medium);
    }
}
