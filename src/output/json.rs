use crate::error::Result;
use crate::output::ScanReport;

/// Render a scan report as pretty-printed JSON.
pub fn render(report: &ScanReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunStatus, ScanJob, ScanJobType};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn report_serializes_with_counts() {
        let report = ScanReport {
            job: ScanJob {
                id: Uuid::new_v4(),
                job_type: ScanJobType::OnDemand,
                status: RunStatus::Completed,
                resource_count: 5,
                finding_count: 2,
                started_at: None,
                completed_at: None,
                error_message: None,
                created_at: Utc::now(),
            },
            findings: vec![],
            coverage: vec![],
        };
        let json = render(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["job"]["resource_count"], 5);
        assert_eq!(value["job"]["job_type"], "on_demand");
        assert!(value["findings"].as_array().unwrap().is_empty());
    }
}
