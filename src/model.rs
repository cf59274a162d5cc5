//! Core entities shared across the scanning engine.
//!
//! Naming follows the wire spellings used by the API layer: enum variants
//! serialize to the lowercase / kebab-case strings shown on each type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of scan run requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanJobType {
    Full,
    Incremental,
    OnDemand,
}

impl std::fmt::Display for ScanJobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
            Self::OnDemand => write!(f, "on_demand"),
        }
    }
}

/// Lifecycle of a scan job or an external engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One internal scan run. Mutated only by the orchestrator; `completed`
/// and `failed` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: Uuid,
    pub job_type: ScanJobType,
    pub status: RunStatus,
    pub resource_count: u64,
    pub finding_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Provider-agnostic resource categories the collector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    StorageBucket,
    IdentityPrincipal,
    NetworkBoundary,
    ManagedDatabase,
    BlockVolume,
    AuditTrail,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageBucket => "storage-bucket",
            Self::IdentityPrincipal => "identity-principal",
            Self::NetworkBoundary => "network-boundary",
            Self::ManagedDatabase => "managed-database",
            Self::BlockVolume => "block-volume",
            Self::AuditTrail => "audit-trail",
        }
    }

    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "storage-bucket" | "storage_bucket" => Some(Self::StorageBucket),
            "identity-principal" | "identity_principal" => Some(Self::IdentityPrincipal),
            "network-boundary" | "network_boundary" => Some(Self::NetworkBoundary),
            "managed-database" | "managed_database" => Some(Self::ManagedDatabase),
            "block-volume" | "block_volume" => Some(Self::BlockVolume),
            "audit-trail" | "audit_trail" => Some(Self::AuditTrail),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One normalized cloud resource as emitted by a fetcher.
///
/// `metadata` carries exactly the fields rules need for this resource
/// type; fetchers keep it minimal to bound memory and API cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedResource {
    pub id: String,
    pub resource_type: ResourceType,
    pub region: String,
    pub account_id: Option<String>,
    pub arn: Option<String>,
    pub metadata: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

/// A resource persisted for one scan job. Append-only within a job;
/// duplicates of `(scan_job_id, resource_id)` are suppressed at insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedResource {
    pub scan_job_id: Uuid,
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub region: String,
    pub account_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Severity buckets, ordered ascending so `Ord` sorts worst-last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "informational" | "info" => Some(Self::Informational),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Informational => write!(f, "informational"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A compliance rule row, materialized lazily the first time a violation
/// or external finding references its code.
///
/// `resource_type` is a free-form string because externally sourced rules
/// reference services the builtin [`ResourceType`] set does not cover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRule {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub resource_type: String,
    pub severity: Severity,
    pub control_ids: Vec<String>,
    pub enabled: bool,
}

/// Triage states for a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Open,
    Acknowledged,
    Resolved,
    Suppressed,
}

impl FindingStatus {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "acknowledged" | "ack" => Some(Self::Acknowledged),
            "resolved" => Some(Self::Resolved),
            "suppressed" => Some(Self::Suppressed),
            _ => None,
        }
    }
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Acknowledged => write!(f, "acknowledged"),
            Self::Resolved => write!(f, "resolved"),
            Self::Suppressed => write!(f, "suppressed"),
        }
    }
}

/// The unit of tracked non-compliance. `(resource_id, rule_id)` is
/// globally unique; re-observation refreshes `last_seen_at`,
/// `raw_resource` and `scan_job_id` while `status` and `first_seen_at`
/// survive re-scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub resource_id: String,
    pub resource_type: String,
    pub rule_id: Uuid,
    pub rule_code: String,
    pub severity: Severity,
    pub message: String,
    pub control_ids: Vec<String>,
    pub raw_resource: serde_json::Value,
    pub status: FindingStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub scan_job_id: Option<Uuid>,
}

/// One invocation of a third-party scanning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalScan {
    pub id: Uuid,
    pub provider: String,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Execution state of a single check, as reported by any scan source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckState {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "INFO")]
    Info,
}

impl std::fmt::Display for CheckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Info => write!(f, "INFO"),
        }
    }
}

/// One normalized row of external engine output, persisted per scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalScanResult {
    pub scan_id: Uuid,
    pub rule_name: String,
    pub status: CheckState,
    pub resource_id: Option<String>,
    pub region: Option<String>,
    pub message: Option<String>,
    pub raw: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// A failing check from an external engine, shaped for the finding store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalFinding {
    pub source: String,
    pub resource_id: String,
    pub resource_type: String,
    pub region: String,
    pub rule_code: String,
    pub rule_name: String,
    pub severity: Severity,
    pub message: String,
    pub control_ids: Vec<String>,
    pub raw_resource: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_wire_spelling() {
        let json = serde_json::to_string(&ResourceType::StorageBucket).unwrap();
        assert_eq!(json, "\"storage-bucket\"");
        let parsed: ResourceType = serde_json::from_str("\"audit-trail\"").unwrap();
        assert_eq!(parsed, ResourceType::AuditTrail);
    }

    #[test]
    fn severity_lenient_parsing() {
        assert_eq!(
            Severity::from_str_lenient("INFO"),
            Some(Severity::Informational)
        );
        assert_eq!(Severity::from_str_lenient("crit"), Some(Severity::Critical));
        assert_eq!(Severity::from_str_lenient("bogus"), None);
    }

    #[test]
    fn check_state_uppercase_wire_format() {
        assert_eq!(serde_json::to_string(&CheckState::Fail).unwrap(), "\"FAIL\"");
        let parsed: CheckState = serde_json::from_str("\"INFO\"").unwrap();
        assert_eq!(parsed, CheckState::Info);
    }

    #[test]
    fn severity_orders_worst_last() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low > Severity::Informational);
    }
}
