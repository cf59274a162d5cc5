//! Static framework hierarchy: framework -> area -> criteria -> control
//! -> check, plus the per-scan status snapshot rows the aggregator writes.
//!
//! The catalog is a seed loaded once at startup. The engine never rewrites
//! it at runtime except for the criteria scope flag and the snapshots.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Whether a criterion counts toward a framework's readiness denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeStatus {
    #[serde(rename = "IN_SCOPE")]
    InScope,
    #[serde(rename = "OUT_OF_SCOPE")]
    OutOfScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkCatalog {
    pub id: String,
    pub name: String,
    pub version: String,
    pub category: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkArea {
    pub id: String,
    pub framework_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criteria {
    pub id: String,
    pub area_id: String,
    pub code: String,
    pub description: String,
    pub scope_status: ScopeStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrcControl {
    pub id: String,
    pub name: String,
    pub domain: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaControlMapping {
    pub criteria_id: String,
    pub control_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCheckMapping {
    pub control_id: String,
    pub check_id: String,
}

/// A row of an external compliance mapping table: which check covers
/// which named control in which framework. Feeds the naming-based
/// control/check mapping sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceMapping {
    pub framework: String,
    pub control_id: String,
    pub check_name: String,
}

/// Readiness bucket for a control at a given scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlReadinessStatus {
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "PARTIAL")]
    Partial,
    #[serde(rename = "NOT_READY")]
    NotReady,
}

/// Per-scan control snapshot, upserted by `(control_id, scan_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlStatus {
    pub control_id: String,
    pub scan_id: Uuid,
    pub readiness_percent: u8,
    pub status: ControlReadinessStatus,
}

/// Per-scan criteria snapshot, upserted by `(criteria_id, scan_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaStatus {
    pub criteria_id: String,
    pub scan_id: Uuid,
    pub readiness_percent: u8,
    pub ready_controls: u32,
    pub total_controls: u32,
}

/// Per-scan framework snapshot, upserted by `(framework_id, scan_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkStatus {
    pub framework_id: String,
    pub scan_id: Uuid,
    pub readiness_percent: u8,
    pub ready_criteria: u32,
    pub total_criteria: u32,
    pub total_controls: u32,
    pub total_automated_checks: u32,
    pub in_scope_criteria: u32,
    pub out_of_scope_criteria: u32,
}

/// Complete catalog seed, loaded once into the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub frameworks: Vec<FrameworkCatalog>,
    #[serde(default)]
    pub areas: Vec<FrameworkArea>,
    #[serde(default)]
    pub criteria: Vec<Criteria>,
    #[serde(default)]
    pub controls: Vec<GrcControl>,
    #[serde(default)]
    pub criteria_controls: Vec<CriteriaControlMapping>,
    #[serde(default)]
    pub compliance_mappings: Vec<ComplianceMapping>,
}

impl Catalog {
    /// Load a catalog seed from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&content)?;
        Ok(catalog)
    }

    /// A small built-in seed covering the builtin rule set, used by the
    /// CLI when no seed file is given.
    pub fn builtin() -> Self {
        let mappings = [
            ("CC6.1", "S3_PUBLIC_ACCESS_BLOCK"),
            ("CC6.1", "S3_ENCRYPTION"),
            ("CC6.1", "IAM_MFA_ENABLED"),
            ("CC6.1", "SG_PUBLIC_INGRESS"),
            ("CC6.1", "EBS_VOLUME_ENCRYPTED"),
            ("CC6.1", "RDS_STORAGE_ENCRYPTED"),
            ("CC7.2", "CLOUDTRAIL_ENABLED"),
        ];

        Self {
            frameworks: vec![FrameworkCatalog {
                id: "fw-soc2".into(),
                name: "SOC 2".into(),
                version: "2017".into(),
                category: "Trust Services".into(),
                region: "global".into(),
            }],
            areas: vec![
                FrameworkArea {
                    id: "ar-security".into(),
                    framework_id: "fw-soc2".into(),
                    name: "Security".into(),
                },
                FrameworkArea {
                    id: "ar-availability".into(),
                    framework_id: "fw-soc2".into(),
                    name: "Availability".into(),
                },
            ],
            criteria: vec![
                Criteria {
                    id: "cr-cc6-1".into(),
                    area_id: "ar-security".into(),
                    code: "CC6.1".into(),
                    description: "Logical and physical access controls".into(),
                    scope_status: ScopeStatus::InScope,
                },
                Criteria {
                    id: "cr-cc7-2".into(),
                    area_id: "ar-security".into(),
                    code: "CC7.2".into(),
                    description: "System monitoring and anomaly detection".into(),
                    scope_status: ScopeStatus::InScope,
                },
                Criteria {
                    id: "cr-a1-2".into(),
                    area_id: "ar-availability".into(),
                    code: "A1.2".into(),
                    description: "Environmental protections and recovery".into(),
                    scope_status: ScopeStatus::OutOfScope,
                },
            ],
            controls: vec![
                GrcControl {
                    id: "ctl-access".into(),
                    name: "CC6.1".into(),
                    domain: Some("Access Control".into()),
                    owner: None,
                },
                GrcControl {
                    id: "ctl-monitoring".into(),
                    name: "CC7.2".into(),
                    domain: Some("Monitoring".into()),
                    owner: None,
                },
                GrcControl {
                    id: "ctl-resilience".into(),
                    name: "A1.2".into(),
                    domain: Some("Resilience".into()),
                    owner: None,
                },
            ],
            criteria_controls: vec![
                CriteriaControlMapping {
                    criteria_id: "cr-cc6-1".into(),
                    control_id: "ctl-access".into(),
                },
                CriteriaControlMapping {
                    criteria_id: "cr-cc7-2".into(),
                    control_id: "ctl-monitoring".into(),
                },
                CriteriaControlMapping {
                    criteria_id: "cr-a1-2".into(),
                    control_id: "ctl-resilience".into(),
                },
            ],
            compliance_mappings: mappings
                .iter()
                .map(|(control, check)| ComplianceMapping {
                    framework: "soc2".into(),
                    control_id: (*control).into(),
                    check_name: (*check).into(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_seed_is_consistent() {
        let catalog = Catalog::builtin();
        for area in &catalog.areas {
            assert!(catalog.frameworks.iter().any(|f| f.id == area.framework_id));
        }
        for criteria in &catalog.criteria {
            assert!(catalog.areas.iter().any(|a| a.id == criteria.area_id));
        }
        for mapping in &catalog.criteria_controls {
            assert!(catalog.criteria.iter().any(|c| c.id == mapping.criteria_id));
            assert!(catalog.controls.iter().any(|c| c.id == mapping.control_id));
        }
    }

    #[test]
    fn scope_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&ScopeStatus::OutOfScope).unwrap(),
            "\"OUT_OF_SCOPE\""
        );
    }

    #[test]
    fn catalog_round_trips_through_json() {
        let catalog = Catalog::builtin();
        let json = serde_json::to_string(&catalog).unwrap();
        let parsed: Catalog = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.frameworks.len(), catalog.frameworks.len());
        assert_eq!(parsed.compliance_mappings.len(), catalog.compliance_mappings.len());
    }
}
