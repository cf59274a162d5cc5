//! Compliance readiness aggregation.
//!
//! After a scan completes, check outcomes roll up the catalog hierarchy:
//! check states decide control readiness, controls decide criteria
//! readiness, in-scope criteria decide framework readiness. Snapshots
//! are written per `(entity, scan_id)` and upserted, so re-aggregating a
//! scan is idempotent. A background sweeper picks up completed scans
//! that have no snapshot yet.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::catalog::{
    ControlReadinessStatus, ControlStatus, Criteria, CriteriaStatus, FrameworkCatalog,
    FrameworkStatus, GrcControl, ScopeStatus,
};
use crate::error::Result;
use crate::model::CheckState;
use crate::store::{FindingFilter, Store};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);
pub const DEFAULT_PENDING_LIMIT: usize = 100;

/// The more alarming state wins when a check reports more than once.
pub fn worst_state(a: CheckState, b: CheckState) -> CheckState {
    fn rank(state: CheckState) -> u8 {
        match state {
            CheckState::Fail => 2,
            CheckState::Info => 1,
            CheckState::Pass => 0,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

fn percent(numerator: u32, denominator: u32) -> u8 {
    if denominator == 0 {
        0
    } else {
        (100.0 * f64::from(numerator) / f64::from(denominator)).round() as u8
    }
}

/// A framework with its most recent readiness snapshot, if any scan has
/// been aggregated yet.
#[derive(Debug, Clone, Serialize)]
pub struct FrameworkOverview {
    pub framework: FrameworkCatalog,
    pub latest: Option<FrameworkStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriteriaOverview {
    pub criteria: Criteria,
    pub latest: Option<CriteriaStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlOverview {
    pub control: GrcControl,
    pub latest: Option<ControlStatus>,
}

pub struct CoverageAggregator {
    store: Arc<dyn Store>,
}

impl CoverageAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Refresh control/check mappings from naming conventions: a check
    /// covers a control when a compliance mapping row names the control,
    /// either bare (`CC6.1`) or framework-qualified (`soc2-cc6.1`), or
    /// when a rule's control ids mention the control name. Idempotent.
    pub async fn sync_control_check_mappings(&self) -> Result<()> {
        let controls = self.store.list_controls().await?;
        let mappings = self.store.list_compliance_mappings().await?;
        let rules = self.store.list_rules().await?;

        for control in &controls {
            let name = control.name.to_lowercase();
            for mapping in &mappings {
                let control_id = mapping.control_id.to_lowercase();
                let qualified = format!("{}-{}", mapping.framework.to_lowercase(), control_id);
                if control_id == name || qualified == name {
                    self.store
                        .upsert_control_check_mapping(&control.id, &mapping.check_name)
                        .await?;
                }
            }
            for rule in &rules {
                if rule
                    .control_ids
                    .iter()
                    .any(|id| id.to_lowercase().contains(&name))
                {
                    self.store
                        .upsert_control_check_mapping(&control.id, &rule.code)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Worst observed state per check for one scan. External results
    /// report every execution; rule-engine scans only persist failures,
    /// so a finding forces FAIL and silence means the check passed.
    async fn check_states(&self, scan_id: Uuid) -> Result<HashMap<String, CheckState>> {
        let mut states: HashMap<String, CheckState> = HashMap::new();
        for result in self.store.list_external_results(scan_id).await? {
            states
                .entry(result.rule_name)
                .and_modify(|s| *s = worst_state(*s, result.status))
                .or_insert(result.status);
        }

        let page = self
            .store
            .find_findings(FindingFilter {
                scan_job_id: Some(scan_id),
                limit: Some(usize::MAX),
                ..FindingFilter::default()
            })
            .await?;
        for finding in page.items {
            states.insert(finding.rule_code, CheckState::Fail);
        }
        Ok(states)
    }

    /// Aggregate one scan into control, criteria and framework snapshots.
    pub async fn aggregate_scan(&self, scan_id: Uuid) -> Result<()> {
        self.sync_control_check_mappings().await?;
        let states = self.check_states(scan_id).await?;

        let controls = self.store.list_controls().await?;
        let mut control_readiness: HashMap<String, ControlReadinessStatus> = HashMap::new();
        for control in &controls {
            let checks = self.store.list_control_checks(&control.id).await?;
            let total = checks.len() as u32;
            let passed = checks
                .iter()
                .filter(|check| {
                    matches!(states.get(*check), None | Some(CheckState::Pass))
                })
                .count() as u32;
            let readiness_percent = percent(passed, total);
            let status = if total == 0 {
                ControlReadinessStatus::NotReady
            } else if readiness_percent == 100 {
                ControlReadinessStatus::Ready
            } else if passed > 0 {
                ControlReadinessStatus::Partial
            } else {
                ControlReadinessStatus::NotReady
            };
            control_readiness.insert(control.id.clone(), status);
            self.store
                .upsert_control_status(ControlStatus {
                    control_id: control.id.clone(),
                    scan_id,
                    readiness_percent,
                    status,
                })
                .await?;
        }

        let frameworks = self.store.list_frameworks().await?;
        for framework in &frameworks {
            let criteria = self.store.list_framework_criteria(&framework.id).await?;
            let mut framework_controls: HashSet<String> = HashSet::new();
            let mut ready_criteria = 0u32;
            let mut in_scope = 0u32;

            for criterion in &criteria {
                let criterion_controls =
                    self.store.list_criteria_controls(&criterion.id).await?;
                let total_controls = criterion_controls.len() as u32;
                let ready_controls = criterion_controls
                    .iter()
                    .filter(|c| {
                        control_readiness.get(&c.id) == Some(&ControlReadinessStatus::Ready)
                    })
                    .count() as u32;
                for control in &criterion_controls {
                    framework_controls.insert(control.id.clone());
                }

                let readiness_percent = percent(ready_controls, total_controls);
                self.store
                    .upsert_criteria_status(CriteriaStatus {
                        criteria_id: criterion.id.clone(),
                        scan_id,
                        readiness_percent,
                        ready_controls,
                        total_controls,
                    })
                    .await?;

                if criterion.scope_status == ScopeStatus::InScope {
                    in_scope += 1;
                    if readiness_percent == 100 && total_controls > 0 {
                        ready_criteria += 1;
                    }
                }
            }

            let mut automated_checks: HashSet<String> = HashSet::new();
            for control_id in &framework_controls {
                automated_checks.extend(self.store.list_control_checks(control_id).await?);
            }

            let total_criteria = criteria.len() as u32;
            self.store
                .upsert_framework_status(FrameworkStatus {
                    framework_id: framework.id.clone(),
                    scan_id,
                    readiness_percent: percent(ready_criteria, in_scope),
                    ready_criteria,
                    total_criteria,
                    total_controls: framework_controls.len() as u32,
                    total_automated_checks: automated_checks.len() as u32,
                    in_scope_criteria: in_scope,
                    out_of_scope_criteria: total_criteria - in_scope,
                })
                .await?;
        }

        debug!(%scan_id, "coverage aggregated");
        Ok(())
    }

    /// Aggregate every completed scan that has no snapshot yet. Errors on
    /// one scan are logged and do not block the rest. Returns how many
    /// scans were aggregated.
    pub async fn process_pending_scans(&self, limit: usize) -> Result<usize> {
        let aggregated: HashSet<Uuid> =
            self.store.aggregated_scan_ids().await?.into_iter().collect();
        let mut pending = self.store.completed_scan_job_ids(limit).await?;
        pending.extend(self.store.completed_external_scan_ids(limit).await?);

        let mut processed = 0;
        for scan_id in pending {
            if aggregated.contains(&scan_id) {
                continue;
            }
            match self.aggregate_scan(scan_id).await {
                Ok(()) => processed += 1,
                Err(err) => error!(%scan_id, error = %err, "coverage aggregation failed"),
            }
        }
        if processed > 0 {
            info!(processed, "aggregated pending scans");
        }
        Ok(processed)
    }

    /// Background sweep for scans the synchronous path missed.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        pending_limit: usize,
    ) -> JoinHandle<()> {
        let aggregator = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(err) = aggregator.process_pending_scans(pending_limit).await {
                    error!(error = %err, "coverage sweep failed");
                }
            }
        })
    }

    // --- read side ---

    pub async fn list_frameworks(&self) -> Result<Vec<FrameworkOverview>> {
        let mut overviews = Vec::new();
        for framework in self.store.list_frameworks().await? {
            let latest = self.store.latest_framework_status(&framework.id).await?;
            overviews.push(FrameworkOverview { framework, latest });
        }
        Ok(overviews)
    }

    pub async fn get_framework_criteria(
        &self,
        framework_id: &str,
    ) -> Result<Vec<CriteriaOverview>> {
        let mut overviews = Vec::new();
        for criteria in self.store.list_framework_criteria(framework_id).await? {
            let latest = self.store.latest_criteria_status(&criteria.id).await?;
            overviews.push(CriteriaOverview { criteria, latest });
        }
        Ok(overviews)
    }

    pub async fn get_criteria_controls(&self, criteria_id: &str) -> Result<Vec<ControlOverview>> {
        let mut overviews = Vec::new();
        for control in self.store.list_criteria_controls(criteria_id).await? {
            let latest = self.store.latest_control_status(&control.id).await?;
            overviews.push(ControlOverview { control, latest });
        }
        Ok(overviews)
    }

    pub async fn get_control_checks(&self, control_id: &str) -> Result<Vec<String>> {
        self.store.list_control_checks(control_id).await
    }

    pub async fn set_criteria_scope(
        &self,
        criteria_id: &str,
        scope: ScopeStatus,
    ) -> Result<Criteria> {
        self.store.set_criteria_scope(criteria_id, scope).await
    }

    /// Framework snapshots for one scan.
    pub async fn get_coverage(&self, scan_id: Uuid) -> Result<Vec<FrameworkStatus>> {
        self.store.framework_statuses_for_scan(scan_id).await
    }
}
