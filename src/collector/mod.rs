//! Resource collection.
//!
//! The collector walks every fetcher across every configured region,
//! drives each fetcher's continuation token until the pages run out, and
//! writes resources to the store in fixed-size batches. A failing
//! (fetcher, region) pair is logged and skipped; partial inventory still
//! feeds the rule engine.

pub mod fetchers;
pub mod inventory;

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::collector::fetchers::{default_fetchers, ResourceFetcher};
use crate::collector::inventory::InventorySource;
use crate::error::Result;
use crate::model::{CollectedResource, NormalizedResource};
use crate::store::Store;

/// Resources are flushed to the store in batches of this size.
pub const BATCH_WRITE_SIZE: usize = 50;

pub const DEFAULT_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-north-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-south-1",
    "sa-east-1",
];

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub regions: Vec<String>,
    pub account_id: String,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            regions: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
            account_id: "unknown".to_string(),
        }
    }
}

pub struct ResourceCollector {
    store: Arc<dyn Store>,
    fetchers: Vec<Arc<dyn ResourceFetcher>>,
}

impl ResourceCollector {
    pub fn new(store: Arc<dyn Store>, source: Arc<dyn InventorySource>) -> Self {
        Self {
            store,
            fetchers: default_fetchers(source),
        }
    }

    pub fn with_fetchers(store: Arc<dyn Store>, fetchers: Vec<Arc<dyn ResourceFetcher>>) -> Self {
        Self { store, fetchers }
    }

    /// Collect every resource type across every region for one scan job.
    /// Returns the number of resource rows actually written.
    pub async fn collect(&self, scan_job_id: Uuid, options: &CollectOptions) -> Result<u64> {
        let mut inserted = 0u64;
        for fetcher in &self.fetchers {
            for region in &options.regions {
                match self
                    .collect_one(fetcher.as_ref(), scan_job_id, region, &options.account_id)
                    .await
                {
                    Ok(count) => {
                        if count > 0 {
                            debug!(
                                resource_type = %fetcher.resource_type(),
                                region,
                                count,
                                "collected resources"
                            );
                        }
                        inserted += count;
                    }
                    Err(err) => {
                        warn!(
                            resource_type = %fetcher.resource_type(),
                            region,
                            error = %err,
                            "collection failed, continuing with remaining sources"
                        );
                    }
                }
            }
        }
        Ok(inserted)
    }

    async fn collect_one(
        &self,
        fetcher: &dyn ResourceFetcher,
        scan_job_id: Uuid,
        region: &str,
        account_id: &str,
    ) -> Result<u64> {
        let mut inserted = 0u64;
        let mut batch: Vec<CollectedResource> = Vec::with_capacity(BATCH_WRITE_SIZE);
        let mut token = None;

        loop {
            let page = fetcher.fetch_page(region, account_id, token).await?;
            for resource in page.resources {
                batch.push(to_collected(scan_job_id, resource));
                if batch.len() >= BATCH_WRITE_SIZE {
                    inserted += self.store.insert_resources(std::mem::take(&mut batch)).await?;
                }
            }
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }

        if !batch.is_empty() {
            inserted += self.store.insert_resources(batch).await?;
        }
        Ok(inserted)
    }
}

fn to_collected(scan_job_id: Uuid, resource: NormalizedResource) -> CollectedResource {
    CollectedResource {
        scan_job_id,
        resource_id: resource.id,
        resource_type: resource.resource_type,
        region: resource.region,
        account_id: resource.account_id,
        metadata: resource.metadata,
    }
}
