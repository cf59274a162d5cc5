//! Per-resource-type fetchers.
//!
//! Each fetcher pulls one page of provider records from the inventory
//! source and normalizes them to the minimal field set the rule engine
//! reads. Provider fields the rules never look at are dropped here so
//! resource rows stay small.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::collector::inventory::InventorySource;
use crate::error::Result;
use crate::model::{NormalizedResource, ResourceType};

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One page of normalized resources plus the provider continuation token.
#[derive(Debug, Default)]
pub struct ResourcePage {
    pub resources: Vec<NormalizedResource>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    fn resource_type(&self) -> ResourceType;

    /// Fetch one page for a region. `token` is the continuation token from
    /// the previous page, `None` for the first page.
    async fn fetch_page(
        &self,
        region: &str,
        account_id: &str,
        token: Option<String>,
    ) -> Result<ResourcePage>;
}

fn string_field(record: &Value, key: &str) -> Option<String> {
    record[key].as_str().map(str::to_owned)
}

fn normalized(
    id: String,
    resource_type: ResourceType,
    region: &str,
    account_id: &str,
    arn: Option<String>,
    metadata: Value,
) -> NormalizedResource {
    NormalizedResource {
        id,
        resource_type,
        region: region.to_string(),
        account_id: Some(account_id.to_string()),
        arn,
        metadata,
        fetched_at: Utc::now(),
    }
}

macro_rules! inventory_fetcher {
    ($name:ident, $resource_type:expr) => {
        pub struct $name {
            source: Arc<dyn InventorySource>,
            page_size: usize,
        }

        impl $name {
            pub fn new(source: Arc<dyn InventorySource>) -> Self {
                Self {
                    source,
                    page_size: DEFAULT_PAGE_SIZE,
                }
            }

            pub fn with_page_size(source: Arc<dyn InventorySource>, page_size: usize) -> Self {
                Self { source, page_size }
            }
        }

        #[async_trait]
        impl ResourceFetcher for $name {
            fn resource_type(&self) -> ResourceType {
                $resource_type
            }

            async fn fetch_page(
                &self,
                region: &str,
                account_id: &str,
                token: Option<String>,
            ) -> Result<ResourcePage> {
                let page = self
                    .source
                    .list($resource_type, region, self.page_size, token.as_deref())
                    .await?;
                let resources = page
                    .records
                    .iter()
                    .filter_map(|record| Self::normalize(record, region, account_id))
                    .collect();
                Ok(ResourcePage {
                    resources,
                    next_token: page.next_token,
                })
            }
        }
    };
}

inventory_fetcher!(StorageBucketFetcher, ResourceType::StorageBucket);

impl StorageBucketFetcher {
    fn normalize(record: &Value, region: &str, account_id: &str) -> Option<NormalizedResource> {
        let name = string_field(record, "name")?;
        let metadata = json!({
            "name": name,
            "public_access_block": record["public_access_block"].as_bool().unwrap_or(false),
            "encryption": record["encryption"].as_bool().unwrap_or(false),
        });
        Some(normalized(
            name.clone(),
            ResourceType::StorageBucket,
            region,
            account_id,
            Some(format!("arn:aws:s3:::{name}")),
            metadata,
        ))
    }
}

inventory_fetcher!(IdentityPrincipalFetcher, ResourceType::IdentityPrincipal);

impl IdentityPrincipalFetcher {
    fn normalize(record: &Value, region: &str, account_id: &str) -> Option<NormalizedResource> {
        let user_name = string_field(record, "user_name")?;
        let metadata = json!({
            "user_name": user_name,
            "mfa_active": record["mfa_active"].as_bool().unwrap_or(false),
            "access_keys_count": record["access_keys_count"].as_u64().unwrap_or(0),
            "password_last_used": record["password_last_used"].clone(),
        });
        Some(normalized(
            user_name.clone(),
            ResourceType::IdentityPrincipal,
            region,
            account_id,
            string_field(record, "arn")
                .or_else(|| Some(format!("arn:aws:iam::{account_id}:user/{user_name}"))),
            metadata,
        ))
    }
}

inventory_fetcher!(NetworkBoundaryFetcher, ResourceType::NetworkBoundary);

impl NetworkBoundaryFetcher {
    fn normalize(record: &Value, region: &str, account_id: &str) -> Option<NormalizedResource> {
        let group_id = string_field(record, "group_id")?;
        let metadata = json!({
            "group_id": group_id,
            "group_name": record["group_name"].clone(),
            "ingress_rules": record["ingress_rules"].as_array().cloned().unwrap_or_default(),
        });
        Some(normalized(
            group_id.clone(),
            ResourceType::NetworkBoundary,
            region,
            account_id,
            Some(format!(
                "arn:aws:ec2:{region}:{account_id}:security-group/{group_id}"
            )),
            metadata,
        ))
    }
}

inventory_fetcher!(ManagedDatabaseFetcher, ResourceType::ManagedDatabase);

impl ManagedDatabaseFetcher {
    fn normalize(record: &Value, region: &str, account_id: &str) -> Option<NormalizedResource> {
        let instance_id = string_field(record, "instance_id")?;
        let metadata = json!({
            "instance_id": instance_id,
            "engine": record["engine"].clone(),
            "storage_encrypted": record["storage_encrypted"].as_bool().unwrap_or(false),
        });
        Some(normalized(
            instance_id.clone(),
            ResourceType::ManagedDatabase,
            region,
            account_id,
            Some(format!("arn:aws:rds:{region}:{account_id}:db:{instance_id}")),
            metadata,
        ))
    }
}

inventory_fetcher!(BlockVolumeFetcher, ResourceType::BlockVolume);

impl BlockVolumeFetcher {
    fn normalize(record: &Value, region: &str, account_id: &str) -> Option<NormalizedResource> {
        let volume_id = string_field(record, "volume_id")?;
        let metadata = json!({
            "volume_id": volume_id,
            "encrypted": record["encrypted"].as_bool().unwrap_or(false),
            "size_gb": record["size_gb"].clone(),
        });
        Some(normalized(
            volume_id.clone(),
            ResourceType::BlockVolume,
            region,
            account_id,
            Some(format!("arn:aws:ec2:{region}:{account_id}:volume/{volume_id}")),
            metadata,
        ))
    }
}

inventory_fetcher!(AuditTrailFetcher, ResourceType::AuditTrail);

impl AuditTrailFetcher {
    fn normalize(record: &Value, region: &str, account_id: &str) -> Option<NormalizedResource> {
        let trail_name = string_field(record, "trail_name")?;
        let metadata = json!({
            "trail_name": trail_name,
            "multi_region": record["multi_region"].as_bool().unwrap_or(false),
        });
        Some(normalized(
            trail_name.clone(),
            ResourceType::AuditTrail,
            region,
            account_id,
            Some(format!(
                "arn:aws:cloudtrail:{region}:{account_id}:trail/{trail_name}"
            )),
            metadata,
        ))
    }
}

/// The full fetcher set, one per resource type.
pub fn default_fetchers(source: Arc<dyn InventorySource>) -> Vec<Arc<dyn ResourceFetcher>> {
    vec![
        Arc::new(StorageBucketFetcher::new(source.clone())),
        Arc::new(IdentityPrincipalFetcher::new(source.clone())),
        Arc::new(NetworkBoundaryFetcher::new(source.clone())),
        Arc::new(ManagedDatabaseFetcher::new(source.clone())),
        Arc::new(BlockVolumeFetcher::new(source.clone())),
        Arc::new(AuditTrailFetcher::new(source)),
    ]
}
