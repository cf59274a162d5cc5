//! Inventory source port.
//!
//! Real deployments back this with per-provider SDK clients; the crate
//! ships [`JsonInventory`], which pages through a JSON snapshot and is
//! what the CLI and tests use. Sources follow the provider
//! continuation-token idiom: callers pass the token from the previous
//! page until `next_token` comes back `None`.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::{Result, WardError};
use crate::model::ResourceType;

/// One page of provider-native records.
#[derive(Debug, Clone, Default)]
pub struct InventoryPage {
    pub records: Vec<serde_json::Value>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait InventorySource: Send + Sync {
    /// List records of one resource type in one region, starting at the
    /// given continuation token.
    async fn list(
        &self,
        resource_type: ResourceType,
        region: &str,
        page_size: usize,
        token: Option<&str>,
    ) -> Result<InventoryPage>;
}

/// Inventory backed by a JSON snapshot shaped as
/// `{ "<region>": { "<resource-type>": [record, ...] } }`.
#[derive(Debug, Default)]
pub struct JsonInventory {
    records: HashMap<(String, ResourceType), Vec<serde_json::Value>>,
}

impl JsonInventory {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let regions = value
            .as_object()
            .ok_or_else(|| WardError::Config("inventory root must be an object".into()))?;

        let mut records = HashMap::new();
        for (region, types) in regions {
            let types = types.as_object().ok_or_else(|| {
                WardError::Config(format!("inventory region '{region}' must be an object"))
            })?;
            for (type_name, list) in types {
                let resource_type =
                    ResourceType::from_str_lenient(type_name).ok_or_else(|| {
                        WardError::Config(format!("unknown resource type '{type_name}'"))
                    })?;
                let list = list.as_array().ok_or_else(|| {
                    WardError::Config(format!("inventory '{region}/{type_name}' must be an array"))
                })?;
                records.insert((region.clone(), resource_type), list.clone());
            }
        }
        Ok(Self { records })
    }
}

#[async_trait]
impl InventorySource for JsonInventory {
    async fn list(
        &self,
        resource_type: ResourceType,
        region: &str,
        page_size: usize,
        token: Option<&str>,
    ) -> Result<InventoryPage> {
        let Some(records) = self.records.get(&(region.to_string(), resource_type)) else {
            return Ok(InventoryPage::default());
        };

        let offset: usize = match token {
            Some(t) => t
                .parse()
                .map_err(|_| WardError::Internal(format!("bad continuation token '{t}'")))?,
            None => 0,
        };

        let page: Vec<serde_json::Value> =
            records.iter().skip(offset).take(page_size).cloned().collect();
        let consumed = offset + page.len();
        let next_token = (consumed < records.len()).then(|| consumed.to_string());

        Ok(InventoryPage {
            records: page,
            next_token,
        })
    }
}
