mod audit_trail_enabled;
mod database_encryption;
mod identity_mfa;
mod network_public_ingress;
mod storage_encryption;
mod storage_public_access;
mod volume_encryption;

use std::sync::Arc;

use once_cell::sync::Lazy;

use super::RulePlugin;

static REGISTRY: Lazy<Vec<Arc<dyn RulePlugin>>> = Lazy::new(|| {
    vec![
        Arc::new(storage_public_access::StoragePublicAccessRule),
        Arc::new(storage_encryption::StorageEncryptionRule),
        Arc::new(identity_mfa::IdentityMfaRule),
        Arc::new(network_public_ingress::NetworkPublicIngressRule),
        Arc::new(database_encryption::DatabaseEncryptionRule),
        Arc::new(volume_encryption::VolumeEncryptionRule),
        Arc::new(audit_trail_enabled::AuditTrailEnabledRule),
    ]
});

/// All builtin rules, resolved once.
pub fn registry() -> Vec<Arc<dyn RulePlugin>> {
    REGISTRY.clone()
}
