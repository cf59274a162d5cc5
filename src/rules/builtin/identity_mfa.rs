use crate::model::{NormalizedResource, ResourceType, Severity};
use crate::rules::{RuleOutcome, RulePlugin};

/// IAM_MFA_ENABLED: identity principals with console or key activity must
/// have MFA enabled.
pub struct IdentityMfaRule;

impl RulePlugin for IdentityMfaRule {
    fn code(&self) -> &'static str {
        "IAM_MFA_ENABLED"
    }

    fn name(&self) -> &'static str {
        "Identity principal must have MFA enabled"
    }

    fn description(&self) -> &'static str {
        "Identity principals with console access should have MFA enabled"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::IdentityPrincipal
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn control_ids(&self) -> &'static [&'static str] {
        &["CIS-1.10", "SOC2-CC6.1"]
    }

    fn remediation(&self) -> &'static str {
        "Enable MFA for the identity principal"
    }

    fn evaluate(&self, resource: &NormalizedResource) -> RuleOutcome {
        let access_keys = resource.metadata["access_keys_count"].as_u64().unwrap_or(0);
        let password_last_used = resource.metadata.get("password_last_used");

        // Principals with no access keys and no recorded password use are
        // inactive (e.g. service accounts) and exempt from the MFA rule.
        if access_keys == 0
            && password_last_used.is_none_or(|v| v.is_null())
        {
            return RuleOutcome::pass();
        }

        if resource.metadata["mfa_active"] == true {
            return RuleOutcome::pass();
        }
        let user = resource.metadata["user_name"].as_str().unwrap_or(&resource.id);
        RuleOutcome::fail(format!(
            "Identity principal {user} does not have MFA enabled"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::resource;
    use serde_json::json;

    #[test]
    fn inactive_principal_is_exempt() {
        let outcome = IdentityMfaRule.evaluate(&resource(
            "svc-account",
            ResourceType::IdentityPrincipal,
            json!({"access_keys_count": 0, "mfa_active": false}),
        ));
        assert!(outcome.passed, "zero keys + no password use must be exempt");
    }

    #[test]
    fn null_password_last_used_still_counts_as_inactive() {
        let outcome = IdentityMfaRule.evaluate(&resource(
            "svc-account",
            ResourceType::IdentityPrincipal,
            json!({"access_keys_count": 0, "password_last_used": null, "mfa_active": false}),
        ));
        assert!(outcome.passed);
    }

    #[test]
    fn active_principal_without_mfa_fails() {
        let outcome = IdentityMfaRule.evaluate(&resource(
            "alice",
            ResourceType::IdentityPrincipal,
            json!({
                "user_name": "alice",
                "access_keys_count": 1,
                "mfa_active": false
            }),
        ));
        assert!(!outcome.passed);
        assert!(outcome.message.unwrap().contains("alice"));
    }

    #[test]
    fn console_user_without_keys_still_needs_mfa() {
        let outcome = IdentityMfaRule.evaluate(&resource(
            "bob",
            ResourceType::IdentityPrincipal,
            json!({
                "user_name": "bob",
                "access_keys_count": 0,
                "password_last_used": "2026-08-01T00:00:00Z",
                "mfa_active": false
            }),
        ));
        assert!(!outcome.passed);
    }

    #[test]
    fn active_principal_with_mfa_passes() {
        let outcome = IdentityMfaRule.evaluate(&resource(
            "carol",
            ResourceType::IdentityPrincipal,
            json!({"access_keys_count": 2, "mfa_active": true}),
        ));
        assert!(outcome.passed);
    }
}
