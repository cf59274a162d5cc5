use crate::model::{NormalizedResource, ResourceType, Severity};
use crate::rules::{RuleOutcome, RulePlugin};

/// SG_PUBLIC_INGRESS: network boundaries must not allow unrestricted
/// ingress from 0.0.0.0/0 or ::/0.
pub struct NetworkPublicIngressRule;

impl RulePlugin for NetworkPublicIngressRule {
    fn code(&self) -> &'static str {
        "SG_PUBLIC_INGRESS"
    }

    fn name(&self) -> &'static str {
        "Network boundary must not allow unrestricted ingress"
    }

    fn description(&self) -> &'static str {
        "Ingress rules open to the whole internet expose attached resources"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::NetworkBoundary
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn control_ids(&self) -> &'static [&'static str] {
        &["CIS-4.1", "SOC2-CC6.1"]
    }

    fn remediation(&self) -> &'static str {
        "Restrict ingress rules to specific source IP ranges"
    }

    fn evaluate(&self, resource: &NormalizedResource) -> RuleOutcome {
        let Some(rules) = resource.metadata["ingress_rules"].as_array() else {
            return RuleOutcome::pass();
        };

        let mut open_ports = Vec::new();
        for rule in rules {
            let cidr = rule["cidr"].as_str().unwrap_or("");
            if cidr == "0.0.0.0/0" || cidr == "::/0" {
                match rule["port"].as_u64() {
                    Some(port) => open_ports.push(port.to_string()),
                    None => open_ports.push("all".into()),
                }
            }
        }

        if open_ports.is_empty() {
            return RuleOutcome::pass();
        }
        let name = resource.metadata["group_name"].as_str().unwrap_or(&resource.id);
        RuleOutcome::fail(format!(
            "Network boundary {name} allows unrestricted ingress on port(s) {}",
            open_ports.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::resource;
    use serde_json::json;

    #[test]
    fn passes_with_no_ingress_rules() {
        let outcome = NetworkPublicIngressRule.evaluate(&resource(
            "sg-1",
            ResourceType::NetworkBoundary,
            json!({"ingress_rules": []}),
        ));
        assert!(outcome.passed);
    }

    #[test]
    fn passes_with_restricted_cidrs() {
        let outcome = NetworkPublicIngressRule.evaluate(&resource(
            "sg-2",
            ResourceType::NetworkBoundary,
            json!({"ingress_rules": [{"cidr": "10.0.0.0/8", "port": 22}]}),
        ));
        assert!(outcome.passed);
    }

    #[test]
    fn flags_world_open_ipv4_cidr() {
        let outcome = NetworkPublicIngressRule.evaluate(&resource(
            "sg-3",
            ResourceType::NetworkBoundary,
            json!({
                "group_name": "web",
                "ingress_rules": [
                    {"cidr": "10.0.0.0/8", "port": 443},
                    {"cidr": "0.0.0.0/0", "port": 22}
                ]
            }),
        ));
        assert!(!outcome.passed);
        assert!(outcome.message.unwrap().contains("22"));
    }

    #[test]
    fn flags_world_open_ipv6_cidr() {
        let outcome = NetworkPublicIngressRule.evaluate(&resource(
            "sg-4",
            ResourceType::NetworkBoundary,
            json!({"ingress_rules": [{"cidr": "::/0"}]}),
        ));
        assert!(!outcome.passed);
        assert!(outcome.message.unwrap().contains("all"));
    }
}
