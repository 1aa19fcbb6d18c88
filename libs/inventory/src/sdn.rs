//! SDN provider sandbox and its expected inventory.
//!
//! A sandbox is a set of objects created directly on the SDN provider,
//! outside the product: an enterprise (mirrored as a cloud tenant), a domain
//! (network router), a subnet with ports, and a VM port carrying a floating
//! IP. The product must mirror them into its inventory after a refresh.

use anyhow::Result;
use async_trait::async_trait;
use ssa_networking::{IpProtocol, Ipv4Cidr};
use ssa_wait::WaitOptions;
use tracing::info;

use crate::{object_in_inventory_with_timeout, Inventory, InventoryError, InventoryRecord, Stats};

/// Inventory collection holding SDN subnets.
pub const SUBNETS: &str = "nuage_network_subnets";

/// Inventory collection holding SDN ports.
pub const PORTS: &str = "nuage_network_ports";

/// Type shown for an L3 subnet.
pub const SUBNET_TYPE: &str = "ManageIQ/Providers/Nuage/Network Manager/Cloud Subnet/L3";

/// Type shown for a VM port.
pub const VM_PORT_TYPE: &str = "ManageIQ/Providers/Nuage/Network Manager/Network Port/Vm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enterprise {
    pub id: String,
    pub name: String,
}

/// Routing domain; its parent is the enterprise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyGroup {
    pub id: String,
    pub name: String,
}

/// A virtual port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VPort {
    pub id: String,
    pub name: String,
    pub policy_groups: Vec<PolicyGroup>,
    pub associated_floating_ip_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub address: String,
    pub netmask: String,
    pub gateway: String,
    /// Protocol as the provider spells it (`IPV4`).
    pub ip_type: String,
    pub vports: Vec<VPort>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingIp {
    pub id: String,
    pub address: String,
}

/// Objects deployed on the provider for one verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    pub enterprise: Enterprise,
    pub domain: Domain,
    pub subnet: Subnet,
    pub vm_vport: VPort,
}

/// Provider-side API calls the checks need.
#[async_trait]
pub trait SdnProvider: Send + Sync {
    /// Provider name as registered in the product.
    fn name(&self) -> &str;

    /// Floating IPs with the given provider id.
    async fn floating_ips(&self, id: &str) -> Result<Vec<FloatingIp>>;
}

/// Expected inventory stats for the sandbox subnet.
pub fn subnet_stats(sandbox: &Sandbox, provider_name: &str) -> Result<Stats, InventoryError> {
    let subnet = &sandbox.subnet;
    let cidr = Ipv4Cidr::from_netmask(&subnet.address, &subnet.netmask)?;
    let protocol: IpProtocol = subnet.ip_type.parse()?;
    let security_groups: usize = subnet.vports.iter().map(|p| p.policy_groups.len()).sum();

    Ok(Stats::new()
        .with("name_value", subnet.name.as_str())
        .with("type_value", SUBNET_TYPE)
        .with("cidr_value", cidr.to_string())
        .with("gateway_value", subnet.gateway.as_str())
        .with("network_protocol_value", protocol.as_str())
        .with("network_manager_value", provider_name)
        .with("cloud_tenant_value", sandbox.enterprise.name.as_str())
        .with("network_router_value", sandbox.domain.name.as_str())
        .with("network_ports_num", subnet.vports.len())
        .with("security_groups_num", security_groups))
}

/// Expected inventory stats for the sandbox VM port.
///
/// `floating_ips` are the provider's floating IPs matching the port's
/// associated floating IP id; the first one's address is shown.
pub fn port_stats(sandbox: &Sandbox, floating_ips: &[FloatingIp]) -> Result<Stats, InventoryError> {
    let port = &sandbox.vm_vport;
    let first = floating_ips.first().ok_or_else(|| {
        InventoryError::MissingFloatingIp(
            port.associated_floating_ip_id
                .clone()
                .unwrap_or_else(|| "<none>".to_string()),
        )
    })?;

    Ok(Stats::new()
        .with("name_value", port.name.as_str())
        .with("type_value", VM_PORT_TYPE)
        .with("floating_ip_addresses_value", first.address.as_str())
        .with("cloud_subnets_num", 1u64)
        .with("floating_ips_num", floating_ips.len())
        .with("security_groups_num", port.policy_groups.len()))
}

/// Refresh the provider, wait for the sandbox subnet to be mirrored, and
/// check its stats.
pub async fn verify_subnet_inventory<I, P>(
    inventory: &I,
    provider: &P,
    sandbox: &Sandbox,
    opts: &WaitOptions,
) -> Result<InventoryRecord, InventoryError>
where
    I: Inventory + ?Sized,
    P: SdnProvider + ?Sized,
{
    let expected = subnet_stats(sandbox, provider.name())?;
    info!(subnet = %sandbox.subnet.id, stats = expected.len(), "Validating subnet inventory");

    inventory
        .refresh_provider_relationships(provider.name())
        .await
        .map_err(InventoryError::Provider)?;
    let record =
        object_in_inventory_with_timeout(inventory, SUBNETS, provider.name(), &sandbox.subnet.id, opts)
            .await?;
    record.validate_stats(&expected)?;
    Ok(record)
}

/// Refresh the provider, wait for the sandbox VM port to be mirrored, and
/// check its stats.
pub async fn verify_port_inventory<I, P>(
    inventory: &I,
    provider: &P,
    sandbox: &Sandbox,
    opts: &WaitOptions,
) -> Result<InventoryRecord, InventoryError>
where
    I: Inventory + ?Sized,
    P: SdnProvider + ?Sized,
{
    let floating_ips = match &sandbox.vm_vport.associated_floating_ip_id {
        Some(id) => provider
            .floating_ips(id)
            .await
            .map_err(InventoryError::Provider)?,
        None => Vec::new(),
    };
    let expected = port_stats(sandbox, &floating_ips)?;
    info!(port = %sandbox.vm_vport.id, stats = expected.len(), "Validating port inventory");

    inventory
        .refresh_provider_relationships(provider.name())
        .await
        .map_err(InventoryError::Provider)?;
    let record =
        object_in_inventory_with_timeout(inventory, PORTS, provider.name(), &sandbox.vm_vport.id, opts)
            .await?;
    record.validate_stats(&expected)?;
    Ok(record)
}

/// SDN provider backed by a fixed list of floating IPs.
#[derive(Debug, Clone, Default)]
pub struct StaticSdnProvider {
    pub name: String,
    pub floating_ips: Vec<FloatingIp>,
}

#[async_trait]
impl SdnProvider for StaticSdnProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn floating_ips(&self, id: &str) -> Result<Vec<FloatingIp>> {
        Ok(self
            .floating_ips
            .iter()
            .filter(|ip| ip.id == id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatValue;
    use rstest::rstest;

    fn group(n: u32) -> PolicyGroup {
        PolicyGroup {
            id: format!("pg-{n}"),
            name: format!("group-{n}"),
        }
    }

    fn sandbox() -> Sandbox {
        let vm_vport = VPort {
            id: "vp-vm".to_string(),
            name: "vm-port".to_string(),
            policy_groups: vec![group(1), group(2)],
            associated_floating_ip_id: Some("fip-1".to_string()),
        };
        Sandbox {
            enterprise: Enterprise {
                id: "ent-1".to_string(),
                name: "ssa-enterprise".to_string(),
            },
            domain: Domain {
                id: "dom-1".to_string(),
                name: "ssa-domain".to_string(),
            },
            subnet: Subnet {
                id: "sub-1".to_string(),
                name: "ssa-subnet".to_string(),
                address: "10.10.1.0".to_string(),
                netmask: "255.255.255.0".to_string(),
                gateway: "10.10.1.1".to_string(),
                ip_type: "IPV4".to_string(),
                vports: vec![
                    vm_vport.clone(),
                    VPort {
                        id: "vp-bridge".to_string(),
                        name: "bridge-port".to_string(),
                        policy_groups: vec![group(3)],
                        associated_floating_ip_id: None,
                    },
                ],
            },
            vm_vport,
        }
    }

    #[test]
    fn subnet_stats_follow_the_sandbox() {
        let stats = subnet_stats(&sandbox(), "nuage-east").unwrap();
        assert_eq!(stats.get("cidr_value"), Some(&StatValue::from("10.10.1.0/24")));
        assert_eq!(stats.get("network_protocol_value"), Some(&StatValue::from("ipv4")));
        assert_eq!(stats.get("network_manager_value"), Some(&StatValue::from("nuage-east")));
        assert_eq!(stats.get("cloud_tenant_value"), Some(&StatValue::from("ssa-enterprise")));
        assert_eq!(stats.get("network_router_value"), Some(&StatValue::from("ssa-domain")));
        assert_eq!(stats.get("network_ports_num"), Some(&StatValue::Count(2)));
        assert_eq!(stats.get("security_groups_num"), Some(&StatValue::Count(3)));
        assert_eq!(stats.len(), 10);
    }

    #[rstest]
    #[case("10.10.0.0", "255.255.0.0", "IPv4", "10.10.0.0/16", "ipv4")]
    #[case("10.10.1.128", "255.255.255.128", "ipv4", "10.10.1.128/25", "ipv4")]
    #[case("10.10.1.0", "255.255.255.0", " IPV6 ", "10.10.1.0/24", "ipv6")]
    fn subnet_cidr_and_protocol(
        #[case] address: &str,
        #[case] netmask: &str,
        #[case] ip_type: &str,
        #[case] cidr: &str,
        #[case] protocol: &str,
    ) {
        let mut sb = sandbox();
        sb.subnet.address = address.to_string();
        sb.subnet.netmask = netmask.to_string();
        sb.subnet.ip_type = ip_type.to_string();
        let stats = subnet_stats(&sb, "nuage").unwrap();
        assert_eq!(stats.get("cidr_value"), Some(&StatValue::from(cidr)));
        assert_eq!(stats.get("network_protocol_value"), Some(&StatValue::from(protocol)));
    }

    #[test]
    fn subnet_stats_reject_unknown_protocol() {
        let mut sb = sandbox();
        sb.subnet.ip_type = "DUALSTACK".to_string();
        assert!(matches!(
            subnet_stats(&sb, "nuage"),
            Err(InventoryError::Network(_))
        ));
    }

    #[test]
    fn subnet_stats_reject_bad_netmask() {
        let mut sb = sandbox();
        sb.subnet.netmask = "255.0.255.0".to_string();
        assert!(matches!(
            subnet_stats(&sb, "nuage"),
            Err(InventoryError::Network(_))
        ));
    }

    #[test]
    fn port_stats_use_first_floating_ip() {
        let ips = vec![FloatingIp {
            id: "fip-1".to_string(),
            address: "172.24.4.10".to_string(),
        }];
        let stats = port_stats(&sandbox(), &ips).unwrap();
        assert_eq!(
            stats.get("floating_ip_addresses_value"),
            Some(&StatValue::from("172.24.4.10"))
        );
        assert_eq!(stats.get("floating_ips_num"), Some(&StatValue::Count(1)));
        assert_eq!(stats.get("cloud_subnets_num"), Some(&StatValue::Count(1)));
        assert_eq!(stats.get("security_groups_num"), Some(&StatValue::Count(2)));
    }

    #[test]
    fn port_stats_require_a_floating_ip() {
        let err = port_stats(&sandbox(), &[]).unwrap_err();
        assert_eq!(err.to_string(), "floating IP fip-1 not found on provider");
    }

    #[tokio::test]
    async fn static_provider_filters_by_id() {
        let provider = StaticSdnProvider {
            name: "nuage".to_string(),
            floating_ips: vec![
                FloatingIp {
                    id: "fip-1".to_string(),
                    address: "172.24.4.10".to_string(),
                },
                FloatingIp {
                    id: "fip-2".to_string(),
                    address: "172.24.4.11".to_string(),
                },
            ],
        };
        let ips = provider.floating_ips("fip-2").await.unwrap();
        assert_eq!(ips.len(), 1);
        assert_eq!(ips[0].address, "172.24.4.11");
    }
}
