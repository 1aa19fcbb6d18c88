//! End-to-end SDN inventory validation.
//!
//! A sandbox (enterprise, domain, subnet with two ports, a VM port with a
//! floating IP) exists on the SDN provider. The product mirrors it into its
//! inventory only after a provider refresh, and then with a lag. The checks
//! must wait that lag out and compare every rendered stat.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p ssa-e2e --test network_inventory
//! ```

use std::time::Duration;

use ssa_inventory::sdn::{
    verify_port_inventory, verify_subnet_inventory, Domain, Enterprise, FloatingIp, PolicyGroup,
    Sandbox, StaticSdnProvider, Subnet, VPort, PORTS, SUBNETS, SUBNET_TYPE, VM_PORT_TYPE,
};
use ssa_inventory::{InMemoryInventory, InventoryError, InventoryRecord, LookupConfig, Stats};
use ssa_testing::unique_name;
use ssa_wait::WaitOptions;
use tracing::info;

const PROVIDER: &str = "nuage-east";

/// Inventory lookup budget as a verification run would export it.
fn lookup_opts(timeout: &str) -> WaitOptions {
    temp_env::with_vars(
        [
            ("SSA_INVENTORY_DELAY", Some("5s")),
            ("SSA_INVENTORY_TIMEOUT", Some(timeout)),
        ],
        LookupConfig::from_env,
    )
    .unwrap()
    .wait_options()
}

fn policy_group(name: &str) -> PolicyGroup {
    PolicyGroup {
        id: unique_name("pg"),
        name: name.to_string(),
    }
}

fn sandbox() -> Sandbox {
    let vm_vport = VPort {
        id: unique_name("vport"),
        name: "vm-port".to_string(),
        policy_groups: vec![policy_group("web"), policy_group("ssh")],
        associated_floating_ip_id: Some("fip-7".to_string()),
    };
    let bridge = VPort {
        id: unique_name("vport"),
        name: "bridge-port".to_string(),
        policy_groups: vec![policy_group("bridge")],
        associated_floating_ip_id: None,
    };

    Sandbox {
        enterprise: Enterprise {
            id: unique_name("ent"),
            name: "ssa-enterprise".to_string(),
        },
        domain: Domain {
            id: unique_name("dom"),
            name: "ssa-domain".to_string(),
        },
        subnet: Subnet {
            id: unique_name("subnet"),
            name: "ssa-subnet".to_string(),
            address: "192.168.30.0".to_string(),
            netmask: "255.255.254.0".to_string(),
            gateway: "192.168.30.1".to_string(),
            ip_type: "IPV4".to_string(),
            vports: vec![vm_vport.clone(), bridge],
        },
        vm_vport,
    }
}

fn provider() -> StaticSdnProvider {
    StaticSdnProvider {
        name: PROVIDER.to_string(),
        floating_ips: vec![
            FloatingIp {
                id: "fip-7".to_string(),
                address: "172.24.4.77".to_string(),
            },
            FloatingIp {
                id: "fip-8".to_string(),
                address: "172.24.4.78".to_string(),
            },
        ],
    }
}

/// The subnet as the product renders it.
fn mirrored_subnet(sb: &Sandbox) -> InventoryRecord {
    InventoryRecord {
        collection: SUBNETS.to_string(),
        ems_ref: sb.subnet.id.clone(),
        provider: PROVIDER.to_string(),
        name: sb.subnet.name.clone(),
        stats: Stats::new()
            .with("name_value", "ssa-subnet")
            .with("type_value", SUBNET_TYPE)
            .with("cidr_value", "192.168.30.0/23")
            .with("gateway_value", "192.168.30.1")
            .with("network_protocol_value", "ipv4")
            .with("network_manager_value", PROVIDER)
            .with("cloud_tenant_value", "ssa-enterprise")
            .with("network_router_value", "ssa-domain")
            .with("network_ports_num", 2u64)
            .with("security_groups_num", 3u64)
            .with("created_on_value", "2024-03-01 10:05:00 UTC"),
    }
}

/// The VM port as the product renders it.
fn mirrored_port(sb: &Sandbox) -> InventoryRecord {
    InventoryRecord {
        collection: PORTS.to_string(),
        ems_ref: sb.vm_vport.id.clone(),
        provider: PROVIDER.to_string(),
        name: sb.vm_vport.name.clone(),
        stats: Stats::new()
            .with("name_value", "vm-port")
            .with("type_value", VM_PORT_TYPE)
            .with("floating_ip_addresses_value", "172.24.4.77")
            .with("cloud_subnets_num", 1u64)
            .with("floating_ips_num", 1u64)
            .with("security_groups_num", 2u64),
    }
}

#[tokio::test(start_paused = true)]
async fn sandbox_subnet_and_port_are_mirrored() {
    ssa_testing::init_tracing();
    let sb = sandbox();
    let inventory = InMemoryInventory::new();
    inventory.stage(mirrored_subnet(&sb), 3);
    inventory.stage(mirrored_port(&sb), 1);
    info!(subnet = %sb.subnet.id, port = %sb.vm_vport.id, "Sandbox staged for mirroring");
    let opts = lookup_opts("60s");

    let start = tokio::time::Instant::now();
    let subnet = verify_subnet_inventory(&inventory, &provider(), &sb, &opts)
        .await
        .unwrap();
    assert_eq!(subnet.name, "ssa-subnet");
    // Refresh, three empty lookups, then the record: 4 lookups 5s apart.
    assert_eq!(start.elapsed(), Duration::from_secs(15));

    let port = verify_port_inventory(&inventory, &provider(), &sb, &opts)
        .await
        .unwrap();
    assert_eq!(port.ems_ref, sb.vm_vport.id);
    assert_eq!(inventory.refreshes(), 2);
}

#[tokio::test(start_paused = true)]
async fn wrong_rendering_reports_every_mismatch() {
    let sb = sandbox();
    let inventory = InMemoryInventory::new();
    let mut record = mirrored_subnet(&sb);
    record.stats.insert("gateway_value", "192.168.30.254");
    record.stats.insert("security_groups_num", 2u64);
    inventory.insert(record);

    let err = verify_subnet_inventory(
        &inventory,
        &provider(),
        &sb,
        &lookup_opts("60s"),
    )
    .await
    .unwrap_err();

    match err {
        InventoryError::StatsMismatch { mismatches, .. } => {
            let keys: Vec<_> = mismatches.iter().map(|m| m.key.as_str()).collect();
            assert_eq!(keys, vec!["gateway_value", "security_groups_num"]);
        }
        other => panic!("expected a stats mismatch, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unsynced_port_times_out() {
    let sb = sandbox();
    let inventory = InMemoryInventory::new();
    let opts = lookup_opts("30s");

    let start = tokio::time::Instant::now();
    let err = verify_port_inventory(&inventory, &provider(), &sb, &opts)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(err.to_string().contains(PORTS));
    assert_eq!(start.elapsed(), Duration::from_secs(30));
    assert_eq!(inventory.lookups(), 7);
}

#[tokio::test(start_paused = true)]
async fn port_without_floating_ip_on_provider_fails_before_lookup() {
    let mut sb = sandbox();
    sb.vm_vport.associated_floating_ip_id = Some("fip-gone".to_string());
    let inventory = InMemoryInventory::new();

    let err = verify_port_inventory(
        &inventory,
        &provider(),
        &sb,
        &lookup_opts("60s"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, InventoryError::MissingFloatingIp(ref id) if id == "fip-gone"));
    assert_eq!(inventory.lookups(), 0);
}
