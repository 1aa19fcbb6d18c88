//! Subnet description.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use ssa_networking::Ipv4Cidr;

use super::CommandContext;
use crate::output::{print_fields, Field};

/// Describe a subnet given as address and netmask.
#[derive(Debug, Args)]
pub struct CidrCommand {
    /// Any address in the subnet.
    address: String,

    /// Dotted netmask, e.g. 255.255.255.0.
    netmask: String,
}

#[derive(Debug, Serialize)]
struct CidrInfo {
    /// As the inventory renders it: the given address and prefix.
    cidr: String,
    network: String,
    netmask: String,
    prefix_len: u8,
    size: u64,
}

impl CidrInfo {
    fn describe(address: &str, netmask: &str) -> Result<Self> {
        let cidr = Ipv4Cidr::from_netmask(address, netmask)?;
        Ok(Self {
            cidr: cidr.to_string(),
            network: cidr.network().to_string(),
            netmask: cidr.netmask().to_string(),
            prefix_len: cidr.prefix_len,
            size: cidr.size(),
        })
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::new("cidr", &self.cidr),
            Field::new("network", &self.network),
            Field::new("netmask", &self.netmask),
            Field::new("prefix", self.prefix_len),
            Field::new("addresses", self.size),
        ]
    }
}

impl CidrCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let info = CidrInfo::describe(&self.address, &self.netmask)?;
        print_fields(&info, &info.fields(), ctx.format);
        Ok(())
    }
}
